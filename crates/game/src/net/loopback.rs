use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};
use std::rc::Rc;
use std::time::Duration;

use super::transport::{Channel, PeerId, Transport, TransportError, TransportEvent};

/// Address of an endpoint inside a `LoopbackNetwork`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LoopbackAddr(usize);

#[derive(Debug, Clone, Copy)]
struct Link {
    remote: LoopbackAddr,
    remote_peer: PeerId,
}

#[derive(Debug, Default)]
struct Mailbox {
    inbox: VecDeque<TransportEvent>,
    links: HashMap<PeerId, Link>,
    next_peer: PeerId,
}

impl Mailbox {
    fn allocate_peer(&mut self) -> PeerId {
        self.next_peer += 1;
        self.next_peer
    }
}

#[derive(Debug, Default)]
struct Hub {
    now_ms: u64,
    mailboxes: Vec<Mailbox>,
}

/// In-memory network with a manually advanced clock. Delivery is lossless,
/// in order and immediate.
#[derive(Debug, Clone, Default)]
pub struct LoopbackNetwork {
    hub: Rc<RefCell<Hub>>,
}

impl LoopbackNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn endpoint(&self) -> LoopbackTransport {
        let mut hub = self.hub.borrow_mut();
        hub.mailboxes.push(Mailbox::default());
        LoopbackTransport {
            hub: Rc::clone(&self.hub),
            addr: LoopbackAddr(hub.mailboxes.len() - 1),
        }
    }

    pub fn advance(&self, ms: u64) {
        self.hub.borrow_mut().now_ms += ms;
    }

    pub fn now_ms(&self) -> u64 {
        self.hub.borrow().now_ms
    }
}

#[derive(Debug)]
pub struct LoopbackTransport {
    hub: Rc<RefCell<Hub>>,
    addr: LoopbackAddr,
}

impl LoopbackTransport {
    pub fn addr(&self) -> LoopbackAddr {
        self.addr
    }

    /// Links both endpoints at once; each side sees `Connected` on its next poll.
    pub fn connect(&mut self, remote: LoopbackAddr) -> Result<PeerId, TransportError> {
        let mut hub = self.hub.borrow_mut();
        if remote.0 >= hub.mailboxes.len() {
            return Err(TransportError::UnknownPeer(remote.0 as PeerId));
        }

        let local_peer = hub.mailboxes[self.addr.0].allocate_peer();
        let remote_peer = hub.mailboxes[remote.0].allocate_peer();

        let local = &mut hub.mailboxes[self.addr.0];
        local.links.insert(local_peer, Link { remote, remote_peer });
        local.inbox.push_back(TransportEvent::Connected { peer: local_peer });

        let far = &mut hub.mailboxes[remote.0];
        far.links.insert(
            remote_peer,
            Link {
                remote: self.addr,
                remote_peer: local_peer,
            },
        );
        far.inbox.push_back(TransportEvent::Connected { peer: remote_peer });

        Ok(local_peer)
    }

    pub fn peer_count(&self) -> usize {
        self.hub.borrow().mailboxes[self.addr.0].links.len()
    }
}

impl Transport for LoopbackTransport {
    fn send(&mut self, peer: PeerId, channel: Channel, data: &[u8]) -> Result<(), TransportError> {
        let mut hub = self.hub.borrow_mut();
        let link = *hub.mailboxes[self.addr.0]
            .links
            .get(&peer)
            .ok_or(TransportError::UnknownPeer(peer))?;
        hub.mailboxes[link.remote.0]
            .inbox
            .push_back(TransportEvent::Received {
                peer: link.remote_peer,
                channel,
                data: data.to_vec(),
            });
        Ok(())
    }

    fn poll(&mut self, _timeout: Duration) -> Result<Vec<TransportEvent>, TransportError> {
        let mut hub = self.hub.borrow_mut();
        Ok(hub.mailboxes[self.addr.0].inbox.drain(..).collect())
    }

    fn disconnect(&mut self, peer: PeerId) {
        let mut hub = self.hub.borrow_mut();
        let local = &mut hub.mailboxes[self.addr.0];
        let Some(link) = local.links.remove(&peer) else {
            return;
        };
        local.inbox.push_back(TransportEvent::Disconnected { peer });

        let far = &mut hub.mailboxes[link.remote.0];
        if far.links.remove(&link.remote_peer).is_some() {
            far.inbox.push_back(TransportEvent::Disconnected {
                peer: link.remote_peer,
            });
        }
    }

    fn rtt_ms(&self, peer: PeerId) -> Option<f32> {
        let hub = self.hub.borrow();
        hub.mailboxes[self.addr.0].links.contains_key(&peer).then_some(0.0)
    }

    fn now_ms(&self) -> u64 {
        self.hub.borrow().now_ms
    }
}
