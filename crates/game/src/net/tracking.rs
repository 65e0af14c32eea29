use std::collections::BTreeMap;
use std::time::{Duration, Instant};

const SEQUENCE_WRAP_THRESHOLD: u32 = u32::MAX / 2;

const MIN_RTO: Duration = Duration::from_millis(50);
const MAX_RTO: Duration = Duration::from_millis(2000);

#[inline]
pub fn sequence_greater_than(s1: u32, s2: u32) -> bool {
    ((s1 > s2) && (s1 - s2 <= SEQUENCE_WRAP_THRESHOLD))
        || ((s1 < s2) && (s2 - s1 > SEQUENCE_WRAP_THRESHOLD))
}

/// Smoothed round-trip estimate from ping/pong samples.
#[derive(Debug, Clone)]
pub struct RttEstimator {
    srtt: f32,
    rtt_var: f32,
    samples: u32,
}

impl Default for RttEstimator {
    fn default() -> Self {
        Self::new()
    }
}

impl RttEstimator {
    pub fn new() -> Self {
        Self {
            srtt: 100.0,
            rtt_var: 50.0,
            samples: 0,
        }
    }

    pub fn update(&mut self, rtt: f32) {
        const ALPHA: f32 = 0.125;
        const BETA: f32 = 0.25;

        if self.samples == 0 {
            self.srtt = rtt;
            self.rtt_var = rtt / 2.0;
        } else {
            let diff = (rtt - self.srtt).abs();
            self.rtt_var = (1.0 - BETA) * self.rtt_var + BETA * diff;
            self.srtt = (1.0 - ALPHA) * self.srtt + ALPHA * rtt;
        }
        self.samples = self.samples.saturating_add(1);
    }

    pub fn srtt(&self) -> f32 {
        self.srtt
    }

    pub fn rtt_var(&self) -> f32 {
        self.rtt_var
    }

    pub fn has_samples(&self) -> bool {
        self.samples > 0
    }

    /// Retransmission timeout: `srtt + 4 * rttvar`, clamped.
    pub fn rto(&self) -> Duration {
        let ms = (self.srtt + 4.0 * self.rtt_var).max(0.0);
        Duration::from_secs_f32(ms / 1000.0).clamp(MIN_RTO, MAX_RTO)
    }
}

#[derive(Debug, Clone)]
pub struct PendingFrame {
    pub sequence: u32,
    pub frame: Vec<u8>,
    pub last_sent: Instant,
    pub sends: u32,
}

/// Reliable frames awaiting acknowledgement.
#[derive(Debug, Default)]
pub struct SendTracker {
    next_sequence: u32,
    pending: BTreeMap<u32, PendingFrame>,
}

impl SendTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_sequence(&mut self) -> u32 {
        let sequence = self.next_sequence;
        self.next_sequence = self.next_sequence.wrapping_add(1);
        sequence
    }

    pub fn track(&mut self, sequence: u32, frame: Vec<u8>, now: Instant) {
        self.pending.insert(
            sequence,
            PendingFrame {
                sequence,
                frame,
                last_sent: now,
                sends: 1,
            },
        );
    }

    pub fn ack(&mut self, sequence: u32) -> bool {
        self.pending.remove(&sequence).is_some()
    }

    /// Frames whose last send is older than `rto`; their send time is reset.
    pub fn due(&mut self, now: Instant, rto: Duration) -> Vec<Vec<u8>> {
        self.pending
            .values_mut()
            .filter(|p| now.duration_since(p.last_sent) >= rto)
            .map(|p| {
                p.last_sent = now;
                p.sends += 1;
                p.frame.clone()
            })
            .collect()
    }

    pub fn unacked_count(&self) -> usize {
        self.pending.len()
    }
}

/// Restores send order on the reliable channel and filters duplicates.
#[derive(Debug, Default)]
pub struct ReceiveTracker {
    next_expected: u32,
    out_of_order: BTreeMap<u32, Vec<u8>>,
}

impl ReceiveTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns every payload that became deliverable, in order.
    pub fn record_received(&mut self, sequence: u32, payload: Vec<u8>) -> Vec<Vec<u8>> {
        if sequence != self.next_expected && !sequence_greater_than(sequence, self.next_expected) {
            return Vec::new();
        }
        self.out_of_order.entry(sequence).or_insert(payload);

        let mut ready = Vec::new();
        while let Some(payload) = self.out_of_order.remove(&self.next_expected) {
            ready.push(payload);
            self.next_expected = self.next_expected.wrapping_add(1);
        }
        ready
    }

    pub fn buffered(&self) -> usize {
        self.out_of_order.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sequence_comparison() {
        assert!(sequence_greater_than(2, 1));
        assert!(!sequence_greater_than(1, 2));
        assert!(sequence_greater_than(0, u32::MAX));
        assert!(!sequence_greater_than(5, 5));
    }

    #[test]
    fn test_receive_tracker_reorders() {
        let mut tracker = ReceiveTracker::new();

        assert!(tracker.record_received(1, vec![1]).is_empty());
        assert!(tracker.record_received(2, vec![2]).is_empty());
        assert_eq!(tracker.buffered(), 2);

        let ready = tracker.record_received(0, vec![0]);
        assert_eq!(ready, vec![vec![0], vec![1], vec![2]]);
        assert_eq!(tracker.buffered(), 0);
    }

    #[test]
    fn test_duplicate_detection() {
        let mut tracker = ReceiveTracker::new();

        assert_eq!(tracker.record_received(0, vec![9]).len(), 1);
        assert!(tracker.record_received(0, vec![9]).is_empty());
        assert!(tracker.record_received(2, vec![2]).is_empty());
        assert!(tracker.record_received(2, vec![2]).is_empty());
        assert_eq!(tracker.record_received(1, vec![1]).len(), 2);
    }

    #[test]
    fn test_send_tracker_resend() {
        let mut tracker = SendTracker::new();
        let start = Instant::now();

        let a = tracker.next_sequence();
        let b = tracker.next_sequence();
        tracker.track(a, vec![a as u8], start);
        tracker.track(b, vec![b as u8], start);

        assert!(tracker.due(start, Duration::from_millis(100)).is_empty());
        assert!(tracker.ack(a));
        assert!(!tracker.ack(a));

        let later = start + Duration::from_millis(150);
        assert_eq!(tracker.due(later, Duration::from_millis(100)), vec![vec![1]]);
        assert!(tracker.due(later, Duration::from_millis(100)).is_empty());
        assert_eq!(tracker.unacked_count(), 1);
    }

    #[test]
    fn test_rtt_smoothing() {
        let mut rtt = RttEstimator::new();
        assert!(!rtt.has_samples());

        rtt.update(40.0);
        assert_eq!(rtt.srtt(), 40.0);

        rtt.update(80.0);
        assert!((rtt.srtt() - 45.0).abs() < 1e-4);
        assert!(rtt.rto() >= MIN_RTO && rtt.rto() <= MAX_RTO);
    }
}
