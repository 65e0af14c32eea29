mod tui;

use std::io;
use std::sync::atomic::Ordering;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use clap::Parser;
use crossterm::event::{self, Event, KeyCode, KeyEventKind};
use crossterm::terminal::{self, EnterAlternateScreen, LeaveAlternateScreen};
use crossterm::{cursor, execute};
use ratatui::Terminal;
use ratatui::backend::CrosstermBackend;

use skid::net::{PacketLossSimulation, UdpTransport};
use skid::server::{GameServer, ServerConfig, ServerEvent};
use tui::{Tab, TuiState};

#[derive(Parser)]
#[command(name = "skid-server")]
#[command(about = "Authoritative entity sync server")]
struct Args {
    #[arg(short, long, default_value = "0.0.0.0")]
    bind: String,

    #[arg(short, long, default_value_t = skid::DEFAULT_PORT)]
    port: u16,

    #[arg(short, long, default_value_t = skid::DEFAULT_TICK_RATE)]
    tick_rate: u32,

    #[arg(short, long, default_value_t = 32)]
    max_peers: usize,

    #[arg(long, default_value_t = 1, help = "Longest wait for traffic per loop, in ms")]
    poll_timeout_ms: u64,

    #[arg(long, help = "Keep entities of disconnected peers in the world")]
    retain: bool,

    #[arg(long, default_value_t = 0, help = "Server-driven entities to spawn at startup")]
    bots: u16,

    #[arg(long)]
    headless: bool,

    #[arg(long, help = "Enable global packet loss simulation")]
    simulate_packet_loss: bool,

    #[arg(long, default_value_t = 0.0, help = "Packet loss percentage (0-100)")]
    loss_percent: f32,

    #[arg(long, default_value_t = 0, help = "Minimum latency in ms")]
    min_latency: u32,

    #[arg(long, default_value_t = 0, help = "Maximum latency in ms")]
    max_latency: u32,

    #[arg(long, default_value_t = 0, help = "Jitter in ms")]
    jitter: u32,
}

fn main() -> Result<()> {
    let args = Args::parse();
    let bind_addr = format!("{}:{}", args.bind, args.port);

    let global_packet_loss = args.simulate_packet_loss.then_some(PacketLossSimulation {
        enabled: true,
        loss_percent: args.loss_percent,
        min_latency_ms: args.min_latency,
        max_latency_ms: args.max_latency,
        jitter_ms: args.jitter,
    });

    let config = ServerConfig {
        tick_rate: args.tick_rate,
        max_peers: args.max_peers,
        poll_timeout: Duration::from_millis(args.poll_timeout_ms),
        retain_disconnected_entities: args.retain,
        bots: args.bots,
        global_packet_loss,
        ..Default::default()
    };

    let transport = UdpTransport::bind(bind_addr.as_str(), config.udp_config())
        .with_context(|| format!("failed to bind {bind_addr}"))?;
    let mut server = GameServer::new(transport, config);

    if args.headless {
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
        log::info!(
            "Server started on {} at {} Hz",
            server.transport().local_addr(),
            server.clock().tick_rate()
        );
        server.run();
        server.transport_mut().shutdown();
        log::info!("Server shutting down");
    } else {
        run_with_tui(&mut server, args.max_peers)?;
    }

    Ok(())
}

fn run_with_tui(server: &mut GameServer<UdpTransport>, max_peers: usize) -> io::Result<()> {
    terminal::enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, cursor::Hide)?;

    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let running = server.running();
    let started = Instant::now();
    let mut tui_state = TuiState::new();

    tui_state.log_info(format!(
        "Server started on {}",
        server.transport().local_addr()
    ));

    while running.load(Ordering::SeqCst) {
        if let Err(e) = server.tick_once() {
            tui_state.log_error(format!("Server loop error: {e}"));
        }

        for event in server.drain_events() {
            match event {
                ServerEvent::PeerConnected { peer } => {
                    tui_state.log_info(format!("Peer {peer} connected"));
                }
                ServerEvent::PeerJoined { peer, eid } => {
                    tui_state.log_info(format!("Peer {peer} joined as entity {eid}"));
                }
                ServerEvent::DuplicateJoin { peer, eid } => {
                    tui_state.log_warn(format!(
                        "Peer {peer} sent a second join (entity {eid})"
                    ));
                }
                ServerEvent::PeerDisconnected { peer, eid, reason } => {
                    let entity = eid.map_or_else(String::new, |e| format!(" (entity {e})"));
                    tui_state.log_info(format!("Peer {peer} {}{entity}", reason.as_str()));
                }
                ServerEvent::Error { message } => tui_state.log_error(message),
            }
        }

        if let Some(peer) = tui_state.take_pending_kick() {
            server.kick_peer(peer);
        }

        let peers = server.peer_infos();
        if event::poll(Duration::from_millis(1))?
            && let Event::Key(key) = event::read()?
            && key.kind == KeyEventKind::Press
        {
            match key.code {
                KeyCode::Char('q') | KeyCode::Esc => running.store(false, Ordering::SeqCst),
                KeyCode::Tab => tui_state.next_tab(),
                KeyCode::BackTab => tui_state.prev_tab(),
                KeyCode::PageUp => tui_state.scroll_up(),
                KeyCode::PageDown => tui_state.scroll_down(),
                KeyCode::End => tui_state.scroll_to_bottom(),
                KeyCode::Up if tui_state.active_tab() == Tab::Peers => {
                    tui_state.select_prev_peer(peers.len());
                }
                KeyCode::Down if tui_state.active_tab() == Tab::Peers => {
                    tui_state.select_next_peer(peers.len());
                }
                KeyCode::Char('k') | KeyCode::Char('K')
                    if tui_state.active_tab() == Tab::Peers =>
                {
                    tui_state.request_kick(&peers);
                }
                _ => {}
            }
        }

        let stats = server.stats();
        let network = server.transport().stats();
        terminal.draw(|frame| {
            let view = tui::Snapshot {
                stats: &stats,
                network: &network,
                peers: &peers,
                world: server.world(),
                max_peers,
                uptime_secs: started.elapsed().as_secs(),
            };
            tui::render(frame, &tui_state, &view);
        })?;
    }

    tui_state.log_info("Shutting down...");
    server.shutdown_connections();
    server.transport_mut().shutdown();

    terminal::disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen, cursor::Show)?;

    Ok(())
}
