mod driver;

use std::net::{SocketAddr, ToSocketAddrs};
use std::time::{Duration, Instant};

use anyhow::{Context, Result, bail};
use clap::Parser;

use driver::DrivePattern;
use skid::client::{ClientConfig, GameClient};
use skid::net::{Transport, UdpConfig, UdpTransport};

const STATUS_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Parser)]
#[command(name = "skid-client")]
#[command(about = "Headless entity sync client driven by a scripted input pattern")]
struct Args {
    #[arg(
        short,
        long,
        default_value = "127.0.0.1:10131",
        help = "Server address to connect to"
    )]
    server: String,

    #[arg(short, long, value_enum, default_value_t = DrivePattern::Circle)]
    drive: DrivePattern,

    #[arg(long, help = "Stop after this many seconds; runs until disconnected if omitted")]
    duration_secs: Option<u64>,

    #[arg(short, long, default_value_t = skid::DEFAULT_TICK_RATE)]
    tick_rate: u32,

    #[arg(long, default_value_t = 5, help = "Seconds to wait for the server to accept")]
    connect_timeout_secs: u64,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let server_addr = resolve(&args.server)?;

    let mut transport = UdpTransport::bind("0.0.0.0:0", UdpConfig::default())
        .context("failed to bind client socket")?;
    let server = transport
        .connect(server_addr)
        .with_context(|| format!("failed to connect to {server_addr}"))?;
    log::info!(
        "Connecting to {server_addr} from {} with pattern {:?}",
        transport.local_addr(),
        args.drive
    );

    let config = ClientConfig {
        tick_rate: args.tick_rate,
        ..Default::default()
    };
    let mut client = GameClient::new(transport, server, config);

    let started = Instant::now();
    let connect_deadline = started + Duration::from_secs(args.connect_timeout_secs);
    let run_for = args.duration_secs.map(Duration::from_secs);
    let mut last_status = started;
    let mut was_connected = false;

    loop {
        let elapsed = started.elapsed();
        let (thr, steer) = args.drive.controls(elapsed.as_secs_f32());
        client.set_input(thr, steer);
        if let Err(e) = client.update() {
            log::warn!("Client update failed: {e}");
        }

        if client.is_connected() {
            was_connected = true;
        } else if was_connected {
            log::info!("Server closed the connection");
            break;
        } else if Instant::now() > connect_deadline {
            bail!("no answer from {server_addr}");
        }

        if run_for.is_some_and(|limit| elapsed >= limit) {
            break;
        }

        if last_status.elapsed() >= STATUS_INTERVAL {
            last_status = Instant::now();
            log_status(&client);
        }
    }

    client.disconnect();
    if let Err(e) = client.update() {
        log::warn!("Final update failed: {e}");
    }
    client.transport_mut().shutdown();

    let stats = client.stats();
    log::info!(
        "Done: {} snapshots, {} confirmed, {} resimulations, {} stale",
        stats.snapshots_received,
        stats.confirmed,
        stats.resimulations,
        stats.stale_snapshots
    );
    Ok(())
}

fn resolve(addr: &str) -> Result<SocketAddr> {
    addr.to_socket_addrs()
        .with_context(|| format!("invalid server address {addr}"))?
        .next()
        .with_context(|| format!("{addr} did not resolve"))
}

fn log_status<T: Transport>(client: &GameClient<T>) {
    let tick = client.estimated_server_tick().unwrap_or_default();
    match client.predicted_entity() {
        Some(entity) => log::info!(
            "tick {tick:.1}: entity {} at ({:.2}, {:.2}) ori {:.2} speed {:.2}, {} remote",
            entity.eid,
            entity.pos.x,
            entity.pos.y,
            entity.ori,
            entity.speed,
            client.remote_poses().count()
        ),
        None => log::info!(
            "tick {tick:.1}: waiting for control, {} entities known",
            client.world().entity_count()
        ),
    }
}
