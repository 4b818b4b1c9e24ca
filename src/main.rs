use clap::{Parser, Subcommand};
use ppplink::config;
use ppplink::link::Link;
use ppplink::telemetry::init_logging;
use std::path::PathBuf;
use std::time::Instant;
use tracing::info;

#[derive(Parser)]
#[command(name = "ppplink")]
#[command(about = "A userland PPP link core: HDLC framing, LCP/CCP negotiation, CCP and VJ compression")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
    /// Negotiate two in-memory links against each other and pass traffic
    Loopback {
        /// Path to config.toml for the active side
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// Number of IP packets to push through the compressed link
        #[arg(short, long, default_value_t = 16)]
        packets: usize,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Validate config.toml
    Validate {
        /// Path to config.toml
        #[arg(short, long, default_value = "config.toml")]
        config: PathBuf,
    },
}

fn main() {
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Config {
            action: ConfigAction::Validate { config },
        } => cmd_config_validate(&config),
        Commands::Loopback { config, packets } => cmd_loopback(config.as_deref(), packets),
    };
    if let Err(e) = result {
        eprintln!("[ERROR] {e}");
        std::process::exit(1);
    }
}

fn cmd_config_validate(path: &PathBuf) -> ppplink::Result<()> {
    init_logging(None);
    let config = config::load(path)?;
    println!("{} is valid", path.display());
    info!(?config, "parsed configuration");
    Ok(())
}

fn cmd_loopback(config_path: Option<&std::path::Path>, packets: usize) -> ppplink::Result<()> {
    let config = match config_path {
        Some(path) => config::load(path)?,
        None => config::Config::default(),
    };
    init_logging(Some(&config.log_config()));

    let mut active = Link::new(config.link_config());
    let mut passive_cfg = config.clone();
    passive_cfg.link.mode = config::Mode::Passive;
    let mut passive = Link::new(passive_cfg.link_config());

    let now = Instant::now();
    active.open(now);
    passive.open(now);
    active.lower_up(now);
    passive.lower_up(now);

    // Frame-at-a-time delivery keeps sync-mode boundaries intact; async
    // frames are self-delimiting either way.
    let shuttle = |a: &mut Link, b: &mut Link| loop {
        let from_a = a.poll_transmit_frames();
        let from_b = b.poll_transmit_frames();
        if from_a.is_empty() && from_b.is_empty() {
            break;
        }
        for frame in from_a {
            b.input(now, &frame);
        }
        for frame in from_b {
            a.input(now, &frame);
        }
    };
    shuttle(&mut active, &mut passive);

    info!(lcp = ?active.lcp_state(), ccp = ?active.ccp_state(), "active side converged");
    info!(lcp = ?passive.lcp_state(), ccp = ?passive.ccp_state(), "passive side converged");
    if !active.is_up() || !passive.is_up() {
        return Err(ppplink::Error::Config(
            "links failed to converge; check the negotiation settings".into(),
        ));
    }

    let mut delivered = 0usize;
    for i in 0..packets {
        let mut packet = vec![0x45u8, 0x00, 0x00, 0x00];
        packet.extend_from_slice(&(i as u32).to_be_bytes());
        packet.resize(64, 0xa5);
        let len = packet.len() as u16;
        packet[2..4].copy_from_slice(&len.to_be_bytes());
        active.send_ip(now, packet);
        shuttle(&mut active, &mut passive);
        delivered += passive.poll_delivered().len();
    }
    info!(sent = packets, delivered, "loopback traffic complete");

    for (name, value) in active.stats().export() {
        println!("active.{name} = {value}");
    }
    for (name, value) in passive.stats().export() {
        println!("passive.{name} = {value}");
    }
    Ok(())
}
