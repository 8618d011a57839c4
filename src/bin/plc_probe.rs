//! plc_probe - one-shot controller connectivity check.
//!
//! Connects to the configured controller, writes a single BOOL tag, and
//! reports the result. Useful when commissioning the tag names and slot.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use hitzone::transport::DEFAULT_ENIP_PORT;
use hitzone::{ControllerEndpoint, ControllerLink, EnipLink, HitzoneConfig};

#[derive(Parser, Debug)]
#[command(author, version, about = "Write one BOOL tag to the controller and report the result")]
struct Args {
    /// Config file to take the controller address, slot and tags from.
    #[arg(long, env = "HITZONE_CONFIG")]
    config: Option<PathBuf>,

    /// Controller address (host or host:port). Overrides the config file.
    #[arg(long)]
    addr: Option<String>,

    /// Backplane slot of the CPU. Overrides the config file.
    #[arg(long)]
    slot: Option<u8>,

    /// Tag to write. Defaults to the configured target 1 tag.
    #[arg(long)]
    tag: Option<String>,

    /// Value to write.
    #[arg(long, default_value_t = false)]
    value: bool,

    /// Socket timeout in milliseconds.
    #[arg(long, default_value_t = 1000)]
    timeout_ms: u64,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let cfg = HitzoneConfig::load_from(args.config.as_deref())?;
    let slot = args.slot.unwrap_or(cfg.plc.slot);
    let endpoint = match &args.addr {
        Some(addr) => ControllerEndpoint::parse(addr, DEFAULT_ENIP_PORT, slot)?,
        None => {
            let mut endpoint = cfg.endpoint()?;
            endpoint.slot = slot;
            endpoint
        }
    };
    let tag = args.tag.unwrap_or(cfg.plc.target1_tag);

    let mut link = EnipLink::new(Duration::from_millis(args.timeout_ms));
    let started = Instant::now();
    link.connect(&endpoint)
        .with_context(|| format!("connect to {}", endpoint))?;
    log::info!(
        "connected to {} (session 0x{:08X}) in {:?}",
        endpoint,
        link.session(),
        started.elapsed()
    );

    let started = Instant::now();
    let result = link.write_bool(&tag, args.value);
    link.close();
    result.with_context(|| format!("write {}={}", tag, args.value))?;
    log::info!("wrote {}={} in {:?}", tag, args.value, started.elapsed());
    Ok(())
}
