//! The `run` command - brings up the configured interfaces and exchanges probes.

use crate::commands::header::parse_version;
use crate::config::FileConfig;
use anyhow::Context;
use clap::Args;
use ifgen::{ExecutionMode, Interface, PacketId, ProtocolVersion, Stack};
use std::path::PathBuf;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{info, warn};

#[derive(Args)]
pub struct RunArgs {
    /// Path to configuration file
    #[arg(long, short)]
    config: PathBuf,

    /// Probes sent on every interface
    #[arg(long, default_value = "1")]
    count: u32,

    /// How long to listen for traffic, in milliseconds
    #[arg(long, default_value = "500")]
    duration_ms: u64,

    /// Destination address written into probe headers
    #[arg(long, default_value = "0")]
    destination: u16,

    /// Destination port written into probe headers
    #[arg(long, default_value = "1")]
    port: u8,

    /// Period of the loop driving stepped interfaces, in milliseconds
    #[arg(long, default_value = "1")]
    step_ms: u64,

    /// Override the protocol version of the configuration file (1 or 2)
    #[arg(long, value_parser = parse_version)]
    protocol: Option<ProtocolVersion>,
}

pub async fn run(args: RunArgs) -> anyhow::Result<()> {
    let mut file = FileConfig::load(&args.config)?;
    if let Some(version) = args.protocol {
        file.stack.version = version;
    }
    let drivers = file.open_drivers()?;
    let (stack, mut rx) = Stack::new(file.stack.clone())?;

    let mut interfaces = Vec::with_capacity(drivers.len());
    for (entry, driver) in file.interfaces.iter().zip(drivers) {
        let iface = Interface::builder(entry.name.as_str())
            .boxed_driver(Some(driver))
            .config(entry.config())
            .init(&stack)
            .with_context(|| format!("failed to bring up '{}'", entry.name))?;
        info!(iface = %iface.name(), version = %iface.version(), mode = ?iface.mode(), "interface ready");
        interfaces.push(iface);
    }

    let period = Duration::from_millis(args.step_ms.max(1));
    let steppers: Vec<_> = interfaces
        .iter()
        .filter(|iface| iface.mode() == ExecutionMode::Stepped)
        .cloned()
        .map(|iface| tokio::spawn(async move { iface.run(period).await }))
        .collect();

    for iface in &interfaces {
        send_probes(&stack, iface, &args);
    }

    let deadline = Instant::now() + Duration::from_millis(args.duration_ms);
    while let Ok(Some(msg)) = tokio::time::timeout_at(deadline, rx.recv()).await {
        let id = msg.packet.id();
        println!(
            "{} <- {}:{} -> {}:{} prio {} [{}]",
            msg.iface,
            id.source,
            id.source_port,
            id.destination,
            id.destination_port,
            id.priority,
            hex::encode(msg.packet.data())
        );
    }

    for (name, stats) in stack.registry().stats() {
        println!("{name:<16} {stats}");
    }

    stack.shutdown();
    for task in steppers {
        if let Err(e) = task.await {
            warn!(error = %e, "stepped interface task failed");
        }
    }
    Ok(())
}

fn send_probes(stack: &Stack, iface: &Interface, args: &RunArgs) {
    for seq in 0..args.count {
        let payload = format!("{} probe {seq}", iface.name());
        let Some(mut packet) = stack.pool().acquire(payload.len()) else {
            warn!(iface = %iface.name(), "buffer pool exhausted, skipping probes");
            return;
        };
        packet.set_id(PacketId {
            destination: args.destination,
            destination_port: args.port,
            ..PacketId::default()
        });
        if !packet.set_data(payload.as_bytes()) {
            warn!(iface = %iface.name(), "probe does not fit a buffer");
            return;
        }
        if let Err(e) = iface.send(packet) {
            warn!(iface = %iface.name(), error = %e, "probe not queued");
        }
    }
}
