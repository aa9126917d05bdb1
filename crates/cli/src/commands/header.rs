//! The `header` command - decodes the header at the front of a framed packet.

use anyhow::Context;
use clap::Args;
use ifgen::{PacketId, ProtocolVersion};

#[derive(Args)]
pub struct HeaderArgs {
    /// Protocol version the frame was written with (1 or 2)
    #[arg(long, default_value = "2", value_parser = parse_version)]
    version: ProtocolVersion,

    /// Frame bytes as hex, header first
    frame: String,
}

pub fn run(args: HeaderArgs) -> anyhow::Result<()> {
    let (id, payload) = decode(args.version, &args.frame)?;

    println!("version:  {}", args.version);
    println!("priority: {}", id.priority);
    println!("source:   {}:{}", id.source, id.source_port);
    println!("dest:     {}:{}", id.destination, id.destination_port);
    println!("flags:    {:#04x}", id.flags);
    println!("payload:  {} bytes {}", payload.len(), hex::encode(&payload));
    Ok(())
}

fn decode(version: ProtocolVersion, frame: &str) -> anyhow::Result<(PacketId, Vec<u8>)> {
    let cleaned: String = frame.chars().filter(|c| !c.is_whitespace()).collect();
    let bytes = hex::decode(&cleaned).context("frame is not valid hex")?;

    let header_size = version.header_size();
    let id = PacketId::decode(version, &bytes).ok_or_else(|| {
        anyhow::anyhow!(
            "frame has {} bytes, {version} header needs {header_size}",
            bytes.len()
        )
    })?;
    Ok((id, bytes[header_size..].to_vec()))
}

pub(crate) fn parse_version(s: &str) -> Result<ProtocolVersion, String> {
    let value: u8 = s
        .parse()
        .map_err(|_| format!("'{s}' is not a valid number"))?;
    ProtocolVersion::try_from(value)
}
