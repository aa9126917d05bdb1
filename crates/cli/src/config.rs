//! Configuration file for the `run` command.
//!
//! ```toml
//! [stack]
//! version = 2
//!
//! [[interface]]
//! name = "udp0"
//! driver = { kind = "udp", bind = "127.0.0.1:9600", peer = "127.0.0.1:9601" }
//!
//! [[interface]]
//! name = "lo0"
//! mode = "stepped"
//! driver = { kind = "loopback", peer = "lo1" }
//! ```

use anyhow::{Context, bail};
use ifgen::{Driver, ExecutionMode, InterfaceConfig, LoopbackDriver, StackConfig, UdpDriver};
use serde::Deserialize;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::Path;

const DEFAULT_LOOPBACK_CAPACITY: usize = 64;

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    #[serde(default)]
    pub stack: StackConfig,
    #[serde(default, rename = "interface")]
    pub interfaces: Vec<InterfaceEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct InterfaceEntry {
    pub name: String,
    pub queue_capacity: Option<usize>,
    pub mode: Option<ExecutionMode>,
    pub idle_interval_ms: Option<u64>,
    pub driver: DriverConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum DriverConfig {
    Udp {
        bind: SocketAddr,
        peer: SocketAddr,
    },
    Loopback {
        peer: String,
        capacity: Option<usize>,
    },
    #[cfg(unix)]
    Socketpair { peer: String },
}

impl InterfaceEntry {
    pub fn config(&self) -> InterfaceConfig {
        let defaults = InterfaceConfig::default();
        InterfaceConfig {
            queue_capacity: self.queue_capacity.unwrap_or(defaults.queue_capacity),
            mode: self.mode.unwrap_or(defaults.mode),
            idle_interval_ms: self.idle_interval_ms.unwrap_or(defaults.idle_interval_ms),
        }
    }
}

impl FileConfig {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        Self::parse(&text).with_context(|| format!("invalid config {}", path.display()))
    }

    pub fn parse(text: &str) -> anyhow::Result<Self> {
        let config: Self = toml::from_str(text)?;
        config.stack.validate()?;
        if config.interfaces.is_empty() {
            bail!("no interfaces configured");
        }
        Ok(config)
    }

    /// Open one driver per interface entry, in entry order.
    ///
    /// Paired drivers (loopback, socketpair) are created once for both ends;
    /// each end must name the other as its peer.
    pub fn open_drivers(&self) -> anyhow::Result<Vec<Box<dyn Driver>>> {
        let mut pending: HashMap<String, (String, Box<dyn Driver>)> = HashMap::new();
        let mut drivers = Vec::with_capacity(self.interfaces.len());

        for entry in &self.interfaces {
            let driver: Box<dyn Driver> = match &entry.driver {
                DriverConfig::Udp { bind, peer } => Box::new(
                    UdpDriver::bind(*bind, *peer)
                        .with_context(|| format!("{}: failed to bind {bind}", entry.name))?,
                ),
                DriverConfig::Loopback { peer, capacity } => {
                    take_or_pair(&mut pending, &entry.name, peer, || {
                        let (a, b) =
                            LoopbackDriver::pair(capacity.unwrap_or(DEFAULT_LOOPBACK_CAPACITY));
                        let pair: DriverPair = (Box::new(a), Box::new(b));
                        Ok(pair)
                    })?
                }
                #[cfg(unix)]
                DriverConfig::Socketpair { peer } => {
                    take_or_pair(&mut pending, &entry.name, peer, || {
                        let (a, b) = ifgen::SocketPairDriver::pair()?;
                        let pair: DriverPair = (Box::new(a), Box::new(b));
                        Ok(pair)
                    })?
                }
            };
            drivers.push(driver);
        }

        if let Some((name, (owner, _))) = pending.into_iter().next() {
            bail!("interface '{owner}' names peer '{name}', which does not name it back");
        }
        Ok(drivers)
    }
}

type DriverPair = (Box<dyn Driver>, Box<dyn Driver>);

fn take_or_pair(
    pending: &mut HashMap<String, (String, Box<dyn Driver>)>,
    name: &str,
    peer: &str,
    open: impl FnOnce() -> std::io::Result<DriverPair>,
) -> anyhow::Result<Box<dyn Driver>> {
    if name == peer {
        bail!("interface '{name}' cannot be its own peer");
    }
    if let Some((owner, driver)) = pending.remove(name) {
        if owner != peer {
            bail!("interface '{name}' is claimed by '{owner}' but names '{peer}' as peer");
        }
        return Ok(driver);
    }
    let (ours, theirs) = open().with_context(|| format!("{name}: failed to open driver"))?;
    pending.insert(peer.to_string(), (name.to_string(), theirs));
    Ok(ours)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ifgen::ProtocolVersion;

    const SAMPLE: &str = r#"
        [stack]
        version = 1
        buffer_count = 8

        [[interface]]
        name = "lo0"
        mode = "stepped"
        queue_capacity = 4
        driver = { kind = "loopback", peer = "lo1", capacity = 8 }

        [[interface]]
        name = "lo1"
        driver = { kind = "loopback", peer = "lo0" }

        [[interface]]
        name = "udp0"
        driver = { kind = "udp", bind = "127.0.0.1:0", peer = "127.0.0.1:9" }
    "#;

    #[test]
    fn parses_sample() {
        let config = FileConfig::parse(SAMPLE).unwrap();
        assert_eq!(config.stack.version, ProtocolVersion::V1);
        assert_eq!(config.stack.buffer_count, 8);
        assert_eq!(config.interfaces.len(), 3);

        let lo0 = config.interfaces[0].config();
        assert_eq!(lo0.mode, ExecutionMode::Stepped);
        assert_eq!(lo0.queue_capacity, 4);
        assert_eq!(config.interfaces[1].config(), InterfaceConfig::default());
    }

    #[test]
    fn opens_paired_drivers() {
        let config = FileConfig::parse(SAMPLE).unwrap();
        let mut drivers = config.open_drivers().unwrap();
        assert_eq!(drivers.len(), 3);

        assert_eq!(drivers[0].write(b"hi").unwrap(), 2);
        let mut buf = [0u8; 8];
        assert_eq!(drivers[1].read(&mut buf).unwrap(), 2);
        assert_eq!(&buf[..2], b"hi");
    }

    #[test]
    fn unmatched_peer_is_rejected() {
        let config = FileConfig::parse(
            r#"
            [[interface]]
            name = "lo0"
            driver = { kind = "loopback", peer = "lo1" }
            "#,
        )
        .unwrap();
        let err = config.open_drivers().err().unwrap();
        assert!(err.to_string().contains("does not name it back"));
    }

    #[test]
    fn empty_config_is_rejected() {
        assert!(FileConfig::parse("").is_err());
    }

    #[test]
    fn bad_version_is_rejected() {
        let err = FileConfig::parse("[stack]\nversion = 3\n").unwrap_err();
        assert!(format!("{err:#}").contains("1 or 2"));
    }
}
