use crate::backpressure::BackpressurePolicy;
use crate::errors::ConfigError;
use crate::exporter::ipfix::{IpfixOptions, MAX_UDP_PAYLOAD, MESSAGE_OVERHEAD};

use pnet::ipnetwork::Ipv4Network;
use serde::{Deserialize, Serialize};
use std::fs;
use std::net::{Ipv4Addr, SocketAddr};
use std::path::Path;
use std::time::Duration;

/// Encoded size of one flow record
pub const FLOW_RECORD_LEN: usize = 45;

/// Parameters of a normal distribution, in milliseconds
#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct NormalParams {
    pub mean: f64,
    pub std_dev: f64,
}

/// The configuration of a generation. Every field has a default value, so an empty file
/// is a valid configuration.
#[derive(Deserialize, Serialize, Debug, Clone)]
#[serde(default, deny_unknown_fields)]
pub struct Configuration {
    pub collector: SocketAddr,
    pub flows_per_second: u64,
    pub ticks_per_second: u64,
    pub simulators: usize,
    pub workers: usize,
    /// Capacity of the channel between the simulators and the workers. 0 means rendezvous.
    pub buffer_size: usize,
    pub max_message_size: usize,
    pub observation_domain_id: u32,
    pub template_refresh_secs: u64,
    pub seed: Option<u64>,
    pub src_network: String,
    pub dst_network: String,
    pub backpressure: BackpressurePolicy,
    pub duration: NormalParams,
    pub latency: NormalParams,
}

impl Default for Configuration {
    fn default() -> Self {
        Configuration {
            collector: SocketAddr::from((Ipv4Addr::LOCALHOST, 4739)),
            flows_per_second: 1000,
            ticks_per_second: 10,
            simulators: 8,
            workers: 8,
            buffer_size: 0,
            max_message_size: 8955,
            observation_domain_id: 1,
            template_refresh_secs: 600,
            seed: None,
            src_network: "0.0.0.0/0".to_string(),
            dst_network: "0.0.0.0/0".to_string(),
            backpressure: BackpressurePolicy::default(),
            duration: NormalParams {
                mean: 3000.,
                std_dev: 5000.,
            },
            latency: NormalParams {
                mean: 100.,
                std_dev: 50.,
            },
        }
    }
}

/// An IPv4 network from which addresses are drawn, octet by octet
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AddressSpace {
    pub network: Ipv4Addr,
    pub mask: Ipv4Addr,
}

impl Default for AddressSpace {
    fn default() -> Self {
        AddressSpace {
            network: Ipv4Addr::UNSPECIFIED,
            mask: Ipv4Addr::UNSPECIFIED,
        }
    }
}

impl AddressSpace {
    pub fn parse(network: &str) -> Result<Self, ConfigError> {
        let net: Ipv4Network = network.parse().map_err(|e| ConfigError::Network {
            network: network.to_string(),
            reason: format!("{e}"),
        })?;
        Ok(AddressSpace {
            network: net.network(),
            mask: net.mask(),
        })
    }
}

/// Smallest accepted maximum message size: the framing and one record
pub const MIN_MESSAGE_SIZE: usize = MESSAGE_OVERHEAD + FLOW_RECORD_LEN;
/// Largest accepted maximum message size. A message may exceed the maximum by one record.
pub const MAX_MESSAGE_SIZE: usize = MAX_UDP_PAYLOAD - FLOW_RECORD_LEN;

impl Configuration {
    /// Load a TOML configuration file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let config_str = fs::read_to_string(path)?;
        Self::import_from_str(&config_str)
    }

    pub fn import_from_str(config_str: &str) -> Result<Self, ConfigError> {
        let config: Configuration = toml::from_str(config_str)?;
        log::trace!("Configuration: {config:?}");
        Ok(config)
    }

    /// Check that the pipeline can run with this configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.get_tick_interval()?;
        if self.simulators == 0 {
            return Err(ConfigError::Empty("flow simulator"));
        }
        if self.workers == 0 {
            return Err(ConfigError::Empty("export worker"));
        }
        let flows_per_tick = self.get_flows_per_tick();
        if flows_per_tick < self.simulators as u64 {
            return Err(ConfigError::TooManySimulators {
                simulators: self.simulators,
                flows_per_tick,
            });
        }
        if flows_per_tick < self.workers as u64 {
            return Err(ConfigError::TooManyWorkers {
                workers: self.workers,
                flows_per_tick,
            });
        }
        if !(MIN_MESSAGE_SIZE..=MAX_MESSAGE_SIZE).contains(&self.max_message_size) {
            return Err(ConfigError::MessageSize {
                got: self.max_message_size,
                min: MIN_MESSAGE_SIZE,
                max: MAX_MESSAGE_SIZE,
            });
        }
        self.backpressure.validate()?;
        AddressSpace::parse(&self.src_network)?;
        AddressSpace::parse(&self.dst_network)?;
        for (name, params) in [("duration", self.duration), ("latency", self.latency)] {
            if !params.mean.is_finite() || !params.std_dev.is_finite() || params.std_dev < 0. {
                return Err(ConfigError::Distribution {
                    name,
                    reason: format!("mean {} and std-dev {}", params.mean, params.std_dev),
                });
            }
        }

        let records_per_tick = 2 * self.get_flows_per_tick_per_simulator();
        if self.buffer_size > 0
            && self.backpressure == BackpressurePolicy::Headroom
            && (self.buffer_size as u64) < records_per_tick
        {
            log::warn!(
                "The channel ({} records) cannot hold one tick ({records_per_tick} records): every tick will be skipped",
                self.buffer_size
            );
        }
        Ok(())
    }

    pub fn get_tick_interval(&self) -> Result<Duration, ConfigError> {
        if self.ticks_per_second == 0 {
            return Err(ConfigError::NoTick);
        }
        let interval_ms = 1000 / self.ticks_per_second;
        if interval_ms == 0 {
            return Err(ConfigError::TickTooShort(self.ticks_per_second));
        }
        Ok(Duration::from_millis(interval_ms))
    }

    pub fn get_flows_per_tick(&self) -> u64 {
        self.flows_per_second / self.ticks_per_second.max(1)
    }

    /// Flow pairs created by each simulator at each tick
    pub fn get_flows_per_tick_per_simulator(&self) -> u64 {
        self.get_flows_per_tick() / (self.simulators.max(1) as u64)
    }

    pub fn get_ipfix_options(&self) -> IpfixOptions {
        IpfixOptions {
            observation_domain_id: self.observation_domain_id,
            template_refresh: Duration::from_secs(self.template_refresh_secs),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_empty() {
        let config = Configuration::import_from_str("").unwrap();
        config.validate().unwrap();
        assert_eq!(config.get_tick_interval().unwrap(), Duration::from_millis(100));
        assert_eq!(config.get_flows_per_tick(), 100);
        assert_eq!(config.get_flows_per_tick_per_simulator(), 12);
        assert_eq!(config.backpressure, BackpressurePolicy::Headroom);
    }

    #[test]
    fn test_config_complete() {
        let config = Configuration::import_from_str(
            r#"
collector = "10.0.0.1:9001" # Where the IPFIX messages are sent
flows_per_second = 20000
ticks_per_second = 20
simulators = 2
workers = 4
buffer_size = 10000
max_message_size = 60000
observation_domain_id = 7
template_refresh_secs = 30
seed = 42
src_network = "10.1.0.0/16"
dst_network = "192.168.0.0/24"
backpressure = { policy = "fill-ratio", threshold = 0.5 }
duration = { mean = 1000.0, std_dev = 10.0 }
latency = { mean = 20.0, std_dev = 5.0 }
"#,
        )
        .unwrap();
        config.validate().unwrap();
        assert_eq!(config.collector, "10.0.0.1:9001".parse().unwrap());
        assert_eq!(config.get_tick_interval().unwrap(), Duration::from_millis(50));
        assert_eq!(config.get_flows_per_tick_per_simulator(), 500);
        assert_eq!(
            config.backpressure,
            BackpressurePolicy::FillRatio { threshold: 0.5 }
        );
        assert_eq!(config.seed, Some(42));
        let options = config.get_ipfix_options();
        assert_eq!(options.observation_domain_id, 7);
        assert_eq!(options.template_refresh, Duration::from_secs(30));
    }

    #[test]
    fn test_config_unknown_field() {
        assert!(matches!(
            Configuration::import_from_str("flows_per_hour = 3"),
            Err(ConfigError::Toml(_))
        ));
    }

    #[test]
    fn test_config_rejected() {
        let config = Configuration {
            ticks_per_second: 0,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::NoTick)));

        let config = Configuration {
            ticks_per_second: 2000,
            flows_per_second: 1_000_000,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::TickTooShort(2000))));

        let config = Configuration {
            flows_per_second: 50,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::TooManySimulators {
                simulators: 8,
                flows_per_tick: 5
            })
        ));

        let config = Configuration {
            flows_per_second: 50,
            simulators: 1,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::TooManyWorkers { workers: 8, .. })
        ));

        let config = Configuration {
            workers: 0,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::Empty(_))));

        let config = Configuration {
            max_message_size: 65500,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::MessageSize { .. })));

        let config = Configuration {
            src_network: "10.0.0.0/33".to_string(),
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::Network { .. })));

        let config = Configuration {
            backpressure: BackpressurePolicy::FillRatio { threshold: 1.5 },
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::Threshold(_))));

        let config = Configuration {
            latency: NormalParams {
                mean: 100.,
                std_dev: -1.,
            },
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Distribution { name: "latency", .. })
        ));
    }

    #[test]
    fn test_address_space() {
        let space = AddressSpace::parse("10.20.30.40/16").unwrap();
        assert_eq!(space.network, Ipv4Addr::new(10, 20, 0, 0));
        assert_eq!(space.mask, Ipv4Addr::new(255, 255, 0, 0));
        assert_eq!(AddressSpace::parse("0.0.0.0/0").unwrap(), AddressSpace::default());
    }
}
