use crate::errors::ConfigError;
use crossbeam_channel::Sender;
use serde::{Deserialize, Serialize};

/// When should a simulator give up a whole tick rather than fill the channel.
///
/// The check happens once per tick, before the first record of the tick is enqueued. A skipped
/// tick is lost: there is no retry. A rendezvous channel (capacity 0) is never checked since
/// every send waits for a worker anyway.
#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Default)]
#[serde(tag = "policy", rename_all = "kebab-case")]
pub enum BackpressurePolicy {
    /// Skip when the free space of the channel cannot hold all the records of the tick
    #[default]
    Headroom,
    /// Skip when the channel is filled at or above `threshold` of its capacity
    FillRatio {
        #[serde(default = "default_threshold")]
        threshold: f64,
    },
}

pub const DEFAULT_FILL_RATIO: f64 = 0.75;

fn default_threshold() -> f64 {
    DEFAULT_FILL_RATIO
}

impl BackpressurePolicy {
    pub fn validate(&self) -> Result<(), ConfigError> {
        match self {
            BackpressurePolicy::Headroom => Ok(()),
            BackpressurePolicy::FillRatio { threshold } => {
                if *threshold > 0. && *threshold <= 1. {
                    Ok(())
                } else {
                    Err(ConfigError::Threshold(*threshold))
                }
            }
        }
    }

    /// Whether a tick of `records` records must be skipped. `capacity` is None for an unbounded
    /// channel.
    pub fn should_skip(&self, capacity: Option<usize>, queued: usize, records: usize) -> bool {
        match capacity {
            None | Some(0) => false,
            Some(capacity) => match self {
                BackpressurePolicy::Headroom => capacity.saturating_sub(queued) < records,
                BackpressurePolicy::FillRatio { threshold } => {
                    queued as f64 >= threshold * capacity as f64
                }
            },
        }
    }

    /// Same as `should_skip`, with the current state of the channel
    pub fn should_skip_channel<T>(&self, tx: &Sender<T>, records: usize) -> bool {
        self.should_skip(tx.capacity(), tx.len(), records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam_channel::{bounded, unbounded};

    #[test]
    fn headroom() {
        let policy = BackpressurePolicy::Headroom;
        // 6 pairs in a channel of 10
        assert!(policy.should_skip(Some(10), 0, 12));
        assert!(!policy.should_skip(Some(12), 0, 12));
        assert!(policy.should_skip(Some(100), 89, 12));
        assert!(!policy.should_skip(Some(100), 88, 12));
        assert!(!policy.should_skip(Some(0), 0, 1_000_000));
        assert!(!policy.should_skip(None, 1_000_000, 12));
    }

    #[test]
    fn fill_ratio() {
        let policy = BackpressurePolicy::FillRatio { threshold: 0.75 };
        assert!(!policy.should_skip(Some(100), 74, 1000));
        assert!(policy.should_skip(Some(100), 75, 1));
        assert!(!policy.should_skip(Some(0), 0, 1));
        assert!(policy.validate().is_ok());
        assert!(BackpressurePolicy::FillRatio { threshold: 0. }
            .validate()
            .is_err());
        assert!(BackpressurePolicy::FillRatio { threshold: 1. }
            .validate()
            .is_ok());
    }

    #[test]
    fn channel_state() {
        let policy = BackpressurePolicy::Headroom;
        let (tx, _rx) = bounded::<u32>(4);
        assert!(!policy.should_skip_channel(&tx, 4));
        tx.send(1).unwrap();
        assert!(policy.should_skip_channel(&tx, 4));
        assert!(!policy.should_skip_channel(&tx, 3));

        let (tx, _rx) = unbounded::<u32>();
        assert!(!policy.should_skip_channel(&tx, usize::MAX));
    }

    #[test]
    fn fill_ratio_default() {
        #[derive(serde::Deserialize)]
        struct Wrapper {
            backpressure: BackpressurePolicy,
        }
        let w: Wrapper = toml::from_str("backpressure = { policy = \"fill-ratio\" }").unwrap();
        assert_eq!(
            w.backpressure,
            BackpressurePolicy::FillRatio {
                threshold: DEFAULT_FILL_RATIO
            }
        );
        let w: Wrapper = toml::from_str("backpressure = { policy = \"headroom\" }").unwrap();
        assert_eq!(w.backpressure, BackpressurePolicy::Headroom);
    }
}
