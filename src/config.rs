//! Engine configuration.
//!
//! [`EngineConfig`] collects the tunables shared by the orchestrator and the
//! workers: the multiplexer queue bound, the two polling intervals of the
//! channel fabric, the worker slot budget, and the policy for node-internal
//! channel I/O failures. Defaults match the reference deployment; each value
//! can be overridden through the environment (see [`EngineConfig::from_env`]).

use std::time::Duration;

/// How a worker treats a node program that returns an error.
///
/// Channel-level read/write failures surface to the node program as channel
/// errors; whether a program error then taints the whole NodeGroup is a
/// deployment decision, not a fixed behavior.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum IoFailurePolicy {
    /// Log the failure and keep the group summary successful. A program that
    /// ignores a failed write can silently under-deliver.
    #[default]
    Lenient,
    /// Mark the group summary as failed when any member program errors,
    /// which aborts the application through the orchestrator.
    Escalate,
}

/// Shared tunables for one engine deployment.
#[derive(Clone, Debug)]
pub struct EngineConfig {
    /// Bounded capacity of every fan-in multiplexer queue.
    pub multiplexer_capacity: usize,
    /// Poll interval used by multiplexer reads while waiting for data.
    pub multiplexer_poll: Duration,
    /// Poll interval used while waiting for a socket address to be published.
    pub address_poll: Duration,
    /// Number of node slots a worker offers. A NodeGroup occupies one slot
    /// per member node.
    pub worker_slots: usize,
    /// Treatment of node program errors in the result summary.
    pub io_failure_policy: IoFailurePolicy,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            multiplexer_capacity: 32,
            multiplexer_poll: Duration::from_millis(250),
            address_poll: Duration::from_millis(100),
            worker_slots: usize::MAX,
            io_failure_policy: IoFailurePolicy::default(),
        }
    }
}

impl EngineConfig {
    /// Build a configuration from the environment, falling back to the
    /// defaults for anything unset or unparsable.
    ///
    /// Recognized variables:
    /// - `TIDEFLOW_MUX_CAPACITY` (usize)
    /// - `TIDEFLOW_MUX_POLL_MS` (u64, milliseconds)
    /// - `TIDEFLOW_ADDRESS_POLL_MS` (u64, milliseconds)
    /// - `TIDEFLOW_WORKER_SLOTS` (usize)
    /// - `TIDEFLOW_IO_FAILURES` (`lenient` | `escalate`)
    #[must_use]
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();
        let mut config = Self::default();

        if let Some(capacity) = read_env("TIDEFLOW_MUX_CAPACITY") {
            config.multiplexer_capacity = capacity;
        }
        if let Some(millis) = read_env("TIDEFLOW_MUX_POLL_MS") {
            config.multiplexer_poll = Duration::from_millis(millis);
        }
        if let Some(millis) = read_env("TIDEFLOW_ADDRESS_POLL_MS") {
            config.address_poll = Duration::from_millis(millis);
        }
        if let Some(slots) = read_env("TIDEFLOW_WORKER_SLOTS") {
            config.worker_slots = slots;
        }
        if let Ok(policy) = std::env::var("TIDEFLOW_IO_FAILURES") {
            match policy.to_ascii_lowercase().as_str() {
                "escalate" => config.io_failure_policy = IoFailurePolicy::Escalate,
                "lenient" => config.io_failure_policy = IoFailurePolicy::Lenient,
                other => {
                    tracing::warn!(policy = other, "unrecognized TIDEFLOW_IO_FAILURES value");
                }
            }
        }

        config
    }

    /// Override the multiplexer queue capacity.
    #[must_use]
    pub fn with_multiplexer_capacity(mut self, capacity: usize) -> Self {
        self.multiplexer_capacity = capacity;
        self
    }

    /// Override the worker slot budget.
    #[must_use]
    pub fn with_worker_slots(mut self, slots: usize) -> Self {
        self.worker_slots = slots;
        self
    }

    /// Override the I/O failure policy.
    #[must_use]
    pub fn with_io_failure_policy(mut self, policy: IoFailurePolicy) -> Self {
        self.io_failure_policy = policy;
        self
    }
}

fn read_env<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|raw| raw.parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_reference_constants() {
        let config = EngineConfig::default();
        assert_eq!(config.multiplexer_capacity, 32);
        assert_eq!(config.multiplexer_poll, Duration::from_millis(250));
        assert_eq!(config.address_poll, Duration::from_millis(100));
        assert_eq!(config.io_failure_policy, IoFailurePolicy::Lenient);
    }

    #[test]
    fn builder_overrides() {
        let config = EngineConfig::default()
            .with_multiplexer_capacity(8)
            .with_worker_slots(4)
            .with_io_failure_policy(IoFailurePolicy::Escalate);
        assert_eq!(config.multiplexer_capacity, 8);
        assert_eq!(config.worker_slots, 4);
        assert_eq!(config.io_failure_policy, IoFailurePolicy::Escalate);
    }
}
