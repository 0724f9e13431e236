//! Correlation engine configuration.

use std::time::Duration;

/// Channel capacities and timing for the engine loop.
///
/// All three channels are bounded: a full queue briefly blocks its
/// producer, which is the system's only backpressure mechanism.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Capacity of the front-door envelope channel.
    pub feed_capacity: usize,
    /// Capacity of the outbound work-frame channel to the bridge.
    pub outbound_capacity: usize,
    /// Capacity of the inbound result channel from the bridge.
    pub result_capacity: usize,
    /// Interval between idle liveness logs when no events arrive.
    pub idle_period: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            feed_capacity: 100,
            outbound_capacity: 100,
            result_capacity: 100,
            idle_period: Duration::from_secs(5),
        }
    }
}
