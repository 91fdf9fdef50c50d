use std::time::Duration;

use rand::Rng;
use serde::Deserialize;

/// How read requests are spread across the nodes of a topology.
#[derive(Clone, Copy, Debug, Default, Deserialize, PartialEq, Eq)]
pub enum ReadBalanceBehavior {
    /// Reads go to the first healthy node, like writes.
    None,
    /// Reads go to the node picked by the session id.
    RoundRobin,
    /// Reads go to the node that answered the last speed test fastest.
    #[default]
    FastestNode,
}

/// Spacing between two attempts of the same logical request on different nodes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RetryBackoff {
    /// Move on to the next node immediately.
    None,
    Fixed(Duration),
    /// Doubles per attempt from `initial` up to `max`, with up to 50% jitter added.
    Exponential { initial: Duration, max: Duration },
}

impl RetryBackoff {
    /// Delay to wait before `attempt` (1-based). The first attempt never waits.
    pub fn delay_before(&self, attempt: usize) -> Duration {
        if attempt <= 1 {
            return Duration::ZERO;
        }
        match *self {
            RetryBackoff::None => Duration::ZERO,
            RetryBackoff::Fixed(delay) => delay,
            RetryBackoff::Exponential { initial, max } => {
                let exponent = (attempt - 2).min(16) as u32;
                let base = initial.saturating_mul(2u32.pow(exponent)).min(max);
                let jitter = base.mul_f64(rand::thread_rng().gen_range(0.0..0.5));
                (base + jitter).min(max)
            }
        }
    }
}

/// Shortest period accepted for the background timers.
pub const MIN_TIMER_INTERVAL: Duration = Duration::from_secs(1);

/// Configuration bundle handed to the request executors. Read-only once an executor is built.
#[derive(Clone, Debug)]
pub struct DocumentConventions {
    aggressive_cache_duration: Option<Duration>,
    disable_topology_updates: bool,
    max_http_cache_entries: usize,
    probe_timeout: Duration,
    read_balance_behavior: ReadBalanceBehavior,
    request_timeout: Duration,
    retry_backoff: RetryBackoff,
    send_application_identifier: bool,
    speed_test_interval: Duration,
    topology_failure_backoff: Duration,
    topology_lock_timeout: Duration,
    topology_refresh_interval: Duration,
}

impl Default for DocumentConventions {
    fn default() -> Self {
        Self {
            aggressive_cache_duration: None,
            disable_topology_updates: false,
            max_http_cache_entries: 4096,
            probe_timeout: Duration::from_secs(2),
            read_balance_behavior: ReadBalanceBehavior::default(),
            request_timeout: Duration::from_secs(30),
            retry_backoff: RetryBackoff::Exponential {
                initial: Duration::from_millis(50),
                max: Duration::from_secs(1),
            },
            send_application_identifier: true,
            speed_test_interval: Duration::from_secs(60),
            topology_failure_backoff: Duration::from_secs(1),
            topology_lock_timeout: Duration::from_secs(30),
            topology_refresh_interval: Duration::from_secs(5 * 60),
        }
    }
}

// Mutators
impl DocumentConventions {
    pub fn default_for_single_server() -> Self {
        Self {
            disable_topology_updates: true,
            read_balance_behavior: ReadBalanceBehavior::None,
            ..Default::default()
        }
    }

    /// Serves cacheable reads straight from the cache while the entry is younger than `duration`.
    pub fn set_aggressive_cache_duration(mut self, duration: Option<Duration>) -> Self {
        self.aggressive_cache_duration = duration;
        self
    }

    pub fn set_disable_topology_updates(mut self, disable: bool) -> Self {
        self.disable_topology_updates = disable;
        self
    }

    pub fn set_max_http_cache_entries(mut self, entries: usize) -> Self {
        self.max_http_cache_entries = entries;
        self
    }

    pub fn set_probe_timeout(mut self, timeout: Duration) -> Self {
        self.probe_timeout = timeout;
        self
    }

    pub fn set_read_balance_behavior(mut self, behavior: ReadBalanceBehavior) -> Self {
        self.read_balance_behavior = behavior;
        self
    }

    pub fn set_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn set_retry_backoff(mut self, backoff: RetryBackoff) -> Self {
        self.retry_backoff = backoff;
        self
    }

    pub fn set_send_application_identifier(mut self, send: bool) -> Self {
        self.send_application_identifier = send;
        self
    }

    /// Raised to [`MIN_TIMER_INTERVAL`] if shorter.
    pub fn set_speed_test_interval(mut self, interval: Duration) -> Self {
        self.speed_test_interval = interval.max(MIN_TIMER_INTERVAL);
        self
    }

    /// After a topology refresh failed on every node, requests stop triggering new refreshes
    /// for this long and run on the topology they have.
    pub fn set_topology_failure_backoff(mut self, backoff: Duration) -> Self {
        self.topology_failure_backoff = backoff;
        self
    }

    pub fn set_topology_lock_timeout(mut self, timeout: Duration) -> Self {
        self.topology_lock_timeout = timeout;
        self
    }

    /// Raised to [`MIN_TIMER_INTERVAL`] if shorter.
    pub fn set_topology_refresh_interval(mut self, interval: Duration) -> Self {
        self.topology_refresh_interval = interval.max(MIN_TIMER_INTERVAL);
        self
    }
}

// Getters
impl DocumentConventions {
    pub fn aggressive_cache_duration(&self) -> Option<Duration> {
        self.aggressive_cache_duration
    }

    pub fn disable_topology_updates(&self) -> bool {
        self.disable_topology_updates
    }

    pub fn max_http_cache_entries(&self) -> usize {
        self.max_http_cache_entries
    }

    pub fn probe_timeout(&self) -> Duration {
        self.probe_timeout
    }

    pub fn read_balance_behavior(&self) -> ReadBalanceBehavior {
        self.read_balance_behavior
    }

    pub fn request_timeout(&self) -> Duration {
        self.request_timeout
    }

    pub fn retry_backoff(&self) -> RetryBackoff {
        self.retry_backoff
    }

    pub fn send_application_identifier(&self) -> bool {
        self.send_application_identifier
    }

    pub fn speed_test_interval(&self) -> Duration {
        self.speed_test_interval
    }

    pub fn topology_failure_backoff(&self) -> Duration {
        self.topology_failure_backoff
    }

    pub fn topology_lock_timeout(&self) -> Duration {
        self.topology_lock_timeout
    }

    pub fn topology_refresh_interval(&self) -> Duration {
        self.topology_refresh_interval
    }
}
