//! Tracing configuration.
//!
//! All settings have code-level defaults, can be overridden with the
//! builder, and (for deployments that prefer it) with `CLOUDTRACE_*`
//! environment variables via [`TracingConfigBuilder::from_env`].

use crate::reporter::OverflowPolicy;
use crate::sampler::Sampler;
use std::str::FromStr;
use std::time::Duration;

/// Local service name override.
pub const ENV_SERVICE_NAME: &str = "CLOUDTRACE_SERVICE_NAME";
/// Maximum spans per exported batch.
pub const ENV_BATCH_SIZE: &str = "CLOUDTRACE_BATCH_SIZE";
/// Delay interval between two consecutive exports, in milliseconds.
pub const ENV_FLUSH_INTERVAL: &str = "CLOUDTRACE_FLUSH_INTERVAL";
/// Maximum queue size before spans are dropped.
pub const ENV_QUEUE_CAPACITY: &str = "CLOUDTRACE_QUEUE_CAPACITY";
/// Maximum time to wait for flush and shutdown, in milliseconds.
pub const ENV_SHUTDOWN_TIMEOUT: &str = "CLOUDTRACE_SHUTDOWN_TIMEOUT";
/// Probability in `[0.0, 1.0]` that a new trace is sampled.
pub const ENV_SAMPLING_RATE: &str = "CLOUDTRACE_SAMPLING_RATE";

const DEFAULT_SERVICE_NAME: &str = "unknown-service";
const DEFAULT_BATCH_SIZE: usize = 512;
const DEFAULT_QUEUE_CAPACITY: usize = 2048;
const DEFAULT_FLUSH_INTERVAL: Duration = Duration::from_secs(1);
const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// Assembled tracing settings, consumed by [`Tracing::builder`].
///
/// [`Tracing::builder`]: crate::Tracing::builder
#[derive(Clone, Debug, PartialEq)]
pub struct TracingConfig {
    pub(crate) service_name: String,
    pub(crate) sampling_policy: Sampler,
    pub(crate) batch_size: usize,
    pub(crate) queue_capacity: usize,
    pub(crate) flush_interval: Duration,
    pub(crate) shutdown_timeout: Duration,
    pub(crate) overflow_policy: OverflowPolicy,
    pub(crate) extra_propagation_keys: Vec<String>,
}

impl Default for TracingConfig {
    fn default() -> Self {
        TracingConfigBuilder::default().build()
    }
}

impl TracingConfig {
    pub fn builder() -> TracingConfigBuilder {
        TracingConfigBuilder::default()
    }

    pub fn service_name(&self) -> &str {
        &self.service_name
    }

    pub fn sampling_policy(&self) -> &Sampler {
        &self.sampling_policy
    }
}

#[derive(Clone, Debug)]
pub struct TracingConfigBuilder {
    service_name: String,
    sampling_policy: Sampler,
    batch_size: usize,
    queue_capacity: usize,
    flush_interval: Duration,
    shutdown_timeout: Duration,
    overflow_policy: OverflowPolicy,
    extra_propagation_keys: Vec<String>,
}

impl Default for TracingConfigBuilder {
    fn default() -> Self {
        TracingConfigBuilder {
            service_name: DEFAULT_SERVICE_NAME.to_owned(),
            sampling_policy: Sampler::AlwaysOn,
            batch_size: DEFAULT_BATCH_SIZE,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            flush_interval: DEFAULT_FLUSH_INTERVAL,
            shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
            overflow_policy: OverflowPolicy::default(),
            extra_propagation_keys: Vec::new(),
        }
    }
}

impl TracingConfigBuilder {
    /// Apply `CLOUDTRACE_*` environment overrides on top of the current
    /// values. Unparsable values are logged and ignored.
    pub fn from_env(mut self) -> Self {
        if let Some(name) = read_env::<String>(ENV_SERVICE_NAME) {
            self.service_name = name;
        }
        if let Some(size) = read_env::<usize>(ENV_BATCH_SIZE) {
            self.batch_size = size.max(1);
        }
        if let Some(capacity) = read_env::<usize>(ENV_QUEUE_CAPACITY) {
            self.queue_capacity = capacity.max(1);
        }
        if let Some(millis) = read_env::<u64>(ENV_FLUSH_INTERVAL) {
            self.flush_interval = Duration::from_millis(millis);
        }
        if let Some(millis) = read_env::<u64>(ENV_SHUTDOWN_TIMEOUT) {
            self.shutdown_timeout = Duration::from_millis(millis);
        }
        if let Some(rate) = read_env::<f64>(ENV_SAMPLING_RATE) {
            self.sampling_policy = sampler_for_rate(rate);
        }
        self
    }

    pub fn with_service_name<T: Into<String>>(mut self, name: T) -> Self {
        self.service_name = name.into();
        self
    }

    pub fn with_sampling_policy(mut self, sampler: Sampler) -> Self {
        self.sampling_policy = sampler;
        self
    }

    pub fn with_batch_size(mut self, size: usize) -> Self {
        self.batch_size = size.max(1);
        self
    }

    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity.max(1);
        self
    }

    pub fn with_flush_interval(mut self, interval: Duration) -> Self {
        self.flush_interval = interval;
        self
    }

    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    pub fn with_overflow_policy(mut self, policy: OverflowPolicy) -> Self {
        self.overflow_policy = policy;
        self
    }

    /// Extra headers carried through propagation alongside the trace
    /// identifiers, for example a caller identity header.
    pub fn with_extra_propagation_keys<I, T>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        self.extra_propagation_keys = keys.into_iter().map(Into::into).collect();
        self
    }

    pub fn build(self) -> TracingConfig {
        TracingConfig {
            service_name: self.service_name,
            sampling_policy: self.sampling_policy,
            // A batch larger than the queue can never fill.
            batch_size: self.batch_size.min(self.queue_capacity),
            queue_capacity: self.queue_capacity,
            flush_interval: self.flush_interval,
            shutdown_timeout: self.shutdown_timeout,
            overflow_policy: self.overflow_policy,
            extra_propagation_keys: self.extra_propagation_keys,
        }
    }
}

fn sampler_for_rate(rate: f64) -> Sampler {
    if rate >= 1.0 {
        Sampler::AlwaysOn
    } else if rate <= 0.0 {
        Sampler::AlwaysOff
    } else {
        Sampler::TraceIdRatioBased(rate)
    }
}

fn read_env<T: FromStr>(name: &str) -> Option<T> {
    let value = std::env::var(name).ok()?;
    match value.parse::<T>() {
        Ok(parsed) => Some(parsed),
        Err(_) => {
            tracing::warn!(
                name: "TracingConfig.InvalidEnvValue",
                variable = name,
                value = value,
                message = "ignoring unparsable environment override"
            );
            None
        }
    }
}
