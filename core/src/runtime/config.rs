use super::*;

use crate::config::{ConfigEntry, ConfigValueType, HoconExt};
use hocon::{Hocon, HoconLoader};
use std::{fmt, path::PathBuf, time::Duration};

/// Configuration keys for cellflow runtimes.
pub mod keys {
    use super::*;
    use crate::config::*;

    crate::cellflow_config! {
        LABEL,
        key = "cellflow.runtime.label",
        type = StringValue,
        default = default_runtime_label(),
        doc = r#"The runtime label.

Used as metadata for logging output.

# Default

The default value is `cellflow-runtime-` followed by a unique number (for this process).
    "#,
        version = "0.1"
    }

    crate::cellflow_config! {
        FAST_DELAY,
        key = "cellflow.scheduler.fast-delay-ms",
        type = MillisValue,
        default = Duration::from_millis(1),
        doc = r#"The delay between two ticks while the graph is busy.

# Default

The default value is 1ms.
    "#,
        version = "0.1"
    }

    crate::cellflow_config! {
        SLOW_DELAY,
        key = "cellflow.scheduler.slow-delay-ms",
        type = MillisValue,
        default = Duration::from_millis(50),
        doc = r#"The delay between two ticks once the graph has been idle for a while.

# Legal Values

Values must not be smaller than [FAST_DELAY](FAST_DELAY).

# Default

The default value is 50ms.
    "#,
        version = "0.1"
    }

    crate::cellflow_config! {
        IDLE_THRESHOLD,
        key = "cellflow.scheduler.idle-threshold",
        type = UsizeValue,
        default = 20,
        validate = |value| *value > 0,
        doc = r#"The number of consecutive idle ticks after which the scheduler switches to the slow delay.

Any tick that delivers messages switches back to the fast delay.

# Legal Values

Values must be `> 0`.

# Default

The default value is 20.
    "#,
        version = "0.1"
    }

    crate::cellflow_config! {
        MIN_REQUEST_TIMEOUT,
        key = "cellflow.requests.min-timeout-ms",
        type = MillisValue,
        default = Duration::from_millis(10),
        doc = r#"The smallest timeout a request can have.

Shorter timeouts are raised to this value.
Timeouts are only checked on idle ticks, so they are never exact.

# Default

The default value is 10ms.
    "#,
        version = "0.1"
    }
}

#[derive(Debug, Clone)]
pub(crate) enum ConfigSource {
    File(PathBuf),
    Str(String),
}

/// A configuration builder for cellflow runtimes.
///
/// Values set explicitly with the setters take precedence over values loaded
/// from HOCON sources, which in turn take precedence over the defaults.
///
/// # Example
///
/// Set a custom label, and switch to the slow tick delay after 5 idle ticks:
///
/// ```
/// use cellflow::prelude::*;
///
/// let mut conf = RuntimeConfig::new();
/// conf.label("My special runtime")
///     .load_config_str("cellflow.scheduler.idle-threshold = 5");
/// let settings = conf.resolve().expect("settings");
/// assert_eq!(5, settings.idle_threshold);
/// ```
#[derive(Clone, Default)]
pub struct RuntimeConfig {
    label: Option<String>,
    fast_delay: Option<Duration>,
    slow_delay: Option<Duration>,
    idle_threshold: Option<usize>,
    min_request_timeout: Option<Duration>,
    root_logger: Option<CellflowLogger>,
    config_sources: Vec<ConfigSource>,
}

impl fmt::Debug for RuntimeConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "RuntimeConfig{{
            label={:?},
            fast_delay={:?},
            slow_delay={:?},
            idle_threshold={:?},
            min_request_timeout={:?},
            logger={},
            config_sources={:?}
        }}",
            self.label,
            self.fast_delay,
            self.slow_delay,
            self.idle_threshold,
            self.min_request_timeout,
            if self.root_logger.is_some() { "<custom>" } else { "<default>" },
            self.config_sources,
        )
    }
}

impl RuntimeConfig {
    /// Create a new config with all values at their defaults.
    pub fn new() -> RuntimeConfig {
        RuntimeConfig::default()
    }

    /// Set the runtime's label.
    ///
    /// The label is used as metadata for logging output.
    pub fn label<I>(&mut self, s: I) -> &mut Self
    where
        I: Into<String>,
    {
        self.label = Some(s.into());
        self
    }

    /// Set the delay between ticks while the graph is busy.
    pub fn fast_delay(&mut self, delay: Duration) -> &mut Self {
        self.fast_delay = Some(delay);
        self
    }

    /// Set the delay between ticks once the graph has been idle for a while.
    pub fn slow_delay(&mut self, delay: Duration) -> &mut Self {
        self.slow_delay = Some(delay);
        self
    }

    /// Set the number of idle ticks after which the slow delay is used.
    pub fn idle_threshold(&mut self, ticks: usize) -> &mut Self {
        self.idle_threshold = Some(ticks);
        self
    }

    /// Set the smallest timeout a request can have.
    pub fn min_request_timeout(&mut self, timeout: Duration) -> &mut Self {
        self.min_request_timeout = Some(timeout);
        self
    }

    /// Set the root logger to use instead of the default one.
    pub fn logger(&mut self, logger: CellflowLogger) -> &mut Self {
        self.root_logger = Some(logger);
        self
    }

    /// Load a HOCON config from a file at `path`
    ///
    /// This method can be called multiple times, and the resulting configurations will be merged.
    ///
    /// It matters in which order configs are loaded and values are set.
    /// See [HoconLoader](hocon::HoconLoader) for more information.
    pub fn load_config_file<P>(&mut self, path: P) -> &mut Self
    where
        P: Into<PathBuf>,
    {
        let p: PathBuf = path.into();
        self.config_sources.push(ConfigSource::File(p));
        self
    }

    /// Load a HOCON config from a string
    ///
    /// This method can be called multiple times, and the resulting configurations will be merged.
    pub fn load_config_str<S>(&mut self, config: S) -> &mut Self
    where
        S: Into<String>,
    {
        let s: String = config.into();
        self.config_sources.push(ConfigSource::Str(s));
        self
    }

    /// Override a single value in the HOCON config
    pub fn set_config_value<T>(
        &mut self,
        config: &ConfigEntry<T>,
        value: <T as ConfigValueType>::Value,
    ) -> &mut Self
    where
        T: ConfigValueType,
    {
        let value_string = <T as ConfigValueType>::config_string(value);
        self.config_sources.push(ConfigSource::Str(format!(
            "{} = {}",
            config.key, value_string
        )));
        self
    }

    fn load_hocon(&self) -> Result<Hocon, ConfigError> {
        let loader = self
            .config_sources
            .iter()
            .try_fold(HoconLoader::new(), |loader, source| match source {
                ConfigSource::File(path) => loader.load_file(path),
                ConfigSource::Str(s) => loader.load_str(s),
            })?;
        Ok(loader.hocon()?)
    }

    /// Load all config sources and combine them with the explicit settings.
    pub fn resolve(&self) -> Result<RuntimeSettings, ConfigError> {
        let conf = self.load_hocon()?;
        let label = match self.label {
            Some(ref label) => label.clone(),
            None => conf.get_or_default(&keys::LABEL)?,
        };
        let fast_delay = match self.fast_delay {
            Some(delay) => delay,
            None => conf.get_or_default(&keys::FAST_DELAY)?,
        };
        let slow_delay = match self.slow_delay {
            Some(delay) => delay,
            None => conf.get_or_default(&keys::SLOW_DELAY)?,
        };
        let idle_threshold = match self.idle_threshold {
            Some(ticks) => keys::IDLE_THRESHOLD.check(ticks)?,
            None => conf.get_or_default(&keys::IDLE_THRESHOLD)?,
        };
        let min_request_timeout = match self.min_request_timeout {
            Some(timeout) => timeout,
            None => conf.get_or_default(&keys::MIN_REQUEST_TIMEOUT)?,
        };
        if slow_delay < fast_delay {
            return Err(ConfigError::InvalidValue(format!(
                "{} ({}ms) must not be smaller than {} ({}ms)",
                keys::SLOW_DELAY.key,
                slow_delay.as_millis(),
                keys::FAST_DELAY.key,
                fast_delay.as_millis()
            )));
        }
        let root = self
            .root_logger
            .clone()
            .unwrap_or_else(|| default_logger().clone());
        let logger = root.new(o!("runtime" => label.clone()));
        Ok(RuntimeSettings {
            label,
            fast_delay,
            slow_delay,
            idle_threshold,
            min_request_timeout,
            logger,
            config: conf,
        })
    }
}

/// A resolved [RuntimeConfig].
#[derive(Clone)]
pub struct RuntimeSettings {
    /// The runtime label.
    pub label: String,
    /// The tick delay while busy.
    pub fast_delay: Duration,
    /// The tick delay while idle.
    pub slow_delay: Duration,
    /// Idle ticks before switching to the slow delay.
    pub idle_threshold: usize,
    /// The floor for request timeouts.
    pub min_request_timeout: Duration,
    /// The runtime's logger.
    pub logger: CellflowLogger,
    /// The merged HOCON config.
    pub config: Hocon,
}

impl fmt::Debug for RuntimeSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RuntimeSettings")
            .field("label", &self.label)
            .field("fast_delay", &self.fast_delay)
            .field("slow_delay", &self.slow_delay)
            .field("idle_threshold", &self.idle_threshold)
            .field("min_request_timeout", &self.min_request_timeout)
            .finish()
    }
}
