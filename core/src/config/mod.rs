//! Typed access to HOCON configuration values.
//!
//! Every configurable value of the runtime is described by a [ConfigEntry],
//! which knows its key, how to convert the raw HOCON value, what the default is,
//! and which values are legal. Entries are declared with the `cellflow_config!` macro.

use hocon::Hocon;
use std::{error::Error, fmt, marker::PhantomData, num::TryFromIntError};

#[macro_use]
mod macros;
mod values;

pub use values::*;

const PATH_SEP: char = '.';

/// Description of a configuration parameter that can be set via HOCON config.
pub struct ConfigEntry<T>
where
    T: ConfigValueType,
{
    /// The full dotted key to read this config value from a HOCON config.
    pub key: &'static str,
    /// Documentation for this config entry.
    pub doc: &'static str,
    /// The crate version in which the value was introduced.
    pub version: &'static str,
    /// Type information of this config value.
    ///
    /// Used for converting the raw config value into a runtime type.
    pub value_type: PhantomData<T>,
    /// The default value for this config entry.
    ///
    /// Used if no value is specified in the HOCON config.
    pub default: Option<fn() -> T::Value>,
    /// Checks whether a converted value is legal for this entry.
    pub validate: Option<fn(&T::Value) -> bool>,
}

impl<T> ConfigEntry<T>
where
    T: ConfigValueType,
{
    /// Returns all the path segments for the full path of this key, root first.
    pub fn path_segments(&self) -> Vec<&'static str> {
        self.key.split(PATH_SEP).collect()
    }

    /// Select the entry corresponding to this key from the given config.
    pub fn select<'a>(&self, conf: &'a Hocon) -> &'a Hocon {
        self.path_segments()
            .into_iter()
            .fold(conf, |hocon, segment| &hocon[segment])
    }

    /// Read the value for this key from the given config.
    ///
    /// Falls back to the default, if there is one and the key is absent.
    pub fn read(&self, conf: &Hocon) -> Result<T::Value, ConfigError> {
        match self.select(conf) {
            Hocon::BadValue(error) => self.default.map(|d| d()).ok_or_else(|| error.clone().into()),
            Hocon::Null => self
                .default
                .map(|d| d())
                .ok_or_else(|| ConfigError::expected::<T::Value>(&Hocon::Null)),
            hocon => {
                let value = T::from_conf(hocon)?;
                self.check(value)
            }
        }
    }

    /// Ensure `value` passes this entry's validation.
    pub fn check(&self, value: T::Value) -> Result<T::Value, ConfigError> {
        match self.validate {
            Some(validate) if !validate(&value) => Err(ConfigError::InvalidValue(format!(
                "{} is not a legal value for {}",
                T::config_string(value),
                self.key
            ))),
            _ => Ok(value),
        }
    }
}

/// Convenience lookups of [ConfigEntry] values on a [Hocon] instance.
pub trait HoconExt {
    /// Read `entry`, falling back to its default if the key is absent.
    fn get_or_default<T>(&self, entry: &ConfigEntry<T>) -> Result<T::Value, ConfigError>
    where
        T: ConfigValueType;
}

impl HoconExt for Hocon {
    fn get_or_default<T>(&self, entry: &ConfigEntry<T>) -> Result<T::Value, ConfigError>
    where
        T: ConfigValueType,
    {
        entry.read(self)
    }
}

/// A value extractor for config values
pub trait ConfigValueType {
    /// The type of the value extracted by this type.
    type Value;

    /// Extract the value from a config instance.
    fn from_conf(conf: &Hocon) -> Result<Self::Value, ConfigError>;

    /// Render `value` as a HOCON literal.
    fn config_string(value: Self::Value) -> String;
}

/// Errors that occur during config lookup.
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigError {
    /// Type conversion failed.
    ConversionError(String),
    /// The value was converted, but is not legal for its key.
    InvalidValue(String),
    /// Path traversal failed.
    PathError(hocon::Error),
}
impl ConfigError {
    pub(crate) fn expected<T>(conf: &Hocon) -> Self {
        let descr = format!(
            "Expected {} config value, but got {:?}",
            std::any::type_name::<T>(),
            conf
        );
        ConfigError::ConversionError(descr)
    }
}
impl From<hocon::Error> for ConfigError {
    fn from(error: hocon::Error) -> Self {
        ConfigError::PathError(error)
    }
}
impl From<TryFromIntError> for ConfigError {
    fn from(error: TryFromIntError) -> Self {
        ConfigError::ConversionError(error.to_string())
    }
}
impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::ConversionError(description) => {
                write!(f, "Error during type conversion: {}", description)
            }
            ConfigError::InvalidValue(description) => write!(f, "Invalid value: {}", description),
            ConfigError::PathError(error) => write!(f, "Error during path traversal: {}", error),
        }
    }
}
impl Error for ConfigError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            ConfigError::ConversionError(_) | ConfigError::InvalidValue(_) => None,
            ConfigError::PathError(error) => Some(error),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hocon::HoconLoader;
    use std::time::Duration;

    cellflow_config! {
        SIMPLE_KEY,
        key = "cellflow.test.my-test-key",
        type = StringValue,
        doc = "This a simple test key for String value.",
        version = "0.1"
    }

    cellflow_config! {
        POSITIVE_KEY,
        key = "cellflow.test.positive",
        type = UsizeValue,
        default = 7,
        validate = |value| *value > 0,
        doc = "A number that must not be zero.",
        version = "0.1"
    }

    cellflow_config! {
        DELAY_KEY,
        key = "cellflow.test.delay",
        type = MillisValue,
        default = Duration::from_millis(5),
        doc = "A delay.",
        version = "0.1"
    }

    const EXAMPLE_CONFIG: &str = r#"
    cellflow {
        test {
            my-test-key: "testme",
            positive: 3,
            delay: 250
        }
    }
    "#;

    fn load(s: &str) -> Hocon {
        HoconLoader::new()
            .load_str(s)
            .expect("config")
            .hocon()
            .expect("config")
    }

    #[test]
    fn simple_config_key() {
        assert_eq!(
            vec!["cellflow", "test", "my-test-key"],
            SIMPLE_KEY.path_segments()
        );
        let conf = load(EXAMPLE_CONFIG);
        assert_eq!("testme", SIMPLE_KEY.read(&conf).expect("String"));
        assert_eq!(3, conf.get_or_default(&POSITIVE_KEY).expect("usize"));
        assert_eq!(
            Duration::from_millis(250),
            conf.get_or_default(&DELAY_KEY).expect("duration")
        );
    }

    #[test]
    fn missing_keys_use_defaults() {
        let conf = load("other { key: 1 }");
        assert_eq!(7, POSITIVE_KEY.read(&conf).expect("default"));
        assert_eq!(
            Duration::from_millis(5),
            DELAY_KEY.read(&conf).expect("default")
        );
        assert!(matches!(
            SIMPLE_KEY.read(&conf),
            Err(ConfigError::PathError(_))
        ));
    }

    #[test]
    fn validation_and_conversion_failures() {
        let conf = load("cellflow.test.positive = 0");
        assert!(matches!(
            POSITIVE_KEY.read(&conf),
            Err(ConfigError::InvalidValue(_))
        ));

        let conf = load("cellflow.test.positive = -2");
        assert!(matches!(
            POSITIVE_KEY.read(&conf),
            Err(ConfigError::ConversionError(_))
        ));

        let conf = load(r#"cellflow.test.positive = "many""#);
        assert!(matches!(
            POSITIVE_KEY.read(&conf),
            Err(ConfigError::ConversionError(_))
        ));
    }
}
