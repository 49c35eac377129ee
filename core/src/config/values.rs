use super::*;
use std::{convert::TryInto, time::Duration};

/// Value converter for type `String`
pub struct StringValue;
impl ConfigValueType for StringValue {
    type Value = String;

    fn from_conf(conf: &Hocon) -> Result<Self::Value, ConfigError> {
        conf.as_string()
            .ok_or_else(|| ConfigError::expected::<Self::Value>(conf))
    }

    fn config_string(value: Self::Value) -> String {
        format!(r#""{}""#, value)
    }
}

/// Value converter for type `usize`
pub struct UsizeValue;
impl ConfigValueType for UsizeValue {
    type Value = usize;

    fn from_conf(conf: &Hocon) -> Result<Self::Value, ConfigError> {
        let res = conf
            .as_i64()
            .ok_or_else(|| ConfigError::expected::<Self::Value>(conf))?;
        let ures: usize = res.try_into()?;
        Ok(ures)
    }

    fn config_string(value: Self::Value) -> String {
        format!("{}", value)
    }
}

/// Value converter for [Duration](std::time::Duration) given in milliseconds
///
/// Plain integers are read as milliseconds,
/// anything else must be a HOCON duration such as `"2s"`.
pub struct MillisValue;
impl ConfigValueType for MillisValue {
    type Value = Duration;

    fn from_conf(conf: &Hocon) -> Result<Self::Value, ConfigError> {
        match conf.as_i64() {
            Some(ms) => {
                let ms: u64 = ms.try_into()?;
                Ok(Duration::from_millis(ms))
            }
            None => conf
                .as_duration()
                .ok_or_else(|| ConfigError::expected::<Self::Value>(conf)),
        }
    }

    fn config_string(value: Self::Value) -> String {
        format!("{}", value.as_millis())
    }
}
