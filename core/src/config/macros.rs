/// Declare a `pub const` [ConfigEntry](crate::config::ConfigEntry).
///
/// `default` and `validate` are optional, but must appear in that order.
#[macro_export]
macro_rules! cellflow_config {
    ($name:ident, key = $key:literal, type = $t:ty, default = $default:expr, validate = |$v:ident| $validate:expr, doc = $doc:literal, version = $version:literal) => {
        #[doc = "config key: `"]
        #[doc = $key]
        #[doc = "`\n# Description\n"]
        #[doc = $doc]
        #[doc = "\n# Since\n version "]
        #[doc = $version]
        pub const $name: $crate::config::ConfigEntry<$t> = {
            fn default_value() -> <$t as $crate::config::ConfigValueType>::Value {
                $default
            }
            fn validate_value($v: &<$t as $crate::config::ConfigValueType>::Value) -> bool {
                $validate
            }
            $crate::config::ConfigEntry {
                key: $key,
                doc: $doc,
                version: $version,
                value_type: ::std::marker::PhantomData,
                default: Some(default_value),
                validate: Some(validate_value),
            }
        };
    };
    ($name:ident, key = $key:literal, type = $t:ty, default = $default:expr, doc = $doc:literal, version = $version:literal) => {
        #[doc = "config key: `"]
        #[doc = $key]
        #[doc = "`\n# Description\n"]
        #[doc = $doc]
        #[doc = "\n# Since\n version "]
        #[doc = $version]
        pub const $name: $crate::config::ConfigEntry<$t> = {
            fn default_value() -> <$t as $crate::config::ConfigValueType>::Value {
                $default
            }
            $crate::config::ConfigEntry {
                key: $key,
                doc: $doc,
                version: $version,
                value_type: ::std::marker::PhantomData,
                default: Some(default_value),
                validate: None,
            }
        };
    };
    ($name:ident, key = $key:literal, type = $t:ty, doc = $doc:literal, version = $version:literal) => {
        #[doc = "config key: `"]
        #[doc = $key]
        #[doc = "`\n# Description\n"]
        #[doc = $doc]
        #[doc = "\n# Since\n version "]
        #[doc = $version]
        pub const $name: $crate::config::ConfigEntry<$t> = $crate::config::ConfigEntry {
            key: $key,
            doc: $doc,
            version: $version,
            value_type: ::std::marker::PhantomData,
            default: None,
            validate: None,
        };
    };
}
