// III-IV
// Copyright 2023 Julio Merino
//
// Licensed under the Apache License, Version 2.0 (the "License"); you may not
// use this file except in compliance with the License.  You may obtain a copy
// of the License at:
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS, WITHOUT
// WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.  See the
// License for the specific language governing permissions and limitations
// under the License.

//! Utilities to deal with environment variables.

use std::env;
use std::time::Duration;
use url::Url;

/// Result type for environment errors.
type Result<T> = std::result::Result<T, String>;

/// Wrapper around an environment variable's value to support conversions to other types.
pub struct Value(String);

impl TryFrom<Value> for String {
    type Error = String;

    fn try_from(value: Value) -> std::result::Result<Self, Self::Error> {
        Ok(value.0)
    }
}

/// Generates a `TryFrom<Value>` for a type that can be parsed by `FromStr`.
macro_rules! tryfrom_value_for_fromstr [
    ( $t:ty ) => {
        impl TryFrom<Value> for $t {
            type Error = String;

            fn try_from(value: Value) -> std::result::Result<Self, Self::Error> {
                value.0.parse::<$t>().map_err(|e| format!("Invalid {}: {}", stringify!($t), e))
            }
        }
    }
];

tryfrom_value_for_fromstr!(i8);
tryfrom_value_for_fromstr!(i16);
tryfrom_value_for_fromstr!(i32);
tryfrom_value_for_fromstr!(i64);
tryfrom_value_for_fromstr!(u8);
tryfrom_value_for_fromstr!(u16);
tryfrom_value_for_fromstr!(u32);
tryfrom_value_for_fromstr!(u64);
tryfrom_value_for_fromstr!(usize);
tryfrom_value_for_fromstr!(Url);

impl TryFrom<Value> for bool {
    type Error = String;

    fn try_from(value: Value) -> std::result::Result<Self, Self::Error> {
        match value.0.to_lowercase().as_str() {
            "1" | "true" | "yes" => Ok(true),
            "0" | "false" | "no" => Ok(false),
            _ => Err(format!("Invalid bool: {}", value.0)),
        }
    }
}

/// Parses a duration made of an integer and a unit suffix, such as `5s` or `40m`.
///
/// The supported units are `ms`, `s`, `m`, `h` and `d`.
pub fn parse_duration(s: &str) -> std::result::Result<Duration, String> {
    let pos = s
        .find(|ch: char| !ch.is_ascii_digit())
        .ok_or_else(|| format!("Missing unit in duration '{}'", s))?;
    let (number, unit) = s.split_at(pos);
    let number = number.parse::<u64>().map_err(|e| format!("Invalid duration '{}': {}", s, e))?;

    let multiplier = match unit {
        "ms" => return Ok(Duration::from_millis(number)),
        "s" => 1,
        "m" => 60,
        "h" => 60 * 60,
        "d" => 24 * 60 * 60,
        unit => return Err(format!("Unknown unit '{}' in duration '{}'", unit, s)),
    };
    number
        .checked_mul(multiplier)
        .map(Duration::from_secs)
        .ok_or_else(|| format!("Duration '{}' is too large", s))
}

impl TryFrom<Value> for Duration {
    type Error = String;

    fn try_from(value: Value) -> std::result::Result<Self, Self::Error> {
        parse_duration(&value.0).map_err(|e| format!("Invalid Duration: {}", e))
    }
}

/// Serde helpers to read `Duration`s written as strings such as `5s`, for use in configuration
/// files via `#[serde(with = "iii_iv_core::env::serde_duration")]`.
pub mod serde_duration {
    use super::parse_duration;
    use serde::de::Error;
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    /// Deserializes a duration from a string.
    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let raw = String::deserialize(deserializer)?;
        parse_duration(&raw).map_err(D::Error::custom)
    }

    /// Serializes a duration as a string with millisecond precision.
    pub fn serialize<S: Serializer>(d: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&format!("{}ms", d.as_millis()))
    }

    /// Same as the parent module but for optional durations.
    pub mod option {
        use super::parse_duration;
        use serde::de::Error;
        use serde::{Deserialize, Deserializer, Serializer};
        use std::time::Duration;

        /// Deserializes an optional duration from a string.
        pub fn deserialize<'de, D: Deserializer<'de>>(
            deserializer: D,
        ) -> Result<Option<Duration>, D::Error> {
            match Option::<String>::deserialize(deserializer)? {
                Some(raw) => parse_duration(&raw).map(Some).map_err(D::Error::custom),
                None => Ok(None),
            }
        }

        /// Serializes an optional duration as a string with millisecond precision.
        pub fn serialize<S: Serializer>(
            d: &Option<Duration>,
            serializer: S,
        ) -> Result<S::Ok, S::Error> {
            match d {
                Some(d) => serializer.serialize_str(&format!("{}ms", d.as_millis())),
                None => serializer.serialize_none(),
            }
        }
    }
}

/// Converts the raw value of the variable `name` into a `T`, annotating errors with the name.
fn convert<T: TryFrom<Value, Error = String>>(name: &str, value: String) -> Result<T> {
    Value(value)
        .try_into()
        .map_err(|e| format!("Invalid type in environment variable {}: {}", name, e))
}

/// Gets a required environment variable whose name is `<prefix>_<suffix>` with a conversion to
/// a target type `T`.
pub fn get_required_var<T: TryFrom<Value, Error = String>>(
    prefix: &str,
    suffix: &str,
) -> Result<T> {
    let name = format!("{}_{}", prefix, suffix);
    match env::var(&name) {
        Ok(value) => convert(&name, value),
        Err(env::VarError::NotPresent) => {
            Err(format!("Required environment variable {} not present", name))
        }
        Err(env::VarError::NotUnicode(_)) => {
            Err(format!("Invalid value in environment variable {}", name))
        }
    }
}

/// Gets an optional environment variable whose name is `<prefix>_<suffix>` with a conversion to
/// a target type `T`.
///
/// A variable that is present but cannot be converted is an error, not a missing value.
pub fn get_optional_var<T: TryFrom<Value, Error = String>>(
    prefix: &str,
    suffix: &str,
) -> Result<Option<T>> {
    let name = format!("{}_{}", prefix, suffix);
    match env::var(&name) {
        Ok(value) => convert(&name, value).map(Some),
        Err(env::VarError::NotPresent) => Ok(None),
        Err(env::VarError::NotUnicode(_)) => {
            Err(format!("Invalid value in environment variable {}", name))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ffi::OsStr;
    use std::os::unix::ffi::OsStrExt;

    #[test]
    fn test_value_to_string() {
        assert_eq!("foo bar", &TryInto::<String>::try_into(Value("foo bar".to_owned())).unwrap());
    }

    #[test]
    fn test_value_to_fromstr() {
        assert_eq!(1234u16, TryInto::<u16>::try_into(Value("1234".to_owned())).unwrap());

        let err = TryInto::<u16>::try_into(Value("-1".to_owned())).unwrap_err();
        assert!(err.starts_with("Invalid u16:"));
    }

    #[test]
    fn test_value_to_bool() {
        for raw in ["1", "true", "TRUE", "yes"] {
            assert!(TryInto::<bool>::try_into(Value(raw.to_owned())).unwrap());
        }
        for raw in ["0", "false", "No"] {
            assert!(!TryInto::<bool>::try_into(Value(raw.to_owned())).unwrap());
        }
        assert_eq!(
            "Invalid bool: maybe",
            TryInto::<bool>::try_into(Value("maybe".to_owned())).unwrap_err()
        );
    }

    #[test]
    fn test_parse_duration_ok() {
        assert_eq!(Duration::from_millis(250), parse_duration("250ms").unwrap());
        assert_eq!(Duration::from_secs(5), parse_duration("5s").unwrap());
        assert_eq!(Duration::from_secs(40 * 60), parse_duration("40m").unwrap());
        assert_eq!(Duration::from_secs(2 * 3600), parse_duration("2h").unwrap());
        assert_eq!(Duration::from_secs(86400), parse_duration("1d").unwrap());
    }

    #[test]
    fn test_parse_duration_errors() {
        assert!(parse_duration("").unwrap_err().contains("Missing unit"));
        assert!(parse_duration("10").unwrap_err().contains("Missing unit"));
        assert!(parse_duration("s").unwrap_err().contains("Invalid duration"));
        assert!(parse_duration("10y").unwrap_err().contains("Unknown unit 'y'"));
        assert!(parse_duration("-5s").unwrap_err().contains("Invalid duration"));
        assert!(parse_duration("18446744073709551615d").unwrap_err().contains("too large"));
    }

    #[test]
    fn test_value_to_url() {
        let url: Url = Value("https://example.com/".to_owned()).try_into().unwrap();
        assert_eq!("https://example.com/", url.as_str());

        let err = TryInto::<Url>::try_into(Value("not a url".to_owned())).unwrap_err();
        assert!(err.starts_with("Invalid Url:"));
    }

    #[test]
    fn test_get_required_var_ok() {
        temp_env::with_var("PREFIX_PRESENT", Some("1234"), || {
            assert_eq!("1234", &get_required_var::<String>("PREFIX", "PRESENT").unwrap());
        });
    }

    #[test]
    fn test_get_required_var_missing() {
        temp_env::with_var_unset("PREFIX_MISSING", || {
            assert_eq!(
                "Required environment variable PREFIX_MISSING not present",
                &get_required_var::<String>("PREFIX", "MISSING").unwrap_err()
            );
        });
    }

    #[test]
    fn test_get_required_var_not_utf8() {
        temp_env::with_var("PREFIX_INVALID", Some(OsStr::from_bytes(b"\xc3\x28")), || {
            assert_eq!(
                "Invalid value in environment variable PREFIX_INVALID",
                &get_required_var::<String>("PREFIX", "INVALID").unwrap_err()
            );
        });
    }

    #[test]
    fn test_get_required_var_bad_type() {
        temp_env::with_var("PREFIX_BAD", Some("b4d"), || {
            let err = get_required_var::<u16>("PREFIX", "BAD").unwrap_err();
            let exp = "Invalid type in environment variable PREFIX_BAD: Invalid u16";
            assert!(err.starts_with(exp));
        });
    }

    #[test]
    fn test_get_optional_var_ok() {
        temp_env::with_var("PREFIX_TIMEOUT", Some("30s"), || {
            assert_eq!(
                Some(Duration::from_secs(30)),
                get_optional_var::<Duration>("PREFIX", "TIMEOUT").unwrap()
            );
        });
    }

    #[test]
    fn test_get_optional_var_missing() {
        temp_env::with_var_unset("PREFIX_MISSING", || {
            assert_eq!(None, get_optional_var::<String>("PREFIX", "MISSING").unwrap());
        });
    }

    #[test]
    fn test_get_optional_var_bad_type() {
        temp_env::with_var("PREFIX_BAD", Some("yes please"), || {
            let err = get_optional_var::<bool>("PREFIX", "BAD").unwrap_err();
            assert_eq!(
                "Invalid type in environment variable PREFIX_BAD: Invalid bool: yes please",
                err
            );
        });
    }
}
