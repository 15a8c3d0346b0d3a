//! Value codec.
//!
//! Values are stored as strings. Integers are written as plain decimal text so
//! that `INCRBY`/`DECRBY` keep working on them server side; everything else is
//! written as JSON.
//!
//! Decoding treats any text matching `^-?\d+$` as an integer. A string value
//! written by another client that consists only of digits is therefore read back
//! as a number. This is inherent to the scheme.

use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;

use crate::error::{from_serde_error, CacheError, CacheResult};

/// Encodes a value into its stored form.
///
/// ## Errors
///
/// Returns `CacheError::Serialization` if the value cannot be serialized.
pub fn encode<T>(value: &T) -> CacheResult<String>
where
    T: Serialize + ?Sized,
{
    let value = serde_json::to_value(value).map_err(from_serde_error)?;
    match value {
        Value::Number(number) if number.is_i64() || number.is_u64() => Ok(number.to_string()),
        other => serde_json::to_string(&other).map_err(from_serde_error),
    }
}

/// Decodes a stored string back into a value.
///
/// ## Errors
///
/// Returns `CacheError::Serialization` if the text is neither an integer nor
/// valid JSON for `T`.
pub fn decode<T>(raw: &str) -> CacheResult<T>
where
    T: DeserializeOwned,
{
    if is_integer_text(raw) {
        let number = integer_value(raw)?;
        return serde_json::from_value(number).map_err(from_serde_error);
    }
    serde_json::from_str(raw).map_err(from_serde_error)
}

/// Returns whether `raw` matches `^-?\d+$`.
#[must_use]
pub fn is_integer_text(raw: &str) -> bool {
    let digits = raw.strip_prefix('-').unwrap_or(raw);
    !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit())
}

fn integer_value(raw: &str) -> CacheResult<Value> {
    if let Ok(signed) = raw.parse::<i64>() {
        return Ok(Value::from(signed));
    }
    if let Ok(unsigned) = raw.parse::<u64>() {
        return Ok(Value::from(unsigned));
    }
    Err(CacheError::Serialization(format!(
        "integer out of range: {raw}"
    )))
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use proptest::prelude::*;
    use serde::Deserialize;

    use super::*;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Profile {
        name: String,
        tags: Vec<String>,
        manager: Option<Box<Profile>>,
    }

    #[test]
    fn integers_are_plain_decimal_text() {
        assert_eq!(encode(&42_i64).unwrap(), "42");
        assert_eq!(encode(&-7_i32).unwrap(), "-7");
        assert_eq!(encode(&u64::MAX).unwrap(), u64::MAX.to_string());
    }

    #[test]
    fn strings_are_json_quoted() {
        assert_eq!(encode("hello").unwrap(), "\"hello\"");
        assert_eq!(encode("123").unwrap(), "\"123\"");
        assert_eq!(decode::<String>("\"123\"").unwrap(), "123");
    }

    #[test]
    fn null_and_nested_containers_round_trip() {
        let none: Option<i64> = None;
        assert_eq!(encode(&none).unwrap(), "null");
        assert_eq!(decode::<Option<i64>>("null").unwrap(), None);

        let profile = Profile {
            name: "root".to_string(),
            tags: vec!["a".to_string(), "b".to_string()],
            manager: Some(Box::new(Profile {
                name: "boss".to_string(),
                tags: vec![],
                manager: None,
            })),
        };
        let stored = encode(&profile).unwrap();
        assert_eq!(decode::<Profile>(&stored).unwrap(), profile);

        let mut map = BTreeMap::new();
        map.insert("list".to_string(), vec![Some(1.5), None]);
        let stored = encode(&map).unwrap();
        assert_eq!(decode::<BTreeMap<String, Vec<Option<f64>>>>(&stored).unwrap(), map);
    }

    #[test]
    fn floats_are_not_mistaken_for_integers() {
        let stored = encode(&2.0_f64).unwrap();
        assert!(!is_integer_text(&stored));
        assert!((decode::<f64>(&stored).unwrap() - 2.0).abs() < f64::EPSILON);
    }

    #[test]
    fn raw_digit_strings_decode_as_integers() {
        // A bare numeral written by another client reads back as a number.
        assert!(decode::<String>("123").is_err());
        assert_eq!(decode::<i64>("123").unwrap(), 123);
    }

    #[test]
    fn integer_text_predicate() {
        assert!(is_integer_text("0"));
        assert!(is_integer_text("-15"));
        assert!(!is_integer_text(""));
        assert!(!is_integer_text("-"));
        assert!(!is_integer_text("+1"));
        assert!(!is_integer_text("1.0"));
        assert!(!is_integer_text(" 1"));
    }

    #[test]
    fn garbage_is_a_serialization_error() {
        let err = decode::<Profile>("{not json").unwrap_err();
        assert!(matches!(err, CacheError::Serialization(_)));
    }

    proptest! {
        #[test]
        fn integer_round_trip(n in any::<i64>()) {
            let stored = encode(&n).unwrap();
            prop_assert!(is_integer_text(&stored));
            prop_assert_eq!(decode::<i64>(&stored).unwrap(), n);
        }

        #[test]
        fn string_round_trip(s in ".*") {
            let stored = encode(&s).unwrap();
            prop_assert_eq!(decode::<String>(&stored).unwrap(), s);
        }

        #[test]
        fn nested_round_trip(values in proptest::collection::vec(proptest::option::of(any::<i32>()), 0..8)) {
            let stored = encode(&values).unwrap();
            prop_assert_eq!(decode::<Vec<Option<i32>>>(&stored).unwrap(), values);
        }
    }
}
