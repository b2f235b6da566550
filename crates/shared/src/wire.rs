//! Decoding helpers for the loosely typed JSON the backend emits.
//!
//! The backend is PHP-based: ids come as numbers or numeric strings, flags as
//! `0`/`1`, `"0"`/`"1"` or booleans, and an empty associative array is encoded
//! as `[]`. Ordered maps (the group forest, contact fields, option lists) keep
//! document order whether they arrive as JSON objects or as arrays.

use std::{collections::BTreeMap, collections::BTreeSet, fmt, marker::PhantomData};

use serde::{
    de::{self, DeserializeOwned, IgnoredAny, MapAccess, SeqAccess, Visitor},
    Deserialize, Deserializer, Serializer,
};

/// PHP truthiness for submitted and stored scalar strings.
pub fn is_truthy(value: &str) -> bool {
    !value.is_empty() && value != "0"
}

pub fn flag<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    struct FlagVisitor;

    impl<'de> Visitor<'de> for FlagVisitor {
        type Value = bool;

        fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
            f.write_str("a boolean, 0/1 or a numeric string")
        }

        fn visit_bool<E: de::Error>(self, v: bool) -> Result<bool, E> {
            Ok(v)
        }

        fn visit_i64<E: de::Error>(self, v: i64) -> Result<bool, E> {
            Ok(v != 0)
        }

        fn visit_u64<E: de::Error>(self, v: u64) -> Result<bool, E> {
            Ok(v != 0)
        }

        fn visit_f64<E: de::Error>(self, v: f64) -> Result<bool, E> {
            Ok(v != 0.0)
        }

        fn visit_str<E: de::Error>(self, v: &str) -> Result<bool, E> {
            Ok(is_truthy(v))
        }

        fn visit_unit<E: de::Error>(self) -> Result<bool, E> {
            Ok(false)
        }

        fn visit_none<E: de::Error>(self) -> Result<bool, E> {
            Ok(false)
        }

        fn visit_some<D2: Deserializer<'de>>(self, deserializer: D2) -> Result<bool, D2::Error> {
            deserializer.deserialize_any(self)
        }
    }

    deserializer.deserialize_any(FlagVisitor)
}

/// Flags go back to the backend as `0`/`1`.
pub fn serialize_flag<S: Serializer>(value: &bool, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_u8(u8::from(*value))
}

pub fn serialize_optional_flag<S: Serializer>(
    value: &Option<bool>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    match value {
        Some(value) => serialize_flag(value, serializer),
        None => serializer.serialize_none(),
    }
}

/// Accepts an integer id or a numeric string.
pub fn lenient_id<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    struct IdVisitor;

    impl<'de> Visitor<'de> for IdVisitor {
        type Value = i64;

        fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
            f.write_str("an integer id or a numeric string")
        }

        fn visit_i64<E: de::Error>(self, v: i64) -> Result<i64, E> {
            Ok(v)
        }

        fn visit_u64<E: de::Error>(self, v: u64) -> Result<i64, E> {
            i64::try_from(v).map_err(|_| E::custom(format!("id {v} out of range")))
        }

        fn visit_str<E: de::Error>(self, v: &str) -> Result<i64, E> {
            v.trim()
                .parse()
                .map_err(|_| E::invalid_value(de::Unexpected::Str(v), &self))
        }
    }

    deserializer.deserialize_any(IdVisitor)
}

/// Text that may be missing, `null`, or a bare number.
pub fn text<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Scalar>::deserialize(deserializer)?
        .map(|scalar| scalar.0)
        .unwrap_or_default())
}

/// Like [`text`] but maps missing and empty values to `None`.
pub fn optional_text<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Scalar>::deserialize(deserializer)?
        .map(|scalar| scalar.0)
        .filter(|value| !value.trim().is_empty()))
}

struct Scalar(String);

impl<'de> Deserialize<'de> for Scalar {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct ScalarVisitor;

        impl<'de> Visitor<'de> for ScalarVisitor {
            type Value = Scalar;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a string, number or boolean")
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<Scalar, E> {
                Ok(Scalar(v.to_string()))
            }

            fn visit_string<E: de::Error>(self, v: String) -> Result<Scalar, E> {
                Ok(Scalar(v))
            }

            fn visit_i64<E: de::Error>(self, v: i64) -> Result<Scalar, E> {
                Ok(Scalar(v.to_string()))
            }

            fn visit_u64<E: de::Error>(self, v: u64) -> Result<Scalar, E> {
                Ok(Scalar(v.to_string()))
            }

            fn visit_f64<E: de::Error>(self, v: f64) -> Result<Scalar, E> {
                Ok(Scalar(v.to_string()))
            }

            fn visit_bool<E: de::Error>(self, v: bool) -> Result<Scalar, E> {
                Ok(Scalar(u8::from(v).to_string()))
            }
        }

        deserializer.deserialize_any(ScalarVisitor)
    }
}

/// An entry of an ordered map whose key may live outside the entry body.
pub trait Keyed: Sized {
    type Key: DeserializeOwned;

    fn with_key(self, key: Self::Key) -> Self;
}

/// Decodes `[entry, ...]` or `{key: entry, ...}` into a list in document order.
pub fn keyed_list<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Keyed + Deserialize<'de>,
{
    struct KeyedListVisitor<T>(PhantomData<T>);

    impl<'de, T> Visitor<'de> for KeyedListVisitor<T>
    where
        T: Keyed + Deserialize<'de>,
    {
        type Value = Vec<T>;

        fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
            f.write_str("a list or an object keyed by id")
        }

        fn visit_unit<E: de::Error>(self) -> Result<Vec<T>, E> {
            Ok(Vec::new())
        }

        fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Vec<T>, A::Error> {
            let mut items = Vec::with_capacity(seq.size_hint().unwrap_or(0));
            while let Some(item) = seq.next_element::<T>()? {
                items.push(item);
            }
            Ok(items)
        }

        fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Vec<T>, A::Error> {
            let mut items = Vec::with_capacity(map.size_hint().unwrap_or(0));
            while let Some((key, item)) = map.next_entry::<T::Key, T>()? {
                items.push(item.with_key(key));
            }
            Ok(items)
        }
    }

    deserializer.deserialize_any(KeyedListVisitor(PhantomData))
}

/// Decodes an option list (`{value: label}` or `[label, ...]`) in document order.
pub fn option_list<'de, D>(deserializer: D) -> Result<Vec<(String, String)>, D::Error>
where
    D: Deserializer<'de>,
{
    struct OptionListVisitor;

    impl<'de> Visitor<'de> for OptionListVisitor {
        type Value = Vec<(String, String)>;

        fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
            f.write_str("an option list")
        }

        fn visit_unit<E: de::Error>(self) -> Result<Self::Value, E> {
            Ok(Vec::new())
        }

        fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Self::Value, A::Error> {
            let mut options = Vec::new();
            while let Some(Scalar(label)) = seq.next_element::<Scalar>()? {
                options.push((options.len().to_string(), label));
            }
            Ok(options)
        }

        fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Self::Value, A::Error> {
            let mut options = Vec::new();
            while let Some((Scalar(value), Scalar(label))) = map.next_entry::<Scalar, Scalar>()? {
                options.push((value, label));
            }
            Ok(options)
        }
    }

    deserializer.deserialize_any(OptionListVisitor)
}

/// Decodes a map, treating `null` and `[]` as empty.
pub fn map_or_empty<'de, D, K, V>(deserializer: D) -> Result<BTreeMap<K, V>, D::Error>
where
    D: Deserializer<'de>,
    K: DeserializeOwned + Ord,
    V: DeserializeOwned,
{
    struct MapVisitor<K, V>(PhantomData<(K, V)>);

    impl<'de, K, V> Visitor<'de> for MapVisitor<K, V>
    where
        K: DeserializeOwned + Ord,
        V: DeserializeOwned,
    {
        type Value = BTreeMap<K, V>;

        fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
            f.write_str("an object or an empty list")
        }

        fn visit_unit<E: de::Error>(self) -> Result<Self::Value, E> {
            Ok(BTreeMap::new())
        }

        fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Self::Value, A::Error> {
            if seq.next_element::<IgnoredAny>()?.is_some() {
                return Err(de::Error::invalid_type(de::Unexpected::Seq, &self));
            }
            Ok(BTreeMap::new())
        }

        fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Self::Value, A::Error> {
            let mut entries = BTreeMap::new();
            while let Some((key, value)) = map.next_entry::<K, V>()? {
                entries.insert(key, value);
            }
            Ok(entries)
        }
    }

    deserializer.deserialize_any(MapVisitor(PhantomData))
}

/// Decodes a set of ids given either as `[id, ...]` or as the keys of `{id: ...}`.
pub fn id_set<'de, D, K>(deserializer: D) -> Result<BTreeSet<K>, D::Error>
where
    D: Deserializer<'de>,
    K: DeserializeOwned + Ord,
{
    struct IdSetVisitor<K>(PhantomData<K>);

    impl<'de, K> Visitor<'de> for IdSetVisitor<K>
    where
        K: DeserializeOwned + Ord,
    {
        type Value = BTreeSet<K>;

        fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
            f.write_str("a list of ids or an object keyed by id")
        }

        fn visit_unit<E: de::Error>(self) -> Result<Self::Value, E> {
            Ok(BTreeSet::new())
        }

        fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Self::Value, A::Error> {
            let mut ids = BTreeSet::new();
            while let Some(id) = seq.next_element::<K>()? {
                ids.insert(id);
            }
            Ok(ids)
        }

        fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Self::Value, A::Error> {
            let mut ids = BTreeSet::new();
            while let Some((id, IgnoredAny)) = map.next_entry::<K, IgnoredAny>()? {
                ids.insert(id);
            }
            Ok(ids)
        }
    }

    deserializer.deserialize_any(IdSetVisitor(PhantomData))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[derive(Debug, Deserialize)]
    struct Flags {
        #[serde(deserialize_with = "flag")]
        a: bool,
        #[serde(deserialize_with = "flag")]
        b: bool,
        #[serde(deserialize_with = "flag")]
        c: bool,
        #[serde(default, deserialize_with = "flag")]
        d: bool,
    }

    #[test]
    fn flags_accept_php_spellings() {
        let flags: Flags = serde_json::from_value(json!({ "a": "1", "b": 0, "c": true, "d": null }))
            .expect("flags");
        assert!(flags.a);
        assert!(!flags.b);
        assert!(flags.c);
        assert!(!flags.d);
    }

    #[derive(Debug, Deserialize)]
    struct Options {
        #[serde(default, deserialize_with = "option_list")]
        options: Vec<(String, String)>,
    }

    #[test]
    fn option_lists_keep_document_order() {
        let parsed: Options =
            serde_json::from_str(r#"{"options": {"9": "Ms.", "1": "Mr.", "5": "Dr."}}"#)
                .expect("options");
        let values: Vec<_> = parsed.options.iter().map(|(v, _)| v.as_str()).collect();
        assert_eq!(values, ["9", "1", "5"]);

        let empty: Options = serde_json::from_value(json!({ "options": [] })).expect("empty");
        assert!(empty.options.is_empty());
    }

    #[test]
    fn truthiness_follows_php() {
        assert!(is_truthy("1"));
        assert!(is_truthy("yes"));
        assert!(!is_truthy("0"));
        assert!(!is_truthy(""));
    }
}
