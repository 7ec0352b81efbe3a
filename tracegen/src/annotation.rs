//! Debug annotations: free-form key/value metadata attached to track events.
//!
//! [`DebugValue`] is the in-memory tree; [`encode`] lowers an ordered list of
//! named values into `DebugAnnotation` messages, degrading instead of failing:
//! oversized maps and arrays are truncated with a marker entry, empty
//! composites become a marker string and arrays nested directly inside arrays
//! are wrapped in a single-key map because the UI cannot render them.

use perfetto_format::debug_annotation::{NameField, Value};
use perfetto_format::{create_debug_annotation, DebugAnnotation};
use std::collections::BTreeMap;

pub const MAX_ENTRIES: usize = 16;
pub const MAX_DEPTH: usize = 32;
pub const EMPTY_MARKER: &str = "[empty]";
pub const TRUNCATED_KEY: &str = "...";
pub const NESTED_ARRAY_KEY: &str = "array";
const DEPTH_MARKER: &str = "[max depth]";

/// Ordered list of named annotation values.
pub type Args = Vec<(String, DebugValue)>;

#[derive(Debug, Clone, PartialEq)]
pub enum DebugValue {
    String(String),
    Bool(bool),
    Int(i64),
    Uint(u64),
    Double(f64),
    /// A value the encoder has no field for, recorded by its type name.
    Opaque(String),
    Map(Args),
    Array(Vec<DebugValue>),
}

impl DebugValue {
    pub fn opaque<T: ?Sized>() -> Self {
        DebugValue::Opaque(std::any::type_name::<T>().to_string())
    }

    pub fn map<K: Into<String>, V: Into<DebugValue>>(
        entries: impl IntoIterator<Item = (K, V)>,
    ) -> Self {
        DebugValue::Map(
            entries
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

macro_rules! impl_from_int {
    ($($t:ty),*) => {
        $(impl From<$t> for DebugValue {
            fn from(v: $t) -> Self {
                DebugValue::Int(v as i64)
            }
        })*
    };
}

macro_rules! impl_from_uint {
    ($($t:ty),*) => {
        $(impl From<$t> for DebugValue {
            fn from(v: $t) -> Self {
                DebugValue::Uint(v as u64)
            }
        })*
    };
}

impl_from_int!(i8, i16, i32, i64, isize, u8, u16, u32);
impl_from_uint!(u64, usize);

impl From<bool> for DebugValue {
    fn from(v: bool) -> Self {
        DebugValue::Bool(v)
    }
}

impl From<f32> for DebugValue {
    fn from(v: f32) -> Self {
        DebugValue::Double(v as f64)
    }
}

impl From<f64> for DebugValue {
    fn from(v: f64) -> Self {
        DebugValue::Double(v)
    }
}

impl From<&str> for DebugValue {
    fn from(v: &str) -> Self {
        DebugValue::String(v.to_string())
    }
}

impl From<String> for DebugValue {
    fn from(v: String) -> Self {
        DebugValue::String(v)
    }
}

impl<T: Into<DebugValue>> From<Vec<T>> for DebugValue {
    fn from(v: Vec<T>) -> Self {
        DebugValue::Array(v.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<DebugValue>> From<Option<T>> for DebugValue {
    fn from(v: Option<T>) -> Self {
        match v {
            Some(v) => v.into(),
            None => DebugValue::Opaque("None".to_string()),
        }
    }
}

impl<K: Into<String>, V: Into<DebugValue>> From<BTreeMap<K, V>> for DebugValue {
    fn from(v: BTreeMap<K, V>) -> Self {
        DebugValue::map(v)
    }
}

impl From<serde_json::Value> for DebugValue {
    fn from(v: serde_json::Value) -> Self {
        use serde_json::Value as Json;
        match v {
            Json::Null => DebugValue::Opaque("null".to_string()),
            Json::Bool(b) => DebugValue::Bool(b),
            Json::Number(n) => {
                if let Some(i) = n.as_i64() {
                    DebugValue::Int(i)
                } else if let Some(u) = n.as_u64() {
                    DebugValue::Uint(u)
                } else {
                    DebugValue::Double(n.as_f64().unwrap_or(f64::NAN))
                }
            }
            Json::String(s) => DebugValue::String(s),
            Json::Array(items) => DebugValue::from(items),
            Json::Object(map) => DebugValue::map(map),
        }
    }
}

fn string_leaf(name: Option<String>, value: impl Into<String>) -> DebugAnnotation {
    create_debug_annotation(name, Value::StringValue(value.into()))
}

/// Encodes an ordered map of annotations. Maps longer than `max_entries`
/// keep `max_entries - 1` entries followed by a `"..."` marker.
pub fn encode(entries: &[(String, DebugValue)], max_entries: usize) -> Vec<DebugAnnotation> {
    encode_entries(entries, max_entries.max(1), 0)
}

fn encode_entries(
    entries: &[(String, DebugValue)],
    max_entries: usize,
    depth: usize,
) -> Vec<DebugAnnotation> {
    let truncate = entries.len() > max_entries;
    let mut out = Vec::with_capacity(entries.len().min(max_entries));
    for (i, (key, value)) in entries.iter().enumerate() {
        if truncate && i + 1 == max_entries {
            out.push(string_leaf(
                Some(TRUNCATED_KEY.to_string()),
                format!("({} more items)", entries.len() - max_entries),
            ));
            break;
        }
        let mut annotation = encode_value(value, max_entries, depth);
        annotation.name_field = Some(NameField::Name(key.clone()));
        out.push(annotation);
    }
    out
}

fn encode_value(value: &DebugValue, max_entries: usize, depth: usize) -> DebugAnnotation {
    let leaf = |v| create_debug_annotation(None, v);
    match value {
        DebugValue::String(s) => leaf(Value::StringValue(s.clone())),
        DebugValue::Bool(b) => leaf(Value::BoolValue(*b)),
        DebugValue::Int(i) => leaf(Value::IntValue(*i)),
        DebugValue::Uint(u) => leaf(Value::UintValue(*u)),
        DebugValue::Double(d) => leaf(Value::DoubleValue(*d)),
        DebugValue::Opaque(type_name) => string_leaf(None, type_name.as_str()),
        DebugValue::Map(entries) if entries.is_empty() => string_leaf(None, EMPTY_MARKER),
        DebugValue::Array(items) if items.is_empty() => string_leaf(None, EMPTY_MARKER),
        DebugValue::Map(_) | DebugValue::Array(_) if depth >= MAX_DEPTH => {
            string_leaf(None, DEPTH_MARKER)
        }
        DebugValue::Map(entries) => DebugAnnotation {
            dict_entries: encode_entries(entries, max_entries, depth + 1),
            ..Default::default()
        },
        DebugValue::Array(items) => DebugAnnotation {
            array_values: encode_items(items, max_entries, depth + 1),
            ..Default::default()
        },
    }
}

/// Arrays longer than `max_entries` keep `max_entries` elements followed by a
/// `"... (N more items)"` string element.
fn encode_items(items: &[DebugValue], max_entries: usize, depth: usize) -> Vec<DebugAnnotation> {
    let mut out = Vec::with_capacity(items.len().min(max_entries + 1));
    for item in items.iter().take(max_entries) {
        let encoded = match item {
            DebugValue::Array(_) => {
                let mut inner = encode_value(item, max_entries, depth + 1);
                inner.name_field = Some(NameField::Name(NESTED_ARRAY_KEY.to_string()));
                DebugAnnotation {
                    dict_entries: vec![inner],
                    ..Default::default()
                }
            }
            _ => encode_value(item, max_entries, depth),
        };
        out.push(encoded);
    }
    if items.len() > max_entries {
        out.push(string_leaf(
            None,
            format!("... ({} more items)", items.len() - max_entries),
        ));
    }
    out
}

/// Inverse of [`encode`] for inputs without truncation, empty composites,
/// opaque values or nested arrays.
pub fn decode(annotations: &[DebugAnnotation]) -> Args {
    annotations
        .iter()
        .map(|annotation| (annotation_name(annotation), decode_value(annotation)))
        .collect()
}

fn annotation_name(annotation: &DebugAnnotation) -> String {
    match &annotation.name_field {
        Some(NameField::Name(name)) => name.clone(),
        Some(NameField::NameIid(iid)) => format!("#{}", iid),
        None => String::new(),
    }
}

fn decode_value(annotation: &DebugAnnotation) -> DebugValue {
    match &annotation.value {
        Some(Value::BoolValue(b)) => DebugValue::Bool(*b),
        Some(Value::UintValue(u)) => DebugValue::Uint(*u),
        Some(Value::IntValue(i)) => DebugValue::Int(*i),
        Some(Value::DoubleValue(d)) => DebugValue::Double(*d),
        Some(Value::StringValue(s)) => DebugValue::String(s.clone()),
        None if !annotation.array_values.is_empty() => {
            DebugValue::Array(annotation.array_values.iter().map(decode_value).collect())
        }
        None => DebugValue::Map(decode(&annotation.dict_entries)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::args;
    use rstest::rstest;

    fn string_value(annotation: &DebugAnnotation) -> Option<&str> {
        match &annotation.value {
            Some(Value::StringValue(s)) => Some(s.as_str()),
            _ => None,
        }
    }

    #[test]
    fn scalars_use_dedicated_fields() {
        let encoded = encode(
            &args! { "s" => "x", "b" => true, "i" => -3, "u" => 7u64, "d" => 1.5 },
            MAX_ENTRIES,
        );
        let values: Vec<_> = encoded.iter().map(|a| a.value.clone()).collect();
        assert_eq!(
            values,
            vec![
                Some(Value::StringValue("x".into())),
                Some(Value::BoolValue(true)),
                Some(Value::IntValue(-3)),
                Some(Value::UintValue(7)),
                Some(Value::DoubleValue(1.5)),
            ]
        );
    }

    #[test]
    fn round_trip_without_truncation() {
        let original = args! {
            "name" => "worker",
            "count" => 12,
            "ratio" => 0.25,
            "flags" => DebugValue::map([("fast", true), ("safe", false)]),
            "items" => vec![1, 2, 3],
            "mixed" => DebugValue::Array(vec![
                DebugValue::from("a"),
                DebugValue::map([("k", "v")]),
            ]),
        };
        assert_eq!(decode(&encode(&original, MAX_ENTRIES)), original);
    }

    #[test]
    fn oversized_map_keeps_sixteen_slots() {
        let entries: Args = (0..20).map(|i| (format!("k{}", i), DebugValue::Int(i))).collect();
        let encoded = encode(&entries, MAX_ENTRIES);
        assert_eq!(encoded.len(), 16);
        assert_eq!(annotation_name(&encoded[14]), "k14");
        assert_eq!(annotation_name(&encoded[15]), TRUNCATED_KEY);
        assert_eq!(string_value(&encoded[15]), Some("(4 more items)"));
    }

    #[test]
    fn map_at_limit_is_not_truncated() {
        let entries: Args = (0..16).map(|i| (format!("k{}", i), DebugValue::Int(i))).collect();
        let encoded = encode(&entries, MAX_ENTRIES);
        assert_eq!(decode(&encoded), entries);
    }

    #[test]
    fn oversized_array_ends_with_marker() {
        let items: Vec<i64> = (0..40).collect();
        let encoded = encode(&args! { "xs" => items }, MAX_ENTRIES);
        let values = &encoded[0].array_values;
        assert_eq!(values.len(), 17);
        assert_eq!(values[15].value, Some(Value::IntValue(15)));
        assert_eq!(string_value(&values[16]), Some("... (24 more items)"));
    }

    #[rstest]
    #[case::at_limit(16, 16, None)]
    #[case::one_over(17, 16, Some("... (1 more items)"))]
    #[case::small_limit(5, 3, Some("... (2 more items)"))]
    fn array_keeps_limit_elements_before_marker(
        #[case] len: i64,
        #[case] max: usize,
        #[case] marker: Option<&str>,
    ) {
        let items: Vec<i64> = (0..len).collect();
        let encoded = encode(&args! { "xs" => items }, max);
        let values = &encoded[0].array_values;
        let kept = (len as usize).min(max);
        assert_eq!(values.len(), kept + usize::from(marker.is_some()));
        for (i, value) in values[..kept].iter().enumerate() {
            assert_eq!(value.value, Some(Value::IntValue(i as i64)));
        }
        assert_eq!(values.get(kept).and_then(string_value), marker);
    }

    #[test]
    fn nested_array_is_wrapped_in_map() {
        let value = DebugValue::Array(vec![DebugValue::from(vec![1, 2]), DebugValue::from("x")]);
        let encoded = encode(&args! { "v" => value }, MAX_ENTRIES);
        let elements = &encoded[0].array_values;
        assert_eq!(elements.len(), 2);
        assert!(elements[0].array_values.is_empty());
        assert_eq!(elements[0].dict_entries.len(), 1);
        assert_eq!(annotation_name(&elements[0].dict_entries[0]), NESTED_ARRAY_KEY);

        let decoded = decode(&encoded);
        assert_eq!(
            decoded[0].1,
            DebugValue::Array(vec![
                DebugValue::map([("array", vec![1, 2])]),
                DebugValue::from("x"),
            ])
        );
    }

    #[rstest]
    #[case::empty_map(DebugValue::Map(vec![]))]
    #[case::empty_array(DebugValue::Array(vec![]))]
    fn empty_composites_use_marker(#[case] value: DebugValue) {
        let encoded = encode(&args! { "e" => value }, MAX_ENTRIES);
        assert_eq!(string_value(&encoded[0]), Some(EMPTY_MARKER));
        assert!(encoded[0].dict_entries.is_empty());
        assert!(encoded[0].array_values.is_empty());
    }

    #[test]
    fn unknown_types_fall_back_to_type_name() {
        struct Handle;
        let encoded = encode(
            &args! { "h" => DebugValue::opaque::<Handle>(), "none" => Option::<i32>::None },
            MAX_ENTRIES,
        );
        assert!(string_value(&encoded[0]).unwrap().ends_with("Handle"));
        assert_eq!(string_value(&encoded[1]), Some("None"));
    }

    #[test]
    fn deep_nesting_is_cut_off() {
        let mut value = DebugValue::from(1);
        for _ in 0..(MAX_DEPTH + 8) {
            value = DebugValue::map([("next", value)]);
        }
        let encoded = encode(&args! { "root" => value }, MAX_ENTRIES);
        let mut node = &encoded[0];
        let mut levels = 0;
        while let Some(child) = node.dict_entries.first() {
            node = child;
            levels += 1;
        }
        assert_eq!(levels, MAX_DEPTH);
        assert_eq!(string_value(node), Some(DEPTH_MARKER));
    }

    #[test]
    fn json_values_convert_structurally() {
        let json = serde_json::json!({"a": [1, "b", null], "c": {"d": 2.5}});
        assert_eq!(
            DebugValue::from(json),
            DebugValue::map([
                (
                    "a",
                    DebugValue::Array(vec![
                        DebugValue::Int(1),
                        DebugValue::from("b"),
                        DebugValue::Opaque("null".into()),
                    ]),
                ),
                ("c", DebugValue::map([("d", 2.5)])),
            ])
        );
    }
}
