//! Conversions between the JSON tree a template input normalizes to, the
//! value tree the template engine executes against, and the YAML it emits.

use core::fmt;

use gtmpl::Value;
use serde::de::{
    self, Deserialize, Deserializer, EnumAccess, MapAccess, SeqAccess, VariantAccess, Visitor,
};
use serde_json::Value as Json;

/// Converts a normalized JSON tree into the template engine's value model.
///
/// Integers that do not fit in 64 bits are kept as their decimal text so
/// they print back unchanged instead of being rounded through `f64`.
pub(crate) fn to_template_value(json: Json) -> Value {
    match json {
        Json::Null => Value::Nil,
        Json::Bool(b) => Value::Bool(b),
        Json::Number(n) => number_to_template_value(&n),
        Json::String(s) => Value::String(s),
        Json::Array(items) => Value::Array(items.into_iter().map(to_template_value).collect()),
        Json::Object(fields) => Value::Map(
            fields
                .into_iter()
                .map(|(key, value)| (key, to_template_value(value)))
                .collect(),
        ),
    }
}

fn number_to_template_value(n: &serde_json::Number) -> Value {
    if let Some(u) = n.as_u64() {
        return Value::from(u);
    }
    if let Some(i) = n.as_i64() {
        return Value::from(i);
    }

    let text = n.to_string();
    let is_integer = !text.contains(['.', 'e', 'E']);
    match n.as_f64() {
        Some(f) if !is_integer && f.is_finite() => Value::from(f),
        _ => Value::String(text),
    }
}

/// Parses rendered YAML (or JSON, which is a subset) into a JSON tree.
///
/// Empty output is `null`. Scalar mapping keys are stringified the way a JSON
/// encoder of a generic map would. Integers too wide for 64 bits stay exact.
pub(crate) fn yaml_to_json(rendered: &[u8]) -> Result<Json, String> {
    if rendered.trim_ascii().is_empty() {
        return Ok(Json::Null);
    }
    serde_yaml::from_slice::<Tree>(rendered)
        .map(|tree| tree.0)
        .map_err(|e| e.to_string())
}

/// A YAML document decoded straight into JSON, without the 64-bit number
/// limit of `serde_yaml::Value`.
struct Tree(Json);

impl<'de> Deserialize<'de> for Tree {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        deserializer.deserialize_any(TreeVisitor).map(Tree)
    }
}

struct TreeVisitor;

impl<'de> Visitor<'de> for TreeVisitor {
    type Value = Json;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("any YAML value")
    }

    fn visit_bool<E>(self, v: bool) -> Result<Json, E> {
        Ok(Json::Bool(v))
    }

    fn visit_i64<E>(self, v: i64) -> Result<Json, E> {
        Ok(Json::from(v))
    }

    fn visit_u64<E>(self, v: u64) -> Result<Json, E> {
        Ok(Json::from(v))
    }

    fn visit_i128<E: de::Error>(self, v: i128) -> Result<Json, E> {
        exact_number(&v.to_string())
    }

    fn visit_u128<E: de::Error>(self, v: u128) -> Result<Json, E> {
        exact_number(&v.to_string())
    }

    fn visit_f64<E: de::Error>(self, v: f64) -> Result<Json, E> {
        serde_json::Number::from_f64(v)
            .map(Json::Number)
            .ok_or_else(|| E::custom(format!("number {v} has no JSON representation")))
    }

    fn visit_str<E>(self, v: &str) -> Result<Json, E> {
        Ok(Json::String(v.to_owned()))
    }

    fn visit_string<E>(self, v: String) -> Result<Json, E> {
        Ok(Json::String(v))
    }

    fn visit_unit<E>(self) -> Result<Json, E> {
        Ok(Json::Null)
    }

    fn visit_none<E>(self) -> Result<Json, E> {
        Ok(Json::Null)
    }

    fn visit_some<D>(self, deserializer: D) -> Result<Json, D::Error>
    where
        D: Deserializer<'de>,
    {
        Tree::deserialize(deserializer).map(|tree| tree.0)
    }

    fn visit_seq<A>(self, mut seq: A) -> Result<Json, A::Error>
    where
        A: SeqAccess<'de>,
    {
        let mut items = Vec::with_capacity(seq.size_hint().unwrap_or(0));
        while let Some(Tree(item)) = seq.next_element()? {
            items.push(item);
        }
        Ok(Json::Array(items))
    }

    fn visit_map<A>(self, mut map: A) -> Result<Json, A::Error>
    where
        A: MapAccess<'de>,
    {
        let mut fields = serde_json::Map::new();
        while let Some(Key(key)) = map.next_key()? {
            let Tree(value) = map.next_value()?;
            fields.insert(key, value);
        }
        Ok(Json::Object(fields))
    }

    /// Tagged values (`!tag value`) keep only their value.
    fn visit_enum<A>(self, data: A) -> Result<Json, A::Error>
    where
        A: EnumAccess<'de>,
    {
        let (_tag, value): (de::IgnoredAny, _) = data.variant()?;
        value.newtype_variant::<Tree>().map(|tree| tree.0)
    }
}

/// A scalar mapping key rendered as the string a JSON object key needs.
struct Key(String);

impl<'de> Deserialize<'de> for Key {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        deserializer.deserialize_any(KeyVisitor).map(Key)
    }
}

struct KeyVisitor;

impl<'de> Visitor<'de> for KeyVisitor {
    type Value = String;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a scalar mapping key")
    }

    fn visit_bool<E>(self, v: bool) -> Result<String, E> {
        Ok(v.to_string())
    }

    fn visit_i64<E>(self, v: i64) -> Result<String, E> {
        Ok(v.to_string())
    }

    fn visit_u64<E>(self, v: u64) -> Result<String, E> {
        Ok(v.to_string())
    }

    fn visit_i128<E>(self, v: i128) -> Result<String, E> {
        Ok(v.to_string())
    }

    fn visit_u128<E>(self, v: u128) -> Result<String, E> {
        Ok(v.to_string())
    }

    fn visit_f64<E>(self, v: f64) -> Result<String, E> {
        Ok(v.to_string())
    }

    fn visit_str<E>(self, v: &str) -> Result<String, E> {
        Ok(v.to_owned())
    }

    fn visit_string<E>(self, v: String) -> Result<String, E> {
        Ok(v)
    }

    fn visit_unit<E>(self) -> Result<String, E> {
        Ok("null".to_owned())
    }

    fn visit_none<E>(self) -> Result<String, E> {
        Ok("null".to_owned())
    }

    fn visit_enum<A>(self, data: A) -> Result<String, A::Error>
    where
        A: EnumAccess<'de>,
    {
        let (_tag, value): (de::IgnoredAny, _) = data.variant()?;
        value.newtype_variant::<Key>().map(|key| key.0)
    }
}

fn exact_number<E: de::Error>(text: &str) -> Result<Json, E> {
    text.parse::<serde_json::Number>()
        .map(Json::Number)
        .map_err(E::custom)
}
