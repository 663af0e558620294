//! Cache value model and wire codec

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A primitive cache value (string, number, or boolean)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Scalar {
  Bool(bool),
  Integer(i64),
  Float(f64),
  String(String),
}

impl Scalar {
  /// Textual form stored on the remote tier
  pub fn to_wire(&self) -> String {
    match self {
      Scalar::Bool(b) => b.to_string(),
      Scalar::Integer(i) => i.to_string(),
      Scalar::Float(f) => f.to_string(),
      Scalar::String(s) => s.clone(),
    }
  }

  /// Decode a remote scalar. With `parse_type`, attempt a lossless JSON
  /// parse of the text; anything that does not parse to a primitive comes
  /// back as the raw string. Decoding never fails.
  pub fn from_wire(raw: &str, parse_type: bool) -> Scalar {
    if !parse_type {
      return Scalar::String(raw.to_string());
    }
    match serde_json::from_str::<serde_json::Value>(raw) {
      Ok(serde_json::Value::Bool(b)) => Scalar::Bool(b),
      Ok(serde_json::Value::Number(n)) => {
        if let Some(i) = n.as_i64() {
          Scalar::Integer(i)
        } else if let Some(f) = n.as_f64() {
          Scalar::Float(f)
        } else {
          Scalar::String(raw.to_string())
        }
      }
      Ok(serde_json::Value::String(inner)) => Scalar::String(inner),
      _ => Scalar::String(raw.to_string()),
    }
  }

}

impl From<String> for Scalar {
  fn from(s: String) -> Self {
    Scalar::String(s)
  }
}

impl From<&str> for Scalar {
  fn from(s: &str) -> Self {
    Scalar::String(s.to_string())
  }
}

impl From<i64> for Scalar {
  fn from(i: i64) -> Self {
    Scalar::Integer(i)
  }
}

impl From<f64> for Scalar {
  fn from(f: f64) -> Self {
    Scalar::Float(f)
  }
}

impl From<bool> for Scalar {
  fn from(b: bool) -> Self {
    Scalar::Bool(b)
  }
}

/// A value held by the local tier
#[derive(Debug, Clone, PartialEq)]
pub enum StoredValue {
  Scalar(Scalar),
  Object(HashMap<String, Scalar>),
}

/// Encode an array as the JSON text stored on the remote tier
pub fn encode_array(values: &[serde_json::Value]) -> String {
  serde_json::Value::Array(values.to_vec()).to_string()
}

/// Decode JSON array text; ill-formed input surfaces as absent
pub fn decode_array(raw: &str) -> Option<Vec<serde_json::Value>> {
  serde_json::from_str::<Vec<serde_json::Value>>(raw).ok()
}

/// Flatten an object's fields to the field/string pairs stored in a hash
pub fn encode_object(object: &HashMap<String, Scalar>) -> Vec<(String, String)> {
  object
    .iter()
    .map(|(field, value)| (field.clone(), value.to_wire()))
    .collect()
}

/// Decode a remote hash into an object, parsing each field when asked
pub fn decode_object(raw: HashMap<String, String>, parse_type: bool) -> HashMap<String, Scalar> {
  raw
    .into_iter()
    .map(|(field, value)| {
      let scalar = Scalar::from_wire(&value, parse_type);
      (field, scalar)
    })
    .collect()
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_scalar_wire_roundtrip() {
    assert_eq!(Scalar::from_wire("123", true), Scalar::Integer(123));
    assert_eq!(Scalar::from_wire("1.5", true), Scalar::Float(1.5));
    assert_eq!(Scalar::from_wire("true", true), Scalar::Bool(true));
    assert_eq!(
      Scalar::from_wire("hello", true),
      Scalar::String("hello".to_string())
    );
  }

  #[test]
  fn test_scalar_no_parse() {
    assert_eq!(
      Scalar::from_wire("123", false),
      Scalar::String("123".to_string())
    );
    assert_eq!(
      Scalar::from_wire("true", false),
      Scalar::String("true".to_string())
    );
  }

  #[test]
  fn test_scalar_parse_downgrade() {
    // Non-primitive JSON keeps its raw text
    assert_eq!(
      Scalar::from_wire("[1,2]", true),
      Scalar::String("[1,2]".to_string())
    );
    assert_eq!(
      Scalar::from_wire("null", true),
      Scalar::String("null".to_string())
    );
  }

  #[test]
  fn test_array_codec() {
    let values = vec![serde_json::json!(1), serde_json::json!("two")];
    let text = encode_array(&values);
    assert_eq!(text, r#"[1,"two"]"#);
    assert_eq!(decode_array(&text), Some(values));
    assert_eq!(decode_array("not json"), None);
  }

  #[test]
  fn test_object_codec() {
    let mut object = HashMap::new();
    object.insert("name".to_string(), Scalar::String("n".to_string()));
    object.insert("age".to_string(), Scalar::Integer(55));

    let fields = encode_object(&object);
    let raw: HashMap<String, String> = fields.into_iter().collect();
    assert_eq!(raw.get("age"), Some(&"55".to_string()));

    let parsed = decode_object(raw.clone(), true);
    assert_eq!(parsed.get("age"), Some(&Scalar::Integer(55)));

    let unparsed = decode_object(raw, false);
    assert_eq!(unparsed.get("age"), Some(&Scalar::String("55".to_string())));
  }
}
