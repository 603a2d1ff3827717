//! Field-name keyed records exchanged between the snapshot builder, the translator and the
//! reconciliation engine.
//!
//! Values are kept as JSON values; the typed view only appears at the persistence boundary, where
//! the `text`/`int`/`float`/`flag` accessors coerce a cell to its column type.

use log::warn;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Record(BTreeMap<String, Value>);

impl Record {
    pub fn new() -> Self {
        Record(BTreeMap::new())
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.0.insert(key.into(), value.into());
    }

    /// Builder-style insert.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.0.remove(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Overlay `other` onto `self`; fields of `other` win.
    pub fn merge_from(&mut self, other: &Record) {
        for (k, v) in &other.0 {
            self.0.insert(k.clone(), v.clone());
        }
    }

    /// True when the field is absent or JSON null.
    pub fn is_null(&self, key: &str) -> bool {
        matches!(self.0.get(key), None | Some(Value::Null))
    }

    /// Text view of a cell. Numbers and booleans are rendered, nested values serialized.
    pub fn text(&self, key: &str) -> Option<String> {
        match self.0.get(key)? {
            Value::Null => None,
            Value::String(s) => Some(s.clone()),
            Value::Bool(b) => Some(b.to_string()),
            Value::Number(n) => Some(n.to_string()),
            other => Some(other.to_string()),
        }
    }

    /// Text view that treats blank strings as absent. Used for keys.
    pub fn key_text(&self, key: &str) -> Option<String> {
        self.text(key)
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
    }

    pub fn int(&self, key: &str) -> Option<i64> {
        let value = self.0.get(key)?;
        let parsed = match value {
            Value::Null => return None,
            Value::Number(n) => n
                .as_i64()
                .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0).map(|f| f as i64)),
            Value::String(s) if s.trim().is_empty() => return None,
            Value::String(s) => {
                let s = s.trim();
                s.parse::<i64>().ok().or_else(|| {
                    s.parse::<f64>()
                        .ok()
                        .filter(|f| f.fract() == 0.0)
                        .map(|f| f as i64)
                })
            }
            Value::Bool(b) => Some(i64::from(*b)),
            _ => None,
        };
        if parsed.is_none() {
            warn!("Field {} holds {} which is not an integer; storing NULL", key, value);
        }
        parsed
    }

    pub fn float(&self, key: &str) -> Option<f64> {
        let value = self.0.get(key)?;
        let parsed = match value {
            Value::Null => return None,
            Value::Number(n) => n.as_f64(),
            Value::String(s) if s.trim().is_empty() => return None,
            Value::String(s) => s.trim().parse::<f64>().ok(),
            _ => None,
        };
        if parsed.is_none() {
            warn!("Field {} holds {} which is not a number; storing NULL", key, value);
        }
        parsed
    }

    pub fn flag(&self, key: &str) -> Option<bool> {
        let value = self.0.get(key)?;
        let parsed = match value {
            Value::Null => return None,
            Value::Bool(b) => Some(*b),
            Value::Number(n) => n.as_i64().map(|i| i != 0),
            Value::String(s) if s.trim().is_empty() => return None,
            Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
                "true" | "1" | "t" | "yes" => Some(true),
                "false" | "0" | "f" | "no" => Some(false),
                _ => None,
            },
            _ => None,
        };
        if parsed.is_none() {
            warn!("Field {} holds {} which is not a boolean; storing NULL", key, value);
        }
        parsed
    }
}

impl FromIterator<(String, Value)> for Record {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Record(iter.into_iter().collect())
    }
}

/// Left-extend `primary` with every secondary record: `[primary ∪ s for s in secondaries]`.
///
/// Secondary fields overwrite primary ones, so the lower hierarchy level wins on collisions.
/// An empty secondary list yields no records.
pub fn combine(primary: &Record, secondaries: Vec<Record>) -> Vec<Record> {
    secondaries
        .into_iter()
        .map(|secondary| {
            let mut joined = primary.clone();
            joined.merge_from(&secondary);
            joined
        })
        .collect()
}
