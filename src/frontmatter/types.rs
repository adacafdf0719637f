use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A single frontmatter value: a scalar or a list of strings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Bool(bool),
    Int(i64),
    List(Vec<String>),
    Str(String),
}

impl FieldValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            FieldValue::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[String]> {
        match self {
            FieldValue::List(items) => Some(items),
            _ => None,
        }
    }
}

/// Parsed note metadata: an ordered key -> value mapping.
///
/// Keys are stored as given (lowercased by the line scanner); iteration is
/// in key order, so serialized output is stable across runs.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Frontmatter {
    #[serde(flatten)]
    fields: BTreeMap<String, FieldValue>,
}

impl Frontmatter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Frontmatter used when nothing recoverable is found in the input.
    pub fn untitled() -> Self {
        let mut fm = Self::new();
        fm.insert("title", FieldValue::Str("Untitled".to_string()));
        fm.insert("tags", FieldValue::List(Vec::new()));
        fm.insert("main_topic", FieldValue::Str("general".to_string()));
        fm
    }

    pub fn insert(&mut self, key: &str, value: FieldValue) {
        self.fields.insert(key.to_string(), value);
    }

    pub fn get(&self, key: &str) -> Option<&FieldValue> {
        self.fields.get(key)
    }

    /// String value for a key; None if absent or not a string.
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.fields.get(key).and_then(FieldValue::as_str)
    }

    pub fn title(&self) -> Option<&str> {
        self.get_str("title")
    }

    pub fn main_topic(&self) -> Option<&str> {
        self.get_str("main_topic")
    }

    /// Tags as a list; a bare comma-separated string splits into items.
    pub fn tags(&self) -> Vec<String> {
        match self.fields.get("tags") {
            Some(FieldValue::List(items)) => items.clone(),
            Some(FieldValue::Str(s)) if !s.is_empty() => {
                s.split(',').map(|t| t.trim().to_string()).collect()
            }
            _ => Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &FieldValue)> {
        self.fields.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tags_split_comma_separated_string() {
        let mut fm = Frontmatter::new();
        fm.insert("tags", FieldValue::Str("math, calculus".to_string()));
        assert_eq!(fm.tags(), vec!["math", "calculus"]);
    }

    #[test]
    fn tags_default_to_empty() {
        let fm = Frontmatter::new();
        assert!(fm.tags().is_empty());

        let mut fm = Frontmatter::new();
        fm.insert("tags", FieldValue::Bool(true));
        assert!(fm.tags().is_empty());
    }

    #[test]
    fn untitled_has_fixed_fields() {
        let fm = Frontmatter::untitled();
        assert_eq!(fm.title(), Some("Untitled"));
        assert_eq!(fm.main_topic(), Some("general"));
        assert_eq!(fm.tags(), Vec::<String>::new());
    }
}
