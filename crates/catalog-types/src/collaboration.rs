//! Wiki and tag attachments of catalog entities.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::path::CatalogPath;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Wiki {
    #[serde(default)]
    pub text: String,
    /// Server-side version; sent back unchanged on update.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<Value>,
    /// Owning entity in the environment the wiki was read from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entity_id: Option<String>,
    #[serde(default, skip_serializing_if = "CatalogPath::is_empty")]
    pub path: CatalogPath,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Wiki {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            version: None,
            entity_id: None,
            path: CatalogPath::default(),
            extra: Map::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tags {
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entity_id: Option<String>,
    #[serde(default, skip_serializing_if = "CatalogPath::is_empty")]
    pub path: CatalogPath,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Tags {
    pub fn new<I, S>(tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            tags: tags.into_iter().map(Into::into).collect(),
            version: None,
            entity_id: None,
            path: CatalogPath::default(),
            extra: Map::new(),
        }
    }

    /// Set comparison: order and duplicates do not matter.
    pub fn same_tags(&self, other: &[String]) -> bool {
        let mut mine: Vec<&String> = self.tags.iter().collect();
        let mut theirs: Vec<&String> = other.iter().collect();
        mine.sort();
        mine.dedup();
        theirs.sort();
        theirs.dedup();
        mine == theirs
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wiki_snapshot_record_round_trips() {
        let raw = r#"{"text":"hello","version":3,"entity_id":"e1","path":["Sales"]}"#;
        let wiki: Wiki = serde_json::from_str(raw).unwrap();
        assert_eq!(wiki.path, CatalogPath::new(["Sales"]));
        assert_eq!(wiki.version, Some(Value::from(3)));
        assert_eq!(serde_json::to_string(&wiki).unwrap(), raw);
    }

    #[test]
    fn tags_compare_as_sets() {
        let tags = Tags::new(["b", "a"]);
        assert!(tags.same_tags(&["a".to_string(), "b".to_string()]));
        assert!(!tags.same_tags(&["a".to_string()]));
    }
}
