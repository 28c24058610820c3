//! Catalog paths.
//!
//! The catalog addresses everything below a top-level container by an ordered
//! list of segments. The lineage endpoint is inconsistent about the shape it
//! returns, so deserialization accepts both a JSON list and a `/`-separated
//! string.

use std::fmt;
use std::str::FromStr;

use serde::de::{self, SeqAccess, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Prefix marking a personal (home) namespace.
pub const PERSONAL_PREFIX: char = '@';

#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CatalogPath(Vec<String>);

impl CatalogPath {
    pub fn new<I, S>(segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(segments.into_iter().map(Into::into).collect())
    }

    pub fn segments(&self) -> &[String] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// First segment: the name of the owning home, space or source.
    pub fn root(&self) -> Option<&str> {
        self.0.first().map(String::as_str)
    }

    /// Last segment.
    pub fn name(&self) -> Option<&str> {
        self.0.last().map(String::as_str)
    }

    pub fn parent(&self) -> Option<CatalogPath> {
        if self.0.len() < 2 {
            return None;
        }
        Some(Self(self.0[..self.0.len() - 1].to_vec()))
    }

    pub fn child(&self, segment: impl Into<String>) -> CatalogPath {
        let mut segments = self.0.clone();
        segments.push(segment.into());
        Self(segments)
    }

    /// True when the path lives under a personal `@user` namespace.
    pub fn is_personal(&self) -> bool {
        self.root()
            .map(|root| root.starts_with(PERSONAL_PREFIX))
            .unwrap_or(false)
    }

    /// A single-segment path is a bare table name that needs an SQL context.
    pub fn is_unqualified(&self) -> bool {
        self.0.len() == 1
    }

    /// Resolve a bare name against an SQL context. Qualified paths and empty
    /// contexts leave the path unchanged.
    pub fn qualified_with(&self, sql_context: Option<&CatalogPath>) -> CatalogPath {
        match sql_context {
            Some(context) if self.is_unqualified() && !context.is_empty() => {
                let mut segments = context.0.clone();
                segments.extend(self.0.iter().cloned());
                Self(segments)
            }
            _ => self.clone(),
        }
    }

    /// `/`-joined form used by the `catalog/by-path` endpoint.
    pub fn to_slash_string(&self) -> String {
        self.0.join("/")
    }

    /// Double-quoted, dot-separated SQL identifier.
    pub fn to_sql_identifier(&self) -> String {
        self.0
            .iter()
            .map(|segment| format!("\"{}\"", segment.replace('"', "\"\"")))
            .collect::<Vec<_>>()
            .join(".")
    }
}

impl fmt::Display for CatalogPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_slash_string())
    }
}

impl FromStr for CatalogPath {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(
            s.split('/')
                .filter(|segment| !segment.is_empty())
                .map(str::to_string)
                .collect(),
        ))
    }
}

impl From<Vec<String>> for CatalogPath {
    fn from(segments: Vec<String>) -> Self {
        Self(segments)
    }
}

impl From<&[&str]> for CatalogPath {
    fn from(segments: &[&str]) -> Self {
        Self::new(segments.iter().copied())
    }
}

impl Serialize for CatalogPath {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.0.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for CatalogPath {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct PathVisitor;

        impl<'de> Visitor<'de> for PathVisitor {
            type Value = CatalogPath;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a list of path segments or a '/'-separated path")
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<CatalogPath, E> {
                Ok(v.parse().unwrap_or_default())
            }

            fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<CatalogPath, A::Error> {
                let mut segments = Vec::with_capacity(seq.size_hint().unwrap_or(0));
                while let Some(segment) = seq.next_element::<String>()? {
                    segments.push(segment);
                }
                Ok(CatalogPath(segments))
            }
        }

        deserializer.deserialize_any(PathVisitor)
    }
}
