//! Recordings and the catalog a comparison session picks from.
//!
//! The catalog is loaded from a JSON array of recordings. Upload, thumbnails
//! and metadata editing live elsewhere; here a recording is just an id, a
//! playable source and its keyframe annotations.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::keyframe::KeyframeMap;

/// One recorded swing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Recording {
    #[serde(default = "Uuid::new_v4")]
    pub id: Uuid,
    #[serde(default)]
    pub title: String,
    pub source_uri: String,
    /// Known clip length, if the metadata layer recorded one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<f64>,
    #[serde(default)]
    pub keyframes: KeyframeMap,
}

impl Recording {
    pub fn new(title: impl Into<String>, source_uri: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            title: title.into(),
            source_uri: source_uri.into(),
            duration_ms: None,
            keyframes: KeyframeMap::new(),
        }
    }

    pub fn with_keyframes(mut self, keyframes: KeyframeMap) -> Self {
        self.keyframes = keyframes;
        self
    }

    pub fn with_duration(mut self, duration_ms: f64) -> Self {
        self.duration_ms = Some(duration_ms);
        self
    }

    /// Title for display, falling back to the source
    pub fn display_name(&self) -> &str {
        if self.title.is_empty() {
            &self.source_uri
        } else {
            &self.title
        }
    }
}

/// Ordered set of recordings keyed by id.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    recordings: IndexMap<Uuid, Recording>,
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a JSON array of recordings.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let list: Vec<Recording> =
            serde_json::from_str(json).context("Parse recording catalog")?;
        Ok(list.into_iter().collect())
    }

    /// Load a JSON array of recordings from disk.
    pub fn from_json<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let json = fs::read_to_string(path)
            .with_context(|| format!("Read catalog {}", path.display()))?;
        Self::from_json_str(&json).with_context(|| format!("Load catalog {}", path.display()))
    }

    /// Add or replace by id
    pub fn insert(&mut self, recording: Recording) {
        self.recordings.insert(recording.id, recording);
    }

    pub fn get(&self, id: Uuid) -> Option<&Recording> {
        self.recordings.get(&id)
    }

    /// Lookup by id string, then by exact title, then case-insensitive title.
    pub fn find(&self, query: &str) -> Option<&Recording> {
        if let Ok(id) = Uuid::parse_str(query)
            && let Some(rec) = self.recordings.get(&id)
        {
            return Some(rec);
        }
        self.recordings
            .values()
            .find(|r| r.title == query)
            .or_else(|| {
                self.recordings
                    .values()
                    .find(|r| r.title.eq_ignore_ascii_case(query))
            })
    }

    pub fn iter(&self) -> impl Iterator<Item = &Recording> {
        self.recordings.values()
    }

    pub fn len(&self) -> usize {
        self.recordings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.recordings.is_empty()
    }
}

impl FromIterator<Recording> for Catalog {
    fn from_iter<I: IntoIterator<Item = Recording>>(iter: I) -> Self {
        let mut catalog = Self::new();
        for recording in iter {
            catalog.insert(recording);
        }
        catalog
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CATALOG: &str = r#"[
        {
            "id": "6f1c2a4e-8d0b-4f7e-9a61-2c3d4e5f6a7b",
            "title": "Driver Monday",
            "sourceUri": "file:///swings/driver-mon.mp4",
            "durationMs": 5000,
            "keyframes": {
                "impact": { "timestampSec": 2.5, "description": "strike" },
                "broken": { "timestampSec": null }
            }
        },
        {
            "title": "Driver Friday",
            "sourceUri": "file:///swings/driver-fri.mp4"
        }
    ]"#;

    #[test]
    fn test_parse_catalog() {
        let catalog = Catalog::from_json_str(CATALOG).unwrap();
        assert_eq!(catalog.len(), 2);

        let monday = catalog.find("Driver Monday").unwrap();
        assert_eq!(monday.duration_ms, Some(5000.0));
        assert_eq!(monday.keyframes.len(), 1);

        let friday = catalog.find("driver friday").unwrap();
        assert!(friday.keyframes.is_empty());
        assert_eq!(friday.duration_ms, None);
    }

    #[test]
    fn test_find_by_id() {
        let catalog = Catalog::from_json_str(CATALOG).unwrap();
        let rec = catalog.find("6f1c2a4e-8d0b-4f7e-9a61-2c3d4e5f6a7b").unwrap();
        assert_eq!(rec.title, "Driver Monday");
        assert!(catalog.find("Putter").is_none());
    }

    #[test]
    fn test_missing_source_is_error() {
        let err = Catalog::from_json_str(r#"[{ "title": "no source" }]"#);
        assert!(err.is_err());
    }

    #[test]
    fn test_display_name_fallback() {
        let rec = Recording::new("", "file:///a.mp4");
        assert_eq!(rec.display_name(), "file:///a.mp4");
    }
}
