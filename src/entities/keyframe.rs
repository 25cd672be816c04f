//! Swing keyframes and cross-recording alignment.
//!
//! A keyframe is a named instant inside one recording ("impact",
//! "top_of_backswing") with a timestamp local to that recording.
//! Two recordings share no clock, so alignment is purely by name:
//!
//! - Names present in both maps become a [`CommonKeyframe`]
//! - Each side keeps its own timestamp (jumping seeks each player separately)
//! - No fuzzy or nearest-timestamp matching
//!
//! # Ordering
//!
//! Output is sorted by the left recording's timestamp, ties broken by name,
//! so quick-jump buttons lay out in swing order and the result is
//! deterministic for a given pair of inputs.

use indexmap::IndexMap;
use log::debug;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use super::side::Side;

/// One annotated instant within a single recording.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Keyframe {
    /// Seconds from the start of the recording
    pub timestamp_sec: f64,
    #[serde(default)]
    pub description: String,
}

impl Keyframe {
    pub fn new(timestamp_sec: f64, description: impl Into<String>) -> Self {
        Self {
            timestamp_sec,
            description: description.into(),
        }
    }

    /// Finite and non-negative
    pub fn is_valid(&self) -> bool {
        self.timestamp_sec.is_finite() && self.timestamp_sec >= 0.0
    }

    pub fn timestamp_ms(&self) -> f64 {
        self.timestamp_sec * 1000.0
    }
}

/// Event name -> keyframe, unique names per recording.
///
/// Read-only to the sync engine. Deserialization is lenient: entries that are
/// not a valid [`Keyframe`] object are dropped instead of failing the whole
/// annotation payload.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct KeyframeMap {
    entries: IndexMap<String, Keyframe>,
}

impl KeyframeMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a keyframe. Invalid timestamps are rejected (returns false).
    pub fn insert(&mut self, name: impl Into<String>, keyframe: Keyframe) -> bool {
        let name = name.into();
        if !keyframe.is_valid() {
            debug!("Keyframe '{}' rejected: timestamp {}", name, keyframe.timestamp_sec);
            return false;
        }
        self.entries.insert(name, keyframe);
        true
    }

    /// Builder-style insert
    pub fn with(mut self, name: impl Into<String>, timestamp_sec: f64, description: &str) -> Self {
        self.insert(name, Keyframe::new(timestamp_sec, description));
        self
    }

    pub fn get(&self, name: &str) -> Option<&Keyframe> {
        self.entries.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Keyframe)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// Build from an annotation JSON object, skipping malformed entries.
    pub fn from_value(value: &Value) -> Self {
        let mut map = Self::new();
        let Some(object) = value.as_object() else {
            if !value.is_null() {
                debug!("Keyframe payload is not an object, ignoring");
            }
            return map;
        };

        for (name, raw) in object {
            match serde_json::from_value::<Keyframe>(raw.clone()) {
                Ok(keyframe) => {
                    map.insert(name.clone(), keyframe);
                }
                Err(e) => debug!("Keyframe '{}' skipped: {}", name, e),
            }
        }
        map
    }
}

impl<'de> Deserialize<'de> for KeyframeMap {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Ok(Self::from_value(&value))
    }
}

impl FromIterator<(String, Keyframe)> for KeyframeMap {
    fn from_iter<I: IntoIterator<Item = (String, Keyframe)>>(iter: I) -> Self {
        let mut map = Self::new();
        for (name, keyframe) in iter {
            map.insert(name, keyframe);
        }
        map
    }
}

/// A keyframe name present in both recordings, with per-side targets.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommonKeyframe {
    pub name: String,
    pub left_timestamp_ms: f64,
    pub right_timestamp_ms: f64,
    pub label: String,
}

impl CommonKeyframe {
    /// Seek target for one side
    pub fn timestamp_ms(&self, side: Side) -> f64 {
        match side {
            Side::Left => self.left_timestamp_ms,
            Side::Right => self.right_timestamp_ms,
        }
    }

    /// Scrubber display position after a jump (mean of both targets)
    pub fn display_position_ms(&self) -> f64 {
        (self.left_timestamp_ms + self.right_timestamp_ms) / 2.0
    }
}

/// Intersect two keyframe maps on name.
///
/// Sorted by left timestamp ascending, then by name.
pub fn align_common_keyframes(left: &KeyframeMap, right: &KeyframeMap) -> Vec<CommonKeyframe> {
    let mut common: Vec<CommonKeyframe> = left
        .iter()
        .filter_map(|(name, lk)| {
            let rk = right.get(name)?;
            Some(CommonKeyframe {
                name: name.to_string(),
                left_timestamp_ms: lk.timestamp_ms(),
                right_timestamp_ms: rk.timestamp_ms(),
                label: keyframe_label(name),
            })
        })
        .collect();

    common.sort_by(|a, b| {
        a.left_timestamp_ms
            .total_cmp(&b.left_timestamp_ms)
            .then_with(|| a.name.cmp(&b.name))
    });
    common
}

/// "top_of_backswing" -> "Top Of Backswing"
pub fn keyframe_label(name: &str) -> String {
    name.replace('_', " ")
        .split(' ')
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::BTreeSet;

    fn names(common: &[CommonKeyframe]) -> BTreeSet<String> {
        common.iter().map(|k| k.name.clone()).collect()
    }

    #[test]
    fn test_only_shared_names_survive() {
        let left = KeyframeMap::new()
            .with("address", 0.2, "")
            .with("impact", 2.5, "")
            .with("finish", 4.0, "");
        let right = KeyframeMap::new()
            .with("impact", 3.1, "")
            .with("takeaway", 0.9, "")
            .with("finish", 4.6, "");

        let common = align_common_keyframes(&left, &right);
        assert_eq!(common.len(), 2);
        for k in &common {
            assert!(left.contains(&k.name));
            assert!(right.contains(&k.name));
        }
        assert!(!names(&common).contains("address"));
        assert!(!names(&common).contains("takeaway"));
    }

    #[test]
    fn test_per_side_timestamps_in_ms() {
        let left = KeyframeMap::new().with("impact", 2.5, "ball strike");
        let right = KeyframeMap::new().with("impact", 3.1, "ball strike");

        let common = align_common_keyframes(&left, &right);
        assert_eq!(common[0].left_timestamp_ms, 2500.0);
        assert!((common[0].right_timestamp_ms - 3100.0).abs() < 1e-9);
        assert!((common[0].display_position_ms() - 2800.0).abs() < 1e-9);
    }

    #[test]
    fn test_swap_keeps_name_set_but_not_sides() {
        let a = KeyframeMap::new()
            .with("impact", 2.5, "")
            .with("top_of_backswing", 1.4, "")
            .with("only_a", 0.1, "");
        let b = KeyframeMap::new()
            .with("impact", 3.1, "")
            .with("top_of_backswing", 2.0, "");

        let ab = align_common_keyframes(&a, &b);
        let ba = align_common_keyframes(&b, &a);
        assert_eq!(names(&ab), names(&ba));

        let ab_impact = ab.iter().find(|k| k.name == "impact").unwrap();
        let ba_impact = ba.iter().find(|k| k.name == "impact").unwrap();
        assert_eq!(ab_impact.left_timestamp_ms, ba_impact.right_timestamp_ms);
        assert_eq!(ab_impact.right_timestamp_ms, ba_impact.left_timestamp_ms);
    }

    #[test]
    fn test_sorted_by_left_timestamp_then_name() {
        let left = KeyframeMap::new()
            .with("finish", 4.0, "")
            .with("impact", 2.5, "")
            .with("transition", 1.5, "")
            .with("top", 1.5, "");
        let right = KeyframeMap::new()
            .with("impact", 1.0, "")
            .with("finish", 0.5, "")
            .with("top", 3.0, "")
            .with("transition", 2.0, "");

        let order: Vec<_> = align_common_keyframes(&left, &right)
            .into_iter()
            .map(|k| k.name)
            .collect();
        assert_eq!(order, vec!["top", "transition", "impact", "finish"]);
    }

    #[test]
    fn test_label_title_case() {
        assert_eq!(keyframe_label("impact"), "Impact");
        assert_eq!(keyframe_label("top_of_backswing"), "Top Of Backswing");
        assert_eq!(keyframe_label("mid_downswing"), "Mid Downswing");
    }

    #[test]
    fn test_lenient_deserialize_skips_malformed() {
        let raw = json!({
            "impact": { "timestampSec": 2.5, "description": "strike" },
            "finish": { "timestampSec": "late" },
            "address": { "description": "no time" },
            "top": { "timestampSec": -1.0 },
            "takeaway": 7,
            "transition": { "timestampSec": 1.2 }
        });
        let map: KeyframeMap = serde_json::from_value(raw).unwrap();
        assert_eq!(map.len(), 2);
        assert_eq!(map.get("impact").unwrap().description, "strike");
        assert_eq!(map.get("transition").unwrap().description, "");
        assert!(!map.contains("finish"));
        assert!(!map.contains("top"));
    }

    #[test]
    fn test_non_object_payload_is_empty() {
        let map: KeyframeMap = serde_json::from_value(json!([1, 2, 3])).unwrap();
        assert!(map.is_empty());
        let map: KeyframeMap = serde_json::from_value(Value::Null).unwrap();
        assert!(map.is_empty());
    }

    #[test]
    fn test_empty_inputs() {
        let full = KeyframeMap::new().with("impact", 1.0, "");
        assert!(align_common_keyframes(&KeyframeMap::new(), &full).is_empty());
        assert!(align_common_keyframes(&full, &KeyframeMap::new()).is_empty());
    }
}
