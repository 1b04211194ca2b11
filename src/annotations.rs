use std::collections::BTreeMap;
use std::collections::btree_map;

use serde::{Deserialize, Serialize};

/// A labelled point on a spectrum or heatmap.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Annotation {
    pub label: String,
    /// m/z for spectra, x position for everything else.
    pub position: f64,
    pub intensity: f64,
    #[serde(default)]
    pub charge: Option<i32>,
    #[serde(default = "default_color")]
    pub color: [f32; 3],
    /// Label offset relative to the annotated point, when drawn with an arrow.
    #[serde(default)]
    pub arrow: Option<(f64, f64)>,
}

fn default_color() -> [f32; 3] {
    [0.0, 0.0, 0.0]
}

impl Annotation {
    pub fn new(label: impl Into<String>, position: f64, intensity: f64) -> Self {
        Self {
            label: label.into(),
            position,
            intensity,
            charge: None,
            color: default_color(),
            arrow: None,
        }
    }

    pub fn with_charge(mut self, charge: i32) -> Self {
        self.charge = Some(charge);
        self
    }

    pub fn with_color(mut self, color: [f32; 3]) -> Self {
        self.color = color;
        self
    }

    pub fn with_arrow(mut self, dx: f64, dy: f64) -> Self {
        self.arrow = Some((dx, dy));
        self
    }
}

/// Annotations attached to exactly one payload, keyed by name.
///
/// An empty set is never left on a payload: the owner drops it when the last
/// entry goes away.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AnnotationSet {
    entries: BTreeMap<String, Annotation>,
}

impl AnnotationSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, key: &str) -> Option<&Annotation> {
        self.entries.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Returns the annotation previously stored under `key`, if any.
    pub fn insert(&mut self, key: impl Into<String>, annotation: Annotation) -> Option<Annotation> {
        self.entries.insert(key.into(), annotation)
    }

    pub fn remove(&mut self, key: &str) -> Option<Annotation> {
        self.entries.remove(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn iter(&self) -> btree_map::Iter<'_, String, Annotation> {
        self.entries.iter()
    }

    /// Union with `other`, entries of `other` winning on equal keys.
    pub fn extend(&mut self, other: AnnotationSet) {
        self.entries.extend(other.entries);
    }
}

impl FromIterator<(String, Annotation)> for AnnotationSet {
    fn from_iter<T: IntoIterator<Item = (String, Annotation)>>(iter: T) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}

impl<'a> IntoIterator for &'a AnnotationSet {
    type Item = (&'a String, &'a Annotation);
    type IntoIter = btree_map::Iter<'a, String, Annotation>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}
