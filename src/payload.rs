use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::annotations::{Annotation, AnnotationSet};
use crate::domain::{Kind, PayloadId};

/// Axis labels and values as they were before the first relabel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AxisSnapshot {
    pub x_label: String,
    pub y_label: String,
    pub x_values: Vec<f64>,
    pub y_values: Vec<f64>,
}

/// One concrete dataset: arrays, labels, metadata, and optional annotations
/// and deconvolution results.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatasetPayload {
    #[serde(skip)]
    id: PayloadId,
    kind: Kind,
    #[serde(default)]
    pub x_values: Vec<f64>,
    #[serde(default)]
    pub y_values: Vec<f64>,
    /// Row-major intensity matrix for heatmap kinds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub z_values: Option<Vec<Vec<f64>>>,
    #[serde(default)]
    pub x_label: String,
    #[serde(default)]
    pub y_label: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    default_axes: Option<AxisSnapshot>,
    #[serde(default)]
    pub metadata: BTreeMap<String, Value>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "non_empty_annotations"
    )]
    annotations: Option<AnnotationSet>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "non_empty_results"
    )]
    unidec_results: Option<BTreeMap<String, DatasetPayload>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Axis {
    X,
    Y,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AttachOutcome {
    /// The annotation set did not exist before this call.
    pub created_set: bool,
    pub replaced: Option<Annotation>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DetachOutcome {
    pub removed: Option<Annotation>,
    /// The set became empty and was dropped from the payload.
    pub set_removed: bool,
}

impl DatasetPayload {
    pub fn new(kind: Kind, x_values: Vec<f64>, y_values: Vec<f64>) -> Self {
        Self {
            id: PayloadId::next(),
            kind,
            x_values,
            y_values,
            z_values: None,
            x_label: String::new(),
            y_label: String::new(),
            default_axes: None,
            metadata: BTreeMap::new(),
            annotations: None,
            unidec_results: None,
        }
    }

    pub fn heatmap(
        kind: Kind,
        x_values: Vec<f64>,
        y_values: Vec<f64>,
        z_values: Vec<Vec<f64>>,
    ) -> Self {
        let mut payload = Self::new(kind, x_values, y_values);
        payload.z_values = Some(z_values);
        payload
    }

    pub fn with_labels(mut self, x_label: impl Into<String>, y_label: impl Into<String>) -> Self {
        self.x_label = x_label.into();
        self.y_label = y_label.into();
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn id(&self) -> PayloadId {
        self.id
    }

    pub fn kind(&self) -> Kind {
        self.kind
    }

    pub fn len(&self) -> usize {
        self.x_values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.x_values.is_empty() && self.y_values.is_empty() && self.z_values.is_none()
    }

    /// Copy with fresh identities for this payload and every nested result.
    pub fn deep_copy(&self) -> Self {
        let mut copy = self.clone();
        copy.reissue_ids();
        copy
    }

    /// This payload's identity followed by those of its nested results.
    pub fn ids(&self) -> Vec<PayloadId> {
        let mut ids = vec![self.id];
        for result in self.unidec_results.iter().flat_map(|results| results.values()) {
            ids.extend(result.ids());
        }
        ids
    }

    pub(crate) fn reissue_ids(&mut self) {
        self.id = PayloadId::next();
        for result in self.unidec_results.iter_mut().flat_map(|results| results.values_mut()) {
            result.reissue_ids();
        }
    }

    pub(crate) fn adopt_id(&mut self, id: PayloadId) {
        self.id = id;
    }

    pub fn annotations(&self) -> Option<&AnnotationSet> {
        self.annotations.as_ref()
    }

    pub fn attach_annotation(
        &mut self,
        key: impl Into<String>,
        annotation: Annotation,
    ) -> AttachOutcome {
        let created_set = self.annotations.is_none();
        let replaced = self
            .annotations
            .get_or_insert_with(AnnotationSet::new)
            .insert(key, annotation);
        AttachOutcome {
            created_set,
            replaced,
        }
    }

    pub fn detach_annotation(&mut self, key: &str) -> DetachOutcome {
        let Some(set) = self.annotations.as_mut() else {
            return DetachOutcome {
                removed: None,
                set_removed: false,
            };
        };
        let removed = set.remove(key);
        let set_removed = set.is_empty();
        if set_removed {
            self.annotations = None;
        }
        DetachOutcome {
            removed,
            set_removed,
        }
    }

    /// Replace the whole annotation set. An empty set clears annotations.
    pub fn set_annotations(&mut self, annotations: AnnotationSet) {
        self.annotations = (!annotations.is_empty()).then_some(annotations);
    }

    pub fn take_annotations(&mut self) -> Option<AnnotationSet> {
        self.annotations.take()
    }

    pub fn unidec_results(&self) -> Option<&BTreeMap<String, DatasetPayload>> {
        self.unidec_results.as_ref()
    }

    pub fn unidec_result(&self, name: &str) -> Option<&DatasetPayload> {
        self.unidec_results.as_ref().and_then(|map| map.get(name))
    }

    pub fn insert_unidec_result(
        &mut self,
        name: impl Into<String>,
        result: DatasetPayload,
    ) -> Option<DatasetPayload> {
        self.unidec_results
            .get_or_insert_with(BTreeMap::new)
            .insert(name.into(), result)
    }

    pub fn remove_unidec_result(&mut self, name: &str) -> Option<DatasetPayload> {
        let map = self.unidec_results.as_mut()?;
        let removed = map.remove(name);
        if map.is_empty() {
            self.unidec_results = None;
        }
        removed
    }

    pub(crate) fn take_unidec_results(&mut self) -> Option<BTreeMap<String, DatasetPayload>> {
        self.unidec_results.take()
    }

    pub fn default_axes(&self) -> Option<&AxisSnapshot> {
        self.default_axes.as_ref()
    }

    fn capture_default_axes(&mut self) {
        if self.default_axes.is_none() {
            self.default_axes = Some(AxisSnapshot {
                x_label: self.x_label.clone(),
                y_label: self.y_label.clone(),
                x_values: self.x_values.clone(),
                y_values: self.y_values.clone(),
            });
        }
    }

    /// Convert the x axis to new units. The first call records the original
    /// axes so they can be restored later.
    pub fn relabel_x(&mut self, label: impl Into<String>, convert: impl Fn(f64) -> f64) {
        self.capture_default_axes();
        self.x_values.iter_mut().for_each(|value| *value = convert(*value));
        self.x_label = label.into();
    }

    pub fn relabel_y(&mut self, label: impl Into<String>, convert: impl Fn(f64) -> f64) {
        self.capture_default_axes();
        self.y_values.iter_mut().for_each(|value| *value = convert(*value));
        self.y_label = label.into();
    }

    pub fn relabel(&mut self, axis: Axis, label: impl Into<String>, convert: impl Fn(f64) -> f64) {
        match axis {
            Axis::X => self.relabel_x(label, convert),
            Axis::Y => self.relabel_y(label, convert),
        }
    }

    /// Returns `false` if the axes were never relabelled.
    pub fn restore_default_axes(&mut self) -> bool {
        let Some(snapshot) = self.default_axes.as_ref() else {
            return false;
        };
        self.x_label = snapshot.x_label.clone();
        self.y_label = snapshot.y_label.clone();
        self.x_values = snapshot.x_values.clone();
        self.y_values = snapshot.y_values.clone();
        true
    }
}

/// Content equality. Identity (`id`) is ignored.
impl PartialEq for DatasetPayload {
    fn eq(&self, other: &Self) -> bool {
        self.kind == other.kind
            && self.x_values == other.x_values
            && self.y_values == other.y_values
            && self.z_values == other.z_values
            && self.x_label == other.x_label
            && self.y_label == other.y_label
            && self.default_axes == other.default_axes
            && self.metadata == other.metadata
            && self.annotations == other.annotations
            && self.unidec_results == other.unidec_results
    }
}

fn non_empty_annotations<'de, D>(deserializer: D) -> Result<Option<AnnotationSet>, D::Error>
where
    D: Deserializer<'de>,
{
    let set = Option::<AnnotationSet>::deserialize(deserializer)?;
    Ok(set.filter(|set| !set.is_empty()))
}

fn non_empty_results<'de, D>(
    deserializer: D,
) -> Result<Option<BTreeMap<String, DatasetPayload>>, D::Error>
where
    D: Deserializer<'de>,
{
    let map = Option::<BTreeMap<String, DatasetPayload>>::deserialize(deserializer)?;
    Ok(map.filter(|map| !map.is_empty()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spectrum() -> DatasetPayload {
        DatasetPayload::new(Kind::MassSpectrum, vec![100.0, 200.0], vec![1.0, 5.0])
            .with_labels("m/z", "Intensity")
    }

    #[test]
    fn default_axes_captured_once() {
        let mut payload = spectrum();
        payload.relabel_x("m/z (x2)", |x| x * 2.0);
        payload.relabel_x("m/z (x4)", |x| x * 2.0);

        let snapshot = payload.default_axes().unwrap();
        assert_eq!(snapshot.x_label, "m/z");
        assert_eq!(snapshot.x_values, vec![100.0, 200.0]);
        assert_eq!(payload.x_values, vec![400.0, 800.0]);

        assert!(payload.restore_default_axes());
        assert_eq!(payload.x_label, "m/z");
        assert_eq!(payload.x_values, vec![100.0, 200.0]);
        assert!(payload.default_axes().is_some());
    }

    #[test]
    fn restore_without_snapshot_is_noop() {
        let mut payload = spectrum();
        assert!(!payload.restore_default_axes());
    }

    #[test]
    fn detaching_last_annotation_drops_set() {
        let mut payload = spectrum();
        let outcome = payload.attach_annotation("peak1", Annotation::new("p1", 100.0, 1.0));
        assert!(outcome.created_set);
        let outcome = payload.attach_annotation("peak2", Annotation::new("p2", 200.0, 5.0));
        assert!(!outcome.created_set);

        let outcome = payload.detach_annotation("peak1");
        assert!(outcome.removed.is_some());
        assert!(!outcome.set_removed);

        let outcome = payload.detach_annotation("peak2");
        assert!(outcome.set_removed);
        assert!(payload.annotations().is_none());
    }

    #[test]
    fn deep_copy_assigns_new_ids() {
        let mut payload = spectrum();
        payload.insert_unidec_result("MW distribution", spectrum());
        let copy = payload.deep_copy();

        assert_ne!(copy.id(), payload.id());
        assert_ne!(
            copy.unidec_result("MW distribution").unwrap().id(),
            payload.unidec_result("MW distribution").unwrap().id()
        );
        assert_eq!(copy, payload);
    }

    #[test]
    fn empty_annotation_set_is_dropped_on_load() {
        let json = r#"{"kind":"mass-spectrum","x_values":[1.0],"y_values":[2.0],"annotations":{}}"#;
        let payload: DatasetPayload = serde_json::from_str(json).unwrap();
        assert!(payload.annotations().is_none());
    }
}
