use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::conflict::{
    Conflict, ConflictPolicy, ConflictPrompt, ImportConflictResolver, MergeStrategy, UpdateMerge,
};
use crate::domain::{ConflictAction, Kind, PayloadId, SlotShape};
use crate::error::CatalogError;
use crate::naming;
use crate::payload::DatasetPayload;

/// Everything a `put` needs to settle a conflicting insert.
pub struct ImportContext<'a, 'p> {
    pub resolver: ImportConflictResolver,
    pub prompt: Option<&'a mut (dyn ConflictPrompt + 'p)>,
    pub merge: &'a dyn MergeStrategy,
}

impl ImportContext<'static, 'static> {
    pub fn with_policy(policy: ConflictPolicy) -> Self {
        Self {
            resolver: ImportConflictResolver::new(policy),
            prompt: None,
            merge: &UpdateMerge,
        }
    }
}

impl<'a, 'p> ImportContext<'a, 'p> {
    pub fn new(
        resolver: ImportConflictResolver,
        prompt: Option<&'a mut (dyn ConflictPrompt + 'p)>,
        merge: &'a dyn MergeStrategy,
    ) -> Self {
        Self {
            resolver,
            prompt,
            merge,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertAction {
    Inserted,
    Overridden,
    Merged,
    Duplicated,
}

impl InsertAction {
    pub fn as_str(self) -> &'static str {
        match self {
            InsertAction::Inserted => "inserted",
            InsertAction::Overridden => "overridden",
            InsertAction::Merged => "merged",
            InsertAction::Duplicated => "duplicated",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InsertOutcome {
    /// Key the payload ended up under; `None` for singleton slots.
    pub key: Option<String>,
    pub action: InsertAction,
    /// Action the user chose with "don't ask again"; the caller persists it.
    pub remember: Option<ConflictAction>,
}

#[derive(Debug, Clone)]
enum Slot {
    Single(DatasetPayload),
    Many(BTreeMap<String, DatasetPayload>),
}

/// Per-document store of dataset slots, one per [`Kind`].
///
/// A slot exists only while it holds data, so [`DatasetCatalog::has`] can
/// never report an empty collection as present.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(try_from = "CatalogRepr", into = "CatalogRepr")]
pub struct DatasetCatalog {
    slots: BTreeMap<Kind, Slot>,
}

impl DatasetCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn has(&self, kind: Kind) -> bool {
        self.slots.contains_key(&kind)
    }

    pub fn kinds(&self) -> impl Iterator<Item = Kind> + '_ {
        self.slots.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.slots
            .values()
            .map(|slot| match slot {
                Slot::Single(_) => 1,
                Slot::Many(map) => map.len(),
            })
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn keys(&self, kind: Kind) -> Vec<&str> {
        match self.slots.get(&kind) {
            Some(Slot::Many(map)) => map.keys().map(String::as_str).collect(),
            _ => Vec::new(),
        }
    }

    pub fn contains(&self, kind: Kind, key: Option<&str>) -> bool {
        matches!(self.get(kind, key), Ok(Some(_)))
    }

    /// Whether any stored payload, or any of its nested results, carries `id`.
    pub fn holds_id(&self, id: PayloadId) -> bool {
        self.iter().any(|(_, _, payload)| payload.ids().contains(&id))
    }

    pub(crate) fn payloads_mut(&mut self) -> impl Iterator<Item = &mut DatasetPayload> + '_ {
        self.slots.values_mut().flat_map(
            |slot| -> Box<dyn Iterator<Item = &mut DatasetPayload> + '_> {
                match slot {
                    Slot::Single(payload) => Box::new(std::iter::once(payload)),
                    Slot::Many(map) => Box::new(map.values_mut()),
                }
            },
        )
    }

    /// All entries in kind order, then key order.
    pub fn iter(&self) -> impl Iterator<Item = (Kind, Option<&str>, &DatasetPayload)> + '_ {
        self.slots.iter().flat_map(
            |(kind, slot)| -> Box<dyn Iterator<Item = (Kind, Option<&str>, &DatasetPayload)> + '_> {
                let kind = *kind;
                match slot {
                    Slot::Single(payload) => Box::new(std::iter::once((kind, None, payload))),
                    Slot::Many(map) => Box::new(
                        map.iter()
                            .map(move |(key, payload)| (kind, Some(key.as_str()), payload)),
                    ),
                }
            },
        )
    }

    pub fn get(&self, kind: Kind, key: Option<&str>) -> Result<Option<&DatasetPayload>, CatalogError> {
        check_shape(kind, key)?;
        Ok(match (self.slots.get(&kind), key) {
            (Some(Slot::Single(payload)), None) => Some(payload),
            (Some(Slot::Many(map)), Some(key)) => map.get(key),
            _ => None,
        })
    }

    pub fn get_mut(
        &mut self,
        kind: Kind,
        key: Option<&str>,
    ) -> Result<Option<&mut DatasetPayload>, CatalogError> {
        check_shape(kind, key)?;
        Ok(match (self.slots.get_mut(&kind), key) {
            (Some(Slot::Single(payload)), None) => Some(payload),
            (Some(Slot::Many(map)), Some(key)) => map.get_mut(key),
            _ => None,
        })
    }

    /// Insert `payload`, consulting the conflict resolver if the target is
    /// occupied. Nothing is modified when an error is returned.
    pub fn put(
        &mut self,
        kind: Kind,
        key: Option<&str>,
        mut payload: DatasetPayload,
        ctx: &mut ImportContext<'_, '_>,
    ) -> Result<InsertOutcome, CatalogError> {
        check_shape(kind, key)?;
        if payload.kind() != kind {
            return Err(CatalogError::kind_mismatch(
                kind,
                format!("payload holds {}", payload.kind()),
            ));
        }
        // one entry per identity
        if payload.ids().into_iter().any(|id| self.holds_id(id)) {
            payload.reissue_ids();
        }

        let existing = self.get(kind, key)?;
        let conflict = Conflict {
            kind,
            key,
            existing_key_present: existing.is_some(),
            existing,
        };
        let Some(resolution) = ctx.resolver.resolve(&conflict, ctx.prompt.as_deref_mut())? else {
            self.insert_raw(kind, key, payload);
            return Ok(InsertOutcome {
                key: key.map(str::to_string),
                action: InsertAction::Inserted,
                remember: None,
            });
        };
        let remember = resolution.remember.then_some(resolution.action);

        let action = match (resolution.action, key) {
            (ConflictAction::Duplicate, None) => {
                tracing::warn!(%kind, "cannot duplicate a single-entry slot, overriding instead");
                ConflictAction::Override
            }
            (action, _) => action,
        };

        match action {
            ConflictAction::Override => {
                self.insert_raw(kind, key, payload);
                Ok(InsertOutcome {
                    key: key.map(str::to_string),
                    action: InsertAction::Overridden,
                    remember,
                })
            }
            ConflictAction::Merge => {
                let Some(existing) = self.get(kind, key)? else {
                    self.insert_raw(kind, key, payload);
                    return Ok(InsertOutcome {
                        key: key.map(str::to_string),
                        action: InsertAction::Inserted,
                        remember,
                    });
                };
                let existing_id = existing.id();
                let mut merged = ctx.merge.merge(existing, payload);
                if merged.kind() != kind {
                    return Err(CatalogError::kind_mismatch(
                        kind,
                        format!("merge produced {}", merged.kind()),
                    ));
                }
                merged.adopt_id(existing_id);
                self.insert_raw(kind, key, merged);
                Ok(InsertOutcome {
                    key: key.map(str::to_string),
                    action: InsertAction::Merged,
                    remember,
                })
            }
            ConflictAction::Duplicate => {
                let base = key.unwrap_or_default();
                let new_key = naming::unique_key(base, |candidate| {
                    self.contains(kind, Some(candidate))
                });
                self.insert_raw(kind, Some(&new_key), payload);
                Ok(InsertOutcome {
                    key: Some(new_key),
                    action: InsertAction::Duplicated,
                    remember,
                })
            }
        }
    }

    /// Removing an absent entry is not an error; it returns `None`.
    pub fn remove(
        &mut self,
        kind: Kind,
        key: Option<&str>,
    ) -> Result<Option<DatasetPayload>, CatalogError> {
        check_shape(kind, key)?;
        let removed = match key {
            None => match self.slots.remove(&kind) {
                Some(Slot::Single(payload)) => Some(payload),
                _ => None,
            },
            Some(key) => {
                let Some(Slot::Many(map)) = self.slots.get_mut(&kind) else {
                    return Ok(None);
                };
                let removed = map.remove(key);
                if map.is_empty() {
                    self.slots.remove(&kind);
                }
                removed
            }
        };
        Ok(removed)
    }

    /// Re-key an entry in place. The payload keeps its identity and
    /// annotations.
    pub fn rename(&mut self, kind: Kind, old_key: &str, new_key: &str) -> Result<(), CatalogError> {
        if !kind.is_collection() {
            return Err(CatalogError::kind_mismatch(
                kind,
                "single-entry slots have no key to rename",
            ));
        }
        let Some(Slot::Many(map)) = self.slots.get_mut(&kind) else {
            return Err(CatalogError::KeyNotFound(old_key.to_string()));
        };
        if !map.contains_key(old_key) {
            return Err(CatalogError::KeyNotFound(old_key.to_string()));
        }
        if old_key == new_key {
            return Ok(());
        }
        if map.contains_key(new_key) {
            return Err(CatalogError::KeyConflict(new_key.to_string()));
        }
        if let Some(payload) = map.remove(old_key) {
            map.insert(new_key.to_string(), payload);
        }
        Ok(())
    }

    /// Consume the catalog, yielding entries in kind order, then key order.
    pub fn into_entries(self) -> Vec<(Kind, Option<String>, DatasetPayload)> {
        CatalogRepr::from(self)
            .entries
            .into_iter()
            .map(|entry| (entry.kind, entry.key, entry.payload))
            .collect()
    }

    /// Independent copy: every payload gets a fresh identity.
    pub fn deep_copy(&self) -> Self {
        let slots = self
            .slots
            .iter()
            .map(|(kind, slot)| {
                let slot = match slot {
                    Slot::Single(payload) => Slot::Single(payload.deep_copy()),
                    Slot::Many(map) => Slot::Many(
                        map.iter()
                            .map(|(key, payload)| (key.clone(), payload.deep_copy()))
                            .collect(),
                    ),
                };
                (*kind, slot)
            })
            .collect();
        Self { slots }
    }

    fn insert_raw(&mut self, kind: Kind, key: Option<&str>, payload: DatasetPayload) {
        match key {
            None => {
                self.slots.insert(kind, Slot::Single(payload));
            }
            Some(key) => {
                let slot = self
                    .slots
                    .entry(kind)
                    .or_insert_with(|| Slot::Many(BTreeMap::new()));
                if let Slot::Many(map) = slot {
                    map.insert(key.to_string(), payload);
                }
            }
        }
    }
}

/// Content equality, ignoring payload identities.
impl PartialEq for DatasetCatalog {
    fn eq(&self, other: &Self) -> bool {
        self.iter().eq(other.iter())
    }
}

fn check_shape(kind: Kind, key: Option<&str>) -> Result<(), CatalogError> {
    match (kind.shape(), key) {
        (SlotShape::Singleton, Some(key)) => Err(CatalogError::kind_mismatch(
            kind,
            format!("single-entry slot does not take a key (got `{key}`)"),
        )),
        (SlotShape::Collection, None) => Err(CatalogError::kind_mismatch(
            kind,
            "collection slot requires a key",
        )),
        _ => Ok(()),
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct CatalogRepr {
    #[serde(default)]
    entries: Vec<CatalogEntry>,
}

#[derive(Debug, Serialize, Deserialize)]
struct CatalogEntry {
    kind: Kind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    key: Option<String>,
    payload: DatasetPayload,
}

impl TryFrom<CatalogRepr> for DatasetCatalog {
    type Error = CatalogError;

    fn try_from(repr: CatalogRepr) -> Result<Self, Self::Error> {
        let mut catalog = DatasetCatalog::new();
        for entry in repr.entries {
            check_shape(entry.kind, entry.key.as_deref())?;
            if entry.payload.kind() != entry.kind {
                return Err(CatalogError::kind_mismatch(
                    entry.kind,
                    format!("stored payload holds {}", entry.payload.kind()),
                ));
            }
            if catalog.contains(entry.kind, entry.key.as_deref()) {
                return Err(CatalogError::KeyConflict(
                    entry.key.unwrap_or_else(|| entry.kind.to_string()),
                ));
            }
            catalog.insert_raw(entry.kind, entry.key.as_deref(), entry.payload);
        }
        Ok(catalog)
    }
}

impl From<DatasetCatalog> for CatalogRepr {
    fn from(catalog: DatasetCatalog) -> Self {
        let entries = catalog
            .slots
            .into_iter()
            .flat_map(|(kind, slot)| -> Vec<CatalogEntry> {
                match slot {
                    Slot::Single(payload) => vec![CatalogEntry {
                        kind,
                        key: None,
                        payload,
                    }],
                    Slot::Many(map) => map
                        .into_iter()
                        .map(|(key, payload)| CatalogEntry {
                            kind,
                            key: Some(key),
                            payload,
                        })
                        .collect(),
                }
            })
            .collect();
        Self { entries }
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use assert_matches::assert_matches;

    use super::*;
    use crate::annotations::Annotation;

    fn ms(intensity: f64) -> DatasetPayload {
        DatasetPayload::new(Kind::MassSpectrum, vec![500.0], vec![intensity])
    }

    fn ion(intensity: f64) -> DatasetPayload {
        DatasetPayload::heatmap(
            Kind::IonHeatmaps,
            vec![1.0, 2.0],
            vec![10.0],
            vec![vec![intensity, intensity]],
        )
    }

    #[test]
    fn put_then_get_round_trip() {
        let mut catalog = DatasetCatalog::new();
        let mut ctx = ImportContext::with_policy(ConflictPolicy::fixed(ConflictAction::Override));
        let payload = ms(1.0);
        let outcome = catalog.put(Kind::MassSpectrum, None, payload.clone(), &mut ctx).unwrap();
        assert_eq!(outcome.action, InsertAction::Inserted);
        assert_eq!(catalog.get(Kind::MassSpectrum, None).unwrap(), Some(&payload));
        assert!(catalog.has(Kind::MassSpectrum));
    }

    #[test]
    fn key_presence_must_match_shape() {
        let catalog = DatasetCatalog::new();
        assert_matches!(
            catalog.get(Kind::MassSpectrum, Some("x")),
            Err(CatalogError::KindMismatch { .. })
        );
        assert_matches!(
            catalog.get(Kind::IonHeatmaps, None),
            Err(CatalogError::KindMismatch { .. })
        );
    }

    #[test]
    fn payload_kind_must_match_slot() {
        let mut catalog = DatasetCatalog::new();
        let mut ctx = ImportContext::with_policy(ConflictPolicy::fixed(ConflictAction::Override));
        let err = catalog
            .put(Kind::Chromatogram, None, ms(1.0), &mut ctx)
            .unwrap_err();
        assert_matches!(err, CatalogError::KindMismatch { .. });
        assert!(catalog.is_empty());
    }

    #[test]
    fn override_replaces_singleton() {
        let mut catalog = DatasetCatalog::new();
        let mut ctx = ImportContext::with_policy(ConflictPolicy::fixed(ConflictAction::Override));
        catalog.put(Kind::MassSpectrum, None, ms(1.0), &mut ctx).unwrap();
        let outcome = catalog.put(Kind::MassSpectrum, None, ms(2.0), &mut ctx).unwrap();
        assert_eq!(outcome.action, InsertAction::Overridden);
        assert_eq!(catalog.get(Kind::MassSpectrum, None).unwrap().unwrap().y_values, vec![2.0]);
        assert_eq!(catalog.len(), 1);
    }

    #[test]
    fn duplicate_produces_numbered_keys() {
        let mut catalog = DatasetCatalog::new();
        let mut ctx = ImportContext::with_policy(ConflictPolicy::fixed(ConflictAction::Duplicate));
        for n in 0..4 {
            catalog
                .put(Kind::IonHeatmaps, Some("name"), ion(n as f64), &mut ctx)
                .unwrap();
        }
        assert_eq!(
            catalog.keys(Kind::IonHeatmaps),
            vec!["name", "name (2)", "name (3)", "name (4)"]
        );
    }

    #[test]
    fn duplicate_on_singleton_overrides() {
        let mut catalog = DatasetCatalog::new();
        let mut ctx = ImportContext::with_policy(ConflictPolicy::fixed(ConflictAction::Duplicate));
        catalog.put(Kind::MassSpectrum, None, ms(1.0), &mut ctx).unwrap();
        let outcome = catalog.put(Kind::MassSpectrum, None, ms(2.0), &mut ctx).unwrap();
        assert_eq!(outcome.action, InsertAction::Overridden);
        assert_eq!(catalog.len(), 1);
    }

    #[test]
    fn merge_applied_once_and_keeps_identity() {
        let mut catalog = DatasetCatalog::new();
        let calls = Cell::new(0);
        let merge = |existing: &DatasetPayload, incoming: DatasetPayload| {
            calls.set(calls.get() + 1);
            let mut merged = existing.clone();
            merged.y_values.extend(incoming.y_values);
            merged
        };
        let mut ctx = ImportContext::new(
            ImportConflictResolver::new(ConflictPolicy::fixed(ConflictAction::Merge)),
            None,
            &merge,
        );
        catalog.put(Kind::IonHeatmaps, Some("400-420"), ion(1.0), &mut ctx).unwrap();
        let original_id = catalog
            .get(Kind::IonHeatmaps, Some("400-420"))
            .unwrap()
            .unwrap()
            .id();
        let mut incoming = ion(2.0);
        incoming.y_values = vec![20.0];
        let outcome = catalog
            .put(Kind::IonHeatmaps, Some("400-420"), incoming, &mut ctx)
            .unwrap();

        assert_eq!(outcome.action, InsertAction::Merged);
        assert_eq!(calls.get(), 1);
        let merged = catalog.get(Kind::IonHeatmaps, Some("400-420")).unwrap().unwrap();
        assert_eq!(merged.y_values, vec![10.0, 20.0]);
        assert_eq!(merged.id(), original_id);
    }

    #[test]
    fn remove_is_idempotent_and_clears_slot() {
        let mut catalog = DatasetCatalog::new();
        let mut ctx = ImportContext::with_policy(ConflictPolicy::fixed(ConflictAction::Override));
        catalog.put(Kind::IonHeatmaps, Some("a"), ion(1.0), &mut ctx).unwrap();

        assert!(catalog.remove(Kind::IonHeatmaps, Some("a")).unwrap().is_some());
        assert!(catalog.remove(Kind::IonHeatmaps, Some("a")).unwrap().is_none());
        assert!(!catalog.has(Kind::IonHeatmaps));
        assert!(catalog.keys(Kind::IonHeatmaps).is_empty());
    }

    #[test]
    fn rename_errors_and_identity() {
        let mut catalog = DatasetCatalog::new();
        let mut ctx = ImportContext::with_policy(ConflictPolicy::fixed(ConflictAction::Override));
        let mut payload = ion(1.0);
        payload.attach_annotation("peak", Annotation::new("peak", 1.5, 1.0));
        let id = payload.id();
        catalog.put(Kind::IonHeatmaps, Some("a"), payload, &mut ctx).unwrap();
        catalog.put(Kind::IonHeatmaps, Some("b"), ion(2.0), &mut ctx).unwrap();

        assert_matches!(
            catalog.rename(Kind::IonHeatmaps, "missing", "c"),
            Err(CatalogError::KeyNotFound(_))
        );
        assert_matches!(
            catalog.rename(Kind::IonHeatmaps, "a", "b"),
            Err(CatalogError::KeyConflict(_))
        );
        catalog.rename(Kind::IonHeatmaps, "a", "c").unwrap();

        let renamed = catalog.get(Kind::IonHeatmaps, Some("c")).unwrap().unwrap();
        assert_eq!(renamed.id(), id);
        assert!(renamed.annotations().unwrap().contains("peak"));
        assert!(catalog.get(Kind::IonHeatmaps, Some("a")).unwrap().is_none());
    }

    #[test]
    fn serde_round_trip_keeps_entries() {
        let mut catalog = DatasetCatalog::new();
        let mut ctx = ImportContext::with_policy(ConflictPolicy::fixed(ConflictAction::Override));
        catalog.put(Kind::MassSpectrum, None, ms(1.0), &mut ctx).unwrap();
        catalog.put(Kind::IonHeatmaps, Some("a"), ion(1.0), &mut ctx).unwrap();

        let json = serde_json::to_string(&catalog).unwrap();
        let restored: DatasetCatalog = serde_json::from_str(&json).unwrap();
        assert_eq!(restored, catalog);
    }

    #[test]
    fn serde_rejects_shape_mismatch() {
        let json = r#"{"entries":[{"kind":"mass-spectrum","key":"x","payload":{"kind":"mass-spectrum"}}]}"#;
        assert!(serde_json::from_str::<DatasetCatalog>(json).is_err());
    }

    #[test]
    fn same_payload_under_two_keys_is_reissued() {
        let mut catalog = DatasetCatalog::new();
        let mut ctx = ImportContext::with_policy(ConflictPolicy::fixed(ConflictAction::Override));
        let payload = ion(1.0);
        catalog.put(Kind::IonHeatmaps, Some("a"), payload.clone(), &mut ctx).unwrap();
        catalog.put(Kind::IonHeatmaps, Some("b"), payload.clone(), &mut ctx).unwrap();

        let a = catalog.get(Kind::IonHeatmaps, Some("a")).unwrap().unwrap().id();
        let b = catalog.get(Kind::IonHeatmaps, Some("b")).unwrap().unwrap().id();
        assert_eq!(a, payload.id());
        assert_ne!(a, b);
        assert!(catalog.holds_id(b));
    }
}
