use std::collections::BTreeMap;

use serde_json::Value;

use crate::annotations::{Annotation, AnnotationSet};
use crate::catalog::{DatasetCatalog, ImportContext, InsertOutcome};
use crate::conflict::ConflictPolicy;
use crate::document::Document;
use crate::domain::{ConflictAction, DatasetRef, DocumentId, DocumentType, Kind};
use crate::error::CatalogError;
use crate::naming;
use crate::payload::{AttachOutcome, Axis, DatasetPayload};
use crate::tree::{TreeEvent, TreePath, TreeProjection};

/// Emitted for caches keyed by document title or dataset address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryNotice {
    Renamed { from: String, to: String },
    Deleted { title: String },
    DatasetRenamed { from: DatasetRef, to: DatasetRef },
    DatasetRemoved { dataset: DatasetRef },
}

/// Owner of every open document and of the tree projection mirroring them.
///
/// All mutation goes through this type. Each operation checks its
/// preconditions before touching the catalog, then updates the projection, so
/// a returned error means nothing changed.
#[derive(Debug, Default)]
pub struct DocumentRegistry {
    documents: Vec<Document>,
    current: Option<String>,
    projection: TreeProjection,
    notices: Vec<RegistryNotice>,
}

impl DocumentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a registry from stored documents, e.g. a saved session.
    pub fn from_documents(
        documents: Vec<Document>,
        current: Option<String>,
    ) -> Result<Self, CatalogError> {
        let mut registry = Self::new();
        for document in documents {
            if registry.contains(&document.title) {
                return Err(CatalogError::DuplicateTitle(document.title));
            }
            registry.documents.push(document);
        }
        registry.current = current
            .filter(|title| registry.contains(title))
            .or_else(|| registry.documents.first().map(|doc| doc.title.clone()));
        registry.projection = TreeProjection::build(&registry.documents);
        Ok(registry)
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    pub fn contains(&self, title: &str) -> bool {
        self.documents.iter().any(|doc| doc.title == title)
    }

    /// Titles in insertion order.
    pub fn titles(&self) -> Vec<&str> {
        self.documents.iter().map(|doc| doc.title.as_str()).collect()
    }

    pub fn documents(&self) -> impl Iterator<Item = &Document> {
        self.documents.iter()
    }

    pub fn get(&self, title: &str) -> Option<&Document> {
        self.documents.iter().find(|doc| doc.title == title)
    }

    pub fn current(&self) -> Option<&str> {
        self.current.as_deref()
    }

    pub fn current_document(&self) -> Option<&Document> {
        self.current.as_deref().and_then(|title| self.get(title))
    }

    pub fn set_current(&mut self, title: &str) -> Result<(), CatalogError> {
        if !self.contains(title) {
            return Err(CatalogError::DocumentNotFound(title.to_string()));
        }
        self.current = Some(title.to_string());
        Ok(())
    }

    pub fn projection(&self) -> &TreeProjection {
        &self.projection
    }

    pub fn drain_tree_events(&mut self) -> Vec<TreeEvent> {
        self.projection.drain_events()
    }

    pub fn drain_notices(&mut self) -> Vec<RegistryNotice> {
        std::mem::take(&mut self.notices)
    }

    pub fn rebuild_projection(&mut self) {
        self.projection.rebuild(&self.documents);
    }

    pub fn check_consistency(&self) -> Result<(), Vec<String>> {
        self.projection.check_bijection(&self.documents)
    }

    pub fn create(
        &mut self,
        title: &str,
        document_type: DocumentType,
        parameters: BTreeMap<String, Value>,
    ) -> Result<DocumentId, CatalogError> {
        if self.contains(title) {
            return Err(CatalogError::DuplicateTitle(title.to_string()));
        }
        let document = Document::new(title, document_type).with_parameters(parameters);
        self.insert(document, true)
    }

    /// Take ownership of a fully loaded document and make it current.
    pub fn add(&mut self, document: Document) -> Result<DocumentId, CatalogError> {
        if self.contains(&document.title) {
            return Err(CatalogError::DuplicateTitle(document.title));
        }
        self.insert(document, true)
    }

    pub fn rename(&mut self, old: &str, new: &str) -> Result<(), CatalogError> {
        let Some(index) = self.position(old) else {
            return Err(CatalogError::DocumentNotFound(old.to_string()));
        };
        if old == new {
            return Ok(());
        }
        if self.contains(new) {
            return Err(CatalogError::DuplicateTitle(new.to_string()));
        }

        self.documents[index].title = new.to_string();
        self.projection
            .on_rename(&TreePath::document(old), &TreePath::document(new), new);
        if self.current.as_deref() == Some(old) {
            self.current = Some(new.to_string());
        }
        self.notices.push(RegistryNotice::Renamed {
            from: old.to_string(),
            to: new.to_string(),
        });
        tracing::info!(from = old, to = new, "document renamed");
        Ok(())
    }

    /// Remove a document and everything under it. If it was current, the
    /// first remaining document becomes current.
    pub fn delete(&mut self, title: &str) -> Option<Document> {
        let index = self.position(title)?;
        let document = self.documents.remove(index);
        self.projection.on_remove(&TreePath::document(title));
        if self.current.as_deref() == Some(title) {
            self.current = self.documents.first().map(|doc| doc.title.clone());
        }
        self.notices.push(RegistryNotice::Deleted {
            title: title.to_string(),
        });
        tracing::info!(title, "document deleted");
        Some(document)
    }

    /// Deep-copy a document under `"{title} - copy"` (numbered if taken).
    /// The current document is left unchanged.
    pub fn duplicate(&mut self, title: &str) -> Result<String, CatalogError> {
        let source = self
            .get(title)
            .ok_or_else(|| CatalogError::DocumentNotFound(title.to_string()))?;
        let new_title = naming::copy_name(title, |candidate| self.contains(candidate));
        let copy = source.deep_copy(new_title.clone());
        self.insert(copy, false)?;
        Ok(new_title)
    }

    pub fn dataset(&self, dataset: &DatasetRef) -> Result<Option<&DatasetPayload>, CatalogError> {
        let document = self
            .get(&dataset.document)
            .ok_or_else(|| CatalogError::DocumentNotFound(dataset.document.clone()))?;
        document.catalog.get(dataset.kind, dataset.key())
    }

    /// Insert into the document's catalog through the conflict resolver, then
    /// mirror the resulting entry in the tree.
    pub fn put_dataset(
        &mut self,
        dataset: &DatasetRef,
        payload: DatasetPayload,
        ctx: &mut ImportContext<'_, '_>,
    ) -> Result<InsertOutcome, CatalogError> {
        let mut payload = payload;
        self.claim_ids(&mut payload);
        let document = document_mut(&mut self.documents, &dataset.document)?;
        let outcome = document.catalog.put(dataset.kind, dataset.key(), payload, ctx)?;
        let stored = DatasetRef {
            document: dataset.document.clone(),
            kind: dataset.kind,
            key: outcome.key.clone(),
        };
        if let Some(payload) = document.catalog.get(stored.kind, stored.key())? {
            self.projection.sync_dataset(&stored, payload);
        }
        tracing::debug!(dataset = %stored, action = ?outcome.action, "dataset stored");
        Ok(outcome)
    }

    pub fn remove_dataset(
        &mut self,
        dataset: &DatasetRef,
    ) -> Result<Option<DatasetPayload>, CatalogError> {
        let document = document_mut(&mut self.documents, &dataset.document)?;
        let removed = document.catalog.remove(dataset.kind, dataset.key())?;
        if removed.is_some() {
            self.projection.on_remove(&TreePath::dataset(dataset));
            self.notices.push(RegistryNotice::DatasetRemoved {
                dataset: dataset.clone(),
            });
        }
        Ok(removed)
    }

    pub fn rename_dataset(
        &mut self,
        dataset: &DatasetRef,
        new_key: &str,
    ) -> Result<DatasetRef, CatalogError> {
        let Some(old_key) = dataset.key() else {
            return Err(CatalogError::kind_mismatch(
                dataset.kind,
                "single-entry slots have no key to rename",
            ));
        };
        let document = document_mut(&mut self.documents, &dataset.document)?;
        document.catalog.rename(dataset.kind, old_key, new_key)?;

        let renamed = DatasetRef::entry(dataset.document.clone(), dataset.kind, new_key);
        if old_key != new_key {
            self.projection.on_rename(
                &TreePath::dataset(dataset),
                &TreePath::dataset(&renamed),
                new_key,
            );
            self.notices.push(RegistryNotice::DatasetRenamed {
                from: dataset.clone(),
                to: renamed.clone(),
            });
        }
        Ok(renamed)
    }

    /// Copy a keyed entry to `"{key} - copy"` within the same slot.
    pub fn duplicate_dataset(&mut self, dataset: &DatasetRef) -> Result<DatasetRef, CatalogError> {
        let Some(key) = dataset.key() else {
            return Err(CatalogError::kind_mismatch(
                dataset.kind,
                "single-entry slots cannot hold a copy",
            ));
        };
        let document = document_mut(&mut self.documents, &dataset.document)?;
        let source = document
            .catalog
            .get(dataset.kind, Some(key))?
            .ok_or_else(|| CatalogError::KeyNotFound(dataset.to_string()))?;
        let copy = source.deep_copy();
        let new_key = naming::copy_name(key, |candidate| {
            document.catalog.contains(dataset.kind, Some(candidate))
        });

        let target = DatasetRef::entry(dataset.document.clone(), dataset.kind, new_key);
        let mut ctx = ImportContext::with_policy(ConflictPolicy::fixed(ConflictAction::Override));
        document
            .catalog
            .put(target.kind, target.key(), copy, &mut ctx)?;
        if let Some(payload) = document.catalog.get(target.kind, target.key())? {
            self.projection.sync_dataset(&target, payload);
        }
        Ok(target)
    }

    pub fn annotations(&self, dataset: &DatasetRef) -> Result<Option<&AnnotationSet>, CatalogError> {
        let payload = self
            .dataset(dataset)?
            .ok_or_else(|| CatalogError::KeyNotFound(dataset.to_string()))?;
        Ok(payload.annotations())
    }

    pub fn attach_annotation(
        &mut self,
        dataset: &DatasetRef,
        key: &str,
        annotation: Annotation,
    ) -> Result<AttachOutcome, CatalogError> {
        let payload = payload_mut(&mut self.documents, dataset)?;
        let outcome = payload.attach_annotation(key, annotation);
        self.projection
            .on_insert(&TreePath::annotation(dataset, key), key, None);
        Ok(outcome)
    }

    /// Detaching the last annotation drops the set and its tree header.
    pub fn detach_annotation(
        &mut self,
        dataset: &DatasetRef,
        key: &str,
    ) -> Result<Option<Annotation>, CatalogError> {
        let payload = payload_mut(&mut self.documents, dataset)?;
        let outcome = payload.detach_annotation(key);
        if outcome.removed.is_some() {
            self.projection.on_remove(&TreePath::annotation(dataset, key));
        }
        Ok(outcome.removed)
    }

    /// Replace the target's annotations with a deep copy of the source's.
    pub fn duplicate_annotations(
        &mut self,
        source: &DatasetRef,
        target: &DatasetRef,
    ) -> Result<(), CatalogError> {
        let annotations = match self.annotations(source)? {
            Some(set) if !set.is_empty() => set.clone(),
            _ => return Err(CatalogError::EmptySource(source.to_string())),
        };
        let payload = payload_mut(&mut self.documents, target)?;
        payload.set_annotations(annotations);
        self.projection
            .sync_annotations(target, payload.annotations());
        Ok(())
    }

    pub fn put_unidec_result(
        &mut self,
        dataset: &DatasetRef,
        name: &str,
        result: DatasetPayload,
    ) -> Result<Option<DatasetPayload>, CatalogError> {
        let payload = payload_mut(&mut self.documents, dataset)?;
        let result_id = result.id();
        let replaced = payload.insert_unidec_result(name, result);
        self.projection
            .on_insert(&TreePath::unidec_result(dataset, name), name, Some(result_id));
        Ok(replaced)
    }

    pub fn remove_unidec_result(
        &mut self,
        dataset: &DatasetRef,
        name: &str,
    ) -> Result<Option<DatasetPayload>, CatalogError> {
        let payload = payload_mut(&mut self.documents, dataset)?;
        let removed = payload.remove_unidec_result(name);
        if removed.is_some() {
            self.projection
                .on_remove(&TreePath::unidec_result(dataset, name));
        }
        Ok(removed)
    }

    pub fn relabel_axes(
        &mut self,
        dataset: &DatasetRef,
        axis: Axis,
        label: &str,
        convert: impl Fn(f64) -> f64,
    ) -> Result<(), CatalogError> {
        let payload = payload_mut(&mut self.documents, dataset)?;
        payload.relabel(axis, label, convert);
        Ok(())
    }

    /// Returns `false` when the dataset was never relabelled.
    pub fn restore_axes(&mut self, dataset: &DatasetRef) -> Result<bool, CatalogError> {
        let payload = payload_mut(&mut self.documents, dataset)?;
        Ok(payload.restore_default_axes())
    }

    /// Put every entry of `incoming` into the open document with the same
    /// title through `put`. Entries are staged on a copy of the catalog, so
    /// when `put` fails the document and its tree are left as they were.
    pub fn merge_document(
        &mut self,
        incoming: Document,
        mut put: impl FnMut(
            &mut DatasetCatalog,
            Kind,
            Option<&str>,
            DatasetPayload,
        ) -> Result<InsertOutcome, CatalogError>,
    ) -> Result<Vec<(DatasetRef, InsertOutcome)>, CatalogError> {
        let title = incoming.title.clone();
        let index = self
            .position(&title)
            .ok_or_else(|| CatalogError::DocumentNotFound(title.clone()))?;

        let mut staged = self.documents[index].catalog.clone();
        let mut stored = Vec::new();
        for (kind, key, mut payload) in incoming.catalog.into_entries() {
            self.claim_ids(&mut payload);
            let outcome = put(&mut staged, kind, key.as_deref(), payload)?;
            let dataset = DatasetRef {
                document: title.clone(),
                kind,
                key: outcome.key.clone(),
            };
            stored.push((dataset, outcome));
        }

        self.documents[index].catalog = staged;
        let catalog = &self.documents[index].catalog;
        for (dataset, _) in &stored {
            if let Ok(Some(payload)) = catalog.get(dataset.kind, dataset.key()) {
                self.projection.sync_dataset(dataset, payload);
            }
        }
        tracing::info!(title = %title, datasets = stored.len(), "document merged");
        Ok(stored)
    }

    /// Give `payload` fresh identities if any of its ids already resolves to
    /// a node.
    fn claim_ids(&self, payload: &mut DatasetPayload) {
        let live = payload
            .ids()
            .into_iter()
            .any(|id| self.projection.find_by_payload(id).is_some());
        if live {
            payload.reissue_ids();
        }
    }

    fn position(&self, title: &str) -> Option<usize> {
        self.documents.iter().position(|doc| doc.title == title)
    }

    fn insert(&mut self, document: Document, make_current: bool) -> Result<DocumentId, CatalogError> {
        if self.contains(&document.title) {
            return Err(CatalogError::DuplicateTitle(document.title));
        }
        let mut document = document;
        for payload in document.catalog.payloads_mut() {
            self.claim_ids(payload);
        }
        let id = document.id();
        self.projection.insert_document(&document);
        if make_current || self.current.is_none() {
            self.current = Some(document.title.clone());
        }
        tracing::info!(title = %document.title, datasets = document.catalog.len(), "document added");
        self.documents.push(document);
        Ok(id)
    }
}

fn document_mut<'a>(
    documents: &'a mut [Document],
    title: &str,
) -> Result<&'a mut Document, CatalogError> {
    documents
        .iter_mut()
        .find(|doc| doc.title == title)
        .ok_or_else(|| CatalogError::DocumentNotFound(title.to_string()))
}

fn payload_mut<'a>(
    documents: &'a mut [Document],
    dataset: &DatasetRef,
) -> Result<&'a mut DatasetPayload, CatalogError> {
    document_mut(documents, &dataset.document)?
        .catalog
        .get_mut(dataset.kind, dataset.key())?
        .ok_or_else(|| CatalogError::KeyNotFound(dataset.to_string()))
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;
    use crate::domain::Kind;

    fn registry_with(titles: &[&str]) -> DocumentRegistry {
        let mut registry = DocumentRegistry::new();
        for title in titles {
            registry
                .create(title, DocumentType::Origami, BTreeMap::new())
                .unwrap();
        }
        registry
    }

    #[test]
    fn create_rejects_duplicate_title() {
        let mut registry = registry_with(&["RunA"]);
        let err = registry
            .create("RunA", DocumentType::Origami, BTreeMap::new())
            .unwrap_err();
        assert_matches!(err, CatalogError::DuplicateTitle(title) if title == "RunA");
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn duplicate_leaves_current_alone() {
        let mut registry = registry_with(&["RunA"]);
        let copy = registry.duplicate("RunA").unwrap();
        assert_eq!(copy, "RunA - copy");
        let copy = registry.duplicate("RunA").unwrap();
        assert_eq!(copy, "RunA - copy (2)");
        assert_eq!(registry.current(), Some("RunA"));
        assert_eq!(registry.titles(), vec!["RunA", "RunA - copy", "RunA - copy (2)"]);
    }

    #[test]
    fn rename_to_taken_title_is_atomic() {
        let mut registry = registry_with(&["RunA", "RunB"]);
        let err = registry.rename("RunA", "RunB").unwrap_err();
        assert_matches!(err, CatalogError::DuplicateTitle(_));
        assert_eq!(registry.titles(), vec!["RunA", "RunB"]);
        assert!(registry.drain_notices().is_empty());
    }

    #[test]
    fn missing_document_is_reported() {
        let mut registry = DocumentRegistry::new();
        let dataset = DatasetRef::singleton("nope", Kind::MassSpectrum);
        assert_matches!(
            registry.remove_dataset(&dataset),
            Err(CatalogError::DocumentNotFound(_))
        );
        assert!(registry.delete("nope").is_none());
    }

    #[test]
    fn duplicate_annotations_requires_source() {
        let mut registry = registry_with(&["RunA"]);
        let mut ctx = ImportContext::with_policy(ConflictPolicy::fixed(ConflictAction::Override));
        let source = DatasetRef::entry("RunA", Kind::IonHeatmaps, "a");
        let target = DatasetRef::entry("RunA", Kind::IonHeatmaps, "b");
        for dataset in [&source, &target] {
            registry
                .put_dataset(
                    dataset,
                    DatasetPayload::heatmap(Kind::IonHeatmaps, vec![1.0], vec![1.0], vec![vec![1.0]]),
                    &mut ctx,
                )
                .unwrap();
        }
        assert_matches!(
            registry.duplicate_annotations(&source, &target),
            Err(CatalogError::EmptySource(_))
        );

        registry
            .attach_annotation(&source, "peak", Annotation::new("peak", 1.0, 1.0))
            .unwrap();
        registry.duplicate_annotations(&source, &target).unwrap();
        assert!(registry.annotations(&target).unwrap().unwrap().contains("peak"));
        assert!(registry.check_consistency().is_ok());
    }
}
