use std::cell::Cell;

use assert_matches::assert_matches;

use ims_docstore::annotations::Annotation;
use ims_docstore::catalog::{ImportContext, InsertAction};
use ims_docstore::conflict::{ConflictPolicy, ImportConflictResolver};
use ims_docstore::domain::{ConflictAction, DatasetRef, DocumentType, Kind};
use ims_docstore::error::CatalogError;
use ims_docstore::payload::{Axis, DatasetPayload};
use ims_docstore::registry::{DocumentRegistry, RegistryNotice};
use ims_docstore::tree::{PathSegment, TreePath};

fn registry_with(titles: &[&str]) -> DocumentRegistry {
    let mut registry = DocumentRegistry::new();
    for title in titles {
        registry
            .create(title, DocumentType::Origami, Default::default())
            .unwrap();
    }
    registry
}

fn spectrum(kind: Kind, x: &[f64]) -> DatasetPayload {
    DatasetPayload::new(kind, x.to_vec(), vec![1.0; x.len()])
}

fn fixed(action: ConflictAction) -> ImportContext<'static, 'static> {
    ImportContext::with_policy(ConflictPolicy::fixed(action))
}

#[test]
fn override_replaces_mass_spectrum_and_keeps_one_node() {
    let mut registry = registry_with(&["RunA"]);
    let ms = DatasetRef::singleton("RunA", Kind::MassSpectrum);

    let first = registry
        .put_dataset(&ms, spectrum(Kind::MassSpectrum, &[100.0, 200.0]), &mut fixed(ConflictAction::Override))
        .unwrap();
    assert_eq!(first.action, InsertAction::Inserted);

    let second_payload = spectrum(Kind::MassSpectrum, &[300.0]);
    let second_id = second_payload.id();
    let second = registry
        .put_dataset(&ms, second_payload, &mut fixed(ConflictAction::Override))
        .unwrap();
    assert_eq!(second.action, InsertAction::Overridden);

    let stored = registry.dataset(&ms).unwrap().unwrap();
    assert_eq!(stored.x_values, vec![300.0]);

    let node = registry.projection().resolve(&TreePath::dataset(&ms)).unwrap();
    assert_eq!(node.payload_ref(), Some(second_id));
    assert_eq!(node.label(), "Mass Spectrum");
    let doc = registry.projection().locate(&TreePath::document("RunA")).unwrap();
    assert_eq!(registry.projection().children(doc).count(), 1);
    registry.check_consistency().unwrap();
}

#[test]
fn duplicate_key_gets_numbered_suffix() {
    let mut registry = registry_with(&["RunA"]);
    let eic = DatasetRef::entry("RunA", Kind::Chromatograms, "400-420");

    registry
        .put_dataset(&eic, spectrum(Kind::Chromatograms, &[1.0]), &mut fixed(ConflictAction::Duplicate))
        .unwrap();
    let outcome = registry
        .put_dataset(&eic, spectrum(Kind::Chromatograms, &[2.0]), &mut fixed(ConflictAction::Duplicate))
        .unwrap();

    assert_eq!(outcome.action, InsertAction::Duplicated);
    assert_eq!(outcome.key.as_deref(), Some("400-420 (2)"));
    let keys = registry.get("RunA").unwrap().catalog.keys(Kind::Chromatograms);
    assert_eq!(keys, vec!["400-420", "400-420 (2)"]);

    let header = TreePath::document("RunA").child(PathSegment::Header(Kind::Chromatograms));
    let header = registry.projection().locate(&header).unwrap();
    let labels: Vec<&str> = registry
        .projection()
        .children(header)
        .map(|node| node.label())
        .collect();
    assert_eq!(labels, vec!["400-420", "400-420 (2)"]);
    registry.check_consistency().unwrap();
}

#[test]
fn repeated_duplicates_stay_unique() {
    let mut registry = registry_with(&["RunA"]);
    let ion = DatasetRef::entry("RunA", Kind::IonHeatmaps, "ion");
    let heatmap = || DatasetPayload::heatmap(Kind::IonHeatmaps, vec![1.0], vec![1.0], vec![vec![5.0]]);

    for _ in 0..5 {
        registry
            .put_dataset(&ion, heatmap(), &mut fixed(ConflictAction::Duplicate))
            .unwrap();
    }

    let keys = registry.get("RunA").unwrap().catalog.keys(Kind::IonHeatmaps);
    assert_eq!(keys.len(), 5);
    assert!(keys.contains(&"ion"));
    assert!(keys.contains(&"ion (5)"));
    registry.check_consistency().unwrap();
}

#[test]
fn annotations_appear_and_vanish_with_their_header() {
    let mut registry = registry_with(&["RunA"]);
    let ms = DatasetRef::singleton("RunA", Kind::MassSpectrum);
    registry
        .put_dataset(&ms, spectrum(Kind::MassSpectrum, &[500.0]), &mut fixed(ConflictAction::Override))
        .unwrap();

    let outcome = registry
        .attach_annotation(&ms, "peak1", Annotation::new("2+", 500.0, 1.0).with_charge(2))
        .unwrap();
    assert!(outcome.created_set);
    assert!(registry.projection().locate(&TreePath::annotation(&ms, "peak1")).is_some());
    registry.check_consistency().unwrap();

    let removed = registry.detach_annotation(&ms, "peak1").unwrap();
    assert_eq!(removed.map(|a| a.charge), Some(Some(2)));
    assert!(registry.projection().locate(&TreePath::annotations(&ms)).is_none());
    assert!(registry.dataset(&ms).unwrap().unwrap().annotations().is_none());
    assert!(registry.projection().locate(&TreePath::dataset(&ms)).is_some());
    registry.check_consistency().unwrap();

    assert_matches!(registry.detach_annotation(&ms, "peak1"), Ok(None));
}

#[test]
fn rename_moves_root_and_dataset_addresses() {
    let mut registry = registry_with(&["RunA", "Other"]);
    let ms = DatasetRef::singleton("RunA", Kind::MassSpectrum);
    registry
        .put_dataset(&ms, spectrum(Kind::MassSpectrum, &[1.0]), &mut fixed(ConflictAction::Override))
        .unwrap();
    registry.set_current("RunA").unwrap();
    let root = registry.projection().locate(&TreePath::document("RunA")).unwrap();
    registry.drain_notices();

    registry.rename("RunA", "RunB").unwrap();

    assert_eq!(registry.current(), Some("RunB"));
    assert_eq!(registry.titles(), vec!["RunB", "Other"]);
    let renamed_root = registry.projection().locate(&TreePath::document("RunB")).unwrap();
    assert_eq!(renamed_root, root);
    assert_eq!(registry.projection().node(root).unwrap().label(), "RunB");
    assert!(registry.projection().locate(&TreePath::document("RunA")).is_none());
    assert!(registry
        .dataset(&DatasetRef::singleton("RunB", Kind::MassSpectrum))
        .unwrap()
        .is_some());
    assert_eq!(
        registry.drain_notices(),
        vec![RegistryNotice::Renamed {
            from: "RunA".to_string(),
            to: "RunB".to_string()
        }]
    );
    registry.check_consistency().unwrap();
}

#[test]
fn deleting_current_moves_current_to_first_remaining() {
    let mut registry = registry_with(&["A", "B", "C"]);
    assert_eq!(registry.current(), Some("C"));

    let deleted = registry.delete("C").unwrap();
    assert_eq!(deleted.title, "C");
    assert_eq!(registry.current(), Some("A"));
    assert!(registry.projection().locate(&TreePath::document("C")).is_none());

    assert!(registry.delete("C").is_none());
    registry.delete("A");
    registry.delete("B");
    assert_eq!(registry.current(), None);
    assert!(registry.projection().is_empty());
}

#[test]
fn duplicated_documents_are_independent() {
    let mut registry = registry_with(&["RunA"]);
    let ms = DatasetRef::singleton("RunA", Kind::MassSpectrum);
    registry
        .put_dataset(&ms, spectrum(Kind::MassSpectrum, &[1.0]), &mut fixed(ConflictAction::Override))
        .unwrap();

    let copies: Vec<String> = (0..3).map(|_| registry.duplicate("RunA").unwrap()).collect();
    assert_eq!(
        copies,
        vec!["RunA - copy", "RunA - copy (2)", "RunA - copy (3)"]
    );
    assert_eq!(registry.current(), Some("RunA"));

    let copy_ms = DatasetRef::singleton("RunA - copy", Kind::MassSpectrum);
    registry
        .relabel_axes(&copy_ms, Axis::X, "Da", |x| x * 2.0)
        .unwrap();
    assert_eq!(registry.dataset(&ms).unwrap().unwrap().x_values, vec![1.0]);
    assert_eq!(registry.dataset(&copy_ms).unwrap().unwrap().x_values, vec![2.0]);
    assert_ne!(
        registry.dataset(&ms).unwrap().unwrap().id(),
        registry.dataset(&copy_ms).unwrap().unwrap().id()
    );
    registry.check_consistency().unwrap();
}

#[test]
fn copying_a_copy_extends_its_name() {
    let mut registry = registry_with(&["RunA"]);
    let copy = registry.duplicate("RunA").unwrap();
    assert_eq!(copy, "RunA - copy");

    assert_eq!(registry.duplicate(&copy).unwrap(), "RunA - copy - copy");
    assert_eq!(registry.duplicate(&copy).unwrap(), "RunA - copy - copy (2)");

    let eic = DatasetRef::entry("RunA", Kind::Chromatograms, "400-420 - copy");
    registry
        .put_dataset(&eic, spectrum(Kind::Chromatograms, &[1.0]), &mut fixed(ConflictAction::Override))
        .unwrap();
    let copied = registry.duplicate_dataset(&eic).unwrap();
    assert_eq!(copied.key(), Some("400-420 - copy - copy"));
    registry.check_consistency().unwrap();
}

#[test]
fn reused_payload_gets_its_own_identity() {
    let mut registry = registry_with(&["RunA", "RunB"]);
    let payload = spectrum(Kind::Chromatograms, &[1.0, 2.0]);
    let a = DatasetRef::entry("RunA", Kind::Chromatograms, "a");
    let b = DatasetRef::entry("RunA", Kind::Chromatograms, "b");
    let other = DatasetRef::entry("RunB", Kind::Chromatograms, "a");

    for dataset in [&a, &b, &other] {
        registry
            .put_dataset(dataset, payload.clone(), &mut fixed(ConflictAction::Override))
            .unwrap();
    }

    let id_a = registry.dataset(&a).unwrap().unwrap().id();
    let id_b = registry.dataset(&b).unwrap().unwrap().id();
    let id_other = registry.dataset(&other).unwrap().unwrap().id();
    assert_eq!(id_a, payload.id());
    assert_ne!(id_b, id_a);
    assert_ne!(id_other, id_a);
    assert_ne!(id_other, id_b);
    assert_eq!(
        registry.projection().find_by_payload(id_b),
        Some(TreePath::dataset(&b))
    );
    registry.check_consistency().unwrap();
}

#[test]
fn merge_runs_strategy_once_and_keeps_payload_identity() {
    let mut registry = registry_with(&["RunA"]);
    let ms = DatasetRef::singleton("RunA", Kind::MassSpectrum);
    let original = spectrum(Kind::MassSpectrum, &[1.0, 2.0]).with_metadata("scan", 1);
    let original_id = original.id();
    registry
        .put_dataset(&ms, original, &mut fixed(ConflictAction::Merge))
        .unwrap();

    let calls = Cell::new(0);
    let merge = |existing: &DatasetPayload, incoming: DatasetPayload| {
        calls.set(calls.get() + 1);
        let mut merged = existing.clone();
        merged.metadata.extend(incoming.metadata);
        merged
    };
    let mut ctx = ImportContext::new(
        ImportConflictResolver::new(ConflictPolicy::fixed(ConflictAction::Merge)),
        None,
        &merge,
    );
    let outcome = registry
        .put_dataset(
            &ms,
            spectrum(Kind::MassSpectrum, &[9.0]).with_metadata("polarity", "positive"),
            &mut ctx,
        )
        .unwrap();

    assert_eq!(outcome.action, InsertAction::Merged);
    assert_eq!(calls.get(), 1);
    let stored = registry.dataset(&ms).unwrap().unwrap();
    assert_eq!(stored.id(), original_id);
    assert_eq!(stored.x_values, vec![1.0, 2.0]);
    assert_eq!(stored.metadata.len(), 2);
    registry.check_consistency().unwrap();
}

#[test]
fn removing_absent_dataset_is_a_no_op() {
    let mut registry = registry_with(&["RunA"]);
    let eic = DatasetRef::entry("RunA", Kind::Chromatograms, "x");
    registry
        .put_dataset(&eic, spectrum(Kind::Chromatograms, &[1.0]), &mut fixed(ConflictAction::Override))
        .unwrap();

    assert!(registry.remove_dataset(&eic).unwrap().is_some());
    assert!(registry.remove_dataset(&eic).unwrap().is_none());
    assert!(!registry.get("RunA").unwrap().catalog.has(Kind::Chromatograms));
    assert!(registry
        .projection()
        .locate(&TreePath::document("RunA").child(PathSegment::Header(Kind::Chromatograms)))
        .is_none());
    assert!(registry.projection().locate(&TreePath::document("RunA")).is_some());
    registry.check_consistency().unwrap();
}

#[test]
fn rename_dataset_keeps_node_and_reports() {
    let mut registry = registry_with(&["RunA"]);
    let ion = DatasetRef::entry("RunA", Kind::Mobilograms, "ion-1");
    registry
        .put_dataset(&ion, spectrum(Kind::Mobilograms, &[1.0]), &mut fixed(ConflictAction::Override))
        .unwrap();
    registry.attach_annotation(&ion, "a", Annotation::new("a", 1.0, 1.0)).unwrap();
    let node = registry.projection().locate(&TreePath::dataset(&ion)).unwrap();

    let renamed = registry.rename_dataset(&ion, "ion-2").unwrap();

    assert_eq!(renamed, DatasetRef::entry("RunA", Kind::Mobilograms, "ion-2"));
    assert_eq!(registry.projection().locate(&TreePath::dataset(&renamed)), Some(node));
    assert!(registry.projection().locate(&TreePath::annotation(&renamed, "a")).is_some());
    assert_matches!(
        registry.rename_dataset(&ion, "ion-3"),
        Err(CatalogError::KeyNotFound(_))
    );
    assert_matches!(
        registry.rename_dataset(&DatasetRef::singleton("RunA", Kind::MassSpectrum), "x"),
        Err(CatalogError::KindMismatch { .. })
    );
    registry.check_consistency().unwrap();
}

#[test]
fn duplicate_annotations_copies_into_target() {
    let mut registry = registry_with(&["RunA"]);
    let source = DatasetRef::entry("RunA", Kind::MassSpectra, "s1");
    let target = DatasetRef::entry("RunA", Kind::MassSpectra, "s2");
    for dataset in [&source, &target] {
        registry
            .put_dataset(dataset, spectrum(Kind::MassSpectra, &[1.0]), &mut fixed(ConflictAction::Override))
            .unwrap();
    }
    registry
        .attach_annotation(&source, "p", Annotation::new("p", 1.0, 1.0))
        .unwrap();

    registry.duplicate_annotations(&source, &target).unwrap();

    assert!(registry.annotations(&target).unwrap().unwrap().contains("p"));
    assert!(registry.projection().locate(&TreePath::annotation(&target, "p")).is_some());
    registry.check_consistency().unwrap();
}

#[test]
fn unidec_results_hang_under_their_dataset() {
    let mut registry = registry_with(&["RunA"]);
    let ms = DatasetRef::singleton("RunA", Kind::MassSpectrum);
    registry
        .put_dataset(&ms, spectrum(Kind::MassSpectrum, &[1.0]), &mut fixed(ConflictAction::Override))
        .unwrap();

    registry
        .put_unidec_result(&ms, "Fitted", spectrum(Kind::Other, &[1.0]))
        .unwrap();
    assert!(registry.projection().locate(&TreePath::unidec_result(&ms, "Fitted")).is_some());
    registry.check_consistency().unwrap();

    assert!(registry.remove_unidec_result(&ms, "Fitted").unwrap().is_some());
    assert!(registry.projection().locate(&TreePath::unidec(&ms)).is_none());
    registry.check_consistency().unwrap();
}

#[test]
fn restore_axes_undoes_every_relabel() {
    let mut registry = registry_with(&["RunA"]);
    let dt = DatasetRef::singleton("RunA", Kind::Mobilogram);
    registry
        .put_dataset(
            &dt,
            spectrum(Kind::Mobilogram, &[1.0, 2.0]).with_labels("Drift time (bins)", "Intensity"),
            &mut fixed(ConflictAction::Override),
        )
        .unwrap();

    registry.relabel_axes(&dt, Axis::X, "ms", |x| x * 0.5).unwrap();
    registry.relabel_axes(&dt, Axis::X, "s", |x| x / 1000.0).unwrap();
    assert!(registry.restore_axes(&dt).unwrap());

    let payload = registry.dataset(&dt).unwrap().unwrap();
    assert_eq!(payload.x_label, "Drift time (bins)");
    assert_eq!(payload.x_values, vec![1.0, 2.0]);

    let untouched = DatasetRef::singleton("RunA", Kind::MassSpectrum);
    registry
        .put_dataset(&untouched, spectrum(Kind::MassSpectrum, &[1.0]), &mut fixed(ConflictAction::Override))
        .unwrap();
    assert!(!registry.restore_axes(&untouched).unwrap());
}

#[test]
fn wrong_document_is_reported_without_changes() {
    let mut registry = registry_with(&["RunA"]);
    let missing = DatasetRef::singleton("Nope", Kind::MassSpectrum);
    assert_matches!(
        registry.put_dataset(&missing, spectrum(Kind::MassSpectrum, &[1.0]), &mut fixed(ConflictAction::Override)),
        Err(CatalogError::DocumentNotFound(title)) if title == "Nope"
    );
    assert_matches!(
        registry.put_dataset(
            &DatasetRef::singleton("RunA", Kind::MassSpectrum),
            spectrum(Kind::Chromatogram, &[1.0]),
            &mut fixed(ConflictAction::Override)
        ),
        Err(CatalogError::KindMismatch { kind: Kind::MassSpectrum, .. })
    );
    assert!(registry.get("RunA").unwrap().catalog.is_empty());
    registry.check_consistency().unwrap();
}
