use std::collections::BTreeMap;
use std::fmt;

use crate::annotations::AnnotationSet;
use crate::document::Document;
use crate::domain::{DatasetRef, Kind, PayloadId};
use crate::payload::DatasetPayload;

/// Stable handle of a tree node. Survives relabels and renames.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(u64);

impl NodeId {
    pub fn get(self) -> u64 {
        self.0
    }
}

/// One step of a [`TreePath`]. Sibling nodes are ordered by segment, which
/// puts kind headers in [`Kind`] declaration order and `Annotations` before
/// `UniDec`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum PathSegment {
    Document(String),
    Header(Kind),
    Entry(String),
    Annotations,
    UniDec,
    Annotation(String),
    Result(String),
}

impl PathSegment {
    pub fn default_label(&self) -> String {
        match self {
            PathSegment::Document(title) => title.clone(),
            PathSegment::Header(kind) => kind.label().to_string(),
            PathSegment::Entry(key) | PathSegment::Annotation(key) | PathSegment::Result(key) => {
                key.clone()
            }
            PathSegment::Annotations => "Annotations".to_string(),
            PathSegment::UniDec => "UniDec".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TreePath(Vec<PathSegment>);

impl TreePath {
    pub fn new(segments: Vec<PathSegment>) -> Self {
        Self(segments)
    }

    pub fn document(title: &str) -> Self {
        Self(vec![PathSegment::Document(title.to_string())])
    }

    /// Node that carries the payload: the kind header for single-entry
    /// kinds, the keyed entry below it for collections.
    pub fn dataset(dataset: &DatasetRef) -> Self {
        let mut path = Self::document(&dataset.document).child(PathSegment::Header(dataset.kind));
        if let Some(key) = dataset.key() {
            path = path.child(PathSegment::Entry(key.to_string()));
        }
        path
    }

    pub fn annotations(dataset: &DatasetRef) -> Self {
        Self::dataset(dataset).child(PathSegment::Annotations)
    }

    pub fn annotation(dataset: &DatasetRef, key: &str) -> Self {
        Self::annotations(dataset).child(PathSegment::Annotation(key.to_string()))
    }

    pub fn unidec(dataset: &DatasetRef) -> Self {
        Self::dataset(dataset).child(PathSegment::UniDec)
    }

    pub fn unidec_result(dataset: &DatasetRef, name: &str) -> Self {
        Self::unidec(dataset).child(PathSegment::Result(name.to_string()))
    }

    pub fn child(mut self, segment: PathSegment) -> Self {
        self.0.push(segment);
        self
    }

    pub fn segments(&self) -> &[PathSegment] {
        &self.0
    }

    pub fn last(&self) -> Option<&PathSegment> {
        self.0.last()
    }

    pub fn parent(&self) -> Option<TreePath> {
        let (_, head) = self.0.split_last()?;
        Some(Self(head.to_vec()))
    }

    pub fn depth(&self) -> usize {
        self.0.len()
    }

    /// The dataset this path points into, if it reaches below a kind header.
    pub fn dataset_ref(&self) -> Option<DatasetRef> {
        let [PathSegment::Document(title), PathSegment::Header(kind), rest @ ..] = self.0.as_slice()
        else {
            return None;
        };
        if !kind.is_collection() {
            return Some(DatasetRef::singleton(title.clone(), *kind));
        }
        match rest.first() {
            Some(PathSegment::Entry(key)) => Some(DatasetRef::entry(title.clone(), *kind, key.clone())),
            _ => None,
        }
    }
}

impl fmt::Display for TreePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (index, segment) in self.0.iter().enumerate() {
            if index > 0 {
                write!(f, " / ")?;
            }
            write!(f, "{}", segment.default_label())?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct TreeNode {
    id: NodeId,
    segment: PathSegment,
    label: String,
    payload_ref: Option<PayloadId>,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
}

impl TreeNode {
    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn segment(&self) -> &PathSegment {
        &self.segment
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// Lookup-only reference into the catalog; never keeps a payload alive.
    pub fn payload_ref(&self) -> Option<PayloadId> {
        self.payload_ref
    }

    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    pub fn children(&self) -> &[NodeId] {
        &self.children
    }
}

/// Change notifications for a tree widget.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TreeEvent {
    Inserted { node: NodeId, parent: Option<NodeId> },
    Updated { node: NodeId },
    Relabeled { node: NodeId, label: String },
    Removed { node: NodeId },
    /// The whole projection was rebuilt; widgets should reload.
    Reset,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlatNode {
    pub id: NodeId,
    pub depth: usize,
    pub label: String,
    pub has_payload: bool,
    pub has_children: bool,
}

/// Navigable mirror of the registry: documents, kind headers, dataset
/// entries, and annotation / deconvolution sub-nodes.
///
/// The projection is driven by the registry after every successful
/// mutation. Paths that do not resolve are treated as no-ops.
#[derive(Debug, Default)]
pub struct TreeProjection {
    nodes: BTreeMap<NodeId, TreeNode>,
    roots: Vec<NodeId>,
    next_id: u64,
    events: Vec<TreeEvent>,
}

impl TreeProjection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn build<'a>(documents: impl IntoIterator<Item = &'a Document>) -> Self {
        let mut projection = Self::new();
        projection.rebuild(documents);
        projection.events.clear();
        projection
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn roots(&self) -> impl Iterator<Item = &TreeNode> {
        self.roots.iter().filter_map(|id| self.nodes.get(id))
    }

    pub fn node(&self, id: NodeId) -> Option<&TreeNode> {
        self.nodes.get(&id)
    }

    pub fn children(&self, id: NodeId) -> impl Iterator<Item = &TreeNode> {
        self.nodes
            .get(&id)
            .map(|node| node.children.as_slice())
            .unwrap_or_default()
            .iter()
            .filter_map(|child| self.nodes.get(child))
    }

    pub fn locate(&self, path: &TreePath) -> Option<NodeId> {
        let mut current = None;
        for segment in path.segments() {
            current = Some(self.child(current, segment)?);
        }
        current
    }

    pub fn resolve(&self, path: &TreePath) -> Option<&TreeNode> {
        self.locate(path).and_then(|id| self.nodes.get(&id))
    }

    pub fn path_of(&self, id: NodeId) -> Option<TreePath> {
        let mut segments = Vec::new();
        let mut current = Some(id);
        while let Some(id) = current {
            let node = self.nodes.get(&id)?;
            segments.push(node.segment.clone());
            current = node.parent;
        }
        segments.reverse();
        Some(TreePath(segments))
    }

    /// Upsert the node at `path`. Missing ancestors are created with default
    /// labels; an existing node is updated in place and keeps its id.
    pub fn on_insert(
        &mut self,
        path: &TreePath,
        label: impl Into<String>,
        payload_ref: Option<PayloadId>,
    ) -> Option<NodeId> {
        let (last, ancestors) = path.segments().split_last()?;
        let parent = self.ensure_path(ancestors);
        let label = label.into();
        match self.child(parent, last) {
            Some(id) => {
                if let Some(node) = self.nodes.get_mut(&id) {
                    node.label = label;
                    node.payload_ref = payload_ref;
                }
                self.events.push(TreeEvent::Updated { node: id });
                Some(id)
            }
            None => Some(self.create(parent, last.clone(), label, payload_ref)),
        }
    }

    /// Drop the subtree at `path`, then prune ancestors left without
    /// children or payload, stopping at the document node.
    pub fn on_remove(&mut self, path: &TreePath) -> bool {
        let Some(id) = self.locate(path) else {
            tracing::debug!(%path, "tree remove ignored, path not present");
            return false;
        };
        let parent = self.nodes.get(&id).and_then(|node| node.parent);
        self.discard(id);
        self.prune(parent);
        true
    }

    /// Move the node at `old` to `new`, relabelling it. The node id and all
    /// descendants are kept.
    pub fn on_rename(&mut self, old: &TreePath, new: &TreePath, label: impl Into<String>) -> bool {
        let Some(id) = self.locate(old) else {
            tracing::debug!(%old, "tree rename ignored, path not present");
            return false;
        };
        let Some((segment, new_ancestors)) = new.segments().split_last() else {
            return false;
        };
        if self.locate(new).is_some_and(|existing| existing != id) {
            tracing::debug!(%new, "tree rename ignored, target already present");
            return false;
        }

        let label = label.into();
        let old_parent = self.nodes.get(&id).and_then(|node| node.parent);
        let new_parent = self.ensure_path(new_ancestors);
        let moves = old_parent.is_some() || new_parent.is_some();
        if moves {
            self.detach(id);
        }
        if let Some(node) = self.nodes.get_mut(&id) {
            node.segment = segment.clone();
            node.label = label.clone();
            node.parent = new_parent;
        }
        if moves {
            self.attach(new_parent, id);
        }
        self.events.push(TreeEvent::Relabeled { node: id, label });
        if old_parent != new_parent {
            self.prune(old_parent);
        }
        true
    }

    /// Depth-first search over every node: O(n) in the size of the tree.
    pub fn find_by_payload(&self, payload: PayloadId) -> Option<TreePath> {
        let mut stack: Vec<NodeId> = self.roots.iter().rev().copied().collect();
        while let Some(id) = stack.pop() {
            let Some(node) = self.nodes.get(&id) else {
                continue;
            };
            if node.payload_ref == Some(payload) {
                return self.path_of(id);
            }
            stack.extend(node.children.iter().rev().copied());
        }
        None
    }

    pub fn drain_events(&mut self) -> Vec<TreeEvent> {
        std::mem::take(&mut self.events)
    }

    /// Pre-order listing for rendering.
    pub fn flatten(&self) -> Vec<FlatNode> {
        let mut flat = Vec::with_capacity(self.nodes.len());
        let mut stack: Vec<(NodeId, usize)> = self.roots.iter().rev().map(|id| (*id, 0)).collect();
        while let Some((id, depth)) = stack.pop() {
            let Some(node) = self.nodes.get(&id) else {
                continue;
            };
            flat.push(FlatNode {
                id,
                depth,
                label: node.label.clone(),
                has_payload: node.payload_ref.is_some(),
                has_children: !node.children.is_empty(),
            });
            stack.extend(node.children.iter().rev().map(|child| (*child, depth + 1)));
        }
        flat
    }

    /// Regenerate every node from `documents`. Node ids are not reused.
    pub fn rebuild<'a>(&mut self, documents: impl IntoIterator<Item = &'a Document>) {
        self.nodes.clear();
        self.roots.clear();
        self.events.clear();
        self.events.push(TreeEvent::Reset);
        for document in documents {
            self.insert_document(document);
        }
    }

    pub fn insert_document(&mut self, document: &Document) {
        self.on_insert(&TreePath::document(&document.title), document.title.clone(), None);
        for (kind, key, payload) in document.catalog.iter() {
            let dataset = DatasetRef {
                document: document.title.clone(),
                kind,
                key: key.map(str::to_string),
            };
            self.sync_dataset(&dataset, payload);
        }
    }

    /// Upsert the payload node of `dataset` together with its annotation and
    /// deconvolution sub-nodes.
    pub fn sync_dataset(&mut self, dataset: &DatasetRef, payload: &DatasetPayload) {
        let label = match dataset.key() {
            Some(key) => key.to_string(),
            None => dataset.kind.label().to_string(),
        };
        self.on_insert(&TreePath::dataset(dataset), label, Some(payload.id()));
        self.sync_annotations(dataset, payload.annotations());
        self.sync_unidec(dataset, payload);
    }

    /// Make the `Annotations` subtree match `annotations`. Entries that
    /// survive keep their node ids.
    pub fn sync_annotations(&mut self, dataset: &DatasetRef, annotations: Option<&AnnotationSet>) {
        let header = TreePath::annotations(dataset);
        let wanted: Vec<(PathSegment, Option<PayloadId>)> = annotations
            .into_iter()
            .flat_map(|set| set.keys())
            .map(|key| (PathSegment::Annotation(key.to_string()), None))
            .collect();
        self.sync_children(&header, wanted);
    }

    pub fn sync_unidec(&mut self, dataset: &DatasetRef, payload: &DatasetPayload) {
        let header = TreePath::unidec(dataset);
        let wanted: Vec<(PathSegment, Option<PayloadId>)> = payload
            .unidec_results()
            .into_iter()
            .flat_map(|results| results.iter())
            .map(|(name, result)| (PathSegment::Result(name.clone()), Some(result.id())))
            .collect();
        self.sync_children(&header, wanted);
    }

    /// Compare the projection against `documents`, node for node. Returns
    /// every discrepancy found.
    pub fn check_bijection<'a>(
        &self,
        documents: impl IntoIterator<Item = &'a Document>,
    ) -> Result<(), Vec<String>> {
        let mut expected = BTreeMap::new();
        for document in documents {
            expected_nodes(document, &mut expected);
        }

        let mut problems = Vec::new();
        let mut actual = BTreeMap::new();
        let mut referenced: BTreeMap<PayloadId, TreePath> = BTreeMap::new();
        for id in self.nodes.keys() {
            let Some(path) = self.path_of(*id) else {
                problems.push(format!("node {} is detached", id.get()));
                continue;
            };
            let payload_ref = self.nodes.get(id).and_then(|node| node.payload_ref);
            if let Some(payload) = payload_ref {
                if let Some(first) = referenced.insert(payload, path.clone()) {
                    problems.push(format!("{path} and {first} reference the same payload"));
                }
            }
            if actual.insert(path.clone(), payload_ref).is_some() {
                problems.push(format!("duplicate node at {path}"));
            }
        }

        for (path, payload_ref) in &expected {
            match actual.get(path) {
                None => problems.push(format!("missing node {path}")),
                Some(found) if found != payload_ref => problems.push(format!(
                    "{path} references {found:?}, expected {payload_ref:?}"
                )),
                Some(_) => {}
            }
        }
        for path in actual.keys() {
            if !expected.contains_key(path) {
                problems.push(format!("unexpected node {path}"));
            }
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(problems)
        }
    }

    fn sync_children(&mut self, header: &TreePath, wanted: Vec<(PathSegment, Option<PayloadId>)>) {
        for (segment, payload_ref) in &wanted {
            let path = header.clone().child(segment.clone());
            self.on_insert(&path, segment.default_label(), *payload_ref);
        }
        let Some(header_id) = self.locate(header) else {
            return;
        };
        let stale: Vec<NodeId> = self
            .children(header_id)
            .filter(|child| !wanted.iter().any(|(segment, _)| segment == &child.segment))
            .map(TreeNode::id)
            .collect();
        for id in stale {
            self.discard(id);
        }
        self.prune(Some(header_id));
    }

    fn child(&self, parent: Option<NodeId>, segment: &PathSegment) -> Option<NodeId> {
        let siblings = match parent {
            None => self.roots.as_slice(),
            Some(parent) => self.nodes.get(&parent)?.children.as_slice(),
        };
        siblings
            .iter()
            .copied()
            .find(|id| self.nodes.get(id).is_some_and(|node| &node.segment == segment))
    }

    fn ensure_path(&mut self, segments: &[PathSegment]) -> Option<NodeId> {
        let mut parent = None;
        for segment in segments {
            let id = match self.child(parent, segment) {
                Some(id) => id,
                None => self.create(parent, segment.clone(), segment.default_label(), None),
            };
            parent = Some(id);
        }
        parent
    }

    fn create(
        &mut self,
        parent: Option<NodeId>,
        segment: PathSegment,
        label: String,
        payload_ref: Option<PayloadId>,
    ) -> NodeId {
        self.next_id += 1;
        let id = NodeId(self.next_id);
        self.nodes.insert(
            id,
            TreeNode {
                id,
                segment,
                label,
                payload_ref,
                parent,
                children: Vec::new(),
            },
        );
        self.attach(parent, id);
        self.events.push(TreeEvent::Inserted { node: id, parent });
        id
    }

    fn attach(&mut self, parent: Option<NodeId>, id: NodeId) {
        let Some(parent) = parent else {
            self.roots.push(id);
            return;
        };
        let Some(segment) = self.nodes.get(&id).map(|node| node.segment.clone()) else {
            return;
        };
        let position = self.nodes.get(&parent).and_then(|node| {
            node.children.iter().position(|child| {
                self.nodes
                    .get(child)
                    .is_some_and(|child| child.segment > segment)
            })
        });
        if let Some(node) = self.nodes.get_mut(&parent) {
            let position = position.unwrap_or(node.children.len());
            node.children.insert(position, id);
        }
    }

    fn detach(&mut self, id: NodeId) {
        match self.nodes.get(&id).and_then(|node| node.parent) {
            None => self.roots.retain(|root| *root != id),
            Some(parent) => {
                if let Some(node) = self.nodes.get_mut(&parent) {
                    node.children.retain(|child| *child != id);
                }
            }
        }
    }

    fn discard(&mut self, id: NodeId) {
        self.detach(id);
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            if let Some(node) = self.nodes.remove(&current) {
                stack.extend(node.children);
            }
        }
        self.events.push(TreeEvent::Removed { node: id });
    }

    fn prune(&mut self, mut current: Option<NodeId>) {
        while let Some(id) = current {
            let Some(node) = self.nodes.get(&id) else {
                break;
            };
            let keep = matches!(node.segment, PathSegment::Document(_))
                || !node.children.is_empty()
                || node.payload_ref.is_some();
            if keep {
                break;
            }
            current = node.parent;
            self.discard(id);
        }
    }
}

fn expected_nodes(document: &Document, expected: &mut BTreeMap<TreePath, Option<PayloadId>>) {
    expected.insert(TreePath::document(&document.title), None);
    for (kind, key, payload) in document.catalog.iter() {
        let dataset = DatasetRef {
            document: document.title.clone(),
            kind,
            key: key.map(str::to_string),
        };
        if key.is_some() {
            expected.insert(
                TreePath::document(&document.title).child(PathSegment::Header(kind)),
                None,
            );
        }
        expected.insert(TreePath::dataset(&dataset), Some(payload.id()));
        if let Some(annotations) = payload.annotations() {
            expected.insert(TreePath::annotations(&dataset), None);
            for annotation in annotations.keys() {
                expected.insert(TreePath::annotation(&dataset, annotation), None);
            }
        }
        if let Some(results) = payload.unidec_results() {
            expected.insert(TreePath::unidec(&dataset), None);
            for (name, result) in results {
                expected.insert(TreePath::unidec_result(&dataset, name), Some(result.id()));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::ImportContext;
    use crate::conflict::ConflictPolicy;
    use crate::domain::{ConflictAction, DocumentType};

    #[test]
    fn shared_payload_reference_is_inconsistent() {
        let mut document = Document::new("RunA", DocumentType::Origami);
        let mut ctx = ImportContext::with_policy(ConflictPolicy::fixed(ConflictAction::Override));
        for key in ["a", "b"] {
            document
                .catalog
                .put(
                    Kind::IonHeatmaps,
                    Some(key),
                    DatasetPayload::heatmap(Kind::IonHeatmaps, vec![1.0], vec![1.0], vec![vec![1.0]]),
                    &mut ctx,
                )
                .unwrap();
        }
        let mut tree = TreeProjection::build([&document]);
        tree.check_bijection([&document]).unwrap();

        let shared = document
            .catalog
            .get(Kind::IonHeatmaps, Some("a"))
            .unwrap()
            .unwrap()
            .id();
        tree.on_insert(&TreePath::dataset(&entry("b")), "b", Some(shared));
        let problems = tree.check_bijection([&document]).unwrap_err();
        assert!(problems.iter().any(|p| p.contains("reference the same payload")));
    }

    fn entry(key: &str) -> DatasetRef {
        DatasetRef::entry("RunA", Kind::IonHeatmaps, key)
    }

    #[test]
    fn insert_creates_ancestors_lazily() {
        let mut tree = TreeProjection::new();
        let payload = PayloadId::next();
        tree.on_insert(&TreePath::dataset(&entry("400-420")), "400-420", Some(payload));

        assert_eq!(tree.len(), 3);
        let header = tree
            .resolve(&TreePath::document("RunA").child(PathSegment::Header(Kind::IonHeatmaps)))
            .unwrap();
        assert_eq!(header.label(), "Drift time (2D, EIC)");
        assert_eq!(header.payload_ref(), None);
        assert_eq!(
            tree.find_by_payload(payload),
            Some(TreePath::dataset(&entry("400-420")))
        );
    }

    #[test]
    fn upsert_keeps_node_id() {
        let mut tree = TreeProjection::new();
        let path = TreePath::dataset(&entry("a"));
        let first = tree.on_insert(&path, "a", Some(PayloadId::next())).unwrap();
        let replacement = PayloadId::next();
        let second = tree.on_insert(&path, "a", Some(replacement)).unwrap();
        assert_eq!(first, second);
        assert_eq!(tree.resolve(&path).unwrap().payload_ref(), Some(replacement));
    }

    #[test]
    fn remove_prunes_up_to_document() {
        let mut tree = TreeProjection::new();
        tree.on_insert(&TreePath::document("RunA"), "RunA", None);
        let annotation = TreePath::annotation(&entry("a"), "peak");
        tree.on_insert(&TreePath::dataset(&entry("a")), "a", Some(PayloadId::next()));
        tree.on_insert(&annotation, "peak", None);

        assert!(tree.on_remove(&annotation));
        assert!(tree.resolve(&TreePath::annotations(&entry("a"))).is_none());
        assert!(tree.resolve(&TreePath::dataset(&entry("a"))).is_some());

        assert!(tree.on_remove(&TreePath::dataset(&entry("a"))));
        assert_eq!(tree.len(), 1);
        assert!(tree.resolve(&TreePath::document("RunA")).is_some());

        assert!(!tree.on_remove(&TreePath::dataset(&entry("a"))));
    }

    #[test]
    fn rename_keeps_id_and_children() {
        let mut tree = TreeProjection::new();
        tree.on_insert(&TreePath::dataset(&entry("a")), "a", Some(PayloadId::next()));
        tree.on_insert(&TreePath::annotation(&entry("a"), "peak"), "peak", None);
        let id = tree.locate(&TreePath::dataset(&entry("a"))).unwrap();

        assert!(tree.on_rename(
            &TreePath::dataset(&entry("a")),
            &TreePath::dataset(&entry("b")),
            "b"
        ));
        assert_eq!(tree.locate(&TreePath::dataset(&entry("b"))), Some(id));
        assert!(tree.resolve(&TreePath::annotation(&entry("b"), "peak")).is_some());
        assert!(tree.resolve(&TreePath::dataset(&entry("a"))).is_none());
    }

    #[test]
    fn siblings_stay_sorted() {
        let mut tree = TreeProjection::new();
        tree.on_insert(&TreePath::dataset(&entry("b")), "b", Some(PayloadId::next()));
        tree.on_insert(&TreePath::dataset(&entry("a")), "a", Some(PayloadId::next()));
        tree.on_insert(
            &TreePath::dataset(&DatasetRef::singleton("RunA", Kind::MassSpectrum)),
            "Mass Spectrum",
            Some(PayloadId::next()),
        );
        let labels: Vec<String> = tree.flatten().into_iter().map(|node| node.label).collect();
        assert_eq!(
            labels,
            vec!["RunA", "Mass Spectrum", "Drift time (2D, EIC)", "a", "b"]
        );
    }

    #[test]
    fn events_are_drained_once() {
        let mut tree = TreeProjection::new();
        tree.on_insert(&TreePath::document("RunA"), "RunA", None);
        let events = tree.drain_events();
        assert_eq!(events.len(), 1);
        assert!(matches!(events[0], TreeEvent::Inserted { parent: None, .. }));
        assert!(tree.drain_events().is_empty());
    }
}
