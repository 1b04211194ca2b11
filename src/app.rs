use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use camino::Utf8PathBuf;
use serde::Serialize;

use crate::catalog::{ImportContext, InsertOutcome};
use crate::config::{Settings, SettingsLoader};
use crate::document::Document;
use crate::conflict::{ConflictPolicy, ConflictPrompt, ImportConflictResolver, UpdateMerge};
use crate::domain::{ConflictAction, DatasetRef, Kind};
use crate::error::CatalogError;
use crate::importer::{ImportMessage, ImportQueue, Loaded, Loader};
use crate::payload::DatasetPayload;
use crate::registry::DocumentRegistry;

#[derive(Debug, Clone, Serialize)]
pub struct ImportedDataset {
    pub document: String,
    pub kind: Kind,
    pub key: Option<String>,
    pub action: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ImportFailure {
    pub path: String,
    pub error: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ImportReport {
    pub documents: Vec<String>,
    pub datasets: Vec<ImportedDataset>,
    pub failures: Vec<ImportFailure>,
}

impl ImportReport {
    fn absorb(&mut self, other: ImportReport) {
        self.documents.extend(other.documents);
        self.datasets.extend(other.datasets);
        self.failures.extend(other.failures);
    }
}

#[derive(Debug, Clone)]
pub struct StatusEvent {
    pub message: String,
    pub elapsed: Option<Duration>,
}

pub trait StatusSink {
    fn event(&self, event: StatusEvent);
}

#[derive(Debug, Clone, Serialize)]
pub struct DocumentSummary {
    pub title: String,
    pub document_type: String,
    pub current: bool,
    pub datasets: usize,
    pub kinds: Vec<String>,
    pub path: Option<String>,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ListResult {
    pub documents: Vec<DocumentSummary>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TreeLine {
    pub depth: usize,
    pub label: String,
    pub has_payload: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct TreeResult {
    pub nodes: Vec<TreeLine>,
}

/// Owner-thread facade: the registry plus the settings the import loop reads
/// before every insert.
pub struct App {
    registry: DocumentRegistry,
    settings: Settings,
    settings_path: Option<Utf8PathBuf>,
    policy_override: Option<ConflictPolicy>,
}

impl App {
    pub fn new(registry: DocumentRegistry, settings: Settings) -> Self {
        Self {
            registry,
            settings,
            settings_path: None,
            policy_override: None,
        }
    }

    /// Persist settings changes (remembered conflict choices, recent files)
    /// to `path`.
    pub fn with_settings_path(mut self, path: Utf8PathBuf) -> Self {
        self.settings_path = Some(path);
        self
    }

    /// Use `policy` for the rest of this run instead of the configured one.
    /// Not written back to the settings file.
    pub fn override_conflict_policy(&mut self, policy: ConflictPolicy) {
        self.policy_override = Some(policy);
    }

    pub fn registry(&self) -> &DocumentRegistry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut DocumentRegistry {
        &mut self.registry
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn into_registry(self) -> DocumentRegistry {
        self.registry
    }

    pub fn list(&self) -> ListResult {
        let current = self.registry.current();
        let documents = self
            .registry
            .documents()
            .map(|doc| DocumentSummary {
                title: doc.title.clone(),
                document_type: doc.document_type.to_string(),
                current: current == Some(doc.title.as_str()),
                datasets: doc.catalog.len(),
                kinds: doc.catalog.kinds().map(|kind| kind.to_string()).collect(),
                path: doc.path.as_ref().map(|path| path.to_string()),
                created_at: doc.created_at.to_rfc3339(),
            })
            .collect();
        ListResult { documents }
    }

    pub fn tree(&self) -> TreeResult {
        let nodes = self
            .registry
            .projection()
            .flatten()
            .into_iter()
            .map(|node| TreeLine {
                depth: node.depth,
                label: node.label,
                has_payload: node.has_payload,
            })
            .collect();
        TreeResult { nodes }
    }

    /// Load `paths` on background workers and apply the results here, in
    /// arrival order.
    pub fn import_files(
        &mut self,
        loader: Arc<dyn Loader>,
        paths: Vec<Utf8PathBuf>,
        prompt: Option<&mut (dyn ConflictPrompt + '_)>,
        sink: &dyn StatusSink,
    ) -> Result<ImportReport, CatalogError> {
        let workers = thread::available_parallelism()
            .map(|count| count.get())
            .unwrap_or(1)
            .min(paths.len().max(1));
        let queue = ImportQueue::spawn(loader, paths, workers);
        self.run_import(queue, prompt, sink)
    }

    /// Drain `queue` until its workers finish or it is cancelled. Files that
    /// fail to load or insert are reported, not fatal; an unusable conflict
    /// policy aborts the whole import.
    pub fn run_import(
        &mut self,
        queue: ImportQueue,
        mut prompt: Option<&mut (dyn ConflictPrompt + '_)>,
        sink: &dyn StatusSink,
    ) -> Result<ImportReport, CatalogError> {
        let started = Instant::now();
        let mut report = ImportReport::default();

        while let Some(message) = queue.next_blocking() {
            match message {
                ImportMessage::Loaded { path, loaded } => {
                    match self.apply(loaded, prompt.as_deref_mut(), sink) {
                        Ok(partial) => {
                            report.absorb(partial);
                            self.settings.push_recent(&path);
                        }
                        Err(CatalogError::InvalidConflictPolicy) => {
                            queue.handle().cancel();
                            return Err(CatalogError::InvalidConflictPolicy);
                        }
                        Err(error) => report.failures.push(failure(path, error)),
                    }
                }
                ImportMessage::Failed { path, error } => {
                    tracing::warn!(path = %path, error = %error, "import failed");
                    sink.event(StatusEvent {
                        message: format!("failed to load {path}: {error}"),
                        elapsed: Some(started.elapsed()),
                    });
                    report.failures.push(failure(path, error));
                }
            }
        }
        queue.join();
        self.save_settings()?;

        sink.event(StatusEvent {
            message: format!(
                "imported {} document(s), {} dataset(s), {} failure(s)",
                report.documents.len(),
                report.datasets.len(),
                report.failures.len()
            ),
            elapsed: Some(started.elapsed()),
        });
        Ok(report)
    }

    /// Hand one loader result to the registry.
    ///
    /// A document whose title is already open is merged into the open one
    /// dataset by dataset, each going through the conflict resolver. The
    /// merge is all or nothing: if any dataset fails, the open document is
    /// left as it was.
    pub fn apply(
        &mut self,
        loaded: Loaded,
        mut prompt: Option<&mut (dyn ConflictPrompt + '_)>,
        sink: &dyn StatusSink,
    ) -> Result<ImportReport, CatalogError> {
        let mut report = ImportReport::default();
        match loaded {
            Loaded::Document(document) if !self.registry.contains(&document.title) => {
                let title = document.title.clone();
                let datasets: Vec<ImportedDataset> = document
                    .catalog
                    .iter()
                    .map(|(kind, key, _)| ImportedDataset {
                        document: title.clone(),
                        kind,
                        key: key.map(str::to_string),
                        action: "inserted".to_string(),
                    })
                    .collect();
                self.registry.add(document)?;
                sink.event(StatusEvent {
                    message: format!("opened document {title}"),
                    elapsed: None,
                });
                report.documents.push(title);
                report.datasets.extend(datasets);
            }
            Loaded::Document(document) => {
                let title = document.title.clone();
                tracing::info!(title = %title, "document already open, merging datasets");
                let mut policy = self.conflict_policy()?;
                let mut remembered = None;
                let stored = self.registry.merge_document(document, |catalog, kind, key, payload| {
                    let resolver = ImportConflictResolver::new(policy);
                    let mut ctx = ImportContext::new(resolver, prompt.as_deref_mut(), &UpdateMerge);
                    let outcome = catalog.put(kind, key, payload, &mut ctx)?;
                    if let Some(action) = outcome.remember {
                        policy = ConflictPolicy::fixed(action);
                        remembered = Some(action);
                    }
                    Ok(outcome)
                })?;
                if let Some(action) = remembered {
                    self.remember(action)?;
                }
                for (dataset, outcome) in stored {
                    report.datasets.push(imported(&dataset, outcome, sink));
                }
            }
            Loaded::Dataset {
                document,
                kind,
                key,
                payload,
            } if !self.registry.contains(&document) => {
                let mut fresh = Document::new(document.clone(), self.settings.default_document_type);
                let mut ctx = ImportContext::with_policy(self.conflict_policy()?);
                let outcome = fresh.catalog.put(kind, key.as_deref(), payload, &mut ctx)?;
                self.registry.add(fresh)?;
                report.documents.push(document.clone());
                let dataset = DatasetRef {
                    document,
                    kind,
                    key: outcome.key.clone(),
                };
                report.datasets.push(imported(&dataset, outcome, sink));
            }
            Loaded::Dataset {
                document,
                kind,
                key,
                payload,
            } => {
                let dataset = DatasetRef {
                    document,
                    kind,
                    key,
                };
                let imported = self.put(&dataset, payload, prompt, sink)?;
                report.datasets.push(imported);
            }
        }
        Ok(report)
    }

    fn put(
        &mut self,
        dataset: &DatasetRef,
        payload: DatasetPayload,
        prompt: Option<&mut (dyn ConflictPrompt + '_)>,
        sink: &dyn StatusSink,
    ) -> Result<ImportedDataset, CatalogError> {
        let resolver = ImportConflictResolver::new(self.conflict_policy()?);
        let mut ctx = ImportContext::new(resolver, prompt, &UpdateMerge);
        let outcome = self.registry.put_dataset(dataset, payload, &mut ctx)?;
        if let Some(action) = outcome.remember {
            self.remember(action)?;
        }
        let stored = DatasetRef {
            document: dataset.document.clone(),
            kind: dataset.kind,
            key: outcome.key.clone(),
        };
        Ok(imported(&stored, outcome, sink))
    }

    fn conflict_policy(&self) -> Result<ConflictPolicy, CatalogError> {
        match self.policy_override {
            Some(policy) => Ok(policy),
            None => {
                self.settings.validate()?;
                Ok(self.settings.import)
            }
        }
    }

    fn remember(&mut self, action: ConflictAction) -> Result<(), CatalogError> {
        tracing::info!(%action, "conflict choice remembered");
        self.settings.remember(action);
        self.save_settings()
    }

    fn save_settings(&self) -> Result<(), CatalogError> {
        match &self.settings_path {
            Some(path) => SettingsLoader::save(path, &self.settings),
            None => Ok(()),
        }
    }
}

fn imported(dataset: &DatasetRef, outcome: InsertOutcome, sink: &dyn StatusSink) -> ImportedDataset {
    let action = outcome.action.as_str();
    sink.event(StatusEvent {
        message: format!("{action} {dataset}"),
        elapsed: None,
    });
    ImportedDataset {
        document: dataset.document.clone(),
        kind: dataset.kind,
        key: dataset.key.clone(),
        action: action.to_string(),
    }
}

fn failure(path: Utf8PathBuf, error: CatalogError) -> ImportFailure {
    ImportFailure {
        path: path.to_string(),
        error: error.to_string(),
    }
}
