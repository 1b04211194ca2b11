use std::collections::VecDeque;
use std::fs;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, TryRecvError};
use std::sync::{Arc, LazyLock, Mutex};
use std::thread::{self, JoinHandle};

use camino::{Utf8Path, Utf8PathBuf};
use regex::Regex;

use crate::catalog::ImportContext;
use crate::conflict::ConflictPolicy;
use crate::document::Document;
use crate::domain::{ConflictAction, DocumentType, Kind};
use crate::error::CatalogError;
use crate::payload::DatasetPayload;

/// What a loader hands back to the owner thread.
#[derive(Debug, Clone)]
pub enum Loaded {
    /// A complete new document.
    Document(Document),
    /// One dataset destined for an existing (or to-be-created) document.
    Dataset {
        document: String,
        kind: Kind,
        key: Option<String>,
        payload: DatasetPayload,
    },
}

/// Reads a raw file into catalog data. Runs on worker threads, so it must
/// not touch the registry.
pub trait Loader: Send + Sync {
    fn load(&self, path: &Utf8Path) -> Result<Loaded, CatalogError>;
}

/// Plain-text spectra, chromatograms and mobilograms: two numeric columns
/// separated by whitespace, commas, semicolons or tabs. Heatmap kinds read a
/// rectangular matrix instead. Lines starting with `#` are comments.
#[derive(Debug, Clone)]
pub struct TextXyLoader {
    pub kind: Kind,
    /// Add to this document instead of creating one per file.
    pub document: Option<String>,
}

impl TextXyLoader {
    pub fn new(kind: Kind) -> Self {
        Self {
            kind,
            document: None,
        }
    }

    pub fn into_document(mut self, title: impl Into<String>) -> Self {
        self.document = Some(title.into());
        self
    }

    pub fn parse(&self, content: &str) -> Result<DatasetPayload, CatalogError> {
        let rows = parse_rows(content)?;
        let (x_label, y_label) = axis_labels(self.kind);
        let payload = if self.kind.is_heatmap() {
            let width = rows.first().map(Vec::len).unwrap_or(0);
            if let Some(row) = rows.iter().position(|row| row.len() != width) {
                return Err(CatalogError::Parse(format!(
                    "matrix row {} has {} columns, expected {width}",
                    row + 1,
                    rows[row].len()
                )));
            }
            let x_values = (1..=width).map(|col| col as f64).collect();
            let y_values = (1..=rows.len()).map(|row| row as f64).collect();
            DatasetPayload::heatmap(self.kind, x_values, y_values, rows)
        } else {
            let mut x_values = Vec::with_capacity(rows.len());
            let mut y_values = Vec::with_capacity(rows.len());
            for (index, row) in rows.iter().enumerate() {
                let [x, y, ..] = row.as_slice() else {
                    return Err(CatalogError::Parse(format!(
                        "data row {} needs two columns",
                        index + 1
                    )));
                };
                x_values.push(*x);
                y_values.push(*y);
            }
            DatasetPayload::new(self.kind, x_values, y_values)
        };
        Ok(payload.with_labels(x_label, y_label))
    }
}

impl Loader for TextXyLoader {
    fn load(&self, path: &Utf8Path) -> Result<Loaded, CatalogError> {
        let content = fs::read_to_string(path.as_std_path())
            .map_err(|err| CatalogError::Filesystem(format!("{path}: {err}")))?;
        let payload = self
            .parse(&content)?
            .with_metadata("source_file", path.as_str());
        let stem = path.file_stem().unwrap_or(path.as_str()).to_string();
        let key = self.kind.is_collection().then(|| stem.clone());

        if let Some(document) = &self.document {
            return Ok(Loaded::Dataset {
                document: document.clone(),
                kind: self.kind,
                key,
                payload,
            });
        }

        let title = path.file_name().unwrap_or(path.as_str()).to_string();
        let mut document = Document::new(title, DocumentType::Text).with_path(path.to_path_buf());
        let mut ctx = ImportContext::with_policy(ConflictPolicy::fixed(ConflictAction::Override));
        document
            .catalog
            .put(self.kind, key.as_deref(), payload, &mut ctx)?;
        Ok(Loaded::Document(document))
    }
}

fn axis_labels(kind: Kind) -> (&'static str, &'static str) {
    match kind {
        Kind::MassSpectrum | Kind::MassSpectrumProcessed | Kind::MassSpectra => ("m/z", "Intensity"),
        Kind::Chromatogram | Kind::Chromatograms => ("Scans", "Intensity"),
        Kind::Mobilogram | Kind::Mobilograms => ("Drift time (bins)", "Intensity"),
        Kind::Calibration => ("Drift time (bins)", "m/z"),
        Kind::DriftTimeMS => ("m/z", "Drift time (bins)"),
        Kind::Heatmap2D
        | Kind::Heatmap2DProcessed
        | Kind::IonHeatmaps
        | Kind::IonHeatmapsProcessed
        | Kind::Overlay
        | Kind::Statistical => ("Scans", "Drift time (bins)"),
        Kind::Other => ("x", "y"),
    }
}

static FIELD_SEPARATOR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[,;\s]+").expect("valid regex"));

fn parse_rows(content: &str) -> Result<Vec<Vec<f64>>, CatalogError> {
    let mut rows = Vec::new();
    for (index, line) in content.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let parsed: Result<Vec<f64>, _> = FIELD_SEPARATOR
            .split(line)
            .filter(|field| !field.is_empty())
            .map(str::parse::<f64>)
            .collect();
        match parsed {
            Ok(values) => rows.push(values),
            // column headers before the first data row
            Err(_) if rows.is_empty() => continue,
            Err(err) => {
                return Err(CatalogError::Parse(format!("line {}: {err}", index + 1)));
            }
        }
    }
    if rows.is_empty() {
        return Err(CatalogError::Parse("no numeric data found".to_string()));
    }
    Ok(rows)
}

#[derive(Debug)]
pub enum ImportMessage {
    Loaded { path: Utf8PathBuf, loaded: Loaded },
    Failed { path: Utf8PathBuf, error: CatalogError },
}

/// Cancels an [`ImportQueue`] from any thread.
#[derive(Debug, Clone)]
pub struct ImportHandle {
    cancelled: Arc<AtomicBool>,
}

impl ImportHandle {
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// Background loaders feeding the owner thread.
///
/// Workers only build documents and payloads; the owner drains messages and
/// applies them to its registry. Once cancelled, pending and in-flight
/// results are discarded rather than delivered.
pub struct ImportQueue {
    receiver: Receiver<ImportMessage>,
    handle: ImportHandle,
    workers: Vec<JoinHandle<()>>,
}

impl ImportQueue {
    pub fn spawn(loader: Arc<dyn Loader>, paths: Vec<Utf8PathBuf>, workers: usize) -> Self {
        let (tx, receiver) = mpsc::channel();
        let handle = ImportHandle {
            cancelled: Arc::new(AtomicBool::new(false)),
        };
        let queue = Arc::new(Mutex::new(VecDeque::from(paths)));
        let workers = (0..workers.max(1))
            .map(|_| {
                let tx = tx.clone();
                let loader = Arc::clone(&loader);
                let queue = Arc::clone(&queue);
                let handle = handle.clone();
                thread::spawn(move || {
                    loop {
                        if handle.is_cancelled() {
                            break;
                        }
                        let next = match queue.lock() {
                            Ok(mut queue) => queue.pop_front(),
                            Err(_) => None,
                        };
                        let Some(path) = next else {
                            break;
                        };
                        let message = match loader.load(&path) {
                            Ok(loaded) => ImportMessage::Loaded { path, loaded },
                            Err(error) => ImportMessage::Failed { path, error },
                        };
                        if tx.send(message).is_err() {
                            break;
                        }
                    }
                })
            })
            .collect();
        Self {
            receiver,
            handle,
            workers,
        }
    }

    pub fn handle(&self) -> ImportHandle {
        self.handle.clone()
    }

    /// Next message if one is ready. `None` when nothing is waiting, the
    /// workers are done, or the import was cancelled.
    pub fn try_next(&self) -> Option<ImportMessage> {
        if self.handle.is_cancelled() {
            return None;
        }
        match self.receiver.try_recv() {
            Ok(message) if !self.handle.is_cancelled() => Some(message),
            Ok(_) | Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => None,
        }
    }

    /// Block until the next message; `None` once all workers have finished
    /// or the import was cancelled.
    pub fn next_blocking(&self) -> Option<ImportMessage> {
        if self.handle.is_cancelled() {
            return None;
        }
        let message = self.receiver.recv().ok()?;
        if self.handle.is_cancelled() {
            tracing::debug!("discarding import result received after cancel");
            return None;
        }
        Some(message)
    }

    pub fn join(self) {
        drop(self.receiver);
        for worker in self.workers {
            if worker.join().is_err() {
                tracing::warn!("import worker panicked");
            }
        }
    }
}

impl Iterator for ImportQueue {
    type Item = ImportMessage;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_blocking()
    }
}
