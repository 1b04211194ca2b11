use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::error::CatalogError;

/// Closed set of dataset categories a document can hold.
///
/// Declaration order is the display order of kind headers in the tree.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, ValueEnum,
)]
#[serde(rename_all = "kebab-case")]
pub enum Kind {
    MassSpectrum,
    MassSpectrumProcessed,
    MassSpectra,
    Chromatogram,
    Chromatograms,
    Mobilogram,
    Mobilograms,
    #[value(name = "heatmap2d")]
    #[serde(rename = "heatmap2d")]
    Heatmap2D,
    #[value(name = "heatmap2d-processed")]
    #[serde(rename = "heatmap2d-processed")]
    Heatmap2DProcessed,
    IonHeatmaps,
    IonHeatmapsProcessed,
    #[value(name = "dtms")]
    #[serde(rename = "dtms")]
    DriftTimeMS,
    Calibration,
    Overlay,
    Statistical,
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotShape {
    Singleton,
    Collection,
}

impl Kind {
    pub const ALL: [Kind; 16] = [
        Kind::MassSpectrum,
        Kind::MassSpectrumProcessed,
        Kind::MassSpectra,
        Kind::Chromatogram,
        Kind::Chromatograms,
        Kind::Mobilogram,
        Kind::Mobilograms,
        Kind::Heatmap2D,
        Kind::Heatmap2DProcessed,
        Kind::IonHeatmaps,
        Kind::IonHeatmapsProcessed,
        Kind::DriftTimeMS,
        Kind::Calibration,
        Kind::Overlay,
        Kind::Statistical,
        Kind::Other,
    ];

    pub fn shape(self) -> SlotShape {
        match self {
            Kind::MassSpectrum
            | Kind::MassSpectrumProcessed
            | Kind::Chromatogram
            | Kind::Mobilogram
            | Kind::Heatmap2D
            | Kind::Heatmap2DProcessed
            | Kind::DriftTimeMS => SlotShape::Singleton,
            Kind::MassSpectra
            | Kind::Chromatograms
            | Kind::Mobilograms
            | Kind::IonHeatmaps
            | Kind::IonHeatmapsProcessed
            | Kind::Calibration
            | Kind::Overlay
            | Kind::Statistical
            | Kind::Other => SlotShape::Collection,
        }
    }

    pub fn is_collection(self) -> bool {
        self.shape() == SlotShape::Collection
    }

    /// Kinds whose payload carries a `z_values` matrix.
    pub fn is_heatmap(self) -> bool {
        matches!(
            self,
            Kind::Heatmap2D
                | Kind::Heatmap2DProcessed
                | Kind::IonHeatmaps
                | Kind::IonHeatmapsProcessed
                | Kind::DriftTimeMS
                | Kind::Overlay
                | Kind::Statistical
        )
    }

    /// Header label shown in the document tree.
    pub fn label(self) -> &'static str {
        match self {
            Kind::MassSpectrum => "Mass Spectrum",
            Kind::MassSpectrumProcessed => "Mass Spectrum (processed)",
            Kind::MassSpectra => "Mass Spectra",
            Kind::Chromatogram => "Chromatogram",
            Kind::Chromatograms => "Chromatograms (EIC)",
            Kind::Mobilogram => "Drift time (1D)",
            Kind::Mobilograms => "Drift time (1D, EIC)",
            Kind::Heatmap2D => "Drift time (2D)",
            Kind::Heatmap2DProcessed => "Drift time (2D, processed)",
            Kind::IonHeatmaps => "Drift time (2D, EIC)",
            Kind::IonHeatmapsProcessed => "Drift time (2D, processed, EIC)",
            Kind::DriftTimeMS => "DT/MS",
            Kind::Calibration => "Calibration peaks",
            Kind::Overlay => "Overlay",
            Kind::Statistical => "Statistical",
            Kind::Other => "Other data",
        }
    }
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}

impl FromStr for Kind {
    type Err = CatalogError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let trimmed = value.trim();
        Kind::ALL
            .into_iter()
            .find(|kind| {
                kind.label().eq_ignore_ascii_case(trimmed)
                    || kind
                        .to_possible_value()
                        .map(|v| v.matches(trimmed, true))
                        .unwrap_or(false)
            })
            .ok_or_else(|| CatalogError::Parse(format!("unknown dataset kind: {value}")))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum DocumentType {
    #[default]
    Origami,
    Infrared,
    Multifield,
    Calibration,
    Comparison,
    Interactive,
    Text,
    TandemMs,
    Other,
}

impl fmt::Display for DocumentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            DocumentType::Origami => "Type: ORIGAMI",
            DocumentType::Infrared => "Type: Infrared",
            DocumentType::Multifield => "Type: MANUAL",
            DocumentType::Calibration => "Type: CALIBRANT",
            DocumentType::Comparison => "Type: Comparison",
            DocumentType::Interactive => "Type: Interactive",
            DocumentType::Text => "Type: 2D IM-MS",
            DocumentType::TandemMs => "Type: MS/MS",
            DocumentType::Other => "Type: Other",
        };
        write!(f, "{label}")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ConflictAction {
    Override,
    Merge,
    Duplicate,
}

impl fmt::Display for ConflictAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConflictAction::Override => write!(f, "override"),
            ConflictAction::Merge => write!(f, "merge"),
            ConflictAction::Duplicate => write!(f, "duplicate"),
        }
    }
}

static NEXT_PAYLOAD_ID: AtomicU64 = AtomicU64::new(1);
static NEXT_DOCUMENT_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique identity of a dataset payload, used by the tree as a
/// lookup-only reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PayloadId(u64);

impl PayloadId {
    pub fn next() -> Self {
        Self(NEXT_PAYLOAD_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn get(self) -> u64 {
        self.0
    }
}

impl Default for PayloadId {
    fn default() -> Self {
        Self::next()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DocumentId(u64);

impl DocumentId {
    pub fn next() -> Self {
        Self(NEXT_DOCUMENT_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn get(self) -> u64 {
        self.0
    }
}

impl Default for DocumentId {
    fn default() -> Self {
        Self::next()
    }
}

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "doc-{}", self.0)
    }
}

/// Address of one dataset: document title, kind, and key for collection slots.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DatasetRef {
    pub document: String,
    pub kind: Kind,
    pub key: Option<String>,
}

impl DatasetRef {
    pub fn singleton(document: impl Into<String>, kind: Kind) -> Self {
        Self {
            document: document.into(),
            kind,
            key: None,
        }
    }

    pub fn entry(document: impl Into<String>, kind: Kind, key: impl Into<String>) -> Self {
        Self {
            document: document.into(),
            kind,
            key: Some(key.into()),
        }
    }

    pub fn key(&self) -> Option<&str> {
        self.key.as_deref()
    }
}

impl fmt::Display for DatasetRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.key {
            Some(key) => write!(f, "{} / {} / {}", self.document, self.kind, key),
            None => write!(f, "{} / {}", self.document, self.kind),
        }
    }
}
