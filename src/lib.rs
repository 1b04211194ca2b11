//! Document and dataset catalog for ion-mobility mass spectrometry work.
//!
//! A [`registry::DocumentRegistry`] owns every open [`document::Document`];
//! each document keeps its datasets in a [`catalog::DatasetCatalog`] and the
//! registry mirrors all of it into a [`tree::TreeProjection`] for display.

pub mod annotations;
pub mod app;
pub mod catalog;
pub mod config;
pub mod conflict;
pub mod document;
pub mod domain;
pub mod error;
pub mod importer;
pub mod naming;
pub mod output;
pub mod payload;
pub mod registry;
pub mod store;
pub mod tree;
pub mod tui;
