use std::io::{self, Write};

use serde::Serialize;

use crate::app::{ImportReport, ListResult, StatusEvent, StatusSink, TreeResult};
use crate::store::SessionSummary;

#[derive(Debug, Clone, Copy)]
pub enum OutputMode {
    Interactive,
    NonInteractive,
}

pub struct JsonOutput;

impl JsonOutput {
    pub fn print_list(result: &ListResult) -> io::Result<()> {
        Self::print_json(result)
    }

    pub fn print_tree(result: &TreeResult) -> io::Result<()> {
        Self::print_json(result)
    }

    pub fn print_import(result: &ImportReport) -> io::Result<()> {
        Self::print_json(result)
    }

    pub fn print_session(result: &SessionSummary) -> io::Result<()> {
        Self::print_json(result)
    }

    pub fn print_json<T: Serialize>(value: &T) -> io::Result<()> {
        let json = serde_json::to_string_pretty(value).map_err(io::Error::other)?;
        let mut stdout = io::stdout();
        stdout.write_all(json.as_bytes())?;
        stdout.write_all(b"\n")?;
        Ok(())
    }
}

impl StatusSink for JsonOutput {
    fn event(&self, _event: StatusEvent) {}
}

/// Human-readable rendering for interactive runs.
pub struct TextOutput;

impl TextOutput {
    pub fn render_list(result: &ListResult) -> String {
        let mut out = String::new();
        for doc in &result.documents {
            let marker = if doc.current { "*" } else { " " };
            out.push_str(&format!(
                "{marker} {}  [{}]  {} dataset(s)\n",
                doc.title, doc.document_type, doc.datasets
            ));
        }
        out
    }

    pub fn render_tree(result: &TreeResult) -> String {
        let mut out = String::new();
        for node in &result.nodes {
            let bullet = if node.has_payload { "●" } else { "○" };
            out.push_str(&"  ".repeat(node.depth));
            out.push_str(&format!("{bullet} {}\n", node.label));
        }
        out
    }

    pub fn print(text: &str) -> io::Result<()> {
        let mut stdout = io::stdout();
        stdout.write_all(text.as_bytes())?;
        stdout.flush()
    }
}

impl StatusSink for TextOutput {
    fn event(&self, event: StatusEvent) {
        match event.elapsed {
            Some(elapsed) => eprintln!("{} ({:.2?})", event.message, elapsed),
            None => eprintln!("{}", event.message),
        }
    }
}
