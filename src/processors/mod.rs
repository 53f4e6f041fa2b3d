//! Post-layout processors over the whole [`Document`].
//!
//! Processors run after reading order, in the order the registry lists them.
//! Each one rewrites the block tree in place and is deterministic.

mod artifacts;
mod headings;
mod lists;
mod text;

use crate::document::Document;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::debug;

/// Identifier of a processor stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessorId {
    /// Drop page headers/footers and bare page numbers.
    PageArtifacts,
    /// Promote short, large-type blocks to section headers.
    SectionHeaders,
    /// Split bullet and numbered lines into list items.
    Lists,
    /// Join lines, de-hyphenate, merge paragraphs split by columns or pages.
    TextMerge,
}

const DEFAULT_ORDER: [ProcessorId; 4] = [
    ProcessorId::PageArtifacts,
    ProcessorId::SectionHeaders,
    ProcessorId::Lists,
    ProcessorId::TextMerge,
];

impl ProcessorId {
    pub fn default_order() -> &'static [ProcessorId] {
        &DEFAULT_ORDER
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ProcessorId::PageArtifacts => "page_artifacts",
            ProcessorId::SectionHeaders => "section_headers",
            ProcessorId::Lists => "lists",
            ProcessorId::TextMerge => "text_merge",
        }
    }

    /// Parse a comma-separated list, rejecting unknown names.
    pub fn parse_list(s: &str) -> Result<Vec<ProcessorId>, String> {
        s.split(',')
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .map(ProcessorId::from_str)
            .collect()
    }
}

impl FromStr for ProcessorId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        DEFAULT_ORDER
            .iter()
            .copied()
            .find(|p| p.as_str() == s.trim())
            .ok_or_else(|| {
                let known: Vec<&str> = DEFAULT_ORDER.iter().map(|p| p.as_str()).collect();
                format!(
                    "unknown processor '{}' (known: {})",
                    s.trim(),
                    known.join(", ")
                )
            })
    }
}

impl fmt::Display for ProcessorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Apply one processor to `document`.
pub fn apply(id: ProcessorId, document: &mut Document) {
    let before = document.blocks().count();
    match id {
        ProcessorId::PageArtifacts => artifacts::process(document),
        ProcessorId::SectionHeaders => headings::process(document),
        ProcessorId::Lists => lists::process(document),
        ProcessorId::TextMerge => text::process(document),
    }
    debug!(
        "Processor {}: {} → {} blocks",
        id,
        before,
        document.blocks().count()
    );
}
