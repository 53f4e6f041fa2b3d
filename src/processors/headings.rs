//! Section header detection from line height.
//!
//! The body size is the line height carrying the most characters. Short
//! text blocks set noticeably larger than the body become headers; distinct
//! header sizes are ranked, largest first, into levels 1..=4.

use crate::document::{Block, BlockKind, Document};
use std::collections::BTreeMap;

const MIN_RATIO: f32 = 1.15;
const MAX_LINES: usize = 3;
const MAX_CHARS: usize = 120;
const MAX_LEVEL: usize = 4;

/// Sizes are bucketed to half points.
fn bucket(size: f32) -> i32 {
    (size * 2.0).round() as i32
}

fn body_bucket(document: &Document) -> Option<i32> {
    let mut weight: BTreeMap<i32, usize> = BTreeMap::new();
    for block in document.blocks().filter(|b| b.kind == BlockKind::Text) {
        for line in &block.lines {
            *weight.entry(bucket(line.size())).or_default() += line.text.chars().count();
        }
    }
    weight
        .into_iter()
        .max_by(|a, b| a.1.cmp(&b.1).then(b.0.cmp(&a.0)))
        .map(|(size, _)| size)
}

fn is_candidate(block: &Block, body: i32) -> bool {
    if block.kind != BlockKind::Text || block.lines.is_empty() || block.lines.len() > MAX_LINES {
        return false;
    }
    let text = block.joined_text();
    let chars = text.chars().count();
    chars > 0
        && chars <= MAX_CHARS
        && !text.ends_with(['.', ',', ';'])
        && bucket(block.line_size()) as f32 >= body as f32 * MIN_RATIO
}

pub(super) fn process(document: &mut Document) {
    let Some(body) = body_bucket(document) else {
        return;
    };

    let mut sizes: Vec<i32> = document
        .blocks()
        .filter(|b| is_candidate(b, body))
        .map(|b| bucket(b.line_size()))
        .collect();
    sizes.sort_unstable_by(|a, b| b.cmp(a));
    sizes.dedup();

    for page in &mut document.pages {
        for block in &mut page.blocks {
            if !is_candidate(block, body) {
                continue;
            }
            let rank = sizes
                .iter()
                .position(|s| *s == bucket(block.line_size()))
                .unwrap_or(0);
            block.kind = BlockKind::SectionHeader {
                level: (rank + 1).min(MAX_LEVEL) as u8,
            };
        }
    }
}
