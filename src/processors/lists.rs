//! Bullet and numbered list detection.
//!
//! A text block whose first line starts with a list marker is split into one
//! list item per marker line; lines without a marker continue the previous
//! item. The marker itself is removed from the text.

use crate::document::{Block, BlockKind, Document, TextLine};
use once_cell::sync::Lazy;
use regex::Regex;

static RE_BULLET: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\s*[•●▪◦‣∙·○■□\-–\*]\s+(.*)$").unwrap());

static RE_ORDERED: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*(?:\(?\d{1,3}[.)]|\(?[a-z][)])\s+(.*)$").unwrap());

/// `Some((ordered, rest))` when `text` starts with a list marker.
fn marker(text: &str) -> Option<(bool, String)> {
    if let Some(caps) = RE_BULLET.captures(text) {
        return Some((false, caps[1].to_string()));
    }
    RE_ORDERED
        .captures(text)
        .map(|caps| (true, caps[1].to_string()))
}

fn split_items(block: Block) -> Vec<Block> {
    let mut items: Vec<Block> = Vec::new();
    for line in block.lines {
        match marker(&line.text) {
            Some((ordered, rest)) => items.push(Block {
                kind: BlockKind::ListItem { ordered },
                bbox: line.bbox,
                lines: vec![TextLine::new(rest, line.bbox)],
                table: None,
                image: None,
                needs_ocr: false,
            }),
            None => match items.last_mut() {
                Some(item) => {
                    item.bbox = item.bbox.union(&line.bbox);
                    item.lines.push(line);
                }
                None => items.push(Block::text(line.bbox, vec![line])),
            },
        }
    }
    items
}

pub(super) fn process(document: &mut Document) {
    for page in &mut document.pages {
        let blocks = std::mem::take(&mut page.blocks);
        for block in blocks {
            let starts_list = block.kind == BlockKind::Text
                && block
                    .lines
                    .first()
                    .is_some_and(|l| marker(&l.text).is_some());
            if starts_list {
                page.blocks.extend(split_items(block));
            } else {
                page.blocks.push(block);
            }
        }
    }
}
