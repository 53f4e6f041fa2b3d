//! Line joining and paragraph continuation.
//!
//! Lines of each text-bearing block are joined into one line, removing
//! end-of-line hyphenation. A paragraph that does not end a sentence and is
//! directly followed (in reading order, possibly on the next page or column)
//! by a paragraph starting in lowercase is merged with it.

use crate::document::{Block, BlockKind, Document, TextLine};

fn carries_text(kind: BlockKind) -> bool {
    matches!(
        kind,
        BlockKind::Text | BlockKind::ListItem { .. } | BlockKind::SectionHeader { .. }
    )
}

/// Append `next` to `acc`, joining a word hyphenated across the break.
fn push_joined(acc: &mut String, next: &str) {
    let next = next.trim();
    if next.is_empty() {
        return;
    }
    let hyphenated = acc.ends_with('-')
        && acc.chars().rev().nth(1).is_some_and(char::is_alphabetic)
        && next.chars().next().is_some_and(char::is_lowercase);
    if hyphenated {
        acc.pop();
    } else if !acc.is_empty() {
        acc.push(' ');
    }
    acc.push_str(next);
}

fn join_lines(block: &mut Block) {
    if block.lines.len() < 2 {
        return;
    }
    let mut text = String::new();
    for line in &block.lines {
        push_joined(&mut text, &line.text);
    }
    block.lines = vec![TextLine::new(text, block.bbox)];
}

fn ends_sentence(text: &str) -> bool {
    text.trim_end()
        .ends_with(['.', '!', '?', ':', ';', '"', '”', ')'])
}

fn continues(prev: &Block, next: &Block) -> bool {
    let next_text = next.joined_text();
    !ends_sentence(&prev.joined_text()) && next_text.chars().next().is_some_and(char::is_lowercase)
}

pub(super) fn process(document: &mut Document) {
    for block in document.pages.iter_mut().flat_map(|p| p.blocks.iter_mut()) {
        if carries_text(block.kind) {
            join_lines(block);
        }
    }

    let mut last_text: Option<(usize, usize)> = None;
    for pi in 0..document.pages.len() {
        let blocks = std::mem::take(&mut document.pages[pi].blocks);
        for block in blocks {
            let target = last_text.filter(|&(lp, lb)| {
                block.kind == BlockKind::Text && continues(&document.pages[lp].blocks[lb], &block)
            });
            match target {
                Some((lp, lb)) => {
                    let prev = &mut document.pages[lp].blocks[lb];
                    let mut text = prev.joined_text();
                    push_joined(&mut text, &block.joined_text());
                    if lp == pi {
                        prev.bbox = prev.bbox.union(&block.bbox);
                    }
                    prev.lines = vec![TextLine::new(text, prev.bbox)];
                }
                None => {
                    let is_text = block.kind == BlockKind::Text;
                    document.pages[pi].blocks.push(block);
                    last_text = is_text.then(|| (pi, document.pages[pi].blocks.len() - 1));
                }
            }
        }
    }
}
