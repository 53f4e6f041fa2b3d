//! Page furniture removal.
//!
//! Page headers and footers labelled by layout are dropped. In the top or
//! bottom band of a page, text blocks are dropped too when they:
//!
//! * read as an explicit page number ("Page 3", "3 of 10", "4/12");
//! * are a bare number or roman numeral and most pages carry one in the band;
//! * repeat (digits ignored) on at least half of a document of 3+ pages.

use crate::document::{Block, BlockKind, Document};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashMap;

/// Fraction of the page height searched for furniture at top and bottom.
const BAND: f32 = 0.1;

static RE_PAGE_NUMBER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?ix)^
        (?P<prefix>page\s+)?
        [-–—\s]*
        (?P<num>\d{1,4}|m{0,3}(?:cm|cd|d?c{0,3})(?:xc|xl|l?x{0,3})(?:ix|iv|v?i{0,3}))
        [-–—\s]*
        (?P<total>(?:of|/)\s*\d{1,4})?
        $",
    )
    .unwrap()
});

static RE_DIGITS: Lazy<Regex> = Lazy::new(|| Regex::new(r"\d+").unwrap());

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PageNumber {
    /// Carries a "page" prefix or a page total.
    Explicit,
    /// A number alone, possibly dash-decorated.
    Bare,
}

fn page_number(text: &str) -> Option<PageNumber> {
    let caps = RE_PAGE_NUMBER.captures(text.trim())?;
    if caps.name("num").map_or(true, |m| m.as_str().is_empty()) {
        return None;
    }
    if caps.name("prefix").is_some() || caps.name("total").is_some() {
        Some(PageNumber::Explicit)
    } else {
        Some(PageNumber::Bare)
    }
}

fn signature(block: &Block) -> String {
    RE_DIGITS
        .replace_all(&block.joined_text().to_lowercase(), "#")
        .into_owned()
}

fn in_band(block: &Block, page_height: f32) -> bool {
    block.bbox.y1 <= page_height * BAND || block.bbox.y0 >= page_height * (1.0 - BAND)
}

pub(super) fn process(document: &mut Document) {
    let page_count = document.pages.len();

    let mut seen: HashMap<String, usize> = HashMap::new();
    let mut numbered_pages = 0;
    for page in &document.pages {
        let band: Vec<&Block> = page
            .blocks
            .iter()
            .filter(|b| b.kind == BlockKind::Text && in_band(b, page.height))
            .collect();
        if band.iter().any(|b| page_number(&b.joined_text()).is_some()) {
            numbered_pages += 1;
        }
        if page_count >= 3 {
            let mut on_page: Vec<String> = band.into_iter().map(signature).collect();
            on_page.sort();
            on_page.dedup();
            for sig in on_page {
                *seen.entry(sig).or_default() += 1;
            }
        }
    }
    let numbered = page_count >= 2 && numbered_pages * 2 > page_count;
    let repeated =
        |sig: &str| page_count >= 3 && seen.get(sig).is_some_and(|n| *n * 2 >= page_count);

    for page in &mut document.pages {
        let height = page.height;
        page.blocks.retain(|b| match b.kind {
            BlockKind::PageHeader | BlockKind::PageFooter => false,
            BlockKind::Text if in_band(b, height) => {
                let furniture = match page_number(&b.joined_text()) {
                    Some(PageNumber::Explicit) => true,
                    Some(PageNumber::Bare) => numbered,
                    None => false,
                };
                !(furniture || repeated(&signature(b)))
            }
            _ => true,
        });
    }
}
