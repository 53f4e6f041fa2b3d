//! Flatten a block tree into Markdown, JSON or HTML text.

use crate::document::{Block, BlockKind, Document, Page, RenderMetadata};
use crate::options::OutputFormat;
use crate::postprocess::clean_markdown;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;

/// Render `document` in `format`.
pub fn render(
    document: &Document,
    metadata: &RenderMetadata,
    format: OutputFormat,
) -> Result<String, serde_json::Error> {
    match format {
        OutputFormat::Markdown => Ok(to_markdown(document)),
        OutputFormat::Json => to_json(document, metadata),
        OutputFormat::Html => Ok(to_html(document, metadata)),
    }
}

fn is_content(block: &Block) -> bool {
    !matches!(block.kind, BlockKind::PageHeader | BlockKind::PageFooter)
}

// ── Markdown ─────────────────────────────────────────────────────────────

static RE_LEADING_MARKER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?:(?P<ordinal>\d{1,9})(?P<delim>[.)])|#{1,6}|[-*+>])(?:\s|$)").unwrap()
});

/// Backslash-escape a heading, list or quote marker that starts paragraph text.
fn escape_leading_marker(text: &str) -> String {
    let Some(caps) = RE_LEADING_MARKER.captures(text) else {
        return text.to_string();
    };
    match (caps.name("ordinal"), caps.name("delim")) {
        (Some(ordinal), Some(delim)) => {
            format!("{}\\{}", ordinal.as_str(), &text[delim.start()..])
        }
        _ => format!("\\{text}"),
    }
}

pub fn to_markdown(document: &Document) -> String {
    let mut out = String::new();
    let mut ordinal = 0usize;
    let mut prev_list = false;

    for block in document.blocks().filter(|b| is_content(b)) {
        let is_list = matches!(block.kind, BlockKind::ListItem { .. });
        if !out.is_empty() {
            out.push_str(if is_list && prev_list { "\n" } else { "\n\n" });
        }
        if !is_list {
            ordinal = 0;
        }

        match block.kind {
            BlockKind::SectionHeader { level } => {
                out.push_str(&"#".repeat(level.clamp(1, 6) as usize));
                out.push(' ');
                out.push_str(&block.joined_text());
            }
            BlockKind::ListItem { ordered } => {
                if ordered {
                    ordinal += 1;
                    out.push_str(&format!("{ordinal}. "));
                } else {
                    out.push_str("- ");
                }
                out.push_str(&block.joined_text());
            }
            BlockKind::Table => {
                if let Some(table) = &block.table {
                    out.push_str(table.to_markdown().trim_end());
                }
            }
            BlockKind::Picture => {
                if let Some(name) = &block.image {
                    out.push_str(&format!("![]({name})"));
                }
            }
            BlockKind::Text => out.push_str(&escape_leading_marker(&block.joined_text())),
            BlockKind::PageHeader | BlockKind::PageFooter => {}
        }
        prev_list = is_list;
    }

    clean_markdown(&out)
}

// ── JSON ─────────────────────────────────────────────────────────────────

#[derive(Serialize)]
struct JsonOutput<'a> {
    metadata: &'a RenderMetadata,
    pages: &'a [Page],
}

pub fn to_json(
    document: &Document,
    metadata: &RenderMetadata,
) -> Result<String, serde_json::Error> {
    let mut json = serde_json::to_string_pretty(&JsonOutput {
        metadata,
        pages: &document.pages,
    })?;
    json.push('\n');
    Ok(json)
}

// ── HTML ─────────────────────────────────────────────────────────────────

fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

pub fn to_html(document: &Document, metadata: &RenderMetadata) -> String {
    let title = metadata.document.title.as_deref().unwrap_or("Document");
    let mut out = format!(
        "<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"utf-8\">\n<title>{}</title>\n</head>\n<body>\n",
        escape(title)
    );
    let mut open_list: Option<bool> = None;

    for block in document.blocks().filter(|b| is_content(b)) {
        let ordered = match block.kind {
            BlockKind::ListItem { ordered } => Some(ordered),
            _ => None,
        };
        if open_list.is_some() && open_list != ordered {
            out.push_str(if open_list == Some(true) {
                "</ol>\n"
            } else {
                "</ul>\n"
            });
            open_list = None;
        }
        if let (None, Some(o)) = (open_list, ordered) {
            out.push_str(if o { "<ol>\n" } else { "<ul>\n" });
            open_list = Some(o);
        }

        match block.kind {
            BlockKind::SectionHeader { level } => {
                let h = level.clamp(1, 6);
                out.push_str(&format!("<h{h}>{}</h{h}>\n", escape(&block.joined_text())));
            }
            BlockKind::ListItem { .. } => {
                out.push_str(&format!("<li>{}</li>\n", escape(&block.joined_text())));
            }
            BlockKind::Table => {
                if let Some(table) = &block.table {
                    out.push_str("<table>\n");
                    for (i, row) in table.rows.iter().enumerate() {
                        let cell = if i == 0 { "th" } else { "td" };
                        out.push_str("<tr>");
                        for value in row {
                            out.push_str(&format!("<{cell}>{}</{cell}>", escape(value)));
                        }
                        out.push_str("</tr>\n");
                    }
                    out.push_str("</table>\n");
                }
            }
            BlockKind::Picture => {
                if let Some(name) = &block.image {
                    out.push_str(&format!("<img src=\"{}\" alt=\"\">\n", escape(name)));
                }
            }
            BlockKind::Text => {
                out.push_str(&format!("<p>{}</p>\n", escape(&block.joined_text())));
            }
            BlockKind::PageHeader | BlockKind::PageFooter => {}
        }
    }
    match open_list {
        Some(true) => out.push_str("</ol>\n"),
        Some(false) => out.push_str("</ul>\n"),
        None => {}
    }
    out.push_str("</body>\n</html>\n");
    out
}
