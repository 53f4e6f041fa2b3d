//! Heuristic table recognition from line-fragment alignment.
//!
//! Works on the fragments produced by layout (a fragment never crosses a wide
//! horizontal gap, so each table cell is its own fragment):
//! 1. Cluster fragments of text blocks into rows by vertical alignment
//! 2. Find runs of adjacent rows with a similar number of short cells
//! 3. Derive column boundaries by clustering left edges
//! 4. Replace the consumed fragments with a single table block

use super::TableRecognizer;
use crate::document::{BBox, Block, BlockKind, Page, Table};
use crate::error::ModelError;
use std::collections::HashSet;
use tracing::debug;

/// Table detector configuration. Tolerances are in points.
#[derive(Debug, Clone)]
pub struct TableSettings {
    /// Fragments whose vertical centres are this close share a row.
    pub row_tolerance: f32,
    /// Left edges closer than this belong to the same column.
    pub col_tolerance: f32,
    pub min_cells: usize,
    pub min_rows: usize,
    pub min_cols: usize,
    /// Widest fragment (fraction of page width) still treated as a cell;
    /// keeps two-column body text from looking like a table.
    pub max_cell_width: f32,
    /// Largest gap between consecutive rows, in row heights.
    pub max_row_gap: f32,
}

impl Default for TableSettings {
    fn default() -> Self {
        Self {
            row_tolerance: 5.0,
            col_tolerance: 10.0,
            min_cells: 6,
            min_rows: 2,
            min_cols: 2,
            max_cell_width: 0.35,
            max_row_gap: 2.5,
        }
    }
}

#[derive(Debug, Clone)]
struct Cell {
    block: usize,
    line: usize,
    text: String,
    bbox: BBox,
}

type Row = Vec<Cell>;

/// Table recognizer over text-layer geometry. Runs on the CPU only.
#[derive(Debug, Clone, Default)]
pub struct GridTableRecognizer {
    settings: TableSettings,
}

impl GridTableRecognizer {
    pub fn new(settings: TableSettings) -> Self {
        Self { settings }
    }

    fn collect_cells(&self, page: &Page) -> Vec<Cell> {
        let mut cells: Vec<Cell> = page
            .blocks
            .iter()
            .enumerate()
            .filter(|(_, b)| b.kind == BlockKind::Text)
            .flat_map(|(bi, b)| {
                b.lines.iter().enumerate().map(move |(li, l)| Cell {
                    block: bi,
                    line: li,
                    text: l.text.trim().to_string(),
                    bbox: l.bbox,
                })
            })
            .filter(|c| !c.text.is_empty())
            .collect();
        cells.sort_by(|a, b| {
            a.bbox
                .y0
                .total_cmp(&b.bbox.y0)
                .then(a.bbox.x0.total_cmp(&b.bbox.x0))
        });
        cells
    }

    fn cluster_rows(&self, cells: Vec<Cell>) -> Vec<Row> {
        let mut rows: Vec<Row> = Vec::new();
        for cell in cells {
            let found = rows.iter().position(|row| {
                row.first().is_some_and(|first| {
                    (cell.bbox.center_y() - first.bbox.center_y()).abs()
                        <= self.settings.row_tolerance
                })
            });
            match found {
                Some(i) => rows[i].push(cell),
                None => rows.push(vec![cell]),
            }
        }
        for row in &mut rows {
            row.sort_by(|a, b| a.bbox.x0.total_cmp(&b.bbox.x0));
        }
        rows.sort_by(|a, b| {
            let ay = a.first().map(|c| c.bbox.y0).unwrap_or(0.0);
            let by = b.first().map(|c| c.bbox.y0).unwrap_or(0.0);
            ay.total_cmp(&by)
        });
        rows
    }

    fn is_candidate(&self, row: &Row, page_width: f32) -> bool {
        row.len() >= self.settings.min_cols
            && row
                .iter()
                .all(|c| c.bbox.width() <= self.settings.max_cell_width * page_width)
    }

    fn find_table_regions(&self, rows: Vec<Row>, page_width: f32) -> Vec<Vec<Row>> {
        let mut regions = Vec::new();
        let mut current: Vec<Row> = Vec::new();
        let mut expected_cols: Option<usize> = None;

        let close = |current: &mut Vec<Row>, regions: &mut Vec<Vec<Row>>| {
            if current.len() >= self.settings.min_rows {
                regions.push(std::mem::take(current));
            } else {
                current.clear();
            }
        };

        for row in rows {
            if !self.is_candidate(&row, page_width) {
                close(&mut current, &mut regions);
                expected_cols = None;
                continue;
            }

            let adjacent = current.last().is_none_or(|prev| {
                let prev_box = row_bbox(prev);
                let this_box = row_bbox(&row);
                this_box.y0 - prev_box.y1 <= self.settings.max_row_gap * prev_box.height().max(1.0)
            });
            let fits = expected_cols.is_some_and(|n| row.len().abs_diff(n) <= 1);

            if fits && adjacent {
                current.push(row);
            } else {
                close(&mut current, &mut regions);
                expected_cols = Some(row.len());
                current.push(row);
            }
        }
        close(&mut current, &mut regions);
        regions
    }

    fn column_boundaries(&self, region: &[Row]) -> Vec<f32> {
        let mut xs: Vec<f32> = region.iter().flatten().map(|c| c.bbox.x0).collect();
        xs.sort_by(f32::total_cmp);
        let Some(&first) = xs.first() else {
            return Vec::new();
        };

        let mut boundaries = vec![first];
        let mut cluster_start = first;
        for &x in &xs[1..] {
            if x - cluster_start > self.settings.col_tolerance {
                boundaries.push(x);
                cluster_start = x;
            }
        }
        let right = region
            .iter()
            .flatten()
            .map(|c| c.bbox.x1)
            .fold(f32::MIN, f32::max);
        boundaries.push(right.max(cluster_start) + 1.0);
        boundaries
    }

    fn build_table(&self, region: &[Row]) -> Option<(Table, BBox)> {
        let boundaries = self.column_boundaries(region);
        let num_cols = boundaries.len().saturating_sub(1);
        if num_cols < self.settings.min_cols {
            return None;
        }
        let cells: usize = region.iter().map(Vec::len).sum();
        if cells < self.settings.min_cells {
            return None;
        }

        let rows = region
            .iter()
            .map(|row| {
                let mut out = vec![String::new(); num_cols];
                for cell in row {
                    let col = column_index(cell.bbox.x0, &boundaries);
                    if out[col].is_empty() {
                        out[col] = cell.text.clone();
                    } else {
                        out[col].push(' ');
                        out[col].push_str(&cell.text);
                    }
                }
                out
            })
            .collect();
        let bbox = BBox::enclosing(region.iter().flatten().map(|c| &c.bbox))?;
        Some((Table { rows }, bbox))
    }
}

fn row_bbox(row: &Row) -> BBox {
    BBox::enclosing(row.iter().map(|c| &c.bbox)).unwrap_or_default()
}

/// Column whose left boundary is the last one at or before `x`.
fn column_index(x: f32, boundaries: &[f32]) -> usize {
    let cols = boundaries.len().saturating_sub(1);
    boundaries[..cols]
        .iter()
        .rposition(|&b| x + 0.5 >= b)
        .unwrap_or(0)
}

impl TableRecognizer for GridTableRecognizer {
    fn name(&self) -> &str {
        "grid-table"
    }

    fn recognize(&self, page: &mut Page) -> Result<usize, ModelError> {
        let cells = self.collect_cells(page);
        if cells.len() < self.settings.min_cells {
            return Ok(0);
        }

        let rows = self.cluster_rows(cells);
        let mut consumed: HashSet<(usize, usize)> = HashSet::new();
        let mut tables = Vec::new();
        for region in self.find_table_regions(rows, page.width) {
            if let Some((table, bbox)) = self.build_table(&region) {
                consumed.extend(region.iter().flatten().map(|c| (c.block, c.line)));
                tables.push(Block::table(bbox, table));
            }
        }
        if tables.is_empty() {
            return Ok(0);
        }

        let blocks = std::mem::take(&mut page.blocks);
        for (bi, mut block) in blocks.into_iter().enumerate() {
            if block.kind == BlockKind::Text && !block.lines.is_empty() {
                let mut li = 0;
                block.lines.retain(|_| {
                    let keep = !consumed.contains(&(bi, li));
                    li += 1;
                    keep
                });
                if block.lines.is_empty() {
                    continue;
                }
                if let Some(bbox) = BBox::enclosing(block.lines.iter().map(|l| &l.bbox)) {
                    block.bbox = bbox;
                }
            }
            page.blocks.push(block);
        }

        let found = tables.len();
        debug!("Page {}: {} tables", page.index + 1, found);
        page.blocks.extend(tables);
        Ok(found)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::TextLine;

    fn line(text: &str, x0: f32, y0: f32, x1: f32) -> TextLine {
        TextLine::new(text, BBox::new(x0, y0, x1, y0 + 10.0))
    }

    fn block(lines: Vec<TextLine>) -> Block {
        let bbox = BBox::enclosing(lines.iter().map(|l| &l.bbox)).unwrap();
        Block::text(bbox, lines)
    }

    fn page(blocks: Vec<Block>) -> Page {
        Page {
            index: 0,
            width: 600.0,
            height: 800.0,
            blocks,
        }
    }

    /// Three columns laid out as layout emits them: one block per column.
    fn grid_page() -> Page {
        page(vec![
            block(vec![line("Intro paragraph of the page", 50.0, 50.0, 500.0)]),
            block(vec![
                line("Name", 50.0, 100.0, 90.0),
                line("Alice", 50.0, 112.0, 90.0),
                line("Bob", 50.0, 124.0, 80.0),
            ]),
            block(vec![
                line("Age", 200.0, 100.0, 230.0),
                line("30", 200.0, 112.0, 215.0),
                line("25", 200.0, 124.0, 215.0),
            ]),
            block(vec![
                line("City", 350.0, 100.0, 380.0),
                line("New York", 350.0, 112.0, 420.0),
                line("Boston", 350.0, 124.0, 400.0),
            ]),
        ])
    }

    #[test]
    fn detects_grid_and_replaces_fragments() {
        let mut p = grid_page();
        let found = GridTableRecognizer::default().recognize(&mut p).unwrap();
        assert_eq!(found, 1);
        assert_eq!(p.blocks.len(), 2);
        assert_eq!(p.blocks[0].joined_text(), "Intro paragraph of the page");

        let table = p.blocks[1].table.as_ref().unwrap();
        assert_eq!(p.blocks[1].kind, BlockKind::Table);
        assert_eq!(table.rows[0], vec!["Name", "Age", "City"]);
        assert_eq!(table.rows[2], vec!["Bob", "25", "Boston"]);
        assert_eq!(p.blocks[1].bbox, BBox::new(50.0, 100.0, 420.0, 134.0));
    }

    #[test]
    fn two_column_prose_is_not_a_table() {
        let mut p = page(vec![
            block(vec![
                line("a long line of the left column", 50.0, 100.0, 280.0),
                line("another long line on the left", 50.0, 112.0, 280.0),
                line("and a third one on the left side", 50.0, 124.0, 280.0),
            ]),
            block(vec![
                line("a long line of the right column", 320.0, 100.0, 550.0),
                line("another long line on the right", 320.0, 112.0, 550.0),
                line("and a third one on the right side", 320.0, 124.0, 550.0),
            ]),
        ]);
        let before = p.clone();
        assert_eq!(GridTableRecognizer::default().recognize(&mut p).unwrap(), 0);
        assert_eq!(p, before);
    }

    #[test]
    fn too_few_cells_is_not_a_table() {
        let mut p = page(vec![
            block(vec![
                line("k", 50.0, 100.0, 60.0),
                line("k2", 50.0, 112.0, 60.0),
            ]),
            block(vec![
                line("v", 200.0, 100.0, 210.0),
                line("v2", 200.0, 112.0, 210.0),
            ]),
        ]);
        assert_eq!(GridTableRecognizer::default().recognize(&mut p).unwrap(), 0);
    }

    #[test]
    fn column_index_picks_last_boundary_left_of_x() {
        let boundaries = [50.0, 200.0, 350.0, 421.0];
        assert_eq!(column_index(50.0, &boundaries), 0);
        assert_eq!(column_index(205.0, &boundaries), 1);
        assert_eq!(column_index(400.0, &boundaries), 2);
        assert_eq!(column_index(10.0, &boundaries), 0);
    }
}
