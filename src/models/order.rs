//! Reading order by recursive XY-cut.
//!
//! The block set is projected onto the Y axis first; every gap in the
//! projection wider than `min_gap` separates horizontal bands, read top to
//! bottom. A band that cannot be cut vertically is projected onto the X axis
//! and split into columns, read left to right. Each part is cut again until
//! no gap remains, at which point the remaining blocks are read by their top
//! edge.

use super::ReadingOrderModel;
use crate::document::{BBox, Page};
use crate::error::ModelError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Axis {
    X,
    Y,
}

/// XY-cut reading-order model.
#[derive(Debug, Clone)]
pub struct XyCutOrder {
    /// Minimum gap, in points, that separates two parts.
    pub min_gap: f32,
}

impl Default for XyCutOrder {
    fn default() -> Self {
        Self { min_gap: 1.0 }
    }
}

impl XyCutOrder {
    fn cut(&self, items: Vec<(usize, BBox)>, out: &mut Vec<usize>) {
        if items.len() <= 1 {
            out.extend(items.into_iter().map(|(i, _)| i));
            return;
        }
        for axis in [Axis::Y, Axis::X] {
            let parts = self.split(&items, axis);
            if parts.len() > 1 {
                for part in parts {
                    self.cut(part, out);
                }
                return;
            }
        }
        let mut items = items;
        items.sort_by(|a, b| a.1.y0.total_cmp(&b.1.y0).then(a.1.x0.total_cmp(&b.1.x0)));
        out.extend(items.into_iter().map(|(i, _)| i));
    }

    /// Partition by gaps in the projection onto `axis`, in increasing order.
    fn split(&self, items: &[(usize, BBox)], axis: Axis) -> Vec<Vec<(usize, BBox)>> {
        let span = |b: &BBox| match axis {
            Axis::X => (b.x0, b.x1),
            Axis::Y => (b.y0, b.y1),
        };
        let mut sorted = items.to_vec();
        sorted.sort_by(|a, b| span(&a.1).0.total_cmp(&span(&b.1).0));

        let mut parts: Vec<Vec<(usize, BBox)>> = Vec::new();
        let mut reach = f32::MIN;
        for item in sorted {
            let (start, end) = span(&item.1);
            match parts.last_mut() {
                Some(part) if start - reach <= self.min_gap => part.push(item),
                _ => parts.push(vec![item]),
            }
            reach = reach.max(end);
        }
        parts
    }
}

impl ReadingOrderModel for XyCutOrder {
    fn name(&self) -> &str {
        "xy-cut"
    }

    fn order(&self, page: &Page) -> Result<Vec<usize>, ModelError> {
        let items: Vec<(usize, BBox)> = page.blocks.iter().map(|b| b.bbox).enumerate().collect();
        let mut out = Vec::with_capacity(items.len());
        self.cut(items, &mut out);
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::Block;

    fn page(boxes: &[BBox]) -> Page {
        Page {
            index: 0,
            width: 600.0,
            height: 800.0,
            blocks: boxes.iter().map(|b| Block::text(*b, Vec::new())).collect(),
        }
    }

    #[test]
    fn two_columns_under_a_title() {
        // Input order is deliberately scrambled.
        let p = page(&[
            BBox::new(320.0, 100.0, 550.0, 180.0), // right top
            BBox::new(50.0, 210.0, 280.0, 300.0),  // left bottom
            BBox::new(50.0, 40.0, 550.0, 70.0),    // title
            BBox::new(320.0, 190.0, 550.0, 300.0), // right bottom
            BBox::new(50.0, 100.0, 280.0, 200.0),  // left top
        ]);
        let order = XyCutOrder::default().order(&p).unwrap();
        assert_eq!(order, vec![2, 4, 1, 0, 3]);
    }

    #[test]
    fn single_column_reads_top_down() {
        let p = page(&[
            BBox::new(50.0, 300.0, 500.0, 320.0),
            BBox::new(50.0, 100.0, 500.0, 120.0),
            BBox::new(50.0, 200.0, 500.0, 220.0),
        ]);
        assert_eq!(XyCutOrder::default().order(&p).unwrap(), vec![1, 2, 0]);
    }

    #[test]
    fn result_is_a_permutation() {
        let p = page(&[
            BBox::new(0.0, 0.0, 10.0, 10.0),
            BBox::new(5.0, 5.0, 15.0, 15.0),
            BBox::new(5.0, 5.0, 15.0, 15.0),
        ]);
        let mut order = XyCutOrder::default().order(&p).unwrap();
        order.sort_unstable();
        assert_eq!(order, vec![0, 1, 2]);
    }

    #[test]
    fn empty_page() {
        assert!(XyCutOrder::default().order(&page(&[])).unwrap().is_empty());
    }
}
