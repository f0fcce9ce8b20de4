//! Block geometry scanner: turns the rendered box tree into candidate break points.

use crate::debug::DebugLogger;
use crate::layout::LayoutBox;
use crate::plan::CandidateSet;
use crate::style::{DisplayMode, PositionMode};
use serde_json::json;
use std::collections::BTreeSet;

/// Boxes shorter than this (document units) never contribute a break point.
pub const DEFAULT_MIN_BLOCK_HEIGHT: f32 = 14.0;

const BLOCK_TAGS: &[&str] = &[
    "table", "thead", "tbody", "tfoot", "tr", "section", "article", "header", "footer", "li",
    "h1", "h2", "h3", "h4", "h5", "h6", "p", "div", "blockquote", "figure", "ul", "ol",
];

fn is_block_like(node: &LayoutBox) -> bool {
    node.block_marker
        || node
            .tag
            .as_deref()
            .is_some_and(|tag| BLOCK_TAGS.contains(&tag))
}

pub(crate) fn scan_candidates(
    root: &LayoutBox,
    total_height: u32,
    min_block_height: f32,
    debug: Option<&DebugLogger>,
) -> CandidateSet {
    let origin = root.rect.y;
    let total = total_height as f32;
    let mut points = BTreeSet::new();
    let mut considered = 0u64;
    root.walk(&mut |node| {
        if !is_block_like(node) {
            return;
        }
        considered += 1;
        if node.display == DisplayMode::Inline || node.position == PositionMode::Fixed {
            return;
        }
        if node.rect.height < min_block_height {
            return;
        }
        let top = (node.rect.y - origin).clamp(0.0, total);
        let bottom = (node.rect.bottom() - origin).clamp(0.0, total);
        if bottom - top < min_block_height {
            return;
        }
        points.insert(bottom.round() as u32);
    });

    if let Some(logger) = debug {
        logger.log_json(&json!({
            "type": "scan.candidates",
            "total_height": total_height,
            "considered": considered,
            "points": points.iter().collect::<Vec<_>>(),
        }));
        logger.increment("scan.considered", considered);
    }
    CandidateSet::from(points)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{BoxRect, Color, EdgeSizes};

    fn node(tag: &str, y: f32, height: f32) -> LayoutBox {
        LayoutBox {
            tag: Some(tag.to_string()),
            block_marker: false,
            display: DisplayMode::Block,
            position: PositionMode::Static,
            rect: BoxRect::new(0.0, y, 794.0, height),
            background: None,
            border: EdgeSizes::zero(),
            border_color: Color::BLACK,
            image: None,
            text: Vec::new(),
            children: Vec::new(),
        }
    }

    fn root(children: Vec<LayoutBox>, height: f32) -> LayoutBox {
        let mut out = node("html", 0.0, height);
        out.children = children;
        out
    }

    #[test]
    fn structural_blocks_contribute_rounded_bottoms() {
        let tree = root(
            vec![node("div", 0.0, 400.4), node("section", 400.4, 449.7)],
            850.0,
        );
        let set = scan_candidates(&tree, 850, DEFAULT_MIN_BLOCK_HEIGHT, None);
        assert_eq!(set.as_slice(), &[400, 850]);
    }

    #[test]
    fn rejects_inline_fixed_and_hairline_boxes() {
        let mut inline = node("span", 0.0, 40.0);
        inline.block_marker = true;
        inline.display = DisplayMode::Inline;
        let mut fixed = node("div", 0.0, 60.0);
        fixed.position = PositionMode::Fixed;
        let hairline = node("div", 100.0, 2.0);
        let tree = root(vec![inline, fixed, hairline], 500.0);
        assert!(scan_candidates(&tree, 500, DEFAULT_MIN_BLOCK_HEIGHT, None).is_empty());
    }

    #[test]
    fn non_block_tags_need_the_marker() {
        let plain = node("span", 0.0, 100.0);
        let mut marked = node("aside", 100.0, 100.0);
        marked.block_marker = true;
        let tree = root(vec![plain, marked], 300.0);
        assert_eq!(
            scan_candidates(&tree, 300, DEFAULT_MIN_BLOCK_HEIGHT, None).as_slice(),
            &[200]
        );
    }

    #[test]
    fn clamped_span_below_threshold_is_dropped() {
        // Starts 5 units above the end of the document: clamped span is 5.
        let tree = root(vec![node("div", 495.0, 40.0)], 500.0);
        assert!(scan_candidates(&tree, 500, DEFAULT_MIN_BLOCK_HEIGHT, None).is_empty());
        let tree = root(vec![node("div", 460.0, 80.0)], 500.0);
        assert_eq!(
            scan_candidates(&tree, 500, DEFAULT_MIN_BLOCK_HEIGHT, None).as_slice(),
            &[500]
        );
    }

    #[test]
    fn duplicates_collapse_and_output_is_ascending() {
        let mut row = node("tr", 100.0, 50.0);
        row.children = vec![node("div", 100.0, 50.0)];
        let tree = root(vec![node("p", 300.0, 20.0), row], 400.0);
        assert_eq!(
            scan_candidates(&tree, 400, DEFAULT_MIN_BLOCK_HEIGHT, None).as_slice(),
            &[150, 320]
        );
    }
}
