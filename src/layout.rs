//! Block-formatting layout at a fixed virtual width.
//!
//! Produces a box tree in document coordinates (CSS px, origin at the top-left
//! of the root element). Every element that generates a box keeps its tag, its
//! display and position modes and its border-box rectangle so the scanner can
//! reason about it without going back to the DOM.

use crate::assets::ImageStore;
use crate::font::FontRegistry;
use crate::html::{attribute, element_info, parse_dimension_attr};
use crate::style::{
    ComputedStyle, DisplayMode, ElementInfo, Length, PositionMode, StyleResolver, TextAlignMode,
    parse_color_attr,
};
use crate::types::{BoxRect, Color, EdgeSizes};
use kuchiki::{NodeData, NodeRef};

const BLOCK_MARKER_ATTR: &str = "data-pdf-block";
const BLOCK_MARKER_CLASS: &str = "pdf-block";

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct TextFragment {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub text: String,
    pub font_size: f32,
    pub bold: bool,
    pub color: Color,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct LayoutBox {
    /// Lowercase element name; `None` for anonymous boxes.
    pub tag: Option<String>,
    pub block_marker: bool,
    pub display: DisplayMode,
    pub position: PositionMode,
    pub rect: BoxRect,
    pub background: Option<Color>,
    pub border: EdgeSizes,
    pub border_color: Color,
    pub image: Option<String>,
    pub text: Vec<TextFragment>,
    pub children: Vec<LayoutBox>,
}

impl LayoutBox {
    fn for_element(info: &ElementInfo, style: &ComputedStyle, rect: BoxRect) -> Self {
        Self {
            tag: Some(info.tag.clone()),
            block_marker: info.has_attr(BLOCK_MARKER_ATTR) || info.has_class(BLOCK_MARKER_CLASS),
            display: style.display,
            position: style.position,
            rect,
            background: style.background,
            border: style.used_border(),
            border_color: style.border_color,
            image: None,
            text: Vec::new(),
            children: Vec::new(),
        }
    }

    /// Lowest painted edge of this subtree. Fixed boxes are anchored to the
    /// viewport and never extend the scroll height.
    pub fn max_bottom(&self) -> f32 {
        self.children
            .iter()
            .filter(|child| child.position != PositionMode::Fixed)
            .map(LayoutBox::max_bottom)
            .chain(self.text.iter().map(|frag| frag.y + frag.height))
            .fold(self.rect.bottom(), f32::max)
    }

    pub fn walk<'a>(&'a self, visit: &mut impl FnMut(&'a LayoutBox)) {
        visit(self);
        for child in &self.children {
            child.walk(visit);
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct LayoutTree {
    pub root: LayoutBox,
    pub width: u32,
    /// `ceil` of the root's scroll height.
    pub height: u32,
}

pub(crate) struct LayoutEngine<'a> {
    resolver: &'a StyleResolver,
    fonts: &'a FontRegistry,
    images: &'a ImageStore,
}

impl<'a> LayoutEngine<'a> {
    pub fn new(resolver: &'a StyleResolver, fonts: &'a FontRegistry, images: &'a ImageStore) -> Self {
        Self {
            resolver,
            fonts,
            images,
        }
    }

    /// Lays out the document containing `body`, starting from its root element.
    pub fn layout(&self, body: &NodeRef, width: u32) -> LayoutTree {
        let root_node = body
            .ancestors()
            .filter(|node| node.as_element().is_some())
            .last()
            .unwrap_or_else(|| body.clone());
        let mut path = Vec::new();
        let root_style = ComputedStyle::root();
        let width_px = width as f32;
        let root = match self.styled(&root_node, &mut path, &root_style) {
            Some((info, style)) if style.display != DisplayMode::None => {
                path.push(info.clone());
                let laid = self.layout_box(&root_node, &info, &style, &mut path, 0.0, 0.0, width_px, width_px);
                path.pop();
                laid
            }
            _ => LayoutBox::for_element(
                &ElementInfo::default(),
                &root_style,
                BoxRect::new(0.0, 0.0, width_px, 0.0),
            ),
        };
        let height = root.max_bottom().max(0.0).ceil() as u32;
        LayoutTree {
            root,
            width,
            height,
        }
    }

    fn styled(
        &self,
        node: &NodeRef,
        path: &mut Vec<ElementInfo>,
        parent: &ComputedStyle,
    ) -> Option<(ElementInfo, ComputedStyle)> {
        let info = element_info(node)?;
        path.push(info.clone());
        let inline = attribute(node, "style");
        let mut style = self.resolver.compute(path, inline.as_deref(), parent);
        path.pop();
        apply_presentational_hints(node, &mut style);
        Some((info, style))
    }

    #[allow(clippy::too_many_arguments)]
    fn layout_box(
        &self,
        node: &NodeRef,
        info: &ElementInfo,
        style: &ComputedStyle,
        path: &mut Vec<ElementInfo>,
        x: f32,
        y: f32,
        border_width: f32,
        container_width: f32,
    ) -> LayoutBox {
        if info.tag == "img" {
            let (w, h) = self.image_size(node, style, container_width);
            let mut out = LayoutBox::for_element(info, style, BoxRect::new(x, y, w, h));
            out.image = attribute(node, "src").map(|src| src.trim().to_string());
            return out;
        }
        let pad = style.padding.resolve(container_width, style.font_size);
        let border = style.used_border();
        let content_x = x + border.left + pad.left;
        let content_y = y + border.top + pad.top;
        let content_w = (border_width - border.horizontal() - pad.horizontal()).max(0.0);

        let mut out = LayoutBox::for_element(info, style, BoxRect::new(x, y, border_width, 0.0));
        let content_h = match style.display {
            DisplayMode::Table => {
                self.layout_table(node, style, path, content_x, content_y, content_w, &mut out)
            }
            DisplayMode::Flex if style.flex_row => {
                self.layout_flex(node, style, path, content_x, content_y, content_w, &mut out)
            }
            _ => self.layout_flow(node, style, path, content_x, content_y, content_w, &mut out),
        };

        let extra_v = border.vertical() + pad.vertical();
        let inner = |len: Length| {
            fixed_height(len, style).map(|h| {
                if style.border_box {
                    (h - extra_v).max(0.0)
                } else {
                    h
                }
            })
        };
        let mut used = inner(style.height).unwrap_or(content_h);
        if let Some(min) = inner(style.min_height) {
            used = used.max(min);
        }
        out.rect.height = used + extra_v;
        out
    }

    /// Normal flow: block children stack, runs of inline content form line boxes.
    #[allow(clippy::too_many_arguments)]
    fn layout_flow(
        &self,
        node: &NodeRef,
        style: &ComputedStyle,
        path: &mut Vec<ElementInfo>,
        content_x: f32,
        content_y: f32,
        content_w: f32,
        out: &mut LayoutBox,
    ) -> f32 {
        let mut cursor = content_y;
        let mut pending_margin = 0.0f32;
        let mut run: Vec<InlineSource> = Vec::new();

        for child in node.children() {
            let (info, child_style) = match child.data() {
                NodeData::Text(_) => {
                    run.push(InlineSource::Text(child.clone()));
                    continue;
                }
                NodeData::Element(_) => match self.styled(&child, path, style) {
                    Some(styled) => styled,
                    None => continue,
                },
                _ => continue,
            };
            if child_style.display == DisplayMode::None {
                continue;
            }
            if child_style.position.is_out_of_flow() {
                let margin = child_style.margin.resolve(content_w, child_style.font_size);
                let (dx, width) = block_placement(&child_style, &margin, content_w);
                path.push(info.clone());
                let placed = self.layout_box(
                    &child, &info, &child_style, path, content_x + dx, cursor + margin.top,
                    width, content_w,
                );
                path.pop();
                out.children.push(placed);
                continue;
            }
            if is_inline_level(&info, &child_style) {
                run.push(InlineSource::Element(child.clone(), info, child_style));
                continue;
            }

            let flushed =
                self.flush_inline_run(&mut run, style, path, content_x, cursor + pending_margin, content_w, out);
            if flushed > 0.0 {
                cursor += pending_margin + flushed;
                pending_margin = 0.0;
            }

            let margin = child_style.margin.resolve(content_w, child_style.font_size);
            let top = cursor + collapse_margins(pending_margin, margin.top);
            let (dx, width) = block_placement(&child_style, &margin, content_w);
            path.push(info.clone());
            let placed =
                self.layout_box(&child, &info, &child_style, path, content_x + dx, top, width, content_w);
            path.pop();
            cursor = placed.rect.bottom();
            pending_margin = margin.bottom;
            out.children.push(placed);
        }

        let flushed =
            self.flush_inline_run(&mut run, style, path, content_x, cursor + pending_margin, content_w, out);
        if flushed > 0.0 {
            cursor += pending_margin + flushed;
            pending_margin = 0.0;
        }
        (cursor + pending_margin - content_y).max(0.0)
    }

    #[allow(clippy::too_many_arguments)]
    fn flush_inline_run(
        &self,
        run: &mut Vec<InlineSource>,
        style: &ComputedStyle,
        path: &mut Vec<ElementInfo>,
        x: f32,
        y: f32,
        width: f32,
        out: &mut LayoutBox,
    ) -> f32 {
        if run.is_empty() {
            return 0.0;
        }
        let mut collector = InlineCollector::default();
        for source in run.drain(..) {
            match source {
                InlineSource::Text(node) => {
                    if let Some(text) = node.as_text() {
                        collector.push_text(&text.borrow(), style);
                    }
                }
                InlineSource::Element(node, info, child_style) => {
                    self.collect_inline_element(&node, info, &child_style, path, width, &mut collector);
                }
            }
        }
        self.place_lines(collector, style, x, y, width, out)
    }

    fn collect_inline_element(
        &self,
        node: &NodeRef,
        info: ElementInfo,
        style: &ComputedStyle,
        path: &mut Vec<ElementInfo>,
        container_width: f32,
        collector: &mut InlineCollector,
    ) {
        if info.tag == "br" {
            collector.push_break();
            return;
        }
        if info.tag == "img" {
            let (width, height) = self.image_size(node, style, container_width);
            let src = attribute(node, "src").map(|src| src.trim().to_string());
            let block_marker =
                info.has_attr(BLOCK_MARKER_ATTR) || info.has_class(BLOCK_MARKER_CLASS);
            collector.push_image(src, width, height, block_marker);
            return;
        }
        collector.open_span(&info, style);
        path.push(info);
        for child in node.children() {
            match child.data() {
                NodeData::Text(text) => collector.push_text(&text.borrow(), style),
                NodeData::Element(_) => {
                    let Some((child_info, child_style)) = self.styled(&child, path, style) else {
                        continue;
                    };
                    if child_style.display == DisplayMode::None {
                        continue;
                    }
                    self.collect_inline_element(
                        &child,
                        child_info,
                        &child_style,
                        path,
                        container_width,
                        collector,
                    );
                }
                _ => {}
            }
        }
        path.pop();
        collector.close_span();
    }

    fn place_lines(
        &self,
        collector: InlineCollector,
        style: &ComputedStyle,
        x: f32,
        y: f32,
        width: f32,
        out: &mut LayoutBox,
    ) -> f32 {
        let InlineCollector { atoms, spans, .. } = collector;
        if atoms.is_empty() {
            return 0.0;
        }
        let strut = style.line_height_px();
        let mut lines: Vec<Line> = Vec::new();
        let mut line = Line::default();
        let mut last_was_break = false;

        for (idx, atom) in atoms.iter().enumerate() {
            let (atom_w, atom_h, space_w) = match &atom.kind {
                AtomKind::Break => {
                    lines.push(std::mem::take(&mut line));
                    last_was_break = true;
                    continue;
                }
                AtomKind::Word(word) => (
                    self.fonts.measure_text_width(word.bold, word.font_size, &word.text),
                    word.line_height,
                    self.fonts.measure_text_width(word.bold, word.font_size, " "),
                ),
                AtomKind::Image { width, height, .. } => (
                    *width,
                    *height,
                    self.fonts.measure_text_width(false, style.font_size, " "),
                ),
            };
            last_was_break = false;
            let mut gap = if atom.space_before && !line.items.is_empty() {
                space_w
            } else {
                0.0
            };
            if !line.items.is_empty() && line.width + gap + atom_w > width + 0.01 {
                lines.push(std::mem::take(&mut line));
                gap = 0.0;
            }
            line.items.push(LineItem {
                atom: idx,
                x: line.width + gap,
                width: atom_w,
                height: atom_h,
            });
            line.width += gap + atom_w;
            line.height = line.height.max(atom_h);
        }
        if !line.items.is_empty() || !last_was_break && lines.is_empty() {
            lines.push(line);
        }

        let mut span_rects: Vec<Option<BoxRect>> = vec![None; spans.len()];
        let mut image_boxes = Vec::new();
        let mut cursor = y;
        for line in &lines {
            let line_h = line.height.max(strut);
            let offset = match style.text_align {
                TextAlignMode::Left => 0.0,
                TextAlignMode::Center => ((width - line.width) / 2.0).max(0.0),
                TextAlignMode::Right => (width - line.width).max(0.0),
            };
            for item in &line.items {
                let atom = &atoms[item.atom];
                let rect = BoxRect::new(
                    x + offset + item.x,
                    cursor + (line_h - item.height),
                    item.width,
                    item.height,
                );
                for &span in &atom.spans {
                    span_rects[span] = Some(match span_rects[span] {
                        Some(prev) => union_rect(prev, rect),
                        None => rect,
                    });
                }
                match &atom.kind {
                    AtomKind::Word(word) => out.text.push(TextFragment {
                        x: rect.x,
                        y: rect.y,
                        width: rect.width,
                        height: rect.height,
                        text: word.text.clone(),
                        font_size: word.font_size,
                        bold: word.bold,
                        color: word.color,
                    }),
                    AtomKind::Image {
                        src, block_marker, ..
                    } => image_boxes.push(LayoutBox {
                        tag: Some("img".to_string()),
                        block_marker: *block_marker,
                        display: DisplayMode::InlineBlock,
                        position: PositionMode::Static,
                        rect,
                        background: None,
                        border: EdgeSizes::zero(),
                        border_color: Color::BLACK,
                        image: src.clone(),
                        text: Vec::new(),
                        children: Vec::new(),
                    }),
                    AtomKind::Break => {}
                }
            }
            cursor += line_h;
        }

        for (span, rect) in spans.into_iter().zip(span_rects) {
            if let Some(rect) = rect {
                out.children.push(LayoutBox {
                    tag: Some(span.tag),
                    block_marker: span.block_marker,
                    display: span.display,
                    position: span.position,
                    rect,
                    background: span.background,
                    border: span.border,
                    border_color: span.border_color,
                    image: None,
                    text: Vec::new(),
                    children: Vec::new(),
                });
            }
        }
        out.children.extend(image_boxes);
        cursor - y
    }

    #[allow(clippy::too_many_arguments)]
    fn layout_table(
        &self,
        node: &NodeRef,
        style: &ComputedStyle,
        path: &mut Vec<ElementInfo>,
        content_x: f32,
        content_y: f32,
        content_w: f32,
        out: &mut LayoutBox,
    ) -> f32 {
        let groups = self.collect_table_groups(node, style, path);
        let columns = groups
            .iter()
            .flat_map(|group| group.rows.iter())
            .map(|row| row.cells.iter().map(|cell| cell.colspan).sum::<usize>())
            .max()
            .unwrap_or(0);
        if columns == 0 {
            return 0.0;
        }

        let widths = column_widths(&groups, columns, content_w);
        let mut offsets = Vec::with_capacity(columns + 1);
        let mut acc = content_x;
        offsets.push(acc);
        for w in &widths {
            acc += w;
            offsets.push(acc);
        }

        let mut cursor = content_y;
        for group in &groups {
            let group_top = cursor;
            if let Some(info) = &group.info {
                path.push(info.clone());
            }
            let mut row_boxes = Vec::new();
            for row in &group.rows {
                path.push(row.info.clone());
                let mut cells = Vec::new();
                let mut col = 0usize;
                let mut row_h = fixed_height(row.style.height, &row.style).unwrap_or(0.0);
                for cell in &row.cells {
                    let start = col.min(columns);
                    let end = (col + cell.colspan).min(columns);
                    col += cell.colspan;
                    let cell_w = offsets[end] - offsets[start];
                    path.push(cell.info.clone());
                    let laid = self.layout_box(
                        &cell.node,
                        &cell.info,
                        &cell.style,
                        path,
                        offsets[start],
                        cursor,
                        cell_w,
                        content_w,
                    );
                    path.pop();
                    row_h = row_h.max(laid.rect.height);
                    cells.push(laid);
                }
                path.pop();
                for cell in &mut cells {
                    cell.rect.height = row_h;
                }
                let mut row_box = LayoutBox::for_element(
                    &row.info,
                    &row.style,
                    BoxRect::new(content_x, cursor, content_w, row_h),
                );
                row_box.children = cells;
                row_boxes.push(row_box);
                cursor += row_h;
            }
            if let Some(info) = &group.info {
                path.pop();
                let mut group_box = LayoutBox::for_element(
                    info,
                    &group.style,
                    BoxRect::new(content_x, group_top, content_w, cursor - group_top),
                );
                group_box.children = row_boxes;
                out.children.push(group_box);
            } else {
                out.children.extend(row_boxes);
            }
        }
        cursor - content_y
    }

    fn collect_table_groups(
        &self,
        table: &NodeRef,
        style: &ComputedStyle,
        path: &mut Vec<ElementInfo>,
    ) -> Vec<TableGroup> {
        let mut groups: Vec<TableGroup> = Vec::new();
        for child in table.children() {
            let Some((info, child_style)) = self.styled(&child, path, style) else {
                continue;
            };
            match child_style.display {
                DisplayMode::TableRowGroup => {
                    path.push(info.clone());
                    let rows = table_rows(self, &child, &child_style, path);
                    path.pop();
                    groups.push(TableGroup {
                        info: Some(info),
                        style: child_style,
                        rows,
                    });
                }
                DisplayMode::TableRow => {
                    path.push(info.clone());
                    let cells = table_cells(self, &child, &child_style, path);
                    path.pop();
                    let row = TableRow {
                        info,
                        style: child_style,
                        cells,
                    };
                    match groups.last_mut() {
                        Some(group) if group.info.is_none() => group.rows.push(row),
                        _ => groups.push(TableGroup {
                            info: None,
                            style: style.clone(),
                            rows: vec![row],
                        }),
                    }
                }
                _ => {}
            }
        }
        groups
    }

    /// Flex row: items side by side, explicit widths honoured, the rest share what remains.
    #[allow(clippy::too_many_arguments)]
    fn layout_flex(
        &self,
        node: &NodeRef,
        style: &ComputedStyle,
        path: &mut Vec<ElementInfo>,
        content_x: f32,
        content_y: f32,
        content_w: f32,
        out: &mut LayoutBox,
    ) -> f32 {
        let mut items = Vec::new();
        for child in node.children() {
            let Some((info, child_style)) = self.styled(&child, path, style) else {
                continue;
            };
            if child_style.display == DisplayMode::None {
                continue;
            }
            if child_style.position.is_out_of_flow() {
                let margin = child_style.margin.resolve(content_w, child_style.font_size);
                let (dx, width) = block_placement(&child_style, &margin, content_w);
                path.push(info.clone());
                let placed = self.layout_box(
                    &child, &info, &child_style, path, content_x + dx, content_y + margin.top,
                    width, content_w,
                );
                path.pop();
                out.children.push(placed);
                continue;
            }
            items.push((child, info, child_style));
        }
        if items.is_empty() {
            return 0.0;
        }

        let mut fixed_total = 0.0f32;
        let mut auto_count = 0usize;
        let mut plans = Vec::with_capacity(items.len());
        for (_, _, item_style) in &items {
            let margin = item_style.margin.resolve(content_w, item_style.font_size);
            let width = explicit_border_width(item_style, content_w);
            match width {
                Some(w) => fixed_total += w + margin.horizontal(),
                None => {
                    auto_count += 1;
                    fixed_total += margin.horizontal();
                }
            }
            plans.push((margin, width));
        }
        let share = if auto_count > 0 {
            ((content_w - fixed_total) / auto_count as f32).max(0.0)
        } else {
            0.0
        };

        let mut cursor_x = content_x;
        let mut line_h = 0.0f32;
        let mut placed = Vec::with_capacity(items.len());
        for ((child, info, item_style), (margin, width)) in items.iter().zip(&plans) {
            let width = width.unwrap_or(share);
            path.push(info.clone());
            let laid = self.layout_box(
                child,
                info,
                item_style,
                path,
                cursor_x + margin.left,
                content_y + margin.top,
                width,
                content_w,
            );
            path.pop();
            cursor_x += margin.horizontal() + width;
            line_h = line_h.max(laid.rect.height + margin.vertical());
            let stretch = fixed_height(item_style.height, item_style).is_none();
            placed.push((laid, margin.vertical(), stretch));
        }
        for (mut laid, margin_v, stretch) in placed {
            if stretch {
                laid.rect.height = laid.rect.height.max(line_h - margin_v);
            }
            out.children.push(laid);
        }
        line_h
    }

    fn image_size(&self, node: &NodeRef, style: &ComputedStyle, container_width: f32) -> (f32, f32) {
        let natural = attribute(node, "src")
            .and_then(|src| self.images.get(src.trim()))
            .map(|pixmap| (pixmap.width() as f32, pixmap.height() as f32));
        let width = style.width.resolve(container_width, style.font_size);
        let height = fixed_height(style.height, style);
        match (width, height, natural) {
            (Some(w), Some(h), _) => (w, h),
            (Some(w), None, Some((nw, nh))) if nw > 0.0 => (w, w * nh / nw),
            (None, Some(h), Some((nw, nh))) if nh > 0.0 => (h * nw / nh, h),
            (None, None, Some(size)) => size,
            (w, h, _) => (w.unwrap_or(0.0), h.unwrap_or(0.0)),
        }
    }
}

enum InlineSource {
    Text(NodeRef),
    Element(NodeRef, ElementInfo, ComputedStyle),
}

struct WordAtom {
    text: String,
    font_size: f32,
    bold: bool,
    color: Color,
    line_height: f32,
}

enum AtomKind {
    Word(WordAtom),
    Image {
        src: Option<String>,
        width: f32,
        height: f32,
        block_marker: bool,
    },
    Break,
}

struct InlineAtom {
    kind: AtomKind,
    space_before: bool,
    spans: Vec<usize>,
}

struct InlineSpan {
    tag: String,
    block_marker: bool,
    display: DisplayMode,
    position: PositionMode,
    background: Option<Color>,
    border: EdgeSizes,
    border_color: Color,
}

#[derive(Default)]
struct InlineCollector {
    atoms: Vec<InlineAtom>,
    spans: Vec<InlineSpan>,
    stack: Vec<usize>,
    pending_space: bool,
}

impl InlineCollector {
    fn push_text(&mut self, text: &str, style: &ComputedStyle) {
        let mut word = String::new();
        for ch in text.chars() {
            if is_collapsible_space(ch) {
                if !word.is_empty() {
                    self.push_word(std::mem::take(&mut word), style);
                }
                self.pending_space = true;
            } else {
                word.push(ch);
            }
        }
        if !word.is_empty() {
            self.push_word(word, style);
        }
    }

    fn push_word(&mut self, text: String, style: &ComputedStyle) {
        self.push_atom(AtomKind::Word(WordAtom {
            text,
            font_size: style.font_size,
            bold: style.bold,
            color: style.color,
            line_height: style.line_height_px(),
        }));
    }

    fn push_image(
        &mut self,
        src: Option<String>,
        width: f32,
        height: f32,
        block_marker: bool,
    ) {
        self.push_atom(AtomKind::Image {
            src,
            width,
            height,
            block_marker,
        });
    }

    fn push_break(&mut self) {
        self.atoms.push(InlineAtom {
            kind: AtomKind::Break,
            space_before: false,
            spans: self.stack.clone(),
        });
        self.pending_space = false;
    }

    fn push_atom(&mut self, kind: AtomKind) {
        self.atoms.push(InlineAtom {
            kind,
            space_before: self.pending_space,
            spans: self.stack.clone(),
        });
        self.pending_space = false;
    }

    fn open_span(&mut self, info: &ElementInfo, style: &ComputedStyle) {
        self.spans.push(InlineSpan {
            tag: info.tag.clone(),
            block_marker: info.has_attr(BLOCK_MARKER_ATTR) || info.has_class(BLOCK_MARKER_CLASS),
            display: DisplayMode::Inline,
            position: style.position,
            background: style.background,
            border: style.used_border(),
            border_color: style.border_color,
        });
        self.stack.push(self.spans.len() - 1);
    }

    fn close_span(&mut self) {
        self.stack.pop();
    }
}

#[derive(Default)]
struct Line {
    items: Vec<LineItem>,
    width: f32,
    height: f32,
}

struct LineItem {
    atom: usize,
    x: f32,
    width: f32,
    height: f32,
}

struct TableCell {
    node: NodeRef,
    info: ElementInfo,
    style: ComputedStyle,
    colspan: usize,
    width: Option<Length>,
}

struct TableRow {
    info: ElementInfo,
    style: ComputedStyle,
    cells: Vec<TableCell>,
}

struct TableGroup {
    info: Option<ElementInfo>,
    style: ComputedStyle,
    rows: Vec<TableRow>,
}

fn table_rows(
    engine: &LayoutEngine<'_>,
    group: &NodeRef,
    style: &ComputedStyle,
    path: &mut Vec<ElementInfo>,
) -> Vec<TableRow> {
    let mut rows = Vec::new();
    for child in group.children() {
        let Some((info, row_style)) = engine.styled(&child, path, style) else {
            continue;
        };
        if row_style.display != DisplayMode::TableRow {
            continue;
        }
        path.push(info.clone());
        let cells = table_cells(engine, &child, &row_style, path);
        path.pop();
        rows.push(TableRow {
            info,
            style: row_style,
            cells,
        });
    }
    rows
}

fn table_cells(
    engine: &LayoutEngine<'_>,
    row: &NodeRef,
    style: &ComputedStyle,
    path: &mut Vec<ElementInfo>,
) -> Vec<TableCell> {
    let mut cells = Vec::new();
    for child in row.children() {
        let Some((info, cell_style)) = engine.styled(&child, path, style) else {
            continue;
        };
        if cell_style.display != DisplayMode::TableCell {
            continue;
        }
        let colspan = attribute(&child, "colspan")
            .and_then(|raw| raw.trim().parse::<usize>().ok())
            .unwrap_or(1)
            .clamp(1, 1000);
        let width = match cell_style.width {
            Length::Auto => None,
            other => Some(other),
        };
        cells.push(TableCell {
            node: child,
            info,
            style: cell_style,
            colspan,
            width,
        });
    }
    cells
}

/// Column widths: the first explicit width seen per column wins, the rest split equally.
fn column_widths(groups: &[TableGroup], columns: usize, content_w: f32) -> Vec<f32> {
    let mut fixed: Vec<Option<f32>> = vec![None; columns];
    for row in groups.iter().flat_map(|group| group.rows.iter()) {
        let mut col = 0usize;
        for cell in &row.cells {
            if cell.colspan == 1 && col < columns && fixed[col].is_none() {
                if let Some(width) = cell
                    .width
                    .and_then(|w| w.resolve(content_w, cell.style.font_size))
                {
                    fixed[col] = Some(width.max(0.0));
                }
            }
            col += cell.colspan;
        }
    }
    let fixed_sum: f32 = fixed.iter().flatten().sum();
    let auto_count = fixed.iter().filter(|w| w.is_none()).count();
    if auto_count == 0 || fixed_sum > content_w {
        let scale = if fixed_sum > 0.0 { content_w / fixed_sum } else { 0.0 };
        return fixed
            .into_iter()
            .map(|w| w.unwrap_or(0.0) * scale)
            .collect();
    }
    let share = (content_w - fixed_sum) / auto_count as f32;
    fixed.into_iter().map(|w| w.unwrap_or(share)).collect()
}

fn is_inline_level(info: &ElementInfo, style: &ComputedStyle) -> bool {
    match style.display {
        DisplayMode::Inline => true,
        DisplayMode::InlineBlock => info.tag == "img",
        _ => false,
    }
}

fn is_collapsible_space(ch: char) -> bool {
    ch.is_whitespace() && ch != '\u{a0}'
}

fn collapse_margins(a: f32, b: f32) -> f32 {
    if a >= 0.0 && b >= 0.0 {
        a.max(b)
    } else if a < 0.0 && b < 0.0 {
        a.min(b)
    } else {
        a + b
    }
}

fn union_rect(a: BoxRect, b: BoxRect) -> BoxRect {
    let x = a.x.min(b.x);
    let y = a.y.min(b.y);
    BoxRect::new(x, y, a.right().max(b.right()) - x, a.bottom().max(b.bottom()) - y)
}

/// Heights resolve only from absolute or font-relative lengths; percentages act as `auto`.
fn fixed_height(len: Length, style: &ComputedStyle) -> Option<f32> {
    match len {
        Length::Percent(_) | Length::Auto => None,
        other => other.resolve(0.0, style.font_size).map(|h| h.max(0.0)),
    }
}

fn explicit_border_width(style: &ComputedStyle, container_w: f32) -> Option<f32> {
    let width = style.width.resolve(container_w, style.font_size)?;
    if style.border_box {
        return Some(width.max(0.0));
    }
    let pad = style.padding.resolve(container_w, style.font_size);
    Some(width.max(0.0) + pad.horizontal() + style.used_border().horizontal())
}

/// Horizontal offset and border-box width of an in-flow block.
fn block_placement(style: &ComputedStyle, margin: &EdgeSizes, container_w: f32) -> (f32, f32) {
    match explicit_border_width(style, container_w) {
        Some(width) => {
            let left_auto = style.margin.left == Length::Auto;
            let right_auto = style.margin.right == Length::Auto;
            let dx = match (left_auto, right_auto) {
                (true, true) => ((container_w - width) / 2.0).max(0.0),
                (true, false) => (container_w - width - margin.right).max(0.0),
                _ => margin.left,
            };
            (dx, width)
        }
        None => (
            margin.left,
            (container_w - margin.horizontal()).max(0.0),
        ),
    }
}

fn apply_presentational_hints(node: &NodeRef, style: &mut ComputedStyle) {
    if style.width == Length::Auto {
        if let Some(width) = attribute(node, "width").and_then(|raw| parse_dimension_attr(&raw)) {
            style.width = width;
        }
    }
    if style.height == Length::Auto {
        if let Some(height) = attribute(node, "height").and_then(|raw| parse_dimension_attr(&raw)) {
            style.height = height;
        }
    }
    if style.background.is_none() {
        if let Some(color) = attribute(node, "bgcolor").and_then(|raw| parse_color_attr(&raw)) {
            style.background = Some(color);
        }
    }
}
