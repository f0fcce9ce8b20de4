use crate::debug::DebugLogger;
use crate::types::{Color, EdgeSizes};
use lightningcss::declaration::DeclarationBlock;
use lightningcss::properties::Property;
use lightningcss::properties::border::{BorderSideWidth, LineStyle};
use lightningcss::properties::display::{Display, DisplayInside, DisplayKeyword, DisplayOutside};
use lightningcss::properties::flex as css_flex;
use lightningcss::properties::font::{AbsoluteFontSize, FontSize, LineHeight, RelativeFontSize};
use lightningcss::properties::position::Position as CssPosition;
use lightningcss::properties::size::{BoxSizing, Size};
use lightningcss::properties::text::TextAlign;
use lightningcss::rules::CssRule;
use lightningcss::stylesheet::{ParserOptions, PrinterOptions, StyleAttribute, StyleSheet};
use lightningcss::traits::ToCss;
use lightningcss::values::color::{CssColor, SRGB};
use lightningcss::values::length::{LengthPercentage, LengthPercentageOrAuto, LengthValue};
use serde_json::json;

const ROOT_FONT_SIZE_PX: f32 = 16.0;

fn default_ua_css() -> &'static str {
    r#"
html, body, div, section, article, header, footer, main, nav, aside, address,
blockquote, figure, figcaption, form, fieldset, hr, p, h1, h2, h3, h4, h5, h6,
ul, ol, dl, dt, dd, pre, center { display: block; }
li { display: list-item; }
table { display: table; }
thead, tbody, tfoot { display: table-row-group; }
tr { display: table-row; }
td, th { display: table-cell; padding: 1px; }
th { font-weight: bold; text-align: center; }
head, style, script, title, meta, link, template, noscript { display: none; }
img { display: inline-block; }
body { margin: 8px; }
p, blockquote, figure, ul, ol, dl, pre { margin-top: 1em; margin-bottom: 1em; }
h1 { font-size: 2em; margin-top: 0.67em; margin-bottom: 0.67em; font-weight: bold; }
h2 { font-size: 1.5em; margin-top: 0.83em; margin-bottom: 0.83em; font-weight: bold; }
h3 { font-size: 1.17em; margin-top: 1em; margin-bottom: 1em; font-weight: bold; }
h4 { margin-top: 1.33em; margin-bottom: 1.33em; font-weight: bold; }
h5 { font-size: 0.83em; margin-top: 1.67em; margin-bottom: 1.67em; font-weight: bold; }
h6 { font-size: 0.67em; margin-top: 2.33em; margin-bottom: 2.33em; font-weight: bold; }
ul, ol { padding-left: 40px; }
b, strong { font-weight: bold; }
center { text-align: center; }
hr { border-top: 1px solid #808080; margin-top: 0.5em; margin-bottom: 0.5em; }
"#
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum DisplayMode {
    Block,
    Inline,
    InlineBlock,
    Table,
    TableRowGroup,
    TableRow,
    TableCell,
    Flex,
    None,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum PositionMode {
    Static,
    Relative,
    Absolute,
    Fixed,
}

impl PositionMode {
    pub fn is_out_of_flow(self) -> bool {
        matches!(self, PositionMode::Absolute | PositionMode::Fixed)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TextAlignMode {
    Left,
    Center,
    Right,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) enum Length {
    Auto,
    Px(f32),
    /// Fraction of the containing block width (0.5 == 50%).
    Percent(f32),
    Em(f32),
    Rem(f32),
}

impl Length {
    pub fn resolve(self, basis: f32, font_size: f32) -> Option<f32> {
        match self {
            Length::Auto => None,
            Length::Px(px) => Some(px),
            Length::Percent(fraction) => Some(basis * fraction),
            Length::Em(value) => Some(value * font_size),
            Length::Rem(value) => Some(value * ROOT_FONT_SIZE_PX),
        }
    }

    pub fn resolve_or_zero(self, basis: f32, font_size: f32) -> f32 {
        self.resolve(basis, font_size).unwrap_or(0.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct EdgeLengths {
    pub top: Length,
    pub right: Length,
    pub bottom: Length,
    pub left: Length,
}

impl EdgeLengths {
    fn zero() -> Self {
        Self {
            top: Length::Px(0.0),
            right: Length::Px(0.0),
            bottom: Length::Px(0.0),
            left: Length::Px(0.0),
        }
    }

    pub fn resolve(&self, basis: f32, font_size: f32) -> EdgeSizes {
        EdgeSizes {
            top: self.top.resolve_or_zero(basis, font_size),
            right: self.right.resolve_or_zero(basis, font_size),
            bottom: self.bottom.resolve_or_zero(basis, font_size),
            left: self.left.resolve_or_zero(basis, font_size),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) enum LineHeightMode {
    Normal,
    Factor(f32),
    Px(f32),
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct ComputedStyle {
    pub display: DisplayMode,
    pub position: PositionMode,
    pub width: Length,
    pub height: Length,
    pub min_height: Length,
    pub margin: EdgeLengths,
    pub padding: EdgeLengths,
    pub border_width: EdgeSizes,
    pub border_visible: [bool; 4],
    pub border_color: Color,
    pub background: Option<Color>,
    pub color: Color,
    pub font_size: f32,
    pub bold: bool,
    pub line_height: LineHeightMode,
    pub text_align: TextAlignMode,
    pub flex_row: bool,
    pub border_box: bool,
}

impl ComputedStyle {
    pub fn root() -> Self {
        Self {
            display: DisplayMode::Block,
            position: PositionMode::Static,
            width: Length::Auto,
            height: Length::Auto,
            min_height: Length::Auto,
            margin: EdgeLengths::zero(),
            padding: EdgeLengths::zero(),
            border_width: EdgeSizes::zero(),
            border_visible: [false; 4],
            border_color: Color::BLACK,
            background: None,
            color: Color::BLACK,
            font_size: ROOT_FONT_SIZE_PX,
            bold: false,
            line_height: LineHeightMode::Normal,
            text_align: TextAlignMode::Left,
            flex_row: true,
            border_box: false,
        }
    }

    /// Inherited properties carry over; everything else starts at its initial value.
    fn inherit_from(parent: &ComputedStyle) -> Self {
        Self {
            display: DisplayMode::Inline,
            color: parent.color,
            font_size: parent.font_size,
            bold: parent.bold,
            line_height: parent.line_height,
            text_align: parent.text_align,
            ..ComputedStyle::root()
        }
    }

    pub fn line_height_px(&self) -> f32 {
        match self.line_height {
            LineHeightMode::Normal => self.font_size * 1.2,
            LineHeightMode::Factor(factor) => self.font_size * factor,
            LineHeightMode::Px(px) => px,
        }
    }

    /// Border widths with invisible (style `none`) sides zeroed.
    pub fn used_border(&self) -> EdgeSizes {
        let pick = |visible: bool, width: f32| if visible { width.max(0.0) } else { 0.0 };
        EdgeSizes {
            top: pick(self.border_visible[0], self.border_width.top),
            right: pick(self.border_visible[1], self.border_width.right),
            bottom: pick(self.border_visible[2], self.border_width.bottom),
            left: pick(self.border_visible[3], self.border_width.left),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum FontSizeSpec {
    Px(f32),
    Scale(f32),
}

#[derive(Debug, Clone, Default)]
struct StyleDelta {
    display: Option<DisplayMode>,
    position: Option<PositionMode>,
    width: Option<Length>,
    height: Option<Length>,
    min_height: Option<Length>,
    margin: [Option<Length>; 4],
    padding: [Option<Length>; 4],
    border_width: [Option<f32>; 4],
    border_visible: [Option<bool>; 4],
    border_color: Option<Color>,
    background: Option<Option<Color>>,
    color: Option<Color>,
    font_size: Option<FontSizeSpec>,
    bold: Option<bool>,
    line_height: Option<LineHeightMode>,
    text_align: Option<TextAlignMode>,
    flex_row: Option<bool>,
    border_box: Option<bool>,
}

impl StyleDelta {
    fn is_empty(&self) -> bool {
        self.display.is_none()
            && self.position.is_none()
            && self.width.is_none()
            && self.height.is_none()
            && self.min_height.is_none()
            && self.margin.iter().all(Option::is_none)
            && self.padding.iter().all(Option::is_none)
            && self.border_width.iter().all(Option::is_none)
            && self.border_visible.iter().all(Option::is_none)
            && self.border_color.is_none()
            && self.background.is_none()
            && self.color.is_none()
            && self.font_size.is_none()
            && self.bold.is_none()
            && self.line_height.is_none()
            && self.text_align.is_none()
            && self.flex_row.is_none()
            && self.border_box.is_none()
    }

    fn apply_to(&self, style: &mut ComputedStyle, parent_font_size: f32) {
        if let Some(value) = self.display {
            style.display = value;
        }
        if let Some(value) = self.position {
            style.position = value;
        }
        if let Some(value) = self.width {
            style.width = value;
        }
        if let Some(value) = self.height {
            style.height = value;
        }
        if let Some(value) = self.min_height {
            style.min_height = value;
        }
        let margin = [
            &mut style.margin.top,
            &mut style.margin.right,
            &mut style.margin.bottom,
            &mut style.margin.left,
        ];
        for (slot, value) in margin.into_iter().zip(self.margin) {
            if let Some(value) = value {
                *slot = value;
            }
        }
        let padding = [
            &mut style.padding.top,
            &mut style.padding.right,
            &mut style.padding.bottom,
            &mut style.padding.left,
        ];
        for (slot, value) in padding.into_iter().zip(self.padding) {
            if let Some(value) = value {
                *slot = value;
            }
        }
        let widths = [
            &mut style.border_width.top,
            &mut style.border_width.right,
            &mut style.border_width.bottom,
            &mut style.border_width.left,
        ];
        for (slot, value) in widths.into_iter().zip(self.border_width) {
            if let Some(value) = value {
                *slot = value;
            }
        }
        for (slot, value) in style.border_visible.iter_mut().zip(self.border_visible) {
            if let Some(value) = value {
                *slot = value;
            }
        }
        if let Some(value) = self.border_color {
            style.border_color = value;
        }
        if let Some(value) = self.background {
            style.background = value;
        }
        if let Some(value) = self.color {
            style.color = value;
        }
        if let Some(spec) = self.font_size {
            style.font_size = match spec {
                FontSizeSpec::Px(px) => px,
                FontSizeSpec::Scale(scale) => parent_font_size * scale,
            };
        }
        if let Some(value) = self.bold {
            style.bold = value;
        }
        if let Some(value) = self.line_height {
            style.line_height = value;
        }
        if let Some(value) = self.text_align {
            style.text_align = value;
        }
        if let Some(value) = self.flex_row {
            style.flex_row = value;
        }
        if let Some(value) = self.border_box {
            style.border_box = value;
        }
    }
}

/// Selector-matching view of one element.
#[derive(Debug, Clone, Default)]
pub(crate) struct ElementInfo {
    pub tag: String,
    pub id: Option<String>,
    pub classes: Vec<String>,
    pub attrs: Vec<String>,
}

impl ElementInfo {
    pub fn has_class(&self, class: &str) -> bool {
        self.classes.iter().any(|c| c == class)
    }

    pub fn has_attr(&self, name: &str) -> bool {
        self.attrs.iter().any(|a| a == name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
struct Specificity(u16, u16, u16);

#[derive(Debug, Clone, Default)]
struct SimpleSelector {
    tag: Option<String>,
    id: Option<String>,
    classes: Vec<String>,
    attrs: Vec<String>,
}

impl SimpleSelector {
    fn matches(&self, element: &ElementInfo) -> bool {
        if let Some(tag) = &self.tag {
            if tag != "*" && tag != &element.tag {
                return false;
            }
        }
        if let Some(id) = &self.id {
            if element.id.as_deref() != Some(id.as_str()) {
                return false;
            }
        }
        self.classes.iter().all(|class| element.has_class(class))
            && self.attrs.iter().all(|attr| element.has_attr(attr))
    }

    fn specificity(&self) -> Specificity {
        let ids = u16::from(self.id.is_some());
        let classes = (self.classes.len() + self.attrs.len()) as u16;
        let tags = u16::from(self.tag.as_deref().is_some_and(|tag| tag != "*"));
        Specificity(ids, classes, tags)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Combinator {
    Descendant,
    Child,
}

#[derive(Debug, Clone)]
struct SelectorPattern {
    parts: Vec<SimpleSelector>,
    combinators: Vec<Combinator>,
}

impl SelectorPattern {
    fn specificity(&self) -> Specificity {
        self.parts.iter().fold(Specificity(0, 0, 0), |acc, part| {
            let spec = part.specificity();
            Specificity(acc.0 + spec.0, acc.1 + spec.1, acc.2 + spec.2)
        })
    }

    /// `path` runs from the document root down to the element being styled.
    fn matches(&self, path: &[ElementInfo]) -> bool {
        let Some((element, ancestors)) = path.split_last() else {
            return false;
        };
        let Some((last, rest)) = self.parts.split_last() else {
            return false;
        };
        if !last.matches(element) {
            return false;
        }
        match_ancestors(rest, &self.combinators, ancestors)
    }
}

fn match_ancestors(
    parts: &[SimpleSelector],
    combinators: &[Combinator],
    ancestors: &[ElementInfo],
) -> bool {
    let Some((part, rest_parts)) = parts.split_last() else {
        return true;
    };
    let Some((combinator, rest_combinators)) = combinators.split_last() else {
        return false;
    };
    match combinator {
        Combinator::Child => match ancestors.split_last() {
            Some((parent, above)) => {
                part.matches(parent) && match_ancestors(rest_parts, rest_combinators, above)
            }
            None => false,
        },
        Combinator::Descendant => {
            for idx in (0..ancestors.len()).rev() {
                if part.matches(&ancestors[idx])
                    && match_ancestors(rest_parts, rest_combinators, &ancestors[..idx])
                {
                    return true;
                }
            }
            false
        }
    }
}

fn parse_selector_pattern(selector: &str) -> Option<SelectorPattern> {
    let selector = selector.trim();
    if selector.is_empty() {
        return None;
    }
    let mut parts = Vec::new();
    let mut combinators = Vec::new();
    let mut pending: Option<Combinator> = None;
    let mut buf = String::new();

    let flush = |buf: &mut String,
                     parts: &mut Vec<SimpleSelector>,
                     combinators: &mut Vec<Combinator>,
                     pending: &mut Option<Combinator>|
     -> Option<()> {
        let trimmed = buf.trim();
        if trimmed.is_empty() {
            buf.clear();
            return Some(());
        }
        let simple = parse_simple_selector(trimmed)?;
        if !parts.is_empty() {
            combinators.push(pending.take().unwrap_or(Combinator::Descendant));
        }
        parts.push(simple);
        buf.clear();
        Some(())
    };

    for ch in selector.chars() {
        match ch {
            '>' => {
                flush(&mut buf, &mut parts, &mut combinators, &mut pending)?;
                pending = Some(Combinator::Child);
            }
            '+' | '~' => return None,
            c if c.is_whitespace() => {
                if !buf.trim().is_empty() {
                    flush(&mut buf, &mut parts, &mut combinators, &mut pending)?;
                    if pending.is_none() {
                        pending = Some(Combinator::Descendant);
                    }
                }
            }
            _ => buf.push(ch),
        }
    }
    flush(&mut buf, &mut parts, &mut combinators, &mut pending)?;
    if parts.is_empty() {
        return None;
    }
    Some(SelectorPattern { parts, combinators })
}

enum SelectorPart {
    Tag,
    Id,
    Class,
}

fn parse_simple_selector(selector: &str) -> Option<SimpleSelector> {
    if selector.contains(':') || selector.contains('(') {
        return None;
    }
    let mut out = SimpleSelector::default();
    let mut base = String::new();
    let mut rest = selector;
    while let Some(open) = rest.find('[') {
        base.push_str(&rest[..open]);
        let close = rest[open..].find(']')? + open;
        let inner = rest[open + 1..close].trim();
        if inner.is_empty() || inner.contains('=') {
            return None;
        }
        out.attrs.push(inner.to_ascii_lowercase());
        rest = &rest[close + 1..];
    }
    base.push_str(rest);

    let mut mode = SelectorPart::Tag;
    let mut buffer = String::new();
    let flush = |mode: &SelectorPart, buffer: &mut String, out: &mut SimpleSelector| {
        if buffer.is_empty() {
            return;
        }
        let value = std::mem::take(buffer);
        match mode {
            SelectorPart::Tag => out.tag = Some(value.to_ascii_lowercase()),
            SelectorPart::Id => out.id = Some(value),
            SelectorPart::Class => out.classes.push(value),
        }
    };
    for ch in base.chars() {
        match ch {
            '#' => {
                flush(&mode, &mut buffer, &mut out);
                mode = SelectorPart::Id;
            }
            '.' => {
                flush(&mode, &mut buffer, &mut out);
                mode = SelectorPart::Class;
            }
            _ => buffer.push(ch),
        }
    }
    flush(&mode, &mut buffer, &mut out);

    if out.tag.is_none() && out.id.is_none() && out.classes.is_empty() && out.attrs.is_empty() {
        return None;
    }
    Some(out)
}

struct RuleEntry {
    pattern: SelectorPattern,
    rank: (u8, Specificity, usize),
    normal: StyleDelta,
    important: StyleDelta,
}

/// Cascades the user-agent sheet, document `<style>` blocks and inline styles.
pub(crate) struct StyleResolver {
    rules: Vec<RuleEntry>,
}

impl StyleResolver {
    pub fn new(author_css: &str, debug: Option<&DebugLogger>) -> Self {
        let mut rules = Vec::new();
        let mut order = 0usize;
        append_sheet(default_ua_css(), 0, &mut rules, &mut order, None);
        if !author_css.trim().is_empty() {
            append_sheet(author_css, 1, &mut rules, &mut order, debug);
        }
        rules.sort_by(|a, b| a.rank.cmp(&b.rank));
        Self { rules }
    }

    pub fn compute(
        &self,
        path: &[ElementInfo],
        inline: Option<&str>,
        parent: &ComputedStyle,
    ) -> ComputedStyle {
        let mut style = ComputedStyle::inherit_from(parent);
        let matched: Vec<&RuleEntry> = self
            .rules
            .iter()
            .filter(|rule| rule.pattern.matches(path))
            .collect();
        for rule in &matched {
            rule.normal.apply_to(&mut style, parent.font_size);
        }
        let inline_deltas = inline.and_then(|raw| {
            StyleAttribute::parse(raw, ParserOptions::default())
                .ok()
                .map(|attr| style_from_declarations(&attr.declarations))
        });
        if let Some((normal, _)) = &inline_deltas {
            normal.apply_to(&mut style, parent.font_size);
        }
        for rule in &matched {
            rule.important.apply_to(&mut style, parent.font_size);
        }
        if let Some((_, important)) = &inline_deltas {
            important.apply_to(&mut style, parent.font_size);
        }
        style
    }
}

fn append_sheet(
    css: &str,
    origin: u8,
    rules: &mut Vec<RuleEntry>,
    order: &mut usize,
    debug: Option<&DebugLogger>,
) {
    let Ok(sheet) = StyleSheet::parse(css, ParserOptions::default()) else {
        log::warn!("stylesheet could not be parsed; ignoring {} bytes", css.len());
        return;
    };
    for rule in &sheet.rules.0 {
        let CssRule::Style(style) = rule else {
            if let Some(logger) = debug {
                logger.increment("css.rule_skipped", 1);
            }
            continue;
        };
        let (normal, important) = style_from_declarations(&style.declarations);
        if normal.is_empty() && important.is_empty() {
            continue;
        }
        let selectors = style
            .selectors
            .to_css_string(PrinterOptions::default())
            .unwrap_or_default();
        for selector in selectors.split(',') {
            let selector = selector.trim();
            let Some(pattern) = parse_selector_pattern(selector) else {
                if let Some(logger) = debug {
                    logger.log_json(&json!({"type": "css.selector_unparsed", "selector": selector}));
                    logger.increment("css.selector_unparsed", 1);
                }
                continue;
            };
            let rank = (origin, pattern.specificity(), *order);
            *order += 1;
            rules.push(RuleEntry {
                pattern,
                rank,
                normal: normal.clone(),
                important: important.clone(),
            });
        }
    }
}

fn style_from_declarations(declarations: &DeclarationBlock) -> (StyleDelta, StyleDelta) {
    let mut normal = StyleDelta::default();
    let mut important = StyleDelta::default();
    apply_properties(&declarations.declarations, &mut normal);
    apply_properties(&declarations.important_declarations, &mut important);
    (normal, important)
}

fn apply_properties(props: &[Property], delta: &mut StyleDelta) {
    for prop in props {
        match prop {
            Property::Display(display) => {
                delta.display = Some(display_mode_from_display(display));
            }
            Property::Position(position) => {
                delta.position = Some(position_mode_from_css(position));
            }
            Property::FlexDirection(direction, _) => {
                delta.flex_row = Some(!matches!(
                    direction,
                    css_flex::FlexDirection::Column | css_flex::FlexDirection::ColumnReverse
                ));
            }
            Property::BoxSizing(value, _) => {
                delta.border_box = Some(matches!(value, BoxSizing::BorderBox));
            }
            Property::Width(value) => delta.width = length_from_size(value),
            Property::Height(value) => delta.height = length_from_size(value),
            Property::MinHeight(value) => delta.min_height = length_from_size(value),
            Property::Margin(value) => {
                delta.margin = [
                    length_from_lpa(&value.top),
                    length_from_lpa(&value.right),
                    length_from_lpa(&value.bottom),
                    length_from_lpa(&value.left),
                ];
            }
            Property::MarginTop(value) => delta.margin[0] = length_from_lpa(value),
            Property::MarginRight(value) => delta.margin[1] = length_from_lpa(value),
            Property::MarginBottom(value) => delta.margin[2] = length_from_lpa(value),
            Property::MarginLeft(value) => delta.margin[3] = length_from_lpa(value),
            Property::Padding(value) => {
                delta.padding = [
                    length_from_lpa(&value.top),
                    length_from_lpa(&value.right),
                    length_from_lpa(&value.bottom),
                    length_from_lpa(&value.left),
                ];
            }
            Property::PaddingTop(value) => delta.padding[0] = length_from_lpa(value),
            Property::PaddingRight(value) => delta.padding[1] = length_from_lpa(value),
            Property::PaddingBottom(value) => delta.padding[2] = length_from_lpa(value),
            Property::PaddingLeft(value) => delta.padding[3] = length_from_lpa(value),
            Property::Border(value) => {
                let width = border_width_px(&value.width);
                let visible = line_style_visible(&value.style);
                delta.border_width = [width; 4];
                delta.border_visible = [Some(visible); 4];
                if let Some(color) = css_color_to_color(&value.color) {
                    delta.border_color = Some(color);
                }
            }
            Property::BorderTop(value) => {
                set_border_side(delta, 0, &value.width, &value.style, &value.color)
            }
            Property::BorderRight(value) => {
                set_border_side(delta, 1, &value.width, &value.style, &value.color)
            }
            Property::BorderBottom(value) => {
                set_border_side(delta, 2, &value.width, &value.style, &value.color)
            }
            Property::BorderLeft(value) => {
                set_border_side(delta, 3, &value.width, &value.style, &value.color)
            }
            Property::BorderWidth(value) => {
                delta.border_width = [
                    border_width_px(&value.top),
                    border_width_px(&value.right),
                    border_width_px(&value.bottom),
                    border_width_px(&value.left),
                ];
            }
            Property::BorderTopWidth(value) => delta.border_width[0] = border_width_px(value),
            Property::BorderRightWidth(value) => delta.border_width[1] = border_width_px(value),
            Property::BorderBottomWidth(value) => delta.border_width[2] = border_width_px(value),
            Property::BorderLeftWidth(value) => delta.border_width[3] = border_width_px(value),
            Property::BorderStyle(value) => {
                delta.border_visible = [
                    Some(line_style_visible(&value.top)),
                    Some(line_style_visible(&value.right)),
                    Some(line_style_visible(&value.bottom)),
                    Some(line_style_visible(&value.left)),
                ];
            }
            Property::BorderColor(value) => {
                if let Some(color) = css_color_to_color(&value.top) {
                    delta.border_color = Some(color);
                }
            }
            Property::BackgroundColor(color) => {
                delta.background = Some(css_color_to_color(color));
            }
            Property::Background(backgrounds) => {
                if let Some(background) = backgrounds.last() {
                    delta.background = Some(css_color_to_color(&background.color));
                }
            }
            Property::Color(color) => {
                if let Some(color) = css_color_to_color(color) {
                    delta.color = Some(color);
                }
            }
            Property::FontSize(size) => delta.font_size = font_size_spec(size),
            Property::FontWeight(weight) => {
                if let Ok(raw) = weight.to_css_string(PrinterOptions::default()) {
                    delta.bold = parse_bold(&raw);
                }
            }
            Property::LineHeight(value) => delta.line_height = line_height_mode(value),
            Property::TextAlign(align) => {
                delta.text_align = Some(match align {
                    TextAlign::Center => TextAlignMode::Center,
                    TextAlign::Right | TextAlign::End => TextAlignMode::Right,
                    _ => TextAlignMode::Left,
                });
            }
            _ => {}
        }
    }
}

fn set_border_side(
    delta: &mut StyleDelta,
    side: usize,
    width: &BorderSideWidth,
    style: &LineStyle,
    color: &CssColor,
) {
    delta.border_width[side] = border_width_px(width);
    delta.border_visible[side] = Some(line_style_visible(style));
    if let Some(color) = css_color_to_color(color) {
        delta.border_color = Some(color);
    }
}

fn line_style_visible(style: &LineStyle) -> bool {
    !matches!(style, LineStyle::None | LineStyle::Hidden)
}

fn border_width_px(value: &BorderSideWidth) -> Option<f32> {
    match value {
        BorderSideWidth::Thin => Some(1.0),
        BorderSideWidth::Medium => Some(3.0),
        BorderSideWidth::Thick => Some(5.0),
        BorderSideWidth::Length(length) => length.to_px(),
    }
}

fn display_mode_from_display(display: &Display) -> DisplayMode {
    match display {
        Display::Keyword(keyword) => match keyword {
            DisplayKeyword::None => DisplayMode::None,
            DisplayKeyword::TableRowGroup
            | DisplayKeyword::TableHeaderGroup
            | DisplayKeyword::TableFooterGroup => DisplayMode::TableRowGroup,
            DisplayKeyword::TableRow => DisplayMode::TableRow,
            DisplayKeyword::TableCell => DisplayMode::TableCell,
            _ => DisplayMode::Block,
        },
        Display::Pair(pair) => {
            let inline = pair.outside == DisplayOutside::Inline;
            if matches!(pair.inside, DisplayInside::Table) {
                return if inline {
                    DisplayMode::InlineBlock
                } else {
                    DisplayMode::Table
                };
            }
            if matches!(pair.inside, DisplayInside::Flex(_)) {
                return if inline {
                    DisplayMode::InlineBlock
                } else {
                    DisplayMode::Flex
                };
            }
            if inline {
                if matches!(pair.inside, DisplayInside::Flow) {
                    DisplayMode::Inline
                } else {
                    DisplayMode::InlineBlock
                }
            } else {
                DisplayMode::Block
            }
        }
    }
}

fn position_mode_from_css(position: &CssPosition) -> PositionMode {
    match position {
        CssPosition::Fixed => PositionMode::Fixed,
        CssPosition::Absolute => PositionMode::Absolute,
        CssPosition::Relative | CssPosition::Sticky(_) => PositionMode::Relative,
        _ => PositionMode::Static,
    }
}

fn length_from_lp(value: &LengthPercentage) -> Option<Length> {
    match value {
        LengthPercentage::Percentage(pct) => Some(Length::Percent(pct.0)),
        LengthPercentage::Dimension(length) => match length {
            LengthValue::Em(val) => Some(Length::Em(*val)),
            LengthValue::Rem(val) => Some(Length::Rem(*val)),
            _ => length.to_px().map(Length::Px),
        },
        _ => None,
    }
}

fn length_from_lpa(value: &LengthPercentageOrAuto) -> Option<Length> {
    match value {
        LengthPercentageOrAuto::Auto => Some(Length::Auto),
        LengthPercentageOrAuto::LengthPercentage(length) => length_from_lp(length),
    }
}

fn length_from_size(value: &Size) -> Option<Length> {
    match value {
        Size::Auto => Some(Length::Auto),
        Size::LengthPercentage(length) => length_from_lp(length),
        _ => None,
    }
}

fn font_size_spec(value: &FontSize) -> Option<FontSizeSpec> {
    match value {
        FontSize::Length(length) => match length {
            LengthPercentage::Percentage(pct) => Some(FontSizeSpec::Scale(pct.0)),
            LengthPercentage::Dimension(LengthValue::Em(val)) => Some(FontSizeSpec::Scale(*val)),
            LengthPercentage::Dimension(LengthValue::Rem(val)) => {
                Some(FontSizeSpec::Px(val * ROOT_FONT_SIZE_PX))
            }
            LengthPercentage::Dimension(length) => length.to_px().map(FontSizeSpec::Px),
            _ => None,
        },
        FontSize::Absolute(size) => Some(FontSizeSpec::Px(match size {
            AbsoluteFontSize::XXSmall => 9.0,
            AbsoluteFontSize::XSmall => 10.0,
            AbsoluteFontSize::Small => 13.0,
            AbsoluteFontSize::Medium => 16.0,
            AbsoluteFontSize::Large => 18.0,
            AbsoluteFontSize::XLarge => 24.0,
            AbsoluteFontSize::XXLarge => 32.0,
            AbsoluteFontSize::XXXLarge => 48.0,
        })),
        FontSize::Relative(size) => Some(FontSizeSpec::Scale(match size {
            RelativeFontSize::Smaller => 0.8,
            RelativeFontSize::Larger => 1.2,
        })),
    }
}

fn line_height_mode(value: &LineHeight) -> Option<LineHeightMode> {
    match value {
        LineHeight::Normal => Some(LineHeightMode::Normal),
        LineHeight::Number(value) => Some(LineHeightMode::Factor(*value)),
        LineHeight::Length(length) => match length {
            LengthPercentage::Percentage(pct) => Some(LineHeightMode::Factor(pct.0)),
            LengthPercentage::Dimension(LengthValue::Em(val)) => Some(LineHeightMode::Factor(*val)),
            LengthPercentage::Dimension(length) => length.to_px().map(LineHeightMode::Px),
            _ => None,
        },
    }
}

fn parse_bold(raw: &str) -> Option<bool> {
    let raw = raw.trim().to_ascii_lowercase();
    match raw.as_str() {
        "bold" | "bolder" => Some(true),
        "normal" | "lighter" => Some(false),
        other => other.parse::<f32>().ok().map(|weight| weight >= 600.0),
    }
}

/// Fully transparent colors resolve to `None`; partial alpha is blended over white.
fn css_color_to_color(color: &CssColor) -> Option<Color> {
    if let CssColor::RGBA(rgba) = color {
        let alpha = rgba.alpha as f32 / 255.0;
        if alpha <= 0.0 {
            return None;
        }
        let r = (rgba.red as f32 / 255.0) * alpha + (1.0 - alpha);
        let g = (rgba.green as f32 / 255.0) * alpha + (1.0 - alpha);
        let b = (rgba.blue as f32 / 255.0) * alpha + (1.0 - alpha);
        return Some(Color::rgb(r, g, b));
    }
    if let Ok(srgb) = SRGB::try_from(color) {
        if srgb.alpha <= 0.0 {
            return None;
        }
        return Some(Color::rgb(srgb.r, srgb.g, srgb.b));
    }
    None
}

/// Parses HTML presentational color attributes (`bgcolor="#eee"`).
pub(crate) fn parse_color_attr(raw: &str) -> Option<Color> {
    let s = raw.trim();
    let lower = s.to_ascii_lowercase();
    match lower.as_str() {
        "black" => return Some(Color::BLACK),
        "white" => return Some(Color::WHITE),
        "red" => return Some(Color::from_rgb8(255, 0, 0)),
        "green" => return Some(Color::from_rgb8(0, 128, 0)),
        "blue" => return Some(Color::from_rgb8(0, 0, 255)),
        "gray" | "grey" => return Some(Color::from_rgb8(128, 128, 128)),
        "silver" => return Some(Color::from_rgb8(192, 192, 192)),
        "navy" => return Some(Color::from_rgb8(0, 0, 128)),
        _ => {}
    }
    let hex = lower.strip_prefix('#').unwrap_or(&lower);
    let hex = match hex.len() {
        3 => hex.chars().flat_map(|ch| [ch, ch]).collect::<String>(),
        6 => hex.to_string(),
        _ => return None,
    };
    let r = u8::from_str_radix(&hex[0..2], 16).ok()?;
    let g = u8::from_str_radix(&hex[2..4], 16).ok()?;
    let b = u8::from_str_radix(&hex[4..6], 16).ok()?;
    Some(Color::from_rgb8(r, g, b))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn element(tag: &str, classes: &[&str]) -> ElementInfo {
        ElementInfo {
            tag: tag.to_string(),
            id: None,
            classes: classes.iter().map(|c| c.to_string()).collect(),
            attrs: Vec::new(),
        }
    }

    fn compute(resolver: &StyleResolver, path: &[ElementInfo], inline: Option<&str>) -> ComputedStyle {
        resolver.compute(path, inline, &ComputedStyle::root())
    }

    #[test]
    fn user_agent_sheet_makes_structural_tags_block() {
        let resolver = StyleResolver::new("", None);
        let style = compute(&resolver, &[element("div", &[])], None);
        assert_eq!(style.display, DisplayMode::Block);
        let style = compute(&resolver, &[element("span", &[])], None);
        assert_eq!(style.display, DisplayMode::Inline);
        let style = compute(&resolver, &[element("tr", &[])], None);
        assert_eq!(style.display, DisplayMode::TableRow);
    }

    #[test]
    fn inline_style_overrides_author_rules() {
        let resolver = StyleResolver::new(".card { height: 120px; position: fixed; }", None);
        let path = [element("div", &["card"])];
        let style = compute(&resolver, &path, Some("height: 80px"));
        assert_eq!(style.height, Length::Px(80.0));
        assert_eq!(style.position, PositionMode::Fixed);
    }

    #[test]
    fn important_author_rule_beats_inline_normal() {
        let resolver = StyleResolver::new("p { display: inline !important; }", None);
        let style = compute(&resolver, &[element("p", &[])], Some("display: block"));
        assert_eq!(style.display, DisplayMode::Inline);
    }

    #[test]
    fn descendant_and_child_selectors_match_paths() {
        let resolver = StyleResolver::new(
            ".doc td { height: 30px; } .doc > p { height: 12px; }",
            None,
        );
        let td_path = [
            element("div", &["doc"]),
            element("table", &[]),
            element("tr", &[]),
            element("td", &[]),
        ];
        assert_eq!(compute(&resolver, &td_path, None).height, Length::Px(30.0));

        let nested_p = [element("div", &["doc"]), element("section", &[]), element("p", &[])];
        assert_eq!(compute(&resolver, &nested_p, None).height, Length::Auto);
        let direct_p = [element("div", &["doc"]), element("p", &[])];
        assert_eq!(compute(&resolver, &direct_p, None).height, Length::Px(12.0));
    }

    #[test]
    fn specificity_orders_rules() {
        let resolver = StyleResolver::new(".x { height: 10px; } div { height: 20px; }", None);
        let style = compute(&resolver, &[element("div", &["x"])], None);
        assert_eq!(style.height, Length::Px(10.0));
    }

    #[test]
    fn em_font_sizes_scale_from_parent() {
        let resolver = StyleResolver::new("", None);
        let mut parent = ComputedStyle::root();
        parent.font_size = 20.0;
        let style = resolver.compute(&[element("h1", &[])], None, &parent);
        assert!((style.font_size - 40.0).abs() < 0.01);
        assert!(style.bold);
    }

    #[test]
    fn border_shorthand_sets_visible_width() {
        let resolver = StyleResolver::new("", None);
        let style = compute(&resolver, &[element("div", &[])], Some("border: 2px solid #ff0000"));
        assert_eq!(style.used_border().top, 2.0);
        let style = compute(&resolver, &[element("div", &[])], Some("border-width: 4px"));
        assert_eq!(style.used_border().top, 0.0);
    }

    #[test]
    fn transparent_background_is_none() {
        let resolver = StyleResolver::new("", None);
        let style = compute(&resolver, &[element("div", &[])], Some("background: transparent"));
        assert_eq!(style.background, None);
        let style = compute(&resolver, &[element("div", &[])], Some("background-color: #000"));
        assert_eq!(style.background, Some(Color::BLACK));
    }

    #[test]
    fn pseudo_class_selectors_are_skipped() {
        assert!(parse_selector_pattern("a:hover").is_none());
        assert!(parse_selector_pattern("li + li").is_none());
        assert!(parse_selector_pattern("[data-pdf-block]").is_some());
    }

    #[test]
    fn color_attributes_parse_hex_and_names() {
        assert_eq!(parse_color_attr("#fff"), Some(Color::WHITE));
        assert_eq!(parse_color_attr("navy"), Some(Color::from_rgb8(0, 0, 128)));
        assert_eq!(parse_color_attr("#12"), None);
    }
}
