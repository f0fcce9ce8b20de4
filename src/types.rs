/// 1in = 25.4mm = 72pt.
const MM_PER_INCH: f32 = 25.4;
const PT_PER_INCH: f32 = 72.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Color {
    pub r: f32,
    pub g: f32,
    pub b: f32,
}

impl Color {
    pub const BLACK: Color = Color {
        r: 0.0,
        g: 0.0,
        b: 0.0,
    };

    pub const WHITE: Color = Color {
        r: 1.0,
        g: 1.0,
        b: 1.0,
    };

    pub fn rgb(r: f32, g: f32, b: f32) -> Self {
        Self { r, g, b }
    }

    pub fn from_rgb8(r: u8, g: u8, b: u8) -> Self {
        Self::rgb(r as f32 / 255.0, g as f32 / 255.0, b as f32 / 255.0)
    }

    pub fn to_rgb8(self) -> [u8; 3] {
        [
            (self.r.clamp(0.0, 1.0) * 255.0).round() as u8,
            (self.g.clamp(0.0, 1.0) * 255.0).round() as u8,
            (self.b.clamp(0.0, 1.0) * 255.0).round() as u8,
        ]
    }

    pub(crate) fn to_sk(self) -> tiny_skia::Color {
        tiny_skia::Color::from_rgba(
            self.r.clamp(0.0, 1.0),
            self.g.clamp(0.0, 1.0),
            self.b.clamp(0.0, 1.0),
            1.0,
        )
        .unwrap_or(tiny_skia::Color::BLACK)
    }
}

/// Physical page size in millimetres.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageFormat {
    pub width_mm: f32,
    pub height_mm: f32,
}

impl PageFormat {
    pub fn a4() -> Self {
        Self::from_mm(210.0, 297.0)
    }

    pub fn a4_landscape() -> Self {
        Self::from_mm(297.0, 210.0)
    }

    pub fn letter() -> Self {
        // 8.5in x 11in.
        Self::from_mm(215.9, 279.4)
    }

    pub fn from_mm(width_mm: f32, height_mm: f32) -> Self {
        Self {
            width_mm,
            height_mm,
        }
    }

    pub fn width_pt(&self) -> f32 {
        mm_to_pt(self.width_mm)
    }

    pub fn height_pt(&self) -> f32 {
        mm_to_pt(self.height_mm)
    }

    pub(crate) fn is_valid(&self) -> bool {
        self.width_mm.is_finite()
            && self.height_mm.is_finite()
            && self.width_mm > 0.0
            && self.height_mm > 0.0
    }
}

impl Default for PageFormat {
    fn default() -> Self {
        Self::a4()
    }
}

pub fn mm_to_pt(mm: f32) -> f32 {
    mm * PT_PER_INCH / MM_PER_INCH
}

/// Half-open vertical range `[start, end)` of the document assigned to one page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Slice {
    pub start: u32,
    pub end: u32,
}

impl Slice {
    pub fn new(start: u32, end: u32) -> Self {
        Self { start, end }
    }

    pub fn height(&self) -> u32 {
        self.end.saturating_sub(self.start)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub(crate) struct EdgeSizes {
    pub top: f32,
    pub right: f32,
    pub bottom: f32,
    pub left: f32,
}

impl EdgeSizes {
    pub fn zero() -> Self {
        Self::default()
    }

    pub fn horizontal(&self) -> f32 {
        self.left + self.right
    }

    pub fn vertical(&self) -> f32 {
        self.top + self.bottom
    }
}

/// Box geometry in document coordinates (CSS px, origin at the top-left).
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub(crate) struct BoxRect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl BoxRect {
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn bottom(&self) -> f32 {
        self.y + self.height
    }

    pub fn right(&self) -> f32 {
        self.x + self.width
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn a4_converts_to_points() {
        let a4 = PageFormat::a4();
        assert!((a4.width_pt() - 595.28).abs() < 0.01);
        assert!((a4.height_pt() - 841.89).abs() < 0.01);
    }

    #[test]
    fn color_round_trips_through_rgb8() {
        let color = Color::from_rgb8(12, 200, 255);
        assert_eq!(color.to_rgb8(), [12, 200, 255]);
    }

    #[test]
    fn invalid_page_formats_are_detected() {
        assert!(!PageFormat::from_mm(0.0, 297.0).is_valid());
        assert!(!PageFormat::from_mm(210.0, f32::NAN).is_valid());
        assert!(PageFormat::letter().is_valid());
    }
}
