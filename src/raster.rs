use crate::assets::ImageStore;
use crate::error::{PaperSliceError, Result};
use crate::font::{FontRegistry, RegisteredFont, text_run_path};
use crate::layout::{LayoutBox, TextFragment};
use crate::surface::OffscreenSurface;
use crate::types::Color;
use tiny_skia::{FillRule, FilterQuality, Paint, Pixmap, PixmapPaint, Rect, Transform};

pub const DEFAULT_RASTER_SCALE: f32 = 2.0;
pub const DEFAULT_MAX_RASTER_PIXELS: u64 = 250_000_000;

/// The whole document painted once at `scale` device pixels per document unit.
pub(crate) struct Bitmap {
    pub pixmap: Pixmap,
    pub scale: f32,
    pub background: Color,
}

impl Bitmap {
    pub fn width(&self) -> u32 {
        self.pixmap.width()
    }

    pub fn height(&self) -> u32 {
        self.pixmap.height()
    }
}

pub(crate) struct RasterOptions {
    pub scale: f32,
    pub background: Color,
    pub max_pixels: u64,
}

pub(crate) fn rasterize(
    surface: &OffscreenSurface,
    options: &RasterOptions,
    fonts: &FontRegistry,
) -> Result<Bitmap> {
    rasterize_tree(
        surface.root(),
        surface.width(),
        surface.total_height(),
        surface.images(),
        options,
        fonts,
    )
}

pub(crate) fn rasterize_tree(
    root: &LayoutBox,
    width: u32,
    height: u32,
    images: &ImageStore,
    options: &RasterOptions,
    fonts: &FontRegistry,
) -> Result<Bitmap> {
    let scale = options.scale;
    let width_px = (width as f32 * scale).ceil().max(1.0) as u32;
    let height_px = (height as f32 * scale).ceil().max(1.0) as u32;
    let pixels = width_px as u64 * height_px as u64;
    if pixels > options.max_pixels {
        return Err(PaperSliceError::export(format!(
            "bitmap {width_px}x{height_px} exceeds the {} pixel limit",
            options.max_pixels
        )));
    }
    let mut pixmap = Pixmap::new(width_px, height_px).ok_or_else(|| {
        PaperSliceError::export(format!("could not allocate a {width_px}x{height_px} bitmap"))
    })?;
    pixmap.fill(options.background.to_sk());

    let regular = fonts.pick(false).and_then(|font| font.face().map(|face| (font, face)));
    let bold = fonts.pick(true).and_then(|font| font.face().map(|face| (font, face)));
    if regular.is_none() {
        log::warn!("no font available; text is laid out but not painted");
    }
    let mut painter = Painter {
        pixmap: &mut pixmap,
        scale,
        images,
        regular: regular.as_ref().map(|(font, face)| (*font, face)),
        bold: bold.as_ref().map(|(font, face)| (*font, face)),
    };
    painter.paint_box(root);

    Ok(Bitmap {
        pixmap,
        scale,
        background: options.background,
    })
}

type FaceRef<'f> = (&'f RegisteredFont, &'f ttf_parser::Face<'f>);

struct Painter<'p, 'f> {
    pixmap: &'p mut Pixmap,
    scale: f32,
    images: &'p ImageStore,
    regular: Option<FaceRef<'f>>,
    bold: Option<FaceRef<'f>>,
}

impl Painter<'_, '_> {
    fn paint_box(&mut self, node: &LayoutBox) {
        let rect = node.rect;
        if let Some(background) = node.background {
            self.fill_rect(rect.x, rect.y, rect.width, rect.height, background);
        }
        let border = node.border;
        if border.top > 0.0 {
            self.fill_rect(rect.x, rect.y, rect.width, border.top, node.border_color);
        }
        if border.bottom > 0.0 {
            let y = rect.bottom() - border.bottom;
            self.fill_rect(rect.x, y, rect.width, border.bottom, node.border_color);
        }
        if border.left > 0.0 {
            self.fill_rect(rect.x, rect.y, border.left, rect.height, node.border_color);
        }
        if border.right > 0.0 {
            let x = rect.right() - border.right;
            self.fill_rect(x, rect.y, border.right, rect.height, node.border_color);
        }
        if let Some(src) = &node.image {
            self.draw_image(src, node);
        }

        for child in node.children.iter().filter(|c| !c.position.is_out_of_flow()) {
            self.paint_box(child);
        }
        for fragment in &node.text {
            self.draw_text(fragment);
        }
        for child in node.children.iter().filter(|c| c.position.is_out_of_flow()) {
            self.paint_box(child);
        }
    }

    fn fill_rect(&mut self, x: f32, y: f32, width: f32, height: f32, color: Color) {
        let s = self.scale;
        let Some(rect) = Rect::from_xywh(x * s, y * s, width * s, height * s) else {
            return;
        };
        let mut paint = Paint::default();
        paint.set_color(color.to_sk());
        paint.anti_alias = false;
        self.pixmap.fill_rect(rect, &paint, Transform::identity(), None);
    }

    fn draw_image(&mut self, src: &str, node: &LayoutBox) {
        let images = self.images;
        let Some(img) = images.get(src) else {
            return;
        };
        let img: &Pixmap = img;
        if img.width() == 0 || img.height() == 0 || node.rect.width <= 0.0 {
            return;
        }
        let s = self.scale;
        let sx = node.rect.width * s / img.width() as f32;
        let sy = node.rect.height * s / img.height() as f32;
        let ts = Transform::from_row(sx, 0.0, 0.0, sy, node.rect.x * s, node.rect.y * s);
        let paint = PixmapPaint {
            quality: FilterQuality::Bilinear,
            ..PixmapPaint::default()
        };
        self.pixmap.draw_pixmap(0, 0, img.as_ref(), &paint, ts, None);
    }

    fn draw_text(&mut self, fragment: &TextFragment) {
        let chosen = if fragment.bold {
            self.bold.or(self.regular)
        } else {
            self.regular
        };
        let Some((font, face)) = chosen else {
            return;
        };
        let s = self.scale;
        let baseline = fragment.y + font.baseline_offset(fragment.font_size, fragment.height);
        let Some(path) = text_run_path(
            font,
            face,
            &fragment.text,
            fragment.x * s,
            baseline * s,
            fragment.font_size * s,
        ) else {
            return;
        };
        let mut paint = Paint::default();
        paint.set_color(fragment.color.to_sk());
        paint.anti_alias = true;
        self.pixmap
            .fill_path(&path, &paint, FillRule::Winding, Transform::identity(), None);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::style::{DisplayMode, PositionMode};
    use crate::types::{BoxRect, EdgeSizes};

    fn block(y: f32, height: f32, background: Option<Color>) -> LayoutBox {
        LayoutBox {
            tag: Some("div".to_string()),
            block_marker: false,
            display: DisplayMode::Block,
            position: PositionMode::Static,
            rect: BoxRect::new(0.0, y, 100.0, height),
            background,
            border: EdgeSizes::zero(),
            border_color: Color::BLACK,
            image: None,
            text: Vec::new(),
            children: Vec::new(),
        }
    }

    fn options(max_pixels: u64) -> RasterOptions {
        RasterOptions {
            scale: 2.0,
            background: Color::WHITE,
            max_pixels,
        }
    }

    fn pixel(bitmap: &Bitmap, x: u32, y: u32) -> [u8; 4] {
        let idx = ((y * bitmap.width() + x) * 4) as usize;
        let data = bitmap.pixmap.data();
        [data[idx], data[idx + 1], data[idx + 2], data[idx + 3]]
    }

    #[test]
    fn bitmap_is_scaled_and_filled_with_background() {
        let root = block(0.0, 50.0, None);
        let bitmap = rasterize_tree(
            &root,
            100,
            50,
            &ImageStore::default(),
            &options(DEFAULT_MAX_RASTER_PIXELS),
            &FontRegistry::new(),
        )
        .expect("bitmap");
        assert_eq!((bitmap.width(), bitmap.height()), (200, 100));
        assert_eq!(pixel(&bitmap, 10, 10), [255, 255, 255, 255]);
    }

    #[test]
    fn backgrounds_and_borders_are_painted() {
        let mut root = block(0.0, 60.0, None);
        let mut child = block(20.0, 20.0, Some(Color::from_rgb8(255, 0, 0)));
        child.border = EdgeSizes {
            top: 2.0,
            ..EdgeSizes::zero()
        };
        root.children.push(child);
        let bitmap = rasterize_tree(
            &root,
            100,
            60,
            &ImageStore::default(),
            &options(DEFAULT_MAX_RASTER_PIXELS),
            &FontRegistry::new(),
        )
        .expect("bitmap");
        assert_eq!(pixel(&bitmap, 50, 41), [0, 0, 0, 255]);
        assert_eq!(pixel(&bitmap, 50, 60), [255, 0, 0, 255]);
        assert_eq!(pixel(&bitmap, 50, 90), [255, 255, 255, 255]);
    }

    #[test]
    fn oversized_bitmaps_are_refused() {
        let root = block(0.0, 5000.0, None);
        let result = rasterize_tree(
            &root,
            100,
            5000,
            &ImageStore::default(),
            &options(10_000),
            &FontRegistry::new(),
        );
        assert!(matches!(result, Err(PaperSliceError::ExportFailed(_))));
    }
}
