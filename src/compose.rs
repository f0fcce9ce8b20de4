use crate::error::{PaperSliceError, Result};
use crate::raster::Bitmap;
use crate::types::Slice;
use image::RgbImage;
use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::PngEncoder;
use tiny_skia::Pixmap;

pub const DEFAULT_JPEG_QUALITY: u8 = 92;

/// How each page band is encoded before embedding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageEncoding {
    Jpeg { quality: u8 },
    Png,
}

impl Default for ImageEncoding {
    fn default() -> Self {
        ImageEncoding::Jpeg {
            quality: DEFAULT_JPEG_QUALITY,
        }
    }
}

impl ImageEncoding {
    pub(crate) fn validate(&self) -> Result<()> {
        match self {
            ImageEncoding::Jpeg { quality } if !(1..=100).contains(quality) => Err(
                PaperSliceError::config(format!("jpeg quality must be 1..=100, got {quality}")),
            ),
            _ => Ok(()),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ImageEncoding::Jpeg { .. } => "jpeg",
            ImageEncoding::Png => "png",
        }
    }
}

/// One encoded page band, ready to be placed on a PDF page.
#[derive(Debug, Clone, PartialEq)]
pub struct PageImage {
    pub slice: Slice,
    pub width_px: u32,
    pub height_px: u32,
    pub encoding: ImageEncoding,
    pub data: Vec<u8>,
    /// Height on the page when the image spans the full page width.
    pub rendered_height_mm: f32,
}

pub(crate) fn compose_page(
    bitmap: &Bitmap,
    slice: Slice,
    page_width_mm: f32,
    encoding: ImageEncoding,
) -> Result<PageImage> {
    let band = crop_band(bitmap, slice)?;
    let width_px = band.width();
    let height_px = band.height();
    let data = encode_band(&band, encoding)?;
    Ok(PageImage {
        slice,
        width_px,
        height_px,
        encoding,
        data,
        rendered_height_mm: height_px as f32 * page_width_mm / width_px as f32,
    })
}

/// Copies `[floor(start*scale), ceil(end*scale))` into a fresh background-filled band.
pub(crate) fn crop_band(bitmap: &Bitmap, slice: Slice) -> Result<Pixmap> {
    let full_h = bitmap.height();
    let width = bitmap.width();
    let start_px = ((slice.start as f32 * bitmap.scale).floor().max(0.0) as u32).min(full_h);
    let end_px = ((slice.end as f32 * bitmap.scale).ceil().max(0.0) as u32).min(full_h);
    let band_h = end_px.saturating_sub(start_px).max(1);

    let mut band = Pixmap::new(width, band_h).ok_or_else(|| {
        PaperSliceError::export(format!("could not allocate a {width}x{band_h} page band"))
    })?;
    band.fill(bitmap.background.to_sk());

    let row_bytes = width as usize * 4;
    let copy_rows = end_px.saturating_sub(start_px) as usize;
    let src_start = start_px as usize * row_bytes;
    let src = &bitmap.pixmap.data()[src_start..src_start + copy_rows * row_bytes];
    band.data_mut()[..copy_rows * row_bytes].copy_from_slice(src);
    Ok(band)
}

fn encode_band(band: &Pixmap, encoding: ImageEncoding) -> Result<Vec<u8>> {
    let rgb = pixmap_to_rgb(band)?;
    let mut out = Vec::new();
    match encoding {
        ImageEncoding::Jpeg { quality } => {
            rgb.write_with_encoder(JpegEncoder::new_with_quality(&mut out, quality))?
        }
        ImageEncoding::Png => rgb.write_with_encoder(PngEncoder::new(&mut out))?,
    }
    Ok(out)
}

/// Drops alpha after un-premultiplying; bands are opaque so this is normally a plain copy.
pub(crate) fn pixmap_to_rgb(pixmap: &Pixmap) -> Result<RgbImage> {
    let mut raw = Vec::with_capacity(pixmap.width() as usize * pixmap.height() as usize * 3);
    for px in pixmap.pixels() {
        let color = px.demultiply();
        raw.extend_from_slice(&[color.red(), color.green(), color.blue()]);
    }
    RgbImage::from_raw(pixmap.width(), pixmap.height(), raw)
        .ok_or_else(|| PaperSliceError::export("page band buffer size mismatch"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Color;

    fn striped_bitmap(width: u32, height: u32, scale: f32) -> Bitmap {
        let mut pixmap = Pixmap::new(width, height).unwrap();
        pixmap.fill(tiny_skia::Color::WHITE);
        let half = (height / 2) as usize * width as usize * 4;
        for px in pixmap.data_mut()[half..].chunks_exact_mut(4) {
            px.copy_from_slice(&[0, 0, 255, 255]);
        }
        Bitmap {
            pixmap,
            scale,
            background: Color::WHITE,
        }
    }

    #[test]
    fn band_covers_scaled_slice() {
        let bitmap = striped_bitmap(20, 200, 2.0);
        let band = crop_band(&bitmap, Slice::new(25, 75)).unwrap();
        assert_eq!(band.height(), 100);
        // Rows 50..100 are white, 100..150 blue.
        assert_eq!(band.pixel(0, 0).map(|p| p.blue()), Some(255));
        assert_eq!(band.pixel(0, 0).map(|p| p.red()), Some(255));
        assert_eq!(band.pixel(0, 60).map(|p| p.red()), Some(0));
    }

    #[test]
    fn band_past_the_bitmap_is_background_padded() {
        let bitmap = striped_bitmap(10, 40, 1.0);
        let band = crop_band(&bitmap, Slice::new(40, 60)).unwrap();
        assert_eq!(band.height(), 1);
        assert_eq!(band.pixel(0, 0).map(|p| p.red()), Some(255));
    }

    #[test]
    fn jpeg_page_keeps_aspect_ratio() {
        let bitmap = striped_bitmap(100, 300, 1.0);
        let page = compose_page(&bitmap, Slice::new(0, 150), 210.0, ImageEncoding::default())
            .unwrap();
        assert_eq!((page.width_px, page.height_px), (100, 150));
        assert!((page.rendered_height_mm - 315.0).abs() < 1e-3);
        let decoded = image::load_from_memory(&page.data).unwrap();
        assert_eq!(decoded.height(), 150);
    }

    #[test]
    fn png_encoding_is_lossless() {
        let bitmap = striped_bitmap(8, 8, 1.0);
        let page = compose_page(&bitmap, Slice::new(0, 8), 210.0, ImageEncoding::Png).unwrap();
        let decoded = image::load_from_memory(&page.data).unwrap().to_rgb8();
        assert_eq!(decoded.get_pixel(0, 7).0, [0, 0, 255]);
        assert_eq!(decoded.get_pixel(0, 0).0, [255, 255, 255]);
    }

    #[test]
    fn jpeg_quality_is_validated() {
        assert!(ImageEncoding::Jpeg { quality: 0 }.validate().is_err());
        assert!(ImageEncoding::Jpeg { quality: 101 }.validate().is_err());
        assert!(ImageEncoding::Png.validate().is_ok());
    }
}
