use crate::compose::{ImageEncoding, PageImage};
use crate::error::{PaperSliceError, Result};
use crate::types::{PageFormat, mm_to_pt};
use lopdf::{Document as LoDocument, Object as LoObject, Stream as LoStream, dictionary};
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

/// Builds a PDF with one page per image, each image spanning the full page
/// width and anchored at the top-left corner.
pub(crate) fn write_pdf(
    images: Vec<PageImage>,
    format: PageFormat,
    title: Option<&str>,
) -> Result<Vec<u8>> {
    if images.is_empty() {
        return Err(PaperSliceError::export("no page images to write"));
    }
    let page_w = format.width_pt();
    let page_h = format.height_pt();

    let mut doc = LoDocument::with_version("1.5");
    let pages_id = doc.new_object_id();
    let mut kids: Vec<LoObject> = Vec::with_capacity(images.len());
    let page_count = images.len();

    for (idx, page) in images.into_iter().enumerate() {
        let image_id = doc.add_object(image_xobject(page.encoding, page.width_px, page.height_px, page.data)?);
        let name = format!("Im{}", idx + 1);
        let draw_h = mm_to_pt(page.rendered_height_mm);
        let content = format!(
            "q {page_w:.4} 0 0 {draw_h:.4} 0 {:.4} cm /{name} Do Q\n",
            page_h - draw_h
        )
        .into_bytes();
        let content_id = doc.add_object(LoStream::new(dictionary! {}, content));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
            "Resources" => dictionary! {
                "XObject" => dictionary! {
                    name => image_id,
                },
            },
            "MediaBox" => vec![
                LoObject::Integer(0),
                LoObject::Integer(0),
                LoObject::from(page_w),
                LoObject::from(page_h),
            ],
        });
        kids.push(LoObject::Reference(page_id));
    }

    doc.objects.insert(
        pages_id,
        LoObject::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => page_count as i64,
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);
    if let Some(title) = title.filter(|t| !t.trim().is_empty()) {
        let info_id = doc.add_object(dictionary! {
            "Title" => LoObject::string_literal(title),
            "Producer" => LoObject::string_literal(concat!("paperslice ", env!("CARGO_PKG_VERSION"))),
        });
        doc.trailer.set("Info", info_id);
    }
    doc.compress();

    let mut out = Vec::new();
    doc.save_to(&mut out)
        .map_err(|err| PaperSliceError::export(format!("pdf serialization failed: {err}")))?;
    Ok(out)
}

fn image_xobject(encoding: ImageEncoding, width: u32, height: u32, data: Vec<u8>) -> Result<LoStream> {
    let mut dict = dictionary! {
        "Type" => "XObject",
        "Subtype" => "Image",
        "Width" => width as i64,
        "Height" => height as i64,
        "ColorSpace" => "DeviceRGB",
        "BitsPerComponent" => 8,
    };
    match encoding {
        ImageEncoding::Jpeg { .. } => {
            dict.set("Filter", "DCTDecode");
            Ok(LoStream::new(dict, data).with_compression(false))
        }
        ImageEncoding::Png => {
            let rgb = image::load_from_memory(&data)?.to_rgb8();
            Ok(LoStream::new(dict, rgb.into_raw()))
        }
    }
}

/// Writes `bytes` to a sibling temporary file and renames it over `path`.
pub fn save_atomically(bytes: &[u8], path: &Path) -> Result<()> {
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));
    let file_name = path
        .file_name()
        .and_then(|name| name.to_str())
        .ok_or_else(|| PaperSliceError::config(format!("invalid output path {}", path.display())))?;
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or(0);
    let temp = dir.join(format!(".{file_name}.{}.{nanos}.part", std::process::id()));

    let written = (|| -> std::io::Result<()> {
        let mut file = File::create(&temp)?;
        file.write_all(bytes)?;
        file.sync_all()?;
        fs::rename(&temp, path)
    })();
    if let Err(err) = written {
        let _ = fs::remove_file(&temp);
        return Err(err.into());
    }
    Ok(())
}

#[derive(Debug, Clone, PartialEq)]
pub struct PdfSummary {
    pub pdf_version: String,
    pub page_count: usize,
    pub encrypted: bool,
    pub file_size_bytes: usize,
    /// `(width, height)` of each page's MediaBox, in points.
    pub page_sizes_pt: Vec<(f32, f32)>,
}

pub fn inspect_pdf_bytes(bytes: &[u8]) -> Result<PdfSummary> {
    let pdf = LoDocument::load_mem(bytes)?;
    let pages = pdf.get_pages();
    let mut page_sizes_pt = Vec::with_capacity(pages.len());
    for page_id in pages.values() {
        let size = pdf
            .get_object(*page_id)
            .and_then(LoObject::as_dict)
            .ok()
            .and_then(|page| page.get(b"MediaBox").ok())
            .and_then(|media| media.as_array().ok())
            .and_then(|values| media_box_size(values.as_slice()));
        page_sizes_pt.push(size.unwrap_or((0.0, 0.0)));
    }
    Ok(PdfSummary {
        pdf_version: pdf.version.clone(),
        page_count: pages.len(),
        encrypted: pdf.is_encrypted(),
        file_size_bytes: bytes.len(),
        page_sizes_pt,
    })
}

pub fn inspect_pdf_path(path: &Path) -> Result<PdfSummary> {
    let data = fs::read(path)?;
    inspect_pdf_bytes(&data)
}

fn media_box_size(values: &[LoObject]) -> Option<(f32, f32)> {
    let number = |obj: &LoObject| match obj {
        LoObject::Integer(v) => Some(*v as f32),
        LoObject::Real(v) => Some(*v as f32),
        _ => None,
    };
    if values.len() != 4 {
        return None;
    }
    let x0 = number(&values[0])?;
    let y0 = number(&values[1])?;
    let x1 = number(&values[2])?;
    let y1 = number(&values[3])?;
    Some((x1 - x0, y1 - y0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Slice;

    fn page(encoding: ImageEncoding, height_mm: f32) -> PageImage {
        let img = image::RgbImage::from_pixel(4, 6, image::Rgb([200, 10, 10]));
        let mut data = Vec::new();
        match encoding {
            ImageEncoding::Jpeg { quality } => img
                .write_with_encoder(image::codecs::jpeg::JpegEncoder::new_with_quality(
                    &mut data, quality,
                ))
                .unwrap(),
            ImageEncoding::Png => img
                .write_with_encoder(image::codecs::png::PngEncoder::new(&mut data))
                .unwrap(),
        }
        PageImage {
            slice: Slice::new(0, 6),
            width_px: 4,
            height_px: 6,
            encoding,
            data,
            rendered_height_mm: height_mm,
        }
    }

    #[test]
    fn one_page_per_image_with_format_media_box() {
        let images = vec![
            page(ImageEncoding::default(), 297.0),
            page(ImageEncoding::Png, 120.0),
        ];
        let bytes = write_pdf(images, PageFormat::a4(), Some("Quotation")).unwrap();
        let summary = inspect_pdf_bytes(&bytes).unwrap();
        assert_eq!(summary.page_count, 2);
        assert_eq!(summary.pdf_version, "1.5");
        for (w, h) in &summary.page_sizes_pt {
            assert!((w - 595.28).abs() < 0.05);
            assert!((h - 841.89).abs() < 0.05);
        }
    }

    #[test]
    fn image_is_anchored_at_top_left() {
        let bytes = write_pdf(vec![page(ImageEncoding::Png, 148.5)], PageFormat::a4(), None).unwrap();
        let pdf = LoDocument::load_mem(&bytes).unwrap();
        let (_, page_id) = pdf.get_pages().into_iter().next().unwrap();
        let content = pdf.get_page_content(page_id).unwrap();
        let text = String::from_utf8(content).unwrap();
        // Half-page image: translated up by half the page height.
        assert!(text.contains("595.2756 0 0 420.9449 0 420.9449 cm"), "{text}");
    }

    #[test]
    fn zero_images_is_an_export_failure() {
        assert!(matches!(
            write_pdf(Vec::new(), PageFormat::a4(), None),
            Err(PaperSliceError::ExportFailed(_))
        ));
    }

    #[test]
    fn atomic_save_replaces_target_and_leaves_no_temp_files() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("out.pdf");
        std::fs::write(&target, b"old").unwrap();
        save_atomically(b"new contents", &target).unwrap();
        assert_eq!(std::fs::read(&target).unwrap(), b"new contents");
        let entries: Vec<_> = std::fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(entries.len(), 1);
    }

    #[test]
    fn atomic_save_into_missing_directory_fails_cleanly() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("missing").join("out.pdf");
        assert!(matches!(
            save_atomically(b"x", &target),
            Err(PaperSliceError::Io(_))
        ));
        assert!(!target.exists());
    }

    #[test]
    fn garbage_is_not_a_pdf() {
        assert!(inspect_pdf_bytes(b"not a pdf").is_err());
    }
}
