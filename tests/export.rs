use base64::Engine;
use paperslice::{
    ExportRequest, ImageEncoding, PageFormat, PaperSlice, PaperSliceError, Slice,
    inspect_pdf_bytes, inspect_pdf_path,
};
use std::time::Duration;

fn engine_in(dir: &std::path::Path) -> PaperSlice {
    PaperSlice::builder()
        .use_system_fonts(false)
        .raster_scale(1.0)
        .output_dir(dir)
        .build()
        .expect("engine")
}

fn blocks(heights: &[u32]) -> String {
    let body: String = heights
        .iter()
        .enumerate()
        .map(|(idx, h)| {
            let shade = 200 + (idx as u32 * 10) % 50;
            format!(r#"<div style="height:{h}px;background:rgb({shade},{shade},255)"></div>"#)
        })
        .collect();
    format!(
        r#"<!doctype html><html><head><title>Quote</title></head><body style="margin:0">{body}</body></html>"#
    )
}

#[test]
fn tall_document_breaks_on_block_edges() {
    let dir = tempfile::tempdir().expect("tempdir");
    let engine = engine_in(dir.path());
    let request = ExportRequest::new(blocks(&[400, 450, 470, 430, 850]), "quotation-1042");

    let report = engine.export(&request).expect("export");
    assert_eq!(report.total_height, 2600);
    assert_eq!(report.page_height, 1123);
    assert_eq!(
        report.slices,
        vec![
            Slice::new(0, 850),
            Slice::new(850, 1750),
            Slice::new(1750, 2600)
        ]
    );

    let path = dir.path().join("quotation-1042.pdf");
    assert_eq!(report.output_path.as_deref(), Some(path.as_path()));
    let summary = inspect_pdf_path(&path).expect("inspect");
    assert_eq!(summary.page_count, 3);
    assert!(!summary.encrypted);
    for (w, h) in summary.page_sizes_pt {
        assert!((w - 595.28).abs() < 0.05);
        assert!((h - 841.89).abs() < 0.05);
    }
    assert_eq!(engine.mounted_surfaces(), 0);
}

#[test]
fn identical_input_gives_identical_plans() {
    let dir = tempfile::tempdir().expect("tempdir");
    let engine = engine_in(dir.path());
    let html = blocks(&[300, 700, 500, 900, 250, 640]);
    let first = engine.plan_document(&html).expect("first");
    let second = engine.plan_document(&html).expect("second");
    assert_eq!(first, second);

    let (_, report) = engine.export_to_buffer(&html).expect("export");
    assert_eq!(report.plan_digest, first.plan_digest);
    assert_eq!(report.slices, first.slices);
}

#[test]
fn slices_tile_the_document() {
    let dir = tempfile::tempdir().expect("tempdir");
    let engine = engine_in(dir.path());
    let plan = engine
        .plan_document(&blocks(&[90, 1500, 40, 333, 777, 1201, 18]))
        .expect("plan");
    assert_eq!(plan.slices.first().map(|s| s.start), Some(0));
    assert_eq!(plan.slices.last().map(|s| s.end), Some(plan.total_height));
    for pair in plan.slices.windows(2) {
        assert_eq!(pair[0].end, pair[1].start);
    }
}

#[test]
fn short_document_is_one_page() {
    let dir = tempfile::tempdir().expect("tempdir");
    let engine = engine_in(dir.path());
    let (bytes, report) = engine
        .export_to_buffer(&blocks(&[200, 300]))
        .expect("export");
    assert_eq!(report.slices, vec![Slice::new(0, 500)]);
    assert_eq!(inspect_pdf_bytes(&bytes).expect("inspect").page_count, 1);
}

#[test]
fn fixed_footer_does_not_add_a_page() {
    let dir = tempfile::tempdir().expect("tempdir");
    let engine = engine_in(dir.path());
    let plan = engine
        .plan_document(
            r#"<body style="margin:0"><div style="height:1000px"></div>
            <div style="position:fixed;bottom:0;height:600px"></div></body>"#,
        )
        .expect("plan");
    assert_eq!(plan.total_height, 1000);
    assert_eq!(plan.slices, vec![Slice::new(0, 1000)]);
}

#[test]
fn rasterization_failure_leaves_no_file_and_no_surface() {
    let dir = tempfile::tempdir().expect("tempdir");
    let engine = PaperSlice::builder()
        .use_system_fonts(false)
        .output_dir(dir.path())
        .max_raster_pixels(10_000)
        .build()
        .expect("engine");
    let result = engine.export(&ExportRequest::new(blocks(&[2000]), "too-big.pdf"));
    assert!(matches!(result, Err(PaperSliceError::ExportFailed(_))));
    assert_eq!(engine.mounted_surfaces(), 0);
    assert_eq!(std::fs::read_dir(dir.path()).expect("read dir").count(), 0);
}

#[test]
fn unusable_markup_is_render_unavailable() {
    let dir = tempfile::tempdir().expect("tempdir");
    let engine = engine_in(dir.path());
    for html in ["", r#"<body style="margin:0"></body>"#] {
        let result = engine.export(&ExportRequest::new(html, "empty"));
        assert!(matches!(result, Err(PaperSliceError::RenderUnavailable(_))));
    }
    assert_eq!(engine.mounted_surfaces(), 0);
    assert!(!dir.path().join("empty.pdf").exists());
}

#[test]
fn file_names_with_separators_are_refused() {
    let dir = tempfile::tempdir().expect("tempdir");
    let engine = engine_in(dir.path());
    let result = engine.export(&ExportRequest::new(blocks(&[100]), "../escape.pdf"));
    assert!(matches!(
        result,
        Err(PaperSliceError::InvalidConfiguration(_))
    ));
}

#[test]
fn missing_output_directory_is_an_io_error() {
    let dir = tempfile::tempdir().expect("tempdir");
    let engine = engine_in(&dir.path().join("nope"));
    let result = engine.export(&ExportRequest::new(blocks(&[100]), "receipt"));
    assert!(matches!(result, Err(PaperSliceError::Io(_))));
    assert_eq!(engine.mounted_surfaces(), 0);
}

#[test]
fn embedded_images_load_and_network_images_settle_failed() {
    let mut png = Vec::new();
    image::RgbImage::from_pixel(8, 8, image::Rgb([0, 128, 0]))
        .write_with_encoder(image::codecs::png::PngEncoder::new(&mut png))
        .expect("png");
    let data_uri = format!(
        "data:image/png;base64,{}",
        base64::engine::general_purpose::STANDARD.encode(&png)
    );
    let html = format!(
        r#"<body style="margin:0">
            <div style="height:200px"><img src="{data_uri}" width="100" height="100"></div>
            <div style="height:200px"><img src="https://example.invalid/logo.png" width="50" height="50"></div>
        </body>"#
    );
    let dir = tempfile::tempdir().expect("tempdir");
    let engine = PaperSlice::builder()
        .use_system_fonts(false)
        .raster_scale(1.0)
        .ready_timeout(Duration::from_secs(5))
        .image_encoding(ImageEncoding::Png)
        .output_dir(dir.path())
        .build()
        .expect("engine");
    let (bytes, report) = engine.export_to_buffer(&html).expect("export");
    assert_eq!(report.metrics.images_loaded, 1);
    assert_eq!(report.metrics.images_failed, 1);
    assert_eq!(inspect_pdf_bytes(&bytes).expect("inspect").page_count, 1);
}

#[test]
fn landscape_format_shortens_the_page() {
    let dir = tempfile::tempdir().expect("tempdir");
    let engine = PaperSlice::builder()
        .use_system_fonts(false)
        .page_format(PageFormat::a4_landscape())
        .output_dir(dir.path())
        .build()
        .expect("engine");
    assert_eq!(engine.page_height(), 561);
    let plan = engine.plan_document(&blocks(&[500, 500])).expect("plan");
    assert_eq!(plan.page_height, 561);
    assert_eq!(plan.slices.len(), 2);
}

#[test]
fn concurrent_exports_are_independent() {
    let dir = tempfile::tempdir().expect("tempdir");
    let engine = std::sync::Arc::new(engine_in(dir.path()));
    let handles: Vec<_> = (0..4)
        .map(|idx| {
            let engine = engine.clone();
            std::thread::spawn(move || {
                engine
                    .export(&ExportRequest::new(
                        blocks(&[600, 600, 600]),
                        format!("doc-{idx}"),
                    ))
                    .map(|report| report.plan_digest)
            })
        })
        .collect();
    let digests: Vec<String> = handles
        .into_iter()
        .map(|handle| handle.join().expect("join").expect("export"))
        .collect();
    assert!(digests.windows(2).all(|pair| pair[0] == pair[1]));
    assert_eq!(engine.mounted_surfaces(), 0);
    assert_eq!(std::fs::read_dir(dir.path()).expect("read dir").count(), 4);
}
