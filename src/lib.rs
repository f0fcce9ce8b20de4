mod assets;
mod compose;
mod debug;
mod error;
mod font;
mod html;
mod layout;
mod metrics;
mod pdf;
mod plan;
mod raster;
mod scan;
mod style;
mod surface;
mod types;

pub use compose::{DEFAULT_JPEG_QUALITY, ImageEncoding, PageImage};
use debug::DebugLogger;
pub use error::{PaperSliceError, Result};
use font::FontRegistry;
pub use metrics::{ExportMetrics, ExportStage, StageTiming};
use metrics::StageClock;
pub use pdf::{PdfSummary, inspect_pdf_bytes, inspect_pdf_path, save_atomically};
pub use plan::{CandidateSet, PlanOptions, page_height_for, plan_slices};
pub use raster::{DEFAULT_MAX_RASTER_PIXELS, DEFAULT_RASTER_SCALE};
pub use scan::DEFAULT_MIN_BLOCK_HEIGHT;
pub use surface::RenderHost;
pub use types::{Color, PageFormat, Slice, mm_to_pt};

use raster::RasterOptions;
use serde_json::json;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use surface::{OffscreenSurface, SurfaceOptions};

/// Virtual viewport width in CSS pixels; A4 at 96 DPI.
pub const DEFAULT_VIRTUAL_WIDTH: u32 = 794;
pub const DEFAULT_READY_TIMEOUT: Duration = Duration::from_millis(1500);

/// Exports rendered HTML documents to paginated, image-per-page PDFs.
///
/// The engine is immutable after [`PaperSliceBuilder::build`]; every export
/// call mounts its own offscreen surface and releases it before returning.
pub struct PaperSlice {
    page_format: PageFormat,
    virtual_width: u32,
    raster_scale: f32,
    background: Color,
    min_block_height: f32,
    plan_options: PlanOptions,
    ready_timeout: Duration,
    image_encoding: ImageEncoding,
    max_raster_pixels: u64,
    base_dir: Option<PathBuf>,
    output_dir: PathBuf,
    document_title: Option<String>,
    font_registry: Arc<FontRegistry>,
    host: RenderHost,
    debug: Option<DebugLogger>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportRequest {
    pub html_content: String,
    pub file_name: String,
}

impl ExportRequest {
    pub fn new(html_content: impl Into<String>, file_name: impl Into<String>) -> Self {
        Self {
            html_content: html_content.into(),
            file_name: file_name.into(),
        }
    }
}

/// Geometry of a document before anything is rasterized.
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentPlan {
    pub total_height: u32,
    pub page_height: u32,
    pub candidates: CandidateSet,
    pub slices: Vec<Slice>,
    /// Hex SHA-256 over the page height, total height and slice bounds.
    pub plan_digest: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExportReport {
    pub output_path: Option<PathBuf>,
    pub page_count: usize,
    pub total_height: u32,
    pub page_height: u32,
    pub slices: Vec<Slice>,
    pub plan_digest: String,
    pub metrics: ExportMetrics,
}

impl PaperSlice {
    pub fn builder() -> PaperSliceBuilder {
        PaperSliceBuilder::new()
    }

    pub fn page_format(&self) -> PageFormat {
        self.page_format
    }

    pub fn virtual_width(&self) -> u32 {
        self.virtual_width
    }

    /// Page height in document units for the configured format and width.
    pub fn page_height(&self) -> u32 {
        page_height_for(self.virtual_width, self.page_format)
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Number of offscreen surfaces currently attached to this engine's host.
    pub fn mounted_surfaces(&self) -> usize {
        self.host.mounted_count()
    }

    /// Renders, slices and writes `request.file_name` into the output directory.
    pub fn export(&self, request: &ExportRequest) -> Result<ExportReport> {
        let file_name = normalize_file_name(&request.file_name)?;
        let target = self.output_dir.join(&file_name);
        let (_, report) = self.run_pipeline(&request.html_content, Some(&target))?;
        Ok(report)
    }

    pub fn export_to_buffer(&self, html: &str) -> Result<(Vec<u8>, ExportReport)> {
        self.run_pipeline(html, None)
    }

    /// Renders, scans and plans without rasterizing.
    pub fn plan_document(&self, html: &str) -> Result<DocumentPlan> {
        let mut clock = StageClock::new();
        let mut metrics = ExportMetrics::default();
        let result = self
            .mount(html, &mut clock, &mut metrics)
            .map(|surface| self.plan_surface(&surface, &mut clock, &mut metrics));
        match result {
            Ok(plan) => {
                clock.finish();
                self.emit_debug_summary("plan_document");
                Ok(plan)
            }
            Err(err) => Err(self.fail(&mut clock, err, "plan_document")),
        }
    }

    fn run_pipeline(&self, html: &str, target: Option<&Path>) -> Result<(Vec<u8>, ExportReport)> {
        let mut clock = StageClock::new();
        let mut metrics = ExportMetrics::default();
        match self.run_stages(html, target, &mut clock, &mut metrics) {
            Ok((bytes, plan)) => {
                metrics.pdf_bytes = bytes.len();
                metrics.stages = clock.finish();
                let report = ExportReport {
                    output_path: target.map(Path::to_path_buf),
                    page_count: plan.slices.len(),
                    total_height: plan.total_height,
                    page_height: plan.page_height,
                    slices: plan.slices,
                    plan_digest: plan.plan_digest,
                    metrics,
                };
                log::info!(
                    "exported {} page(s), {} bytes in {:.1} ms",
                    report.page_count,
                    report.metrics.pdf_bytes,
                    report.metrics.total_ms()
                );
                if let Some(logger) = &self.debug {
                    logger.log_json(&json!({
                        "type": "export.done",
                        "pages": report.page_count,
                        "total_height": report.total_height,
                        "page_height": report.page_height,
                        "plan_digest": report.plan_digest,
                        "pdf_bytes": report.metrics.pdf_bytes,
                    }));
                }
                self.emit_debug_summary("export");
                Ok((bytes, report))
            }
            Err(err) => Err(self.fail(&mut clock, err, "export")),
        }
    }

    fn run_stages(
        &self,
        html: &str,
        target: Option<&Path>,
        clock: &mut StageClock,
        metrics: &mut ExportMetrics,
    ) -> Result<(Vec<u8>, DocumentPlan)> {
        let surface = self.mount(html, clock, metrics)?;
        let plan = self.plan_surface(&surface, clock, metrics);

        clock.enter(ExportStage::Rasterizing);
        let bitmap = raster::rasterize(
            &surface,
            &RasterOptions {
                scale: self.raster_scale,
                background: self.background,
                max_pixels: self.max_raster_pixels,
            },
            &self.font_registry,
        )?;
        drop(surface);
        metrics.bitmap_width_px = bitmap.width();
        metrics.bitmap_height_px = bitmap.height();

        clock.enter(ExportStage::Compositing);
        let mut pages = Vec::with_capacity(plan.slices.len());
        for slice in &plan.slices {
            pages.push(compose::compose_page(
                &bitmap,
                *slice,
                self.page_format.width_mm,
                self.image_encoding,
            )?);
        }
        drop(bitmap);

        clock.enter(ExportStage::Writing);
        let bytes = pdf::write_pdf(pages, self.page_format, self.document_title.as_deref())?;
        if let Some(path) = target {
            save_atomically(&bytes, path)?;
        }
        Ok((bytes, plan))
    }

    fn mount(
        &self,
        html: &str,
        clock: &mut StageClock,
        metrics: &mut ExportMetrics,
    ) -> Result<OffscreenSurface> {
        clock.enter(ExportStage::Rendering);
        let surface = OffscreenSurface::mount(
            &self.host,
            html,
            &SurfaceOptions {
                virtual_width: self.virtual_width,
                base_dir: self.base_dir.as_deref(),
                ready_timeout: self.ready_timeout,
                debug: self.debug.as_ref(),
            },
            &self.font_registry,
        )?;
        metrics.images_loaded = surface.images().loaded();
        metrics.images_failed = surface.images().failed();
        Ok(surface)
    }

    fn plan_surface(
        &self,
        surface: &OffscreenSurface,
        clock: &mut StageClock,
        metrics: &mut ExportMetrics,
    ) -> DocumentPlan {
        clock.enter(ExportStage::Scanning);
        let total_height = surface.total_height();
        let candidates = scan::scan_candidates(
            surface.root(),
            total_height,
            self.min_block_height,
            self.debug.as_ref(),
        );
        metrics.candidate_count = candidates.len();

        clock.enter(ExportStage::Planning);
        let page_height = self.page_height();
        let slices = plan::plan_slices_traced(
            total_height,
            page_height,
            &candidates,
            &self.plan_options,
            self.debug.as_ref(),
        );
        log::debug!(
            "surface {}: height {total_height}, {} candidate(s), {} slice(s)",
            surface.id(),
            candidates.len(),
            slices.len()
        );
        let plan_digest = plan_digest(total_height, page_height, &slices);
        DocumentPlan {
            total_height,
            page_height,
            candidates,
            slices,
            plan_digest,
        }
    }

    fn fail(&self, clock: &mut StageClock, err: PaperSliceError, context: &str) -> PaperSliceError {
        let stage = clock.fail();
        log::error!("{context} failed during {}: {err}", stage.as_str());
        if let Some(logger) = &self.debug {
            logger.log_json(&json!({
                "type": "export.failed",
                "stage": stage.as_str(),
                "error": err.to_string(),
            }));
        }
        self.emit_debug_summary(context);
        err
    }

    fn emit_debug_summary(&self, context: &str) {
        if let Some(logger) = &self.debug {
            logger.emit_summary(context);
            logger.flush();
        }
    }
}

fn normalize_file_name(name: &str) -> Result<String> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(PaperSliceError::config("file name must not be empty"));
    }
    if trimmed.contains(['/', '\\']) || trimmed == "." || trimmed == ".." {
        return Err(PaperSliceError::config(format!(
            "file name must not contain path separators: {trimmed}"
        )));
    }
    if trimmed.to_ascii_lowercase().ends_with(".pdf") {
        Ok(trimmed.to_string())
    } else {
        Ok(format!("{trimmed}.pdf"))
    }
}

fn plan_digest(total_height: u32, page_height: u32, slices: &[Slice]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(total_height.to_le_bytes());
    hasher.update(page_height.to_le_bytes());
    for slice in slices {
        hasher.update(slice.start.to_le_bytes());
        hasher.update(slice.end.to_le_bytes());
    }
    let digest = hasher.finalize();
    let mut out = String::with_capacity(digest.len() * 2);
    for b in digest {
        use std::fmt::Write;
        let _ = write!(&mut out, "{:02x}", b);
    }
    out
}

pub struct PaperSliceBuilder {
    page_format: PageFormat,
    virtual_width: u32,
    raster_scale: f32,
    background: Color,
    min_block_height: f32,
    plan_options: PlanOptions,
    ready_timeout: Duration,
    image_encoding: ImageEncoding,
    max_raster_pixels: u64,
    base_dir: Option<PathBuf>,
    output_dir: PathBuf,
    font_dirs: Vec<PathBuf>,
    font_files: Vec<PathBuf>,
    use_system_fonts: bool,
    document_title: Option<String>,
    debug_path: Option<PathBuf>,
}

impl Default for PaperSliceBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl PaperSliceBuilder {
    pub fn new() -> Self {
        Self {
            page_format: PageFormat::a4(),
            virtual_width: DEFAULT_VIRTUAL_WIDTH,
            raster_scale: DEFAULT_RASTER_SCALE,
            background: Color::WHITE,
            min_block_height: DEFAULT_MIN_BLOCK_HEIGHT,
            plan_options: PlanOptions::default(),
            ready_timeout: DEFAULT_READY_TIMEOUT,
            image_encoding: ImageEncoding::default(),
            max_raster_pixels: DEFAULT_MAX_RASTER_PIXELS,
            base_dir: None,
            output_dir: PathBuf::from("."),
            font_dirs: Vec::new(),
            font_files: Vec::new(),
            use_system_fonts: true,
            document_title: None,
            debug_path: None,
        }
    }

    pub fn page_format(mut self, format: PageFormat) -> Self {
        self.page_format = format;
        self
    }

    pub fn virtual_width(mut self, width: u32) -> Self {
        self.virtual_width = width;
        self
    }

    /// Device pixels per document unit; applied once to the whole document.
    pub fn raster_scale(mut self, scale: f32) -> Self {
        self.raster_scale = scale;
        self
    }

    pub fn background(mut self, color: Color) -> Self {
        self.background = color;
        self
    }

    pub fn min_block_height(mut self, height: f32) -> Self {
        self.min_block_height = height;
        self
    }

    pub fn plan_options(mut self, options: PlanOptions) -> Self {
        self.plan_options = options;
        self
    }

    /// Upper bound on the wait for embedded images before layout.
    pub fn ready_timeout(mut self, timeout: Duration) -> Self {
        self.ready_timeout = timeout;
        self
    }

    pub fn image_encoding(mut self, encoding: ImageEncoding) -> Self {
        self.image_encoding = encoding;
        self
    }

    pub fn max_raster_pixels(mut self, pixels: u64) -> Self {
        self.max_raster_pixels = pixels;
        self
    }

    /// Directory relative image paths are resolved against.
    pub fn base_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.base_dir = Some(dir.into());
        self
    }

    pub fn output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_dir = dir.into();
        self
    }

    pub fn register_font_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.font_dirs.push(path.into());
        self
    }

    pub fn register_font_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.font_files.push(path.into());
        self
    }

    // Off keeps text metrics independent of the host's installed fonts.
    pub fn use_system_fonts(mut self, enabled: bool) -> Self {
        self.use_system_fonts = enabled;
        self
    }

    pub fn document_title(mut self, title: impl Into<String>) -> Self {
        self.document_title = Some(title.into());
        self
    }

    /// Writes a JSON-lines trace of scanner and planner decisions to `path`.
    pub fn debug_log(mut self, path: impl Into<PathBuf>) -> Self {
        self.debug_path = Some(path.into());
        self
    }

    pub fn build(self) -> Result<PaperSlice> {
        if self.virtual_width == 0 {
            return Err(PaperSliceError::config("virtual_width must be > 0"));
        }
        if !self.raster_scale.is_finite() || self.raster_scale <= 0.0 {
            return Err(PaperSliceError::config(format!(
                "raster_scale must be a positive number, got {}",
                self.raster_scale
            )));
        }
        if !self.min_block_height.is_finite() || self.min_block_height < 0.0 {
            return Err(PaperSliceError::config(format!(
                "min_block_height must be >= 0, got {}",
                self.min_block_height
            )));
        }
        if !self.page_format.is_valid() {
            return Err(PaperSliceError::config(format!(
                "page format must have positive dimensions, got {}x{} mm",
                self.page_format.width_mm, self.page_format.height_mm
            )));
        }
        if page_height_for(self.virtual_width, self.page_format) == 0 {
            return Err(PaperSliceError::config(
                "page format and virtual width give a zero page height",
            ));
        }
        if self.max_raster_pixels == 0 {
            return Err(PaperSliceError::config("max_raster_pixels must be > 0"));
        }
        self.plan_options.validate()?;
        self.image_encoding.validate()?;

        let mut registry = FontRegistry::new();
        for file in &self.font_files {
            registry.register_file(file)?;
        }
        for dir in &self.font_dirs {
            let loaded = registry.register_dir(dir);
            if loaded == 0 {
                log::warn!("no usable fonts found in {}", dir.display());
            }
        }
        if self.use_system_fonts && registry.is_empty() {
            registry.load_system_defaults();
        }
        if registry.is_empty() {
            log::warn!("no fonts registered; text will use fallback metrics and stay unpainted");
        } else {
            log::debug!("{} font face(s) registered", registry.len());
        }

        let debug = match self.debug_path {
            Some(path) => Some(DebugLogger::new(path)?),
            None => None,
        };
        Ok(PaperSlice {
            page_format: self.page_format,
            virtual_width: self.virtual_width,
            raster_scale: self.raster_scale,
            background: self.background,
            min_block_height: self.min_block_height,
            plan_options: self.plan_options,
            ready_timeout: self.ready_timeout,
            image_encoding: self.image_encoding,
            max_raster_pixels: self.max_raster_pixels,
            base_dir: self.base_dir,
            output_dir: self.output_dir,
            document_title: self.document_title,
            font_registry: Arc::new(registry),
            host: RenderHost::new(),
            debug,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine() -> PaperSlice {
        PaperSlice::builder()
            .use_system_fonts(false)
            .raster_scale(1.0)
            .build()
            .expect("engine")
    }

    fn stacked(heights: &[u32]) -> String {
        let blocks: String = heights
            .iter()
            .map(|h| format!(r#"<div style="height:{h}px;background:#eef"></div>"#))
            .collect();
        format!(r#"<html><body style="margin:0">{blocks}</body></html>"#)
    }

    #[test]
    fn engine_is_send_and_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<PaperSlice>();
    }

    #[test]
    fn a4_page_height_at_default_width() {
        assert_eq!(engine().page_height(), 1123);
    }

    #[test]
    fn file_names_get_pdf_extension() {
        assert_eq!(normalize_file_name("quote-42").unwrap(), "quote-42.pdf");
        assert_eq!(normalize_file_name(" receipt.PDF ").unwrap(), "receipt.PDF");
    }

    #[test]
    fn bad_file_names_are_rejected() {
        for name in ["", "   ", "a/b.pdf", "..\\x", ".."] {
            assert!(
                matches!(
                    normalize_file_name(name),
                    Err(PaperSliceError::InvalidConfiguration(_))
                ),
                "{name:?}"
            );
        }
    }

    #[test]
    fn builder_rejects_invalid_settings() {
        let cases = [
            PaperSlice::builder().virtual_width(0),
            PaperSlice::builder().raster_scale(0.0),
            PaperSlice::builder().raster_scale(f32::NAN),
            PaperSlice::builder().page_format(PageFormat::from_mm(0.0, 297.0)),
            PaperSlice::builder().image_encoding(ImageEncoding::Jpeg { quality: 0 }),
            PaperSlice::builder().max_raster_pixels(0),
            PaperSlice::builder().plan_options(PlanOptions {
                look_back_ratio: 1.5,
                ..PlanOptions::default()
            }),
        ];
        for builder in cases {
            assert!(matches!(
                builder.use_system_fonts(false).build(),
                Err(PaperSliceError::InvalidConfiguration(_))
            ));
        }
    }

    #[test]
    fn short_documents_plan_a_single_slice() {
        let plan = engine().plan_document(&stacked(&[300, 200])).expect("plan");
        assert_eq!(plan.total_height, 500);
        assert_eq!(plan.slices, vec![Slice::new(0, 500)]);
        assert_eq!(plan.candidates.as_slice(), &[300, 500]);
    }

    #[test]
    fn plan_digest_is_stable_and_sensitive_to_slices() {
        let a = plan_digest(2600, 1123, &[Slice::new(0, 1120), Slice::new(1120, 2600)]);
        let b = plan_digest(2600, 1123, &[Slice::new(0, 1120), Slice::new(1120, 2600)]);
        let c = plan_digest(2600, 1123, &[Slice::new(0, 1123), Slice::new(1123, 2600)]);
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn buffer_export_reports_every_stage() {
        let engine = engine();
        let (bytes, report) = engine.export_to_buffer(&stacked(&[600, 600, 600])).expect("export");
        assert!(bytes.starts_with(b"%PDF-"));
        assert_eq!(report.output_path, None);
        assert_eq!(report.page_count, report.slices.len());
        for stage in [
            ExportStage::Rendering,
            ExportStage::Scanning,
            ExportStage::Planning,
            ExportStage::Rasterizing,
            ExportStage::Compositing,
            ExportStage::Writing,
        ] {
            assert!(report.metrics.stage_ms(stage).is_some(), "{}", stage.as_str());
        }
        assert_eq!(report.metrics.bitmap_width_px, 794);
        assert_eq!(report.metrics.pdf_bytes, bytes.len());
        assert_eq!(engine.mounted_surfaces(), 0);
    }

    #[test]
    fn render_failures_release_the_surface() {
        let engine = engine();
        assert!(matches!(
            engine.export_to_buffer(""),
            Err(PaperSliceError::RenderUnavailable(_))
        ));
        assert_eq!(engine.mounted_surfaces(), 0);
    }

    #[test]
    fn debug_trace_records_plan_and_summary() {
        let dir = tempfile::tempdir().expect("tempdir");
        let trace = dir.path().join("trace.jsonl");
        let engine = PaperSlice::builder()
            .use_system_fonts(false)
            .debug_log(&trace)
            .build()
            .expect("engine");
        engine.plan_document(&stacked(&[800, 800])).expect("plan");
        let text = std::fs::read_to_string(&trace).expect("trace");
        assert!(text.contains("\"scan.candidates\""));
        assert!(text.contains("\"debug.summary\""));
    }
}
