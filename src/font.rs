use crate::error::{PaperSliceError, Result};
use std::fs;
use std::path::{Path, PathBuf};
use tiny_skia::PathBuilder;
use ttf_parser::{GlyphId, OutlineBuilder};

const FALLBACK_CHAR_EM: f32 = 0.6;
const FIRST_CHAR: u32 = 0x20;
const LAST_CHAR: u32 = 0x7e;

/// Fonts available for measuring and painting text.
#[derive(Debug, Default)]
pub(crate) struct FontRegistry {
    fonts: Vec<RegisteredFont>,
}

#[derive(Debug)]
pub(crate) struct RegisteredFont {
    pub(crate) name: String,
    pub(crate) data: Vec<u8>,
    pub(crate) bold: bool,
    units_per_em: f32,
    ascent: f32,
    descent: f32,
    ascii_advances: Vec<u16>,
    missing_advance: u16,
}

impl FontRegistry {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.fonts.is_empty()
    }

    pub(crate) fn len(&self) -> usize {
        self.fonts.len()
    }

    /// Registers every `.ttf`/`.otf` directly inside `path`; returns how many loaded.
    pub(crate) fn register_dir(&mut self, path: impl AsRef<Path>) -> usize {
        let Ok(entries) = fs::read_dir(path.as_ref()) else {
            return 0;
        };
        let mut files: Vec<PathBuf> = entries
            .flatten()
            .map(|entry| entry.path())
            .filter(|path| path.is_file())
            .collect();
        files.sort();
        files
            .into_iter()
            .filter(|path| self.register_file(path).is_ok())
            .count()
    }

    pub(crate) fn register_file(&mut self, path: impl AsRef<Path>) -> Result<String> {
        let path = path.as_ref();
        if !is_supported_font_path(path) {
            return Err(PaperSliceError::config(format!(
                "unsupported font file {}",
                path.display()
            )));
        }
        let data = fs::read(path)?;
        let source = path
            .file_stem()
            .and_then(|stem| stem.to_str())
            .unwrap_or("font");
        self.register_bytes(data, Some(source))
    }

    pub(crate) fn register_bytes(&mut self, data: Vec<u8>, source_name: Option<&str>) -> Result<String> {
        let source = source_name.unwrap_or("EmbeddedFont");
        let font = RegisteredFont::parse(data, source).ok_or_else(|| {
            PaperSliceError::config(format!("invalid font data for {source}"))
        })?;
        let name = font.name.clone();
        let key = normalize_name(&name);
        if self.fonts.iter().any(|known| normalize_name(&known.name) == key) {
            log::debug!("font {name} already registered");
            return Ok(name);
        }
        self.fonts.push(font);
        Ok(name)
    }

    /// Prefers a face whose weight matches, then the first registered face.
    pub(crate) fn pick(&self, bold: bool) -> Option<&RegisteredFont> {
        self.fonts
            .iter()
            .find(|font| font.bold == bold)
            .or_else(|| self.fonts.first())
    }

    pub(crate) fn measure_text_width(&self, bold: bool, font_size: f32, text: &str) -> f32 {
        match self.pick(bold) {
            Some(font) => font.measure(font_size, text),
            None => (font_size * FALLBACK_CHAR_EM) * text.chars().count() as f32,
        }
    }

    /// Loads a regular and a bold sans face from the platform font directories.
    pub(crate) fn load_system_defaults(&mut self) -> usize {
        let mut loaded = 0;
        for wanted in [SYSTEM_REGULAR, SYSTEM_BOLD] {
            for dir in system_font_dirs() {
                if let Some(path) = find_font_file(&dir, wanted, 0) {
                    if self.register_file(&path).is_ok() {
                        log::debug!("loaded system font {}", path.display());
                        loaded += 1;
                        break;
                    }
                }
            }
        }
        loaded
    }
}

const SYSTEM_REGULAR: &[&str] = &[
    "DejaVuSans.ttf",
    "LiberationSans-Regular.ttf",
    "Arial.ttf",
    "arial.ttf",
    "NotoSans-Regular.ttf",
    "FreeSans.ttf",
];

const SYSTEM_BOLD: &[&str] = &[
    "DejaVuSans-Bold.ttf",
    "LiberationSans-Bold.ttf",
    "Arial Bold.ttf",
    "arialbd.ttf",
    "NotoSans-Bold.ttf",
    "FreeSansBold.ttf",
];

fn system_font_dirs() -> Vec<PathBuf> {
    let mut dirs = Vec::new();

    #[cfg(target_os = "windows")]
    {
        dirs.push(PathBuf::from(r"C:\Windows\Fonts"));
    }

    #[cfg(target_os = "linux")]
    {
        dirs.push(PathBuf::from("/usr/share/fonts"));
        dirs.push(PathBuf::from("/usr/local/share/fonts"));
    }

    #[cfg(target_os = "macos")]
    {
        dirs.push(PathBuf::from("/System/Library/Fonts"));
        dirs.push(PathBuf::from("/Library/Fonts"));
    }

    dirs
}

fn find_font_file(dir: &Path, names: &[&str], depth: usize) -> Option<PathBuf> {
    if depth > 4 {
        return None;
    }
    for name in names {
        let candidate = dir.join(name);
        if candidate.is_file() {
            return Some(candidate);
        }
    }
    let mut subdirs: Vec<PathBuf> = fs::read_dir(dir)
        .ok()?
        .flatten()
        .map(|entry| entry.path())
        .filter(|path| path.is_dir())
        .collect();
    subdirs.sort();
    subdirs
        .iter()
        .find_map(|sub| find_font_file(sub, names, depth + 1))
}

pub(crate) fn is_supported_font_path(path: &Path) -> bool {
    let Some(ext) = path.extension().and_then(|v| v.to_str()) else {
        return false;
    };
    matches!(ext.to_ascii_lowercase().as_str(), "ttf" | "otf")
}

impl RegisteredFont {
    fn parse(data: Vec<u8>, source: &str) -> Option<Self> {
        let face = ttf_parser::Face::parse(&data, 0).ok()?;
        let units_per_em = face.units_per_em().max(1) as f32;
        let missing_advance = face.glyph_hor_advance(GlyphId(0)).unwrap_or(0);
        let ascii_advances = (FIRST_CHAR..=LAST_CHAR)
            .map(|code| {
                char::from_u32(code)
                    .and_then(|ch| face.glyph_index(ch))
                    .and_then(|gid| face.glyph_hor_advance(gid))
                    .unwrap_or(missing_advance)
            })
            .collect();
        let name = face_name(&face).unwrap_or_else(|| source.to_string());
        let bold = face.is_bold();
        let ascent = face.ascender() as f32;
        let descent = face.descender() as f32;
        drop(face);
        Some(Self {
            name,
            data,
            bold,
            units_per_em,
            ascent,
            descent,
            ascii_advances,
            missing_advance,
        })
    }

    pub(crate) fn face(&self) -> Option<ttf_parser::Face<'_>> {
        ttf_parser::Face::parse(&self.data, 0).ok()
    }

    pub(crate) fn measure(&self, font_size: f32, text: &str) -> f32 {
        let scale = font_size / self.units_per_em;
        let mut units = 0u64;
        let mut face = None;
        for ch in text.chars() {
            let code = ch as u32;
            let advance = if (FIRST_CHAR..=LAST_CHAR).contains(&code) {
                self.ascii_advances[(code - FIRST_CHAR) as usize]
            } else {
                if face.is_none() {
                    face = self.face();
                }
                face.as_ref()
                    .and_then(|face| face.glyph_index(ch).and_then(|gid| face.glyph_hor_advance(gid)))
                    .unwrap_or(self.missing_advance)
            };
            units += u64::from(advance);
        }
        units as f32 * scale
    }

    /// Distance from the top of a line box to the baseline, for a given line height.
    pub(crate) fn baseline_offset(&self, font_size: f32, line_height: f32) -> f32 {
        let scale = font_size / self.units_per_em;
        let ascent = self.ascent * scale;
        let descent = -self.descent * scale;
        let half_leading = (line_height - (ascent + descent)) / 2.0;
        half_leading + ascent
    }
}

fn face_name(face: &ttf_parser::Face<'_>) -> Option<String> {
    let mut family = None;
    for name in face.names() {
        if name.name_id == ttf_parser::name_id::FULL_NAME {
            if let Some(value) = name.to_string() {
                return Some(value);
            }
        }
        if name.name_id == ttf_parser::name_id::FAMILY && family.is_none() {
            family = name.to_string();
        }
    }
    family
}

fn normalize_name(name: &str) -> String {
    name.chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .map(|c| c.to_ascii_lowercase())
        .collect()
}

/// Collects glyph outlines into a y-down device path.
pub(crate) struct GlyphPathBuilder {
    builder: PathBuilder,
    origin_x: f32,
    origin_y: f32,
    scale: f32,
}

impl GlyphPathBuilder {
    pub(crate) fn new(origin_x: f32, origin_y: f32, scale: f32) -> Self {
        Self {
            builder: PathBuilder::new(),
            origin_x,
            origin_y,
            scale,
        }
    }

    pub(crate) fn advance(&mut self, dx: f32) {
        self.origin_x += dx;
    }

    pub(crate) fn finish(self) -> Option<tiny_skia::Path> {
        self.builder.finish()
    }

    fn x(&self, x: f32) -> f32 {
        self.origin_x + x * self.scale
    }

    fn y(&self, y: f32) -> f32 {
        self.origin_y - y * self.scale
    }
}

impl OutlineBuilder for GlyphPathBuilder {
    fn move_to(&mut self, x: f32, y: f32) {
        let (x, y) = (self.x(x), self.y(y));
        self.builder.move_to(x, y);
    }

    fn line_to(&mut self, x: f32, y: f32) {
        let (x, y) = (self.x(x), self.y(y));
        self.builder.line_to(x, y);
    }

    fn quad_to(&mut self, x1: f32, y1: f32, x: f32, y: f32) {
        let (x1, y1, x, y) = (self.x(x1), self.y(y1), self.x(x), self.y(y));
        self.builder.quad_to(x1, y1, x, y);
    }

    fn curve_to(&mut self, x1: f32, y1: f32, x2: f32, y2: f32, x: f32, y: f32) {
        let (x1, y1) = (self.x(x1), self.y(y1));
        let (x2, y2) = (self.x(x2), self.y(y2));
        let (x, y) = (self.x(x), self.y(y));
        self.builder.cubic_to(x1, y1, x2, y2, x, y);
    }

    fn close(&mut self) {
        self.builder.close();
    }
}

/// Builds one path for a run of text starting at `(x, baseline)` in device pixels.
pub(crate) fn text_run_path(
    font: &RegisteredFont,
    face: &ttf_parser::Face<'_>,
    text: &str,
    x: f32,
    baseline: f32,
    font_size_px: f32,
) -> Option<tiny_skia::Path> {
    let scale = font_size_px / font.units_per_em;
    let mut builder = GlyphPathBuilder::new(x, baseline, scale);
    for ch in text.chars() {
        let gid = face.glyph_index(ch).unwrap_or(GlyphId(0));
        let _ = face.outline_glyph(gid, &mut builder);
        let advance = face.glyph_hor_advance(gid).unwrap_or(font.missing_advance);
        builder.advance(advance as f32 * scale);
    }
    builder.finish()
}
