use crate::debug::DebugLogger;
use crate::html::parse_data_uri_bytes;
use serde_json::json;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::mpsc;
use std::time::{Duration, Instant};
use tiny_skia::Pixmap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ImageStatus {
    Loaded,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SourceKind {
    DataUri,
    File,
    Network,
}

fn classify_source(src: &str) -> SourceKind {
    let lower = src.trim().to_ascii_lowercase();
    if lower.starts_with("data:") {
        SourceKind::DataUri
    } else if lower.starts_with("http://") || lower.starts_with("https://") || lower.starts_with("//")
    {
        SourceKind::Network
    } else {
        SourceKind::File
    }
}

/// Decoded, premultiplied images keyed by their `src` attribute.
#[derive(Default)]
pub(crate) struct ImageStore {
    images: HashMap<String, Arc<Pixmap>>,
    statuses: HashMap<String, ImageStatus>,
}

impl ImageStore {
    pub fn get(&self, src: &str) -> Option<&Arc<Pixmap>> {
        self.images.get(src.trim())
    }

    pub fn loaded(&self) -> usize {
        self.count(ImageStatus::Loaded)
    }

    pub fn failed(&self) -> usize {
        self.count(ImageStatus::Failed)
    }

    fn count(&self, wanted: ImageStatus) -> usize {
        self.statuses.values().filter(|s| **s == wanted).count()
    }
}

/// Settles every source against one shared deadline.
///
/// Sources load on the rayon pool. Anything still pending when the deadline
/// passes is recorded as failed; the task is left to finish on its own and its
/// result is discarded.
pub(crate) fn settle_images(
    sources: &[String],
    base_dir: Option<&Path>,
    timeout: Duration,
    debug: Option<&DebugLogger>,
) -> ImageStore {
    let mut store = ImageStore::default();
    if sources.is_empty() {
        return store;
    }
    let deadline = Instant::now() + timeout;
    let (tx, rx) = mpsc::channel::<(String, Option<Pixmap>)>();
    let mut pending = 0usize;

    for src in sources {
        let src = src.trim().to_string();
        if store.statuses.contains_key(&src) {
            continue;
        }
        if classify_source(&src) == SourceKind::Network {
            log::warn!("image source {src} is a network URL and is not fetched");
            store.statuses.insert(src, ImageStatus::Failed);
            continue;
        }
        let tx = tx.clone();
        let base = base_dir.map(Path::to_path_buf);
        let key = src.clone();
        rayon::spawn(move || {
            let pixmap = load_source(&key, base.as_deref());
            let _ = tx.send((key, pixmap));
        });
        store.statuses.insert(src, ImageStatus::Failed);
        pending += 1;
    }
    drop(tx);

    while pending > 0 {
        let remaining = deadline.saturating_duration_since(Instant::now());
        match rx.recv_timeout(remaining) {
            Ok((src, pixmap)) => {
                pending -= 1;
                match pixmap {
                    Some(pixmap) => {
                        store.statuses.insert(src.clone(), ImageStatus::Loaded);
                        store.images.insert(src, Arc::new(pixmap));
                    }
                    None => log::warn!("image {} could not be decoded", short_src(&src)),
                }
            }
            Err(mpsc::RecvTimeoutError::Timeout) => {
                log::warn!("{pending} image(s) still pending at the ready deadline; continuing without them");
                break;
            }
            Err(mpsc::RecvTimeoutError::Disconnected) => break,
        }
    }

    if let Some(logger) = debug {
        logger.log_json(&json!({
            "type": "images.settled",
            "total": store.statuses.len(),
            "loaded": store.loaded(),
            "failed": store.failed(),
        }));
        logger.increment("images.failed", store.failed() as u64);
    }
    store
}

fn short_src(src: &str) -> &str {
    if src.len() > 48 {
        let mut end = 48;
        while !src.is_char_boundary(end) {
            end -= 1;
        }
        &src[..end]
    } else {
        src
    }
}

fn load_source(src: &str, base_dir: Option<&Path>) -> Option<Pixmap> {
    match classify_source(src) {
        SourceKind::DataUri => {
            let (mime, data) = parse_data_uri_bytes(src)?;
            decode_image_to_pixmap(&data, Some(&mime))
        }
        SourceKind::File => {
            let path = resolve_file_source(src, base_dir);
            let data = std::fs::read(&path).ok()?;
            decode_image_to_pixmap(&data, None)
        }
        SourceKind::Network => None,
    }
}

fn resolve_file_source(src: &str, base_dir: Option<&Path>) -> PathBuf {
    let raw = src.strip_prefix("file://").unwrap_or(src);
    let path = PathBuf::from(raw);
    match base_dir {
        Some(base) if path.is_relative() => base.join(path),
        _ => path,
    }
}

pub(crate) fn decode_image_to_pixmap(data: &[u8], mime: Option<&str>) -> Option<Pixmap> {
    let guessed_format = match mime {
        Some(mime) if mime.contains("png") => Some(image::ImageFormat::Png),
        Some(mime) if mime.contains("jpeg") || mime.contains("jpg") => {
            Some(image::ImageFormat::Jpeg)
        }
        _ => image::guess_format(data).ok(),
    };
    let decoded = match guessed_format {
        Some(fmt) => image::load_from_memory_with_format(data, fmt).ok()?,
        None => image::load_from_memory(data).ok()?,
    };
    let rgba = decoded.to_rgba8();
    let (width, height) = rgba.dimensions();
    let mut pixmap = Pixmap::new(width, height)?;
    for (src_px, dst_px) in rgba
        .as_raw()
        .chunks_exact(4)
        .zip(pixmap.data_mut().chunks_exact_mut(4))
    {
        let a = src_px[3];
        dst_px[0] = premul_u8(src_px[0], a);
        dst_px[1] = premul_u8(src_px[1], a);
        dst_px[2] = premul_u8(src_px[2], a);
        dst_px[3] = a;
    }
    Some(pixmap)
}

fn premul_u8(channel: u8, alpha: u8) -> u8 {
    let prod = (channel as u16) * (alpha as u16) + 127;
    ((prod + (prod >> 8)) >> 8) as u8
}
