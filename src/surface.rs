use crate::assets::{ImageStore, settle_images};
use crate::debug::DebugLogger;
use crate::error::{PaperSliceError, Result};
use crate::font::FontRegistry;
use crate::html::parse_document;
use crate::layout::{LayoutBox, LayoutEngine, LayoutTree};
use crate::style::StyleResolver;
use serde_json::json;
use std::collections::BTreeSet;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Registry of live offscreen surfaces. Cloning shares the registry.
#[derive(Debug, Clone, Default)]
pub struct RenderHost {
    state: Arc<HostState>,
}

#[derive(Debug, Default)]
struct HostState {
    next_id: AtomicU64,
    mounted: Mutex<BTreeSet<u64>>,
}

impl RenderHost {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mounted_count(&self) -> usize {
        self.state
            .mounted
            .lock()
            .map(|mounted| mounted.len())
            .unwrap_or(0)
    }

    fn attach(&self) -> Registration {
        let id = self.state.next_id.fetch_add(1, Ordering::Relaxed);
        if let Ok(mut mounted) = self.state.mounted.lock() {
            mounted.insert(id);
        }
        Registration {
            host: self.clone(),
            id,
        }
    }

    fn detach(&self, id: u64) {
        if let Ok(mut mounted) = self.state.mounted.lock() {
            mounted.remove(&id);
        }
    }
}

/// Detaches its surface from the host when dropped.
#[derive(Debug)]
struct Registration {
    host: RenderHost,
    id: u64,
}

impl Drop for Registration {
    fn drop(&mut self) {
        self.host.detach(self.id);
        log::debug!("surface {} detached", self.id);
    }
}

pub(crate) struct SurfaceOptions<'a> {
    pub virtual_width: u32,
    pub base_dir: Option<&'a Path>,
    pub ready_timeout: Duration,
    pub debug: Option<&'a DebugLogger>,
}

/// A document rendered at a fixed virtual width, attached to a [`RenderHost`]
/// for as long as it lives.
pub(crate) struct OffscreenSurface {
    registration: Registration,
    tree: LayoutTree,
    images: ImageStore,
}

impl OffscreenSurface {
    pub fn mount(
        host: &RenderHost,
        html: &str,
        options: &SurfaceOptions<'_>,
        fonts: &FontRegistry,
    ) -> Result<Self> {
        let registration = host.attach();
        log::debug!("surface {} attached", registration.id);

        let parsed = parse_document(html)?;
        let images = settle_images(
            &parsed.image_sources,
            options.base_dir,
            options.ready_timeout,
            options.debug,
        );
        let resolver = StyleResolver::new(&parsed.css, options.debug);
        let tree = LayoutEngine::new(&resolver, fonts, &images)
            .layout(&parsed.body, options.virtual_width);
        if tree.height == 0 {
            return Err(PaperSliceError::render("rendered document has zero height"));
        }
        if let Some(logger) = options.debug {
            logger.log_json(&json!({
                "type": "surface.mounted",
                "surface": registration.id,
                "width": tree.width,
                "height": tree.height,
            }));
        }
        Ok(Self {
            registration,
            tree,
            images,
        })
    }

    pub fn id(&self) -> u64 {
        self.registration.id
    }

    pub fn root(&self) -> &LayoutBox {
        &self.tree.root
    }

    pub fn width(&self) -> u32 {
        self.tree.width
    }

    pub fn total_height(&self) -> u32 {
        self.tree.height
    }

    pub fn images(&self) -> &ImageStore {
        &self.images
    }
}
