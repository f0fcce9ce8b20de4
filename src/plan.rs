//! Greedy slice planner.
//!
//! Cuts `[0, total_height)` into page-sized slices, preferring to end each
//! slice on a candidate break point inside a bounded window around the ideal
//! boundary `start + page_height`.

use crate::debug::DebugLogger;
use crate::error::{PaperSliceError, Result};
use crate::types::{PageFormat, Slice};
use serde_json::json;
use std::collections::BTreeSet;

/// Window ratios, all expressed as fractions of the page height.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlanOptions {
    /// A non-final slice covers at least this much content.
    pub min_slice_ratio: f64,
    /// How far before the ideal boundary a break point may be accepted.
    pub look_back_ratio: f64,
    /// How far past the ideal boundary a break point may be accepted.
    pub look_ahead_ratio: f64,
}

impl Default for PlanOptions {
    fn default() -> Self {
        Self {
            min_slice_ratio: 0.55,
            look_back_ratio: 0.28,
            look_ahead_ratio: 0.08,
        }
    }
}

impl PlanOptions {
    pub(crate) fn validate(&self) -> Result<()> {
        let ratios = [
            ("min_slice_ratio", self.min_slice_ratio),
            ("look_back_ratio", self.look_back_ratio),
            ("look_ahead_ratio", self.look_ahead_ratio),
        ];
        for (name, value) in ratios {
            if !value.is_finite() || !(0.0..=1.0).contains(&value) {
                return Err(PaperSliceError::config(format!(
                    "{name} must be within 0..=1, got {value}"
                )));
            }
        }
        if self.min_slice_ratio <= 0.0 {
            return Err(PaperSliceError::config("min_slice_ratio must be > 0"));
        }
        Ok(())
    }
}

/// Sorted, de-duplicated candidate break points. Read-only once built.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CandidateSet {
    points: Vec<u32>,
}

impl CandidateSet {
    pub fn new(points: impl IntoIterator<Item = u32>) -> Self {
        let unique: BTreeSet<u32> = points.into_iter().collect();
        Self {
            points: unique.into_iter().collect(),
        }
    }

    pub fn as_slice(&self) -> &[u32] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

impl From<BTreeSet<u32>> for CandidateSet {
    fn from(value: BTreeSet<u32>) -> Self {
        Self {
            points: value.into_iter().collect(),
        }
    }
}

/// Page height in document units for a given virtual width and physical format.
pub fn page_height_for(virtual_width: u32, format: PageFormat) -> u32 {
    if !format.is_valid() {
        return 0;
    }
    let ratio = format.height_mm as f64 / format.width_mm as f64;
    (virtual_width as f64 * ratio).round().max(0.0) as u32
}

pub fn plan_slices(
    total_height: u32,
    page_height: u32,
    candidates: &CandidateSet,
    options: &PlanOptions,
) -> Vec<Slice> {
    plan_slices_traced(total_height, page_height, candidates, options, None)
}

pub(crate) fn plan_slices_traced(
    total_height: u32,
    page_height: u32,
    candidates: &CandidateSet,
    options: &PlanOptions,
    debug: Option<&DebugLogger>,
) -> Vec<Slice> {
    if total_height == 0 {
        return Vec::new();
    }
    let page_height = page_height.max(1);
    if total_height <= page_height {
        return vec![Slice::new(0, total_height)];
    }

    let points = candidates.as_slice();
    let page = page_height as f64;
    let min_slice = options.min_slice_ratio * page;
    let look_back = options.look_back_ratio * page;
    let look_ahead = options.look_ahead_ratio * page;

    let mut slices = Vec::new();
    let mut start = 0u32;
    while start < total_height {
        let ideal_end = start.saturating_add(page_height);
        if ideal_end >= total_height {
            slices.push(Slice::new(start, total_height));
            break;
        }

        let lower = (start as f64 + min_slice).max(ideal_end as f64 - look_back);
        let upper = (total_height as f64).min(ideal_end as f64 + look_ahead);

        let mut chosen = None;
        let mut nearest_above = None;
        for &point in points.iter().rev() {
            let value = point as f64;
            if value > upper {
                continue;
            }
            if value < lower {
                break;
            }
            if point <= ideal_end {
                chosen = Some(point);
                break;
            }
            nearest_above = Some(point);
        }

        let picked = chosen.or(nearest_above);
        let end = match picked {
            Some(point) if point > start => point,
            _ => ideal_end.min(total_height),
        };

        if let Some(logger) = debug {
            logger.log_json(&json!({
                "type": "plan.slice",
                "start": start,
                "ideal_end": ideal_end,
                "window": [lower, upper],
                "end": end,
                "fallback": picked.is_none(),
            }));
            logger.increment(
                if picked.is_none() {
                    "plan.fallback"
                } else {
                    "plan.candidate"
                },
                1,
            );
        }

        slices.push(Slice::new(start, end));
        start = end;
    }
    slices
}
