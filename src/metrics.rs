use std::time::Instant;

/// Pipeline stage of a single export call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExportStage {
    Idle,
    Rendering,
    Scanning,
    Planning,
    Rasterizing,
    Compositing,
    Writing,
    Done,
    Failed,
}

impl ExportStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExportStage::Idle => "idle",
            ExportStage::Rendering => "rendering",
            ExportStage::Scanning => "scanning",
            ExportStage::Planning => "planning",
            ExportStage::Rasterizing => "rasterizing",
            ExportStage::Compositing => "compositing",
            ExportStage::Writing => "writing",
            ExportStage::Done => "done",
            ExportStage::Failed => "failed",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StageTiming {
    pub stage: ExportStage,
    pub ms: f64,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExportMetrics {
    pub stages: Vec<StageTiming>,
    pub images_loaded: usize,
    pub images_failed: usize,
    pub candidate_count: usize,
    pub bitmap_width_px: u32,
    pub bitmap_height_px: u32,
    pub pdf_bytes: usize,
}

impl ExportMetrics {
    pub fn stage_ms(&self, stage: ExportStage) -> Option<f64> {
        self.stages
            .iter()
            .find(|timing| timing.stage == stage)
            .map(|timing| timing.ms)
    }

    pub fn total_ms(&self) -> f64 {
        self.stages.iter().map(|timing| timing.ms).sum()
    }
}

/// Walks the export state machine and times each stage.
pub(crate) struct StageClock {
    current: ExportStage,
    started: Instant,
    timings: Vec<StageTiming>,
}

impl StageClock {
    pub fn new() -> Self {
        Self {
            current: ExportStage::Idle,
            started: Instant::now(),
            timings: Vec::new(),
        }
    }

    pub fn enter(&mut self, next: ExportStage) {
        self.close_current();
        log::debug!("export stage -> {}", next.as_str());
        self.current = next;
        self.started = Instant::now();
    }

    pub fn fail(&mut self) -> ExportStage {
        let failed_in = self.current;
        self.close_current();
        self.current = ExportStage::Failed;
        failed_in
    }

    pub fn finish(mut self) -> Vec<StageTiming> {
        self.close_current();
        self.current = ExportStage::Done;
        self.timings
    }

    fn close_current(&mut self) {
        if matches!(
            self.current,
            ExportStage::Idle | ExportStage::Done | ExportStage::Failed
        ) {
            return;
        }
        self.timings.push(StageTiming {
            stage: self.current,
            ms: self.started.elapsed().as_secs_f64() * 1000.0,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clock_records_each_entered_stage_once() {
        let mut clock = StageClock::new();
        clock.enter(ExportStage::Rendering);
        clock.enter(ExportStage::Scanning);
        clock.enter(ExportStage::Planning);
        let timings = clock.finish();
        let stages: Vec<ExportStage> = timings.iter().map(|t| t.stage).collect();
        assert_eq!(
            stages,
            vec![
                ExportStage::Rendering,
                ExportStage::Scanning,
                ExportStage::Planning
            ]
        );
    }

    #[test]
    fn fail_reports_the_stage_that_was_running() {
        let mut clock = StageClock::new();
        clock.enter(ExportStage::Rasterizing);
        assert_eq!(clock.fail(), ExportStage::Rasterizing);
        assert_eq!(clock.fail(), ExportStage::Failed);
        assert!(clock.finish().iter().all(|t| t.stage == ExportStage::Rasterizing));
    }
}
