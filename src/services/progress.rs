//! Progress reporting service
//!
//! This module separates progress reporting concerns from business logic,
//! allowing different frontends to implement their own progress handling.

use crate::types::ProcessingTimings;
use instant::Instant;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Progress stages during background removal processing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProcessingStage {
    /// Ensuring the model artifact is cached and current
    Provisioning,
    /// Reading and decoding input image
    ImageLoading,
    /// Converting the image into the model input tensor
    Preprocessing,
    /// Creating the inference session
    ModelLoading,
    /// Running model inference
    Inference,
    /// Turning the matte into an alpha channel and compositing
    Postprocessing,
    /// PNG encoding
    Encoding,
    /// Writing result to file
    FileSaving,
    /// Processing completed
    Completed,
}

impl ProcessingStage {
    /// Get a human-readable description of the processing stage
    #[must_use]
    pub fn description(&self) -> &'static str {
        match self {
            ProcessingStage::Provisioning => "Provisioning model",
            ProcessingStage::ImageLoading => "Loading input image",
            ProcessingStage::Preprocessing => "Preprocessing image",
            ProcessingStage::ModelLoading => "Loading model",
            ProcessingStage::Inference => "Running inference",
            ProcessingStage::Postprocessing => "Compositing alpha mask",
            ProcessingStage::Encoding => "Encoding PNG",
            ProcessingStage::FileSaving => "Saving result",
            ProcessingStage::Completed => "Processing completed",
        }
    }

    /// Get the typical progress percentage for this stage
    #[must_use]
    pub fn progress_percentage(&self) -> u8 {
        match self {
            ProcessingStage::Provisioning => 5,
            ProcessingStage::ImageLoading => 10,
            ProcessingStage::Preprocessing => 20,
            ProcessingStage::ModelLoading => 30,
            ProcessingStage::Inference => 70,
            ProcessingStage::Postprocessing => 85,
            ProcessingStage::Encoding => 95,
            ProcessingStage::FileSaving => 99,
            ProcessingStage::Completed => 100,
        }
    }
}

impl fmt::Display for ProcessingStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.description())
    }
}

/// Progress update containing stage and timing information
#[derive(Debug, Clone)]
pub struct ProgressUpdate {
    /// Current processing stage
    pub stage: ProcessingStage,
    /// Progress percentage (0-100)
    pub progress: u8,
    /// Elapsed time since processing started (milliseconds)
    pub elapsed_ms: u64,
}

impl ProgressUpdate {
    /// Create a new progress update
    #[must_use]
    pub fn new(stage: ProcessingStage, start_time: Instant) -> Self {
        Self {
            stage,
            progress: stage.progress_percentage(),
            elapsed_ms: start_time.elapsed().as_millis() as u64,
        }
    }
}

/// Receives stage transitions from the processor
pub trait ProgressReporter: Send + Sync {
    /// Report a progress update
    fn report_progress(&self, update: ProgressUpdate);

    /// Report processing completion with final timings
    fn report_completion(&self, timings: &ProcessingTimings);

    /// Report a failure at the given stage
    fn report_error(&self, stage: ProcessingStage, error: &str);
}

/// Reporter that discards every update
#[derive(Debug, Default, Clone, Copy)]
pub struct NoOpProgressReporter;

impl ProgressReporter for NoOpProgressReporter {
    fn report_progress(&self, _update: ProgressUpdate) {}

    fn report_completion(&self, _timings: &ProcessingTimings) {}

    fn report_error(&self, _stage: ProcessingStage, _error: &str) {}
}

/// Reporter that emits progress as tracing events
#[derive(Debug, Default, Clone, Copy)]
pub struct ConsoleProgressReporter {
    verbose: bool,
}

impl ConsoleProgressReporter {
    #[must_use]
    pub fn new(verbose: bool) -> Self {
        Self { verbose }
    }
}

impl ProgressReporter for ConsoleProgressReporter {
    fn report_progress(&self, update: ProgressUpdate) {
        if self.verbose {
            tracing::info!(
                stage = ?update.stage,
                progress = update.progress,
                elapsed_ms = update.elapsed_ms,
                "{}",
                update.stage.description()
            );
        } else {
            tracing::debug!(stage = ?update.stage, progress = update.progress, "{}", update.stage);
        }
    }

    fn report_completion(&self, timings: &ProcessingTimings) {
        tracing::info!(
            total_ms = timings.total_ms,
            inference_ms = timings.inference_ms,
            "Background removal finished"
        );
        tracing::debug!("{}", timings.summary());
    }

    fn report_error(&self, stage: ProcessingStage, error: &str) {
        tracing::error!(stage = ?stage, error = %error, "Processing failed");
    }
}

/// Tracks elapsed time and forwards stage transitions to a reporter
pub struct ProgressTracker<'a> {
    reporter: &'a dyn ProgressReporter,
    start_time: Instant,
    current: Option<ProcessingStage>,
}

impl<'a> ProgressTracker<'a> {
    #[must_use]
    pub fn new(reporter: &'a dyn ProgressReporter) -> Self {
        Self {
            reporter,
            start_time: Instant::now(),
            current: None,
        }
    }

    /// Report entering a stage
    pub fn report_stage(&mut self, stage: ProcessingStage) {
        self.current = Some(stage);
        self.reporter
            .report_progress(ProgressUpdate::new(stage, self.start_time));
    }

    /// Stage most recently entered
    #[must_use]
    pub fn current_stage(&self) -> Option<ProcessingStage> {
        self.current
    }

    pub fn report_completion(&mut self, timings: &ProcessingTimings) {
        self.report_stage(ProcessingStage::Completed);
        self.reporter.report_completion(timings);
    }

    pub fn report_error(&self, stage: ProcessingStage, error: &str) {
        self.reporter.report_error(stage, error);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingReporter {
        stages: Mutex<Vec<ProcessingStage>>,
        errors: Mutex<Vec<(ProcessingStage, String)>>,
    }

    impl ProgressReporter for RecordingReporter {
        fn report_progress(&self, update: ProgressUpdate) {
            self.stages.lock().unwrap().push(update.stage);
        }

        fn report_completion(&self, _timings: &ProcessingTimings) {}

        fn report_error(&self, stage: ProcessingStage, error: &str) {
            self.errors.lock().unwrap().push((stage, error.to_string()));
        }
    }

    #[test]
    fn test_stage_percentages_are_monotonic() {
        let stages = [
            ProcessingStage::Provisioning,
            ProcessingStage::ImageLoading,
            ProcessingStage::Preprocessing,
            ProcessingStage::ModelLoading,
            ProcessingStage::Inference,
            ProcessingStage::Postprocessing,
            ProcessingStage::Encoding,
            ProcessingStage::FileSaving,
            ProcessingStage::Completed,
        ];
        for pair in stages.windows(2) {
            assert!(pair[0].progress_percentage() < pair[1].progress_percentage());
        }
        assert_eq!(ProcessingStage::Completed.progress_percentage(), 100);
    }

    #[test]
    fn test_tracker_forwards_stages() {
        let reporter = RecordingReporter::default();
        let mut tracker = ProgressTracker::new(&reporter);

        tracker.report_stage(ProcessingStage::Provisioning);
        tracker.report_stage(ProcessingStage::Inference);
        assert_eq!(tracker.current_stage(), Some(ProcessingStage::Inference));

        tracker.report_completion(&ProcessingTimings::default());
        tracker.report_error(ProcessingStage::Encoding, "boom");

        let stages = reporter.stages.lock().unwrap().clone();
        assert_eq!(
            stages,
            vec![
                ProcessingStage::Provisioning,
                ProcessingStage::Inference,
                ProcessingStage::Completed
            ]
        );
        assert_eq!(reporter.errors.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_stage_display() {
        assert_eq!(ProcessingStage::Inference.to_string(), "Running inference");
    }
}
