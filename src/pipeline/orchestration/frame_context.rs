use std::time::Instant;

use tracing::warn;

use crate::common::Frame;
use crate::pipeline::services::PersonDetector;
use crate::pipeline::types::PersonDetection;

/// Per-frame scratch state for one pipeline tick.
///
/// Person detection is the most expensive call in a tick, so its result is
/// cached here: the overlay and the hit validator read the same detections.
pub struct FrameContext {
    frame: Frame,
    persons: Option<Vec<PersonDetection>>,
    metrics: FrameMetrics,
    processing_start: Instant,
}

impl FrameContext {
    pub fn new(frame: Frame) -> Self {
        Self {
            frame,
            persons: None,
            metrics: FrameMetrics::new(),
            processing_start: Instant::now(),
        }
    }

    pub fn frame(&self) -> &Frame {
        &self.frame
    }

    /// Runs `detector` on the first call and returns the cached result
    /// afterwards. A detector failure counts as "nobody detected".
    pub fn persons(&mut self, detector: &mut dyn PersonDetector) -> &[PersonDetection] {
        if self.persons.is_none() {
            let started = Instant::now();
            let detected = detector.detect(&self.frame).unwrap_or_else(|e| {
                warn!("Person detection failed on frame {}: {}", self.frame.frame_id(), e);
                Vec::new()
            });
            self.metrics.record_duration(
                ProcessingStepType::PersonDetection,
                started.elapsed().as_micros() as u64,
            );
            self.persons = Some(detected);
        }
        self.persons.as_deref().unwrap_or_default()
    }

    pub fn has_persons(&self) -> bool {
        self.persons.is_some()
    }

    pub fn metrics_mut(&mut self) -> &mut FrameMetrics {
        &mut self.metrics
    }

    /// Finalizes timing and hands back whatever detections were computed.
    pub fn finish(mut self) -> (Option<Vec<PersonDetection>>, FrameMetrics) {
        self.metrics.finalize(self.processing_start);
        (self.persons, self.metrics)
    }
}

/// Timings collected during one tick, in microseconds.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FrameMetrics {
    pub hand_detection_duration_us: u64,
    pub person_detection_duration_us: u64,
    pub validation_duration_us: u64,
    pub total_processing_duration_us: u64,
}

impl FrameMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_duration(&mut self, step: ProcessingStepType, duration_us: u64) {
        match step {
            ProcessingStepType::HandDetection => self.hand_detection_duration_us = duration_us,
            ProcessingStepType::PersonDetection => self.person_detection_duration_us = duration_us,
            ProcessingStepType::Validation => self.validation_duration_us = duration_us,
        }
    }

    pub fn finalize(&mut self, start_time: Instant) {
        self.total_processing_duration_us = start_time.elapsed().as_micros() as u64;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProcessingStepType {
    HandDetection,
    PersonDetection,
    Validation,
}
