//! The single consumer of the frame buffer: extract, score, annotate, emit.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use image::RgbImage;

use crate::alignment::{normalize, similarity, AlignmentTransform, ScoreOptions};
use crate::buffer::{Frame, FrameBuffer};
use crate::codec;
use crate::config::PipelineConfig;
use crate::error::PipelineError;
use crate::exercise::{ExerciseId, ExerciseSource, ExerciseStatus};
use crate::pose::{LandmarkExtractor, LandmarkSet};
use crate::reference::{ReferenceSource, ReferenceStore};
use crate::render::{draw_pose, draw_score_bar, LIVE_COLOR, REFERENCE_COLOR};
use crate::session::{FrameResult, SessionRegistry};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    WaitingForFrame,
    Extracting,
    Scoring,
    Emitting,
    Stopped,
}

/// Result of one successful cycle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CycleOutcome {
    /// No frame arrived within the pop timeout
    Idle,
    /// Frame could not be decoded and was discarded
    Dropped,
    /// Frame processed; `delivered` is false when no session was attached
    Emitted { score: Option<f32>, delivered: bool },
}

/// Per-second counters, logged like an fps line.
#[derive(Debug)]
struct Stats {
    processed: u32,
    no_pose: u32,
    dropped: u32,
    failures: u32,
    window: Instant,
}

impl Stats {
    fn new() -> Self {
        Self {
            processed: 0,
            no_pose: 0,
            dropped: 0,
            failures: 0,
            window: Instant::now(),
        }
    }
}

/// Draws the reference (projected) and live poses plus the score bar.
pub fn annotate(image: &mut RgbImage, reference: Option<&LandmarkSet>, live: Option<&LandmarkSet>, score: Option<f32>) {
    if let Some(reference) = reference {
        draw_pose(image, reference, REFERENCE_COLOR);
    }
    if let Some(live) = live {
        draw_pose(image, live, LIVE_COLOR);
    }
    if let Some(score) = score {
        draw_score_bar(image, score);
    }
}

pub struct PoseWorker<E, X, S> {
    buffer: Arc<FrameBuffer>,
    sessions: Arc<SessionRegistry>,
    extractor: E,
    exercise: X,
    references: ReferenceStore<S>,
    settings: PipelineConfig,
    shutdown: Arc<AtomicBool>,
    state: WorkerState,
    /// Exercise a completion was signalled for while it stays in Comparing
    completed: Option<ExerciseId>,
    failed_cycles: u64,
    stats: Stats,
}

impl<E, X, S> PoseWorker<E, X, S>
where
    E: LandmarkExtractor,
    X: ExerciseSource,
    S: ReferenceSource,
{
    pub fn new(
        buffer: Arc<FrameBuffer>,
        sessions: Arc<SessionRegistry>,
        extractor: E,
        exercise: X,
        references: ReferenceStore<S>,
        settings: PipelineConfig,
        shutdown: Arc<AtomicBool>,
    ) -> Self {
        Self {
            buffer,
            sessions,
            extractor,
            exercise,
            references,
            settings,
            shutdown,
            state: WorkerState::WaitingForFrame,
            completed: None,
            failed_cycles: 0,
            stats: Stats::new(),
        }
    }

    pub fn state(&self) -> WorkerState {
        self.state
    }

    /// Cycles that ended in an error since start.
    pub fn failed_cycles(&self) -> u64 {
        self.failed_cycles
    }

    /// Loops until the shutdown flag is set. A failed cycle is logged, followed
    /// by a short pause, and never ends the loop.
    pub fn run(&mut self) {
        tracing::info!("pose worker started");
        while !self.shutdown.load(Ordering::Relaxed) {
            if let Err(e) = self.cycle() {
                tracing::warn!("frame cycle failed: {}", e);
                self.stats.failures += 1;
                self.failed_cycles += 1;
                self.state = WorkerState::WaitingForFrame;
                std::thread::sleep(self.settings.error_backoff());
            }
            self.report_stats();
        }
        self.state = WorkerState::Stopped;
        tracing::info!("pose worker stopped");
    }

    /// Waits for one frame and processes it.
    pub fn cycle(&mut self) -> Result<CycleOutcome, PipelineError> {
        self.state = WorkerState::WaitingForFrame;
        let Some(frame) = self.buffer.pop(self.settings.pop_timeout()) else {
            return Ok(CycleOutcome::Idle);
        };

        let outcome = match self.process(&frame) {
            Err(PipelineError::Decode(e)) => {
                tracing::debug!("dropping undecodable frame ({} bytes): {}", frame.data.len(), e);
                self.stats.dropped += 1;
                Ok(CycleOutcome::Dropped)
            }
            other => other,
        };
        self.state = WorkerState::WaitingForFrame;
        outcome
    }

    fn process(&mut self, frame: &Frame) -> Result<CycleOutcome, PipelineError> {
        let mut image = codec::decode(&frame.data)?;

        self.state = WorkerState::Extracting;
        let live = self.extractor.extract(&image).map_err(PipelineError::Extraction)?;
        if live.is_none() {
            self.stats.no_pose += 1;
        }

        let active = self.exercise.poll();
        let comparing = active
            .as_ref()
            .filter(|a| a.mode == ExerciseStatus::Comparing)
            .map(|a| a.id);
        if self.completed.is_some() && self.completed != comparing {
            // left Comparing or switched exercise; the next pass may complete again
            self.completed = None;
        }
        let reference = match &active {
            Some(active) if active.mode == ExerciseStatus::Calibrating => {
                self.references.reload(&active.key, &mut self.extractor)
            }
            Some(active) => self.references.load(&active.key, &mut self.extractor),
            None => None,
        };

        self.state = WorkerState::Scoring;
        let transform = self.sessions.transform().unwrap_or_else(AlignmentTransform::identity);
        let projected = match reference {
            Some(r) if !transform.is_identity() => Some(normalize(&r, &transform)),
            other => other,
        };
        let score = match (&projected, &live) {
            (Some(r), Some(l)) => Some(similarity(Some(r), Some(l), ScoreOptions::BODY_ONLY)),
            _ => None,
        };

        if let (Some(active), Some(score)) = (&active, score) {
            if active.mode == ExerciseStatus::Comparing
                && score >= self.settings.completion_threshold
                && self.completed != Some(active.id)
            {
                tracing::info!("exercise {} reached {:.1}, signalling completion", active.id, score);
                self.completed = Some(active.id);
                self.exercise.complete(active.id);
            }
        }

        self.state = WorkerState::Emitting;
        annotate(&mut image, projected.as_ref(), live.as_ref(), score);
        let encoded = codec::encode_jpeg(&image, self.settings.jpeg_quality)?;
        let delivered = self.sessions.route(FrameResult { image: encoded, score });
        self.stats.processed += 1;

        tracing::trace!(
            "frame ts={} age={:.1}ms score={:?}",
            frame.timestamp_us,
            frame.age().as_secs_f64() * 1000.0,
            score
        );
        Ok(CycleOutcome::Emitted { score, delivered })
    }

    fn report_stats(&mut self) {
        if self.stats.window.elapsed() < Duration::from_secs(1) {
            return;
        }
        let s = &self.stats;
        if s.processed + s.dropped + s.failures > 0 {
            tracing::info!(
                "[fps] {} (no_pose={} undecodable={} failed={} buffer_evictions={})",
                s.processed,
                s.no_pose,
                s.dropped,
                s.failures,
                self.buffer.dropped()
            );
        }
        self.stats = Stats::new();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exercise::ActiveExercise;
    use crate::exercise::ExerciseKey;
    use crate::pose::{Landmark, LANDMARK_COUNT};
    use crate::reference::tests::{pose_at, FakeSource};
    use crate::session::tests::RecordingOutbox;
    use crate::session::{AdjustAction, RoutingId};
    use image::Rgb;
    use std::collections::VecDeque;

    const REFERENCE_SIDE: u32 = 8;
    const LIVE_SIDE: u32 = 16;

    /// Reference images (8x8) always yield `reference`; live frames pop `live`.
    struct ScriptedExtractor {
        reference: Option<LandmarkSet>,
        live: VecDeque<Option<LandmarkSet>>,
        fail_live: u32,
    }

    impl LandmarkExtractor for ScriptedExtractor {
        fn extract(&mut self, image: &RgbImage) -> anyhow::Result<Option<LandmarkSet>> {
            if image.width() == REFERENCE_SIDE {
                return Ok(self.reference.clone());
            }
            if self.fail_live > 0 {
                self.fail_live -= 1;
                anyhow::bail!("model exploded");
            }
            Ok(self.live.pop_front().flatten())
        }
    }

    struct FakeExercise {
        active: Option<ActiveExercise>,
        completions: Vec<ExerciseId>,
        polls: u32,
    }

    impl ExerciseSource for FakeExercise {
        fn poll(&mut self) -> Option<ActiveExercise> {
            self.polls += 1;
            self.active.clone()
        }

        fn complete(&mut self, id: ExerciseId) {
            self.completions.push(id);
        }
    }

    fn active(mode: ExerciseStatus) -> Option<ActiveExercise> {
        Some(ActiveExercise {
            id: 11,
            name: "Tree".to_string(),
            key: ExerciseKey::new("tree"),
            mode,
        })
    }

    fn settings() -> PipelineConfig {
        PipelineConfig {
            pop_timeout_ms: 20,
            error_backoff_ms: 5,
            ..PipelineConfig::default()
        }
    }

    fn live_frame() -> Frame {
        let image = RgbImage::from_pixel(LIVE_SIDE, LIVE_SIDE, Rgb([90, 90, 90]));
        Frame::new(codec::encode_jpeg(&image, 90).unwrap(), 0)
    }

    type TestWorker = PoseWorker<ScriptedExtractor, FakeExercise, FakeSource>;

    struct Harness {
        worker: TestWorker,
        buffer: Arc<FrameBuffer>,
        sessions: Arc<SessionRegistry>,
        outbox: Arc<RecordingOutbox>,
        shutdown: Arc<AtomicBool>,
    }

    fn harness(reference: Option<LandmarkSet>, live: Vec<Option<LandmarkSet>>, mode: ExerciseStatus) -> Harness {
        let buffer = Arc::new(FrameBuffer::new());
        let outbox = Arc::new(RecordingOutbox::default());
        let sessions = Arc::new(SessionRegistry::new(Arc::clone(&buffer), outbox.clone()));
        let shutdown = Arc::new(AtomicBool::new(false));
        let extractor = ScriptedExtractor {
            reference,
            live: live.into(),
            fail_live: 0,
        };
        let exercise = FakeExercise {
            active: active(mode),
            completions: Vec::new(),
            polls: 0,
        };
        let worker = PoseWorker::new(
            Arc::clone(&buffer),
            Arc::clone(&sessions),
            extractor,
            exercise,
            ReferenceStore::new(FakeSource::with_keys(&["tree"])),
            settings(),
            Arc::clone(&shutdown),
        );
        Harness {
            worker,
            buffer,
            sessions,
            outbox,
            shutdown,
        }
    }

    fn shifted(dx: f32) -> LandmarkSet {
        pose_at(0.5 + dx)
    }

    #[test]
    fn test_idle_on_timeout() {
        let mut h = harness(None, vec![], ExerciseStatus::ReadyOrDone);
        assert_eq!(h.worker.cycle().unwrap(), CycleOutcome::Idle);
        assert_eq!(h.worker.state(), WorkerState::WaitingForFrame);
        assert_eq!(h.worker.exercise.polls, 0);
    }

    #[test]
    fn test_reference_absent_emits_live_only() {
        let mut h = harness(None, vec![Some(shifted(0.0))], ExerciseStatus::ReadyOrDone);
        h.sessions.attach(RoutingId(1));
        h.buffer.push(live_frame());

        let outcome = h.worker.cycle().unwrap();
        assert_eq!(
            outcome,
            CycleOutcome::Emitted {
                score: None,
                delivered: true
            }
        );
        let sent = h.outbox.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, RoutingId(1));
        assert_eq!(sent[0].1.score, None);
        assert!(codec::is_jpeg(&sent[0].1.image));
    }

    #[test]
    fn test_scores_against_reference() {
        let mut h = harness(Some(pose_at(0.5)), vec![Some(shifted(0.25))], ExerciseStatus::ReadyOrDone);
        h.sessions.attach(RoutingId(1));
        h.buffer.push(live_frame());

        let CycleOutcome::Emitted { score: Some(score), .. } = h.worker.cycle().unwrap() else {
            panic!("expected a scored frame");
        };
        assert!((score - 75.0).abs() < 0.01, "score = {score}");
        assert!(h.worker.exercise.completions.is_empty());
    }

    #[test]
    fn test_completion_fires_once_at_threshold() {
        let live = vec![Some(shifted(0.25)), Some(shifted(0.18)), Some(shifted(0.10))];
        let mut h = harness(Some(pose_at(0.5)), live, ExerciseStatus::Comparing);
        h.sessions.attach(RoutingId(1));

        let mut scores = Vec::new();
        for _ in 0..3 {
            h.buffer.push(live_frame());
            h.worker.cycle().unwrap();
            scores.push(h.outbox.sent().last().and_then(|(_, r)| r.score).unwrap());
            if scores.len() == 1 {
                assert!(h.worker.exercise.completions.is_empty());
            }
        }

        assert!((scores[0] - 75.0).abs() < 0.01);
        assert!((scores[1] - 82.0).abs() < 0.01);
        assert!((scores[2] - 90.0).abs() < 0.01);
        assert_eq!(h.worker.exercise.completions, vec![11]);
    }

    #[test]
    fn test_completion_rearms_after_leaving_comparing() {
        let live = vec![Some(shifted(0.0)), Some(shifted(0.0)), Some(shifted(0.0)), Some(shifted(0.0))];
        let mut h = harness(Some(pose_at(0.5)), live, ExerciseStatus::Comparing);

        for mode in [
            ExerciseStatus::Comparing,
            ExerciseStatus::Comparing,
            ExerciseStatus::ReadyOrDone,
            ExerciseStatus::Comparing,
        ] {
            h.worker.exercise.active = active(mode);
            h.buffer.push(live_frame());
            h.worker.cycle().unwrap();
        }
        assert_eq!(h.worker.exercise.completions, vec![11, 11]);
    }

    #[test]
    fn test_no_completion_outside_comparing() {
        let mut h = harness(Some(pose_at(0.5)), vec![Some(shifted(0.0))], ExerciseStatus::ReadyOrDone);
        h.buffer.push(live_frame());
        h.worker.cycle().unwrap();
        assert!(h.worker.exercise.completions.is_empty());
    }

    #[test]
    fn test_calibrating_reloads_every_cycle() {
        let live = vec![Some(shifted(0.0)), Some(shifted(0.0))];
        let mut h = harness(Some(pose_at(0.5)), live, ExerciseStatus::Calibrating);
        for _ in 0..2 {
            h.buffer.push(live_frame());
            h.worker.cycle().unwrap();
        }
        assert_eq!(h.worker.references.reloads(), 2);
    }

    #[test]
    fn test_comparing_uses_cached_reference() {
        let live = vec![Some(shifted(0.0)), Some(shifted(0.0))];
        let mut h = harness(Some(pose_at(0.5)), live, ExerciseStatus::ReadyOrDone);
        for _ in 0..2 {
            h.buffer.push(live_frame());
            h.worker.cycle().unwrap();
        }
        assert_eq!(h.worker.references.reloads(), 1);
    }

    #[test]
    fn test_session_transform_applied_to_reference() {
        let mut h = harness(Some(pose_at(0.5)), vec![Some(shifted(0.1))], ExerciseStatus::ReadyOrDone);
        h.sessions.attach(RoutingId(4));
        for _ in 0..10 {
            h.sessions.adjust(AdjustAction::MoveRight);
        }
        h.buffer.push(live_frame());

        let CycleOutcome::Emitted { score: Some(score), .. } = h.worker.cycle().unwrap() else {
            panic!("expected a scored frame");
        };
        assert!(score > 99.9, "score = {score}");
    }

    #[test]
    fn test_unattached_result_is_dropped() {
        let mut h = harness(None, vec![None], ExerciseStatus::ReadyOrDone);
        h.buffer.push(live_frame());
        assert_eq!(
            h.worker.cycle().unwrap(),
            CycleOutcome::Emitted {
                score: None,
                delivered: false
            }
        );
        assert!(h.outbox.sent().is_empty());
    }

    #[test]
    fn test_undecodable_frame_dropped() {
        let mut h = harness(None, vec![], ExerciseStatus::ReadyOrDone);
        h.sessions.attach(RoutingId(1));
        h.buffer.push(Frame::new(b"garbage".to_vec(), 0));
        assert_eq!(h.worker.cycle().unwrap(), CycleOutcome::Dropped);
        assert!(h.outbox.sent().is_empty());
    }

    #[test]
    fn test_run_survives_failures_and_stops() {
        let mut h = harness(None, vec![Some(shifted(0.0))], ExerciseStatus::ReadyOrDone);
        h.worker.extractor.fail_live = 1;
        h.sessions.attach(RoutingId(1));
        h.buffer.push(live_frame());

        let mut worker = h.worker;
        let handle = std::thread::spawn(move || {
            worker.run();
            worker
        });

        // first frame fails inside the worker; the second must still come through
        std::thread::sleep(Duration::from_millis(50));
        h.buffer.push(live_frame());
        let deadline = Instant::now() + Duration::from_secs(5);
        while h.outbox.sent().is_empty() && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(5));
        }
        assert_eq!(h.outbox.sent().len(), 1);

        h.shutdown.store(true, Ordering::Relaxed);
        let worker = handle.join().unwrap();
        assert_eq!(worker.state(), WorkerState::Stopped);
        assert_eq!(worker.failed_cycles(), 1);
    }

    #[test]
    fn test_annotate_live_only() {
        let mut image = RgbImage::from_pixel(64, 64, Rgb([0, 0, 0]));
        let live = LandmarkSet::new([Landmark::new(0.25, 0.25, 0.0, 1.0); LANDMARK_COUNT]);
        annotate(&mut image, None, Some(&live), None);
        assert_eq!(*image.get_pixel(16, 16), LIVE_COLOR);
        assert!(image.pixels().all(|p| *p != REFERENCE_COLOR));
    }

    #[test]
    fn test_annotate_both_with_score() {
        let mut image = RgbImage::from_pixel(64, 64, Rgb([0, 0, 0]));
        let reference = LandmarkSet::new([Landmark::new(0.75, 0.75, 0.0, 1.0); LANDMARK_COUNT]);
        let live = LandmarkSet::new([Landmark::new(0.25, 0.5, 0.0, 1.0); LANDMARK_COUNT]);
        annotate(&mut image, Some(&reference), Some(&live), Some(100.0));
        assert_eq!(*image.get_pixel(48, 48), REFERENCE_COLOR);
        assert_eq!(*image.get_pixel(16, 32), LIVE_COLOR);
        assert_eq!(*image.get_pixel(63, 0), crate::render::score_color(100.0));
    }
}
