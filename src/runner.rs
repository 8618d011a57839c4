//! The frame-processing loop.
//!
//! Acquire, process, submit, repeat, until the stop flag is raised. Read
//! failures never end the loop: they are counted, and a run of them triggers
//! a source reconnect after `reconnect_delay`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::ingest::FrameSource;
use crate::pipeline::{FrameReport, PipelineState};
use crate::transport::HitOutput;
use crate::tuning::TuningStore;

const FPS_SMOOTHING: f64 = 0.85;
/// Longest single sleep while waiting, so a stop request is seen promptly.
const STOP_POLL: Duration = Duration::from_millis(50);

#[derive(Clone, Debug, PartialEq)]
pub struct LoopPolicy {
    /// Consecutive read failures before the source is reconnected.
    pub max_consecutive_failures: u32,
    pub reconnect_delay: Duration,
    pub health_interval: Duration,
}

impl Default for LoopPolicy {
    fn default() -> Self {
        Self {
            max_consecutive_failures: 30,
            reconnect_delay: Duration::from_millis(1000),
            health_interval: Duration::from_secs(5),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct LoopStats {
    pub frames_processed: u64,
    pub read_failures: u64,
    pub reconnects: u64,
    /// Exponential moving average of the processing rate.
    pub fps: f64,
}

pub struct FrameLoop<S: FrameSource> {
    source: S,
    pipeline: PipelineState,
    tuning: TuningStore,
    policy: LoopPolicy,
    stop: Arc<AtomicBool>,
    connected: bool,
    consecutive_failures: u32,
    last_frame_at: Option<Instant>,
    last_health_at: Instant,
    stats: LoopStats,
}

impl<S: FrameSource> FrameLoop<S> {
    pub fn new(
        source: S,
        pipeline: PipelineState,
        tuning: TuningStore,
        policy: LoopPolicy,
        stop: Arc<AtomicBool>,
    ) -> Self {
        Self {
            source,
            pipeline,
            tuning,
            policy,
            stop,
            connected: false,
            consecutive_failures: 0,
            last_frame_at: None,
            last_health_at: Instant::now(),
            stats: LoopStats::default(),
        }
    }

    pub fn stats(&self) -> LoopStats {
        self.stats
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn source_mut(&mut self) -> &mut S {
        &mut self.source
    }

    pub fn pipeline(&self) -> &PipelineState {
        &self.pipeline
    }

    fn stopped(&self) -> bool {
        self.stop.load(Ordering::SeqCst)
    }

    /// Run until the stop flag is set. Every processed frame's pair goes to `output`.
    pub fn run<F: FnMut(&FrameReport)>(&mut self, output: &HitOutput, mut observe: F) -> LoopStats {
        while !self.stopped() {
            if let Some(report) = self.step() {
                output.submit(report.hits);
                observe(&report);
            }
            self.log_health(output);
        }
        log::info!(
            "frame loop stopped after {} frames ({} read failures, {} reconnects)",
            self.stats.frames_processed,
            self.stats.read_failures,
            self.stats.reconnects
        );
        self.stats
    }

    /// One acquisition cycle. `None` when no frame was processed.
    pub fn step(&mut self) -> Option<FrameReport> {
        if !self.connected {
            match self.source.connect() {
                Ok(()) => {
                    self.connected = true;
                    self.consecutive_failures = 0;
                }
                Err(err) => {
                    log::warn!("frame source connect failed: {:#}", err);
                    self.wait(self.policy.reconnect_delay);
                    return None;
                }
            }
        }

        let frame = match self.source.next_frame() {
            Ok(frame) => frame,
            Err(err) => {
                self.on_read_failure(err);
                return None;
            }
        };
        self.consecutive_failures = 0;

        let tuning = self.tuning.snapshot();
        let report = self.pipeline.process_frame(&frame, &tuning);
        self.stats.frames_processed += 1;
        self.update_fps();

        log::debug!(
            "frame {} ({}x{}): {} candidates",
            report.sequence,
            report.width,
            report.height,
            report.candidates.len()
        );
        if report.changed {
            log::info!(
                "hit state: target1={} target2={}",
                report.hits.target1,
                report.hits.target2
            );
        }
        Some(report)
    }

    fn on_read_failure(&mut self, err: anyhow::Error) {
        self.stats.read_failures += 1;
        self.consecutive_failures += 1;
        log::warn!(
            "frame read failed ({} in a row): {:#}",
            self.consecutive_failures,
            err
        );
        if self.consecutive_failures >= self.policy.max_consecutive_failures.max(1) {
            log::warn!(
                "{} consecutive read failures; reconnecting source in {:?}",
                self.consecutive_failures,
                self.policy.reconnect_delay
            );
            self.connected = false;
            self.consecutive_failures = 0;
            self.stats.reconnects += 1;
            self.wait(self.policy.reconnect_delay);
        }
    }

    fn update_fps(&mut self) {
        let now = Instant::now();
        if let Some(prev) = self.last_frame_at {
            let dt = now.duration_since(prev).as_secs_f64();
            if dt > 0.0 {
                let instant = 1.0 / dt;
                self.stats.fps = if self.stats.fps == 0.0 {
                    instant
                } else {
                    FPS_SMOOTHING * self.stats.fps + (1.0 - FPS_SMOOTHING) * instant
                };
            }
        }
        self.last_frame_at = Some(now);
    }

    fn log_health(&mut self, output: &HitOutput) {
        if self.last_health_at.elapsed() < self.policy.health_interval {
            return;
        }
        self.last_health_at = Instant::now();
        let source = self.source.stats();
        let writer = match output.status() {
            Some(status) => format!(
                "{} (ok {}, failed {}, connects {})",
                status.state, status.writes_ok, status.writes_failed, status.connect_attempts
            ),
            None => "disabled".to_string(),
        };
        log::info!(
            "health: frames={} fps={:.1} source={} {}x{} healthy={} read_failures={} writer={}",
            self.stats.frames_processed,
            self.stats.fps,
            source.device,
            source.width,
            source.height,
            self.source.is_healthy(),
            self.stats.read_failures,
            writer
        );
    }

    fn wait(&self, total: Duration) {
        let deadline = Instant::now() + total;
        while !self.stopped() {
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            std::thread::sleep((deadline - now).min(STOP_POLL));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::Frame;
    use crate::ingest::SourceStats;
    use anyhow::{anyhow, Result};
    use image::RgbImage;

    /// Fails the first `fail_reads` reads after every connect.
    struct FlakySource {
        fail_reads: u32,
        reads_since_connect: u32,
        connects: u32,
        frames: u64,
    }

    impl FlakySource {
        fn new(fail_reads: u32) -> Self {
            Self {
                fail_reads,
                reads_since_connect: 0,
                connects: 0,
                frames: 0,
            }
        }
    }

    impl FrameSource for FlakySource {
        fn connect(&mut self) -> Result<()> {
            self.connects += 1;
            self.reads_since_connect = 0;
            Ok(())
        }

        fn next_frame(&mut self) -> Result<Frame> {
            self.reads_since_connect += 1;
            if self.reads_since_connect <= self.fail_reads {
                return Err(anyhow!("no frame"));
            }
            self.frames += 1;
            Ok(Frame::new(RgbImage::new(64, 48), self.frames))
        }

        fn is_healthy(&self) -> bool {
            true
        }

        fn stats(&self) -> SourceStats {
            SourceStats {
                frames_captured: self.frames,
                device: "flaky".to_string(),
                width: 64,
                height: 48,
            }
        }
    }

    fn quick_policy(max_failures: u32) -> LoopPolicy {
        LoopPolicy {
            max_consecutive_failures: max_failures,
            reconnect_delay: Duration::ZERO,
            health_interval: Duration::from_secs(3600),
        }
    }

    #[test]
    fn read_failures_are_counted_not_fatal() {
        let stop = Arc::new(AtomicBool::new(false));
        let mut frame_loop = FrameLoop::new(
            FlakySource::new(2),
            PipelineState::default(),
            TuningStore::default(),
            quick_policy(5),
            stop,
        );
        assert!(frame_loop.step().is_none());
        assert!(frame_loop.step().is_none());
        let report = frame_loop.step().unwrap();
        assert_eq!(report.sequence, 1);
        assert_eq!(frame_loop.stats().read_failures, 2);
        assert_eq!(frame_loop.stats().reconnects, 0);
        assert_eq!(frame_loop.source().connects, 1);
    }

    #[test]
    fn failure_run_triggers_reconnect() {
        let stop = Arc::new(AtomicBool::new(false));
        let mut frame_loop = FrameLoop::new(
            FlakySource::new(3),
            PipelineState::default(),
            TuningStore::default(),
            quick_policy(3),
            stop,
        );
        for _ in 0..3 {
            assert!(frame_loop.step().is_none());
        }
        assert_eq!(frame_loop.stats().reconnects, 1);
        // The next step reconnects, and the fresh connection fails again.
        assert!(frame_loop.step().is_none());
        assert_eq!(frame_loop.source().connects, 2);
    }

    #[test]
    fn run_stops_on_flag() {
        let stop = Arc::new(AtomicBool::new(false));
        let mut frame_loop = FrameLoop::new(
            FlakySource::new(0),
            PipelineState::default(),
            TuningStore::default(),
            quick_policy(3),
            stop.clone(),
        );
        let mut seen = 0;
        let stats = frame_loop.run(&HitOutput::Disabled, |_| {
            seen += 1;
            if seen == 10 {
                stop.store(true, Ordering::SeqCst);
            }
        });
        assert_eq!(stats.frames_processed, 10);
        assert_eq!(seen, 10);
    }
}
