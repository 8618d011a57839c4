//! Reconnecting controller writer.
//!
//! `WriterCore` is the synchronous state machine: it owns the link, decides
//! when a (re)connect may be attempted and which tags still need writing.
//! `PlcWriter` drives a core from its own thread, fed by a latest-wins
//! [`WriteQueue`]. Nothing here ever reports an error to the frame loop.

use anyhow::{anyhow, Result};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crate::transport::{Clock, ControllerEndpoint, ControllerLink, HitPair, WriteQueue};

#[derive(Clone, Debug, PartialEq)]
pub struct WriterConfig {
    pub endpoint: ControllerEndpoint,
    /// Output tag per target zone.
    pub tags: [String; 2],
    /// Minimum gap between connect attempts after a failed connect.
    pub reconnect_interval: Duration,
    /// Minimum gap before reconnecting after a failed write.
    pub write_retry_interval: Duration,
    /// How long the worker blocks on the queue per iteration.
    pub poll_timeout: Duration,
    pub shutdown_timeout: Duration,
}

impl WriterConfig {
    pub fn new(endpoint: ControllerEndpoint, tag1: &str, tag2: &str) -> Self {
        Self {
            endpoint,
            tags: [tag1.to_string(), tag2.to_string()],
            reconnect_interval: Duration::from_secs(2),
            write_retry_interval: Duration::from_millis(250),
            poll_timeout: Duration::from_millis(100),
            shutdown_timeout: Duration::from_secs(1),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum WriterState {
    #[default]
    Disconnected,
    Connected,
}

impl fmt::Display for WriterState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WriterState::Disconnected => f.write_str("disconnected"),
            WriterState::Connected => f.write_str("connected"),
        }
    }
}

/// Counters for health logging.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct WriterStatus {
    pub state: WriterState,
    pub writes_ok: u64,
    pub writes_failed: u64,
    pub connect_attempts: u64,
    /// Last value the controller acknowledged per tag.
    pub last_written: [Option<bool>; 2],
}

pub struct WriterCore {
    config: WriterConfig,
    link: Box<dyn ControllerLink>,
    clock: Arc<dyn Clock>,
    desired: Option<HitPair>,
    /// Earliest instant a connect may be attempted.
    next_attempt_at: Option<Instant>,
    /// Tag to try first on the next pass, so one failing tag cannot starve the other.
    first_tag: usize,
    status: WriterStatus,
}

impl WriterCore {
    pub fn new(config: WriterConfig, link: Box<dyn ControllerLink>, clock: Arc<dyn Clock>) -> Self {
        Self {
            config,
            link,
            clock,
            desired: None,
            next_attempt_at: None,
            first_tag: 0,
            status: WriterStatus::default(),
        }
    }

    pub fn state(&self) -> WriterState {
        self.status.state
    }

    pub fn status(&self) -> WriterStatus {
        self.status
    }

    pub fn desired(&self) -> Option<HitPair> {
        self.desired
    }

    pub fn set_desired(&mut self, pair: HitPair) {
        self.desired = Some(pair);
    }

    /// True while some tag's desired value differs from what was last written.
    pub fn has_pending(&self) -> bool {
        match self.desired {
            Some(pair) => (0..2).any(|i| self.status.last_written[i] != Some(pair.get(i))),
            None => false,
        }
    }

    /// Run one connect/write pass against the current desired pair.
    pub fn service(&mut self) {
        let Some(desired) = self.desired else {
            return;
        };
        if !self.has_pending() {
            return;
        }
        if self.status.state == WriterState::Disconnected && !self.try_connect() {
            return;
        }

        for step in 0..2 {
            let index = (self.first_tag + step) % 2;
            let value = desired.get(index);
            if self.status.last_written[index] == Some(value) {
                continue;
            }
            match self.link.write_bool(&self.config.tags[index], value) {
                Ok(()) => {
                    self.status.last_written[index] = Some(value);
                    self.status.writes_ok += 1;
                    log::debug!("plc writer: {} <- {}", self.config.tags[index], value);
                }
                Err(err) => {
                    self.status.writes_failed += 1;
                    log::warn!(
                        "plc writer: write {}={} failed: {:#}",
                        self.config.tags[index],
                        value,
                        err
                    );
                    self.first_tag = (index + 1) % 2;
                    self.disconnect();
                    self.next_attempt_at = Some(self.clock.now() + self.config.write_retry_interval);
                    return;
                }
            }
        }
        self.first_tag = 0;
    }

    fn try_connect(&mut self) -> bool {
        let now = self.clock.now();
        if let Some(at) = self.next_attempt_at {
            if now < at {
                return false;
            }
        }
        self.status.connect_attempts += 1;
        match self.link.connect(&self.config.endpoint) {
            Ok(()) => {
                self.status.state = WriterState::Connected;
                self.next_attempt_at = None;
                log::info!("plc writer: connected to {}", self.config.endpoint);
                true
            }
            Err(err) => {
                self.link.close();
                self.next_attempt_at = Some(now + self.config.reconnect_interval);
                log::warn!(
                    "plc writer: connect to {} failed: {:#} (retry in {:?})",
                    self.config.endpoint,
                    err,
                    self.config.reconnect_interval
                );
                false
            }
        }
    }

    fn disconnect(&mut self) {
        self.link.close();
        if self.status.state == WriterState::Connected {
            log::info!("plc writer: disconnected from {}", self.config.endpoint);
        }
        self.status.state = WriterState::Disconnected;
    }

    pub fn shutdown(&mut self) {
        self.disconnect();
    }
}

/// Background writer thread fed by a latest-wins queue.
pub struct PlcWriter {
    queue: Arc<WriteQueue>,
    status: Arc<Mutex<WriterStatus>>,
    stop: Arc<AtomicBool>,
    done: mpsc::Receiver<()>,
    join: Option<JoinHandle<()>>,
    shutdown_timeout: Duration,
}

impl PlcWriter {
    pub fn spawn(
        config: WriterConfig,
        link: Box<dyn ControllerLink>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        let queue = Arc::new(WriteQueue::new());
        let status = Arc::new(Mutex::new(WriterStatus::default()));
        let stop = Arc::new(AtomicBool::new(false));
        let (done_tx, done) = mpsc::channel();
        let poll_timeout = config.poll_timeout;
        let shutdown_timeout = config.shutdown_timeout;

        let thread_queue = queue.clone();
        let thread_status = status.clone();
        let thread_stop = stop.clone();
        let mut core = WriterCore::new(config, link, clock);
        let join = std::thread::Builder::new()
            .name("plc-writer".to_string())
            .spawn(move || {
                run_writer(&mut core, &thread_queue, &thread_status, &thread_stop, poll_timeout);
                core.shutdown();
                publish(&thread_status, core.status());
                let _ = done_tx.send(());
            })
            .map_err(|err| anyhow!("failed to spawn plc writer thread: {}", err))?;

        Ok(Self {
            queue,
            status,
            stop,
            done,
            join: Some(join),
            shutdown_timeout,
        })
    }

    /// Non-blocking; overwrites any undelivered pair.
    pub fn submit(&self, pair: HitPair) -> bool {
        self.queue.submit(pair)
    }

    pub fn status(&self) -> WriterStatus {
        match self.status.lock() {
            Ok(guard) => *guard,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }

    pub fn queue(&self) -> &WriteQueue {
        &self.queue
    }

    /// Stop the worker and wait up to the configured timeout for it to exit.
    pub fn shutdown(&mut self) {
        let Some(join) = self.join.take() else {
            return;
        };
        self.queue.close();
        self.stop.store(true, Ordering::SeqCst);
        match self.done.recv_timeout(self.shutdown_timeout) {
            Ok(()) | Err(mpsc::RecvTimeoutError::Disconnected) => {
                if join.join().is_err() {
                    log::error!("plc writer thread panicked");
                }
            }
            Err(mpsc::RecvTimeoutError::Timeout) => {
                log::warn!(
                    "plc writer did not stop within {:?}; detaching",
                    self.shutdown_timeout
                );
            }
        }
    }
}

impl Drop for PlcWriter {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn run_writer(
    core: &mut WriterCore,
    queue: &WriteQueue,
    status: &Mutex<WriterStatus>,
    stop: &AtomicBool,
    poll_timeout: Duration,
) {
    while !stop.load(Ordering::SeqCst) {
        if let Some(pair) = queue.take(poll_timeout) {
            if core.desired() != Some(pair) {
                log::debug!("plc writer: desired {:?}", pair);
            }
            core.set_desired(pair);
        }
        if stop.load(Ordering::SeqCst) {
            break;
        }
        core.service();
        publish(status, core.status());
    }
}

fn publish(status: &Mutex<WriterStatus>, next: WriterStatus) {
    match status.lock() {
        Ok(mut guard) => *guard = next,
        Err(poisoned) => *poisoned.into_inner() = next,
    }
}

/// Writer selected at startup: a live controller writer or a no-op.
pub enum HitOutput {
    Plc(PlcWriter),
    Disabled,
}

impl HitOutput {
    pub fn submit(&self, pair: HitPair) {
        if let HitOutput::Plc(writer) = self {
            writer.submit(pair);
        }
    }

    pub fn status(&self) -> Option<WriterStatus> {
        match self {
            HitOutput::Plc(writer) => Some(writer.status()),
            HitOutput::Disabled => None,
        }
    }

    pub fn is_enabled(&self) -> bool {
        matches!(self, HitOutput::Plc(_))
    }

    pub fn shutdown(&mut self) {
        if let HitOutput::Plc(writer) = self {
            writer.shutdown();
        }
    }
}
