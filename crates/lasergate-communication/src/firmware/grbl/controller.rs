//! GRBL Engine Handle
//!
//! [`GrblEngine`] is the control surface used by front-ends. Opening a link
//! starts one processing loop on the blocking pool; the loop owns the link and
//! the [`Streamer`] for the whole session. Callers never touch either: they
//! send [`Control`] messages and read the published snapshot.

use super::constants::{FLUSH_SEQUENCE, HOME_COMMAND, UNLOCK_COMMAND};
use super::streamer::{Control, Streamer};
use super::utils::{jog_command, normalize_line, passes_alarm_lock, transmitted_len};
use crate::communication::serial::SerialLink;
use crate::communication::{ConnectionParams, Link, StreamConfig};
use lasergate_core::{
    ConnectionError, ControllerError, EngineEvent, Error, EventDispatcher, JobId, JobSource,
    MachineState, MachineStatusSnapshot, Position, Result,
};
use parking_lot::Mutex;
use std::io;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc::error::TryRecvError;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;

/// Bytes requested from the link per read
const READ_CHUNK: usize = 256;

struct Session {
    port: String,
    control: mpsc::UnboundedSender<Control>,
    /// Hands the link back once the loop has stopped
    worker: JoinHandle<Box<dyn Link>>,
}

/// Streaming engine for one GRBL controller
pub struct GrblEngine {
    config: StreamConfig,
    events: EventDispatcher,
    status: Arc<watch::Sender<MachineStatusSnapshot>>,
    session: Mutex<Option<Session>>,
}

impl GrblEngine {
    /// Create a disconnected engine
    pub fn new(config: StreamConfig) -> Self {
        let (status, _) = watch::channel(MachineStatusSnapshot::default());
        Self {
            config,
            events: EventDispatcher::default(),
            status: Arc::new(status),
            session: Mutex::new(None),
        }
    }

    /// Subscribe to engine events
    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.events.subscribe()
    }

    /// Watch the published snapshot
    pub fn watch(&self) -> watch::Receiver<MachineStatusSnapshot> {
        self.status.subscribe()
    }

    /// Copy of the latest published snapshot
    pub fn snapshot(&self) -> MachineStatusSnapshot {
        self.status.borrow().clone()
    }

    pub fn state(&self) -> MachineState {
        self.status.borrow().state
    }

    pub fn position(&self) -> Option<Position> {
        self.status.borrow().position
    }

    pub fn progress(&self) -> f64 {
        self.status.borrow().progress
    }

    pub fn status_line(&self) -> String {
        self.status.borrow().status_line.clone()
    }

    /// True while a processing loop is running
    pub fn is_connected(&self) -> bool {
        self.session
            .lock()
            .as_ref()
            .is_some_and(|session| !session.worker.is_finished())
    }

    /// Open a serial port and start streaming
    pub async fn open(&self, params: &ConnectionParams) -> Result<()> {
        self.config.validate()?;
        self.ensure_closed()?;
        let params = params.clone();
        let link = tokio::task::spawn_blocking(move || SerialLink::open(&params))
            .await
            .map_err(|e| Error::other(format!("Serial open task failed: {}", e)))??;
        self.open_with_link(Box::new(link)).await
    }

    /// Start streaming over an already opened link
    ///
    /// Pulses DTR to hardware-reset the controller, flushes its input with two
    /// newlines and hands the link to a new processing loop. Fails with
    /// `InvalidParameters` if the stream configuration cannot work.
    pub async fn open_with_link(&self, mut link: Box<dyn Link>) -> Result<()> {
        self.config.validate()?;
        self.ensure_closed()?;
        let port = link.name();
        tracing::info!("Opening {}", port);

        let pulse = self.config.reset_pulse;
        if let Err(e) = link.set_dtr(false) {
            tracing::debug!("DTR not supported on {}: {}", port, e);
        }
        tokio::time::sleep(pulse).await;
        if let Err(e) = link.set_dtr(true) {
            tracing::debug!("DTR not supported on {}: {}", port, e);
        }
        tokio::time::sleep(pulse).await;

        link.write(FLUSH_SEQUENCE).map_err(|e| ConnectionError::FailedToOpen {
            port: port.clone(),
            reason: e.to_string(),
        })?;

        let mut slot = self.session.lock();
        if slot.as_ref().is_some_and(|s| !s.worker.is_finished()) {
            return Err(ControllerError::AlreadyConnected.into());
        }

        let mut streamer =
            Streamer::new(self.config.clone(), self.events.clone(), Instant::now());
        streamer.expect_flush_acks(FLUSH_SEQUENCE.iter().filter(|&&b| b == b'\n').count());
        self.status.send_replace(streamer.snapshot());

        let (control, control_rx) = mpsc::unbounded_channel();
        let status = Arc::clone(&self.status);
        let worker =
            tokio::task::spawn_blocking(move || run_worker(link, streamer, control_rx, status));

        *slot = Some(Session {
            port: port.clone(),
            control,
            worker,
        });
        drop(slot);

        self.events.publish(EngineEvent::Connected(port));
        Ok(())
    }

    /// Stop and purge, end the processing loop, then release the link
    ///
    /// Closing a disconnected engine is a no-op.
    pub async fn close(&self) -> Result<()> {
        let Some(session) = self.session.lock().take() else {
            return Ok(());
        };

        if session.control.send(Control::Stop).is_err()
            || session.control.send(Control::Shutdown).is_err()
        {
            tracing::debug!("Processing loop for {} already stopped", session.port);
        }

        let link = session
            .worker
            .await
            .map_err(|e| Error::other(format!("Processing loop for {} failed: {}", session.port, e)))?;
        drop(link);
        tracing::info!("Closed {}", session.port);
        Ok(())
    }

    /// Normalize and submit a job
    ///
    /// Lines empty after normalization are dropped. Fails before anything is
    /// queued if any line can never fit in the receive buffer, or if the
    /// machine is alarmed or already running a job.
    pub async fn submit(&self, lines: Vec<String>) -> Result<JobId> {
        let max = self.config.max_line_len();
        let mut normalized = Vec::with_capacity(lines.len());
        for raw in &lines {
            if let Some(line) = normalize_line(raw) {
                let len = transmitted_len(&line);
                if len > max {
                    return Err(ControllerError::LineTooLong { line, len, max }.into());
                }
                normalized.push(line);
            }
        }

        let job = JobId::new();
        let (reply, accepted) = oneshot::channel();
        self.send(Control::Submit {
            job,
            lines: normalized,
            reply,
        })?;
        accepted
            .await
            .map_err(|_| ControllerError::WorkerStopped)??;
        Ok(job)
    }

    /// Read every line from `source` and submit them as one job
    pub async fn submit_job(&self, source: &mut dyn JobSource) -> Result<JobId> {
        let lines = source.lines()?;
        tracing::info!("Submitting {} ({} lines)", source.name(), lines.len());
        self.submit(lines).await
    }

    /// Queue one manual command line
    pub fn send_command(&self, raw: &str) -> Result<()> {
        let line = normalize_line(raw).ok_or_else(|| ControllerError::InvalidCommand {
            reason: "command is empty".to_string(),
        })?;

        let len = transmitted_len(&line);
        let max = self.config.max_line_len();
        if len > max {
            return Err(ControllerError::LineTooLong { line, len, max }.into());
        }
        if self.state() == MachineState::Alarmed && !passes_alarm_lock(&line) {
            return Err(ControllerError::Alarmed.into());
        }

        self.send(Control::Enqueue(line))
    }

    /// Feed hold; toggles back to running when already paused
    pub fn pause(&self) -> Result<()> {
        self.send(Control::Pause)
    }

    pub fn resume(&self) -> Result<()> {
        self.send(Control::Resume)
    }

    /// Halt, soft-reset and purge everything queued or in flight
    pub fn stop(&self) -> Result<()> {
        self.send(Control::Stop)
    }

    pub fn home(&self) -> Result<()> {
        self.send_command(HOME_COMMAND)
    }

    /// Clear an alarm lock
    pub fn unlock(&self) -> Result<()> {
        self.send_command(UNLOCK_COMMAND)
    }

    /// Relative XY jog at `feed` units per minute
    pub fn jog(&self, dx: f64, dy: f64, feed: f64) -> Result<()> {
        if !(dx.is_finite() && dy.is_finite()) {
            return Err(ControllerError::InvalidCommand {
                reason: format!("jog distance ({}, {}) is not finite", dx, dy),
            }
            .into());
        }
        if !(feed.is_finite() && feed > 0.0) {
            return Err(ControllerError::InvalidCommand {
                reason: format!("jog feed {} must be positive", feed),
            }
            .into());
        }
        self.send_command(&jog_command(dx, dy, feed))
    }

    /// Cancel a jog immediately, ahead of anything queued
    pub fn jog_cancel(&self) -> Result<()> {
        self.send(Control::JogCancel)
    }

    fn send(&self, control: Control) -> Result<()> {
        let slot = self.session.lock();
        let session = slot.as_ref().ok_or(ControllerError::NotConnected)?;
        session
            .control
            .send(control)
            .map_err(|_| ControllerError::WorkerStopped)?;
        Ok(())
    }

    /// Fail if a live session exists; forget a session whose loop has exited
    fn ensure_closed(&self) -> Result<()> {
        let mut slot = self.session.lock();
        match slot.as_ref() {
            Some(session) if !session.worker.is_finished() => {
                Err(ControllerError::AlreadyConnected.into())
            }
            Some(session) => {
                tracing::debug!("Reaping stopped processing loop for {}", session.port);
                *slot = None;
                Ok(())
            }
            None => Ok(()),
        }
    }
}

impl Default for GrblEngine {
    fn default() -> Self {
        Self::new(StreamConfig::default())
    }
}

impl Drop for GrblEngine {
    fn drop(&mut self) {
        if let Some(session) = self.session.get_mut().take() {
            if session.control.send(Control::Shutdown).is_err() {
                tracing::debug!("Processing loop for {} already stopped", session.port);
            }
        }
    }
}

/// Processing loop body; returns the link once the loop has stopped
fn run_worker(
    mut link: Box<dyn Link>,
    mut streamer: Streamer,
    mut control: mpsc::UnboundedReceiver<Control>,
    status: Arc<watch::Sender<MachineStatusSnapshot>>,
) -> Box<dyn Link> {
    let port = link.name();
    match process(link.as_mut(), &mut streamer, &mut control, &status) {
        Ok(()) => tracing::info!("Processing loop for {} stopped", port),
        Err(e) => tracing::error!("Connection to {} lost: {}", port, e),
    }

    streamer.disconnect();
    publish(&status, streamer.snapshot());
    link
}

fn process(
    link: &mut dyn Link,
    streamer: &mut Streamer,
    control: &mut mpsc::UnboundedReceiver<Control>,
    status: &watch::Sender<MachineStatusSnapshot>,
) -> io::Result<()> {
    let mut buf = [0u8; READ_CHUNK];

    loop {
        loop {
            match control.try_recv() {
                Ok(message) => {
                    if !streamer.apply(message, link, Instant::now())? {
                        return Ok(());
                    }
                }
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => return Ok(()),
            }
        }

        streamer.poll(link, Instant::now())?;

        if link.bytes_to_read()? > 0 || !streamer.ready_to_send() {
            let n = link.read(&mut buf)?;
            if n > 0 {
                streamer.receive(&buf[..n], link, Instant::now())?;
            }
        }

        publish(status, streamer.snapshot());
    }
}

fn publish(status: &watch::Sender<MachineStatusSnapshot>, snapshot: MachineStatusSnapshot) {
    status.send_if_modified(|current| {
        if *current == snapshot {
            false
        } else {
            *current = snapshot;
            true
        }
    });
}
