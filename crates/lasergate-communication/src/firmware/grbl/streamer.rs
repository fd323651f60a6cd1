//! GRBL Streaming State Machine
//!
//! [`Streamer`] owns every piece of mutable engine state: the command queue,
//! the in-flight ledger, the machine state, progress and position. It is driven
//! by the processing loop with three inputs: control messages from callers,
//! clock ticks ([`Streamer::poll`]) and bytes read from the link
//! ([`Streamer::receive`]). It never blocks; the loop decides when to read.
//!
//! Lines are released under character-counting flow control: a line is written
//! only if its transmitted length, added to the bytes already in flight, stays
//! within `rx_buffer_size - 1`.

use super::constants::{
    CYCLE_START, FEED_HOLD, HOME_COMMAND, JOG_CANCEL, MODAL_STATE_COMMAND, PROGRAM_END_MESSAGE,
    SOFT_RESET, STATUS_QUERY, UNLOCK_COMMAND,
};
use super::error_decoder::error_event;
use super::response_parser::{classify, GrblFrame, StatusReport};
use super::utils::{passes_alarm_lock, transmitted_len};
use crate::communication::buffered::{
    CommandQueue, InFlightEntry, InFlightLedger, LineOrigin, QueueItem, QueuedLine,
};
use crate::communication::{Link, StreamConfig};
use lasergate_core::{
    ControllerError, EngineEvent, ErrorCategory, EventDispatcher, JobId, MachineState,
    MachineStatusSnapshot, Position,
};
use std::io;
use std::time::Instant;
use tokio::sync::oneshot;

/// Work sent from the engine handle to the processing loop
#[derive(Debug)]
pub enum Control {
    /// Start a job made of already normalized lines
    Submit {
        /// Identifier handed back to the caller
        job: JobId,
        /// Normalized lines, newline not included
        lines: Vec<String>,
        /// Acceptance or rejection of the job
        reply: oneshot::Sender<Result<(), ControllerError>>,
    },
    /// Queue one normalized manual line
    Enqueue(String),
    /// Feed hold, or resume when already held
    Pause,
    /// Cycle start
    Resume,
    /// Halt and purge
    Stop,
    /// Real-time jog cancel
    JogCancel,
    /// Leave the processing loop
    Shutdown,
}

#[derive(Debug, Clone, Copy)]
struct PendingReset {
    deadline: Instant,
    unlock_after: bool,
    /// Blank lines written after the reset whose `ok` is still owed
    flush_acks: usize,
}

#[derive(Debug, Clone, Copy)]
struct ActiveJob {
    id: JobId,
    total: usize,
    acknowledged: usize,
}

/// Flow-controlled transmitter and run state machine
pub struct Streamer {
    config: StreamConfig,
    events: EventDispatcher,
    queue: CommandQueue,
    ledger: InFlightLedger,
    state: MachineState,
    job: Option<ActiveJob>,
    progress: f64,
    status_line: String,
    position: Option<Position>,
    /// Set by a `WaitIdle` sentinel, cleared by an idle report with nothing in flight
    waiting_for_idle: bool,
    awaiting_status: bool,
    pending_reset: Option<PendingReset>,
    /// Set while flush acknowledgements are owed; the queue stays closed until then
    flush_deadline: Option<Instant>,
    last_status_poll: Option<Instant>,
    last_modal_poll: Instant,
    partial: Vec<u8>,
}

impl Streamer {
    /// Create the state machine for a freshly opened link
    ///
    /// The link was just reset by the DTR pulse, so a banner is expected and
    /// nothing is released until it arrives or `reset_timeout` elapses.
    pub fn new(config: StreamConfig, events: EventDispatcher, now: Instant) -> Self {
        let ledger = InFlightLedger::new(config.rx_buffer_size);
        let pending_reset = Some(PendingReset {
            deadline: now + config.reset_timeout,
            unlock_after: false,
            flush_acks: 0,
        });

        Self {
            config,
            events,
            queue: CommandQueue::new(),
            ledger,
            state: MachineState::Idle,
            job: None,
            progress: 0.0,
            status_line: String::new(),
            position: None,
            waiting_for_idle: false,
            awaiting_status: false,
            pending_reset,
            flush_deadline: None,
            last_status_poll: None,
            last_modal_poll: now,
            partial: Vec::new(),
        }
    }

    /// Account for `count` blank lines written to flush the firmware after
    /// the open-time reset
    ///
    /// Each one is answered with an `ok` once the firmware is up. They are
    /// charged to the ledger when the reset completes, and nothing queued is
    /// released until they are acknowledged or `reset_timeout` passes.
    pub fn expect_flush_acks(&mut self, count: usize) {
        if let Some(pending) = self.pending_reset.as_mut() {
            pending.flush_acks = count;
        }
    }

    /// Current machine state
    pub fn state(&self) -> MachineState {
        self.state
    }

    /// Job progress in `[0, 1]`
    pub fn progress(&self) -> f64 {
        self.progress
    }

    /// Bytes currently charged against the firmware receive buffer
    pub fn in_flight_bytes(&self) -> usize {
        self.ledger.bytes()
    }

    /// Unacknowledged lines, oldest first
    pub fn in_flight_lines(&self) -> Vec<String> {
        self.ledger.lines().map(str::to_string).collect()
    }

    /// Copy of the observable state
    pub fn snapshot(&self) -> MachineStatusSnapshot {
        MachineStatusSnapshot {
            state: self.state,
            position: self.position,
            progress: self.progress,
            status_line: self.status_line.clone(),
            queued: self.queue.line_count(),
            in_flight_lines: self.ledger.len(),
            in_flight_bytes: self.ledger.bytes(),
            job: self.job.map(|job| job.id),
        }
    }

    /// Apply one control message; returns `false` on shutdown
    pub fn apply(&mut self, control: Control, link: &mut dyn Link, now: Instant) -> io::Result<bool> {
        match control {
            Control::Submit { job, lines, reply } => {
                let result = self.submit(job, lines);
                if reply.send(result).is_err() {
                    tracing::debug!("Submitter of {} went away before the reply", job);
                }
            }
            Control::Enqueue(line) => self.enqueue(line),
            Control::Pause => self.pause(link)?,
            Control::Resume => self.resume(link)?,
            Control::Stop => self.stop(link, now)?,
            Control::JogCancel => self.jog_cancel(link)?,
            Control::Shutdown => return Ok(false),
        }
        Ok(true)
    }

    /// Queue a job followed by its completion sentinels
    pub fn submit(&mut self, job: JobId, lines: Vec<String>) -> Result<(), ControllerError> {
        match self.state {
            MachineState::Disconnected => return Err(ControllerError::NotConnected),
            MachineState::Alarmed => return Err(ControllerError::Alarmed),
            state if state.has_active_job() => return Err(ControllerError::JobInProgress),
            _ => {}
        }

        tracing::info!("Starting {} with {} lines", job, lines.len());
        self.job = Some(ActiveJob {
            id: job,
            total: lines.len(),
            acknowledged: 0,
        });
        self.set_progress(0.0);

        for line in lines {
            self.events.publish(EngineEvent::Queued(line.clone()));
            self.queue.push(QueueItem::Line(QueuedLine::job(line)));
        }
        self.queue.push(QueueItem::WaitIdle);
        self.queue.push(QueueItem::EndOfJob(job));

        self.set_state(MachineState::Running);
        Ok(())
    }

    /// Queue one manual line behind whatever is already queued
    ///
    /// Motion lines are discarded while alarmed; the firmware would reject
    /// them and they would sit ahead of the unlock.
    pub fn enqueue(&mut self, line: String) {
        if self.state == MachineState::Alarmed && !passes_alarm_lock(&line) {
            tracing::warn!("Discarding {} while alarmed", line);
            return;
        }
        self.events.publish(EngineEvent::Queued(line.clone()));
        self.queue.push(QueueItem::Line(QueuedLine::manual(line)));
    }

    /// Feed hold while running, resume while paused
    pub fn pause(&mut self, link: &mut dyn Link) -> io::Result<()> {
        match self.state {
            MachineState::Running => {
                tracing::info!("Pausing");
                link.write(&[FEED_HOLD])?;
                self.set_state(MachineState::Paused);
            }
            MachineState::Paused => self.resume(link)?,
            state => tracing::debug!("Pause ignored in state {}", state),
        }
        Ok(())
    }

    /// Cycle start
    pub fn resume(&mut self, link: &mut dyn Link) -> io::Result<()> {
        link.write(&[CYCLE_START])?;
        if self.state == MachineState::Paused {
            tracing::info!("Resuming");
            self.set_state(MachineState::Running);
        }
        Ok(())
    }

    /// Halt motion, reset the firmware and purge all local bookkeeping
    ///
    /// The unlock is queued once the reset banner arrives, since the firmware
    /// discards anything received while it restarts.
    pub fn stop(&mut self, link: &mut dyn Link, now: Instant) -> io::Result<()> {
        tracing::info!("Stopping and purging the controller");
        link.write(&[FEED_HOLD])?;
        link.write(&[SOFT_RESET])?;
        self.purge();
        self.pending_reset = Some(PendingReset {
            deadline: now + self.config.reset_timeout,
            unlock_after: true,
            flush_acks: 0,
        });
        self.set_state(MachineState::Idle);
        Ok(())
    }

    /// Real-time jog cancel, written regardless of queue state
    pub fn jog_cancel(&mut self, link: &mut dyn Link) -> io::Result<()> {
        link.write(&[JOG_CANCEL])
    }

    /// The link failed; drop everything
    pub fn disconnect(&mut self) {
        self.purge();
        self.pending_reset = None;
        self.awaiting_status = false;
        self.partial.clear();
        self.set_state(MachineState::Disconnected);
        self.events.publish(EngineEvent::Disconnected);
    }

    /// True when the next poll would release a line or a sentinel
    pub fn ready_to_send(&self) -> bool {
        if !self.gate_open() {
            return false;
        }
        match self.queue.front() {
            Some(QueueItem::Line(line)) => self.can_release(line),
            Some(_) => true,
            None => false,
        }
    }

    /// Periodic work: reset timeout, status poll, modal refresh, and at most
    /// one queued line
    pub fn poll(&mut self, link: &mut dyn Link, now: Instant) -> io::Result<()> {
        if let Some(pending) = self.pending_reset {
            if now >= pending.deadline {
                tracing::warn!("No reset banner within {:?}, continuing", self.config.reset_timeout);
                self.finish_reset(now);
            }
        }

        if self.flush_deadline.is_some_and(|deadline| now >= deadline) {
            let dropped = self.ledger.discard(LineOrigin::Flush);
            tracing::warn!("{} flush acknowledgements never arrived, continuing", dropped);
            self.flush_deadline = None;
        }

        let poll_due = self
            .last_status_poll
            .map_or(true, |last| now.duration_since(last) >= self.config.status_poll);
        if poll_due {
            link.write(&[STATUS_QUERY])?;
            self.awaiting_status = true;
            self.last_status_poll = Some(now);
        }

        self.transmit(link)?;
        self.refresh_modal_state(link, now)
    }

    /// Feed bytes read from the link; complete lines are handled in order
    pub fn receive(&mut self, bytes: &[u8], link: &mut dyn Link, now: Instant) -> io::Result<()> {
        self.partial.extend_from_slice(bytes);

        while let Some(end) = self.partial.iter().position(|&b| b == b'\n') {
            let raw: Vec<u8> = self.partial.drain(..=end).collect();
            let line = String::from_utf8_lossy(&raw);
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            tracing::debug!("<< {}", line);
            self.handle_line(line, link, now)?;
        }
        Ok(())
    }

    fn gate_open(&self) -> bool {
        self.state != MachineState::Paused
            && self.pending_reset.is_none()
            && self.flush_deadline.is_none()
            && !self.waiting_for_idle
    }

    fn can_release(&self, line: &QueuedLine) -> bool {
        (self.state != MachineState::Alarmed || passes_alarm_lock(&line.text))
            && self.ledger.can_accept(transmitted_len(&line.text))
    }

    fn transmit(&mut self, link: &mut dyn Link) -> io::Result<()> {
        while self.gate_open() {
            match self.queue.front() {
                Some(QueueItem::WaitIdle) => {
                    self.queue.pop();
                    tracing::debug!("Waiting for the machine to go idle");
                    self.waiting_for_idle = true;
                }
                Some(QueueItem::EndOfJob(id)) => {
                    let id = *id;
                    self.queue.pop();
                    if self.job.is_some_and(|job| job.id == id) {
                        self.complete_job();
                    }
                }
                Some(QueueItem::Line(line)) if self.can_release(line) => {
                    if let Some(QueueItem::Line(line)) = self.queue.pop() {
                        self.write_line(link, line.text, line.origin)?;
                    }
                    break;
                }
                _ => break,
            }
        }
        Ok(())
    }

    fn write_line(&mut self, link: &mut dyn Link, text: String, origin: LineOrigin) -> io::Result<()> {
        let len = transmitted_len(&text);
        let mut bytes = Vec::with_capacity(len);
        bytes.extend_from_slice(text.as_bytes());
        bytes.push(b'\n');

        self.ledger.push(InFlightEntry {
            line: text.clone(),
            len,
            origin,
        });
        link.write(&bytes)?;
        tracing::debug!(">> {} ({} bytes in flight)", text, self.ledger.bytes());
        self.events.publish(EngineEvent::Sent(text));
        Ok(())
    }

    fn refresh_modal_state(&mut self, link: &mut dyn Link, now: Instant) -> io::Result<()> {
        let due = now.duration_since(self.last_modal_poll) >= self.config.modal_poll;
        if due
            && self.state == MachineState::Idle
            && self.job.is_none()
            && self.pending_reset.is_none()
            && self.flush_deadline.is_none()
            && self.ledger.can_accept(transmitted_len(MODAL_STATE_COMMAND))
        {
            self.last_modal_poll = now;
            self.write_line(link, MODAL_STATE_COMMAND.to_string(), LineOrigin::ModalRefresh)?;
        }
        Ok(())
    }

    fn handle_line(&mut self, line: &str, link: &mut dyn Link, now: Instant) -> io::Result<()> {
        match classify(line) {
            GrblFrame::StatusReport(report) => self.on_status(report),
            GrblFrame::Ack => self.on_ack(),
            GrblFrame::Error(code) => {
                let event = error_event(ErrorCategory::Error, code);
                let dropped = self.ledger.acknowledge();
                if !self.ledger.contains(LineOrigin::Flush) {
                    self.flush_deadline = None;
                }
                tracing::warn!(
                    "Firmware {} for {:?}",
                    event,
                    dropped.as_ref().map(|entry| entry.line.as_str())
                );
                self.set_status_line(event.to_string());
                self.events.publish(EngineEvent::ErrorRaised(event));
                if self.job.is_some() {
                    tracing::warn!("Aborting job after firmware error");
                    self.stop(link, now)?;
                }
            }
            GrblFrame::Alarm(code) => {
                let event = error_event(ErrorCategory::Alarm, code);
                tracing::error!("Firmware {}", event);
                self.set_status_line(event.to_string());
                self.events.publish(EngineEvent::ErrorRaised(event));
                self.queue.clear();
                self.ledger.clear();
                self.flush_deadline = None;
                self.enter_alarm();
            }
            GrblFrame::Message(text) => {
                let program_end = text.contains(PROGRAM_END_MESSAGE);
                self.events.publish(EngineEvent::Message(text));
                if program_end {
                    self.complete_job();
                }
            }
            GrblFrame::ResetBanner(banner) => {
                tracing::info!("Firmware reset: {}", banner);
                self.set_status_line(banner);
                if self.pending_reset.is_some() {
                    self.finish_reset(now);
                } else {
                    tracing::warn!("Unexpected firmware reset, purging");
                    self.stop(link, now)?;
                }
            }
            GrblFrame::Unrecognized(text) => tracing::debug!("Unrecognized line: {}", text),
        }
        Ok(())
    }

    fn on_status(&mut self, report: StatusReport) {
        if !self.awaiting_status {
            tracing::debug!("Unsolicited status report: {}", report.state);
        }
        self.awaiting_status = false;

        if let Some(position) = report.machine_pos {
            self.position = Some(position);
            self.events.publish(EngineEvent::PositionUpdated(position));
        }

        if report.is_alarm() && self.state.is_connected() && self.state != MachineState::Alarmed {
            // In-flight lines still get their ok, so only the queue is filtered
            self.queue.retain_lines(|line| passes_alarm_lock(&line.text));
            self.enter_alarm();
        }

        if self.waiting_for_idle && report.is_idle() && self.ledger.is_empty() {
            tracing::debug!("Machine idle, releasing queue");
            self.waiting_for_idle = false;
        }

        self.set_status_line(report.state);
    }

    fn on_ack(&mut self) {
        let Some(entry) = self.ledger.acknowledge() else {
            tracing::debug!("Acknowledgement with nothing in flight");
            return;
        };

        if entry.origin == LineOrigin::Flush {
            if !self.ledger.contains(LineOrigin::Flush) {
                tracing::debug!("Firmware flushed, releasing queue");
                self.flush_deadline = None;
            }
            return;
        }

        if entry.origin == LineOrigin::Job {
            let progress = self.job.as_mut().map(|job| {
                job.acknowledged += 1;
                job.acknowledged as f64 / job.total.max(1) as f64
            });
            if let Some(progress) = progress {
                self.set_progress(progress.min(1.0));
            }
        }

        if self.state == MachineState::Alarmed
            && (entry.line == UNLOCK_COMMAND || entry.line == HOME_COMMAND)
        {
            tracing::info!("Alarm cleared by {}", entry.line);
            self.set_state(MachineState::Idle);
        }

        self.events.publish(EngineEvent::Ack(entry.line));
    }

    fn finish_reset(&mut self, now: Instant) {
        let Some(pending) = self.pending_reset.take() else {
            return;
        };
        self.ledger.clear();
        self.waiting_for_idle = false;
        self.last_modal_poll = now;
        if pending.flush_acks > 0 {
            for _ in 0..pending.flush_acks {
                self.ledger.push(InFlightEntry {
                    line: String::new(),
                    len: 1,
                    origin: LineOrigin::Flush,
                });
            }
            self.flush_deadline = Some(now + self.config.reset_timeout);
        }
        if pending.unlock_after {
            self.queue
                .push_front(QueueItem::Line(QueuedLine::manual(UNLOCK_COMMAND)));
            self.events
                .publish(EngineEvent::Queued(UNLOCK_COMMAND.to_string()));
        }
    }

    fn complete_job(&mut self) {
        let Some(job) = self.job.take() else {
            return;
        };
        tracing::info!("{} complete", job.id);
        self.set_progress(1.0);
        self.events.publish(EngineEvent::JobCompleted(job.id));
        if self.state.has_active_job() {
            self.set_state(MachineState::Idle);
        }
    }

    fn enter_alarm(&mut self) {
        self.waiting_for_idle = false;
        self.job = None;
        self.set_state(MachineState::Alarmed);
    }

    fn purge(&mut self) {
        self.queue.clear();
        self.ledger.clear();
        self.flush_deadline = None;
        self.waiting_for_idle = false;
        self.job = None;
        self.set_progress(0.0);
    }

    fn set_state(&mut self, state: MachineState) {
        if self.state != state {
            tracing::info!("State {} -> {}", self.state, state);
            self.state = state;
            self.events.publish(EngineEvent::StateChanged(state));
        }
    }

    fn set_progress(&mut self, progress: f64) {
        if (self.progress - progress).abs() > f64::EPSILON {
            self.progress = progress;
            self.events.publish(EngineEvent::ProgressChanged(progress));
        }
    }

    fn set_status_line(&mut self, status: String) {
        if self.status_line != status {
            self.status_line = status.clone();
            self.events.publish(EngineEvent::StatusChanged(status));
        }
    }
}
