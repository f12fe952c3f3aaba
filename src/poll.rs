//! Asynchronous job tracking: bounded attempts, capped linear backoff,
//! cooperative cancellation.
//!
//! The poller is split in two. [`PollMachine`] is the pure transition core
//! (phase, attempt accounting, and the delay schedule) with no timers or IO,
//! so every transition is testable synchronously. [`StatusPoller`] is the
//! async driver: it owns the tokio task that issues sequential status
//! requests through [`ResumesClient`] and publishes [`PollSnapshot`] values
//! over a watch channel for callers to observe reactively.
//!
//! Within one poll, attempts are strictly sequential: attempt N+1 is never
//! issued before attempt N's response (or cancellation) is observed.

use std::{
    fmt,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};

use tokio::{sync::watch, task::JoinHandle};

use crate::{
    errors::{Result, ValidationError},
    identifiers::ResumeId,
    resumes::{ResumeStatus, ResumeStatusReport, ResumesClient},
    telemetry::PollAttemptMetrics,
};

/// Message recorded when the attempt budget runs out.
pub const TIMEOUT_MESSAGE: &str = "Resume generation timed out";

/// Fallback when the server reports an error without a message.
const GENERIC_FAILURE: &str = "Resume generation failed";

/// Tuning for one tracking session. All fields are caller-overridable; the
/// defaults match the web frontend's cadence.
#[derive(Debug, Clone)]
pub struct PollConfig {
    /// Floor delay between consecutive attempts.
    pub base_interval: Duration,
    /// Additional delay accrued per completed attempt.
    pub step_increment: Duration,
    /// Ceiling on the accrued (non-floor) part of the delay.
    pub max_backoff_cap: Duration,
    /// Total number of status requests before the poll times out.
    pub max_attempts: u32,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            base_interval: Duration::from_millis(1500),
            step_increment: Duration::from_millis(200),
            max_backoff_cap: Duration::from_millis(3000),
            max_attempts: 40,
        }
    }
}

/// Phase of a tracking session. `Idle` is initial; `Processing` is the only
/// running phase; the remaining four are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PollPhase {
    Idle,
    Processing,
    Complete,
    Error,
    TimedOut,
    Aborted,
}

impl PollPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            PollPhase::Idle => "idle",
            PollPhase::Processing => "processing",
            PollPhase::Complete => "complete",
            PollPhase::Error => "error",
            PollPhase::TimedOut => "timed_out",
            PollPhase::Aborted => "aborted",
        }
    }

    /// Whether the poll will make no further progress without a new `start`.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            PollPhase::Complete | PollPhase::Error | PollPhase::TimedOut | PollPhase::Aborted
        )
    }
}

impl fmt::Display for PollPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Outcome of folding one observation into the machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollVerdict {
    /// Keep polling; wait this long before the next attempt.
    Continue(Duration),
    /// The poll settled in a terminal phase.
    Settled {
        phase: PollPhase,
        error: Option<String>,
    },
}

/// Pure transition core of the poller.
///
/// Invariants: `attempts` never exceeds `config.max_attempts`; a terminal
/// phase is only left via [`PollMachine::begin`].
#[derive(Debug, Clone)]
pub struct PollMachine {
    config: PollConfig,
    phase: PollPhase,
    attempts: u32,
}

impl PollMachine {
    pub fn new(config: PollConfig) -> Self {
        Self {
            config,
            phase: PollPhase::Idle,
            attempts: 0,
        }
    }

    /// Reset for a fresh session: attempts to zero, phase to `Processing`.
    pub fn begin(&mut self) {
        self.phase = PollPhase::Processing;
        self.attempts = 0;
    }

    pub fn phase(&self) -> PollPhase {
        self.phase
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn budget_exhausted(&self) -> bool {
        self.attempts >= self.config.max_attempts
    }

    /// Delay between attempt k and k+1:
    /// `base_interval + min(k * step_increment, max_backoff_cap)`.
    /// Monotonically non-decreasing in k up to the cap.
    pub fn next_delay(&self) -> Duration {
        let accrued = self.config.step_increment.saturating_mul(self.attempts);
        self.config.base_interval + accrued.min(self.config.max_backoff_cap)
    }

    /// Account for one issued request; returns the 1-indexed attempt number.
    pub fn record_attempt(&mut self) -> u32 {
        self.attempts += 1;
        self.attempts
    }

    /// Fold a status report into the machine.
    pub fn observe(&mut self, report: &ResumeStatusReport) -> PollVerdict {
        match &report.status {
            ResumeStatus::Complete => {
                self.phase = PollPhase::Complete;
                PollVerdict::Settled {
                    phase: PollPhase::Complete,
                    error: None,
                }
            }
            ResumeStatus::Error => {
                let message = report
                    .error_message
                    .clone()
                    .unwrap_or_else(|| GENERIC_FAILURE.to_string());
                self.phase = PollPhase::Error;
                PollVerdict::Settled {
                    phase: PollPhase::Error,
                    error: Some(message),
                }
            }
            // Every other status (including unknown ones) means the job is
            // still in flight.
            _ => {
                if self.budget_exhausted() {
                    self.phase = PollPhase::TimedOut;
                    PollVerdict::Settled {
                        phase: PollPhase::TimedOut,
                        error: Some(TIMEOUT_MESSAGE.to_string()),
                    }
                } else {
                    PollVerdict::Continue(self.next_delay())
                }
            }
        }
    }

    /// A failed check ends the poll; checks are never individually retried.
    pub fn fail(&mut self, message: impl Into<String>) -> PollVerdict {
        self.phase = PollPhase::Error;
        PollVerdict::Settled {
            phase: PollPhase::Error,
            error: Some(message.into()),
        }
    }

    /// Caller-initiated cancellation; keeps a terminal phase if one was
    /// already reached.
    pub fn abort(&mut self) {
        if !self.phase.is_terminal() {
            self.phase = PollPhase::Aborted;
        }
    }
}

/// Observable state of a poll, published on every change.
#[derive(Debug, Clone)]
pub struct PollSnapshot {
    pub resume_id: ResumeId,
    pub phase: PollPhase,
    /// Requests issued so far in this session.
    pub attempts: u32,
    /// Last successfully decoded report, replaced wholesale per response.
    pub last_report: Option<ResumeStatusReport>,
    /// Set on terminal failure paths only; cancellation never writes it.
    pub last_error: Option<String>,
}

impl PollSnapshot {
    pub fn is_terminal(&self) -> bool {
        self.phase.is_terminal()
    }
}

struct PollerShared {
    client: ResumesClient,
    resume_id: ResumeId,
    config: PollConfig,
    running: AtomicBool,
    snapshot: watch::Sender<PollSnapshot>,
    task: Mutex<Option<JoinHandle<()>>>,
}

/// Handle to one tracking session.
///
/// `start` is a no-op while a session is running; `stop` is idempotent and
/// cancels the in-flight request along with any scheduled retry. Dropping
/// the handle stops the poll, so no timer or request outlives the owner.
pub struct StatusPoller {
    shared: Arc<PollerShared>,
}

impl std::fmt::Debug for StatusPoller {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StatusPoller").finish_non_exhaustive()
    }
}

impl StatusPoller {
    pub fn new(client: ResumesClient, resume_id: ResumeId, config: PollConfig) -> Result<Self> {
        if resume_id.is_nil() {
            return Err(ValidationError::new("resume_id is required")
                .with_field("resume_id")
                .into());
        }
        let (snapshot, _) = watch::channel(PollSnapshot {
            resume_id,
            phase: PollPhase::Idle,
            attempts: 0,
            last_report: None,
            last_error: None,
        });
        Ok(Self {
            shared: Arc::new(PollerShared {
                client,
                resume_id,
                config,
                running: AtomicBool::new(false),
                snapshot,
                task: Mutex::new(None),
            }),
        })
    }

    /// Begin (or restart after a terminal phase) the polling loop. The first
    /// request is issued immediately, with no initial delay.
    pub fn start(&self) {
        if self.shared.running.swap(true, Ordering::SeqCst) {
            return;
        }
        self.shared.snapshot.send_replace(PollSnapshot {
            resume_id: self.shared.resume_id,
            phase: PollPhase::Processing,
            attempts: 0,
            last_report: None,
            last_error: None,
        });
        let shared = self.shared.clone();
        let handle = tokio::spawn(drive(shared));
        *self.shared.task.lock().expect("poller task lock poisoned") = Some(handle);
    }

    /// Cancel the session. Safe to call from any state, any number of times,
    /// including before `start` or after natural completion.
    pub fn stop(&self) {
        let was_running = self.shared.running.swap(false, Ordering::SeqCst);
        if let Some(handle) = self
            .shared
            .task
            .lock()
            .expect("poller task lock poisoned")
            .take()
        {
            handle.abort();
        }
        if was_running {
            self.shared.snapshot.send_modify(|snap| {
                if !snap.phase.is_terminal() {
                    snap.phase = PollPhase::Aborted;
                }
            });
        }
    }

    /// Current state of the poll.
    pub fn snapshot(&self) -> PollSnapshot {
        self.shared.snapshot.borrow().clone()
    }

    /// Whether a session is currently running. False before `start`, after
    /// any terminal phase, and after `stop`.
    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::SeqCst)
    }

    /// Subscribe to state changes.
    pub fn subscribe(&self) -> watch::Receiver<PollSnapshot> {
        self.shared.snapshot.subscribe()
    }

    /// Await the terminal snapshot of the current session. Returns
    /// immediately if the poll has already settled. Waits forever if the
    /// poller was never started.
    pub async fn wait(&self) -> PollSnapshot {
        let mut rx = self.shared.snapshot.subscribe();
        loop {
            {
                let snap = rx.borrow_and_update();
                if snap.is_terminal() {
                    return snap.clone();
                }
            }
            if rx.changed().await.is_err() {
                return self.snapshot();
            }
        }
    }
}

impl Drop for StatusPoller {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn drive(shared: Arc<PollerShared>) {
    let mut machine = PollMachine::new(shared.config.clone());
    machine.begin();

    loop {
        let attempt = machine.record_attempt();
        tracing::debug!(
            resume_id = %shared.resume_id,
            attempt,
            "polling resume status"
        );

        // stop() aborts this task, so both the request await and the sleep
        // below double as cancellation points.
        let verdict = match shared.client.status(shared.resume_id).await {
            Ok(report) => {
                let verdict = machine.observe(&report);
                shared.snapshot.send_modify(|snap| {
                    snap.attempts = attempt;
                    snap.last_report = Some(report);
                });
                verdict
            }
            Err(err) if err.is_cancelled() => return,
            Err(err) => {
                shared.snapshot.send_modify(|snap| {
                    snap.attempts = attempt;
                });
                machine.fail(err.to_string())
            }
        };

        record_attempt_metric(&shared, attempt, machine.phase());

        match verdict {
            PollVerdict::Settled { phase, error } => {
                tracing::debug!(
                    resume_id = %shared.resume_id,
                    attempt,
                    phase = %phase,
                    "poll settled"
                );
                shared.snapshot.send_modify(|snap| {
                    if !snap.phase.is_terminal() {
                        snap.phase = phase;
                        if let Some(message) = error {
                            snap.last_error = Some(message);
                        }
                    }
                });
                shared.running.store(false, Ordering::SeqCst);
                return;
            }
            PollVerdict::Continue(delay) => {
                tokio::time::sleep(delay).await;
            }
        }
    }
}

fn record_attempt_metric(shared: &PollerShared, attempt: u32, phase: PollPhase) {
    let telemetry = &shared.client.inner.telemetry;
    if telemetry.poll_enabled() {
        telemetry.record_poll(PollAttemptMetrics {
            resume_id: shared.resume_id,
            attempt,
            phase,
        });
    }
}
