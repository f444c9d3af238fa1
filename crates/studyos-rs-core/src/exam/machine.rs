//! Proctored exam lifecycle: lock-down, countdown, violations, and results.

use super::denylist::{AnswerDenylist, DENYLIST_REASON};
use super::monitor::{EnvironmentMonitor, EnvironmentSignal, SubscriptionId};
use super::violations::{Violation, ViolationCounter};
use super::{ExamError, PaperSource};
use crate::scoring::{McqScore, format_time, mark_multiple_choice};
use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use studyos_rs_config::ExamConfig;
use studyos_rs_protocol::{
    EventMsg, EventPayload, EventSink, ExamPaper, ExamPhase, FileDocument, SessionId,
};
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use uuid::Uuid;

/// Notice shown when the environment refuses to lock.
pub const LOCK_DENIED_NOTICE: &str =
    "Exam requires Fullscreen mode. Please allow fullscreen to proceed.";
/// Notice shown when no paper could be generated.
pub const GENERATION_FAILED_NOTICE: &str =
    "Could not generate an exam paper. Check your provider settings and try again.";
pub const DISQUALIFIED_NOTICE: &str = "Academic Malpractice Detected";
pub const GRADING_PENDING: &str = "Grading Pending";
pub const CLEAN_SESSION: &str = "Clean session. No behavioral anomalies detected.";

/// Read-only summary shown after submission or timeout.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ExamResults {
    pub title: String,
    pub grading_status: String,
    /// Clean-session confirmation or behavioral-flag disclosure.
    pub integrity_report: String,
    pub violations: u32,
    pub timed_out: bool,
    pub mcq: McqScore,
}

/// Point-in-time view of the machine.
#[derive(Debug, Clone, Serialize)]
pub struct ExamSnapshot {
    pub phase: ExamPhase,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<SessionId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub paper: Option<ExamPaper>,
    pub answers: HashMap<String, String>,
    pub remaining_secs: u64,
    pub remaining: String,
    pub violations: u32,
    pub violation_log: Vec<Violation>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notice: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub results: Option<ExamResults>,
}

struct ExamSession {
    id: SessionId,
    paper: ExamPaper,
    answers: HashMap<String, String>,
    deadline: Instant,
    started_at: DateTime<Utc>,
    violations: Vec<Violation>,
    /// Set once the disqualifying violation is recorded.
    terminating: bool,
    results: Option<ExamResults>,
}

struct Warning {
    id: u64,
    text: String,
}

struct MachineState {
    phase: ExamPhase,
    /// Bumped on every start and reset; stale timers compare against it.
    epoch: u64,
    session: Option<ExamSession>,
    warning: Option<Warning>,
    next_warning_id: u64,
    notice: Option<String>,
    subscriptions: Vec<SubscriptionId>,
    countdown: Option<JoinHandle<()>>,
    runtime: Option<Handle>,
}

/// Monitor hooks detached from the state, undone once the state lock is dropped.
#[must_use]
struct Teardown {
    subscriptions: Vec<SubscriptionId>,
    countdown: Option<JoinHandle<()>>,
}

impl MachineState {
    fn take_teardown(&mut self) -> Teardown {
        Teardown {
            subscriptions: std::mem::take(&mut self.subscriptions),
            countdown: self.countdown.take(),
        }
    }
}

struct MachineInner {
    config: ExamConfig,
    monitor: Arc<dyn EnvironmentMonitor>,
    papers: Arc<dyn PaperSource>,
    sink: Option<Arc<dyn EventSink>>,
    denylist: AnswerDenylist,
    violations: ViolationCounter,
    generating: AtomicBool,
    state: Mutex<MachineState>,
}

/// Finite-state machine for a timed, proctored exam.
#[derive(Clone)]
pub struct ProctoredSessionMachine {
    inner: Arc<MachineInner>,
}

fn remaining_secs(deadline: Instant) -> u64 {
    let left = deadline.saturating_duration_since(Instant::now());
    left.as_millis().div_ceil(1000) as u64
}

/// Builder for [`ProctoredSessionMachine`].
pub struct ExamMachineBuilder {
    config: ExamConfig,
    monitor: Arc<dyn EnvironmentMonitor>,
    papers: Arc<dyn PaperSource>,
    sink: Option<Arc<dyn EventSink>>,
}

impl ExamMachineBuilder {
    pub fn event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn build(self) -> Result<ProctoredSessionMachine, ExamError> {
        let denylist = AnswerDenylist::new(&self.config.denylist)
            .map_err(|err| ExamError::InvalidConfig(err.to_string()))?;
        Ok(ProctoredSessionMachine {
            inner: Arc::new(MachineInner {
                config: self.config,
                monitor: self.monitor,
                papers: self.papers,
                sink: self.sink,
                denylist,
                violations: ViolationCounter::new(),
                generating: AtomicBool::new(false),
                state: Mutex::new(MachineState {
                    phase: ExamPhase::Setup,
                    epoch: 0,
                    session: None,
                    warning: None,
                    next_warning_id: 0,
                    notice: None,
                    subscriptions: Vec::new(),
                    countdown: None,
                    runtime: None,
                }),
            }),
        })
    }
}

impl ProctoredSessionMachine {
    pub fn builder(
        config: ExamConfig,
        monitor: Arc<dyn EnvironmentMonitor>,
        papers: Arc<dyn PaperSource>,
    ) -> ExamMachineBuilder {
        ExamMachineBuilder {
            config,
            monitor,
            papers,
            sink: None,
        }
    }

    /// Machine without an event sink.
    pub fn new(
        config: ExamConfig,
        monitor: Arc<dyn EnvironmentMonitor>,
        papers: Arc<dyn PaperSource>,
    ) -> Result<Self, ExamError> {
        Self::builder(config, monitor, papers).build()
    }

    pub fn phase(&self) -> ExamPhase {
        self.inner.state.lock().phase
    }

    pub fn violation_count(&self) -> u32 {
        self.inner.violations.get()
    }

    /// Lock the environment, generate a paper, and enter the exam.
    ///
    /// The monitor is only called with the state lock released; `generating`
    /// keeps a second start out until the session is installed.
    pub async fn start(&self, topic: &str, files: &[FileDocument]) -> Result<(), ExamError> {
        let inner = &self.inner;
        {
            let state = inner.state.lock();
            if state.phase != ExamPhase::Setup {
                return Err(ExamError::InvalidTransition {
                    from: state.phase,
                    to: ExamPhase::Exam,
                });
            }
            if inner.generating.swap(true, Ordering::SeqCst) {
                return Err(ExamError::Busy);
            }
        }
        if let Err(reason) = inner.monitor.request_lock() {
            inner.generating.store(false, Ordering::SeqCst);
            warn!("exam lock denied (topic={}, reason={})", topic, reason);
            inner.state.lock().notice = Some(LOCK_DENIED_NOTICE.to_string());
            return Err(ExamError::LockDenied(reason));
        }
        inner.state.lock().notice = None;

        let generated = inner.papers.generate_paper(topic, files).await;
        let questions = match generated {
            Ok(questions) if !questions.is_empty() => questions,
            other => {
                let reason = match other {
                    Err(err) => err.to_string(),
                    Ok(_) => "no questions generated".to_string(),
                };
                warn!("exam generation failed (topic={}, reason={})", topic, reason);
                inner.generating.store(false, Ordering::SeqCst);
                inner.monitor.release_lock();
                inner.state.lock().notice = Some(GENERATION_FAILED_NOTICE.to_string());
                return Err(ExamError::GenerationFailed(reason));
            }
        };

        let started_at = Utc::now();
        let paper = ExamPaper::new(
            format!("exam-{}", started_at.timestamp_millis()),
            format!("Paper 1: {topic}"),
            inner.config.duration_minutes,
            questions,
        );
        let duration = Duration::from_secs(u64::from(paper.duration_minutes) * 60);
        let session_id = Uuid::new_v4();
        inner.violations.reset();

        let epoch = {
            let mut state = inner.state.lock();
            state.epoch += 1;
            state.epoch
        };
        // Handlers see the setup phase until the session below is installed.
        let weak = Arc::downgrade(inner);
        let subscriptions = EnvironmentSignal::ALL
            .into_iter()
            .map(|signal| {
                let weak = weak.clone();
                inner.monitor.subscribe(
                    signal,
                    Arc::new(move |signal: EnvironmentSignal| {
                        if let Some(inner) = weak.upgrade() {
                            inner.record_violation(epoch, signal.reason(), true);
                        }
                    }),
                )
            })
            .collect();
        let deadline = Instant::now() + duration;
        let mut state = inner.state.lock();
        state.subscriptions = subscriptions;
        state.runtime = Some(Handle::current());
        state.countdown = Some(tokio::spawn(countdown(weak, epoch)));
        info!(
            "exam session started (session_id={}, questions={}, total_marks={}, duration_minutes={})",
            session_id,
            paper.questions.len(),
            paper.total_marks,
            paper.duration_minutes
        );
        state.session = Some(ExamSession {
            id: session_id,
            paper,
            answers: HashMap::new(),
            deadline,
            started_at,
            violations: Vec::new(),
            terminating: false,
            results: None,
        });
        state.warning = None;
        state.phase = ExamPhase::Exam;
        drop(state);
        inner.generating.store(false, Ordering::SeqCst);
        inner.emit(
            session_id,
            EventPayload::ExamPhaseChanged {
                from: ExamPhase::Setup,
                to: ExamPhase::Exam,
            },
        );
        Ok(())
    }

    /// Record a signal directly, bypassing the monitor subscription.
    ///
    /// Returns `None` once the session is terminating.
    pub fn signal(&self, signal: EnvironmentSignal) -> Result<Option<u32>, ExamError> {
        let epoch = self.active_epoch()?;
        Ok(self.inner.record_violation(epoch, signal.reason(), true))
    }

    /// Store an answer, scanning it against the denylist.
    ///
    /// Returns true when the answer tripped the denylist.
    pub fn answer(&self, question_id: &str, text: impl Into<String>) -> Result<bool, ExamError> {
        let text = text.into();
        let epoch = {
            let mut state = self.inner.state.lock();
            let phase = state.phase;
            let epoch = state.epoch;
            let Some(session) = state.session.as_mut().filter(|_| phase == ExamPhase::Exam) else {
                return Err(ExamError::InvalidTransition {
                    from: phase,
                    to: ExamPhase::Exam,
                });
            };
            if !session.paper.questions.iter().any(|question| question.id == question_id) {
                return Err(ExamError::UnknownQuestion(question_id.to_string()));
            }
            session.answers.insert(question_id.to_string(), text.clone());
            epoch
        };
        if !self.inner.denylist.matches(&text) {
            return Ok(false);
        }
        debug!("answer matched denylist (question_id={})", question_id);
        self.inner.record_violation(epoch, DENYLIST_REASON, false);
        Ok(true)
    }

    /// Submit the paper and show results.
    pub fn submit(&self) -> Result<ExamResults, ExamError> {
        let inner = &self.inner;
        let mut state = inner.state.lock();
        let terminating = state.session.as_ref().is_some_and(|session| session.terminating);
        if state.phase != ExamPhase::Exam || terminating {
            return Err(ExamError::InvalidTransition {
                from: state.phase,
                to: ExamPhase::Results,
            });
        }
        let teardown = state.take_teardown();
        let (session_id, results) = inner.finish_results(&mut state, false);
        drop(state);
        inner.leave_exam(teardown);
        inner.emit(
            session_id,
            EventPayload::ExamPhaseChanged {
                from: ExamPhase::Exam,
                to: ExamPhase::Results,
            },
        );
        Ok(results)
    }

    /// Return to setup from a terminal state, dropping the session.
    pub fn reset(&self) -> Result<(), ExamError> {
        let inner = &self.inner;
        let mut state = inner.state.lock();
        let from = state.phase;
        if !matches!(from, ExamPhase::Results | ExamPhase::Disqualified) {
            return Err(ExamError::InvalidTransition {
                from,
                to: ExamPhase::Setup,
            });
        }
        let session_id = state
            .session
            .take()
            .map(|session| session.id)
            .unwrap_or_else(Uuid::nil);
        state.epoch += 1;
        state.phase = ExamPhase::Setup;
        state.warning = None;
        state.notice = None;
        inner.violations.reset();
        drop(state);
        info!("exam session reset (session_id={})", session_id);
        inner.emit(
            session_id,
            EventPayload::ExamPhaseChanged {
                from,
                to: ExamPhase::Setup,
            },
        );
        Ok(())
    }

    pub fn snapshot(&self) -> ExamSnapshot {
        let state = self.inner.state.lock();
        let session = state.session.as_ref();
        let remaining_secs = match (state.phase, session) {
            (ExamPhase::Exam, Some(session)) => remaining_secs(session.deadline),
            _ => 0,
        };
        let notice = match state.phase {
            ExamPhase::Disqualified => Some(DISQUALIFIED_NOTICE.to_string()),
            _ => state.notice.clone(),
        };
        ExamSnapshot {
            phase: state.phase,
            session_id: session.map(|session| session.id),
            paper: session.map(|session| session.paper.clone()),
            answers: session
                .map(|session| session.answers.clone())
                .unwrap_or_default(),
            remaining_secs,
            remaining: format_time(remaining_secs as i64),
            violations: self.inner.violations.get(),
            violation_log: session
                .map(|session| session.violations.clone())
                .unwrap_or_default(),
            warning: state.warning.as_ref().map(|warning| warning.text.clone()),
            notice,
            results: session.and_then(|session| session.results.clone()),
        }
    }

    fn active_epoch(&self) -> Result<u64, ExamError> {
        let state = self.inner.state.lock();
        if state.phase != ExamPhase::Exam {
            return Err(ExamError::InvalidTransition {
                from: state.phase,
                to: ExamPhase::Exam,
            });
        }
        Ok(state.epoch)
    }
}

impl MachineInner {
    fn emit(&self, session_id: SessionId, payload: EventPayload) {
        if let Some(sink) = &self.sink {
            sink.emit(EventMsg::new(session_id, payload));
        }
    }

    /// Stop listening for signals, then release the lock.
    ///
    /// Must run without the state lock held: monitors may dispatch signals
    /// from `release_lock`.
    fn leave_exam(&self, teardown: Teardown) {
        if let Some(countdown) = teardown.countdown {
            countdown.abort();
        }
        for id in teardown.subscriptions {
            self.monitor.unsubscribe(id);
        }
        self.monitor.release_lock();
    }

    fn finish_results(&self, state: &mut MachineState, timed_out: bool) -> (SessionId, ExamResults) {
        state.phase = ExamPhase::Results;
        state.warning = None;
        let violations = self.violations.get();
        let integrity_report = if violations == 0 {
            CLEAN_SESSION.to_string()
        } else {
            format!(
                "{violations} behavioral flags recorded. This may affect your predicted grade credibility."
            )
        };
        let Some(session) = state.session.as_mut() else {
            return (
                Uuid::nil(),
                ExamResults {
                    title: String::new(),
                    grading_status: GRADING_PENDING.to_string(),
                    integrity_report,
                    violations,
                    timed_out,
                    mcq: McqScore::default(),
                },
            );
        };
        let results = ExamResults {
            title: session.paper.title.clone(),
            grading_status: GRADING_PENDING.to_string(),
            integrity_report,
            violations,
            timed_out,
            mcq: mark_multiple_choice(&session.paper, &session.answers),
        };
        session.results = Some(results.clone());
        info!(
            "exam session submitted (session_id={}, violations={}, timed_out={}, elapsed_secs={})",
            session.id,
            violations,
            timed_out,
            (Utc::now() - session.started_at).num_seconds()
        );
        (session.id, results)
    }

    /// Count one violation for the active session.
    ///
    /// With `show_warning` false the warning text is only set when no warning
    /// is visible. Returns the new count, or `None` when the session is not
    /// accepting violations.
    fn record_violation(self: &Arc<Self>, epoch: u64, reason: &str, show_warning: bool) -> Option<u32> {
        let max = self.config.max_violations;
        let mut state = self.state.lock();
        if state.epoch != epoch || state.phase != ExamPhase::Exam {
            return None;
        }
        let runtime = state.runtime.clone();
        let session = state.session.as_mut()?;
        if session.terminating {
            return None;
        }
        let count = self.violations.record();
        session.violations.push(Violation {
            sequence: count,
            reason: reason.to_string(),
        });
        let session_id = session.id;
        let disqualifying = count >= max;
        if disqualifying {
            session.terminating = true;
        }
        let text = format!("VIOLATION {count}/{max}: {reason}");
        let display = disqualifying || show_warning || state.warning.is_none();
        let mut clear_after = None;
        if display {
            state.next_warning_id += 1;
            let id = state.next_warning_id;
            state.warning = Some(Warning { id, text });
            if !disqualifying {
                clear_after = Some(id);
            }
        }
        let teardown = disqualifying.then(|| state.take_teardown());
        drop(state);
        if let Some(teardown) = teardown {
            self.leave_exam(teardown);
        }

        warn!(
            "exam violation recorded (session_id={}, count={}, reason={})",
            session_id, count, reason
        );
        self.emit(
            session_id,
            EventPayload::ViolationRecorded {
                count,
                reason: reason.to_string(),
            },
        );

        let Some(runtime) = runtime else {
            return Some(count);
        };
        let weak = Arc::downgrade(self);
        if let Some(warning_id) = clear_after {
            let delay = Duration::from_millis(self.config.warning_clear_ms);
            runtime.spawn(clear_warning(weak, epoch, warning_id, delay));
        } else if disqualifying {
            let delay = Duration::from_millis(self.config.disqualify_delay_ms);
            runtime.spawn(disqualify(weak, epoch, delay));
        }
        Some(count)
    }

    /// Countdown step; returns true when the countdown should stop.
    fn on_tick(&self, epoch: u64) -> bool {
        let mut state = self.state.lock();
        if state.epoch != epoch || state.phase != ExamPhase::Exam {
            return true;
        }
        let Some(session) = state.session.as_ref() else {
            return true;
        };
        if session.terminating {
            return true;
        }
        if remaining_secs(session.deadline) > 0 {
            return false;
        }
        // The countdown task is finishing on its own.
        state.countdown = None;
        let teardown = state.take_teardown();
        let (session_id, _) = self.finish_results(&mut state, true);
        drop(state);
        self.leave_exam(teardown);
        self.emit(
            session_id,
            EventPayload::ExamPhaseChanged {
                from: ExamPhase::Exam,
                to: ExamPhase::Results,
            },
        );
        true
    }
}

async fn countdown(inner: Weak<MachineInner>, epoch: u64) {
    let period = Duration::from_secs(1);
    let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
    loop {
        ticker.tick().await;
        let Some(inner) = inner.upgrade() else {
            return;
        };
        if inner.on_tick(epoch) {
            return;
        }
    }
}

async fn clear_warning(inner: Weak<MachineInner>, epoch: u64, warning_id: u64, delay: Duration) {
    tokio::time::sleep(delay).await;
    let Some(inner) = inner.upgrade() else {
        return;
    };
    let session_id = {
        let mut state = inner.state.lock();
        if state.epoch != epoch || state.warning.as_ref().map(|warning| warning.id) != Some(warning_id) {
            return;
        }
        state.warning = None;
        state.session.as_ref().map(|session| session.id).unwrap_or_else(Uuid::nil)
    };
    inner.emit(session_id, EventPayload::WarningCleared);
}

async fn disqualify(inner: Weak<MachineInner>, epoch: u64, delay: Duration) {
    tokio::time::sleep(delay).await;
    let Some(inner) = inner.upgrade() else {
        return;
    };
    let (session_id, count) = {
        let mut state = inner.state.lock();
        if state.epoch != epoch || state.phase != ExamPhase::Exam {
            return;
        }
        state.phase = ExamPhase::Disqualified;
        (
            state.session.as_ref().map(|session| session.id).unwrap_or_else(Uuid::nil),
            inner.violations.get(),
        )
    };
    info!(
        "exam session disqualified (session_id={}, violations={})",
        session_id, count
    );
    inner.emit(
        session_id,
        EventPayload::ExamPhaseChanged {
            from: ExamPhase::Exam,
            to: ExamPhase::Disqualified,
        },
    );
}
