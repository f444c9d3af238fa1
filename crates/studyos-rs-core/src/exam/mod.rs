//! Proctored exam sessions.

mod denylist;
mod machine;
mod monitor;
mod violations;

pub use denylist::{AnswerDenylist, DENYLIST_REASON};
pub use machine::{
    CLEAN_SESSION, DISQUALIFIED_NOTICE, ExamMachineBuilder, ExamResults, ExamSnapshot,
    GENERATION_FAILED_NOTICE, GRADING_PENDING, LOCK_DENIED_NOTICE, ProctoredSessionMachine,
};
pub use monitor::{
    ClientReportedMonitor, EnvironmentMonitor, EnvironmentSignal, SignalHandler, SignalRegistry,
    SubscriptionId,
};
pub use violations::{Violation, ViolationCounter};

use crate::error::CoreError;
use async_trait::async_trait;
use studyos_rs_protocol::{ExamPhase, FileDocument, Question};
use thiserror::Error;

/// Source of exam questions for a topic.
#[async_trait]
pub trait PaperSource: Send + Sync {
    async fn generate_paper(
        &self,
        topic: &str,
        files: &[FileDocument],
    ) -> Result<Vec<Question>, CoreError>;
}

/// Errors returned by exam session operations.
#[derive(Debug, Error)]
pub enum ExamError {
    /// The action is not allowed in the current phase.
    #[error("cannot move from {from:?} to {to:?}")]
    InvalidTransition { from: ExamPhase, to: ExamPhase },
    /// The environment refused to enter locked mode.
    #[error("lock denied: {0}")]
    LockDenied(String),
    /// No paper could be generated.
    #[error("exam generation failed: {0}")]
    GenerationFailed(String),
    /// A start is already generating a paper.
    #[error("an exam is already starting")]
    Busy,
    /// The answer targets a question that is not on the paper.
    #[error("unknown question: {0}")]
    UnknownQuestion(String),
    /// The exam configuration could not be applied.
    #[error("invalid exam config: {0}")]
    InvalidConfig(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::sync::Arc;
    use std::time::Duration;
    use studyos_rs_config::ExamConfig;
    use studyos_rs_protocol::{Difficulty, QuestionKind};

    struct FixedPaper(Vec<Question>);

    #[async_trait]
    impl PaperSource for FixedPaper {
        async fn generate_paper(
            &self,
            _topic: &str,
            _files: &[FileDocument],
        ) -> Result<Vec<Question>, CoreError> {
            Ok(self.0.clone())
        }
    }

    fn question(id: &str) -> Question {
        Question {
            id: id.to_string(),
            kind: QuestionKind::Open,
            text: "Explain osmosis.".to_string(),
            options: None,
            correct_option_index: None,
            mark_scheme: Some(vec!["water".to_string()]),
            explanation: String::new(),
            source_citation: String::new(),
            difficulty: Difficulty::Medium,
            marks: Some(4),
        }
    }

    fn machine(questions: Vec<Question>) -> (ProctoredSessionMachine, Arc<ClientReportedMonitor>) {
        let monitor = Arc::new(ClientReportedMonitor::new());
        let machine = ProctoredSessionMachine::new(
            ExamConfig::default(),
            monitor.clone(),
            Arc::new(FixedPaper(questions)),
        )
        .expect("machine");
        (machine, monitor)
    }

    #[tokio::test(start_paused = true)]
    async fn client_reported_signals_disqualify_after_delay() {
        let (machine, monitor) = machine(vec![question("q1")]);
        machine.start("Osmosis", &[]).await.expect("start");
        assert!(monitor.is_locked());

        monitor.report(EnvironmentSignal::VisibilityLost);
        monitor.report(EnvironmentSignal::Clipboard);
        assert_eq!(machine.phase(), ExamPhase::Exam);
        assert_eq!(machine.violation_count(), 2);

        monitor.report(EnvironmentSignal::FocusLost);
        assert!(!monitor.is_locked());
        assert_eq!(machine.phase(), ExamPhase::Exam);
        let snapshot = machine.snapshot();
        assert_eq!(
            snapshot.warning.as_deref(),
            Some("VIOLATION 3/3: Focus lost (Window Click-away). Remain in the exam environment.")
        );

        // Ignored once the session is terminating.
        assert_eq!(monitor.report(EnvironmentSignal::ContextMenu), 0);
        tokio::time::sleep(Duration::from_millis(1_600)).await;
        assert_eq!(machine.phase(), ExamPhase::Disqualified);
        assert_eq!(machine.violation_count(), 3);
        assert_eq!(machine.snapshot().notice.as_deref(), Some(DISQUALIFIED_NOTICE));
    }

    #[tokio::test]
    async fn denied_lock_keeps_setup() {
        let (machine, monitor) = machine(vec![question("q1")]);
        monitor.set_lock_available(false);
        let err = machine.start("Osmosis", &[]).await.expect_err("denied");
        assert!(matches!(err, ExamError::LockDenied(_)));
        assert_eq!(machine.phase(), ExamPhase::Setup);
        assert_eq!(machine.snapshot().notice.as_deref(), Some(LOCK_DENIED_NOTICE));
    }

    #[tokio::test]
    async fn empty_paper_releases_lock() {
        let (machine, monitor) = machine(Vec::new());
        let err = machine.start("Osmosis", &[]).await.expect_err("empty");
        assert!(matches!(err, ExamError::GenerationFailed(_)));
        assert!(!monitor.is_locked());
        assert_eq!(machine.phase(), ExamPhase::Setup);
        assert_eq!(monitor.report(EnvironmentSignal::FocusLost), 0);
    }

    #[tokio::test]
    async fn answers_require_known_question() {
        let (machine, _monitor) = machine(vec![question("q1")]);
        assert!(matches!(
            machine.answer("q1", "water moves"),
            Err(ExamError::InvalidTransition { .. })
        ));
        machine.start("Osmosis", &[]).await.expect("start");
        assert!(matches!(
            machine.answer("q9", "water moves"),
            Err(ExamError::UnknownQuestion(_))
        ));
        assert!(!machine.answer("q1", "water moves down a gradient").expect("answer"));
        assert_eq!(machine.snapshot().answers.get("q1").map(String::as_str), Some("water moves down a gradient"));
    }
}
