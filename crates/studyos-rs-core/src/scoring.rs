//! Score and timer helpers shown in exam and game results.

use std::collections::HashMap;
use studyos_rs_protocol::{ExamPaper, QuestionKind};

/// Percentage of `score` over `total`, rounded to the nearest integer.
///
/// A non-positive total yields 0.
pub fn calculate_accuracy(score: u32, total: u32) -> u32 {
    if total == 0 {
        return 0;
    }
    ((f64::from(score) / f64::from(total)) * 100.0).round() as u32
}

/// Format seconds as `m:ss`; negative input formats as `0:00`.
pub fn format_time(seconds: i64) -> String {
    if seconds < 0 {
        return "0:00".to_string();
    }
    format!("{}:{:02}", seconds / 60, seconds % 60)
}

/// Marks earned on multiple-choice questions of a paper.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize)]
pub struct McqScore {
    pub earned: u32,
    pub available: u32,
}

/// Auto-mark the multiple-choice questions of a paper.
///
/// An answer is the selected option index as text. Open questions are left
/// for grading and do not contribute.
pub fn mark_multiple_choice(paper: &ExamPaper, answers: &HashMap<String, String>) -> McqScore {
    let mut score = McqScore::default();
    for question in &paper.questions {
        if question.kind != QuestionKind::MultipleChoice {
            continue;
        }
        let marks = question.effective_marks();
        score.available += marks;
        let selected = answers
            .get(&question.id)
            .and_then(|answer| answer.trim().parse::<usize>().ok());
        if selected.is_some() && selected == question.correct_option_index {
            score.earned += marks;
        }
    }
    score
}

#[cfg(test)]
mod tests {
    use super::{calculate_accuracy, format_time};
    use pretty_assertions::assert_eq;

    #[test]
    fn accuracy_rounds_to_nearest() {
        assert_eq!(calculate_accuracy(5, 10), 50);
        assert_eq!(calculate_accuracy(1, 3), 33);
        assert_eq!(calculate_accuracy(2, 3), 67);
        assert_eq!(calculate_accuracy(3, 0), 0);
    }

    #[test]
    fn format_time_pads_seconds() {
        assert_eq!(format_time(303), "5:03");
        assert_eq!(format_time(600), "10:00");
        assert_eq!(format_time(0), "0:00");
        assert_eq!(format_time(-5), "0:00");
    }
}
