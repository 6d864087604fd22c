//! Lookups over one case's progress rows.
//!
//! Rows arrive from the store ascending by id, so the last row of a step is
//! its most recent visit.

use caseflow_storage::StepProgress;

/// The most recent row of `step_id`, whatever its status.
pub(crate) fn latest_for_step<'a>(
    rows: &'a [StepProgress],
    step_id: &str,
) -> Option<&'a StepProgress> {
    rows.iter().rev().find(|r| r.step_id == step_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use caseflow_storage::{NewStepProgress, StepStatus};

    fn row(id: i64, step: &str, status: StepStatus) -> StepProgress {
        let mut r = NewStepProgress::entered("case-1", step, time::OffsetDateTime::UNIX_EPOCH)
            .into_record(id);
        r.status = status;
        r
    }

    #[test]
    fn latest_prefers_highest_id() {
        let rows = vec![
            row(1, "review", StepStatus::Completed),
            row(2, "other", StepStatus::InProgress),
            row(3, "review", StepStatus::InProgress),
        ];
        assert_eq!(latest_for_step(&rows, "review").unwrap().id, 3);
        assert!(latest_for_step(&rows, "missing").is_none());
        assert_eq!(
            latest_for_step(&rows, "review").unwrap().status,
            StepStatus::InProgress
        );
    }
}
