//! Run fixtures built from the canned stage answers.

use crate::agents::{parse_output, StubBackend};
use crate::core::{Run, RunStatus, StageId};
use crate::errors::PrdflowError;
use crate::stages;

/// The reference idea used across tests.
pub const WATER_INTAKE_IDEA: &str =
    "A mobile app that helps office workers track their daily water intake and reminds them to stay hydrated.";

/// Returns the canned answer a stage gives for an idea.
#[must_use]
pub fn canned_response(stage: StageId, idea: &str) -> String {
    StubBackend::answer(stage, &format!("Product idea:\n{idea}\n\n"))
}

/// Builds a running run whose first `completed` stages hold canned outputs.
///
/// # Errors
///
/// Fails if a canned answer does not match its stage schema.
pub fn try_partial_run(idea: &str, completed: usize) -> Result<Run, PrdflowError> {
    let mut run = Run::new(idea);
    run.transition(RunStatus::Running)?;
    for def in stages::definitions().iter().take(completed) {
        let answer = canned_response(def.id, idea);
        let output = parse_output(def, &answer)
            .map_err(|reason| PrdflowError::response_invalid(def.id, reason))?;
        run.begin_stage(def.id, format!("Product idea:\n{idea}\n\n"))?;
        run.complete_stage(def.id, output, 1)?;
    }
    Ok(run)
}

/// Builds a running run with canned outputs for the first `completed` stages.
///
/// # Panics
///
/// Panics if a canned answer does not match its stage schema.
#[must_use]
pub fn partial_run(idea: &str, completed: usize) -> Run {
    match try_partial_run(idea, completed) {
        Ok(run) => run,
        Err(e) => panic!("canned answers must build a valid run: {e}"),
    }
}

/// Builds a completed run with canned outputs for every stage.
///
/// # Panics
///
/// Panics if a canned answer does not match its stage schema.
#[must_use]
pub fn completed_run(idea: &str) -> Run {
    let mut run = partial_run(idea, StageId::ALL.len());
    if let Err(e) = run.complete() {
        panic!("a fully staged run must complete: {e}");
    }
    run
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::StageStatus;

    #[test]
    fn test_completed_run_fixture() {
        let run = completed_run(WATER_INTAKE_IDEA);
        assert_eq!(run.status, RunStatus::Completed);
        assert_eq!(run.stages.len(), 5);
        assert!(run.stages.iter().all(|r| r.status == StageStatus::Completed));
    }

    #[test]
    fn test_partial_run_fixture() {
        let run = partial_run("A budget planner", 2);
        assert_eq!(run.status, RunStatus::Running);
        assert_eq!(run.next_stage(), Some(StageId::UxWriter));
        assert!(canned_response(StageId::Strategist, "A budget planner").contains("personal finance"));
    }
}
