//! The twelve-week execution plan.

use serde::{Deserialize, Serialize};

/// One phase of the execution plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Phase {
    /// Phase name, e.g. "Foundation".
    pub name: String,
    /// First week of the phase (1-based).
    pub start_week: u32,
    /// Last week of the phase (inclusive).
    pub end_week: u32,
    /// Concrete tasks.
    #[serde(default)]
    pub tasks: Vec<String>,
}

/// Phased execution plan produced by the synthesizer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionPlan {
    /// Phases in chronological order.
    pub phases: Vec<Phase>,
}

impl ExecutionPlan {
    /// Parses and checks a plan from a JSON value.
    ///
    /// # Errors
    ///
    /// Returns a description of the problem if the value is not a plan
    /// object, has no phases, or a phase ends before it starts.
    pub fn from_value(value: &serde_json::Value) -> Result<Self, String> {
        let plan: Self =
            serde_json::from_value(value.clone()).map_err(|e| format!("execution_plan: {e}"))?;
        plan.validate()?;
        Ok(plan)
    }

    /// Checks the phase list.
    ///
    /// # Errors
    ///
    /// Returns a description of the first problem found.
    pub fn validate(&self) -> Result<(), String> {
        if self.phases.is_empty() {
            return Err("execution_plan: at least one phase is required".to_string());
        }
        for phase in &self.phases {
            if phase.start_week == 0 || phase.end_week < phase.start_week {
                return Err(format!(
                    "execution_plan: phase '{}' has invalid weeks {}-{}",
                    phase.name, phase.start_week, phase.end_week
                ));
            }
        }
        Ok(())
    }

    /// Returns the last week covered by the plan.
    #[must_use]
    pub fn total_weeks(&self) -> u32 {
        self.phases.iter().map(|p| p.end_week).max().unwrap_or(0)
    }

    /// Returns the number of tasks across all phases.
    #[must_use]
    pub fn task_count(&self) -> usize {
        self.phases.iter().map(|p| p.tasks.len()).sum()
    }
}
