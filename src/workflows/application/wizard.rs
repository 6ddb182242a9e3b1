//! The step-gating state machine driving the application wizard.

use std::fmt;

use serde::Serialize;

use super::state::ApplicationState;
use super::steps::{MissingRequirement, WizardStep};

/// Linear wizard over the ordered steps. Forward navigation is gated by the
/// predicate of the step being left; backward navigation is unconditional.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WizardSession {
    current: WizardStep,
}

impl Default for WizardSession {
    fn default() -> Self {
        Self::new()
    }
}

impl WizardSession {
    pub fn new() -> Self {
        Self {
            current: WizardStep::Profile,
        }
    }

    pub fn current_step(&self) -> WizardStep {
        self.current
    }

    /// Move forward one step. Rejected, with the step index unchanged, when
    /// the current step's requirements are not met. A no-op on the final step.
    pub fn advance(&mut self, state: &ApplicationState) -> Result<WizardStep, GateRejection> {
        let missing = self.current.missing_requirements(state);
        if !missing.is_empty() {
            return Err(GateRejection {
                step: self.current,
                missing,
            });
        }
        if let Some(next) = self.current.next() {
            self.current = next;
        }
        Ok(self.current)
    }

    /// Move back one step. Never fails; a no-op on the first step.
    pub fn back(&mut self) -> WizardStep {
        if let Some(prev) = self.current.prev() {
            self.current = prev;
        }
        self.current
    }

    /// Jump directly to a step. Backward jumps are unconditional; a forward
    /// jump requires the current step and every step before the target to be
    /// satisfied, matching what repeated `advance` calls would check.
    pub fn jump_to(
        &mut self,
        target: WizardStep,
        state: &ApplicationState,
    ) -> Result<WizardStep, GateRejection> {
        if target.index() <= self.current.index() {
            self.current = target;
            return Ok(self.current);
        }

        for step in WizardStep::ORDERED {
            if step.index() < self.current.index() || step.index() >= target.index() {
                continue;
            }
            let missing = step.missing_requirements(state);
            if !missing.is_empty() {
                return Err(GateRejection { step, missing });
            }
        }

        self.current = target;
        Ok(self.current)
    }
}

/// A refused forward transition, listing everything the step still needs.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GateRejection {
    pub step: WizardStep,
    pub missing: Vec<MissingRequirement>,
}

impl fmt::Display for GateRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "step '{}' is incomplete: ", self.step.label())?;
        for (position, requirement) in self.missing.iter().enumerate() {
            if position > 0 {
                write!(f, "; ")?;
            }
            write!(f, "{requirement}")?;
        }
        Ok(())
    }
}

impl std::error::Error for GateRejection {}
