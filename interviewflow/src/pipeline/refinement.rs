//! Quality gate state machine.
//!
//! ```text
//! Generated -> Evaluated -> Persisted
//!                        -> PersistedWithErrors
//!                        -> Refining -> Evaluated
//! ```
//!
//! The attempt counter only grows and never passes the ceiling, so a run
//! performs at most `ceiling + 1` evaluations.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Where a run stands in the quality loop.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QualityPhase {
    /// Rounds exist but were not scored.
    #[default]
    Generated,
    /// A score was recorded.
    Evaluated,
    /// Weak rounds are being regenerated.
    Refining,
    /// Accepted at or above the threshold.
    Persisted,
    /// Accepted at the ceiling without reaching the threshold.
    PersistedWithErrors,
}

impl QualityPhase {
    /// The transition table.
    #[must_use]
    pub fn can_transition_to(self, next: Self) -> bool {
        use QualityPhase::{Evaluated, Generated, Persisted, PersistedWithErrors, Refining};
        matches!(
            (self, next),
            (Generated | Refining, Evaluated)
                | (Evaluated, Refining | Persisted | PersistedWithErrors)
        )
    }

    /// Returns true for the two accepted phases.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Persisted | Self::PersistedWithErrors)
    }
}

/// An illegal move in the quality loop.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransitionError {
    /// The table does not allow this move.
    #[error("illegal quality transition {from:?} -> {to:?}")]
    Illegal {
        /// Current phase.
        from: QualityPhase,
        /// Requested phase.
        to: QualityPhase,
    },

    /// Another refinement would pass the ceiling.
    #[error("refinement ceiling of {ceiling} attempts reached")]
    CeilingReached {
        /// The ceiling.
        ceiling: u32,
    },
}

/// Gate outcome for one evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QualityDecision {
    /// Score met the threshold.
    Accept,
    /// Ceiling reached below the threshold; accept and flag.
    AcceptBestEffort,
    /// Regenerate weak rounds and evaluate again.
    Refine,
}

/// Threshold and ceiling for the gate.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RefinementPolicy {
    threshold: f64,
    ceiling: u32,
}

impl Default for RefinementPolicy {
    fn default() -> Self {
        Self::new(80.0, 2)
    }
}

impl RefinementPolicy {
    /// Creates a policy.
    #[must_use]
    pub fn new(threshold: f64, ceiling: u32) -> Self {
        Self { threshold, ceiling }
    }

    /// Minimum accepted score.
    #[must_use]
    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// Maximum refinement passes.
    #[must_use]
    pub fn ceiling(&self) -> u32 {
        self.ceiling
    }

    /// Persist when `score >= threshold` or `attempts >= ceiling`.
    #[must_use]
    pub fn decide(&self, score: f64, attempts: u32) -> QualityDecision {
        if score >= self.threshold {
            QualityDecision::Accept
        } else if attempts >= self.ceiling {
            QualityDecision::AcceptBestEffort
        } else {
            QualityDecision::Refine
        }
    }
}

/// The gate's state for one run.
///
/// Nodes are stateless, so the loop is rebuilt from pipeline state with
/// [`QualityLoop::resume`] on every visit.
#[derive(Debug, Clone, PartialEq)]
pub struct QualityLoop {
    policy: RefinementPolicy,
    phase: QualityPhase,
    attempts: u32,
}

impl QualityLoop {
    /// A fresh loop in [`QualityPhase::Generated`].
    #[must_use]
    pub fn new(policy: RefinementPolicy) -> Self {
        Self::resume(policy, QualityPhase::Generated, 0)
    }

    /// Restores a loop from persisted phase and counter.
    #[must_use]
    pub fn resume(policy: RefinementPolicy, phase: QualityPhase, attempts: u32) -> Self {
        Self {
            policy,
            phase,
            attempts,
        }
    }

    /// Current phase.
    #[must_use]
    pub fn phase(&self) -> QualityPhase {
        self.phase
    }

    /// Refinement passes completed.
    #[must_use]
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    fn transition(&mut self, to: QualityPhase) -> Result<(), TransitionError> {
        if self.phase.can_transition_to(to) {
            self.phase = to;
            Ok(())
        } else {
            Err(TransitionError::Illegal {
                from: self.phase,
                to,
            })
        }
    }

    /// Records a score and moves to the decided phase.
    pub fn evaluate(&mut self, score: f64) -> Result<QualityDecision, TransitionError> {
        self.transition(QualityPhase::Evaluated)?;
        let decision = self.policy.decide(score, self.attempts);
        let next = match decision {
            QualityDecision::Accept => QualityPhase::Persisted,
            QualityDecision::AcceptBestEffort => QualityPhase::PersistedWithErrors,
            QualityDecision::Refine => QualityPhase::Refining,
        };
        self.transition(next)?;
        Ok(decision)
    }

    /// Counts a finished refinement pass. The loop stays in `Refining`
    /// until the next evaluation.
    pub fn complete_refinement(&mut self) -> Result<u32, TransitionError> {
        if self.phase != QualityPhase::Refining {
            return Err(TransitionError::Illegal {
                from: self.phase,
                to: QualityPhase::Evaluated,
            });
        }
        if self.attempts >= self.policy.ceiling {
            return Err(TransitionError::CeilingReached {
                ceiling: self.policy.ceiling,
            });
        }
        self.attempts += 1;
        Ok(self.attempts)
    }
}
