//! Run configuration and outcome reporting for the machine driver.

use crate::interrupt::Interrupt;
use deka::HwFault;
use std::time::Duration;

/// Why a run stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RunOutcome {
    /// Execution is still in progress (default before a stop condition).
    #[default]
    InProgress,
    /// The user program ran off the end of its loaded text.
    ProgramEnd,
    /// A fatal interrupt terminated the program.
    Fatal(Interrupt),
    /// An internal bus or stack failure below the interrupt model.
    Fault(HwFault),
    /// [`RunConfig::instruction_limit`] was reached.
    HitInstructionLimit,
}

/// Summary produced by [`Machine::run`](crate::Machine::run).
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RunSummary {
    /// Total ticks executed, interrupt-entry ticks included.
    pub instructions_executed: u64,
    /// Why the run stopped.
    pub outcome: RunOutcome,
}

impl RunSummary {
    /// Record that the run stopped for the provided outcome.
    pub fn mark(&mut self, outcome: RunOutcome) {
        self.outcome = outcome;
    }

    /// The fatal interrupt, when the run ended in one.
    #[must_use]
    pub fn fatal(&self) -> Option<Interrupt> {
        match self.outcome {
            RunOutcome::Fatal(interrupt) => Some(interrupt),
            _ => None,
        }
    }

    /// Returns `true` if the program completed normally.
    #[must_use]
    pub fn program_ended(&self) -> bool {
        self.outcome == RunOutcome::ProgramEnd
    }

    /// Returns `true` if execution reached the configured instruction limit.
    #[must_use]
    pub fn hit_instruction_limit(&self) -> bool {
        self.outcome == RunOutcome::HitInstructionLimit
    }
}

/// Configuration for a run.
#[derive(Debug, Clone, Copy)]
pub struct RunConfig {
    /// Maximum number of ticks before stopping, `None` for unbounded.
    pub instruction_limit: Option<u64>,
    /// Sleep inserted after every tick to emulate clock pacing.
    pub quantum: Duration,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            instruction_limit: None,
            quantum: Duration::from_millis(2),
        }
    }
}

impl RunConfig {
    /// A configuration with no pacing sleep, for tests and batch runs.
    #[must_use]
    pub fn unpaced() -> Self {
        Self {
            quantum: Duration::ZERO,
            ..Self::default()
        }
    }
}
