//! Runtime Configuration
//!
//! The only tunable of the core is the cycle guard: the number of
//! single-entry drains the commit loop tolerates before it assumes a
//! runaway recomputation and aborts.

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Default bound for the commit loop's cycle guard.
pub const DEFAULT_CYCLE_GUARD: usize = 100;

/// Settings for a [`Runtime`](crate::reactive::Runtime).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// How many single-entry computed/autorun drains one commit may perform.
    ///
    /// This is a heuristic safety valve, not a cycle detector. A long chain
    /// of computeds that each schedule exactly one successor also consumes
    /// the budget.
    pub cycle_guard: usize,
}

impl RuntimeConfig {
    /// Parse a config from JSON, falling back to defaults for missing fields.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Set the cycle guard bound. Zero is clamped to one.
    pub fn with_cycle_guard(mut self, bound: usize) -> Self {
        self.cycle_guard = bound.max(1);
        self
    }

    pub(crate) fn effective_guard(&self) -> usize {
        self.cycle_guard.max(1)
    }
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            cycle_guard: DEFAULT_CYCLE_GUARD,
        }
    }
}
