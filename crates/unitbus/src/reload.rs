//! Coalescing of unit-file reload bursts.
//!
//! The manager announces changed unit files with `UnitFilesChanged` and then
//! brackets the actual reload with `Reloading(true)` / `Reloading(false)`.
//! Several of each may arrive per reload; subscribers only want one event.

/// Coalescer phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReloadPhase {
    #[default]
    Idle,
    /// Unit files changed and no completed reload has been reported yet.
    FilesChangedPending,
}

/// Two-state machine that emits at most one reload event per burst.
///
/// Owned by the dispatch loop; never shared.
#[derive(Debug, Default)]
pub struct ReloadCoalescer {
    phase: ReloadPhase,
    reloading: bool,
}

impl ReloadCoalescer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn phase(&self) -> ReloadPhase {
        self.phase
    }

    /// Last reloading flag reported by the manager.
    pub fn is_reloading(&self) -> bool {
        self.reloading
    }

    /// Handle `UnitFilesChanged`.
    pub fn files_changed(&mut self) {
        self.phase = ReloadPhase::FilesChangedPending;
    }

    /// Handle `Reloading(active)`. Returns `true` when a reload event must fire.
    pub fn reloading(&mut self, active: bool) -> bool {
        self.reloading = active;
        match (self.phase, active) {
            (ReloadPhase::FilesChangedPending, false) => {
                self.phase = ReloadPhase::Idle;
                true
            }
            _ => false,
        }
    }
}
