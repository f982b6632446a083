//! Single-slot re-entrancy gate around the rebuild-and-restart cycle.

/// Tracks whether a cycle is running and whether another one is owed.
///
/// Requests arriving while a cycle runs are queued once; further requests
/// are coalesced into that single queued cycle.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CycleGate {
    pending: bool,
    running: bool,
    coalesced: u64,
    cycles: u64,
}

impl CycleGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ask for a cycle. Returns false when folded into an already queued one.
    pub fn request(&mut self) -> bool {
        if self.pending {
            self.coalesced += 1;
            false
        } else {
            self.pending = true;
            true
        }
    }

    /// Record events absorbed into the cycle about to run
    pub fn absorb(&mut self, count: usize) {
        self.coalesced += count as u64;
    }

    /// Claim the slot for a queued cycle
    pub fn begin(&mut self) -> bool {
        if self.pending && !self.running {
            self.pending = false;
            self.running = true;
            self.cycles += 1;
            true
        } else {
            false
        }
    }

    /// Release the slot
    pub fn finish(&mut self) {
        self.running = false;
    }

    pub fn is_pending(&self) -> bool {
        self.pending
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Requests folded into other cycles
    pub fn coalesced(&self) -> u64 {
        self.coalesced
    }

    /// Cycles started through this gate
    pub fn cycles(&self) -> u64 {
        self.cycles
    }
}
