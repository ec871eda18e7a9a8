use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Identifies one load/generate request.
///
/// Epochs are captured by value when work is dispatched and compared against
/// the owner's current epoch before any side effect is applied.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Epoch(pub u64);

impl Epoch {
    /// The epoch before any request was issued.
    pub const INITIAL: Epoch = Epoch(0);
}

impl std::fmt::Display for Epoch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "epoch#{}", self.0)
    }
}

/// Monotonic source of [`Epoch`]s; at most one epoch is current at a time.
///
/// Clones share the same counter so a worker-side handle can ask whether it
/// has been superseded without going through the owner.
#[derive(Debug, Clone, Default)]
pub struct EpochCounter {
    current: Arc<AtomicU64>,
}

impl EpochCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts a new request, superseding whatever was current.
    pub fn advance(&self) -> Epoch {
        Epoch(self.current.fetch_add(1, Ordering::AcqRel) + 1)
    }

    pub fn current(&self) -> Epoch {
        Epoch(self.current.load(Ordering::Acquire))
    }

    pub fn is_current(&self, epoch: Epoch) -> bool {
        self.current() == epoch
    }
}
