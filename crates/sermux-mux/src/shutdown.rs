use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Set-once stop request shared by the supervisor and both directions.
///
/// Cloning shares the same flag. Once triggered it stays triggered.
#[derive(Debug, Clone, Default)]
pub struct ShutdownSignal {
    flag: Arc<AtomicBool>,
}

impl ShutdownSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request shutdown. Returns true if this call was the one that set it.
    pub fn trigger(&self) -> bool {
        !self.flag.swap(true, Ordering::AcqRel)
    }

    pub fn is_triggered(&self) -> bool {
        self.flag.load(Ordering::Acquire)
    }

    /// The underlying flag, for frame readers that poll it directly.
    pub fn flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.flag)
    }
}
