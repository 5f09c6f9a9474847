//! A cancellation handle passed to every entry point.
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Cheap to clone; every clone observes the same cancellation flag.
///
/// Derivation has no suspension points, so the flag is only consulted when a call starts.
#[derive(Clone, Debug, Default)]
pub struct Context {
    cancelled: Arc<AtomicBool>,
}

impl Context {
    /// A context that is never cancelled unless `cancel` is called on it.
    pub fn background() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_cancel_is_shared_between_clones() {
        let ctx = Context::background();
        let clone = ctx.clone();
        assert!(!clone.is_cancelled());
        ctx.cancel();
        assert!(clone.is_cancelled());
    }
}
