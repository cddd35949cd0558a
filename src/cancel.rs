//! Supersede tracking for in-flight lookups.
//! Each new selection advances a generation and cancels the previous token,
//! so a reply that raced a newer selection is never applied to the tooltip.

use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;
use tokio_util::sync::CancellationToken;

/// One generation counter per page context.
pub struct LookupGeneration {
    current_token: RwLock<CancellationToken>,
    generation: AtomicU64,
}

impl LookupGeneration {
    pub fn new() -> Self {
        Self {
            current_token: RwLock::new(CancellationToken::new()),
            generation: AtomicU64::new(0),
        }
    }

    /// Cancel the previous in-flight lookup and start a new generation.
    /// Returns a child token for the new lookup plus its generation number.
    pub fn advance(&self) -> (CancellationToken, u64) {
        let mut token_guard = self.current_token.write();
        token_guard.cancel();
        let new_root = CancellationToken::new();
        let child = new_root.child_token();
        *token_guard = new_root;
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        (child, generation)
    }

    /// The latest generation number issued so far.
    pub fn current(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    /// Whether a reply stamped with `generation` is still the latest.
    #[inline]
    pub fn is_current(&self, generation: u64) -> bool {
        self.current() == generation
    }
}

impl Default for LookupGeneration {
    fn default() -> Self {
        Self::new()
    }
}
