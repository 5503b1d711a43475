//! Live cancellation scopes for in-flight operations.
//!
//! Every unit of work registers a scope linked to its caller's token and holds the
//! returned [`OperationHandle`] until it finishes. Dropping the handle cancels the scope
//! and removes it. [`OperationRegistry::cancel_all`] kills every live scope at once,
//! which is what a session does when the viewed file is closed, reopened, or re-decoded.

use log::debug;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Identifier of a registered operation
pub type OperationId = u64;

#[derive(Debug, Default)]
struct RegistryInner {
    next_id: AtomicU64,
    live: Mutex<HashMap<OperationId, CancellationToken>>,
}

impl RegistryInner {
    /// Remove-then-cancel; the map lock makes the removal the single point of ownership
    fn complete(&self, id: OperationId) {
        let token = self.live.lock().remove(&id);
        if let Some(token) = token {
            token.cancel();
        }
    }

    fn cancel_all(&self) -> usize {
        let drained: Vec<_> = self.live.lock().drain().map(|(_, token)| token).collect();
        for token in &drained {
            token.cancel();
        }
        drained.len()
    }
}

/// Session-scoped registry of cancellation scopes. Dropping it cancels everything.
#[derive(Debug, Default)]
pub struct OperationRegistry {
    inner: Arc<RegistryInner>,
}

impl OperationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a scope linked to `external`: cancelling `external` cancels the scope
    pub fn register(&self, external: &CancellationToken) -> OperationHandle {
        let id = self.inner.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        let token = external.child_token();
        self.inner.live.lock().insert(id, token.clone());

        OperationHandle {
            id,
            token,
            registry: Arc::clone(&self.inner),
        }
    }

    /// Cancel and forget every live scope
    ///
    /// # Returns
    /// * Number of scopes cancelled
    pub fn cancel_all(&self) -> usize {
        let cancelled = self.inner.cancel_all();
        if cancelled > 0 {
            debug!("cancelled {cancelled} live operations");
        }
        cancelled
    }

    /// Number of live scopes
    pub fn len(&self) -> usize {
        self.inner.live.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Drop for OperationRegistry {
    fn drop(&mut self) {
        self.inner.cancel_all();
    }
}

/// A registered scope. Completing or dropping it cancels the token exactly once.
#[derive(Debug)]
pub struct OperationHandle {
    id: OperationId,
    token: CancellationToken,
    registry: Arc<RegistryInner>,
}

impl OperationHandle {
    pub fn id(&self) -> OperationId {
        self.id
    }

    /// Token to pass to remote streams and check between items
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Finish the operation; later calls (and the eventual drop) are no-ops
    pub fn complete(&self) {
        self.registry.complete(self.id);
    }
}

impl Drop for OperationHandle {
    fn drop(&mut self) {
        self.registry.complete(self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_and_drop() {
        let registry = OperationRegistry::new();
        let external = CancellationToken::new();

        let handle = registry.register(&external);
        let token = handle.token().clone();
        assert_eq!(registry.len(), 1);
        assert!(!token.is_cancelled());

        drop(handle);
        assert!(registry.is_empty());
        assert!(token.is_cancelled());
        assert!(!external.is_cancelled(), "completion must not leak upward");
    }

    #[test]
    fn test_ids_are_unique() {
        let registry = OperationRegistry::new();
        let external = CancellationToken::new();
        let a = registry.register(&external);
        let b = registry.register(&external);
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn test_complete_is_idempotent() {
        let registry = OperationRegistry::new();
        let external = CancellationToken::new();
        let keep = registry.register(&external);
        let handle = registry.register(&external);

        handle.complete();
        handle.complete();
        drop(handle);

        assert_eq!(registry.len(), 1);
        assert!(!keep.is_cancelled());
    }

    #[test]
    fn test_external_cancellation_reaches_scope() {
        let registry = OperationRegistry::new();
        let external = CancellationToken::new();
        let handle = registry.register(&external);

        external.cancel();
        assert!(handle.is_cancelled());
    }

    #[test]
    fn test_cancel_all_drains() {
        let registry = OperationRegistry::new();
        let external = CancellationToken::new();
        let handles: Vec<_> = (0..5).map(|_| registry.register(&external)).collect();

        assert_eq!(registry.cancel_all(), 5);
        assert!(registry.is_empty());
        assert!(handles.iter().all(OperationHandle::is_cancelled));
        assert!(!external.is_cancelled());

        // Completing after cancel_all finds nothing left to do
        drop(handles);
        assert_eq!(registry.cancel_all(), 0);
    }

    #[test]
    fn test_dropping_registry_cancels_live_scopes() {
        let registry = OperationRegistry::new();
        let handle = registry.register(&CancellationToken::new());
        drop(registry);
        assert!(handle.is_cancelled());
    }

    #[test]
    fn test_concurrent_register_complete_cancel_all() {
        let registry = Arc::new(OperationRegistry::new());
        let external = CancellationToken::new();

        let workers: Vec<_> = (0..8)
            .map(|_| {
                let registry = Arc::clone(&registry);
                let external = external.clone();
                std::thread::spawn(move || {
                    for _ in 0..500 {
                        let handle = registry.register(&external);
                        if handle.id() % 7 == 0 {
                            registry.cancel_all();
                        }
                        handle.complete();
                    }
                })
            })
            .collect();

        for worker in workers {
            worker.join().unwrap();
        }
        assert!(registry.is_empty());
    }
}
