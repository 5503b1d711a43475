//! Replay-one observable values for operation state.
//!
//! Backed by `tokio::sync::watch`: a late subscriber immediately sees the current value.

use tokio::sync::watch;

#[derive(Debug)]
pub struct Observable<T> {
    tx: watch::Sender<T>,
}

impl<T: Clone> Observable<T> {
    pub fn new(initial: T) -> Self {
        let (tx, _) = watch::channel(initial);
        Self { tx }
    }

    pub fn get(&self) -> T {
        self.tx.borrow().clone()
    }

    /// Publish a new value, even when nobody is subscribed
    pub fn set(&self, value: T) {
        self.tx.send_replace(value);
    }

    pub fn subscribe(&self) -> watch::Receiver<T> {
        self.tx.subscribe()
    }
}

impl<T: Clone + Default> Default for Observable<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

/// `numerator / denominator` clamped to `[0, 1]`; 0 when the denominator is 0
pub fn ratio(numerator: u64, denominator: u64) -> f64 {
    if denominator == 0 {
        return 0.0;
    }
    (numerator as f64 / denominator as f64).clamp(0.0, 1.0)
}

/// Marks an operation as running for as long as the guard lives
pub(crate) struct RunningGuard<'a> {
    running: &'a Observable<bool>,
}

impl<'a> RunningGuard<'a> {
    pub(crate) fn start(running: &'a Observable<bool>) -> Self {
        running.set(true);
        Self { running }
    }
}

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.running.set(false);
    }
}
