//! Last-value-cached state cell
//!
//! A single owner publishes whole values; any number of subscribers can read
//! the latest value synchronously and await the next one. Each publish bumps
//! a version stamp so callers can tell exactly how many snapshots went out.
//!
//! Backed by `tokio::sync::watch`: subscribers never see a half-applied
//! update, and a slow subscriber only ever observes the newest value.

use tokio::sync::watch;

/// Published state with a version stamp
pub struct Observable<T> {
    tx: watch::Sender<T>,
    version: u64,
}

impl<T: Clone> Observable<T> {
    pub fn new(initial: T) -> Self {
        let (tx, _) = watch::channel(initial);
        Self { tx, version: 0 }
    }

    /// Clone of the current value
    pub fn get(&self) -> T {
        self.tx.borrow().clone()
    }

    /// Run `f` against the current value without cloning it
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        f(&self.tx.borrow())
    }

    /// Replace the value and notify every subscriber
    pub fn publish(&mut self, value: T) {
        self.tx.send_replace(value);
        self.version += 1;
    }

    /// Receiver whose `borrow()` yields the latest value immediately
    pub fn subscribe(&self) -> watch::Receiver<T> {
        self.tx.subscribe()
    }

    /// Number of values published since construction
    pub fn version(&self) -> u64 {
        self.version
    }
}

impl<T: Clone + Default> Default for Observable<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}
