//! Promise/completion pairs bridging wgpu callbacks to the caller thread.
//!
//! Callbacks only publish into the promise. The thread that owns the
//! [`Context`](crate::Context) drives the device until the completion is
//! ready; nothing resolves unless that thread keeps polling.

use futures::channel::oneshot;

/// Sending half, moved into a wgpu callback.
#[derive(Debug)]
pub struct Promise<T> {
    tx: oneshot::Sender<T>,
}

/// Receiving half, handed back to the caller.
#[derive(Debug)]
#[must_use = "a completion does nothing unless waited on"]
pub struct Completion<T = ()> {
    rx: oneshot::Receiver<T>,
}

pub fn completion<T>() -> (Promise<T>, Completion<T>) {
    let (tx, rx) = oneshot::channel();
    (Promise { tx }, Completion { rx })
}

impl<T> Promise<T> {
    pub fn resolve(self, value: T) {
        // The caller may have given up on the completion; nothing to do then.
        let _ = self.tx.send(value);
    }
}

/// Readiness of a completion after one check.
#[derive(Debug, PartialEq, Eq)]
pub enum Poll<T> {
    Ready(T),
    Pending,
    /// The promise was dropped without resolving.
    Dropped,
}

impl<T> Completion<T> {
    /// Check without blocking.
    pub fn try_take(&mut self) -> Poll<T> {
        match self.rx.try_recv() {
            Ok(Some(value)) => Poll::Ready(value),
            Ok(None) => Poll::Pending,
            Err(oneshot::Canceled) => Poll::Dropped,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pending_then_ready() {
        let (promise, mut done) = completion::<u32>();
        assert_eq!(done.try_take(), Poll::Pending);
        promise.resolve(7);
        assert_eq!(done.try_take(), Poll::Ready(7));
    }

    #[test]
    fn test_dropped_promise() {
        let (promise, mut done) = completion::<()>();
        drop(promise);
        assert_eq!(done.try_take(), Poll::Dropped);
    }

    #[test]
    fn test_resolve_from_callback_thread() {
        let (promise, mut done) = completion();
        std::thread::spawn(move || promise.resolve("copied"))
            .join()
            .unwrap();
        assert_eq!(done.try_take(), Poll::Ready("copied"));
    }

    #[test]
    fn test_resolve_after_completion_dropped() {
        let (promise, done) = completion::<u8>();
        drop(done);
        promise.resolve(1);
    }
}
