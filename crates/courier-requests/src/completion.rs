//! # Completion Cell
//!
//! A write-once slot with wake-on-completion. One side calls
//! [`complete`](CompletionCell::complete); any number of tasks may
//! [`wait`](CompletionCell::wait) for the value without polling.

use std::sync::OnceLock;
use tokio::sync::Notify;

#[derive(Debug)]
pub struct CompletionCell<T> {
    value: OnceLock<T>,
    notify: Notify,
}

impl<T> CompletionCell<T> {
    pub fn new() -> Self {
        Self {
            value: OnceLock::new(),
            notify: Notify::new(),
        }
    }

    /// Store `value` and wake every waiter.
    ///
    /// Only the first call writes; later calls return `false` and drop their value.
    pub fn complete(&self, value: T) -> bool {
        match self.value.set(value) {
            Ok(()) => {
                self.notify.notify_waiters();
                true
            }
            Err(_) => false,
        }
    }

    /// The value, if already written.
    pub fn get(&self) -> Option<&T> {
        self.value.get()
    }

    pub fn is_complete(&self) -> bool {
        self.value.get().is_some()
    }

    /// Suspend until the value is written.
    pub async fn wait(&self) -> &T {
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            // Register before checking, so a completion between the check and
            // the await still wakes us.
            notified.as_mut().enable();

            if let Some(value) = self.value.get() {
                return value;
            }
            notified.await;
        }
    }
}

impl<T> Default for CompletionCell<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    #[test]
    fn test_first_write_wins() {
        let cell = CompletionCell::new();
        assert!(!cell.is_complete());
        assert!(cell.complete(1));
        assert!(!cell.complete(2));
        assert_eq!(cell.get(), Some(&1));
    }

    #[tokio::test]
    async fn test_wait_returns_immediately_when_complete() {
        let cell = CompletionCell::new();
        cell.complete("done");
        assert_eq!(*cell.wait().await, "done");
    }

    #[tokio::test]
    async fn test_wakes_every_waiter() {
        let cell = Arc::new(CompletionCell::new());
        let waiters: Vec<_> = (0..4)
            .map(|_| {
                let cell = Arc::clone(&cell);
                tokio::spawn(async move { *cell.wait().await })
            })
            .collect();

        tokio::task::yield_now().await;
        assert!(cell.complete(7u32));

        for waiter in waiters {
            assert_eq!(waiter.await.unwrap(), 7);
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_completion_from_another_thread() {
        let cell = Arc::new(CompletionCell::new());
        let writer = Arc::clone(&cell);

        std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(20));
            writer.complete(String::from("late"));
        });

        let value = tokio::time::timeout(Duration::from_secs(5), cell.wait())
            .await
            .expect("waiter was never woken");
        assert_eq!(value, "late");
    }
}
