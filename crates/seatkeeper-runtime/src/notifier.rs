//! Versioned, pull-based state publication.
//!
//! An [`Updater`] publishes; any number of [`Notifier`] clones read. Only
//! the latest state is kept: a slow reader asking with a stale count gets
//! the newest record, never a backlog. Asking with the *current* count
//! suspends until the next publication. Waiters are resolved in the order
//! they started waiting.

use std::collections::VecDeque;
use std::sync::Arc;

use futures::Stream;
use parking_lot::Mutex;
use seatkeeper_types::{Result, SeatkeeperError, UpdateRecord};
use tokio::sync::oneshot;
use tracing::debug;

type Waiter<T> = oneshot::Sender<Result<UpdateRecord<T>>>;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Status {
    Live,
    Finished,
    Failed(String),
    /// The updater was dropped without finishing.
    Closed,
}

struct State<T> {
    latest: Option<UpdateRecord<T>>,
    status: Status,
    waiters: VecDeque<Waiter<T>>,
}

impl<T> State<T> {
    fn count(&self) -> u64 {
        self.latest.as_ref().map_or(0, |r| r.update_count)
    }
}

/// Create a linked notifier / updater pair. `initial`, if given, is
/// published as update 1.
#[must_use]
pub fn notifier_kit<T: Clone + Send + 'static>(initial: Option<T>) -> (Notifier<T>, Updater<T>) {
    let shared = Arc::new(Mutex::new(State {
        latest: initial.map(|value| UpdateRecord::new(value, 1)),
        status: Status::Live,
        waiters: VecDeque::new(),
    }));
    (
        Notifier {
            shared: shared.clone(),
        },
        Updater { shared },
    )
}

/// Read side. Cheap to clone.
pub struct Notifier<T> {
    shared: Arc<Mutex<State<T>>>,
}

impl<T> Clone for Notifier<T> {
    fn clone(&self) -> Self {
        Self {
            shared: self.shared.clone(),
        }
    }
}

impl<T> std::fmt::Debug for Notifier<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.shared.lock();
        f.debug_struct("Notifier")
            .field("update_count", &state.count())
            .field("status", &state.status)
            .finish_non_exhaustive()
    }
}

impl<T: Clone + Send + 'static> Notifier<T> {
    /// The latest record, or wait for a newer one.
    ///
    /// Returns immediately unless `since` equals the current count (or
    /// nothing has been published yet). After `finish` the final record
    /// is returned for any `since`.
    ///
    /// # Errors
    /// `NotifierFailed` after `fail`, `NotifierClosed` if the updater
    /// went away.
    pub async fn get_update_since(&self, since: Option<u64>) -> Result<UpdateRecord<T>> {
        let receiver = {
            let mut state = self.shared.lock();
            match &state.status {
                Status::Failed(reason) => {
                    return Err(SeatkeeperError::NotifierFailed {
                        reason: reason.clone(),
                    });
                }
                Status::Finished | Status::Closed => {
                    return match &state.latest {
                        Some(latest) if state.status == Status::Finished => Ok(latest.clone()),
                        _ => Err(SeatkeeperError::NotifierClosed),
                    };
                }
                Status::Live => {}
            }
            if let Some(latest) = &state.latest {
                if since != Some(latest.update_count) {
                    return Ok(latest.clone());
                }
            }
            // Drop waiters whose callers stopped listening.
            state.waiters.retain(|waiter| !waiter.is_closed());
            let (sender, receiver) = oneshot::channel();
            state.waiters.push_back(sender);
            receiver
        };
        receiver.await.map_err(|_| SeatkeeperError::NotifierClosed)?
    }

    /// The current count without waiting. 0 before any publication.
    #[must_use]
    pub fn update_count(&self) -> u64 {
        self.shared.lock().count()
    }

    /// Every state change as a stream, built by re-asking with the count
    /// of the last record. Intermediate states a slow consumer missed are
    /// skipped. Ends after the final record of a finished notifier, or on
    /// failure.
    pub fn updates(&self) -> impl Stream<Item = UpdateRecord<T>> + Send + 'static {
        let notifier = self.clone();
        futures::stream::unfold(
            (notifier, None::<u64>),
            |(notifier, since)| async move {
                let record = notifier.get_update_since(since).await.ok()?;
                if Some(record.update_count) == since {
                    return None;
                }
                let next = Some(record.update_count);
                Some((record, (notifier, next)))
            },
        )
    }
}

/// Write side, held by the publishing instance.
pub struct Updater<T> {
    shared: Arc<Mutex<State<T>>>,
}

impl<T> std::fmt::Debug for Updater<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Updater")
            .field("update_count", &self.shared.lock().count())
            .finish_non_exhaustive()
    }
}

impl<T: Clone> Updater<T> {
    /// Publish a new state. Returns its update count.
    ///
    /// # Errors
    /// `NotifierFinished` once the notifier has been finished or failed.
    pub fn update_state(&self, value: T) -> Result<u64> {
        let mut state = self.shared.lock();
        if state.status != Status::Live {
            return Err(SeatkeeperError::NotifierFinished);
        }
        let count = state.count() + 1;
        let record = UpdateRecord::new(value, count);
        state.latest = Some(record.clone());
        let woken = state.waiters.len();
        for waiter in state.waiters.drain(..) {
            let _ = waiter.send(Ok(record.clone()));
        }
        debug!(update_count = count, woken, "notifier updated");
        Ok(count)
    }

    /// Publish a final state and stop accepting updates.
    ///
    /// # Errors
    /// `NotifierFinished` if already finished or failed.
    pub fn finish(&self, value: T) -> Result<u64> {
        let count = self.update_state(value)?;
        self.shared.lock().status = Status::Finished;
        Ok(count)
    }

    /// Terminate with an error visible to every reader.
    pub fn fail(&self, reason: impl Into<String>) {
        let reason = reason.into();
        let mut state = self.shared.lock();
        if state.status != Status::Live {
            return;
        }
        state.status = Status::Failed(reason.clone());
        for waiter in state.waiters.drain(..) {
            let _ = waiter.send(Err(SeatkeeperError::NotifierFailed {
                reason: reason.clone(),
            }));
        }
    }
}

impl<T> Drop for Updater<T> {
    fn drop(&mut self) {
        let mut state = self.shared.lock();
        if state.status == Status::Live {
            state.status = Status::Closed;
        }
        // Dropping the senders wakes every waiter with `NotifierClosed`.
        state.waiters.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use std::time::Duration;
    use tokio::time::timeout;

    #[tokio::test]
    async fn initial_state_is_update_one() {
        let (notifier, _updater) = notifier_kit(Some("hello"));
        let record = notifier.get_update_since(None).await.unwrap();
        assert_eq!(record, UpdateRecord::new("hello", 1));
    }

    #[tokio::test]
    async fn stale_count_returns_latest_only() {
        let (notifier, updater) = notifier_kit(Some(0));
        for v in 1..=5 {
            updater.update_state(v).unwrap();
        }
        let record = notifier.get_update_since(Some(2)).await.unwrap();
        assert_eq!(record.value, 5);
        assert_eq!(record.update_count, 6);
    }

    #[tokio::test]
    async fn current_count_suspends_until_update() {
        let (notifier, updater) = notifier_kit(Some(0));
        let waiting = notifier.get_update_since(Some(1));
        tokio::pin!(waiting);
        assert!(timeout(Duration::from_millis(20), &mut waiting).await.is_err());

        updater.update_state(7).unwrap();
        let record = waiting.await.unwrap();
        assert_eq!(record, UpdateRecord::new(7, 2));
    }

    #[tokio::test]
    async fn nothing_published_suspends() {
        let (notifier, updater) = notifier_kit::<u8>(None);
        let reader = tokio::spawn(async move { notifier.get_update_since(None).await });
        tokio::task::yield_now().await;
        updater.update_state(9).unwrap();
        assert_eq!(reader.await.unwrap().unwrap(), UpdateRecord::new(9, 1));
    }

    #[tokio::test]
    async fn waiters_resolve_in_arrival_order() {
        let (notifier, updater) = notifier_kit(Some(0u32));
        let order = Arc::new(Mutex::new(Vec::new()));
        let mut tasks = Vec::new();
        for i in 0..3 {
            let (n, o) = (notifier.clone(), order.clone());
            tasks.push(tokio::spawn(async move {
                let record = n.get_update_since(Some(1)).await.unwrap();
                o.lock().push(i);
                record.update_count
            }));
            // Let each waiter register before the next one starts.
            while notifier.shared.lock().waiters.len() <= i {
                tokio::task::yield_now().await;
            }
        }
        updater.update_state(1).unwrap();
        for task in tasks {
            assert_eq!(task.await.unwrap(), 2);
        }
        assert_eq!(*order.lock(), vec![0, 1, 2]);
    }

    #[tokio::test]
    async fn abandoned_waits_do_not_accumulate() {
        let (notifier, updater) = notifier_kit(Some(0u32));
        for _ in 0..1000 {
            let waited = timeout(Duration::ZERO, notifier.get_update_since(Some(1))).await;
            assert!(waited.is_err());
        }
        assert!(notifier.shared.lock().waiters.len() <= 1);

        // A live waiter is still served after all that.
        let waiting = notifier.get_update_since(Some(1));
        tokio::pin!(waiting);
        assert!(timeout(Duration::from_millis(10), &mut waiting).await.is_err());
        updater.update_state(5).unwrap();
        assert_eq!(waiting.await.unwrap(), UpdateRecord::new(5, 2));
    }

    #[tokio::test]
    async fn counts_strictly_increase() {
        let (notifier, updater) = notifier_kit(Some(0u64));
        let reader = tokio::spawn(async move {
            let mut seen = Vec::new();
            let mut since = None;
            while seen.len() < 4 {
                let record = notifier.get_update_since(since).await.unwrap();
                since = Some(record.update_count);
                seen.push(record.update_count);
            }
            seen
        });
        for v in 1..=10 {
            updater.update_state(v).unwrap();
            tokio::task::yield_now().await;
        }
        let seen = reader.await.unwrap();
        assert!(seen.windows(2).all(|w| w[0] < w[1]));
    }

    #[tokio::test]
    async fn fail_rejects_waiters_and_later_callers() {
        let (notifier, updater) = notifier_kit(Some(1));
        let waiter = {
            let n = notifier.clone();
            tokio::spawn(async move { n.get_update_since(Some(1)).await })
        };
        while notifier.shared.lock().waiters.is_empty() {
            tokio::task::yield_now().await;
        }
        updater.fail("boom");
        assert!(matches!(
            waiter.await.unwrap().unwrap_err(),
            SeatkeeperError::NotifierFailed { .. }
        ));
        assert!(matches!(
            notifier.get_update_since(None).await.unwrap_err(),
            SeatkeeperError::NotifierFailed { .. }
        ));
        assert!(matches!(
            updater.update_state(2).unwrap_err(),
            SeatkeeperError::NotifierFinished
        ));
    }

    #[tokio::test]
    async fn finished_returns_final_forever() {
        let (notifier, updater) = notifier_kit(Some("a"));
        updater.finish("z").unwrap();
        let record = notifier.get_update_since(Some(2)).await.unwrap();
        assert_eq!(record, UpdateRecord::new("z", 2));
        assert!(updater.update_state("again").is_err());
    }

    #[tokio::test]
    async fn dropped_updater_closes_waiters() {
        let (notifier, updater) = notifier_kit(Some(1));
        let waiter = {
            let n = notifier.clone();
            tokio::spawn(async move { n.get_update_since(Some(1)).await })
        };
        while notifier.shared.lock().waiters.is_empty() {
            tokio::task::yield_now().await;
        }
        drop(updater);
        assert!(matches!(
            waiter.await.unwrap().unwrap_err(),
            SeatkeeperError::NotifierClosed
        ));
    }

    #[tokio::test]
    async fn stream_ends_after_finish() {
        let (notifier, updater) = notifier_kit(Some(0));
        updater.update_state(1).unwrap();
        updater.finish(2).unwrap();
        let values: Vec<_> = notifier.updates().map(|r| r.value).collect().await;
        assert_eq!(values, vec![2]);
    }
}
