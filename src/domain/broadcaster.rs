//! One-shot multicast channel with replay for late subscribers.
//!
//! [`Broadcaster`] wraps a [`tokio::sync::watch`] channel whose slot starts
//! empty and is filled exactly once with the terminal [`Outcome`]. Every
//! [`Subscription`] observes that single outcome no matter whether it was
//! created before or after the outcome was published.

use std::sync::Arc;

use futures_util::stream::{self, Stream, StreamExt};
use tokio::sync::watch;

use super::RegistryError;

/// Terminal event carried by a [`Broadcaster`].
pub type Outcome<T> = Result<T, RegistryError>;

/// Multicast completion channel bound to a single terminal event.
///
/// Cloning a `Broadcaster` yields another handle to the same slot.
#[derive(Debug)]
pub struct Broadcaster<T> {
    sender: Arc<watch::Sender<Option<Outcome<T>>>>,
}

impl<T> Clone for Broadcaster<T> {
    fn clone(&self) -> Self {
        Self {
            sender: Arc::clone(&self.sender),
        }
    }
}

impl<T: Clone> Broadcaster<T> {
    /// Creates a broadcaster with no terminal event yet.
    #[must_use]
    pub fn new() -> Self {
        let (sender, _) = watch::channel(None);
        Self {
            sender: Arc::new(sender),
        }
    }

    /// Publishes the terminal event.
    ///
    /// Only the first call wins. Returns `false` (and drops `outcome`) if a
    /// terminal event was already published.
    pub fn publish(&self, outcome: Outcome<T>) -> bool {
        let mut pending = Some(outcome);
        self.sender.send_if_modified(|slot| {
            if slot.is_some() {
                return false;
            }
            *slot = pending.take();
            true
        })
    }

    /// Creates a new subscription. If the terminal event is already
    /// published, the subscription replays it immediately.
    #[must_use]
    pub fn subscribe(&self) -> Subscription<T> {
        Subscription {
            receiver: self.sender.subscribe(),
        }
    }

    /// Returns the number of live subscriptions.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl<T: Clone> Default for Broadcaster<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// One subscriber's view of a [`Broadcaster`].
///
/// Dropping a subscription only withdraws this subscriber's interest; the
/// broadcaster and the other subscribers are unaffected.
#[derive(Debug)]
pub struct Subscription<T> {
    receiver: watch::Receiver<Option<Outcome<T>>>,
}

impl<T: Clone> Subscription<T> {
    /// Waits for the terminal event.
    ///
    /// Returns `None` if every broadcaster handle was dropped without
    /// publishing anything.
    pub async fn recv(mut self) -> Option<Outcome<T>> {
        match self.receiver.wait_for(Option::is_some).await {
            Ok(slot) => slot.clone(),
            Err(_) => None,
        }
    }

    /// Converts the subscription into a stream that yields zero or one
    /// item and then ends.
    pub fn into_stream(self) -> impl Stream<Item = Outcome<T>> + Send
    where
        T: Send + Sync + 'static,
    {
        stream::once(self.recv()).filter_map(futures_util::future::ready)
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use tokio_test::{assert_pending, assert_ready};

    #[tokio::test]
    async fn early_subscribers_receive_value() {
        let broadcaster = Broadcaster::<u32>::new();
        let first = broadcaster.subscribe();
        let second = broadcaster.subscribe();
        assert_eq!(broadcaster.subscriber_count(), 2);

        assert!(broadcaster.publish(Ok(7)));

        let (a, b) = tokio::join!(first.recv(), second.recv());
        let (Some(Ok(a)), Some(Ok(b))) = (a, b) else {
            panic!("both subscribers should see the value");
        };
        assert_eq!((a, b), (7, 7));
    }

    #[tokio::test]
    async fn late_subscriber_gets_replay() {
        let broadcaster = Broadcaster::<String>::new();
        assert!(broadcaster.publish(Ok("done".to_string())));

        let Some(Ok(value)) = broadcaster.subscribe().recv().await else {
            panic!("late subscriber should replay");
        };
        assert_eq!(value, "done");
    }

    #[tokio::test]
    async fn only_first_publish_wins() {
        let broadcaster = Broadcaster::<u32>::new();
        assert!(broadcaster.publish(Err(RegistryError::Timeout {
            key: "k".to_string(),
            deadline_ms: 10,
        })));
        assert!(!broadcaster.publish(Ok(1)));

        let Some(Err(err)) = broadcaster.subscribe().recv().await else {
            panic!("expected the first (error) outcome");
        };
        assert!(err.is_timeout());
    }

    #[test]
    fn subscription_pending_until_publish() {
        let broadcaster = Broadcaster::<u32>::new();
        let mut fut = tokio_test::task::spawn(broadcaster.subscribe().recv());
        assert_pending!(fut.poll());

        broadcaster.publish(Ok(3));
        assert!(fut.is_woken());
        let outcome = assert_ready!(fut.poll());
        assert!(matches!(outcome, Some(Ok(3))));
    }

    #[tokio::test]
    async fn dropped_subscription_does_not_affect_others() {
        let broadcaster = Broadcaster::<u32>::new();
        let kept = broadcaster.subscribe();
        let dropped = broadcaster.subscribe();
        drop(dropped);
        assert_eq!(broadcaster.subscriber_count(), 1);

        broadcaster.publish(Ok(9));
        assert!(matches!(kept.recv().await, Some(Ok(9))));
    }

    #[tokio::test]
    async fn abandoned_broadcaster_yields_none() {
        let broadcaster = Broadcaster::<u32>::new();
        let subscription = broadcaster.subscribe();
        drop(broadcaster);
        assert!(subscription.recv().await.is_none());
    }

    #[tokio::test]
    async fn stream_yields_single_item() {
        let broadcaster = Broadcaster::<u32>::new();
        let stream = broadcaster.subscribe().into_stream();
        broadcaster.publish(Ok(5));

        let items: Vec<_> = stream.collect().await;
        assert_eq!(items.len(), 1);
        assert!(matches!(items.first(), Some(Ok(5))));
    }

    #[tokio::test]
    async fn stream_of_abandoned_broadcaster_is_empty() {
        let broadcaster = Broadcaster::<u32>::new();
        let stream = broadcaster.subscribe().into_stream();
        drop(broadcaster);

        let items: Vec<_> = stream.collect().await;
        assert!(items.is_empty());
    }
}
