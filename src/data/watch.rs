//! Re-fetch a resource whenever the backend reports a change to it.

use std::future::Future;
use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::client::ChangeFeed;

/// Latest result of a watched fetch. Dropping it stops the watcher.
pub struct ResourceWatch<T> {
    resource: String,
    rx: watch::Receiver<Option<T>>,
    task: JoinHandle<()>,
}

impl<T: Clone> ResourceWatch<T> {
    pub fn resource(&self) -> &str {
        &self.resource
    }

    /// Most recent result, `None` until the first fetch completes.
    pub fn latest(&self) -> Option<T> {
        self.rx.borrow().clone()
    }

    /// Wait for the next result. `None` once the watcher has stopped.
    pub async fn changed(&mut self) -> Option<T> {
        self.rx.changed().await.ok()?;
        self.rx.borrow_and_update().clone()
    }

    /// Extra receiver for consumers that want their own cursor.
    pub fn receiver(&self) -> watch::Receiver<Option<T>> {
        self.rx.clone()
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

impl<T> Drop for ResourceWatch<T> {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Run `fetch` once, then again after every change on `resource`.
///
/// The subscription is opened before the first fetch so no change that
/// lands in between is missed. If subscribing fails the first result is
/// still published, there are just no refreshes.
pub fn watch_resource<T, F, Fut>(
    feed: Arc<dyn ChangeFeed>,
    resource: &str,
    fetch: F,
) -> ResourceWatch<T>
where
    T: Send + Sync + 'static,
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = T> + Send,
{
    let (tx, rx) = watch::channel(None);
    let name = resource.to_string();

    let task = tokio::spawn(async move {
        let subscription = match feed.subscribe(&name).await {
            Ok(subscription) => Some(subscription),
            Err(e) => {
                tracing::warn!(resource = %name, "Change subscription failed: {}", e);
                None
            }
        };

        if tx.send(Some(fetch().await)).is_err() {
            return;
        }
        let Some(mut subscription) = subscription else {
            return;
        };

        loop {
            tokio::select! {
                event = subscription.recv() => match event {
                    Some(event) => {
                        tracing::debug!(resource = %name, kind = ?event.kind, "Change received, refreshing");
                        if tx.send(Some(fetch().await)).is_err() {
                            break;
                        }
                    }
                    None => {
                        tracing::debug!(resource = %name, "Change feed closed");
                        break;
                    }
                },
                _ = tx.closed() => break,
            }
        }
    });

    ResourceWatch {
        resource: resource.to_string(),
        rx,
        task,
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use serde_json::json;

    use super::*;
    use crate::client::{ChangeEvent, ChangeKind, Subscription};
    use crate::data::testing::FakeFeed;
    use crate::errors::AppError;

    fn insert(resource: &str) -> ChangeEvent {
        ChangeEvent {
            resource: resource.to_string(),
            kind: ChangeKind::Insert,
            record: Some(json!({"id": "z1"})),
            old_record: None,
            commit_timestamp: None,
        }
    }

    fn counting_fetch() -> (Arc<AtomicUsize>, impl Fn() -> std::future::Ready<usize> + Send + Sync) {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let fetch = move || std::future::ready(counter.fetch_add(1, Ordering::SeqCst) + 1);
        (calls, fetch)
    }

    #[tokio::test]
    async fn test_refetches_on_every_change() {
        let feed = Arc::new(FakeFeed::new());
        let (calls, fetch) = counting_fetch();
        let mut watch = watch_resource(feed.clone(), "disaster_zones", fetch);

        assert_eq!(watch.changed().await, Some(1));
        assert_eq!(feed.subscriber_count(), 1);

        feed.emit(insert("disaster_zones")).await;
        assert_eq!(watch.changed().await, Some(2));
        feed.emit(insert("disaster_zones")).await;
        assert_eq!(watch.changed().await, Some(3));

        assert_eq!(watch.latest(), Some(3));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(watch.resource(), "disaster_zones");
    }

    #[tokio::test]
    async fn test_stops_when_feed_closes() {
        let feed = Arc::new(FakeFeed::new());
        let (_, fetch) = counting_fetch();
        let mut watch = watch_resource(feed.clone(), "alerts", fetch);

        assert_eq!(watch.changed().await, Some(1));
        feed.close();
        assert_eq!(watch.changed().await, None);
        assert!(watch.is_finished());
    }

    #[tokio::test]
    async fn test_dropping_watch_releases_subscription() {
        let feed = Arc::new(FakeFeed::new());
        let (_, fetch) = counting_fetch();
        let mut watch = watch_resource(feed.clone(), "disaster_zones", fetch);
        assert_eq!(watch.changed().await, Some(1));
        assert_eq!(feed.open_subscriptions(), 1);

        drop(watch);
        for _ in 0..50 {
            if feed.open_subscriptions() == 0 {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        assert_eq!(feed.open_subscriptions(), 0);
    }

    struct BrokenFeed;

    #[async_trait]
    impl ChangeFeed for BrokenFeed {
        async fn subscribe(&self, _resource: &str) -> Result<Subscription, AppError> {
            Err(AppError::Realtime("socket refused".into()))
        }
    }

    #[tokio::test]
    async fn test_initial_fetch_survives_subscribe_failure() {
        let (calls, fetch) = counting_fetch();
        let mut watch = watch_resource(Arc::new(BrokenFeed), "posts", fetch);

        assert_eq!(watch.changed().await, Some(1));
        assert_eq!(watch.changed().await, None);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
