//! Single-slot, most-recent-value cells reflecting live node state.
//!
//! A [`Publisher`] is owned by whatever instruments a node (log tailer, RPC
//! poller, simulated node). Any number of [`Observable`] readers sample the
//! latest value without ever blocking the writer.

use tokio::sync::watch;

/// Write side of an observable cell.
#[derive(Debug)]
pub struct Publisher<T> {
    tx: watch::Sender<Option<T>>,
}

/// Read side of an observable cell. Cheap to clone.
#[derive(Debug)]
pub struct Observable<T> {
    rx: watch::Receiver<Option<T>>,
}

/// Create an empty cell.
pub fn observable<T>() -> (Publisher<T>, Observable<T>) {
    let (tx, rx) = watch::channel(None);
    (Publisher { tx }, Observable { rx })
}

impl<T> Publisher<T> {
    /// Replace the current value. Succeeds even with no readers left.
    pub fn publish(&self, value: T) {
        self.tx.send_replace(Some(value));
    }

    /// Modify the current value in place, if one has been published.
    pub fn update(&self, f: impl FnOnce(&mut T)) {
        self.tx.send_if_modified(|slot| match slot {
            Some(value) => {
                f(value);
                true
            }
            None => false,
        });
    }

    pub fn subscribe(&self) -> Observable<T> {
        Observable {
            rx: self.tx.subscribe(),
        }
    }
}

impl<T: Clone> Observable<T> {
    /// A cell that already holds `value` and will never change.
    pub fn constant(value: T) -> Self {
        let (_, rx) = watch::channel(Some(value));
        Self { rx }
    }

    /// A cell that never reports a value.
    pub fn silent() -> Self {
        let (_, rx) = watch::channel(None);
        Self { rx }
    }

    /// Non-blocking read of the latest value. `None` until the first publish.
    pub fn sample(&self) -> Option<T> {
        self.rx.borrow().clone()
    }

    /// Wait until a value has been published and return it.
    ///
    /// Returns `None` if the publisher goes away without ever publishing.
    pub async fn first_value(&mut self) -> Option<T> {
        match self.rx.wait_for(Option::is_some).await {
            Ok(value) => value.clone(),
            Err(_) => None,
        }
    }
}

impl<T> Clone for Observable<T> {
    fn clone(&self) -> Self {
        Self {
            rx: self.rx.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sample_before_publish_is_none() {
        let (_publisher, obs) = observable::<u32>();
        assert_eq!(obs.sample(), None);
    }

    #[test]
    fn test_sample_sees_latest_value() {
        let (publisher, obs) = observable();
        publisher.publish(1);
        publisher.publish(2);
        assert_eq!(obs.sample(), Some(2));
        assert_eq!(obs.clone().sample(), Some(2));
    }

    #[test]
    fn test_value_survives_dropped_publisher() {
        let (publisher, obs) = observable();
        publisher.publish("last");
        drop(publisher);
        assert_eq!(obs.sample(), Some("last"));
    }

    #[test]
    fn test_update_only_after_publish() {
        let (publisher, obs) = observable::<Vec<u8>>();
        publisher.update(|v| v.push(1));
        assert_eq!(obs.sample(), None);

        publisher.publish(vec![]);
        publisher.update(|v| v.push(7));
        assert_eq!(obs.sample(), Some(vec![7]));
    }

    #[tokio::test]
    async fn test_first_value_waits_for_publish() {
        let (publisher, mut obs) = observable();
        let waiter = tokio::spawn(async move { obs.first_value().await });
        tokio::task::yield_now().await;
        publisher.publish(9u8);
        assert_eq!(waiter.await.unwrap(), Some(9));
    }

    #[tokio::test]
    async fn test_first_value_none_when_publisher_dropped() {
        let (publisher, mut obs) = observable::<u8>();
        drop(publisher);
        assert_eq!(obs.first_value().await, None);
    }

    #[test]
    fn test_constant_and_silent() {
        assert_eq!(Observable::constant(3).sample(), Some(3));
        assert_eq!(Observable::<u8>::silent().sample(), None);
    }
}
