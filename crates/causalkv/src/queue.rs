//! Bounded rendezvous queue pairing pending items with pending takers.
//!
//! Both sides are bounded: producers wait once `capacity` items are parked,
//! and takers wait once `max_takers` continuations are parked. When a taker
//! is already parked an offered item is handed to it directly, so an item is
//! never stored while a taker waits. `close` wakes every waiter; offers and
//! takes after close are no-ops.

use std::collections::VecDeque;
use std::sync::Mutex;

use tokio::sync::oneshot;

struct Inner<T> {
    items: VecDeque<T>,
    takers: VecDeque<oneshot::Sender<T>>,
    offer_waiters: Vec<oneshot::Sender<()>>,
    taker_waiters: Vec<oneshot::Sender<()>>,
    closed: bool,
}

/// Two-sided bounded queue; see the module docs.
pub struct RendezvousQueue<T> {
    inner: Mutex<Inner<T>>,
    capacity: usize,
    max_takers: usize,
}

enum TakeWait<T> {
    Item(oneshot::Receiver<T>),
    Slot(oneshot::Receiver<()>),
}

impl<T> RendezvousQueue<T> {
    /// Creates a queue holding at most `capacity` items and `max_takers`
    /// parked takers.
    pub fn new(capacity: usize, max_takers: usize) -> Self {
        assert!(capacity > 0, "queue capacity must be positive");
        assert!(max_takers > 0, "taker capacity must be positive");
        Self {
            inner: Mutex::new(Inner {
                items: VecDeque::new(),
                takers: VecDeque::new(),
                offer_waiters: Vec::new(),
                taker_waiters: Vec::new(),
                closed: false,
            }),
            capacity,
            max_takers,
        }
    }

    /// Offers an item, waiting while the items side is at capacity. Returns
    /// `false` if the queue was (or becomes) closed; the item is dropped in
    /// that case.
    pub async fn offer(&self, mut item: T) -> bool {
        loop {
            let wait = {
                let mut inner = self.inner.lock().unwrap();
                if inner.closed {
                    return false;
                }
                // Hand off directly when a taker is parked, skipping takers
                // whose futures have since been dropped.
                loop {
                    match inner.takers.pop_front() {
                        Some(taker) => match taker.send(item) {
                            Ok(()) => {
                                for waiter in inner.taker_waiters.drain(..) {
                                    let _ = waiter.send(());
                                }
                                return true;
                            }
                            Err(returned) => item = returned,
                        },
                        None => break,
                    }
                }
                if inner.items.len() < self.capacity {
                    inner.items.push_back(item);
                    return true;
                }
                let (notify, wait) = oneshot::channel();
                inner.offer_waiters.push(notify);
                wait
            };
            // Woken when an item is consumed or the queue closes; re-check.
            let _ = wait.await;
        }
    }

    /// Takes the next item, parking if none is available. Returns `None`
    /// once the queue is closed.
    pub async fn take(&self) -> Option<T> {
        loop {
            let wait = {
                let mut inner = self.inner.lock().unwrap();
                if inner.closed {
                    return None;
                }
                if let Some(item) = inner.items.pop_front() {
                    for waiter in inner.offer_waiters.drain(..) {
                        let _ = waiter.send(());
                    }
                    return Some(item);
                }
                if inner.takers.len() < self.max_takers {
                    let (handoff, wait) = oneshot::channel();
                    inner.takers.push_back(handoff);
                    TakeWait::Item(wait)
                } else {
                    let (notify, wait) = oneshot::channel();
                    inner.taker_waiters.push(notify);
                    TakeWait::Slot(wait)
                }
            };
            match wait {
                // Sender dropped means the queue closed underneath us.
                TakeWait::Item(wait) => return wait.await.ok(),
                TakeWait::Slot(wait) => {
                    let _ = wait.await;
                }
            }
        }
    }

    /// Closes the queue: parked items and takers are dropped and every
    /// waiter wakes. Subsequent offers and takes are no-ops.
    pub fn close(&self) {
        let mut inner = self.inner.lock().unwrap();
        if inner.closed {
            return;
        }
        inner.closed = true;
        inner.items.clear();
        inner.takers.clear();
        inner.offer_waiters.clear();
        inner.taker_waiters.clear();
    }

    /// Whether `close` has been called.
    pub fn is_closed(&self) -> bool {
        self.inner.lock().unwrap().closed
    }

    /// Number of items currently parked.
    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().items.len()
    }

    /// Whether no items are parked.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn offer_then_take() {
        let queue = RendezvousQueue::new(4, 1);
        assert!(queue.offer(7u32).await);
        assert_eq!(queue.take().await, Some(7));
    }

    #[tokio::test]
    async fn take_parks_until_offer() {
        let queue = Arc::new(RendezvousQueue::new(4, 1));
        let taker = {
            let queue = Arc::clone(&queue);
            tokio::spawn(async move { queue.take().await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(queue.offer(11u32).await);
        assert_eq!(taker.await.unwrap(), Some(11));
        // The direct handoff never parked the item.
        assert!(queue.is_empty());
    }

    #[tokio::test]
    async fn fifo_order() {
        let queue = RendezvousQueue::new(8, 1);
        for n in 0..5u32 {
            assert!(queue.offer(n).await);
        }
        for n in 0..5u32 {
            assert_eq!(queue.take().await, Some(n));
        }
    }

    #[tokio::test]
    async fn offer_blocks_at_capacity() {
        let queue = Arc::new(RendezvousQueue::new(2, 1));
        assert!(queue.offer(0u32).await);
        assert!(queue.offer(1u32).await);

        let blocked = {
            let queue = Arc::clone(&queue);
            tokio::spawn(async move { queue.offer(2u32).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!blocked.is_finished());

        assert_eq!(queue.take().await, Some(0));
        assert!(blocked.await.unwrap());
        assert_eq!(queue.len(), 2);
    }

    #[tokio::test]
    async fn close_discards_offers() {
        let queue = RendezvousQueue::new(2, 1);
        queue.close();
        assert!(!queue.offer(1u32).await);
        assert_eq!(queue.take().await, None);
    }

    #[tokio::test]
    async fn close_wakes_parked_taker() {
        let queue = Arc::new(RendezvousQueue::<u32>::new(2, 1));
        let taker = {
            let queue = Arc::clone(&queue);
            tokio::spawn(async move { queue.take().await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        queue.close();
        assert_eq!(taker.await.unwrap(), None);
    }

    #[tokio::test]
    async fn close_wakes_blocked_offer() {
        let queue = Arc::new(RendezvousQueue::new(1, 1));
        assert!(queue.offer(0u32).await);
        let blocked = {
            let queue = Arc::clone(&queue);
            tokio::spawn(async move { queue.offer(1u32).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        queue.close();
        assert!(!blocked.await.unwrap());
    }

    #[tokio::test]
    async fn close_drops_parked_items() {
        let queue = RendezvousQueue::new(4, 1);
        assert!(queue.offer(1u32).await);
        queue.close();
        assert!(queue.is_empty());
        assert!(queue.is_closed());
    }

    #[tokio::test]
    async fn taker_side_is_bounded() {
        let queue = Arc::new(RendezvousQueue::<u32>::new(2, 1));
        let first = {
            let queue = Arc::clone(&queue);
            tokio::spawn(async move { queue.take().await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        // Second taker must wait for a taker slot, not park alongside.
        let second = {
            let queue = Arc::clone(&queue);
            tokio::spawn(async move { queue.take().await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(queue.offer(1u32).await);
        assert_eq!(first.await.unwrap(), Some(1));
        assert!(queue.offer(2u32).await);
        assert_eq!(second.await.unwrap(), Some(2));
    }
}
