//! Delayed delivery of controller events as cancellable tasks.

use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerId(u64);

/// Each scheduled event is its own sleeping task. Dropping the scheduler aborts every
/// task that has not fired yet.
pub struct Scheduler<E> {
    tx: UnboundedSender<E>,
    tasks: HashMap<TimerId, JoinHandle<()>>,
    next_id: u64,
}

impl<E: Send + 'static> Scheduler<E> {
    pub fn new(tx: UnboundedSender<E>) -> Self {
        Self {
            tx,
            tasks: HashMap::new(),
            next_id: 0,
        }
    }

    /// Send `event` after `delay` unless cancelled first.
    pub fn schedule(&mut self, delay: Duration, event: E) -> TimerId {
        self.tasks.retain(|_, h| !h.is_finished());
        self.next_id += 1;
        let id = TimerId(self.next_id);
        let tx = self.tx.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = tx.send(event);
        });
        self.tasks.insert(id, handle);
        id
    }

    /// Returns false when the timer already fired or was never scheduled.
    pub fn cancel(&mut self, id: TimerId) -> bool {
        match self.tasks.remove(&id) {
            Some(h) if !h.is_finished() => {
                h.abort();
                true
            }
            _ => false,
        }
    }

    /// Abort every pending timer.
    pub fn shutdown(&mut self) {
        for (_, h) in self.tasks.drain() {
            h.abort();
        }
    }

    pub fn pending(&self) -> usize {
        self.tasks.values().filter(|h| !h.is_finished()).count()
    }
}

impl<E> Drop for Scheduler<E> {
    fn drop(&mut self) {
        for (_, h) in self.tasks.drain() {
            h.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    #[tokio::test(start_paused = true)]
    async fn fires_after_the_delay() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut s = Scheduler::new(tx);
        s.schedule(Duration::from_millis(2000), "nav");

        tokio::time::sleep(Duration::from_millis(1999)).await;
        assert!(rx.try_recv().is_err());
        tokio::time::sleep(Duration::from_millis(2)).await;
        tokio::task::yield_now().await;
        assert_eq!(rx.try_recv().ok(), Some("nav"));
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_timers_never_fire() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut s = Scheduler::new(tx);
        let a = s.schedule(Duration::from_secs(5), 1);
        s.schedule(Duration::from_secs(5), 2);
        assert!(s.cancel(a));
        assert!(!s.cancel(a));

        tokio::time::sleep(Duration::from_secs(6)).await;
        tokio::task::yield_now().await;
        assert_eq!(rx.try_recv().ok(), Some(2));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_clears_everything() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut s = Scheduler::new(tx);
        for i in 0..3 {
            s.schedule(Duration::from_secs(1), i);
        }
        assert_eq!(s.pending(), 3);
        s.shutdown();
        assert_eq!(s.pending(), 0);

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert!(rx.try_recv().is_err());
    }
}
