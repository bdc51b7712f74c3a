//! Visible notification stack kept by presentation layers.
//!
//! Dismissal timing is owned by the controller, which schedules one timer per
//! notification; this list only mirrors what is currently on screen.

use crate::model::Notification;

#[derive(Debug, Default)]
pub struct Toasts {
    items: Vec<Notification>,
}

impl Toasts {
    pub fn push(&mut self, n: Notification) {
        self.items.push(n);
    }

    /// Remove a notification; unknown ids are ignored.
    pub fn dismiss(&mut self, id: u64) -> bool {
        let before = self.items.len();
        self.items.retain(|n| n.id != id);
        self.items.len() != before
    }

    pub fn newest(&self) -> Option<&Notification> {
        self.items.last()
    }

    /// Up to `max` notifications, newest first.
    pub fn visible(&self, max: usize) -> impl Iterator<Item = &Notification> {
        self.items.iter().rev().take(max)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::NotificationKind;
    use std::time::Duration;

    fn toast(id: u64) -> Notification {
        Notification {
            id,
            kind: NotificationKind::Info,
            message: format!("n{id}"),
            duration: Duration::from_secs(5),
        }
    }

    #[test]
    fn visible_is_newest_first_and_capped() {
        let mut t = Toasts::default();
        for id in 1..=5 {
            t.push(toast(id));
        }
        let ids: Vec<u64> = t.visible(3).map(|n| n.id).collect();
        assert_eq!(ids, vec![5, 4, 3]);
    }

    #[test]
    fn dismiss_removes_only_the_matching_id() {
        let mut t = Toasts::default();
        t.push(toast(1));
        t.push(toast(2));
        assert!(t.dismiss(1));
        assert!(!t.dismiss(1));
        assert_eq!(t.len(), 1);
        assert_eq!(t.newest().map(|n| n.id), Some(2));
    }
}
