use std::{
    fmt,
    time::{Duration, Instant},
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Level {
    Info,
    Success,
    Warning,
    Error,
}

impl Level {
    fn icon(&self) -> &'static str {
        match self {
            Level::Info => "ℹ️",
            Level::Success => "✅",
            Level::Warning => "⚠️",
            Level::Error => "❌",
        }
    }
}

#[derive(Clone, Debug)]
pub struct Notification {
    pub id: u64,
    pub level: Level,
    pub message: String,
    pub created_at: Instant,
}

impl fmt::Display for Notification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.level.icon(), self.message)
    }
}

/// Transient notifications, each visible for a fixed duration.
#[derive(Debug)]
pub struct Notifier {
    ttl: Duration,
    items: Vec<Notification>,
    next_id: u64,
    seen: u64,
}

impl Notifier {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            items: Vec::new(),
            next_id: 0,
            seen: 0,
        }
    }

    pub fn push(&mut self, level: Level, message: impl Into<String>) {
        self.push_at(level, message, Instant::now());
    }

    fn push_at(&mut self, level: Level, message: impl Into<String>, now: Instant) {
        let message = message.into();
        match level {
            Level::Error => log::error!("{message}"),
            Level::Warning => log::warn!("{message}"),
            Level::Info | Level::Success => log::info!("{message}"),
        }
        self.prune(now);
        self.items.push(Notification {
            id: self.next_id,
            level,
            message,
            created_at: now,
        });
        self.next_id += 1;
    }

    /// Drop expired notifications and return the ones still visible.
    pub fn active(&mut self) -> &[Notification] {
        self.active_at(Instant::now())
    }

    fn active_at(&mut self, now: Instant) -> &[Notification] {
        self.prune(now);
        &self.items
    }

    fn prune(&mut self, now: Instant) {
        let ttl = self.ttl;
        self.items
            .retain(|item| now.saturating_duration_since(item.created_at) < ttl);
    }

    /// The most recent notification still visible.
    pub fn latest(&mut self) -> Option<&Notification> {
        self.prune(Instant::now());
        self.items.last()
    }

    /// Visible notifications pushed since the previous call.
    pub fn take_unseen(&mut self) -> Vec<Notification> {
        self.prune(Instant::now());
        let seen = self.seen;
        self.seen = self.next_id;
        self.items
            .iter()
            .filter(|item| item.id >= seen)
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn notifications_expire_after_ttl() {
        let mut notifier = Notifier::new(Duration::from_millis(4_000));
        let start = Instant::now();
        notifier.push_at(Level::Error, "Please select a valid image file", start);
        let later = start + Duration::from_millis(3_000);
        notifier.push_at(Level::Success, "Analysis complete!", later);

        assert_eq!(notifier.active_at(start + Duration::from_millis(3_999)).len(), 2);

        let remaining = notifier.active_at(start + Duration::from_millis(4_000));
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].message, "Analysis complete!");

        assert!(notifier.active_at(start + Duration::from_millis(7_000)).is_empty());
    }

    #[test]
    fn push_drops_expired_notifications() {
        let mut notifier = Notifier::new(Duration::from_millis(4_000));
        let start = Instant::now();
        for n in 0..10 {
            notifier.push_at(Level::Info, format!("note {n}"), start);
        }
        notifier.push_at(Level::Error, "Camera error", start + Duration::from_millis(5_000));
        assert_eq!(notifier.items.len(), 1);
        assert_eq!(notifier.items[0].message, "Camera error");
    }

    #[test]
    fn expired_notifications_are_not_latest_or_unseen() {
        let mut notifier = Notifier::new(Duration::from_millis(4_000));
        let Some(long_ago) = Instant::now().checked_sub(Duration::from_secs(10)) else {
            return;
        };
        notifier.push_at(Level::Warning, "stale", long_ago);
        assert!(notifier.latest().is_none());
        assert!(notifier.take_unseen().is_empty());
    }

    #[test]
    fn unseen_notifications_are_returned_once() {
        let mut notifier = Notifier::new(Duration::from_secs(60));
        notifier.push(Level::Info, "one");
        notifier.push(Level::Info, "two");
        let unseen: Vec<_> = notifier.take_unseen().into_iter().map(|n| n.message).collect();
        assert_eq!(unseen, vec!["one", "two"]);
        assert!(notifier.take_unseen().is_empty());

        notifier.push(Level::Error, "three");
        assert_eq!(notifier.take_unseen().len(), 1);
    }

    #[test]
    fn display_prefixes_level_icon() {
        let mut notifier = Notifier::new(Duration::from_secs(1));
        notifier.push(Level::Warning, "System initialization in progress...");
        let latest = notifier.latest().unwrap();
        assert_eq!(latest.to_string(), "⚠️ System initialization in progress...");
    }
}
