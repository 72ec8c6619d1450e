//! Group chat history.
//!
//! Messages are kept in `(timestamp, pilot id, index)` order. Replayed chat
//! logs overlap with live delivery, so a message whose key is already held
//! is dropped.

use chrono::{DateTime, Duration, Utc};
use tracing::warn;

use crate::protocol::{GroupId, TextMessage, TimeWindow};

/// Chat messages of the current group.
#[derive(Debug, Default)]
pub struct ChatLog {
    messages: Vec<TextMessage>,
}

fn order_key(message: &TextMessage) -> (i64, &str, u32) {
    (message.timestamp, message.pilot_id.as_str(), message.index)
}

impl ChatLog {
    /// An empty log.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a message for `group`.
    ///
    /// Returns `false` if the message belongs to another group or is a
    /// duplicate.
    pub fn insert(&mut self, group: &GroupId, message: TextMessage) -> bool {
        if &message.group_id != group {
            warn!(
                expected = %group,
                received = %message.group_id,
                "Chat message for another group"
            );
            return false;
        }
        match self
            .messages
            .binary_search_by(|held| order_key(held).cmp(&order_key(&message)))
        {
            Ok(_) => false,
            Err(position) => {
                self.messages.insert(position, message);
                true
            }
        }
    }

    /// Timestamp of the newest message held.
    #[must_use]
    pub fn last_timestamp(&self) -> Option<i64> {
        self.messages.last().map(|message| message.timestamp)
    }

    /// Messages in order.
    #[must_use]
    pub fn messages(&self) -> &[TextMessage] {
        &self.messages
    }

    /// Number of messages held.
    #[must_use]
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    /// Whether the log is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Drop the history (group change).
    pub fn clear(&mut self) {
        self.messages.clear();
    }
}

/// Window to request when replaying chat: from `since`, but never further
/// back than `max_age` before `now`.
#[must_use]
pub fn replay_window(since: Option<i64>, now: DateTime<Utc>, max_age: Duration) -> TimeWindow {
    let end = now.timestamp_millis();
    let floor = (now - max_age).timestamp_millis();
    TimeWindow {
        start: since.map_or(floor, |since| since.max(floor)),
        end,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::PilotId;

    fn msg(group: &str, pilot: &str, timestamp: i64, index: u32, text: &str) -> TextMessage {
        TextMessage {
            timestamp,
            index,
            group_id: GroupId::new(group),
            pilot_id: PilotId::new(pilot),
            text: text.to_string(),
        }
    }

    #[test]
    fn test_insert_orders_by_timestamp_then_pilot() {
        let group = GroupId::new("g");
        let mut log = ChatLog::new();
        log.insert(&group, msg("g", "p2", 20, 0, "third"));
        log.insert(&group, msg("g", "p1", 10, 0, "first"));
        log.insert(&group, msg("g", "p9", 20, 0, "fourth"));
        log.insert(&group, msg("g", "p1", 20, 0, "second"));

        let texts: Vec<&str> = log.messages().iter().map(|m| m.text.as_str()).collect();
        assert_eq!(texts, vec!["first", "second", "third", "fourth"]);
        assert_eq!(log.last_timestamp(), Some(20));
    }

    #[test]
    fn test_duplicate_is_dropped() {
        let group = GroupId::new("g");
        let mut log = ChatLog::new();
        assert!(log.insert(&group, msg("g", "p1", 10, 3, "hi")));
        assert!(!log.insert(&group, msg("g", "p1", 10, 3, "hi")));
        assert!(log.insert(&group, msg("g", "p1", 10, 4, "hi again")));
        assert_eq!(log.len(), 2);
    }

    #[test]
    fn test_wrong_group_is_rejected() {
        let mut log = ChatLog::new();
        assert!(!log.insert(&GroupId::new("g"), msg("other", "p1", 10, 0, "psst")));
        assert!(log.is_empty());
    }

    #[test]
    fn test_clear() {
        let group = GroupId::new("g");
        let mut log = ChatLog::new();
        log.insert(&group, msg("g", "p1", 10, 0, "hi"));
        log.clear();
        assert!(log.is_empty());
        assert_eq!(log.last_timestamp(), None);
    }

    #[test]
    fn test_replay_window_caps_age() {
        let now = DateTime::from_timestamp_millis(10_000_000).unwrap();
        let max_age = Duration::minutes(30);

        let window = replay_window(None, now, max_age);
        assert_eq!(window.end, 10_000_000);
        assert_eq!(window.start, 10_000_000 - 30 * 60 * 1000);

        let window = replay_window(Some(1), now, max_age);
        assert_eq!(window.start, 10_000_000 - 30 * 60 * 1000);

        let window = replay_window(Some(9_999_000), now, max_age);
        assert_eq!(window.start, 9_999_000);
    }
}
