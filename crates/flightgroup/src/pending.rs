//! Outstanding requests and their correlation ids.
//!
//! At most one request of each kind is in flight. Issuing a second one
//! cancels the first, so its late response no longer matches anything and is
//! dropped as stale. Requests that outlive their deadline are expired by the
//! runtime's tick.

use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use crate::protocol::{RequestId, RequestKind};

/// One request awaiting its response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingRequest {
    /// Correlation id sent with the request.
    pub id: RequestId,
    /// What was asked.
    pub kind: RequestKind,
    /// When it was sent.
    pub issued_at: DateTime<Utc>,
    /// When it is given up on.
    pub deadline: DateTime<Utc>,
}

/// How an inbound response relates to what we asked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// The response answers this request.
    Matched(PendingRequest),
    /// No id on the response and nothing of its kind was pending.
    Unsolicited,
    /// The response names a request we no longer wait for.
    Stale,
}

/// Table of in-flight requests.
#[derive(Debug)]
pub struct PendingRequests {
    next_id: u64,
    timeout: Duration,
    by_kind: HashMap<RequestKind, PendingRequest>,
}

impl PendingRequests {
    /// An empty table; requests expire after `timeout`.
    #[must_use]
    pub fn new(timeout: Duration) -> Self {
        Self {
            next_id: 1,
            timeout,
            by_kind: HashMap::new(),
        }
    }

    /// Register a new request and return its correlation id.
    ///
    /// Any request of the same kind still pending is cancelled.
    pub fn issue(&mut self, kind: RequestKind, now: DateTime<Utc>) -> RequestId {
        let id = RequestId(self.next_id);
        self.next_id += 1;

        let timeout = chrono::Duration::from_std(self.timeout).unwrap_or(chrono::Duration::MAX);
        let request = PendingRequest {
            id,
            kind,
            issued_at: now,
            deadline: now.checked_add_signed(timeout).unwrap_or(DateTime::<Utc>::MAX_UTC),
        };
        if let Some(previous) = self.by_kind.insert(kind, request) {
            debug!(kind = %kind, cancelled = %previous.id, replacement = %id, "Superseded pending request");
        }
        id
    }

    /// Whether a request of `kind` is in flight.
    #[must_use]
    pub fn is_pending(&self, kind: RequestKind) -> bool {
        self.by_kind.contains_key(&kind)
    }

    /// Match a response of `kind` carrying `id` against the table.
    pub fn resolve(&mut self, kind: RequestKind, id: Option<RequestId>) -> Resolution {
        match id {
            Some(id) => match self.by_kind.get(&kind) {
                Some(pending) if pending.id == id => {
                    let pending = *pending;
                    self.by_kind.remove(&kind);
                    Resolution::Matched(pending)
                }
                _ => {
                    warn!(kind = %kind, id = %id, "Dropping stale response");
                    Resolution::Stale
                }
            },
            // Servers that do not echo ids: the oldest (only) one of its kind.
            None => self
                .by_kind
                .remove(&kind)
                .map_or(Resolution::Unsolicited, Resolution::Matched),
        }
    }

    /// Remove and return every request whose deadline has passed.
    pub fn expire(&mut self, now: DateTime<Utc>) -> Vec<PendingRequest> {
        let mut expired: Vec<PendingRequest> = self
            .by_kind
            .values()
            .filter(|pending| pending.deadline <= now)
            .copied()
            .collect();
        expired.sort_by_key(|pending| pending.id);
        for pending in &expired {
            self.by_kind.remove(&pending.kind);
        }
        expired
    }

    /// Forget everything (disconnect).
    pub fn cancel_all(&mut self) {
        self.by_kind.clear();
    }

    /// Number of requests in flight.
    #[must_use]
    pub fn len(&self) -> usize {
        self.by_kind.len()
    }

    /// Whether nothing is in flight.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_kind.is_empty()
    }
}
