// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 ® John Hauger Mitander <john@mitander.dev>

use dashmap::DashSet;
use std::collections::VecDeque;
use std::hash::Hash;
use tokio::sync::Mutex;

/// Bounded first-seen filter: remembers at most `max_len` keys, forgetting the
/// oldest first.
pub struct SeenSet<T> {
    seen: DashSet<T>,
    order: Mutex<VecDeque<T>>,
    max_len: usize,
}

impl<T> SeenSet<T>
where
    T: Copy + Eq + Hash,
{
    pub fn new(max_len: usize) -> Self {
        Self {
            seen: DashSet::new(),
            order: Mutex::new(VecDeque::new()),
            max_len: max_len.max(1),
        }
    }

    /// Returns `true` only for first-seen keys.
    pub async fn remember(&self, key: T) -> bool {
        if !self.seen.insert(key) {
            return false;
        }
        let mut guard = self.order.lock().await;
        guard.push_back(key);
        if guard.len() > self.max_len
            && let Some(oldest) = guard.pop_front()
        {
            self.seen.remove(&oldest);
        }
        true
    }

    pub fn contains(&self, key: &T) -> bool {
        self.seen.contains(key)
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}
