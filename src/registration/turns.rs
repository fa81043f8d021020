//! Per-user event serialisation.
//!
//! Events from different users run concurrently; events from the same user
//! are handled one at a time, in the order their turn was requested.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, OwnedMutexGuard};

use super::UserId;

/// Hands out one exclusive turn per user at a time.
#[derive(Default)]
pub struct UserTurns {
    locks: Mutex<HashMap<UserId, Arc<Mutex<()>>>>,
}

/// Held for the duration of one event. Dropping it releases the user's turn.
pub struct Turn {
    _guard: OwnedMutexGuard<()>,
}

impl UserTurns {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for the user's turn.
    pub async fn acquire(&self, user_id: UserId) -> Turn {
        let lock = {
            let mut locks = self.locks.lock().await;
            Arc::clone(locks.entry(user_id).or_default())
        };
        Turn {
            _guard: lock.lock_owned().await,
        }
    }

    /// Forget lock entries nobody is holding or waiting on.
    pub async fn prune(&self) {
        let mut locks = self.locks.lock().await;
        locks.retain(|_, lock| Arc::strong_count(lock) > 1);
    }

    /// Number of users with a tracked lock.
    pub async fn tracked(&self) -> usize {
        self.locks.lock().await.len()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn same_user_is_serialised() {
        let turns = Arc::new(UserTurns::new());
        let log = Arc::new(Mutex::new(Vec::new()));

        let first = turns.acquire(1).await;
        let waiter = {
            let turns = Arc::clone(&turns);
            let log = Arc::clone(&log);
            tokio::spawn(async move {
                let _turn = turns.acquire(1).await;
                log.lock().await.push("second");
            })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        log.lock().await.push("first");
        drop(first);
        waiter.await.unwrap();

        assert_eq!(*log.lock().await, vec!["first", "second"]);
    }

    #[tokio::test]
    async fn different_users_do_not_block() {
        let turns = UserTurns::new();
        let _a = turns.acquire(1).await;
        let b = tokio::time::timeout(Duration::from_millis(100), turns.acquire(2)).await;
        assert!(b.is_ok());
    }

    #[tokio::test]
    async fn prune_drops_idle_entries_only() {
        let turns = UserTurns::new();
        let held = turns.acquire(1).await;
        drop(turns.acquire(2).await);
        assert_eq!(turns.tracked().await, 2);

        turns.prune().await;
        assert_eq!(turns.tracked().await, 1);

        drop(held);
        turns.prune().await;
        assert_eq!(turns.tracked().await, 0);
    }
}
