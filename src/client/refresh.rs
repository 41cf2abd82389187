use std::collections::VecDeque;
use std::future::Future;
use std::sync::{Mutex, MutexGuard, PoisonError};

use tokio::sync::oneshot;

use super::error::{ClientError, ClientResult};
use super::token_store::TokenStore;

type Waiter = oneshot::Sender<Result<String, String>>;

#[derive(Default)]
struct RefreshState {
    refreshing: bool,
    waiters: VecDeque<Waiter>,
}

enum Ticket {
    /// A refresh finished after the failing request was sent.
    Current(String),
    Wait(oneshot::Receiver<Result<String, String>>),
    Lead,
}

/// Single-flight token refresh.
///
/// While one caller refreshes, every other caller that hits 401 queues a
/// oneshot and is settled, in arrival order, with the outcome of that one
/// refresh. The state lock is never held across an await.
#[derive(Default)]
pub struct RefreshCoordinator {
    state: Mutex<RefreshState>,
}

impl RefreshCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, RefreshState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn is_refreshing(&self) -> bool {
        self.lock().refreshing
    }

    pub fn queued(&self) -> usize {
        self.lock().waiters.len()
    }

    /// Returns an access token to retry with after a 401.
    ///
    /// `sent_with` is the token the failed request carried. `refresh` must
    /// persist new tokens on success and clear the store on failure before it
    /// resolves; waiters are settled only afterwards.
    pub async fn token_after_unauthorized<F, Fut>(
        &self,
        store: &dyn TokenStore,
        sent_with: Option<&str>,
        refresh: F,
    ) -> ClientResult<String>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = ClientResult<String>>,
    {
        let ticket = {
            let mut state = self.lock();
            if state.refreshing {
                let (tx, rx) = oneshot::channel();
                state.waiters.push_back(tx);
                Ticket::Wait(rx)
            } else {
                match store.access_token() {
                    Some(current) if sent_with != Some(current.as_str()) => {
                        Ticket::Current(current)
                    }
                    None if sent_with.is_some() => return Err(ClientError::SessionExpired),
                    _ => {
                        state.refreshing = true;
                        Ticket::Lead
                    }
                }
            }
        };

        match ticket {
            Ticket::Current(token) => Ok(token),
            Ticket::Wait(rx) => match rx.await {
                Ok(Ok(token)) => Ok(token),
                Ok(Err(reason)) => Err(ClientError::RefreshFailed(reason)),
                Err(_) => Err(ClientError::RefreshFailed(
                    "refresh was abandoned".to_string(),
                )),
            },
            Ticket::Lead => {
                let guard = LeaderGuard {
                    coordinator: self,
                    armed: true,
                };
                let outcome = refresh().await;
                guard.settle(&outcome);
                outcome
            }
        }
    }
}

/// Resets the coordinator even if the leading future is dropped mid-refresh;
/// queued waiters then observe a closed channel.
struct LeaderGuard<'a> {
    coordinator: &'a RefreshCoordinator,
    armed: bool,
}

impl LeaderGuard<'_> {
    fn settle(mut self, outcome: &ClientResult<String>) {
        self.armed = false;
        let waiters = self.take_waiters();
        let shared = outcome.as_ref().map(String::clone).map_err(|e| e.to_string());
        for waiter in waiters {
            let _ = waiter.send(shared.clone());
        }
    }

    fn take_waiters(&self) -> VecDeque<Waiter> {
        let mut state = self.coordinator.lock();
        state.refreshing = false;
        std::mem::take(&mut state.waiters)
    }
}

impl Drop for LeaderGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            drop(self.take_waiters());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::token_store::MemoryTokenStore;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    async fn never_refresh() -> ClientResult<String> {
        panic!("only the leading caller refreshes")
    }

    async fn slow_refresh(
        store: Arc<MemoryTokenStore>,
        calls: Arc<AtomicUsize>,
        succeed: bool,
    ) -> ClientResult<String> {
        calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(50)).await;
        if succeed {
            store.set_tokens("new-access", "new-refresh")?;
            Ok("new-access".to_string())
        } else {
            store.clear()?;
            Err(ClientError::RefreshFailed("refresh token rejected".into()))
        }
    }

    #[tokio::test]
    async fn concurrent_callers_share_one_refresh() {
        let coordinator = Arc::new(RefreshCoordinator::new());
        let store = Arc::new(MemoryTokenStore::with_tokens("old-access", "old-refresh"));
        let calls = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let coordinator = coordinator.clone();
            let store = store.clone();
            let calls = calls.clone();
            handles.push(tokio::spawn(async move {
                coordinator
                    .token_after_unauthorized(store.as_ref(), Some("old-access"), || {
                        slow_refresh(store.clone(), calls.clone(), true)
                    })
                    .await
            }));
        }

        for handle in handles {
            assert_eq!(handle.await.unwrap().unwrap(), "new-access");
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(!coordinator.is_refreshing());
        assert_eq!(coordinator.queued(), 0);
    }

    #[tokio::test]
    async fn stale_failure_reuses_the_stored_token() {
        let coordinator = RefreshCoordinator::new();
        let store = MemoryTokenStore::with_tokens("already-new", "r");
        let token = coordinator
            .token_after_unauthorized(&store, Some("old-access"), never_refresh)
            .await
            .unwrap();
        assert_eq!(token, "already-new");
    }

    #[tokio::test]
    async fn failure_rejects_every_waiter() {
        let coordinator = Arc::new(RefreshCoordinator::new());
        let store = Arc::new(MemoryTokenStore::with_tokens("old-access", "old-refresh"));
        let calls = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..4 {
            let coordinator = coordinator.clone();
            let store = store.clone();
            let calls = calls.clone();
            handles.push(tokio::spawn(async move {
                coordinator
                    .token_after_unauthorized(store.as_ref(), Some("old-access"), || {
                        slow_refresh(store.clone(), calls.clone(), false)
                    })
                    .await
            }));
        }

        for handle in handles {
            let err = handle.await.unwrap().unwrap_err();
            assert!(err.is_session_error(), "unexpected error: {:?}", err);
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(store.access_token().is_none());
        assert!(store.refresh_token().is_none());
    }

    #[tokio::test]
    async fn queued_waiters_receive_the_leaders_token() {
        let coordinator = Arc::new(RefreshCoordinator::new());
        let store = Arc::new(MemoryTokenStore::with_tokens("old", "r"));
        let (release_tx, release_rx) = oneshot::channel::<()>();

        let leader = {
            let coordinator = coordinator.clone();
            let store = store.clone();
            let refresh_store = store.clone();
            tokio::spawn(async move {
                coordinator
                    .token_after_unauthorized(store.as_ref(), Some("old"), move || async move {
                        let _ = release_rx.await;
                        refresh_store.set_tokens("fresh", "r2")?;
                        Ok("fresh".to_string())
                    })
                    .await
            })
        };
        while !coordinator.is_refreshing() {
            tokio::task::yield_now().await;
        }

        let mut waiters = Vec::new();
        for i in 0..3 {
            let waiter_coordinator = coordinator.clone();
            let store = store.clone();
            waiters.push(tokio::spawn(async move {
                waiter_coordinator
                    .token_after_unauthorized(store.as_ref(), Some("old"), never_refresh)
                    .await
            }));
            while coordinator.queued() < i + 1 {
                tokio::task::yield_now().await;
            }
        }

        release_tx.send(()).unwrap();
        assert_eq!(leader.await.unwrap().unwrap(), "fresh");
        for waiter in waiters {
            assert_eq!(waiter.await.unwrap().unwrap(), "fresh");
        }
        assert_eq!(coordinator.queued(), 0);
    }

    #[tokio::test]
    async fn dropped_leader_releases_waiters() {
        let coordinator = Arc::new(RefreshCoordinator::new());
        let store = Arc::new(MemoryTokenStore::with_tokens("old", "r"));

        let leader = {
            let coordinator = coordinator.clone();
            let store = store.clone();
            tokio::spawn(async move {
                coordinator
                    .token_after_unauthorized(store.as_ref(), Some("old"), || {
                        std::future::pending::<ClientResult<String>>()
                    })
                    .await
            })
        };
        while !coordinator.is_refreshing() {
            tokio::task::yield_now().await;
        }

        let waiter = {
            let coordinator = coordinator.clone();
            let store = store.clone();
            tokio::spawn(async move {
                coordinator
                    .token_after_unauthorized(store.as_ref(), Some("old"), never_refresh)
                    .await
            })
        };
        while coordinator.queued() < 1 {
            tokio::task::yield_now().await;
        }

        leader.abort();
        let err = waiter.await.unwrap().unwrap_err();
        assert!(matches!(err, ClientError::RefreshFailed(_)));
        assert!(!coordinator.is_refreshing());
    }
}
