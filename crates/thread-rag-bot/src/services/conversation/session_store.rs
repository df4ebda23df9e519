use dashmap::DashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, OnceCell};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use super::backend::ChatSession;
use super::types::{ChatTurn, Role, ThreadId};
use crate::utils::error::BotError;

/// A live chat session plus bookkeeping.
pub struct ThreadSession {
    session: Box<dyn ChatSession>,
    created_at: Instant,
}

impl ThreadSession {
    fn new(session: Box<dyn ChatSession>) -> Self {
        Self {
            session,
            created_at: Instant::now(),
        }
    }

    pub async fn send(&mut self, text: &str) -> Result<String, BotError> {
        self.session.send_message(text).await
    }

    pub fn history(&self) -> &[ChatTurn] {
        self.session.history()
    }

    /// Number of user messages answered so far.
    pub fn turn_count(&self) -> usize {
        self.history()
            .iter()
            .filter(|turn| turn.role == Role::User)
            .count()
    }

    pub fn created_at(&self) -> Instant {
        self.created_at
    }
}

pub type SharedSession = Arc<Mutex<ThreadSession>>;

/// Map entry for one thread. The cell is filled at most once; a failed
/// creation leaves it empty so the next message retries.
struct SessionSlot {
    cell: OnceCell<SharedSession>,
    last_activity: parking_lot::Mutex<Instant>,
}

impl SessionSlot {
    fn new() -> Self {
        Self {
            cell: OnceCell::new(),
            last_activity: parking_lot::Mutex::new(Instant::now()),
        }
    }

    fn touch(&self) {
        *self.last_activity.lock() = Instant::now();
    }

    fn idle_for(&self) -> Duration {
        self.last_activity.lock().elapsed()
    }
}

/// Thread-safe thread id -> session map with one session per thread.
#[derive(Clone, Default)]
pub struct SessionStore {
    storage: Arc<DashMap<ThreadId, Arc<SessionSlot>>>,
}

impl SessionStore {
    pub fn new() -> Self {
        info!("Initializing thread session store");
        Self::default()
    }

    /// Return the session for `thread_id`, running `create` if there is none.
    ///
    /// Concurrent callers for the same new thread wait on a single `create`;
    /// all of them get the winner's session. The boolean is true for the
    /// caller whose `create` produced it.
    pub async fn get_or_create<F, Fut>(
        &self,
        thread_id: &ThreadId,
        create: F,
    ) -> Result<(SharedSession, bool), BotError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Box<dyn ChatSession>, BotError>>,
    {
        let slot = self
            .storage
            .entry(thread_id.clone())
            .or_insert_with(|| Arc::new(SessionSlot::new()))
            .clone();
        slot.touch();

        let mut created = false;
        let session = slot
            .cell
            .get_or_try_init(|| async {
                let session = create().await?;
                created = true;
                Ok::<_, BotError>(Arc::new(Mutex::new(ThreadSession::new(session))))
            })
            .await?
            .clone();

        if created {
            debug!("Created session for thread {}", thread_id);
        }

        Ok((session, created))
    }

    /// Existing session for `thread_id`, if one was created.
    pub fn get(&self, thread_id: &ThreadId) -> Option<SharedSession> {
        let slot = self.storage.get(thread_id)?;
        slot.cell.get().cloned()
    }

    pub fn touch(&self, thread_id: &ThreadId) {
        if let Some(slot) = self.storage.get(thread_id) {
            slot.touch();
        }
    }

    pub fn remove(&self, thread_id: &ThreadId) -> Option<SharedSession> {
        self.storage
            .remove(thread_id)
            .and_then(|(_, slot)| slot.cell.get().cloned())
    }

    /// Number of threads with a live session.
    pub fn len(&self) -> usize {
        self.storage
            .iter()
            .filter(|entry| entry.value().cell.initialized())
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop threads idle for longer than `ttl`. Returns how many were removed.
    ///
    /// Slots still being created, or whose session is mid-exchange, are kept
    /// whatever their age: removing them would let the next message start a
    /// second session for the same thread.
    pub fn cleanup_idle(&self, ttl: Duration) -> usize {
        let start_len = self.storage.len();
        self.storage.retain(|thread_id, slot| {
            let Some(session) = slot.cell.get() else {
                return true;
            };
            let Ok(guard) = session.try_lock() else {
                return true;
            };
            if slot.idle_for() <= ttl {
                return true;
            }

            debug!(
                "Evicting thread {} (session age {:?}, {} turns)",
                thread_id,
                guard.created_at().elapsed(),
                guard.turn_count()
            );
            false
        });
        let count = start_len.saturating_sub(self.storage.len());

        if count > 0 {
            info!("Evicted {} idle thread sessions", count);
        }

        count
    }

    /// Run `cleanup_idle` every `every` until the task is aborted.
    pub fn spawn_idle_sweeper(&self, ttl: Duration, every: Duration) -> JoinHandle<()> {
        let store = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            // First tick fires immediately
            ticker.tick().await;
            loop {
                ticker.tick().await;
                store.cleanup_idle(ttl);
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct CountingSession {
        history: Vec<ChatTurn>,
    }

    #[async_trait]
    impl ChatSession for CountingSession {
        async fn send_message(&mut self, text: &str) -> Result<String, BotError> {
            self.history.push(ChatTurn::user(text));
            let reply = format!("turns={}", self.history.len() / 2 + 1);
            self.history.push(ChatTurn::model(reply.clone()));
            Ok(reply)
        }

        fn history(&self) -> &[ChatTurn] {
            &self.history
        }
    }

    async fn make_session() -> Result<Box<dyn ChatSession>, BotError> {
        Ok(Box::new(CountingSession::default()))
    }

    #[tokio::test]
    async fn test_get_or_create_reuses_session() {
        let store = SessionStore::new();
        let thread = ThreadId::from("1700000000.000100");

        let (first, created_first) = store.get_or_create(&thread, make_session).await.unwrap();
        let (second, created_second) = store.get_or_create(&thread, make_session).await.unwrap();

        assert!(created_first);
        assert!(!created_second);
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_failed_creation_is_retried() {
        let store = SessionStore::new();
        let thread = ThreadId::from("T1");

        let result = store
            .get_or_create(&thread, || async {
                Err(BotError::Config("backend down".to_string()))
            })
            .await;
        assert!(result.is_err());
        assert!(store.get(&thread).is_none());
        assert!(store.is_empty());

        let (_, created) = store.get_or_create(&thread, make_session).await.unwrap();
        assert!(created);
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_creation_has_single_winner() {
        let store = SessionStore::new();
        let thread = ThreadId::from("T-race");
        let creations = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..16 {
            let store = store.clone();
            let thread = thread.clone();
            let creations = creations.clone();
            handles.push(tokio::spawn(async move {
                let (session, _) = store
                    .get_or_create(&thread, || async move {
                        creations.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(10)).await;
                        make_session().await
                    })
                    .await
                    .unwrap();
                session
            }));
        }

        let mut sessions = Vec::new();
        for handle in handles {
            sessions.push(handle.await.unwrap());
        }

        assert_eq!(creations.load(Ordering::SeqCst), 1);
        assert!(sessions.iter().all(|s| Arc::ptr_eq(s, &sessions[0])));
    }

    #[tokio::test]
    async fn test_cleanup_idle_evicts_old_threads() {
        let store = SessionStore::new();
        let old = ThreadId::from("old");
        let fresh = ThreadId::from("fresh");

        store.get_or_create(&old, make_session).await.unwrap();
        tokio::time::sleep(Duration::from_millis(40)).await;
        store.get_or_create(&fresh, make_session).await.unwrap();

        let removed = store.cleanup_idle(Duration::from_millis(20));

        assert_eq!(removed, 1);
        assert!(store.get(&old).is_none());
        assert!(store.get(&fresh).is_some());
    }

    #[tokio::test]
    async fn test_cleanup_keeps_session_mid_exchange() {
        let store = SessionStore::new();
        let thread = ThreadId::from("T-busy");
        let (session, _) = store.get_or_create(&thread, make_session).await.unwrap();

        let guard = session.lock().await;
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(store.cleanup_idle(Duration::from_millis(10)), 0);
        drop(guard);

        let (again, created) = store.get_or_create(&thread, make_session).await.unwrap();
        assert!(!created);
        assert!(Arc::ptr_eq(&session, &again));

        // Once idle and unlocked it goes
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(store.cleanup_idle(Duration::from_millis(10)), 1);
        assert!(store.get(&thread).is_none());
    }

    #[tokio::test]
    async fn test_cleanup_keeps_slot_while_creating() {
        let store = SessionStore::new();
        let thread = ThreadId::from("T-slow");

        let creating = {
            let store = store.clone();
            let thread = thread.clone();
            tokio::spawn(async move {
                store
                    .get_or_create(&thread, || async {
                        tokio::time::sleep(Duration::from_millis(60)).await;
                        make_session().await
                    })
                    .await
                    .unwrap()
            })
        };

        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(store.cleanup_idle(Duration::from_millis(10)), 0);

        let (first, created_first) = creating.await.unwrap();
        let (second, created_second) = store.get_or_create(&thread, make_session).await.unwrap();

        assert!(created_first);
        assert!(!created_second);
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[tokio::test]
    async fn test_created_at_precedes_first_turn() {
        let store = SessionStore::new();
        let (session, _) = store
            .get_or_create(&ThreadId::from("T1"), make_session)
            .await
            .unwrap();

        let before_send = Instant::now();
        let mut guard = session.lock().await;
        guard.send("hello").await.unwrap();

        assert!(guard.created_at() <= before_send);
    }

    #[tokio::test]
    async fn test_turn_count_counts_user_messages() {
        let store = SessionStore::new();
        let thread = ThreadId::from("T1");
        let (session, _) = store.get_or_create(&thread, make_session).await.unwrap();

        let mut guard = session.lock().await;
        guard.send("one").await.unwrap();
        guard.send("two").await.unwrap();

        assert_eq!(guard.turn_count(), 2);
        assert_eq!(guard.history().len(), 4);
    }
}
