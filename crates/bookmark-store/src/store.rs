use crate::error::{BookmarkError, BookmarkResult};
use crate::state::{Resolution, SyncState, Tracked};
use bookmark_api::{BookmarkApi, Session};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Session-scoped view of which opportunities are bookmarked.
///
/// Toggles flip the local set before the remote call and undo the flip if
/// the call fails. The lock is never held across an `.await`, so lookups
/// stay cheap while calls are in flight.
pub struct BookmarkStore {
    api: Arc<dyn BookmarkApi>,
    state: Mutex<StoreState>,
}

#[derive(Default)]
struct StoreState {
    session: Option<Session>,
    /// Bumped on every session change; completions from an older epoch are dropped.
    epoch: u64,
    next_ticket: u64,
    bookmarked: HashSet<String>,
    tracked: HashMap<String, Tracked>,
    refreshing: usize,
    /// Sequence of the newest refresh issued, and of the newest one applied.
    refresh_issued: u64,
    refresh_applied: u64,
}

impl StoreState {
    fn set_membership(&mut self, id: &str, bookmarked: bool) {
        if bookmarked {
            self.bookmarked.insert(id.to_string());
        } else {
            self.bookmarked.remove(id);
        }
    }

    fn reset(&mut self, session: Option<Session>) {
        self.epoch += 1;
        self.session = session;
        self.bookmarked.clear();
        self.tracked.clear();
    }

    fn resolve(
        &mut self,
        id: &str,
        epoch: u64,
        ticket: u64,
        target: bool,
        succeeded: bool,
    ) -> Resolution {
        if self.epoch != epoch {
            return Resolution::Stale;
        }
        let resolution = match self.tracked.get_mut(id) {
            Some(tracked) => tracked.resolve(ticket, target, succeeded),
            None => Resolution::Stale,
        };
        match resolution {
            Resolution::RolledBack { restore } => self.set_membership(id, restore),
            Resolution::LateConfirmed { membership } => self.set_membership(id, membership),
            _ => {}
        }
        resolution
    }
}

impl BookmarkStore {
    /// Empty store with no session.
    pub fn new(api: Arc<dyn BookmarkApi>) -> Self {
        Self {
            api,
            state: Mutex::new(StoreState::default()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, StoreState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Install `session` and load its bookmarks.
    ///
    /// A failed fetch is logged and leaves the set empty; call
    /// [`refresh`](Self::refresh) to try again.
    pub async fn start_session(&self, session: Session) {
        tracing::info!(
            "Starting bookmark session for {} ({})",
            session.email,
            self.api.backend_name()
        );
        self.lock().reset(Some(session));
        let _ = self.refresh().await;
    }

    /// Drop the credential and everything loaded under it.
    pub fn end_session(&self) {
        let mut state = self.lock();
        if state.session.is_some() {
            tracing::info!("Ending bookmark session");
        }
        state.reset(None);
    }

    pub fn has_session(&self) -> bool {
        self.lock().session.is_some()
    }

    pub fn session(&self) -> Option<Session> {
        self.lock().session.clone()
    }

    pub fn is_bookmarked(&self, id: &str) -> bool {
        self.lock().bookmarked.contains(id)
    }

    /// Snapshot of the current set, optimistic entries included.
    pub fn bookmarked_ids(&self) -> HashSet<String> {
        self.lock().bookmarked.clone()
    }

    pub fn len(&self) -> usize {
        self.lock().bookmarked.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().bookmarked.is_empty()
    }

    /// True while a full fetch is in flight.
    pub fn is_loading(&self) -> bool {
        self.lock().refreshing > 0
    }

    pub fn sync_state(&self, id: &str) -> SyncState {
        self.lock()
            .tracked
            .get(id)
            .map(|t| t.state)
            .unwrap_or(SyncState::Idle)
    }

    /// Flip the bookmark on `id` and persist it. Returns the new membership.
    ///
    /// The local set changes before the remote call is made. If the call
    /// fails, `id` goes back to its last confirmed membership and the
    /// backend's error is returned. Other identifiers are never touched.
    pub async fn toggle_bookmark(&self, id: &str) -> BookmarkResult<bool> {
        let (session, epoch, ticket, target) = {
            let mut state = self.lock();
            let session = state
                .session
                .clone()
                .ok_or(BookmarkError::NotAuthenticated)?;

            let current = state.bookmarked.contains(id);
            let target = !current;
            state.next_ticket += 1;
            let ticket = state.next_ticket;

            let tracked = Tracked::begin(state.tracked.get(id), current, ticket);
            state.tracked.insert(id.to_string(), tracked);
            state.set_membership(id, target);

            (session, state.epoch, ticket, target)
        };

        let result = if target {
            self.api.add_bookmark(&session, id).await
        } else {
            self.api.remove_bookmark(&session, id).await
        };

        let resolution = self
            .lock()
            .resolve(id, epoch, ticket, target, result.is_ok());

        match (&result, resolution) {
            (Ok(()), Resolution::Confirmed) => {
                tracing::info!(
                    "Bookmark {} {}",
                    id,
                    if target { "added" } else { "removed" }
                );
            }
            (Err(e), Resolution::RolledBack { restore }) => {
                tracing::warn!(
                    "Bookmark toggle on {} failed, restored to {}: {}",
                    id,
                    restore,
                    e
                );
            }
            (_, Resolution::LateConfirmed { membership }) => {
                tracing::info!("Bookmark {} settled late at {}", id, membership);
            }
            (_, Resolution::Stale) => {
                tracing::debug!("Ignoring stale completion for bookmark {}", id);
            }
            _ => {}
        }

        result.map(|()| target).map_err(BookmarkError::from)
    }

    /// Replace the whole set with the server's. Returns the new size.
    ///
    /// Unconfirmed optimistic entries are discarded and their completions
    /// no longer change the set. On failure the previous set is kept. When
    /// refreshes overlap, a response older than one already applied is dropped.
    pub async fn refresh(&self) -> BookmarkResult<usize> {
        let (session, epoch, seq) = {
            let mut state = self.lock();
            let session = state
                .session
                .clone()
                .ok_or(BookmarkError::NotAuthenticated)?;
            state.refreshing += 1;
            state.refresh_issued += 1;
            (session, state.epoch, state.refresh_issued)
        };

        let result = self.api.list_bookmarks(&session).await;

        let mut state = self.lock();
        state.refreshing = state.refreshing.saturating_sub(1);

        match result {
            Ok(records) => {
                if state.epoch != epoch {
                    tracing::debug!("Session changed during refresh, discarding result");
                    return Ok(state.bookmarked.len());
                }
                if seq < state.refresh_applied {
                    tracing::debug!("Newer refresh already applied, discarding result");
                    return Ok(state.bookmarked.len());
                }
                state.refresh_applied = seq;
                let discarded = state
                    .tracked
                    .values()
                    .filter(|t| matches!(t.state, SyncState::Pending { .. }))
                    .count();
                if discarded > 0 {
                    tracing::debug!("Refresh discarded {} pending toggles", discarded);
                }
                state.bookmarked = records.into_iter().map(|r| r.opportunity_id).collect();
                state.tracked.clear();
                tracing::info!("Loaded {} bookmarks", state.bookmarked.len());
                Ok(state.bookmarked.len())
            }
            Err(e) => {
                tracing::warn!("Failed to fetch bookmarks: {}", e);
                Err(e.into())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use bookmark_api::{ApiError, ApiResult, BookmarkRecord};
    use std::collections::VecDeque;
    use tokio::sync::oneshot;
    use tokio_test::{assert_pending, assert_ready, task};

    enum Reply {
        Now(ApiResult<()>),
        Later(oneshot::Receiver<ApiResult<()>>),
    }

    /// In-memory backend whose mutation replies are scripted per call.
    #[derive(Default)]
    struct ScriptedApi {
        server: Mutex<Vec<String>>,
        list_error: Mutex<Option<ApiError>>,
        list_gate: Mutex<Option<oneshot::Receiver<()>>>,
        replies: Mutex<VecDeque<Reply>>,
        calls: Mutex<Vec<String>>,
    }

    impl ScriptedApi {
        fn with_bookmarks(ids: &[&str]) -> Arc<Self> {
            let api = Self::default();
            *api.server.lock().unwrap() = ids.iter().map(|s| s.to_string()).collect();
            Arc::new(api)
        }

        fn set_server(&self, ids: &[&str]) {
            *self.server.lock().unwrap() = ids.iter().map(|s| s.to_string()).collect();
        }

        fn fail_list(&self, err: ApiError) {
            *self.list_error.lock().unwrap() = Some(err);
        }

        fn hold_list(&self) -> oneshot::Sender<()> {
            let (tx, rx) = oneshot::channel();
            *self.list_gate.lock().unwrap() = Some(rx);
            tx
        }

        fn reply_now(&self, result: ApiResult<()>) {
            self.replies.lock().unwrap().push_back(Reply::Now(result));
        }

        fn reply_later(&self) -> oneshot::Sender<ApiResult<()>> {
            let (tx, rx) = oneshot::channel();
            self.replies.lock().unwrap().push_back(Reply::Later(rx));
            tx
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }

        async fn next_reply(&self, call: String) -> ApiResult<()> {
            self.calls.lock().unwrap().push(call);
            let reply = self.replies.lock().unwrap().pop_front();
            match reply {
                None => Ok(()),
                Some(Reply::Now(result)) => result,
                Some(Reply::Later(rx)) => rx
                    .await
                    .unwrap_or_else(|_| Err(ApiError::Network("reply dropped".into()))),
            }
        }
    }

    #[async_trait]
    impl BookmarkApi for ScriptedApi {
        async fn list_bookmarks(&self, _session: &Session) -> ApiResult<Vec<BookmarkRecord>> {
            // Answer with the server state as of the request, not the reply
            let snapshot = self.server.lock().unwrap().clone();
            let gate = self.list_gate.lock().unwrap().take();
            if let Some(gate) = gate {
                let _ = gate.await;
            }
            if let Some(err) = self.list_error.lock().unwrap().clone() {
                return Err(err);
            }
            Ok(snapshot
                .iter()
                .map(|id| BookmarkRecord {
                    opportunity_id: id.clone(),
                    title: String::new(),
                    org_name: String::new(),
                    op_type: String::new(),
                    location: String::new(),
                    logo_url: String::new(),
                    date_bookmarked: String::new(),
                    date_posted: String::new(),
                })
                .collect())
        }

        async fn add_bookmark(&self, _session: &Session, id: &str) -> ApiResult<()> {
            self.next_reply(format!("add:{}", id)).await
        }

        async fn remove_bookmark(&self, _session: &Session, id: &str) -> ApiResult<()> {
            self.next_reply(format!("remove:{}", id)).await
        }

        fn backend_name(&self) -> &str {
            "scripted"
        }
    }

    fn session() -> Session {
        Session::new("test-access-token", "user-1", "user@example.com", "Test User")
    }

    fn ids(list: &[&str]) -> HashSet<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    async fn store_with(ids: &[&str]) -> (Arc<ScriptedApi>, BookmarkStore) {
        let api = ScriptedApi::with_bookmarks(ids);
        let store = BookmarkStore::new(api.clone());
        store.start_session(session()).await;
        (api, store)
    }

    #[tokio::test]
    async fn test_start_session_loads_server_set() {
        let (_api, store) = store_with(&["a", "b"]).await;
        assert!(store.has_session());
        assert_eq!(store.len(), 2);
        assert!(store.is_bookmarked("a"));
        assert!(store.is_bookmarked("b"));
        assert!(!store.is_bookmarked("c"));
        assert_eq!(store.sync_state("a"), SyncState::Idle);
    }

    #[tokio::test]
    async fn test_toggle_without_session() {
        let api = ScriptedApi::with_bookmarks(&[]);
        let store = BookmarkStore::new(api.clone());

        let err = store.toggle_bookmark("a").await.unwrap_err();
        assert_eq!(err, BookmarkError::NotAuthenticated);
        assert_eq!(err.to_string(), "Not authenticated");
        assert!(store.is_empty());
        assert!(api.calls().is_empty());
    }

    #[test]
    fn test_optimistic_add_visible_before_remote_resolves() {
        let (api, store) = tokio_test::block_on(store_with(&[]));
        let reply = api.reply_later();

        let mut toggle = task::spawn(store.toggle_bookmark("a"));
        assert_pending!(toggle.poll());
        assert!(store.is_bookmarked("a"));
        assert_eq!(store.sync_state("a"), SyncState::Pending { previous: false });

        reply.send(Ok(())).unwrap();
        let result = assert_ready!(toggle.poll());
        assert_eq!(result, Ok(true));
        assert!(store.is_bookmarked("a"));
        assert_eq!(store.sync_state("a"), SyncState::Confirmed);
    }

    #[test]
    fn test_failed_add_rolls_back_with_message() {
        let (api, store) = tokio_test::block_on(store_with(&[]));
        let reply = api.reply_later();

        let mut toggle = task::spawn(store.toggle_bookmark("a"));
        assert_pending!(toggle.poll());
        assert!(store.is_bookmarked("a"));

        reply
            .send(Err(ApiError::server(400, "Opportunity is closed")))
            .unwrap();
        let err = assert_ready!(toggle.poll()).unwrap_err();
        assert_eq!(err.to_string(), "Opportunity is closed");
        assert!(!store.is_bookmarked("a"));
        assert_eq!(store.sync_state("a"), SyncState::RolledBack);
    }

    #[tokio::test]
    async fn test_failed_remove_restores_bookmark() {
        let (api, store) = store_with(&["a"]).await;
        api.reply_now(Err(ApiError::server(500, "Failed to remove bookmark")));

        let err = store.toggle_bookmark("a").await.unwrap_err();
        assert_eq!(err.to_string(), "Failed to remove bookmark");
        assert!(store.is_bookmarked("a"));
        assert_eq!(api.calls(), vec!["remove:a".to_string()]);
    }

    #[tokio::test]
    async fn test_network_failure_message_reaches_caller() {
        let (api, store) = store_with(&[]).await;
        api.reply_now(Err(ApiError::Network("connection reset".into())));

        let err = store.toggle_bookmark("a").await.unwrap_err();
        assert_eq!(
            err,
            BookmarkError::Remote(ApiError::Network("connection reset".into()))
        );
        assert!(!store.is_bookmarked("a"));
    }

    #[tokio::test]
    async fn test_add_then_remove_sequentially() {
        let (api, store) = store_with(&[]).await;

        assert_eq!(store.toggle_bookmark("a").await, Ok(true));
        assert!(store.is_bookmarked("a"));
        assert_eq!(store.toggle_bookmark("a").await, Ok(false));
        assert!(!store.is_bookmarked("a"));
        assert_eq!(
            api.calls(),
            vec!["add:a".to_string(), "remove:a".to_string()]
        );
    }

    #[test]
    fn test_overlapping_toggles_last_writer_wins() {
        let (api, store) = tokio_test::block_on(store_with(&[]));
        let first_reply = api.reply_later();
        let second_reply = api.reply_later();

        let mut first = task::spawn(store.toggle_bookmark("a"));
        assert_pending!(first.poll());
        let mut second = task::spawn(store.toggle_bookmark("a"));
        assert_pending!(second.poll());
        assert!(!store.is_bookmarked("a"));
        assert_eq!(
            api.calls(),
            vec!["add:a".to_string(), "remove:a".to_string()]
        );

        first_reply.send(Ok(())).unwrap();
        assert_eq!(assert_ready!(first.poll()), Ok(true));
        // Newer toggle still in flight; its flip stays visible
        assert!(!store.is_bookmarked("a"));
        assert_eq!(store.sync_state("a"), SyncState::Pending { previous: true });

        second_reply.send(Ok(())).unwrap();
        assert_eq!(assert_ready!(second.poll()), Ok(false));
        assert!(!store.is_bookmarked("a"));
        assert_eq!(store.sync_state("a"), SyncState::Confirmed);
    }

    #[test]
    fn test_overlapping_toggle_failure_restores_confirmed_add() {
        let (api, store) = tokio_test::block_on(store_with(&[]));
        let first_reply = api.reply_later();
        let second_reply = api.reply_later();

        let mut first = task::spawn(store.toggle_bookmark("a"));
        assert_pending!(first.poll());
        let mut second = task::spawn(store.toggle_bookmark("a"));
        assert_pending!(second.poll());

        first_reply.send(Ok(())).unwrap();
        assert_eq!(assert_ready!(first.poll()), Ok(true));

        second_reply
            .send(Err(ApiError::server(500, "Failed to remove bookmark")))
            .unwrap();
        assert!(assert_ready!(second.poll()).is_err());
        // The server kept the add, so the local set does too
        assert!(store.is_bookmarked("a"));
    }

    #[test]
    fn test_rollback_leaves_other_ids_alone() {
        let (api, store) = tokio_test::block_on(store_with(&["keep"]));
        let a_reply = api.reply_later();
        let b_reply = api.reply_later();

        let mut a = task::spawn(store.toggle_bookmark("a"));
        assert_pending!(a.poll());
        let mut b = task::spawn(store.toggle_bookmark("b"));
        assert_pending!(b.poll());

        a_reply.send(Err(ApiError::server(500, "boom"))).unwrap();
        assert!(assert_ready!(a.poll()).is_err());

        assert!(!store.is_bookmarked("a"));
        assert!(store.is_bookmarked("b"));
        assert!(store.is_bookmarked("keep"));
        assert_eq!(store.sync_state("b"), SyncState::Pending { previous: false });

        b_reply.send(Ok(())).unwrap();
        assert_eq!(assert_ready!(b.poll()), Ok(true));
        assert_eq!(
            store.bookmarked_ids(),
            ids(&["b", "keep"])
        );
    }

    #[tokio::test]
    async fn test_refresh_replaces_set_exactly() {
        let (api, store) = store_with(&["a", "b"]).await;
        api.set_server(&["b", "c"]);

        assert_eq!(store.refresh().await, Ok(2));
        assert!(!store.is_bookmarked("a"));
        assert!(store.is_bookmarked("b"));
        assert!(store.is_bookmarked("c"));
    }

    #[test]
    fn test_refresh_discards_pending_toggle() {
        let (api, store) = tokio_test::block_on(store_with(&[]));
        let reply = api.reply_later();

        let mut toggle = task::spawn(store.toggle_bookmark("a"));
        assert_pending!(toggle.poll());
        assert!(store.is_bookmarked("a"));

        assert_eq!(tokio_test::block_on(store.refresh()), Ok(0));
        assert!(!store.is_bookmarked("a"));
        assert_eq!(store.sync_state("a"), SyncState::Idle);

        // A late failure must not touch the refreshed set either way
        reply.send(Err(ApiError::server(500, "boom"))).unwrap();
        assert!(assert_ready!(toggle.poll()).is_err());
        assert!(!store.is_bookmarked("a"));
    }

    #[tokio::test]
    async fn test_failed_refresh_keeps_previous_set() {
        let (api, store) = store_with(&["a"]).await;
        api.set_server(&["x", "y"]);
        api.fail_list(ApiError::server(503, "Failed to fetch bookmarks"));

        let err = store.refresh().await.unwrap_err();
        assert_eq!(err.to_string(), "Failed to fetch bookmarks");
        assert_eq!(
            store.bookmarked_ids(),
            ids(&["a"])
        );
    }

    #[tokio::test]
    async fn test_failed_fetch_on_session_start_is_not_surfaced() {
        let api = ScriptedApi::with_bookmarks(&["a"]);
        api.fail_list(ApiError::Network("timed out".into()));
        let store = BookmarkStore::new(api.clone());

        store.start_session(session()).await;
        assert!(store.has_session());
        assert!(store.is_empty());
        assert!(!store.is_loading());
    }

    #[test]
    fn test_is_loading_during_refresh() {
        let (api, store) = tokio_test::block_on(store_with(&["a"]));
        let gate = api.hold_list();

        let mut refresh = task::spawn(store.refresh());
        assert_pending!(refresh.poll());
        assert!(store.is_loading());
        assert!(store.is_bookmarked("a"));

        gate.send(()).unwrap();
        assert_eq!(assert_ready!(refresh.poll()), Ok(1));
        assert!(!store.is_loading());
    }

    #[tokio::test]
    async fn test_end_session_clears_everything() {
        let (_api, store) = store_with(&["a", "b"]).await;
        store.end_session();

        assert!(!store.has_session());
        assert!(store.session().is_none());
        assert!(store.is_empty());
        assert_eq!(store.refresh().await, Err(BookmarkError::NotAuthenticated));
        assert_eq!(
            store.toggle_bookmark("a").await,
            Err(BookmarkError::NotAuthenticated)
        );
    }

    #[test]
    fn test_completion_from_ended_session_is_ignored() {
        let (api, store) = tokio_test::block_on(store_with(&[]));
        let reply = api.reply_later();

        let mut toggle = task::spawn(store.toggle_bookmark("a"));
        assert_pending!(toggle.poll());

        store.end_session();
        api.set_server(&["z"]);
        tokio_test::block_on(store.start_session(session()));

        reply.send(Err(ApiError::server(500, "boom"))).unwrap();
        assert!(assert_ready!(toggle.poll()).is_err());
        assert_eq!(
            store.bookmarked_ids(),
            ids(&["z"])
        );
    }

    #[test]
    fn test_refresh_across_session_change_is_discarded() {
        let (api, store) = tokio_test::block_on(store_with(&["a"]));
        let gate = api.hold_list();

        let mut refresh = task::spawn(store.refresh());
        assert_pending!(refresh.poll());

        store.end_session();
        gate.send(()).unwrap();
        assert_eq!(assert_ready!(refresh.poll()), Ok(0));
        assert!(store.is_empty());
    }

    #[test]
    fn test_older_success_does_not_undo_newer_remove() {
        let (api, store) = tokio_test::block_on(store_with(&[]));
        let add_reply = api.reply_later();
        let remove_reply = api.reply_later();
        let readd_reply = api.reply_later();

        let mut add = task::spawn(store.toggle_bookmark("a"));
        assert_pending!(add.poll());
        let mut remove = task::spawn(store.toggle_bookmark("a"));
        assert_pending!(remove.poll());
        let mut readd = task::spawn(store.toggle_bookmark("a"));
        assert_pending!(readd.poll());
        assert!(store.is_bookmarked("a"));

        remove_reply.send(Ok(())).unwrap();
        assert_eq!(assert_ready!(remove.poll()), Ok(false));
        add_reply.send(Ok(())).unwrap();
        assert_eq!(assert_ready!(add.poll()), Ok(true));

        readd_reply
            .send(Err(ApiError::server(500, "boom")))
            .unwrap();
        assert!(assert_ready!(readd.poll()).is_err());
        // The remove is the newest change the server accepted
        assert!(!store.is_bookmarked("a"));
        assert_eq!(store.sync_state("a"), SyncState::RolledBack);
    }

    #[test]
    fn test_overlapping_refreshes_keep_newest_response() {
        let (api, store) = tokio_test::block_on(store_with(&["a"]));
        let gate = api.hold_list();

        let mut older = task::spawn(store.refresh());
        assert_pending!(older.poll());

        api.set_server(&["b"]);
        assert_eq!(tokio_test::block_on(store.refresh()), Ok(1));
        assert_eq!(store.bookmarked_ids(), ids(&["b"]));

        gate.send(()).unwrap();
        assert_eq!(assert_ready!(older.poll()), Ok(1));
        assert_eq!(store.bookmarked_ids(), ids(&["b"]));
        assert!(!store.is_loading());
    }
}
