// Copyright 2026 The Matrix.org Foundation C.I.C.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! The binding to the background sharing session.

use std::{
    fmt,
    sync::{Arc, Mutex, Weak},
    time::Duration,
};

use eyeball::{SharedObservable, Subscriber};
use tokio::sync::mpsc;
use tracing::{debug, instrument, warn};

use crate::{
    error::Result,
    executor::{spawn, AbortOnDrop, JoinHandleExt},
    identifiers::ConversationPath,
    sharing::{LocationSharingService, StartSharingOutcome},
    utils::locked,
    AsyncTraitDeps,
};

/// The state of a [`SessionConnection`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ConnectionState {
    #[default]
    Unbound,
    /// A binding was requested, the session isn't connected yet.
    Binding,
    Bound,
}

/// What the session reports after a binding.
#[derive(Clone, Debug)]
pub enum ConnectionEvent {
    Connected(LocationSharingService),
    /// The session went away; it has to be bound again.
    Disconnected,
}

/// Binds to the background session of the host application.
pub trait SessionBinder: AsyncTraitDeps {
    /// Start binding; the session reports through the returned channel.
    fn bind(&self) -> Result<mpsc::UnboundedReceiver<ConnectionEvent>>;

    fn unbind(&self);
}

/// A one-slot mailbox for the sharing request made before the session is
/// bound. The last request wins.
#[derive(Debug, Default)]
pub struct PendingStart {
    slot: Mutex<Option<Duration>>,
}

impl PendingStart {
    pub fn put(&self, duration: Duration) {
        *locked(&self.slot) = Some(duration);
    }

    pub fn take(&self) -> Option<Duration> {
        locked(&self.slot).take()
    }

    pub fn clear(&self) {
        locked(&self.slot).take();
    }

    pub fn is_empty(&self) -> bool {
        locked(&self.slot).is_none()
    }
}

struct ConnectionInner {
    path: ConversationPath,
    binder: Arc<dyn SessionBinder>,
    state: SharedObservable<ConnectionState>,
    session: Mutex<Option<LocationSharingService>>,
    pending: PendingStart,
    replayed: SharedObservable<Option<StartSharingOutcome>>,
    driver: Mutex<Option<AbortOnDrop<()>>>,
}

impl ConnectionInner {
    async fn on_connected(&self, session: LocationSharingService) {
        debug!(path = %self.path, "Session connected");
        *locked(&self.session) = Some(session.clone());
        self.state.set(ConnectionState::Bound);

        if let Some(duration) = self.pending.take() {
            debug!(path = %self.path, ?duration, "Replaying the pending sharing request");
            let outcome = session.start_sharing(self.path.clone(), duration).await;
            self.replayed.set(Some(outcome));
        }
    }

    fn on_disconnected(&self) {
        debug!(path = %self.path, "Session disconnected");
        locked(&self.session).take();
        self.state.set(ConnectionState::Unbound);
    }
}

impl Drop for ConnectionInner {
    fn drop(&mut self) {
        if self.state.get() != ConnectionState::Unbound {
            self.binder.unbind();
        }
    }
}

/// The connection of a view to the background sharing session.
///
/// The state goes from [`ConnectionState::Unbound`] to
/// [`ConnectionState::Binding`] on [`SessionConnection::request_bind`], and
/// to [`ConnectionState::Bound`] once the session reports itself connected.
/// A request to share made before that is kept and replayed on connection.
///
/// Dropping the last clone unbinds the session.
#[derive(Clone)]
pub struct SessionConnection {
    inner: Arc<ConnectionInner>,
}

impl SessionConnection {
    pub fn new(path: ConversationPath, binder: Arc<dyn SessionBinder>) -> Self {
        Self {
            inner: Arc::new(ConnectionInner {
                path,
                binder,
                state: SharedObservable::new(ConnectionState::Unbound),
                session: Mutex::new(None),
                pending: PendingStart::default(),
                replayed: SharedObservable::new(None),
                driver: Mutex::new(None),
            }),
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.inner.state.get()
    }

    pub fn subscribe_state(&self) -> Subscriber<ConnectionState> {
        self.inner.state.subscribe()
    }

    /// The session, while bound.
    pub fn bound_session(&self) -> Option<LocationSharingService> {
        locked(&self.inner.session).clone()
    }

    pub fn pending_start(&self) -> &PendingStart {
        &self.inner.pending
    }

    /// The outcomes of the sharing requests served on connection, each one
    /// published even when equal to the previous.
    pub fn subscribe_to_replayed_starts(&self) -> Subscriber<Option<StartSharingOutcome>> {
        self.inner.replayed.subscribe()
    }

    /// Bind to the session, unless already binding or bound.
    #[instrument(skip_all, fields(path = %self.inner.path))]
    pub fn request_bind(&self) -> Result<()> {
        let mut driver = locked(&self.inner.driver);

        if self.inner.state.get() != ConnectionState::Unbound {
            return Ok(());
        }

        self.inner.state.set(ConnectionState::Binding);

        let events = match self.inner.binder.bind() {
            Ok(events) => events,
            Err(error) => {
                warn!("Couldn't bind to the session: {error}");
                self.inner.state.set(ConnectionState::Unbound);
                return Err(error);
            }
        };

        debug!("Binding");
        *driver = Some(spawn(drive(Arc::downgrade(&self.inner), events)).abort_on_drop());

        Ok(())
    }

    /// Let go of the session.
    #[instrument(skip_all, fields(path = %self.inner.path))]
    pub fn unbind(&self) {
        let driver = locked(&self.inner.driver).take();
        drop(driver);

        if self.inner.state.get() == ConnectionState::Unbound {
            return;
        }

        debug!("Unbinding");
        self.inner.binder.unbind();
        locked(&self.inner.session).take();
        self.inner.state.set(ConnectionState::Unbound);
    }

    /// Share the local position with the conversation for `duration`.
    ///
    /// While unbound, the request is kept, replacing any earlier one, and a
    /// binding is requested; the request is served once the session is
    /// connected and `None` is returned.
    pub async fn start_sharing(&self, duration: Duration) -> Option<StartSharingOutcome> {
        self.inner.pending.put(duration);

        if let Some(session) = self.bound_session() {
            // Served by the connection handler in the meantime otherwise.
            let duration = self.inner.pending.take()?;
            return Some(session.start_sharing(self.inner.path.clone(), duration).await);
        }

        if let Err(error) = self.request_bind() {
            warn!(path = %self.inner.path, "The sharing request waits for a binding: {error}");
        }

        None
    }

    /// Stop sharing with the conversation, dropping any pending request.
    pub async fn stop_sharing(&self) -> bool {
        self.inner.pending.clear();

        match self.bound_session() {
            Some(session) => session.stop_sharing(&self.inner.path).await,
            None => false,
        }
    }
}

async fn drive(inner: Weak<ConnectionInner>, mut events: mpsc::UnboundedReceiver<ConnectionEvent>) {
    while let Some(event) = events.recv().await {
        let Some(inner) = inner.upgrade() else {
            return;
        };

        match event {
            ConnectionEvent::Connected(session) => inner.on_connected(session).await,
            ConnectionEvent::Disconnected => {
                inner.on_disconnected();
                return;
            }
        }
    }

    if let Some(inner) = inner.upgrade() {
        inner.on_disconnected();
    }
}

impl fmt::Debug for SessionConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionConnection")
            .field("path", &self.inner.path)
            .field("state", &self.inner.state.get())
            .field("pending", &self.inner.pending)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::{sync::Arc, time::Duration};

    use assert_matches::assert_matches;
    use eyeball::Subscriber;
    use locshare_test::{async_test, ACCOUNT_ID, CONVERSATION_ID};
    use tokio::time::timeout;

    use super::{ConnectionState, SessionConnection};
    use crate::{
        error::Error,
        identifiers::ConversationPath,
        sharing::{LocationSharingService, StartSharingOutcome},
        test_utils::{MockMessageSender, MockPermissionGate, MockSessionBinder},
    };

    fn path() -> ConversationPath {
        ConversationPath::new(ACCOUNT_ID, CONVERSATION_ID)
    }

    async fn service() -> LocationSharingService {
        LocationSharingService::builder(MockMessageSender::new(), MockPermissionGate::granted())
            .build()
            .await
    }

    async fn wait_for(states: &mut Subscriber<ConnectionState>, expected: ConnectionState) {
        timeout(Duration::from_millis(500), async {
            while states.next().await != Some(expected) {}
        })
        .await
        .expect("the connection never reached the expected state");
    }

    #[async_test]
    async fn test_bind_and_connect() {
        let binder = MockSessionBinder::new();
        let connection = SessionConnection::new(path(), binder.clone());
        let mut states = connection.subscribe_state();
        assert_eq!(connection.state(), ConnectionState::Unbound);

        connection.request_bind().unwrap();
        assert_eq!(connection.state(), ConnectionState::Binding);
        assert!(connection.bound_session().is_none());

        // Binding twice is a no-op.
        connection.request_bind().unwrap();
        assert_eq!(binder.bind_count(), 1);

        let service = service().await;
        assert!(binder.connect(service.clone()));
        wait_for(&mut states, ConnectionState::Bound).await;

        assert!(connection.bound_session().unwrap().is_same_session(&service));
        connection.request_bind().unwrap();
        assert_eq!(binder.bind_count(), 1);
    }

    #[async_test]
    async fn test_failed_bind_goes_back_to_unbound() {
        let binder = MockSessionBinder::new();
        binder.set_failing(true);
        let connection = SessionConnection::new(path(), binder.clone());

        assert_matches!(connection.request_bind(), Err(Error::Bind(_)));
        assert_eq!(connection.state(), ConnectionState::Unbound);

        binder.set_failing(false);
        connection.request_bind().unwrap();
        assert_eq!(connection.state(), ConnectionState::Binding);
    }

    #[async_test]
    async fn test_pending_start_is_replayed_once() {
        let binder = MockSessionBinder::new();
        let connection = SessionConnection::new(path(), binder.clone());
        let mut states = connection.subscribe_state();

        assert_eq!(connection.start_sharing(Duration::from_secs(60)).await, None);
        // The last request wins.
        assert_eq!(connection.start_sharing(Duration::from_secs(600)).await, None);
        assert_eq!(binder.bind_count(), 1);
        assert!(!connection.pending_start().is_empty());

        let service = service().await;
        let mut sharing_set = service.subscribe_to_sharing_set();
        let mut replayed = connection.subscribe_to_replayed_starts();
        binder.connect(service.clone());
        wait_for(&mut states, ConnectionState::Bound).await;

        let outcome = timeout(Duration::from_millis(500), replayed.next()).await.unwrap();
        assert_eq!(outcome, Some(Some(StartSharingOutcome::Started)));

        let shared = timeout(Duration::from_millis(500), sharing_set.next()).await.unwrap();
        assert!(shared.unwrap().contains(&path()));
        assert!(service.remaining(&path()).unwrap() > Duration::from_secs(60));
        assert!(connection.pending_start().is_empty());

        // Once bound, requests go straight to the session.
        assert_eq!(
            connection.start_sharing(Duration::from_secs(60)).await,
            Some(StartSharingOutcome::Restarted)
        );
        assert!(connection.stop_sharing().await);
        assert!(!service.is_sharing(&path()));
    }

    #[async_test]
    async fn test_disconnect_and_rebind() {
        let binder = MockSessionBinder::new();
        let connection = SessionConnection::new(path(), binder.clone());
        let mut states = connection.subscribe_state();

        connection.request_bind().unwrap();
        binder.connect(service().await);
        wait_for(&mut states, ConnectionState::Bound).await;

        binder.disconnect();
        wait_for(&mut states, ConnectionState::Unbound).await;
        assert!(connection.bound_session().is_none());
        assert!(!connection.stop_sharing().await);

        connection.request_bind().unwrap();
        assert_eq!(binder.bind_count(), 2);
        binder.connect(service().await);
        wait_for(&mut states, ConnectionState::Bound).await;

        connection.unbind();
        assert_eq!(connection.state(), ConnectionState::Unbound);
        assert_eq!(binder.unbind_count(), 1);
        assert!(!binder.is_bound());

        // Unbinding twice is a no-op.
        connection.unbind();
        assert_eq!(binder.unbind_count(), 1);
    }

    #[async_test]
    async fn test_dropping_the_connection_unbinds() {
        let binder = MockSessionBinder::new();
        let connection = SessionConnection::new(path(), binder.clone());
        connection.request_bind().unwrap();

        drop(connection);
        assert_eq!(binder.unbind_count(), 1);

        let idle = SessionConnection::new(path(), binder.clone());
        drop(idle);
        assert_eq!(binder.unbind_count(), 1);
        assert_eq!(Arc::strong_count(&binder), 1);
    }
}
