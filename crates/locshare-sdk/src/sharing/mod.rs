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

//! The background session sharing the local position.
//!
//! The [`LocationSharingService`] owns the sharing set: the conversations the
//! local user currently shares their position with, each with its own expiry
//! timer. While the set isn't empty, the latest position of the local user is
//! sent to every conversation of the set, at most once per broadcast
//! interval.

use std::{
    collections::{BTreeMap, BTreeSet},
    fmt,
    sync::{Arc, Mutex, Weak},
    time::Duration,
};

use async_stream::stream;
use eyeball::{SharedObservable, Subscriber};
use futures_core::Stream;
use tokio::time::{sleep, sleep_until, Instant};
use tracing::{debug, info, instrument, trace, warn};

mod store;
mod summary;

pub use self::{
    store::{JsonFilePositionStore, MemoryPositionStore, PositionStore},
    summary::{format_remaining, SharingDuration, SharingSummary},
};
use crate::{
    config::LocationSharingSettings,
    error::Result,
    executor::{spawn, AbortOnDrop, JoinHandleExt},
    geo_message::{GeoMessage, PositionReport},
    identifiers::ConversationPath,
    location::{GeoPoint, LocationSample},
    traits::{MessageSender, PermissionGate},
    utils::locked,
};

/// The result of [`LocationSharingService::start_sharing`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StartSharingOutcome {
    /// A new share was started.
    Started,
    /// The conversation was already shared; its expiry was reset.
    Restarted,
    /// A location permission request is in flight; the request will be
    /// served with it, replacing any other queued request.
    Queued,
    /// The user refused the location permission.
    PermissionDenied,
}

/// The longest a share lasts; longer requests are shortened to it.
pub const MAX_SHARE_DURATION: Duration = Duration::from_secs(7 * 24 * 60 * 60);

#[derive(Debug)]
struct PendingShare {
    path: ConversationPath,
    duration: Duration,
}

struct ActiveShare {
    expires_at: Instant,
    _expiry: AbortOnDrop<()>,
}

#[derive(Default)]
struct SharingState {
    shares: BTreeMap<ConversationPath, ActiveShare>,
    broadcaster: Option<AbortOnDrop<()>>,
}

struct ServiceInner {
    settings: LocationSharingSettings,
    sender: Arc<dyn MessageSender>,
    permissions: Arc<dyn PermissionGate>,
    store: Arc<dyn PositionStore>,

    /// Shares and their timers. Never held across an `.await`.
    state: Mutex<SharingState>,

    sharing_set: SharedObservable<BTreeSet<ConversationPath>>,
    my_location: SharedObservable<Option<LocationSample>>,
    my_position: SharedObservable<Option<PositionReport>>,

    /// The request waiting for the location permission.
    pending_permission: Mutex<Option<PendingShare>>,
}

/// The background location sharing session.
///
/// Cloning it is cheap, every clone is a handle on the same session.
#[derive(Clone)]
pub struct LocationSharingService {
    inner: Arc<ServiceInner>,
}

impl LocationSharingService {
    /// Create a new builder for a `LocationSharingService`.
    pub fn builder(
        sender: Arc<dyn MessageSender>,
        permissions: Arc<dyn PermissionGate>,
    ) -> LocationSharingServiceBuilder {
        LocationSharingServiceBuilder::new(sender, permissions)
    }

    pub fn settings(&self) -> &LocationSharingSettings {
        &self.inner.settings
    }

    /// Start sharing the local position with `path` for `duration`.
    ///
    /// Sharing again with a conversation restarts its countdown. Without the
    /// location permission, the permission is requested first; only the last
    /// request made while the permission prompt is up is served.
    #[instrument(skip_all, fields(path = %path))]
    pub async fn start_sharing(
        &self,
        path: ConversationPath,
        duration: Duration,
    ) -> StartSharingOutcome {
        if self.inner.permissions.has_location_permission() {
            return self.inner.install_share(path, duration);
        }

        let first_request = locked(&self.inner.pending_permission)
            .replace(PendingShare { path, duration })
            .is_none();

        if !first_request {
            debug!("A permission request is already in flight, queuing");
            return StartSharingOutcome::Queued;
        }

        debug!("Requesting the location permission");
        let granted = self.inner.permissions.request_location_permission().await;

        let Some(PendingShare { path, duration }) = locked(&self.inner.pending_permission).take()
        else {
            return StartSharingOutcome::Queued;
        };

        if granted {
            self.inner.install_share(path, duration)
        } else {
            warn!(%path, "Location permission denied, not sharing");
            StartSharingOutcome::PermissionDenied
        }
    }

    /// Stop sharing with `path` and tell the conversation.
    ///
    /// Returns whether the conversation was shared; stopping a conversation
    /// that isn't shared does nothing.
    #[instrument(skip_all, fields(path = %path))]
    pub async fn stop_sharing(&self, path: &ConversationPath) -> bool {
        if !self.inner.remove_share(path) {
            trace!("Not sharing, nothing to stop");
            return false;
        }

        info!("Stopped sharing");

        if let Err(error) = self.inner.sender.send_text_message(path, GeoMessage::Stop.to_payload()).await
        {
            warn!("Couldn't tell the conversation that sharing stopped: {error}");
        }

        true
    }

    /// Stop every share at once.
    pub fn stop_all(&self) {
        let mut state = locked(&self.inner.state);
        if state.shares.is_empty() {
            return;
        }

        info!(count = state.shares.len(), "Stopping every share");
        state.shares.clear();
        self.inner.publish_sharing_set(&state);
        self.inner.ensure_broadcaster(&mut state);
    }

    /// Stop every share and save the last known position.
    pub async fn shutdown(&self) {
        self.stop_all();

        if let Err(error) = self.save_last_known_position().await {
            warn!("Couldn't save the last known position: {error}");
        }
    }

    /// Write the last known position to the position store, if there is
    /// one.
    pub async fn save_last_known_position(&self) -> Result<()> {
        if let Some(position) = self.last_known_position() {
            self.inner.store.save(position).await?;
        }

        Ok(())
    }

    pub fn is_sharing(&self, path: &ConversationPath) -> bool {
        locked(&self.inner.state).shares.contains_key(path)
    }

    /// The conversations shared with right now.
    pub fn sharing_set(&self) -> BTreeSet<ConversationPath> {
        self.inner.sharing_set.get()
    }

    /// Subscribe to the changes of the sharing set.
    pub fn subscribe_to_sharing_set(&self) -> Subscriber<BTreeSet<ConversationPath>> {
        self.inner.sharing_set.subscribe()
    }

    /// The time left before the share of `path` expires.
    pub fn remaining(&self, path: &ConversationPath) -> Option<Duration> {
        let expires_at = self.inner.expiry_of(path)?;
        Some(expires_at.saturating_duration_since(Instant::now()))
    }

    /// A countdown of the share of `path`.
    ///
    /// The remaining time is yielded immediately, then once per countdown
    /// tick, always computed from the current expiry so that restarting the
    /// share resets the countdown. Zero is yielded when the share ends, be it
    /// on expiry or when stopped, which also ends the stream. For a
    /// conversation that isn't shared, the stream ends immediately.
    pub fn sharing_expiration(&self, path: ConversationPath) -> impl Stream<Item = Duration> {
        let inner = Arc::downgrade(&self.inner);
        let tick = self.inner.settings.countdown_tick;
        let mut changes = self.inner.sharing_set.subscribe();

        stream! {
            let mut counting = false;

            loop {
                let expires_at = inner.upgrade().and_then(|inner| inner.expiry_of(&path));
                let Some(expires_at) = expires_at else {
                    if counting {
                        yield Duration::ZERO;
                    }
                    break;
                };
                counting = true;

                let remaining = expires_at.saturating_duration_since(Instant::now());
                if remaining.is_zero() {
                    if let Some(inner) = inner.upgrade() {
                        inner.expire(&path, expires_at);
                    }
                    yield Duration::ZERO;
                    break;
                }

                yield remaining;

                // Wake up early when the share is stopped or restarted.
                let deadline = Instant::now() + remaining.min(tick);
                loop {
                    tokio::select! {
                        _ = sleep_until(deadline) => break,
                        _ = changes.next() => {
                            let current = inner.upgrade().and_then(|inner| inner.expiry_of(&path));
                            if current != Some(expires_at) {
                                break;
                            }
                        }
                    }
                }
            }
        }
    }

    /// The state of the ongoing-sharing notification, `None` when not
    /// sharing.
    pub fn summary(&self) -> Option<SharingSummary> {
        let state = locked(&self.inner.state);
        let latest = state.shares.values().map(|share| share.expires_at).max()?;

        let single_conversation =
            if state.shares.len() == 1 { state.shares.keys().next().cloned() } else { None };

        Some(SharingSummary {
            share_count: state.shares.len(),
            single_conversation,
            minutes_remaining: summary::minutes_ceil(
                latest.saturating_duration_since(Instant::now()),
            ),
        })
    }

    /// Feed a new position of the local user.
    ///
    /// The position is saved on [`Self::shutdown`].
    pub fn update_my_location(&self, report: PositionReport) {
        self.inner.my_location.set(Some(report.to_sample()));
        self.inner.my_position.set(Some(report));
    }

    /// The latest position of the local user.
    pub fn my_location(&self) -> Option<LocationSample> {
        self.inner.my_location.get()
    }

    pub fn subscribe_to_my_location(&self) -> Subscriber<Option<LocationSample>> {
        self.inner.my_location.subscribe()
    }

    pub fn last_known_position(&self) -> Option<GeoPoint> {
        self.my_location().map(|sample| sample.point())
    }

    /// Whether both handles control the same session.
    pub fn is_same_session(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for LocationSharingService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocationSharingService")
            .field("sharing_set", &self.inner.sharing_set.get())
            .field("settings", &self.inner.settings)
            .finish_non_exhaustive()
    }
}

impl ServiceInner {
    fn install_share(
        self: &Arc<Self>,
        path: ConversationPath,
        duration: Duration,
    ) -> StartSharingOutcome {
        let duration = duration.min(MAX_SHARE_DURATION);
        let expires_at = Instant::now() + duration;
        let expiry = spawn_expiry(Arc::downgrade(self), path.clone(), expires_at);

        let mut state = locked(&self.state);
        let previous =
            state.shares.insert(path.clone(), ActiveShare { expires_at, _expiry: expiry });

        // Dropping the previous share aborts its timer.
        let outcome = if previous.is_some() {
            info!(%path, ?duration, "Restarted sharing");
            StartSharingOutcome::Restarted
        } else {
            info!(%path, ?duration, "Started sharing");
            self.publish_sharing_set(&state);
            StartSharingOutcome::Started
        };

        self.ensure_broadcaster(&mut state);
        outcome
    }

    fn remove_share(self: &Arc<Self>, path: &ConversationPath) -> bool {
        let mut state = locked(&self.state);
        if state.shares.remove(path).is_none() {
            return false;
        }

        self.publish_sharing_set(&state);
        self.ensure_broadcaster(&mut state);
        true
    }

    /// End the share of `path` if it still expires at `expires_at`.
    fn expire(self: &Arc<Self>, path: &ConversationPath, expires_at: Instant) {
        let mut state = locked(&self.state);
        if !state.shares.get(path).is_some_and(|share| share.expires_at == expires_at) {
            return;
        }

        info!(%path, "Share expired");
        state.shares.remove(path);
        self.publish_sharing_set(&state);
        self.ensure_broadcaster(&mut state);
    }

    fn expiry_of(&self, path: &ConversationPath) -> Option<Instant> {
        locked(&self.state).shares.get(path).map(|share| share.expires_at)
    }

    fn publish_sharing_set(&self, state: &SharingState) {
        self.sharing_set.set(state.shares.keys().cloned().collect());
    }

    /// Run the broadcaster while there is something to share, stop it
    /// otherwise.
    fn ensure_broadcaster(self: &Arc<Self>, state: &mut SharingState) {
        if state.shares.is_empty() {
            if state.broadcaster.take().is_some() {
                debug!("Nothing left to share, stopping the broadcaster");
            }
            return;
        }

        if state.broadcaster.as_ref().is_some_and(|task| !task.is_finished()) {
            return;
        }

        debug!("Starting the broadcaster");
        state.broadcaster = Some(spawn_broadcaster(
            Arc::downgrade(self),
            self.my_position.subscribe(),
            self.settings.broadcast_interval,
        ));
    }

    async fn broadcast(&self, report: PositionReport) {
        let paths = self.sharing_set.get();
        trace!(count = paths.len(), "Sending the local position");

        let payload = GeoMessage::Position(report).to_payload();
        for path in paths {
            if let Err(error) = self.sender.send_text_message(&path, payload.clone()).await {
                warn!(%path, "Couldn't send the local position: {error}");
            }
        }
    }
}

fn spawn_expiry(
    inner: Weak<ServiceInner>,
    path: ConversationPath,
    expires_at: Instant,
) -> AbortOnDrop<()> {
    spawn(async move {
        sleep_until(expires_at).await;

        if let Some(inner) = inner.upgrade() {
            inner.expire(&path, expires_at);
        }
    })
    .abort_on_drop()
}

/// Send the latest position at most once per `interval`.
fn spawn_broadcaster(
    inner: Weak<ServiceInner>,
    mut positions: Subscriber<Option<PositionReport>>,
    interval: Duration,
) -> AbortOnDrop<()> {
    spawn(async move {
        let mut next = positions.next_now();

        loop {
            if let Some(report) = next {
                let Some(inner) = inner.upgrade() else {
                    break;
                };
                inner.broadcast(report).await;
                drop(inner);

                sleep(interval).await;
            }

            match positions.next().await {
                Some(position) => next = position,
                None => break,
            }
        }
    })
    .abort_on_drop()
}

/// Builder for [`LocationSharingService`].
#[derive(Debug)]
pub struct LocationSharingServiceBuilder {
    sender: Arc<dyn MessageSender>,
    permissions: Arc<dyn PermissionGate>,
    settings: LocationSharingSettings,
    store: Option<Arc<dyn PositionStore>>,
}

impl LocationSharingServiceBuilder {
    fn new(sender: Arc<dyn MessageSender>, permissions: Arc<dyn PermissionGate>) -> Self {
        Self { sender, permissions, settings: LocationSharingSettings::default(), store: None }
    }

    #[must_use]
    pub fn settings(mut self, settings: LocationSharingSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Where the last known position is kept; in memory by default.
    #[must_use]
    pub fn position_store(mut self, store: Arc<dyn PositionStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Build the service, restoring the last known position.
    pub async fn build(self) -> LocationSharingService {
        let store = self.store.unwrap_or_else(|| Arc::new(MemoryPositionStore::new()));

        let restored = match store.load().await {
            Ok(position) => position,
            Err(error) => {
                warn!("Couldn't load the last known position: {error}");
                None
            }
        };

        let my_position = restored.map(|point| PositionReport::new(point.latitude, point.longitude, 0));

        LocationSharingService {
            inner: Arc::new(ServiceInner {
                settings: self.settings,
                sender: self.sender,
                permissions: self.permissions,
                store,
                state: Mutex::new(SharingState::default()),
                sharing_set: SharedObservable::new(BTreeSet::new()),
                my_location: SharedObservable::new(my_position.map(|report| report.to_sample())),
                my_position: SharedObservable::new(my_position),
                pending_permission: Mutex::new(None),
            }),
        }
    }
}
