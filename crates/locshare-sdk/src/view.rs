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

//! The location sharing screen of a conversation.
//!
//! A [`LocationSharingView`] wires the sharing pipeline to the host
//! application: the roster of the conversation goes to the map, the map mode
//! to the screen hosting it, and the user's actions to the background
//! session.
//!
//! Subscriptions come in two scopes. The view scope lives from
//! [`LocationSharingView::start`] to [`LocationSharingView::stop`]; the
//! session scope lives while the background session is bound, and is rebuilt
//! from scratch on every connection.

use std::{
    collections::BTreeSet,
    future::Future,
    sync::{Arc, Mutex},
    time::Duration,
};

use eyeball::Subscriber;
use futures_core::Stream;
use futures_util::{pin_mut, StreamExt};
use tracing::{debug, instrument, trace, warn};

use crate::{
    aggregator::{LocalContribution, LocationAggregator},
    config::LocationSharingSettings,
    connection::{ConnectionState, SessionBinder, SessionConnection},
    error::Result,
    executor::{spawn, AbortOnDrop, JoinHandleExt, SubscriptionBag},
    identifiers::{ConversationPath, NavigationArgs},
    location::{Contact, LocationSample, LocationViewModel},
    map::{CameraCommand, MapReconciler},
    sharing::{LocationSharingService, SharingDuration, StartSharingOutcome},
    traits::{Account, AccountProvider, AvatarProvider, MapHost, MapSurface, PermissionGate},
    utils::locked,
    visibility::{MapMode, MapVisibility},
};

/// The host application's side of a [`LocationSharingView`].
#[derive(Clone, Debug)]
pub struct ViewCollaborators {
    pub accounts: Arc<dyn AccountProvider>,
    pub avatars: Arc<dyn AvatarProvider>,
    pub permissions: Arc<dyn PermissionGate>,
    pub binder: Arc<dyn SessionBinder>,
    pub host: Arc<dyn MapHost>,
    pub surface: Arc<dyn MapSurface>,
}

/// The inputs of the map mode the view drives, mirrored to the host.
#[derive(Clone, Debug)]
struct Controls {
    visibility: MapVisibility,
    host: Arc<dyn MapHost>,
}

impl Controls {
    fn set_visible(&self, visible: bool) {
        let changed = self.visibility.show_controls() != Some(visible);
        self.visibility.set_show_controls(visible);

        if changed {
            self.host.set_controls_visible(visible);
        }
    }

    fn set_local_sharing(&self, sharing: bool) {
        let changed = self.visibility.local_sharing() != Some(sharing);
        self.visibility.set_local_sharing(sharing);

        if changed {
            self.host.set_sharing(sharing);
        }
    }

    /// Back to not sharing, with the controls closed.
    fn on_permission_denied(&self) {
        self.set_local_sharing(false);
        self.set_visible(false);
    }
}

/// What the session scope needs, cloned into the tasks watching the
/// connection.
#[derive(Clone, Debug)]
struct SessionWiring {
    path: ConversationPath,
    account: Arc<dyn Account>,
    aggregator: LocationAggregator,
    controls: Controls,
    avatars: Arc<dyn AvatarProvider>,
    surface: Arc<dyn MapSurface>,
    avatar_size: u32,
    hide_controls_on_share: bool,
}

impl SessionWiring {
    /// Tie the session scope to the connection state.
    async fn follow(self, connection: SessionConnection, session_bag: Arc<SubscriptionBag>) {
        let mut states = connection.subscribe_state();
        let mut state = states.next_now();

        loop {
            session_bag.clear();

            match (state, connection.bound_session()) {
                (ConnectionState::Bound, Some(session)) => {
                    debug!(path = %self.path, "Session bound, wiring it");
                    self.wire(&session, &session_bag);
                }
                _ => self.aggregator.set_local_contribution(None),
            }

            match states.next().await {
                Some(next) => state = next,
                None => break,
            }
        }
    }

    fn wire(&self, session: &LocationSharingService, bag: &SubscriptionBag) {
        self.aggregator.set_local_contribution(Some(LocalContribution::new(session)));

        bag.spawn(follow_local_sharing(
            self.path.clone(),
            session.clone(),
            self.controls.clone(),
            self.hide_controls_on_share,
        ));
        bag.spawn(follow_own_position(session.subscribe_to_my_location(), self.surface.clone()));

        let own_contact = self.account.own_contact();
        let avatars = self.avatars.clone();
        let surface = self.surface.clone();
        let size = self.avatar_size;
        bag.spawn(async move {
            match avatars.avatar(&own_contact, size).await {
                Ok(avatar) => surface.set_own_icon(avatar),
                Err(error) => warn!("Couldn't render the own avatar: {error}"),
            }
        });
    }
}

async fn follow_local_sharing(
    path: ConversationPath,
    session: LocationSharingService,
    controls: Controls,
    hide_controls_on_share: bool,
) {
    let mut sharing_set = session.subscribe_to_sharing_set();
    let mut set = sharing_set.next_now();
    let mut countdown: Option<AbortOnDrop<()>> = None;

    loop {
        let sharing = set.contains(&path);
        controls.set_local_sharing(sharing);

        if sharing {
            if countdown.as_ref().is_none_or(AbortOnDrop::is_finished) {
                let host = controls.host.clone();
                let remaining = session.sharing_expiration(path.clone());
                countdown = Some(spawn(forward_countdown(remaining, host)).abort_on_drop());
            }

            if hide_controls_on_share {
                controls.set_visible(false);
            }
        }

        match sharing_set.next().await {
            Some(next) => set = next,
            None => break,
        }
    }
}

async fn forward_countdown(remaining: impl Stream<Item = Duration>, host: Arc<dyn MapHost>) {
    pin_mut!(remaining);

    while let Some(remaining) = remaining.next().await {
        host.set_remaining_time(Some(remaining));
    }

    host.set_remaining_time(None);
}

async fn forward_replayed_starts(
    mut outcomes: Subscriber<Option<StartSharingOutcome>>,
    controls: Controls,
) {
    while let Some(outcome) = outcomes.next().await {
        if outcome == Some(StartSharingOutcome::PermissionDenied) {
            debug!("The pending sharing request was denied");
            controls.on_permission_denied();
        }
    }
}

async fn follow_own_position(
    mut location: Subscriber<Option<LocationSample>>,
    surface: Arc<dyn MapSurface>,
) {
    if let Some(sample) = location.next_now() {
        surface.set_own_position(sample.point());
    }

    while let Some(sample) = location.next().await {
        if let Some(sample) = sample {
            surface.set_own_position(sample.point());
        }
    }
}

async fn forward_mode(mut modes: Subscriber<MapMode>, host: Arc<dyn MapHost>) {
    while let Some(mode) = modes.next().await {
        trace!(?mode, "Map mode changed");

        match mode {
            MapMode::Full => host.open_location_sharing(),
            MapMode::Minimized => host.close_location_sharing(true),
            MapMode::Hidden => host.close_location_sharing(false),
        }
    }
}

async fn forward_peer_sharing(mut peer_sharing: Subscriber<Option<bool>>, visibility: MapVisibility) {
    if let Some(sharing) = peer_sharing.next_now() {
        visibility.set_peer_sharing(sharing);
    }

    while let Some(sharing) = peer_sharing.next().await {
        if let Some(sharing) = sharing {
            visibility.set_peer_sharing(sharing);
        }
    }
}

struct RosterRenderer {
    reconciler: Arc<Mutex<MapReconciler>>,
    connection: SessionConnection,
    avatars: Arc<dyn AvatarProvider>,
    surface: Arc<dyn MapSurface>,
    avatar_size: u32,
}

impl RosterRenderer {
    async fn run(self, roster: impl Stream<Item = Vec<LocationViewModel>>) {
        pin_mut!(roster);

        // Icons are rendered once per contact, for as long as the roster is
        // followed.
        let icons = SubscriptionBag::new();
        let mut with_icon = BTreeSet::new();

        while let Some(participants) = roster.next().await {
            let own_position =
                self.connection.bound_session().and_then(|session| session.last_known_position());
            let update = locked(&self.reconciler).reconcile(&participants, own_position);

            for marker in &update.markers {
                if with_icon.insert(marker.contact.id.clone()) {
                    icons.spawn(self.render_icon(marker.contact.clone()));
                }
            }

            self.surface.set_markers(update.markers);
            if let Some(camera) = update.camera {
                self.surface.apply_camera(camera);
            }
        }
    }

    fn render_icon(&self, contact: Contact) -> impl Future<Output = ()> + Send + 'static {
        let avatars = self.avatars.clone();
        let surface = self.surface.clone();
        let size = self.avatar_size;

        async move {
            match avatars.avatar(&contact, size).await {
                Ok(avatar) => surface.set_marker_icon(&contact.id, avatar),
                Err(error) => warn!(contact = %contact.id, "Couldn't render the avatar: {error}"),
            }
        }
    }
}

/// The location sharing screen of one conversation.
///
/// Dropping the view stops it.
#[derive(Debug)]
pub struct LocationSharingView {
    path: ConversationPath,
    settings: LocationSharingSettings,
    collaborators: ViewCollaborators,
    controls: Controls,
    connection: SessionConnection,
    reconciler: Arc<Mutex<MapReconciler>>,
    aggregator: Mutex<Option<LocationAggregator>>,
    view_bag: SubscriptionBag,
    session_bag: Arc<SubscriptionBag>,
}

impl LocationSharingView {
    pub fn new(
        args: NavigationArgs,
        collaborators: ViewCollaborators,
        settings: LocationSharingSettings,
    ) -> Self {
        let path = args.conversation_path();

        let visibility = MapVisibility::new();
        visibility.set_show_controls(args.show_controls);

        Self {
            connection: SessionConnection::new(path.clone(), collaborators.binder.clone()),
            controls: Controls { visibility, host: collaborators.host.clone() },
            reconciler: Arc::new(Mutex::new(MapReconciler::new(settings.bounding_box_padding))),
            aggregator: Mutex::new(None),
            view_bag: SubscriptionBag::new(),
            session_bag: Arc::new(SubscriptionBag::new()),
            path,
            settings,
            collaborators,
        }
    }

    pub fn path(&self) -> &ConversationPath {
        &self.path
    }

    pub fn connection(&self) -> &SessionConnection {
        &self.connection
    }

    pub fn mode(&self) -> MapMode {
        self.controls.visibility.mode()
    }

    pub fn subscribe_to_mode(&self) -> Subscriber<MapMode> {
        self.controls.visibility.subscribe()
    }

    /// Number of live subscriptions, both scopes included.
    pub fn subscription_count(&self) -> usize {
        self.view_bag.len() + self.session_bag.len()
    }

    /// Start following the conversation, and bind to the session when the
    /// location permission is there.
    ///
    /// Starting a started view restarts it.
    #[instrument(skip_all, fields(path = %self.path))]
    pub async fn start(&self) -> Result<()> {
        self.stop();

        let account = self.collaborators.accounts.account(&self.path.account_id).await?;
        let aggregator = LocationAggregator::new(self.path.clone(), account.clone());
        *locked(&self.aggregator) = Some(aggregator.clone());

        if let Some(show) = self.controls.visibility.show_controls() {
            self.collaborators.host.set_controls_visible(show);
        }

        self.view_bag.spawn(forward_mode(self.subscribe_to_mode(), self.collaborators.host.clone()));
        self.view_bag.spawn(forward_replayed_starts(
            self.connection.subscribe_to_replayed_starts(),
            self.controls.clone(),
        ));
        self.view_bag.spawn(forward_peer_sharing(
            aggregator.subscribe_to_peer_sharing(),
            self.controls.visibility.clone(),
        ));

        let renderer = RosterRenderer {
            reconciler: self.reconciler.clone(),
            connection: self.connection.clone(),
            avatars: self.collaborators.avatars.clone(),
            surface: self.collaborators.surface.clone(),
            avatar_size: self.settings.avatar_size,
        };
        self.view_bag.spawn(renderer.run(aggregator.roster_stream()));

        let wiring = SessionWiring {
            path: self.path.clone(),
            account,
            aggregator,
            controls: self.controls.clone(),
            avatars: self.collaborators.avatars.clone(),
            surface: self.collaborators.surface.clone(),
            avatar_size: self.settings.avatar_size,
            hide_controls_on_share: self.settings.hide_controls_on_share,
        };
        self.view_bag.spawn(wiring.follow(self.connection.clone(), self.session_bag.clone()));

        if self.collaborators.permissions.has_location_permission() {
            self.bind();
            return Ok(());
        }

        debug!("No location permission yet");
        self.controls.set_local_sharing(false);

        if self.controls.visibility.show_controls() == Some(true) {
            let permissions = self.collaborators.permissions.clone();
            let connection = self.connection.clone();
            let controls = self.controls.clone();

            self.view_bag.spawn(async move {
                if permissions.request_location_permission().await {
                    if let Err(error) = connection.request_bind() {
                        warn!("Couldn't bind to the session: {error}");
                    }
                } else {
                    debug!("Location permission denied");
                    controls.on_permission_denied();
                }
            });
        }

        Ok(())
    }

    /// Drop every subscription and let go of the session.
    pub fn stop(&self) {
        self.view_bag.clear();
        self.session_bag.clear();

        if let Some(aggregator) = locked(&self.aggregator).take() {
            aggregator.set_local_contribution(None);
        }

        self.connection.unbind();
    }

    pub fn show_controls(&self) {
        self.controls.set_visible(true);
    }

    pub fn hide_controls(&self) {
        self.controls.set_visible(false);
    }

    /// Share the local position with the conversation.
    ///
    /// Returns `None` when the request waits for the session to be bound.
    pub async fn start_sharing(&self, duration: SharingDuration) -> Option<StartSharingOutcome> {
        let outcome = self.connection.start_sharing(duration.duration(&self.settings)).await;

        if outcome == Some(StartSharingOutcome::PermissionDenied) {
            self.controls.on_permission_denied();
        }

        outcome
    }

    pub async fn stop_sharing(&self) -> bool {
        self.connection.stop_sharing().await
    }

    /// The user moved the map around.
    pub fn on_user_gesture(&self) {
        locked(&self.reconciler).on_user_gesture();
    }

    /// Bring every participant back into view.
    pub fn recenter(&self) -> CameraCommand {
        let command = locked(&self.reconciler).recenter();
        self.collaborators.surface.apply_camera(command);
        command
    }

    /// Whether the camera follows the participants.
    pub fn is_tracking_all(&self) -> bool {
        locked(&self.reconciler).is_tracking_all()
    }

    fn bind(&self) {
        if let Err(error) = self.connection.request_bind() {
            warn!("Couldn't bind to the session: {error}");
        }
    }
}

impl Drop for LocationSharingView {
    fn drop(&mut self) {
        self.stop();
    }
}
