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

//! Test doubles of the host application's collaborators.

use std::{
    collections::BTreeMap,
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};

use async_trait::async_trait;
use futures_util::{stream::BoxStream, StreamExt};
use tokio::sync::{mpsc, watch};

use crate::{
    config::{LocationSharingSettings, PEER_LOCATION_EXPIRATION},
    connection::{ConnectionEvent, SessionBinder},
    error::{Error, Result},
    geo_message::{GeoMessage, MIME_GEOLOCATION},
    identifiers::{ContactId, ConversationPath, NavigationArgs},
    location::{Contact, GeoPoint, PeerFeeds, PeerLocationRegistry},
    map::{CameraCommand, Marker},
    sharing::LocationSharingService,
    traits::{
        Account, AccountProvider, Avatar, AvatarProvider, MapHost, MapSurface, MessageSender,
        PermissionGate,
    },
    utils::locked,
    view::{LocationSharingView, ViewCollaborators},
};

/// Records the messages sent through it.
#[derive(Debug, Default)]
pub struct MockMessageSender {
    sent: Mutex<Vec<(ConversationPath, BTreeMap<String, String>)>>,
    failing: AtomicBool,
}

impl MockMessageSender {
    pub fn new() -> Arc<Self> {
        Arc::default()
    }

    /// Make every following send fail.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// The geolocation messages sent so far, oldest first.
    pub fn geo_messages(&self) -> Vec<(ConversationPath, GeoMessage)> {
        locked(&self.sent)
            .iter()
            .filter_map(|(path, payload)| {
                let message = GeoMessage::from_json_str(payload.get(MIME_GEOLOCATION)?).ok()??;
                Some((path.clone(), message))
            })
            .collect()
    }

    pub fn clear(&self) {
        locked(&self.sent).clear();
    }
}

#[async_trait]
impl MessageSender for MockMessageSender {
    async fn send_text_message(
        &self,
        path: &ConversationPath,
        payload: BTreeMap<String, String>,
    ) -> Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(Error::Io(std::io::Error::other("the daemon is gone")));
        }

        locked(&self.sent).push((path.clone(), payload));
        Ok(())
    }
}

/// How a [`MockPermissionGate`] answers permission requests.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PermissionAnswer {
    Grant,
    Deny,
    /// Wait for [`MockPermissionGate::answer`].
    Manual,
}

#[derive(Debug)]
pub struct MockPermissionGate {
    granted: AtomicBool,
    mode: PermissionAnswer,
    requests: AtomicUsize,
    answer: watch::Sender<Option<bool>>,
}

impl MockPermissionGate {
    /// A gate whose permission is already granted.
    pub fn granted() -> Arc<Self> {
        let gate = Self::answering(PermissionAnswer::Grant);
        gate.granted.store(true, Ordering::SeqCst);
        gate
    }

    /// A gate without the permission, answering requests with `mode`.
    pub fn answering(mode: PermissionAnswer) -> Arc<Self> {
        Arc::new(Self {
            granted: AtomicBool::new(false),
            mode,
            requests: AtomicUsize::new(0),
            answer: watch::Sender::new(None),
        })
    }

    /// Answer the pending and future requests of a manual gate.
    pub fn answer(&self, granted: bool) {
        self.answer.send_replace(Some(granted));
    }

    pub fn request_count(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PermissionGate for MockPermissionGate {
    fn has_location_permission(&self) -> bool {
        self.granted.load(Ordering::SeqCst)
    }

    async fn request_location_permission(&self) -> bool {
        self.requests.fetch_add(1, Ordering::SeqCst);

        let granted = match self.mode {
            PermissionAnswer::Grant => true,
            PermissionAnswer::Deny => false,
            PermissionAnswer::Manual => {
                let mut answer = self.answer.subscribe();
                let granted = match answer.wait_for(Option::is_some).await {
                    Ok(answer) => *answer == Some(true),
                    Err(_) => false,
                };
                granted
            }
        };

        if granted {
            self.granted.store(true, Ordering::SeqCst);
        }
        granted
    }
}

/// An account backed by a [`PeerLocationRegistry`].
#[derive(Debug)]
pub struct MockAccount {
    own: Contact,
    contacts: Mutex<BTreeMap<ContactId, Contact>>,
    counterparts: Mutex<BTreeMap<String, ContactId>>,
    registry: PeerLocationRegistry,
}

impl MockAccount {
    pub fn new(own: Contact) -> Arc<Self> {
        Arc::new(Self {
            own,
            contacts: Mutex::default(),
            counterparts: Mutex::default(),
            registry: PeerLocationRegistry::new(PEER_LOCATION_EXPIRATION),
        })
    }

    pub fn add_contact(&self, contact: Contact) {
        locked(&self.contacts).insert(contact.id.clone(), contact);
    }

    /// Make `contact_id` the peer of the one-to-one `conversation_id`.
    pub fn set_counterpart(&self, conversation_id: &str, contact_id: ContactId) {
        locked(&self.counterparts).insert(conversation_id.to_owned(), contact_id);
    }

    pub fn registry(&self) -> &PeerLocationRegistry {
        &self.registry
    }
}

impl Account for MockAccount {
    fn own_contact(&self) -> Contact {
        self.own.clone()
    }

    fn contact(&self, contact_id: &ContactId) -> Option<Contact> {
        locked(&self.contacts).get(contact_id).cloned()
    }

    fn conversation_counterpart(&self, conversation_id: &str) -> Option<ContactId> {
        locked(&self.counterparts).get(conversation_id).cloned()
    }

    fn location_updates(&self) -> BoxStream<'static, PeerFeeds> {
        self.registry.subscribe().boxed()
    }
}

#[derive(Debug, Default)]
pub struct MockAccountProvider {
    accounts: Mutex<BTreeMap<String, Arc<dyn Account>>>,
}

impl MockAccountProvider {
    pub fn new() -> Arc<Self> {
        Arc::default()
    }

    pub fn add_account(&self, account_id: &str, account: Arc<dyn Account>) {
        locked(&self.accounts).insert(account_id.to_owned(), account);
    }
}

#[async_trait]
impl AccountProvider for MockAccountProvider {
    async fn account(&self, account_id: &str) -> Result<Arc<dyn Account>> {
        locked(&self.accounts)
            .get(account_id)
            .cloned()
            .ok_or_else(|| Error::AccountNotFound(account_id.to_owned()))
    }
}

/// Renders the contact id as the avatar bytes.
#[derive(Debug, Default)]
pub struct MockAvatarProvider {
    requests: AtomicUsize,
    failing: Mutex<Vec<ContactId>>,
}

impl MockAvatarProvider {
    pub fn new() -> Arc<Self> {
        Arc::default()
    }

    pub fn fail_for(&self, contact_id: ContactId) {
        locked(&self.failing).push(contact_id);
    }

    pub fn request_count(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AvatarProvider for MockAvatarProvider {
    async fn avatar(&self, contact: &Contact, size: u32) -> Result<Avatar> {
        self.requests.fetch_add(1, Ordering::SeqCst);

        if locked(&self.failing).contains(&contact.id) {
            return Err(Error::Avatar {
                contact: contact.id.clone(),
                reason: "no picture".to_owned(),
            });
        }

        Ok(Avatar { size, data: contact.id.as_str().as_bytes().into() })
    }
}

/// A binder handing out a given session when asked.
#[derive(Debug, Default)]
pub struct MockSessionBinder {
    events: Mutex<Option<mpsc::UnboundedSender<ConnectionEvent>>>,
    binds: AtomicUsize,
    unbinds: AtomicUsize,
    fail_binds: AtomicBool,
}

impl MockSessionBinder {
    pub fn new() -> Arc<Self> {
        Arc::default()
    }

    pub fn set_failing(&self, failing: bool) {
        self.fail_binds.store(failing, Ordering::SeqCst);
    }

    /// Report the session as connected. Returns `false` when nothing is
    /// bound.
    pub fn connect(&self, service: LocationSharingService) -> bool {
        self.send(ConnectionEvent::Connected(service))
    }

    /// Report the session as lost.
    pub fn disconnect(&self) -> bool {
        self.send(ConnectionEvent::Disconnected)
    }

    pub fn bind_count(&self) -> usize {
        self.binds.load(Ordering::SeqCst)
    }

    pub fn unbind_count(&self) -> usize {
        self.unbinds.load(Ordering::SeqCst)
    }

    pub fn is_bound(&self) -> bool {
        locked(&self.events).is_some()
    }

    fn send(&self, event: ConnectionEvent) -> bool {
        locked(&self.events).as_ref().is_some_and(|events| events.send(event).is_ok())
    }
}

impl SessionBinder for MockSessionBinder {
    fn bind(&self) -> Result<mpsc::UnboundedReceiver<ConnectionEvent>> {
        self.binds.fetch_add(1, Ordering::SeqCst);

        if self.fail_binds.load(Ordering::SeqCst) {
            return Err(Error::Bind("the session refused the binding".to_owned()));
        }

        let (sender, receiver) = mpsc::unbounded_channel();
        *locked(&self.events) = Some(sender);
        Ok(receiver)
    }

    fn unbind(&self) {
        self.unbinds.fetch_add(1, Ordering::SeqCst);
        locked(&self.events).take();
    }
}

/// A call received by a [`MockMapHost`].
#[derive(Clone, Debug, PartialEq)]
pub enum HostCall {
    Open,
    Close { minimized: bool },
    ControlsVisible(bool),
    Sharing(bool),
    RemainingTime(Option<Duration>),
}

#[derive(Debug, Default)]
pub struct MockMapHost {
    calls: Mutex<Vec<HostCall>>,
}

impl MockMapHost {
    pub fn new() -> Arc<Self> {
        Arc::default()
    }

    pub fn calls(&self) -> Vec<HostCall> {
        locked(&self.calls).clone()
    }

    /// Return and forget the calls received so far.
    pub fn take_calls(&self) -> Vec<HostCall> {
        std::mem::take(&mut *locked(&self.calls))
    }

    fn record(&self, call: HostCall) {
        locked(&self.calls).push(call);
    }
}

impl MapHost for MockMapHost {
    fn open_location_sharing(&self) {
        self.record(HostCall::Open);
    }

    fn close_location_sharing(&self, minimized: bool) {
        self.record(HostCall::Close { minimized });
    }

    fn set_controls_visible(&self, visible: bool) {
        self.record(HostCall::ControlsVisible(visible));
    }

    fn set_sharing(&self, sharing: bool) {
        self.record(HostCall::Sharing(sharing));
    }

    fn set_remaining_time(&self, remaining: Option<Duration>) {
        self.record(HostCall::RemainingTime(remaining));
    }
}

/// A call received by a [`MockMapSurface`].
#[derive(Clone, Debug, PartialEq)]
pub enum SurfaceCall {
    Markers(Vec<Marker>),
    MarkerIcon(ContactId),
    OwnPosition(GeoPoint),
    OwnIcon,
    Camera(CameraCommand),
}

#[derive(Debug, Default)]
pub struct MockMapSurface {
    calls: Mutex<Vec<SurfaceCall>>,
}

impl MockMapSurface {
    pub fn new() -> Arc<Self> {
        Arc::default()
    }

    pub fn calls(&self) -> Vec<SurfaceCall> {
        locked(&self.calls).clone()
    }

    pub fn take_calls(&self) -> Vec<SurfaceCall> {
        std::mem::take(&mut *locked(&self.calls))
    }

    /// The markers of the last update.
    pub fn last_markers(&self) -> Option<Vec<Marker>> {
        locked(&self.calls).iter().rev().find_map(|call| match call {
            SurfaceCall::Markers(markers) => Some(markers.clone()),
            _ => None,
        })
    }

    fn record(&self, call: SurfaceCall) {
        locked(&self.calls).push(call);
    }
}

impl MapSurface for MockMapSurface {
    fn set_markers(&self, markers: Vec<Marker>) {
        self.record(SurfaceCall::Markers(markers));
    }

    fn set_marker_icon(&self, contact_id: &ContactId, _avatar: Avatar) {
        self.record(SurfaceCall::MarkerIcon(contact_id.clone()));
    }

    fn set_own_position(&self, position: GeoPoint) {
        self.record(SurfaceCall::OwnPosition(position));
    }

    fn set_own_icon(&self, _avatar: Avatar) {
        self.record(SurfaceCall::OwnIcon);
    }

    fn apply_camera(&self, command: CameraCommand) {
        self.record(SurfaceCall::Camera(command));
    }
}

/// Every collaborator of a [`LocationSharingView`], mocked.
#[derive(Debug)]
pub struct ViewFixture {
    pub account: Arc<MockAccount>,
    pub accounts: Arc<MockAccountProvider>,
    pub avatars: Arc<MockAvatarProvider>,
    pub permissions: Arc<MockPermissionGate>,
    pub binder: Arc<MockSessionBinder>,
    pub host: Arc<MockMapHost>,
    pub surface: Arc<MockMapSurface>,
    pub sender: Arc<MockMessageSender>,
}

impl ViewFixture {
    /// A fixture for the account `account_id` of the local user `own`.
    pub fn new(account_id: &str, own: Contact, permissions: Arc<MockPermissionGate>) -> Self {
        let account = MockAccount::new(own);
        let accounts = MockAccountProvider::new();
        accounts.add_account(account_id, account.clone());

        Self {
            account,
            accounts,
            avatars: MockAvatarProvider::new(),
            permissions,
            binder: MockSessionBinder::new(),
            host: MockMapHost::new(),
            surface: MockMapSurface::new(),
            sender: MockMessageSender::new(),
        }
    }

    pub fn collaborators(&self) -> ViewCollaborators {
        ViewCollaborators {
            accounts: self.accounts.clone(),
            avatars: self.avatars.clone(),
            permissions: self.permissions.clone(),
            binder: self.binder.clone(),
            host: self.host.clone(),
            surface: self.surface.clone(),
        }
    }

    pub fn view(&self, args: NavigationArgs, settings: LocationSharingSettings) -> LocationSharingView {
        LocationSharingView::new(args, self.collaborators(), settings)
    }

    /// A background session sending through [`Self::sender`].
    pub async fn service(&self, settings: LocationSharingSettings) -> LocationSharingService {
        LocationSharingService::builder(self.sender.clone(), self.permissions.clone())
            .settings(settings)
            .build()
            .await
    }
}

/// Wait until `condition` holds, panicking after `timeout`.
pub async fn eventually(timeout: Duration, condition: impl Fn() -> bool) {
    let deadline = tokio::time::Instant::now() + timeout;

    while !condition() {
        assert!(tokio::time::Instant::now() < deadline, "the condition never held");
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}
