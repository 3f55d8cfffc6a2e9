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

//! The interfaces the host application implements.

use std::{collections::BTreeMap, sync::Arc, time::Duration};

use async_trait::async_trait;
use futures_util::stream::BoxStream;

use crate::{
    error::{Error, Result},
    identifiers::{ContactId, ConversationPath},
    location::{Contact, GeoPoint, PeerFeeds},
    map::{CameraCommand, Marker},
    AsyncTraitDeps,
};

/// Looks accounts up by id.
#[async_trait]
pub trait AccountProvider: AsyncTraitDeps {
    async fn account(&self, account_id: &str) -> Result<Arc<dyn Account>>;
}

/// The part of an account the location sharing pipeline needs.
pub trait Account: AsyncTraitDeps {
    /// The local user.
    fn own_contact(&self) -> Contact;

    /// Resolve a contact of the account.
    fn contact(&self, contact_id: &ContactId) -> Option<Contact>;

    /// The peer of a one-to-one conversation, `None` for group conversations.
    fn conversation_counterpart(&self, conversation_id: &str) -> Option<ContactId>;

    /// The feeds of the peers sharing their location with the account: the
    /// current set first, then every change.
    ///
    /// A [`PeerLocationRegistry`](crate::PeerLocationRegistry) implements the
    /// bookkeeping behind this stream.
    fn location_updates(&self) -> BoxStream<'static, PeerFeeds>;
}

/// A rendered avatar.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Avatar {
    /// Side of the square image, in pixels.
    pub size: u32,
    pub data: Arc<[u8]>,
}

/// Renders contact avatars for the map markers.
#[async_trait]
pub trait AvatarProvider: AsyncTraitDeps {
    async fn avatar(&self, contact: &Contact, size: u32) -> Result<Avatar, Error>;
}

/// The location permission of the application.
#[async_trait]
pub trait PermissionGate: AsyncTraitDeps {
    fn has_location_permission(&self) -> bool;

    /// Ask the user for the permission; resolves to whether it was granted.
    async fn request_location_permission(&self) -> bool;
}

/// Sends text messages through the account of a conversation.
#[async_trait]
pub trait MessageSender: AsyncTraitDeps {
    /// Send a message made of one body per MIME type.
    async fn send_text_message(
        &self,
        path: &ConversationPath,
        payload: BTreeMap<String, String>,
    ) -> Result<()>;
}

/// The screen hosting the map.
pub trait MapHost: AsyncTraitDeps {
    /// Show the map in full, with the sharing controls.
    fn open_location_sharing(&self);

    /// Hide the map, or keep a minimized map when `minimized`.
    fn close_location_sharing(&self, minimized: bool);

    fn set_controls_visible(&self, visible: bool);

    /// Whether the local user is sharing in this conversation.
    fn set_sharing(&self, sharing: bool);

    /// Time left of the local share, `None` when not sharing.
    fn set_remaining_time(&self, remaining: Option<Duration>);
}

/// The map widget.
pub trait MapSurface: AsyncTraitDeps {
    /// Replace every peer marker.
    fn set_markers(&self, markers: Vec<Marker>);

    fn set_marker_icon(&self, contact_id: &ContactId, avatar: Avatar);

    /// Move the marker of the local user.
    fn set_own_position(&self, position: GeoPoint);

    fn set_own_icon(&self, avatar: Avatar);

    fn apply_camera(&self, command: CameraCommand);
}
