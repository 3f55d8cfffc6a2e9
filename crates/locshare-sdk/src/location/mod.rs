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

//! Positions, contacts and the per-peer location feeds.

use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use crate::identifiers::ContactId;

mod feed;
mod registry;

pub use self::{
    feed::{PeerFeeds, PeerLocationFeed},
    registry::{PeerLocationRegistry, PeerLocationUpdate},
};

/// A point on the map, in degrees.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
}

impl GeoPoint {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self { latitude, longitude }
    }
}

/// One position sample of a participant.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LocationSample {
    pub latitude: f64,
    pub longitude: f64,
    /// Sender-side time of the sample in milliseconds, only meaningful to
    /// order the samples of one sender.
    pub timestamp: i64,
    /// When the sample reached this device.
    pub received_at: Instant,
}

impl LocationSample {
    /// A sample received now.
    pub fn new(latitude: f64, longitude: f64, timestamp: i64) -> Self {
        Self { latitude, longitude, timestamp, received_at: Instant::now() }
    }

    pub fn point(&self) -> GeoPoint {
        GeoPoint::new(self.latitude, self.longitude)
    }
}

/// A contact as known by the account.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Contact {
    pub id: ContactId,
    pub display_name: String,
    /// Whether this is the local user.
    pub is_self: bool,
}

impl Contact {
    pub fn new(id: impl Into<ContactId>, display_name: impl Into<String>) -> Self {
        Self { id: id.into(), display_name: display_name.into(), is_self: false }
    }

    /// The contact of the local user.
    pub fn own(id: impl Into<ContactId>, display_name: impl Into<String>) -> Self {
        Self { is_self: true, ..Self::new(id, display_name) }
    }

    /// A contact the account has no details about.
    pub fn unknown(id: ContactId) -> Self {
        let display_name = id.to_string();
        Self { id, display_name, is_self: false }
    }
}

/// One participant of the roster of a conversation.
#[derive(Clone, Debug, PartialEq)]
pub struct LocationViewModel {
    pub contact: Contact,
    pub sample: LocationSample,
}

impl LocationViewModel {
    pub fn point(&self) -> GeoPoint {
        self.sample.point()
    }

    /// Whether this entry is the local device.
    pub fn is_local(&self) -> bool {
        self.contact.is_self
    }
}
