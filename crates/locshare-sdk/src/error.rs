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

//! Error conditions.

use std::io::Error as IoError;

use serde_json::Error as JsonError;
use thiserror::Error;

use crate::identifiers::ContactId;

/// Result type of the location sharing SDK.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Errors returned by fallible calls into the host application.
#[derive(Error, Debug)]
pub enum Error {
    /// The account provider doesn't know the requested account.
    #[error("unknown account `{0}`")]
    AccountNotFound(String),

    /// The background session couldn't be bound.
    #[error("couldn't bind the location sharing session: {0}")]
    Bind(String),

    /// The avatar of a contact couldn't be rendered.
    #[error("couldn't render the avatar of {contact}: {reason}")]
    Avatar { contact: ContactId, reason: String },

    /// The last known position couldn't be loaded or saved.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// An I/O error happened.
    #[error(transparent)]
    Io(#[from] IoError),
}

/// Errors of a [`PositionStore`](crate::sharing::PositionStore).
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("couldn't access the position store: {0}")]
    Io(#[from] IoError),

    #[error("the stored position is corrupted: {0}")]
    Json(#[from] JsonError),
}

/// A per-peer location feed failed.
///
/// The failure is isolated by the aggregator: the peer is left out of the
/// roster until it leaves and joins the sharing membership again.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("location feed failed: {reason}")]
pub struct FeedError {
    reason: String,
}

impl FeedError {
    pub fn new(reason: impl Into<String>) -> Self {
        Self { reason: reason.into() }
    }

    pub fn reason(&self) -> &str {
        &self.reason
    }
}

/// Errors decoding an `application/geo` payload.
#[derive(Error, Debug)]
pub enum GeoMessageError {
    #[error("the payload isn't valid JSON: {0}")]
    InvalidJson(#[source] JsonError),

    #[error("the payload isn't a JSON object")]
    NotAnObject,

    #[error("the payload has invalid fields: {0}")]
    InvalidFields(#[source] JsonError),

    #[error("unknown geolocation message type `{0}`")]
    UnknownType(String),

    #[error("position message without coordinates")]
    MissingCoordinates,
}
