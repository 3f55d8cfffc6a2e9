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

#![doc = include_str!("../README.md")]
#![warn(missing_debug_implementations)]

pub mod aggregator;
pub mod config;
pub mod connection;
mod error;
pub mod executor;
pub mod geo_message;
pub mod identifiers;
pub mod location;
pub mod map;
pub mod sharing;
#[cfg(any(test, feature = "testing"))]
pub mod test_utils;
pub mod traits;
pub mod utils;
pub mod view;
pub mod visibility;

pub use self::{
    aggregator::LocationAggregator,
    config::LocationSharingSettings,
    connection::{ConnectionState, SessionConnection},
    error::{Error, FeedError, GeoMessageError, Result, StoreError},
    identifiers::{ContactId, ConversationPath, NavigationArgs},
    location::{Contact, GeoPoint, LocationSample, LocationViewModel, PeerLocationRegistry},
    map::MapReconciler,
    sharing::{LocationSharingService, StartSharingOutcome},
    view::LocationSharingView,
    visibility::{MapMode, MapVisibility},
};

/// Super trait that is used for the collaborator traits of this crate.
pub trait AsyncTraitDeps: std::fmt::Debug + Send + Sync {}
impl<T: std::fmt::Debug + Send + Sync> AsyncTraitDeps for T {}

#[cfg(test)]
#[ctor::ctor]
fn init_logging() {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer().with_test_writer())
        .init();
}
