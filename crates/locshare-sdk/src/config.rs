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

//! Tunables of the location sharing pipeline.

use std::time::Duration;

const DEFAULT_SHARE_DURATION: Duration = Duration::from_secs(5 * 60);
const SHORT_SHARE_PRESET: Duration = Duration::from_secs(10 * 60);
const LONG_SHARE_PRESET: Duration = Duration::from_secs(60 * 60);
const COUNTDOWN_TICK: Duration = Duration::from_secs(1);
const BROADCAST_INTERVAL: Duration = Duration::from_secs(10);
/// A peer that stays silent for this long is considered to have stopped
/// sharing.
pub const PEER_LOCATION_EXPIRATION: Duration = Duration::from_secs(2 * 60);
const PEER_MAINTENANCE_INTERVAL: Duration = Duration::from_secs(60);
const BOUNDING_BOX_PADDING: f64 = 1.5;
const AVATAR_SIZE: u32 = 48;
/// The shortest period of the timers of the pipeline; shorter ones are
/// raised to it.
pub const MIN_TIMER_PERIOD: Duration = Duration::from_millis(10);

/// Settings of the location sharing pipeline.
#[derive(Clone, Debug, PartialEq)]
pub struct LocationSharingSettings {
    pub(crate) default_share_duration: Duration,
    pub(crate) share_presets: [Duration; 2],
    pub(crate) countdown_tick: Duration,
    pub(crate) broadcast_interval: Duration,
    pub(crate) peer_expiration: Duration,
    pub(crate) peer_maintenance_interval: Duration,
    pub(crate) bounding_box_padding: f64,
    pub(crate) avatar_size: u32,
    pub(crate) hide_controls_on_share: bool,
}

impl Default for LocationSharingSettings {
    fn default() -> Self {
        Self::new()
    }
}

impl LocationSharingSettings {
    /// Create the default settings.
    #[must_use]
    pub fn new() -> Self {
        Self {
            default_share_duration: DEFAULT_SHARE_DURATION,
            share_presets: [SHORT_SHARE_PRESET, LONG_SHARE_PRESET],
            countdown_tick: COUNTDOWN_TICK,
            broadcast_interval: BROADCAST_INTERVAL,
            peer_expiration: PEER_LOCATION_EXPIRATION,
            peer_maintenance_interval: PEER_MAINTENANCE_INTERVAL,
            bounding_box_padding: BOUNDING_BOX_PADDING,
            avatar_size: AVATAR_SIZE,
            hide_controls_on_share: true,
        }
    }

    /// Set the duration of a share started without an explicit duration.
    #[must_use]
    pub fn default_share_duration(mut self, duration: Duration) -> Self {
        self.default_share_duration = duration;
        self
    }

    /// Set the two durations offered to the user, shortest first.
    #[must_use]
    pub fn share_presets(mut self, short: Duration, long: Duration) -> Self {
        self.share_presets = [short, long];
        self
    }

    /// Set the interval between two values of an expiration countdown, at
    /// least [`MIN_TIMER_PERIOD`].
    #[must_use]
    pub fn countdown_tick(mut self, tick: Duration) -> Self {
        self.countdown_tick = tick.max(MIN_TIMER_PERIOD);
        self
    }

    /// Set the minimum interval between two outbound position messages.
    #[must_use]
    pub fn broadcast_interval(mut self, interval: Duration) -> Self {
        self.broadcast_interval = interval;
        self
    }

    /// Set how long a silent peer keeps its place on the map.
    #[must_use]
    pub fn peer_expiration(mut self, expiration: Duration) -> Self {
        self.peer_expiration = expiration;
        self
    }

    /// Set how often silent peers are looked for, at least
    /// [`MIN_TIMER_PERIOD`].
    #[must_use]
    pub fn peer_maintenance_interval(mut self, interval: Duration) -> Self {
        self.peer_maintenance_interval = interval.max(MIN_TIMER_PERIOD);
        self
    }

    /// Set the factor the bounding box of all participants is scaled by
    /// before the camera fits it.
    #[must_use]
    pub fn bounding_box_padding(mut self, padding: f64) -> Self {
        self.bounding_box_padding = padding;
        self
    }

    /// Set the size, in pixels, avatars are rendered at on the map.
    #[must_use]
    pub fn avatar_size(mut self, size: u32) -> Self {
        self.avatar_size = size;
        self
    }

    /// Whether the sharing controls are folded once the local user starts
    /// sharing.
    #[must_use]
    pub fn hide_controls_on_share(mut self, hide: bool) -> Self {
        self.hide_controls_on_share = hide;
        self
    }
}
