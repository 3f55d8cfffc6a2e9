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

use std::time::Duration;

use crate::{config::LocationSharingSettings, identifiers::ConversationPath};

const MINUTE: u64 = 60;
const HOUR: u64 = 60 * MINUTE;

/// What the ongoing-sharing notification shows.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SharingSummary {
    /// Number of conversations the local user shares with.
    pub share_count: usize,
    /// The conversation, when there is exactly one.
    pub single_conversation: Option<ConversationPath>,
    /// Minutes until the last share expires, rounded up.
    pub minutes_remaining: u64,
}

/// The durations a share can be started for.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SharingDuration {
    /// The duration used when none is picked, five minutes by default.
    #[default]
    Standard,
    /// The shortest preset, ten minutes by default.
    Short,
    /// The longest preset, one hour by default.
    Long,
    Custom(Duration),
}

impl SharingDuration {
    pub fn duration(self, settings: &LocationSharingSettings) -> Duration {
        match self {
            SharingDuration::Standard => settings.default_share_duration,
            SharingDuration::Short => settings.share_presets[0],
            SharingDuration::Long => settings.share_presets[1],
            SharingDuration::Custom(duration) => duration,
        }
    }

    /// The label of the duration, like `"10 min"`.
    pub fn label(self, settings: &LocationSharingSettings) -> String {
        format_remaining(self.duration(settings))
    }
}

/// Format a duration with its largest unit, rounding half up: `"1 h"`,
/// `"10 min"` or `"42 s"`.
pub fn format_remaining(duration: Duration) -> String {
    let millis = duration.as_millis();
    let rounded = |unit: u64| (millis + u128::from(unit) * 500) / (u128::from(unit) * 1000);

    let seconds = duration.as_secs();
    if seconds >= HOUR {
        format!("{} h", rounded(HOUR))
    } else if seconds >= MINUTE {
        format!("{} min", rounded(MINUTE))
    } else {
        format!("{} s", rounded(1))
    }
}

pub(super) fn minutes_ceil(duration: Duration) -> u64 {
    duration.as_millis().div_ceil(u128::from(MINUTE) * 1000) as u64
}
