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

//! Whether the map is hidden, minimized or shown in full.

use std::sync::{Arc, Mutex};

use eyeball::{SharedObservable, Subscriber};
use tracing::debug;

use crate::utils::locked;

/// The presentation of the map.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum MapMode {
    #[default]
    Hidden,
    Minimized,
    Full,
}

impl MapMode {
    /// The mode for the given signals.
    ///
    /// The controls win; otherwise the map stays minimized while anybody is
    /// sharing.
    pub fn derive(show_controls: bool, local_sharing: bool, peer_sharing: bool) -> Self {
        if show_controls {
            MapMode::Full
        } else if local_sharing || peer_sharing {
            MapMode::Minimized
        } else {
            MapMode::Hidden
        }
    }
}

#[derive(Debug, Default)]
struct Inputs {
    show_controls: Option<bool>,
    local_sharing: Option<bool>,
    peer_sharing: Option<bool>,
}

impl Inputs {
    fn mode(&self) -> Option<MapMode> {
        Some(MapMode::derive(self.show_controls?, self.local_sharing?, self.peer_sharing?))
    }
}

/// The map visibility state machine.
///
/// The mode is derived once all three inputs are known, and only changes
/// are published.
#[derive(Clone, Debug)]
pub struct MapVisibility {
    inputs: Arc<Mutex<Inputs>>,
    mode: SharedObservable<MapMode>,
}

impl Default for MapVisibility {
    fn default() -> Self {
        Self::new()
    }
}

impl MapVisibility {
    pub fn new() -> Self {
        Self { inputs: Arc::default(), mode: SharedObservable::new(MapMode::Hidden) }
    }

    pub fn set_show_controls(&self, show: bool) {
        self.update(|inputs| inputs.show_controls = Some(show));
    }

    pub fn set_local_sharing(&self, sharing: bool) {
        self.update(|inputs| inputs.local_sharing = Some(sharing));
    }

    pub fn set_peer_sharing(&self, sharing: bool) {
        self.update(|inputs| inputs.peer_sharing = Some(sharing));
    }

    /// Whether the controls are shown, `None` until known.
    pub fn show_controls(&self) -> Option<bool> {
        locked(&self.inputs).show_controls
    }

    pub fn local_sharing(&self) -> Option<bool> {
        locked(&self.inputs).local_sharing
    }

    pub fn mode(&self) -> MapMode {
        self.mode.get()
    }

    /// Subscribe to the changes of the mode.
    pub fn subscribe(&self) -> Subscriber<MapMode> {
        self.mode.subscribe()
    }

    fn update(&self, change: impl FnOnce(&mut Inputs)) {
        let mut inputs = locked(&self.inputs);
        change(&mut inputs);

        if let Some(mode) = inputs.mode() {
            if self.mode.set_if_not_eq(mode).is_some() {
                debug!(?mode, "Map mode changed");
            }
        }
    }
}
