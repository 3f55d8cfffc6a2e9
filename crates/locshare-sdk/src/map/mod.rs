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

//! Keeps the map markers and camera in sync with the roster.

use tracing::trace;

mod bounding_box;

pub use self::bounding_box::{BoundingBox, MAX_LATITUDE, MIN_LATITUDE};
use crate::location::{Contact, GeoPoint, LocationViewModel};

/// The marker of a peer.
#[derive(Clone, Debug, PartialEq)]
pub struct Marker {
    pub contact: Contact,
    pub position: GeoPoint,
}

/// A camera move.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum CameraCommand {
    /// Animate to a single point.
    CenterOn(GeoPoint),
    /// Zoom so the whole box is visible.
    FitBounds(BoundingBox),
    /// Keep the local user's position centered.
    FollowOwnLocation,
}

/// What to draw after a roster update.
#[derive(Clone, Debug, PartialEq)]
pub struct MapUpdate {
    /// Replaces every peer marker.
    pub markers: Vec<Marker>,
    pub camera: Option<CameraCommand>,
}

/// Turns rosters into markers and camera moves.
///
/// While tracking all participants, the camera follows them; a gesture of
/// the user on the map stops that until [`MapReconciler::recenter`].
#[derive(Debug)]
pub struct MapReconciler {
    padding: f64,
    track_all: bool,
    last_bounding_box: Option<BoundingBox>,
}

impl MapReconciler {
    /// `padding` scales the box of all participants before fitting it.
    pub fn new(padding: f64) -> Self {
        Self { padding, track_all: true, last_bounding_box: None }
    }

    pub fn reconcile(
        &mut self,
        roster: &[LocationViewModel],
        own_position: Option<GeoPoint>,
    ) -> MapUpdate {
        let markers: Vec<Marker> = roster
            .iter()
            .filter(|participant| !participant.is_local())
            .map(|participant| Marker {
                contact: participant.contact.clone(),
                position: participant.point(),
            })
            .collect();

        let own_position = own_position.or_else(|| {
            roster.iter().find(|participant| participant.is_local()).map(LocationViewModel::point)
        });

        let points: Vec<GeoPoint> =
            own_position.into_iter().chain(markers.iter().map(|marker| marker.position)).collect();

        let camera = if self.track_all { self.follow(&points) } else { None };

        MapUpdate { markers, camera }
    }

    fn follow(&mut self, points: &[GeoPoint]) -> Option<CameraCommand> {
        match points {
            [] => None,
            [point] => {
                self.last_bounding_box = None;
                Some(CameraCommand::CenterOn(*point))
            }
            points => {
                let bounds = BoundingBox::from_points(points.iter().copied())?
                    .increase_by_scale(self.padding);
                trace!(?bounds, "Fitting every participant");

                self.last_bounding_box = Some(bounds);
                Some(CameraCommand::FitBounds(bounds))
            }
        }
    }

    /// The user moved the map: stop following the participants.
    pub fn on_user_gesture(&mut self) {
        self.track_all = false;
    }

    /// Follow the participants again.
    pub fn recenter(&mut self) -> CameraCommand {
        self.track_all = true;

        match self.last_bounding_box {
            Some(bounds) => CameraCommand::FitBounds(bounds),
            None => CameraCommand::FollowOwnLocation,
        }
    }

    pub fn is_tracking_all(&self) -> bool {
        self.track_all
    }

    pub fn last_bounding_box(&self) -> Option<BoundingBox> {
        self.last_bounding_box
    }
}
