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

use locshare_sdk::{
    connection::ConnectionState,
    geo_message::{GeoMessage, PositionReport},
    location::PeerLocationUpdate,
    test_utils::eventually,
    ContactId, LocationSharingSettings,
};
use locshare_test::BOB;

use crate::{args, fixture};

fn bob_at(latitude: f64, time: i64) -> PeerLocationUpdate {
    PeerLocationUpdate {
        contact_id: ContactId::from(BOB),
        message: GeoMessage::Position(PositionReport::new(latitude, 2.0, time)),
    }
}

#[locshare_test::async_test]
async fn test_destroying_a_bound_view_disposes_everything() {
    let fixture = fixture();
    let registry = fixture.account.registry();
    registry.on_location_update(bob_at(1.0, 1));
    let feed = registry.feeds()[&ContactId::from(BOB)].clone();

    let view = fixture.view(args(true), LocationSharingSettings::new());
    view.start().await.unwrap();

    let service = fixture.service(LocationSharingSettings::new()).await;
    fixture.binder.connect(service.clone());

    let wait = Duration::from_millis(500);
    eventually(wait, || view.connection().state() == ConnectionState::Bound).await;
    eventually(wait, || fixture.surface.last_markers().is_some()).await;
    assert_eq!(feed.subscriber_count(), 1);

    drop(view);
    assert_eq!(fixture.binder.unbind_count(), 1);
    eventually(wait, || feed.subscriber_count() == 0).await;

    fixture.host.take_calls();
    fixture.surface.take_calls();

    // Nothing reaches the host anymore.
    registry.on_location_update(bob_at(2.0, 2));
    service.start_sharing(args(true).conversation_path(), Duration::from_secs(600)).await;
    service.update_my_location(PositionReport::new(45.0, -73.0, 1));
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert!(fixture.host.calls().is_empty());
    assert!(fixture.surface.calls().is_empty());
}
