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

use std::{collections::BTreeMap, time::Duration};

use futures_util::pin_mut;
use locshare_sdk::{
    geo_message::{GeoMessage, PositionReport, MIME_GEOLOCATION},
    location::PeerLocationUpdate,
    test_utils::eventually,
    ContactId, LocationAggregator, LocationSharingSettings,
};
use locshare_test::{assert_next_with_timeout, async_test, test_json, BOB, CAROL};

use crate::{args, fixture};

fn payload(json: &serde_json::Value) -> BTreeMap<String, String> {
    [(MIME_GEOLOCATION.to_owned(), json.to_string())].into()
}

#[async_test]
async fn test_two_peers_then_one_drops() {
    let fixture = fixture();
    let registry = fixture.account.registry();

    registry.on_text_message(BOB.into(), &payload(&test_json::geo::POSITION)).unwrap();
    registry.on_text_message(CAROL.into(), &payload(&test_json::geo::POSITION_WITHOUT_TYPE)).unwrap();

    let aggregator =
        LocationAggregator::new(args(false).conversation_path(), fixture.account.clone());
    let roster = aggregator.roster_stream();
    pin_mut!(roster);

    let participants = assert_next_with_timeout!(roster);
    assert_eq!(participants.len(), 2);
    assert_eq!(participants[1].contact.display_name, "Bob");
    assert_eq!(participants[1].sample.latitude, 45.5017);
    assert_eq!(participants[0].sample.longitude, 2.3522);

    registry.on_text_message(BOB.into(), &payload(&test_json::geo::STOP)).unwrap();

    let participants = assert_next_with_timeout!(roster);
    assert_eq!(participants.len(), 1);
    assert_eq!(participants[0].contact.id.as_str(), CAROL);
}

#[async_test]
async fn test_undecodable_messages_are_dropped() {
    let fixture = fixture();
    let registry = fixture.account.registry();

    assert_eq!(registry.on_text_message(BOB.into(), &payload(&test_json::geo::TOO_SHORT)), None);
    assert_eq!(registry.on_text_message(BOB.into(), &payload(&test_json::geo::UNKNOWN_TYPE)), None);
    assert!(registry.feeds().is_empty());
}

#[async_test]
async fn test_markers_follow_the_peers() {
    let fixture = fixture();
    let registry = fixture.account.registry();
    registry.on_location_update(PeerLocationUpdate {
        contact_id: ContactId::from(BOB),
        message: GeoMessage::Position(PositionReport::new(1.0, 1.0, 1)),
    });
    registry.on_location_update(PeerLocationUpdate {
        contact_id: ContactId::from(CAROL),
        message: GeoMessage::Position(PositionReport::new(2.0, 2.0, 1)),
    });

    let view = fixture.view(args(false), LocationSharingSettings::new());
    view.start().await.unwrap();

    let wait = Duration::from_millis(500);
    eventually(wait, || fixture.surface.last_markers().is_some_and(|markers| markers.len() == 2))
        .await;

    registry.on_location_update(PeerLocationUpdate {
        contact_id: ContactId::from(BOB),
        message: GeoMessage::Stop,
    });
    eventually(wait, || {
        fixture.surface.last_markers().is_some_and(|markers| {
            markers.len() == 1 && markers[0].contact.id.as_str() == CAROL
        })
    })
    .await;
}
