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
    sharing::{SharingDuration, StartSharingOutcome},
    test_utils::{eventually, HostCall},
    LocationSharingSettings, MapMode,
};

use crate::{args, fixture};

#[locshare_test::async_test(start_paused = true)]
async fn test_share_for_ten_minutes() {
    let fixture = fixture();
    let view = fixture.view(args(true), LocationSharingSettings::new());
    view.start().await.unwrap();

    let service = fixture.service(LocationSharingSettings::new()).await;
    fixture.binder.connect(service.clone());

    eventually(Duration::from_secs(1), || view.mode() == MapMode::Full).await;
    assert!(fixture.host.take_calls().contains(&HostCall::Open));

    assert_eq!(
        view.start_sharing(SharingDuration::Short).await,
        Some(StartSharingOutcome::Started)
    );
    assert!(service.is_sharing(view.path()));
    assert!(service.sharing_set().contains(view.path()));

    tokio::time::sleep(Duration::from_secs(601)).await;

    assert!(!service.is_sharing(view.path()));
    assert_eq!(view.mode(), MapMode::Hidden);

    let calls = fixture.host.take_calls();

    let countdown: Vec<u64> = calls
        .iter()
        .filter_map(|call| match call {
            HostCall::RemainingTime(Some(remaining)) => Some(remaining.as_secs_f64().round() as u64),
            _ => None,
        })
        .collect();
    assert_eq!(countdown, (0..=600).rev().collect::<Vec<_>>());
    // The countdown is cleared once over.
    let cleared = calls.iter().rposition(|call| *call == HostCall::RemainingTime(None));
    let last_tick = calls.iter().rposition(|call| matches!(call, HostCall::RemainingTime(Some(_))));
    assert!(cleared > last_tick);

    let modes: Vec<&HostCall> = calls
        .iter()
        .filter(|call| matches!(call, HostCall::Open | HostCall::Close { .. }))
        .collect();
    similar_asserts::assert_eq!(
        modes,
        [&HostCall::Close { minimized: true }, &HostCall::Close { minimized: false }]
    );

    let sharing: Vec<&HostCall> =
        calls.iter().filter(|call| matches!(call, HostCall::Sharing(_))).collect();
    assert_eq!(sharing, [&HostCall::Sharing(true), &HostCall::Sharing(false)]);
    assert!(calls.contains(&HostCall::ControlsVisible(false)));
}

#[locshare_test::async_test]
async fn test_request_made_before_binding_is_served() {
    let fixture = fixture();
    let view = fixture.view(args(true), LocationSharingSettings::new());
    view.start().await.unwrap();
    // The permission is there, the view binds right away.
    view.connection().unbind();

    assert_eq!(view.start_sharing(SharingDuration::Long).await, None);
    assert_eq!(fixture.binder.bind_count(), 2);

    let service = fixture.service(LocationSharingSettings::new()).await;
    fixture.binder.connect(service.clone());

    eventually(Duration::from_millis(500), || service.is_sharing(view.path())).await;
    let remaining = service.remaining(view.path()).unwrap();
    assert!(remaining > Duration::from_secs(59 * 60));
    eventually(Duration::from_millis(500), || view.mode() == MapMode::Minimized).await;
}
