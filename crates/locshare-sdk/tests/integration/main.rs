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

use locshare_sdk::{
    identifiers::NavigationArgs,
    location::Contact,
    test_utils::{MockPermissionGate, ViewFixture},
};
use locshare_test::{ACCOUNT_ID, ALICE, BOB, CONVERSATION_ID};

mod roster;
mod sharing;
mod teardown;

locshare_test::init_tracing_for_tests!();

/// A fixture of the local user Alice, whose conversation is with Bob.
fn fixture() -> ViewFixture {
    let fixture =
        ViewFixture::new(ACCOUNT_ID, Contact::own(ALICE, "Alice"), MockPermissionGate::granted());
    fixture.account.add_contact(Contact::new(BOB, "Bob"));
    fixture.account.set_counterpart(CONVERSATION_ID, BOB.into());
    fixture
}

fn args(show_controls: bool) -> NavigationArgs {
    NavigationArgs::new(ACCOUNT_ID, CONVERSATION_ID, show_controls)
}
