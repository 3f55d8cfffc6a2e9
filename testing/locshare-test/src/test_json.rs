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

//! Payloads of the `application/geo` messages peers exchange.

pub mod geo {
    use once_cell::sync::Lazy;
    use serde_json::{json, Value as JsonValue};

    pub static POSITION: Lazy<JsonValue> = Lazy::new(|| {
        json!({
            "type": "Position",
            "lat": 45.5017,
            "long": -73.5673,
            "alt": 30.0,
            "time": 1_700_000_000_000_i64,
            "speed": 1.5,
        })
    });

    /// Sent by old clients, which don't tag positions.
    pub static POSITION_WITHOUT_TYPE: Lazy<JsonValue> = Lazy::new(|| {
        json!({
            "lat": 48.8566,
            "long": 2.3522,
            "time": 1_700_000_001_000_i64,
        })
    });

    pub static STOP: Lazy<JsonValue> = Lazy::new(|| {
        json!({
            "type": "Stop",
            "time": i64::MAX,
        })
    });

    pub static TOO_SHORT: Lazy<JsonValue> = Lazy::new(|| json!({ "time": 12 }));

    pub static UNKNOWN_TYPE: Lazy<JsonValue> = Lazy::new(|| {
        json!({
            "type": "Teleport",
            "lat": 0.0,
            "long": 0.0,
            "time": 1,
        })
    });
}
