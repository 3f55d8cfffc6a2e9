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

//! The `application/geo` messages peers exchange while sharing their
//! location.
//!
//! A position looks like
//!
//! ```json
//! { "type": "Position", "lat": 45.5, "long": -73.6, "alt": 12.0, "time": 1024, "bearing": 90.0 }
//! ```
//!
//! and the end of a share like `{ "type": "Stop", "time": 9223372036854775807 }`.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use tracing::{trace, warn};

use crate::{error::GeoMessageError, location::LocationSample};

/// MIME type of geolocation payloads in a text message.
pub const MIME_GEOLOCATION: &str = "application/geo";

const POSITION_TYPE: &str = "Position";
const STOP_TYPE: &str = "Stop";

/// A position fix of the sender.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PositionReport {
    pub latitude: f64,
    pub longitude: f64,
    pub altitude: f64,
    /// Sender-side time of the fix, in milliseconds.
    pub time: i64,
    /// Zero when unknown.
    pub bearing: f64,
    /// Zero when unknown.
    pub speed: f64,
}

impl PositionReport {
    pub fn new(latitude: f64, longitude: f64, time: i64) -> Self {
        Self { latitude, longitude, altitude: 0.0, time, bearing: 0.0, speed: 0.0 }
    }

    /// The sample this fix represents, received now.
    pub fn to_sample(&self) -> LocationSample {
        LocationSample::new(self.latitude, self.longitude, self.time)
    }
}

/// A geolocation message.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum GeoMessage {
    /// The sender is at this position.
    Position(PositionReport),
    /// The sender stopped sharing.
    Stop,
}

#[derive(Debug, Serialize, Deserialize)]
struct RawGeoMessage {
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    lat: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    long: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    alt: Option<f64>,
    time: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    bearing: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    speed: Option<f64>,
}

impl GeoMessage {
    pub fn to_json(&self) -> JsonValue {
        let raw = match self {
            GeoMessage::Position(report) => RawGeoMessage {
                kind: Some(POSITION_TYPE.to_owned()),
                lat: Some(report.latitude),
                long: Some(report.longitude),
                alt: Some(report.altitude),
                time: report.time,
                bearing: (report.bearing != 0.0).then_some(report.bearing),
                speed: (report.speed != 0.0).then_some(report.speed),
            },
            GeoMessage::Stop => RawGeoMessage {
                kind: Some(STOP_TYPE.to_owned()),
                lat: None,
                long: None,
                alt: None,
                time: i64::MAX,
                bearing: None,
                speed: None,
            },
        };

        // Only plain numbers and strings, serializing can't fail.
        serde_json::to_value(raw).unwrap_or(JsonValue::Null)
    }

    /// The message as the payload map of a text message.
    pub fn to_payload(&self) -> BTreeMap<String, String> {
        BTreeMap::from([(MIME_GEOLOCATION.to_owned(), self.to_json().to_string())])
    }

    /// Decode a geolocation payload.
    ///
    /// Returns `Ok(None)` for objects too small to be a message.
    pub fn from_json_str(payload: &str) -> Result<Option<Self>, GeoMessageError> {
        let value: JsonValue =
            serde_json::from_str(payload).map_err(GeoMessageError::InvalidJson)?;
        Self::from_json(value)
    }

    pub fn from_json(value: JsonValue) -> Result<Option<Self>, GeoMessageError> {
        let Some(object) = value.as_object() else {
            return Err(GeoMessageError::NotAnObject);
        };

        if object.len() < 2 {
            trace!("Ignoring a geolocation payload with {} fields", object.len());
            return Ok(None);
        }

        let raw: RawGeoMessage =
            serde_json::from_value(value).map_err(GeoMessageError::InvalidFields)?;

        match raw.kind.as_deref() {
            None => Self::position_from_raw(&raw).map(Some),
            Some(kind) if kind.eq_ignore_ascii_case(POSITION_TYPE) => {
                Self::position_from_raw(&raw).map(Some)
            }
            Some(kind) if kind.eq_ignore_ascii_case(STOP_TYPE) => Ok(Some(GeoMessage::Stop)),
            Some(kind) => Err(GeoMessageError::UnknownType(kind.to_owned())),
        }
    }

    fn position_from_raw(raw: &RawGeoMessage) -> Result<Self, GeoMessageError> {
        let (Some(latitude), Some(longitude)) = (raw.lat, raw.long) else {
            return Err(GeoMessageError::MissingCoordinates);
        };

        Ok(GeoMessage::Position(PositionReport {
            latitude,
            longitude,
            altitude: raw.alt.unwrap_or_default(),
            time: raw.time,
            bearing: raw.bearing.unwrap_or_default(),
            speed: raw.speed.unwrap_or_default(),
        }))
    }

    /// Extract and decode the geolocation part of a text message payload.
    ///
    /// Messages without a geolocation part and undecodable ones yield `None`,
    /// the latter are logged.
    pub fn from_payload(payload: &BTreeMap<String, String>) -> Option<Self> {
        let body = payload.get(MIME_GEOLOCATION)?;

        match Self::from_json_str(body) {
            Ok(message) => message,
            Err(error) => {
                warn!("Failed to decode a geolocation message: {error}");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use assert_matches2::assert_let;
    use locshare_test::test_json;
    use serde_json::json;
    use similar_asserts::assert_eq;

    use super::{GeoMessage, PositionReport, MIME_GEOLOCATION};
    use crate::error::GeoMessageError;

    #[test]
    fn test_encode_position() {
        let report = PositionReport { altitude: 12.0, bearing: 90.0, ..PositionReport::new(45.5, -73.6, 1024) };

        assert_eq!(
            GeoMessage::Position(report).to_json(),
            json!({
                "type": "Position",
                "lat": 45.5,
                "long": -73.6,
                "alt": 12.0,
                "time": 1024,
                "bearing": 90.0,
            })
        );
    }

    #[test]
    fn test_encode_stop() {
        let payload = GeoMessage::Stop.to_payload();

        assert_eq!(payload.len(), 1);
        let body: serde_json::Value = serde_json::from_str(&payload[MIME_GEOLOCATION]).unwrap();
        assert_eq!(body, *test_json::geo::STOP);
    }

    #[test]
    fn test_decode_position() {
        let message = GeoMessage::from_json(test_json::geo::POSITION.clone()).unwrap();

        assert_let!(Some(GeoMessage::Position(report)) = message);
        assert_eq!(report.latitude, 45.5017);
        assert_eq!(report.longitude, -73.5673);
        assert_eq!(report.time, 1_700_000_000_000);
        assert_eq!(report.speed, 1.5);
        assert_eq!(report.bearing, 0.0);
    }

    #[test]
    fn test_decode_position_without_type() {
        let message = GeoMessage::from_json(test_json::geo::POSITION_WITHOUT_TYPE.clone()).unwrap();
        assert_matches!(message, Some(GeoMessage::Position(_)));
    }

    #[test]
    fn test_decode_type_is_case_insensitive() {
        let message = GeoMessage::from_json(json!({ "type": "sTOP", "time": 3 })).unwrap();
        assert_eq!(message, Some(GeoMessage::Stop));
    }

    #[test]
    fn test_decode_ignores_tiny_objects() {
        let message = GeoMessage::from_json(test_json::geo::TOO_SHORT.clone()).unwrap();
        assert_eq!(message, None);
    }

    #[test]
    fn test_decode_errors() {
        assert_let!(
            Err(GeoMessageError::UnknownType(kind)) =
                GeoMessage::from_json(test_json::geo::UNKNOWN_TYPE.clone())
        );
        assert_eq!(kind, "Teleport");

        assert_matches!(
            GeoMessage::from_json(json!({ "type": "Position", "lat": 1.0, "alt": 2.0 })),
            Err(GeoMessageError::InvalidFields(_))
        );
        assert_matches!(
            GeoMessage::from_json(json!({ "type": "Position", "lat": 1.0, "time": 2 })),
            Err(GeoMessageError::MissingCoordinates)
        );
        assert_matches!(GeoMessage::from_json(json!([1, 2])), Err(GeoMessageError::NotAnObject));
        assert_matches!(GeoMessage::from_json_str("{"), Err(GeoMessageError::InvalidJson(_)));
    }

    #[test]
    fn test_from_payload_drops_undecodable_messages() {
        let mut payload = GeoMessage::Stop.to_payload();
        assert_eq!(GeoMessage::from_payload(&payload), Some(GeoMessage::Stop));

        payload.insert(MIME_GEOLOCATION.to_owned(), "not json".to_owned());
        assert_eq!(GeoMessage::from_payload(&payload), None);

        payload.clear();
        payload.insert("text/plain".to_owned(), "hello".to_owned());
        assert_eq!(GeoMessage::from_payload(&payload), None);
    }
}
