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

use std::{
    collections::BTreeMap,
    fmt,
    sync::{Arc, Mutex},
    time::Duration,
};

use async_stream::stream;
use eyeball::SharedObservable;
use futures_core::Stream;
use tokio::time::{interval, Instant, MissedTickBehavior};
use tracing::{debug, info, trace};

use super::{feed::PeerFeeds, LocationSample, PeerLocationFeed};
use crate::{
    config::{LocationSharingSettings, MIN_TIMER_PERIOD},
    executor::{spawn, AbortOnDrop, JoinHandleExt},
    geo_message::GeoMessage,
    identifiers::ContactId,
    utils::locked,
};

/// A geolocation message received from a peer.
#[derive(Clone, Debug, PartialEq)]
pub struct PeerLocationUpdate {
    pub contact_id: ContactId,
    pub message: GeoMessage,
}

struct PeerEntry {
    samples: SharedObservable<LocationSample>,
    feed: PeerLocationFeed,
}

struct RegistryInner {
    peers: Mutex<BTreeMap<ContactId, PeerEntry>>,
    feeds: SharedObservable<PeerFeeds>,
    expiration: Duration,
}

/// The peers currently sharing their location with an account.
///
/// Fed with the geolocation messages received by the account, the registry
/// keeps one [`PeerLocationFeed`] per sharing peer and publishes the set of
/// feeds every time a peer starts or stops sharing.
#[derive(Clone)]
pub struct PeerLocationRegistry {
    inner: Arc<RegistryInner>,
}

impl PeerLocationRegistry {
    /// Create a registry forgetting peers silent for longer than
    /// `expiration`.
    pub fn new(expiration: Duration) -> Self {
        Self {
            inner: Arc::new(RegistryInner {
                peers: Mutex::default(),
                feeds: SharedObservable::new(PeerFeeds::new()),
                expiration,
            }),
        }
    }

    /// Create a registry following `settings`, along with its maintenance
    /// task. Peers are forgotten as long as the returned handle is alive.
    pub fn with_settings(settings: &LocationSharingSettings) -> (Self, AbortOnDrop<()>) {
        let registry = Self::new(settings.peer_expiration);
        let maintenance = registry.spawn_maintenance(settings.peer_maintenance_interval);
        (registry, maintenance)
    }

    /// Handle a geolocation message of a peer.
    ///
    /// Returns how long the peer keeps its place without sending anything
    /// new.
    pub fn on_location_update(&self, update: PeerLocationUpdate) -> Duration {
        let PeerLocationUpdate { contact_id, message } = update;

        match message {
            GeoMessage::Position(report) => {
                let sample = report.to_sample();
                let mut peers = locked(&self.inner.peers);

                match peers.get(&contact_id) {
                    Some(entry) => {
                        if entry.samples.get().timestamp < sample.timestamp {
                            entry.samples.set(sample);
                        } else {
                            trace!(%contact_id, "Ignoring an outdated location sample");
                        }
                    }

                    None => {
                        info!(%contact_id, "Peer started sharing their location");

                        let samples = SharedObservable::new(sample);
                        let feed =
                            PeerLocationFeed::from_subscriber(contact_id.clone(), samples.subscribe());
                        peers.insert(contact_id, PeerEntry { samples, feed });

                        self.publish(&peers);
                    }
                }
            }

            GeoMessage::Stop => {
                self.force_expire(&contact_id);
            }
        }

        self.inner.expiration
    }

    /// Handle the payload of a text message of a peer.
    ///
    /// Returns `None` when the message carries no decodable geolocation.
    pub fn on_text_message(
        &self,
        contact_id: ContactId,
        payload: &BTreeMap<String, String>,
    ) -> Option<Duration> {
        let message = GeoMessage::from_payload(payload)?;
        Some(self.on_location_update(PeerLocationUpdate { contact_id, message }))
    }

    /// Forget a peer now. Its feed completes.
    ///
    /// Returns whether the peer was sharing.
    pub fn force_expire(&self, contact_id: &ContactId) -> bool {
        let mut peers = locked(&self.inner.peers);

        if peers.remove(contact_id).is_some() {
            info!(%contact_id, "Peer stopped sharing their location");
            self.publish(&peers);
            true
        } else {
            false
        }
    }

    /// Forget every peer whose last sample was received before
    /// `now - expiration`.
    ///
    /// Returns the number of forgotten peers.
    pub fn maintain(&self, now: Instant) -> usize {
        let mut peers = locked(&self.inner.peers);
        if peers.is_empty() {
            return 0;
        }

        let Some(deadline) = now.checked_sub(self.inner.expiration) else {
            return 0;
        };

        let before = peers.len();
        peers.retain(|contact_id, entry| {
            let fresh = entry.samples.get().received_at >= deadline;
            if !fresh {
                debug!(%contact_id, "Peer location expired");
            }
            fresh
        });

        let expired = before - peers.len();
        if expired > 0 {
            self.publish(&peers);
        }

        expired
    }

    /// Run [`Self::maintain`] every `period`, at least [`MIN_TIMER_PERIOD`],
    /// until the returned handle is dropped.
    pub fn spawn_maintenance(&self, period: Duration) -> AbortOnDrop<()> {
        let registry = self.clone();

        spawn(async move {
            let mut ticks = interval(period.max(MIN_TIMER_PERIOD));
            ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick completes immediately.
            ticks.tick().await;

            loop {
                ticks.tick().await;
                registry.maintain(Instant::now());
            }
        })
        .abort_on_drop()
    }

    /// The feeds of the peers sharing right now.
    pub fn feeds(&self) -> PeerFeeds {
        self.inner.feeds.get()
    }

    /// The feeds of the sharing peers: the current set first, then every
    /// change.
    pub fn subscribe(&self) -> impl Stream<Item = PeerFeeds> {
        let mut feeds = self.inner.feeds.subscribe();

        stream! {
            yield feeds.next_now();

            while let Some(current) = feeds.next().await {
                yield current;
            }
        }
    }

    fn publish(&self, peers: &BTreeMap<ContactId, PeerEntry>) {
        let feeds =
            peers.iter().map(|(contact_id, entry)| (contact_id.clone(), entry.feed.clone())).collect();
        self.inner.feeds.set(feeds);
    }
}

impl fmt::Debug for PeerLocationRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let peers = locked(&self.inner.peers);
        f.debug_struct("PeerLocationRegistry")
            .field("peers", &peers.keys().collect::<Vec<_>>())
            .field("expiration", &self.inner.expiration)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use assert_matches2::assert_let;
    use futures_util::{pin_mut, StreamExt};
    use locshare_test::{async_test, ALICE, BOB};
    use stream_assert::{assert_next_matches, assert_pending};
    use tokio::time::Instant;

    use super::{PeerLocationRegistry, PeerLocationUpdate};
    use crate::{
        config::{LocationSharingSettings, PEER_LOCATION_EXPIRATION},
        geo_message::{GeoMessage, PositionReport},
        identifiers::ContactId,
    };

    fn position(contact: &str, latitude: f64, time: i64) -> PeerLocationUpdate {
        PeerLocationUpdate {
            contact_id: ContactId::from(contact),
            message: GeoMessage::Position(PositionReport::new(latitude, 2.0, time)),
        }
    }

    fn stop(contact: &str) -> PeerLocationUpdate {
        PeerLocationUpdate { contact_id: ContactId::from(contact), message: GeoMessage::Stop }
    }

    #[async_test]
    async fn test_membership_follows_start_and_stop() {
        let registry = PeerLocationRegistry::new(PEER_LOCATION_EXPIRATION);
        let updates = registry.subscribe();
        pin_mut!(updates);

        let feeds = assert_next_matches!(updates, feeds => feeds);
        assert!(feeds.is_empty());

        let hint = registry.on_location_update(position(BOB, 1.0, 1));
        assert_eq!(hint, Duration::from_secs(120));
        let feeds = assert_next_matches!(updates, feeds => feeds);
        assert_eq!(feeds.len(), 1);

        // Position updates don't change the membership.
        registry.on_location_update(position(BOB, 1.5, 2));
        assert_pending!(updates);

        registry.on_location_update(position(ALICE, 3.0, 1));
        let feeds = assert_next_matches!(updates, feeds => feeds);
        assert_eq!(feeds.len(), 2);

        registry.on_location_update(stop(BOB));
        let feeds = assert_next_matches!(updates, feeds => feeds);
        assert!(feeds.keys().map(ContactId::as_str).eq([ALICE]));

        // Stopping twice is harmless.
        registry.on_location_update(stop(BOB));
        assert_pending!(updates);
    }

    #[async_test]
    async fn test_only_newer_samples_are_forwarded() {
        let registry = PeerLocationRegistry::new(PEER_LOCATION_EXPIRATION);
        registry.on_location_update(position(BOB, 1.0, 10));

        let feed = registry.feeds()[&ContactId::from(BOB)].clone();
        let samples = feed.subscribe();
        pin_mut!(samples);
        assert_let!(Some(Ok(first)) = samples.next().await);
        assert_eq!(first.latitude, 1.0);

        registry.on_location_update(position(BOB, 2.0, 5));
        assert_pending!(samples);

        registry.on_location_update(position(BOB, 3.0, 11));
        assert_let!(Some(Ok(newer)) = samples.next().await);
        assert_eq!(newer.latitude, 3.0);

        registry.on_location_update(stop(BOB));
        assert!(samples.next().await.is_none());
    }

    #[async_test]
    async fn test_text_messages() {
        let registry = PeerLocationRegistry::new(PEER_LOCATION_EXPIRATION);
        let contact = ContactId::from(BOB);

        let payload = GeoMessage::Position(PositionReport::new(1.0, 2.0, 3)).to_payload();
        assert_eq!(registry.on_text_message(contact.clone(), &payload), Some(PEER_LOCATION_EXPIRATION));
        assert_eq!(registry.feeds().len(), 1);

        let garbage = [(crate::geo_message::MIME_GEOLOCATION.to_owned(), "[]".to_owned())].into();
        assert_eq!(registry.on_text_message(contact, &garbage), None);
        assert_eq!(registry.feeds().len(), 1);
    }

    #[async_test(start_paused = true)]
    async fn test_maintenance_expires_silent_peers() {
        let registry = PeerLocationRegistry::new(PEER_LOCATION_EXPIRATION);
        registry.on_location_update(position(BOB, 1.0, 1));

        tokio::time::advance(Duration::from_secs(90)).await;
        registry.on_location_update(position(ALICE, 1.0, 1));

        assert_eq!(registry.maintain(Instant::now()), 0);

        tokio::time::advance(Duration::from_secs(31)).await;
        assert_eq!(registry.maintain(Instant::now()), 1);
        assert!(registry.feeds().contains_key(&ContactId::from(ALICE)));

        let _maintenance = registry.spawn_maintenance(Duration::from_secs(60));
        tokio::time::sleep(Duration::from_secs(121)).await;
        assert!(registry.feeds().is_empty());
    }

    #[async_test(start_paused = true)]
    async fn test_registry_with_settings() {
        let settings = LocationSharingSettings::new()
            .peer_expiration(Duration::from_secs(10))
            .peer_maintenance_interval(Duration::from_secs(5));
        let (registry, maintenance) = PeerLocationRegistry::with_settings(&settings);
        registry.on_location_update(position(BOB, 1.0, 1));

        tokio::time::sleep(Duration::from_secs(6)).await;
        assert_eq!(registry.feeds().len(), 1);

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert!(registry.feeds().is_empty());

        drop(maintenance);
        registry.on_location_update(position(BOB, 1.0, 2));
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(registry.feeds().len(), 1);
    }

    #[async_test(start_paused = true)]
    async fn test_zero_maintenance_period() {
        let registry = PeerLocationRegistry::new(Duration::from_secs(10));
        registry.on_location_update(position(BOB, 1.0, 1));

        let maintenance = registry.spawn_maintenance(Duration::ZERO);
        tokio::time::sleep(Duration::from_secs(11)).await;
        assert!(registry.feeds().is_empty());
        assert!(!maintenance.is_finished());
    }
}
