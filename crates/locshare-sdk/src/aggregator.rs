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

//! The participants sharing their location in a conversation.
//!
//! The [`LocationAggregator`] combines the feeds of the peers sharing their
//! location with the account, plus the local device while it shares its own
//! location with the conversation, into a roster: one
//! [`LocationViewModel`] per participant, re-emitted whenever a participant
//! joins, leaves or moves.

use std::{
    collections::{BTreeMap, BTreeSet},
    fmt,
    future::pending,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
};

use async_stream::stream;
use eyeball::{SharedObservable, Subscriber};
use futures_core::Stream;
use futures_util::{stream::BoxStream, StreamExt};
use tracing::{debug, trace};

use crate::{
    error::FeedError,
    identifiers::{ContactId, ConversationPath},
    location::{Contact, LocationSample, LocationViewModel, PeerFeeds, PeerLocationFeed},
    sharing::LocationSharingService,
    traits::Account,
    utils::{combine_latest_by_key, Restartable},
};

static NEXT_EPOCH: AtomicU64 = AtomicU64::new(0);

/// The local device's part of the roster, plugged in while a session is
/// bound.
///
/// It only holds subscribers of the session, so it doesn't keep the session
/// alive.
#[derive(Clone)]
pub struct LocalContribution {
    epoch: u64,
    sharing_set: Subscriber<BTreeSet<ConversationPath>>,
    location: Subscriber<Option<LocationSample>>,
}

impl LocalContribution {
    pub fn new(service: &LocationSharingService) -> Self {
        Self {
            epoch: NEXT_EPOCH.fetch_add(1, Ordering::Relaxed),
            sharing_set: service.subscribe_to_sharing_set(),
            location: service.subscribe_to_my_location(),
        }
    }

    fn samples(&self) -> BoxStream<'static, Result<LocationSample, FeedError>> {
        let mut location = self.location.clone();

        stream! {
            if let Some(sample) = location.next_now() {
                yield Ok(sample);
            }

            while let Some(sample) = location.next().await {
                if let Some(sample) = sample {
                    yield Ok(sample);
                }
            }
        }
        .boxed()
    }
}

impl fmt::Debug for LocalContribution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalContribution").field("epoch", &self.epoch).finish_non_exhaustive()
    }
}

/// A member of the roster.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum RosterKey {
    /// The local device, always first.
    Local,
    Peer(ContactId),
}

/// The location feed of a member of the roster.
#[derive(Clone, Debug)]
pub enum RosterFeed {
    Local(LocalContribution),
    Peer(PeerLocationFeed),
}

impl Restartable for RosterFeed {
    type Item = LocationSample;

    fn subscribe(&self) -> BoxStream<'static, Result<LocationSample, FeedError>> {
        match self {
            Self::Local(contribution) => contribution.samples(),
            Self::Peer(feed) => feed.subscribe(),
        }
    }

    fn is_same_feed(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Local(a), Self::Local(b)) => a.epoch == b.epoch,
            (Self::Peer(a), Self::Peer(b)) => a.is_same_feed(b),
            _ => false,
        }
    }
}

type Membership = BTreeMap<RosterKey, RosterFeed>;

/// Follows whether the local device takes part in the roster of a
/// conversation: it does while it shares with it and its position is known.
struct LocalTracker {
    contribution: LocalContribution,
    sharing_set: Subscriber<BTreeSet<ConversationPath>>,
    location: Subscriber<Option<LocationSample>>,
    shared: bool,
    located: bool,
    closed: bool,
}

impl LocalTracker {
    fn new(contribution: LocalContribution, path: &ConversationPath) -> Self {
        let mut sharing_set = contribution.sharing_set.clone();
        let mut location = contribution.location.clone();
        let shared = sharing_set.next_now().contains(path);
        let located = location.next_now().is_some();

        Self { contribution, sharing_set, location, shared, located, closed: false }
    }

    fn is_present(&self) -> bool {
        !self.closed && self.shared && self.located
    }

    /// Wait for the next change of the session.
    async fn changed(&mut self, path: &ConversationPath) {
        if self.closed {
            return pending().await;
        }

        tokio::select! {
            set = self.sharing_set.next() => match set {
                Some(set) => self.shared = set.contains(path),
                None => self.closed = true,
            },
            sample = self.location.next() => match sample {
                Some(sample) => self.located = sample.is_some(),
                None => self.closed = true,
            },
        }
    }
}

async fn local_changed(tracker: Option<&mut LocalTracker>, path: &ConversationPath) {
    match tracker {
        Some(tracker) => tracker.changed(path).await,
        None => pending().await,
    }
}

fn same_membership(a: &Membership, b: &Membership) -> bool {
    a.len() == b.len()
        && a.iter().zip(b).all(|((key_a, feed_a), (key_b, feed_b))| {
            key_a == key_b && feed_a.is_same_feed(feed_b)
        })
}

struct AggregatorInner {
    path: ConversationPath,
    account: Arc<dyn Account>,
    local: SharedObservable<Option<LocalContribution>>,
    peer_sharing: SharedObservable<Option<bool>>,
}

impl AggregatorInner {
    fn publish_peer_sharing(&self, feeds: &PeerFeeds) {
        let counterpart = self.account.conversation_counterpart(&self.path.conversation_id);
        let sharing = counterpart.is_some_and(|contact_id| feeds.contains_key(&contact_id));

        if self.peer_sharing.set_if_not_eq(Some(sharing)).is_some() {
            debug!(path = %self.path, sharing, "Peer sharing changed");
        }
    }

    fn contact(&self, key: &RosterKey) -> Contact {
        match key {
            RosterKey::Local => self.account.own_contact(),
            RosterKey::Peer(contact_id) => self
                .account
                .contact(contact_id)
                .unwrap_or_else(|| Contact::unknown(contact_id.clone())),
        }
    }
}

/// The roster of one conversation.
///
/// Cloning it is cheap, every clone shares the local contribution.
#[derive(Clone)]
pub struct LocationAggregator {
    inner: Arc<AggregatorInner>,
}

impl LocationAggregator {
    pub fn new(path: ConversationPath, account: Arc<dyn Account>) -> Self {
        Self {
            inner: Arc::new(AggregatorInner {
                path,
                account,
                local: SharedObservable::new(None),
                peer_sharing: SharedObservable::new(None),
            }),
        }
    }

    pub fn path(&self) -> &ConversationPath {
        &self.inner.path
    }

    /// Plug in, or with `None` unplug, the local device.
    pub fn set_local_contribution(&self, contribution: Option<LocalContribution>) {
        self.inner.local.set(contribution);
    }

    /// Whether the peer of the conversation shares their location with the
    /// account; `None` until the first roster membership is known.
    ///
    /// Only updated while a [`LocationAggregator::roster_stream`] is polled.
    pub fn subscribe_to_peer_sharing(&self) -> Subscriber<Option<bool>> {
        self.inner.peer_sharing.subscribe()
    }

    pub fn peer_sharing(&self) -> Option<bool> {
        self.inner.peer_sharing.get()
    }

    /// The members of the roster, on every change.
    fn membership(&self) -> impl Stream<Item = Membership> {
        let inner = self.inner.clone();

        stream! {
            let mut peer_updates = inner.account.location_updates();
            let mut contributions = inner.local.subscribe();
            let mut tracker =
                contributions.next_now().map(|contribution| LocalTracker::new(contribution, &inner.path));
            let mut peers: Option<PeerFeeds> = None;
            let mut last: Option<Membership> = None;

            loop {
                tokio::select! {
                    feeds = peer_updates.next() => {
                        let Some(feeds) = feeds else {
                            break;
                        };
                        inner.publish_peer_sharing(&feeds);
                        peers = Some(feeds);
                    }
                    contribution = contributions.next() => {
                        let Some(contribution) = contribution else {
                            break;
                        };
                        tracker = contribution.map(|contribution| LocalTracker::new(contribution, &inner.path));
                    }
                    () = local_changed(tracker.as_mut(), &inner.path) => {}
                }

                let Some(peers) = &peers else {
                    continue;
                };

                let mut members: Membership = peers
                    .iter()
                    .map(|(contact_id, feed)| {
                        (RosterKey::Peer(contact_id.clone()), RosterFeed::Peer(feed.clone()))
                    })
                    .collect();

                if let Some(tracker) = tracker.as_ref().filter(|tracker| tracker.is_present()) {
                    members.insert(RosterKey::Local, RosterFeed::Local(tracker.contribution.clone()));
                }

                if last.as_ref().is_some_and(|last| same_membership(last, &members)) {
                    continue;
                }

                trace!(path = %inner.path, count = members.len(), "Roster membership changed");
                last = Some(members.clone());
                yield members;
            }
        }
    }

    /// The roster: the local device first when it takes part, then the peers
    /// ordered by contact id.
    ///
    /// A roster is yielded on every membership change and every new sample,
    /// once every member has a sample. A peer whose feed fails is left out
    /// until it stops and starts sharing again.
    pub fn roster_stream(&self) -> impl Stream<Item = Vec<LocationViewModel>> {
        let inner = self.inner.clone();

        combine_latest_by_key(self.membership()).map(move |snapshot| {
            snapshot
                .into_iter()
                .map(|(key, sample)| LocationViewModel { contact: inner.contact(&key), sample })
                .collect()
        })
    }
}

impl fmt::Debug for LocationAggregator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocationAggregator")
            .field("path", &self.inner.path)
            .field("peer_sharing", &self.inner.peer_sharing.get())
            .finish_non_exhaustive()
    }
}
