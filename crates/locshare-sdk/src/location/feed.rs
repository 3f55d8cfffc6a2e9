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
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
};

use async_stream::stream;
use eyeball::Subscriber;
use futures_util::{stream::BoxStream, StreamExt};

use crate::{error::FeedError, identifiers::ContactId, location::LocationSample, utils::Restartable};

/// The location feeds of every peer currently sharing with an account.
pub type PeerFeeds = BTreeMap<ContactId, PeerLocationFeed>;

type FeedFactory = dyn Fn() -> BoxStream<'static, Result<LocationSample, FeedError>> + Send + Sync;

enum FeedSource {
    Observable(Subscriber<LocationSample>),
    Custom(Box<FeedFactory>),
}

struct FeedInner {
    contact_id: ContactId,
    source: FeedSource,
    subscribers: AtomicUsize,
}

/// The restartable location feed of one peer.
///
/// Every call to [`PeerLocationFeed::subscribe`] starts a new stream that
/// first yields the latest sample, then every newer one. The streams complete
/// once the peer stops sharing.
#[derive(Clone)]
pub struct PeerLocationFeed {
    inner: Arc<FeedInner>,
}

impl PeerLocationFeed {
    pub(crate) fn from_subscriber(contact_id: ContactId, samples: Subscriber<LocationSample>) -> Self {
        Self::with_source(contact_id, FeedSource::Observable(samples))
    }

    /// Create a feed backed by an arbitrary stream factory.
    ///
    /// `factory` is called once per subscription.
    pub fn from_fn<F>(contact_id: ContactId, factory: F) -> Self
    where
        F: Fn() -> BoxStream<'static, Result<LocationSample, FeedError>> + Send + Sync + 'static,
    {
        Self::with_source(contact_id, FeedSource::Custom(Box::new(factory)))
    }

    fn with_source(contact_id: ContactId, source: FeedSource) -> Self {
        Self { inner: Arc::new(FeedInner { contact_id, source, subscribers: AtomicUsize::new(0) }) }
    }

    pub fn contact_id(&self) -> &ContactId {
        &self.inner.contact_id
    }

    /// Number of streams of this feed that are still alive.
    pub fn subscriber_count(&self) -> usize {
        self.inner.subscribers.load(Ordering::SeqCst)
    }

    pub fn subscribe(&self) -> BoxStream<'static, Result<LocationSample, FeedError>> {
        let guard = SubscriberGuard::new(self.inner.clone());

        match &self.inner.source {
            FeedSource::Observable(samples) => {
                let mut samples = samples.clone();

                stream! {
                    let _guard = guard;

                    yield Ok(samples.next_now());

                    while let Some(sample) = samples.next().await {
                        yield Ok(sample);
                    }
                }
                .boxed()
            }

            FeedSource::Custom(factory) => {
                let mut samples = factory();

                stream! {
                    let _guard = guard;

                    while let Some(sample) = samples.next().await {
                        yield sample;
                    }
                }
                .boxed()
            }
        }
    }
}

impl fmt::Debug for PeerLocationFeed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PeerLocationFeed")
            .field("contact_id", &self.inner.contact_id)
            .field("subscribers", &self.subscriber_count())
            .finish_non_exhaustive()
    }
}

impl Restartable for PeerLocationFeed {
    type Item = LocationSample;

    fn subscribe(&self) -> BoxStream<'static, Result<LocationSample, FeedError>> {
        PeerLocationFeed::subscribe(self)
    }

    fn is_same_feed(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

/// Counts one live subscription of a feed.
struct SubscriberGuard(Arc<FeedInner>);

impl SubscriberGuard {
    fn new(inner: Arc<FeedInner>) -> Self {
        inner.subscribers.fetch_add(1, Ordering::SeqCst);
        Self(inner)
    }
}

impl Drop for SubscriberGuard {
    fn drop(&mut self) {
        self.0.subscribers.fetch_sub(1, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use assert_matches2::assert_let;
    use eyeball::SharedObservable;
    use futures_util::{stream, StreamExt};
    use locshare_test::async_test;
    use stream_assert::{assert_next_eq, assert_pending};

    use super::PeerLocationFeed;
    use crate::{error::FeedError, location::LocationSample, utils::Restartable};

    #[async_test]
    async fn test_each_subscription_starts_with_the_latest_sample() {
        let first = LocationSample::new(1.0, 2.0, 1);
        let second = LocationSample::new(3.0, 4.0, 2);
        let observable = SharedObservable::new(first);
        let feed = PeerLocationFeed::from_subscriber("bob".into(), observable.subscribe());

        let mut early = feed.subscribe();
        assert_next_eq!(early, Ok(first));
        assert_pending!(early);

        observable.set(second);
        assert_next_eq!(early, Ok(second));

        let mut late = feed.subscribe();
        assert_next_eq!(late, Ok(second));
        assert_pending!(late);

        assert_eq!(feed.subscriber_count(), 2);
        drop(early);
        drop(late);
        assert_eq!(feed.subscriber_count(), 0);
    }

    #[async_test]
    async fn test_feed_completes_when_the_writer_is_gone() {
        let observable = SharedObservable::new(LocationSample::new(1.0, 2.0, 1));
        let feed = PeerLocationFeed::from_subscriber("bob".into(), observable.subscribe());

        let mut samples = feed.subscribe();
        assert_let!(Some(Ok(_)) = samples.next().await);

        drop(observable);
        assert!(samples.next().await.is_none());
    }

    #[async_test]
    async fn test_custom_feed() {
        let feed = PeerLocationFeed::from_fn("carol".into(), || {
            stream::iter([Err(FeedError::new("gone"))]).boxed()
        });

        let mut samples = feed.subscribe();
        assert_next_eq!(samples, Err(FeedError::new("gone")));
        assert!(samples.next().await.is_none());

        assert!(feed.is_same_feed(&feed.clone()));
        let other = PeerLocationFeed::from_fn("carol".into(), || stream::empty().boxed());
        assert!(!feed.is_same_feed(&other));
    }
}
