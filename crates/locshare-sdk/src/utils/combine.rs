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

//! A combine-latest over a set of streams that changes over time.

use std::{collections::BTreeMap, fmt::Debug};

use async_stream::stream;
use futures_core::Stream;
use futures_util::{stream::BoxStream, StreamExt};
use tokio::sync::mpsc;
use tracing::{trace, warn};

use crate::{
    error::FeedError,
    executor::{spawn, AbortOnDrop, JoinHandleExt},
};

/// A source that can be subscribed to any number of times, each
/// subscription starting with the latest value.
pub trait Restartable: Send + Sync + 'static {
    type Item: Clone + Send + 'static;

    fn subscribe(&self) -> BoxStream<'static, Result<Self::Item, FeedError>>;

    /// Whether `other` is a handle on the same source.
    fn is_same_feed(&self, other: &Self) -> bool;
}

enum ChildEvent<K, V> {
    Value { key: K, generation: u64, value: V },
    Failed { key: K, generation: u64, error: FeedError },
    Completed { key: K, generation: u64 },
}

struct Child<F: Restartable> {
    feed: F,
    generation: u64,
    latest: Option<F::Item>,
    failed: bool,
    _task: AbortOnDrop<()>,
}

enum Step<K, V> {
    Emit(Option<Vec<(K, V)>>),
    Finished,
}

/// Combine the latest value of every member of a changing membership.
///
/// Every membership map received from `membership` is reconciled against the
/// running children: one task per key subscribes to its feed, tasks of keys
/// that left (or whose feed was replaced) are aborted. A snapshot, ordered by
/// key, is yielded on every membership change and on every new value, as soon
/// as every current member has produced a value. An empty membership yields
/// an empty snapshot.
///
/// A failing feed is logged and left out of the snapshots until its key
/// leaves the membership and joins it again. A feed that completes keeps its
/// last value. The stream ends with `membership`.
pub fn combine_latest_by_key<K, F, M>(membership: M) -> impl Stream<Item = Vec<(K, F::Item)>>
where
    K: Ord + Clone + Debug + Send + Sync + 'static,
    F: Restartable,
    M: Stream<Item = BTreeMap<K, F>> + Send + 'static,
{
    stream! {
        let (sender, mut receiver) = mpsc::unbounded_channel();
        let mut children: BTreeMap<K, Child<F>> = BTreeMap::new();
        let mut next_generation = 0u64;
        let mut first_membership = true;
        let mut membership = Box::pin(membership);

        loop {
            let step = tokio::select! {
                members = membership.next() => {
                    let Some(members) = members else {
                        break;
                    };

                    let mut changed = std::mem::take(&mut first_membership);

                    let before = children.len();
                    children.retain(|key, child| {
                        let keep = members.get(key).is_some_and(|feed| feed.is_same_feed(&child.feed));
                        if !keep {
                            trace!(?key, "Member left");
                        }
                        keep
                    });
                    changed |= children.len() != before;

                    for (key, feed) in members {
                        if children.contains_key(&key) {
                            continue;
                        }

                        trace!(?key, "Member joined");
                        next_generation += 1;
                        let task = spawn_child(key.clone(), &feed, next_generation, sender.clone());
                        children.insert(
                            key,
                            Child { feed, generation: next_generation, latest: None, failed: false, _task: task },
                        );
                        changed = true;
                    }

                    Step::Emit(if changed { snapshot(&children) } else { None })
                }

                Some(event) = receiver.recv() => {
                    match event {
                        ChildEvent::Value { key, generation, value } => {
                            match children.get_mut(&key) {
                                Some(child) if child.generation == generation => {
                                    child.latest = Some(value);
                                    Step::Emit(snapshot(&children))
                                }
                                // A value of a child that was replaced in the meantime.
                                _ => Step::Emit(None),
                            }
                        }

                        ChildEvent::Failed { key, generation, error } => {
                            match children.get_mut(&key) {
                                Some(child) if child.generation == generation => {
                                    warn!(?key, "Location feed failed, ignoring it: {error}");
                                    child.failed = true;
                                    child.latest = None;
                                    Step::Emit(snapshot(&children))
                                }
                                _ => Step::Emit(None),
                            }
                        }

                        ChildEvent::Completed { key, generation } => {
                            trace!(?key, generation, "Location feed completed");
                            Step::Emit(None)
                        }
                    }
                }

                else => Step::Finished,
            };

            match step {
                Step::Emit(Some(values)) => yield values,
                Step::Emit(None) => {}
                Step::Finished => break,
            }
        }
    }
}

fn spawn_child<K, F>(
    key: K,
    feed: &F,
    generation: u64,
    sender: mpsc::UnboundedSender<ChildEvent<K, F::Item>>,
) -> AbortOnDrop<()>
where
    K: Clone + Send + 'static,
    F: Restartable,
{
    let mut values = feed.subscribe();

    spawn(async move {
        while let Some(value) = values.next().await {
            let event = match value {
                Ok(value) => ChildEvent::Value { key: key.clone(), generation, value },
                Err(error) => {
                    let _ = sender.send(ChildEvent::Failed { key, generation, error });
                    return;
                }
            };

            if sender.send(event).is_err() {
                return;
            }
        }

        let _ = sender.send(ChildEvent::Completed { key, generation });
    })
    .abort_on_drop()
}

/// The latest values, if every member that hasn't failed has one.
fn snapshot<K, F>(children: &BTreeMap<K, Child<F>>) -> Option<Vec<(K, F::Item)>>
where
    K: Clone,
    F: Restartable,
{
    children
        .iter()
        .filter(|(_, child)| !child.failed)
        .map(|(key, child)| child.latest.clone().map(|value| (key.clone(), value)))
        .collect()
}
