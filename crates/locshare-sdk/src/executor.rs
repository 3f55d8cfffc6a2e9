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

//! Task spawning and scoped task ownership.
//!
//! Every long-lived subscription of this crate runs as a tokio task whose
//! handle is wrapped in an [`AbortOnDrop`]. Handles are grouped in a
//! [`SubscriptionBag`] so that a whole scope (a view, a bound session) can be
//! torn down at once.

use std::{
    future::Future,
    pin::Pin,
    sync::Mutex,
    task::{Context, Poll},
};

pub use tokio::task::{spawn, JoinError, JoinHandle};

use crate::utils::locked;

/// A type ensuring a task is aborted on drop.
#[derive(Debug)]
pub struct AbortOnDrop<T>(JoinHandle<T>);

impl<T> AbortOnDrop<T> {
    pub fn new(join_handle: JoinHandle<T>) -> Self {
        Self(join_handle)
    }

    /// Whether the underlying task has completed, was aborted or panicked.
    pub fn is_finished(&self) -> bool {
        self.0.is_finished()
    }
}

impl<T> Drop for AbortOnDrop<T> {
    fn drop(&mut self) {
        self.0.abort();
    }
}

impl<T: 'static> Future for AbortOnDrop<T> {
    type Output = Result<T, JoinError>;

    fn poll(mut self: Pin<&mut Self>, context: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.0).poll(context)
    }
}

/// Trait to create an [`AbortOnDrop`] from a [`JoinHandle`].
pub trait JoinHandleExt<T> {
    fn abort_on_drop(self) -> AbortOnDrop<T>;
}

impl<T> JoinHandleExt<T> for JoinHandle<T> {
    fn abort_on_drop(self) -> AbortOnDrop<T> {
        AbortOnDrop::new(self)
    }
}

/// A group of tasks sharing the same lifetime.
///
/// Clearing or dropping the bag aborts every task it holds.
#[derive(Debug, Default)]
pub struct SubscriptionBag {
    tasks: Mutex<Vec<AbortOnDrop<()>>>,
}

impl SubscriptionBag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take ownership of a task; it lives until the bag is cleared.
    pub fn push(&self, task: AbortOnDrop<()>) {
        let mut tasks = locked(&self.tasks);
        tasks.retain(|task| !task.is_finished());
        tasks.push(task);
    }

    /// Spawn `future` and keep it alive for as long as the bag.
    pub fn spawn<F>(&self, future: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.push(spawn(future).abort_on_drop());
    }

    /// Abort every task of the bag.
    pub fn clear(&self) {
        // Drop outside the lock: aborting can run destructors of the tasks.
        let tasks = std::mem::take(&mut *locked(&self.tasks));
        drop(tasks);
    }

    /// Number of tasks still running.
    pub fn len(&self) -> usize {
        locked(&self.tasks).iter().filter(|task| !task.is_finished()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
