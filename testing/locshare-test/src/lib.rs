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

//! Helpers to write tests for the location sharing SDK.

pub use tokio::test as async_test;

pub mod test_json;

/// Identifier of the account the tests run as.
pub const ACCOUNT_ID: &str = "a1b2c3d4e5f60718";
/// A one-to-one conversation with [`BOB`].
pub const CONVERSATION_ID: &str = "swarm:8f2e6c1d0b9a";

pub const ALICE: &str = "4b5fe1c2a3d9e7f801234567890abcdef0123456";
pub const BOB: &str = "9c1d2e3f4a5b6c7d8e9f0a1b2c3d4e5f60718293";
pub const CAROL: &str = "2a3b4c5d6e7f8091a2b3c4d5e6f708192a3b4c5d";

#[doc(hidden)]
pub mod __private {
    pub use ctor;
    pub use futures_util;
    pub use tokio;
}

/// Assert that the stream yields an item within the timeout, and return it.
///
/// The default timeout is 500 ms.
#[macro_export]
macro_rules! assert_next_with_timeout {
    ($stream:expr) => {
        $crate::assert_next_with_timeout!($stream, 500)
    };
    ($stream:expr, $timeout_ms:expr) => {{
        let next = $crate::__private::tokio::time::timeout(
            ::std::time::Duration::from_millis($timeout_ms),
            $crate::__private::futures_util::StreamExt::next(&mut $stream),
        )
        .await
        .expect("no next item within the timeout");

        next.expect("the stream ended instead of yielding an item")
    }};
}

/// Assert that the stream yields nothing within the timeout.
///
/// The default timeout is 100 ms.
#[macro_export]
macro_rules! assert_no_next_with_timeout {
    ($stream:expr) => {
        $crate::assert_no_next_with_timeout!($stream, 100)
    };
    ($stream:expr, $timeout_ms:expr) => {{
        if let Ok(next) = $crate::__private::tokio::time::timeout(
            ::std::time::Duration::from_millis($timeout_ms),
            $crate::__private::futures_util::StreamExt::next(&mut $stream),
        )
        .await
        {
            panic!("the stream yielded or ended unexpectedly: {next:?}");
        }
    }};
}

/// Assert that the stream ends within the timeout.
#[macro_export]
macro_rules! assert_closed_with_timeout {
    ($stream:expr) => {
        $crate::assert_closed_with_timeout!($stream, 500)
    };
    ($stream:expr, $timeout_ms:expr) => {{
        let next = $crate::__private::tokio::time::timeout(
            ::std::time::Duration::from_millis($timeout_ms),
            $crate::__private::futures_util::StreamExt::next(&mut $stream),
        )
        .await
        .expect("the stream didn't end within the timeout");

        assert!(next.is_none(), "the stream yielded {next:?} instead of ending");
    }};
}

/// Install a `tracing` subscriber printing to the test output, honoring
/// `RUST_LOG`.
///
/// Calling it more than once is harmless.
pub fn init_tracing_for_tests() {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

    let _ = tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer().with_test_writer())
        .try_init();
}

/// Install the test `tracing` subscriber when the test binary starts.
#[macro_export]
macro_rules! init_tracing_for_tests {
    () => {
        #[$crate::__private::ctor::ctor]
        fn init_logging() {
            $crate::init_tracing_for_tests();
        }
    };
}
