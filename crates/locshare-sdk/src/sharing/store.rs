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
    io::ErrorKind,
    path::{Path, PathBuf},
    sync::Mutex,
};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex as AsyncMutex;

use crate::{error::StoreError, location::GeoPoint, utils::locked, AsyncTraitDeps};

/// Keeps the last known position of the local user across restarts.
#[async_trait]
pub trait PositionStore: AsyncTraitDeps {
    async fn load(&self) -> Result<Option<GeoPoint>, StoreError>;

    async fn save(&self, position: GeoPoint) -> Result<(), StoreError>;
}

/// A [`PositionStore`] living as long as the process.
#[derive(Debug, Default)]
pub struct MemoryPositionStore {
    position: Mutex<Option<GeoPoint>>,
}

impl MemoryPositionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PositionStore for MemoryPositionStore {
    async fn load(&self) -> Result<Option<GeoPoint>, StoreError> {
        Ok(*locked(&self.position))
    }

    async fn save(&self, position: GeoPoint) -> Result<(), StoreError> {
        *locked(&self.position) = Some(position);
        Ok(())
    }
}

#[derive(Serialize, Deserialize)]
struct StoredPosition {
    latitude: f64,
    longitude: f64,
}

/// A [`PositionStore`] writing the position to a JSON file.
///
/// Writes through one store are serialized.
#[derive(Debug)]
pub struct JsonFilePositionStore {
    path: PathBuf,
    write_lock: AsyncMutex<()>,
}

impl JsonFilePositionStore {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self { path: path.as_ref().to_owned(), write_lock: AsyncMutex::new(()) }
    }
}

#[async_trait]
impl PositionStore for JsonFilePositionStore {
    async fn load(&self) -> Result<Option<GeoPoint>, StoreError> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(error) if error.kind() == ErrorKind::NotFound => return Ok(None),
            Err(error) => return Err(error.into()),
        };

        let stored: StoredPosition = serde_json::from_slice(&bytes)?;
        Ok(Some(GeoPoint::new(stored.latitude, stored.longitude)))
    }

    async fn save(&self, position: GeoPoint) -> Result<(), StoreError> {
        let stored = StoredPosition { latitude: position.latitude, longitude: position.longitude };
        let bytes = serde_json::to_vec(&stored)?;

        let _guard = self.write_lock.lock().await;

        // Replace the file atomically.
        let temporary = self.path.with_extension("tmp");
        tokio::fs::write(&temporary, bytes).await?;
        tokio::fs::rename(&temporary, &self.path).await?;

        Ok(())
    }
}
