// Copyright 2026 Daniel Pelikan
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

//! BLE adapter abstraction.
//!
//! The gateway reaches vehicles through this object-safe trait surface so the
//! BlueZ backend and the in-memory mock are interchangeable at construction.

pub mod constants;

mod bluez;
mod mock;

pub use bluez::BluezAdapter;
pub use mock::{MockAdapter, MockPeripheral};

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use futures::stream::BoxStream;
use uuid::Uuid;

/// Advertisement data reported for a discovered peripheral.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Advertisement {
    pub id: String,
    pub manufacturer_data: Vec<u8>,
    pub local_name: Vec<u8>,
}

/// One discovery event: the advertisement plus a handle to the peripheral.
pub struct Discovery {
    pub advertisement: Advertisement,
    pub peripheral: Arc<dyn Peripheral>,
}

/// Shared BLE radio.
#[async_trait]
pub trait BleAdapter: Send + Sync {
    /// Start discovery filtered to the vehicle service. Discovery runs until
    /// the returned stream is dropped.
    async fn discover(&self) -> Result<BoxStream<'static, Discovery>>;
}

/// A discovered vehicle peripheral.
#[async_trait]
pub trait Peripheral: Send + Sync {
    fn id(&self) -> String;

    async fn connect(&self) -> Result<()>;

    /// Resolve characteristics of `service`, returned in the order of
    /// `uuids`.
    async fn discover_characteristics(
        &self,
        service: Uuid,
        uuids: &[Uuid],
    ) -> Result<Vec<Arc<dyn Characteristic>>>;

    async fn disconnect(&self) -> Result<()>;
}

/// A single GATT characteristic on a connected peripheral.
#[async_trait]
pub trait Characteristic: Send + Sync {
    /// Enable notifications. Payloads arrive on the returned stream until it
    /// is dropped or the peripheral disconnects.
    async fn subscribe(&self) -> Result<BoxStream<'static, Vec<u8>>>;

    async fn write(&self, payload: &[u8]) -> Result<()>;
}
