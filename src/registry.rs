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

//! Shared vehicle registry.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

use crate::ble::{constants, Advertisement, Characteristic, Discovery, Peripheral};

/// Connection lifecycle of a registered vehicle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VehicleState {
    Discovered,
    Connecting,
    Connected,
    Disconnected,
}

/// A vehicle the gateway has seen at least once.
pub struct Vehicle {
    pub id: String,
    pub peripheral: Arc<dyn Peripheral>,
    pub manufacturer_data: Vec<u8>,
    pub local_name: Vec<u8>,
    pub writer: Option<Arc<dyn Characteristic>>,
    pub reader: Option<Arc<dyn Characteristic>>,
    pub state: VehicleState,
}

/// Process-wide id-to-vehicle map.
///
/// Entries are never evicted: disconnecting only resets the state and drops
/// the characteristic handles, so a later CONNECT reuses the discovery
/// metadata without rescanning.
#[derive(Default)]
pub struct VehicleRegistry {
    vehicles: RwLock<HashMap<String, Vehicle>>,
}

impl VehicleRegistry {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Record a discovery and return the normalized advertisement that goes
    /// on the wire. A missing local name gets the static fallback; an
    /// existing entry only has its metadata refreshed.
    pub fn record_discovery(&self, discovery: Discovery) -> Advertisement {
        let Discovery {
            mut advertisement,
            peripheral,
        } = discovery;

        if advertisement.local_name.is_empty() {
            debug!("No local name from {}; defaulting", advertisement.id);
            advertisement.local_name = constants::fallback_local_name(&advertisement.id).to_vec();
        }

        let mut vehicles = self.vehicles.write();
        match vehicles.get_mut(&advertisement.id) {
            Some(vehicle) => {
                vehicle.manufacturer_data = advertisement.manufacturer_data.clone();
                vehicle.local_name = advertisement.local_name.clone();
            }
            None => {
                vehicles.insert(
                    advertisement.id.clone(),
                    Vehicle {
                        id: advertisement.id.clone(),
                        peripheral,
                        manufacturer_data: advertisement.manufacturer_data.clone(),
                        local_name: advertisement.local_name.clone(),
                        writer: None,
                        reader: None,
                        state: VehicleState::Discovered,
                    },
                );
            }
        }

        advertisement
    }

    pub fn contains(&self, id: &str) -> bool {
        self.vehicles.read().contains_key(id)
    }

    pub fn peripheral(&self, id: &str) -> Option<Arc<dyn Peripheral>> {
        self.vehicles
            .read()
            .get(id)
            .map(|vehicle| vehicle.peripheral.clone())
    }

    pub fn state(&self, id: &str) -> Option<VehicleState> {
        self.vehicles.read().get(id).map(|vehicle| vehicle.state)
    }

    pub fn mark_connecting(&self, id: &str) {
        if let Some(vehicle) = self.vehicles.write().get_mut(id) {
            vehicle.state = VehicleState::Connecting;
        }
    }

    /// Attach the negotiated characteristic pair. The vehicle only counts as
    /// connected once both handles are in place.
    pub fn attach_characteristics(
        &self,
        id: &str,
        writer: Arc<dyn Characteristic>,
        reader: Arc<dyn Characteristic>,
    ) {
        if let Some(vehicle) = self.vehicles.write().get_mut(id) {
            vehicle.writer = Some(writer);
            vehicle.reader = Some(reader);
            vehicle.state = VehicleState::Connected;
        }
    }

    /// Reset a vehicle to disconnected, dropping its characteristic handles
    /// but keeping the entry.
    pub fn mark_disconnected(&self, id: &str) {
        if let Some(vehicle) = self.vehicles.write().get_mut(id) {
            vehicle.writer = None;
            vehicle.reader = None;
            vehicle.state = VehicleState::Disconnected;
        }
    }

    /// Writer characteristic of a currently connected vehicle.
    pub fn connected_writer(&self, id: &str) -> Option<Arc<dyn Characteristic>> {
        let vehicles = self.vehicles.read();
        let vehicle = vehicles.get(id)?;
        match vehicle.state {
            VehicleState::Connected => vehicle.writer.clone(),
            _ => None,
        }
    }
}
