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

//! BlueZ-backed BLE adapter.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use bluer::{AdapterEvent, Device, DiscoveryFilter, DiscoveryTransport};
use futures::stream::BoxStream;
use futures::StreamExt;
use tracing::{info, warn};
use uuid::Uuid;

use super::constants::VEHICLE_SERVICE_UUID;
use super::{Advertisement, BleAdapter, Characteristic, Discovery, Peripheral};

/// Production adapter over the default BlueZ controller.
pub struct BluezAdapter {
    adapter: bluer::Adapter,
}

impl BluezAdapter {
    /// Open a BlueZ session on the default adapter and power it on.
    pub async fn new() -> Result<Self> {
        let session = bluer::Session::new().await?;
        let adapter = session.default_adapter().await?;
        info!("Using Bluetooth adapter: {}", adapter.name());

        if !adapter.is_powered().await? {
            info!("Powering on Bluetooth adapter...");
            adapter.set_powered(true).await?;
        }

        Ok(Self { adapter })
    }
}

#[async_trait]
impl BleAdapter for BluezAdapter {
    async fn discover(&self) -> Result<BoxStream<'static, Discovery>> {
        let filter = DiscoveryFilter {
            uuids: [VEHICLE_SERVICE_UUID].into_iter().collect(),
            transport: DiscoveryTransport::Le,
            ..Default::default()
        };
        self.adapter.set_discovery_filter(filter).await?;

        let events = self.adapter.discover_devices().await?;
        let adapter = self.adapter.clone();
        let discoveries = events
            .filter_map(move |event| {
                let adapter = adapter.clone();
                async move {
                    let addr = match event {
                        AdapterEvent::DeviceAdded(addr) => addr,
                        _ => return None,
                    };
                    match adapter.device(addr) {
                        Ok(device) => Some(read_discovery(device).await),
                        Err(err) => {
                            warn!("Discovered {} but could not open it: {}", addr, err);
                            None
                        }
                    }
                }
            })
            .boxed();

        Ok(discoveries)
    }
}

async fn read_discovery(device: Device) -> Discovery {
    let id = device.address().to_string();
    let manufacturer_data = match device.manufacturer_data().await {
        Ok(Some(data)) => flatten_manufacturer_data(&data),
        _ => Vec::new(),
    };
    let local_name = match device.name().await {
        Ok(Some(name)) => name.into_bytes(),
        _ => Vec::new(),
    };

    Discovery {
        advertisement: Advertisement {
            id,
            manufacturer_data,
            local_name,
        },
        peripheral: Arc::new(BluezPeripheral { device }),
    }
}

// BlueZ splits the company identifier out of the raw advertisement; the wire
// protocol carries the original byte form, so stitch it back together.
fn flatten_manufacturer_data(data: &HashMap<u16, Vec<u8>>) -> Vec<u8> {
    let mut company_ids: Vec<u16> = data.keys().copied().collect();
    company_ids.sort_unstable();

    let mut raw = Vec::new();
    for company_id in company_ids {
        raw.extend_from_slice(&company_id.to_le_bytes());
        raw.extend_from_slice(&data[&company_id]);
    }
    raw
}

struct BluezPeripheral {
    device: Device,
}

#[async_trait]
impl Peripheral for BluezPeripheral {
    fn id(&self) -> String {
        self.device.address().to_string()
    }

    async fn connect(&self) -> Result<()> {
        if !self.device.is_connected().await? {
            self.device.connect().await?;
        }
        Ok(())
    }

    async fn discover_characteristics(
        &self,
        service: Uuid,
        uuids: &[Uuid],
    ) -> Result<Vec<Arc<dyn Characteristic>>> {
        for candidate in self.device.services().await? {
            if candidate.uuid().await? != service {
                continue;
            }

            let available = candidate.characteristics().await?;
            let mut resolved: Vec<Arc<dyn Characteristic>> = Vec::with_capacity(uuids.len());
            for wanted in uuids {
                let mut found = None;
                for characteristic in &available {
                    if characteristic.uuid().await? == *wanted {
                        found = Some(characteristic.clone());
                        break;
                    }
                }
                let characteristic = found.ok_or_else(|| {
                    anyhow!("characteristic {} not found on {}", wanted, self.id())
                })?;
                resolved.push(Arc::new(BluezCharacteristic { characteristic }));
            }
            return Ok(resolved);
        }

        bail!("service {} not found on {}", service, self.id())
    }

    async fn disconnect(&self) -> Result<()> {
        self.device.disconnect().await?;
        Ok(())
    }
}

struct BluezCharacteristic {
    characteristic: bluer::gatt::remote::Characteristic,
}

#[async_trait]
impl Characteristic for BluezCharacteristic {
    async fn subscribe(&self) -> Result<BoxStream<'static, Vec<u8>>> {
        let notifications = self.characteristic.notify().await?;
        Ok(notifications.boxed())
    }

    async fn write(&self, payload: &[u8]) -> Result<()> {
        self.characteristic.write(payload).await?;
        Ok(())
    }
}
