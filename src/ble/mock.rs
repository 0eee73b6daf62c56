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

//! In-memory BLE backend for tests.
//!
//! Fixture peripherals are scripted up front; connect latency, written
//! payloads and disconnect counts are all observable afterwards.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use futures::stream::{self, BoxStream};
use futures::StreamExt;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::time::sleep;
use uuid::Uuid;

use super::constants::WRITER_CHARACTERISTIC_UUID;
use super::{Advertisement, BleAdapter, Characteristic, Discovery, Peripheral};

/// Scripted radio: every discovery window reports the registered fixtures
/// once, then stays open until dropped.
#[derive(Default)]
pub struct MockAdapter {
    devices: Mutex<Vec<Arc<MockPeripheral>>>,
}

impl MockAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a peripheral that future discovery windows will report.
    pub fn add_device(&self, device: Arc<MockPeripheral>) {
        self.devices.lock().push(device);
    }
}

#[async_trait]
impl BleAdapter for MockAdapter {
    async fn discover(&self) -> Result<BoxStream<'static, Discovery>> {
        let discoveries: Vec<Discovery> = self
            .devices
            .lock()
            .iter()
            .map(|device| device.discovery())
            .collect();

        Ok(stream::iter(discoveries).chain(stream::pending()).boxed())
    }
}

#[derive(Default)]
struct MockPeripheralState {
    connect_calls: AtomicUsize,
    disconnect_calls: AtomicUsize,
    writes: Mutex<Vec<Vec<u8>>>,
    notify_tx: Mutex<Option<mpsc::UnboundedSender<Vec<u8>>>>,
}

/// One fake vehicle.
pub struct MockPeripheral {
    advertisement: Advertisement,
    connect_delay: Duration,
    state: Arc<MockPeripheralState>,
}

impl MockPeripheral {
    pub fn new(id: &str) -> Self {
        Self {
            advertisement: Advertisement {
                id: id.to_owned(),
                manufacturer_data: vec![0xbe, 0xef],
                local_name: b"Drive".to_vec(),
            },
            connect_delay: Duration::ZERO,
            state: Arc::new(MockPeripheralState::default()),
        }
    }

    pub fn with_local_name(mut self, local_name: &[u8]) -> Self {
        self.advertisement.local_name = local_name.to_vec();
        self
    }

    pub fn with_manufacturer_data(mut self, manufacturer_data: &[u8]) -> Self {
        self.advertisement.manufacturer_data = manufacturer_data.to_vec();
        self
    }

    /// Stall the connect step, for driving the handshake deadline.
    pub fn with_connect_delay(mut self, delay: Duration) -> Self {
        self.connect_delay = delay;
        self
    }

    /// The discovery event this peripheral produces during a scan window.
    pub fn discovery(self: &Arc<Self>) -> Discovery {
        Discovery {
            advertisement: self.advertisement.clone(),
            peripheral: self.clone() as Arc<dyn Peripheral>,
        }
    }

    pub fn connect_calls(&self) -> usize {
        self.state.connect_calls.load(Ordering::SeqCst)
    }

    pub fn disconnect_calls(&self) -> usize {
        self.state.disconnect_calls.load(Ordering::SeqCst)
    }

    /// Payloads written to the command characteristic so far.
    pub fn written(&self) -> Vec<Vec<u8>> {
        self.state.writes.lock().clone()
    }

    /// Push a telemetry payload to the subscribed reader. Returns false when
    /// nothing is subscribed.
    pub fn notify(&self, payload: &[u8]) -> bool {
        match &*self.state.notify_tx.lock() {
            Some(tx) => tx.send(payload.to_vec()).is_ok(),
            None => false,
        }
    }
}

#[async_trait]
impl Peripheral for MockPeripheral {
    fn id(&self) -> String {
        self.advertisement.id.clone()
    }

    async fn connect(&self) -> Result<()> {
        self.state.connect_calls.fetch_add(1, Ordering::SeqCst);
        if !self.connect_delay.is_zero() {
            sleep(self.connect_delay).await;
        }
        Ok(())
    }

    async fn discover_characteristics(
        &self,
        _service: Uuid,
        uuids: &[Uuid],
    ) -> Result<Vec<Arc<dyn Characteristic>>> {
        Ok(uuids
            .iter()
            .map(|uuid| {
                let role = if *uuid == WRITER_CHARACTERISTIC_UUID {
                    Role::Writer
                } else {
                    Role::Reader
                };
                Arc::new(MockCharacteristic {
                    role,
                    state: self.state.clone(),
                }) as Arc<dyn Characteristic>
            })
            .collect())
    }

    async fn disconnect(&self) -> Result<()> {
        self.state.disconnect_calls.fetch_add(1, Ordering::SeqCst);
        // Ends the notification stream, like an adapter-reported disconnect.
        *self.state.notify_tx.lock() = None;
        Ok(())
    }
}

#[derive(Clone, Copy)]
enum Role {
    Writer,
    Reader,
}

struct MockCharacteristic {
    role: Role,
    state: Arc<MockPeripheralState>,
}

#[async_trait]
impl Characteristic for MockCharacteristic {
    async fn subscribe(&self) -> Result<BoxStream<'static, Vec<u8>>> {
        match self.role {
            Role::Reader => {
                let (tx, rx) = mpsc::unbounded_channel();
                *self.state.notify_tx.lock() = Some(tx);
                let payloads = stream::unfold(rx, |mut rx| async move {
                    rx.recv().await.map(|payload| (payload, rx))
                });
                Ok(payloads.boxed())
            }
            Role::Writer => Err(anyhow!("command characteristic does not notify")),
        }
    }

    async fn write(&self, payload: &[u8]) -> Result<()> {
        match self.role {
            Role::Writer => {
                self.state.writes.lock().push(payload.to_vec());
                Ok(())
            }
            Role::Reader => Err(anyhow!("telemetry characteristic is not writable")),
        }
    }
}
