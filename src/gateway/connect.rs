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

//! Connection handshake coordination.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{anyhow, Result};
use futures::StreamExt;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::ble::constants::{
    READER_CHARACTERISTIC_UUID, VEHICLE_SERVICE_UUID, WRITER_CHARACTERISTIC_UUID,
};
use crate::ble::Peripheral;

use super::protocol::Response;
use super::session::{LineSender, OwnedVehicles};
use super::Bridge;

/// Single-resolution latch for one CONNECT attempt. Whoever flips it first
/// owns the terminal response line; everyone else stays quiet.
#[derive(Debug, Default)]
pub struct PendingAttempt {
    resolved: AtomicBool,
}

impl PendingAttempt {
    /// Returns true exactly once.
    pub fn try_resolve(&self) -> bool {
        !self.resolved.swap(true, Ordering::SeqCst)
    }
}

/// Drives connect, characteristic discovery and notify subscription for one
/// vehicle, racing the whole handshake against a deadline.
pub struct ConnectionCoordinator {
    bridge: Arc<Bridge>,
}

impl ConnectionCoordinator {
    pub fn new(bridge: Arc<Bridge>) -> Self {
        Self { bridge }
    }

    /// Start a CONNECT attempt. Unknown ids are answered immediately;
    /// otherwise the handshake and its deadline are spawned and race for the
    /// terminal response.
    pub fn begin(self, id: String, out: LineSender, owned: OwnedVehicles) {
        let Some(peripheral) = self.bridge.registry.peripheral(&id) else {
            warn!("CONNECT for unknown vehicle {}", id);
            let _ = out.send(Response::ConnectError.to_line());
            return;
        };

        info!("Connecting to {}", id);
        self.bridge.registry.mark_connecting(&id);
        let attempt = Arc::new(PendingAttempt::default());

        let deadline = self.bridge.connect_timeout;
        {
            let attempt = attempt.clone();
            let out = out.clone();
            let id = id.clone();
            tokio::spawn(async move {
                sleep(deadline).await;
                if attempt.try_resolve() {
                    warn!("Connect to {} timed out after {:?}", id, deadline);
                    let _ = out.send(Response::ConnectError.to_line());
                }
            });
        }

        tokio::spawn(async move {
            match self.handshake(&id, peripheral, &out, &owned).await {
                Ok(()) => {
                    if attempt.try_resolve() {
                        info!("Connected to {}", id);
                        let _ = out.send(Response::ConnectSuccess.to_line());
                    } else {
                        // The deadline already answered. The subscription and
                        // ownership stay in effect anyway; only the response
                        // line is suppressed.
                        warn!("Handshake with {} finished after the deadline", id);
                    }
                }
                Err(err) => {
                    // A failed step is not a terminal trigger; the deadline
                    // reports the error.
                    warn!("Handshake with {} failed: {}", id, err);
                }
            }
        });
    }

    /// Connect, resolve the characteristic pair and subscribe the reader,
    /// forwarding every notification as an `<id>;<hex>` line. Registry
    /// attachment and session ownership happen here, response or not.
    async fn handshake(
        &self,
        id: &str,
        peripheral: Arc<dyn Peripheral>,
        out: &LineSender,
        owned: &OwnedVehicles,
    ) -> Result<()> {
        peripheral.connect().await?;

        let characteristics = peripheral
            .discover_characteristics(
                VEHICLE_SERVICE_UUID,
                &[WRITER_CHARACTERISTIC_UUID, READER_CHARACTERISTIC_UUID],
            )
            .await?;
        // Writer is index 0 and reader index 1 by protocol convention.
        let writer = characteristics
            .first()
            .cloned()
            .ok_or_else(|| anyhow!("writer characteristic missing on {}", id))?;
        let reader = characteristics
            .get(1)
            .cloned()
            .ok_or_else(|| anyhow!("reader characteristic missing on {}", id))?;

        let mut notifications = reader.subscribe().await?;
        {
            let out = out.clone();
            let id = id.to_owned();
            tokio::spawn(async move {
                while let Some(payload) = notifications.next().await {
                    let line = Response::Notification {
                        id: id.clone(),
                        payload,
                    }
                    .to_line();
                    if out.send(line).is_err() {
                        break;
                    }
                }
                debug!("Notification stream for {} ended", id);
            });
        }

        self.bridge
            .registry
            .attach_characteristics(id, writer, reader);
        owned.lock().insert(id.to_owned());
        Ok(())
    }
}
