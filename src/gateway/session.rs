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

//! Per-client session handling.

use std::collections::HashSet;
use std::sync::Arc;

use anyhow::Result;
use parking_lot::Mutex;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use super::connect::ConnectionCoordinator;
use super::protocol::Command;
use super::protocol::Response;
use super::scan::ScanCoordinator;
use super::Bridge;

/// Outbound line channel shared with the session's background tasks.
pub type LineSender = mpsc::UnboundedSender<String>;

/// Vehicles connected by this session, shared with its handshake tasks.
pub type OwnedVehicles = Arc<Mutex<HashSet<String>>>;

/// One TCP client.
pub struct ClientSession {
    bridge: Arc<Bridge>,
    owned: OwnedVehicles,
}

impl ClientSession {
    pub fn new(bridge: Arc<Bridge>) -> Self {
        Self {
            bridge,
            owned: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    /// Run the session until the client goes away, then tear down every
    /// vehicle it connected.
    pub async fn run(self, stream: TcpStream) -> Result<()> {
        let (reader, mut writer) = stream.into_split();

        // Coordinator and forwarder tasks hand lines to this channel instead
        // of sharing the socket half.
        let (line_tx, mut line_rx) = mpsc::unbounded_channel::<String>();
        tokio::spawn(async move {
            while let Some(line) = line_rx.recv().await {
                if let Err(err) = writer.write_all(line.as_bytes()).await {
                    debug!("Client write failed: {}", err);
                    break;
                }
            }
        });

        let mut reader = BufReader::new(reader);
        let mut line_buf = String::new();

        loop {
            line_buf.clear();
            match reader.read_line(&mut line_buf).await {
                Ok(0) => {
                    info!("Connection closed by client");
                    break;
                }
                Ok(_) => {
                    let line = line_buf.trim();
                    if !line.is_empty() {
                        debug!("Received: {}", line);
                    }
                    self.handle_line(line, &line_tx);
                }
                Err(err) => {
                    // The client is already gone; nothing to report back.
                    error!("Read error (client disconnected?): {}", err);
                    break;
                }
            }
        }

        self.teardown().await;
        Ok(())
    }

    fn handle_line(&self, line: &str, line_tx: &LineSender) {
        match Command::parse(line) {
            Command::Scan => {
                let scan = ScanCoordinator::new(self.bridge.clone());
                let out = line_tx.clone();
                tokio::spawn(async move { scan.run(out).await });
            }
            Command::Connect(id) => {
                ConnectionCoordinator::new(self.bridge.clone()).begin(
                    id,
                    line_tx.clone(),
                    self.owned.clone(),
                );
            }
            Command::Disconnect(id) => self.handle_disconnect(&id, line_tx),
            Command::RawWrite { id, payload_hex } => self.handle_raw_write(&id, &payload_hex),
            Command::Malformed(keyword) => {
                warn!("Malformed {} command: {:?}", keyword.as_str(), line);
                let _ = line_tx.send(keyword.error().to_line());
            }
            Command::Ignored => {}
        }
    }

    fn handle_disconnect(&self, id: &str, line_tx: &LineSender) {
        let Some(peripheral) = self.bridge.registry.peripheral(id) else {
            warn!("DISCONNECT for unknown vehicle {}", id);
            let _ = line_tx.send(Response::DisconnectError.to_line());
            return;
        };

        self.owned.lock().remove(id);
        self.bridge.registry.mark_disconnected(id);

        // Fire and forget: the response does not wait for the radio.
        let id = id.to_owned();
        tokio::spawn(async move {
            if let Err(err) = peripheral.disconnect().await {
                warn!("Disconnect from {} failed: {}", id, err);
            }
        });

        let _ = line_tx.send(Response::DisconnectSuccess.to_line());
    }

    fn handle_raw_write(&self, id: &str, payload_hex: &str) {
        let Some(writer) = self.bridge.registry.connected_writer(id) else {
            debug!("Raw write for unknown or unconnected vehicle {}", id);
            return;
        };

        let payload = match hex::decode(payload_hex) {
            Ok(payload) => payload,
            Err(err) => {
                debug!("Undecodable payload for {}: {}", id, err);
                return;
            }
        };

        let id = id.to_owned();
        tokio::spawn(async move {
            if let Err(err) = writer.write(&payload).await {
                warn!("Write to {} failed: {}", id, err);
            }
        });
    }

    /// Disconnect everything this session connected. Draining the owned set
    /// first makes a second call a no-op.
    pub async fn teardown(&self) {
        let owned: Vec<String> = {
            let mut owned = self.owned.lock();
            owned.drain().collect()
        };

        for id in owned {
            info!("Session closing; disconnecting {}", id);
            let peripheral = self.bridge.registry.peripheral(&id);
            self.bridge.registry.mark_disconnected(&id);
            if let Some(peripheral) = peripheral {
                if let Err(err) = peripheral.disconnect().await {
                    warn!("Teardown disconnect of {} failed: {}", id, err);
                }
            }
        }
    }
}
