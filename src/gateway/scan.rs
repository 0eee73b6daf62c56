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

//! Scan window coordination.

use std::sync::Arc;

use futures::StreamExt;
use tokio::time::sleep;
use tracing::{info, warn};

use super::protocol::Response;
use super::session::LineSender;
use super::Bridge;

/// One discovery window on behalf of one client.
pub struct ScanCoordinator {
    bridge: Arc<Bridge>,
}

impl ScanCoordinator {
    pub fn new(bridge: Arc<Bridge>) -> Self {
        Self { bridge }
    }

    /// Stream discoveries to the client for the configured window, then stop
    /// and emit the completion line. Exactly one `SCAN;COMPLETED` goes out no
    /// matter what the radio does.
    pub async fn run(self, out: LineSender) {
        let deadline = sleep(self.bridge.scan_window);
        tokio::pin!(deadline);

        match self.bridge.adapter.discover().await {
            Ok(mut discoveries) => {
                info!("Scan window open for {:?}", self.bridge.scan_window);
                loop {
                    tokio::select! {
                        _ = &mut deadline => break,
                        discovery = discoveries.next() => {
                            let Some(discovery) = discovery else {
                                // Radio stopped reporting; wait out the window.
                                deadline.as_mut().await;
                                break;
                            };
                            let advertisement =
                                self.bridge.registry.record_discovery(discovery);
                            info!("Discovered {}", advertisement.id);
                            let _ = out.send(
                                Response::ScanResult {
                                    id: advertisement.id,
                                    manufacturer_data: advertisement.manufacturer_data,
                                    local_name: advertisement.local_name,
                                }
                                .to_line(),
                            );
                        }
                    }
                }
                // Dropping the stream deregisters the discovery listener.
                drop(discoveries);
            }
            Err(err) => {
                // No fast failure path: the window runs out empty and the
                // client still gets its completion line.
                warn!("Could not start discovery: {}", err);
                deadline.as_mut().await;
            }
        }

        let _ = out.send(Response::ScanCompleted.to_line());
    }
}
