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

//! TCP gateway module.
//!
//! Accepts line-protocol clients and bridges their commands onto the shared
//! BLE layer through the scan and connection coordinators.

mod connect;
mod protocol;
mod scan;
mod server;
mod session;

pub use connect::{ConnectionCoordinator, PendingAttempt};
pub use protocol::{Command, Keyword, Response};
pub use scan::ScanCoordinator;
pub use server::GatewayServer;
pub use session::{ClientSession, LineSender, OwnedVehicles};

use std::sync::Arc;
use std::time::Duration;

use crate::ble::BleAdapter;
use crate::registry::VehicleRegistry;

/// How long one scan window stays open.
pub const DEFAULT_SCAN_WINDOW: Duration = Duration::from_millis(2000);

/// How long a connect handshake may take before the attempt reports failure.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_millis(500);

/// Shared services handed to every session and coordinator at construction.
pub struct Bridge {
    pub adapter: Arc<dyn BleAdapter>,
    pub registry: Arc<VehicleRegistry>,
    pub scan_window: Duration,
    pub connect_timeout: Duration,
}

impl Bridge {
    pub fn new(adapter: Arc<dyn BleAdapter>, registry: Arc<VehicleRegistry>) -> Self {
        Self {
            adapter,
            registry,
            scan_window: DEFAULT_SCAN_WINDOW,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }

    pub fn with_timings(mut self, scan_window: Duration, connect_timeout: Duration) -> Self {
        self.scan_window = scan_window;
        self.connect_timeout = connect_timeout;
        self
    }
}
