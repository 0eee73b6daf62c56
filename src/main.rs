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

//! Anki Drive Gateway Daemon

use anyhow::Result;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use anki_gateway::ble::BluezAdapter;
use anki_gateway::config::Config;
use anki_gateway::gateway::{Bridge, GatewayServer};
use anki_gateway::registry::VehicleRegistry;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("anki_gateway=info".parse().unwrap()),
        )
        .init();

    info!("Starting Anki gateway v{}...", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let config = Config::load()?;
    info!("Configuration loaded");

    // Bring up the shared BLE layer
    let adapter = Arc::new(BluezAdapter::new().await?);
    let registry = VehicleRegistry::new();
    let bridge = Arc::new(
        Bridge::new(adapter, registry).with_timings(config.scan_window(), config.connect_timeout()),
    );

    let server = GatewayServer::bind(("0.0.0.0", config.server.port), bridge).await?;

    tokio::select! {
        result = server.run() => result,
        _ = tokio::signal::ctrl_c() => {
            info!("Shutdown signal received");
            Ok(())
        }
    }
}
