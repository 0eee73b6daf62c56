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

//! TCP server implementation.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use tokio::net::{TcpListener, ToSocketAddrs};
use tracing::{error, info};

use super::session::ClientSession;
use super::Bridge;

/// Accepts clients and hands each one its own session.
pub struct GatewayServer {
    bridge: Arc<Bridge>,
    listener: TcpListener,
}

impl GatewayServer {
    pub async fn bind(addr: impl ToSocketAddrs, bridge: Arc<Bridge>) -> Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        info!("Gateway listening on {}", listener.local_addr()?);
        Ok(Self { bridge, listener })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Accept loop. A misbehaving client never takes the server down.
    pub async fn run(self) -> Result<()> {
        loop {
            match self.listener.accept().await {
                Ok((stream, remote_addr)) => {
                    info!("Connection from: {}", remote_addr);
                    let session = ClientSession::new(self.bridge.clone());
                    tokio::spawn(async move {
                        if let Err(err) = session.run(stream).await {
                            error!("Session error: {}", err);
                        }
                    });
                }
                Err(err) => {
                    error!("Accept error: {}", err);
                    // Continue listening despite errors
                    tokio::time::sleep(std::time::Duration::from_secs(1)).await;
                }
            }
        }
    }
}
