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

//! Wire grammar for the line protocol.
//!
//! Commands are semicolon-delimited tokens, one per line. Responses are
//! single `\n`-terminated lines.

/// Keyword commands that answer with `<KEYWORD>;ERROR` on bad arity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Keyword {
    Connect,
    Disconnect,
}

impl Keyword {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Connect => "CONNECT",
            Self::Disconnect => "DISCONNECT",
        }
    }

    /// The error line this keyword reports for a rejected command.
    pub fn error(&self) -> Response {
        match self {
            Self::Connect => Response::ConnectError,
            Self::Disconnect => Response::DisconnectError,
        }
    }
}

/// One parsed client line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Scan,
    Connect(String),
    Disconnect(String),
    /// Two-token line that is not a keyword: a raw write to a vehicle.
    RawWrite { id: String, payload_hex: String },
    /// Keyword command with the wrong number of arguments.
    Malformed(Keyword),
    /// Anything else; silently dropped.
    Ignored,
}

impl Command {
    /// Parse one trimmed line.
    pub fn parse(line: &str) -> Self {
        let tokens: Vec<&str> = line.split(';').collect();
        match tokens[0] {
            // Extra arguments after SCAN are tolerated.
            "SCAN" => Self::Scan,
            "CONNECT" => match tokens.as_slice() {
                [_, id] => Self::Connect((*id).to_owned()),
                _ => Self::Malformed(Keyword::Connect),
            },
            "DISCONNECT" => match tokens.as_slice() {
                [_, id] => Self::Disconnect((*id).to_owned()),
                _ => Self::Malformed(Keyword::Disconnect),
            },
            "" => Self::Ignored,
            id => match tokens.as_slice() {
                [_, payload_hex] => Self::RawWrite {
                    id: id.to_owned(),
                    payload_hex: (*payload_hex).to_owned(),
                },
                _ => Self::Ignored,
            },
        }
    }
}

/// One server response line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    ScanResult {
        id: String,
        manufacturer_data: Vec<u8>,
        local_name: Vec<u8>,
    },
    ScanCompleted,
    ConnectSuccess,
    ConnectError,
    DisconnectSuccess,
    DisconnectError,
    /// Unsolicited telemetry forwarded from a connected vehicle.
    Notification { id: String, payload: Vec<u8> },
}

impl Response {
    /// Render as a single newline-terminated wire line.
    pub fn to_line(&self) -> String {
        match self {
            Self::ScanResult {
                id,
                manufacturer_data,
                local_name,
            } => format!(
                "SCAN;{};{};{}\n",
                id,
                hex::encode(manufacturer_data),
                hex::encode(local_name)
            ),
            Self::ScanCompleted => "SCAN;COMPLETED\n".to_owned(),
            Self::ConnectSuccess => "CONNECT;SUCCESS\n".to_owned(),
            Self::ConnectError => "CONNECT;ERROR\n".to_owned(),
            Self::DisconnectSuccess => "DISCONNECT;SUCCESS\n".to_owned(),
            Self::DisconnectError => "DISCONNECT;ERROR\n".to_owned(),
            Self::Notification { id, payload } => format!("{};{}\n", id, hex::encode(payload)),
        }
    }
}
