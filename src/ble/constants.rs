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

//! GATT identifiers and advertisement fallbacks for Anki Drive vehicles.

use uuid::Uuid;

/// Anki Drive vehicle GATT service UUID.
pub const VEHICLE_SERVICE_UUID: Uuid = Uuid::from_u128(0xbe15beef_6186_407e_8381_0bd89c4d8df4);

/// Command characteristic (host to vehicle). Index 0 by protocol convention.
pub const WRITER_CHARACTERISTIC_UUID: Uuid =
    Uuid::from_u128(0xbe15bee0_6186_407e_8381_0bd89c4d8df4);

/// Telemetry characteristic (vehicle to host). Index 1 by protocol
/// convention.
pub const READER_CHARACTERISTIC_UUID: Uuid =
    Uuid::from_u128(0xbe15bee1_6186_407e_8381_0bd89c4d8df4);

// Some vehicles advertise without a local name. These substitutes keep the
// scan output well-formed; which one applies is keyed on the leading
// character of the device identifier. Cosmetic only.
const FALLBACK_NAME_E: &[u8] = b"\x01`0\x01    Drive\x00";
const FALLBACK_NAME_DEFAULT: &[u8] = b"\x10`0\x01    Drive\x00";

/// Substitute local name for a peripheral that advertised none.
pub fn fallback_local_name(id: &str) -> &'static [u8] {
    match id.chars().next().map(|c| c.to_ascii_lowercase()) {
        Some('e') => FALLBACK_NAME_E,
        _ => FALLBACK_NAME_DEFAULT,
    }
}
