//! Socket-level tests of the gateway against the mock BLE backend.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::time::timeout;

use anki_gateway::ble::{MockAdapter, MockPeripheral};
use anki_gateway::gateway::{Bridge, GatewayServer};
use anki_gateway::registry::VehicleRegistry;

const SCAN_WINDOW: Duration = Duration::from_millis(100);
const CONNECT_TIMEOUT: Duration = Duration::from_millis(150);
const SLOW_HANDSHAKE: Duration = Duration::from_millis(400);

async fn start_gateway(adapter: Arc<MockAdapter>) -> (SocketAddr, Arc<VehicleRegistry>) {
    let registry = VehicleRegistry::new();
    let bridge =
        Arc::new(Bridge::new(adapter, registry.clone()).with_timings(SCAN_WINDOW, CONNECT_TIMEOUT));
    let server = GatewayServer::bind("127.0.0.1:0", bridge).await.unwrap();
    let addr = server.local_addr().unwrap();
    tokio::spawn(server.run());
    (addr, registry)
}

async fn connect_client(addr: SocketAddr) -> (BufReader<OwnedReadHalf>, OwnedWriteHalf) {
    let stream = TcpStream::connect(addr).await.unwrap();
    let (reader, writer) = stream.into_split();
    (BufReader::new(reader), writer)
}

async fn send_line(writer: &mut OwnedWriteHalf, line: &str) {
    writer
        .write_all(format!("{}\r\n", line).as_bytes())
        .await
        .unwrap();
}

async fn read_line(reader: &mut BufReader<OwnedReadHalf>) -> String {
    let mut line = String::new();
    timeout(Duration::from_secs(2), reader.read_line(&mut line))
        .await
        .expect("timed out waiting for a response line")
        .unwrap();
    line
}

/// Assert that no response line arrives for the given duration.
async fn assert_silent(reader: &mut BufReader<OwnedReadHalf>, quiet_for: Duration) {
    let mut line = String::new();
    let result = timeout(quiet_for, reader.read_line(&mut line)).await;
    assert!(result.is_err(), "unexpected line: {:?}", line);
}

async fn wait_for(mut condition: impl FnMut() -> bool) {
    for _ in 0..100 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not met within 1s");
}

/// Drive one scan window and return the SCAN result lines (completion line
/// excluded).
async fn scan(
    reader: &mut BufReader<OwnedReadHalf>,
    writer: &mut OwnedWriteHalf,
) -> Vec<String> {
    send_line(writer, "SCAN").await;
    let mut results = Vec::new();
    loop {
        let line = read_line(reader).await;
        if line == "SCAN;COMPLETED\n" {
            return results;
        }
        results.push(line);
    }
}

#[tokio::test]
async fn test_connect_unknown_device() {
    let (addr, _) = start_gateway(Arc::new(MockAdapter::new())).await;
    let (mut reader, mut writer) = connect_client(addr).await;

    send_line(&mut writer, "CONNECT;AA:BB:CC:DD:EE:FF").await;

    assert_eq!(read_line(&mut reader).await, "CONNECT;ERROR\n");
    assert_silent(&mut reader, Duration::from_millis(250)).await;
}

#[tokio::test]
async fn test_malformed_commands_never_reach_the_radio() {
    let adapter = Arc::new(MockAdapter::new());
    let car = Arc::new(MockPeripheral::new("d4:48:94:88:04:a1"));
    adapter.add_device(car.clone());
    let (addr, _) = start_gateway(adapter).await;
    let (mut reader, mut writer) = connect_client(addr).await;

    send_line(&mut writer, "CONNECT").await;
    assert_eq!(read_line(&mut reader).await, "CONNECT;ERROR\n");

    send_line(&mut writer, "CONNECT;a;b").await;
    assert_eq!(read_line(&mut reader).await, "CONNECT;ERROR\n");

    send_line(&mut writer, "DISCONNECT").await;
    assert_eq!(read_line(&mut reader).await, "DISCONNECT;ERROR\n");

    send_line(&mut writer, "DISCONNECT;a;b").await;
    assert_eq!(read_line(&mut reader).await, "DISCONNECT;ERROR\n");

    assert_eq!(car.connect_calls(), 0);
    assert_eq!(car.disconnect_calls(), 0);
}

#[tokio::test]
async fn test_scan_reports_devices_then_completes() {
    let adapter = Arc::new(MockAdapter::new());
    adapter.add_device(Arc::new(
        MockPeripheral::new("d4:48:94:88:04:a1").with_manufacturer_data(&[0xbe, 0xef]),
    ));
    // No advertised name: the gateway substitutes the static fallback for
    // identifiers starting with 'e'.
    adapter.add_device(Arc::new(
        MockPeripheral::new("ed:8a:23:0b:c4:21")
            .with_manufacturer_data(&[0xbe, 0xef, 0x02])
            .with_local_name(b""),
    ));
    let (addr, registry) = start_gateway(adapter).await;
    let (mut reader, mut writer) = connect_client(addr).await;

    let results = scan(&mut reader, &mut writer).await;

    assert_eq!(
        results,
        vec![
            "SCAN;d4:48:94:88:04:a1;beef;4472697665\n".to_owned(),
            "SCAN;ed:8a:23:0b:c4:21;beef02;0160300120202020447269766500\n".to_owned(),
        ]
    );
    assert!(registry.contains("d4:48:94:88:04:a1"));
    assert!(registry.contains("ed:8a:23:0b:c4:21"));
}

#[tokio::test]
async fn test_connect_write_notify_disconnect() {
    let adapter = Arc::new(MockAdapter::new());
    let car = Arc::new(MockPeripheral::new("d4:48:94:88:04:a1"));
    adapter.add_device(car.clone());
    let (addr, _) = start_gateway(adapter).await;
    let (mut reader, mut writer) = connect_client(addr).await;

    scan(&mut reader, &mut writer).await;

    send_line(&mut writer, "CONNECT;d4:48:94:88:04:a1").await;
    assert_eq!(read_line(&mut reader).await, "CONNECT;SUCCESS\n");
    assert_eq!(car.connect_calls(), 1);

    // Telemetry flows as unsolicited `<id>;<hex>` lines.
    assert!(car.notify(&[0x01, 0x02, 0xff]));
    assert_eq!(read_line(&mut reader).await, "d4:48:94:88:04:a1;0102ff\n");

    // Raw writes are forwarded byte for byte and never answered.
    send_line(&mut writer, "d4:48:94:88:04:a1;DEADBEEF01020304").await;
    wait_for(|| !car.written().is_empty()).await;
    assert_eq!(
        car.written(),
        vec![vec![0xde, 0xad, 0xbe, 0xef, 0x01, 0x02, 0x03, 0x04]]
    );

    send_line(&mut writer, "DISCONNECT;d4:48:94:88:04:a1").await;
    assert_eq!(read_line(&mut reader).await, "DISCONNECT;SUCCESS\n");
    wait_for(|| car.disconnect_calls() == 1).await;
}

#[tokio::test]
async fn test_connect_timeout_yields_single_error() {
    let adapter = Arc::new(MockAdapter::new());
    let car = Arc::new(
        MockPeripheral::new("d4:48:94:88:04:a1").with_connect_delay(SLOW_HANDSHAKE),
    );
    adapter.add_device(car.clone());
    let (addr, _) = start_gateway(adapter).await;
    let (mut reader, mut writer) = connect_client(addr).await;

    scan(&mut reader, &mut writer).await;

    send_line(&mut writer, "CONNECT;d4:48:94:88:04:a1").await;
    assert_eq!(read_line(&mut reader).await, "CONNECT;ERROR\n");

    // The handshake finishes well inside this quiet period; no second
    // terminal line may appear for the attempt.
    assert_silent(&mut reader, SLOW_HANDSHAKE + Duration::from_millis(200)).await;
}

#[tokio::test]
async fn test_late_handshake_still_attaches() {
    let adapter = Arc::new(MockAdapter::new());
    let car = Arc::new(
        MockPeripheral::new("d4:48:94:88:04:a1").with_connect_delay(SLOW_HANDSHAKE),
    );
    adapter.add_device(car.clone());
    let (addr, _) = start_gateway(adapter).await;
    let (mut reader, mut writer) = connect_client(addr).await;

    scan(&mut reader, &mut writer).await;

    send_line(&mut writer, "CONNECT;d4:48:94:88:04:a1").await;
    assert_eq!(read_line(&mut reader).await, "CONNECT;ERROR\n");

    // The reported failure notwithstanding, the handshake keeps going and
    // eventually subscribes the reader; telemetry then reaches the client.
    wait_for(|| car.notify(&[0x42])).await;
    assert_eq!(read_line(&mut reader).await, "d4:48:94:88:04:a1;42\n");

    // The late attach also registered ownership: closing the session must
    // release the vehicle.
    drop(reader);
    drop(writer);
    wait_for(|| car.disconnect_calls() == 1).await;
}

#[tokio::test]
async fn test_session_close_releases_owned_vehicles() {
    let adapter = Arc::new(MockAdapter::new());
    let car = Arc::new(MockPeripheral::new("d4:48:94:88:04:a1"));
    adapter.add_device(car.clone());
    let (addr, _) = start_gateway(adapter).await;
    let (mut reader, mut writer) = connect_client(addr).await;

    scan(&mut reader, &mut writer).await;
    send_line(&mut writer, "CONNECT;d4:48:94:88:04:a1").await;
    assert_eq!(read_line(&mut reader).await, "CONNECT;SUCCESS\n");

    drop(reader);
    drop(writer);

    wait_for(|| car.disconnect_calls() == 1).await;
    tokio::time::sleep(Duration::from_millis(150)).await;
    assert_eq!(car.disconnect_calls(), 1);
}

#[tokio::test]
async fn test_raw_write_requires_connected_vehicle() {
    let adapter = Arc::new(MockAdapter::new());
    let car = Arc::new(MockPeripheral::new("d4:48:94:88:04:a1"));
    adapter.add_device(car.clone());
    let (addr, _) = start_gateway(adapter).await;
    let (mut reader, mut writer) = connect_client(addr).await;

    scan(&mut reader, &mut writer).await;

    // Known but not connected: dropped without a response.
    send_line(&mut writer, "d4:48:94:88:04:a1;ff").await;
    // Unknown id: same.
    send_line(&mut writer, "00:00:00:00:00:00;ff").await;

    assert_silent(&mut reader, Duration::from_millis(250)).await;
    assert!(car.written().is_empty());
}

#[tokio::test]
async fn test_disconnect_unknown_device() {
    let (addr, _) = start_gateway(Arc::new(MockAdapter::new())).await;
    let (mut reader, mut writer) = connect_client(addr).await;

    send_line(&mut writer, "DISCONNECT;AA:BB:CC:DD:EE:FF").await;

    assert_eq!(read_line(&mut reader).await, "DISCONNECT;ERROR\n");
}
