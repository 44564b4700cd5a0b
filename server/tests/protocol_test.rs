//! End-to-end protocol tests over loopback TCP against the in-memory store.

#![allow(clippy::expect_used)] // Test code uses expect for clear failure messages
#![allow(clippy::unwrap_used)]

use bytes::BytesMut;
use seatbook_core::frame::FrameCodec;
use seatbook_core::{InventoryStore, NewSlot, Reply, Request, SlotId, Status};
use seatbook_server::config::ServerConfig;
use seatbook_server::{Client, ClientError, Server};
use seatbook_testing::InMemoryInventoryStore;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio_util::codec::Encoder;

struct Harness {
    addr: SocketAddr,
    store: InMemoryInventoryStore,
    stop: Option<oneshot::Sender<()>>,
    server: Option<JoinHandle<()>>,
}

impl Harness {
    async fn start() -> Self {
        seatbook_testing::init_test_tracing();
        let store = InMemoryInventoryStore::new();
        let config = ServerConfig {
            port: 0,
            max_frame_bytes: 1024,
            ..ServerConfig::default()
        };
        let server = Server::bind(&config, Arc::new(store.clone()))
            .await
            .expect("bind server");
        let addr = server.local_addr();

        let (stop, stopped) = oneshot::channel();
        let server = tokio::spawn(server.run_until(async {
            let _ = stopped.await;
        }));

        Self {
            addr,
            store,
            stop: Some(stop),
            server: Some(server),
        }
    }

    async fn client(&self) -> Client {
        Client::connect(self.addr).await.expect("connect")
    }

    async fn slot(&self, name: &str, capacity: u32) -> SlotId {
        self.store
            .create_slot(NewSlot::new(name, capacity))
            .await
            .expect("seed slot")
    }

    async fn shutdown(mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        if let Some(server) = self.server.take() {
            tokio::time::timeout(Duration::from_secs(5), server)
                .await
                .expect("server stops in time")
                .expect("server task");
        }
    }
}

fn framed(request: &Request) -> BytesMut {
    let mut frame = BytesMut::new();
    FrameCodec::default()
        .encode(&request.encode().unwrap()[..], &mut frame)
        .unwrap();
    frame
}

async fn within<T>(future: impl std::future::Future<Output = T>) -> T {
    tokio::time::timeout(Duration::from_secs(5), future)
        .await
        .expect("reply in time")
}

#[tokio::test]
async fn booking_scenario() {
    let harness = Harness::start().await;
    let slot = harness.slot("Morning", 1).await;

    let mut alice = harness.client().await;
    let mut bob = harness.client().await;
    assert!(within(alice.register("555", "Alice", "pw")).await.unwrap().is_ok());
    assert!(within(bob.register("556", "Bob", "pw")).await.unwrap().is_ok());

    let inventory = within(alice.list_inventory()).await.unwrap();
    assert_eq!(inventory.count, Some(1));
    let listed = &inventory.slots.as_ref().unwrap()[0];
    assert_eq!((listed.id, listed.capacity, listed.booked), (slot, 1, 0));

    assert!(within(alice.book("555", slot)).await.unwrap().is_ok());
    let rejected = within(bob.book("556", slot)).await.unwrap();
    assert_eq!(rejected.status, Status::Err, "slot is full");

    let mine = within(alice.list_my_reservations("555")).await.unwrap();
    assert_eq!(mine.count, Some(1));
    let reservation = &mine.reservations.as_ref().unwrap()[0];
    assert_eq!(reservation.slot_name, "Morning");

    assert!(within(alice.cancel(reservation.id)).await.unwrap().is_ok());
    assert_eq!(
        within(alice.cancel(reservation.id)).await.unwrap(),
        Reply::err(),
        "a reservation is cancelled once"
    );

    let inventory = within(bob.list_inventory()).await.unwrap();
    assert_eq!(inventory.slots.unwrap()[0].booked, 0);
    assert!(within(bob.book("556", slot)).await.unwrap().is_ok());

    harness.shutdown().await;
}

#[tokio::test]
async fn register_and_login_scenario() {
    let harness = Harness::start().await;
    let mut client = harness.client().await;

    assert!(within(client.register("555", "Alice", "pw")).await.unwrap().is_ok());
    assert_eq!(
        within(client.register("555", "Alice", "pw")).await.unwrap(),
        Reply::err(),
        "phone already registered"
    );

    let login = within(client.login("555", "pw")).await.unwrap();
    assert_eq!(login.account_name.as_deref(), Some("Alice"));

    assert_eq!(within(client.login("555", "nope")).await.unwrap(), Reply::err());
    assert_eq!(within(client.login("999", "pw")).await.unwrap(), Reply::err());

    harness.shutdown().await;
}

#[tokio::test]
async fn empty_inventory_is_ok() {
    let harness = Harness::start().await;
    let mut client = harness.client().await;

    let reply = within(client.list_inventory()).await.unwrap();
    assert!(reply.is_ok());
    assert_eq!(reply.count, Some(0));
    assert_eq!(reply.slots, Some(Vec::new()));

    harness.shutdown().await;
}

#[tokio::test]
async fn pipelined_requests_are_answered_in_order() {
    let harness = Harness::start().await;
    let slot = harness.slot("Evening", 5).await;
    let mut client = harness.client().await;

    client
        .send(&Request::Register {
            phone: "555".to_string(),
            name: "Alice".to_string(),
            password: "pw".to_string(),
        })
        .await
        .unwrap();
    client
        .send(&Request::Book {
            phone: "999".to_string(),
            slot_id: slot,
        })
        .await
        .unwrap();
    client
        .send(&Request::Book {
            phone: "555".to_string(),
            slot_id: slot,
        })
        .await
        .unwrap();
    client.send(&Request::ListInventory).await.unwrap();

    let statuses = [
        within(client.receive()).await.unwrap(),
        within(client.receive()).await.unwrap(),
        within(client.receive()).await.unwrap(),
    ]
    .map(|reply| reply.status);
    assert_eq!(statuses, [Status::Ok, Status::Err, Status::Ok]);

    let inventory = within(client.receive()).await.unwrap();
    assert_eq!(inventory.slots.unwrap()[0].booked, 1);

    harness.shutdown().await;
}

#[tokio::test]
async fn frames_split_across_writes_are_reassembled() {
    let harness = Harness::start().await;
    let mut raw = TcpStream::connect(harness.addr).await.unwrap();

    let frame = framed(&Request::ListInventory);
    let (head, tail) = frame.split_at(3);
    raw.write_all(head).await.unwrap();
    raw.flush().await.unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    raw.write_all(tail).await.unwrap();

    let mut header = [0u8; 4];
    within(raw.read_exact(&mut header)).await.unwrap();
    let mut reply = vec![0u8; u32::from_be_bytes(header) as usize];
    within(raw.read_exact(&mut reply)).await.unwrap();
    assert!(Reply::decode(&reply).unwrap().is_ok());

    harness.shutdown().await;
}

#[tokio::test]
async fn malformed_message_keeps_connection_open() {
    let harness = Harness::start().await;
    let mut client = harness.client().await;

    client.send_raw(b"{\"type\":").await.unwrap();
    assert_eq!(within(client.receive()).await.unwrap(), Reply::err());

    client.send_raw(br#"{"type":"book","phone":"555"}"#).await.unwrap();
    assert_eq!(within(client.receive()).await.unwrap(), Reply::err());

    assert!(within(client.list_inventory()).await.unwrap().is_ok());

    harness.shutdown().await;
}

#[tokio::test]
async fn oversized_frame_closes_connection() {
    let harness = Harness::start().await;
    let mut client = harness.client().await;

    client.send_raw(&vec![b' '; 4096]).await.unwrap();
    let result = within(client.receive()).await;
    assert!(
        matches!(result, Err(ClientError::Closed | ClientError::Io(_))),
        "expected the server to hang up, got {result:?}"
    );

    // The server keeps serving everyone else.
    let mut other = harness.client().await;
    assert!(within(other.list_inventory()).await.unwrap().is_ok());

    harness.shutdown().await;
}

#[tokio::test]
async fn peer_that_never_reads_does_not_stall_others() {
    let harness = Harness::start().await;
    for i in 0..200 {
        harness.slot(&format!("Session {i:03} in the large hall"), 50).await;
    }

    // Each reply lists all 200 slots; thousands of them overrun the socket
    // buffers of a peer that never reads.
    let mut flood = TcpStream::connect(harness.addr).await.unwrap();
    let mut requests = BytesMut::new();
    for _ in 0..2000 {
        requests.extend_from_slice(&framed(&Request::ListInventory));
    }
    within(flood.write_all(&requests)).await.unwrap();
    tokio::time::sleep(Duration::from_millis(200)).await;

    let mut other = harness.client().await;
    let inventory = within(other.list_inventory()).await.unwrap();
    assert_eq!(inventory.count, Some(200));
    assert!(within(other.register("555", "Alice", "pw")).await.unwrap().is_ok());

    drop(flood);
    harness.shutdown().await;
}

#[tokio::test]
async fn one_peer_closing_does_not_affect_another() {
    let harness = Harness::start().await;
    let slot = harness.slot("Noon", 2).await;

    let mut first = harness.client().await;
    let mut second = harness.client().await;
    assert!(within(first.register("555", "Alice", "pw")).await.unwrap().is_ok());
    assert!(within(second.register("556", "Bob", "pw")).await.unwrap().is_ok());

    drop(first);
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert!(within(second.book("556", slot)).await.unwrap().is_ok());
    assert_eq!(harness.store.reservation_count(slot), 1);

    harness.shutdown().await;
}

#[tokio::test]
async fn connection_limit_rejects_extra_peers() {
    seatbook_testing::init_test_tracing();
    let store = Arc::new(InMemoryInventoryStore::new());
    let config = ServerConfig {
        port: 0,
        // Listener plus one connection
        max_connections: 2,
        ..ServerConfig::default()
    };
    let server = Server::bind(&config, store).await.unwrap();
    let addr = server.local_addr();
    let (stop, stopped) = oneshot::channel::<()>();
    let task = tokio::spawn(server.run_until(async {
        let _ = stopped.await;
    }));

    let mut admitted = Client::connect(addr).await.unwrap();
    assert!(within(admitted.list_inventory()).await.unwrap().is_ok());

    let mut refused = Client::connect(addr).await.unwrap();
    let result = within(refused.list_inventory()).await;
    assert!(result.is_err(), "extra peer is disconnected, got {result:?}");

    // The admitted peer is unaffected.
    assert!(within(admitted.list_inventory()).await.unwrap().is_ok());

    let _ = stop.send(());
    within(task).await.unwrap();
}
