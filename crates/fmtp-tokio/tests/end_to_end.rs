//! Full-stack exchange over real TCP: server accepts, client dials,
//! messages flow, the registry tracks the connection on both sides.

use std::sync::Arc;
use std::time::Duration;

use fmtp_core::{FmtpError, FmtpIdentifier, FmtpMessage};
use fmtp_tokio::{Client, Connection, Handler};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::time::timeout;

fn id(s: &str) -> FmtpIdentifier {
    FmtpIdentifier::new(s.as_bytes()).unwrap()
}

struct Collect {
    messages: mpsc::UnboundedSender<FmtpMessage>,
}

impl Handler for Collect {
    fn on_message(&self, _conn: &Connection, msg: FmtpMessage) {
        let _ = self.messages.send(msg);
    }
}

#[tokio::test]
async fn client_dials_server_and_exchanges_messages() {
    let (messages, mut received) = mpsc::unbounded_channel();
    let (connected, mut notified) = mpsc::unbounded_channel();

    let server_client = Client::new(id("SERVER"));
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let server = server_client
        .new_server(addr, Arc::new(Collect { messages }))
        .with_notify_conn(move |_peer, remote| {
            let _ = connected.send(remote.clone());
        });
    tokio::spawn(async move {
        let _ = server.serve(listener).await;
    });

    let client = Client::new(id("CLIENT"));
    let conn = client.dial(addr, id("SERVER")).await.unwrap();
    assert_eq!(conn.remote_id(), &id("SERVER"));
    assert_eq!(conn.remote_addr(), Some(addr));

    let peer = timeout(Duration::from_secs(2), notified.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(peer, id("CLIENT"));

    conn.send(FmtpMessage::operational(b"FPL TEST".to_vec()).unwrap())
        .await
        .unwrap();
    conn.send_operator("HELLO OPS").await.unwrap();

    let first = timeout(Duration::from_secs(2), received.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(first, FmtpMessage::Operational(b"FPL TEST".to_vec()));
    let second = timeout(Duration::from_secs(2), received.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(second, FmtpMessage::Operator(b"HELLO OPS".to_vec()));

    // both registries track the live connection
    assert!(client.connection(&id("SERVER")).await.is_some());
    timeout(Duration::from_secs(2), async {
        while server_client.connection(&id("CLIENT")).await.is_none() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();

    // disconnect drains both registries
    conn.disconnect().await.unwrap();
    timeout(Duration::from_secs(2), async {
        while client.connection(&id("SERVER")).await.is_some()
            || server_client.connection(&id("CLIENT")).await.is_some()
        {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();
}

#[tokio::test]
async fn server_turns_away_unwanted_peers() {
    let (messages, _received) = mpsc::unbounded_channel();

    let server_client = Client::new(id("SERVER"));
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let server = server_client
        .new_server(addr, Arc::new(Collect { messages }))
        .with_accept_remote(|remote| remote == &id("FRIEND"));
    tokio::spawn(async move {
        let _ = server.serve(listener).await;
    });

    let client = Client::new(id("STRANGER"));
    // the REJECT reaches the initiator mid-exchange, where it cannot pass
    // for an identification request
    assert!(client.dial(addr, id("SERVER")).await.is_err());
    assert!(server_client.connection(&id("STRANGER")).await.is_none());

    let friend = Client::new(id("FRIEND"));
    let conn = friend.dial(addr, id("SERVER")).await.unwrap();
    conn.disconnect().await.unwrap();
}

#[tokio::test]
async fn second_connection_for_the_same_identifier_is_refused() {
    let client = Client::new(id("CLIENT"));

    let server_client = Client::new(id("SERVER"));
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (messages, _received) = mpsc::unbounded_channel();
    let server = server_client.new_server(addr, Arc::new(Collect { messages }));
    tokio::spawn(async move {
        let _ = server.serve(listener).await;
    });

    let conn = client.connect(addr, id("SERVER")).await.unwrap();
    assert!(matches!(
        client.connect(addr, id("SERVER")).await,
        Err(FmtpError::AlreadyRegistered(_))
    ));

    conn.disconnect().await.unwrap();
}
