//! End-to-end SMTP sessions against a live gateway

use smtp_gateway::config::GatewayConfig;
use smtp_gateway::store::{EnvelopeStore, MemoryStore, StoreEvent};
use smtp_gateway::{EnvelopeId, Gateway};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};

async fn start_test_gateway() -> (String, MemoryStore) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap().to_string();

    let config = GatewayConfig {
        server_name: "test.local".to_string(),
        ..GatewayConfig::default()
    };
    let store = MemoryStore::new();
    let gateway = Gateway::new(config, Arc::new(store.clone()));

    tokio::spawn(async move {
        if let Err(e) = gateway.serve(listener).await {
            eprintln!("Gateway stopped: {e}");
        }
    });

    (addr, store)
}

struct Client {
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
}

impl Client {
    async fn connect(addr: &str) -> (Self, String) {
        let stream = TcpStream::connect(addr).await.unwrap();
        let (read, writer) = stream.into_split();
        let mut client = Self {
            reader: BufReader::new(read),
            writer,
        };
        let banner = client.read_line().await;
        (client, banner)
    }

    async fn read_line(&mut self) -> String {
        let mut line = String::new();
        tokio::time::timeout(Duration::from_secs(5), self.reader.read_line(&mut line))
            .await
            .expect("timed out waiting for reply")
            .unwrap();
        line.trim_end_matches("\r\n").to_string()
    }

    async fn send(&mut self, line: &str) {
        self.writer
            .write_all(format!("{line}\r\n").as_bytes())
            .await
            .unwrap();
    }

    async fn command(&mut self, line: &str) -> String {
        self.send(line).await;
        self.read_line().await
    }
}

#[tokio::test]
async fn test_banner() {
    let (addr, _store) = start_test_gateway().await;
    let (_client, banner) = Client::connect(&addr).await;
    assert_eq!(banner, "220 test.local ready");
}

#[tokio::test]
async fn test_full_session_stores_envelope() {
    let (addr, store) = start_test_gateway().await;
    let mut events = store.subscribe();
    let (mut client, _) = Client::connect(&addr).await;

    assert_eq!(client.command("EHLO client.test").await, "250 test.local greets client.test");
    assert_eq!(client.command("MAIL FROM:<a@x>").await, "250 OK");
    assert_eq!(client.command("RCPT TO:<b@y>").await, "250 OK");
    assert!(client.command("DATA").await.starts_with("354 "));

    client.send("Subject: test").await;
    client.send("..hello").await;
    let reply = client.command(".").await;
    assert!(reply.starts_with("250 OK: queued as "), "{reply}");

    let id: EnvelopeId = reply.rsplit(' ').next().unwrap().parse().unwrap();
    let envelope = store.get(&id).unwrap();
    assert_eq!(envelope.from(), "a@x");
    assert_eq!(envelope.recipients(), ["b@y"]);
    assert_eq!(envelope.body(), Some("Subject: test\r\n.hello"));

    let StoreEvent::Added(added) = events.recv().await.unwrap() else {
        panic!("expected an Added event");
    };
    assert_eq!(added.id(), id);

    assert_eq!(client.command("QUIT").await, "221 Bye");
}

#[tokio::test]
async fn test_sequencing_errors() {
    let (addr, store) = start_test_gateway().await;
    let (mut client, _) = Client::connect(&addr).await;

    assert!(client.command("MAIL FROM:<a@x>").await.starts_with("503 "));
    assert_eq!(client.command("HELO").await, "250 test.local");
    assert!(client.command("RCPT TO:<b@y>").await.starts_with("503 "));
    assert!(client.command("DATA").await.starts_with("503 "));
    assert_eq!(client.command("MAIL FROM:<a@x>").await, "250 OK");
    assert!(client.command("DATA").await.starts_with("503 "));
    assert!(store.is_empty());
}

#[tokio::test]
async fn test_parameter_and_unknown_commands() {
    let (addr, _store) = start_test_gateway().await;
    let (mut client, _) = Client::connect(&addr).await;

    assert!(client.command("HELO client.test").await.starts_with("501 "));
    assert!(client.command("FOO bar").await.starts_with("502 "));
    assert!(client.command("VRFY user").await.starts_with("502 "));
    assert!(client.command("").await.starts_with("500 "));
    assert!(client.command("help").await.starts_with("214 Commands: "));
}

#[tokio::test]
async fn test_quit_with_parameter_keeps_connection() {
    let (addr, _store) = start_test_gateway().await;
    let (mut client, _) = Client::connect(&addr).await;

    assert!(client.command("QUIT foo").await.starts_with("501 "));
    assert_eq!(client.command("NOOP").await, "250 OK");
    assert_eq!(client.command("QUIT").await, "221 Bye");

    // Server closes its side after the closing reply
    let mut rest = Vec::new();
    let n = tokio::time::timeout(Duration::from_secs(5), client.reader.read_to_end(&mut rest))
        .await
        .expect("connection left open")
        .unwrap();
    assert_eq!(n, 0);
}

#[tokio::test]
async fn test_commands_split_across_writes() {
    let (addr, _store) = start_test_gateway().await;
    let (mut client, _) = Client::connect(&addr).await;

    client.writer.write_all(b"NO").await.unwrap();
    client.writer.flush().await.unwrap();
    tokio::time::sleep(Duration::from_millis(20)).await;
    client.writer.write_all(b"OP\r").await.unwrap();
    client.writer.flush().await.unwrap();
    tokio::time::sleep(Duration::from_millis(20)).await;
    client.writer.write_all(b"\nHELO\r\n").await.unwrap();

    assert_eq!(client.read_line().await, "250 OK");
    assert_eq!(client.read_line().await, "250 test.local");
}

#[tokio::test]
async fn test_sessions_are_independent() {
    let (addr, store) = start_test_gateway().await;
    let (mut first, _) = Client::connect(&addr).await;
    let (mut second, _) = Client::connect(&addr).await;

    first.command("HELO").await;
    first.command("MAIL FROM:<a@x>").await;

    // The second connection has its own state
    assert!(second.command("RCPT TO:<b@y>").await.starts_with("503 "));
    second.command("HELO").await;
    assert_eq!(second.command("MAIL FROM:<c@z>").await, "250 OK");

    first.command("RCPT TO:<b@y>").await;
    first.command("DATA").await;
    first.send("from first").await;
    assert!(first.command(".").await.starts_with("250 "));

    assert_eq!(store.len(), 1);
    let envelope = store.get(&store.ids()[0]).unwrap();
    assert_eq!(envelope.from(), "a@x");
}
