#![allow(dead_code)]

use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, Once};
use std::time::Duration;

use fetch_core::{AssetReference, SuffixRules};
use fetch_engine::{ConnectStrategy, EngineEvent, FetchSettings, ProgressSink};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use url::Url;

static LOGGING: Once = Once::new();

/// Installs the terminal logger once per test binary so engine logs show up in failures.
pub fn init_logging() {
    LOGGING.call_once(fetch_logging::initialize_for_tests);
}

#[derive(Default)]
pub struct TestSink {
    events: Arc<Mutex<Vec<EngineEvent>>>,
}

impl TestSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn take(&self) -> Vec<EngineEvent> {
        self.events.lock().unwrap().drain(..).collect()
    }
}

impl ProgressSink for TestSink {
    fn emit(&self, event: EngineEvent) {
        self.events.lock().unwrap().push(event);
    }
}

/// Short timeouts and a single address family so loopback servers behave the same on every attempt.
pub fn test_settings() -> FetchSettings {
    init_logging();
    FetchSettings {
        connect_timeout: Duration::from_secs(2),
        read_timeout: Duration::from_secs(10),
        listing_timeout: Duration::from_secs(5),
        probe_timeout: Duration::from_secs(5),
        validation_timeout: Duration::from_secs(5),
        strategies: vec![ConnectStrategy::System],
        ..FetchSettings::default()
    }
}

pub fn asset(url: &str) -> AssetReference {
    AssetReference::from_url(Url::parse(url).unwrap(), &SuffixRules::default()).unwrap()
}

pub fn file_names(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = fs::read_dir(dir)
        .unwrap()
        .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}

pub fn listing(links: &[&str]) -> String {
    let anchors: String = links
        .iter()
        .map(|href| format!("<a href=\"{href}\">{href}</a>\n"))
        .collect();
    format!("<html><body><pre>\n{anchors}</pre></body></html>")
}

/// A loopback HTTP/1.1 server that answers every request with a canned response.
pub struct RawServer {
    pub base: Url,
    requests: Arc<AtomicUsize>,
}

impl RawServer {
    pub fn requests(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }

    pub fn url(&self, path: &str) -> Url {
        self.base.join(path).unwrap()
    }
}

#[derive(Clone)]
pub enum RawBody {
    /// Announces `declared` bytes, sends `sent` bytes, then closes the connection.
    Truncated { declared: usize, sent: usize },
    /// Announces `declared` bytes, sends `sent` bytes, then keeps the connection open.
    Stalled { declared: usize, sent: usize },
    /// No length header; the body ends when the connection closes.
    Unsized { sent: usize },
}

pub async fn raw_server(body: RawBody) -> RawServer {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let requests = Arc::new(AtomicUsize::new(0));
    let counter = requests.clone();
    tokio::spawn(async move {
        while let Ok((socket, _)) = listener.accept().await {
            let counter = counter.clone();
            let body = body.clone();
            tokio::spawn(async move {
                serve_one(socket, body, counter).await;
            });
        }
    });
    RawServer {
        base: Url::parse(&format!("http://{addr}/")).unwrap(),
        requests,
    }
}

async fn serve_one(mut socket: TcpStream, body: RawBody, counter: Arc<AtomicUsize>) {
    let mut request = Vec::new();
    let mut buf = [0u8; 1024];
    while !request.windows(4).any(|w| w == b"\r\n\r\n") {
        match socket.read(&mut buf).await {
            Ok(0) | Err(_) => return,
            Ok(n) => request.extend_from_slice(&buf[..n]),
        }
    }
    counter.fetch_add(1, Ordering::SeqCst);
    let is_head = request.starts_with(b"HEAD");

    let (header, sent, stall) = match body {
        RawBody::Truncated { declared, sent } => (
            format!("HTTP/1.1 200 OK\r\nContent-Length: {declared}\r\nConnection: close\r\n\r\n"),
            sent,
            false,
        ),
        RawBody::Stalled { declared, sent } => (
            format!("HTTP/1.1 200 OK\r\nContent-Length: {declared}\r\nConnection: close\r\n\r\n"),
            sent,
            true,
        ),
        RawBody::Unsized { sent } => (
            "HTTP/1.1 200 OK\r\nConnection: close\r\n\r\n".to_string(),
            sent,
            false,
        ),
    };
    if socket.write_all(header.as_bytes()).await.is_err() {
        return;
    }
    if !is_head {
        let _ = socket.write_all(&vec![b'x'; sent]).await;
        let _ = socket.flush().await;
    }
    if stall {
        tokio::time::sleep(Duration::from_secs(30)).await;
    }
    let _ = socket.shutdown().await;
}

pub fn bzip2_bytes(content: &[u8]) -> Vec<u8> {
    use std::io::Write;
    let mut encoder = bzip2::write::BzEncoder::new(Vec::new(), bzip2::Compression::default());
    encoder.write_all(content).unwrap();
    encoder.finish().unwrap()
}

pub fn gzip_bytes(content: &[u8]) -> Vec<u8> {
    use std::io::Write;
    let mut encoder = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
    encoder.write_all(content).unwrap();
    encoder.finish().unwrap()
}
