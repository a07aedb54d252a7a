//! Shared helpers for integration tests

#![allow(dead_code)]

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use rcgen::{
    BasicConstraints, CertificateParams, DnType, ExtendedKeyUsagePurpose, IsCa, KeyPair, KeyUsagePurpose, SanType,
    date_time_ymd,
};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::{TcpListener, TcpSocket, TcpStream};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_native_tls::TlsAcceptor;
use vigil::{
    ChannelPublisher, CheckConfiguration, CheckResult, CheckType, ExecutorDispatch, MemorySettings, Prober,
    RegistryOptions, ScheduleRegistry,
};

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

/// Minimal HTTP/1.1 server answering every request with a fixed status,
/// over plain TCP or TLS
pub struct MockHttpServer {
    addr: SocketAddr,
    scheme: &'static str,
    requests: Arc<AtomicUsize>,
    connections: Arc<AtomicUsize>,
    handle: JoinHandle<()>,
}

impl MockHttpServer {
    pub async fn start(status: u16) -> Self {
        Self::start_with_delay(status, Duration::ZERO).await
    }

    pub async fn start_with_delay(status: u16, delay: Duration) -> Self {
        Self::spawn(status, delay, None).await
    }

    pub async fn start_tls(status: u16, identity: native_tls::Identity) -> Self {
        let acceptor = native_tls::TlsAcceptor::new(identity).unwrap();
        Self::spawn(status, Duration::ZERO, Some(TlsAcceptor::from(acceptor))).await
    }

    async fn spawn(status: u16, delay: Duration, tls: Option<TlsAcceptor>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let scheme = if tls.is_some() { "https" } else { "http" };
        let requests = Arc::new(AtomicUsize::new(0));
        let connections = Arc::new(AtomicUsize::new(0));

        let request_counter = Arc::clone(&requests);
        let connection_counter = Arc::clone(&connections);
        let handle = tokio::spawn(async move {
            while let Ok((socket, _)) = listener.accept().await {
                connection_counter.fetch_add(1, Ordering::SeqCst);
                let counter = Arc::clone(&request_counter);
                let tls = tls.clone();
                tokio::spawn(async move {
                    match tls {
                        Some(acceptor) => {
                            // Handshake failures are the client rejecting our certificate
                            if let Ok(stream) = acceptor.accept(socket).await {
                                respond(stream, status, delay, counter).await;
                            }
                        }
                        None => respond(socket, status, delay, counter).await,
                    }
                });
            }
        });

        Self { addr, scheme, requests, connections, handle }
    }

    pub fn url(&self) -> String {
        format!("{}://{}/health", self.scheme, self.addr)
    }

    pub fn requests(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }

    /// Connections accepted, including ones that never sent a request
    pub fn connections(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }
}

impl Drop for MockHttpServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

async fn respond<S>(mut stream: S, status: u16, delay: Duration, requests: Arc<AtomicUsize>)
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut buf = [0u8; 4096];
    let mut request = Vec::new();
    loop {
        match stream.read(&mut buf).await {
            // Connection opened and closed without a request
            Ok(0) | Err(_) => return,
            Ok(n) => {
                request.extend_from_slice(&buf[..n]);
                if request.windows(4).any(|window| window == b"\r\n\r\n") {
                    break;
                }
            }
        }
    }

    requests.fetch_add(1, Ordering::SeqCst);
    if !delay.is_zero() {
        tokio::time::sleep(delay).await;
    }

    let response = format!("HTTP/1.1 {status} Mock\r\ncontent-length: 0\r\nconnection: close\r\n\r\n");
    let _ = stream.write_all(response.as_bytes()).await;
    let _ = stream.shutdown().await;
}

/// Test certificate authority and a server certificate for 127.0.0.1
pub struct TestPki {
    pub ca_pem: String,
    pub server_pem: String,
    pub server_key_pem: String,
    pub server_not_after: DateTime<Utc>,
}

impl TestPki {
    pub fn generate() -> Self {
        let ca_key = KeyPair::generate().unwrap();
        let mut ca_params = CertificateParams::new(Vec::<String>::new()).unwrap();
        ca_params.distinguished_name.push(DnType::CommonName, "Vigil Test CA");
        ca_params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
        ca_params.key_usages = vec![KeyUsagePurpose::KeyCertSign, KeyUsagePurpose::CrlSign];
        ca_params.not_before = date_time_ymd(2020, 1, 1);
        ca_params.not_after = date_time_ymd(2099, 12, 31);
        let ca = ca_params.self_signed(&ca_key).unwrap();

        let server_key = KeyPair::generate().unwrap();
        let server_params = server_params();
        let server = server_params.signed_by(&server_key, &ca, &ca_key).unwrap();

        Self {
            ca_pem: ca.pem(),
            server_pem: server.pem(),
            server_key_pem: server_key.serialize_pem(),
            server_not_after: Utc.with_ymd_and_hms(2099, 1, 1, 0, 0, 0).unwrap(),
        }
    }

    pub fn server_identity(&self) -> native_tls::Identity {
        native_tls::Identity::from_pkcs8(self.server_pem.as_bytes(), self.server_key_pem.as_bytes()).unwrap()
    }

    pub fn root_certificate(&self) -> reqwest::Certificate {
        reqwest::Certificate::from_pem(self.ca_pem.as_bytes()).unwrap()
    }
}

/// Self-signed server certificate for 127.0.0.1 that no client trusts
pub fn untrusted_identity() -> native_tls::Identity {
    let key = KeyPair::generate().unwrap();
    let certificate = server_params().self_signed(&key).unwrap();
    native_tls::Identity::from_pkcs8(certificate.pem().as_bytes(), key.serialize_pem().as_bytes()).unwrap()
}

fn server_params() -> CertificateParams {
    let mut params = CertificateParams::new(Vec::<String>::new()).unwrap();
    params.distinguished_name.push(DnType::CommonName, "127.0.0.1");
    params.subject_alt_names = vec![SanType::IpAddress(IpAddr::V4(Ipv4Addr::LOCALHOST))];
    params.extended_key_usages = vec![ExtendedKeyUsagePurpose::ServerAuth];
    params.not_before = date_time_ymd(2020, 1, 1);
    params.not_after = date_time_ymd(2099, 1, 1);
    params
}

/// A loopback address with nothing listening on it
pub async fn closed_port() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap()
}

/// A listener that never accepts, with its accept queue already full.
///
/// Further connection attempts get no SYN-ACK and hang until their own
/// timeout. Keep the returned value alive for as long as that is needed.
pub struct SaturatedListener {
    pub addr: SocketAddr,
    _listener: TcpListener,
    _held: Vec<TcpStream>,
}

impl SaturatedListener {
    pub async fn bind() -> Self {
        let socket = TcpSocket::new_v4().unwrap();
        socket.bind("127.0.0.1:0".parse().unwrap()).unwrap();
        let listener = socket.listen(1).unwrap();
        let addr = listener.local_addr().unwrap();

        let mut held = Vec::new();
        for _ in 0..16 {
            match tokio::time::timeout(Duration::from_millis(200), TcpStream::connect(addr)).await {
                Ok(stream) => held.push(stream.unwrap()),
                Err(_) => return Self { addr, _listener: listener, _held: held },
            }
        }
        panic!("accept queue of {addr} never filled");
    }
}

/// Prober that succeeds after an optional delay and counts executions
#[derive(Default)]
pub struct CountingProber {
    pub executions: AtomicUsize,
    pub running: AtomicUsize,
    pub max_running: AtomicUsize,
    pub delay: Duration,
}

impl CountingProber {
    pub fn with_delay(delay: Duration) -> Self {
        Self { delay, ..Default::default() }
    }

    pub fn executions(&self) -> usize {
        self.executions.load(Ordering::SeqCst)
    }

    pub fn max_running(&self) -> usize {
        self.max_running.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl Prober for CountingProber {
    fn name(&self) -> &'static str {
        "counting"
    }

    fn supports(&self, check_type: CheckType) -> bool {
        check_type == CheckType::Tcp
    }

    async fn execute(&self, config: &CheckConfiguration) -> vigil::Result<CheckResult> {
        self.executions.fetch_add(1, Ordering::SeqCst);
        let running = self.running.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_running.fetch_max(running, Ordering::SeqCst);

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        self.running.fetch_sub(1, Ordering::SeqCst);
        Ok(CheckResult::new(config).up(self.delay))
    }
}

/// Prober that panics on its first execution only
#[derive(Default)]
pub struct PanicOnceProber {
    pub executions: AtomicUsize,
}

#[async_trait::async_trait]
impl Prober for PanicOnceProber {
    fn name(&self) -> &'static str {
        "panic-once"
    }

    fn supports(&self, check_type: CheckType) -> bool {
        check_type == CheckType::Dns
    }

    async fn execute(&self, config: &CheckConfiguration) -> vigil::Result<CheckResult> {
        if self.executions.fetch_add(1, Ordering::SeqCst) == 0 {
            panic!("prober exploded");
        }
        Ok(CheckResult::new(config).up(Duration::ZERO))
    }
}

pub struct Harness {
    pub registry: ScheduleRegistry,
    pub settings: Arc<MemorySettings>,
    pub results: mpsc::Receiver<CheckResult>,
}

impl Harness {
    pub fn new(probers: Vec<Arc<dyn Prober>>, max_concurrent_probes: usize) -> Self {
        let settings = Arc::new(MemorySettings::new());
        let (publisher, results) = ChannelPublisher::channel(1024);
        let registry = ScheduleRegistry::new(
            Arc::new(ExecutorDispatch::new(probers)),
            settings.clone(),
            Arc::new(publisher),
            RegistryOptions { max_concurrent_probes },
        );
        Self { registry, settings, results }
    }

    /// Drain everything published so far
    pub fn drain(&mut self) -> Vec<CheckResult> {
        let mut drained = Vec::new();
        while let Ok(result) = self.results.try_recv() {
            drained.push(result);
        }
        drained
    }
}

pub fn config(id: &str, check_type: CheckType, url: &str, frequency_ms: u64, timeout_ms: u64) -> CheckConfiguration {
    CheckConfiguration::new(
        id,
        check_type,
        url,
        Duration::from_millis(frequency_ms),
        Duration::from_millis(timeout_ms),
    )
}
