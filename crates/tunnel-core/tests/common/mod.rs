//! Shared fixtures for tunnel integration tests: an in-process SSH server
//! that honours `direct-tcpip` requests, plain TCP destination servers and
//! a few helpers.
#![allow(dead_code)]

use std::{
    borrow::Cow,
    net::{SocketAddr, TcpListener as StdTcpListener},
    path::{Path, PathBuf},
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use anyhow::{Context, Result};
use russh::{
    Channel,
    MethodKind,
    MethodSet,
    Preferred,
    kex,
    keys::{
        Algorithm,
        PrivateKey,
        PublicKey,
        ssh_key::{LineEnding, rand_core::OsRng},
    },
    server::{self, Auth, Msg, Session},
};
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt, copy_bidirectional},
    net::{TcpListener, TcpStream},
    task::JoinHandle,
    time::{sleep, timeout},
};
use tunnel_core::{SshConfig, Tunnel, TunnelStats};

pub const TEST_USER: &str = "testuser";
pub const TEST_PASSWORD: &str = "testpass";

/// Key exchange offered by the test server. Group exchange is left out.
const TEST_KEX: &[kex::Name] = &[kex::CURVE25519, kex::CURVE25519_PRE_RFC_8731];

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub fn pick_free_port() -> u16 {
    StdTcpListener::bind(("127.0.0.1", 0))
        .and_then(|listener| listener.local_addr())
        .map(|addr| addr.port())
        .unwrap()
}

/// SSH server on an ephemeral loopback port. Accepts `testuser`/`testpass`
/// and, when configured, one authorized public key.
pub struct SshTestServer {
    pub addr: SocketAddr,
    pub host_key: PublicKey,
    task: JoinHandle<()>,
}

impl SshTestServer {
    pub async fn start() -> Result<Self> {
        Self::start_with_key(None).await
    }

    pub async fn start_with_key(authorized_key: Option<PublicKey>) -> Result<Self> {
        let host_key = PrivateKey::random(&mut OsRng, Algorithm::Ed25519)?;
        let public = host_key.public_key().clone();

        let mut methods = MethodSet::empty();
        methods.push(MethodKind::Password);
        methods.push(MethodKind::PublicKey);
        let config = Arc::new(server::Config {
            auth_rejection_time: Duration::from_millis(10),
            auth_rejection_time_initial: Some(Duration::ZERO),
            methods,
            keys: vec![host_key],
            preferred: Preferred {
                kex: Cow::Borrowed(TEST_KEX),
                ..Preferred::DEFAULT.clone()
            },
            ..Default::default()
        });

        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let authorized_key = authorized_key.map(Arc::new);
        let task = tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let config = Arc::clone(&config);
                let handler = TestHandler {
                    authorized_key: authorized_key.clone(),
                };
                tokio::spawn(async move {
                    if let Ok(session) = server::run_stream(config, stream, handler).await {
                        let _ = session.await;
                    }
                });
            }
        });

        Ok(Self {
            addr,
            host_key: public,
            task,
        })
    }

    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    /// known_hosts line recording this server's key.
    pub fn known_hosts_line(&self) -> String {
        format!("[127.0.0.1]:{} {}", self.port(), self.host_key.to_openssh().unwrap())
    }

    pub async fn password_config(&self) -> SshConfig {
        SshConfig::new(TEST_USER, TEST_PASSWORD, "", "127.0.0.1", "", self.port())
            .await
            .expect("password config")
    }
}

impl Drop for SshTestServer {
    fn drop(&mut self) {
        self.task.abort();
    }
}

struct TestHandler {
    authorized_key: Option<Arc<PublicKey>>,
}

fn reject() -> Auth {
    Auth::Reject {
        proceed_with_methods: None,
        partial_success: false,
    }
}

impl server::Handler for TestHandler {
    type Error = russh::Error;

    async fn auth_password(&mut self, user: &str, password: &str) -> Result<Auth, Self::Error> {
        if user == TEST_USER && password == TEST_PASSWORD {
            Ok(Auth::Accept)
        } else {
            Ok(reject())
        }
    }

    async fn auth_publickey(&mut self, user: &str, public_key: &PublicKey) -> Result<Auth, Self::Error> {
        match &self.authorized_key {
            Some(key) if user == TEST_USER && key.key_data() == public_key.key_data() => Ok(Auth::Accept),
            _ => Ok(reject()),
        }
    }

    async fn channel_open_direct_tcpip(
        &mut self,
        channel: Channel<Msg>,
        host_to_connect: &str,
        port_to_connect: u32,
        _originator_address: &str,
        _originator_port: u32,
        _session: &mut Session,
    ) -> Result<bool, Self::Error> {
        let Ok(mut upstream) = TcpStream::connect(format!("{host_to_connect}:{port_to_connect}")).await else {
            return Ok(false);
        };
        tokio::spawn(async move {
            let mut stream = channel.into_stream();
            let _ = copy_bidirectional(&mut stream, &mut upstream).await;
        });
        Ok(true)
    }
}

/// Destination that writes `message` to every client and closes.
pub async fn spawn_greeting_server(message: &'static str) -> Result<SocketAddr> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    tokio::spawn(async move {
        while let Ok((mut conn, _)) = listener.accept().await {
            tokio::spawn(async move {
                let _ = conn.write_all(message.as_bytes()).await;
                let _ = conn.shutdown().await;
            });
        }
    });
    Ok(addr)
}

/// Destination that answers `connection N` to its N-th client and closes.
pub async fn spawn_counting_server() -> Result<SocketAddr> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    let count = Arc::new(AtomicUsize::new(0));
    tokio::spawn(async move {
        while let Ok((mut conn, _)) = listener.accept().await {
            let n = count.fetch_add(1, Ordering::SeqCst) + 1;
            tokio::spawn(async move {
                let _ = conn.write_all(format!("connection {n}").as_bytes()).await;
                let _ = conn.shutdown().await;
            });
        }
    });
    Ok(addr)
}

/// Destination that echoes everything back until the client closes.
pub async fn spawn_echo_server() -> Result<SocketAddr> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    tokio::spawn(async move {
        while let Ok((conn, _)) = listener.accept().await {
            tokio::spawn(async move {
                let (mut rd, mut wr) = conn.into_split();
                let _ = tokio::io::copy(&mut rd, &mut wr).await;
            });
        }
    });
    Ok(addr)
}

/// Connect to `addr` and read until the peer closes.
pub async fn read_response(addr: &str) -> Result<String> {
    let mut conn = TcpStream::connect(addr).await.with_context(|| format!("connect {addr}"))?;
    let mut buf = Vec::new();
    timeout(Duration::from_secs(5), conn.read_to_end(&mut buf))
        .await
        .context("timed out reading response")??;
    Ok(String::from_utf8(buf)?)
}

/// Poll the tunnel's statistics until `done` holds.
pub async fn wait_for_stats(tunnel: &Tunnel, done: impl Fn(&TunnelStats) -> bool) -> Result<TunnelStats> {
    timeout(Duration::from_secs(5), async {
        loop {
            let stats = tunnel.stats().await;
            if done(&stats) {
                return stats;
            }
            sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .context("statistics did not settle")
}

pub fn write_file(dir: &Path, name: &str, content: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, content).unwrap();
    path
}

/// Fresh ed25519 client key in OpenSSH format.
pub fn client_key() -> (String, PublicKey) {
    let key = PrivateKey::random(&mut OsRng, Algorithm::Ed25519).unwrap();
    let pem = key.to_openssh(LineEnding::LF).unwrap().to_string();
    (pem, key.public_key().clone())
}
