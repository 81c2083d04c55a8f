//! Shared utilities for integration tests: a throwaway certificate
//! authority, a line-echo upstream, and proxy construction helpers.

use std::collections::HashSet;
use std::net::SocketAddr;
use std::sync::{Arc, Once};
use std::time::Duration;

use rcgen::{
    BasicConstraints, CertificateParams, DistinguishedName, DnType, ExtendedKeyUsagePurpose, IsCa,
    KeyPair, KeyUsagePurpose, SanType,
};
use rustls::pki_types::ServerName;
use rustls::RootCertStore;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::oneshot;
use tokio_rustls::TlsConnector;

use mtls_proxy::config::{Config, ListenerConfig, RateLimitConfig, UpstreamConfig};
use mtls_proxy::proxy::Proxy;

static INIT_CRYPTO: Once = Once::new();

pub fn init_crypto_provider() {
    INIT_CRYPTO.call_once(|| {
        rustls::crypto::ring::default_provider()
            .install_default()
            .ok();
    });
}

/// A throwaway certificate authority issuing the proxy's server identity and
/// per-user client certificates.
pub struct TestCa {
    ca_cert: rcgen::Certificate,
    ca_key: KeyPair,
    pub ca_pem: Vec<u8>,
}

impl TestCa {
    pub fn new() -> Self {
        let ca_key = KeyPair::generate().expect("generate CA key");
        let mut params = CertificateParams::new(Vec::new()).expect("CA params");
        params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
        params.distinguished_name = DistinguishedName::new();
        params.distinguished_name.push(DnType::CommonName, "proxy-test-ca");
        params.key_usages = vec![KeyUsagePurpose::KeyCertSign, KeyUsagePurpose::CrlSign];
        let ca_cert = params.self_signed(&ca_key).expect("self-sign CA");
        let ca_pem = ca_cert.pem().into_bytes();

        Self {
            ca_cert,
            ca_key,
            ca_pem,
        }
    }

    /// Server certificate + key for the proxy listener, valid for localhost
    /// and 127.0.0.1.
    pub fn server_identity(&self) -> (Vec<u8>, Vec<u8>) {
        let key = KeyPair::generate().expect("generate server key");
        let mut params =
            CertificateParams::new(vec!["localhost".to_string()]).expect("server params");
        params
            .subject_alt_names
            .push(SanType::IpAddress("127.0.0.1".parse().unwrap()));
        params.distinguished_name = DistinguishedName::new();
        params.distinguished_name.push(DnType::CommonName, "mtls-proxy");
        params.extended_key_usages = vec![ExtendedKeyUsagePurpose::ServerAuth];
        let cert = params
            .signed_by(&key, &self.ca_cert, &self.ca_key)
            .expect("sign server cert");

        (cert.pem().into_bytes(), key.serialize_pem().into_bytes())
    }

    /// Client certificate + key whose CN carries `common_name`, e.g.
    /// `user1@engineering`.
    pub fn client_identity(&self, common_name: &str) -> (Vec<u8>, Vec<u8>) {
        let key = KeyPair::generate().expect("generate client key");
        let mut params = CertificateParams::new(Vec::new()).expect("client params");
        params.distinguished_name = DistinguishedName::new();
        params.distinguished_name.push(DnType::CommonName, common_name);
        params.extended_key_usages = vec![ExtendedKeyUsagePurpose::ClientAuth];
        let cert = params
            .signed_by(&key, &self.ca_cert, &self.ca_key)
            .expect("sign client cert");

        (cert.pem().into_bytes(), key.serialize_pem().into_bytes())
    }

    /// rustls client configuration presenting `common_name` to the proxy.
    pub fn client_tls_config(&self, common_name: &str) -> Arc<rustls::ClientConfig> {
        let (cert_pem, key_pem) = self.client_identity(common_name);

        let mut cert_reader = cert_pem.as_slice();
        let certs = rustls_pemfile::certs(&mut cert_reader)
            .collect::<Result<Vec<_>, _>>()
            .expect("parse client cert");
        let mut key_reader = key_pem.as_slice();
        let key = rustls_pemfile::private_key(&mut key_reader)
            .expect("parse client key")
            .expect("client key present");

        let mut roots = RootCertStore::empty();
        let mut ca_reader = self.ca_pem.as_slice();
        for cert in rustls_pemfile::certs(&mut ca_reader) {
            roots
                .add(cert.expect("parse CA cert"))
                .expect("trust CA cert");
        }

        let config = rustls::ClientConfig::builder()
            .with_root_certificates(roots)
            .with_client_auth_cert(certs, key)
            .expect("client TLS config");

        Arc::new(config)
    }
}

/// Line-echo upstream: reads newline-terminated chunks, writes them back.
pub struct EchoServer {
    pub addr: SocketAddr,
    shutdown_tx: oneshot::Sender<()>,
}

impl EchoServer {
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind echo server");
        let addr = listener.local_addr().expect("echo server addr");
        let (shutdown_tx, mut shutdown_rx) = oneshot::channel();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = &mut shutdown_rx => return,
                    accepted = listener.accept() => {
                        let Ok((stream, _)) = accepted else { continue };
                        tokio::spawn(echo_connection(stream));
                    }
                }
            }
        });

        Self { addr, shutdown_tx }
    }

    pub fn close(self) {
        let _ = self.shutdown_tx.send(());
    }
}

async fn echo_connection(stream: TcpStream) {
    let (read_half, mut write_half) = stream.into_split();
    let mut reader = BufReader::new(read_half);
    let mut line = String::new();

    loop {
        line.clear();
        match reader.read_line(&mut line).await {
            Ok(0) | Err(_) => return,
            Ok(_) => {
                if write_half.write_all(line.as_bytes()).await.is_err() {
                    return;
                }
            }
        }
    }
}

/// Runtime config for a proxy forwarding to `target`, authorizing
/// `authorized_group`.
pub fn test_config(
    ca: &TestCa,
    target: &str,
    authorized_group: &str,
    rate_limit: Option<RateLimitConfig>,
) -> Config {
    let (certificate, private_key) = ca.server_identity();

    Config {
        listener: ListenerConfig {
            listen_addr: "127.0.0.1:0".to_string(),
            ca: ca.ca_pem.clone(),
            certificate,
            private_key,
        },
        upstream: UpstreamConfig {
            name: "test".to_string(),
            targets: vec![target.to_string()],
            authorized_groups: HashSet::from([authorized_group.to_string()]),
        },
        rate_limit,
    }
}

/// Build a proxy and start serving it in a background task.
pub async fn start_test_proxy(
    ca: &TestCa,
    target: &str,
    authorized_group: &str,
    rate_limit: Option<RateLimitConfig>,
) -> Arc<Proxy> {
    init_crypto_provider();

    let config = test_config(ca, target, authorized_group, rate_limit);
    let proxy = Arc::new(Proxy::new(config).await.expect("proxy construction"));

    tokio::spawn({
        let proxy = Arc::clone(&proxy);
        async move {
            proxy.serve().await.expect("serve failed");
        }
    });

    // Give the accept loop a beat to start before clients dial in.
    tokio::time::sleep(Duration::from_millis(10)).await;

    proxy
}

/// Dial the proxy over TLS, presenting `common_name` as the client identity.
pub async fn connect_client(
    ca: &TestCa,
    proxy_addr: &str,
    common_name: &str,
) -> tokio_rustls::client::TlsStream<TcpStream> {
    let connector = TlsConnector::from(ca.client_tls_config(common_name));
    let tcp = TcpStream::connect(proxy_addr).await.expect("connect to proxy");
    let server_name = ServerName::try_from("localhost").expect("server name");

    connector
        .connect(server_name, tcp)
        .await
        .expect("TLS connect to proxy")
}
