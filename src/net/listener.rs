//! TLS-terminating TCP listener.
//!
//! # Responsibilities
//! - Bind to the configured address
//! - Accept incoming TCP connections
//! - Drive the TLS handshake to completion before handing the connection on
//! - Drop connections whose handshake fails and keep accepting

use std::net::SocketAddr;
use std::sync::Arc;

use rustls::pki_types::CertificateDer;
use tokio::net::{TcpListener, TcpStream};
use tokio_rustls::server::TlsStream;
use tokio_rustls::TlsAcceptor;

/// Error type for listener operations.
#[derive(Debug)]
pub enum ListenerError {
    /// The TLS listen socket could not be bound. Carries the configured
    /// address for the startup error log.
    Bind {
        addr: String,
        source: std::io::Error,
    },
    /// The kernel refused a new connection; transient, the serve loop
    /// retries.
    Accept(std::io::Error),
}

impl std::fmt::Display for ListenerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ListenerError::Bind { addr, source } => {
                write!(f, "could not bind TLS listener on {}: {}", addr, source)
            }
            ListenerError::Accept(source) => {
                write!(f, "could not accept client connection: {}", source)
            }
        }
    }
}

impl std::error::Error for ListenerError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ListenerError::Bind { source, .. } | ListenerError::Accept(source) => Some(source),
        }
    }
}

/// An accepted client connection whose TLS handshake has completed, so the
/// peer certificate chain can be inspected before any byte is proxied.
pub struct AuthenticatedConn {
    pub stream: TlsStream<TcpStream>,
    pub peer_addr: SocketAddr,
}

impl AuthenticatedConn {
    /// Certificate chain the client presented during the handshake.
    pub fn peer_certificates(&self) -> Vec<CertificateDer<'static>> {
        let (_, connection) = self.stream.get_ref();
        connection
            .peer_certificates()
            .map(<[CertificateDer<'static>]>::to_vec)
            .unwrap_or_default()
    }
}

/// A TCP listener terminating mutually-authenticated TLS.
pub struct TlsListener {
    inner: TcpListener,
    acceptor: TlsAcceptor,
}

impl TlsListener {
    /// Bind to `addr` and terminate TLS with `tls_config`.
    pub async fn bind(addr: &str, tls_config: Arc<rustls::ServerConfig>) -> Result<Self, ListenerError> {
        let inner = TcpListener::bind(addr)
            .await
            .map_err(|source| ListenerError::Bind {
                addr: addr.to_string(),
                source,
            })?;

        Ok(Self {
            inner,
            acceptor: TlsAcceptor::from(tls_config),
        })
    }

    /// Get the local address this listener is bound to.
    pub fn local_addr(&self) -> Result<SocketAddr, std::io::Error> {
        self.inner.local_addr()
    }

    /// Accept the next client connection.
    ///
    /// The TLS handshake runs to completion here; authorization needs the
    /// peer certificate before any application data flows. Connections whose
    /// handshake fails are dropped and the accept continues. TCP-level accept
    /// failures are returned for the caller to treat as transient.
    pub async fn accept(&self) -> Result<AuthenticatedConn, ListenerError> {
        loop {
            let (stream, peer_addr) = self.inner.accept().await.map_err(ListenerError::Accept)?;

            match self.acceptor.accept(stream).await {
                Ok(stream) => {
                    tracing::debug!(peer_addr = %peer_addr, "Connection accepted");
                    return Ok(AuthenticatedConn { stream, peer_addr });
                }
                Err(error) => {
                    tracing::warn!(
                        peer_addr = %peer_addr,
                        error = %error,
                        "could not run handshake protocol for TLS connection, closing"
                    );
                }
            }
        }
    }
}
