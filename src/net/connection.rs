//! Per-connection proxy pipeline.
//!
//! # State Machine
//! ```text
//! Accepted → Authorized → (RateAllowed) → UpstreamDialed → Piping → Closed
//! ```
//! Any state transitions directly to Closed on error. Errors are terminal
//! for the connection and never reach the proxy's serve loop.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::task::JoinSet;
use tracing::Instrument;
use uuid::Uuid;

use crate::load_balancer::LeastConnectionBalancer;
use crate::net::listener::AuthenticatedConn;
use crate::observability::metrics;
use crate::security::access_control::authorize_peer;
use crate::security::rate_limit::RateLimitRegistry;

/// How long to wait when connecting to an upstream before giving up.
pub const DIAL_TIMEOUT: Duration = Duration::from_secs(5);

/// Everything one connection task needs. Cloned per accepted connection.
#[derive(Clone)]
pub struct ConnectionHandler {
    load_balancer: Arc<LeastConnectionBalancer>,
    rate_limits: Option<Arc<RateLimitRegistry>>,
    authorized_groups: Arc<HashSet<String>>,
    upstream_name: Arc<str>,
}

impl ConnectionHandler {
    pub fn new(
        load_balancer: Arc<LeastConnectionBalancer>,
        rate_limits: Option<Arc<RateLimitRegistry>>,
        authorized_groups: Arc<HashSet<String>>,
        upstream_name: Arc<str>,
    ) -> Self {
        Self {
            load_balancer,
            rate_limits,
            authorized_groups,
            upstream_name,
        }
    }

    /// Run the full pipeline for one authenticated client connection.
    pub async fn run(self, conn: AuthenticatedConn) {
        let span = tracing::info_span!(
            "connection",
            id = %Uuid::new_v4(),
            peer_addr = %conn.peer_addr,
            upstream_name = %self.upstream_name,
        );
        self.handle(conn).instrument(span).await
    }

    async fn handle(self, conn: AuthenticatedConn) {
        // 1. Authorize against the peer certificate chain. Dropping the
        //    stream closes the connection; no upstream is consumed.
        let peer_certificates = conn.peer_certificates();
        let Some(identity) = authorize_peer(&peer_certificates, &self.authorized_groups) else {
            tracing::warn!("user is not authorized to access upstream");
            metrics::record_connection_rejected("unauthorized");
            return;
        };

        // 2. Rate-limit on the user half of the identity, when configured.
        if let Some(rate_limits) = &self.rate_limits {
            if !rate_limits.for_client(&identity.user).try_acquire() {
                tracing::warn!(user = %identity.user, "user exceeded rate limit, closing connection");
                metrics::record_connection_rejected("rate_limited");
                return;
            }
        }

        // 3. Check out an upstream. The guard releases on every exit path
        //    from here on, dial failures and panics included.
        let upstream = self.load_balancer.checkout();

        // 4. Dial with a bounded timeout.
        let target = match tokio::time::timeout(DIAL_TIMEOUT, TcpStream::connect(upstream.address())).await
        {
            Ok(Ok(stream)) => stream,
            Ok(Err(error)) => {
                tracing::error!(upstream = %upstream.address(), error = %error, "connecting to target");
                metrics::record_connection_rejected("dial_failed");
                return;
            }
            Err(_) => {
                tracing::error!(
                    upstream = %upstream.address(),
                    timeout_secs = DIAL_TIMEOUT.as_secs(),
                    "timed out connecting to target"
                );
                metrics::record_connection_rejected("dial_timeout");
                return;
            }
        };

        tracing::debug!(
            user = %identity.user,
            group = %identity.group,
            upstream = %upstream.address(),
            "proxying connection"
        );

        // 5. Pump bytes both ways until either side finishes.
        let (client_read, client_write) = tokio::io::split(conn.stream);
        let (target_read, target_write) = target.into_split();

        let mut pumps = JoinSet::new();
        pumps.spawn(copy_bytes(client_read, target_write, "client_to_upstream"));
        pumps.spawn(copy_bytes(target_read, client_write, "upstream_to_client"));

        // 6. Whichever direction finishes first, tear the other down with it:
        //    shutting the set aborts the remaining pump and drops its
        //    endpoints, so a blocked read cannot keep the pair alive.
        if let Some(result) = pumps.join_next().await {
            if let Err(error) = result {
                tracing::error!(error = %error, "byte pump task failed");
            }
        }
        pumps.shutdown().await;

        metrics::record_connection_complete(upstream.address());
    }
}

/// Copy bytes from `reader` to `writer` until EOF or error, then shut the
/// write side down so the far end observes the close.
async fn copy_bytes<R, W>(mut reader: R, mut writer: W, direction: &'static str)
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    match tokio::io::copy(&mut reader, &mut writer).await {
        Ok(bytes) => {
            tracing::debug!(direction, bytes, "stream finished");
            metrics::record_bytes_proxied(direction, bytes);
        }
        Err(error) => {
            tracing::error!(direction, error = %error, "copying data");
        }
    }

    let _ = writer.shutdown().await;
}
