//! Proxy lifecycle supervisor.
//!
//! Wires the listener, load balancer and rate-limit registry together,
//! drives the accept loop, and coordinates graceful shutdown: the accept
//! loop stops on the broadcast trigger, in-flight connections drain
//! naturally, and the rate limiters are closed last.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinSet;

use crate::config::{Config, ConfigError};
use crate::lifecycle::Shutdown;
use crate::load_balancer::LeastConnectionBalancer;
use crate::net::connection::ConnectionHandler;
use crate::net::listener::{ListenerError, TlsListener};
use crate::net::tls::{self, TlsError};
use crate::security::rate_limit::RateLimitRegistry;

/// Error type for proxy construction and lifecycle operations.
#[derive(Debug)]
pub enum ProxyError {
    /// The supplied configuration is invalid.
    Config(ConfigError),
    /// The TLS configuration could not be built from the PEM material.
    Tls(TlsError),
    /// The listener could not bind.
    Bind(std::io::Error),
    /// `serve` was called while the proxy is already serving.
    AlreadyServing,
    /// `close` was called on a proxy that is not serving.
    NotServing,
}

impl std::fmt::Display for ProxyError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProxyError::Config(e) => write!(f, "invalid configuration: {}", e),
            ProxyError::Tls(e) => write!(f, "failure loading TLS configuration: {}", e),
            ProxyError::Bind(e) => write!(f, "error listening: {}", e),
            ProxyError::AlreadyServing => write!(f, "cannot serve as proxy is already serving"),
            ProxyError::NotServing => write!(f, "cannot close a proxy that is not serving"),
        }
    }
}

impl std::error::Error for ProxyError {}

/// An instance of the TCP proxy. Construct with [`Proxy::new`], run with
/// [`Proxy::serve`], stop with [`Proxy::close`].
pub struct Proxy {
    listener: TlsListener,
    load_balancer: Arc<LeastConnectionBalancer>,
    rate_limits: Option<Arc<RateLimitRegistry>>,
    authorized_groups: Arc<HashSet<String>>,
    upstream_name: Arc<str>,
    shutdown: Shutdown,
    serving: AtomicBool,
}

impl Proxy {
    /// Validate `config`, build the TLS configuration, and bind the
    /// listener. On success the proxy is ready to serve.
    pub async fn new(config: Config) -> Result<Self, ProxyError> {
        config.validate().map_err(ProxyError::Config)?;

        let tls_config = match tls::server_config(&config.listener) {
            Ok(tls_config) => tls_config,
            Err(error) => {
                tracing::error!(error = %error, "failure loading TLS configuration");
                return Err(ProxyError::Tls(error));
            }
        };

        let listener = TlsListener::bind(&config.listener.listen_addr, tls_config)
            .await
            .map_err(|error| match error {
                ListenerError::Bind { source, .. } | ListenerError::Accept(source) => {
                    ProxyError::Bind(source)
                }
            })?;

        let load_balancer = LeastConnectionBalancer::new(&config.upstream.targets)
            .map_err(|_| ProxyError::Config(ConfigError::NoTargets))?;

        let rate_limits = config
            .rate_limit
            .map(|template| Arc::new(RateLimitRegistry::new(template.capacity, template.fill_interval)));

        let proxy = Self {
            listener,
            load_balancer: Arc::new(load_balancer),
            rate_limits,
            authorized_groups: Arc::new(config.upstream.authorized_groups),
            upstream_name: config.upstream.name.into(),
            shutdown: Shutdown::new(),
            serving: AtomicBool::new(false),
        };

        tracing::info!(
            listening = %proxy.address(),
            targets = %config.upstream.targets.join(","),
            upstream_name = %proxy.upstream_name,
            "proxy ready"
        );

        Ok(proxy)
    }

    /// Full address and port the proxy is serving on, e.g. `127.0.0.1:5000`.
    pub fn address(&self) -> String {
        self.listener
            .local_addr()
            .map(|addr| addr.to_string())
            .unwrap_or_default()
    }

    /// Accept connections until [`Proxy::close`] is observed, dispatching
    /// each to its own task. Exactly-once: a second call while serving
    /// returns [`ProxyError::AlreadyServing`].
    pub async fn serve(&self) -> Result<(), ProxyError> {
        // Subscribe before publishing the serving flag, so a close() racing
        // this call cannot trigger the broadcast before anyone listens.
        let mut stop = self.shutdown.subscribe();

        if self.serving.swap(true, Ordering::SeqCst) {
            return Err(ProxyError::AlreadyServing);
        }
        self.shutdown.begin();

        let mut connections: JoinSet<()> = JoinSet::new();

        loop {
            tokio::select! {
                _ = stop.recv() => break,
                accepted = self.listener.accept() => match accepted {
                    Ok(conn) => {
                        let handler = ConnectionHandler::new(
                            Arc::clone(&self.load_balancer),
                            self.rate_limits.clone(),
                            Arc::clone(&self.authorized_groups),
                            Arc::clone(&self.upstream_name),
                        );
                        connections.spawn(handler.run(conn));
                    }
                    Err(error) => {
                        // Transient accept failures must not take the proxy
                        // down. Brief sleep to avoid a tight loop on
                        // persistent errors, skipped once shutdown is under
                        // way so the backoff cannot delay the drain.
                        tracing::warn!(error = %error, "accept failed");
                        if !self.shutdown.is_triggered() {
                            tokio::time::sleep(Duration::from_millis(100)).await;
                        }
                    }
                },
            }
        }

        // Drain in-flight connections; they finish when either endpoint
        // closes, and are never aborted.
        while connections.join_next().await.is_some() {}
        self.shutdown.mark_drained();

        Ok(())
    }

    /// Stop serving: trigger shutdown, wait for the serve loop and every
    /// in-flight connection to finish, then close the rate-limit registry.
    pub async fn close(&self) -> Result<(), ProxyError> {
        if !self.serving.load(Ordering::SeqCst) {
            return Err(ProxyError::NotServing);
        }

        self.shutdown.trigger();
        self.shutdown.wait_drained().await;

        if let Some(rate_limits) = &self.rate_limits {
            rate_limits.close().await;
        }

        self.serving.store(false, Ordering::SeqCst);

        Ok(())
    }
}
