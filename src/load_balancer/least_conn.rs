//! Least Connections load balancing strategy.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::load_balancer::upstream::{Upstream, UpstreamGuard};

/// Error returned when constructing a balancer without any targets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmptyTargets;

impl std::fmt::Display for EmptyTargets {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "cannot initialize a least-connection balancer with zero targets")
    }
}

impl std::error::Error for EmptyTargets {}

/// Load balancer favoring the upstream with the fewest active connections.
///
/// The selection scan and the checkout increment run under a single lock, so
/// two concurrent checkouts can never both land on a stale minimum. Releases
/// take the same lock to keep counters consistent with in-progress scans.
#[derive(Debug)]
pub struct LeastConnectionBalancer {
    /// Upstreams in configuration order. The order is the tie-break.
    upstreams: Vec<Arc<Upstream>>,
    select_lock: Mutex<()>,
}

impl LeastConnectionBalancer {
    /// Build a balancer over `targets`. Fails if the list is empty.
    pub fn new(targets: &[String]) -> Result<Self, EmptyTargets> {
        if targets.is_empty() {
            return Err(EmptyTargets);
        }

        Ok(Self {
            upstreams: targets
                .iter()
                .map(|target| Arc::new(Upstream::new(target.clone())))
                .collect(),
            select_lock: Mutex::new(()),
        })
    }

    /// Check out the upstream with the fewest active connections.
    ///
    /// The returned guard holds the checkout; dropping it releases the slot.
    pub fn checkout(self: &Arc<Self>) -> UpstreamGuard {
        let upstream = {
            let _guard = self.select_lock.lock().expect("selection mutex poisoned");
            let upstream = self.least_active();
            upstream.increment();
            Arc::clone(upstream)
        };

        UpstreamGuard::new(Arc::clone(self), upstream)
    }

    /// Release a checkout. Saturates at zero, tolerating a double release.
    pub fn release(&self, upstream: &Upstream) {
        let _guard = self.select_lock.lock().expect("selection mutex poisoned");
        upstream.decrement();
    }

    /// Current active-connection counters, keyed by upstream address.
    pub fn snapshot(&self) -> HashMap<String, usize> {
        let _guard = self.select_lock.lock().expect("selection mutex poisoned");
        self.upstreams
            .iter()
            .map(|upstream| (upstream.address().to_string(), upstream.active_connections()))
            .collect()
    }

    /// Scan upstreams in insertion order. Any idle upstream wins immediately;
    /// otherwise the strictly smallest counter does, first seen on ties.
    fn least_active(&self) -> &Arc<Upstream> {
        let mut least = &self.upstreams[0];
        for upstream in &self.upstreams {
            let active = upstream.active_connections();
            if active == 0 {
                return upstream;
            }
            if active < least.active_connections() {
                least = upstream;
            }
        }

        least
    }
}
