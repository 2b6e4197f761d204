//! Firewall authority (spec §4.3) — a single caller-supplied policy oracle, consulted at most
//! once per SYN. The core caches no decision beyond the per-flow `should_filter` bit; this
//! wrapper just owns the callback and gives it a name at call sites.

use std::sync::Arc;

/// `permits` receives the resolved binary path and returns whether it may reach the network.
pub type PermitsFn = dyn Fn(&str) -> bool + Send + Sync;

/// Wraps the caller-supplied firewall callback (spec §6: `firewall_check(binary_path, len)`).
#[derive(Clone)]
pub struct FirewallAuthority {
    permits: Arc<PermitsFn>,
}

impl FirewallAuthority {
    pub fn new(permits: impl Fn(&str) -> bool + Send + Sync + 'static) -> Self {
        Self { permits: Arc::new(permits) }
    }

    /// A permissive stand-in for platforms/tests with no real firewall integration — everything
    /// is allowed outbound.
    pub fn allow_all() -> Self {
        Self::new(|_| true)
    }

    /// A restrictive stand-in that denies everything — useful for exercising the deny path.
    pub fn deny_all() -> Self {
        Self::new(|_| false)
    }

    /// Consults the callback exactly once. Callers must only invoke this on a SYN (spec §4.3:
    /// "invoked at most once per SYN").
    pub fn permits(&self, binary_path: &str) -> bool {
        (self.permits)(binary_path)
    }
}

impl std::fmt::Debug for FirewallAuthority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FirewallAuthority").finish_non_exhaustive()
    }
}
