//! Flow key and the two disjoint per-family decision tables (spec §3).
//!
//! "The pair (address family, local source port). Source port alone is sufficient as a key
//! within one address family because the local host is the endpoint; the design maintains
//! two disjoint tables, one per address family, each keyed by 16-bit port."

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

/// `FlowKey` is a newtype over the 16-bit local source port, not `(u16, SocketAddr)`.
///
/// Spec §9 open question: an implementer targeting a multi-tenant deployment (several hosts
/// sharing one kernel queue) would need to widen this to include the remote endpoint. Kept
/// narrow here per spec.md's single-host assumption; the newtype boundary is what a future
/// widening would change without touching classifier call sites.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FlowKey(pub u16);

impl FlowKey {
    pub fn port(self) -> u16 {
        self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressFamily {
    V4,
    V6,
}

/// One `should_filter` + `owning_pid` slot per possible 16-bit port, for one address family.
///
/// Design note 4: "Atomic arrays of 65536 booleans per family map naturally to a fixed-size
/// array of atomic booleans; no growth, no eviction, no locking." The PID array follows the
/// same discipline (spec §5: "Single-word atomic writes suffice; no memory barrier beyond
/// relaxed ordering is required").
pub struct FlowTable {
    should_filter: Box<[AtomicBool; 65536]>,
    owning_pid: Box<[AtomicU32; 65536]>,
}

impl FlowTable {
    pub fn new() -> Self {
        // `AtomicBool`/`AtomicU32` are not `Copy`, so the const-array literal trick doesn't
        // apply directly; build via Vec and convert, matching a straightforward fixed-size
        // allocation done once at table construction (never resized afterward).
        let should_filter: Vec<AtomicBool> = (0..65536).map(|_| AtomicBool::new(false)).collect();
        let owning_pid: Vec<AtomicU32> = (0..65536).map(|_| AtomicU32::new(0)).collect();
        Self {
            should_filter: should_filter.into_boxed_slice().try_into().unwrap_or_else(|_| {
                unreachable!("65536-element Vec always converts to a 65536-element boxed array")
            }),
            owning_pid: owning_pid.into_boxed_slice().try_into().unwrap_or_else(|_| {
                unreachable!("65536-element Vec always converts to a 65536-element boxed array")
            }),
        }
    }

    /// Written only on SYN (spec §3 invariant), read on every packet of the flow.
    pub fn set(&self, key: FlowKey, should_filter: bool, owning_pid: u32) {
        self.should_filter[key.0 as usize].store(should_filter, Ordering::Relaxed);
        self.owning_pid[key.0 as usize].store(owning_pid, Ordering::Relaxed);
    }

    pub fn should_filter(&self, key: FlowKey) -> bool {
        self.should_filter[key.0 as usize].load(Ordering::Relaxed)
    }

    pub fn owning_pid(&self, key: FlowKey) -> u32 {
        self.owning_pid[key.0 as usize].load(Ordering::Relaxed)
    }
}

impl Default for FlowTable {
    fn default() -> Self {
        Self::new()
    }
}

/// The two disjoint tables from spec §3 — one per address family. "Collisions between two
/// concurrent flows sharing a source port are impossible on a single host" because each
/// family gets its own table.
#[derive(Default)]
pub struct FlowTables {
    pub v4: FlowTable,
    pub v6: FlowTable,
}

impl FlowTables {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn table(&self, family: AddressFamily) -> &FlowTable {
        match family {
            AddressFamily::V4 => &self.v4,
            AddressFamily::V6 => &self.v6,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_table_defaults_to_not_filtered() {
        let table = FlowTable::new();
        let key = FlowKey(51000);
        assert!(!table.should_filter(key));
        assert_eq!(table.owning_pid(key), 0);
    }

    #[test]
    fn test_set_is_visible_on_same_key() {
        let table = FlowTable::new();
        let key = FlowKey(51000);
        table.set(key, true, 1234);
        assert!(table.should_filter(key));
        assert_eq!(table.owning_pid(key), 1234);
    }

    #[test]
    fn test_stale_entry_overwritten_on_syn_reuse() {
        let table = FlowTable::new();
        let key = FlowKey(52000);
        table.set(key, true, 5555);
        // Port reused by a new flow for a different, disallowed process.
        table.set(key, false, 6000);
        assert!(!table.should_filter(key));
        assert_eq!(table.owning_pid(key), 6000);
    }

    #[test]
    fn test_v4_and_v6_tables_are_disjoint() {
        let tables = FlowTables::new();
        let key = FlowKey(51000);
        tables.v4.set(key, true, 111);
        assert!(tables.table(AddressFamily::V4).should_filter(key));
        assert!(!tables.table(AddressFamily::V6).should_filter(key));
        assert_eq!(tables.table(AddressFamily::V6).owning_pid(key), 0);
    }

    #[test]
    fn test_port_zero_and_max_are_valid_slots() {
        let table = FlowTable::new();
        table.set(FlowKey(0), true, 1);
        table.set(FlowKey(65535), true, 2);
        assert!(table.should_filter(FlowKey(0)));
        assert!(table.should_filter(FlowKey(65535)));
    }
}
