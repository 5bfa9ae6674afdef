use crc::CRC_32_ISO_HDLC;

use crate::flow::{ExpiryReason, Flow};
use crate::key::Key;
use crate::table_hash::{DoubleHashTable, ExactHashTable};
use crate::table_linear::LinearTable;

// CHAIN
//
// The fixed three-table composition of spec.md §4.6: an exact-hash table,
// a double-hash table, and a linear-priority table, tried in that order
// on every lookup and insert. The first table to accept an insert owns
// the flow; the first table to match a lookup wins.

pub const HASH_TABLE_CAPACITY_BITS: u32 = 14;

pub struct Chain {
    exact: ExactHashTable,
    double: DoubleHashTable,
    linear: LinearTable,
}

impl Chain {
    pub fn new() -> Chain {
        Chain {
            exact: ExactHashTable::new(&CRC_32_ISO_HDLC, HASH_TABLE_CAPACITY_BITS),
            double: DoubleHashTable::new(HASH_TABLE_CAPACITY_BITS),
            linear: LinearTable::new(),
        }
    }

    pub fn flow_count(&self) -> usize {
        self.exact.len() + self.double.len() + self.linear.len()
    }

    pub fn lookup(&self, packet_key: &Key) -> Option<&Flow> {
        self.exact
            .lookup(packet_key)
            .or_else(|| self.double.lookup(packet_key))
            .or_else(|| self.linear.lookup(packet_key))
    }

    // lookup_mut: same search order as lookup, for the forwarder's hit-path
    // bookkeeping update (packet/byte counters, used_at) on the matched flow.
    pub fn lookup_mut(&mut self, packet_key: &Key) -> Option<&mut Flow> {
        if self.exact.lookup(packet_key).is_some() {
            return self.exact.lookup_mut(packet_key);
        }
        if self.double.lookup(packet_key).is_some() {
            return self.double.lookup_mut(packet_key);
        }
        self.linear.lookup_mut(packet_key)
    }

    // insert: tries exact, then double, then linear; the flow's own
    // wildcards field routes it (tables reject what they can't hold, per
    // §4.3/§4.4), so at most one of the three ever actually accepts it.
    // Returns the replaced entry, if any, for deferred release, or
    // `Err(flow)` (handed back to the caller) if no table had capacity.
    pub fn insert(&mut self, flow: Flow) -> Result<Option<Flow>, Flow> {
        let flow = match self.exact.insert(flow) {
            Ok(old) => return Ok(old),
            Err(flow) => flow,
        };
        let flow = match self.double.insert(flow) {
            Ok(old) => return Ok(old),
            Err(flow) => flow,
        };
        self.linear.insert(flow)
    }

    // modify: spec.md §4.10's MODIFY/MODIFY_STRICT, replacing the action
    // list of every matching entry across all three tables in place.
    pub fn modify(&mut self, key: &Key, wildcards: u32, strict: bool, actions: &[crate::flow::Action]) -> usize {
        self.exact.modify(key, wildcards, strict, actions)
            + self.double.modify(key, wildcards, strict, actions)
            + self.linear.modify(key, wildcards, strict, actions)
    }

    // table_counts: (exact, double, linear) active-entry counts, for
    // FEATURES_REPLY sizing and STATS_REQUEST table enumeration.
    pub fn table_counts(&self) -> (usize, usize, usize) {
        (self.exact.len(), self.double.len(), self.linear.len())
    }

    // iter_flows: every live flow across all three tables, for
    // STATS_REQUEST's flow enumeration.
    pub fn iter_flows(&self) -> impl Iterator<Item = &Flow> {
        self.exact.iter().chain(self.double.iter()).chain(self.linear.iter())
    }

    pub fn delete(&mut self, key: &Key, wildcards: u32, strict: bool) -> Vec<Flow> {
        let mut removed = self.exact.delete(key, wildcards, strict);
        removed.extend(self.double.delete(key, wildcards, strict));
        removed.extend(self.linear.delete(key, wildcards, strict));
        removed
    }

    pub fn timeout(&mut self, now: u64) -> Vec<(Flow, ExpiryReason)> {
        let mut expired = self.exact.timeout(now);
        expired.extend(self.double.timeout(now));
        expired.extend(self.linear.timeout(now));
        expired
    }
}

#[cfg(test)]
mod selftest {
    use super::*;
    use crate::ethernet;
    use crate::ipv4;

    #[test]
    fn exact_flow_routes_to_hash_table() {
        let mut c = Chain::new();
        let key = Key::new(1);
        let f = Flow::new(key, 0, 0, 0);
        assert!(c.insert(f).unwrap().is_none());
        assert_eq!(c.lookup(&key).unwrap().key, key);
        assert_eq!(c.flow_count(), 1);
    }

    #[test]
    fn wildcard_flow_routes_to_linear_table() {
        let mut c = Chain::new();
        let mut key = Key::new(crate::key::NONE);
        key.dl_type = ethernet::TYPE_IPV4;
        key.nw_src = ipv4::pton("10.0.0.0");
        let wildcards = crate::key::with_nw_src_bits(crate::key::ALL & !crate::key::DL_TYPE, 24);
        let f = Flow::new(key, wildcards, 100, 0);
        assert!(c.insert(f).unwrap().is_none());

        let mut packet_key = Key::new(1);
        packet_key.dl_type = ethernet::TYPE_IPV4;
        packet_key.nw_src = ipv4::pton("10.0.0.5");
        assert!(c.lookup(&packet_key).is_some());
    }

    #[test]
    fn delete_sums_across_tables() {
        let mut c = Chain::new();
        let key = Key::new(2);
        c.insert(Flow::new(key, 0, 0, 0)).unwrap();
        let removed = c.delete(&key, 0, true);
        assert_eq!(removed.len(), 1);
        assert!(c.lookup(&key).is_none());
    }

    #[test]
    fn timeout_sweeps_every_table() {
        let mut c = Chain::new();
        let key = Key::new(3);
        let mut f = Flow::new(key, 0, 0, 0);
        f.hard_timeout = 1;
        c.insert(f).unwrap();
        let expired = c.timeout(100);
        assert_eq!(expired.len(), 1);
        assert!(c.lookup(&key).is_none());
    }
}
