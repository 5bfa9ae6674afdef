use crc::{Algorithm, Crc, CRC_32_BZIP2, CRC_32_ISO_HDLC};

use crate::flow::{Action, ExpiryReason, Flow};
use crate::key::{self, Key, MatchTemplate};

// EXACT-HASH TABLE
//
// A power-of-two bucket array over exact (wildcards==0) flows, one entry
// per bucket — no chaining on the hot path, matching spec.md §4.3. The
// hash is a CRC32, computed over a field-order-stable byte serialization
// of `Key` rather than its in-memory layout (`Key` isn't `repr(C)`, so the
// compiler is free to reorder/pad its fields).
//
//   ExactHashTable - single polynomial, single bucket array
//   DoubleHashTable - two ExactHashTables with distinct polynomials

fn key_bytes(key: &Key) -> [u8; 31] {
    let mut buf = [0u8; 31];
    buf[0..2].copy_from_slice(&key.in_port.to_be_bytes());
    buf[2..4].copy_from_slice(&key.dl_vlan.to_be_bytes());
    buf[4..10].copy_from_slice(&key.dl_src);
    buf[10..16].copy_from_slice(&key.dl_dst);
    buf[16..18].copy_from_slice(&key.dl_type.to_be_bytes());
    buf[18..22].copy_from_slice(&key.nw_src.to_be_bytes());
    buf[22..26].copy_from_slice(&key.nw_dst.to_be_bytes());
    buf[26] = key.nw_proto;
    buf[27..29].copy_from_slice(&key.tp_src.to_be_bytes());
    buf[29..31].copy_from_slice(&key.tp_dst.to_be_bytes());
    buf
}

pub struct ExactHashTable {
    crc: Crc<u32>,
    mask: u32,
    buckets: Vec<Option<Flow>>,
}

impl ExactHashTable {
    pub fn new(algorithm: &'static Algorithm<u32>, capacity_pow2: u32) -> ExactHashTable {
        let size = 1usize << capacity_pow2;
        ExactHashTable {
            crc: Crc::<u32>::new(algorithm),
            mask: (size - 1) as u32,
            buckets: (0..size).map(|_| None).collect(),
        }
    }

    fn bucket_index(&self, key: &Key) -> usize {
        (self.crc.checksum(&key_bytes(key)) & self.mask) as usize
    }

    pub fn len(&self) -> usize {
        self.buckets.iter().filter(|b| b.is_some()).count()
    }

    pub fn lookup(&self, key: &Key) -> Option<&Flow> {
        let idx = self.bucket_index(key);
        match &self.buckets[idx] {
            Some(flow) if &flow.key == key => Some(flow),
            _ => None,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &Flow> {
        self.buckets.iter().filter_map(|slot| slot.as_ref())
    }

    pub fn lookup_mut(&mut self, key: &Key) -> Option<&mut Flow> {
        let idx = self.bucket_index(key);
        match &mut self.buckets[idx] {
            Some(flow) if &flow.key == key => Some(flow),
            _ => None,
        }
    }

    // insert: rejects non-exact flows and bucket collisions with a
    // *different* key, per spec.md §4.3 — in both cases the caller tries
    // the next table. On a same-key collision the old entry is replaced
    // and handed back for deferred release.
    pub fn insert(&mut self, flow: Flow) -> Result<Option<Flow>, Flow> {
        if flow.wildcards != 0 {
            return Err(flow);
        }
        let idx = self.bucket_index(&flow.key);
        match self.buckets[idx].take() {
            Some(existing) if existing.key == flow.key => {
                self.buckets[idx] = Some(flow);
                Ok(Some(existing))
            }
            Some(existing) => {
                self.buckets[idx] = Some(existing);
                Err(flow)
            }
            None => {
                self.buckets[idx] = Some(flow);
                Ok(None)
            }
        }
    }

    // delete: direct probe for an exact key; a wildcarded template (admin
    // delete) instead walks every bucket and removes entries it overlaps.
    pub fn delete(&mut self, key: &Key, wildcards: u32, strict: bool) -> Vec<Flow> {
        if wildcards == 0 {
            let idx = self.bucket_index(key);
            if matches!(&self.buckets[idx], Some(flow) if &flow.key == key) {
                return self.buckets[idx].take().into_iter().collect();
            }
            return Vec::new();
        }
        let template = MatchTemplate { key: *key, wildcards };
        let mut removed = Vec::new();
        for slot in self.buckets.iter_mut() {
            let matches = match slot {
                Some(flow) => {
                    if strict {
                        flow.wildcards == wildcards && &flow.key == key
                    } else {
                        key::overlaps(&template, &MatchTemplate::exact(flow.key))
                    }
                }
                None => false,
            };
            if matches {
                removed.push(slot.take().unwrap());
            }
        }
        removed
    }

    pub fn timeout(&mut self, now: u64) -> Vec<(Flow, ExpiryReason)> {
        let mut expired = Vec::new();
        for slot in self.buckets.iter_mut() {
            let reason = slot.as_ref().and_then(|flow| flow.expiry(now));
            if let Some(reason) = reason {
                expired.push((slot.take().unwrap(), reason));
            }
        }
        expired
    }

    // modify: same matching predicate as delete, but replaces the action
    // list of every entry it matches instead of removing it. Returns the
    // count of entries touched.
    pub fn modify(&mut self, key: &Key, wildcards: u32, strict: bool, actions: &[Action]) -> usize {
        let template = MatchTemplate { key: *key, wildcards };
        let mut count = 0;
        for slot in self.buckets.iter_mut() {
            let matched = match slot {
                Some(flow) => {
                    if strict {
                        flow.wildcards == wildcards && &flow.key == key
                    } else {
                        key::overlaps(&template, &MatchTemplate::exact(flow.key))
                    }
                }
                None => false,
            };
            if matched {
                slot.as_mut().unwrap().actions = actions.to_vec();
                count += 1;
            }
        }
        count
    }
}

pub struct DoubleHashTable {
    first: ExactHashTable,
    second: ExactHashTable,
}

impl DoubleHashTable {
    pub fn new(capacity_pow2: u32) -> DoubleHashTable {
        DoubleHashTable {
            first: ExactHashTable::new(&CRC_32_ISO_HDLC, capacity_pow2),
            second: ExactHashTable::new(&CRC_32_BZIP2, capacity_pow2),
        }
    }

    pub fn len(&self) -> usize {
        self.first.len() + self.second.len()
    }

    pub fn lookup(&self, key: &Key) -> Option<&Flow> {
        self.first.lookup(key).or_else(|| self.second.lookup(key))
    }

    pub fn lookup_mut(&mut self, key: &Key) -> Option<&mut Flow> {
        if self.first.lookup(key).is_some() {
            return self.first.lookup_mut(key);
        }
        self.second.lookup_mut(key)
    }

    pub fn insert(&mut self, flow: Flow) -> Result<Option<Flow>, Flow> {
        match self.first.insert(flow) {
            Ok(old) => Ok(old),
            Err(flow) => self.second.insert(flow),
        }
    }

    pub fn delete(&mut self, key: &Key, wildcards: u32, strict: bool) -> Vec<Flow> {
        let mut removed = self.first.delete(key, wildcards, strict);
        removed.extend(self.second.delete(key, wildcards, strict));
        removed
    }

    pub fn timeout(&mut self, now: u64) -> Vec<(Flow, ExpiryReason)> {
        let mut expired = self.first.timeout(now);
        expired.extend(self.second.timeout(now));
        expired
    }

    pub fn modify(&mut self, key: &Key, wildcards: u32, strict: bool, actions: &[Action]) -> usize {
        self.first.modify(key, wildcards, strict, actions) + self.second.modify(key, wildcards, strict, actions)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Flow> {
        self.first.iter().chain(self.second.iter())
    }
}

#[cfg(test)]
mod selftest {
    use super::*;
    use crate::key::Key;

    fn flow(port: u16, priority: u16) -> Flow {
        Flow::new(Key::new(port), 0, priority, 0)
    }

    #[test]
    fn insert_then_lookup_hits() {
        let mut t = ExactHashTable::new(&CRC_32_ISO_HDLC, 4);
        let f = flow(1, 0);
        let key = f.key;
        assert!(t.insert(f).unwrap().is_none());
        assert_eq!(t.lookup(&key).unwrap().key, key);
    }

    #[test]
    fn insert_rejects_wildcarded() {
        let mut t = ExactHashTable::new(&CRC_32_ISO_HDLC, 4);
        let f = Flow::new(Key::new(1), key::IN_PORT, 0, 0);
        assert!(t.insert(f).is_err());
    }

    #[test]
    fn duplicate_key_replaces_and_returns_old() {
        let mut t = ExactHashTable::new(&CRC_32_ISO_HDLC, 4);
        let a = flow(1, 0);
        let key = a.key;
        t.insert(a).unwrap();
        let mut b = flow(1, 0);
        b.packet_count = 7;
        let old = t.insert(b).unwrap().unwrap();
        assert_eq!(old.packet_count, 0);
        assert_eq!(t.lookup(&key).unwrap().packet_count, 7);
    }

    #[test]
    fn double_hash_tries_second_on_collision() {
        // Force a collision in the first table by using a 1-bucket table
        // via a DoubleHashTable built directly from two tiny ExactHashTables.
        let mut first = ExactHashTable::new(&CRC_32_ISO_HDLC, 0);
        let mut second = ExactHashTable::new(&CRC_32_BZIP2, 0);
        let a = flow(1, 0);
        let b = flow(2, 0);
        assert!(first.insert(a).is_ok());
        assert!(first.insert(b.clone()).is_err());
        assert!(second.insert(b).is_ok());
    }

    #[test]
    fn timeout_removes_expired() {
        let mut t = ExactHashTable::new(&CRC_32_ISO_HDLC, 4);
        let mut f = flow(1, 0);
        f.idle_timeout = 1;
        f.used_at = 0;
        t.insert(f).unwrap();
        let expired = t.timeout(10);
        assert_eq!(expired.len(), 1);
        assert_eq!(expired[0].1, ExpiryReason::IdleTimeout);
    }

    #[test]
    fn wildcarded_delete_walks_and_overlaps() {
        let mut t = ExactHashTable::new(&CRC_32_ISO_HDLC, 4);
        let f = flow(1, 0);
        let key = f.key;
        t.insert(f).unwrap();
        let removed = t.delete(&key, key::IN_PORT, false);
        assert_eq!(removed.len(), 1);
        assert!(t.lookup(&key).is_none());
    }
}
