use crate::flow::{Action, ExpiryReason, Flow};
use crate::key::{self, Key, MatchTemplate};

// LINEAR-PRIORITY TABLE
//
// Holds wildcarded flows (wildcards != 0) in non-increasing priority
// order; ties break by insertion age, older first (spec.md §4.4). Bounded
// by `TABLE_LINEAR_MAX_FLOWS` so the O(n) scan stays acceptable.

pub const MAX_FLOWS: usize = 1000;

pub struct LinearTable {
    entries: Vec<Flow>,
}

impl LinearTable {
    pub fn new() -> LinearTable {
        LinearTable { entries: Vec::new() }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    // lookup: first entry, in priority order, whose key+wildcards match
    // the packet key under the §4.5 predicate.
    pub fn lookup(&self, packet_key: &Key) -> Option<&Flow> {
        self.entries
            .iter()
            .find(|flow| key::matches(packet_key, &flow.key, flow.wildcards))
    }

    pub fn lookup_mut(&mut self, packet_key: &Key) -> Option<&mut Flow> {
        self.entries
            .iter_mut()
            .find(|flow| key::matches(packet_key, &flow.key, flow.wildcards))
    }

    // insert: admits only wildcarded flows. An entry with the identical
    // (key, wildcards, priority) is replaced in place (preserving its
    // position so insertion order among same-priority entries holds) and
    // the old entry handed back for deferred release. A fresh entry is
    // inserted after every existing entry of equal-or-higher priority, so
    // ties fall back to insertion order.
    pub fn insert(&mut self, flow: Flow) -> Result<Option<Flow>, Flow> {
        if flow.wildcards == 0 {
            return Err(flow);
        }
        if let Some(slot) = self.entries.iter_mut().find(|f| {
            f.key == flow.key && f.wildcards == flow.wildcards && f.priority == flow.priority
        }) {
            return Ok(Some(std::mem::replace(slot, flow)));
        }
        if self.entries.len() >= MAX_FLOWS {
            return Err(flow);
        }
        let pos = self
            .entries
            .iter()
            .position(|f| f.priority < flow.priority)
            .unwrap_or(self.entries.len());
        self.entries.insert(pos, flow);
        Ok(None)
    }

    // delete: strict requires wildcards equality (on top of the §4.5
    // match); non-strict removes every entry the template overlaps.
    pub fn delete(&mut self, key: &Key, wildcards: u32, strict: bool) -> Vec<Flow> {
        let template = MatchTemplate { key: *key, wildcards };
        let mut removed = Vec::new();
        let mut i = 0;
        while i < self.entries.len() {
            let matches = if strict {
                self.entries[i].key == *key && self.entries[i].wildcards == wildcards
            } else {
                key::overlaps(
                    &template,
                    &MatchTemplate { key: self.entries[i].key, wildcards: self.entries[i].wildcards },
                )
            };
            if matches {
                removed.push(self.entries.remove(i));
            } else {
                i += 1;
            }
        }
        removed
    }

    pub fn timeout(&mut self, now: u64) -> Vec<(Flow, ExpiryReason)> {
        let mut expired = Vec::new();
        let mut i = 0;
        while i < self.entries.len() {
            if let Some(reason) = self.entries[i].expiry(now) {
                expired.push((self.entries.remove(i), reason));
            } else {
                i += 1;
            }
        }
        expired
    }

    pub fn iter(&self) -> impl Iterator<Item = &Flow> {
        self.entries.iter()
    }

    pub fn modify(&mut self, key: &Key, wildcards: u32, strict: bool, actions: &[Action]) -> usize {
        let template = MatchTemplate { key: *key, wildcards };
        let mut count = 0;
        for entry in self.entries.iter_mut() {
            let matched = if strict {
                entry.key == *key && entry.wildcards == wildcards
            } else {
                key::overlaps(&template, &MatchTemplate { key: entry.key, wildcards: entry.wildcards })
            };
            if matched {
                entry.actions = actions.to_vec();
                count += 1;
            }
        }
        count
    }
}
