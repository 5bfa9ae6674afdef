use super::key::Key;

// FLOW ENTRY
//
// A flow table entry: a match (key + wildcards), a priority, lifecycle
// bookkeeping, and the action program run on every packet that hits it.
// Struct-with-derive style follows the rest of this codebase's protocol
// records; the "never drop without an explicit release" discipline that
// governs `packet::Packet` governs this type's lifecycle too — a `Flow`
// removed from a table is handed to the caller for deferred free rather
// than dropped in place (see [MODULE chain]).
//
//   Flow - match + bookkeeping + action program
//   Action - tagged action variant
//   ExpiryReason - why a flow timed out
//   MAX_ACTIONS - action list length bound
//   PERMANENT - timeout sentinel disabling idle/hard expiry

pub const MAX_ACTIONS: usize = 16;

// idle_timeout/hard_timeout sentinel meaning "never expires".
pub const PERMANENT: u16 = 0;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Action {
    Output { port: u16, max_len: u16 },
    SetVlanVid(u16),
    SetVlanPcp(u16),
    StripVlan,
    SetDlSrc([u8; 6]),
    SetDlDst([u8; 6]),
    SetNwSrc(u32),
    SetNwDst(u32),
    SetTpSrc(u16),
    SetTpDst(u16),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExpiryReason {
    IdleTimeout,
    HardTimeout,
}

#[derive(Clone, Debug)]
pub struct Flow {
    pub key: Key,
    pub wildcards: u32,
    pub priority: u16,
    pub idle_timeout: u16,
    pub hard_timeout: u16,
    pub created_at: u64,
    pub used_at: u64,
    pub packet_count: u64,
    pub byte_count: u64,
    pub actions: Vec<Action>,
}

impl Flow {
    pub fn new(key: Key, wildcards: u32, priority: u16, now: u64) -> Flow {
        Flow {
            key,
            wildcards,
            priority,
            idle_timeout: PERMANENT,
            hard_timeout: PERMANENT,
            created_at: now,
            used_at: now,
            packet_count: 0,
            byte_count: 0,
            actions: Vec::new(),
        }
    }

    // touch: record a packet hitting this flow, per spec.md §4.9 "hit".
    pub fn touch(&mut self, now: u64, bytes: u64) {
        self.used_at = now;
        self.packet_count += 1;
        self.byte_count += bytes;
    }

    // expiry: has this flow timed out as of `now`? Idle is checked before
    // hard, per spec.md §4.6.
    pub fn expiry(&self, now: u64) -> Option<ExpiryReason> {
        if self.idle_timeout != PERMANENT && now > self.used_at + self.idle_timeout as u64 {
            return Some(ExpiryReason::IdleTimeout);
        }
        if self.hard_timeout != PERMANENT && now > self.created_at + self.hard_timeout as u64 {
            return Some(ExpiryReason::HardTimeout);
        }
        None
    }

    // is_exact: a flow with wildcards==0 belongs only in the hash tables;
    // otherwise only in the linear table (spec.md §3 invariant).
    pub fn is_exact(&self) -> bool {
        self.wildcards == 0
    }
}

// validate_actions: insert-time loop-prevention (spec.md §4.7). Rejects
// any Output naming TABLE, NONE, or the ingress port of the match itself.
pub fn validate_actions(actions: &[Action], in_port: u16) -> Result<(), super::error::OfpError> {
    use super::ofp;
    if actions.len() > MAX_ACTIONS {
        return Err(super::error::OfpError::BadAction);
    }
    for action in actions {
        if let Action::Output { port, .. } = action {
            if *port == ofp::OFPP_TABLE || *port == ofp::OFPP_NONE || *port == in_port {
                return Err(super::error::OfpError::BadAction);
            }
        }
    }
    Ok(())
}
