use thiserror::Error;

// ERROR TYPES
//
// Recoverable error conditions reported back to the controller as OFPT_ERROR
// messages (spec §7), plus a handful of internal error conditions that
// stay local and never cross the wire.

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum OfpError {
    #[error("unsupported protocol version")]
    BadVersion,

    #[error("unknown or unimplemented message type")]
    BadType,

    #[error("declared length inconsistent with message")]
    BadLength,

    #[error("action program contains a disallowed target")]
    BadAction,

    #[error("referenced buffer is unknown or has been evicted")]
    BufferUnknown,

    #[error("no table accepted the flow")]
    FlowTableFull,
}

impl OfpError {
    /// OFPET_* error_type / error_code pair used to encode this error into
    /// an `ofp::Error` wire message (see [MODULE ofp]).
    pub fn wire_codes(&self) -> (u16, u16) {
        match self {
            OfpError::BadVersion => (crate::ofp::OFPET_BAD_REQUEST, 0),
            OfpError::BadType => (crate::ofp::OFPET_BAD_REQUEST, 1),
            OfpError::BadLength => (crate::ofp::OFPET_BAD_REQUEST, 2),
            OfpError::BadAction => (crate::ofp::OFPET_BAD_ACTION, 0),
            OfpError::BufferUnknown => (crate::ofp::OFPET_BAD_REQUEST, 4),
            OfpError::FlowTableFull => (crate::ofp::OFPET_FLOW_MOD_FAILED, 0),
        }
    }
}

pub type Result<T> = std::result::Result<T, OfpError>;
