use super::lib;
use super::header;
use crate::ethernet::MacAddress;
use super::ipv4;
use crate::key::{Key, MatchTemplate};
use super::flow::Action;
use super::error::{OfpError, Result};

use byteorder::{ByteOrder, NetworkEndian};

// WIRE PROTOCOL (OpenFlow v0x83)
//
// Fixed-size wire structs use the same `header::Header<T>` box-and-accessor
// idiom as every other protocol header in this codebase (ethernet, ipv4,
// tcp, udp). Messages with a variable-length tail (action lists, port
// lists, opaque payloads) are framed as a fixed `Header<T>` prefix plus
// plain encode/decode functions operating on byte slices with
// `byteorder::NetworkEndian`, the same way the retrieval pack's
// `little-dude/ofpkt`-style wire-view parsers lay out variable `packet_in`
// bodies.
//
//   VERSION - the supported wire version byte (0x83)
//   OfpHeader - the common 8-byte message header
//   Match - wire layout of a 40-byte match
//   PhyPort - wire layout of a port description
//   OFPT_* - message type codes
//   OFPP_* - sentinel port numbers
//   OFPET_* - error_type codes
//   NO_BUFFER - buffer_id sentinel ("no buffer")
//   decode_actions/encode_actions - action list <-> wire bytes
//   FlowModCommand, ConfigFlags, - semantic enums/bitflags for message bodies
//   validate_header - version/length/type admission check (§4.10)

pub const VERSION: u8 = 0x83;

pub const OFPT_HELLO: u8 = 0;
pub const OFPT_ERROR: u8 = 1;
pub const OFPT_ECHO_REQUEST: u8 = 2;
pub const OFPT_ECHO_REPLY: u8 = 3;
pub const OFPT_VENDOR: u8 = 4;
pub const OFPT_FEATURES_REQUEST: u8 = 5;
pub const OFPT_FEATURES_REPLY: u8 = 6;
pub const OFPT_GET_CONFIG_REQUEST: u8 = 7;
pub const OFPT_GET_CONFIG_REPLY: u8 = 8;
pub const OFPT_SET_CONFIG: u8 = 9;
pub const OFPT_PACKET_IN: u8 = 10;
pub const OFPT_FLOW_EXPIRED: u8 = 11;
pub const OFPT_PORT_MOD: u8 = 13;
pub const OFPT_PORT_STATUS: u8 = 14;
pub const OFPT_PACKET_OUT: u8 = 15;
pub const OFPT_FLOW_MOD: u8 = 16;
pub const OFPT_STATS_REQUEST: u8 = 17;
pub const OFPT_STATS_REPLY: u8 = 18;

pub const OFPP_MAX: u16 = 0xff00;
pub const OFPP_TABLE: u16 = 0xfff9;
pub const OFPP_NORMAL: u16 = 0xfffa;
pub const OFPP_FLOOD: u16 = 0xfffb;
pub const OFPP_ALL: u16 = 0xfffc;
pub const OFPP_CONTROLLER: u16 = 0xfffd;
pub const OFPP_LOCAL: u16 = 0xfffe;
pub const OFPP_NONE: u16 = 0xffff;

pub const OFPET_HELLO_FAILED: u16 = 0;
pub const OFPET_BAD_REQUEST: u16 = 1;
pub const OFPET_BAD_ACTION: u16 = 2;
pub const OFPET_FLOW_MOD_FAILED: u16 = 3;
pub const OFPET_PORT_MOD_FAILED: u16 = 4;
pub const OFPET_QUEUE_OP_FAILED: u16 = 5;

pub const NO_BUFFER: u32 = 0xffffffff;

// Configuration flags (bit 0 SEND_FLOW_EXP; bits 1-2 FRAG_MASK).
pub const OFPC_SEND_FLOW_EXP: u16 = 1 << 0;
pub const OFPC_FRAG_MASK: u16 = 0b11 << 1;
pub const OFPC_FRAG_NORMAL: u16 = 0b00 << 1;
pub const OFPC_FRAG_DROP: u16 = 0b01 << 1;

pub const FLOW_MOD_ADD: u16 = 0;
pub const FLOW_MOD_MODIFY: u16 = 1;
pub const FLOW_MOD_MODIFY_STRICT: u16 = 2;
pub const FLOW_MOD_DELETE: u16 = 3;
pub const FLOW_MOD_DELETE_STRICT: u16 = 4;

pub const REASON_NO_MATCH: u8 = 0;
pub const REASON_ACTION: u8 = 1;

pub const STATS_MORE: u16 = 1 << 0;

// Stats-request/reply sub-types this datapath answers (spec.md §6's
// enumerate-flows/tables/ports trio; real OpenFlow 1.0's DESC/AGGREGATE
// numbering is left as gaps since neither is implemented here).
pub const OFPST_FLOW: u16 = 1;
pub const OFPST_TABLE: u16 = 3;
pub const OFPST_PORT: u16 = 4;

// FEATURES_REPLY capabilities bitmap: which stats sub-types this datapath
// answers.
pub const CAP_FLOW_STATS: u32 = 1 << 0;
pub const CAP_TABLE_STATS: u32 = 1 << 1;
pub const CAP_PORT_STATS: u32 = 1 << 2;

// Bitmap of every OFPAT_* this datapath's action executor supports, for
// FEATURES_REPLY's `actions` field.
pub const SUPPORTED_ACTIONS_MASK: u32 = 0x3ff;

#[repr(C, packed)]
#[derive(Default)]
pub struct OfpHeader {
    version: u8,
    type_: u8,
    length: u16,
    xid: u32,
}

impl header::Header<OfpHeader> {
    pub fn version(&self) -> u8 { self.header_ref().version }
    pub fn set_version(&mut self, v: u8) { self.header_mut().version = v; }
    pub fn msg_type(&self) -> u8 { self.header_ref().type_ }
    pub fn set_msg_type(&mut self, t: u8) { self.header_mut().type_ = t; }
    pub fn length(&self) -> u16 { lib::ntohs(self.header_ref().length) }
    pub fn set_length(&mut self, l: u16) { self.header_mut().length = lib::htons(l); }
    pub fn xid(&self) -> u32 { lib::ntohl(self.header_ref().xid) }
    pub fn set_xid(&mut self, xid: u32) { self.header_mut().xid = lib::htonl(xid); }
}

// Minimum size, by message type, below which the body cannot possibly be
// well-formed. Used by `validate_header` (§4.10).
pub fn min_body_size(msg_type: u8) -> usize {
    match msg_type {
        t if t == OFPT_HELLO => 0,
        t if t == OFPT_ERROR => 4,
        t if t == OFPT_ECHO_REQUEST || t == OFPT_ECHO_REPLY => 0,
        t if t == OFPT_VENDOR => 4,
        t if t == OFPT_FEATURES_REQUEST => 0,
        t if t == OFPT_FEATURES_REPLY => 36,
        t if t == OFPT_GET_CONFIG_REQUEST => 0,
        t if t == OFPT_GET_CONFIG_REPLY || t == OFPT_SET_CONFIG => 4,
        t if t == OFPT_PACKET_IN => 10,
        t if t == OFPT_FLOW_EXPIRED => header::size_of::<Match>() + 24,
        t if t == OFPT_PORT_MOD => header::size_of::<PhyPort>(),
        t if t == OFPT_PORT_STATUS => 4 + header::size_of::<PhyPort>(),
        t if t == OFPT_PACKET_OUT => 8,
        t if t == OFPT_FLOW_MOD => header::size_of::<Match>() + 16,
        t if t == OFPT_STATS_REQUEST || t == OFPT_STATS_REPLY => 4,
        _ => 0,
    }
}

// always_admitted: message types exempt from the version check (§4.10).
pub fn always_admitted(msg_type: u8) -> bool {
    msg_type == OFPT_HELLO
        || msg_type == OFPT_ECHO_REQUEST
        || msg_type == OFPT_ECHO_REPLY
        || msg_type == OFPT_ERROR
        || msg_type == OFPT_VENDOR
}

// validate_header: spec.md §4.10 admission check, run before any
// type-specific handler.
pub fn validate_header(data: &[u8]) -> Result<(u8, u16, u32)> {
    let hdr_size = header::size_of::<OfpHeader>();
    if data.len() < hdr_size {
        return Err(OfpError::BadLength);
    }
    let mut buf = [0u8; 8];
    buf.copy_from_slice(&data[..hdr_size]);
    let h = header::from_mem::<OfpHeader>(&mut buf);
    let msg_type = h.msg_type();
    if h.version() != VERSION && !always_admitted(msg_type) {
        return Err(OfpError::BadVersion);
    }
    let length = h.length() as usize;
    if length > data.len() {
        return Err(OfpError::BadLength);
    }
    if length < hdr_size + min_body_size(msg_type) {
        return Err(OfpError::BadLength);
    }
    Ok((msg_type, h.length(), h.xid()))
}

pub fn write_header(buf: &mut Vec<u8>, msg_type: u8, xid: u32, total_len: u16) {
    buf.push(VERSION);
    buf.push(msg_type);
    let mut len_bytes = [0u8; 2];
    NetworkEndian::write_u16(&mut len_bytes, total_len);
    buf.extend_from_slice(&len_bytes);
    let mut xid_bytes = [0u8; 4];
    NetworkEndian::write_u32(&mut xid_bytes, xid);
    buf.extend_from_slice(&xid_bytes);
}

#[repr(C, packed)]
#[derive(Default, Clone, Copy)]
pub struct Match {
    wildcards: u32,
    in_port: u16,
    dl_src: MacAddress,
    dl_dst: MacAddress,
    dl_vlan: u16,
    dl_type: u16,
    nw_src: u32,
    nw_dst: u32,
    nw_proto: u8,
    pad: [u8; 3],
    tp_src: u16,
    tp_dst: u16,
}

impl header::Header<Match> {
    pub fn wildcards(&self) -> u32 { lib::ntohl(self.header_ref().wildcards) }
    pub fn set_wildcards(&mut self, w: u32) { self.header_mut().wildcards = lib::htonl(w); }
    pub fn in_port(&self) -> u16 { lib::ntohs(self.header_ref().in_port) }
    pub fn set_in_port(&mut self, p: u16) { self.header_mut().in_port = lib::htons(p); }
    pub fn dl_src(&self) -> &MacAddress { &self.header_ref().dl_src }
    pub fn dl_dst(&self) -> &MacAddress { &self.header_ref().dl_dst }
    pub fn dl_vlan(&self) -> u16 { lib::ntohs(self.header_ref().dl_vlan) }
    pub fn dl_type(&self) -> u16 { lib::ntohs(self.header_ref().dl_type) }
    pub fn nw_src(&self) -> u32 { self.header_ref().nw_src }
    pub fn nw_dst(&self) -> u32 { self.header_ref().nw_dst }
    pub fn nw_proto(&self) -> u8 { self.header_ref().nw_proto }
    pub fn tp_src(&self) -> u16 { lib::ntohs(self.header_ref().tp_src) }
    pub fn tp_dst(&self) -> u16 { lib::ntohs(self.header_ref().tp_dst) }
}

impl MatchTemplate {
    // from_wire: decode a 40-byte wire `Match`, applying the field
    // implication rules of spec.md §4.2.
    pub fn from_wire(data: &mut [u8]) -> MatchTemplate {
        let m = header::from_mem::<Match>(data);
        let mut key = Key {
            in_port: m.in_port(),
            dl_vlan: m.dl_vlan(),
            dl_src: *m.dl_src(),
            dl_dst: *m.dl_dst(),
            dl_type: m.dl_type(),
            nw_src: m.nw_src(),
            nw_dst: m.nw_dst(),
            nw_proto: m.nw_proto(),
            tp_src: m.tp_src(),
            tp_dst: m.tp_dst(),
        };
        let mut wildcards = m.wildcards() & crate::key::FLAGS_MASK;
        let nw_src_bits = (m.wildcards() >> 8) & 0x3f;
        let nw_dst_bits = (m.wildcards() >> 14) & 0x3f;
        wildcards = crate::key::with_nw_src_bits(wildcards, nw_src_bits);
        wildcards = crate::key::with_nw_dst_bits(wildcards, nw_dst_bits);

        wildcards = crate::key::apply_implications(wildcards, &key);
        if crate::key::has(wildcards, crate::key::DL_SRC) { key.dl_src = [0; 6]; }
        if crate::key::has(wildcards, crate::key::DL_DST) { key.dl_dst = [0; 6]; }
        MatchTemplate { key, wildcards }
    }

    pub fn to_wire(&self) -> Vec<u8> {
        let mut buf = vec![0u8; header::size_of::<Match>()];
        let mut m = header::from_mem::<Match>(&mut buf);
        let mut wire_wildcards = self.wildcards & crate::key::FLAGS_MASK;
        wire_wildcards |= crate::key::nw_src_bits(self.wildcards) << 8;
        wire_wildcards |= crate::key::nw_dst_bits(self.wildcards) << 14;
        m.set_wildcards(wire_wildcards);
        m.set_in_port(self.key.in_port);
        m.header_mut().dl_src = self.key.dl_src;
        m.header_mut().dl_dst = self.key.dl_dst;
        m.header_mut().dl_vlan = lib::htons(self.key.dl_vlan);
        m.header_mut().dl_type = lib::htons(self.key.dl_type);
        m.header_mut().nw_src = self.key.nw_src;
        m.header_mut().nw_dst = self.key.nw_dst;
        m.header_mut().nw_proto = self.key.nw_proto;
        m.header_mut().tp_src = lib::htons(self.key.tp_src);
        m.header_mut().tp_dst = lib::htons(self.key.tp_dst);
        buf
    }
}

pub const PORT_NAME_SIZE: usize = 16;

#[repr(C, packed)]
#[derive(Default, Clone, Copy)]
pub struct PhyPort {
    port_no: u16,
    hw_addr: MacAddress,
    name: [u8; PORT_NAME_SIZE],
    flags: u32,
    speed: u32,
    features: u32,
}

impl header::Header<PhyPort> {
    pub fn port_no(&self) -> u16 { lib::ntohs(self.header_ref().port_no) }
    pub fn set_port_no(&mut self, p: u16) { self.header_mut().port_no = lib::htons(p); }
    pub fn hw_addr(&self) -> &MacAddress { &self.header_ref().hw_addr }
    pub fn set_hw_addr(&mut self, addr: &MacAddress) { self.header_mut().hw_addr = *addr; }
    pub fn name_bytes(&self) -> &[u8; PORT_NAME_SIZE] { &self.header_ref().name }
    pub fn set_name(&mut self, name: &str) {
        let mut bytes = [0u8; PORT_NAME_SIZE];
        let n = std::cmp::min(name.len(), PORT_NAME_SIZE);
        bytes[..n].copy_from_slice(&name.as_bytes()[..n]);
        self.header_mut().name = bytes;
    }
    pub fn flags(&self) -> u32 { lib::ntohl(self.header_ref().flags) }
    pub fn set_flags(&mut self, f: u32) { self.header_mut().flags = lib::htonl(f); }
    pub fn speed(&self) -> u32 { lib::ntohl(self.header_ref().speed) }
    pub fn set_speed(&mut self, s: u32) { self.header_mut().speed = lib::htonl(s); }
    pub fn features(&self) -> u32 { lib::ntohl(self.header_ref().features) }
    pub fn set_features(&mut self, f: u32) { self.header_mut().features = lib::htonl(f); }
}

// Action type codes (the subset this datapath implements, spec.md §3/§4.7).
pub const OFPAT_OUTPUT: u16 = 0;
pub const OFPAT_SET_VLAN_VID: u16 = 1;
pub const OFPAT_SET_VLAN_PCP: u16 = 2;
pub const OFPAT_STRIP_VLAN: u16 = 3;
pub const OFPAT_SET_DL_SRC: u16 = 4;
pub const OFPAT_SET_DL_DST: u16 = 5;
pub const OFPAT_SET_NW_SRC: u16 = 6;
pub const OFPAT_SET_NW_DST: u16 = 7;
pub const OFPAT_SET_TP_SRC: u16 = 8;
pub const OFPAT_SET_TP_DST: u16 = 9;

// decode_actions: parse an OFPT_FLOW_MOD/PACKET_OUT action list. Each
// entry is `{type:u16, len:u16, body:[u8; len-4]}`, length-prefixed so
// the wider actions (dl_addr set, 6 bytes) fit without forcing every
// action into a fixed 8-byte slot.
pub fn decode_actions(mut body: &[u8]) -> Result<Vec<Action>> {
    let mut actions = Vec::new();
    while !body.is_empty() {
        if body.len() < 4 {
            return Err(OfpError::BadLength);
        }
        let type_ = NetworkEndian::read_u16(&body[0..2]);
        let len = NetworkEndian::read_u16(&body[2..4]) as usize;
        if len < 4 || len > body.len() {
            return Err(OfpError::BadLength);
        }
        let arg = &body[4..len];
        let action = match type_ {
            t if t == OFPAT_OUTPUT => {
                if arg.len() < 4 { return Err(OfpError::BadLength); }
                Action::Output {
                    port: NetworkEndian::read_u16(&arg[0..2]),
                    max_len: NetworkEndian::read_u16(&arg[2..4]),
                }
            }
            t if t == OFPAT_SET_VLAN_VID => {
                if arg.len() < 2 { return Err(OfpError::BadLength); }
                Action::SetVlanVid(NetworkEndian::read_u16(&arg[0..2]))
            }
            t if t == OFPAT_SET_VLAN_PCP => {
                if arg.is_empty() { return Err(OfpError::BadLength); }
                Action::SetVlanPcp(arg[0] as u16)
            }
            t if t == OFPAT_STRIP_VLAN => Action::StripVlan,
            t if t == OFPAT_SET_DL_SRC => {
                if arg.len() < 6 { return Err(OfpError::BadLength); }
                let mut mac = [0u8; 6];
                mac.copy_from_slice(&arg[0..6]);
                Action::SetDlSrc(mac)
            }
            t if t == OFPAT_SET_DL_DST => {
                if arg.len() < 6 { return Err(OfpError::BadLength); }
                let mut mac = [0u8; 6];
                mac.copy_from_slice(&arg[0..6]);
                Action::SetDlDst(mac)
            }
            t if t == OFPAT_SET_NW_SRC => {
                if arg.len() < 4 { return Err(OfpError::BadLength); }
                // ipv4::Address is kept in the same "raw wire word" form as
                // Header<IPv4>::src/dst (no ntohl), not plain host order, so
                // the decoded true-numeric value is re-packed with htonl.
                Action::SetNwSrc(lib::htonl(NetworkEndian::read_u32(&arg[0..4])))
            }
            t if t == OFPAT_SET_NW_DST => {
                if arg.len() < 4 { return Err(OfpError::BadLength); }
                Action::SetNwDst(lib::htonl(NetworkEndian::read_u32(&arg[0..4])))
            }
            t if t == OFPAT_SET_TP_SRC => {
                if arg.len() < 2 { return Err(OfpError::BadLength); }
                Action::SetTpSrc(NetworkEndian::read_u16(&arg[0..2]))
            }
            t if t == OFPAT_SET_TP_DST => {
                if arg.len() < 2 { return Err(OfpError::BadLength); }
                Action::SetTpDst(NetworkEndian::read_u16(&arg[0..2]))
            }
            _ => return Err(OfpError::BadAction),
        };
        actions.push(action);
        if actions.len() > super::flow::MAX_ACTIONS {
            return Err(OfpError::BadAction);
        }
        body = &body[len..];
    }
    Ok(actions)
}

pub fn encode_actions(actions: &[Action], buf: &mut Vec<u8>) {
    for action in actions {
        let (type_, arg): (u16, Vec<u8>) = match action {
            Action::Output { port, max_len } => {
                let mut a = vec![0u8; 4];
                NetworkEndian::write_u16(&mut a[0..2], *port);
                NetworkEndian::write_u16(&mut a[2..4], *max_len);
                (OFPAT_OUTPUT, a)
            }
            Action::SetVlanVid(vid) => {
                let mut a = vec![0u8; 2];
                NetworkEndian::write_u16(&mut a, *vid);
                (OFPAT_SET_VLAN_VID, a)
            }
            Action::SetVlanPcp(pcp) => (OFPAT_SET_VLAN_PCP, vec![*pcp as u8]),
            Action::StripVlan => (OFPAT_STRIP_VLAN, vec![]),
            Action::SetDlSrc(mac) => (OFPAT_SET_DL_SRC, mac.to_vec()),
            Action::SetDlDst(mac) => (OFPAT_SET_DL_DST, mac.to_vec()),
            Action::SetNwSrc(addr) => {
                let mut a = vec![0u8; 4];
                NetworkEndian::write_u32(&mut a, lib::ntohl(*addr));
                (OFPAT_SET_NW_SRC, a)
            }
            Action::SetNwDst(addr) => {
                let mut a = vec![0u8; 4];
                NetworkEndian::write_u32(&mut a, lib::ntohl(*addr));
                (OFPAT_SET_NW_DST, a)
            }
            Action::SetTpSrc(port) => {
                let mut a = vec![0u8; 2];
                NetworkEndian::write_u16(&mut a, *port);
                (OFPAT_SET_TP_SRC, a)
            }
            Action::SetTpDst(port) => {
                let mut a = vec![0u8; 2];
                NetworkEndian::write_u16(&mut a, *port);
                (OFPAT_SET_TP_DST, a)
            }
        };
        let len = (4 + arg.len()) as u16;
        let mut head = [0u8; 4];
        NetworkEndian::write_u16(&mut head[0..2], type_);
        NetworkEndian::write_u16(&mut head[2..4], len);
        buf.extend_from_slice(&head);
        buf.extend_from_slice(&arg);
    }
}

#[cfg(test)]
mod selftest {
    use super::*;

    #[test]
    fn header_roundtrip() {
        let mut buf = [0u8; 8];
        let mut h = header::from_mem::<OfpHeader>(&mut buf);
        h.set_version(VERSION);
        h.set_msg_type(OFPT_FLOW_MOD);
        h.set_length(64);
        h.set_xid(42);
        assert_eq!(h.version(), VERSION);
        assert_eq!(h.msg_type(), OFPT_FLOW_MOD);
        assert_eq!(h.length(), 64);
        assert_eq!(h.xid(), 42);
    }

    #[test]
    fn validate_rejects_short_buffer() {
        let buf = [0u8; 4];
        assert_eq!(validate_header(&buf), Err(OfpError::BadLength));
    }

    #[test]
    fn validate_rejects_bad_version_except_hello() {
        let mut buf = vec![0u8; 8];
        let mut h = header::from_mem::<OfpHeader>(&mut buf[..]);
        h.set_version(0x01);
        h.set_msg_type(OFPT_FLOW_MOD);
        h.set_length(8 + header::size_of::<Match>() as u16 + 12);
        drop(h);
        buf.resize(8 + header::size_of::<Match>() + 12, 0);
        assert_eq!(validate_header(&buf), Err(OfpError::BadVersion));

        let mut hello = vec![0u8; 8];
        let mut h = header::from_mem::<OfpHeader>(&mut hello[..]);
        h.set_version(0x01);
        h.set_msg_type(OFPT_HELLO);
        h.set_length(8);
        drop(h);
        assert!(validate_header(&hello).is_ok());
    }

    #[test]
    fn action_roundtrip() {
        let actions = vec![
            Action::Output { port: 3, max_len: 128 },
            Action::SetVlanVid(42),
            Action::StripVlan,
            Action::SetDlSrc([1, 2, 3, 4, 5, 6]),
            Action::SetNwSrc(0xc0a80101),
            Action::SetTpDst(80),
        ];
        let mut buf = Vec::new();
        encode_actions(&actions, &mut buf);
        let decoded = decode_actions(&buf).unwrap();
        assert_eq!(decoded, actions);
    }

    #[test]
    fn match_wire_roundtrip_exact() {
        let mt = MatchTemplate::exact(Key {
            in_port: 1,
            dl_vlan: crate::key::VLAN_NONE,
            dl_src: [1, 2, 3, 4, 5, 6],
            dl_dst: [6, 5, 4, 3, 2, 1],
            dl_type: crate::ethernet::TYPE_IPV4,
            nw_src: ipv4::pton("10.0.0.1"),
            nw_dst: ipv4::pton("10.0.0.2"),
            nw_proto: ipv4::PROTOCOL_TCP,
            tp_src: 1234,
            tp_dst: 80,
        });
        let mut wire = mt.to_wire();
        let decoded = MatchTemplate::from_wire(&mut wire);
        assert_eq!(decoded.key.nw_src, mt.key.nw_src);
        assert_eq!(decoded.key.tp_dst, mt.key.tp_dst);
        assert_eq!(decoded.wildcards, 0);
    }
}
