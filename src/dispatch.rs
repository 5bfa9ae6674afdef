use byteorder::{ByteOrder, NetworkEndian};

use crate::action;
use crate::buffer_pool::{self, BufferPool};
use crate::chain::{self, Chain};
use crate::error::{OfpError, Result};
use crate::flow::{self, Flow};
use crate::forwarder::{self, Config, PacketIn};
use crate::header;
use crate::key::MatchTemplate;
use crate::ofp;
use crate::packet;
use crate::port::{Port, PortTable};
use crate::table_linear;

// CONTROL-MESSAGE DISPATCH
//
// One incoming OFPT_* message in, zero or more outgoing wire messages out
// (spec.md §4.10). `ofp::validate_header` handles admission; everything
// past that point is this module's job. Variable-length message bodies
// are read and written directly with `byteorder::NetworkEndian`, the same
// framing style `ofp.rs`'s own `decode_actions`/`encode_actions` use, since
// these bodies (unlike `Match`/`PhyPort`) have no fixed `repr(C, packed)`
// shape to hang a `header::Header<T>` view off of.
//
//   handle_message(..) -> Vec<Vec<u8>> - wire-encoded replies/events to send
//   encode_flow_expired(..) -> Vec<u8> - FLOW_EXPIRED encoder, called by
//     [MODULE datapath]'s timeout sweep, not from handle_message itself

pub fn handle_message(
    chain: &mut Chain,
    ports: &mut PortTable,
    buffer_pool: &mut BufferPool,
    config: &mut Config,
    dpid: u64,
    data: &[u8],
    now: u64,
) -> Vec<Vec<u8>> {
    let (msg_type, length, xid) = match ofp::validate_header(data) {
        Ok(parsed) => parsed,
        Err(e) => return vec![encode_error(0, e)],
    };
    let hdr_size = header::size_of::<ofp::OfpHeader>();
    let body = &data[hdr_size..length as usize];

    let result = dispatch_body(chain, ports, buffer_pool, config, dpid, msg_type, xid, body, now);
    match result {
        Ok(replies) => replies,
        Err(e) => vec![encode_error(xid, e)],
    }
}

fn dispatch_body(
    chain: &mut Chain,
    ports: &mut PortTable,
    buffer_pool: &mut BufferPool,
    config: &mut Config,
    dpid: u64,
    msg_type: u8,
    xid: u32,
    body: &[u8],
    now: u64,
) -> Result<Vec<Vec<u8>>> {
    if msg_type == ofp::OFPT_HELLO {
        return Ok(Vec::new());
    }
    if msg_type == ofp::OFPT_ECHO_REQUEST {
        return Ok(vec![encode_simple(ofp::OFPT_ECHO_REPLY, xid, body)]);
    }
    if msg_type == ofp::OFPT_FEATURES_REQUEST {
        return Ok(vec![encode_features_reply(chain, ports, dpid, xid)]);
    }
    if msg_type == ofp::OFPT_GET_CONFIG_REQUEST {
        return Ok(vec![encode_config_reply(config, xid)]);
    }
    if msg_type == ofp::OFPT_SET_CONFIG {
        handle_set_config(config, body)?;
        return Ok(Vec::new());
    }
    if msg_type == ofp::OFPT_PACKET_OUT {
        let punts = handle_packet_out(ports, buffer_pool, body)?;
        return Ok(punts.iter().map(|p| encode_packet_in(xid, p)).collect());
    }
    if msg_type == ofp::OFPT_FLOW_MOD {
        let punts = handle_flow_mod(chain, ports, buffer_pool, body, now)?;
        return Ok(punts.iter().map(|p| encode_packet_in(xid, p)).collect());
    }
    if msg_type == ofp::OFPT_PORT_MOD {
        handle_port_mod(ports, body)?;
        return Ok(Vec::new());
    }
    if msg_type == ofp::OFPT_STATS_REQUEST {
        return handle_stats_request(chain, ports, xid, body, now);
    }
    Err(OfpError::BadType)
}

fn encode_error(xid: u32, err: OfpError) -> Vec<u8> {
    tracing::warn!(xid, error = %err, "rejecting control message");
    let (error_type, error_code) = err.wire_codes();
    let mut buf = Vec::new();
    ofp::write_header(&mut buf, ofp::OFPT_ERROR, xid, (header::size_of::<ofp::OfpHeader>() + 4) as u16);
    let mut head = [0u8; 4];
    NetworkEndian::write_u16(&mut head[0..2], error_type);
    NetworkEndian::write_u16(&mut head[2..4], error_code);
    buf.extend_from_slice(&head);
    buf
}

fn encode_simple(msg_type: u8, xid: u32, body: &[u8]) -> Vec<u8> {
    let mut buf = Vec::new();
    ofp::write_header(&mut buf, msg_type, xid, (header::size_of::<ofp::OfpHeader>() + body.len()) as u16);
    buf.extend_from_slice(body);
    buf
}

pub fn encode_packet_in(xid: u32, pi: &PacketIn) -> Vec<u8> {
    let mut buf = Vec::new();
    let total = header::size_of::<ofp::OfpHeader>() + 10 + pi.data.len();
    ofp::write_header(&mut buf, ofp::OFPT_PACKET_IN, xid, total as u16);
    let mut head = [0u8; 10];
    NetworkEndian::write_u32(&mut head[0..4], pi.buffer_id);
    NetworkEndian::write_u16(&mut head[4..6], pi.total_len);
    NetworkEndian::write_u16(&mut head[6..8], pi.in_port);
    head[8] = pi.reason;
    buf.extend_from_slice(&head);
    buf.extend_from_slice(&pi.data);
    buf
}

// encode_flow_expired: [MODULE datapath]'s periodic timeout sweep calls
// this for every expired flow when `config.send_flow_exp()` is set.
// Body: {match(40), priority:u16, pad:u16, duration:u32, packet_count:u64,
// byte_count:u64}, per spec.md §6.
pub fn encode_flow_expired(flow: &Flow, xid: u32, now: u64) -> Vec<u8> {
    let template = MatchTemplate { key: flow.key, wildcards: flow.wildcards };
    let match_bytes = template.to_wire();
    let duration = now.saturating_sub(flow.created_at) as u32;

    let mut buf = Vec::new();
    let total = header::size_of::<ofp::OfpHeader>() + match_bytes.len() + 24;
    ofp::write_header(&mut buf, ofp::OFPT_FLOW_EXPIRED, xid, total as u16);
    buf.extend_from_slice(&match_bytes);
    let mut rest = [0u8; 24];
    NetworkEndian::write_u16(&mut rest[0..2], flow.priority);
    NetworkEndian::write_u32(&mut rest[4..8], duration);
    NetworkEndian::write_u64(&mut rest[8..16], flow.packet_count);
    NetworkEndian::write_u64(&mut rest[16..24], flow.byte_count);
    buf.extend_from_slice(&rest);
    buf
}

// FEATURES_REPLY: {dpid:u64, n_exact:u32, n_compression:u32, n_general:u32,
// buffer_mb:u32, n_buffers:u32, capabilities:u32, actions:u32,
// ports:[phy_port...]}.
fn encode_features_reply(chain: &Chain, ports: &PortTable, dpid: u64, xid: u32) -> Vec<u8> {
    let capacity = 1u32 << chain::HASH_TABLE_CAPACITY_BITS;
    let ports_bytes = ports.to_wire();
    let buffer_bytes = buffer_pool::SIZE * packet::PAYLOAD_SIZE;
    let buffer_mb = (buffer_bytes / (1024 * 1024)) as u32;
    let capabilities = ofp::CAP_FLOW_STATS | ofp::CAP_TABLE_STATS | ofp::CAP_PORT_STATS;

    let mut buf = Vec::new();
    let total = header::size_of::<ofp::OfpHeader>() + 32 + 4 + ports_bytes.len();
    ofp::write_header(&mut buf, ofp::OFPT_FEATURES_REPLY, xid, total as u16);
    let mut head = [0u8; 32];
    NetworkEndian::write_u64(&mut head[0..8], dpid);
    NetworkEndian::write_u32(&mut head[8..12], capacity);
    NetworkEndian::write_u32(&mut head[12..16], capacity);
    NetworkEndian::write_u32(&mut head[16..20], table_linear::MAX_FLOWS as u32);
    NetworkEndian::write_u32(&mut head[20..24], buffer_mb);
    NetworkEndian::write_u32(&mut head[24..28], buffer_pool::SIZE as u32);
    NetworkEndian::write_u32(&mut head[28..32], capabilities);
    buf.extend_from_slice(&head);
    let mut actions_word = [0u8; 4];
    NetworkEndian::write_u32(&mut actions_word, ofp::SUPPORTED_ACTIONS_MASK);
    buf.extend_from_slice(&actions_word);
    buf.extend_from_slice(&ports_bytes);
    buf
}

fn encode_config_reply(config: &Config, xid: u32) -> Vec<u8> {
    let mut buf = Vec::new();
    ofp::write_header(&mut buf, ofp::OFPT_GET_CONFIG_REPLY, xid, (header::size_of::<ofp::OfpHeader>() + 4) as u16);
    let mut body = [0u8; 4];
    NetworkEndian::write_u16(&mut body[0..2], config.flags);
    NetworkEndian::write_u16(&mut body[2..4], config.miss_send_len);
    buf.extend_from_slice(&body);
    buf
}

// SET_CONFIG: an unrecognized fragment-policy value is coerced to DROP
// rather than rejected, per spec.md §6.
fn handle_set_config(config: &mut Config, body: &[u8]) -> Result<()> {
    if body.len() < 4 {
        return Err(OfpError::BadLength);
    }
    let mut flags = NetworkEndian::read_u16(&body[0..2]);
    let miss_send_len = NetworkEndian::read_u16(&body[2..4]);
    let frag = flags & ofp::OFPC_FRAG_MASK;
    if frag != ofp::OFPC_FRAG_NORMAL && frag != ofp::OFPC_FRAG_DROP {
        flags = (flags & !ofp::OFPC_FRAG_MASK) | ofp::OFPC_FRAG_DROP;
    }
    config.flags = flags;
    config.miss_send_len = miss_send_len;
    Ok(())
}

// PACKET_OUT body: {buffer_id:u32, in_port:u16, actions_len:u16,
// actions:[action...], data:[u8]} (the union of "replay a buffered frame"
// and "inject an inline frame" spec.md §6 leaves loosely specified, chosen
// to match real OpenFlow 1.0's packet_out layout — see DESIGN.md).
fn handle_packet_out(ports: &mut PortTable, buffer_pool: &mut BufferPool, body: &[u8]) -> Result<Vec<PacketIn>> {
    if body.len() < 8 {
        return Err(OfpError::BadLength);
    }
    let buffer_id = NetworkEndian::read_u32(&body[0..4]);
    let in_port = NetworkEndian::read_u16(&body[4..6]);
    let actions_len = NetworkEndian::read_u16(&body[6..8]) as usize;
    if 8 + actions_len > body.len() {
        return Err(OfpError::BadLength);
    }
    let actions = ofp::decode_actions(&body[8..8 + actions_len])?;
    let inline_data = &body[8 + actions_len..];

    let mut pkt = if buffer_id == ofp::NO_BUFFER {
        if inline_data.len() > packet::PAYLOAD_SIZE {
            return Err(OfpError::BadLength);
        }
        let mut p = packet::allocate();
        p.data[..inline_data.len()].copy_from_slice(inline_data);
        p.length = inline_data.len() as u16;
        p
    } else {
        buffer_pool.retrieve(buffer_id).ok_or(OfpError::BufferUnknown)?
    };

    let (mut key, _) = crate::key::parse_packet(&mut pkt.data[..pkt.length as usize], in_port);
    let deliveries = action::execute(pkt, &mut key, &actions, true);
    Ok(forwarder::deliver_all(ports, in_port, deliveries))
}

// FLOW_MOD body: {match(40), command:u16, max_idle:u16, buffer_id:u32,
// priority:u16, pad:u16, reserved:u32, actions:[action...]}. The wire
// body carries no separate hard_timeout field, so wire-inserted flows
// always get `hard_timeout: PERMANENT` — see DESIGN.md.
fn handle_flow_mod(
    chain: &mut Chain,
    ports: &mut PortTable,
    buffer_pool: &mut BufferPool,
    body: &[u8],
    now: u64,
) -> Result<Vec<PacketIn>> {
    let match_size = header::size_of::<ofp::Match>();
    if body.len() < match_size + 16 {
        return Err(OfpError::BadLength);
    }
    let mut match_bytes = body[..match_size].to_vec();
    let template = MatchTemplate::from_wire(&mut match_bytes);

    let mut off = match_size;
    let command = NetworkEndian::read_u16(&body[off..off + 2]);
    off += 2;
    let max_idle = NetworkEndian::read_u16(&body[off..off + 2]);
    off += 2;
    let buffer_id = NetworkEndian::read_u32(&body[off..off + 4]);
    off += 4;
    let priority = NetworkEndian::read_u16(&body[off..off + 2]);
    off += 2;
    off += 2; // pad
    off += 4; // reserved
    let actions = ofp::decode_actions(&body[off..])?;

    if command == ofp::FLOW_MOD_ADD {
        flow::validate_actions(&actions, template.key.in_port)?;
        let mut f = Flow::new(template.key, template.wildcards, priority, now);
        f.idle_timeout = max_idle;
        f.actions = actions.clone();
        chain.insert(f).map_err(|_| OfpError::FlowTableFull)?;

        if buffer_id != ofp::NO_BUFFER {
            if let Some(pkt) = buffer_pool.retrieve(buffer_id) {
                let mut key = template.key;
                let deliveries = action::execute(pkt, &mut key, &actions, false);
                return Ok(forwarder::deliver_all(ports, template.key.in_port, deliveries));
            }
        }
        return Ok(Vec::new());
    }

    if command == ofp::FLOW_MOD_MODIFY || command == ofp::FLOW_MOD_MODIFY_STRICT {
        let strict = command == ofp::FLOW_MOD_MODIFY_STRICT;
        chain.modify(&template.key, template.wildcards, strict, &actions);
        return Ok(Vec::new());
    }

    if command == ofp::FLOW_MOD_DELETE || command == ofp::FLOW_MOD_DELETE_STRICT {
        let strict = command == ofp::FLOW_MOD_DELETE_STRICT;
        chain.delete(&template.key, template.wildcards, strict);
        return Ok(Vec::new());
    }

    Err(OfpError::BadType)
}

// PORT_MOD: only `flags` is settable, per this datapath's simplified port
// model. A target naming an unknown port number is a silent no-op — the
// reported-error set (spec.md §7) has no "unknown port" kind to raise.
fn handle_port_mod(ports: &mut PortTable, body: &[u8]) -> Result<()> {
    let pp_size = header::size_of::<ofp::PhyPort>();
    if body.len() < pp_size {
        return Err(OfpError::BadLength);
    }
    let mut buf = body[..pp_size].to_vec();
    let pp = header::from_mem::<ofp::PhyPort>(&mut buf);
    let port_no = pp.port_no();
    let flags = pp.flags();
    if let Some(p) = ports.get_mut(port_no) {
        p.flags = flags;
    }
    Ok(())
}

// STATS_REQUEST body: {type:u16, flags:u16}. Flow/table/port enumeration
// is the only filtering spec.md §6 asks for, so any request-specific tail
// (e.g. a flow-stats match filter) is ignored and every live entry is
// reported.
fn handle_stats_request(
    chain: &Chain,
    ports: &PortTable,
    xid: u32,
    body: &[u8],
    now: u64,
) -> Result<Vec<Vec<u8>>> {
    if body.len() < 4 {
        return Err(OfpError::BadLength);
    }
    let stats_type = NetworkEndian::read_u16(&body[0..2]);

    if stats_type == ofp::OFPST_FLOW {
        let entries: Vec<Vec<u8>> = chain.iter_flows().map(|f| encode_flow_stats(f, now)).collect();
        return Ok(chunk_stats(xid, ofp::OFPST_FLOW, entries));
    }
    if stats_type == ofp::OFPST_TABLE {
        let (exact, double, linear) = chain.table_counts();
        let capacity = 1u32 << chain::HASH_TABLE_CAPACITY_BITS;
        let entries = vec![
            encode_table_stats("exact", capacity, exact),
            encode_table_stats("double", capacity, double),
            encode_table_stats("linear", table_linear::MAX_FLOWS as u32, linear),
        ];
        return Ok(chunk_stats(xid, ofp::OFPST_TABLE, entries));
    }
    if stats_type == ofp::OFPST_PORT {
        let entries: Vec<Vec<u8>> = ports.iter().map(encode_port_stats).collect();
        return Ok(chunk_stats(xid, ofp::OFPST_PORT, entries));
    }
    Err(OfpError::BadType)
}

// Flow-stats entry: {length:u16, pad:u16, match(40), duration:u32,
// priority:u16, idle_timeout:u16, hard_timeout:u16, pad:u16,
// packet_count:u64, byte_count:u64, actions:[action...]}.
fn encode_flow_stats(flow: &Flow, now: u64) -> Vec<u8> {
    let template = MatchTemplate { key: flow.key, wildcards: flow.wildcards };
    let match_bytes = template.to_wire();
    let mut actions_bytes = Vec::new();
    ofp::encode_actions(&flow.actions, &mut actions_bytes);
    let duration = now.saturating_sub(flow.created_at) as u32;

    let fixed = 4 + match_bytes.len() + 20 + 8;
    let length = (fixed + actions_bytes.len()) as u16;
    let mut buf = Vec::with_capacity(length as usize);
    let mut len_bytes = [0u8; 4];
    NetworkEndian::write_u16(&mut len_bytes[0..2], length);
    buf.extend_from_slice(&len_bytes);
    buf.extend_from_slice(&match_bytes);
    let mut rest = [0u8; 20];
    NetworkEndian::write_u32(&mut rest[0..4], duration);
    NetworkEndian::write_u16(&mut rest[4..6], flow.priority);
    NetworkEndian::write_u16(&mut rest[6..8], flow.idle_timeout);
    NetworkEndian::write_u16(&mut rest[8..10], flow.hard_timeout);
    NetworkEndian::write_u64(&mut rest[12..20], flow.packet_count);
    buf.extend_from_slice(&rest);
    let mut byte_count = [0u8; 8];
    NetworkEndian::write_u64(&mut byte_count, flow.byte_count);
    buf.extend_from_slice(&byte_count);
    buf.extend_from_slice(&actions_bytes);
    buf
}

// Table-stats entry: {name:[u8;16], max_entries:u32, active_count:u32}.
fn encode_table_stats(name: &str, max_entries: u32, active: usize) -> Vec<u8> {
    let mut buf = vec![0u8; 16];
    let n = name.len().min(16);
    buf[..n].copy_from_slice(&name.as_bytes()[..n]);
    let mut tail = [0u8; 8];
    NetworkEndian::write_u32(&mut tail[0..4], max_entries);
    NetworkEndian::write_u32(&mut tail[4..8], active as u32);
    buf.extend_from_slice(&tail);
    buf
}

// Port-stats entry: {port_no:u16, pad:[u8;6], rx_packets:u64,
// tx_packets:u64, tx_dropped:u64}.
fn encode_port_stats(port: &Port) -> Vec<u8> {
    let mut buf = vec![0u8; 8];
    NetworkEndian::write_u16(&mut buf[0..2], port.port_no);
    let mut counters = [0u8; 24];
    NetworkEndian::write_u64(&mut counters[0..8], port.rx);
    NetworkEndian::write_u64(&mut counters[8..16], port.tx);
    NetworkEndian::write_u64(&mut counters[16..24], port.drop);
    buf.extend_from_slice(&counters);
    buf
}

// chunk_stats: pack entries into STATS_REPLY messages under a conservative
// size cap, flagging every reply but the last with STATS_MORE.
fn chunk_stats(xid: u32, stats_type: u16, entries: Vec<Vec<u8>>) -> Vec<Vec<u8>> {
    const MAX_CHUNK: usize = 60_000;
    let mut chunks: Vec<Vec<u8>> = Vec::new();
    let mut current = Vec::new();
    for entry in entries {
        if !current.is_empty() && current.len() + entry.len() > MAX_CHUNK {
            chunks.push(std::mem::take(&mut current));
        }
        current.extend(entry);
    }
    chunks.push(current);

    let last = chunks.len() - 1;
    chunks
        .into_iter()
        .enumerate()
        .map(|(i, entries_body)| {
            let flags = if i == last { 0 } else { ofp::STATS_MORE };
            let mut buf = Vec::new();
            let total = header::size_of::<ofp::OfpHeader>() + 4 + entries_body.len();
            ofp::write_header(&mut buf, ofp::OFPT_STATS_REPLY, xid, total as u16);
            let mut head = [0u8; 4];
            NetworkEndian::write_u16(&mut head[0..2], stats_type);
            NetworkEndian::write_u16(&mut head[2..4], flags);
            buf.extend_from_slice(&head);
            buf.extend_from_slice(&entries_body);
            buf
        })
        .collect()
}

#[cfg(test)]
mod selftest {
    use super::*;
    use crate::ethernet;

    fn setup() -> (Chain, PortTable, BufferPool, Config) {
        let mut ports = PortTable::new();
        ports.add(Port::new(1, ethernet::pton("00:00:00:00:00:01"), "p1"));
        ports.add(Port::new(2, ethernet::pton("00:00:00:00:00:02"), "p2"));
        (Chain::new(), ports, BufferPool::new(), Config::default())
    }

    fn hello(xid: u32) -> Vec<u8> {
        let mut buf = Vec::new();
        ofp::write_header(&mut buf, ofp::OFPT_HELLO, xid, header::size_of::<ofp::OfpHeader>() as u16);
        buf
    }

    #[test]
    fn hello_produces_no_reply() {
        let (mut chain, mut ports, mut pool, mut config) = setup();
        let replies = handle_message(&mut chain, &mut ports, &mut pool, &mut config, 1, &hello(7), 0);
        assert!(replies.is_empty());
    }

    #[test]
    fn echo_request_replies_with_same_payload() {
        let (mut chain, mut ports, mut pool, mut config) = setup();
        let mut buf = Vec::new();
        let payload = [1u8, 2, 3, 4];
        ofp::write_header(&mut buf, ofp::OFPT_ECHO_REQUEST, 9, (header::size_of::<ofp::OfpHeader>() + payload.len()) as u16);
        buf.extend_from_slice(&payload);
        let replies = handle_message(&mut chain, &mut ports, &mut pool, &mut config, 1, &buf, 0);
        assert_eq!(replies.len(), 1);
        assert_eq!(&replies[0][8..], &payload);
    }

    #[test]
    fn set_config_coerces_unknown_frag_policy_to_drop() {
        let (mut chain, mut ports, mut pool, mut config) = setup();
        let mut buf = Vec::new();
        let mut body = [0u8; 4];
        NetworkEndian::write_u16(&mut body[0..2], 0b10 << 1); // reserved frag value
        ofp::write_header(&mut buf, ofp::OFPT_SET_CONFIG, 1, (header::size_of::<ofp::OfpHeader>() + 4) as u16);
        buf.extend_from_slice(&body);
        let replies = handle_message(&mut chain, &mut ports, &mut pool, &mut config, 1, &buf, 0);
        assert!(replies.is_empty());
        assert!(config.frag_drop());
    }

    #[test]
    fn flow_mod_add_then_stats_request_reports_it() {
        let (mut chain, mut ports, mut pool, mut config) = setup();
        let mut key = crate::key::Key::new(crate::key::NONE);
        key.in_port = 1;
        let template = MatchTemplate::exact(key);
        let mut actions_bytes = Vec::new();
        ofp::encode_actions(&[flow::Action::Output { port: 2, max_len: 0 }], &mut actions_bytes);

        let mut buf = Vec::new();
        let match_bytes = template.to_wire();
        let body_len = match_bytes.len() + 16 + actions_bytes.len();
        ofp::write_header(&mut buf, ofp::OFPT_FLOW_MOD, 2, (header::size_of::<ofp::OfpHeader>() + body_len) as u16);
        buf.extend_from_slice(&match_bytes);
        let mut fixed = [0u8; 16];
        NetworkEndian::write_u16(&mut fixed[0..2], ofp::FLOW_MOD_ADD);
        NetworkEndian::write_u16(&mut fixed[2..4], 0);
        NetworkEndian::write_u32(&mut fixed[4..8], ofp::NO_BUFFER);
        buf.extend_from_slice(&fixed);
        buf.extend_from_slice(&actions_bytes);

        let replies = handle_message(&mut chain, &mut ports, &mut pool, &mut config, 1, &buf, 0);
        assert!(replies.is_empty());
        assert_eq!(chain.flow_count(), 1);

        let mut stats_buf = Vec::new();
        let mut stats_body = [0u8; 4];
        NetworkEndian::write_u16(&mut stats_body[0..2], ofp::OFPST_FLOW);
        ofp::write_header(&mut stats_buf, ofp::OFPT_STATS_REQUEST, 3, (header::size_of::<ofp::OfpHeader>() + 4) as u16);
        stats_buf.extend_from_slice(&stats_body);
        let stats_replies = handle_message(&mut chain, &mut ports, &mut pool, &mut config, 1, &stats_buf, 0);
        assert_eq!(stats_replies.len(), 1);
    }

    #[test]
    fn features_reply_length_matches_body() {
        let (mut chain, mut ports, mut pool, mut config) = setup();
        let mut buf = Vec::new();
        ofp::write_header(&mut buf, ofp::OFPT_FEATURES_REQUEST, 4, header::size_of::<ofp::OfpHeader>() as u16);
        let replies = handle_message(&mut chain, &mut ports, &mut pool, &mut config, 1, &buf, 0);
        assert_eq!(replies.len(), 1);
        let reply = &replies[0];
        let declared_len = NetworkEndian::read_u16(&reply[2..4]) as usize;
        assert_eq!(declared_len, reply.len());
    }

    #[test]
    fn packet_out_with_inline_data_delivers_to_port() {
        let (mut chain, mut ports, mut pool, mut config) = setup();
        let mut inline = vec![0u8; 14];
        inline[12] = 0x08;
        inline[13] = 0x00;

        let mut actions_bytes = Vec::new();
        ofp::encode_actions(&[flow::Action::Output { port: 2, max_len: 0 }], &mut actions_bytes);

        let mut buf = Vec::new();
        let body_len = 8 + actions_bytes.len() + inline.len();
        ofp::write_header(&mut buf, ofp::OFPT_PACKET_OUT, 4, (header::size_of::<ofp::OfpHeader>() + body_len) as u16);
        let mut head = [0u8; 8];
        NetworkEndian::write_u32(&mut head[0..4], ofp::NO_BUFFER);
        NetworkEndian::write_u16(&mut head[4..6], 1);
        NetworkEndian::write_u16(&mut head[6..8], actions_bytes.len() as u16);
        buf.extend_from_slice(&head);
        buf.extend_from_slice(&actions_bytes);
        buf.extend_from_slice(&inline);

        let replies = handle_message(&mut chain, &mut ports, &mut pool, &mut config, 1, &buf, 0);
        assert!(replies.is_empty());
        assert_eq!(ports.get(2).unwrap().tx, 1);
        let out = crate::link::receive(&mut ports.get_mut(2).unwrap().tx_queue);
        packet::free(out);
    }

    #[test]
    fn unknown_message_type_yields_error_reply() {
        let (mut chain, mut ports, mut pool, mut config) = setup();
        let mut buf = Vec::new();
        ofp::write_header(&mut buf, 0xfe, 5, header::size_of::<ofp::OfpHeader>() as u16);
        let replies = handle_message(&mut chain, &mut ports, &mut pool, &mut config, 1, &buf, 0);
        assert_eq!(replies.len(), 1);
        assert_eq!(replies[0][1], ofp::OFPT_ERROR);
    }
}
