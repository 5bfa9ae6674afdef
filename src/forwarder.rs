use crate::action;
use crate::chain::Chain;
use crate::ethernet;
use crate::key;
use crate::ofp;
use crate::packet::{self, Packet};
use crate::port::PortTable;

// FORWARDER
//
// Orchestrates one frame's trip through the datapath (spec.md §4.9): parse,
// fragment policy, ingress port-flag drops, chain lookup, then either run
// the matched flow's actions or punt to the controller. Grounded on
// `rush/src/basic_apps.rs`'s `Sink`/`Tee` push-loop shape — one frame taken
// off a port's queue per call, fully disposed of before returning.

// Datapath-wide configuration consulted by the forwarder and by
// [MODULE dispatch]'s Get/Set Config handlers.
#[derive(Clone, Copy)]
pub struct Config {
    pub flags: u16,
    pub miss_send_len: u16,
}

impl Default for Config {
    fn default() -> Config {
        Config { flags: ofp::OFPC_FRAG_NORMAL, miss_send_len: 128 }
    }
}

impl Config {
    // from_env: read OFDP_MISS_SEND_LEN and OFDP_FRAG_DROP, falling back to
    // the OpenFlow-spec defaults (spec.md §6). Mirrors the teacher's own
    // env-var convention (`RUSH_BASIC1_NPACKETS` in src/main.rs).
    pub fn from_env() -> Config {
        let mut config = Config::default();
        if let Ok(v) = std::env::var("OFDP_MISS_SEND_LEN") {
            if let Ok(n) = v.parse::<u16>() {
                config.miss_send_len = n;
            }
        }
        if let Ok(v) = std::env::var("OFDP_FRAG_DROP") {
            if v == "1" || v.eq_ignore_ascii_case("true") {
                config.flags = (config.flags & !ofp::OFPC_FRAG_MASK) | ofp::OFPC_FRAG_DROP;
            }
        }
        config
    }

    pub fn frag_drop(&self) -> bool {
        self.flags & ofp::OFPC_FRAG_MASK == ofp::OFPC_FRAG_DROP
    }

    pub fn send_flow_exp(&self) -> bool {
        self.flags & ofp::OFPC_SEND_FLOW_EXP != 0
    }
}

// A PACKET_IN the forwarder wants dispatched to the controller: either a
// table miss (`REASON_NO_MATCH`) or an explicit `Output(CONTROLLER)`
// (`REASON_ACTION`).
pub struct PacketIn {
    pub buffer_id: u32,
    pub in_port: u16,
    pub total_len: u16,
    pub reason: u8,
    pub data: Vec<u8>,
}

pub fn handle_frame(
    chain: &mut Chain,
    ports: &mut PortTable,
    buffer_pool: &mut crate::buffer_pool::BufferPool,
    config: &Config,
    in_port: u16,
    mut frame: Box<Packet>,
    now: u64,
) -> Vec<PacketIn> {
    let (mut parsed_key, is_fragment) = key::parse_packet(&mut frame.data[..frame.length as usize], in_port);

    if is_fragment && config.frag_drop() {
        packet::free(frame);
        return Vec::new();
    }

    if let Some(p) = ports.get(in_port) {
        if p.has_flag(crate::port::NO_RECV) {
            packet::free(frame);
            return Vec::new();
        }
        if parsed_key.dl_dst == ethernet::STP_DST && p.has_flag(crate::port::NO_RECV_STP) {
            packet::free(frame);
            return Vec::new();
        }
    }

    let hit_actions = chain.lookup_mut(&parsed_key).map(|flow| {
        flow.touch(now, frame.length as u64);
        flow.actions.clone()
    });

    match hit_actions {
        Some(actions) => {
            let deliveries = action::execute(frame, &mut parsed_key, &actions, false);
            deliver_all(ports, in_port, deliveries)
        }
        None => {
            let total_len = frame.length;
            let miss_len = if config.miss_send_len == 0 { total_len } else { config.miss_send_len.min(total_len) };
            let data = frame.data[..miss_len as usize].to_vec();
            let buffer_id = match buffer_pool.save(frame, now) {
                Ok(id) => id,
                Err(returned) => {
                    packet::free(returned);
                    ofp::NO_BUFFER
                }
            };
            vec![PacketIn { buffer_id, in_port, total_len, reason: ofp::REASON_NO_MATCH, data }]
        }
    }
}

// deliver_all: route every Delivery an action program produced, collecting
// any CONTROLLER-bound ones as PacketIn events for the caller to encode and
// send (used by both the forwarder's hit path and dispatch's PACKET_OUT
// handler, which runs actions directly against a buffered or inline frame).
pub fn deliver_all(ports: &mut PortTable, in_port: u16, deliveries: Vec<action::Delivery>) -> Vec<PacketIn> {
    let mut punts = Vec::new();
    for d in deliveries {
        deliver(ports, in_port, d, &mut punts);
    }
    punts
}

fn deliver(ports: &mut PortTable, in_port: u16, d: action::Delivery, punts: &mut Vec<PacketIn>) {
    if d.port == ofp::OFPP_CONTROLLER {
        let total_len = d.packet.length;
        let max_len = if d.max_len == 0 { total_len } else { d.max_len.min(total_len) };
        let data = d.packet.data[..max_len as usize].to_vec();
        packet::free(d.packet);
        punts.push(PacketIn { buffer_id: ofp::NO_BUFFER, in_port, total_len, reason: ofp::REASON_ACTION, data });
        return;
    }
    // A flow's own action program must respect a port's NO_FWD flag;
    // PACKET_OUT's explicit, controller-directed replay overrides it
    // (spec.md §6.2).
    if !d.ignore_no_fwd {
        if let Some(p) = ports.get_mut(d.port) {
            if p.has_flag(crate::port::NO_FWD) {
                p.drop += 1;
                packet::free(d.packet);
                return;
            }
        }
    }
    ports.output(d.port, in_port, d.packet);
}

#[cfg(test)]
mod selftest {
    use super::*;
    use crate::buffer_pool::BufferPool;
    use crate::ethernet::Ethernet;
    use crate::flow::{Action, Flow};
    use crate::header;
    use crate::ipv4::{self, IPv4};
    use crate::key::Key;
    use crate::port::Port;
    use crate::udp::UDP;

    fn udp_frame() -> Box<Packet> {
        let mut p = packet::allocate();
        let eth_size = header::size_of::<Ethernet>();
        let ip_size = header::size_of::<IPv4>();
        let udp_size = header::size_of::<UDP>();
        p.length = (eth_size + ip_size + udp_size) as u16;
        {
            let mut eth = header::from_mem::<Ethernet>(&mut p.data[0..eth_size]);
            eth.set_src(&ethernet::pton("aa:bb:cc:dd:ee:ff"));
            eth.set_dst(&ethernet::pton("01:02:03:04:05:06"));
            eth.set_ethertype(ethernet::TYPE_IPV4);
        }
        {
            let mut ip = header::from_mem::<IPv4>(&mut p.data[eth_size..eth_size + ip_size]);
            ip.set_version(4);
            ip.set_ihl(5);
            ip.set_protocol(ipv4::PROTOCOL_UDP);
            ip.set_src(ipv4::pton("10.0.0.1"));
            ip.set_dst(ipv4::pton("10.0.0.2"));
        }
        let udp_off = eth_size + ip_size;
        {
            let mut udp = header::from_mem::<UDP>(&mut p.data[udp_off..udp_off + udp_size]);
            udp.set_src_port(1);
            udp.set_dst_port(0);
        }
        p
    }

    fn setup() -> (Chain, PortTable, BufferPool, Config) {
        let mut ports = PortTable::new();
        ports.add(Port::new(1, ethernet::pton("00:00:00:00:00:01"), "p1"));
        ports.add(Port::new(3, ethernet::pton("00:00:00:00:00:03"), "p3"));
        (Chain::new(), ports, BufferPool::new(), Config::default())
    }

    #[test]
    fn exact_match_forwards_and_counts() {
        let (mut chain, mut ports, mut pool, config) = setup();
        let frame = udp_frame();
        let (key, _) = key::parse_packet(&mut frame.data[..frame.length as usize].to_vec(), 1);
        let mut flow = Flow::new(key, 0, 0, 0);
        flow.actions.push(Action::Output { port: 3, max_len: 0 });
        chain.insert(flow).unwrap();

        let frame_len = frame.length as u64;
        let punts = handle_frame(&mut chain, &mut ports, &mut pool, &config, 1, frame, 10);
        assert!(punts.is_empty());
        let matched = chain.lookup(&key).unwrap();
        assert_eq!(matched.packet_count, 1);
        assert_eq!(matched.byte_count, frame_len);
        let out = crate::link::receive(&mut ports.get_mut(3).unwrap().tx_queue);
        packet::free(out);
    }

    #[test]
    fn miss_saves_buffer_and_truncates() {
        let (mut chain, mut ports, mut pool, mut config) = setup();
        config.miss_send_len = 10;
        let frame = udp_frame();
        let total_len = frame.length;
        let punts = handle_frame(&mut chain, &mut ports, &mut pool, &config, 1, frame, 0);
        assert_eq!(punts.len(), 1);
        assert_eq!(punts[0].reason, ofp::REASON_NO_MATCH);
        assert_eq!(punts[0].total_len, total_len);
        assert_eq!(punts[0].data.len(), 10);
        assert_ne!(punts[0].buffer_id, ofp::NO_BUFFER);
        let back = pool.retrieve(punts[0].buffer_id).unwrap();
        packet::free(back);
    }

    #[test]
    fn no_recv_port_drops_silently() {
        let (mut chain, mut ports, mut pool, config) = setup();
        ports.get_mut(1).unwrap().flags |= crate::port::NO_RECV;
        let frame = udp_frame();
        let punts = handle_frame(&mut chain, &mut ports, &mut pool, &config, 1, frame, 0);
        assert!(punts.is_empty());
    }

    #[test]
    fn no_fwd_port_drops_flow_output_but_not_packet_out() {
        let (mut chain, mut ports, mut pool, config) = setup();
        ports.get_mut(3).unwrap().flags |= crate::port::NO_FWD;

        let frame = udp_frame();
        let (key, _) = key::parse_packet(&mut frame.data[..frame.length as usize].to_vec(), 1);
        let mut flow = Flow::new(key, 0, 0, 0);
        flow.actions.push(Action::Output { port: 3, max_len: 0 });
        chain.insert(flow).unwrap();

        let punts = handle_frame(&mut chain, &mut ports, &mut pool, &config, 1, frame, 0);
        assert!(punts.is_empty());
        assert_eq!(ports.get(3).unwrap().drop, 1);
        assert_eq!(ports.get(3).unwrap().tx, 0);

        // PACKET_OUT-style replay (ignore_no_fwd = true) still gets through.
        let frame2 = udp_frame();
        let deliveries = action::execute(
            frame2,
            &mut Key::new(1),
            &[Action::Output { port: 3, max_len: 0 }],
            true,
        );
        let punts2 = deliver_all(&mut ports, 1, deliveries);
        assert!(punts2.is_empty());
        assert_eq!(ports.get(3).unwrap().tx, 1);
        let out = crate::link::receive(&mut ports.get_mut(3).unwrap().tx_queue);
        packet::free(out);
    }
}
