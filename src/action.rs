use crate::checksum;
use crate::ethernet::{self, Ethernet, Vlan};
use crate::flow::Action;
use crate::header;
use crate::ipv4::{self, IPv4};
use crate::key::{Key, VLAN_NONE};
use crate::lib;
use crate::packet::{self, Packet};
use crate::tcp::TCP;
use crate::udp::UDP;

// ACTION EXECUTOR
//
// Runs a flow's action program against one frame (spec.md §4.7). Header
// rewrites mutate the single owned frame in place, recomputing checksums
// incrementally per RFC 1624 via `checksum::replace_u16`/`replace_u32`
// (the same machinery `offload::maybe_fill_in_checksum` leans on for
// offloaded-checksum fill-in, generalized here to arbitrary field
// replacement). `Output` actions are collected into `Delivery` records;
// every `Output` but the program's last action gets a cloned frame, the
// last one takes the (by-then fully rewritten) original — the "optimizes
// the single-output case with no clone" rule.
//
//   Delivery - one frame destined for one port
//   execute(packet, key, actions, ignore_no_fwd) -> Vec<Delivery>

pub struct Delivery {
    pub port: u16,
    pub max_len: u16,
    pub ignore_no_fwd: bool,
    pub packet: Box<Packet>,
}

pub fn execute(
    mut packet: Box<Packet>,
    key: &mut Key,
    actions: &[Action],
    ignore_no_fwd: bool,
) -> Vec<Delivery> {
    let mut deliveries = Vec::new();
    let n = actions.len();
    for (i, action) in actions.iter().enumerate() {
        if let Action::Output { port, max_len } = action {
            if i == n - 1 {
                deliveries.push(Delivery { port: *port, max_len: *max_len, ignore_no_fwd, packet });
                return deliveries;
            }
            let clone = packet::clone(&packet);
            deliveries.push(Delivery { port: *port, max_len: *max_len, ignore_no_fwd, packet: clone });
        } else {
            apply_rewrite(&mut packet, key, action);
        }
    }
    // No Output action was the final action (or the program was empty):
    // the frame is consumed without a send.
    packet::free(packet);
    deliveries
}

fn apply_rewrite(packet: &mut Packet, key: &mut Key, action: &Action) {
    match action {
        Action::Output { .. } => unreachable!("Output is handled by execute"),
        Action::SetDlSrc(mac) => {
            let eth_size = header::size_of::<Ethernet>();
            if (packet.length as usize) < eth_size { return; }
            let mut eth = header::from_mem::<Ethernet>(&mut packet.data[0..eth_size]);
            eth.set_src(mac);
        }
        Action::SetDlDst(mac) => {
            let eth_size = header::size_of::<Ethernet>();
            if (packet.length as usize) < eth_size { return; }
            let mut eth = header::from_mem::<Ethernet>(&mut packet.data[0..eth_size]);
            eth.set_dst(mac);
        }
        Action::SetVlanVid(vid) => set_vlan_vid(packet, *vid),
        Action::SetVlanPcp(pcp) => set_vlan_pcp(packet, *pcp),
        Action::StripVlan => {
            strip_vlan(packet);
            key.dl_vlan = VLAN_NONE;
        }
        Action::SetNwSrc(addr) => set_nw_addr(packet, *addr, true),
        Action::SetNwDst(addr) => set_nw_addr(packet, *addr, false),
        Action::SetTpSrc(port) => set_tp_port(packet, *port, true),
        Action::SetTpDst(port) => set_tp_port(packet, *port, false),
    }
}

struct Layout {
    ip_offset: usize,
    l4_offset: usize,
    protocol: u8,
}

// locate_ip: re-scan the frame for the IPv4 header's (and transport
// header's) current offset. Run fresh before every header rewrite since a
// prior VLAN push/strip in the same action list shifts everything after
// the MAC addresses.
fn locate_ip(packet: &Packet) -> Option<Layout> {
    let len = packet.length as usize;
    let data = &packet.data[..len];
    let eth_size = header::size_of::<Ethernet>();
    if data.len() < eth_size {
        return None;
    }
    let mut dl_type = u16::from_be_bytes([data[12], data[13]]);
    let mut offset = eth_size;
    if dl_type == ethernet::TYPE_VLAN {
        let vlan_size = header::size_of::<Vlan>();
        if data.len() < offset + vlan_size {
            return None;
        }
        dl_type = u16::from_be_bytes([data[offset + 2], data[offset + 3]]);
        offset += vlan_size;
    }
    if dl_type != ethernet::TYPE_IPV4 {
        return None;
    }
    let ip_size = header::size_of::<IPv4>();
    if data.len() < offset + ip_size {
        return None;
    }
    let ihl = (data[offset] & 0x0f) as usize;
    let protocol = data[offset + 9];
    Some(Layout { ip_offset: offset, l4_offset: offset + ihl * 4, protocol })
}

fn set_nw_addr(packet: &mut Packet, new_addr: u32, is_src: bool) {
    let layout = match locate_ip(packet) {
        Some(l) => l,
        None => return,
    };
    let len = packet.length as usize;
    let ip_size = header::size_of::<IPv4>();
    let old_addr;
    {
        let mut ip = header::from_mem::<IPv4>(&mut packet.data[layout.ip_offset..layout.ip_offset + ip_size]);
        old_addr = if is_src { ip.src() } else { ip.dst() };
        if old_addr == new_addr {
            return;
        }
        let old_csum = ip.checksum();
        ip.set_checksum(checksum::replace_u32(old_csum, old_addr, new_addr));
        if is_src { ip.set_src(new_addr); } else { ip.set_dst(new_addr); }
    }

    if layout.protocol == ipv4::PROTOCOL_TCP {
        let tcp_size = header::size_of::<TCP>();
        if len >= layout.l4_offset + tcp_size {
            let mut tcp = header::from_mem::<TCP>(&mut packet.data[layout.l4_offset..layout.l4_offset + tcp_size]);
            let old_csum = tcp.checksum();
            tcp.set_checksum(checksum::replace_u32(old_csum, old_addr, new_addr));
        }
    } else if layout.protocol == ipv4::PROTOCOL_UDP {
        let udp_size = header::size_of::<UDP>();
        if len >= layout.l4_offset + udp_size {
            let mut udp = header::from_mem::<UDP>(&mut packet.data[layout.l4_offset..layout.l4_offset + udp_size]);
            if udp.checksum() != 0 {
                let old_csum = udp.checksum();
                udp.set_checksum(checksum::replace_u32(old_csum, old_addr, new_addr));
            }
        }
    }
}

fn set_tp_port(packet: &mut Packet, new_port: u16, is_src: bool) {
    let layout = match locate_ip(packet) {
        Some(l) => l,
        None => return,
    };
    let len = packet.length as usize;
    if layout.protocol == ipv4::PROTOCOL_TCP {
        let tcp_size = header::size_of::<TCP>();
        if len < layout.l4_offset + tcp_size {
            return;
        }
        let mut tcp = header::from_mem::<TCP>(&mut packet.data[layout.l4_offset..layout.l4_offset + tcp_size]);
        let old_port = if is_src { tcp.src_port() } else { tcp.dst_port() };
        if old_port == new_port {
            return;
        }
        let old_csum = tcp.checksum();
        tcp.set_checksum(checksum::replace_u16(old_csum, lib::htons(old_port), lib::htons(new_port)));
        if is_src { tcp.set_src_port(new_port); } else { tcp.set_dst_port(new_port); }
    } else if layout.protocol == ipv4::PROTOCOL_UDP {
        let udp_size = header::size_of::<UDP>();
        if len < layout.l4_offset + udp_size {
            return;
        }
        let mut udp = header::from_mem::<UDP>(&mut packet.data[layout.l4_offset..layout.l4_offset + udp_size]);
        let old_port = if is_src { udp.src_port() } else { udp.dst_port() };
        if old_port == new_port {
            return;
        }
        if udp.checksum() != 0 {
            let old_csum = udp.checksum();
            udp.set_checksum(checksum::replace_u16(old_csum, lib::htons(old_port), lib::htons(new_port)));
        }
        if is_src { udp.set_src_port(new_port); } else { udp.set_dst_port(new_port); }
    }
}

fn vlan_tag_offset(packet: &Packet) -> Option<usize> {
    let len = packet.length as usize;
    if len < 14 {
        return None;
    }
    if u16::from_be_bytes([packet.data[12], packet.data[13]]) == ethernet::TYPE_VLAN {
        Some(12)
    } else {
        None
    }
}

fn set_vlan_vid(packet: &mut Packet, vid: u16) {
    match vlan_tag_offset(packet) {
        Some(tag_off) => {
            let vlan_off = tag_off + 2;
            let vlan_size = header::size_of::<Vlan>();
            let mut vlan = header::from_mem::<Vlan>(&mut packet.data[vlan_off..vlan_off + vlan_size]);
            vlan.set_vid(vid);
        }
        None => push_vlan(packet, vid, 0),
    }
}

fn set_vlan_pcp(packet: &mut Packet, pcp: u16) {
    match vlan_tag_offset(packet) {
        Some(tag_off) => {
            let vlan_off = tag_off + 2;
            let vlan_size = header::size_of::<Vlan>();
            let mut vlan = header::from_mem::<Vlan>(&mut packet.data[vlan_off..vlan_off + vlan_size]);
            vlan.set_pcp(pcp);
        }
        None => push_vlan(packet, 0, pcp),
    }
}

// push_vlan: insert a 4-byte 802.1Q tag after the two MAC addresses,
// shifting everything from the old ethertype field onward.
fn push_vlan(packet: &mut Packet, vid: u16, pcp: u16) {
    let len = packet.length as usize;
    if len < 14 {
        return;
    }
    let new_len = len + 4;
    assert!(new_len <= packet::PAYLOAD_SIZE, "VLAN push overflows packet buffer");
    for i in (12..len).rev() {
        packet.data[i + 4] = packet.data[i];
    }
    packet.data[12] = (ethernet::TYPE_VLAN >> 8) as u8;
    packet.data[13] = (ethernet::TYPE_VLAN & 0xff) as u8;
    let tci: u16 = ((pcp & 0x7) << 13) | (vid & 0x0fff);
    packet.data[14] = (tci >> 8) as u8;
    packet.data[15] = (tci & 0xff) as u8;
    packet.length = new_len as u16;
}

fn strip_vlan(packet: &mut Packet) {
    if vlan_tag_offset(packet).is_none() {
        return;
    }
    let len = packet.length as usize;
    for i in 16..len {
        packet.data[i - 4] = packet.data[i];
    }
    packet.length -= 4;
}
