#![allow(dead_code)]

mod packet;
mod link;
mod engine;
mod lib;
mod header;
mod ethernet;
mod arp;
mod ipv4;
mod tcp;
mod udp;
mod checksum;
mod error;
mod key;
mod flow;
mod ofp;
mod table_hash;
mod table_linear;
mod chain;
mod buffer_pool;
mod action;
mod port;
mod forwarder;
mod dispatch;
mod datapath;

use port::{Port, PortTable};
use std::io::Read;

fn main() {
    tracing_subscriber::fmt::init();

    let dpid: u64 = std::env::var("OFDP_DPID").ok().and_then(|v| v.parse().ok()).unwrap_or(1);
    let mut ports = PortTable::new();
    if let Ok(spec) = std::env::var("OFDP_PORTS") {
        for (i, name) in spec.split(',').filter(|s| !s.is_empty()).enumerate() {
            let port_no = (i + 1) as u16;
            let hw_addr = [0x02, 0x00, 0x00, 0x00, 0x00, port_no as u8];
            ports.add(Port::new(port_no, hw_addr, name));
        }
    }

    let mut dp = datapath::Datapath::new(dpid, ports);
    dp.config = forwarder::Config::from_env();

    // Drain whatever OpenFlow control messages arrive on stdin, length-
    // prefixed the same way the wire codec framing assumes (spec.md §6),
    // and run one breathe after each. The secure-channel transport itself
    // (TCP/SSL) is out of scope (spec.md §1).
    let mut input = Vec::new();
    std::io::stdin().read_to_end(&mut input).ok();
    let mut offset = 0;
    let mut now = 0u64;
    while offset + 8 <= input.len() {
        let length = u16::from_be_bytes([input[offset + 2], input[offset + 3]]) as usize;
        if length < 8 || offset + length > input.len() {
            break;
        }
        let replies = dp.handle_control_message(&input[offset..offset + length], now);
        for reply in replies {
            tracing::debug!(bytes = reply.len(), "control reply");
        }
        offset += length;
        now += 1;
    }
    dp.run_once(now);
}