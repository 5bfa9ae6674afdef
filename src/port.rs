use crate::ethernet::MacAddress;
use crate::link::{self, Link};
use crate::ofp;
use crate::packet::{self, Packet};

// PORT REGISTRY & OUTPUT
//
// Per-port state and the output-side semantics of Output actions (spec.md
// §3/§4.7/§4.9): FLOOD/ALL/LOCAL/CONTROLLER sentinels and direct numeric
// output, each either queuing a frame on a port's egress `Link` or handing
// it to the caller for controller delivery. `Link` itself (the ring-buffer
// queue) is reused unchanged from the teacher.

pub const NO_FLOOD: u32 = 1 << 0;
pub const NO_RECV: u32 = 1 << 1;
pub const NO_RECV_STP: u32 = 1 << 2;
pub const NO_FWD: u32 = 1 << 3;

pub struct Port {
    pub port_no: u16,
    pub hw_addr: MacAddress,
    pub name: String,
    pub flags: u32,
    pub speed: u32,
    pub features: u32,
    pub rx: u64,
    pub tx: u64,
    pub drop: u64,
    pub rx_queue: Link,
    pub tx_queue: Link,
}

impl Port {
    pub fn new(port_no: u16, hw_addr: MacAddress, name: &str) -> Port {
        Port {
            port_no,
            hw_addr,
            name: name.to_string(),
            flags: 0,
            speed: 0,
            features: 0,
            rx: 0,
            tx: 0,
            drop: 0,
            rx_queue: link::new(),
            tx_queue: link::new(),
        }
    }

    pub fn has_flag(&self, flag: u32) -> bool {
        self.flags & flag != 0
    }

    // send: queue a frame for egress on this port, or drop it and bump the
    // port's drop counter if the queue is full (link::transmit already
    // tracks tx counters on the link itself; `self.tx`/`self.drop` mirror
    // them at the port-registry level since stats handlers read ports, not
    // links, per spec.md §4.10).
    pub fn send(&mut self, frame: Box<Packet>) {
        if link::full(&self.tx_queue) {
            self.drop += 1;
            packet::free(frame);
            return;
        }
        self.tx += 1;
        link::transmit(&mut self.tx_queue, frame);
    }
}

pub struct PortTable {
    ports: Vec<Port>,
    // Frames dropped because Output named a port number this table has no
    // entry for (spec.md §4.7: "an unknown or down port drops the frame
    // and increments the port's drop_count" — with no Port to own the
    // counter, it's tallied here instead).
    pub unknown_port_drops: u64,
}

// Where a numeric-port lookup, FLOOD, or ALL output should land.
pub enum Resolved {
    Port(u16),
    Controller,
    Local,
    Flooded,
    Dropped,
}

impl PortTable {
    pub fn new() -> PortTable {
        PortTable { ports: Vec::new(), unknown_port_drops: 0 }
    }

    pub fn add(&mut self, port: Port) {
        self.ports.push(port);
    }

    pub fn get(&self, port_no: u16) -> Option<&Port> {
        self.ports.iter().find(|p| p.port_no == port_no)
    }

    pub fn get_mut(&mut self, port_no: u16) -> Option<&mut Port> {
        self.ports.iter_mut().find(|p| p.port_no == port_no)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Port> {
        self.ports.iter()
    }

    // output: deliver `frame` per spec.md §4.7's Output semantics. Returns
    // a frame the caller must punt to the controller for CONTROLLER output
    // (truncation to max_len is the caller's job, since it needs the
    // `ignore_no_fwd`/reason bookkeeping this module doesn't own), or None
    // once the frame has been fully consumed (sent, flooded, or dropped).
    pub fn output(&mut self, port: u16, ingress: u16, frame: Box<Packet>) -> Option<Box<Packet>> {
        if port == ofp::OFPP_CONTROLLER {
            return Some(frame);
        }
        if port == ofp::OFPP_FLOOD || port == ofp::OFPP_ALL {
            self.flood(ingress, frame, port == ofp::OFPP_FLOOD);
            return None;
        }
        if port == ofp::OFPP_LOCAL {
            // No host stack is modeled; a LOCAL delivery has nowhere to go.
            packet::free(frame);
            return None;
        }
        match self.get_mut(port) {
            Some(p) => p.send(frame),
            None => {
                self.unknown_port_drops += 1;
                packet::free(frame);
            }
        }
        None
    }

    // flood: emit a clone on every port but the ingress (and, when
    // `respect_no_flood`, those flagged NO_FLOOD). The last eligible port
    // gets the original frame without cloning.
    fn flood(&mut self, ingress: u16, frame: Box<Packet>, respect_no_flood: bool) {
        let targets: Vec<usize> = self
            .ports
            .iter()
            .enumerate()
            .filter(|(_, p)| p.port_no != ingress && !(respect_no_flood && p.has_flag(NO_FLOOD)))
            .map(|(i, _)| i)
            .collect();
        if targets.is_empty() {
            packet::free(frame);
            return;
        }
        let last = targets.len() - 1;
        let mut frame = Some(frame);
        for (i, idx) in targets.iter().enumerate() {
            let out = if i == last {
                frame.take().unwrap()
            } else {
                packet::clone(frame.as_ref().unwrap())
            };
            self.ports[*idx].send(out);
        }
    }

    pub fn to_wire(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        for p in &self.ports {
            let mut pp = crate::header::new::<ofp::PhyPort>();
            pp.set_port_no(p.port_no);
            pp.set_hw_addr(&p.hw_addr);
            pp.set_name(&p.name);
            pp.set_flags(p.flags);
            pp.set_speed(p.speed);
            pp.set_features(p.features);
            let mut bytes = vec![0u8; crate::header::size_of::<ofp::PhyPort>()];
            pp.copy(&mut bytes);
            buf.extend_from_slice(&bytes);
        }
        buf
    }
}

#[cfg(test)]
mod selftest {
    use super::*;
    use crate::ethernet;

    #[test]
    fn numeric_output_queues_on_target_port() {
        let mut table = PortTable::new();
        table.add(Port::new(1, ethernet::pton("00:00:00:00:00:01"), "eth1"));
        table.add(Port::new(2, ethernet::pton("00:00:00:00:00:02"), "eth2"));
        let p = packet::allocate();
        assert!(table.output(2, 1, p).is_none());
        assert_eq!(table.get(2).unwrap().tx, 1);
        let out = link::receive(&mut table.get_mut(2).unwrap().tx_queue);
        packet::free(out);
    }

    #[test]
    fn unknown_port_drops_frame() {
        let mut table = PortTable::new();
        table.add(Port::new(1, ethernet::pton("00:00:00:00:00:01"), "eth1"));
        let p = packet::allocate();
        assert!(table.output(99, 1, p).is_none());
        assert_eq!(table.unknown_port_drops, 1);
    }

    #[test]
    fn flood_skips_ingress_and_no_flood_ports() {
        let mut table = PortTable::new();
        table.add(Port::new(1, ethernet::pton("00:00:00:00:00:01"), "eth1"));
        table.add(Port::new(2, ethernet::pton("00:00:00:00:00:02"), "eth2"));
        table.add(Port::new(3, ethernet::pton("00:00:00:00:00:03"), "eth3"));
        table.get_mut(3).unwrap().flags |= NO_FLOOD;
        let p = packet::allocate();
        assert!(table.output(ofp::OFPP_FLOOD, 1, p).is_none());
        assert_eq!(table.get(2).unwrap().tx, 1);
        assert_eq!(table.get(3).unwrap().tx, 0);
        let out = link::receive(&mut table.get_mut(2).unwrap().tx_queue);
        packet::free(out);
    }

    #[test]
    fn controller_output_is_handed_back() {
        let mut table = PortTable::new();
        table.add(Port::new(1, ethernet::pton("00:00:00:00:00:01"), "eth1"));
        let p = packet::allocate();
        let back = table.output(ofp::OFPP_CONTROLLER, 1, p);
        assert!(back.is_some());
        packet::free(back.unwrap());
    }
}
