// PACKET ACCOUNTING
//
// Global counters for packets freed, mirroring the teacher's engine-wide
// statistics. The rest of the teacher's engine — the App/AppConfig
// dataflow graph, the breathe loop, and its reporting — drove a
// reconfigurable app network that this datapath doesn't have: it's a
// fixed two-stage pipeline (forward, dispatch) driven directly by
// `Datapath::run_once`, not a named, rewirable graph of apps. Only the
// counters `packet::free` touches on every call survive here.
//
//   EngineStats - global packet-free counters
//   stats() -> &EngineStats - get them
//   add_frees/add_freebytes/add_freebits - bump them

pub struct EngineStats {
    pub frees: u64,    // Total packets freed
    pub freebits: u64, // Total packet bits freed (for 10GbE)
    pub freebytes: u64 // Total packet bytes freed
}
static mut STATS: EngineStats = EngineStats { frees: 0, freebits: 0, freebytes: 0 };

pub fn add_frees    ()           { unsafe { STATS.frees += 1 } }
pub fn add_freebytes(bytes: u64) { unsafe { STATS.freebytes += bytes; } }
pub fn add_freebits (bits: u64)  { unsafe { STATS.freebits += bits; } }
pub fn stats() -> &'static EngineStats { unsafe { &STATS } }
