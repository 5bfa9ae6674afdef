use super::lib;

// IP CHECKSUM
//
// The checksum module provides the ones-complement checksum routine used
// to verify and (re)compute IPv4/TCP/UDP checksums, plus the RFC 1624
// incremental-update helpers the action executor uses to patch a checksum
// in place when a header field is rewritten, instead of recomputing it
// over the whole packet.
//
//  ipsum(data: &[u8], length: usize, initial: u16) -> checksum: u16
//    return the ones-complement checksum for the given region of memory
//  replace_u16(old_csum, old_field, new_field) -> new_csum - RFC 1624 eq. 3
//  replace_u32(old_csum, old_field, new_field) -> new_csum - RFC 1624 eq. 3
//
// This is a portable-only reimplementation: the upstream routine this was
// grounded on has hand-written x86_64/aarch64 asm fast paths, dropped here
// since no inline asm is used in this codebase.

pub fn ipsum(data: &[u8], length: usize, initial: u16) -> u16 {
    let ptr: *const u8 = data.as_ptr();
    // The running sum is accumulated over words read in native byte order
    // (no ntohs per word); only the final result gets byte-swapped back.
    // `initial` is given in host byte order so it has to be swapped into
    // that same internal representation before joining the sum.
    let mut csum: u64 = initial.swap_bytes() as u64;
    let mut i = length;
    while i > 1 {
        let word = unsafe { *(ptr.offset((length-i) as isize) as *const u16) };
        csum += word as u64;
        i -= 2;
    }
    if i == 1 {
        csum += data[length-1] as u64;
    }
    loop {
        let carry = csum >> 16;
        if carry == 0 { break; }
        csum = (csum & 0xffff) + carry;
    }
    lib::ntohs(!csum as u16 & 0xffff)
}

// fold_complement: add a 16-bit one's-complement sum and fold the carry
// back in, as used by the RFC 1624 incremental update equations.
fn fold_complement(a: u32, b: u32) -> u16 {
    let mut sum = a + b;
    while sum >> 16 != 0 {
        sum = (sum & 0xffff) + (sum >> 16);
    }
    sum as u16
}

// replace_u16: recompute a checksum after a 16-bit field changes from
// `old` to `new`, without re-summing the rest of the packet (RFC 1624
// eq. 3: HC' = ~(~HC + ~m + m')). All arguments and the result are in
// host byte order.
pub fn replace_u16(old_csum: u16, old_field: u16, new_field: u16) -> u16 {
    let sum = fold_complement((!old_csum) as u32, (!old_field) as u32);
    !fold_complement(sum as u32, new_field as u32)
}

// replace_u32: same as replace_u16 but for a 32-bit field (e.g. an IPv4
// address), folded as two 16-bit halves.
pub fn replace_u32(old_csum: u16, old_field: u32, new_field: u32) -> u16 {
    let old_hi = (old_field >> 16) as u16;
    let old_lo = old_field as u16;
    let new_hi = (new_field >> 16) as u16;
    let new_lo = new_field as u16;
    let mid = replace_u16(old_csum, old_hi, new_hi);
    replace_u16(mid, old_lo, new_lo)
}

#[cfg(test)]
mod selftest {
    use super::*;

    #[test]
    fn checksum() {
        let cases: Vec<&[u8]> = vec![
            &[0xffu8, 0xff, 0xff, 0xff, 0xff],
            &[0u8, 0, 0, 0, 0],
            &[42u8, 41, 40, 39, 38, 37, 36, 35, 34, 33, 32, 31, 30, 29, 28],
            &[],
            &[01u8, 02, 03, 04, 05, 06, 07, 08, 09, 10, 11, 12, 13, 14, 15, 16,
              01u8, 02, 03, 04, 05, 06, 07, 08, 09, 10, 11, 12, 13, 14, 15, 16,
              01u8, 02, 03, 04, 05, 06, 07, 08, 09, 10, 11, 12, 13, 14, 15, 16,
              01u8, 02, 03, 04, 05, 06, 07, 08, 09, 10, 11, 12, 13, 14, 15]
        ];
        for case in cases {
            for l in 0..=case.len() {
                // Self-consistency: checksumming data against its own
                // complement yields zero.
                let sum = ipsum(case, l, 0);
                assert_eq!(ipsum(case, l, !sum), 0);
            }
        }
    }

    #[test]
    fn checksum_incremental_u16() {
        // A buffer carrying a valid checksum over its own first two bytes
        // interpreted as a field; replacing that field incrementally must
        // agree with recomputing from scratch.
        let mut data = [0x12u8, 0x34, 0x00, 0x00];
        let csum = ipsum(&data, data.len(), 0);
        data[2] = (csum >> 8) as u8;
        data[3] = (csum & 0xff) as u8;
        assert_eq!(ipsum(&data, data.len(), 0), 0);

        let old_field = lib::ntohs(u16::from_be_bytes([data[0], data[1]]));
        let new_field: u16 = 0x5678;
        let new_csum = replace_u16(csum, old_field, new_field);

        data[0] = (new_field >> 8) as u8;
        data[1] = (new_field & 0xff) as u8;
        data[2] = (new_csum >> 8) as u8;
        data[3] = (new_csum & 0xff) as u8;
        assert_eq!(ipsum(&data, data.len(), 0), 0);
    }

    #[test]
    fn checksum_incremental_u32() {
        let mut data = [0x01u8, 0x02, 0x03, 0x04, 0x00, 0x00];
        let csum = ipsum(&data, data.len(), 0);
        data[4] = (csum >> 8) as u8;
        data[5] = (csum & 0xff) as u8;
        assert_eq!(ipsum(&data, data.len(), 0), 0);

        let old_field = u32::from_be_bytes([data[0], data[1], data[2], data[3]]);
        let new_field: u32 = 0xc0a80101;
        let new_csum = replace_u32(csum, old_field, new_field);

        data[0..4].copy_from_slice(&new_field.to_be_bytes());
        data[4] = (new_csum >> 8) as u8;
        data[5] = (new_csum & 0xff) as u8;
        assert_eq!(ipsum(&data, data.len(), 0), 0);
    }
}
