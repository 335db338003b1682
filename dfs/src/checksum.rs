const POLY: u32 = 0xEDB8_8320;

/// CRC-32 (IEEE 802.3, reflected) over `data`. Fragments store this value
/// zero-extended into their 64-bit checksum field.
pub fn crc32(data: &[u8]) -> u32 {
    let mut crc: u32 = 0xFFFF_FFFF;

    for &byte in data {
        crc ^= byte as u32;
        for _ in 0..8 {
            crc = if crc & 1 != 0 {
                (crc >> 1) ^ POLY
            } else {
                crc >> 1
            };
        }
    }

    !crc
}
