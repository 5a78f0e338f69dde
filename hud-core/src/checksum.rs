//! Frame checksums used by the supported protocols

/// NMEA-0183: XOR of every byte between `$` and `*`
pub fn nmea_xor(body: &[u8]) -> u8 {
    body.iter().fold(0u8, |acc, b| acc ^ b)
}

/// Additive 8-bit sum (Dynon Skyview, Garmin G3X text out)
pub fn sum8(bytes: &[u8]) -> u8 {
    bytes.iter().fold(0u8, |acc, b| acc.wrapping_add(*b))
}

/// One's complement of the 8-bit sum (GRT EIS)
pub fn ones_complement_sum8(bytes: &[u8]) -> u8 {
    !sum8(bytes)
}

/// Two upper-case hex digits as sent on the wire
pub fn to_hex2(value: u8) -> [u8; 2] {
    const HEX: &[u8; 16] = b"0123456789ABCDEF";
    [HEX[(value >> 4) as usize], HEX[(value & 0x0F) as usize]]
}

/// Parse two ASCII hex digits (either case)
pub fn parse_hex2(digits: &[u8]) -> Option<u8> {
    if digits.len() != 2 {
        return None;
    }
    let s = std::str::from_utf8(digits).ok()?;
    u8::from_str_radix(s, 16).ok()
}

// GDL-90 ICD, CRC-16-CCITT (polynomial 0x1021) lookup table
const CRC16_TABLE: [u16; 256] = build_crc16_table();

const fn build_crc16_table() -> [u16; 256] {
    let mut table = [0u16; 256];
    let mut i = 0;
    while i < 256 {
        let mut crc = (i as u16) << 8;
        let mut bit = 0;
        while bit < 8 {
            crc = if crc & 0x8000 != 0 {
                (crc << 1) ^ 0x1021
            } else {
                crc << 1
            };
            bit += 1;
        }
        table[i] = crc;
        i += 1;
    }
    table
}

/// GDL-90 frame check sequence over the unescaped message bytes
pub fn crc16_ccitt(bytes: &[u8]) -> u16 {
    bytes.iter().fold(0u16, |crc, b| {
        CRC16_TABLE[(crc >> 8) as usize] ^ (crc << 8) ^ (*b as u16)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nmea_xor_known_sentence() {
        // $GPGLL,4916.45,N,12311.12,W,225444,A*31
        let body = b"GPGLL,4916.45,N,12311.12,W,225444,A";
        assert_eq!(nmea_xor(body), 0x31);
    }

    #[test]
    fn test_sum8_wraps() {
        assert_eq!(sum8(&[0xFF, 0x02]), 0x01);
    }

    #[test]
    fn test_ones_complement() {
        assert_eq!(ones_complement_sum8(&[0x01, 0x02]), 0xFC);
    }

    #[test]
    fn test_hex2() {
        assert_eq!(&to_hex2(0x3A), b"3A");
        assert_eq!(parse_hex2(b"3a"), Some(0x3A));
        assert_eq!(parse_hex2(b"G1"), None);
        assert_eq!(parse_hex2(b"1"), None);
    }

    #[test]
    fn test_crc16_table_matches_icd() {
        assert_eq!(CRC16_TABLE[1], 0x1021);
        assert_eq!(CRC16_TABLE[255], 0x1EF0);
    }

    #[test]
    fn test_crc16_heartbeat_example() {
        // heartbeat example from the GDL-90 ICD: 00 81 41 DB D0 08 02, FCS B3 8B
        let msg = [0x00, 0x81, 0x41, 0xDB, 0xD0, 0x08, 0x02];
        assert_eq!(crc16_ccitt(&msg), 0x8BB3);
    }
}
