//! LEB128-style variable-length integers, as used by the frame index box.

/// Appends `value` as a base-128 varint, 7 bits per byte, continuation bit
/// in the high bit, least significant group first.
pub fn encode_varint(mut value: u64, out: &mut Vec<u8>) {
    loop {
        let byte = (value & 0x7F) as u8;
        value >>= 7;
        if value == 0 {
            out.push(byte);
            return;
        }
        out.push(byte | 0x80);
    }
}

/// Decodes a varint starting at `pos`, advancing `pos` past it. Used by
/// tests that pick the frame index box apart.
#[cfg(test)]
pub fn decode_varint(bytes: &[u8], pos: &mut usize) -> u64 {
    let mut value = 0u64;
    let mut shift = 0;
    loop {
        let byte = bytes[*pos];
        *pos += 1;
        value |= u64::from(byte & 0x7F) << shift;
        if byte & 0x80 == 0 {
            return value;
        }
        shift += 7;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip(value: u64) -> usize {
        let mut buf = Vec::new();
        encode_varint(value, &mut buf);
        let mut pos = 0;
        assert_eq!(decode_varint(&buf, &mut pos), value);
        assert_eq!(pos, buf.len());
        buf.len()
    }

    #[test]
    fn small_values_are_one_byte() {
        assert_eq!(roundtrip(0), 1);
        assert_eq!(roundtrip(1), 1);
        assert_eq!(roundtrip(127), 1);
    }

    #[test]
    fn continuation_bytes() {
        assert_eq!(roundtrip(128), 2);
        assert_eq!(roundtrip(300), 2);
        assert_eq!(roundtrip(1 << 20), 3);
        assert_eq!(roundtrip(u64::MAX), 10);
    }

    #[test]
    fn encoding_of_300() {
        let mut buf = Vec::new();
        encode_varint(300, &mut buf);
        assert_eq!(buf, vec![0xAC, 0x02]);
    }
}
