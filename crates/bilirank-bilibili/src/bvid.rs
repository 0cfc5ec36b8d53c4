//! Reversible transform between the public `BV…` short ID and the numeric
//! `aid` the platform indexes by.

const XOR_CODE: u64 = 23_442_827_791_579;
/// `2^51 - 1`
const MASK_CODE: u64 = 2_251_799_813_685_247;
const BASE: u64 = 58;
const ALPHABET: &[u8; 58] = b"FcwAPNKTMug3GV5Lj7EJnHpWsx4tb8haYeviqBz6rkCy12mUSDQX9RdoZf";
const BVID_LEN: usize = 12;
const PREFIX_LEN: usize = 3;

fn swap_positions(buf: &mut [u8]) {
    buf.swap(3, 9);
    buf.swap(4, 7);
}

fn alphabet_index(ch: u8) -> Option<u64> {
    ALPHABET
        .iter()
        .position(|&c| c == ch)
        .map(|i| i as u64)
}

/// Decodes a short ID into its numeric ID.
///
/// Returns `0` for anything malformed: wrong length, missing `BV` prefix, or
/// a character outside the alphabet.
#[must_use]
pub fn decode_bvid(bvid: &str) -> u64 {
    let bytes = bvid.as_bytes();
    if bytes.len() < BVID_LEN || !bytes.starts_with(b"BV") {
        return 0;
    }

    let mut buf = bytes[..BVID_LEN].to_vec();
    swap_positions(&mut buf);

    let mut value: u64 = 0;
    for &ch in &buf[PREFIX_LEN..] {
        let Some(digit) = alphabet_index(ch) else {
            return 0;
        };
        value = value.wrapping_mul(BASE).wrapping_add(digit);
    }

    (value & MASK_CODE) ^ XOR_CODE
}

/// Encodes a numeric ID into its short ID. Inverse of [`decode_bvid`].
#[must_use]
pub fn encode_avid(aid: u64) -> String {
    let mut buf = *b"BV1000000000";
    let mut value = (aid | (MASK_CODE + 1)) ^ XOR_CODE;
    let mut idx = BVID_LEN - 1;
    while value > 0 && idx >= PREFIX_LEN {
        #[allow(clippy::cast_possible_truncation)]
        let digit = (value % BASE) as usize;
        buf[idx] = ALPHABET[digit];
        value /= BASE;
        idx -= 1;
    }
    swap_positions(&mut buf);
    String::from_utf8_lossy(&buf).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_known_ids() {
        assert_eq!(decode_bvid("BV1mH4y1u7UA"), 1_054_803_170);
        assert_eq!(decode_bvid("BV17x411w7KC"), 170_001);
    }

    #[test]
    fn encodes_known_ids() {
        assert_eq!(encode_avid(1_054_803_170), "BV1mH4y1u7UA");
        assert_eq!(encode_avid(170_001), "BV17x411w7KC");
        assert_eq!(encode_avid(1), "BV1xx411c7mQ");
    }

    #[test]
    fn round_trips_edge_values() {
        for aid in [1, 2, 99, 170_001, 1_054_803_170, MASK_CODE] {
            assert_eq!(decode_bvid(&encode_avid(aid)), aid, "aid {aid}");
        }
    }

    #[test]
    fn encoded_ids_decode_and_re_encode_unchanged() {
        let low = (1..=2_000_000_u64).step_by(9_973);
        let high = (1_000_000_000..=MASK_CODE).step_by(37_778_931_862_957);
        for aid in low.chain(high) {
            let bvid = encode_avid(aid);
            assert_eq!(bvid.len(), BVID_LEN, "aid {aid}");
            assert!(bvid.starts_with("BV1"), "aid {aid} gave {bvid}");
            assert_eq!(decode_bvid(&bvid), aid, "aid {aid}");
            assert_eq!(encode_avid(decode_bvid(&bvid)), bvid, "bvid {bvid}");
        }
    }

    #[test]
    fn malformed_input_decodes_to_zero() {
        assert_eq!(decode_bvid(""), 0);
        assert_eq!(decode_bvid("BV1mH4y1u7U"), 0);
        assert_eq!(decode_bvid("AV1mH4y1u7UA"), 0);
        // '0', 'I', 'O' and 'l' are not in the alphabet.
        assert_eq!(decode_bvid("BV1mH4y1u70A"), 0);
        assert_eq!(decode_bvid("BV1lH4y1u7UA"), 0);
    }

    #[test]
    fn non_ascii_input_decodes_to_zero() {
        assert_eq!(decode_bvid("BV1视频号码错"), 0);
    }
}
