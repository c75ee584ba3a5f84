//! Identifier encoding helpers.

const ALPHABET: &[u8; 58] = b"123456789ABCDEFGHJKLMNPQRSTUVWXYZabcdefghijkmnopqrstuvwxyz";

/// Encode an integer in base58 (bitcoin alphabet). Zero encodes as "1".
pub fn base58_encode_u64(mut n: u64) -> String {
    if n == 0 {
        return (ALPHABET[0] as char).to_string();
    }
    let mut out = Vec::with_capacity(11);
    while n > 0 {
        out.push(ALPHABET[(n % 58) as usize]);
        n /= 58;
    }
    out.reverse();
    String::from_utf8_lossy(&out).into_owned()
}

/// Build a prefixed id such as `F3yQ` from a durable sequence number.
pub fn prefixed_id(prefix: &str, seq: u64) -> String {
    format!("{}{}", prefix, base58_encode_u64(seq))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base58_small_values() {
        assert_eq!(base58_encode_u64(0), "1");
        assert_eq!(base58_encode_u64(57), "z");
        assert_eq!(base58_encode_u64(58), "21");
    }

    #[test]
    fn test_base58_is_injective_on_sequence() {
        let ids: std::collections::HashSet<_> = (0..5000).map(base58_encode_u64).collect();
        assert_eq!(ids.len(), 5000);
    }

    #[test]
    fn test_prefixed_id() {
        assert_eq!(prefixed_id("F", 58), "F21");
    }
}
