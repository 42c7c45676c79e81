//! Small decoding helpers shared by the parsers.

/// Decode a UTF-16LE string from raw bytes, stopping at first null or end.
pub fn read_utf16le_string(data: &[u8]) -> String {
    let chars: Vec<u16> = data
        .chunks_exact(2)
        .map(|c| u16::from_le_bytes([c[0], c[1]]))
        .take_while(|&c| c != 0)
        .collect();
    String::from_utf16_lossy(&chars)
}

/// Decode a REG_MULTI_SZ payload: null-separated UTF-16LE strings ending
/// with an empty string.
pub fn read_utf16le_multi(data: &[u8]) -> Vec<String> {
    let chars: Vec<u16> = data
        .chunks_exact(2)
        .map(|c| u16::from_le_bytes([c[0], c[1]]))
        .collect();
    chars
        .split(|&c| c == 0)
        .take_while(|s| !s.is_empty())
        .map(String::from_utf16_lossy)
        .collect()
}

/// Encode a string as UTF-16LE without a terminator.
pub fn encode_utf16le(s: &str) -> Vec<u8> {
    s.encode_utf16().flat_map(|c| c.to_le_bytes()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_utf16le_decode() {
        // "SAM" in UTF-16LE
        let data = [b'S', 0, b'A', 0, b'M', 0, 0, 0];
        assert_eq!(read_utf16le_string(&data), "SAM");
    }

    #[test]
    fn test_utf16le_decode_no_null() {
        let data = [b'H', 0, b'i', 0];
        assert_eq!(read_utf16le_string(&data), "Hi");
    }

    #[test]
    fn test_multi_sz_decode() {
        let mut data = encode_utf16le("one");
        data.extend_from_slice(&[0, 0]);
        data.extend(encode_utf16le("two"));
        data.extend_from_slice(&[0, 0, 0, 0]);
        assert_eq!(read_utf16le_multi(&data), vec!["one", "two"]);
    }

    #[test]
    fn test_multi_sz_empty() {
        assert!(read_utf16le_multi(&[0, 0]).is_empty());
        assert!(read_utf16le_multi(&[]).is_empty());
    }
}
