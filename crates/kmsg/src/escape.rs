// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Decoding of the escape sequences the kernel embeds in record text.
//!
//! The kernel escapes non-printable bytes as `\xHH` and a literal backslash as `\\`.
//! Anything else following a backslash means the record is corrupt: decoding stops there
//! and the prefix decoded so far is kept. A damaged line never fails the stream.

/// Decodes escapes in place and returns the length of the decoded prefix of `data`.
///
/// The write cursor never overtakes the read cursor, so no scratch buffer is needed.
pub fn decode_in_place(data: &mut [u8]) -> usize {
    let mut read = 0;
    let mut write = 0;

    while read < data.len() {
        if data[read] != b'\\' {
            data[write] = data[read];
            read += 1;
            write += 1;
            continue;
        }

        match data.get(read + 1) {
            Some(b'\\') => {
                data[write] = b'\\';
                read += 2;
                write += 1;
            }
            Some(b'x') => {
                let high = data.get(read + 2).and_then(hex_value);
                let low = data.get(read + 3).and_then(hex_value);
                let (Some(high), Some(low)) = (high, low) else {
                    return write;
                };
                data[write] = (high << 4) | low;
                read += 4;
                write += 1;
            }
            // unknown escape or a trailing backslash: corrupt input
            _ => return write,
        }
    }

    write
}

/// Decodes escapes in `data` and returns the resulting text.
///
/// Bytes that do not form valid UTF-8 after decoding are replaced with U+FFFD.
#[must_use]
pub fn decode_escapes(mut data: Vec<u8>) -> String {
    let len = decode_in_place(&mut data);
    data.truncate(len);
    match String::from_utf8(data) {
        Ok(text) => text,
        Err(e) => String::from_utf8_lossy(e.as_bytes()).into_owned(),
    }
}

fn hex_value(byte: &u8) -> Option<u8> {
    match byte {
        b'0'..=b'9' => Some(byte - b'0'),
        b'a'..=b'f' => Some(byte - b'a' + 10),
        b'A'..=b'F' => Some(byte - b'A' + 10),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn decode(input: &[u8]) -> String {
        decode_escapes(input.to_vec())
    }

    #[test]
    fn test_double_backslash_collapses() {
        assert_eq!(decode(br"a\\b"), r"a\b");
    }

    #[test]
    fn test_hex_escape() {
        assert_eq!(decode(br"a\x41b"), "aAb");
        assert_eq!(decode(br"\x6a\x4A"), "jJ");
    }

    #[test]
    fn test_unknown_escape_truncates() {
        assert_eq!(decode(br"a\qb"), "a");
    }

    #[test]
    fn test_trailing_backslash_truncates() {
        assert_eq!(decode(br"abc\"), "abc");
    }

    #[test]
    fn test_short_hex_escape_truncates() {
        assert_eq!(decode(br"abc\x4"), "abc");
        assert_eq!(decode(br"abc\x"), "abc");
    }

    #[test]
    fn test_non_hex_digits_truncate() {
        assert_eq!(decode(br"ab\xzz tail"), "ab");
    }

    #[test]
    fn test_in_place_length() {
        let mut data = br"x\\y\x20z".to_vec();
        let len = decode_in_place(&mut data);
        assert_eq!(&data[..len], b"x\\y z");
    }

    #[test]
    fn test_invalid_utf8_is_replaced() {
        assert_eq!(decode(br"a\xffb"), "a\u{fffd}b");
    }

    proptest! {
        #[test]
        fn test_text_without_backslash_is_unchanged(text in "[^\\\\]*") {
            prop_assert_eq!(decode(text.as_bytes()), text);
        }

        #[test]
        fn test_decoded_never_longer(data in proptest::collection::vec(any::<u8>(), 0..256)) {
            let mut buffer = data.clone();
            let len = decode_in_place(&mut buffer);
            prop_assert!(len <= data.len());
        }
    }
}
