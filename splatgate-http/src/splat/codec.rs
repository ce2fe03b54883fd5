use base64::prelude::*;
use base64::DecodeError;
use std::borrow::Cow;

/// Decode the base64 image sent by clients.
///
/// Browsers often send `data:<mime>;base64,<payload>` URLs and line-wrapped payloads, both are
/// accepted. The payload itself must use the standard alphabet with padding.
pub fn decode_image(encoded: &str) -> Result<Vec<u8>, DecodeError> {
    let payload = strip_data_url(encoded.trim());
    let payload: Cow<'_, str> = if payload.bytes().any(|b| b.is_ascii_whitespace()) {
        Cow::Owned(payload.split_ascii_whitespace().collect())
    } else {
        Cow::Borrowed(payload)
    };

    BASE64_STANDARD.decode(payload.as_bytes())
}

/// Encode engine output for the JSON response
#[inline]
pub fn encode_ply(bytes: &[u8]) -> String {
    BASE64_STANDARD.encode(bytes)
}

fn strip_data_url(encoded: &str) -> &str {
    match encoded.strip_prefix("data:") {
        Some(rest) => rest
            .split_once(";base64,")
            .map(|(_, payload)| payload)
            .unwrap_or(encoded),
        None => encoded,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_binary_payload_is_preserved() {
        let bytes = (0..=255u8).rev().collect::<Vec<_>>();
        assert_eq!(decode_image(&encode_ply(&bytes)).unwrap(), bytes);
    }

    #[test]
    fn test_data_url_and_whitespace() {
        assert_eq!(decode_image("data:image/png;base64,aGVsbG8=").unwrap(), b"hello");
        assert_eq!(decode_image("aGVs\nbG8=\n").unwrap(), b"hello");
    }

    #[test]
    fn test_invalid_payload() {
        assert!(decode_image("not base64!").is_err());
        assert!(decode_image("aGVsbG8").is_err());
    }

    #[test]
    fn test_empty_payload_decodes_to_nothing() {
        assert!(decode_image("").unwrap().is_empty());
    }
}
