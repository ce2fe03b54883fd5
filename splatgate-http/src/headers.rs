use axum::http::{HeaderName, HeaderValue};
use headers::{Error, Header};
use std::borrow::Cow;
use std::ops::Deref;

pub static X_REQUEST_ID_NAME: HeaderName = HeaderName::from_static("x-request-id");

/// Holds the value of the x-request-id header used to
/// correlate request and execution within the server.
#[derive(Debug, Clone)]
pub struct RequestId(Cow<'static, str>);

impl Deref for RequestId {
    type Target = str;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl Header for RequestId {
    fn name() -> &'static HeaderName {
        &X_REQUEST_ID_NAME
    }

    fn decode<'i, I>(values: &mut I) -> Result<Self, Error>
    where
        Self: Sized,
        I: Iterator<Item = &'i HeaderValue>,
    {
        // Opaque bytes from clients are kept, invalid UTF-8 being replaced
        let value = values.next().ok_or_else(Error::invalid)?;
        let value = String::from_utf8_lossy(value.as_bytes());
        Ok(RequestId(Cow::Owned(value.into_owned())))
    }

    fn encode<E: Extend<HeaderValue>>(&self, values: &mut E) {
        if let Ok(value) = HeaderValue::from_str(&self.0) {
            values.extend(std::iter::once(value));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode(value: HeaderValue) -> Result<RequestId, Error> {
        RequestId::decode(&mut std::iter::once(&value))
    }

    #[test]
    fn test_decode_ascii_request_id() {
        let request_id = decode(HeaderValue::from_static("req-42")).unwrap();
        assert_eq!(&*request_id, "req-42");
    }

    #[test]
    fn test_decode_opaque_request_id() {
        let value = HeaderValue::from_bytes(b"caf\xe9-1").unwrap();
        let request_id = decode(value).unwrap();
        assert_eq!(&*request_id, "caf\u{FFFD}-1");

        let mut encoded = Vec::new();
        request_id.encode(&mut encoded);
        assert_eq!(encoded.len(), 1);
    }

    #[test]
    fn test_decode_missing_request_id() {
        assert!(RequestId::decode(&mut std::iter::empty::<&HeaderValue>()).is_err());
    }
}
