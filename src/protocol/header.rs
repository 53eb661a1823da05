//! Call header.
//!
//! Every request and every response starts with a [`Header`]:
//!
//! ```text
//! ┌────────────────┬─────────┬─────────────────────────┐
//! │ ServiceMethod  │ Seq     │ Error                   │
//! │ "Service.Meth" │ u64     │ "" on success           │
//! └────────────────┴─────────┴─────────────────────────┘
//! ```
//!
//! The encoding of the record itself is chosen by the negotiated codec.

use serde::{Deserialize, Serialize};

/// Metadata identifying one call.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Header {
    /// Method identifier, "Service.Method". Opaque to the transport.
    #[serde(rename = "ServiceMethod")]
    pub service_method: String,
    /// Caller-assigned sequence number, echoed verbatim on the response.
    #[serde(rename = "Seq")]
    pub seq: u64,
    /// Empty on success; set on a response whose call failed.
    #[serde(rename = "Error", default)]
    pub error: String,
}

impl Header {
    /// Create a request header.
    pub fn new(service_method: impl Into<String>, seq: u64) -> Self {
        Self {
            service_method: service_method.into(),
            seq,
            error: String::new(),
        }
    }

    /// Turn a request header into a failed response header.
    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = error.into();
        self
    }

    /// Whether this header reports a failed call.
    #[inline]
    pub fn is_error(&self) -> bool {
        !self.error.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_header_has_no_error() {
        let h = Header::new("Foo.Sum", 7);
        assert_eq!(h.service_method, "Foo.Sum");
        assert_eq!(h.seq, 7);
        assert!(!h.is_error());
    }

    #[test]
    fn test_with_error_keeps_seq() {
        let h = Header::new("Foo.Sum", 3).with_error("boom");
        assert_eq!(h.seq, 3);
        assert!(h.is_error());
        assert_eq!(h.error, "boom");
    }

    #[test]
    fn test_wire_field_names() {
        let json = serde_json::to_value(Header::new("Foo.Sum", 1)).unwrap();
        assert_eq!(json["ServiceMethod"], "Foo.Sum");
        assert_eq!(json["Seq"], 1);
        assert_eq!(json["Error"], "");
    }

    #[test]
    fn test_missing_error_field_defaults_to_empty() {
        let h: Header = serde_json::from_str(r#"{"ServiceMethod":"A.B","Seq":9}"#).unwrap();
        assert_eq!(h, Header::new("A.B", 9));
    }
}
