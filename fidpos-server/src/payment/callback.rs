//! Defensive decoding of the provider callback payload
//!
//! The callback crosses the trust boundary, so it is parsed into a tagged
//! result instead of trusting nested field access. A nominally successful
//! payload with missing settlement metadata decodes to `Failure` rather
//! than faulting the handler.
//!
//! Expected shape:
//!
//! ```json
//! { "Body": { "stkCallback": {
//!     "MerchantRequestID": "...", "CheckoutRequestID": "ws_CO_...",
//!     "ResultCode": 0, "ResultDesc": "...",
//!     "CallbackMetadata": { "Item": [
//!         { "Name": "Amount", "Value": 100.0 },
//!         { "Name": "MpesaReceiptNumber", "Value": "NLJ7RT61SV" },
//!         { "Name": "PhoneNumber", "Value": 254708374149 }
//!     ] } } } }
//! ```

use hmac::{Hmac, Mac};
use serde_json::Value;
use sha2::Sha256;

/// Decoded callback event
#[derive(Debug, Clone, PartialEq)]
pub enum StkCallback {
    /// Payment completed; settlement details extracted from the metadata
    Success {
        checkout_request_id: String,
        amount: f64,
        phone: String,
        receipt_number: Option<String>,
    },
    /// Provider reported a non-success result code
    Failure {
        checkout_request_id: String,
        result_code: i64,
        description: String,
    },
    /// Payload did not carry a usable callback at all
    Malformed { reason: String },
}

impl StkCallback {
    /// Decode a raw callback body
    pub fn parse(body: &[u8]) -> Self {
        let value: Value = match serde_json::from_slice(body) {
            Ok(v) => v,
            Err(e) => {
                return StkCallback::Malformed {
                    reason: format!("invalid JSON: {e}"),
                };
            }
        };

        let callback = &value["Body"]["stkCallback"];
        if callback.is_null() {
            return StkCallback::Malformed {
                reason: "missing Body.stkCallback".into(),
            };
        }

        let Some(checkout_request_id) = callback["CheckoutRequestID"].as_str() else {
            return StkCallback::Malformed {
                reason: "missing CheckoutRequestID".into(),
            };
        };
        let checkout_request_id = checkout_request_id.to_string();

        let Some(result_code) = callback["ResultCode"].as_i64() else {
            return StkCallback::Malformed {
                reason: "missing ResultCode".into(),
            };
        };

        if result_code != 0 {
            let description = callback["ResultDesc"]
                .as_str()
                .unwrap_or("payment failed")
                .to_string();
            return StkCallback::Failure {
                checkout_request_id,
                result_code,
                description,
            };
        }

        // Success code: settlement details must be present
        let items = callback["CallbackMetadata"]["Item"].as_array();
        let amount = items.and_then(|items| metadata_value(items, "Amount")?.as_f64());
        let phone = items.and_then(|items| {
            let v = metadata_value(items, "PhoneNumber")?;
            v.as_str()
                .map(String::from)
                .or_else(|| v.as_i64().map(|n| n.to_string()))
        });

        match (amount, phone) {
            (Some(amount), Some(phone)) => {
                let receipt_number = items
                    .and_then(|items| metadata_value(items, "MpesaReceiptNumber"))
                    .and_then(Value::as_str)
                    .map(String::from);
                StkCallback::Success {
                    checkout_request_id,
                    amount,
                    phone,
                    receipt_number,
                }
            }
            // Never crash on an untrusted payload: a success code without
            // settlement metadata is treated as a failed payment
            _ => StkCallback::Failure {
                checkout_request_id,
                result_code: 0,
                description: "success callback missing settlement metadata".into(),
            },
        }
    }
}

fn metadata_value<'a>(items: &'a [Value], name: &str) -> Option<&'a Value> {
    items
        .iter()
        .find(|item| item["Name"].as_str() == Some(name))
        .map(|item| &item["Value"])
}

/// Verify the shared-secret HMAC-SHA256 signature over the raw body.
///
/// The upstream provider does not sign callbacks itself; deployments front
/// the endpoint with a relay that adds this signature. Constant-time
/// comparison via `Mac::verify_slice`.
pub fn verify_signature(body: &[u8], signature_hex: &str, secret: &str) -> bool {
    let Ok(expected) = hex::decode(signature_hex.trim()) else {
        return false;
    };
    let Ok(mut mac) = Hmac::<Sha256>::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(body);
    mac.verify_slice(&expected).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn success_body(checkout_request_id: &str) -> Vec<u8> {
        serde_json::to_vec(&serde_json::json!({
            "Body": { "stkCallback": {
                "MerchantRequestID": "29115-34620561-1",
                "CheckoutRequestID": checkout_request_id,
                "ResultCode": 0,
                "ResultDesc": "The service request is processed successfully.",
                "CallbackMetadata": { "Item": [
                    { "Name": "Amount", "Value": 1360.0 },
                    { "Name": "MpesaReceiptNumber", "Value": "NLJ7RT61SV" },
                    { "Name": "PhoneNumber", "Value": 254708374149u64 }
                ] }
            } }
        }))
        .unwrap()
    }

    #[test]
    fn parses_success_with_numeric_phone() {
        let parsed = StkCallback::parse(&success_body("ws_CO_1"));
        assert_eq!(
            parsed,
            StkCallback::Success {
                checkout_request_id: "ws_CO_1".into(),
                amount: 1360.0,
                phone: "254708374149".into(),
                receipt_number: Some("NLJ7RT61SV".into()),
            }
        );
    }

    #[test]
    fn parses_failure_code() {
        let body = serde_json::to_vec(&serde_json::json!({
            "Body": { "stkCallback": {
                "CheckoutRequestID": "ws_CO_2",
                "ResultCode": 1032,
                "ResultDesc": "Request cancelled by user"
            } }
        }))
        .unwrap();
        assert_eq!(
            StkCallback::parse(&body),
            StkCallback::Failure {
                checkout_request_id: "ws_CO_2".into(),
                result_code: 1032,
                description: "Request cancelled by user".into(),
            }
        );
    }

    #[test]
    fn success_without_metadata_becomes_failure() {
        let body = serde_json::to_vec(&serde_json::json!({
            "Body": { "stkCallback": {
                "CheckoutRequestID": "ws_CO_3",
                "ResultCode": 0,
                "ResultDesc": "ok"
            } }
        }))
        .unwrap();
        match StkCallback::parse(&body) {
            StkCallback::Failure {
                checkout_request_id,
                result_code,
                ..
            } => {
                assert_eq!(checkout_request_id, "ws_CO_3");
                assert_eq!(result_code, 0);
            }
            other => panic!("expected Failure, got {other:?}"),
        }
    }

    #[test]
    fn garbage_is_malformed_not_a_panic() {
        assert!(matches!(
            StkCallback::parse(b"not json at all"),
            StkCallback::Malformed { .. }
        ));
        assert!(matches!(
            StkCallback::parse(b"{\"Body\":{}}"),
            StkCallback::Malformed { .. }
        ));
        assert!(matches!(
            StkCallback::parse(br#"{"Body":{"stkCallback":{"ResultCode":0}}}"#),
            StkCallback::Malformed { .. }
        ));
    }

    #[test]
    fn signature_verification() {
        use hmac::{Hmac, Mac};
        let body = b"{\"ping\":true}";
        let mut mac = Hmac::<Sha256>::new_from_slice(b"topsecret").unwrap();
        mac.update(body);
        let sig = hex::encode(mac.finalize().into_bytes());

        assert!(verify_signature(body, &sig, "topsecret"));
        assert!(!verify_signature(body, &sig, "wrong"));
        assert!(!verify_signature(body, "zz-not-hex", "topsecret"));
    }
}
