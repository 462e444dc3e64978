//! AdmissionReview envelope codec.
//!
//! Only the fields the webhook reads or writes are modelled. The request
//! side accepts the embedded object inline (as the API server sends it) or
//! wrapped in a `raw` field.

use std::collections::BTreeMap;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use json_patch::{Patch, PatchOperation};
use k8s_openapi::api::core::v1::Pod;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::error::{Error, Result};
use super::patch::JsonPatchOperation;

/// apiVersion of the admission review envelope
pub const ADMISSION_API_VERSION: &str = "admission.k8s.io/v1";
/// kind of the admission review envelope
pub const ADMISSION_KIND: &str = "AdmissionReview";
/// Patch type announced in every response
pub const PATCH_TYPE_JSON_PATCH: &str = "JSONPatch";
/// Result status attached to every allowed response
pub const STATUS_SUCCESS: &str = "Success";

/// The subset of a Pod needed to build the annotation patch
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PodSpecView {
    /// Assigned name, empty until the API server picks one
    pub name: String,
    /// Prefix the API server completes when `name` is empty
    pub generate_name: String,
    pub annotations: BTreeMap<String, String>,
}

impl PodSpecView {
    /// Annotation value, or an empty string when absent
    pub fn annotation(&self, key: &str) -> &str {
        self.annotations.get(key).map(String::as_str).unwrap_or("")
    }
}

impl From<Pod> for PodSpecView {
    fn from(pod: Pod) -> Self {
        let meta = pod.metadata;
        Self {
            name: meta.name.unwrap_or_default(),
            generate_name: meta.generate_name.unwrap_or_default(),
            annotations: meta.annotations.unwrap_or_default(),
        }
    }
}

/// A decoded admission request
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AdmissionRequestEnvelope {
    /// Correlation token, echoed back untouched
    pub uid: String,
    pub pod: PodSpecView,
}

/// Outcome of decoding a request body
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Decoded {
    Request(AdmissionRequestEnvelope),
    /// The envelope had no `request`; the caller answers with an empty body
    NoRequestPresent,
}

#[derive(Deserialize)]
struct ReviewWire {
    #[serde(default)]
    request: Option<RequestWire>,
}

#[derive(Deserialize)]
struct RequestWire {
    #[serde(default)]
    uid: String,
    #[serde(default)]
    object: Option<Value>,
}

/// Decode an admission review request body.
pub fn decode(body: &[u8]) -> Result<Decoded> {
    let review: ReviewWire = serde_json::from_slice(body).map_err(Error::EnvelopeDecode)?;

    let Some(request) = review.request else {
        return Ok(Decoded::NoRequestPresent);
    };

    let object = request
        .object
        .ok_or_else(|| Error::PodDecode("request carries no object".to_string()))?;
    let pod = decode_pod(object)?;

    Ok(Decoded::Request(AdmissionRequestEnvelope {
        uid: request.uid,
        pod: PodSpecView::from(pod),
    }))
}

/// Decode the embedded object, unwrapping a `{"raw": ...}` wrapper if present.
fn decode_pod(object: Value) -> Result<Pod> {
    let inner = match object {
        Value::Object(mut map) if map.len() == 1 && map.contains_key("raw") => {
            map.remove("raw").unwrap_or(Value::Null)
        }
        other => other,
    };

    let pod = match inner {
        Value::String(raw) => serde_json::from_str::<Pod>(&raw),
        Value::Object(map) => serde_json::from_value::<Pod>(Value::Object(map)),
        other => {
            return Err(Error::PodDecode(format!(
                "expected a Pod object, found {}",
                json_type_name(&other)
            )));
        }
    };
    pod.map_err(|e| Error::PodDecode(e.to_string()))
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Status block of the response
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseStatus {
    pub status: String,
}

/// The `response` field of an admission review
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdmissionResponseEnvelope {
    pub uid: String,
    pub allowed: bool,
    pub patch_type: String,
    /// Serialized JSON Patch document, base64 on the wire
    #[serde(with = "base64_bytes")]
    pub patch: Vec<u8>,
    pub status: ResponseStatus,
}

/// Full admission review carrying a response
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdmissionReviewResponse {
    pub api_version: String,
    pub kind: String,
    pub response: AdmissionResponseEnvelope,
}

impl AdmissionReviewResponse {
    /// Build a review response around already-serialized patch bytes
    pub fn new(uid: &str, allowed: bool, patch: Vec<u8>) -> Self {
        Self {
            api_version: ADMISSION_API_VERSION.to_string(),
            kind: ADMISSION_KIND.to_string(),
            response: AdmissionResponseEnvelope {
                uid: uid.to_string(),
                allowed,
                patch_type: PATCH_TYPE_JSON_PATCH.to_string(),
                patch,
                status: ResponseStatus {
                    status: STATUS_SUCCESS.to_string(),
                },
            },
        }
    }
}

/// Encode an admission review response.
///
/// The operations are serialized as a JSON Patch document first and embedded
/// as an opaque blob.
pub fn encode(uid: &str, allowed: bool, operations: &[JsonPatchOperation]) -> Result<Vec<u8>> {
    let patch = Patch(
        operations
            .iter()
            .cloned()
            .map(PatchOperation::from)
            .collect(),
    );
    let patch = serde_json::to_vec(&patch).map_err(Error::EnvelopeEncode)?;
    let review = AdmissionReviewResponse::new(uid, allowed, patch);
    serde_json::to_vec(&review).map_err(Error::EnvelopeEncode)
}

mod base64_bytes {
    use super::{Engine, STANDARD};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD
            .decode(encoded.as_bytes())
            .map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing,
    clippy::panic
)]
mod tests {
    use super::*;
    use crate::webhooks::patch::{PatchValue, annotations_pointer};
    use serde_json::json;

    fn expect_request(decoded: Decoded) -> AdmissionRequestEnvelope {
        match decoded {
            Decoded::Request(req) => req,
            Decoded::NoRequestPresent => panic!("expected a request"),
        }
    }

    #[test]
    fn test_decode_inline_pod() {
        let body = json!({
            "apiVersion": ADMISSION_API_VERSION,
            "kind": ADMISSION_KIND,
            "request": {
                "uid": "705ab4f5-6393-11e8-b7cc-42010a800002",
                "object": {
                    "apiVersion": "v1",
                    "kind": "Pod",
                    "metadata": {
                        "name": "trino-worker-7",
                        "annotations": {"dd.replace/prefix": "ad.datadoghq.com"}
                    }
                }
            }
        });

        let req = expect_request(decode(body.to_string().as_bytes()).unwrap());
        assert_eq!(req.uid, "705ab4f5-6393-11e8-b7cc-42010a800002");
        assert_eq!(req.pod.name, "trino-worker-7");
        assert_eq!(req.pod.annotation("dd.replace/prefix"), "ad.datadoghq.com");
    }

    #[test]
    fn test_decode_raw_wrapped_pod() {
        let body = json!({
            "request": {
                "uid": "abc",
                "object": {"raw": {"metadata": {"generateName": "trino-worker-"}}}
            }
        });

        let req = expect_request(decode(body.to_string().as_bytes()).unwrap());
        assert_eq!(req.pod.name, "");
        assert_eq!(req.pod.generate_name, "trino-worker-");
    }

    #[test]
    fn test_decode_raw_string_pod() {
        let body = json!({
            "request": {
                "uid": "abc",
                "object": {"raw": "{\"metadata\":{\"name\":\"p\"}}"}
            }
        });

        let req = expect_request(decode(body.to_string().as_bytes()).unwrap());
        assert_eq!(req.pod.name, "p");
    }

    #[test]
    fn test_decode_missing_uid_is_empty() {
        let body = br#"{"request": {"object": {"metadata": {"name": "p"}}}}"#;
        let req = expect_request(decode(body).unwrap());
        assert_eq!(req.uid, "");
    }

    #[test]
    fn test_decode_no_request() {
        assert_eq!(decode(b"{}").unwrap(), Decoded::NoRequestPresent);
        assert_eq!(
            decode(br#"{"request": null}"#).unwrap(),
            Decoded::NoRequestPresent
        );
    }

    #[test]
    fn test_decode_not_json() {
        let err = decode(b"not json").unwrap_err();
        assert!(matches!(err, Error::EnvelopeDecode(_)));
    }

    #[test]
    fn test_decode_wrong_shape() {
        let err = decode(b"[1, 2, 3]").unwrap_err();
        assert!(matches!(err, Error::EnvelopeDecode(_)));
    }

    #[test]
    fn test_decode_raw_not_json_is_pod_error() {
        let err = decode(br#"{"request": {"object": {"raw": "not-json"}}}"#).unwrap_err();
        assert!(matches!(err, Error::PodDecode(_)));
    }

    #[test]
    fn test_decode_missing_object_is_pod_error() {
        let err = decode(br#"{"request": {"uid": "x"}}"#).unwrap_err();
        assert!(matches!(err, Error::PodDecode(_)));
    }

    #[test]
    fn test_decode_non_object_pod_is_pod_error() {
        let err = decode(br#"{"request": {"uid": "x", "object": 42}}"#).unwrap_err();
        assert!(matches!(err, Error::PodDecode(_)));
        assert!(err.to_string().contains("number"));
    }

    #[test]
    fn test_encode_response_shape() {
        let mut map = BTreeMap::new();
        map.insert("k".to_string(), "v".to_string());
        let ops = vec![JsonPatchOperation::add(annotations_pointer(), PatchValue::Map(map))];

        let bytes = encode("uid-1", true, &ops).unwrap();
        let value: Value = serde_json::from_slice(&bytes).unwrap();

        assert_eq!(value["apiVersion"], ADMISSION_API_VERSION);
        assert_eq!(value["kind"], ADMISSION_KIND);
        assert_eq!(value["response"]["uid"], "uid-1");
        assert_eq!(value["response"]["allowed"], true);
        assert_eq!(value["response"]["patchType"], PATCH_TYPE_JSON_PATCH);
        assert_eq!(value["response"]["status"]["status"], STATUS_SUCCESS);

        let encoded = value["response"]["patch"].as_str().unwrap();
        let patch: Value = serde_json::from_slice(&STANDARD.decode(encoded).unwrap()).unwrap();
        assert_eq!(
            patch,
            json!([{"op": "add", "path": "/metadata/annotations", "value": {"k": "v"}}])
        );
    }

    #[test]
    fn test_encoded_patch_is_json_patch_document() {
        let mut map = BTreeMap::new();
        map.insert("k".to_string(), "v".to_string());
        let ops = vec![JsonPatchOperation::add(annotations_pointer(), PatchValue::Map(map))];

        let bytes = encode("uid-1", true, &ops).unwrap();
        let review: AdmissionReviewResponse = serde_json::from_slice(&bytes).unwrap();
        let patch: Patch = serde_json::from_slice(&review.response.patch).unwrap();

        assert_eq!(patch.0.len(), 1);
        match &patch.0[0] {
            PatchOperation::Add(add) => {
                assert_eq!(add.path, annotations_pointer());
                assert_eq!(add.value, json!({"k": "v"}));
            }
            other => panic!("expected an add operation, got {other:?}"),
        }
    }

    #[test]
    fn test_encode_is_deterministic() {
        let mut map = BTreeMap::new();
        map.insert("b".to_string(), "2".to_string());
        map.insert("a".to_string(), "1".to_string());
        let ops = vec![JsonPatchOperation::add(annotations_pointer(), PatchValue::Map(map))];

        assert_eq!(
            encode("same", true, &ops).unwrap(),
            encode("same", true, &ops).unwrap()
        );
    }
}
