//! JSON Patch construction for Datadog autodiscovery annotations.
//!
//! A Pod carries a shared template in its `dd.replace/*` annotations. The
//! builder turns that template into per-Pod annotations keyed by the Pod's
//! identity:
//! - `<prefix>/<identifier>.check_names`
//! - `<prefix>/<identifier>.init_configs`
//! - `<prefix>/<identifier>.instances`
//!
//! All three keys travel in a single `add` operation on
//! `/metadata/annotations`, so the API server applies them together.

use std::collections::BTreeMap;

use jiff::Timestamp;
use jiff::tz::TimeZone;
use json_patch::jsonptr::PointerBuf;
use json_patch::{AddOperation, PatchOperation};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::envelope::PodSpecView;

/// JSON pointer to the Pod's annotation map
pub const ANNOTATIONS_PATH: &str = "/metadata/annotations";

/// Annotation holding the namespace root of the derived keys
pub const PREFIX_ANNOTATION: &str = "dd.replace/prefix";
/// Annotation holding the `check_names` template
pub const CHECK_NAMES_ANNOTATION: &str = "dd.replace/check_names";
/// Annotation holding the `instances` template
pub const INSTANCES_ANNOTATION: &str = "dd.replace/instances";

/// Literal in the instances template that is replaced by the identifier
pub const INSTANCE_MARKER: &str = "trino-worker-";

/// Value written to `<root>.init_configs`: a list with one empty config
pub const INIT_CONFIGS_PLACEHOLDER: &str = "[{}]";

/// Separator between the generate-name and the timestamp suffix, and
/// between the timestamp's fields
pub const IDENTIFIER_DELIMITER: char = '-';

/// Pointer to `/metadata/annotations`
pub fn annotations_pointer() -> PointerBuf {
    PointerBuf::from_tokens(["metadata", "annotations"])
}

/// JSON Patch operation kind
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PatchOp {
    Add,
}

/// Value carried by a patch operation
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PatchValue {
    /// A single annotation value
    Text(String),
    /// A whole annotation map
    Map(BTreeMap<String, String>),
}

impl From<PatchValue> for Value {
    fn from(value: PatchValue) -> Self {
        match value {
            PatchValue::Text(text) => Value::String(text),
            PatchValue::Map(map) => Value::Object(
                map.into_iter()
                    .map(|(k, v)| (k, Value::String(v)))
                    .collect(),
            ),
        }
    }
}

/// One RFC 6902 patch step
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct JsonPatchOperation {
    pub op: PatchOp,
    pub path: PointerBuf,
    pub value: PatchValue,
}

impl JsonPatchOperation {
    /// Create an `add` operation
    pub fn add(path: PointerBuf, value: PatchValue) -> Self {
        Self {
            op: PatchOp::Add,
            path,
            value,
        }
    }
}

impl From<JsonPatchOperation> for PatchOperation {
    fn from(operation: JsonPatchOperation) -> Self {
        match operation.op {
            PatchOp::Add => PatchOperation::Add(AddOperation {
                path: operation.path,
                value: operation.value.into(),
            }),
        }
    }
}

/// Build the annotation patch for a Pod using the current time.
pub fn build_patch(pod: &PodSpecView) -> JsonPatchOperation {
    build_patch_at(pod, Timestamp::now())
}

/// Build the annotation patch for a Pod.
///
/// `now` is only consulted when the Pod has no name yet. Missing `dd.replace/*`
/// annotations produce empty values rather than an error.
pub fn build_patch_at(pod: &PodSpecView, now: Timestamp) -> JsonPatchOperation {
    let identifier = target_identifier(pod, now);

    let prefix = pod.annotation(PREFIX_ANNOTATION);
    let check_names = pod.annotation(CHECK_NAMES_ANNOTATION);
    let instances = pod.annotation(INSTANCES_ANNOTATION);

    let root = format!("{}/{}", prefix, identifier);

    let mut annotations = BTreeMap::new();
    annotations.insert(format!("{}.check_names", root), check_names.to_string());
    annotations.insert(
        format!("{}.init_configs", root),
        INIT_CONFIGS_PLACEHOLDER.to_string(),
    );
    annotations.insert(
        format!("{}.instances", root),
        instances.replace(INSTANCE_MARKER, &identifier),
    );

    JsonPatchOperation::add(annotations_pointer(), PatchValue::Map(annotations))
}

/// Identity the derived annotations are keyed by.
///
/// The Pod name when set. Otherwise the generate-name joined to a timestamp
/// suffix, since the API server has not picked the final name yet.
pub fn target_identifier(pod: &PodSpecView, now: Timestamp) -> String {
    if !pod.name.is_empty() {
        return pod.name.clone();
    }

    let base = pod.generate_name.trim_end_matches(IDENTIFIER_DELIMITER);
    let suffix = timestamp_suffix(now);
    if base.is_empty() {
        suffix
    } else {
        format!("{}{}{}", base, IDENTIFIER_DELIMITER, suffix)
    }
}

/// Render a timestamp as UTC `YYYY-MM-DD-hh-mm-ss-nnnnnnnnn`.
///
/// Fixed width, so lexical order matches time order. Only digits and the
/// delimiter appear, so the result never needs JSON pointer escaping.
pub fn timestamp_suffix(now: Timestamp) -> String {
    let t = now.to_zoned(TimeZone::UTC);
    let d = IDENTIFIER_DELIMITER;
    format!(
        "{:04}{d}{:02}{d}{:02}{d}{:02}{d}{:02}{d}{:02}{d}{:09}",
        t.year(),
        t.month(),
        t.day(),
        t.hour(),
        t.minute(),
        t.second(),
        t.subsec_nanosecond(),
    )
}
