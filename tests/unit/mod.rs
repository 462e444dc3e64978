// Test code is allowed to panic on failure
#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing,
    clippy::panic,
    clippy::string_slice
)]

//! Unit tests for mutation-hook-service.
//!
//! These tests run without a Kubernetes cluster or a listener and exercise
//! the mutation pipeline through the public API.

#[path = "../common/mod.rs"]
mod common;

mod pipeline_tests {
    use super::common::fixtures::{
        PodBuilder, patched_annotations, response_json, response_patch, review_body, trino_worker,
    };
    use mutation_hook_service::webhooks::patch::INIT_CONFIGS_PLACEHOLDER;
    use mutation_hook_service::webhooks::{Error, NoopObserver, mutate};
    use serde_json::json;

    #[test]
    fn test_end_to_end_named_pod() {
        let pod = PodBuilder::named("trino-worker-7")
            .prefix("ad.datadoghq.com")
            .check_names("[\"x\"]")
            .instances("trino-worker-\"]")
            .build();

        let out = mutate(&review_body("uid-1", &pod), &NoopObserver).unwrap();
        let annotations = patched_annotations(&out);

        assert_eq!(annotations.len(), 3);
        assert_eq!(
            annotations["ad.datadoghq.com/trino-worker-7.check_names"],
            "[\"x\"]"
        );
        assert_eq!(
            annotations["ad.datadoghq.com/trino-worker-7.init_configs"],
            INIT_CONFIGS_PLACEHOLDER
        );
        assert_eq!(
            annotations["ad.datadoghq.com/trino-worker-7.instances"],
            "trino-worker-7\"]"
        );
    }

    #[test]
    fn test_single_add_operation_on_annotations() {
        let out = mutate(&review_body("u", &trino_worker("trino-worker-1")), &NoopObserver)
            .unwrap();
        let patch = response_patch(&out);

        let ops = patch.as_array().unwrap();
        assert_eq!(ops.len(), 1);
        assert_eq!(ops[0]["op"], "add");
        assert_eq!(ops[0]["path"], "/metadata/annotations");
    }

    #[test]
    fn test_response_envelope_fields() {
        let out = mutate(&review_body("abc-123", &trino_worker("w")), &NoopObserver).unwrap();
        let review = response_json(&out);

        assert_eq!(review["apiVersion"], "admission.k8s.io/v1");
        assert_eq!(review["kind"], "AdmissionReview");
        assert_eq!(review["response"]["uid"], "abc-123");
        assert_eq!(review["response"]["allowed"], true);
        assert_eq!(review["response"]["patchType"], "JSONPatch");
    }

    #[test]
    fn test_uid_echo_edge_values() {
        for uid in ["", "705ab4f5-6393-11e8-b7cc-42010a800002", "ünïcødé/+=?"] {
            let out = mutate(&review_body(uid, &trino_worker("w")), &NoopObserver).unwrap();
            assert_eq!(response_json(&out)["response"]["uid"], json!(uid));
        }
    }

    #[test]
    fn test_generate_name_gets_timestamp_suffix() {
        let pod = PodBuilder::generated("g").prefix("p").build();
        let out = mutate(&review_body("u", &pod), &NoopObserver).unwrap();

        let key = patched_annotations(&out)
            .into_keys()
            .find(|k| k.ends_with(".check_names"))
            .unwrap();
        let identifier = key
            .strip_prefix("p/")
            .and_then(|k| k.strip_suffix(".check_names"))
            .unwrap();

        let suffix = identifier.strip_prefix("g-").unwrap();
        assert!(!suffix.is_empty());
        assert!(suffix.chars().all(|c| c.is_ascii_digit() || c == '-'));
    }

    #[test]
    fn test_missing_annotations_degrade() {
        let pod = PodBuilder::named("bare").build();
        let out = mutate(&review_body("u", &pod), &NoopObserver).unwrap();
        let annotations = patched_annotations(&out);

        assert_eq!(annotations["/bare.check_names"], "");
        assert_eq!(annotations["/bare.instances"], "");
        assert_eq!(annotations["/bare.init_configs"], INIT_CONFIGS_PLACEHOLDER);
    }

    #[test]
    fn test_encoding_is_repeatable() {
        let body = review_body("same", &trino_worker("trino-worker-3"));
        let first = mutate(&body, &NoopObserver).unwrap();
        let second = mutate(&body, &NoopObserver).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_pod_decode_failure() {
        let err = mutate(
            br#"{"request": {"object": {"raw": "not-json"}}}"#,
            &NoopObserver,
        )
        .unwrap_err();
        assert!(matches!(err, Error::PodDecode(_)));
    }

    #[test]
    fn test_envelope_decode_failure() {
        let err = mutate(b"\x00\x01", &NoopObserver).unwrap_err();
        assert!(matches!(err, Error::EnvelopeDecode(_)));
    }

    #[test]
    fn test_no_request_is_empty_success() {
        assert!(mutate(b"{}", &NoopObserver).unwrap().is_empty());
    }
}

mod patch_application_tests {
    use super::common::fixtures::{response_patch, review_body, trino_worker};
    use mutation_hook_service::webhooks::{NoopObserver, mutate};
    use serde_json::json;

    #[test]
    fn test_patch_applies_to_pod() {
        let pod = trino_worker("trino-worker-9");
        let out = mutate(&review_body("u", &pod), &NoopObserver).unwrap();

        let patch: json_patch::Patch = serde_json::from_value(response_patch(&out)).unwrap();
        let mut doc = serde_json::to_value(&pod).unwrap();
        json_patch::patch(&mut doc, &patch).unwrap();

        assert_eq!(
            doc["metadata"]["annotations"],
            json!({
                "ad.datadoghq.com/trino-worker-9.check_names": "[\"trino\"]",
                "ad.datadoghq.com/trino-worker-9.init_configs": "[{}]",
                "ad.datadoghq.com/trino-worker-9.instances":
                    "[{\"jmx_url\": \"service:jmx:rmi:///jndi/rmi://trino-worker-9:9080/jmxrmi\"}]"
            })
        );
        assert_eq!(doc["metadata"]["name"], "trino-worker-9");
    }
}

mod config_tests {
    use mutation_hook_service::config::{ENV_VERBOSE, ENV_WEBHOOK_PORT};
    use mutation_hook_service::{ConfigError, WebhookConfig};

    #[test]
    fn test_lookup_overrides() {
        let config = WebhookConfig::from_lookup(|var| match var {
            v if v == ENV_WEBHOOK_PORT => Some("9443".to_string()),
            v if v == ENV_VERBOSE => Some("off".to_string()),
            _ => None,
        })
        .unwrap();

        assert_eq!(config.webhook_port, 9443);
        assert!(!config.verbose);
    }

    #[test]
    fn test_lookup_rejects_bad_port() {
        let err = WebhookConfig::from_lookup(|var| {
            (var == ENV_WEBHOOK_PORT).then(|| "https".to_string())
        })
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { var, .. } if var == ENV_WEBHOOK_PORT));
    }
}
