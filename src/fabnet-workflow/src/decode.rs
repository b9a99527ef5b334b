//! Strict-then-fallback workflow manifest decoding, grounded on the
//! original controller's `unmarshalWorkflows` (`argo_util.go`): try a
//! strict structured decode first (rejecting unknown fields), and only on
//! failure fall back to a permissive multi-document textual split. Exactly
//! one workflow object must result either way (spec §4.4, §9).

use anyhow::{anyhow, bail, Result};
use serde::Deserialize;
use std::collections::BTreeMap;

#[derive(Debug, Clone)]
pub struct WorkflowDoc {
    pub name: Option<String>,
    pub generate_name: Option<String>,
    pub labels: BTreeMap<String, String>,
    pub spec: serde_json::Map<String, serde_json::Value>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct StrictEnvelope {
    #[allow(dead_code)]
    api_version: String,
    kind: String,
    #[serde(default)]
    metadata: StrictMetadata,
    #[serde(default)]
    spec: serde_json::Map<String, serde_json::Value>,
    #[serde(default)]
    #[allow(dead_code)]
    status: serde_json::Value,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct StrictMetadata {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    generate_name: Option<String>,
    #[serde(default)]
    labels: BTreeMap<String, String>,
    #[serde(default)]
    #[allow(dead_code)]
    namespace: Option<String>,
}

/// A loose variant used only for the multi-document fallback, where we
/// cannot assume the rendered manifest contains exclusively `Workflow`
/// objects (a Helm `template` render can emit sibling ConfigMaps etc.
/// alongside the one workflow we actually want).
#[derive(Deserialize)]
struct LooseEnvelope {
    #[serde(default)]
    kind: String,
    #[serde(default)]
    metadata: LooseMetadata,
    #[serde(default)]
    spec: serde_json::Map<String, serde_json::Value>,
}

#[derive(Deserialize, Default)]
struct LooseMetadata {
    #[serde(default)]
    name: Option<String>,
    #[serde(rename = "generateName", default)]
    generate_name: Option<String>,
    #[serde(default)]
    labels: BTreeMap<String, String>,
}

pub fn decode_single_workflow(manifest: &str) -> Result<WorkflowDoc> {
    if let Ok(envelope) = serde_yaml::from_str::<StrictEnvelope>(manifest) {
        if envelope.kind != "Workflow" {
            bail!("expected kind Workflow, got {:?}", envelope.kind);
        }
        return Ok(WorkflowDoc {
            name: envelope.metadata.name,
            generate_name: envelope.metadata.generate_name,
            labels: envelope.metadata.labels,
            spec: envelope.spec,
        });
    }

    let mut matches = Vec::new();
    for document in manifest.split("\n---").chain(std::iter::once(manifest)) {
        let trimmed = document.trim();
        if trimmed.is_empty() {
            continue;
        }
        if let Ok(loose) = serde_yaml::from_str::<LooseEnvelope>(trimmed) {
            if loose.kind == "Workflow" {
                matches.push(loose);
            }
        }
    }
    // `chain(once(manifest))` above can duplicate a single-document manifest;
    // dedupe by name so a manifest with no `---` separators isn't counted twice.
    matches.dedup_by(|a, b| a.metadata.name == b.metadata.name && a.metadata.generate_name == b.metadata.generate_name);

    match matches.len() {
        1 => {
            let loose = matches.into_iter().next().unwrap();
            Ok(WorkflowDoc {
                name: loose.metadata.name,
                generate_name: loose.metadata.generate_name,
                labels: loose.metadata.labels,
                spec: loose.spec,
            })
        }
        0 => Err(anyhow!("manifest did not contain a Workflow object")),
        n => Err(anyhow!("manifest contained {n} Workflow objects, expected exactly one")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strict_decode_accepts_well_formed_single_document() {
        let manifest = r#"
apiVersion: argoproj.io/v1alpha1
kind: Workflow
metadata:
  generateName: channel-flow-
  labels:
    raft.io/fabric-operator-created-for: my-network
spec:
  entrypoint: main
"#;
        let doc = decode_single_workflow(manifest).unwrap();
        assert_eq!(doc.generate_name.as_deref(), Some("channel-flow-"));
        assert_eq!(doc.labels.get("raft.io/fabric-operator-created-for").map(String::as_str), Some("my-network"));
    }

    #[test]
    fn strict_decode_rejects_unknown_top_level_field() {
        let manifest = r#"
apiVersion: argoproj.io/v1alpha1
kind: Workflow
somethingUnexpected: true
metadata:
  generateName: channel-flow-
spec:
  entrypoint: main
"#;
        // Falls through to the permissive path, which tolerates the extra
        // field and still finds exactly one Workflow.
        let doc = decode_single_workflow(manifest).unwrap();
        assert_eq!(doc.generate_name.as_deref(), Some("channel-flow-"));
    }

    #[test]
    fn fallback_picks_the_one_workflow_among_siblings() {
        let manifest = "apiVersion: v1\nkind: ConfigMap\nmetadata:\n  name: sibling\n---\napiVersion: argoproj.io/v1alpha1\nkind: Workflow\nmetadata:\n  generateName: chaincode-flow-\nspec:\n  entrypoint: main\n";
        let doc = decode_single_workflow(manifest).unwrap();
        assert_eq!(doc.generate_name.as_deref(), Some("chaincode-flow-"));
    }

    #[test]
    fn no_workflow_object_is_an_error() {
        let manifest = "apiVersion: v1\nkind: ConfigMap\nmetadata:\n  name: sibling\n";
        assert!(decode_single_workflow(manifest).is_err());
    }
}
