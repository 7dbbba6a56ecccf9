//! Container image discovery and rewriting in rendered manifests

use std::collections::BTreeSet;

use kevi_core::relocate;
use serde_yaml::Value;

use crate::error::Result;

/// Field paths holding container lists in Pod-shaped objects
///
/// Pod templates (Deployment, DaemonSet, StatefulSet, Job) come first, then
/// bare Pods. Each path ends at a sequence of containers with an `image`.
pub const KNOWN_IMAGE_PATHS: &[&[&str]] = &[
    &["spec", "template", "spec", "initContainers"],
    &["spec", "template", "spec", "containers"],
    &["spec", "initContainers"],
    &["spec", "containers"],
];

/// Split a multi-document YAML stream on `---` separator lines
///
/// A separator may be followed by a comment. Blank documents are dropped.
pub fn split_documents(text: &str) -> Vec<&str> {
    let mut docs = Vec::new();
    let mut start = 0;
    let mut offset = 0;

    for line in text.split_inclusive('\n') {
        if is_separator(line) {
            docs.push(&text[start..offset]);
            start = offset + line.len();
        }
        offset += line.len();
    }
    docs.push(&text[start..]);

    docs.retain(|d| !d.trim().is_empty());
    docs
}

fn is_separator(line: &str) -> bool {
    match line.trim_end().strip_prefix("---") {
        Some(rest) => {
            let rest = rest.trim();
            rest.is_empty() || rest.starts_with('#')
        }
        None => false,
    }
}

/// Find every container image referenced in a rendered document stream
///
/// Best effort: malformed sub-documents are skipped, and objects without a
/// Pod shape contribute nothing. The result is sorted and deduplicated.
pub fn find_images(data: &[u8]) -> BTreeSet<String> {
    let text = String::from_utf8_lossy(data);
    let mut images = BTreeSet::new();

    for (index, doc) in split_documents(&text).into_iter().enumerate() {
        let object: Value = match serde_yaml::from_str(doc) {
            Ok(object) => object,
            Err(e) => {
                tracing::warn!(document = index, error = %e, "skipping malformed YAML document");
                continue;
            }
        };

        for path in KNOWN_IMAGE_PATHS {
            let Some(containers) = lookup(&object, path).and_then(Value::as_sequence) else {
                continue;
            };
            for container in containers {
                if let Some(image) = container.get("image").and_then(Value::as_str) {
                    let image = image.trim();
                    if !image.is_empty() {
                        images.insert(image.to_string());
                    }
                }
            }
        }
    }

    tracing::debug!(count = images.len(), "discovered images");
    images
}

/// Point every container image of one object at `registry`
///
/// Images that do not parse as references are left alone. Returns the number
/// of images rewritten.
pub fn rewrite_images(object: &mut Value, registry: &str) -> usize {
    let mut rewritten = 0;

    for path in KNOWN_IMAGE_PATHS {
        let Some(containers) = lookup_mut(object, path).and_then(Value::as_sequence_mut) else {
            continue;
        };
        for container in containers {
            let Some(image) = container.get_mut("image") else {
                continue;
            };
            let Some(original) = image.as_str().map(str::to_string) else {
                continue;
            };

            match relocate(&original, registry) {
                Ok(relocated) => {
                    *image = Value::String(relocated);
                    rewritten += 1;
                }
                Err(e) => {
                    tracing::warn!(image = %original, error = %e, "leaving unparsable image untouched");
                }
            }
        }
    }

    rewritten
}

/// Rewrite images across a whole document stream
///
/// Documents that fail to parse are passed through verbatim.
pub fn rewrite_manifest(data: &[u8], registry: &str) -> Result<Vec<u8>> {
    let text = String::from_utf8_lossy(data);
    let mut out = String::with_capacity(text.len());

    for (index, doc) in split_documents(&text).into_iter().enumerate() {
        if index > 0 {
            out.push_str("---\n");
        }
        match serde_yaml::from_str::<Value>(doc) {
            Ok(mut object) if object.is_mapping() => {
                rewrite_images(&mut object, registry);
                out.push_str(&serde_yaml::to_string(&object)?);
            }
            _ => {
                out.push_str(doc);
                if !doc.ends_with('\n') {
                    out.push('\n');
                }
            }
        }
    }

    Ok(out.into_bytes())
}

fn lookup<'a>(value: &'a Value, path: &[&str]) -> Option<&'a Value> {
    path.iter().try_fold(value, |v, key| v.get(*key))
}

fn lookup_mut<'a>(value: &'a mut Value, path: &[&str]) -> Option<&'a mut Value> {
    path.iter().try_fold(value, |v, key| v.get_mut(*key))
}

#[cfg(test)]
mod tests {
    use super::*;

    const DEPLOYMENT_AND_CONFIGMAP: &str = r#"apiVersion: apps/v1
kind: Deployment
metadata:
  name: web
spec:
  template:
    spec:
      containers:
        - name: web
          image: nginx:1.25
---
apiVersion: v1
kind: ConfigMap
metadata:
  name: settings
data:
  image: not-a-container
"#;

    #[test]
    fn test_deployment_and_configmap() {
        let images = find_images(DEPLOYMENT_AND_CONFIGMAP.as_bytes());
        assert_eq!(images, BTreeSet::from(["nginx:1.25".to_string()]));
    }

    #[test]
    fn test_all_known_paths_deduplicated() {
        let yaml = r#"
kind: DaemonSet
spec:
  template:
    spec:
      initContainers:
        - image: busybox:1.36
      containers:
        - image: fluent/fluent-bit:2.1
        - image: busybox:1.36
--- # pod
kind: Pod
spec:
  initContainers:
    - image: alpine:3.18
  containers:
    - image: registry.k8s.io/pause@sha256:7031c1b283388d2c2e09b57badb803c05ebed362dc88d84b480cc47f72a21097
"#;
        let images: Vec<_> = find_images(yaml.as_bytes()).into_iter().collect();
        assert_eq!(
            images,
            vec![
                "alpine:3.18",
                "busybox:1.36",
                "fluent/fluent-bit:2.1",
                "registry.k8s.io/pause@sha256:7031c1b283388d2c2e09b57badb803c05ebed362dc88d84b480cc47f72a21097",
            ]
        );
    }

    #[test]
    fn test_malformed_documents_are_skipped() {
        let yaml = "kind: Pod\nspec:\n  containers: [ {image: a:1\n---\nkind: Pod\nspec:\n  containers:\n    - image: b:2\n";
        let images = find_images(yaml.as_bytes());
        assert_eq!(images, BTreeSet::from(["b:2".to_string()]));
    }

    #[test]
    fn test_non_pod_shapes() {
        let yaml = "just a string\n---\n- a\n- b\n---\nspec:\n  containers: nope\n";
        assert!(find_images(yaml.as_bytes()).is_empty());
        assert!(find_images(b"").is_empty());
    }

    #[test]
    fn test_split_documents() {
        let docs = split_documents("a: 1\n---\nb: 2\n--- # comment\nc: 3\n---\n\n");
        assert_eq!(docs, vec!["a: 1\n", "b: 2\n", "c: 3\n"]);

        // Not a separator when followed by content
        assert_eq!(split_documents("a: |\n  ---x\n").len(), 1);
    }

    #[test]
    fn test_rewrite_images() {
        let mut pod: Value = serde_yaml::from_str(
            r#"
kind: Pod
spec:
  initContainers:
    - image: busybox:1.36
  containers:
    - image: quay.io/org/app@sha256:7031c1b283388d2c2e09b57badb803c05ebed362dc88d84b480cc47f72a21097
    - image: "Not A Valid::Ref"
"#,
        )
        .unwrap();

        assert_eq!(rewrite_images(&mut pod, "registry.local:5000"), 2);
        assert_eq!(
            pod["spec"]["initContainers"][0]["image"],
            "registry.local:5000/library/busybox:1.36"
        );
        assert_eq!(
            pod["spec"]["containers"][0]["image"],
            "registry.local:5000/org/app@sha256:7031c1b283388d2c2e09b57badb803c05ebed362dc88d84b480cc47f72a21097"
        );
        assert_eq!(pod["spec"]["containers"][1]["image"], "Not A Valid::Ref");
    }

    #[test]
    fn test_rewrite_manifest() {
        let out = rewrite_manifest(DEPLOYMENT_AND_CONFIGMAP.as_bytes(), "mirror.io").unwrap();
        let images = find_images(&out);
        assert_eq!(
            images,
            BTreeSet::from(["mirror.io/library/nginx:1.25".to_string()])
        );
        assert!(String::from_utf8(out).unwrap().contains("kind: ConfigMap"));
    }
}
