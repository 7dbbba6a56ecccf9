//! Chart rendering
//!
//! Dry-run rendering only: no cluster is contacted and nothing is installed.
//! Templates use MiniJinja syntax with `values`, `release` and `chart` in
//! scope.

use minijinja::{Environment, UndefinedBehavior, context};
use serde_json::Value as JsonValue;

use crate::chart::Chart;
use crate::error::{EngineError, Result};
use crate::filters;

/// Placeholder release name of a dry run
pub const DRY_RUN_RELEASE_NAME: &str = "dry";

/// Placeholder release namespace of a dry run
pub const DRY_RUN_NAMESPACE: &str = "default";

#[derive(Debug, Clone, PartialEq)]
pub struct RenderOptions {
    pub release_name: String,
    pub namespace: String,
    /// Overrides deep-merged over the chart's `values.yaml`
    pub values: JsonValue,
    pub include_crds: bool,
}

impl RenderOptions {
    /// Placeholder release, no value overrides, CRDs included
    pub fn dry_run() -> Self {
        Self {
            release_name: DRY_RUN_RELEASE_NAME.to_string(),
            namespace: DRY_RUN_NAMESPACE.to_string(),
            values: JsonValue::Object(Default::default()),
            include_crds: true,
        }
    }
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self::dry_run()
    }
}

/// Chart renderer collaborator
pub trait ChartRenderer: Send + Sync {
    fn render(&self, chart: &Chart, options: &RenderOptions) -> Result<Vec<u8>>;
}

/// MiniJinja-backed chart renderer
#[derive(Debug, Clone)]
pub struct JinjaChartRenderer {
    strict: bool,
}

impl Default for JinjaChartRenderer {
    fn default() -> Self {
        Self::new()
    }
}

impl JinjaChartRenderer {
    pub fn new() -> Self {
        Self { strict: true }
    }

    /// Fail on undefined variables (default) or render them empty
    pub fn strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    fn environment(&self) -> Environment<'static> {
        let mut env = Environment::new();
        env.set_undefined_behavior(if self.strict {
            UndefinedBehavior::Strict
        } else {
            UndefinedBehavior::Lenient
        });

        env.add_filter("toyaml", filters::toyaml);
        env.add_filter("tojson", filters::tojson);
        env.add_filter("b64encode", filters::b64encode);
        env.add_filter("quote", filters::quote);
        env.add_filter("nindent", filters::nindent);
        env.add_filter("indent", filters::indent);
        env.add_filter("required", filters::required);
        env.add_filter("trunc", filters::trunc);
        env.add_filter("sha256", filters::sha256sum);
        env
    }
}

impl ChartRenderer for JinjaChartRenderer {
    fn render(&self, chart: &Chart, options: &RenderOptions) -> Result<Vec<u8>> {
        let mut env = self.environment();
        for (name, source) in &chart.templates {
            env.add_template_owned(name.clone(), source.clone())
                .map_err(|e| EngineError::from_minijinja(e, name))?;
        }

        let mut values = chart.values.clone();
        merge_values(&mut values, &options.values);
        let ctx = context! {
            values => values,
            release => context! {
                name => &options.release_name,
                namespace => &options.namespace,
                service => "Kevi",
            },
            chart => &chart.metadata,
        };

        let mut out = String::new();
        if options.include_crds {
            for (name, body) in &chart.crds {
                push_source(&mut out, chart.name(), name, body);
            }
        }

        for name in chart.templates.keys().filter(|n| renders_to_manifest(n)) {
            let rendered = env
                .get_template(name)
                .and_then(|t| t.render(&ctx))
                .map_err(|e| EngineError::from_minijinja(e, name))?;
            push_source(&mut out, chart.name(), name, &rendered);
        }

        tracing::debug!(chart = %chart.name(), release = %options.release_name, "rendered chart");
        Ok(out.into_bytes())
    }
}

/// Partials (`_helpers.tpl`) and `NOTES.txt` produce no manifests
fn renders_to_manifest(path: &str) -> bool {
    let file = path.rsplit('/').next().unwrap_or(path);
    !file.starts_with('_') && file != "NOTES.txt"
}

fn push_source(out: &mut String, chart: &str, path: &str, body: &str) {
    let body = body.trim();
    if body.is_empty() {
        return;
    }
    out.push_str("---\n# Source: ");
    out.push_str(chart);
    out.push('/');
    out.push_str(path);
    out.push('\n');
    out.push_str(body);
    out.push('\n');
}

/// Deep merge `overlay` into `base`; non-object values replace
pub fn merge_values(base: &mut JsonValue, overlay: &JsonValue) {
    match (base, overlay) {
        (JsonValue::Object(base), JsonValue::Object(overlay)) => {
            for (key, value) in overlay {
                match base.get_mut(key) {
                    Some(existing) => merge_values(existing, value),
                    None => {
                        base.insert(key.clone(), value.clone());
                    }
                }
            }
        }
        (base, overlay) => *base = overlay.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::images::find_images;
    use kevi_core::MemFs;
    use serde_json::json;

    fn chart() -> Chart {
        let mut fs = MemFs::new();
        fs.write_file("Chart.yaml", "apiVersion: v2\nname: podinfo\nversion: 6.0.3\n")
            .unwrap();
        fs.write_file(
            "values.yaml",
            "replicas: 1\nimage:\n  repository: ghcr.io/stefanprodan/podinfo\n  tag: 6.0.3\n",
        )
        .unwrap();
        fs.write_file(
            "templates/_helpers.tpl",
            "{% macro fullname(release, chart) %}{{ release.name }}-{{ chart.name }}{% endmacro %}",
        )
        .unwrap();
        fs.write_file(
            "templates/deployment.yaml",
            r#"{% from "templates/_helpers.tpl" import fullname %}apiVersion: apps/v1
kind: Deployment
metadata:
  name: {{ fullname(release, chart) }}
  namespace: {{ release.namespace }}
spec:
  replicas: {{ values.replicas }}
  template:
    spec:
      containers:
        - name: podinfo
          image: "{{ values.image.repository }}:{{ values.image.tag }}"
"#,
        )
        .unwrap();
        fs.write_file("templates/NOTES.txt", "Thanks for installing").unwrap();
        fs.write_file("templates/empty.yaml", "{% if false %}kind: X{% endif %}")
            .unwrap();
        fs.write_file("crds/thing.yaml", "kind: CustomResourceDefinition\n").unwrap();
        Chart::from_fs(&fs).unwrap()
    }

    #[test]
    fn test_dry_run() {
        let out = JinjaChartRenderer::new()
            .render(&chart(), &RenderOptions::dry_run())
            .unwrap();
        let text = String::from_utf8(out).unwrap();

        assert!(text.starts_with("---\n# Source: podinfo/crds/thing.yaml\n"));
        assert!(text.contains("# Source: podinfo/templates/deployment.yaml\n"));
        assert!(text.contains("name: dry-podinfo"));
        assert!(text.contains("namespace: default"));
        assert!(!text.contains("NOTES"));
        assert!(!text.contains("empty.yaml"));
        assert!(!text.contains("_helpers"));

        assert_eq!(
            find_images(text.as_bytes()).into_iter().collect::<Vec<_>>(),
            vec!["ghcr.io/stefanprodan/podinfo:6.0.3"]
        );
    }

    #[test]
    fn test_without_crds() {
        let options = RenderOptions {
            include_crds: false,
            ..RenderOptions::dry_run()
        };
        let out = JinjaChartRenderer::new().render(&chart(), &options).unwrap();
        assert!(!String::from_utf8(out).unwrap().contains("CustomResourceDefinition"));
    }

    #[test]
    fn test_value_overrides() {
        let options = RenderOptions {
            values: json!({"image": {"tag": "6.1.0"}}),
            ..RenderOptions::dry_run()
        };
        let out = JinjaChartRenderer::new().render(&chart(), &options).unwrap();
        assert!(String::from_utf8(out).unwrap().contains("ghcr.io/stefanprodan/podinfo:6.1.0"));
    }

    #[test]
    fn test_render_is_deterministic() {
        let r = JinjaChartRenderer::new();
        let a = r.render(&chart(), &RenderOptions::dry_run()).unwrap();
        let b = r.render(&chart(), &RenderOptions::dry_run()).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_strict_undefined() {
        let mut c = chart();
        c.templates
            .insert("templates/bad.yaml".to_string(), "x: {{ values.nope.deeper }}".to_string());
        let err = JinjaChartRenderer::new()
            .render(&c, &RenderOptions::dry_run())
            .unwrap_err();
        assert!(matches!(err, EngineError::Render { .. }));
    }

    #[test]
    fn test_merge_values() {
        let mut base = json!({"a": {"b": 1, "c": 2}, "d": [1]});
        merge_values(&mut base, &json!({"a": {"b": 10}, "d": [2, 3], "e": true}));
        assert_eq!(base, json!({"a": {"b": 10, "c": 2}, "d": [2, 3], "e": true}));
    }
}
