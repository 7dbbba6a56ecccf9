//! Packing, relocating and loading packages end to end

use std::fs;
use std::path::Path;
use std::sync::Arc;

use kevi_core::{ChartSource, CoreError, MediaType, PackageSet, PackageSpec, Reference};
use kevi_pack::{PackError, Packer, Renderers, load, open};
use kevi_repo::{Fetcher, Layer, MemoryRegistry, RepoError, Store};

const DEPLOYMENT: &str = "apiVersion: apps/v1
kind: Deployment
metadata:
  name: sleeper
spec:
  template:
    spec:
      containers:
      - name: sleeper
        image: busybox:1.36
        command: [sleep, infinity]
---
apiVersion: v1
kind: ConfigMap
metadata:
  name: sleeper-config
data:
  key: value
";

const CONFIGMAP: &str = "apiVersion: v1
kind: ConfigMap
metadata:
  name: settings
data:
  mode: plain
";

fn manifest_dir(root: &Path, name: &str, content: &str) -> String {
    let dir = root.join(name);
    fs::create_dir_all(&dir).unwrap();
    fs::write(dir.join("resources.yaml"), content).unwrap();
    dir.to_string_lossy().into_owned()
}

fn chart_dir(root: &Path) -> String {
    let dir = root.join("podinfo");
    fs::create_dir_all(dir.join("templates")).unwrap();
    fs::write(dir.join("Chart.yaml"), "apiVersion: v2\nname: podinfo\nversion: 6.0.0\n").unwrap();
    fs::write(dir.join("values.yaml"), "replicas: 2\n").unwrap();
    fs::write(
        dir.join("templates/service.yaml"),
        "apiVersion: v1\nkind: Service\nmetadata:\n  name: {{ release.name }}-podinfo\n  namespace: {{ release.namespace }}\nspec:\n  ports:\n  - port: 9898\n",
    )
    .unwrap();
    dir.to_string_lossy().into_owned()
}

#[tokio::test]
async fn test_pack_demo_set() {
    let src = tempfile::tempdir().unwrap();
    let set = PackageSet::new(
        "demo",
        vec![PackageSpec::manifest("raw", manifest_dir(src.path(), "raw", DEPLOYMENT))],
    );

    let mut packer = Packer::new(Store::in_memory(), Renderers::default());
    let descriptors = packer.pack(&set).await.unwrap();
    assert_eq!(descriptors.len(), 3);

    let store = packer.store();
    let references: Vec<&str> = store.references().collect();
    assert_eq!(
        references,
        vec!["docker.io/library/busybox:1.36", "kevi/kevi-demo", "kevi/raw"]
    );
    assert_eq!(store.resolve("kevi/raw").unwrap().kind(), MediaType::ManifestLayer);
    assert_eq!(
        store.resolve("docker.io/library/busybox:1.36").unwrap().kind(),
        MediaType::ImageLayer
    );

    let sets = store.package_sets();
    assert_eq!(sets.len(), 1);
    assert_eq!(sets[0].0, "kevi/kevi-demo");
    let stored = store.load_package_set("kevi/kevi-demo").unwrap();
    assert_eq!(stored, set);
    assert!(stored.get("raw").is_some());
}

#[tokio::test]
async fn test_pack_persists_to_disk() {
    let src = tempfile::tempdir().unwrap();
    let root = tempfile::tempdir().unwrap();
    let set = PackageSet::new(
        "demo",
        vec![PackageSpec::manifest("raw", manifest_dir(src.path(), "raw", DEPLOYMENT))],
    );

    let mut packer = Packer::new(Store::open(root.path()).unwrap(), Renderers::default());
    packer.pack(&set).await.unwrap();
    drop(packer);

    let reopened = Store::open(root.path()).unwrap();
    assert_eq!(reopened.len(), 3);
    let descriptor = reopened.resolve("kevi/raw").unwrap();
    assert!(reopened.read_blob(&descriptor).is_ok());
}

#[tokio::test]
async fn test_pack_is_all_or_nothing() {
    let src = tempfile::tempdir().unwrap();
    let set = PackageSet::new(
        "broken",
        vec![
            PackageSpec::manifest("good", manifest_dir(src.path(), "good", CONFIGMAP)),
            PackageSpec::manifest("bad", src.path().join("missing").to_string_lossy()),
        ],
    );

    let mut packer = Packer::new(Store::in_memory(), Renderers::default());
    let err = packer.pack(&set).await.unwrap_err();
    assert!(matches!(err, PackError::Core(CoreError::InvalidPackageSource { .. })));
    assert!(packer.store().is_empty());
}

#[tokio::test]
async fn test_pack_invalid_package_name_writes_nothing() {
    let src = tempfile::tempdir().unwrap();
    let set = PackageSet::new(
        "demo",
        vec![
            PackageSpec::manifest("good", manifest_dir(src.path(), "good", CONFIGMAP)),
            PackageSpec::manifest("Bad", manifest_dir(src.path(), "bad", CONFIGMAP)),
        ],
    );

    let mut packer = Packer::new(Store::in_memory(), Renderers::default());
    let err = packer.pack(&set).await.unwrap_err();
    assert!(matches!(err, PackError::Core(CoreError::InvalidReference { .. })));
    assert!(packer.store().is_empty());
}

#[tokio::test]
async fn test_pack_unknown_package_type() {
    let set = PackageSet::new(
        "odd",
        vec![PackageSpec {
            name: "nothing".to_string(),
            ..Default::default()
        }],
    );

    let mut packer = Packer::new(Store::in_memory(), Renderers::default());
    let err = packer.pack(&set).await.unwrap_err();
    assert!(matches!(err, PackError::Core(CoreError::UnknownPackageType { .. })));
    assert!(packer.store().is_empty());
}

#[tokio::test]
async fn test_pack_rejects_reserved_name() {
    let src = tempfile::tempdir().unwrap();
    let set = PackageSet::new(
        "demo",
        vec![PackageSpec::manifest("kevi-demo", manifest_dir(src.path(), "raw", CONFIGMAP))],
    );

    let mut packer = Packer::new(Store::in_memory(), Renderers::default());
    let err = packer.pack(&set).await.unwrap_err();
    assert!(matches!(err, PackError::Core(CoreError::ReservedName { .. })));
}

#[tokio::test]
async fn test_manifest_round_trip_through_registry() {
    let src = tempfile::tempdir().unwrap();
    let spec = PackageSpec::manifest("settings", manifest_dir(src.path(), "settings", CONFIGMAP));
    let set = PackageSet::new("demo", vec![spec.clone()]);
    let renderers = Renderers::default();

    let before = open(&spec, &renderers).await.unwrap().generate().unwrap();

    let mut packer = Packer::new(Store::in_memory(), renderers.clone());
    packer.pack(&set).await.unwrap();

    let registry = Arc::new(MemoryRegistry::new("registry.local:5000"));
    let copied = packer.copy_all(registry.as_ref()).await.unwrap();
    assert_eq!(copied.len(), 2);

    let fetcher = Fetcher::new(registry.clone());
    let loaded = load(&fetcher, &spec, &renderers).await.unwrap();
    assert_eq!(loaded.generate().unwrap(), before);

    let fetched_set = fetcher.fetch_package_set("demo").await.unwrap();
    assert_eq!(fetched_set, set);
}

#[tokio::test]
async fn test_chart_round_trip_through_registry() {
    let src = tempfile::tempdir().unwrap();
    let spec = PackageSpec::chart(
        "podinfo",
        ChartSource {
            path: chart_dir(src.path()),
            ..Default::default()
        },
    );
    let renderers = Renderers::default();
    let before = open(&spec, &renderers).await.unwrap().generate().unwrap();
    assert!(String::from_utf8_lossy(&before).contains("dry-podinfo"));

    let mut packer = Packer::new(Store::in_memory(), renderers.clone());
    packer
        .pack(&PackageSet::new("charts", vec![spec.clone()]))
        .await
        .unwrap();

    let registry = Arc::new(MemoryRegistry::new("mirror.local"));
    packer.copy_all(registry.as_ref()).await.unwrap();

    let layers = registry.layers("mirror.local/kevi/podinfo:latest").unwrap();
    assert_eq!(layers.len(), 2);

    let loaded = load(&Fetcher::new(registry.clone()), &spec, &renderers)
        .await
        .unwrap();
    assert_eq!(loaded.generate().unwrap(), before);
}

#[tokio::test]
async fn test_load_requires_exactly_one_layer() {
    let registry = Arc::new(MemoryRegistry::new("registry.local"));
    let reference = Reference::parse("registry.local/kevi/raw").unwrap();
    registry.insert(
        &reference,
        vec![
            Layer::new(b"first".to_vec(), MediaType::ManifestLayer.as_str()),
            Layer::new(b"second".to_vec(), MediaType::ManifestLayer.as_str()),
        ],
    );

    let fetcher = Fetcher::new(registry.clone());
    let spec = PackageSpec::manifest("raw", "./raw");
    let err = load(&fetcher, &spec, &Renderers::default()).await.err().unwrap();
    assert!(matches!(err, PackError::UnexpectedLayerCount { count: 2, .. }));

    registry.insert(
        &reference,
        vec![Layer::new(b"chart".to_vec(), MediaType::ChartLayer.as_str())],
    );
    let err = load(&fetcher, &spec, &Renderers::default()).await.err().unwrap();
    assert!(matches!(err, PackError::UnexpectedLayerCount { count: 0, .. }));
}

#[tokio::test]
async fn test_copy_all_failure_is_reported() {
    let src = tempfile::tempdir().unwrap();
    let set = PackageSet::new(
        "demo",
        vec![PackageSpec::manifest("raw", manifest_dir(src.path(), "raw", DEPLOYMENT))],
    );
    let mut packer = Packer::new(Store::in_memory(), Renderers::default());
    packer.pack(&set).await.unwrap();

    let registry = MemoryRegistry::new("registry.local");
    registry.fail_pushes_matching("kevi/kevi-demo");
    let err = packer.copy_all(&registry).await.unwrap_err();
    assert!(matches!(err, PackError::Repo(RepoError::Registry { .. })));

    // busybox sorts first and was copied; kevi/raw comes after the failure
    assert_eq!(registry.pushes(), vec!["registry.local/library/busybox:1.36"]);
}

#[tokio::test]
async fn test_copy_all_integrity_failure() {
    let src = tempfile::tempdir().unwrap();
    let set = PackageSet::new(
        "demo",
        vec![PackageSpec::manifest("settings", manifest_dir(src.path(), "settings", CONFIGMAP))],
    );
    let mut packer = Packer::new(Store::in_memory(), Renderers::default());
    packer.pack(&set).await.unwrap();

    let registry = MemoryRegistry::new("registry.local");
    registry.corrupt_pushes();
    let err = packer.copy_all(&registry).await.unwrap_err();
    assert!(matches!(err, PackError::Repo(RepoError::Integrity { .. })));
}
