//! Kevi Engine - Renderer collaborators and image discovery
//!
//! This crate provides:
//! - `ResourceBuilder`: kustomize-style manifest builds from a `MemFs`, with
//!   root kustomization synthesis and a process-wide build lock
//! - `Chart` / `JinjaChartRenderer`: chart loading and dry-run rendering
//! - `find_images` / `rewrite_images`: container image discovery and
//!   registry rewriting in rendered manifests

pub mod chart;
pub mod error;
pub mod filters;
pub mod images;
pub mod kustomize;
pub mod lock;
pub mod renderer;

pub use chart::{Chart, ChartMetadata};
pub use error::{EngineError, Result};
pub use images::{KNOWN_IMAGE_PATHS, find_images, rewrite_images, rewrite_manifest, split_documents};
pub use kustomize::{Kustomization, ManifestRenderer, ResourceBuilder, ensure_kustomization, render_manifests};
pub use lock::with_manifest_build_lock;
pub use renderer::{ChartRenderer, DRY_RUN_NAMESPACE, DRY_RUN_RELEASE_NAME, JinjaChartRenderer, RenderOptions};
