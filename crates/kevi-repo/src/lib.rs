//! Kevi Repository - Storage and transport for Kevi artifacts
//!
//! This crate provides:
//!
//! - **Store**: a directory-backed content-addressable store with a reference index
//! - **Registries**: a transport trait with OCI and in-memory implementations
//! - **Relocation**: `copy_all` pushes a whole store onto another registry host
//! - **Fetching**: pulling one package's archive layer back into a store
//! - **Chart repositories**: resolving charts from Helm-style HTTP repositories
//!
//! ## Example
//!
//! ```rust,no_run
//! use kevi_repo::{OciRegistry, RegistryOptions, Store, copy_all};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let store = Store::open("./store")?;
//! let registry = OciRegistry::new("registry.local:5000", RegistryOptions::default())?;
//! let copied = copy_all(&store, &registry).await?;
//! println!("copied {} artifacts", copied.len());
//! # Ok(())
//! # }
//! ```

pub mod chart_repo;
pub mod config;
pub mod error;
pub mod fetcher;
pub mod oci;
pub mod registry;
pub mod relocate;
pub mod store;

pub use chart_repo::{ChartEntry, ChartIndex, ChartLocator, HttpChartLocator};
pub use config::{KeviConfig, RegistryEntry};
pub use error::{RepoError, Result};
pub use fetcher::Fetcher;
pub use oci::OciRegistry;
pub use registry::{Layer, MemoryRegistry, Registry, RegistryOptions, RemoteArtifact};
pub use relocate::copy_all;
pub use store::{INDEX_FILE, IndexEntry, Store};
