//! Kevi Pack - Packages, packing and reconstruction
//!
//! This crate provides:
//! - `Package`: the capability set shared by manifest and chart packages
//! - `Packer`: renders a package-set and stores every artifact it produces
//! - `load`: rebuilds a package from the layer a registry holds for it

pub mod chart;
pub mod error;
pub mod load;
pub mod manifest;
pub mod package;
pub mod packer;

pub use chart::ChartPackage;
pub use error::{PackError, Result};
pub use load::load;
pub use manifest::ManifestPackage;
pub use package::{Package, Renderers, open};
pub use packer::Packer;
