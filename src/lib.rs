//! VM image builder library.
//!
//! Derives runtime images from a bootstrap JDK, one per build kind, and
//! deploys separately built engine artifacts into them: libraries, engine
//! libraries with their service registrations, and native engine bundles.
//! Native engines are built with the external toolchain by [`build`].

pub mod build;
pub mod config;
pub mod deploy;
pub mod error;
pub mod image;
pub mod install;
pub mod layout;
pub mod preflight;
pub mod process;
pub mod prompt;
pub mod properties;
pub mod rebuild;
pub mod registry;
pub mod release;
pub mod select;
pub mod services;
pub mod vm;

pub use config::Settings;
pub use error::ImageError;
pub use select::ImageSelector;
pub use vm::{BuildKind, EngineVariant};
