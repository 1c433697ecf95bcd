//! Classified error conditions.
//!
//! Most operations return `anyhow::Result` with context attached. The variants
//! here are the conditions a caller has to tell apart: a missing image is fatal
//! but carries the command that fixes it, a missing disassembler is skipped.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that callers match on via `anyhow::Error::downcast_ref`.
#[derive(Error, Debug)]
pub enum ImageError {
    /// The selected engine has not been built into the image for this build kind.
    #[error(
        "The {build} {engine} VM has not been created\n\
         You need to run \"vmimage --vm {engine} --vmbuild {build} build\" to build the selected VM"
    )]
    ImageMissing { engine: String, build: String },

    /// An image exists but has no engine registry file.
    #[error("{} does not exist", .0.display())]
    RegistryMissing(PathBuf),

    /// The bootstrap registry has no parsable `-<engine> KNOWN` line.
    #[error("Could not find default VM in {}", .0.display())]
    NoDefaultEngine(PathBuf),

    /// No disassembler helper exists for this platform or it is not cached locally.
    #[error("disassembler library not available: {0}")]
    DisassemblerUnavailable(String),

    /// A prompt was needed but no one is there to answer it.
    #[error("{0}")]
    NotInteractive(String),

    /// A required native build command exited unsuccessfully.
    #[error("{command} failed with {status}")]
    BuildFailed { command: String, status: String },

    /// A required host tool is not installed.
    #[error("{tool} not found in PATH ({purpose})")]
    ToolNotFound { tool: String, purpose: String },

    /// A directory under the images root does not name a build kind.
    #[error("The build kind derived from {} is unknown: {name}", .dir.display())]
    UnknownBuildKind { dir: PathBuf, name: String },
}

impl ImageError {
    /// Whether this condition is logged and skipped rather than aborting.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, ImageError::DisassemblerUnavailable(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_image_missing_names_remediation() {
        let err = ImageError::ImageMissing {
            engine: "server".into(),
            build: "fastdebug".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("The fastdebug server VM has not been created"));
        assert!(msg.contains("vmimage --vm server --vmbuild fastdebug build"));
    }

    #[test]
    fn test_recoverable_classification() {
        assert!(ImageError::DisassemblerUnavailable("sparc".into()).is_recoverable());
        assert!(!ImageError::NoDefaultEngine(PathBuf::from("jvm.cfg")).is_recoverable());
    }
}
