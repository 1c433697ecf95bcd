//! Native engine builds.
//!
//! The toolchain itself is external: this module decides when a build is
//! needed, computes its variables, runs it, and packages the outputs as the
//! native bundle the deployment pass installs.

pub mod all;
pub mod debug_shell;
pub mod task;
pub mod vars;

pub use all::{build_all, BuildAllOptions};
pub use task::{BuildState, VariantBuildTask};
pub use vars::{BuildVars, BUILD_VARIABLES};
