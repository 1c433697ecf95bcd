//! Engine variants and build kinds.
//!
//! An image exists per [`BuildKind`] and holds one library subdirectory per
//! installed [`EngineVariant`]. Legacy engine names are accepted through
//! [`ENGINE_ALIASES`] and always resolve to a canonical variant.

use anyhow::{bail, Result};
use std::fmt;
use std::str::FromStr;

use crate::layout::{Os, Platform};

/// Legacy engine names and the canonical engine each one resolves to.
pub const ENGINE_ALIASES: &[(&str, &str)] = &[
    ("graal", "jvmci"),
    ("server-nograal", "server-nojvmci"),
    ("client-nograal", "client-nojvmci"),
];

/// Name of the engine copied unmodified from the bootstrap image.
pub const ORIGINAL_ENGINE: &str = "original";

/// A selectable compilation/execution strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EngineVariant {
    Jvmci,
    Server,
    Client,
    ServerNoJvmci,
    ClientNoJvmci,
    Original,
}

impl EngineVariant {
    /// All variants, in the order they are offered and built.
    pub const ALL: &'static [EngineVariant] = &[
        EngineVariant::Jvmci,
        EngineVariant::Server,
        EngineVariant::Client,
        EngineVariant::ServerNoJvmci,
        EngineVariant::ClientNoJvmci,
        EngineVariant::Original,
    ];

    pub fn name(self) -> &'static str {
        match self {
            EngineVariant::Jvmci => "jvmci",
            EngineVariant::Server => "server",
            EngineVariant::Client => "client",
            EngineVariant::ServerNoJvmci => "server-nojvmci",
            EngineVariant::ClientNoJvmci => "client-nojvmci",
            EngineVariant::Original => ORIGINAL_ENGINE,
        }
    }

    /// Text shown when asking the user to pick a default engine.
    ///
    /// Only variants with a description are offered in that prompt.
    pub fn description(self) -> Option<&'static str> {
        match self {
            EngineVariant::Jvmci => Some(
                "VM triggered compilation is performed with a tiered system (C1 + Graal) \
                 and Graal is available for hosted compilation.",
            ),
            EngineVariant::Server => Some(
                "Normal compilation is performed with a tiered system (C1 + C2) \
                 and Graal is available for hosted compilation.",
            ),
            _ => None,
        }
    }

    /// Resolve a possibly-aliased engine name.
    pub fn resolve(name: &str) -> Result<Self> {
        dealias(name).parse()
    }

    /// Whether this engine can be built and run on `platform`.
    ///
    /// The launcher on macOS rewrites `-client` to `-server`, so a client
    /// engine is never usable there.
    pub fn is_supported_on(self, platform: &Platform) -> bool {
        !(self == EngineVariant::Client && platform.os == Os::Darwin)
    }

    /// Whether the engine is built with the compiler interface included.
    pub fn includes_jvmci(self) -> bool {
        !matches!(
            self,
            EngineVariant::ServerNoJvmci | EngineVariant::ClientNoJvmci
        )
    }

    /// Suffix appended to the build kind to form the make target.
    pub fn target_suffix(self) -> Option<&'static str> {
        match self {
            EngineVariant::Server | EngineVariant::ServerNoJvmci => Some(""),
            EngineVariant::Client | EngineVariant::ClientNoJvmci => Some("1"),
            EngineVariant::Jvmci => Some("jvmci"),
            EngineVariant::Original => None,
        }
    }

    /// Variant name the native toolchain uses for this engine's output.
    pub fn toolchain_variant(self) -> &'static str {
        match self {
            EngineVariant::Client | EngineVariant::ClientNoJvmci => "compiler1",
            EngineVariant::Server | EngineVariant::ServerNoJvmci => "compiler2",
            other => other.name(),
        }
    }
}

impl fmt::Display for EngineVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for EngineVariant {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match EngineVariant::ALL.iter().find(|v| v.name() == s) {
            Some(v) => Ok(*v),
            None => bail!(
                "unknown VM '{}' (expected one of: {})",
                s,
                EngineVariant::ALL
                    .iter()
                    .map(|v| v.name())
                    .collect::<Vec<_>>()
                    .join(", ")
            ),
        }
    }
}

/// Map an alias to its canonical engine name. Non-aliases pass through.
pub fn dealias(name: &str) -> &str {
    ENGINE_ALIASES
        .iter()
        .find(|(alias, _)| *alias == name)
        .map(|(_, canonical)| *canonical)
        .unwrap_or(name)
}

/// Whether `name` is a legacy alias.
pub fn is_alias(name: &str) -> bool {
    ENGINE_ALIASES.iter().any(|(alias, _)| *alias == name)
}

/// A compilation configuration of the native engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub enum BuildKind {
    #[default]
    Product,
    FastDebug,
    Debug,
    Optimized,
}

impl BuildKind {
    /// All build kinds; the first is the default.
    pub const ALL: &'static [BuildKind] = &[
        BuildKind::Product,
        BuildKind::FastDebug,
        BuildKind::Debug,
        BuildKind::Optimized,
    ];

    pub fn name(self) -> &'static str {
        match self {
            BuildKind::Product => "product",
            BuildKind::FastDebug => "fastdebug",
            BuildKind::Debug => "debug",
            BuildKind::Optimized => "optimized",
        }
    }
}

impl fmt::Display for BuildKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for BuildKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match BuildKind::ALL.iter().find(|b| b.name() == s) {
            Some(b) => Ok(*b),
            None => bail!("unknown VM build '{}'", s),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_alias_resolution_is_idempotent() {
        for (alias, canonical) in ENGINE_ALIASES {
            assert_eq!(dealias(alias), *canonical);
            assert_eq!(dealias(dealias(alias)), *canonical);
            assert!(EngineVariant::resolve(alias).is_ok());
        }
        assert_eq!(dealias("server"), "server");
    }

    #[test]
    fn test_only_described_variants_are_offered() {
        let offered: Vec<_> = EngineVariant::ALL
            .iter()
            .filter(|v| v.description().is_some())
            .map(|v| v.name())
            .collect();
        assert_eq!(offered, vec!["jvmci", "server"]);
    }

    #[test]
    fn test_round_trip_names() {
        for v in EngineVariant::ALL {
            assert_eq!(v.name().parse::<EngineVariant>().unwrap(), *v);
        }
        for b in BuildKind::ALL {
            assert_eq!(b.name().parse::<BuildKind>().unwrap(), *b);
        }
        assert!("turbo".parse::<EngineVariant>().is_err());
    }

    #[test]
    fn test_default_build_kind_is_first() {
        assert_eq!(BuildKind::ALL[0], BuildKind::default());
    }

    #[test]
    fn test_client_unsupported_on_darwin() {
        let mac = Platform::new(Os::Darwin, "amd64");
        let linux = Platform::new(Os::Linux, "amd64");
        assert!(!EngineVariant::Client.is_supported_on(&mac));
        assert!(EngineVariant::Client.is_supported_on(&linux));
        assert!(EngineVariant::Server.is_supported_on(&mac));
    }

    #[test]
    fn test_target_suffix() {
        assert_eq!(EngineVariant::Server.target_suffix(), Some(""));
        assert_eq!(EngineVariant::ClientNoJvmci.target_suffix(), Some("1"));
        assert_eq!(EngineVariant::Jvmci.target_suffix(), Some("jvmci"));
        assert_eq!(EngineVariant::Original.target_suffix(), None);
        assert_eq!(EngineVariant::Client.toolchain_variant(), "compiler1");
    }
}
