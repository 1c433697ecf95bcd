//! On-disk layout of a runtime image.
//!
//! Everything here is a pure mapping from (platform, build kind, engine) to a
//! path. Relative paths are relative to an image root; [`ImageLayout`] joins
//! them onto a concrete root.

use std::fmt;
use std::path::{Path, PathBuf};

/// Operating system family, as far as image layout is concerned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Os {
    Linux,
    Darwin,
    Windows,
    Solaris,
    Other,
}

impl Os {
    pub fn host() -> Self {
        match std::env::consts::OS {
            "linux" => Os::Linux,
            "macos" => Os::Darwin,
            "windows" => Os::Windows,
            "solaris" | "illumos" => Os::Solaris,
            _ => Os::Other,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Os::Linux => "linux",
            Os::Darwin => "darwin",
            Os::Windows => "windows",
            Os::Solaris => "solaris",
            Os::Other => "unknown",
        }
    }

    /// OS name used by the native toolchain's output directories.
    pub fn toolchain_name(self) -> &'static str {
        match self {
            Os::Darwin => "bsd",
            other => other.name(),
        }
    }
}

impl fmt::Display for Os {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Target platform: OS plus architecture in the JDK's naming (`amd64`, `sparcv9`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Platform {
    pub os: Os,
    pub arch: String,
}

impl Platform {
    pub fn new(os: Os, arch: impl Into<String>) -> Self {
        Self {
            os,
            arch: arch.into(),
        }
    }

    /// The platform this process runs on.
    pub fn host() -> Self {
        let arch = match std::env::consts::ARCH {
            "x86_64" => "amd64",
            "sparc64" => "sparcv9",
            other => other,
        };
        Self::new(Os::host(), arch)
    }

    /// File name of a shared library, e.g. `libjvm.so` or `jvm.dll`.
    pub fn lib_name(&self, name: &str) -> String {
        match self.os {
            Os::Windows => format!("{}.dll", name),
            Os::Darwin => format!("lib{}.dylib", name),
            _ => format!("lib{}.so", name),
        }
    }

    /// File name of a shared library's debug symbols.
    pub fn debug_lib_name(&self, name: &str) -> String {
        match self.os {
            Os::Windows => format!("{}.pdb", name),
            Os::Darwin => format!("lib{}.dylib.dSYM", name),
            _ => format!("lib{}.debuginfo", name),
        }
    }

    /// Directory holding one subdirectory per engine, relative to the image root.
    pub fn engine_lib_dir(&self) -> PathBuf {
        match self.os {
            Os::Darwin => Path::new("jre").join("lib"),
            Os::Windows => Path::new("jre").join("bin"),
            _ => Path::new("jre").join("lib").join(&self.arch),
        }
    }

    /// Engine registry file, relative to the image root.
    pub fn registry_file(&self) -> PathBuf {
        match self.os {
            Os::Windows => Path::new("jre")
                .join("lib")
                .join(&self.arch)
                .join(REGISTRY_FILE_NAME),
            _ => self.engine_lib_dir().join(REGISTRY_FILE_NAME),
        }
    }
}

/// File name of the engine registry.
pub const REGISTRY_FILE_NAME: &str = "jvm.cfg";

/// Directory for plain library bundles.
pub fn library_dir() -> PathBuf {
    Path::new("jre").join("lib")
}

/// Directory for extension bundles.
pub fn extension_dir() -> PathBuf {
    Path::new("jre").join("lib").join("ext")
}

/// Directory for engine-library bundles.
pub fn jvmci_dir() -> PathBuf {
    Path::new("jre").join("lib").join("jvmci")
}

/// Directory holding one merged file per service.
pub fn services_dir() -> PathBuf {
    jvmci_dir().join("services")
}

/// Engine-options properties file.
pub fn properties_file() -> PathBuf {
    jvmci_dir().join("jvmci.properties")
}

/// Installed copy of the suite's options file.
pub fn options_file() -> PathBuf {
    jvmci_dir().join("options")
}

/// Release-metadata file.
pub fn release_file() -> PathBuf {
    PathBuf::from("release")
}

/// Concrete paths inside one image.
#[derive(Debug, Clone)]
pub struct ImageLayout {
    /// Image root directory.
    pub root: PathBuf,
    /// Platform the image was built for.
    pub platform: Platform,
}

impl ImageLayout {
    pub fn new(root: impl Into<PathBuf>, platform: Platform) -> Self {
        Self {
            root: root.into(),
            platform,
        }
    }

    pub fn engine_lib_dir(&self) -> PathBuf {
        self.root.join(self.platform.engine_lib_dir())
    }

    /// Library subdirectory of a single engine.
    pub fn engine_dir(&self, engine: &str) -> PathBuf {
        self.engine_lib_dir().join(engine)
    }

    pub fn registry_file(&self) -> PathBuf {
        self.root.join(self.platform.registry_file())
    }

    pub fn jvmci_dir(&self) -> PathBuf {
        self.root.join(jvmci_dir())
    }

    pub fn services_dir(&self) -> PathBuf {
        self.root.join(services_dir())
    }

    pub fn properties_file(&self) -> PathBuf {
        self.root.join(properties_file())
    }

    pub fn options_file(&self) -> PathBuf {
        self.root.join(options_file())
    }

    pub fn release_file(&self) -> PathBuf {
        self.root.join(release_file())
    }
}
