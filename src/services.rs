//! Merged service-provider directory of an image.
//!
//! Engine-library bundles declare providers in archive entries under
//! [`SERVICES_PREFIX`]. The image keeps one file per service holding the
//! union of every bundle's providers. The directory is always regenerated
//! from the full bundle set, so providers of removed bundles disappear.

use anyhow::{Context, Result};
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::io::Read;
use std::path::{Component, Path, PathBuf};
use tracing::{debug, info, warn};

use crate::install::{Installer, FILE_MODE};
use crate::prompt::Prompter;

/// Archive path prefix of service declarations.
pub const SERVICES_PREFIX: &str = "META-INF/jvmci.services/";

/// Service named by archive entry `name`, if it is a service declaration.
///
/// Only the last path component is used, so nested or `..` entries cannot
/// name a file outside the services directory.
fn service_name(name: &str) -> Option<String> {
    let suffix = name.strip_prefix(SERVICES_PREFIX)?;
    match Path::new(suffix).components().next_back()? {
        Component::Normal(file) => Some(file.to_string_lossy().into_owned()),
        _ => None,
    }
}

/// Providers per service, in first-seen order.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ServiceRegistrations {
    services: BTreeMap<String, Vec<String>>,
}

impl ServiceRegistrations {
    /// Record providers for `service` from line-oriented `content`.
    pub fn add(&mut self, service: &str, content: &str) {
        let providers = self.services.entry(service.to_string()).or_default();
        for line in content.lines().map(str::trim).filter(|l| !l.is_empty()) {
            if !providers.iter().any(|p| p == line) {
                providers.push(line.to_string());
            }
        }
    }

    /// Scan one bundle archive for service declarations.
    pub fn scan_bundle(&mut self, bundle: &Path) -> Result<()> {
        let file =
            fs::File::open(bundle).with_context(|| format!("opening {}", bundle.display()))?;
        let mut archive = zip::ZipArchive::new(file)
            .with_context(|| format!("reading archive {}", bundle.display()))?;

        for i in 0..archive.len() {
            let mut entry = archive.by_index(i)?;
            if entry.is_dir() {
                continue;
            }
            let Some(service) = service_name(entry.name()) else {
                continue;
            };
            let mut content = String::new();
            entry
                .read_to_string(&mut content)
                .with_context(|| format!("reading {} in {}", service, bundle.display()))?;
            self.add(&service, &content);
        }
        Ok(())
    }

    pub fn services(&self) -> impl Iterator<Item = &str> {
        self.services.keys().map(String::as_str)
    }

    pub fn providers(&self, service: &str) -> Option<&[String]> {
        self.services.get(service).map(Vec::as_slice)
    }

    /// Content of the generated file for `service`: one provider per line.
    pub fn render(&self, service: &str) -> String {
        self.providers(service)
            .unwrap_or_default()
            .iter()
            .map(|p| format!("{}\n", p))
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }
}

/// Rebuilds a service directory from a set of bundles.
#[derive(Debug, Clone, Copy, Default)]
pub struct ServiceMerger {
    installer: Installer,
}

impl ServiceMerger {
    pub fn new(installer: Installer) -> Self {
        Self { installer }
    }

    /// Merge the service declarations of `bundles` into `services_dir`.
    ///
    /// Bundles that are not regular files are skipped. Returns the services
    /// present in `services_dir` that no bundle declares. With
    /// `obsolete_check` set nothing is written.
    pub fn merge(
        &self,
        bundles: &[PathBuf],
        services_dir: &Path,
        obsolete_check: bool,
    ) -> Result<BTreeSet<String>> {
        let mut orphans = existing_services(services_dir)?;
        if !obsolete_check {
            fs::create_dir_all(services_dir)
                .with_context(|| format!("creating {}", services_dir.display()))?;
        }

        let mut registrations = ServiceRegistrations::default();
        for bundle in bundles.iter().filter(|b| b.is_file()) {
            registrations.scan_bundle(bundle)?;
        }

        for service in registrations.services() {
            if !obsolete_check {
                debug!("Writing service {}", service);
                self.installer.install_bytes(
                    registrations.render(service).as_bytes(),
                    services_dir,
                    service,
                    FILE_MODE,
                )?;
            }
            orphans.remove(service);
        }
        Ok(orphans)
    }
}

/// File names currently in `dir`, empty if it does not exist.
fn existing_services(dir: &Path) -> Result<BTreeSet<String>> {
    let mut names = BTreeSet::new();
    if !dir.is_dir() {
        return Ok(names);
    }
    for entry in fs::read_dir(dir).with_context(|| format!("listing {}", dir.display()))? {
        let entry = entry?;
        if entry.file_type()?.is_file() {
            names.insert(entry.file_name().to_string_lossy().into_owned());
        }
    }
    Ok(names)
}

/// Delete `orphans` from `services_dir`.
pub fn remove_orphans(services_dir: &Path, orphans: &BTreeSet<String>) -> Result<()> {
    for name in orphans {
        let path = services_dir.join(name);
        fs::remove_file(&path).with_context(|| format!("deleting {}", path.display()))?;
        info!("Deleted {}", path.display());
    }
    Ok(())
}

/// Report orphaned services of one image and offer to delete them.
///
/// Returns the orphans that remain on disk.
pub fn check_obsolete(
    merger: &ServiceMerger,
    bundles: &[PathBuf],
    services_dir: &Path,
    prompter: &dyn Prompter,
) -> Result<BTreeSet<String>> {
    let orphans = merger.merge(bundles, services_dir, true)?;
    if orphans.is_empty() || !prompter.is_interactive() {
        return Ok(orphans);
    }
    let listing = orphans
        .iter()
        .map(|o| format!("  {}", o))
        .collect::<Vec<_>>()
        .join("\n");
    let question = format!(
        "These files in {} look obsolete:\n{}\nDelete them",
        services_dir.display(),
        listing
    );
    if prompter.confirm(&question, false)? {
        remove_orphans(services_dir, &orphans)?;
        return Ok(BTreeSet::new());
    }
    warn!("Keeping {} obsolete service file(s)", orphans.len());
    Ok(orphans)
}
