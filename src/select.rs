//! Selection of the active engine and build kind.
//!
//! An [`ImageSelector`] is passed to every operation that depends on the
//! selected image. [`ImageSelector::scoped`] switches the selection for the
//! lifetime of a guard and keeps the native distribution bound to the
//! selection in step with it.

use anyhow::Result;
use std::collections::BTreeMap;
use std::ops::{Deref, DerefMut};
use tracing::info;

use crate::config::Settings;
use crate::deploy::resolve::{instantiate, NATIVE_TEMPLATE};
use crate::error::ImageError;
use crate::prompt::Prompter;
use crate::vm::{self, BuildKind, EngineVariant};

/// Active (engine, build kind) pair plus the distribution names bound to it.
#[derive(Debug, Clone, Default)]
pub struct ImageSelector {
    engine: Option<EngineVariant>,
    build: BuildKind,
    bindings: BTreeMap<String, String>,
}

impl ImageSelector {
    pub fn new(engine: Option<EngineVariant>, build: BuildKind) -> Self {
        let mut selector = Self {
            engine: None,
            build,
            bindings: BTreeMap::new(),
        };
        if let Some(engine) = engine {
            selector.pin(engine);
        }
        selector
    }

    pub fn build_kind(&self) -> BuildKind {
        self.build
    }

    /// Engine pinned so far, without asking anyone.
    pub fn pinned_engine(&self) -> Option<EngineVariant> {
        self.engine
    }

    /// Distribution name currently bound to `template`.
    pub fn bound_distribution(&self, template: &str) -> Option<&str> {
        self.bindings.get(template).map(String::as_str)
    }

    fn pin(&mut self, engine: EngineVariant) {
        self.engine = Some(engine);
        self.rebind();
    }

    fn rebind(&mut self) {
        match self.engine {
            Some(engine) => {
                self.bindings.insert(
                    NATIVE_TEMPLATE.to_string(),
                    instantiate(NATIVE_TEMPLATE, engine, self.build),
                );
            }
            None => {
                self.bindings.remove(NATIVE_TEMPLATE);
            }
        }
    }

    /// The active engine and build kind.
    ///
    /// Uses the pinned engine, else `DEFAULT_VM`, else asks `prompter` to
    /// choose among the described engines and offers to persist the choice.
    pub fn resolve(
        &mut self,
        settings: &Settings,
        prompter: &dyn Prompter,
    ) -> Result<(EngineVariant, BuildKind)> {
        if let Some(engine) = self.engine {
            return Ok((engine, self.build));
        }

        if let Some(name) = settings.default_vm.as_deref() {
            if vm::is_alias(name) && settings.env_file_defines("DEFAULT_VM", name) {
                info!(
                    "Please update the DEFAULT_VM value in {} to replace \"{}\" with \"{}\"",
                    settings.env_file.display(),
                    name,
                    vm::dealias(name)
                );
            }
            let engine = EngineVariant::resolve(name)?;
            self.pin(engine);
            return Ok((engine, self.build));
        }

        if !prompter.is_interactive() {
            return Err(ImageError::NotInteractive(
                "Need to specify VM with --vm option or DEFAULT_VM environment variable"
                    .to_string(),
            )
            .into());
        }

        let offered: Vec<EngineVariant> = EngineVariant::ALL
            .iter()
            .copied()
            .filter(|v| v.description().is_some())
            .collect();
        let items: Vec<String> = offered
            .iter()
            .map(|v| format!("{}: {}", v.name(), v.description().unwrap_or_default()))
            .collect();
        let index = prompter.choose(
            "Please select the VM to be executed from the following",
            &items,
        )?;
        let engine = *offered
            .get(index)
            .ok_or_else(|| anyhow::anyhow!("no VM at selection {}", index))?;

        let question = format!(
            "Persist this setting by adding \"DEFAULT_VM={}\" to {}",
            engine,
            settings.env_file.display()
        );
        if prompter.confirm(&question, true)? {
            settings.persist_env("DEFAULT_VM", engine.name())?;
        }
        self.pin(engine);
        Ok((engine, self.build))
    }

    /// Switch to `engine`/`build` until the returned guard is dropped.
    pub fn scoped(&mut self, engine: EngineVariant, build: BuildKind) -> ScopedSelection<'_> {
        let previous = (self.engine, self.build);
        self.engine = Some(engine);
        self.build = build;
        self.rebind();
        ScopedSelection {
            selector: self,
            previous,
        }
    }
}

/// Guard restoring the previous selection and bindings when dropped.
pub struct ScopedSelection<'a> {
    selector: &'a mut ImageSelector,
    previous: (Option<EngineVariant>, BuildKind),
}

impl Deref for ScopedSelection<'_> {
    type Target = ImageSelector;

    fn deref(&self) -> &ImageSelector {
        self.selector
    }
}

impl DerefMut for ScopedSelection<'_> {
    fn deref_mut(&mut self) -> &mut ImageSelector {
        self.selector
    }
}

impl Drop for ScopedSelection<'_> {
    fn drop(&mut self) {
        self.selector.engine = self.previous.0;
        self.selector.build = self.previous.1;
        self.selector.rebind();
    }
}
