//! Process-wide engine state
//!
//! A `Library` names the engine every `AudioResource` opens through. The
//! process-wide instance is initialised at most once; tests and embedders
//! build their own instances and pass them in explicitly.

use std::fmt;
use std::sync::{Arc, OnceLock};

use crate::engine::{Engine, NativeEngine};

static GLOBAL: OnceLock<Library> = OnceLock::new();

/// Shared handle to a decode/encode engine
#[derive(Clone)]
pub struct Library {
    engine: Arc<dyn Engine>,
}

impl Library {
    pub fn new<E: Engine + 'static>(engine: E) -> Self {
        Self::from_arc(Arc::new(engine))
    }

    pub fn from_arc(engine: Arc<dyn Engine>) -> Self {
        Self { engine }
    }

    /// Library backed by the built-in engine
    pub fn native() -> Self {
        Self::new(NativeEngine::new())
    }

    /// The process-wide library
    ///
    /// Initialised on first use with the built-in engine unless
    /// `install_global` ran earlier.
    pub fn global() -> &'static Library {
        GLOBAL.get_or_init(|| {
            let library = Library::native();
            log::debug!("initialised global library: {}", library.version());
            library
        })
    }

    /// Choose the process-wide library before first use
    ///
    /// Hands the library back if the global was already initialised.
    pub fn install_global(library: Library) -> Result<(), Library> {
        let version = library.version();
        GLOBAL.set(library)?;
        log::debug!("installed global library: {}", version);
        Ok(())
    }

    pub fn engine(&self) -> &dyn Engine {
        self.engine.as_ref()
    }

    /// Engine name and version
    pub fn version(&self) -> String {
        format!("{} ({})", self.engine.version(), self.engine.name())
    }
}

impl Default for Library {
    fn default() -> Self {
        Self::native()
    }
}

impl fmt::Debug for Library {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Library")
            .field("engine", &self.engine.name())
            .field("version", &self.engine.version())
            .finish()
    }
}
