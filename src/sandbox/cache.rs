//! Compiled-module cache for the interpreter wasm.
//!
//! Compiling the RustPython module is by far the most expensive step of
//! sandbox setup, so compiled modules are shared across instances, keyed by
//! canonical path.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, LazyLock, RwLock};

use wasmtime::{Engine, Module};

use crate::error::{Result, SandboxError};

/// Thread-safe cache of compiled interpreter modules.
#[derive(Debug, Default)]
pub struct ModuleCache {
    cache: RwLock<HashMap<PathBuf, Arc<Module>>>,
}

impl ModuleCache {
    pub fn new() -> Self {
        Self {
            cache: RwLock::new(HashMap::new()),
        }
    }

    /// Return the cached module for `path`, compiling it on first use.
    ///
    /// The path is canonicalized before lookup so relative paths and symlinks
    /// share one entry.
    pub fn get_or_compile(&self, engine: &Engine, path: impl AsRef<Path>) -> Result<Arc<Module>> {
        let path = path.as_ref();

        let canonical_path = std::fs::canonicalize(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                SandboxError::InterpreterNotFound(path.display().to_string())
            } else {
                SandboxError::Io(e)
            }
        })?;

        {
            let cache = self.cache.read().unwrap();
            if let Some(module) = cache.get(&canonical_path) {
                return Ok(Arc::clone(module));
            }
        }

        // Compile outside any lock; compilation can take seconds.
        let wasm_bytes = std::fs::read(&canonical_path).map_err(SandboxError::Io)?;
        let module = Module::new(engine, &wasm_bytes).map_err(|e| {
            SandboxError::ModuleLoad(anyhow::anyhow!("failed to compile module: {}", e))
        })?;
        let module = Arc::new(module);

        {
            let mut cache = self.cache.write().unwrap();
            // Another thread may have compiled while we were.
            if let Some(existing) = cache.get(&canonical_path) {
                return Ok(Arc::clone(existing));
            }
            cache.insert(canonical_path, Arc::clone(&module));
        }

        Ok(module)
    }

    /// Clear all cached modules.
    pub fn clear(&self) {
        self.cache.write().unwrap().clear();
    }

    /// Number of cached modules.
    pub fn len(&self) -> usize {
        self.cache.read().unwrap().len()
    }

    /// Check if the cache is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

static GLOBAL_CACHE: LazyLock<ModuleCache> = LazyLock::new(ModuleCache::new);

/// The process-wide module cache used by every sandbox instance.
pub fn global_cache() -> &'static ModuleCache {
    &GLOBAL_CACHE
}
