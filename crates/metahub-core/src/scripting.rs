//! Scripting contract for dynamic mapping rules.
//!
//! Non-static mappings delegate to an external scripting runtime through
//! the [`ScriptingEngine`] contract. The engine core makes no assumption
//! about the runtime beyond this contract: execution must be
//! side-effect-free and deterministic for identical inputs.
//!
//! Engines are registered in a [`ScriptingRegistry`] keyed by language
//! identifier. Resolution is fail-closed: a curation run asks for the
//! configured language before touching any document and aborts with a
//! [`Configuration`] error when no engine matches.
//!
//! [`Configuration`]: crate::error::Error::Configuration

use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

use crate::error::{Error, Result};

/// A pluggable scripting runtime.
#[async_trait]
pub trait ScriptingEngine: Send + Sync {
    /// Language identifier this engine answers to (e.g. `"lua"`).
    fn language(&self) -> &str;

    /// Executes a mapping script against one raw document and returns the
    /// produced string values.
    ///
    /// Must be side-effect-free and deterministic for identical inputs.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Execution`] when the script fails.
    async fn execute(&self, script: &str, document: &Value) -> Result<Vec<String>>;
}

impl std::fmt::Debug for dyn ScriptingEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScriptingEngine")
            .field("language", &self.language())
            .finish()
    }
}

/// Registry of scripting engines keyed by language identifier.
///
/// Language matching is case-insensitive.
#[derive(Default, Clone)]
pub struct ScriptingRegistry {
    engines: HashMap<String, Arc<dyn ScriptingEngine>>,
}

impl ScriptingRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an engine, replacing any previous engine for the same
    /// language.
    pub fn register(&mut self, engine: Arc<dyn ScriptingEngine>) {
        self.engines
            .insert(engine.language().to_ascii_lowercase(), engine);
    }

    /// Resolves the engine for a language.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] when no engine matches; callers
    /// resolve before processing any document so the failure is fail-closed.
    pub fn resolve(&self, language: &str) -> Result<Arc<dyn ScriptingEngine>> {
        self.engines
            .get(&language.to_ascii_lowercase())
            .cloned()
            .ok_or_else(|| {
                Error::configuration(format!("no scripting engine for language {language:?}"))
            })
    }
}

impl std::fmt::Debug for ScriptingRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScriptingRegistry")
            .field("languages", &self.engines.keys().collect::<Vec<_>>())
            .finish()
    }
}
