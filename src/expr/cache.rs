//! Compiled-model cache keyed by equation text and parameter names.
//!
//! Entries are immutable once inserted; the cache is unbounded and owned by
//! whoever creates it (normally the session).

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::error::Result;
use crate::expr::model::{CompiledModel, Compiler};

/// Cache key: (equation text, sorted parameter names, independent variable).
type CacheKey = (String, Vec<String>, String);

#[derive(Debug, Default)]
pub struct ModelCache {
    entries: RwLock<HashMap<CacheKey, Arc<CompiledModel>>>,
}

impl ModelCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the cached model for `text` or compile and insert it.
    pub fn get_or_compile(
        &self,
        compiler: &Compiler,
        text: &str,
        declared: Option<&[String]>,
    ) -> Result<Arc<CompiledModel>> {
        let parsed = compiler.parse(text, declared)?;
        let key = (
            text.to_string(),
            parsed.parameters().to_vec(),
            compiler.x_symbol().to_string(),
        );

        {
            let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
            if let Some(model) = entries.get(&key) {
                log::debug!("model cache hit for '{}'", text.trim());
                return Ok(Arc::clone(model));
            }
        }

        let model = Arc::new(compiler.build(parsed)?);
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        // Another thread may have compiled the same key meanwhile; keep the first.
        let stored = entries.entry(key).or_insert(model);
        Ok(Arc::clone(stored))
    }

    pub fn contains(&self, text: &str, parameters: &[String], x_symbol: &str) -> bool {
        let mut parameters = parameters.to_vec();
        parameters.sort();
        let key = (text.to_string(), parameters, x_symbol.to_string());
        self.entries
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .contains_key(&key)
    }

    pub fn len(&self) -> usize {
        self.entries.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.entries.write().unwrap_or_else(|e| e.into_inner()).clear();
    }
}
