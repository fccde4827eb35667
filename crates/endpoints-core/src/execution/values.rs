//! Intermediate values produced within one attempt.

use std::collections::BTreeMap;
use std::sync::Arc;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;

use crate::error::EngineError;

/// Name-addressed values, each written exactly once per attempt.
#[derive(Debug, Clone, Default)]
pub struct IntermediateValues {
    values: Arc<DashMap<String, String>>,
}

impl IntermediateValues {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, name: &str, value: String) -> Result<(), EngineError> {
        match self.values.entry(name.to_string()) {
            Entry::Occupied(_) => Err(EngineError::Internal(format!(
                "intermediate value '{name}' was produced twice"
            ))),
            Entry::Vacant(slot) => {
                slot.insert(value);
                Ok(())
            }
        }
    }

    pub fn get(&self, name: &str) -> Option<String> {
        self.values.get(name).map(|v| v.value().clone())
    }

    /// The named values, all of which must already be produced.
    pub fn visible(&self, names: &[String]) -> Result<BTreeMap<String, String>, EngineError> {
        names
            .iter()
            .map(|name| {
                self.get(name).map(|v| (name.clone(), v)).ok_or_else(|| {
                    EngineError::Internal(format!("intermediate value '{name}' is not available"))
                })
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}
