// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Function registry.
//!
//! A static JSON document, baked into the function image, maps each logical
//! function name to the recipe for running it:
//!
//! ```json
//! {
//!   "resize": {
//!     "command": "python3",
//!     "handler": "/var/runtime/handler.py",
//!     "import_path": "/var/task/resize.py",
//!     "function_name": "main",
//!     "work_dir": "/var/task",
//!     "env": {"PYTHONUNBUFFERED": "1"}
//!   }
//! }
//! ```
//!
//! It is loaded once at startup and never reloaded.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use tracing::info;

use crate::error::{Result, RuntimeError};

/// How to run one function.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionSpec {
    /// Interpreter or binary to execute
    pub command: String,
    /// Handler script passed as the only argument
    pub handler: String,
    /// Module the handler imports the user function from
    #[serde(default)]
    pub import_path: String,
    /// Name of the user function inside `import_path`
    #[serde(default)]
    pub function_name: String,
    /// Working directory (inherits the runtime's when absent)
    #[serde(default)]
    pub work_dir: Option<PathBuf>,
    /// Environment overrides, applied on top of the runtime's environment
    #[serde(default)]
    pub env: HashMap<String, String>,
}

/// Read-only map from function name to [`FunctionSpec`].
#[derive(Debug, Clone, Default)]
pub struct FunctionRegistry {
    functions: BTreeMap<String, FunctionSpec>,
}

impl FunctionRegistry {
    /// Load the registry document at `path`.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| RuntimeError::RegistryRead {
            path: path.to_path_buf(),
            source,
        })?;
        let functions =
            serde_json::from_str(&raw).map_err(|source| RuntimeError::RegistryParse {
                path: path.to_path_buf(),
                source,
            })?;

        let registry = Self { functions };
        info!(
            path = %path.display(),
            functions = registry.len(),
            "Loaded function registry"
        );
        Ok(registry)
    }

    /// Parse a registry document held in memory.
    pub fn from_json_str(raw: &str) -> Result<Self> {
        Ok(Self {
            functions: serde_json::from_str(raw)?,
        })
    }

    /// Build a registry from already-parsed entries.
    pub fn from_specs(specs: impl IntoIterator<Item = (String, FunctionSpec)>) -> Self {
        Self {
            functions: specs.into_iter().collect(),
        }
    }

    /// Look up a function by exact name.
    pub fn get(&self, name: &str) -> Result<&FunctionSpec> {
        self.functions
            .get(name)
            .ok_or_else(|| RuntimeError::FunctionNotFound(name.to_string()))
    }

    /// Number of registered functions.
    pub fn len(&self) -> usize {
        self.functions.len()
    }

    /// Whether no functions are registered.
    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }

    /// Registered names, sorted.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.functions.keys().map(String::as_str)
    }
}
