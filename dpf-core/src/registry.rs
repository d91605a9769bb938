// MIT License
// Copyright 2023--present dpf-core developers

//! Registry of operator kinds, keyed by kind name.
//!
//! Operators are looked up by their server kind name (`MeshProvider`) or by
//! their scripting name (`mesh_provider`). The registry is built once and
//! then shared read-only behind an `Arc`.
//!
//! Plugins loaded server side add operator kinds the built-in catalog does not
//! know about. Their metadata is supplied as TOML:
//!
//! ```toml
//! [[operator]]
//! kind_name = "custom::scale"
//! scripting_name = "scale"
//! category = "math"
//! description = "Scale a field"
//! inputs = [
//!     { pin = 0, name = "field", types = ["field"] },
//!     { pin = 1, name = "factor", types = ["double"], optional = true },
//! ]
//! outputs = [{ pin = 0, name = "field", types = ["field"] }]
//!
//! [operator.default_config]
//! num_threads = 2
//! ```

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use serde::Deserialize;

use crate::catalog;
use crate::config::OperatorConfig;
use crate::error::{Error, Result};
use crate::specification::{OperatorKind, PinSpecification, Specification};

#[derive(Debug, Clone, Default)]
pub struct SpecificationRegistry {
    kinds: BTreeMap<String, Arc<OperatorKind>>,
    aliases: BTreeMap<String, String>,
}

#[derive(Deserialize)]
struct RegistryDocument {
    #[serde(default, rename = "operator")]
    operators: Vec<KindDocument>,
}

#[derive(Deserialize)]
struct KindDocument {
    kind_name: String,
    scripting_name: Option<String>,
    #[serde(default)]
    category: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    inputs: Vec<PinDocument>,
    #[serde(default)]
    outputs: Vec<PinDocument>,
    #[serde(default)]
    default_config: OperatorConfig,
}

#[derive(Deserialize)]
struct PinDocument {
    pin: u32,
    #[serde(flatten)]
    spec: PinSpecification,
}

impl KindDocument {
    fn into_kind(self) -> Result<OperatorKind> {
        let mut builder = Specification::builder(&self.description);
        for p in self.inputs {
            builder = builder.input(p.pin, p.spec);
        }
        for p in self.outputs {
            builder = builder.output(p.pin, p.spec);
        }
        let spec = builder.build()?;
        let scripting = self.scripting_name.unwrap_or_else(|| self.kind_name.clone());
        Ok(
            OperatorKind::new(&self.kind_name, &scripting, &self.category, spec)
                .with_default_config(self.default_config),
        )
    }
}

impl SpecificationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry holding the built-in catalog.
    pub fn builtin() -> Result<Self> {
        let mut registry = Self::new();
        for kind in catalog::all()? {
            registry.register(kind);
        }
        Ok(registry)
    }

    /// Register a kind, replacing any kind with the same kind name.
    pub fn register(&mut self, kind: OperatorKind) -> Arc<OperatorKind> {
        let kind = Arc::new(kind);
        if kind.scripting_name() != kind.kind_name() {
            self.aliases
                .insert(kind.scripting_name().to_string(), kind.kind_name().to_string());
        }
        self.kinds
            .insert(kind.kind_name().to_string(), Arc::clone(&kind));
        kind
    }

    /// Look up by kind name, then by scripting name.
    pub fn get(&self, name: &str) -> Result<Arc<OperatorKind>> {
        self.kinds
            .get(name)
            .or_else(|| self.aliases.get(name).and_then(|k| self.kinds.get(k)))
            .cloned()
            .ok_or_else(|| Error::UnknownOperator(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_ok()
    }

    pub fn default_config(&self, name: &str) -> Result<OperatorConfig> {
        Ok(self.get(name)?.default_config().clone())
    }

    pub fn kind_names(&self) -> impl Iterator<Item = &str> {
        self.kinds.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.kinds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.kinds.is_empty()
    }

    /// Register every `[[operator]]` of a TOML document; returns how many.
    pub fn extend_from_toml_str(&mut self, contents: &str) -> Result<usize> {
        let doc: RegistryDocument = toml::from_str(contents)?;
        let kinds = doc
            .operators
            .into_iter()
            .map(KindDocument::into_kind)
            .collect::<Result<Vec<_>>>()?;
        let count = kinds.len();
        for kind in kinds {
            tracing::debug!(kind = kind.kind_name(), "registering operator kind");
            self.register(kind);
        }
        Ok(count)
    }

    pub fn extend_from_file(&mut self, path: &Path) -> Result<usize> {
        let contents = std::fs::read_to_string(path)?;
        self.extend_from_toml_str(&contents)
    }
}
