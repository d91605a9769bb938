// MIT License
// Copyright 2023--present dpf-core developers

//! Client-side data entities: fields, scopings, data sources, and
//! references to entities that only live on the server.
//!
//! ## Memory Layout
//!
//! A [`Field`] stores its values entity-major: the `n_components` values of
//! the first scoping id come first, then those of the second id, and so on.
//! This is the `[n_entities, n_components]` row-major shape used when the
//! data is exported as a DLPack tensor.

use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::types::SemanticType;

/// Well-known locations of a scoping.
pub mod locations {
    pub const NODAL: &str = "Nodal";
    pub const ELEMENTAL: &str = "Elemental";
    pub const ELEMENTAL_NODAL: &str = "ElementalNodal";
    pub const TIME_FREQ: &str = "TimeFreq_sets";
}

/// A location plus an ordered list of entity ids.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Scoping {
    location: String,
    ids: Vec<i32>,
}

impl Scoping {
    pub fn new(location: impl Into<String>, ids: Vec<i32>) -> Self {
        Self {
            location: location.into(),
            ids,
        }
    }

    pub fn nodal(ids: Vec<i32>) -> Self {
        Self::new(locations::NODAL, ids)
    }

    pub fn elemental(ids: Vec<i32>) -> Self {
        Self::new(locations::ELEMENTAL, ids)
    }

    pub fn location(&self) -> &str {
        &self.location
    }

    pub fn ids(&self) -> &[i32] {
        &self.ids
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Position of `id` in the scoping.
    pub fn index_of(&self, id: i32) -> Option<usize> {
        self.ids.iter().position(|&i| i == id)
    }
}

/// Values defined on a scoping, `n_components` per entity.
#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    n_components: usize,
    scoping: Scoping,
    data: Vec<f64>,
    unit: Option<String>,
}

impl Field {
    /// Create a field, checking that `data` holds exactly
    /// `scoping.len() * n_components` values.
    pub fn new(n_components: usize, scoping: Scoping, data: Vec<f64>) -> Result<Self> {
        if n_components == 0 {
            return Err(Error::InvalidData(
                "a field needs at least one component".into(),
            ));
        }
        let expected = scoping.len() * n_components;
        if data.len() != expected {
            return Err(Error::InvalidData(format!(
                "field data size mismatch: expected {expected} values ({} entities x {n_components} components), got {}",
                scoping.len(),
                data.len()
            )));
        }
        Ok(Self {
            n_components,
            scoping,
            data,
            unit: None,
        })
    }

    /// A scalar field (one component per entity).
    pub fn scalar(scoping: Scoping, data: Vec<f64>) -> Result<Self> {
        Self::new(1, scoping, data)
    }

    pub fn with_unit(mut self, unit: impl Into<String>) -> Self {
        self.unit = Some(unit.into());
        self
    }

    pub fn location(&self) -> &str {
        self.scoping.location()
    }

    pub fn n_components(&self) -> usize {
        self.n_components
    }

    pub fn n_entities(&self) -> usize {
        self.scoping.len()
    }

    pub fn scoping(&self) -> &Scoping {
        &self.scoping
    }

    pub fn data(&self) -> &[f64] {
        &self.data
    }

    pub fn unit(&self) -> Option<&str> {
        self.unit.as_deref()
    }

    /// Values of the entity with the given scoping id.
    pub fn entity_data_by_id(&self, id: i32) -> Option<&[f64]> {
        let idx = self.scoping.index_of(id)?;
        let start = idx * self.n_components;
        Some(&self.data[start..start + self.n_components])
    }

    pub fn into_parts(self) -> (usize, Scoping, Vec<f64>, Option<String>) {
        (self.n_components, self.scoping, self.data, self.unit)
    }
}

/// Paths to result files the server should read.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DataSources {
    result_path: PathBuf,
    result_key: Option<String>,
    additional: Vec<(String, PathBuf)>,
}

impl DataSources {
    pub fn new(result_path: impl Into<PathBuf>) -> Self {
        Self {
            result_path: result_path.into(),
            result_key: None,
            additional: Vec::new(),
        }
    }

    /// Force the result file type (e.g. `rst`) instead of inferring it from
    /// the extension.
    pub fn with_result_key(mut self, key: impl Into<String>) -> Self {
        self.result_key = Some(key.into());
        self
    }

    pub fn add_file_path(&mut self, key: impl Into<String>, path: impl Into<PathBuf>) {
        self.additional.push((key.into(), path.into()));
    }

    pub fn result_path(&self) -> &Path {
        &self.result_path
    }

    /// The explicit key, or the file extension of the result path.
    pub fn result_key(&self) -> Option<&str> {
        self.result_key
            .as_deref()
            .or_else(|| self.result_path.extension().and_then(|e| e.to_str()))
    }

    pub(crate) fn explicit_result_key(&self) -> Option<&str> {
        self.result_key.as_deref()
    }

    pub fn additional_paths(&self) -> &[(String, PathBuf)] {
        &self.additional
    }
}

/// Handle to an object owned by the server (meshed region, streams,
/// cyclic support, ...). Only the id crosses the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EntityRef {
    ty: SemanticType,
    id: u64,
}

impl EntityRef {
    pub fn new(ty: SemanticType, id: u64) -> Self {
        Self { ty, id }
    }

    pub fn semantic_type(&self) -> SemanticType {
        self.ty
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub(crate) fn retag(self, ty: SemanticType) -> Self {
        Self { ty, id: self.id }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn field_checks_data_size() {
        let scoping = Scoping::nodal(vec![1, 2, 3]);
        assert!(Field::new(3, scoping.clone(), vec![0.0; 9]).is_ok());
        let err = Field::new(3, scoping, vec![0.0; 8]).unwrap_err();
        assert!(err.to_string().contains("expected 9 values"));
    }

    #[test]
    fn field_rejects_zero_components() {
        assert!(Field::new(0, Scoping::nodal(vec![]), vec![]).is_err());
    }

    #[test]
    fn entity_data_by_id() {
        let f = Field::new(2, Scoping::nodal(vec![10, 20]), vec![1.0, 2.0, 3.0, 4.0])
            .unwrap()
            .with_unit("Pa");
        assert_eq!(f.entity_data_by_id(20), Some(&[3.0, 4.0][..]));
        assert_eq!(f.entity_data_by_id(30), None);
        assert_eq!(f.location(), locations::NODAL);
        assert_eq!(f.unit(), Some("Pa"));
    }

    #[test]
    fn result_key_defaults_to_extension() {
        let ds = DataSources::new("/data/model.rst");
        assert_eq!(ds.result_key(), Some("rst"));
        assert_eq!(ds.explicit_result_key(), None);
        let ds = ds.with_result_key("d3plot");
        assert_eq!(ds.result_key(), Some("d3plot"));
    }
}
