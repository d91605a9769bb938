// MIT License
// Copyright 2023--present dpf-core developers

//! Semantic type tags and the values that flow through operator pins.
//!
//! [`SemanticType`] is the closed set of type tags the server understands.
//! Pin specifications list the tags they accept, and every [`Value`] reports
//! exactly one tag, so compatibility is checked locally at connect time.
//!
//! ## Tags
//!
//! | Tag | Rust value |
//! |-----|------------|
//! | `bool` | [`Value::Bool`] |
//! | `int32` | [`Value::Int32`] |
//! | `double` | [`Value::Double`] |
//! | `string` | [`Value::String`] |
//! | `vector<int32>` | [`Value::VectorInt32`] |
//! | `vector<double>` | [`Value::VectorDouble`] |
//! | `field` | [`Value::Field`] |
//! | `fields_container` | [`Value::FieldsContainer`] |
//! | `scoping` | [`Value::Scoping`] |
//! | `scopings_container` | [`Value::ScopingsContainer`] |
//! | `data_sources` | [`Value::DataSources`] |
//! | `streams_container`, `abstract_meshed_region`, `meshes_container`, `cyclic_support`, `abstract_field_support` | [`Value::Entity`] |
//! | `any` | accepted by pins only |

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::collection::{FieldsContainer, ScopingsContainer};
use crate::data::{DataSources, EntityRef, Field, Scoping};
use crate::error::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SemanticType {
    Bool,
    Int32,
    Double,
    String,
    VectorInt32,
    VectorDouble,
    Field,
    FieldsContainer,
    Scoping,
    ScopingsContainer,
    DataSources,
    StreamsContainer,
    MeshedRegion,
    MeshesContainer,
    CyclicSupport,
    FieldSupport,
    Any,
}

impl SemanticType {
    pub const ALL: [SemanticType; 17] = [
        SemanticType::Bool,
        SemanticType::Int32,
        SemanticType::Double,
        SemanticType::String,
        SemanticType::VectorInt32,
        SemanticType::VectorDouble,
        SemanticType::Field,
        SemanticType::FieldsContainer,
        SemanticType::Scoping,
        SemanticType::ScopingsContainer,
        SemanticType::DataSources,
        SemanticType::StreamsContainer,
        SemanticType::MeshedRegion,
        SemanticType::MeshesContainer,
        SemanticType::CyclicSupport,
        SemanticType::FieldSupport,
        SemanticType::Any,
    ];

    /// The wire tag used by the server.
    pub fn tag(self) -> &'static str {
        match self {
            SemanticType::Bool => "bool",
            SemanticType::Int32 => "int32",
            SemanticType::Double => "double",
            SemanticType::String => "string",
            SemanticType::VectorInt32 => "vector<int32>",
            SemanticType::VectorDouble => "vector<double>",
            SemanticType::Field => "field",
            SemanticType::FieldsContainer => "fields_container",
            SemanticType::Scoping => "scoping",
            SemanticType::ScopingsContainer => "scopings_container",
            SemanticType::DataSources => "data_sources",
            SemanticType::StreamsContainer => "streams_container",
            SemanticType::MeshedRegion => "abstract_meshed_region",
            SemanticType::MeshesContainer => "meshes_container",
            SemanticType::CyclicSupport => "cyclic_support",
            SemanticType::FieldSupport => "abstract_field_support",
            SemanticType::Any => "any",
        }
    }

    /// Types that only exist server side and travel as an [`EntityRef`].
    pub fn is_entity(self) -> bool {
        matches!(
            self,
            SemanticType::StreamsContainer
                | SemanticType::MeshedRegion
                | SemanticType::MeshesContainer
                | SemanticType::CyclicSupport
                | SemanticType::FieldSupport
        )
    }
}

impl fmt::Display for SemanticType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

impl FromStr for SemanticType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        SemanticType::ALL
            .iter()
            .copied()
            .find(|t| t.tag() == s)
            .ok_or_else(|| Error::UnknownType(s.to_string()))
    }
}

impl Serialize for SemanticType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.tag())
    }
}

impl<'de> Deserialize<'de> for SemanticType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let tag = String::deserialize(deserializer)?;
        tag.parse().map_err(serde::de::Error::custom)
    }
}

/// Join tags for error messages, e.g. `field, fields_container`.
pub(crate) fn join_tags(types: &[SemanticType]) -> String {
    types
        .iter()
        .map(|t| t.tag())
        .collect::<Vec<_>>()
        .join(", ")
}

/// A value bound to an input pin or fetched from an output pin.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Bool(bool),
    Int32(i32),
    Double(f64),
    String(String),
    VectorInt32(Vec<i32>),
    VectorDouble(Vec<f64>),
    Field(Field),
    FieldsContainer(FieldsContainer),
    Scoping(Scoping),
    ScopingsContainer(ScopingsContainer),
    DataSources(DataSources),
    Entity(EntityRef),
}

impl Value {
    pub fn semantic_type(&self) -> SemanticType {
        match self {
            Value::Bool(_) => SemanticType::Bool,
            Value::Int32(_) => SemanticType::Int32,
            Value::Double(_) => SemanticType::Double,
            Value::String(_) => SemanticType::String,
            Value::VectorInt32(_) => SemanticType::VectorInt32,
            Value::VectorDouble(_) => SemanticType::VectorDouble,
            Value::Field(_) => SemanticType::Field,
            Value::FieldsContainer(_) => SemanticType::FieldsContainer,
            Value::Scoping(_) => SemanticType::Scoping,
            Value::ScopingsContainer(_) => SemanticType::ScopingsContainer,
            Value::DataSources(_) => SemanticType::DataSources,
            Value::Entity(e) => e.semantic_type(),
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_i32(&self) -> Option<i32> {
        match self {
            Value::Int32(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Double(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_field(&self) -> Option<&Field> {
        match self {
            Value::Field(f) => Some(f),
            _ => None,
        }
    }

    pub fn as_fields_container(&self) -> Option<&FieldsContainer> {
        match self {
            Value::FieldsContainer(fc) => Some(fc),
            _ => None,
        }
    }

    pub fn as_scoping(&self) -> Option<&Scoping> {
        match self {
            Value::Scoping(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_entity(&self) -> Option<&EntityRef> {
        match self {
            Value::Entity(e) => Some(e),
            _ => None,
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int32(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Double(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}

impl From<Vec<i32>> for Value {
    fn from(v: Vec<i32>) -> Self {
        Value::VectorInt32(v)
    }
}

impl From<Vec<f64>> for Value {
    fn from(v: Vec<f64>) -> Self {
        Value::VectorDouble(v)
    }
}

impl From<Field> for Value {
    fn from(v: Field) -> Self {
        Value::Field(v)
    }
}

impl From<FieldsContainer> for Value {
    fn from(v: FieldsContainer) -> Self {
        Value::FieldsContainer(v)
    }
}

impl From<Scoping> for Value {
    fn from(v: Scoping) -> Self {
        Value::Scoping(v)
    }
}

impl From<ScopingsContainer> for Value {
    fn from(v: ScopingsContainer) -> Self {
        Value::ScopingsContainer(v)
    }
}

impl From<DataSources> for Value {
    fn from(v: DataSources) -> Self {
        Value::DataSources(v)
    }
}

impl From<EntityRef> for Value {
    fn from(v: EntityRef) -> Self {
        Value::Entity(v)
    }
}
