// MIT License
// Copyright 2023--present dpf-core developers

//! Static pin metadata for operator kinds.
//!
//! A [`Specification`] describes the numbered input and output pins of one
//! operator kind. Indices mirror the server ABI and may be sparse
//! (`mesh_provider` declares inputs 3, 4 and 14 only). Specifications are
//! immutable once built, and [`OperatorKind`] wraps one together with the
//! names it is registered under.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::config::OperatorConfig;
use crate::error::{Error, PinDirection, Result};
use crate::types::{join_tags, SemanticType};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PinSpecification {
    pub name: String,
    #[serde(rename = "types")]
    pub type_names: Vec<SemanticType>,
    #[serde(default)]
    pub optional: bool,
    #[serde(default)]
    pub document: String,
}

impl PinSpecification {
    /// A required pin accepting the given types, in preference order.
    pub fn new(name: &str, type_names: &[SemanticType]) -> Self {
        Self {
            name: name.to_string(),
            type_names: type_names.to_vec(),
            optional: false,
            document: String::new(),
        }
    }

    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }

    pub fn doc(mut self, document: &str) -> Self {
        self.document = document.to_string();
        self
    }

    /// Whether a value of type `ty` may be bound to this pin. A value tagged
    /// `any` only fits a pin that declares `any`.
    pub fn accepts(&self, ty: SemanticType) -> bool {
        self.type_names
            .iter()
            .any(|&t| t == ty || t == SemanticType::Any)
    }

    /// The type requested from the server when fetching this pin.
    pub fn primary_type(&self) -> SemanticType {
        self.type_names.first().copied().unwrap_or(SemanticType::Any)
    }

    pub fn type_list(&self) -> String {
        join_tags(&self.type_names)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Specification {
    description: String,
    inputs: BTreeMap<u32, PinSpecification>,
    outputs: BTreeMap<u32, PinSpecification>,
}

impl Specification {
    pub fn builder(description: &str) -> SpecificationBuilder {
        SpecificationBuilder {
            spec: Specification {
                description: description.to_string(),
                ..Default::default()
            },
            error: None,
        }
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn inputs(&self) -> &BTreeMap<u32, PinSpecification> {
        &self.inputs
    }

    pub fn outputs(&self) -> &BTreeMap<u32, PinSpecification> {
        &self.outputs
    }

    pub fn pins(&self, direction: PinDirection) -> &BTreeMap<u32, PinSpecification> {
        match direction {
            PinDirection::Input => &self.inputs,
            PinDirection::Output => &self.outputs,
        }
    }

    /// Lowest index carrying `name` in the given direction.
    pub fn find_by_name(
        &self,
        direction: PinDirection,
        name: &str,
    ) -> Option<(u32, &PinSpecification)> {
        self.pins(direction)
            .iter()
            .find(|(_, p)| p.name == name)
            .map(|(&i, p)| (i, p))
    }
}

/// Collects pins and rejects duplicated indices.
pub struct SpecificationBuilder {
    spec: Specification,
    error: Option<Error>,
}

impl SpecificationBuilder {
    pub fn input(self, pin: u32, spec: PinSpecification) -> Self {
        self.pin(PinDirection::Input, pin, spec)
    }

    pub fn output(self, pin: u32, spec: PinSpecification) -> Self {
        self.pin(PinDirection::Output, pin, spec)
    }

    fn pin(mut self, direction: PinDirection, pin: u32, spec: PinSpecification) -> Self {
        if self.error.is_some() {
            return self;
        }
        let map = match direction {
            PinDirection::Input => &mut self.spec.inputs,
            PinDirection::Output => &mut self.spec.outputs,
        };
        if map.insert(pin, spec).is_some() {
            self.error = Some(Error::DuplicatePin { direction, pin });
        }
        self
    }

    pub fn build(self) -> Result<Specification> {
        match self.error {
            Some(e) => Err(e),
            None => Ok(self.spec),
        }
    }
}

/// A registered operator kind.
#[derive(Debug, Clone, PartialEq)]
pub struct OperatorKind {
    kind_name: String,
    scripting_name: String,
    category: String,
    specification: Specification,
    default_config: OperatorConfig,
}

impl OperatorKind {
    pub fn new(
        kind_name: &str,
        scripting_name: &str,
        category: &str,
        specification: Specification,
    ) -> Self {
        Self {
            kind_name: kind_name.to_string(),
            scripting_name: scripting_name.to_string(),
            category: category.to_string(),
            specification,
            default_config: OperatorConfig::default(),
        }
    }

    pub fn with_default_config(mut self, config: OperatorConfig) -> Self {
        self.default_config = config;
        self
    }

    /// Identifier the server registers the operator under.
    pub fn kind_name(&self) -> &str {
        &self.kind_name
    }

    pub fn scripting_name(&self) -> &str {
        &self.scripting_name
    }

    pub fn category(&self) -> &str {
        &self.category
    }

    pub fn specification(&self) -> &Specification {
        &self.specification
    }

    pub fn default_config(&self) -> &OperatorConfig {
        &self.default_config
    }

    pub fn input_pin(&self, pin: u32) -> Result<&PinSpecification> {
        self.pin(PinDirection::Input, pin)
    }

    pub fn output_pin(&self, pin: u32) -> Result<&PinSpecification> {
        self.pin(PinDirection::Output, pin)
    }

    pub fn pin(&self, direction: PinDirection, pin: u32) -> Result<&PinSpecification> {
        self.specification
            .pins(direction)
            .get(&pin)
            .ok_or_else(|| Error::UnknownPin {
                operator: self.kind_name.clone(),
                direction,
                pin,
            })
    }

    pub fn input_pin_by_name(&self, name: &str) -> Result<(u32, &PinSpecification)> {
        self.pin_by_name(PinDirection::Input, name)
    }

    pub fn output_pin_by_name(&self, name: &str) -> Result<(u32, &PinSpecification)> {
        self.pin_by_name(PinDirection::Output, name)
    }

    pub fn pin_by_name(
        &self,
        direction: PinDirection,
        name: &str,
    ) -> Result<(u32, &PinSpecification)> {
        self.specification
            .find_by_name(direction, name)
            .ok_or_else(|| Error::UnknownPinName {
                operator: self.kind_name.clone(),
                direction,
                name: name.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec() -> Specification {
        Specification::builder("Read a mesh")
            .input(
                3,
                PinSpecification::new("streams_container", &[SemanticType::StreamsContainer])
                    .optional(),
            )
            .input(
                4,
                PinSpecification::new("data_sources", &[SemanticType::DataSources]),
            )
            .output(0, PinSpecification::new("mesh", &[SemanticType::MeshedRegion]))
            .build()
            .unwrap()
    }

    #[test]
    fn lookup_is_total_over_declared_indices_only() {
        let kind = OperatorKind::new("MeshProvider", "mesh_provider", "mesh", spec());
        assert_eq!(kind.input_pin(3).unwrap().name, "streams_container");
        assert_eq!(kind.input_pin(4).unwrap().name, "data_sources");
        assert!(kind.output_pin(0).is_ok());
        for missing in [0, 1, 2, 5, 14] {
            let err = kind.input_pin(missing).unwrap_err();
            assert!(matches!(err, Error::UnknownPin { pin, .. } if pin == missing));
        }
        assert!(kind.output_pin(1).is_err());
    }

    #[test]
    fn duplicate_index_is_rejected() {
        let err = Specification::builder("min")
            .input(2, PinSpecification::new("fieldA", &[SemanticType::Field]))
            .input(2, PinSpecification::new("fieldB", &[SemanticType::Field]))
            .build()
            .unwrap_err();
        assert!(matches!(
            err,
            Error::DuplicatePin {
                direction: PinDirection::Input,
                pin: 2
            }
        ));
    }

    #[test]
    fn name_lookup_returns_index() {
        let kind = OperatorKind::new("MeshProvider", "mesh_provider", "mesh", spec());
        let (idx, pin) = kind.input_pin_by_name("data_sources").unwrap();
        assert_eq!(idx, 4);
        assert!(!pin.optional);
        assert!(kind.input_pin_by_name("mesh").is_err());
    }

    #[test]
    fn any_accepts_everything() {
        let pin = PinSpecification::new("any_input", &[SemanticType::Any]);
        assert!(pin.accepts(SemanticType::Field));
        assert!(pin.accepts(SemanticType::Bool));
        assert!(pin.accepts(SemanticType::Any));
        let pin = PinSpecification::new("fieldA", &[SemanticType::Field]);
        assert!(!pin.accepts(SemanticType::String));
        assert!(pin.accepts(SemanticType::Field));
    }

    #[test]
    fn untyped_value_needs_an_any_pin() {
        let pin = PinSpecification::new(
            "fieldA",
            &[SemanticType::Field, SemanticType::FieldsContainer],
        );
        assert!(!pin.accepts(SemanticType::Any));
    }

    #[test]
    fn primary_type_is_first_declared() {
        let pin = PinSpecification::new(
            "time_scoping",
            &[SemanticType::Scoping, SemanticType::VectorInt32],
        );
        assert_eq!(pin.primary_type(), SemanticType::Scoping);
        assert_eq!(pin.type_list(), "scoping, vector<int32>");
    }
}
