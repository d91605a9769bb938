// MIT License
// Copyright 2023--present dpf-core developers

//! Typed wrappers for the built-in operator kinds, grouped by category.
//!
//! ```no_run
//! # fn demo(service: &dpf_core::Service) -> dpf_core::Result<()> {
//! use dpf_core::operators::mesh::MeshProvider;
//! use dpf_core::DataSources;
//!
//! let provider = MeshProvider::new(service)?;
//! provider
//!     .inputs()
//!     .data_sources()
//!     .connect(DataSources::new("/data/model.rst"))?;
//! let mesh = provider.outputs().mesh().get()?;
//! # Ok(())
//! # }
//! ```

#[macro_use]
mod macros;

pub mod logic;
pub mod math;
pub mod mesh;
pub mod metadata;
pub mod min_max;
pub mod scoping;
pub mod serialization;
pub mod utility;

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;
    use crate::config::ServiceConfig;
    use crate::data::{Field, Scoping};
    use crate::error::Error;
    use crate::loopback::LoopbackSession;
    use crate::registry::SpecificationRegistry;
    use crate::service::Service;
    use crate::types::{SemanticType, Value};

    fn service(session: LoopbackSession) -> Service {
        Service::new(
            session,
            SpecificationRegistry::builtin().unwrap(),
            ServiceConfig::default(),
        )
    }

    #[test]
    fn accessors_match_catalog_names() {
        let svc = service(LoopbackSession::new());

        let min = min_max::MinByComponent::new(&svc).unwrap();
        let names: Vec<_> = [
            min.inputs().use_absolute_value(),
            min.inputs().field_a1(),
            min.inputs().field_a2(),
            min.inputs().field_b1(),
            min.inputs().field_b2(),
        ]
        .iter()
        .map(|i| i.spec().unwrap().name.clone())
        .collect();
        assert_eq!(
            names,
            ["use_absolute_value", "fieldA", "fieldB", "fieldB", "fieldB"]
        );
        assert_eq!(min.inputs().field_a2().index(), min.inputs().field_b1().index());
        assert_eq!(min.inputs().field_b2().index(), 3);

        let merge = utility::MergeSupports::new(&svc).unwrap();
        assert_eq!(merge.inputs().supports2().index(), 1);
        assert_eq!(merge.inputs().supports2().spec().unwrap().name, "supports");

        let cyclic = metadata::CyclicSupportProvider::new(&svc).unwrap();
        assert_eq!(cyclic.outputs().sector_meshes().spec().unwrap().name, "sector_meshes");
        assert_eq!(cyclic.inputs().sectors_to_expand().index(), 18);

        let prop = scoping::OnProperty::new(&svc).unwrap();
        assert_eq!(prop.inputs().inclusive().spec().unwrap().name, "inclusive");
        let modal = math::ModalSuperposition::new(&svc).unwrap();
        assert_eq!(modal.inputs().mesh_scoping().index(), 4);
        let ser = serialization::SerializerToString::new(&svc).unwrap();
        assert_eq!(ser.inputs().any_input2().index(), 2);
        let inc = logic::IncludedFields::new(&svc).unwrap();
        assert_eq!(inc.outputs().message().spec().unwrap().name, "message");
    }

    #[test]
    fn wrapper_refuses_kind_with_other_pins() {
        let mut reg = SpecificationRegistry::new();
        let spec = crate::specification::Specification::builder("stripped")
            .output(0, crate::specification::PinSpecification::new("mesh", &[SemanticType::MeshedRegion]))
            .build()
            .unwrap();
        reg.register(crate::specification::OperatorKind::new(
            "MeshProvider",
            "mesh_provider",
            "mesh",
            spec,
        ));
        let svc = Service::new(LoopbackSession::new(), reg, ServiceConfig::default());
        assert!(matches!(
            mesh::MeshProvider::new(&svc),
            Err(Error::UnknownPin { pin: 3, .. })
        ));
    }

    #[test]
    fn typed_pins_drive_evaluation() {
        let mut session = LoopbackSession::new();
        session.register_kernel("min_by_component", |ctx| {
            let a = ctx.input(1).and_then(Value::as_field).cloned();
            let b = ctx.input(3).and_then(Value::as_field).cloned();
            let (a, b) = match (a, b) {
                (Some(a), Some(b)) => (a, b),
                _ => return Err(Error::InvalidData("two fields expected".into())),
            };
            let data = a
                .data()
                .iter()
                .zip(b.data())
                .map(|(x, y)| x.min(*y))
                .collect();
            let out = Field::new(a.n_components(), a.scoping().clone(), data)?;
            Ok(BTreeMap::from([(0, Value::Field(out))]))
        });
        let svc = service(session);

        let scoping = Scoping::nodal(vec![1, 2]);
        let min = min_max::MinByComponent::new(&svc).unwrap();
        min.inputs().use_absolute_value().connect(false).unwrap();
        min.inputs()
            .field_a1()
            .connect(Field::scalar(scoping.clone(), vec![1.0, 5.0]).unwrap())
            .unwrap();
        min.inputs()
            .field_b2()
            .connect(Field::scalar(scoping.clone(), vec![3.0, 2.0]).unwrap())
            .unwrap();
        assert!(matches!(
            min.outputs().field().get(),
            Err(Error::MissingRequiredInput { pin: 2, .. })
        ));

        min.inputs()
            .field_b1()
            .connect(Field::scalar(scoping, vec![0.0, 0.0]).unwrap())
            .unwrap();
        let field = min.outputs().field().get().unwrap();
        assert_eq!(field.as_field().unwrap().data(), &[1.0, 2.0]);
    }
}
