// MIT License
// Copyright 2023--present dpf-core developers

//! Metadata of the operator kinds shipped with the server's native plugins.
//!
//! Pin indices, names, accepted types and optionality mirror the server ABI
//! exactly; a mismatch here would only surface as a remote error.

use crate::error::Result;
use crate::specification::{OperatorKind, PinSpecification as Pin, Specification};
use crate::types::SemanticType as T;

pub fn mesh_provider() -> Result<OperatorKind> {
    let spec = Specification::builder("Read a mesh from result files and cure degenerated elements")
        .input(
            3,
            Pin::new("streams_container", &[T::StreamsContainer])
                .optional()
                .doc("result file container allowed to be kept open to cache data"),
        )
        .input(
            4,
            Pin::new("data_sources", &[T::DataSources])
                .doc("result file path container, used if no streams are set"),
        )
        .input(
            14,
            Pin::new("read_cyclic", &[T::Int32])
                .optional()
                .doc("if 1 cyclic symmetry is ignored, if 2 cyclic expansion is done (default is 1)"),
        )
        .output(0, Pin::new("mesh", &[T::MeshedRegion]))
        .build()?;
    Ok(OperatorKind::new("MeshProvider", "mesh_provider", "mesh", spec))
}

pub fn modal_superposition() -> Result<OperatorKind> {
    let spec = Specification::builder(
        "Compute the solution in the time/frequency space from a modal solution by multiplying a \
         modal basis (in 0) by the solution in this modal space (coefficients for each mode for \
         each time/frequency) (in 1).",
    )
    .input(
        0,
        Pin::new("modal_basis", &[T::FieldsContainer])
            .doc("one field by mode with each field representing a mode shape on nodes or elements"),
    )
    .input(
        1,
        Pin::new("solution_in_modal_space", &[T::FieldsContainer]).doc(
            "one field by time/frequency with each field having a ponderating coefficient for \
             each mode of the modal_basis pin",
        ),
    )
    .input(
        3,
        Pin::new("time_scoping", &[T::Scoping, T::VectorInt32])
            .optional()
            .doc(
                "this input allows to compute the result on a subset of the time frequency \
                 domain defined in the solution_in_modal_space fields container",
            ),
    )
    .input(
        4,
        Pin::new("mesh_scoping", &[T::Scoping, T::ScopingsContainer])
            .optional()
            .doc(
                "this input allows to compute the result on a subset of the space domain \
                 defined in the modal_basis fields container",
            ),
    )
    .output(0, Pin::new("fields_container", &[T::FieldsContainer]))
    .build()?;
    Ok(OperatorKind::new(
        "expansion::modal_superposition",
        "modal_superposition",
        "math",
        spec,
    ))
}

pub fn cyclic_support_provider() -> Result<OperatorKind> {
    let spec = Specification::builder(
        "Read the cyclic support (DPF entity containing necessary informations for expansions) \
         and expands the mesh.",
    )
    .input(
        3,
        Pin::new("streams_container", &[T::StreamsContainer])
            .optional()
            .doc("Streams containing the result file."),
    )
    .input(
        4,
        Pin::new("data_sources", &[T::DataSources]).doc("data sources containing the result file."),
    )
    .input(
        7,
        Pin::new("sector_meshed_region", &[T::MeshedRegion, T::MeshesContainer])
            .optional()
            .doc("mesh of the first sector."),
    )
    .input(
        15,
        Pin::new("expanded_meshed_region", &[T::MeshedRegion, T::MeshesContainer])
            .optional()
            .doc("if this pin is set, expanding the mesh is not necessary."),
    )
    .input(
        18,
        Pin::new(
            "sectors_to_expand",
            &[T::Scoping, T::ScopingsContainer, T::VectorInt32],
        )
        .optional()
        .doc("sectors to expand (start at 0), for multistage: use scopings container with 'stage' label."),
    )
    .output(0, Pin::new("cyclic_support", &[T::CyclicSupport]))
    .output(1, Pin::new("sector_meshes", &[T::MeshesContainer]))
    .build()?;
    Ok(OperatorKind::new(
        "mapdl::rst::support_provider_cyclic",
        "cyclic_support_provider",
        "metadata",
        spec,
    ))
}

pub fn on_property() -> Result<OperatorKind> {
    let spec = Specification::builder(
        "Provides a scoping at a given location based on a given property name and a property number.",
    )
    .input(
        0,
        Pin::new("requested_location", &[T::String]).doc("Nodal or Elemental location are expected"),
    )
    .input(
        1,
        Pin::new("property_name", &[T::String]).doc(
            "ex \"mapdl_element_type\", \"apdl_type_index\", \"mapdl_type_id\", \"material\", \
             \"apdl_section_id\", \"apdl_real_id\", \"shell_axi\", \"volume_axi\"...",
        ),
    )
    .input(2, Pin::new("property_id", &[T::Int32]))
    .input(3, Pin::new("streams_container", &[T::StreamsContainer]).optional())
    .input(4, Pin::new("data_sources", &[T::DataSources]))
    .input(
        5,
        Pin::new("inclusive", &[T::Int32]).optional().doc(
            "If element scoping is requested on a nodal named selection, if inclusive == 1 then \
             all the elements adjacent to the nodes ids in input are added, if inclusive == 0, \
             only the elements which have all their nodes in the scoping are included",
        ),
    )
    .output(0, Pin::new("mesh_scoping", &[T::Scoping]).doc("Scoping"))
    .build()?;
    Ok(OperatorKind::new(
        "scoping_provider_by_prop",
        "on_property",
        "scoping",
        spec,
    ))
}

pub fn merge_supports() -> Result<OperatorKind> {
    let doc = "A vector of supports to merge or supports from pin 0 to ...";
    let spec = Specification::builder("Take a set of supports and assemble them in a unique one")
        .input(0, Pin::new("supports", &[T::FieldSupport]).doc(doc))
        .input(1, Pin::new("supports", &[T::FieldSupport]).doc(doc))
        .output(0, Pin::new("merged_support", &[T::FieldSupport]))
        .build()?;
    Ok(OperatorKind::new(
        "merge::abstract_support",
        "merge_supports",
        "utility",
        spec,
    ))
}

pub fn included_fields() -> Result<OperatorKind> {
    let spec = Specification::builder("Check if one field belongs to another.")
        .input(0, Pin::new("fieldA", &[T::Field]))
        .input(1, Pin::new("fieldB", &[T::Field]))
        .input(
            2,
            Pin::new("double_value", &[T::Double]).doc(
                "Double positive small value. Smallest value which will be considered during the \
                 comparison step: all the abs(values) in field less than this value is considered \
                 as null, (default value:1.0e-14).",
            ),
        )
        .input(
            3,
            Pin::new("double_tolerance", &[T::Double]).optional().doc(
                "Double relative tolerance. Maximum tolerance gap between to compared values: \
                 values within relative tolerance are considered identical (v1-v2)/v2 < \
                 relativeTol (default is 0.001).",
            ),
        )
        .output(0, Pin::new("included", &[T::Bool]).doc("bool (true if belongs...)"))
        .output(1, Pin::new("message", &[T::String]))
        .build()?;
    Ok(OperatorKind::new(
        "Are_fields_included",
        "included_fields",
        "logic",
        spec,
    ))
}

pub fn min_by_component() -> Result<OperatorKind> {
    let doc = "Field or fields container with only one field is expected";
    let field_types = [T::Field, T::FieldsContainer];
    let spec = Specification::builder(
        "Give the minimum for each element rank by comparing several fields.",
    )
    .input(
        0,
        Pin::new("use_absolute_value", &[T::Bool]).doc("Use_absolute_value"),
    )
    .input(1, Pin::new("fieldA", &field_types).doc(doc))
    .input(2, Pin::new("fieldB", &field_types).doc(doc))
    .input(3, Pin::new("fieldB", &field_types).doc(doc))
    .output(0, Pin::new("field", &[T::Field]))
    .build()?;
    Ok(OperatorKind::new(
        "min_by_component",
        "min_by_component",
        "min_max",
        spec,
    ))
}

pub fn serializer_to_string() -> Result<OperatorKind> {
    let spec = Specification::builder("Take any input and serialize them in a string.")
        .input(1, Pin::new("any_input", &[T::Any]).doc("any input"))
        .input(2, Pin::new("any_input", &[T::Any]).doc("any input"))
        .output(0, Pin::new("serialized_string", &[T::String]))
        .build()?;
    Ok(OperatorKind::new(
        "serializer_to_string",
        "serializer_to_string",
        "serialization",
        spec,
    ))
}

/// Every built-in kind.
pub fn all() -> Result<Vec<OperatorKind>> {
    Ok(vec![
        mesh_provider()?,
        modal_superposition()?,
        cyclic_support_provider()?,
        on_property()?,
        merge_supports()?,
        included_fields()?,
        min_by_component()?,
        serializer_to_string()?,
    ])
}
