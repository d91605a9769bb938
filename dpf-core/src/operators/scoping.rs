// MIT License
// Copyright 2023--present dpf-core developers

operator_wrapper! {
    /// Scoping at a location selected by a mesh property value.
    OnProperty, OnPropertyInputs, OnPropertyOutputs => "scoping_provider_by_prop",
    inputs {
        requested_location: 0,
        property_name: 1,
        property_id: 2,
        streams_container: 3,
        data_sources: 4,
        inclusive: 5,
    }
    outputs { mesh_scoping: 0 }
}
