// MIT License
// Copyright 2023--present dpf-core developers

operator_wrapper! {
    /// Read the cyclic support and expand the mesh.
    CyclicSupportProvider, CyclicSupportProviderInputs, CyclicSupportProviderOutputs
        => "mapdl::rst::support_provider_cyclic",
    inputs {
        streams_container: 3,
        data_sources: 4,
        sector_meshed_region: 7,
        expanded_meshed_region: 15,
        sectors_to_expand: 18,
    }
    outputs { cyclic_support: 0, sector_meshes: 1 }
}
