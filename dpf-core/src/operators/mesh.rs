// MIT License
// Copyright 2023--present dpf-core developers

operator_wrapper! {
    /// Read a mesh from result files and cure degenerated elements.
    MeshProvider, MeshProviderInputs, MeshProviderOutputs => "MeshProvider",
    inputs { streams_container: 3, data_sources: 4, read_cyclic: 14 }
    outputs { mesh: 0 }
}
