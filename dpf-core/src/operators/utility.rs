// MIT License
// Copyright 2023--present dpf-core developers

operator_wrapper! {
    /// Assemble field supports into a single one. Both pins are named
    /// `supports` on the server.
    MergeSupports, MergeSupportsInputs, MergeSupportsOutputs => "merge::abstract_support",
    inputs { supports1: 0, supports2: 1 }
    outputs { merged_support: 0 }
}
