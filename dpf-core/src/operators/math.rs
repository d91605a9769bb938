// MIT License
// Copyright 2023--present dpf-core developers

operator_wrapper! {
    /// Expand a modal solution: modal basis times modal coefficients.
    ModalSuperposition, ModalSuperpositionInputs, ModalSuperpositionOutputs
        => "expansion::modal_superposition",
    inputs {
        modal_basis: 0,
        solution_in_modal_space: 1,
        time_scoping: 3,
        mesh_scoping: 4,
    }
    outputs { fields_container: 0 }
}
