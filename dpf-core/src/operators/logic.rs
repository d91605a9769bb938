// MIT License
// Copyright 2023--present dpf-core developers

operator_wrapper! {
    /// Check whether one field is included in another.
    IncludedFields, IncludedFieldsInputs, IncludedFieldsOutputs => "Are_fields_included",
    inputs { field_a: 0, field_b: 1, double_value: 2, double_tolerance: 3 }
    outputs { included: 0, message: 1 }
}
