// MIT License
// Copyright 2023--present dpf-core developers

operator_wrapper! {
    MinByComponent, MinByComponentInputs, MinByComponentOutputs => "min_by_component",
    inputs {
        use_absolute_value: 0,
        field_a1: 1,
        field_a2: 2,
        // fieldA2 and fieldB1 share pin 2 on the server.
        field_b1: 2,
        field_b2: 3,
    }
    outputs { field: 0 }
}
