// MIT License
// Copyright 2023--present dpf-core developers

operator_wrapper! {
    /// Serialize any inputs into one string. Both pins are named
    /// `any_input` on the server.
    SerializerToString, SerializerToStringInputs, SerializerToStringOutputs
        => "serializer_to_string",
    inputs { any_input1: 1, any_input2: 2 }
    outputs { serialized_string: 0 }
}
