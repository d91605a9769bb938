// MIT License
// Copyright 2023--present dpf-core developers

/// Generate a typed wrapper around [`crate::operator::Operator`] for one
/// operator kind, with one accessor per pin.
///
/// Usage:
/// ```ignore
/// operator_wrapper! {
///     /// Read a mesh from result files.
///     MeshProvider, MeshProviderInputs, MeshProviderOutputs => "MeshProvider",
///     inputs { streams_container: 3, data_sources: 4, read_cyclic: 14 }
///     outputs { mesh: 0 }
/// }
/// ```
macro_rules! operator_wrapper {
    (
        $(#[$meta:meta])*
        $name:ident, $inputs:ident, $outputs:ident => $kind:literal,
        inputs { $($in_name:ident : $in_pin:literal),* $(,)? }
        outputs { $($out_name:ident : $out_pin:literal),* $(,)? }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone)]
        pub struct $name {
            op: $crate::operator::Operator,
        }

        impl $name {
            pub const KIND: &'static str = $kind;

            pub fn new(service: &$crate::service::Service) -> $crate::error::Result<Self> {
                Self::wrap($crate::operator::Operator::new(service, $kind)?)
            }

            pub fn with_config(
                service: &$crate::service::Service,
                config: $crate::config::OperatorConfig,
            ) -> $crate::error::Result<Self> {
                Self::wrap($crate::operator::Operator::with_config(service, $kind, config)?)
            }

            // A kind registered under the same name may declare other pins.
            fn wrap(op: $crate::operator::Operator) -> $crate::error::Result<Self> {
                $( op.kind().input_pin($in_pin)?; )*
                $( op.kind().output_pin($out_pin)?; )*
                Ok(Self { op })
            }

            pub fn operator(&self) -> &$crate::operator::Operator {
                &self.op
            }

            pub fn into_operator(self) -> $crate::operator::Operator {
                self.op
            }

            pub fn inputs(&self) -> $inputs<'_> {
                $inputs { op: &self.op }
            }

            pub fn outputs(&self) -> $outputs<'_> {
                $outputs { op: &self.op }
            }
        }

        impl AsRef<$crate::operator::Operator> for $name {
            fn as_ref(&self) -> &$crate::operator::Operator {
                &self.op
            }
        }

        pub struct $inputs<'a> {
            op: &'a $crate::operator::Operator,
        }

        impl<'a> $inputs<'a> {
            $(
                pub fn $in_name(&self) -> $crate::operator::Input<'a> {
                    $crate::operator::Input::new(self.op, $in_pin)
                }
            )*
        }

        pub struct $outputs<'a> {
            op: &'a $crate::operator::Operator,
        }

        impl<'a> $outputs<'a> {
            $(
                pub fn $out_name(&self) -> $crate::operator::Output<'a> {
                    $crate::operator::Output::new(self.op, $out_pin)
                }
            )*
        }
    };
}
