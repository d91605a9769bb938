// MIT License
// Copyright 2023--present dpf-core developers

//! # dpf-core
//!
//! Client-side core for driving a DPF post-processing server: operator pin
//! metadata, lazily evaluated operator graphs and the remote calls that
//! evaluate them.
//!
//! ## Overview
//!
//! An [`Operator`] is a local handle on a server-side operator instance.
//! Inputs are bound either to values or to the output pin of another
//! operator; nothing is sent to the server until an output is requested.
//! Every binding is checked against the kind's [`Specification`] as soon as
//! it is made, so type errors never reach the server.
//!
//! ```no_run
//! use dpf_core::operators::mesh::MeshProvider;
//! use dpf_core::{DataSources, Service, ServiceConfig};
//!
//! # fn main() -> dpf_core::Result<()> {
//! let (service, _plugins) = Service::connect(ServiceConfig::default())?;
//! let mesh = MeshProvider::new(&service)?;
//! mesh.inputs().data_sources().connect(DataSources::new("/data/model.rst"))?;
//! let region = mesh.outputs().mesh().get()?;
//! # let _ = region;
//! # Ok(())
//! # }
//! ```
//!
//! ## Modules
//!
//! - [`types`] and [`data`]: semantic type tags and pin values.
//! - [`specification`], [`catalog`], [`registry`]: pin metadata per kind.
//! - [`operator`] and [`operators`]: the graph handles and typed wrappers.
//! - [`session`], [`loopback`], `rpc`: the transport seam and its backends.
//! - [`service`]: connection, plugin loading and operator creation.
//! - [`config`] and [`logging`]: configuration files and tracing setup.
//! - [`status`], [`tensor`], [`c_api`]: the C interface.

#![allow(non_camel_case_types)]

pub mod catalog;
pub mod collection;
pub mod config;
pub mod data;
pub mod error;
pub mod logging;
pub mod loopback;
pub mod operator;
pub mod operators;
pub mod registry;
pub mod service;
pub mod session;
pub mod specification;
pub mod status;
pub mod tensor;
pub mod types;

pub mod c_api;

#[cfg(feature = "rpc")]
pub mod rpc;

pub use collection::{label_space, Collection, FieldsContainer, LabelSpace, ScopingsContainer};
pub use config::{BuildConfiguration, ConfigValue, OperatorConfig, ServiceConfig};
pub use data::{DataSources, EntityRef, Field, Scoping};
pub use error::{Error, PinDirection, Result};
pub use operator::{Binding, EvaluationState, Input, Output, OutputRef, Operator};
pub use registry::SpecificationRegistry;
pub use service::{PluginOutcome, Service};
pub use session::{PluginRequest, RemoteHandle, Session, SessionInput};
pub use specification::{OperatorKind, PinSpecification, Specification};
pub use types::{SemanticType, Value};
