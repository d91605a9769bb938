// MIT License
// Copyright 2023--present dpf-core developers

//! The transport contract between operator handles and a DPF server.
//!
//! A [`Session`] is the only place where remote calls happen. Two
//! implementations ship with the crate:
//!
//! - [`crate::loopback::LoopbackSession`] runs operator kernels in-process.
//! - `crate::rpc::client::RpcSession` (feature `rpc`) talks to a server over
//!   Cap'n Proto RPC.
//!
//! All methods block until the server has answered.

use std::fmt;

use crate::config::OperatorConfig;
use crate::error::Result;
use crate::types::{SemanticType, Value};

/// Server-side id of an instantiated operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RemoteHandle(pub u64);

impl fmt::Display for RemoteHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// What a remote input pin is bound to.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionInput {
    Value(Value),
    /// Pull from another instance's output pin when evaluating.
    Upstream { handle: RemoteHandle, pin: u32 },
}

/// Request to load an operator plugin library.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PluginRequest {
    /// Library file name or path as the server should resolve it.
    pub path: String,
    /// Name the plugin is registered under.
    pub name: String,
    /// Entry-point symbol inside the library.
    pub symbol: String,
}

pub const DEFAULT_PLUGIN_SYMBOL: &str = "LoadOperators";

impl PluginRequest {
    pub fn new(path: &str, name: &str) -> Self {
        Self {
            path: path.to_string(),
            name: name.to_string(),
            symbol: DEFAULT_PLUGIN_SYMBOL.to_string(),
        }
    }

    pub fn with_symbol(mut self, symbol: &str) -> Self {
        self.symbol = symbol.to_string();
        self
    }
}

pub trait Session: Send {
    fn load_plugin(&mut self, request: &PluginRequest) -> Result<()>;

    fn instantiate(&mut self, kind_name: &str, config: &OperatorConfig) -> Result<RemoteHandle>;

    fn bind_input(&mut self, handle: RemoteHandle, pin: u32, input: SessionInput) -> Result<()>;

    fn evaluate(&mut self, handle: RemoteHandle) -> Result<()>;

    /// Fetch an evaluated output. `expected` is the type the client
    /// resolves the pin to; the server may answer with another declared type.
    fn fetch_output(
        &mut self,
        handle: RemoteHandle,
        pin: u32,
        expected: SemanticType,
    ) -> Result<Value>;

    fn release(&mut self, handle: RemoteHandle) -> Result<()>;
}
