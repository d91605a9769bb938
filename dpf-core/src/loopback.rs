// MIT License
// Copyright 2023--present dpf-core developers

//! In-process [`Session`] that dispatches operator kinds to Rust kernels.
//!
//! The loopback session behaves like a server: it hands out remote handles,
//! stores input bindings per instance, resolves upstream references against
//! the outputs of already evaluated instances, and refuses to fetch outputs
//! of instances that were never evaluated. It backs the RPC server and the
//! test-suite.
//!
//! Every call is appended to a shared [`CallLog`] so that callers can check
//! which remote requests were issued and in which order.
//!
//! ```
//! use std::collections::BTreeMap;
//! use dpf_core::loopback::LoopbackSession;
//! use dpf_core::Value;
//!
//! let mut session = LoopbackSession::new();
//! session.register_kernel("double_it", |ctx| {
//!     let x = ctx.input(0).and_then(Value::as_f64).unwrap_or(0.0);
//!     Ok(BTreeMap::from([(0, Value::Double(2.0 * x))]))
//! });
//! ```

use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::config::OperatorConfig;
use crate::data::EntityRef;
use crate::error::{Error, Result};
use crate::session::{PluginRequest, RemoteHandle, Session, SessionInput};
use crate::types::{SemanticType, Value};

/// Resolved inputs and configuration handed to a kernel.
pub struct KernelContext<'a> {
    kind_name: &'a str,
    inputs: &'a BTreeMap<u32, Value>,
    config: &'a OperatorConfig,
    next_entity: &'a mut u64,
}

impl KernelContext<'_> {
    pub fn kind_name(&self) -> &str {
        self.kind_name
    }

    pub fn input(&self, pin: u32) -> Option<&Value> {
        self.inputs.get(&pin)
    }

    pub fn inputs(&self) -> &BTreeMap<u32, Value> {
        self.inputs
    }

    pub fn config(&self) -> &OperatorConfig {
        self.config
    }

    /// Allocate a server-side entity of the given type.
    pub fn new_entity(&mut self, ty: SemanticType) -> EntityRef {
        *self.next_entity += 1;
        EntityRef::new(ty, *self.next_entity)
    }
}

pub type Kernel =
    Arc<dyn Fn(&mut KernelContext<'_>) -> Result<BTreeMap<u32, Value>> + Send + Sync>;

/// One request received by the loopback session.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionCall {
    LoadPlugin(PluginRequest),
    Instantiate { kind: String, handle: RemoteHandle },
    BindInput { handle: RemoteHandle, pin: u32 },
    Evaluate(RemoteHandle),
    FetchOutput { handle: RemoteHandle, pin: u32, expected: SemanticType },
    Release(RemoteHandle),
}

/// Shared, append-only record of session calls.
#[derive(Debug, Clone, Default)]
pub struct CallLog(Arc<Mutex<Vec<SessionCall>>>);

impl CallLog {
    fn lock(&self) -> MutexGuard<'_, Vec<SessionCall>> {
        self.0.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn push(&self, call: SessionCall) {
        self.lock().push(call);
    }

    pub fn calls(&self) -> Vec<SessionCall> {
        self.lock().clone()
    }

    pub fn count(&self, pred: impl Fn(&SessionCall) -> bool) -> usize {
        self.lock().iter().filter(|c| pred(c)).count()
    }

    /// Handles evaluated so far, in order.
    pub fn evaluations(&self) -> Vec<RemoteHandle> {
        self.lock()
            .iter()
            .filter_map(|c| match c {
                SessionCall::Evaluate(h) => Some(*h),
                _ => None,
            })
            .collect()
    }

    /// Kind name of an instantiated handle.
    pub fn kind_of(&self, handle: RemoteHandle) -> Option<String> {
        self.lock().iter().find_map(|c| match c {
            SessionCall::Instantiate { kind, handle: h } if *h == handle => Some(kind.clone()),
            _ => None,
        })
    }

    pub fn clear(&self) {
        self.lock().clear();
    }
}

struct Instance {
    kind: String,
    config: OperatorConfig,
    inputs: BTreeMap<u32, SessionInput>,
    outputs: Option<BTreeMap<u32, Value>>,
}

#[derive(Default)]
pub struct LoopbackSession {
    kernels: HashMap<String, Kernel>,
    plugins: HashMap<String, Vec<(String, Kernel)>>,
    instances: HashMap<u64, Instance>,
    next_handle: u64,
    next_entity: u64,
    log: CallLog,
}

fn library_file_name(path: &str) -> &str {
    Path::new(path)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or(path)
}

impl LoopbackSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_kernel<F>(&mut self, kind_name: &str, kernel: F) -> &mut Self
    where
        F: Fn(&mut KernelContext<'_>) -> Result<BTreeMap<u32, Value>> + Send + Sync + 'static,
    {
        self.kernels.insert(kind_name.to_string(), Arc::new(kernel));
        self
    }

    /// Make a plugin library loadable. Its kernels become available once a
    /// `load_plugin` request names a path with this file name.
    pub fn register_plugin(&mut self, library: &str, kernels: Vec<(String, Kernel)>) -> &mut Self {
        self.plugins.insert(library.to_string(), kernels);
        self
    }

    pub fn call_log(&self) -> CallLog {
        self.log.clone()
    }

    pub fn has_kernel(&self, kind_name: &str) -> bool {
        self.kernels.contains_key(kind_name)
    }

    /// Number of live instances.
    pub fn instance_count(&self) -> usize {
        self.instances.len()
    }

    fn instance(&self, handle: RemoteHandle) -> Result<&Instance> {
        self.instances
            .get(&handle.0)
            .ok_or_else(|| Error::transport(format!("no operator instance {handle}")))
    }

    fn resolve_inputs(&self, inst: &Instance) -> Result<BTreeMap<u32, Value>> {
        let mut resolved = BTreeMap::new();
        for (&pin, input) in &inst.inputs {
            let value = match input {
                SessionInput::Value(v) => v.clone(),
                SessionInput::Upstream { handle, pin: up_pin } => {
                    let upstream = self.instance(*handle)?;
                    let outputs = upstream.outputs.as_ref().ok_or_else(|| {
                        Error::transport(format!(
                            "{}: upstream instance {handle} ({}) has not been evaluated",
                            inst.kind, upstream.kind
                        ))
                    })?;
                    outputs.get(up_pin).cloned().ok_or_else(|| {
                        Error::transport(format!(
                            "{}: upstream instance {handle} produced nothing on pin {up_pin}",
                            inst.kind
                        ))
                    })?
                }
            };
            resolved.insert(pin, value);
        }
        Ok(resolved)
    }
}

impl Session for LoopbackSession {
    fn load_plugin(&mut self, request: &PluginRequest) -> Result<()> {
        self.log.push(SessionCall::LoadPlugin(request.clone()));
        let file = library_file_name(&request.path);
        let kernels = self.plugins.get(file).cloned().ok_or_else(|| {
            Error::transport(format!("cannot open shared library \"{}\"", request.path))
        })?;
        for (kind, kernel) in kernels {
            self.kernels.insert(kind, kernel);
        }
        Ok(())
    }

    fn instantiate(&mut self, kind_name: &str, config: &OperatorConfig) -> Result<RemoteHandle> {
        if !self.kernels.contains_key(kind_name) {
            return Err(Error::transport(format!(
                "operator \"{kind_name}\" is not registered on the server"
            )));
        }
        self.next_handle += 1;
        let handle = RemoteHandle(self.next_handle);
        self.instances.insert(
            handle.0,
            Instance {
                kind: kind_name.to_string(),
                config: config.clone(),
                inputs: BTreeMap::new(),
                outputs: None,
            },
        );
        self.log.push(SessionCall::Instantiate {
            kind: kind_name.to_string(),
            handle,
        });
        Ok(handle)
    }

    fn bind_input(&mut self, handle: RemoteHandle, pin: u32, input: SessionInput) -> Result<()> {
        self.log.push(SessionCall::BindInput { handle, pin });
        if let SessionInput::Upstream { handle: up, .. } = &input {
            self.instance(*up)?;
        }
        let inst = self
            .instances
            .get_mut(&handle.0)
            .ok_or_else(|| Error::transport(format!("no operator instance {handle}")))?;
        inst.inputs.insert(pin, input);
        inst.outputs = None;
        Ok(())
    }

    fn evaluate(&mut self, handle: RemoteHandle) -> Result<()> {
        self.log.push(SessionCall::Evaluate(handle));
        let inst = self.instance(handle)?;
        let kernel = self
            .kernels
            .get(&inst.kind)
            .cloned()
            .ok_or_else(|| Error::transport(format!("operator \"{}\" vanished", inst.kind)))?;
        let inputs = self.resolve_inputs(inst)?;
        let kind = inst.kind.clone();
        let config = inst.config.clone();
        let mut ctx = KernelContext {
            kind_name: &kind,
            inputs: &inputs,
            config: &config,
            next_entity: &mut self.next_entity,
        };
        let outputs = (*kernel)(&mut ctx)?;
        if let Some(inst) = self.instances.get_mut(&handle.0) {
            inst.outputs = Some(outputs);
        }
        Ok(())
    }

    fn fetch_output(
        &mut self,
        handle: RemoteHandle,
        pin: u32,
        expected: SemanticType,
    ) -> Result<Value> {
        self.log.push(SessionCall::FetchOutput {
            handle,
            pin,
            expected,
        });
        let inst = self.instance(handle)?;
        let outputs = inst.outputs.as_ref().ok_or_else(|| {
            Error::transport(format!("{}: instance {handle} has not been evaluated", inst.kind))
        })?;
        outputs.get(&pin).cloned().ok_or_else(|| {
            Error::transport(format!("{}: output pin {pin} was not produced", inst.kind))
        })
    }

    fn release(&mut self, handle: RemoteHandle) -> Result<()> {
        self.log.push(SessionCall::Release(handle));
        self.instances
            .remove(&handle.0)
            .map(|_| ())
            .ok_or_else(|| Error::transport(format!("no operator instance {handle}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn add_session() -> LoopbackSession {
        let mut s = LoopbackSession::new();
        s.register_kernel("add", |ctx| {
            let a = ctx.input(0).and_then(Value::as_i32).unwrap_or(0);
            let b = ctx.input(1).and_then(Value::as_i32).unwrap_or(0);
            Ok(BTreeMap::from([(0, Value::Int32(a + b))]))
        });
        s
    }

    #[test]
    fn evaluate_and_fetch() {
        let mut s = add_session();
        let h = s.instantiate("add", &OperatorConfig::new()).unwrap();
        s.bind_input(h, 0, SessionInput::Value(Value::Int32(2))).unwrap();
        s.bind_input(h, 1, SessionInput::Value(Value::Int32(3))).unwrap();
        s.evaluate(h).unwrap();
        let v = s.fetch_output(h, 0, SemanticType::Int32).unwrap();
        assert_eq!(v, Value::Int32(5));
    }

    #[test]
    fn fetch_before_evaluate_fails() {
        let mut s = add_session();
        let h = s.instantiate("add", &OperatorConfig::new()).unwrap();
        assert!(s.fetch_output(h, 0, SemanticType::Int32).is_err());
    }

    #[test]
    fn upstream_must_be_evaluated() {
        let mut s = add_session();
        let x = s.instantiate("add", &OperatorConfig::new()).unwrap();
        let y = s.instantiate("add", &OperatorConfig::new()).unwrap();
        s.bind_input(y, 0, SessionInput::Upstream { handle: x, pin: 0 })
            .unwrap();
        assert!(s.evaluate(y).is_err());

        s.bind_input(x, 0, SessionInput::Value(Value::Int32(4))).unwrap();
        s.evaluate(x).unwrap();
        s.evaluate(y).unwrap();
        assert_eq!(
            s.fetch_output(y, 0, SemanticType::Int32).unwrap(),
            Value::Int32(4)
        );
    }

    #[test]
    fn unknown_kind_is_refused() {
        let mut s = LoopbackSession::new();
        let err = s.instantiate("MeshProvider", &OperatorConfig::new()).unwrap_err();
        assert!(err.to_string().contains("not registered"));
    }

    #[test]
    fn plugin_registers_kernels_by_file_name() {
        let mut s = LoopbackSession::new();
        let kernel: Kernel = Arc::new(
            |_ctx: &mut KernelContext<'_>| -> Result<BTreeMap<u32, Value>> { Ok(BTreeMap::new()) },
        );
        s.register_plugin("libmeshOperatorsCore.so", vec![("MeshProvider".into(), kernel)]);
        assert!(!s.has_kernel("MeshProvider"));

        let missing = PluginRequest::new("libother.so", "other");
        assert!(s.load_plugin(&missing).is_err());

        let req = PluginRequest::new("/opt/dpf/libmeshOperatorsCore.so", "mesh_operators");
        s.load_plugin(&req).unwrap();
        assert!(s.has_kernel("MeshProvider"));
        assert_eq!(
            s.call_log()
                .count(|c| matches!(c, SessionCall::LoadPlugin(_))),
            2
        );
    }

    #[test]
    fn release_drops_instance() {
        let mut s = add_session();
        let h = s.instantiate("add", &OperatorConfig::new()).unwrap();
        assert_eq!(s.instance_count(), 1);
        s.release(h).unwrap();
        assert_eq!(s.instance_count(), 0);
        assert!(s.release(h).is_err());
    }

    #[test]
    fn kernels_can_allocate_entities() {
        let mut s = LoopbackSession::new();
        s.register_kernel("mesh", |ctx| {
            let mesh = ctx.new_entity(SemanticType::MeshedRegion);
            Ok(BTreeMap::from([(0, Value::Entity(mesh))]))
        });
        let h = s.instantiate("mesh", &OperatorConfig::new()).unwrap();
        s.evaluate(h).unwrap();
        let v = s.fetch_output(h, 0, SemanticType::MeshedRegion).unwrap();
        assert_eq!(v.semantic_type(), SemanticType::MeshedRegion);
    }
}
