// MIT License
// Copyright 2023--present dpf-core developers

//! Operator handles, pin bindings and lazy evaluation.
//!
//! An [`Operator`] is a client-side handle on one operator of a [`Service`].
//! Binding an input never talks to the server. The remote instance is
//! created, fed and evaluated on the first output request, after every
//! upstream operator it reads from has been brought up to date.
//!
//! ```text
//!   connect / connect_output          get_output
//!  ------------------------>  Unevaluated  ------>  Evaluating  ------>  Evaluated
//!                                  ^                                         |
//!                                  +---------------- rebinding --------------+
//! ```
//!
//! An evaluated operator is evaluated again only when one of its own
//! bindings changed or an upstream operator was evaluated since. Fetched
//! outputs are cached per pin until then.
//!
//! ## Locking
//!
//! Each operator has its own lock and at most one operator lock is held at
//! a time while walking a graph. The session lock is only ever taken while
//! holding the lock of the operator being evaluated, never the reverse.

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::config::OperatorConfig;
use crate::error::{Error, PinDirection, Result};
use crate::service::Service;
use crate::session::{RemoteHandle, SessionInput};
use crate::specification::{OperatorKind, PinSpecification};
use crate::types::{SemanticType, Value};

static NEXT_NODE_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvaluationState {
    Unevaluated,
    Evaluating,
    Evaluated,
}

/// An output pin of another operator, read when evaluating.
#[derive(Debug, Clone)]
pub struct OutputRef {
    pub operator: Operator,
    pub pin: u32,
}

/// What an input pin is bound to.
#[derive(Debug, Clone)]
pub enum Binding {
    Value(Value),
    Output(OutputRef),
}

impl Binding {
    pub fn as_value(&self) -> Option<&Value> {
        match self {
            Binding::Value(v) => Some(v),
            Binding::Output(_) => None,
        }
    }

    fn upstream(&self) -> Option<&Operator> {
        match self {
            Binding::Value(_) => None,
            Binding::Output(r) => Some(&r.operator),
        }
    }
}

struct NodeState {
    config: OperatorConfig,
    bindings: BTreeMap<u32, Binding>,
    /// Pins bound since the last push to the remote instance.
    dirty: BTreeSet<u32>,
    remote: Option<RemoteHandle>,
    status: EvaluationState,
    /// Bumped on every remote evaluation.
    revision: u64,
    /// Upstream node id to the revision it had when this node was evaluated.
    upstream_seen: BTreeMap<u64, u64>,
    outputs: BTreeMap<u32, Value>,
}

impl NodeState {
    fn invalidate(&mut self) {
        self.status = EvaluationState::Unevaluated;
        self.outputs.clear();
    }
}

struct Node {
    id: u64,
    kind: Arc<OperatorKind>,
    service: Service,
    state: Mutex<NodeState>,
}

impl Drop for Node {
    fn drop(&mut self) {
        let state = self.state.get_mut().unwrap_or_else(PoisonError::into_inner);
        if let Some(handle) = state.remote.take() {
            if let Err(e) = self.service.with_session(|s| s.release(handle)) {
                tracing::warn!(operator = self.kind.kind_name(), %handle, error = %e, "failed to release operator instance");
            }
        }
    }
}

/// Handle on one operator. Clones refer to the same operator.
#[derive(Clone)]
pub struct Operator {
    node: Arc<Node>,
}

impl fmt::Debug for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Operator")
            .field("kind", &self.node.kind.kind_name())
            .field("id", &self.node.id)
            .finish()
    }
}

impl PartialEq for Operator {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.node, &other.node)
    }
}

impl Eq for Operator {}

impl Operator {
    /// Create an operator with the kind's default configuration.
    pub fn new(service: &Service, name: &str) -> Result<Self> {
        let kind = service.registry().get(name)?;
        let config = kind.default_config().clone();
        Ok(Self::from_parts(service, kind, config))
    }

    /// Create an operator with a caller-supplied configuration, sent when the
    /// remote instance is created.
    pub fn with_config(service: &Service, name: &str, config: OperatorConfig) -> Result<Self> {
        let kind = service.registry().get(name)?;
        Ok(Self::from_parts(service, kind, config))
    }

    /// Create an operator and bind initial inputs by pin name.
    pub fn with_inputs<'n, I>(service: &Service, name: &str, inputs: I) -> Result<Self>
    where
        I: IntoIterator<Item = (&'n str, Value)>,
    {
        let op = Self::new(service, name)?;
        for (pin_name, value) in inputs {
            let (pin, _) = op.kind().input_pin_by_name(pin_name)?;
            op.connect(pin, value)?;
        }
        Ok(op)
    }

    fn from_parts(service: &Service, kind: Arc<OperatorKind>, config: OperatorConfig) -> Self {
        let id = NEXT_NODE_ID.fetch_add(1, Ordering::Relaxed);
        Self {
            node: Arc::new(Node {
                id,
                kind,
                service: service.clone(),
                state: Mutex::new(NodeState {
                    config,
                    bindings: BTreeMap::new(),
                    dirty: BTreeSet::new(),
                    remote: None,
                    status: EvaluationState::Unevaluated,
                    revision: 0,
                    upstream_seen: BTreeMap::new(),
                    outputs: BTreeMap::new(),
                }),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, NodeState> {
        self.node.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn kind(&self) -> &OperatorKind {
        &self.node.kind
    }

    pub fn kind_name(&self) -> &str {
        self.node.kind.kind_name()
    }

    pub fn service(&self) -> &Service {
        &self.node.service
    }

    pub fn config(&self) -> OperatorConfig {
        self.lock().config.clone()
    }

    pub fn state(&self) -> EvaluationState {
        self.lock().status
    }

    /// Server-side handle, once the operator has been instantiated remotely.
    pub fn remote_handle(&self) -> Option<RemoteHandle> {
        self.lock().remote
    }

    pub fn inputs(&self) -> Inputs<'_> {
        Inputs { op: self }
    }

    pub fn outputs(&self) -> Outputs<'_> {
        Outputs { op: self }
    }

    /// Bind a value to an input pin, replacing any previous binding.
    pub fn connect(&self, pin: u32, value: impl Into<Value>) -> Result<()> {
        let value = value.into();
        let spec = self.kind().input_pin(pin)?;
        let actual = value.semantic_type();
        if !spec.accepts(actual) {
            return Err(Error::TypeMismatch {
                operator: self.kind_name().to_string(),
                direction: PinDirection::Input,
                pin,
                name: spec.name.clone(),
                expected: spec.type_list(),
                actual: actual.tag().to_string(),
            });
        }
        self.bind(pin, Binding::Value(value));
        Ok(())
    }

    /// Bind the output pin `source_pin` of `upstream` to an input pin.
    ///
    /// Nothing is evaluated here; the upstream operator is evaluated when an
    /// output of this operator is requested.
    pub fn connect_output(&self, pin: u32, upstream: &Operator, source_pin: u32) -> Result<()> {
        let target = self.kind().input_pin(pin)?;
        let source = upstream.kind().output_pin(source_pin)?;
        if !self.service().same_as(upstream.service()) {
            return Err(Error::ForeignOperator {
                operator: self.kind_name().to_string(),
                upstream: upstream.kind_name().to_string(),
            });
        }
        // An output declared `any` is only typed once fetched.
        if !source
            .type_names
            .iter()
            .any(|&t| t == SemanticType::Any || target.accepts(t))
        {
            return Err(Error::TypeMismatch {
                operator: self.kind_name().to_string(),
                direction: PinDirection::Input,
                pin,
                name: target.name.clone(),
                expected: target.type_list(),
                actual: source.type_list(),
            });
        }
        self.bind(
            pin,
            Binding::Output(OutputRef {
                operator: upstream.clone(),
                pin: source_pin,
            }),
        );
        Ok(())
    }

    fn bind(&self, pin: u32, binding: Binding) {
        tracing::debug!(operator = self.kind_name(), pin, "binding input");
        let mut state = self.lock();
        state.bindings.insert(pin, binding);
        state.dirty.insert(pin);
        state.invalidate();
    }

    /// Remove the binding of an input pin.
    ///
    /// The session has no way to unbind a pin, so the remote instance is
    /// released and a fresh one is created on the next evaluation.
    pub fn disconnect(&self, pin: u32) -> Result<Option<Binding>> {
        self.kind().input_pin(pin)?;
        let mut state = self.lock();
        let removed = state.bindings.remove(&pin);
        if removed.is_none() {
            return Ok(None);
        }
        state.dirty.remove(&pin);
        state.invalidate();
        if let Some(handle) = state.remote.take() {
            self.service().with_session(|s| s.release(handle))?;
        }
        Ok(removed)
    }

    /// Current binding of an input pin.
    pub fn binding(&self, pin: u32) -> Result<Option<Binding>> {
        self.kind().input_pin(pin)?;
        Ok(self.lock().bindings.get(&pin).cloned())
    }

    /// Bring this operator and everything upstream of it up to date.
    pub fn evaluate(&self) -> Result<()> {
        for op in self.plan()? {
            op.refresh()?;
        }
        Ok(())
    }

    /// Fetch the value of an output pin, evaluating first if needed.
    pub fn get_output(&self, pin: u32) -> Result<Value> {
        let spec = self.kind().output_pin(pin)?;
        self.evaluate()?;

        let mut state = self.lock();
        if let Some(value) = state.outputs.get(&pin) {
            return Ok(value.clone());
        }
        let handle = state.remote.ok_or_else(|| {
            Error::transport(format!("{}: no remote instance to fetch from", self.kind_name()))
        })?;
        let expected = spec.primary_type();
        let raw = self
            .service()
            .with_session(|s| s.fetch_output(handle, pin, expected))?;
        let value = resolve_output(self.kind_name(), pin, spec, raw)?;
        state.outputs.insert(pin, value.clone());
        Ok(value)
    }

    /// Operators to refresh for this one, upstream first, each once.
    ///
    /// Required inputs are checked and cycles detected over the whole graph
    /// before anything is sent to the server.
    fn plan(&self) -> Result<Vec<Operator>> {
        let mut order = Vec::new();
        let mut active = HashSet::new();
        let mut done = HashSet::new();
        self.visit(&mut active, &mut done, &mut order)?;
        Ok(order)
    }

    fn visit(
        &self,
        active: &mut HashSet<u64>,
        done: &mut HashSet<u64>,
        order: &mut Vec<Operator>,
    ) -> Result<()> {
        if done.contains(&self.node.id) {
            return Ok(());
        }
        if !active.insert(self.node.id) {
            return Err(Error::EvaluationCycle {
                operator: self.kind_name().to_string(),
            });
        }
        let upstream: Vec<Operator> = {
            let state = self.lock();
            self.check_required(&state)?;
            state
                .bindings
                .values()
                .filter_map(Binding::upstream)
                .cloned()
                .collect()
        };
        for op in &upstream {
            op.visit(active, done, order)?;
        }
        active.remove(&self.node.id);
        done.insert(self.node.id);
        order.push(self.clone());
        Ok(())
    }

    fn check_required(&self, state: &NodeState) -> Result<()> {
        for (&pin, spec) in self.kind().specification().inputs() {
            if !spec.optional && !state.bindings.contains_key(&pin) {
                return Err(Error::MissingRequiredInput {
                    operator: self.kind_name().to_string(),
                    pin,
                    name: spec.name.clone(),
                });
            }
        }
        Ok(())
    }

    /// Evaluate remotely unless nothing changed since the last evaluation.
    /// Upstream operators must already be up to date.
    fn refresh(&self) -> Result<()> {
        let links: Vec<(u32, Operator, u32)> = {
            let state = self.lock();
            state
                .bindings
                .iter()
                .filter_map(|(&pin, b)| match b {
                    Binding::Output(r) => Some((pin, r.operator.clone(), r.pin)),
                    Binding::Value(_) => None,
                })
                .collect()
        };

        let mut seen = BTreeMap::new();
        let mut upstream_refs = BTreeMap::new();
        for (pin, op, source_pin) in links {
            let up = op.lock();
            let handle = up.remote.ok_or_else(|| {
                Error::transport(format!(
                    "{}: upstream {} has no remote instance",
                    self.kind_name(),
                    op.kind_name()
                ))
            })?;
            seen.insert(op.node.id, up.revision);
            upstream_refs.insert(pin, SessionInput::Upstream { handle, pin: source_pin });
        }

        let mut state = self.lock();
        if state.status == EvaluationState::Evaluated && state.upstream_seen == seen {
            return Ok(());
        }
        state.status = EvaluationState::Evaluating;
        match self.push_and_evaluate(&mut state, &upstream_refs) {
            Ok(()) => {
                state.status = EvaluationState::Evaluated;
                state.revision += 1;
                state.upstream_seen = seen;
                state.outputs.clear();
                Ok(())
            }
            Err(e) => {
                state.invalidate();
                Err(e)
            }
        }
    }

    fn push_and_evaluate(
        &self,
        state: &mut NodeState,
        upstream_refs: &BTreeMap<u32, SessionInput>,
    ) -> Result<()> {
        let kind_name = self.kind_name();
        let service = self.service();
        let handle = match state.remote {
            Some(h) => h,
            None => {
                let h = service.with_session(|s| s.instantiate(kind_name, &state.config))?;
                tracing::debug!(operator = kind_name, handle = %h, "instantiated operator");
                state.remote = Some(h);
                state.dirty = state.bindings.keys().copied().collect();
                h
            }
        };

        // Upstream bindings are re-sent every time: the upstream instance
        // may have been replaced since the last evaluation.
        let pins: BTreeSet<u32> = state
            .dirty
            .iter()
            .copied()
            .chain(upstream_refs.keys().copied())
            .collect();
        for pin in pins {
            let input = match state.bindings.get(&pin) {
                Some(Binding::Value(v)) => SessionInput::Value(v.clone()),
                Some(Binding::Output(_)) => upstream_refs.get(&pin).cloned().ok_or_else(|| {
                    Error::transport(format!("{kind_name}: input pin {pin} rebound during evaluation"))
                })?,
                None => continue,
            };
            service.with_session(|s| s.bind_input(handle, pin, input))?;
        }
        state.dirty.clear();

        tracing::debug!(operator = kind_name, %handle, "evaluating operator");
        service.with_session(|s| s.evaluate(handle))
    }
}

/// Check a fetched value against the output pin's declared types.
fn resolve_output(
    operator: &str,
    pin: u32,
    spec: &PinSpecification,
    value: Value,
) -> Result<Value> {
    match value {
        Value::Entity(e) if e.semantic_type() == SemanticType::Any => {
            Ok(Value::Entity(e.retag(spec.primary_type())))
        }
        v if spec.accepts(v.semantic_type()) => Ok(v),
        v => Err(Error::UnexpectedOutput {
            operator: operator.to_string(),
            pin,
            name: spec.name.clone(),
            expected: spec.type_list(),
            actual: v.semantic_type().tag().to_string(),
        }),
    }
}

/// Input pins of an operator, addressed by name or index.
pub struct Inputs<'a> {
    op: &'a Operator,
}

impl<'a> Inputs<'a> {
    /// Lowest-index input pin with this name.
    pub fn pin(&self, name: &str) -> Result<Input<'a>> {
        let (index, _) = self.op.kind().input_pin_by_name(name)?;
        Ok(Input { op: self.op, index })
    }

    pub fn at(&self, index: u32) -> Result<Input<'a>> {
        self.op.kind().input_pin(index)?;
        Ok(Input { op: self.op, index })
    }

    pub fn iter(&self) -> impl Iterator<Item = Input<'a>> + 'a {
        let op = self.op;
        op.kind()
            .specification()
            .inputs()
            .keys()
            .map(move |&index| Input { op, index })
    }
}

/// Output pins of an operator, addressed by name or index.
pub struct Outputs<'a> {
    op: &'a Operator,
}

impl<'a> Outputs<'a> {
    pub fn pin(&self, name: &str) -> Result<Output<'a>> {
        let (index, _) = self.op.kind().output_pin_by_name(name)?;
        Ok(Output { op: self.op, index })
    }

    pub fn at(&self, index: u32) -> Result<Output<'a>> {
        self.op.kind().output_pin(index)?;
        Ok(Output { op: self.op, index })
    }

    pub fn iter(&self) -> impl Iterator<Item = Output<'a>> + 'a {
        let op = self.op;
        op.kind()
            .specification()
            .outputs()
            .keys()
            .map(move |&index| Output { op, index })
    }
}

/// One input pin of an operator.
#[derive(Clone, Copy)]
pub struct Input<'a> {
    op: &'a Operator,
    index: u32,
}

impl<'a> Input<'a> {
    pub(crate) fn new(op: &'a Operator, index: u32) -> Self {
        Self { op, index }
    }

    pub fn index(&self) -> u32 {
        self.index
    }

    pub fn spec(&self) -> Result<&'a PinSpecification> {
        self.op.kind().input_pin(self.index)
    }

    pub fn connect(&self, value: impl Into<Value>) -> Result<()> {
        self.op.connect(self.index, value)
    }

    pub fn connect_output(&self, output: &Output<'_>) -> Result<()> {
        self.op.connect_output(self.index, output.op, output.index)
    }

    pub fn disconnect(&self) -> Result<Option<Binding>> {
        self.op.disconnect(self.index)
    }

    pub fn binding(&self) -> Result<Option<Binding>> {
        self.op.binding(self.index)
    }
}

/// One output pin of an operator.
#[derive(Clone, Copy)]
pub struct Output<'a> {
    op: &'a Operator,
    index: u32,
}

impl<'a> Output<'a> {
    pub(crate) fn new(op: &'a Operator, index: u32) -> Self {
        Self { op, index }
    }

    pub fn index(&self) -> u32 {
        self.index
    }

    pub fn operator(&self) -> &'a Operator {
        self.op
    }

    pub fn spec(&self) -> Result<&'a PinSpecification> {
        self.op.kind().output_pin(self.index)
    }

    pub fn get(&self) -> Result<Value> {
        self.op.get_output(self.index)
    }
}
