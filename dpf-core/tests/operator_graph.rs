// MIT License
// Copyright 2023--present dpf-core developers

//! Operator graphs driven through the public API against the in-process
//! loopback session.

use std::collections::BTreeMap;
use std::sync::Arc;

use dpf_core::loopback::{CallLog, Kernel, KernelContext, LoopbackSession, SessionCall};
use dpf_core::operators::mesh::MeshProvider;
use dpf_core::operators::min_max::MinByComponent;
use dpf_core::{
    label_space, DataSources, Error, EvaluationState, Field, FieldsContainer, OperatorKind,
    PinSpecification, Scoping, SemanticType, Service, ServiceConfig, Specification,
    SpecificationRegistry, Value,
};

fn registry() -> SpecificationRegistry {
    let mut reg = SpecificationRegistry::builtin().unwrap();
    let source = Specification::builder("constant source")
        .input(0, PinSpecification::new("value", &[SemanticType::Int32]))
        .output(0, PinSpecification::new("value", &[SemanticType::Int32]))
        .build()
        .unwrap();
    reg.register(OperatorKind::new("source", "source", "test", source));
    let add = Specification::builder("integer addition")
        .input(0, PinSpecification::new("a", &[SemanticType::Int32]))
        .input(1, PinSpecification::new("b", &[SemanticType::Int32]))
        .output(0, PinSpecification::new("sum", &[SemanticType::Int32]))
        .build()
        .unwrap();
    reg.register(OperatorKind::new("add", "add", "test", add));
    reg
}

fn session() -> LoopbackSession {
    let mut s = LoopbackSession::new();
    s.register_kernel("source", |ctx| {
        let v = ctx.input(0).cloned().unwrap_or(Value::Int32(0));
        Ok(BTreeMap::from([(0, v)]))
    });
    s.register_kernel("add", |ctx| {
        let a = ctx.input(0).and_then(Value::as_i32).unwrap_or(0);
        let b = ctx.input(1).and_then(Value::as_i32).unwrap_or(0);
        Ok(BTreeMap::from([(0, Value::Int32(a + b))]))
    });
    s.register_kernel("MeshProvider", |ctx| {
        let mesh = ctx.new_entity(SemanticType::MeshedRegion);
        Ok(BTreeMap::from([(0, Value::Entity(mesh))]))
    });
    s
}

fn service() -> (Service, CallLog) {
    let s = session();
    let log = s.call_log();
    (Service::new(s, registry(), ServiceConfig::default()), log)
}

fn evaluations(log: &CallLog) -> Vec<String> {
    log.evaluations()
        .into_iter()
        .filter_map(|h| log.kind_of(h))
        .collect()
}

#[test]
fn mesh_provider_needs_data_sources() {
    let (svc, log) = service();
    let provider = MeshProvider::new(&svc).unwrap();

    let err = provider.outputs().mesh().get().unwrap_err();
    match err {
        Error::MissingRequiredInput { operator, pin, name } => {
            assert_eq!(operator, "MeshProvider");
            assert_eq!(pin, 4);
            assert_eq!(name, "data_sources");
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(log.calls().is_empty());

    provider
        .inputs()
        .data_sources()
        .connect(DataSources::new("/data/model.rst"))
        .unwrap();
    let mesh = provider.outputs().mesh().get().unwrap();
    assert_eq!(mesh.semantic_type(), SemanticType::MeshedRegion);
    assert_eq!(provider.operator().state(), EvaluationState::Evaluated);
}

#[test]
fn string_on_field_pin_is_refused_locally() {
    let (svc, log) = service();
    let min = MinByComponent::new(&svc).unwrap();
    let err = min.inputs().field_a1().connect("not a field").unwrap_err();
    match err {
        Error::TypeMismatch { pin, expected, actual, .. } => {
            assert_eq!(pin, 1);
            assert_eq!(expected, "field, fields_container");
            assert_eq!(actual, "string");
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(min.inputs().field_a1().binding().unwrap().is_none());
    assert!(log.calls().is_empty());

    let fc = FieldsContainer::new();
    min.inputs().field_a1().connect(fc).unwrap();
}

#[test]
fn upstream_evaluates_first_and_once() {
    let (svc, log) = service();
    let src = svc.operator("source").unwrap();
    src.connect(0, 4).unwrap();
    let left = svc.operator("add").unwrap();
    let right = svc.operator("add").unwrap();
    let top = svc.operator("add").unwrap();

    left.connect_output(0, &src, 0).unwrap();
    left.connect(1, 1).unwrap();
    right.connect_output(0, &src, 0).unwrap();
    right.connect(1, 2).unwrap();
    top.connect_output(0, &left, 0).unwrap();
    top.connect_output(1, &right, 0).unwrap();

    assert!(log.calls().is_empty());
    assert_eq!(top.get_output(0).unwrap(), Value::Int32(11));

    let order = evaluations(&log);
    assert_eq!(order, ["source", "add", "add", "add"]);
    assert_eq!(log.evaluations().last().copied(), top.remote_handle());

    // Nothing changed: the cached result is served.
    log.clear();
    assert_eq!(top.get_output(0).unwrap(), Value::Int32(11));
    assert!(log.evaluations().is_empty());
}

#[test]
fn rebinding_upstream_value_reevaluates_downstream() {
    let (svc, log) = service();
    let src = svc.operator("source").unwrap();
    src.connect(0, 1).unwrap();
    let add = svc.operator("add").unwrap();
    add.connect_output(0, &src, 0).unwrap();
    add.connect(1, 10).unwrap();
    assert_eq!(add.get_output(0).unwrap(), Value::Int32(11));

    log.clear();
    src.connect(0, 5).unwrap();
    assert_eq!(src.state(), EvaluationState::Unevaluated);
    assert_eq!(add.get_output(0).unwrap(), Value::Int32(15));
    assert_eq!(evaluations(&log), ["source", "add"]);

    // Only the rebound pin is pushed again.
    let src_handle = src.remote_handle();
    let binds = log.count(|c| {
        matches!(c, SessionCall::BindInput { handle, .. } if Some(*handle) == src_handle)
    });
    assert_eq!(binds, 1);
}

#[test]
fn cycle_is_detected_before_any_remote_call() {
    let (svc, log) = service();
    let a = svc.operator("add").unwrap();
    let b = svc.operator("add").unwrap();
    a.connect_output(0, &b, 0).unwrap();
    b.connect_output(0, &a, 0).unwrap();
    a.connect(1, 1).unwrap();
    b.connect(1, 1).unwrap();

    assert!(matches!(a.get_output(0), Err(Error::EvaluationCycle { .. })));
    assert!(log.calls().is_empty());

    // Break the cycle so both handles can be dropped.
    b.disconnect(0).unwrap();
    b.connect(0, 2).unwrap();
    assert_eq!(a.get_output(0).unwrap(), Value::Int32(4));
}

#[test]
fn output_pins_are_checked_on_connect() {
    let (svc, _log) = service();
    let provider = svc.operator("mesh_provider").unwrap();
    let add = svc.operator("add").unwrap();

    assert!(matches!(
        add.connect_output(0, &provider, 0),
        Err(Error::TypeMismatch { ref actual, .. }) if actual == "abstract_meshed_region"
    ));
    assert!(matches!(
        add.connect_output(0, &provider, 3),
        Err(Error::UnknownPin { pin: 3, .. })
    ));

    let other = Service::new(session(), registry(), ServiceConfig::default());
    let foreign = other.operator("source").unwrap();
    assert!(matches!(
        add.connect_output(0, &foreign, 0),
        Err(Error::ForeignOperator { .. })
    ));
}

#[test]
fn dropping_operators_releases_instances() {
    let (svc, log) = service();
    {
        let add = svc.operator("add").unwrap();
        add.connect(0, 1).unwrap();
        add.connect(1, 2).unwrap();
        add.evaluate().unwrap();
    }
    assert_eq!(log.count(|c| matches!(c, SessionCall::Release(_))), 1);
}

#[test]
fn fields_flow_between_operators() {
    let mut s = session();
    s.register_kernel("min_by_component", |ctx| {
        let fields: Vec<Field> = (1..=3)
            .filter_map(|pin| ctx.input(pin).and_then(Value::as_field).cloned())
            .collect();
        let first = fields
            .first()
            .ok_or_else(|| Error::InvalidData("no field".into()))?;
        let data = (0..first.data().len())
            .map(|i| fields.iter().map(|f| f.data()[i]).fold(f64::INFINITY, f64::min))
            .collect();
        let out = Field::new(first.n_components(), first.scoping().clone(), data)?;
        Ok(BTreeMap::from([(0, Value::Field(out))]))
    });
    let log = s.call_log();
    let svc = Service::new(s, registry(), ServiceConfig::default());

    let scoping = Scoping::nodal(vec![10, 20, 30]);
    let min = MinByComponent::new(&svc).unwrap();
    min.inputs().use_absolute_value().connect(false).unwrap();
    for (input, data) in [
        (min.inputs().field_a1(), vec![3.0, 1.0, 9.0]),
        (min.inputs().field_a2(), vec![2.0, 8.0, 7.0]),
        (min.inputs().field_b1(), vec![5.0, 5.0, 5.0]),
        (min.inputs().field_b2(), vec![4.0, 0.5, 6.0]),
    ] {
        input
            .connect(Field::scalar(scoping.clone(), data).unwrap())
            .unwrap();
    }
    // fieldB1 replaced fieldA2 on the shared pin 2.
    let out = min.outputs().field().get().unwrap();
    let field = out.as_field().unwrap();
    assert_eq!(field.data(), &[3.0, 0.5, 5.0]);
    assert_eq!(field.entity_data_by_id(30), Some(&[5.0][..]));

    let pushed: Vec<u32> = log
        .calls()
        .iter()
        .filter_map(|c| match c {
            SessionCall::BindInput { pin, .. } => Some(*pin),
            _ => None,
        })
        .collect();
    assert!(pushed.iter().all(|&pin| pin <= 3));
}

#[test]
fn fields_container_selection() {
    let mut fc = FieldsContainer::with_labels(["time"]);
    for step in 1..=3 {
        let f = Field::scalar(Scoping::nodal(vec![1]), vec![step as f64]).unwrap();
        fc.add_field(label_space([("time", step)]), f);
    }
    let second = fc.get_field(label_space([("time", 2)])).unwrap();
    assert_eq!(second.data(), &[2.0]);
    assert!(fc.get_field(label_space([("time", 9)])).is_err());
}

#[test]
fn plugin_from_disk_makes_kernels_available() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("libextra.so");
    std::fs::write(&path, b"\x7fELF").unwrap();

    let mut s = LoopbackSession::new();
    let kernel: Kernel = Arc::new(
        |_ctx: &mut KernelContext<'_>| -> dpf_core::Result<BTreeMap<u32, Value>> {
            Ok(BTreeMap::from([(0, Value::Int32(42))]))
        },
    );
    s.register_plugin("libextra.so", vec![("source".to_string(), kernel)]);
    let svc = Service::new(s, registry(), ServiceConfig::default());

    let src = svc.operator("source").unwrap();
    src.connect(0, 0).unwrap();
    assert!(src.get_output(0).is_err());

    let req = dpf_core::PluginRequest::new(path.to_str().unwrap(), "extra");
    svc.load_library(&req).unwrap();
    let src = svc.operator("source").unwrap();
    src.connect(0, 0).unwrap();
    assert_eq!(src.get_output(0).unwrap(), Value::Int32(42));
}
