// MIT License
// Copyright 2023--present dpf-core developers

//! Conversions between crate values and their Cap'n Proto representation.
//!
//! Writers never fail: every [`Value`] has a wire form. Readers fail with a
//! `capnp::Error` when the message is malformed or carries an unknown type
//! tag, so both client and server can propagate them with `?` or `pry!`.

use std::path::PathBuf;
use std::str::FromStr;

use crate::collection::{Collection, FieldsContainer, LabelSpace, ScopingsContainer};
use crate::config::{ConfigValue, OperatorConfig};
use crate::data::{DataSources, EntityRef, Field, Scoping};
use crate::rpc::schema::{
    config_entry, data_sources, entity, field, fields_container, input, label_pair,
    plugin_request, scoping, scopings_container, value,
};
use crate::session::{PluginRequest, RemoteHandle, SessionInput};
use crate::types::{SemanticType, Value};

fn text(reader: capnp::text::Reader<'_>) -> capnp::Result<String> {
    reader
        .to_str()
        .map(str::to_string)
        .map_err(|e| capnp::Error::failed(format!("invalid UTF-8 in message: {e}")))
}

/// Length of a list about to be written; capnp lists hold at most
/// `u32::MAX` elements.
pub(crate) fn len(n: usize) -> capnp::Result<u32> {
    u32::try_from(n)
        .map_err(|_| capnp::Error::failed(format!("list of {n} elements is too long for a message")))
}

// --- writers ---

pub(crate) fn write_scoping(s: &Scoping, mut b: scoping::Builder<'_>) -> capnp::Result<()> {
    b.set_location(s.location());
    let mut ids = b.init_ids(len(s.len())?);
    for (i, &id) in (0..).zip(s.ids()) {
        ids.set(i, id);
    }
    Ok(())
}

pub(crate) fn write_field(f: &Field, mut b: field::Builder<'_>) -> capnp::Result<()> {
    b.set_n_components(len(f.n_components())?);
    write_scoping(f.scoping(), b.reborrow().init_scoping())?;
    {
        let mut data = b.reborrow().init_data(len(f.data().len())?);
        for (i, &v) in (0..).zip(f.data()) {
            data.set(i, v);
        }
    }
    if let Some(unit) = f.unit() {
        b.set_unit(unit);
    }
    Ok(())
}

fn write_labels(
    space: &LabelSpace,
    mut b: capnp::struct_list::Builder<'_, label_pair::Owned>,
) {
    for (i, (label, value)) in (0..).zip(space.iter()) {
        let mut pair = b.reborrow().get(i);
        pair.set_label(label.as_str());
        pair.set_value(*value);
    }
}

fn write_label_names(labels: &[String], mut b: capnp::text_list::Builder<'_>) {
    for (i, label) in (0..).zip(labels) {
        b.set(i, label.as_str());
    }
}

pub(crate) fn write_fields_container(
    c: &FieldsContainer,
    mut b: fields_container::Builder<'_>,
) -> capnp::Result<()> {
    write_label_names(c.labels(), b.reborrow().init_labels(len(c.labels().len())?));
    let mut entries = b.init_entries(len(c.len())?);
    for (i, (space, f)) in (0..).zip(c.iter()) {
        let mut entry = entries.reborrow().get(i);
        write_labels(space, entry.reborrow().init_labels(len(space.len())?));
        write_field(f, entry.init_field())?;
    }
    Ok(())
}

pub(crate) fn write_scopings_container(
    c: &ScopingsContainer,
    mut b: scopings_container::Builder<'_>,
) -> capnp::Result<()> {
    write_label_names(c.labels(), b.reborrow().init_labels(len(c.labels().len())?));
    let mut entries = b.init_entries(len(c.len())?);
    for (i, (space, s)) in (0..).zip(c.iter()) {
        let mut entry = entries.reborrow().get(i);
        write_labels(space, entry.reborrow().init_labels(len(space.len())?));
        write_scoping(s, entry.init_scoping())?;
    }
    Ok(())
}

pub(crate) fn write_data_sources(
    ds: &DataSources,
    mut b: data_sources::Builder<'_>,
) -> capnp::Result<()> {
    b.set_result_path(&*ds.result_path().to_string_lossy());
    if let Some(key) = ds.explicit_result_key() {
        b.set_result_key(key);
    }
    let extra = ds.additional_paths();
    let mut list = b.init_additional(len(extra.len())?);
    for (i, (key, path)) in (0..).zip(extra.iter()) {
        let mut named = list.reborrow().get(i);
        named.set_key(key.as_str());
        named.set_path(&*path.to_string_lossy());
    }
    Ok(())
}

fn write_entity(e: &EntityRef, mut b: entity::Builder<'_>) {
    b.set_type_tag(e.semantic_type().tag());
    b.set_id(e.id());
}

pub(crate) fn write_value(v: &Value, mut b: value::Builder<'_>) -> capnp::Result<()> {
    match v {
        Value::Bool(x) => b.set_flag(*x),
        Value::Int32(x) => b.set_int32(*x),
        Value::Double(x) => b.set_double(*x),
        Value::String(s) => b.set_text(s.as_str()),
        Value::VectorInt32(xs) => {
            let mut list = b.init_ints(len(xs.len())?);
            for (i, &x) in (0..).zip(xs) {
                list.set(i, x);
            }
        }
        Value::VectorDouble(xs) => {
            let mut list = b.init_doubles(len(xs.len())?);
            for (i, &x) in (0..).zip(xs) {
                list.set(i, x);
            }
        }
        Value::Field(f) => write_field(f, b.init_field())?,
        Value::FieldsContainer(c) => write_fields_container(c, b.init_fields_container())?,
        Value::Scoping(s) => write_scoping(s, b.init_scoping())?,
        Value::ScopingsContainer(c) => write_scopings_container(c, b.init_scopings_container())?,
        Value::DataSources(ds) => write_data_sources(ds, b.init_data_sources())?,
        Value::Entity(e) => write_entity(e, b.init_entity()),
    }
    Ok(())
}

pub(crate) fn write_input(input: &SessionInput, b: input::Builder<'_>) -> capnp::Result<()> {
    match input {
        SessionInput::Value(v) => write_value(v, b.init_value())?,
        SessionInput::Upstream { handle, pin } => {
            let mut r = b.init_upstream();
            r.set_handle(handle.0);
            r.set_pin(*pin);
        }
    }
    Ok(())
}

pub(crate) fn write_config(
    config: &OperatorConfig,
    mut b: capnp::struct_list::Builder<'_, config_entry::Owned>,
) -> capnp::Result<()> {
    for (i, (key, cv)) in (0..).zip(config.iter()) {
        let mut entry = b.reborrow().get(i);
        entry.set_key(key);
        write_value(&cv.to_value(), entry.init_value())?;
    }
    Ok(())
}

pub(crate) fn write_plugin_request(r: &PluginRequest, mut b: plugin_request::Builder<'_>) {
    b.set_path(r.path.as_str());
    b.set_name(r.name.as_str());
    b.set_symbol(r.symbol.as_str());
}

// --- readers ---

pub(crate) fn read_scoping(r: scoping::Reader<'_>) -> capnp::Result<Scoping> {
    let location = text(r.get_location()?)?;
    let ids = r.get_ids()?.iter().collect();
    Ok(Scoping::new(location, ids))
}

pub(crate) fn read_field(r: field::Reader<'_>) -> capnp::Result<Field> {
    let scoping = read_scoping(r.get_scoping()?)?;
    let data = r.get_data()?.iter().collect();
    let f = Field::new(r.get_n_components() as usize, scoping, data)
        .map_err(|e| capnp::Error::failed(e.to_string()))?;
    if r.has_unit() {
        Ok(f.with_unit(text(r.get_unit()?)?))
    } else {
        Ok(f)
    }
}

fn read_labels(
    list: capnp::struct_list::Reader<'_, label_pair::Owned>,
) -> capnp::Result<LabelSpace> {
    let mut space = LabelSpace::new();
    for pair in list.iter() {
        space.insert(text(pair.get_label()?)?, pair.get_value());
    }
    Ok(space)
}

fn read_label_names<T>(list: capnp::text_list::Reader<'_>) -> capnp::Result<Collection<T>> {
    let mut names = Vec::with_capacity(list.len() as usize);
    for label in list.iter() {
        names.push(text(label?)?);
    }
    Ok(Collection::with_labels(names))
}

pub(crate) fn read_fields_container(
    r: fields_container::Reader<'_>,
) -> capnp::Result<FieldsContainer> {
    let mut c = read_label_names(r.get_labels()?)?;
    for entry in r.get_entries()?.iter() {
        c.add_entry(read_labels(entry.get_labels()?)?, read_field(entry.get_field()?)?);
    }
    Ok(c)
}

pub(crate) fn read_scopings_container(
    r: scopings_container::Reader<'_>,
) -> capnp::Result<ScopingsContainer> {
    let mut c = read_label_names(r.get_labels()?)?;
    for entry in r.get_entries()?.iter() {
        c.add_entry(read_labels(entry.get_labels()?)?, read_scoping(entry.get_scoping()?)?);
    }
    Ok(c)
}

pub(crate) fn read_data_sources(r: data_sources::Reader<'_>) -> capnp::Result<DataSources> {
    let mut ds = DataSources::new(PathBuf::from(text(r.get_result_path()?)?));
    if r.has_result_key() {
        ds = ds.with_result_key(text(r.get_result_key()?)?);
    }
    for named in r.get_additional()?.iter() {
        ds.add_file_path(text(named.get_key()?)?, PathBuf::from(text(named.get_path()?)?));
    }
    Ok(ds)
}

pub(crate) fn read_type(tag: &str) -> capnp::Result<SemanticType> {
    SemanticType::from_str(tag).map_err(|e| capnp::Error::failed(e.to_string()))
}

fn read_entity(r: entity::Reader<'_>) -> capnp::Result<EntityRef> {
    let ty = read_type(&text(r.get_type_tag()?)?)?;
    Ok(EntityRef::new(ty, r.get_id()))
}

pub(crate) fn read_value(r: value::Reader<'_>) -> capnp::Result<Value> {
    Ok(match r.which()? {
        value::Flag(x) => Value::Bool(x),
        value::Int32(x) => Value::Int32(x),
        value::Double(x) => Value::Double(x),
        value::Text(t) => Value::String(text(t?)?),
        value::Ints(xs) => Value::VectorInt32(xs?.iter().collect()),
        value::Doubles(xs) => Value::VectorDouble(xs?.iter().collect()),
        value::Field(f) => Value::Field(read_field(f?)?),
        value::FieldsContainer(c) => Value::FieldsContainer(read_fields_container(c?)?),
        value::Scoping(s) => Value::Scoping(read_scoping(s?)?),
        value::ScopingsContainer(c) => Value::ScopingsContainer(read_scopings_container(c?)?),
        value::DataSources(ds) => Value::DataSources(read_data_sources(ds?)?),
        value::Entity(e) => Value::Entity(read_entity(e?)?),
    })
}

pub(crate) fn read_input(r: input::Reader<'_>) -> capnp::Result<SessionInput> {
    Ok(match r.which()? {
        input::Value(v) => SessionInput::Value(read_value(v?)?),
        input::Upstream(o) => {
            let o = o?;
            SessionInput::Upstream {
                handle: RemoteHandle(o.get_handle()),
                pin: o.get_pin(),
            }
        }
    })
}

pub(crate) fn read_config(
    list: capnp::struct_list::Reader<'_, config_entry::Owned>,
) -> capnp::Result<OperatorConfig> {
    let mut config = OperatorConfig::new();
    for entry in list.iter() {
        let key = text(entry.get_key()?)?;
        let v = read_value(entry.get_value()?)?;
        let cv = ConfigValue::from_value(&v).ok_or_else(|| {
            capnp::Error::failed(format!(
                "config option \"{key}\" has non-scalar type {}",
                v.semantic_type()
            ))
        })?;
        config.set(&key, cv);
    }
    Ok(config)
}

pub(crate) fn read_plugin_request(r: plugin_request::Reader<'_>) -> capnp::Result<PluginRequest> {
    let path = text(r.get_path()?)?;
    let name = text(r.get_name()?)?;
    let symbol = text(r.get_symbol()?)?;
    Ok(PluginRequest::new(&path, &name).with_symbol(&symbol))
}
