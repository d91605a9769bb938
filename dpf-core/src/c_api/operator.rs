// MIT License
// Copyright 2023--present dpf-core developers

//! C API for operator handles.
//!
//! Inputs are bound with the `dpf_operator_connect_*` family and outputs
//! are read with `dpf_operator_get_output_*`, which evaluate the operator
//! and its upstream operators on demand. Fields cross the boundary as
//! DLPack tensors:
//!
//! ```c
//! DLManagedTensorVersioned *field = NULL;
//! if (dpf_operator_get_output_field(op, 0, &field) == DPF_SUCCESS) {
//!     int32_t ndim;
//!     const int64_t *shape = dpf_tensor_shape(field, &ndim);
//!     const double *data = dpf_tensor_data(field);
//!     // ...
//!     dpf_tensor_free(field);
//! }
//! ```

use std::ffi::CString;
use std::os::raw::c_char;

use dlpk::sys::DLManagedTensorVersioned;

use crate::c_api::service::dpf_service_t;
use crate::c_api::{c_str, non_null};
use crate::data::Scoping;
use crate::error::Result;
use crate::operator::Operator;
use crate::status::{catch_unwind, dpf_status_t, invalid_parameter, report};
use crate::tensor::{field_from_tensor, field_to_tensor};
use crate::types::Value;

/// Opaque operator handle.
pub type dpf_operator_t = Operator;

fn finish<T>(result: Result<T>, then: impl FnOnce(T)) -> dpf_status_t {
    match result {
        Ok(v) => {
            then(v);
            dpf_status_t::DPF_SUCCESS
        }
        Err(e) => report(&e),
    }
}

/// Bind `value` after checking the operator pointer.
unsafe fn connect_value(
    op: *const dpf_operator_t,
    pin: u32,
    value: Value,
    func: &str,
) -> dpf_status_t {
    if let Err(s) = non_null(op, func, "op") {
        return s;
    }
    finish(unsafe { &*op }.connect(pin, value), |_| ())
}

/// Create an operator of the given kind or scripting name.
///
/// On success `*out` receives a handle to free with `dpf_operator_free`.
#[no_mangle]
pub unsafe extern "C" fn dpf_operator_new(
    service: *const dpf_service_t,
    name: *const c_char,
    out: *mut *mut dpf_operator_t,
) -> dpf_status_t {
    catch_unwind(std::panic::AssertUnwindSafe(|| {
        const FUNC: &str = "dpf_operator_new";
        if let Err(s) = non_null(service, FUNC, "service").and_then(|_| non_null(out, FUNC, "out")) {
            return s;
        }
        let name = match unsafe { c_str(name, FUNC, "name") } {
            Ok(n) => n,
            Err(s) => return s,
        };
        finish(unsafe { &*service }.operator(name), |op| unsafe {
            *out = Box::into_raw(Box::new(op));
        })
    }))
}

#[no_mangle]
pub unsafe extern "C" fn dpf_operator_connect_int32(
    op: *const dpf_operator_t,
    pin: u32,
    value: i32,
) -> dpf_status_t {
    catch_unwind(std::panic::AssertUnwindSafe(|| unsafe {
        connect_value(op, pin, Value::Int32(value), "dpf_operator_connect_int32")
    }))
}

#[no_mangle]
pub unsafe extern "C" fn dpf_operator_connect_double(
    op: *const dpf_operator_t,
    pin: u32,
    value: f64,
) -> dpf_status_t {
    catch_unwind(std::panic::AssertUnwindSafe(|| unsafe {
        connect_value(op, pin, Value::Double(value), "dpf_operator_connect_double")
    }))
}

#[no_mangle]
pub unsafe extern "C" fn dpf_operator_connect_bool(
    op: *const dpf_operator_t,
    pin: u32,
    value: bool,
) -> dpf_status_t {
    catch_unwind(std::panic::AssertUnwindSafe(|| unsafe {
        connect_value(op, pin, Value::Bool(value), "dpf_operator_connect_bool")
    }))
}

#[no_mangle]
pub unsafe extern "C" fn dpf_operator_connect_string(
    op: *const dpf_operator_t,
    pin: u32,
    value: *const c_char,
) -> dpf_status_t {
    catch_unwind(std::panic::AssertUnwindSafe(|| {
        const FUNC: &str = "dpf_operator_connect_string";
        match unsafe { c_str(value, FUNC, "value") } {
            Ok(v) => unsafe { connect_value(op, pin, Value::from(v), FUNC) },
            Err(s) => s,
        }
    }))
}

/// Bind a field built from a `[n_ids, n_components]` f64 tensor (or a 1-D
/// tensor for scalar fields) and the entity ids of its rows. `location` may
/// be `NULL` for a nodal field. Data and ids are copied.
#[no_mangle]
pub unsafe extern "C" fn dpf_operator_connect_field(
    op: *const dpf_operator_t,
    pin: u32,
    tensor: *const DLManagedTensorVersioned,
    ids: *const i32,
    n_ids: usize,
    location: *const c_char,
) -> dpf_status_t {
    catch_unwind(std::panic::AssertUnwindSafe(|| {
        const FUNC: &str = "dpf_operator_connect_field";
        if ids.is_null() && n_ids > 0 {
            return invalid_parameter(&format!("{FUNC}: ids is NULL"));
        }
        let location = if location.is_null() {
            crate::data::locations::NODAL
        } else {
            match unsafe { c_str(location, FUNC, "location") } {
                Ok(l) => l,
                Err(s) => return s,
            }
        };
        let ids = if n_ids == 0 {
            Vec::new()
        } else {
            unsafe { std::slice::from_raw_parts(ids, n_ids) }.to_vec()
        };
        match unsafe { field_from_tensor(tensor, Scoping::new(location, ids)) } {
            Ok(field) => unsafe { connect_value(op, pin, Value::Field(field), FUNC) },
            Err(e) => report(&e),
        }
    }))
}

/// Bind output pin `source_pin` of `upstream` to input pin `pin` of `op`.
#[no_mangle]
pub unsafe extern "C" fn dpf_operator_connect_output(
    op: *const dpf_operator_t,
    pin: u32,
    upstream: *const dpf_operator_t,
    source_pin: u32,
) -> dpf_status_t {
    catch_unwind(std::panic::AssertUnwindSafe(|| {
        const FUNC: &str = "dpf_operator_connect_output";
        if let Err(s) = non_null(op, FUNC, "op").and_then(|_| non_null(upstream, FUNC, "upstream")) {
            return s;
        }
        let (op, upstream) = unsafe { (&*op, &*upstream) };
        finish(op.connect_output(pin, upstream, source_pin), |_| ())
    }))
}

/// Evaluate `op` if needed and read output `pin`, converting it with `extract`.
unsafe fn get_output<T>(
    op: *const dpf_operator_t,
    pin: u32,
    out: *mut T,
    func: &str,
    expected: &str,
    extract: impl FnOnce(&Value) -> Option<T>,
) -> dpf_status_t {
    if let Err(s) = non_null(op, func, "op").and_then(|_| non_null(out, func, "out")) {
        return s;
    }
    let value = match unsafe { &*op }.get_output(pin) {
        Ok(v) => v,
        Err(e) => return report(&e),
    };
    match extract(&value) {
        Some(v) => {
            unsafe { *out = v };
            dpf_status_t::DPF_SUCCESS
        }
        None => {
            crate::status::set_last_error(&format!(
                "{func}: output pin {pin} holds {}, not {expected}",
                value.semantic_type()
            ));
            dpf_status_t::DPF_TYPE_MISMATCH
        }
    }
}

#[no_mangle]
pub unsafe extern "C" fn dpf_operator_get_output_int32(
    op: *const dpf_operator_t,
    pin: u32,
    out: *mut i32,
) -> dpf_status_t {
    catch_unwind(std::panic::AssertUnwindSafe(|| unsafe {
        get_output(op, pin, out, "dpf_operator_get_output_int32", "int32", Value::as_i32)
    }))
}

#[no_mangle]
pub unsafe extern "C" fn dpf_operator_get_output_double(
    op: *const dpf_operator_t,
    pin: u32,
    out: *mut f64,
) -> dpf_status_t {
    catch_unwind(std::panic::AssertUnwindSafe(|| unsafe {
        get_output(op, pin, out, "dpf_operator_get_output_double", "double", Value::as_f64)
    }))
}

#[no_mangle]
pub unsafe extern "C" fn dpf_operator_get_output_bool(
    op: *const dpf_operator_t,
    pin: u32,
    out: *mut bool,
) -> dpf_status_t {
    catch_unwind(std::panic::AssertUnwindSafe(|| unsafe {
        get_output(op, pin, out, "dpf_operator_get_output_bool", "bool", Value::as_bool)
    }))
}

/// Read a string output. `*out` receives a copy to free with
/// `dpf_string_free`.
#[no_mangle]
pub unsafe extern "C" fn dpf_operator_get_output_string(
    op: *const dpf_operator_t,
    pin: u32,
    out: *mut *mut c_char,
) -> dpf_status_t {
    catch_unwind(std::panic::AssertUnwindSafe(|| unsafe {
        get_output(op, pin, out, "dpf_operator_get_output_string", "string", |v| {
            v.as_str()
                .map(|s| CString::new(s.replace('\0', " ")).unwrap_or_default().into_raw())
        })
    }))
}

/// Read a field output as an owning DLPack tensor of shape
/// `[n_entities, n_components]`. Free it with `dpf_tensor_free`.
#[no_mangle]
pub unsafe extern "C" fn dpf_operator_get_output_field(
    op: *const dpf_operator_t,
    pin: u32,
    out: *mut *mut DLManagedTensorVersioned,
) -> dpf_status_t {
    catch_unwind(std::panic::AssertUnwindSafe(|| unsafe {
        get_output(op, pin, out, "dpf_operator_get_output_field", "field", |v| {
            v.as_field().map(field_to_tensor)
        })
    }))
}

/// Read the scoping of a field output as an owning `i32` DLPack tensor of
/// entity ids. Free it with `dpf_tensor_free`.
#[no_mangle]
pub unsafe extern "C" fn dpf_operator_get_output_field_ids(
    op: *const dpf_operator_t,
    pin: u32,
    out: *mut *mut DLManagedTensorVersioned,
) -> dpf_status_t {
    catch_unwind(std::panic::AssertUnwindSafe(|| unsafe {
        get_output(op, pin, out, "dpf_operator_get_output_field_ids", "field", |v| {
            v.as_field()
                .map(|f| crate::tensor::scoping_to_tensor(f.scoping()))
        })
    }))
}

/// Free a string returned by `dpf_operator_get_output_string`.
///
/// If `s` is `NULL`, this is a no-op.
#[no_mangle]
pub unsafe extern "C" fn dpf_string_free(s: *mut c_char) {
    if !s.is_null() {
        drop(unsafe { CString::from_raw(s) });
    }
}

/// Free an operator handle. The remote instance is released once no other
/// operator reads from it.
///
/// If `op` is `NULL`, this is a no-op.
#[no_mangle]
pub unsafe extern "C" fn dpf_operator_free(op: *mut dpf_operator_t) {
    if !op.is_null() {
        drop(unsafe { Box::from_raw(op) });
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::ffi::{CStr, CString};

    use super::*;
    use crate::c_api::service::dpf_service_free;
    use crate::config::ServiceConfig;
    use crate::data::Field;
    use crate::loopback::LoopbackSession;
    use crate::registry::SpecificationRegistry;
    use crate::service::Service;
    use crate::tensor::{dpf_tensor_free, dpf_tensor_shape};

    fn service_handle() -> *mut dpf_service_t {
        let mut session = LoopbackSession::new();
        session.register_kernel("Are_fields_included", |ctx| {
            let a = ctx.input(0).and_then(Value::as_field).cloned();
            let b = ctx.input(1).and_then(Value::as_field).cloned();
            let included = a == b;
            Ok(BTreeMap::from([
                (0, Value::Bool(included)),
                (1, Value::from(if included { "same" } else { "differs" })),
            ]))
        });
        session.register_kernel("min_by_component", |ctx| {
            let a = ctx.input(1).and_then(Value::as_field).cloned();
            match a {
                Some(f) => Ok(BTreeMap::from([(0, Value::Field(f))])),
                None => Err(crate::Error::InvalidData("fieldA1 missing".into())),
            }
        });
        let service = Service::new(
            session,
            SpecificationRegistry::builtin().unwrap(),
            ServiceConfig::default(),
        );
        Box::into_raw(Box::new(service))
    }

    fn new_op(svc: *const dpf_service_t, name: &str) -> *mut dpf_operator_t {
        let name = CString::new(name).unwrap();
        let mut op = std::ptr::null_mut();
        let status = unsafe { dpf_operator_new(svc, name.as_ptr(), &mut op) };
        assert_eq!(status, dpf_status_t::DPF_SUCCESS);
        op
    }

    fn last_error() -> String {
        unsafe { CStr::from_ptr(crate::status::dpf_last_error()) }
            .to_string_lossy()
            .into_owned()
    }

    #[test]
    fn new_unknown_kind_fails() {
        let svc = service_handle();
        let name = CString::new("no_such_operator").unwrap();
        let mut op = std::ptr::null_mut();
        let status = unsafe { dpf_operator_new(svc, name.as_ptr(), &mut op) };
        assert_eq!(status, dpf_status_t::DPF_UNKNOWN_PIN);
        assert!(op.is_null());
        assert!(last_error().contains("no_such_operator"));
        unsafe { dpf_service_free(svc) };
    }

    #[test]
    fn null_arguments_are_rejected() {
        let mut out = 0;
        let status = unsafe { dpf_operator_get_output_int32(std::ptr::null(), 0, &mut out) };
        assert_eq!(status, dpf_status_t::DPF_INVALID_PARAMETER);
        let status = unsafe { dpf_operator_connect_string(std::ptr::null(), 0, std::ptr::null()) };
        assert_eq!(status, dpf_status_t::DPF_INVALID_PARAMETER);
    }

    #[test]
    fn connect_and_read_scalar_outputs() {
        let svc = service_handle();
        let op = new_op(svc, "included_fields");

        let status = unsafe { dpf_operator_connect_int32(op, 2, 1) };
        assert_eq!(status, dpf_status_t::DPF_TYPE_MISMATCH);
        assert!(last_error().contains("double_value"));

        let mut data = [1.0, 2.0];
        let mut shape = [2i64];
        let tensor = DLManagedTensorVersioned {
            version: dlpk::sys::DLPackVersion { major: 1, minor: 0 },
            manager_ctx: std::ptr::null_mut(),
            deleter: None,
            flags: 0,
            dl_tensor: dlpk::sys::DLTensor {
                data: data.as_mut_ptr().cast(),
                device: dlpk::sys::DLDevice {
                    device_type: dlpk::sys::DLDeviceType::kDLCPU,
                    device_id: 0,
                },
                ndim: 1,
                dtype: dlpk::sys::DLDataType {
                    code: dlpk::sys::DLDataTypeCode::kDLFloat,
                    bits: 64,
                    lanes: 1,
                },
                shape: shape.as_mut_ptr(),
                strides: std::ptr::null_mut(),
                byte_offset: 0,
            },
        };
        let ids = [3, 4];
        for pin in [0, 1] {
            let status = unsafe {
                dpf_operator_connect_field(op, pin, &tensor, ids.as_ptr(), 2, std::ptr::null())
            };
            assert_eq!(status, dpf_status_t::DPF_SUCCESS);
        }

        let mut included = false;
        let status = unsafe { dpf_operator_get_output_bool(op, 0, &mut included) };
        assert_eq!(status, dpf_status_t::DPF_MISSING_INPUT);

        assert_eq!(
            unsafe { dpf_operator_connect_double(op, 2, 1e-14) },
            dpf_status_t::DPF_SUCCESS
        );
        let status = unsafe { dpf_operator_get_output_bool(op, 0, &mut included) };
        assert_eq!(status, dpf_status_t::DPF_SUCCESS);
        assert!(included);

        let mut message = std::ptr::null_mut();
        let status = unsafe { dpf_operator_get_output_string(op, 1, &mut message) };
        assert_eq!(status, dpf_status_t::DPF_SUCCESS);
        assert_eq!(unsafe { CStr::from_ptr(message) }.to_str().unwrap(), "same");
        unsafe { dpf_string_free(message) };

        let mut wrong = 0.0;
        let status = unsafe { dpf_operator_get_output_double(op, 0, &mut wrong) };
        assert_eq!(status, dpf_status_t::DPF_TYPE_MISMATCH);

        unsafe {
            dpf_operator_free(op);
            dpf_service_free(svc);
        }
    }

    #[test]
    fn negative_tensor_shape_is_invalid_data() {
        let svc = service_handle();
        let op = new_op(svc, "included_fields");

        let mut data = [1.0, 2.0];
        let mut shape = [2i64, -1];
        let tensor = DLManagedTensorVersioned {
            version: dlpk::sys::DLPackVersion { major: 1, minor: 0 },
            manager_ctx: std::ptr::null_mut(),
            deleter: None,
            flags: 0,
            dl_tensor: dlpk::sys::DLTensor {
                data: data.as_mut_ptr().cast(),
                device: dlpk::sys::DLDevice {
                    device_type: dlpk::sys::DLDeviceType::kDLCPU,
                    device_id: 0,
                },
                ndim: 2,
                dtype: dlpk::sys::DLDataType {
                    code: dlpk::sys::DLDataTypeCode::kDLFloat,
                    bits: 64,
                    lanes: 1,
                },
                shape: shape.as_mut_ptr(),
                strides: std::ptr::null_mut(),
                byte_offset: 0,
            },
        };
        let ids = [1, 2];
        let status = unsafe {
            dpf_operator_connect_field(op, 0, &tensor, ids.as_ptr(), 2, std::ptr::null())
        };
        assert_eq!(status, dpf_status_t::DPF_INVALID_DATA);
        assert!(last_error().contains("negative shape"));
        assert!(unsafe { &*op }.binding(0).unwrap().is_none());

        unsafe {
            dpf_operator_free(op);
            dpf_service_free(svc);
        }
    }

    #[test]
    fn field_output_through_forwarding() {
        let svc = service_handle();
        let source = new_op(svc, "min_by_component");
        let sink = new_op(svc, "min_by_component");

        let field = Field::new(2, Scoping::nodal(vec![1, 2, 3]), vec![0.0; 6]).unwrap();
        unsafe { &*source }.connect(1, field).unwrap();
        for pin in [2, 3] {
            unsafe { &*source }.connect(pin, Field::scalar(Scoping::nodal(vec![1]), vec![0.0]).unwrap()).unwrap();
            unsafe { &*sink }.connect(pin, Field::scalar(Scoping::nodal(vec![1]), vec![0.0]).unwrap()).unwrap();
        }
        assert_eq!(unsafe { dpf_operator_connect_bool(source, 0, false) }, dpf_status_t::DPF_SUCCESS);
        assert_eq!(unsafe { dpf_operator_connect_bool(sink, 0, false) }, dpf_status_t::DPF_SUCCESS);
        let status = unsafe { dpf_operator_connect_output(sink, 1, source, 0) };
        assert_eq!(status, dpf_status_t::DPF_SUCCESS);

        let mut tensor = std::ptr::null_mut();
        let status = unsafe { dpf_operator_get_output_field(sink, 0, &mut tensor) };
        assert_eq!(status, dpf_status_t::DPF_SUCCESS);
        let mut ndim = 0;
        let shape = unsafe { std::slice::from_raw_parts(dpf_tensor_shape(tensor, &mut ndim), 2) };
        assert_eq!(ndim, 2);
        assert_eq!(shape, &[3, 2]);
        unsafe { dpf_tensor_free(tensor) };

        let mut ids = std::ptr::null_mut();
        let status = unsafe { dpf_operator_get_output_field_ids(sink, 0, &mut ids) };
        assert_eq!(status, dpf_status_t::DPF_SUCCESS);
        unsafe { dpf_tensor_free(ids) };

        unsafe {
            dpf_operator_free(source);
            dpf_operator_free(sink);
            dpf_service_free(svc);
        }
    }

    #[test]
    fn free_null_is_noop() {
        unsafe {
            dpf_operator_free(std::ptr::null_mut());
            dpf_string_free(std::ptr::null_mut());
        }
    }
}
