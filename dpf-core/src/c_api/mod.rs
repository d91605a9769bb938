// MIT License
// Copyright 2023--present dpf-core developers

//! Public C API entry points.
//!
//! Each submodule exposes `extern "C"` functions that cbindgen collects into
//! `include/dpf.h`. All functions in this module follow three invariants:
//!
//! 1. **Return [`dpf_status_t`](crate::status::dpf_status_t)**, or nothing
//!    for destructors. Constructors write the new handle to an out pointer.
//! 2. **Wrap the body in [`catch_unwind`](crate::status::catch_unwind)** to
//!    prevent panics from crossing the FFI boundary.
//! 3. **Validate pointer arguments** and record the error message before
//!    returning a non-success status.
//!
//! ## Submodules
//!
//! - [`service`]: connect to a server (feature `rpc`), load plugins, free.
//! - [`operator`]: create operators, bind inputs, read outputs, free.
//!
//! ## Usage from C
//!
//! ```c
//! dpf_service_t *svc = NULL;
//! dpf_operator_t *op = NULL;
//! if (dpf_service_connect("127.0.0.1", 50054, 5000, true, &svc) != DPF_SUCCESS ||
//!     dpf_operator_new(svc, "min_by_component", &op) != DPF_SUCCESS) {
//!     fprintf(stderr, "dpf error: %s\n", dpf_last_error());
//! }
//! // ... dpf_operator_connect_*, dpf_operator_get_output_field ...
//! dpf_operator_free(op);
//! dpf_service_free(svc);
//! ```

use std::ffi::CStr;
use std::os::raw::c_char;

use crate::status::{dpf_status_t, invalid_parameter};

pub mod operator;
pub mod service;

/// Borrow a NUL-terminated UTF-8 string from C.
///
/// # Safety
/// `ptr` must be null or point to a NUL-terminated string that outlives `'a`.
pub(crate) unsafe fn c_str<'a>(
    ptr: *const c_char,
    func: &str,
    what: &str,
) -> Result<&'a str, dpf_status_t> {
    if ptr.is_null() {
        return Err(invalid_parameter(&format!("{func}: {what} is NULL")));
    }
    unsafe { CStr::from_ptr(ptr) }
        .to_str()
        .map_err(|e| invalid_parameter(&format!("{func}: invalid {what} string: {e}")))
}

/// Reject a null pointer argument.
pub(crate) fn non_null<T>(ptr: *const T, func: &str, what: &str) -> Result<(), dpf_status_t> {
    if ptr.is_null() {
        Err(invalid_parameter(&format!("{func}: {what} is NULL")))
    } else {
        Ok(())
    }
}
