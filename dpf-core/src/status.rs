// MIT License
// Copyright 2023--present dpf-core developers

//! Status codes and error reporting for the C API.
//!
//! Every `extern "C"` function returns a [`dpf_status_t`]. `DPF_SUCCESS` (0)
//! means the call succeeded; any other value names the error category of the
//! [`crate::Error`] that caused the failure. The display message of that
//! error is kept in a thread-local slot and read with [`dpf_last_error()`];
//! the pointer stays valid until the next `dpf_*` call on the same thread.
//!
//! Panics are caught with [`catch_unwind`] before they can unwind across the
//! FFI boundary and are reported as `DPF_INTERNAL_ERROR`.
//!
//! ## Usage from C
//!
//! ```c
//! dpf_status_t s = dpf_operator_get_output_int32(op, 0, &value);
//! if (s != DPF_SUCCESS) {
//!     fprintf(stderr, "dpf error: %s\n", dpf_last_error());
//! }
//! ```

use std::cell::RefCell;
use std::ffi::CString;
use std::os::raw::c_char;

use crate::error::Error;

/// Status codes returned by all C API functions.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum dpf_status_t {
    DPF_SUCCESS = 0,
    /// Null pointer, invalid UTF-8 or a value the callee cannot represent.
    DPF_INVALID_PARAMETER = 1,
    /// A Rust panic was caught.
    DPF_INTERNAL_ERROR = 2,
    /// Transport or remote failure.
    DPF_TRANSPORT_ERROR = 3,
    /// The server did not become ready in time.
    DPF_CONNECTION_ERROR = 4,
    DPF_TYPE_MISMATCH = 5,
    DPF_MISSING_INPUT = 6,
    /// Unknown pin index or name, or unknown operator kind.
    DPF_UNKNOWN_PIN = 7,
    DPF_PLUGIN_ERROR = 8,
    DPF_CYCLE_ERROR = 9,
    /// Configuration, I/O or data validation failure.
    DPF_INVALID_DATA = 10,
}

impl From<&Error> for dpf_status_t {
    fn from(e: &Error) -> Self {
        match e {
            Error::Connection { .. } => dpf_status_t::DPF_CONNECTION_ERROR,
            Error::MissingPluginFile(_) | Error::PluginLoad { .. } => {
                dpf_status_t::DPF_PLUGIN_ERROR
            }
            Error::TypeMismatch { .. }
            | Error::UnexpectedOutput { .. }
            | Error::ForeignOperator { .. } => dpf_status_t::DPF_TYPE_MISMATCH,
            Error::MissingRequiredInput { .. } => dpf_status_t::DPF_MISSING_INPUT,
            Error::EvaluationCycle { .. } => dpf_status_t::DPF_CYCLE_ERROR,
            Error::UnknownPin { .. }
            | Error::UnknownPinName { .. }
            | Error::UnknownOperator(_)
            | Error::UnknownType(_) => dpf_status_t::DPF_UNKNOWN_PIN,
            Error::DuplicatePin { .. }
            | Error::InvalidData(_)
            | Error::Config(_)
            | Error::Io(_)
            | Error::Toml(_) => dpf_status_t::DPF_INVALID_DATA,
            Error::Transport(_) => dpf_status_t::DPF_TRANSPORT_ERROR,
        }
    }
}

thread_local! {
    static LAST_ERROR: RefCell<CString> = RefCell::new(CString::default());
}

/// Store an error message in the thread-local slot.
pub(crate) fn set_last_error(msg: &str) {
    LAST_ERROR.with(|cell| {
        let c = CString::new(msg.replace('\0', " ")).unwrap_or_default();
        *cell.borrow_mut() = c;
    });
}

/// Record `e` as the last error and return its status code.
pub(crate) fn report(e: &Error) -> dpf_status_t {
    set_last_error(&e.to_string());
    dpf_status_t::from(e)
}

/// Record an invalid-parameter failure.
pub(crate) fn invalid_parameter(msg: &str) -> dpf_status_t {
    set_last_error(msg);
    dpf_status_t::DPF_INVALID_PARAMETER
}

/// Retrieve a pointer to the last error message for the current thread.
///
/// # Safety
/// This is intended to be called from C. The returned pointer must not
/// be freed by the caller.
#[no_mangle]
pub unsafe extern "C" fn dpf_last_error() -> *const c_char {
    LAST_ERROR.with(|cell| cell.borrow().as_ptr())
}

/// Execute a closure, catching any panics and converting them to status codes.
pub(crate) fn catch_unwind<F>(f: F) -> dpf_status_t
where
    F: FnOnce() -> dpf_status_t + std::panic::UnwindSafe,
{
    match std::panic::catch_unwind(f) {
        Ok(status) => status,
        Err(e) => {
            let msg = if let Some(s) = e.downcast_ref::<&str>() {
                s.to_string()
            } else if let Some(s) = e.downcast_ref::<String>() {
                s.clone()
            } else {
                "unknown panic".to_string()
            };
            set_last_error(&msg);
            dpf_status_t::DPF_INTERNAL_ERROR
        }
    }
}
