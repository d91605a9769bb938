// MIT License
// Copyright 2023--present dpf-core developers

//! C API for the service handle: connect, load plugins, free.

use std::os::raw::c_char;

use crate::c_api::{c_str, non_null};
use crate::service::Service;
use crate::session::PluginRequest;
use crate::status::{catch_unwind, dpf_status_t, report};

/// Opaque service handle.
pub type dpf_service_t = Service;

/// Connect to a DPF server at `host:port`, waiting at most `timeout_ms` for
/// it to answer.
///
/// When `load_default_plugins` is true the MAPDL and mesh operator libraries
/// are loaded; a library that fails to load is logged and skipped.
/// On success `*out` receives a handle to free with `dpf_service_free`.
#[cfg(feature = "rpc")]
#[no_mangle]
pub unsafe extern "C" fn dpf_service_connect(
    host: *const c_char,
    port: u16,
    timeout_ms: u64,
    load_default_plugins: bool,
    out: *mut *mut dpf_service_t,
) -> dpf_status_t {
    catch_unwind(std::panic::AssertUnwindSafe(|| {
        const FUNC: &str = "dpf_service_connect";
        let host = match unsafe { c_str(host, FUNC, "host") } {
            Ok(h) => h,
            Err(s) => return s,
        };
        if let Err(s) = non_null(out, FUNC, "out") {
            return s;
        }
        let config = crate::config::ServiceConfig {
            host: host.to_string(),
            port,
            connect_timeout_ms: timeout_ms,
            load_default_plugins,
            ..Default::default()
        };
        match Service::connect(config) {
            Ok((service, _outcomes)) => {
                unsafe { *out = Box::into_raw(Box::new(service)) };
                dpf_status_t::DPF_SUCCESS
            }
            Err(e) => report(&e),
        }
    }))
}

/// Load an operator plugin library on the server.
///
/// `symbol` may be `NULL` to use the default entry point `LoadOperators`.
#[no_mangle]
pub unsafe extern "C" fn dpf_service_load_library(
    service: *const dpf_service_t,
    path: *const c_char,
    name: *const c_char,
    symbol: *const c_char,
) -> dpf_status_t {
    catch_unwind(std::panic::AssertUnwindSafe(|| {
        const FUNC: &str = "dpf_service_load_library";
        if let Err(s) = non_null(service, FUNC, "service") {
            return s;
        }
        let parsed = unsafe { c_str(path, FUNC, "path") }
            .and_then(|p| Ok((p, unsafe { c_str(name, FUNC, "name") }?)));
        let (path, name) = match parsed {
            Ok(v) => v,
            Err(s) => return s,
        };
        let mut request = PluginRequest::new(path, name);
        if !symbol.is_null() {
            match unsafe { c_str(symbol, FUNC, "symbol") } {
                Ok(sym) => request = request.with_symbol(sym),
                Err(s) => return s,
            }
        }
        match unsafe { &*service }.load_library(&request) {
            Ok(()) => dpf_status_t::DPF_SUCCESS,
            Err(e) => report(&e),
        }
    }))
}

/// Free a service handle. Operators created from it stay usable.
///
/// If `service` is `NULL`, this is a no-op.
#[no_mangle]
pub unsafe extern "C" fn dpf_service_free(service: *mut dpf_service_t) {
    if !service.is_null() {
        drop(unsafe { Box::from_raw(service) });
    }
}
