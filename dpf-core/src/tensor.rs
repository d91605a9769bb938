// MIT License
// Copyright 2023--present dpf-core developers

//! DLPack tensors exchanged with C callers.
//!
//! Fields leave the crate as owning `f64` tensors of shape
//! `[n_entities, n_components]` and scopings as owning `i32` tensors of shape
//! `[n_entities]`. The tensor owns a copy of the data and frees it when its
//! deleter runs (`dpf_tensor_free`).
//!
//! Fields enter the crate from a caller-owned `f64` tensor, which is copied
//! and never retained.

use std::os::raw::c_void;

use dlpk::sys::{
    DLDataType, DLDataTypeCode, DLDevice, DLDeviceType, DLManagedTensorVersioned, DLPackVersion,
    DLTensor, DLPACK_FLAG_BITMASK_IS_COPIED,
};

use crate::data::{Field, Scoping};
use crate::error::{Error, Result};

fn compute_row_major_strides(shape: &[i64]) -> Vec<i64> {
    let ndim = shape.len();
    if ndim == 0 {
        return vec![];
    }
    let mut strides = vec![1i64; ndim];
    for i in (0..ndim - 1).rev() {
        strides[i] = strides[i + 1] * shape[i + 1];
    }
    strides
}

fn dtype_f64() -> DLDataType {
    DLDataType {
        code: DLDataTypeCode::kDLFloat,
        bits: 64,
        lanes: 1,
    }
}

fn dtype_i32() -> DLDataType {
    DLDataType {
        code: DLDataTypeCode::kDLInt,
        bits: 32,
        lanes: 1,
    }
}

fn cpu_device() -> DLDevice {
    DLDevice {
        device_type: DLDeviceType::kDLCPU,
        device_id: 0,
    }
}

fn dlpack_version() -> DLPackVersion {
    DLPackVersion { major: 1, minor: 0 }
}

enum TensorData {
    F64(Vec<f64>),
    I32(Vec<i32>),
}

impl TensorData {
    fn dtype(&self) -> DLDataType {
        match self {
            TensorData::F64(_) => dtype_f64(),
            TensorData::I32(_) => dtype_i32(),
        }
    }

    fn as_mut_ptr(&mut self) -> *mut c_void {
        match self {
            TensorData::F64(v) => v.as_mut_ptr().cast(),
            TensorData::I32(v) => v.as_mut_ptr().cast(),
        }
    }
}

/// Keeps data, shape and strides alive until the deleter runs.
struct OwnedTensorContext {
    _data: TensorData,
    shape: Vec<i64>,
    strides: Vec<i64>,
}

unsafe extern "C" fn owned_deleter(ptr: *mut DLManagedTensorVersioned) {
    if ptr.is_null() {
        return;
    }
    let ctx = unsafe { (*ptr).manager_ctx.cast::<OwnedTensorContext>() };
    if !ctx.is_null() {
        drop(unsafe { Box::from_raw(ctx) });
    }
    drop(unsafe { Box::from_raw(ptr) });
}

fn create_owned_tensor(mut data: TensorData, shape_vec: Vec<i64>) -> *mut DLManagedTensorVersioned {
    let ndim = shape_vec.len() as i32;
    let strides_vec = compute_row_major_strides(&shape_vec);
    let dtype = data.dtype();
    let data_ptr = data.as_mut_ptr();

    let mut ctx = Box::new(OwnedTensorContext {
        _data: data,
        shape: shape_vec,
        strides: strides_vec,
    });

    let dl_tensor = DLTensor {
        data: data_ptr,
        device: cpu_device(),
        ndim,
        dtype,
        shape: ctx.shape.as_mut_ptr(),
        strides: ctx.strides.as_mut_ptr(),
        byte_offset: 0,
    };

    let managed = Box::new(DLManagedTensorVersioned {
        version: dlpack_version(),
        manager_ctx: Box::into_raw(ctx).cast(),
        deleter: Some(owned_deleter),
        flags: DLPACK_FLAG_BITMASK_IS_COPIED,
        dl_tensor,
    });

    Box::into_raw(managed)
}

/// Export field data as `[n_entities, n_components]`.
pub(crate) fn field_to_tensor(field: &Field) -> *mut DLManagedTensorVersioned {
    let shape = vec![field.n_entities() as i64, field.n_components() as i64];
    create_owned_tensor(TensorData::F64(field.data().to_vec()), shape)
}

/// Export scoping ids as `[n_entities]`.
pub(crate) fn scoping_to_tensor(scoping: &Scoping) -> *mut DLManagedTensorVersioned {
    let shape = vec![scoping.len() as i64];
    create_owned_tensor(TensorData::I32(scoping.ids().to_vec()), shape)
}

/// Copy a caller-owned `f64` tensor into a field over `scoping`.
///
/// The tensor must be 1-D (one component) or 2-D `[n_entities,
/// n_components]`, row-major, with one row per scoping id.
///
/// # Safety
/// `tensor` must be null or point to a valid `DLManagedTensorVersioned` whose
/// data, shape and strides are readable.
pub(crate) unsafe fn field_from_tensor(
    tensor: *const DLManagedTensorVersioned,
    scoping: Scoping,
) -> Result<Field> {
    if tensor.is_null() {
        return Err(Error::InvalidData("field tensor is NULL".into()));
    }
    let t = unsafe { &(*tensor).dl_tensor };
    if t.dtype != dtype_f64() {
        return Err(Error::InvalidData(format!(
            "field tensor: expected f64, got {:?}",
            t.dtype
        )));
    }
    if t.ndim != 1 && t.ndim != 2 {
        return Err(Error::InvalidData(format!(
            "field tensor: expected ndim 1 or 2, got {}",
            t.ndim
        )));
    }
    if t.shape.is_null() {
        return Err(Error::InvalidData("field tensor: shape is NULL".into()));
    }
    let shape = unsafe { std::slice::from_raw_parts(t.shape, t.ndim as usize) };
    let dims = shape
        .iter()
        .map(|&d| usize::try_from(d))
        .collect::<std::result::Result<Vec<usize>, _>>()
        .map_err(|_| Error::InvalidData(format!("field tensor: negative shape {shape:?}")))?;
    if !t.strides.is_null() {
        let strides = unsafe { std::slice::from_raw_parts(t.strides, t.ndim as usize) };
        if strides != compute_row_major_strides(shape).as_slice() {
            return Err(Error::InvalidData(
                "field tensor: expected a contiguous row-major layout".into(),
            ));
        }
    }
    if dims[0] != scoping.len() {
        return Err(Error::InvalidData(format!(
            "field tensor: expected {} rows for the scoping, got {}",
            scoping.len(),
            dims[0]
        )));
    }
    let n_components = dims.get(1).copied().unwrap_or(1);
    // from_raw_parts requires the byte size to fit in isize.
    let len = dims[0]
        .checked_mul(n_components)
        .filter(|&n| {
            n.checked_mul(std::mem::size_of::<f64>())
                .is_some_and(|bytes| bytes <= isize::MAX as usize)
        })
        .ok_or_else(|| {
            Error::InvalidData(format!("field tensor: shape {shape:?} is too large"))
        })?;
    let data = if len == 0 {
        Vec::new()
    } else {
        if t.data.is_null() {
            return Err(Error::InvalidData("field tensor: data is NULL".into()));
        }
        let base = unsafe { t.data.cast::<u8>().add(t.byte_offset as usize) }.cast::<f64>();
        unsafe { std::slice::from_raw_parts(base, len) }.to_vec()
    };
    Field::new(n_components, scoping, data)
}

/// Free a DLPack tensor by invoking its deleter.
///
/// If `tensor` is `NULL`, this is a no-op.
///
/// # Safety
/// `tensor` must have been returned by a `dpf_*` function, or be a valid
/// `DLManagedTensorVersioned` with a deleter.
#[no_mangle]
pub unsafe extern "C" fn dpf_tensor_free(tensor: *mut DLManagedTensorVersioned) {
    if tensor.is_null() {
        return;
    }
    if let Some(deleter) = unsafe { (*tensor).deleter } {
        unsafe { deleter(tensor) };
    }
}

/// Get the raw data pointer of a DLPack tensor.
///
/// # Safety
/// `tensor` must be a valid, non-null `DLManagedTensorVersioned*`.
#[no_mangle]
pub unsafe extern "C" fn dpf_tensor_data(tensor: *const DLManagedTensorVersioned) -> *const c_void {
    unsafe { (*tensor).dl_tensor.data as *const c_void }
}

/// Number of dimensions of a DLPack tensor.
///
/// # Safety
/// `tensor` must be a valid, non-null `DLManagedTensorVersioned*`.
#[no_mangle]
pub unsafe extern "C" fn dpf_tensor_ndim(tensor: *const DLManagedTensorVersioned) -> i32 {
    unsafe { (*tensor).dl_tensor.ndim }
}

/// Get the shape array and number of dimensions of a DLPack tensor.
///
/// # Safety
/// Both `tensor` and `ndim_out` must be valid, non-null pointers.
#[no_mangle]
pub unsafe extern "C" fn dpf_tensor_shape(
    tensor: *const DLManagedTensorVersioned,
    ndim_out: *mut i32,
) -> *const i64 {
    let t = unsafe { &(*tensor) };
    unsafe { *ndim_out = t.dl_tensor.ndim };
    t.dl_tensor.shape as *const i64
}
