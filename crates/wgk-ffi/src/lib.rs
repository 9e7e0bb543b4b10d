mod types;
mod error;
mod context;

pub use types::*;
pub use error::*;
pub use context::*;

use std::ffi::{CStr, CString};
use std::os::raw::{c_char, c_void};
use std::panic::AssertUnwindSafe;

use wgk_core::{create_shader, NumType, Shape, Tensor};

/// Execute a closure that returns a `WGKStatus`, catching any panics
/// and converting them into `WGKStatus::ErrorInternal`.
fn catch_panic<F: FnOnce() -> WGKStatus>(f: F) -> WGKStatus {
    match std::panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(status) => status,
        Err(_) => {
            set_last_error("internal panic".to_string());
            WGKStatus::ErrorInternal
        }
    }
}

/// View `len` elements at `ptr`. A zero length never dereferences `ptr`.
unsafe fn slice_arg<'a, T>(ptr: *const T, len: usize) -> Option<&'a [T]> {
    if len == 0 {
        Some(&[])
    } else if ptr.is_null() {
        None
    } else {
        Some(std::slice::from_raw_parts(ptr, len))
    }
}

unsafe fn shape_arg(dims: *const usize, rank: usize) -> Result<Shape, WGKStatus> {
    let dims = slice_arg(dims, rank).ok_or_else(|| invalid_argument("dims is null"))?;
    Shape::try_new(dims).map_err(fail)
}

/// Create a new GPU context configured from `WGK_*` environment variables.
///
/// On success, writes a heap-allocated `WGKContext` pointer into `*ctx_out`.
/// The caller must later call `wgk_context_destroy` to free the context.
#[no_mangle]
pub extern "C" fn wgk_context_create(ctx_out: *mut *mut WGKContext) -> WGKStatus {
    catch_panic(|| {
        if ctx_out.is_null() {
            return invalid_argument("ctx_out is null");
        }
        match WGKContext::from_env() {
            Ok(ctx) => {
                unsafe { *ctx_out = Box::into_raw(Box::new(ctx)) };
                WGKStatus::Ok
            }
            Err(e) => fail(e),
        }
    })
}

/// Destroy a context, releasing every tensor and kernel it still owns.
///
/// Passing a null pointer is a no-op and returns `WGKStatus::Ok`.
#[no_mangle]
pub unsafe extern "C" fn wgk_context_destroy(ctx: *mut WGKContext) -> WGKStatus {
    if ctx.is_null() {
        return WGKStatus::Ok;
    }
    catch_panic(|| {
        drop(Box::from_raw(ctx));
        WGKStatus::Ok
    })
}

/// Allocate a tensor of `rank` dimensions read from `dims`.
///
/// `dtype` is a precision code: 0 for f32, 1 for f16.
#[no_mangle]
pub unsafe extern "C" fn wgk_tensor_create(
    ctx: *mut WGKContext,
    dims: *const usize,
    rank: usize,
    dtype: u32,
    tensor_out: *mut WGKTensor,
) -> WGKStatus {
    catch_panic(|| {
        if ctx.is_null() || tensor_out.is_null() {
            return invalid_argument("null argument");
        }
        let ctx = unsafe { &mut *ctx };
        let shape = match unsafe { shape_arg(dims, rank) } {
            Ok(s) => s,
            Err(status) => return status,
        };
        let dtype = match NumType::try_from(dtype) {
            Ok(d) => d,
            Err(e) => return fail(e),
        };
        match ctx.inner.create_tensor(shape, dtype) {
            Ok(t) => {
                unsafe { *tensor_out = t.id().into() };
                WGKStatus::Ok
            }
            Err(e) => fail(e),
        }
    })
}

/// Free a tensor's buffer. Freeing an unknown tensor is a logged no-op.
#[no_mangle]
pub unsafe extern "C" fn wgk_tensor_free(ctx: *mut WGKContext, tensor: WGKTensor) -> WGKStatus {
    catch_panic(|| {
        if ctx.is_null() {
            return invalid_argument("ctx is null");
        }
        let ctx = unsafe { &mut *ctx };
        if let Ok(t) = ctx.tensor(tensor) {
            ctx.inner.free_tensor(&t);
        } else {
            tracing::warn!(index = tensor.index, generation = tensor.generation, "tensor is not live; nothing to free");
        }
        WGKStatus::Ok
    })
}

/// Upload `size` bytes from `data` into `tensor`. `size` must equal the
/// tensor's byte size.
#[no_mangle]
pub unsafe extern "C" fn wgk_to_gpu(
    ctx: *mut WGKContext,
    tensor: WGKTensor,
    data: *const c_void,
    size: usize,
) -> WGKStatus {
    catch_panic(|| {
        if ctx.is_null() {
            return invalid_argument("ctx is null");
        }
        let ctx = unsafe { &*ctx };
        let bytes = match unsafe { slice_arg(data as *const u8, size) } {
            Some(b) => b,
            None => return invalid_argument("data is null"),
        };
        match ctx
            .tensor(tensor)
            .and_then(|t| ctx.inner.to_gpu_bytes(bytes, &t))
        {
            Ok(()) => WGKStatus::Ok,
            Err(e) => fail(e),
        }
    })
}

/// Copy the first `size` bytes of `tensor` into `data`, blocking until the
/// readback completes.
#[no_mangle]
pub unsafe extern "C" fn wgk_to_cpu(
    ctx: *mut WGKContext,
    tensor: WGKTensor,
    data: *mut c_void,
    size: usize,
) -> WGKStatus {
    catch_panic(|| {
        if ctx.is_null() || (data.is_null() && size > 0) {
            return invalid_argument("null argument");
        }
        let ctx = unsafe { &*ctx };
        let out: &mut [u8] = if size == 0 {
            &mut []
        } else {
            unsafe { std::slice::from_raw_parts_mut(data as *mut u8, size) }
        };
        match ctx
            .tensor(tensor)
            .and_then(|t| ctx.inner.to_cpu_bytes(&t, out))
        {
            Ok(()) => WGKStatus::Ok,
            Err(e) => fail(e),
        }
    })
}

/// Compile a kernel from a WGSL template.
///
/// `workgroup_size` and `threads` each point to three values. `params` may be
/// null (or `params_size` zero) for kernels without a parameter block.
#[no_mangle]
#[allow(clippy::too_many_arguments)]
pub unsafe extern "C" fn wgk_kernel_create(
    ctx: *mut WGKContext,
    code: *const c_char,
    workgroup_size: *const usize,
    precision: u32,
    inputs: *const WGKTensor,
    num_inputs: usize,
    threads: *const usize,
    params: *const c_void,
    params_size: usize,
    kernel_out: *mut WGKKernel,
) -> WGKStatus {
    catch_panic(|| {
        if ctx.is_null() || code.is_null() || kernel_out.is_null() {
            return invalid_argument("null argument");
        }
        let ctx = unsafe { &mut *ctx };
        let template = match unsafe { CStr::from_ptr(code) }.to_str() {
            Ok(s) => s,
            Err(e) => return invalid_argument(&format!("invalid shader code: {}", e)),
        };
        let (workgroup_size, threads) =
            match unsafe { (shape_arg(workgroup_size, 3), shape_arg(threads, 3)) } {
                (Ok(w), Ok(t)) => (w, t),
                (Err(status), _) | (_, Err(status)) => return status,
            };
        let precision = match NumType::try_from(precision) {
            Ok(p) => p,
            Err(e) => return fail(e),
        };
        let handles = match unsafe { slice_arg(inputs, num_inputs) } {
            Some(h) => h,
            None => return invalid_argument("inputs is null"),
        };
        let params = if params.is_null() {
            None
        } else {
            unsafe { slice_arg(params as *const u8, params_size) }
        };

        let tensors: Vec<Tensor> = match handles.iter().map(|&h| ctx.tensor(h)).collect() {
            Ok(t) => t,
            Err(e) => return fail(e),
        };
        let bound: Vec<&Tensor> = tensors.iter().collect();
        let shader = create_shader(template, workgroup_size, precision);
        match ctx.inner.create_kernel(&shader, &bound, threads, params) {
            Ok(id) => {
                unsafe { *kernel_out = id.into() };
                WGKStatus::Ok
            }
            Err(e) => fail(e),
        }
    })
}

/// Submit a kernel and block until the GPU finishes it.
#[no_mangle]
pub unsafe extern "C" fn wgk_kernel_dispatch(ctx: *mut WGKContext, kernel: WGKKernel) -> WGKStatus {
    catch_panic(|| {
        if ctx.is_null() {
            return invalid_argument("ctx is null");
        }
        let ctx = unsafe { &mut *ctx };
        match ctx.inner.run_kernel(kernel.into()) {
            Ok(()) => WGKStatus::Ok,
            Err(e) => fail(e),
        }
    })
}

/// Re-encode a kernel's command buffer so it can be dispatched again.
#[no_mangle]
pub unsafe extern "C" fn wgk_kernel_reset(ctx: *mut WGKContext, kernel: WGKKernel) -> WGKStatus {
    catch_panic(|| {
        if ctx.is_null() {
            return invalid_argument("ctx is null");
        }
        let ctx = unsafe { &mut *ctx };
        match ctx.inner.reset_command_buffer(kernel.into()) {
            Ok(()) => WGKStatus::Ok,
            Err(e) => fail(e),
        }
    })
}

/// Retrieve the last error message.
///
/// Returns a pointer to a C string describing the most recent error, or
/// null if no error has occurred. The caller must free the returned string
/// with `wgk_free_string`.
#[no_mangle]
pub extern "C" fn wgk_last_error() -> *const c_char {
    match error::take_last_error() {
        Some(e) => e.into_raw(),
        None => std::ptr::null(),
    }
}

/// Free a string previously returned by `wgk_last_error`.
#[no_mangle]
pub unsafe extern "C" fn wgk_free_string(s: *mut c_char) {
    if !s.is_null() {
        drop(CString::from_raw(s));
    }
}
