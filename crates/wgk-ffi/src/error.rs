use std::cell::RefCell;
use std::ffi::CString;

use wgk_core::GpuError;

use crate::types::WGKStatus;

thread_local! {
    static LAST_ERROR: RefCell<Option<CString>> = const { RefCell::new(None) };
}

/// Store an error message for later retrieval via `wgk_last_error`.
pub fn set_last_error(msg: String) {
    LAST_ERROR.with(|e| {
        *e.borrow_mut() = CString::new(msg).ok();
    });
}

/// Take the last error message, leaving `None` in its place.
pub fn take_last_error() -> Option<CString> {
    LAST_ERROR.with(|e| e.borrow_mut().take())
}

/// Record `err` as the last error and map it to a status code.
pub fn fail(err: GpuError) -> WGKStatus {
    let status = WGKStatus::from(&err);
    tracing::debug!(?status, error = %err, "ffi call failed");
    set_last_error(err.to_string());
    status
}

pub fn invalid_argument(msg: &str) -> WGKStatus {
    set_last_error(msg.to_string());
    WGKStatus::ErrorInvalidArgument
}
