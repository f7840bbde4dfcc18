//! C ABI entry points for embedding the FuncScript core.
//!
//! Every operation returns an integer status: `0` success, `1` failure with
//! the error record populated, `2` required out-parameter was null. Outputs
//! are written only on success. Strings returned through out-parameters are
//! owned by the caller and released with [`fs_free_string`]; error messages
//! are released with [`fs_error_free`].

use std::ffi::{CStr, CString};
use std::os::raw::{c_char, c_void};
use std::sync::Arc;

use crate::runtime::error::{self, ErrorCode, EvalError};
use crate::runtime::host::HostBridge;
use crate::runtime::store::Handle;
use crate::runtime::vm::Vm;

/// Opaque VM instance behind the boundary.
pub struct FsVm {
    inner: Vm,
}

#[repr(C)]
#[derive(Clone, Copy)]
pub struct FsValue {
    pub id: u64,
}

#[repr(C)]
pub struct FsErrorC {
    pub code: u32,
    pub line: i32,
    pub column: i32,
    pub message: *mut c_char,
}

pub type FsHostWriteFn = Option<extern "C" fn(ctx: *mut c_void, bytes: *const u8, len: u64)>;

pub type FsStreamCallback = extern "C" fn(
    user_data: *mut c_void,
    path: *const c_char,
    out_ctx: *mut c_void,
    out_write: FsHostWriteFn,
    out_error: *mut FsErrorC,
) -> i32;

pub type FsQueryCallback = extern "C" fn(
    user_data: *mut c_void,
    path: *const c_char,
    out_flag: *mut i32,
    out_error: *mut FsErrorC,
) -> i32;

/// The host capability table. Every member is individually nilable; unset
/// capabilities degrade to `CapabilityUnavailable` instead of being called.
#[repr(C)]
#[derive(Clone, Copy)]
pub struct FsHostCallbacksC {
    pub user_data: *mut c_void,
    pub file_read_text: Option<FsStreamCallback>,
    pub file_exists: Option<FsQueryCallback>,
    pub is_file: Option<FsQueryCallback>,
    pub dir_list: Option<FsStreamCallback>,
    pub log_line: Option<extern "C" fn(user_data: *mut c_void, text: *const c_char)>,
}

impl Default for FsHostCallbacksC {
    fn default() -> Self {
        Self {
            user_data: std::ptr::null_mut(),
            file_read_text: None,
            file_exists: None,
            is_file: None,
            dir_list: None,
            log_line: None,
        }
    }
}

#[unsafe(no_mangle)]
pub static FS_CORE_ABI_VERSION: u32 = 3;

#[unsafe(no_mangle)]
pub static FS_VALUE_NIL: u32 = 1;
#[unsafe(no_mangle)]
pub static FS_VALUE_BOOL: u32 = 2;
#[unsafe(no_mangle)]
pub static FS_VALUE_NUMBER: u32 = 3;
#[unsafe(no_mangle)]
pub static FS_VALUE_STRING: u32 = 4;
#[unsafe(no_mangle)]
pub static FS_VALUE_LIST: u32 = 5;
#[unsafe(no_mangle)]
pub static FS_VALUE_KVC: u32 = 6;
#[unsafe(no_mangle)]
pub static FS_VALUE_RANGE: u32 = 7;
#[unsafe(no_mangle)]
pub static FS_VALUE_FUNCTION: u32 = 8;
#[unsafe(no_mangle)]
pub static FS_VALUE_NATIVE: u32 = 9;
#[unsafe(no_mangle)]
pub static FS_VALUE_ERROR: u32 = 10;
#[unsafe(no_mangle)]
pub static FS_VALUE_INT: u32 = 11;
#[unsafe(no_mangle)]
pub static FS_VALUE_BIGINT: u32 = 12;
#[unsafe(no_mangle)]
pub static FS_VALUE_BYTES: u32 = 13;
#[unsafe(no_mangle)]
pub static FS_VALUE_GUID: u32 = 14;
#[unsafe(no_mangle)]
pub static FS_VALUE_DATETIME: u32 = 15;

#[unsafe(no_mangle)]
pub extern "C" fn fs_vm_new() -> *mut FsVm {
    Box::into_raw(Box::new(FsVm { inner: Vm::new() }))
}

#[unsafe(no_mangle)]
pub extern "C" fn fs_vm_free(vm: *mut FsVm) {
    if vm.is_null() {
        return;
    }
    unsafe {
        drop(Box::from_raw(vm));
    }
}

#[unsafe(no_mangle)]
pub extern "C" fn fs_vm_set_host_callbacks(
    vm: *mut FsVm,
    callbacks: *const FsHostCallbacksC,
) -> i32 {
    if vm.is_null() {
        return 1;
    }
    let table = if callbacks.is_null() {
        FsHostCallbacksC::default()
    } else {
        unsafe { *callbacks }
    };
    let vm = unsafe { &mut *vm };
    vm.inner.set_host_bridge(build_host_bridge(table));
    0
}

#[unsafe(no_mangle)]
pub extern "C" fn fs_vm_eval(
    vm: *mut FsVm,
    source: *const c_char,
    out_json: *mut *mut c_char,
    out_error: *mut FsErrorC,
) -> i32 {
    if out_json.is_null() || out_error.is_null() {
        return 2;
    }
    unsafe {
        *out_json = std::ptr::null_mut();
    }
    reset_out_error(out_error);

    let Some(vm) = (unsafe { checked_vm(vm, out_error) }) else {
        return 1;
    };
    let Some(source) = read_source(source, out_error) else {
        return 1;
    };

    match vm.inner.eval_to_json(&source) {
        Ok(json) => {
            unsafe {
                *out_json = into_c_string(json);
            }
            0
        }
        Err(err) => {
            set_error(out_error, &err);
            1
        }
    }
}

#[unsafe(no_mangle)]
pub extern "C" fn fs_vm_eval_value(
    vm: *mut FsVm,
    source: *const c_char,
    out_value: *mut FsValue,
    out_error: *mut FsErrorC,
) -> i32 {
    if out_value.is_null() || out_error.is_null() {
        return 2;
    }
    unsafe {
        (*out_value).id = 0;
    }
    reset_out_error(out_error);

    let Some(vm) = (unsafe { checked_vm(vm, out_error) }) else {
        return 1;
    };
    let Some(source) = read_source(source, out_error) else {
        return 1;
    };

    match vm.inner.eval_to_handle(&source) {
        Ok(handle) => {
            unsafe {
                (*out_value).id = handle.0;
            }
            0
        }
        Err(err) => {
            set_error(out_error, &err);
            1
        }
    }
}

#[unsafe(no_mangle)]
pub extern "C" fn fs_vm_value_free(vm: *mut FsVm, value: FsValue) -> i32 {
    if vm.is_null() {
        return 1;
    }
    let vm = unsafe { &mut *vm };
    match vm.inner.free_value(Handle(value.id)) {
        Ok(()) => 0,
        Err(_) => 2,
    }
}

/// Returns the value's type tag, or 0 for a null VM or invalid handle.
#[unsafe(no_mangle)]
pub extern "C" fn fs_vm_value_type(vm: *mut FsVm, value: FsValue) -> u32 {
    if vm.is_null() {
        return 0;
    }
    let vm = unsafe { &*vm };
    match vm.inner.value_type(Handle(value.id)) {
        Ok(tag) => tag.as_u32(),
        Err(_) => 0,
    }
}

#[unsafe(no_mangle)]
pub extern "C" fn fs_vm_value_to_json(
    vm: *mut FsVm,
    value: FsValue,
    out_json: *mut *mut c_char,
    out_error: *mut FsErrorC,
) -> i32 {
    if out_json.is_null() || out_error.is_null() {
        return 2;
    }
    unsafe {
        *out_json = std::ptr::null_mut();
    }
    reset_out_error(out_error);

    let Some(vm) = (unsafe { checked_vm(vm, out_error) }) else {
        return 1;
    };
    match vm.inner.value_to_json(Handle(value.id)) {
        Ok(json) => {
            unsafe {
                *out_json = into_c_string(json);
            }
            0
        }
        Err(err) => {
            set_error(out_error, &err);
            1
        }
    }
}

#[unsafe(no_mangle)]
pub extern "C" fn fs_vm_value_len(
    vm: *mut FsVm,
    value: FsValue,
    out_len: *mut u64,
    out_error: *mut FsErrorC,
) -> i32 {
    if out_len.is_null() || out_error.is_null() {
        return 2;
    }
    unsafe {
        *out_len = 0;
    }
    reset_out_error(out_error);

    let Some(vm) = (unsafe { checked_vm(vm, out_error) }) else {
        return 1;
    };
    match vm.inner.value_len(Handle(value.id)) {
        Ok(len) => {
            unsafe {
                *out_len = len;
            }
            0
        }
        Err(err) => {
            set_error(out_error, &err);
            1
        }
    }
}

#[unsafe(no_mangle)]
pub extern "C" fn fs_vm_value_index(
    vm: *mut FsVm,
    receiver: FsValue,
    index: i64,
    out_value: *mut FsValue,
    out_error: *mut FsErrorC,
) -> i32 {
    if out_value.is_null() || out_error.is_null() {
        return 2;
    }
    unsafe {
        (*out_value).id = 0;
    }
    reset_out_error(out_error);

    let Some(vm) = (unsafe { checked_vm(vm, out_error) }) else {
        return 1;
    };
    match vm.inner.value_index(Handle(receiver.id), index) {
        Ok(handle) => {
            unsafe {
                (*out_value).id = handle.0;
            }
            0
        }
        Err(err) => {
            set_error(out_error, &err);
            1
        }
    }
}

#[unsafe(no_mangle)]
pub extern "C" fn fs_vm_value_get_key(
    vm: *mut FsVm,
    receiver: FsValue,
    key: *const c_char,
    out_value: *mut FsValue,
    out_error: *mut FsErrorC,
) -> i32 {
    if out_value.is_null() || out_error.is_null() {
        return 2;
    }
    unsafe {
        (*out_value).id = 0;
    }
    reset_out_error(out_error);

    let Some(vm) = (unsafe { checked_vm(vm, out_error) }) else {
        return 1;
    };
    if key.is_null() {
        set_error(out_error, &EvalError::new(error::KEY_NULL, "key is null"));
        return 1;
    }
    let key = match unsafe { CStr::from_ptr(key) }.to_str() {
        Ok(s) => s,
        Err(_) => {
            set_error(
                out_error,
                &EvalError::new(error::KEY_NOT_UTF8, "key is not valid UTF-8"),
            );
            return 1;
        }
    };

    match vm.inner.value_get_key(Handle(receiver.id), key) {
        Ok(handle) => {
            unsafe {
                (*out_value).id = handle.0;
            }
            0
        }
        Err(err) => {
            set_error(out_error, &err);
            1
        }
    }
}

#[unsafe(no_mangle)]
pub extern "C" fn fs_vm_value_keys_json(
    vm: *mut FsVm,
    receiver: FsValue,
    out_json: *mut *mut c_char,
    out_error: *mut FsErrorC,
) -> i32 {
    if out_json.is_null() || out_error.is_null() {
        return 2;
    }
    unsafe {
        *out_json = std::ptr::null_mut();
    }
    reset_out_error(out_error);

    let Some(vm) = (unsafe { checked_vm(vm, out_error) }) else {
        return 1;
    };
    match vm.inner.value_keys_json(Handle(receiver.id)) {
        Ok(json) => {
            unsafe {
                *out_json = into_c_string(json);
            }
            0
        }
        Err(err) => {
            set_error(out_error, &err);
            1
        }
    }
}

#[unsafe(no_mangle)]
pub extern "C" fn fs_vm_value_range_info(
    vm: *mut FsVm,
    value: FsValue,
    out_start: *mut i64,
    out_count: *mut u64,
    out_error: *mut FsErrorC,
) -> i32 {
    if out_start.is_null() || out_count.is_null() || out_error.is_null() {
        return 2;
    }
    unsafe {
        *out_start = 0;
        *out_count = 0;
    }
    reset_out_error(out_error);

    let Some(vm) = (unsafe { checked_vm(vm, out_error) }) else {
        return 1;
    };
    match vm.inner.value_range_info(Handle(value.id)) {
        Ok((start, count)) => {
            unsafe {
                *out_start = start;
                *out_count = count;
            }
            0
        }
        Err(err) => {
            set_error(out_error, &err);
            1
        }
    }
}

#[unsafe(no_mangle)]
pub extern "C" fn fs_vm_value_call(
    vm: *mut FsVm,
    callee: FsValue,
    argc: u64,
    argv: *const FsValue,
    out_value: *mut FsValue,
    out_error: *mut FsErrorC,
) -> i32 {
    if out_value.is_null() || out_error.is_null() {
        return 2;
    }
    unsafe {
        (*out_value).id = 0;
    }
    reset_out_error(out_error);

    let Some(vm) = (unsafe { checked_vm(vm, out_error) }) else {
        return 1;
    };
    if argc > 0 && argv.is_null() {
        set_error(out_error, &EvalError::new(error::ARGV_NULL, "argv is null"));
        return 1;
    }

    let args: Vec<Handle> = if argc == 0 {
        Vec::new()
    } else {
        unsafe { std::slice::from_raw_parts(argv, argc as usize) }
            .iter()
            .map(|v| Handle(v.id))
            .collect()
    };

    match vm.inner.value_call(Handle(callee.id), &args) {
        Ok(handle) => {
            unsafe {
                (*out_value).id = handle.0;
            }
            0
        }
        Err(err) => {
            set_error(out_error, &err);
            1
        }
    }
}

/// Zero-instance convenience: evaluate with a private VM and return the
/// `{"ok":..,"value":..,"error":..}` envelope. Null source yields null.
#[unsafe(no_mangle)]
pub extern "C" fn fs_eval_json(source: *const c_char) -> *mut c_char {
    if source.is_null() {
        return std::ptr::null_mut();
    }
    let source = unsafe { CStr::from_ptr(source) }.to_string_lossy();
    into_c_string(Vm::eval_json_envelope(&source))
}

#[unsafe(no_mangle)]
pub extern "C" fn fs_free_string(ptr: *mut c_char) {
    if ptr.is_null() {
        return;
    }
    unsafe {
        let _ = CString::from_raw(ptr);
    }
}

#[unsafe(no_mangle)]
pub extern "C" fn fs_error_free(err: *mut FsErrorC) {
    if err.is_null() {
        return;
    }
    unsafe {
        if !(*err).message.is_null() {
            fs_free_string((*err).message);
            (*err).message = std::ptr::null_mut();
        }
    }
}

// Internal plumbing.

/// # Safety
/// `vm` must be null or a pointer previously returned by [`fs_vm_new`].
unsafe fn checked_vm<'a>(vm: *mut FsVm, out_error: *mut FsErrorC) -> Option<&'a mut FsVm> {
    if vm.is_null() {
        set_error(out_error, &EvalError::new(error::VM_NULL, "vm is null"));
        return None;
    }
    Some(unsafe { &mut *vm })
}

fn read_source(source: *const c_char, out_error: *mut FsErrorC) -> Option<String> {
    if source.is_null() {
        set_error(
            out_error,
            &EvalError::new(error::SOURCE_NULL, "source is null"),
        );
        return None;
    }
    match unsafe { CStr::from_ptr(source) }.to_str() {
        Ok(s) => Some(s.to_string()),
        Err(_) => {
            set_error(
                out_error,
                &EvalError::new(error::SOURCE_NOT_UTF8, "source is not valid UTF-8"),
            );
            None
        }
    }
}

fn reset_out_error(out_error: *mut FsErrorC) {
    unsafe {
        (*out_error).code = 0;
        (*out_error).line = 0;
        (*out_error).column = 0;
        (*out_error).message = std::ptr::null_mut();
    }
}

fn set_error(out_error: *mut FsErrorC, err: &EvalError) {
    let sanitized = err.message.replace('\0', " ");
    let message = CString::new(sanitized).unwrap_or_default();
    unsafe {
        (*out_error).code = err.code;
        (*out_error).line = err.line;
        (*out_error).column = err.column;
        (*out_error).message = message.into_raw();
    }
}

fn into_c_string(text: String) -> *mut c_char {
    let sanitized = text.replace('\0', " ");
    CString::new(sanitized).unwrap_or_default().into_raw()
}

/// Byte sink handed to streaming host callbacks; appends to a Rust buffer.
extern "C" fn write_to_buffer(ctx: *mut c_void, bytes: *const u8, len: u64) {
    if ctx.is_null() || bytes.is_null() || len == 0 {
        return;
    }
    unsafe {
        let buffer = &mut *(ctx as *mut Vec<u8>);
        buffer.extend_from_slice(std::slice::from_raw_parts(bytes, len as usize));
    }
}

/// Normalize a host-reported failure. A nonzero status with an empty error
/// record becomes `UnknownHostFailure`; otherwise the host's code/message
/// pass through verbatim with capability-specific fallbacks.
fn host_error(err: &FsErrorC, fallback: ErrorCode, operation: &str) -> EvalError {
    if err.code == 0 && err.message.is_null() {
        return EvalError::new(
            error::UNKNOWN_HOST_FAILURE,
            format!("{operation}: host reported failure without detail"),
        );
    }
    let message = if err.message.is_null() {
        format!("{operation}: host error")
    } else {
        unsafe { CStr::from_ptr(err.message) }
            .to_string_lossy()
            .into_owned()
    };
    EvalError {
        code: if err.code == 0 { fallback.code } else { err.code },
        line: if err.line == 0 { -1 } else { err.line },
        column: if err.column == 0 { -1 } else { err.column },
        message,
    }
}

fn empty_error_record() -> FsErrorC {
    FsErrorC {
        code: 0,
        line: 0,
        column: 0,
        message: std::ptr::null_mut(),
    }
}

fn path_to_c(path: &str, fallback: ErrorCode, operation: &str) -> Result<CString, EvalError> {
    CString::new(path).map_err(|_| {
        EvalError::new(fallback, format!("{operation}: path contains a NUL byte"))
    })
}

fn stream_capability(
    cb: FsStreamCallback,
    user_data: usize,
    fallback: ErrorCode,
    operation: &str,
    path: &str,
) -> Result<String, EvalError> {
    let c_path = path_to_c(path, fallback, operation)?;
    let mut buffer: Vec<u8> = Vec::new();
    let mut err = empty_error_record();
    let rc = cb(
        user_data as *mut c_void,
        c_path.as_ptr(),
        (&mut buffer as *mut Vec<u8>) as *mut c_void,
        Some(write_to_buffer),
        &mut err as *mut FsErrorC,
    );
    if rc != 0 {
        return Err(host_error(&err, fallback, operation));
    }
    String::from_utf8(buffer).map_err(|_| {
        EvalError::new(fallback, format!("{operation}: host returned invalid UTF-8"))
    })
}

fn query_capability(
    cb: FsQueryCallback,
    user_data: usize,
    fallback: ErrorCode,
    operation: &str,
    path: &str,
) -> Result<bool, EvalError> {
    let c_path = path_to_c(path, fallback, operation)?;
    let mut flag: i32 = 0;
    let mut err = empty_error_record();
    let rc = cb(
        user_data as *mut c_void,
        c_path.as_ptr(),
        &mut flag as *mut i32,
        &mut err as *mut FsErrorC,
    );
    if rc != 0 {
        return Err(host_error(&err, fallback, operation));
    }
    Ok(flag != 0)
}

/// Wrap the C capability table as the runtime's [`HostBridge`]. The opaque
/// `user_data` pointer travels as `usize` through the closures.
fn build_host_bridge(table: FsHostCallbacksC) -> HostBridge {
    let user_data = table.user_data as usize;

    HostBridge {
        file_read_text: table.file_read_text.map(|cb| {
            Arc::new(move |path: &str| {
                stream_capability(cb, user_data, error::HOST_FILE_READ, "file", path)
            }) as Arc<crate::runtime::host::ReadTextFn>
        }),
        file_exists: table.file_exists.map(|cb| {
            Arc::new(move |path: &str| {
                query_capability(cb, user_data, error::HOST_FILE_EXISTS, "fileexists", path)
            }) as Arc<crate::runtime::host::QueryFn>
        }),
        is_file: table.is_file.map(|cb| {
            Arc::new(move |path: &str| {
                query_capability(cb, user_data, error::HOST_IS_FILE, "isfile", path)
            }) as Arc<crate::runtime::host::QueryFn>
        }),
        dir_list: table.dir_list.map(|cb| {
            Arc::new(move |path: &str| {
                let listing =
                    stream_capability(cb, user_data, error::HOST_DIR_LIST, "dirlist", path)?;
                // Newline-separated entries over the byte sink.
                Ok(listing
                    .split('\n')
                    .filter(|line| !line.is_empty())
                    .map(|line| line.to_string())
                    .collect::<Vec<String>>())
            }) as Arc<crate::runtime::host::ListFn>
        }),
        log_line: table.log_line.map(|cb| {
            Arc::new(move |text: &str| {
                if let Ok(c_text) = CString::new(text) {
                    cb(user_data as *mut c_void, c_text.as_ptr());
                }
            }) as Arc<crate::runtime::host::LogFn>
        }),
    }
}
