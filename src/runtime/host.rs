use std::sync::Arc;

use crate::runtime::error::{self, EvalError};

pub type ReadTextFn = dyn Fn(&str) -> Result<String, EvalError> + Send + Sync;
pub type QueryFn = dyn Fn(&str) -> Result<bool, EvalError> + Send + Sync;
pub type ListFn = dyn Fn(&str) -> Result<Vec<String>, EvalError> + Send + Sync;
pub type LogFn = dyn Fn(&str) + Send + Sync;

/// The host capability table.
///
/// Every capability is independently optional; a missing one degrades to
/// `CapabilityUnavailable` instead of failing like a host I/O error, so
/// scripts can tell "host forbids this" from "operation failed".
#[derive(Clone, Default)]
pub struct HostBridge {
    pub file_read_text: Option<Arc<ReadTextFn>>,
    pub file_exists: Option<Arc<QueryFn>>,
    pub is_file: Option<Arc<QueryFn>>,
    pub dir_list: Option<Arc<ListFn>>,
    pub log_line: Option<Arc<LogFn>>,
}

impl HostBridge {
    pub fn file_read_text(&self, path: &str) -> Result<String, EvalError> {
        match &self.file_read_text {
            Some(cb) => cb(path),
            None => Err(capability_unavailable("file")),
        }
    }

    pub fn file_exists(&self, path: &str) -> Result<bool, EvalError> {
        match &self.file_exists {
            Some(cb) => cb(path),
            None => Err(capability_unavailable("fileexists")),
        }
    }

    pub fn is_file(&self, path: &str) -> Result<bool, EvalError> {
        match &self.is_file {
            Some(cb) => cb(path),
            None => Err(capability_unavailable("isfile")),
        }
    }

    pub fn dir_list(&self, path: &str) -> Result<Vec<String>, EvalError> {
        match &self.dir_list {
            Some(cb) => cb(path),
            None => Err(capability_unavailable("dirlist")),
        }
    }

    /// Logging is fire-and-forget: host-side failures never reach the script.
    pub fn log_line(&self, text: &str) {
        if let Some(cb) = &self.log_line {
            cb(text);
        }
    }

    /// A bridge backed by the process filesystem, for the CLI and tests.
    pub fn std_fs() -> Self {
        const MAX_FILE_BYTES: u64 = 1_000_000;

        Self {
            file_read_text: Some(Arc::new(|path| {
                let meta = std::fs::metadata(path).map_err(|_| {
                    EvalError::host(
                        error::HOST_FILE_READ.code,
                        format!("file: '{path}' doesn't exist"),
                    )
                })?;
                if meta.len() > MAX_FILE_BYTES {
                    return Err(EvalError::host(
                        error::HOST_FILE_READ.code,
                        format!("file: '{path}' is too big"),
                    ));
                }
                std::fs::read_to_string(path).map_err(|e| {
                    EvalError::host(
                        error::HOST_FILE_READ.code,
                        format!("file: error reading '{path}': {e}"),
                    )
                })
            })),
            file_exists: Some(Arc::new(|path| Ok(std::path::Path::new(path).exists()))),
            is_file: Some(Arc::new(|path| Ok(std::path::Path::new(path).is_file()))),
            dir_list: Some(Arc::new(|path| {
                let p = std::path::Path::new(path);
                if !p.is_dir() {
                    return Err(EvalError::host(
                        error::HOST_DIR_LIST.code,
                        format!("dirlist: '{path}' is not a directory"),
                    ));
                }
                let entries = std::fs::read_dir(p).map_err(|e| {
                    EvalError::host(
                        error::HOST_DIR_LIST.code,
                        format!("dirlist: error listing '{path}': {e}"),
                    )
                })?;
                let mut out: Vec<String> = entries
                    .flatten()
                    .filter_map(|e| e.path().into_os_string().into_string().ok())
                    .collect();
                out.sort();
                Ok(out)
            })),
            log_line: None,
        }
    }
}

fn capability_unavailable(operation: &str) -> EvalError {
    EvalError::new(
        error::CAPABILITY_UNAVAILABLE,
        format!("{operation}: host capability not installed"),
    )
}
