use std::fmt;

use crate::diagnostics::position::Position;

/// A stable entry of the error-code registry.
///
/// Codes are part of the embedding contract and must not be renumbered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ErrorCode {
    pub code: u32,
    pub name: &'static str,
}

pub const PARSE_ERROR: ErrorCode = ErrorCode {
    code: 1000,
    name: "ParseError",
};
pub const VM_NULL: ErrorCode = ErrorCode {
    code: 2001,
    name: "VmNull",
};
pub const SOURCE_NULL: ErrorCode = ErrorCode {
    code: 2002,
    name: "SourceNull",
};
pub const SOURCE_NOT_UTF8: ErrorCode = ErrorCode {
    code: 2003,
    name: "SourceNotUtf8",
};
pub const INVALID_ARGUMENT: ErrorCode = ErrorCode {
    code: 2004,
    name: "InvalidArgument",
};
pub const KEY_NOT_FOUND: ErrorCode = ErrorCode {
    code: 2005,
    name: "KeyNotFound",
};
pub const INVALID_HANDLE: ErrorCode = ErrorCode {
    code: 2006,
    name: "InvalidHandle",
};
pub const TYPE_MISMATCH: ErrorCode = ErrorCode {
    code: 2007,
    name: "TypeMismatch",
};
pub const INDEX_OUT_OF_RANGE: ErrorCode = ErrorCode {
    code: 2008,
    name: "IndexOutOfRange",
};
pub const KEY_NULL: ErrorCode = ErrorCode {
    code: 2009,
    name: "KeyNull",
};
pub const KEY_NOT_UTF8: ErrorCode = ErrorCode {
    code: 2010,
    name: "KeyNotUtf8",
};
pub const ARGV_NULL: ErrorCode = ErrorCode {
    code: 2011,
    name: "ArgvNull",
};
pub const CAPABILITY_UNAVAILABLE: ErrorCode = ErrorCode {
    code: 2600,
    name: "CapabilityUnavailable",
};
pub const HOST_FILE_READ: ErrorCode = ErrorCode {
    code: 2601,
    name: "HostFileRead",
};
pub const HOST_FILE_EXISTS: ErrorCode = ErrorCode {
    code: 2602,
    name: "HostFileExists",
};
pub const HOST_IS_FILE: ErrorCode = ErrorCode {
    code: 2603,
    name: "HostIsFile",
};
pub const HOST_DIR_LIST: ErrorCode = ErrorCode {
    code: 2604,
    name: "HostDirList",
};
pub const UNKNOWN_HOST_FAILURE: ErrorCode = ErrorCode {
    code: 2611,
    name: "UnknownHostFailure",
};
pub const RECURSION_LIMIT_EXCEEDED: ErrorCode = ErrorCode {
    code: 2612,
    name: "RecursionLimitExceeded",
};
pub const NOT_SERIALIZABLE: ErrorCode = ErrorCode {
    code: 2613,
    name: "NotSerializable",
};
pub const CYCLIC_VALUE: ErrorCode = ErrorCode {
    code: 2614,
    name: "CyclicValue",
};
pub const OUT_OF_MEMORY: ErrorCode = ErrorCode {
    code: 2615,
    name: "OutOfMemory",
};

/// Structured evaluation failure carried across the whole runtime.
///
/// `line`/`column` are 1-based when the failure is traceable to a source
/// location and -1 otherwise (handle-level failures, host failures).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EvalError {
    pub code: u32,
    pub line: i32,
    pub column: i32,
    pub message: String,
}

impl EvalError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code: code.code,
            line: -1,
            column: -1,
            message: message.into(),
        }
    }

    /// A failure reported by the host; the host's own code is kept verbatim.
    pub fn host(code: u32, message: impl Into<String>) -> Self {
        Self {
            code,
            line: -1,
            column: -1,
            message: message.into(),
        }
    }

    pub fn at(mut self, position: Position) -> Self {
        self.line = position.line as i32;
        self.column = position.column as i32;
        self
    }

    pub fn has_location(&self) -> bool {
        self.line > 0
    }
}

impl fmt::Display for EvalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.has_location() {
            write!(
                f,
                "error {} at {}:{}: {}",
                self.code, self.line, self.column, self.message
            )
        } else {
            write!(f, "error {}: {}", self.code, self.message)
        }
    }
}

impl std::error::Error for EvalError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_location_is_unknown() {
        let err = EvalError::new(TYPE_MISMATCH, "len not supported");
        assert_eq!(err.code, 2007);
        assert_eq!((err.line, err.column), (-1, -1));
        assert!(!err.has_location());
    }

    #[test]
    fn test_at_attaches_position() {
        let err = EvalError::new(PARSE_ERROR, "boom").at(Position::new(2, 5));
        assert_eq!((err.line, err.column), (2, 5));
        assert!(err.has_location());
    }
}
