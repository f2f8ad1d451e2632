//! Error types for the WASM loader. Every error carries a diagnostics bag
//! so a failed guest invocation is still debuggable after the fact.

use std::fmt;

pub type WasmResult<T> = Result<T, WasmError>;

/// Attached to every `WasmError` for post-mortem: what module, what
/// operation, and whatever output the guest had produced before failing.
#[derive(Debug, Clone, Default)]
pub struct Diagnostics {
    pub module: String,
    pub operation: String,
    pub partial_stdout: Vec<u8>,
    pub partial_stderr: Vec<u8>,
    pub memory_bytes: u32,
    pub args: Vec<String>,
}

#[derive(Debug, Clone)]
pub enum WasmError {
    InvalidModule { reason: String, diagnostics: Diagnostics },
    InstantiationFailed { reason: String, diagnostics: Diagnostics },
    MissingExport { name: String, diagnostics: Diagnostics },
    Timeout { ms: u64, diagnostics: Diagnostics },
    MemoryLimitExceeded { limit: u32, diagnostics: Diagnostics },
    Trapped { reason: String, diagnostics: Diagnostics },
}

impl WasmError {
    pub fn diagnostics(&self) -> &Diagnostics {
        match self {
            Self::InvalidModule { diagnostics, .. }
            | Self::InstantiationFailed { diagnostics, .. }
            | Self::MissingExport { diagnostics, .. }
            | Self::Timeout { diagnostics, .. }
            | Self::MemoryLimitExceeded { diagnostics, .. }
            | Self::Trapped { diagnostics, .. } => diagnostics,
        }
    }
}

impl fmt::Display for WasmError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidModule { reason, .. } => write!(f, "invalid WASM module: {}", reason),
            Self::InstantiationFailed { reason, .. } => {
                write!(f, "module instantiation failed: {}", reason)
            }
            Self::MissingExport { name, .. } => write!(f, "missing required export: '{}'", name),
            Self::Timeout { ms, .. } => write!(f, "Command timed out after {}ms", ms),
            Self::MemoryLimitExceeded { limit, .. } => {
                write!(f, "memory limit of {} bytes exceeded", limit)
            }
            Self::Trapped { reason, .. } => write!(f, "command aborted: {}", reason),
        }
    }
}

impl std::error::Error for WasmError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_messages() {
        let diag = Diagnostics::default();
        let err = WasmError::Timeout { ms: 15_000, diagnostics: diag };
        assert_eq!(err.to_string(), "Command timed out after 15000ms");
    }
}
