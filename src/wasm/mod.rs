//! WebAssembly guest command loader.
//!
//! Only available on native targets: `wasmi` needs a host allocator
//! outside the guest sandbox and the worker build (compiled to
//! `wasm32-unknown-unknown` itself) delegates WASM execution to a
//! sibling worker instead (see DESIGN.md).

pub mod abi;
pub mod error;
pub mod loader;
pub mod runtime;

pub use error::{Diagnostics, WasmError, WasmResult};
pub use loader::{ModuleConfig, WasmLoader, WasmOutcome};
