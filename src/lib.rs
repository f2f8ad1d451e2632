//! moo-dang: a browser-hosted POSIX-like shell core.
//!
//! Compiled to `wasm32-unknown-unknown` via `wasm-bindgen` and hosted in a
//! dedicated Web Worker; also builds natively (`rlib` + the `moo-dang-cli`
//! and `serve` binaries) so the full test suite and a terminal REPL can
//! run without a browser.

use wasm_bindgen::prelude::*;

pub mod completion;
pub mod dispatcher;
pub mod environment;
pub mod job;
pub mod parser;
pub mod pipeline;
pub mod process;
pub mod registry;
pub mod script;
pub mod shell;
pub mod vfs;
pub mod wasm;

use dispatcher::{Request, Response};
use environment::ShellOptions;
use shell::Shell;

fn init_panic_hook() {
    #[cfg(feature = "console_error_panic_hook")]
    console_error_panic_hook::set_once();
}

#[wasm_bindgen(start)]
pub fn main() {
    init_panic_hook();
}

#[wasm_bindgen]
extern "C" {
    #[wasm_bindgen(js_namespace = console)]
    fn log(s: &str);
}

/// Logs to the browser console (or, natively, wherever `console.log` is
/// stubbed in tests).
#[macro_export]
macro_rules! console_log {
    ($($t:tt)*) => {
        $crate::log(&format!($($t)*))
    };
}

/// The wasm-bindgen-exported handle the worker's message listener holds:
/// one `Shell` instance per worker, fed JSON requests and returning JSON
/// responses over the worker's message channel.
#[wasm_bindgen]
pub struct MooDangWorker {
    shell: Shell,
}

#[wasm_bindgen]
impl MooDangWorker {
    #[wasm_bindgen(constructor)]
    pub fn new() -> MooDangWorker {
        MooDangWorker { shell: Shell::new(ShellOptions::worker()) }
    }

    /// Parses one JSON request, dispatches it, and returns the JSON
    /// response. Malformed JSON is reported the same way an unknown
    /// request kind is — `error { message, code: UNKNOWN_REQUEST }` —
    /// since neither can be routed to a handler.
    #[wasm_bindgen(js_name = handleRequest)]
    pub fn handle_request(&mut self, request_json: &str) -> String {
        let response = match serde_json::from_str::<Request>(request_json) {
            Ok(request) => dispatcher::handle(&mut self.shell, request),
            Err(e) => Response::Error {
                message: format!("malformed request: {}", e),
                code: dispatcher::ErrorCode::UnknownRequest,
            },
        };
        serde_json::to_string(&response).unwrap_or_else(|e| {
            format!(r#"{{"type":"error","message":"failed to serialize response: {}","code":"REQUEST_FAILED"}}"#, e)
        })
    }
}

impl Default for MooDangWorker {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handle_request_round_trips_execute() {
        let mut worker = MooDangWorker::new();
        let response = worker.handle_request(r#"{"type":"execute","command":"echo hi"}"#);
        assert!(response.contains(r#""stdout":"hi""#));
    }

    #[test]
    fn handle_request_reports_unknown_request_on_malformed_json() {
        let mut worker = MooDangWorker::new();
        let response = worker.handle_request("not json");
        assert!(response.contains("UNKNOWN_REQUEST"));
    }
}
