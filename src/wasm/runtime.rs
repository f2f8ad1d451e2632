//! Per-invocation guest state and the host import wiring.
//!
//! One `WasmExecutionContext` is created per guest call and lives in the
//! `wasmi::Store`; the host import closures (wired with
//! `Linker::func_wrap`, in the same style the reference pack's
//! `wasmtime::Linker` usages wire environment/IO functions into a
//! `Caller`) read and write its buffers through the guest's own linear
//! memory.

use std::collections::HashMap;

use wasmi::{Caller, Linker, Memory};

use super::abi::{imports, IMPORT_NAMESPACE};

/// Mutable state a guest call can observe and mutate through its host
/// imports: copies of args/env/stdin, plus accumulating stdout/stderr and
/// a pending exit code.
pub struct WasmExecutionContext {
    pub args: Vec<String>,
    pub env: HashMap<String, String>,
    pub stdin: Vec<u8>,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub exit_code: Option<i32>,
}

impl WasmExecutionContext {
    pub fn new(args: Vec<String>, env: HashMap<String, String>, stdin: String) -> Self {
        Self {
            args,
            env,
            stdin: stdin.into_bytes(),
            stdout: Vec::new(),
            stderr: Vec::new(),
            exit_code: None,
        }
    }
}

fn memory_of(caller: &mut Caller<'_, WasmExecutionContext>) -> Option<Memory> {
    caller.get_export("memory")?.into_memory()
}

fn read_guest_bytes(caller: &mut Caller<'_, WasmExecutionContext>, ptr: u32, len: u32) -> Vec<u8> {
    let Some(memory) = memory_of(caller) else {
        return Vec::new();
    };
    let data = memory.data(&caller);
    let start = ptr as usize;
    let end = start.saturating_add(len as usize).min(data.len());
    if start >= data.len() || start >= end {
        return Vec::new();
    }
    data[start..end].to_vec()
}

/// Writes `bytes` into guest memory at `ptr`, truncated to `max_len`.
/// Returns the number of bytes actually written.
fn write_guest_bytes(
    caller: &mut Caller<'_, WasmExecutionContext>,
    ptr: u32,
    max_len: u32,
    bytes: &[u8],
) -> u32 {
    let Some(memory) = memory_of(caller) else {
        return 0;
    };
    let to_write = bytes.len().min(max_len as usize);
    let data = memory.data_mut(caller);
    let start = ptr as usize;
    let end = start.saturating_add(to_write);
    if end > data.len() {
        return 0;
    }
    data[start..end].copy_from_slice(&bytes[..to_write]);
    to_write as u32
}

/// Wires every host import named in the ABI table into `linker`, each
/// closure capturing only the `Caller`-scoped `WasmExecutionContext`.
pub fn build_linker(engine: &wasmi::Engine) -> Linker<WasmExecutionContext> {
    let mut linker = Linker::new(engine);

    linker
        .func_wrap(
            IMPORT_NAMESPACE,
            imports::WRITE_STDOUT,
            |mut caller: Caller<'_, WasmExecutionContext>, ptr: i32, len: i32| {
                let bytes = read_guest_bytes(&mut caller, ptr as u32, len as u32);
                caller.data_mut().stdout.extend_from_slice(&bytes);
            },
        )
        .expect("shell_write_stdout import");

    linker
        .func_wrap(
            IMPORT_NAMESPACE,
            imports::WRITE_STDERR,
            |mut caller: Caller<'_, WasmExecutionContext>, ptr: i32, len: i32| {
                let bytes = read_guest_bytes(&mut caller, ptr as u32, len as u32);
                caller.data_mut().stderr.extend_from_slice(&bytes);
            },
        )
        .expect("shell_write_stderr import");

    linker
        .func_wrap(
            IMPORT_NAMESPACE,
            imports::READ_STDIN,
            |mut caller: Caller<'_, WasmExecutionContext>, buf_ptr: i32, buf_len: i32| -> i32 {
                let remaining = caller.data().stdin.clone();
                let written = write_guest_bytes(&mut caller, buf_ptr as u32, buf_len as u32, &remaining);
                caller.data_mut().stdin.drain(..written as usize);
                written as i32
            },
        )
        .expect("shell_read_stdin import");

    linker
        .func_wrap(
            IMPORT_NAMESPACE,
            imports::GET_ARGC,
            |caller: Caller<'_, WasmExecutionContext>| -> i32 { caller.data().args.len() as i32 },
        )
        .expect("shell_get_argc import");

    linker
        .func_wrap(
            IMPORT_NAMESPACE,
            imports::GET_ARG,
            |mut caller: Caller<'_, WasmExecutionContext>, index: i32, buf_ptr: i32, buf_len: i32| -> i32 {
                let arg = match caller.data().args.get(index as usize) {
                    Some(a) => a.clone(),
                    None => return -1,
                };
                write_guest_bytes(&mut caller, buf_ptr as u32, buf_len as u32, arg.as_bytes()) as i32
            },
        )
        .expect("shell_get_arg import");

    linker
        .func_wrap(
            IMPORT_NAMESPACE,
            imports::GET_ENV,
            |mut caller: Caller<'_, WasmExecutionContext>,
             key_ptr: i32,
             key_len: i32,
             buf_ptr: i32,
             buf_len: i32|
             -> i32 {
                let key_bytes = read_guest_bytes(&mut caller, key_ptr as u32, key_len as u32);
                let key = String::from_utf8_lossy(&key_bytes).into_owned();
                let value = match caller.data().env.get(&key) {
                    Some(v) => v.clone(),
                    None => return 0,
                };
                write_guest_bytes(&mut caller, buf_ptr as u32, buf_len as u32, value.as_bytes()) as i32
            },
        )
        .expect("shell_get_env import");

    linker
        .func_wrap(
            IMPORT_NAMESPACE,
            imports::SET_EXIT_CODE,
            |mut caller: Caller<'_, WasmExecutionContext>, code: i32| {
                caller.data_mut().exit_code = Some(code);
            },
        )
        .expect("shell_set_exit_code import");

    linker
}
