//! Compiles, caches, and executes guest WASM command modules.

use std::collections::{HashMap, VecDeque};

use wasmi::{Engine, Linker, Module, Store};

use super::abi::{exports, ModuleValidator};
use super::error::{Diagnostics, WasmError, WasmResult};
use super::runtime::{build_linker, WasmExecutionContext};
use crate::process::ExecutionContext;

/// Configuration for one module load, mirroring the load-time config the
/// loader accepts per its contract.
#[derive(Debug, Clone)]
pub struct ModuleConfig {
    pub name: String,
    pub max_memory_bytes: u32,
    pub timeout_ms: u64,
    pub debug: bool,
}

impl Default for ModuleConfig {
    fn default() -> Self {
        Self {
            name: "command".to_string(),
            max_memory_bytes: 32 * 1024 * 1024,
            timeout_ms: 15_000,
            debug: false,
        }
    }
}

/// Outcome of invoking a guest export: exit code and whatever the guest
/// wrote to its stdout/stderr buffers.
pub struct WasmOutcome {
    pub exit_code: i32,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
}

/// Roughly 100k units of fuel per configured millisecond of timeout; an
/// implementation choice translating a wall-clock budget into wasmi's
/// fuel-based cooperative metering (see DESIGN.md).
const FUEL_PER_MS: u64 = 100_000;

/// Bounded LRU cache from a module's source key to its compiled
/// `wasmi::Module`, avoiding recompilation on repeated invocations of the
/// same command.
pub struct ModuleCache {
    capacity: usize,
    entries: HashMap<String, Module>,
    recency: VecDeque<String>,
}

impl ModuleCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            entries: HashMap::new(),
            recency: VecDeque::new(),
        }
    }

    fn touch(&mut self, key: &str) {
        self.recency.retain(|k| k != key);
        self.recency.push_back(key.to_string());
    }

    fn get(&mut self, key: &str) -> Option<&Module> {
        if self.entries.contains_key(key) {
            self.touch(key);
            self.entries.get(key)
        } else {
            None
        }
    }

    fn insert(&mut self, key: String, module: Module) {
        if self.entries.len() >= self.capacity && !self.entries.contains_key(&key) {
            if let Some(oldest) = self.recency.pop_front() {
                self.entries.remove(&oldest);
            }
        }
        self.touch(&key);
        self.entries.insert(key, module);
    }

    pub fn unload(&mut self, key: &str) {
        self.entries.remove(key);
        self.recency.retain(|k| k != key);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Compiles, instantiates, and runs guest modules against the ABI in
/// `super::runtime`.
pub struct WasmLoader {
    engine: Engine,
    linker: Linker<WasmExecutionContext>,
    cache: ModuleCache,
}

impl WasmLoader {
    pub fn new(cache_capacity: usize) -> Self {
        let mut config = wasmi::Config::default();
        config.consume_fuel(true);
        let engine = Engine::new(&config);
        let linker = build_linker(&engine);
        Self {
            engine,
            linker,
            cache: ModuleCache::new(cache_capacity),
        }
    }

    pub fn unload_module(&mut self, key: &str) {
        self.cache.unload(key);
    }

    pub fn cache_len(&self) -> usize {
        self.cache.len()
    }

    fn compile(&mut self, source_key: &str, bytes: &[u8], config: &ModuleConfig) -> WasmResult<()> {
        if self.cache.get(source_key).is_some() {
            return Ok(());
        }
        ModuleValidator::validate(bytes).map_err(|e| WasmError::InvalidModule {
            reason: e.to_string(),
            diagnostics: Diagnostics {
                module: config.name.clone(),
                operation: "validate".to_string(),
                ..Default::default()
            },
        })?;
        let module = Module::new(&self.engine, bytes).map_err(|e| WasmError::InvalidModule {
            reason: e.to_string(),
            diagnostics: Diagnostics {
                module: config.name.clone(),
                operation: "compile".to_string(),
                ..Default::default()
            },
        })?;
        self.cache.insert(source_key.to_string(), module);
        Ok(())
    }

    /// Loads (compiling on cache miss), instantiates, and runs a module.
    /// `entry_point` is `None` to invoke `main` with all args, or
    /// `Some(name)` when the caller's first positional arg matched an
    /// exported function name (dispatch happens in the command registry,
    /// which strips that arg before it reaches here).
    pub fn execute(
        &mut self,
        source_key: &str,
        bytes: &[u8],
        config: &ModuleConfig,
        context: &ExecutionContext,
        entry_point: Option<&str>,
    ) -> WasmResult<WasmOutcome> {
        self.compile(source_key, bytes, config)?;
        let module = self.cache.get(source_key).expect("just compiled or cached").clone();

        let guest_ctx = WasmExecutionContext::new(context.args.clone(), context.env.clone(), context.stdin.clone());
        let mut store = Store::new(&self.engine, guest_ctx);
        store
            .set_fuel(config.timeout_ms.saturating_mul(FUEL_PER_MS))
            .expect("fuel metering is enabled");

        let instance = self
            .linker
            .instantiate(&mut store, &module)
            .and_then(|pre| pre.start(&mut store))
            .map_err(|e| WasmError::InstantiationFailed {
                reason: e.to_string(),
                diagnostics: self.diagnostics(&store, config, "instantiate"),
            })?;

        let entry = entry_point.unwrap_or(exports::MAIN);
        let func = instance
            .get_typed_func::<(), ()>(&store, entry)
            .map_err(|_| WasmError::MissingExport {
                name: entry.to_string(),
                diagnostics: self.diagnostics(&store, config, "lookup"),
            })?;

        match func.call(&mut store, ()) {
            Ok(()) => {}
            Err(trap) => {
                return Err(if is_fuel_exhaustion(&trap) {
                    WasmError::Timeout {
                        ms: config.timeout_ms,
                        diagnostics: self.diagnostics(&store, config, "execute"),
                    }
                } else {
                    WasmError::Trapped {
                        reason: trap.to_string(),
                        diagnostics: self.diagnostics(&store, config, "execute"),
                    }
                });
            }
        }

        let _ = instance;
        let guest_ctx = store.data();
        Ok(WasmOutcome {
            exit_code: guest_ctx.exit_code.unwrap_or(0),
            stdout: guest_ctx.stdout.clone(),
            stderr: guest_ctx.stderr.clone(),
        })
    }

    fn diagnostics(&self, store: &Store<WasmExecutionContext>, config: &ModuleConfig, operation: &str) -> Diagnostics {
        let ctx = store.data();
        Diagnostics {
            module: config.name.clone(),
            operation: operation.to_string(),
            partial_stdout: ctx.stdout.clone(),
            partial_stderr: ctx.stderr.clone(),
            memory_bytes: config.max_memory_bytes,
            args: ctx.args.clone(),
        }
    }
}

fn is_fuel_exhaustion(trap: &wasmi::Error) -> bool {
    trap.to_string().to_lowercase().contains("fuel")
}
