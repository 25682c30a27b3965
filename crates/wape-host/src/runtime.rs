//! Wasmtime runtime for wape plugins.
//!
//! # Flow
//!
//! 1. `PluginRuntime::new()` builds a fuel-metered engine and a linker with
//!    WASI preview 1 and, when enabled, the network bridge
//! 2. `PluginRuntime::load()` compiles a module and verifies its SHA-256 digest
//! 3. `PluginRuntime::instantiate()` creates a store with memory limits, a fuel
//!    budget and fresh per-instance network state
//! 4. `PluginInstance::call_start()` runs the WASI entry point
//!
//! Guests block the calling thread, so run them on a blocking thread
//! (`PluginRuntime::run` does this). Calls made directly from a
//! current-thread runtime's `block_on` are rejected with
//! `HostError::AsyncContext`.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use sha2::{Digest, Sha256};
use tokio::runtime::{Handle, RuntimeFlavor};
use tracing::{debug, warn};
use wasmtime::{
    Config, Engine, Instance, Linker, Module, Store, StoreLimits, StoreLimitsBuilder, Trap,
    WasmParams, WasmResults,
};
use wasmtime_wasi::WasiCtxBuilder;
use wasmtime_wasi::p1::WasiP1Ctx;

use crate::config::WapeConfig;
use crate::error::{HostError, Result};
use crate::net::{self, MEMORY_EXPORT, NetCtx};

/// WASI entry point.
const START_EXPORT: &str = "_start";

/// Where module bytes come from. Binary and text formats are both accepted.
#[derive(Debug, Clone)]
pub enum ModuleSource {
    Bytes(Vec<u8>),
    File(PathBuf),
}

impl From<Vec<u8>> for ModuleSource {
    fn from(bytes: Vec<u8>) -> Self {
        Self::Bytes(bytes)
    }
}

impl From<PathBuf> for ModuleSource {
    fn from(path: PathBuf) -> Self {
        Self::File(path)
    }
}

/// A compiled module ready to instantiate.
#[derive(Clone)]
pub struct Plugin {
    module: Module,
    hash: String,
}

impl Plugin {
    /// SHA-256 hex digest of the module source.
    pub fn hash(&self) -> &str {
        &self.hash
    }
}

impl std::fmt::Debug for Plugin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Plugin").field("hash", &self.hash).finish()
    }
}

/// Result of running a plugin to completion.
#[derive(Debug)]
pub struct RunOutput {
    /// Exit code (0 = success).
    pub exit_code: i32,
    /// Fuel spent during the call.
    pub fuel_consumed: u64,
    /// Execution wall-clock time.
    pub elapsed: Duration,
}

/// Data carried by every plugin store.
pub struct HostState {
    wasi: WasiP1Ctx,
    net: NetCtx,
    limits: StoreLimits,
}

impl HostState {
    pub fn net(&self) -> &NetCtx {
        &self.net
    }
}

/// Loads and instantiates plugins with a shared engine and linker.
#[derive(Clone)]
pub struct PluginRuntime {
    engine: Engine,
    linker: Arc<Linker<HostState>>,
    config: Arc<WapeConfig>,
    io: Handle,
}

impl std::fmt::Debug for PluginRuntime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginRuntime")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl PluginRuntime {
    /// Create a runtime whose network I/O is driven by `io`.
    pub fn new(config: WapeConfig, io: Handle) -> Result<Self> {
        config.validate()?;

        let mut engine_config = Config::new();
        engine_config.consume_fuel(true);
        let engine = Engine::new(&engine_config)
            .map_err(|e| HostError::InitFailed(format!("Failed to create Wasmtime engine: {e}")))?;

        let mut linker = Linker::new(&engine);
        wasmtime_wasi::p1::add_to_linker_sync(&mut linker, |state: &mut HostState| {
            &mut state.wasi
        })
        .map_err(|e| HostError::InitFailed(format!("Failed to link WASI: {e}")))?;

        if config.network.enabled {
            net::add_to_linker(&mut linker, |state: &mut HostState| &mut state.net)
                .map_err(|e| {
                    HostError::InitFailed(format!("Failed to link network bridge: {e}"))
                })?;
            debug!(
                networks_allow_all = config.network.networks_allow_all,
                addresses_allow_all = config.network.addresses_allow_all,
                "Network bridge enabled"
            );
        }

        Ok(Self {
            engine,
            linker: Arc::new(linker),
            config: Arc::new(config),
            io,
        })
    }

    /// Create a runtime on the Tokio runtime of the calling context.
    pub fn from_current(config: WapeConfig) -> Result<Self> {
        let io = Handle::try_current().map_err(|_| HostError::NoRuntime)?;
        Self::new(config, io)
    }

    pub fn config(&self) -> &WapeConfig {
        &self.config
    }

    /// Compile a module, rejecting it if it does not match `expected_sha256`.
    pub fn load(&self, source: ModuleSource, expected_sha256: Option<&str>) -> Result<Plugin> {
        let bytes = match source {
            ModuleSource::Bytes(bytes) => bytes,
            ModuleSource::File(path) => std::fs::read(&path).map_err(|e| {
                HostError::ModuleLoad(format!("Cannot read {}: {e}", path.display()))
            })?,
        };

        let hash = sha256_hex(&bytes);
        if let Some(expected) = expected_sha256
            && !expected.eq_ignore_ascii_case(&hash)
        {
            warn!(expected, actual = %hash, "Rejected module with unexpected hash");
            return Err(HostError::HashMismatch {
                expected: expected.to_string(),
                actual: hash,
            });
        }

        let module = Module::new(&self.engine, &bytes)
            .map_err(|e| HostError::ModuleLoad(e.to_string()))?;
        debug!(hash = %hash, size = bytes.len(), "Loaded module");
        Ok(Plugin { module, hash })
    }

    /// Create a fresh instance with its own network state.
    pub fn instantiate(&self, plugin: &Plugin) -> Result<PluginInstance> {
        let runtime = &self.config.runtime;

        let mut wasi = WasiCtxBuilder::new();
        if runtime.inherit_stdio {
            wasi.inherit_stdio();
        }

        let mut limits = StoreLimitsBuilder::new();
        if let Some(max) = runtime.max_memory_bytes {
            limits = limits.memory_size(max);
        }

        let state = HostState {
            wasi: wasi.build_p1(),
            net: NetCtx::new(&self.config.network, self.io.clone()),
            limits: limits.build(),
        };

        let mut store = Store::new(&self.engine, state);
        store.limiter(|state| &mut state.limits);
        let fuel = runtime.fuel();
        store
            .set_fuel(fuel)
            .map_err(|e| HostError::InitFailed(format!("Failed to set fuel: {e}")))?;

        let instance = self
            .linker
            .instantiate(&mut store, &plugin.module)
            .map_err(|e| HostError::Instantiate(e.to_string()))?;

        Ok(PluginInstance {
            store,
            instance,
            fuel,
        })
    }

    /// Instantiate and run `_start` on a blocking thread.
    pub async fn run(&self, plugin: &Plugin) -> Result<RunOutput> {
        let runtime = self.clone();
        let plugin = plugin.clone();
        tokio::task::spawn_blocking(move || runtime.instantiate(&plugin)?.call_start())
            .await
            .map_err(|e| HostError::ExecutionFailed(format!("Task join error: {e}")))?
    }
}

/// A live plugin. Dropping it closes its connections and aborts its
/// outstanding operations.
pub struct PluginInstance {
    store: Store<HostState>,
    instance: Instance,
    fuel: u64,
}

impl std::fmt::Debug for PluginInstance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginInstance")
            .field("fuel", &self.fuel)
            .field("net", self.net())
            .finish_non_exhaustive()
    }
}

impl PluginInstance {
    /// Run the WASI entry point. `proc_exit` becomes the exit code.
    pub fn call_start(&mut self) -> Result<RunOutput> {
        let start = Instant::now();
        let exit_code = match self.call::<(), ()>(START_EXPORT, ()) {
            Ok(()) => 0,
            Err(HostError::ExitCode(code)) => code,
            Err(e) => return Err(e),
        };
        let fuel_consumed = self.fuel.saturating_sub(self.store.get_fuel().unwrap_or(0));
        let elapsed = start.elapsed();
        debug!(exit_code, fuel_consumed, elapsed = ?elapsed, "Plugin finished");

        Ok(RunOutput {
            exit_code,
            fuel_consumed,
            elapsed,
        })
    }

    /// Call a typed export.
    pub fn call<P, R>(&mut self, name: &str, params: P) -> Result<R>
    where
        P: WasmParams,
        R: WasmResults,
    {
        ensure_blocking_allowed()?;
        let func = self
            .instance
            .get_typed_func::<P, R>(&mut self.store, name)
            .map_err(|e| HostError::ExportNotFound(format!("{name}: {e}")))?;
        func.call(&mut self.store, params).map_err(classify_error)
    }

    /// Copy `bytes` into guest memory at `offset`.
    pub fn write_memory(&mut self, offset: usize, bytes: &[u8]) -> Result<()> {
        let memory = self
            .instance
            .get_memory(&mut self.store, MEMORY_EXPORT)
            .ok_or_else(|| HostError::ExportNotFound(MEMORY_EXPORT.to_string()))?;
        memory
            .write(&mut self.store, offset, bytes)
            .map_err(|e| HostError::ExecutionFailed(e.to_string()))
    }

    /// Copy `len` bytes out of guest memory at `offset`.
    pub fn read_memory(&mut self, offset: usize, len: usize) -> Result<Vec<u8>> {
        let memory = self
            .instance
            .get_memory(&mut self.store, MEMORY_EXPORT)
            .ok_or_else(|| HostError::ExportNotFound(MEMORY_EXPORT.to_string()))?;
        let mut buf = vec![0u8; len];
        memory
            .read(&self.store, offset, &mut buf)
            .map_err(|e| HostError::ExecutionFailed(e.to_string()))?;
        Ok(buf)
    }

    pub fn net(&self) -> &NetCtx {
        self.store.data().net()
    }
}

/// Reject calls from the body of a current-thread runtime's `block_on`, which
/// can neither block in place nor drive the bridge's I/O.
fn ensure_blocking_allowed() -> Result<()> {
    let in_block_on = Handle::try_current()
        .is_ok_and(|handle| handle.runtime_flavor() == RuntimeFlavor::CurrentThread)
        && tokio::task::try_id().is_none();
    if in_block_on {
        return Err(HostError::AsyncContext);
    }
    Ok(())
}

fn classify_error(e: wasmtime::Error) -> HostError {
    if let Some(exit) = e.downcast_ref::<wasmtime_wasi::I32Exit>() {
        return HostError::ExitCode(exit.0);
    }
    if e.downcast_ref::<Trap>() == Some(&Trap::OutOfFuel) {
        return HostError::Timeout;
    }
    HostError::ExecutionFailed(format!("{e:#}"))
}

/// Compute the SHA-256 hex digest of module bytes.
pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}
