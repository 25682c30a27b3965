//! Wasmtime host for wape plugins.
//!
//! Plugins are WASI preview 1 modules. On top of WASI the host can expose an
//! asynchronous network bridge: the guest dials through a policy gate, starts
//! reads and writes that complete on a Tokio runtime, and polls for results.
//!
//! # Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────┐
//! │  PluginRuntime                                             │
//! │  - Engine with fuel metering, shared Linker                │
//! │  - WASI preview 1 + "wape:host/env" bridge                 │
//! └──────────────┬─────────────────────────────────────────────┘
//!                │ instantiate
//! ┌──────────────▼─────────────────────────────────────────────┐
//! │  PluginInstance (Store<HostState>)                         │
//! │  - NetCtx: DialPolicy, ConnectionRegistry, HandleRegistry  │
//! │  - background I/O tasks on the Tokio runtime               │
//! └────────────────────────────────────────────────────────────┘
//! ```

pub mod config;
pub mod error;
pub mod net;
pub mod runtime;

pub use config::{NetworkConfig, RuntimeConfig, WapeConfig};
pub use error::{ConfigError, HostError, Result};
pub use net::{DialPolicy, NetCtx};
pub use runtime::{
    HostState, ModuleSource, Plugin, PluginInstance, PluginRuntime, RunOutput, sha256_hex,
};
pub use wape_abi::{ErrorCode, NAMESPACE, Status};
