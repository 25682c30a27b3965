//! Error types for the plugin host.

use thiserror::Error;

/// Result type for host operations.
pub type Result<T> = std::result::Result<T, HostError>;

/// Errors that can occur while configuring, loading or running a plugin.
#[derive(Debug, Error)]
pub enum HostError {
    /// Configuration could not be loaded.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Failed to create the Wasmtime engine.
    #[error("Engine initialization failed: {0}")]
    InitFailed(String),

    /// Module bytes could not be read or compiled.
    #[error("Failed to load module: {0}")]
    ModuleLoad(String),

    /// Module content did not match the expected SHA-256 digest.
    #[error("Module hash mismatch: expected {expected}, got {actual}")]
    HashMismatch { expected: String, actual: String },

    /// Linking or instantiation failed (for example, an import the host does not provide).
    #[error("Failed to instantiate module: {0}")]
    Instantiate(String),

    /// The guest trapped or returned an error.
    #[error("Plugin execution failed: {0}")]
    ExecutionFailed(String),

    /// The guest called `proc_exit`.
    #[error("Plugin exited with code {0}")]
    ExitCode(i32),

    /// The guest ran out of fuel.
    #[error("Plugin execution timed out (fuel exhausted)")]
    Timeout,

    /// The guest does not export the requested function.
    #[error("Export not found: {0}")]
    ExportNotFound(String),

    /// No Tokio runtime is available to drive network I/O.
    #[error("No Tokio runtime available for network I/O")]
    NoRuntime,

    /// A guest was called from a single-threaded runtime's async context,
    /// where its blocking network calls cannot run.
    #[error("Cannot run a plugin inside a current-thread Tokio runtime; use spawn_blocking")]
    AsyncContext,
}

/// Errors that can occur while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read a config file.
    #[error("failed to read config file '{path}': {source}")]
    ReadFile {
        path: String,
        source: std::io::Error,
    },

    /// Failed to parse TOML.
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    /// Failed to parse JSON.
    #[error("failed to parse JSON config: {0}")]
    ParseJson(#[from] serde_json::Error),

    /// A value is out of its allowed range.
    #[error("invalid value for '{field}': {reason}")]
    Invalid { field: String, reason: String },
}
