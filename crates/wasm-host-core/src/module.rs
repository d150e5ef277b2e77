//! WebAssembly module compilation.
//!
//! This module provides [`CompiledModule`], a wrapper around Wasmtime's [`Module`]
//! that validates input, compiles it once per spawn, and records which
//! functions the guest exports.

use std::collections::BTreeSet;
use std::hash::{DefaultHasher, Hash, Hasher};
use std::time::Instant;

use tracing::{info, instrument};
use wasmtime::{Engine, ExternType, Module};

use wasm_host_common::RuntimeError;

/// A compiled WebAssembly module.
///
/// # Thread Safety
///
/// `CompiledModule` is cheap to clone and can be shared across invocations.
/// The underlying Wasmtime module is also thread-safe.
#[derive(Clone)]
pub struct CompiledModule {
    /// The compiled Wasmtime module.
    module: Module,

    /// Hash of the original Wasm bytes.
    content_hash: String,

    /// Names of exported functions.
    exported_functions: BTreeSet<String>,

    /// When this module was compiled.
    compiled_at: Instant,
}

impl CompiledModule {
    /// Compile a core module from WebAssembly bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if the bytes are not a valid Wasm binary.
    #[instrument(skip(engine, bytes), fields(bytes_len = bytes.len()))]
    pub fn from_bytes(engine: &Engine, bytes: &[u8]) -> Result<Self, RuntimeError> {
        let start = Instant::now();

        Self::validate_wasm_header(bytes)?;

        let module = Module::new(engine, bytes).map_err(|e| {
            RuntimeError::compilation_failed(format!("Core module compilation failed: {e}"))
        })?;

        let compiled = Self::wrap(module, compute_hash(bytes));

        info!(
            content_hash = %compiled.content_hash,
            duration_ms = start.elapsed().as_millis(),
            "Core module compiled"
        );

        Ok(compiled)
    }

    /// Compile a core module from WAT (WebAssembly Text Format).
    ///
    /// # Errors
    ///
    /// Returns an error if the text does not parse or compile.
    #[instrument(skip(engine, wat))]
    pub fn from_wat(engine: &Engine, wat: &str) -> Result<Self, RuntimeError> {
        let start = Instant::now();

        let module = Module::new(engine, wat).map_err(|e| {
            RuntimeError::compilation_failed(format!("WAT compilation failed: {e}"))
        })?;

        let compiled = Self::wrap(module, compute_hash(wat.as_bytes()));

        info!(
            content_hash = %compiled.content_hash,
            duration_ms = start.elapsed().as_millis(),
            "WAT module compiled"
        );

        Ok(compiled)
    }

    /// Compile either a binary module or WAT text, detected by the magic number.
    ///
    /// # Errors
    ///
    /// Returns an error if compilation fails.
    pub fn from_source(engine: &Engine, bytes: &[u8]) -> Result<Self, RuntimeError> {
        if bytes.starts_with(b"\0asm") {
            return Self::from_bytes(engine, bytes);
        }

        let wat = std::str::from_utf8(bytes).map_err(|_| {
            RuntimeError::compilation_failed("Invalid Wasm: bad magic number and not UTF-8 text")
        })?;
        Self::from_wat(engine, wat)
    }

    fn wrap(module: Module, content_hash: String) -> Self {
        let exported_functions = module
            .exports()
            .filter(|export| matches!(export.ty(), ExternType::Func(_)))
            .map(|export| export.name().to_string())
            .collect();

        Self {
            module,
            content_hash,
            exported_functions,
            compiled_at: Instant::now(),
        }
    }

    /// Get the content hash of the original Wasm bytes.
    pub fn content_hash(&self) -> &str {
        &self.content_hash
    }

    /// Get when this module was compiled.
    pub fn compiled_at(&self) -> Instant {
        self.compiled_at
    }

    /// Check whether the module exports a function with this name.
    pub fn exports_function(&self, name: &str) -> bool {
        self.exported_functions.contains(name)
    }

    /// Iterate over exported function names.
    pub fn exported_functions(&self) -> impl Iterator<Item = &str> {
        self.exported_functions.iter().map(String::as_str)
    }

    /// Get the inner Wasmtime module.
    pub fn inner(&self) -> &Module {
        &self.module
    }

    /// Validate WebAssembly header (magic number).
    fn validate_wasm_header(bytes: &[u8]) -> Result<(), RuntimeError> {
        if bytes.len() < 8 {
            return Err(RuntimeError::compilation_failed(
                "Invalid Wasm: file too small",
            ));
        }

        if &bytes[0..4] != b"\0asm" {
            return Err(RuntimeError::compilation_failed(
                "Invalid Wasm: bad magic number",
            ));
        }

        Ok(())
    }
}

impl std::fmt::Debug for CompiledModule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompiledModule")
            .field("content_hash", &self.content_hash)
            .field("exported_functions", &self.exported_functions)
            .finish_non_exhaustive()
    }
}

/// Compute a hash of the given bytes.
fn compute_hash(bytes: &[u8]) -> String {
    let mut hasher = DefaultHasher::new();
    bytes.hash(&mut hasher);
    format!("{:016x}", hasher.finish())
}
