//! # Computation Compiler
//!
//! Turns a [`ComputationRequest`] into a validated, optimized
//! [`Computation`] and keeps recently compiled computations in a bounded
//! cache.
//!
//! ## Architecture
//!
//! ```text
//! Request → Lowering → Check (rewrite) → Optimize → Check → Device indexes → Cache
//! ```
//!
//! The lowering itself is supplied by the caller through
//! [`ComputationLowering`].
//!
//! ## Usage
//!
//! ```ignore
//! use nnet_compiler::compiler::{CachingCompiler, CachingCompilerOptions};
//!
//! let compiler = CachingCompiler::new(network, lowering, CachingCompilerOptions::default());
//! let computation = compiler.compile(&request)?;
//! println!("{}", computation);
//! ```

pub mod analysis;
pub mod cache;
pub mod checker;
pub mod ir;
pub mod optimizer;
pub mod request;

pub use analysis::{Analyzer, ComputationAnalysis};
pub use cache::{CacheStats, ComputationCache, DEFAULT_CACHE_CAPACITY};
pub use checker::{CheckComputationOptions, CheckReport, ComputationChecker};
pub use ir::{Command, CommandType, Computation, Network, NetworkSpec};
pub use optimizer::{OptimizeOptions, Optimizer, PassKind};
pub use request::{ComputationRequest, IoSpecification};

use crate::{Error, Result};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, trace, warn};

/// Builds the unoptimized computation for a request
pub trait ComputationLowering {
    fn lower(&self, request: &ComputationRequest) -> Result<Computation>;
}

impl<F> ComputationLowering for F
where
    F: Fn(&ComputationRequest) -> Result<Computation>,
{
    fn lower(&self, request: &ComputationRequest) -> Result<Computation> {
        self(request)
    }
}

/// Caching compiler options
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CachingCompilerOptions {
    /// Maximum number of cached computations (at least 1)
    pub cache_capacity: usize,
    /// Options for the optimization pipeline
    pub optimize: OptimizeOptions,
}

impl Default for CachingCompilerOptions {
    fn default() -> Self {
        Self {
            cache_capacity: DEFAULT_CACHE_CAPACITY,
            optimize: OptimizeOptions::default(),
        }
    }
}

impl CachingCompilerOptions {
    /// Parse from JSON; missing fields take their default values
    pub fn from_json(text: &str) -> Result<Self> {
        let options: CachingCompilerOptions = serde_json::from_str(text)?;
        options.validate()?;
        Ok(options)
    }

    /// Reject a zero cache capacity and invalid optimizer options
    pub fn validate(&self) -> Result<()> {
        if self.cache_capacity == 0 {
            return Err(Error::config("cache_capacity must be at least 1"));
        }
        self.optimize.validate()
    }

    pub fn with_cache_capacity(mut self, capacity: usize) -> Self {
        self.cache_capacity = capacity;
        self
    }

    pub fn with_optimize(mut self, optimize: OptimizeOptions) -> Self {
        self.optimize = optimize;
        self
    }
}

/// Compiler that remembers the computations of recent requests
pub struct CachingCompiler<N: Network + ?Sized, L: ComputationLowering> {
    network: Arc<N>,
    lowering: L,
    options: CachingCompilerOptions,
    cache: Mutex<ComputationCache>,
    warned_unused_input: AtomicBool,
}

impl<N: Network + ?Sized, L: ComputationLowering> CachingCompiler<N, L> {
    /// Create a compiler with an empty cache sized by `options.cache_capacity`
    pub fn new(network: Arc<N>, lowering: L, options: CachingCompilerOptions) -> Self {
        let cache = ComputationCache::new(options.cache_capacity);
        Self {
            network,
            lowering,
            options,
            cache: Mutex::new(cache),
            warned_unused_input: AtomicBool::new(false),
        }
    }

    /// Options this compiler was created with
    pub fn options(&self) -> &CachingCompilerOptions {
        &self.options
    }

    /// Network every computation is checked against
    pub fn network(&self) -> &N {
        &self.network
    }

    /// Lowering used on cache misses
    pub fn lowering(&self) -> &L {
        &self.lowering
    }

    /// Cached computation for `request`, compiling it on a miss.
    ///
    /// The cache lock is held across compilation so that concurrent callers
    /// asking for the same request compile it once.
    pub fn compile(&self, request: &ComputationRequest) -> Result<Arc<Computation>> {
        let mut cache = self.cache.lock();
        if let Some(computation) = cache.get(request) {
            trace!(
                inputs = request.inputs.len(),
                outputs = request.outputs.len(),
                "computation cache hit"
            );
            return Ok(computation);
        }

        let computation = Arc::new(self.compile_uncached(request)?);
        if cache.insert(request.clone(), Arc::clone(&computation)).is_some() {
            debug!(capacity = cache.capacity(), "evicted least recently used computation");
        }
        Ok(computation)
    }

    /// Full pipeline without touching the cache
    pub fn compile_uncached(&self, request: &ComputationRequest) -> Result<Computation> {
        let network = &*self.network;
        let mut computation = self.lowering.lower(request)?;
        debug!(
            commands = computation.commands.len(),
            matrices = computation.matrices.len(),
            "lowered computation"
        );

        let report = ComputationChecker::new(
            CheckComputationOptions { check_rewrite: true },
            network,
            &computation,
        )
        .check()?;
        if !report.unused_inputs.is_empty()
            && !self.warned_unused_input.swap(true, Ordering::Relaxed)
        {
            for message in &report.warnings {
                warn!("{}", message);
            }
        }

        Optimizer::new(&self.options.optimize, network).optimize(request, &mut computation);

        ComputationChecker::new(
            CheckComputationOptions { check_rewrite: false },
            network,
            &computation,
        )
        .check()?;

        computation.compute_device_indexes();
        debug!("{}", computation);
        Ok(computation)
    }

    /// Hit, miss and eviction counts so far
    pub fn cache_stats(&self) -> CacheStats {
        self.cache.lock().stats()
    }

    pub fn cache_len(&self) -> usize {
        self.cache.lock().len()
    }

    pub fn clear_cache(&self) {
        self.cache.lock().clear();
    }
}
