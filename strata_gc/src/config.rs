//! Remembered-set configuration parameters.
//!
//! All sizes and thresholds are tunable for different workloads.
//! Geometry values (card/region/heap sizes) are fixed for the lifetime of
//! a [`crate::RemSet`]; the remaining knobs only affect throughput and
//! pause behavior, never correctness.

use thiserror::Error;

/// Configuration for the remembered-set subsystem.
///
/// # Example
///
/// ```ignore
/// use strata_gc::RemSetConfig;
///
/// // Low-latency configuration: more refinement threads, earlier wakeup
/// let config = RemSetConfig {
///     refinement_threads: 4,
///     refine_activation_threshold: 2,
///     ..Default::default()
/// };
/// ```
#[derive(Debug, Clone)]
pub struct RemSetConfig {
    // =========================================================================
    // Heap Geometry
    // =========================================================================
    /// Base address of the covered heap range.
    ///
    /// Tests commonly use a synthetic base; an embedder passes the real
    /// heap reservation start.
    pub heap_base: usize,

    /// Size of the covered heap range in bytes.
    ///
    /// Must be a multiple of `region_size`.
    pub heap_size: usize,

    /// Size of one heap region in bytes (power of two).
    ///
    /// Default: 1MB
    pub region_size: usize,

    /// Card granularity for write-barrier tracking.
    ///
    /// Each card covers this many bytes of heap. Smaller cards give more
    /// precise tracking but use more memory.
    ///
    /// Default: 512 bytes
    pub card_size: usize,

    /// Cards per scan chunk, the unit of parallel claim during scanning.
    ///
    /// Default: 128 cards (64KB of heap at the default card size)
    pub cards_per_chunk: usize,

    // =========================================================================
    // Dirty-Card Queue
    // =========================================================================
    /// Capacity of each per-thread dirty-card buffer, in card entries.
    ///
    /// Default: 256
    pub buffer_capacity: usize,

    /// Maximum number of recycled buffer nodes retained on the free list.
    ///
    /// Sized to the number of concurrently active producer threads; excess
    /// returned nodes are dropped instead of hoarded.
    ///
    /// Default: 64
    pub max_free_buffers: usize,

    /// Completed-buffer count at which parked refinement threads are woken.
    ///
    /// Default: 4
    pub refine_activation_threshold: usize,

    /// Completed-buffer count at which mutators must refine synchronously.
    ///
    /// Beyond this point `enqueue` reports backpressure and the producing
    /// thread pays the refinement cost itself, bounding queue memory.
    ///
    /// Default: 64
    pub mutator_refinement_threshold: usize,

    /// Number of background refinement threads.
    ///
    /// Default: available parallelism minus 1, minimum 1
    pub refinement_threads: usize,

    // =========================================================================
    // Hot-Card Cache
    // =========================================================================
    /// Refinement count at which a card is considered hot and parked in the
    /// hot-card cache instead of being refined again.
    ///
    /// Default: 4
    pub hot_card_threshold: u8,

    /// Number of entries in the hot-card cache ring.
    ///
    /// Default: 1024
    pub hot_card_cache_size: usize,

    // =========================================================================
    // Remembered-Set Representation
    // =========================================================================
    /// Maximum card offsets stored per source region before the sparse list
    /// is promoted to a fine-grained bitmap.
    ///
    /// Default: 128
    pub sparse_table_cap: usize,

    /// Maximum distinct fine-grained source tables per region before one is
    /// coarsened to a whole-region entry.
    ///
    /// Default: 32
    pub fine_tables_cap: usize,

    // =========================================================================
    // Rebuild & Pause Diagnostics
    // =========================================================================
    /// Address stride of one rebuild work chunk; the yield check runs after
    /// each chunk.
    ///
    /// Default: 512KB
    pub rebuild_chunk_bytes: usize,

    /// Soft pause budget in milliseconds. Exceeding it emits a diagnostic;
    /// committed scan work is never aborted.
    ///
    /// Default: 200
    pub pause_soft_timeout_ms: u64,
}

impl Default for RemSetConfig {
    fn default() -> Self {
        Self {
            // Geometry
            heap_base: 0,
            heap_size: 256 * 1024 * 1024, // 256MB
            region_size: 1024 * 1024,     // 1MB
            card_size: 512,
            cards_per_chunk: 128,

            // Queue
            buffer_capacity: 256,
            max_free_buffers: 64,
            refine_activation_threshold: 4,
            mutator_refinement_threshold: 64,
            refinement_threads: num_cpus().saturating_sub(1).max(1),

            // Hot cards
            hot_card_threshold: 4,
            hot_card_cache_size: 1024,

            // Representation
            sparse_table_cap: 128,
            fine_tables_cap: 32,

            // Rebuild / diagnostics
            rebuild_chunk_bytes: 512 * 1024,
            pause_soft_timeout_ms: 200,
        }
    }
}

impl RemSetConfig {
    /// Create a configuration for tests: tiny heap, single refinement
    /// thread, small buffers so overflow paths trigger quickly.
    pub fn for_testing() -> Self {
        Self {
            heap_base: 0,
            heap_size: 4 * 1024 * 1024, // 4MB
            region_size: 64 * 1024,     // 64KB → 128 cards per region
            card_size: 512,
            cards_per_chunk: 16,
            buffer_capacity: 16,
            max_free_buffers: 4,
            refine_activation_threshold: 1,
            mutator_refinement_threshold: 8,
            refinement_threads: 1,
            hot_card_threshold: 4,
            hot_card_cache_size: 8,
            sparse_table_cap: 8,
            fine_tables_cap: 4,
            rebuild_chunk_bytes: 16 * 1024,
            pause_soft_timeout_ms: 200,
        }
    }

    /// Create a configuration optimized for pause time over throughput.
    pub fn low_latency() -> Self {
        Self {
            refinement_threads: num_cpus().max(2),
            refine_activation_threshold: 1,
            mutator_refinement_threshold: 32,
            hot_card_threshold: 2,
            ..Default::default()
        }
    }

    /// Number of cards covering one region.
    #[inline]
    pub fn cards_per_region(&self) -> usize {
        self.region_size / self.card_size
    }

    /// Number of scan chunks covering one region.
    #[inline]
    pub fn chunks_per_region(&self) -> usize {
        self.cards_per_region() / self.cards_per_chunk
    }

    /// Number of regions covering the heap.
    #[inline]
    pub fn num_regions(&self) -> usize {
        self.heap_size / self.region_size
    }

    /// Validate configuration values.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.card_size.is_power_of_two() || self.card_size < 64 {
            return Err(ConfigError::InvalidCardSize);
        }
        if !self.region_size.is_power_of_two() || self.region_size < self.card_size {
            return Err(ConfigError::InvalidRegionSize);
        }
        if self.heap_size == 0 || self.heap_size % self.region_size != 0 {
            return Err(ConfigError::InvalidHeapSize);
        }
        if self.heap_base % self.region_size != 0 {
            return Err(ConfigError::MisalignedHeapBase);
        }
        if self.cards_per_chunk == 0
            || !self.cards_per_chunk.is_power_of_two()
            || self.cards_per_region() % self.cards_per_chunk != 0
        {
            return Err(ConfigError::InvalidChunkSize);
        }
        if self.buffer_capacity == 0 {
            return Err(ConfigError::EmptyBuffer);
        }
        if self.refine_activation_threshold > self.mutator_refinement_threshold {
            return Err(ConfigError::ThresholdOrder);
        }
        if self.sparse_table_cap == 0 || self.sparse_table_cap >= self.cards_per_region() {
            return Err(ConfigError::InvalidSparseCap);
        }
        if self.refinement_threads == 0 {
            return Err(ConfigError::NoRefinementThreads);
        }
        Ok(())
    }
}

/// Configuration validation errors.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigError {
    /// Card size must be a power of two, minimum 64 bytes.
    #[error("card size must be a power of two, minimum 64 bytes")]
    InvalidCardSize,
    /// Region size must be a power of two and at least one card.
    #[error("region size must be a power of two and at least one card")]
    InvalidRegionSize,
    /// Heap size must be a non-zero multiple of the region size.
    #[error("heap size must be a non-zero multiple of the region size")]
    InvalidHeapSize,
    /// Heap base must be region-aligned.
    #[error("heap base must be region-aligned")]
    MisalignedHeapBase,
    /// Chunk size must be a power of two dividing the cards per region.
    #[error("cards per chunk must be a power of two dividing cards per region")]
    InvalidChunkSize,
    /// Buffer capacity must be non-zero.
    #[error("buffer capacity must be non-zero")]
    EmptyBuffer,
    /// Activation threshold must not exceed the mutator threshold.
    #[error("refinement activation threshold must not exceed the mutator threshold")]
    ThresholdOrder,
    /// Sparse cap must be non-zero and below the cards per region.
    #[error("sparse table cap must be non-zero and below cards per region")]
    InvalidSparseCap,
    /// At least one refinement thread is required.
    #[error("at least one refinement thread is required")]
    NoRefinementThreads,
}

/// Get the number of available CPUs.
fn num_cpus() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}
