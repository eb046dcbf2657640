/// One gibibyte.
pub const SIZE_1GB: u64 = 1 << 30;

/// Default advisory Write Buffer threshold in bytes.
pub const DEFAULT_BUFFER_LIMIT: u64 = SIZE_1GB;

/// Default store capacity in bytes.
pub const DEFAULT_CAPACITY: u64 = SIZE_1GB;

/// Default engine page cache in bytes.
pub const DEFAULT_CACHE_SIZE: usize = 64 << 20;

/// Access mode of a [`super::Store`], fixed at open time.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum OpenMode {
    /// Staging, flushing, and compaction are allowed.
    #[default]
    Writable,
    /// Only lookups and scans are allowed.
    ReadOnly,
}

/// Configuration options supplied when opening a [`super::Store`].
#[derive(Clone, Debug)]
pub struct StoreOptions {
    /// Access mode.
    pub mode: OpenMode,
    /// Write Buffer size that triggers an automatic flush.
    pub buffer_limit_bytes: u64,
    /// Whether crossing `buffer_limit_bytes` flushes automatically.
    pub auto_flush: bool,
    /// Maximum engine file footprint; flushes that would exceed it fail.
    pub capacity_bytes: u64,
    /// One physical table per logical table, instead of one shared table.
    pub split_tables: bool,
    /// Whether corrupt stored keys end scans with an error instead of being skipped.
    pub strict_reads: bool,
    /// Engine page cache size in bytes.
    pub cache_size_bytes: usize,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            mode: OpenMode::Writable,
            buffer_limit_bytes: DEFAULT_BUFFER_LIMIT,
            auto_flush: true,
            capacity_bytes: DEFAULT_CAPACITY,
            split_tables: true,
            strict_reads: false,
            cache_size_bytes: DEFAULT_CACHE_SIZE,
        }
    }
}

impl StoreOptions {
    /// Options for a read-only handle.
    pub fn read_only() -> Self {
        Self::default().mode(OpenMode::ReadOnly)
    }

    /// Sets the access mode.
    pub fn mode(mut self, mode: OpenMode) -> Self {
        self.mode = mode;
        self
    }

    /// Sets the Write Buffer threshold.
    pub fn buffer_limit_bytes(mut self, bytes: u64) -> Self {
        self.buffer_limit_bytes = bytes;
        self
    }

    /// Enables or disables automatic flushing at the threshold.
    pub fn auto_flush(mut self, enabled: bool) -> Self {
        self.auto_flush = enabled;
        self
    }

    /// Sets the store capacity.
    pub fn capacity_bytes(mut self, bytes: u64) -> Self {
        self.capacity_bytes = bytes;
        self
    }

    /// Chooses between per-table and shared physical tables.
    pub fn split_tables(mut self, split: bool) -> Self {
        self.split_tables = split;
        self
    }

    /// Enables or disables strict scans.
    pub fn strict_reads(mut self, strict: bool) -> Self {
        self.strict_reads = strict;
        self
    }

    /// Sets the engine page cache size.
    pub fn cache_size_bytes(mut self, bytes: usize) -> Self {
        self.cache_size_bytes = bytes;
        self
    }
}
