// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//==============================================================================
// Constants
//==============================================================================

/// Default number of hash buckets (prime).
const DEFAULT_HASH_SIZE: usize = 293;

/// Default number of entries per bucket.
const DEFAULT_BUCKET_LIMIT: usize = 35;

//==============================================================================
// Structures
//==============================================================================

/// SYN Cache Configuration Descriptor
#[derive(Clone, Debug)]
pub struct SynCacheConfig {
    /// Number of hash buckets.
    hash_size: usize,
    /// Maximum entries per bucket.
    bucket_limit: usize,
    /// Maximum entries in the whole cache.
    cache_limit: usize,
}

//==============================================================================
// Associate Functions
//==============================================================================

impl SynCacheConfig {
    /// Creates a SYN Cache Configuration Descriptor.
    pub fn new(hash_size: Option<usize>, bucket_limit: Option<usize>, cache_limit: Option<usize>) -> Self {
        let mut config: Self = Self::default();
        if let Some(value) = hash_size {
            assert!(value > 0);
            config.hash_size = value;
        }
        if let Some(value) = bucket_limit {
            assert!(value > 0);
            config.bucket_limit = value;
        }
        if let Some(value) = cache_limit {
            assert!(value > 0);
            config.cache_limit = value;
        }
        config
    }

    /// Gets the number of hash buckets in the target [SynCacheConfig].
    pub fn get_hash_size(&self) -> usize {
        self.hash_size
    }

    /// Gets the per-bucket entry limit in the target [SynCacheConfig].
    pub fn get_bucket_limit(&self) -> usize {
        self.bucket_limit
    }

    /// Gets the total entry limit in the target [SynCacheConfig].
    pub fn get_cache_limit(&self) -> usize {
        self.cache_limit
    }
}

//==============================================================================
// Trait Implementations
//==============================================================================

impl Default for SynCacheConfig {
    fn default() -> Self {
        Self {
            hash_size: DEFAULT_HASH_SIZE,
            bucket_limit: DEFAULT_BUCKET_LIMIT * 3,
            cache_limit: DEFAULT_HASH_SIZE * DEFAULT_BUCKET_LIMIT,
        }
    }
}
