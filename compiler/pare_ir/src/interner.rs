//! Sharded string interner backing every [`Name`] in the program model.
//!
//! Class descriptors, member names and string constants are interned once
//! per process. Interning is concurrent (per-shard `RwLock`) so the parallel
//! method processor can synthesize names from worker threads.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::OnceLock;

use parking_lot::RwLock;
use rustc_hash::FxHashMap;

use super::Name;

/// Per-shard storage for interned strings.
struct InternShard {
    /// Map from string content to local index.
    map: FxHashMap<&'static str, u32>,
    /// Storage for string contents.
    strings: Vec<&'static str>,
}

impl InternShard {
    fn new() -> Self {
        Self {
            map: FxHashMap::default(),
            strings: Vec::with_capacity(512),
        }
    }

    fn with_empty() -> Self {
        let mut shard = Self::new();
        let empty: &'static str = "";
        shard.map.insert(empty, 0);
        shard.strings.push(empty);
        shard
    }
}

/// Error when interning a string fails.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InternError {
    /// Shard exceeded its 28-bit local index space.
    #[error("interner shard {shard_idx} exceeded capacity: {count} strings, max is {max}", max = Name::MAX_LOCAL)]
    ShardOverflow { shard_idx: usize, count: usize },
}

/// Sharded string interner for concurrent access.
///
/// # Thread Safety
/// Uses `RwLock` per shard. Lookups only take a read lock; inserts take the
/// write lock of a single shard.
pub struct StringInterner {
    shards: [RwLock<InternShard>; Name::NUM_SHARDS],
    /// Total count of interned strings across all shards (O(1) `len()`).
    total_count: AtomicUsize,
}

impl StringInterner {
    /// Create a new interner with the well-known descriptors pre-interned.
    pub fn new() -> Self {
        let shards = std::array::from_fn(|i| {
            if i == 0 {
                RwLock::new(InternShard::with_empty())
            } else {
                RwLock::new(InternShard::new())
            }
        });

        let interner = Self {
            shards,
            total_count: AtomicUsize::new(1),
        };
        interner.pre_intern_well_known();
        interner
    }

    /// Compute shard for a string based on its hash.
    ///
    /// Descriptors share long package prefixes, so the tail of the string is
    /// hashed rather than the head.
    #[inline]
    fn shard_for(s: &str) -> usize {
        let mut hash = 0u32;
        for byte in s.bytes().rev().take(12) {
            hash = hash.wrapping_mul(31).wrapping_add(u32::from(byte));
        }
        (hash as usize) % Name::NUM_SHARDS
    }

    /// Try to intern a string, returning its Name or an error on overflow.
    pub fn try_intern(&self, s: &str) -> Result<Name, InternError> {
        self.intern_with(s, || Box::leak(s.to_owned().into_boxed_str()))
    }

    /// Try to intern an owned String without a second allocation.
    pub fn try_intern_owned(&self, s: String) -> Result<Name, InternError> {
        if let Some(name) = self.lookup_existing(&s) {
            return Ok(name);
        }
        // Losing a race here leaks one duplicate allocation; the stored
        // string is whichever insert won the write lock.
        let leaked: &'static str = Box::leak(s.into_boxed_str());
        self.intern_with(leaked, || leaked)
    }

    fn lookup_existing(&self, s: &str) -> Option<Name> {
        let shard_idx = Self::shard_for(s);
        let guard = self.shards[shard_idx].read();
        guard
            .map
            .get(s)
            .map(|&local| Name::new(shard_index_u32(shard_idx), local))
    }

    fn intern_with(
        &self,
        s: &str,
        leak: impl FnOnce() -> &'static str,
    ) -> Result<Name, InternError> {
        let shard_idx = Self::shard_for(s);
        let shard_idx_u32 = shard_index_u32(shard_idx);
        let shard = &self.shards[shard_idx];

        // Fast path: already interned.
        {
            let guard = shard.read();
            if let Some(&local) = guard.map.get(s) {
                return Ok(Name::new(shard_idx_u32, local));
            }
        }

        let mut guard = shard.write();

        // Double-check after acquiring write lock.
        if let Some(&local) = guard.map.get(s) {
            return Ok(Name::new(shard_idx_u32, local));
        }

        let count = guard.strings.len();
        let local = u32::try_from(count)
            .ok()
            .filter(|&local| local <= Name::MAX_LOCAL)
            .ok_or(InternError::ShardOverflow { shard_idx, count })?;

        let leaked = leak();
        guard.strings.push(leaked);
        guard.map.insert(leaked, local);
        self.total_count.fetch_add(1, Ordering::Relaxed);

        Ok(Name::new(shard_idx_u32, local))
    }

    /// Intern a string, returning its Name.
    ///
    /// # Panics
    /// Panics if a shard exceeds capacity. Use `try_intern` for fallible interning.
    #[inline]
    pub fn intern(&self, s: &str) -> Name {
        self.try_intern(s).unwrap_or_else(|e| panic!("{}", e))
    }

    /// Intern an owned String, avoiding double allocation.
    ///
    /// # Panics
    /// Panics if a shard exceeds capacity.
    pub fn intern_owned(&self, s: String) -> Name {
        self.try_intern_owned(s).unwrap_or_else(|e| panic!("{}", e))
    }

    /// Look up the string for a Name.
    ///
    /// All interned strings are leaked, so the result is `'static`.
    pub fn lookup_static(&self, name: Name) -> &'static str {
        let guard = self.shards[name.shard()].read();
        guard.strings[name.local()]
    }

    /// Pre-intern descriptors and member names every pass touches.
    fn pre_intern_well_known(&self) {
        const WELL_KNOWN: &[&str] = &[
            "V",
            "Z",
            "B",
            "S",
            "C",
            "I",
            "J",
            "F",
            "D",
            "[I",
            "Ljava/lang/Object;",
            "Ljava/lang/String;",
            "Ljava/lang/Enum;",
            "Ljava/lang/Class;",
            "<init>",
            "<clinit>",
            "ordinal",
            "name",
            "values",
            "valueOf",
            "$VALUES",
        ];

        for s in WELL_KNOWN {
            self.intern(s);
        }
    }

    /// Get the number of interned strings (O(1)).
    pub fn len(&self) -> usize {
        self.total_count.load(Ordering::Relaxed)
    }

    /// Check if the interner only holds the empty string.
    pub fn is_empty(&self) -> bool {
        self.len() <= 1
    }
}

impl Default for StringInterner {
    fn default() -> Self {
        Self::new()
    }
}

#[expect(
    clippy::cast_possible_truncation,
    reason = "shard_idx is bounded by NUM_SHARDS (16)"
)]
#[inline]
fn shard_index_u32(shard_idx: usize) -> u32 {
    shard_idx as u32
}

static GLOBAL: OnceLock<StringInterner> = OnceLock::new();

/// The process-wide interner used by [`Name::intern`] and [`Name::as_str`].
pub fn global() -> &'static StringInterner {
    GLOBAL.get_or_init(StringInterner::new)
}
