//! Deterministic hash-based identity for bridged classes and callables.
//!
//! [`TypeHash`] is a 64-bit hash computed from a class name or from a
//! callable's owner, name and parameter kinds. The same input always yields
//! the same hash, so a class can be referenced (for example in a parameter
//! kind) before it is registered.
//!
//! # Examples
//!
//! ```
//! use hostbridge_core::TypeHash;
//!
//! let counter = TypeHash::from_name("Counter");
//! assert_eq!(counter, TypeHash::from_name("Counter"));
//!
//! let inc = TypeHash::from_method(counter, "inc", &[TypeHash::from_name("number")]);
//! let inc_async = TypeHash::from_method(counter, "incAsync", &[TypeHash::from_name("number")]);
//! assert_ne!(inc, inc_async);
//! ```

use std::fmt;

use xxhash_rust::xxh64::xxh64;

/// Domain-specific mixing constants for hash computation.
pub mod hash_constants {
    /// Separator constant used when folding parameters into a hash.
    pub const SEP: u64 = 0x4bc94d6bd06053ad;

    /// Domain marker for class hashes.
    pub const TYPE: u64 = 0x2fac10b63a6cc57c;

    /// Domain marker for global function hashes.
    pub const FUNCTION: u64 = 0x5ea77ffbcdf5f302;

    /// Domain marker for method hashes.
    pub const METHOD: u64 = 0x7d3c8b4a92e15f6d;

    /// Domain marker for constructor hashes.
    pub const CONSTRUCTOR: u64 = 0x9a7f3d5e2b8c4601;

    /// Per-position markers so that parameter order changes the hash.
    pub const PARAM_MARKERS: [u64; 8] = [
        0x9e3779b97f4a7c15,
        0xbf58476d1ce4e5b9,
        0x94d049bb133111eb,
        0xd6e8feb86659fd93,
        0xe7037ed1a0b428db,
        0xc6a4a7935bd1e995,
        0x8648dbbc94d49b8d,
        0xa2b48b2c69e0d657,
    ];
}

/// A deterministic 64-bit identity for a class or callable.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
#[repr(transparent)]
pub struct TypeHash(pub u64);

impl TypeHash {
    /// Empty/invalid hash constant.
    pub const EMPTY: TypeHash = TypeHash(0);

    /// Hash of a class (or primitive kind) name.
    #[inline]
    pub fn from_name(name: &str) -> Self {
        TypeHash(hash_constants::TYPE ^ xxh64(name.as_bytes(), 0))
    }

    /// Hash of a global function overload.
    #[inline]
    pub fn from_function(name: &str, params: &[TypeHash]) -> Self {
        Self::fold(hash_constants::FUNCTION ^ xxh64(name.as_bytes(), 0), params)
    }

    /// Hash of a method overload on `owner`.
    #[inline]
    pub fn from_method(owner: TypeHash, name: &str, params: &[TypeHash]) -> Self {
        Self::fold(
            hash_constants::METHOD ^ owner.0 ^ xxh64(name.as_bytes(), 0),
            params,
        )
    }

    /// Hash of a constructor overload on `owner`.
    #[inline]
    pub fn from_constructor(owner: TypeHash, params: &[TypeHash]) -> Self {
        Self::fold(hash_constants::CONSTRUCTOR ^ owner.0, params)
    }

    fn fold(mut hash: u64, params: &[TypeHash]) -> Self {
        for (i, param) in params.iter().enumerate() {
            let marker = hash_constants::PARAM_MARKERS
                .get(i)
                .copied()
                .unwrap_or_else(|| hash_constants::PARAM_MARKERS[0].wrapping_add(i as u64));
            // wrapping_mul keeps the fold order-sensitive
            hash = hash
                .wrapping_mul(hash_constants::SEP)
                .wrapping_add(marker ^ param.0);
        }
        TypeHash(hash)
    }

    /// Check if this is the empty hash.
    #[inline]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Debug for TypeHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TypeHash({:#018x})", self.0)
    }
}

impl fmt::Display for TypeHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#018x}", self.0)
    }
}
