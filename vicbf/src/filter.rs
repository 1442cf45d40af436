//! Filter and compressor seams used to check the analytic estimates against
//! real, serialized filters.

use rand::Rng;

use crate::{hash::KeyHash, utils::Stats, Error, FilterSpec};

mod vicbf;
pub use vicbf::*;

/// Size in bytes of the header preceding the counters of a serialized filter
pub const HEADER_SIZE: usize = 10;

/// Compression level used by default when measuring filters
pub const DEFAULT_LEVEL: i32 = 6;

pub trait Filter: Sized {
    fn with_params(slots: u64, hash_functions: u64) -> Result<Self, Error>;

    fn insert<K: KeyHash + ?Sized>(&mut self, key: &K) -> Result<(), Error>;

    fn contains<K: KeyHash + ?Sized>(&self, key: &K) -> bool;

    fn serialize(&self) -> Result<Vec<u8>, Error>;

    /// false positive rate given the current content of the filter
    fn fpr(&self) -> f64;
}

pub trait Compressor {
    fn compress(&self, data: &[u8], level: i32) -> Result<Vec<u8>, Error>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct ZstdCompressor;

impl Compressor for ZstdCompressor {
    fn compress(&self, data: &[u8], level: i32) -> Result<Vec<u8>, Error> {
        zstd::encode_all(data, level).map_err(Error::Compression)
    }
}

/// Lengths of a serialized filter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SerializedSize {
    pub uncompressed: usize,
    pub compressed: usize,
}

impl SerializedSize {
    pub fn of<F: Filter, C: Compressor>(f: &F, c: &C, level: i32) -> Result<Self, Error> {
        let data = f.serialize()?;
        Ok(Self {
            uncompressed: data.len(),
            compressed: c.compress(&data, level)?.len(),
        })
    }

    pub fn ratio(&self) -> f64 {
        self.compressed as f64 / self.uncompressed as f64
    }
}

/// Builds a filter with the parameters of `spec`, inserts keys
/// `0..spec.entries` and measures its serialized size.
pub fn measure<F: Filter, C: Compressor>(
    spec: &FilterSpec,
    c: &C,
    level: i32,
) -> Result<(F, SerializedSize), Error> {
    let mut f = F::with_params(spec.slots, spec.hash_functions)?;
    for key in 0..spec.entries {
        f.insert(&key)?;
    }

    let size = SerializedSize::of(&f, c, level)?;
    Ok((f, size))
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GrowthPoint {
    pub inserted: u64,
    pub size: SerializedSize,
    pub fpr: f64,
}

/// Inserts keys `0..entries` in a fresh filter and records its serialized
/// size every `step` insertions (starting with the first one).
pub fn growth<F: Filter, C: Compressor>(
    slots: u64,
    hash_functions: u64,
    entries: u64,
    step: u64,
    c: &C,
    level: i32,
) -> Result<Vec<GrowthPoint>, Error> {
    if step == 0 {
        return Err(Error::InvalidParams("step must be positive".into()));
    }

    let mut f = F::with_params(slots, hash_functions)?;
    let mut points = Vec::with_capacity((entries / step + 1) as usize);

    for key in 0..entries {
        f.insert(&key)?;
        if key % step == 0 {
            points.push(GrowthPoint {
                inserted: key + 1,
                size: SerializedSize::of(&f, c, level)?,
                fpr: f.fpr(),
            });
        }
    }

    Ok(points)
}

/// Queries `probes` random keys, all greater or equal to `entries`, on a filter
/// holding keys `0..entries` and counts how many are wrongly reported.
pub fn empirical_fpr<F: Filter, R: Rng>(f: &F, entries: u64, probes: u64, rng: &mut R) -> Stats {
    let mut s = Stats::new();
    for _ in 0..probes {
        let key: u64 = rng.gen_range(entries..=u64::MAX);
        s.record(f.contains(&key));
    }
    s
}
