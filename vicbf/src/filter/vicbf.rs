use std::io::{self, BufWriter, Read, Write};

use crate::{
    estimate_fpr,
    hash::{wyhash::WyHasher, KeyHash, KeyHasher},
    utils::{read_le_u32, read_u8},
    Error,
};

use super::{Filter, HEADER_SIZE};

const VERSION: u8 = 1;
/// A counter holding this value has overflowed, it never rules a key out
/// and is never decremented.
const SATURATED: u8 = u8::MAX;
const MAX_DIGIT_BASE: u8 = u8::MAX / 2;

/// Reference digit base of the encoding
pub const DIGIT_BASE: u8 = 4;

#[inline(always)]
fn xorshift_star(mut seed: u64) -> u64 {
    seed ^= seed.wrapping_shl(12);
    seed ^= seed.wrapping_shr(25);
    seed ^= seed.wrapping_shl(27);
    seed.wrapping_mul(2685821657736338717)
}

/// Iterates over the `(slot, increment)` pairs of a key, slots are
/// derived by double hashing.
#[derive(Debug, Clone, Copy)]
struct Probes {
    h1: u64,
    h2: u64,
    i: u64,
    count: u64,
    slots: u64,
    digit_base: u64,
}

impl Probes {
    fn new<K: KeyHash + ?Sized>(key: &K, count: u64, slots: u64, digit_base: u8) -> Self {
        Self {
            h1: key.hash_key::<WyHasher>(),
            h2: 0,
            i: 0,
            count,
            slots,
            digit_base: digit_base as u64,
        }
    }
}

impl Iterator for Probes {
    type Item = (usize, u8);

    #[inline]
    fn next(&mut self) -> Option<Self::Item> {
        if self.i >= self.count {
            return None;
        }

        if self.i > 0 {
            // h2 is only needed from the second probe
            if self.i == 1 {
                self.h2 = WyHasher::hash_one(self.h1.to_be_bytes());
            }
            self.h1 = self.h1.wrapping_add(self.h2);
            self.h2 = self.h2.wrapping_add(self.i);
        }
        self.i += 1;

        let slot = self.h1 % self.slots;
        // increments are taken in [l, 2l-1]
        let inc = self.digit_base + xorshift_star(self.h1) % self.digit_base;
        Some((slot as usize, inc as u8))
    }
}

/// Variable increment counting bloom filter. Every slot is a byte counter
/// and each key adds to its `k` slots an increment taken in `[l, 2l-1]`,
/// where `l` is the digit base. The sum found in a counter tells whether a
/// given increment can be part of it, which makes the filter more selective
/// than a plain counting bloom filter while still supporting removal.
#[derive(Debug, Clone, PartialEq)]
pub struct VariableIncrementFilter {
    digit_base: u8,
    n_hash: u32,
    /// number of keys inserted (or estimated when read from serialized data)
    count: u64,
    counters: Vec<u8>,
}

impl VariableIncrementFilter {
    pub fn new(slots: u64, hash_functions: u64) -> Result<Self, Error> {
        Self::with_digit_base(slots, hash_functions, DIGIT_BASE)
    }

    pub fn with_digit_base(slots: u64, hash_functions: u64, digit_base: u8) -> Result<Self, Error> {
        if slots == 0 || slots > u32::MAX as u64 {
            return Err(Error::InvalidParams(format!(
                "slots must be in [1, {}], got {slots}",
                u32::MAX
            )));
        }

        if hash_functions == 0 || hash_functions > u32::MAX as u64 {
            return Err(Error::InvalidParams(format!(
                "hash functions must be in [1, {}], got {hash_functions}",
                u32::MAX
            )));
        }

        if !(1..=MAX_DIGIT_BASE).contains(&digit_base) {
            return Err(Error::InvalidParams(format!(
                "digit base must be in [1, {MAX_DIGIT_BASE}], got {digit_base}"
            )));
        }

        Ok(Self {
            digit_base,
            n_hash: hash_functions as u32,
            count: 0,
            counters: vec![0; slots as usize],
        })
    }

    #[inline(always)]
    fn probes<K: KeyHash + ?Sized>(&self, key: &K) -> Probes {
        Probes::new(
            key,
            self.n_hash as u64,
            self.counters.len() as u64,
            self.digit_base,
        )
    }

    #[inline]
    pub fn insert<K: KeyHash + ?Sized>(&mut self, key: &K) {
        for (slot, inc) in self.probes(key) {
            let c = &mut self.counters[slot];
            if *c != SATURATED {
                *c = c.saturating_add(inc);
            }
        }
        self.count += 1;
    }

    #[inline]
    pub fn contains<K: KeyHash + ?Sized>(&self, key: &K) -> bool {
        self.probes(key).all(|(slot, inc)| {
            let c = self.counters[slot];
            // a sum of at least two increments is >= inc + l
            c == SATURATED || c == inc || (c > inc && c - inc >= self.digit_base)
        })
    }

    /// Removes a key previously inserted. Removing a key never inserted may
    /// introduce false negatives when the key is a false positive.
    pub fn remove<K: KeyHash + ?Sized>(&mut self, key: &K) -> Result<(), Error> {
        if !self.contains(key) {
            return Err(Error::NotPresent);
        }

        for (slot, inc) in self.probes(key) {
            let c = &mut self.counters[slot];
            if *c != SATURATED {
                *c = c.saturating_sub(inc);
            }
        }
        self.count = self.count.saturating_sub(1);
        Ok(())
    }

    /// Clears out the filter
    pub fn clear(&mut self) {
        self.counters.iter_mut().for_each(|c| *c = 0);
        self.count = 0;
    }

    #[inline(always)]
    pub fn slots(&self) -> u64 {
        self.counters.len() as u64
    }

    #[inline(always)]
    pub fn hash_functions(&self) -> u64 {
        self.n_hash as u64
    }

    #[inline(always)]
    pub fn digit_base(&self) -> u8 {
        self.digit_base
    }

    #[inline(always)]
    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn saturated(&self) -> usize {
        self.counters.iter().filter(|&&c| c == SATURATED).count()
    }

    /// Estimates the number of keys from the sum of the counters, an
    /// increment averages `(3l-1)/2`.
    pub fn count_estimate(&self) -> u64 {
        let sum: u64 = self
            .counters
            .iter()
            .filter(|&&c| c != SATURATED)
            .map(|&c| c as u64)
            .sum();
        let l = self.digit_base as f64;
        let avg_inc = (3.0 * l - 1.0) / 2.0;
        (sum as f64 / (avg_inc * self.n_hash as f64)).round() as u64
    }

    /// Estimated false positive rate given the number of keys inserted
    pub fn fpr(&self) -> f64 {
        estimate_fpr(
            self.count as f64,
            self.counters.len() as f64,
            self.digit_base as f64,
            self.n_hash as f64,
        )
    }

    #[inline(always)]
    pub fn size_in_bytes(&self) -> usize {
        HEADER_SIZE + self.counters.len()
    }

    pub fn write<W: Write>(&self, w: &mut W) -> Result<(), Error> {
        let mut w = BufWriter::new(w);

        w.write_all(&[VERSION, self.digit_base])?;
        w.write_all(&self.n_hash.to_le_bytes())?;
        w.write_all(&(self.counters.len() as u32).to_le_bytes())?;
        w.write_all(&self.counters)?;
        w.flush()?;
        Ok(())
    }

    pub fn from_reader<R: Read>(r: R) -> Result<Self, Error> {
        let mut br = io::BufReader::new(r);
        let r = &mut br;

        let version = read_u8(r)?;
        if version != VERSION {
            return Err(Error::InvalidVersion(version));
        }

        let digit_base = read_u8(r)?;
        let n_hash = read_le_u32(r)?;
        let slots = read_le_u32(r)?;

        let mut f = Self::with_digit_base(slots as u64, n_hash as u64, digit_base)
            .map_err(|e| Error::Corrupted(e.to_string()))?;
        r.read_exact(f.counters.as_mut_slice())?;

        if r.bytes().next().is_some() {
            return Err(Error::Corrupted("trailing data after counters".into()));
        }

        f.count = f.count_estimate();
        Ok(f)
    }
}

impl Filter for VariableIncrementFilter {
    fn with_params(slots: u64, hash_functions: u64) -> Result<Self, Error> {
        Self::new(slots, hash_functions)
    }

    fn insert<K: KeyHash + ?Sized>(&mut self, key: &K) -> Result<(), Error> {
        VariableIncrementFilter::insert(self, key);
        Ok(())
    }

    fn contains<K: KeyHash + ?Sized>(&self, key: &K) -> bool {
        VariableIncrementFilter::contains(self, key)
    }

    fn serialize(&self) -> Result<Vec<u8>, Error> {
        let mut out = Vec::with_capacity(self.size_in_bytes());
        self.write(&mut out)?;
        Ok(out)
    }

    fn fpr(&self) -> f64 {
        VariableIncrementFilter::fpr(self)
    }
}

#[cfg(test)]
mod test {
    use rand::{rngs::StdRng, Rng, SeedableRng};

    use crate::utils::Stats;

    use super::*;

    #[test]
    fn test_insert_contains() {
        let mut f = VariableIncrementFilter::new(1000, 3).unwrap();
        assert!(!f.contains("hello"));
        f.insert("hello");
        f.insert(&String::from("world"));
        f.insert(&42u64);
        assert!(f.contains("hello"));
        assert!(f.contains("world"));
        assert!(f.contains(&42u64));
        assert!(!f.contains("unknown"));
        assert_eq!(f.count(), 3);
    }

    #[test]
    fn test_probes() {
        let f = VariableIncrementFilter::new(6082, 7).unwrap();
        let probes = f.probes(&1234u64).collect::<Vec<_>>();
        assert_eq!(probes.len(), 7);
        for (slot, inc) in probes {
            assert!(slot < 6082);
            assert!((DIGIT_BASE..2 * DIGIT_BASE).contains(&inc));
        }
        // probes only depend on the key
        assert_eq!(
            f.probes(&1234u64).collect::<Vec<_>>(),
            f.probes(&1234u64).collect::<Vec<_>>()
        );
    }

    #[test]
    fn test_no_false_negative() {
        let mut f = VariableIncrementFilter::new(6082, 7).unwrap();
        (0..1000u64).for_each(|i| f.insert(&i));
        assert!((0..1000u64).all(|i| f.contains(&i)));
    }

    #[test]
    fn test_remove() {
        let mut f = VariableIncrementFilter::new(2000, 4).unwrap();
        (0..200u64).for_each(|i| f.insert(&i));

        for i in 0..100u64 {
            f.remove(&i).unwrap();
        }
        assert_eq!(f.count(), 100);
        // remaining keys are still there
        assert!((100..200u64).all(|i| f.contains(&i)));

        (100..200u64).for_each(|i| f.remove(&i).unwrap());
        assert!(f.counters.iter().all(|&c| c == 0));
        assert!(matches!(f.remove(&0u64), Err(Error::NotPresent)));

        f.insert("again");
        f.clear();
        assert_eq!(f.count(), 0);
        assert!(!f.contains("again"));
    }

    #[test]
    fn test_saturation() {
        // a single slot quickly overflows
        let mut f = VariableIncrementFilter::new(1, 1).unwrap();
        (0..100u64).for_each(|i| f.insert(&i));
        assert_eq!(f.saturated(), 1);
        // a saturated counter can never rule a key out
        assert!(f.contains("anything"));
        f.remove(&0u64).unwrap();
        assert_eq!(f.saturated(), 1);
    }

    #[test]
    fn test_fpr_matches_estimate() {
        let mut rng: StdRng = SeedableRng::from_seed([42; 32]);
        let mut f = VariableIncrementFilter::new(6082, 7).unwrap();
        (0..1000u64).for_each(|i| f.insert(&i));

        let mut s = Stats::new();
        for _ in 0..200_000 {
            let probe: u64 = rng.gen_range(1000..u64::MAX);
            s.record(f.contains(&probe));
        }

        let expected = f.fpr();
        assert!((expected - 0.0011).abs() < 0.0001);
        assert!(
            s.fp_rate() < expected * 2.0,
            "real fpr: {} VS expected: {}",
            s.fp_rate(),
            expected
        );
    }

    #[test]
    fn test_empty_fpr() {
        let f = VariableIncrementFilter::new(100, 3).unwrap();
        assert_eq!(f.fpr(), 0.0);
    }

    #[test]
    fn test_invalid_params() {
        assert!(matches!(
            VariableIncrementFilter::new(0, 3),
            Err(Error::InvalidParams(_))
        ));
        assert!(matches!(
            VariableIncrementFilter::new(100, 0),
            Err(Error::InvalidParams(_))
        ));
        assert!(matches!(
            VariableIncrementFilter::with_digit_base(100, 3, 0),
            Err(Error::InvalidParams(_))
        ));
        assert!(matches!(
            VariableIncrementFilter::with_digit_base(100, 3, 128),
            Err(Error::InvalidParams(_))
        ));
    }

    #[test]
    fn test_serialization() {
        let mut f = VariableIncrementFilter::new(990, 3).unwrap();
        (0..100u64).for_each(|i| f.insert(&i));

        let data = f.serialize().unwrap();
        assert_eq!(data.len(), 1000);
        assert_eq!(data.len(), f.size_in_bytes());
        assert_eq!(&data[..2], &[VERSION, DIGIT_BASE]);

        let g = VariableIncrementFilter::from_reader(io::Cursor::new(&data)).unwrap();
        assert_eq!(g.counters, f.counters);
        assert_eq!(g.hash_functions(), 3);
        assert_eq!(g.digit_base(), DIGIT_BASE);
        assert!((0..100u64).all(|i| g.contains(&i)));
        // count is estimated from counters
        assert!(g.count().abs_diff(100) <= 10, "count={}", g.count());
    }

    #[test]
    fn test_corrupted_data() {
        let f = VariableIncrementFilter::new(16, 2).unwrap();
        let mut data = f.serialize().unwrap();

        let mut wrong_version = data.clone();
        wrong_version[0] = 42;
        assert!(matches!(
            VariableIncrementFilter::from_reader(io::Cursor::new(wrong_version)),
            Err(Error::InvalidVersion(42))
        ));

        let truncated = data[..data.len() - 1].to_vec();
        assert!(matches!(
            VariableIncrementFilter::from_reader(io::Cursor::new(truncated)),
            Err(Error::IoError(_))
        ));

        data.push(0);
        assert!(matches!(
            VariableIncrementFilter::from_reader(io::Cursor::new(data)),
            Err(Error::Corrupted(_))
        ));
    }
}
