use std::{
    fmt::Display,
    io::{self, Read},
    time::{Duration, Instant},
};

pub(crate) fn read_le_u32<R: Read>(r: &mut R) -> Result<u32, io::Error> {
    let mut bytes = [0u8; 4];
    r.read_exact(bytes.as_mut_slice())?;
    Ok(u32::from_le_bytes(bytes))
}

pub(crate) fn read_u8<R: Read>(r: &mut R) -> Result<u8, io::Error> {
    let mut byte = [0u8; 1];
    r.read_exact(byte.as_mut_slice())?;
    Ok(byte[0])
}

const UNITS: [&str; 4] = ["KB", "MB", "GB", "TB"];

/// Number of bytes displayed in the largest binary unit it fits in
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct ByteSize(u64);

impl ByteSize {
    #[inline(always)]
    pub fn from_bytes(b: usize) -> Self {
        Self(b as u64)
    }

    #[inline(always)]
    pub fn in_bytes(&self) -> u64 {
        self.0
    }
}

impl Display for ByteSize {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.0 < 1024 {
            return write!(f, "{}B", self.0);
        }

        let mut size = self.0 as f64 / 1024.0;
        let mut unit = 0;
        while size >= 1024.0 && unit < UNITS.len() - 1 {
            size /= 1024.0;
            unit += 1;
        }
        write!(f, "{size:.1}{}", UNITS[unit])
    }
}

impl From<u64> for ByteSize {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

pub fn time_it_once<T, F: FnOnce() -> T>(f: F) -> (T, Duration) {
    let start_time = Instant::now();
    let out = f();
    (out, start_time.elapsed())
}

/// Outcome of membership queries for keys known to be absent
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Stats {
    false_positives: u64,
    queries: u64,
}

impl Stats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a query, `reported` being the answer of the filter
    #[inline]
    pub fn record(&mut self, reported: bool) {
        self.queries += 1;
        if reported {
            self.false_positives += 1;
        }
    }

    pub fn false_positives(&self) -> u64 {
        self.false_positives
    }

    pub fn total(&self) -> u64 {
        self.queries
    }

    /// NaN when nothing was queried
    pub fn fp_rate(&self) -> f64 {
        self.false_positives as f64 / self.queries as f64
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_byte_size() {
        assert_eq!(ByteSize::from_bytes(1000).to_string(), "1000B");
        assert_eq!(ByteSize::from_bytes(6092).to_string(), "5.9KB");
        assert_eq!(ByteSize::from(3 << 20).to_string(), "3.0MB");
        assert_eq!(ByteSize::from(5 << 40).to_string(), "5.0TB");
        assert_eq!(ByteSize::from(1 << 50).to_string(), "1024.0TB");
        assert_eq!(ByteSize::from_bytes(42).in_bytes(), 42);
    }

    #[test]
    fn test_stats() {
        let mut s = Stats::new();
        assert!(s.fp_rate().is_nan());
        s.record(true);
        (0..3).for_each(|_| s.record(false));
        assert_eq!(s.fp_rate(), 0.25);
        assert_eq!(s.total(), 4);
        assert_eq!(s.false_positives(), 1);
    }

    #[test]
    fn test_read_le() {
        let mut r = io::Cursor::new([7u8, 1, 0, 0, 0]);
        assert_eq!(read_u8(&mut r).unwrap(), 7);
        assert_eq!(read_le_u32(&mut r).unwrap(), 1);
        assert!(read_u8(&mut r).is_err());
    }
}
