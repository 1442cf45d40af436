use std::hash::Hasher;

use wyhash::WyHash;

use super::KeyHasher;

// "vicbf" padded
const SEED: u64 = 0x7669636266000000;

#[derive(Clone)]
pub struct WyHasher {
    h: WyHash,
}

impl Default for WyHasher {
    fn default() -> Self {
        Self {
            h: WyHash::with_seed(SEED),
        }
    }
}

impl Hasher for WyHasher {
    #[inline(always)]
    fn write(&mut self, bytes: &[u8]) {
        self.h.write(bytes)
    }

    #[inline(always)]
    fn finish(&self) -> u64 {
        self.h.finish()
    }
}

impl KeyHasher for WyHasher {}

#[cfg(test)]
mod test {

    use crate::hash::KeyHasher;

    use super::WyHasher;

    #[test]
    fn test_hasher() {
        assert_eq!(WyHasher::hash_one("vicbf"), WyHasher::hash_one("vicbf"));
        assert_ne!(WyHasher::hash_one("vicbf"), WyHasher::hash_one("vicbF"));
        assert_ne!(
            WyHasher::hash_one(0u64.to_le_bytes()),
            WyHasher::hash_one(1u64.to_le_bytes())
        );
    }
}
