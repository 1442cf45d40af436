use std::hash::{Hash, Hasher};

pub(crate) mod wyhash;

pub trait KeyHasher: Hasher + Default {
    #[inline(always)]
    fn hash_one<S: AsRef<[u8]>>(s: S) -> u64 {
        let mut h = Self::default();
        h.write(s.as_ref());
        h.finish()
    }
}

/// Trait to implement for custom types used as filter keys
///
/// # Example
///
/// ```
/// use vicbf_params::KeyHash;
///
/// #[derive(Hash)]
/// struct Peer {
///     id: u64,
///     name: String,
/// }
///
/// impl KeyHash for Peer {};
/// ```
pub trait KeyHash: Hash {
    fn hash_key<H: KeyHasher>(&self) -> u64 {
        let mut hasher = H::default();
        self.hash(&mut hasher);
        hasher.finish()
    }
}

macro_rules! impl_key_hash {
    ($($t:ty),*) => {
        $(impl KeyHash for $t {})*
    };
}

impl_key_hash!(u8, u16, u32, u64, u128, usize, i8, i16, i32, i64, i128, isize);

// byte like keys are hashed without the length prefix Hash would add
impl KeyHash for [u8] {
    fn hash_key<H: KeyHasher>(&self) -> u64 {
        H::hash_one(self)
    }
}

impl KeyHash for Vec<u8> {
    fn hash_key<H: KeyHasher>(&self) -> u64 {
        H::hash_one(self)
    }
}

impl KeyHash for str {
    fn hash_key<H: KeyHasher>(&self) -> u64 {
        H::hash_one(self)
    }
}

impl KeyHash for String {
    fn hash_key<H: KeyHasher>(&self) -> u64 {
        H::hash_one(self)
    }
}

impl<T: KeyHash + ?Sized> KeyHash for &T {
    fn hash_key<H: KeyHasher>(&self) -> u64 {
        (**self).hash_key::<H>()
    }
}

#[cfg(test)]
mod test {
    use super::{wyhash::WyHasher, KeyHash, KeyHasher};

    #[test]
    fn test_bytes_and_str_agree() {
        let s = "variable increment";
        assert_eq!(
            s.hash_key::<WyHasher>(),
            s.as_bytes().hash_key::<WyHasher>()
        );
        assert_eq!(
            String::from(s).hash_key::<WyHasher>(),
            s.as_bytes().to_vec().hash_key::<WyHasher>()
        );
        assert_eq!(s.hash_key::<WyHasher>(), WyHasher::hash_one(s));
    }

    #[test]
    fn test_integers() {
        let hashes = (0u64..1000)
            .map(|i| i.hash_key::<WyHasher>())
            .collect::<std::collections::HashSet<_>>();
        assert_eq!(hashes.len(), 1000);
        assert_eq!((&42u64).hash_key::<WyHasher>(), 42u64.hash_key::<WyHasher>());
    }
}
