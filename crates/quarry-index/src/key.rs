use std::cmp::Ordering;
use std::hash::{DefaultHasher, Hash, Hasher};

use quarry_common::Rid;
use quarry_storage::PageId;

/// A fixed-width type that can live in an on-page slot.
///
/// Encoding is little-endian and exactly `LEN` bytes; page views use it to
/// lay slots out at fixed offsets.
pub trait Storable: Copy + Default + PartialEq + Send + Sync + 'static {
    /// Encoded width in bytes.
    const LEN: usize;

    /// Encode into `buf`, which is exactly `LEN` bytes.
    fn write_to(&self, buf: &mut [u8]);

    /// Decode from `buf`, which is exactly `LEN` bytes.
    fn read_from(buf: &[u8]) -> Self;
}

impl Storable for i32 {
    const LEN: usize = 4;

    fn write_to(&self, buf: &mut [u8]) {
        buf.copy_from_slice(&self.to_le_bytes());
    }

    fn read_from(buf: &[u8]) -> Self {
        i32::from_le_bytes(buf.try_into().unwrap())
    }
}

impl Storable for u32 {
    const LEN: usize = 4;

    fn write_to(&self, buf: &mut [u8]) {
        buf.copy_from_slice(&self.to_le_bytes());
    }

    fn read_from(buf: &[u8]) -> Self {
        u32::from_le_bytes(buf.try_into().unwrap())
    }
}

impl Storable for u64 {
    const LEN: usize = 8;

    fn write_to(&self, buf: &mut [u8]) {
        buf.copy_from_slice(&self.to_le_bytes());
    }

    fn read_from(buf: &[u8]) -> Self {
        u64::from_le_bytes(buf.try_into().unwrap())
    }
}

impl Storable for PageId {
    const LEN: usize = 4;

    fn write_to(&self, buf: &mut [u8]) {
        buf.copy_from_slice(&self.0.to_le_bytes());
    }

    fn read_from(buf: &[u8]) -> Self {
        PageId(i32::from_le_bytes(buf.try_into().unwrap()))
    }
}

impl Storable for Rid {
    const LEN: usize = 8;

    fn write_to(&self, buf: &mut [u8]) {
        buf[..4].copy_from_slice(&self.page_id.to_le_bytes());
        buf[4..].copy_from_slice(&self.slot.to_le_bytes());
    }

    fn read_from(buf: &[u8]) -> Self {
        Rid {
            page_id: i32::from_le_bytes(buf[..4].try_into().unwrap()),
            slot: u32::from_le_bytes(buf[4..].try_into().unwrap()),
        }
    }
}

/// An opaque fixed-width key of `N` bytes, compared byte-wise.
///
/// Narrower values are stored left-aligned with zero padding, so integer
/// keys round-trip through `from_u64`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GenericKey<const N: usize> {
    data: [u8; N],
}

impl<const N: usize> GenericKey<N> {
    pub const fn new(data: [u8; N]) -> Self {
        Self { data }
    }

    pub fn from_u64(value: u64) -> Self {
        let mut data = [0u8; N];
        let bytes = value.to_le_bytes();
        let n = N.min(8);
        data[..n].copy_from_slice(&bytes[..n]);
        Self { data }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }
}

impl<const N: usize> Default for GenericKey<N> {
    fn default() -> Self {
        Self { data: [0; N] }
    }
}

impl<const N: usize> Storable for GenericKey<N> {
    const LEN: usize = N;

    fn write_to(&self, buf: &mut [u8]) {
        buf.copy_from_slice(&self.data);
    }

    fn read_from(buf: &[u8]) -> Self {
        let mut data = [0u8; N];
        data.copy_from_slice(buf);
        Self { data }
    }
}

/// Three-way key comparison seam.
pub trait KeyComparator<K>: Send + Sync {
    fn compare(&self, lhs: &K, rhs: &K) -> Ordering;
}

/// Comparator for keys with a total order.
#[derive(Clone, Copy, Debug, Default)]
pub struct OrdComparator;

impl<K: Ord> KeyComparator<K> for OrdComparator {
    fn compare(&self, lhs: &K, rhs: &K) -> Ordering {
        lhs.cmp(rhs)
    }
}

/// Key hashing seam. The extendible hash table only consumes the low
/// `global_depth` bits, so implementations must spread entropy into them.
pub trait KeyHasher<K>: Send + Sync {
    fn hash_key(&self, key: &K) -> u32;
}

/// Hashes through `std::hash::DefaultHasher` and downcasts the 64-bit
/// result to the 32 bits extendible hashing consumes.
#[derive(Clone, Copy, Debug, Default)]
pub struct DefaultKeyHasher;

impl<K: Hash> KeyHasher<K> for DefaultKeyHasher {
    fn hash_key(&self, key: &K) -> u32 {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        hasher.finish() as u32
    }
}

/// Uses a `u32` key as its own hash. Deterministic bucket targeting for
/// tests that need to force collisions and splits.
#[derive(Clone, Copy, Debug, Default)]
pub struct IdentityHasher;

impl KeyHasher<u32> for IdentityHasher {
    fn hash_key(&self, key: &u32) -> u32 {
        *key
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip<T: Storable + std::fmt::Debug>(value: T) {
        let mut buf = vec![0u8; T::LEN];
        value.write_to(&mut buf);
        assert_eq!(T::read_from(&buf), value);
    }

    #[test]
    fn primitive_roundtrips() {
        roundtrip(-7i32);
        roundtrip(0xDEAD_BEEFu32);
        roundtrip(u64::MAX - 1);
        roundtrip(PageId(42));
        roundtrip(PageId::INVALID);
        roundtrip(Rid::new(3, 9));
    }

    #[test]
    fn generic_key_roundtrip() {
        roundtrip(GenericKey::<8>::from_u64(123_456));
        roundtrip(GenericKey::<4>::from_u64(77));
        roundtrip(GenericKey::<64>::from_u64(u64::MAX));
    }

    #[test]
    fn generic_key_orders_bytewise() {
        let a = GenericKey::<8>::new([0, 0, 0, 0, 0, 0, 0, 1]);
        let b = GenericKey::<8>::new([1, 0, 0, 0, 0, 0, 0, 0]);
        assert!(a < b);
        assert_eq!(OrdComparator.compare(&a, &b), Ordering::Less);
    }

    #[test]
    fn default_hasher_is_stable() {
        let key = GenericKey::<8>::from_u64(99);
        let h1 = DefaultKeyHasher.hash_key(&key);
        let h2 = DefaultKeyHasher.hash_key(&key);
        assert_eq!(h1, h2);
    }

    #[test]
    fn identity_hasher_passes_through() {
        assert_eq!(IdentityHasher.hash_key(&0b1011), 0b1011);
    }
}
