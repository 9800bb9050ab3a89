use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EdgeKey {
    pub low: u32,
    pub high: u32,
}

impl EdgeKey {
    pub fn new(a: u32, b: u32) -> Self {
        if a <= b {
            Self { low: a, high: b }
        } else {
            Self { low: b, high: a }
        }
    }
}

pub fn stable_hash(value: u64) -> u64 {
    let mut hasher = DefaultHasher::new();
    value.hash(&mut hasher);
    hasher.finish()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn edge_key_is_order_independent() {
        assert_eq!(EdgeKey::new(4, 9), EdgeKey::new(9, 4));
        assert_eq!(EdgeKey::new(7, 7).low, EdgeKey::new(7, 7).high);
        assert_ne!(EdgeKey::new(1, 2), EdgeKey::new(1, 3));
    }

    #[test]
    fn stable_hash_is_deterministic() {
        assert_eq!(stable_hash(42), stable_hash(42));
        assert_ne!(stable_hash(42), stable_hash(43));
    }
}
