// Cryptographic hashing wrapper. The protocol is fixed to SHA-256 throughout
// (body binding, cur_hash, link_hash) — unlike the teacher, which reaches
// for SHA3-256; the spec is explicit, so the wrapper is too.

use sha2::{Digest, Sha256};

pub fn sha256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hasher.finalize().into()
}

/// Hash `a` then `b` without allocating an intermediate concatenated buffer.
pub fn sha256_concat(a: &[u8], b: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(a);
    hasher.update(b);
    hasher.finalize().into()
}

/// Hash three inputs in sequence, for link_hash's cur_hash || prev_hash || nonce shape.
pub fn sha256_concat3(a: &[u8], b: &[u8], c: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(a);
    hasher.update(b);
    hasher.update(c);
    hasher.finalize().into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sha256_length() {
        assert_eq!(sha256(b"floatchain").len(), 32);
    }

    #[test]
    fn test_concat_matches_manual() {
        let a = b"abc";
        let b = b"def";
        let mut manual = Vec::new();
        manual.extend_from_slice(a);
        manual.extend_from_slice(b);
        assert_eq!(sha256_concat(a, b), sha256(&manual));
    }
}
