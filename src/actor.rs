use std::fmt;

/// FNV-1a over raw bytes, truncated to 32 bits.
///
/// Deterministic across processes and platforms, unlike `std`'s
/// `RandomState`/`SipHash` (which reseed per process) — bucket placement
/// and the round-robin index in `ClientMessageCenter` both need a hash that
/// produces the same value every run.
fn fnv1a_32(bytes: &[u8]) -> u32 {
    const OFFSET_BASIS: u32 = 0x811c_9dc5;
    const PRIME: u32 = 0x0100_0193;
    let mut hash = OFFSET_BASIS;
    for &b in bytes {
        hash ^= u32::from(b);
        hash = hash.wrapping_mul(PRIME);
    }
    hash
}

/// Opaque identity of an actor (grain), with a stable 32-bit hash used for
/// sticky bucket placement.
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct ActorId {
    key: Vec<u8>,
    is_system_target: bool,
}

impl ActorId {
    pub fn new(key: impl Into<Vec<u8>>, is_system_target: bool) -> Self {
        ActorId {
            key: key.into(),
            is_system_target,
        }
    }

    pub fn from_key(key: impl Into<Vec<u8>>) -> Self {
        ActorId::new(key, false)
    }

    pub fn is_system_target(&self) -> bool {
        self.is_system_target
    }

    /// Stable, non-cryptographic 32-bit hash of this actor's identity.
    pub fn hash_code(&self) -> u32 {
        fnv1a_32(&self.key)
    }

    pub fn key(&self) -> &[u8] {
        &self.key
    }
}

impl fmt::Display for ActorId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match String::from_utf8(self.key.clone()) {
            Ok(s) => write!(f, "{}", s),
            Err(_) => write!(f, "{:02x?}", self.key),
        }
    }
}
