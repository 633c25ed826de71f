use crate::foundation::core::Vec2Array;
use xxhash_rust::xxh3::Xxh3;

const XXH3_SEED: u64 = 0x5c3a_91d7_e24b_08f6;

/// Stable 128-bit fingerprint of a deformer's emitted state.
///
/// Path deformers record one per target so that a repeated `deform` call with an unchanged
/// curve can answer `changed = false` without recomputing.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub(crate) struct StateFingerprint {
    pub(crate) hi: u64,
    pub(crate) lo: u64,
}

pub(crate) struct StableHasher {
    inner: Xxh3,
}

impl StableHasher {
    pub(crate) fn new() -> Self {
        Self {
            inner: Xxh3::with_seed(XXH3_SEED),
        }
    }

    pub(crate) fn write_bytes(&mut self, b: &[u8]) {
        self.inner.update(b);
    }

    pub(crate) fn write_u8(&mut self, v: u8) {
        self.write_bytes(&[v]);
    }

    pub(crate) fn write_u32(&mut self, v: u32) {
        self.write_bytes(&v.to_le_bytes());
    }

    pub(crate) fn write_u64(&mut self, v: u64) {
        self.write_bytes(&v.to_le_bytes());
    }

    pub(crate) fn write_f64(&mut self, v: f64) {
        self.write_u64(v.to_bits());
    }

    pub(crate) fn write_vec2_array(&mut self, arr: &Vec2Array) {
        self.write_u32(arr.len() as u32);
        for v in arr.iter() {
            self.write_f64(v.x);
            self.write_f64(v.y);
        }
    }

    pub(crate) fn finish(self) -> StateFingerprint {
        let v = self.inner.digest128();
        StateFingerprint {
            hi: (v >> 64) as u64,
            lo: v as u64,
        }
    }
}

#[cfg(test)]
#[path = "../../tests/unit/foundation/fingerprint.rs"]
mod tests;
