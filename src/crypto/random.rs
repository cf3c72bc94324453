//! Sources of random bytes for keys, salts and nonces.

use std::cell::Cell;

use getrandom::fill;
use sha2::{Digest, Sha256};

use crate::error::CryptoError;

/// A capability that fills buffers with random bytes.
///
/// Every key, salt and nonce in the crate is drawn through this trait so a
/// deterministic source can stand in for the OS generator.
pub trait RandomSource {
    fn fill(&self, buf: &mut [u8]) -> Result<(), CryptoError>;

    /// Returns `N` fresh random bytes.
    fn array<const N: usize>(&self) -> Result<[u8; N], CryptoError>
    where
        Self: Sized,
    {
        let mut out = [0u8; N];
        self.fill(&mut out)?;
        Ok(out)
    }
}

impl<R: RandomSource + ?Sized> RandomSource for &R {
    fn fill(&self, buf: &mut [u8]) -> Result<(), CryptoError> {
        (**self).fill(buf)
    }
}

/// The operating system CSPRNG.
#[derive(Debug, Clone, Copy, Default)]
pub struct OsRandom;

impl RandomSource for OsRandom {
    fn fill(&self, buf: &mut [u8]) -> Result<(), CryptoError> {
        fill(buf).map_err(|_| CryptoError::RandomUnavailable)
    }
}

/// Deterministic byte stream for reproducible test vectors.
///
/// Output block `i` is `SHA-256(seed || i)`. The stream never repeats within
/// one instance, so nonces drawn from it stay unique. Not for production use.
#[derive(Debug)]
pub struct SeededRandom {
    seed: [u8; 32],
    counter: Cell<u64>,
}

impl SeededRandom {
    pub fn new(seed: [u8; 32]) -> Self {
        Self {
            seed,
            counter: Cell::new(0),
        }
    }

    fn next_block(&self) -> [u8; 32] {
        let n = self.counter.get();
        self.counter.set(n + 1);

        let mut hasher = Sha256::new();
        hasher.update(self.seed);
        hasher.update(n.to_le_bytes());
        hasher.finalize().into()
    }
}

impl RandomSource for SeededRandom {
    fn fill(&self, buf: &mut [u8]) -> Result<(), CryptoError> {
        for chunk in buf.chunks_mut(32) {
            let block = self.next_block();
            chunk.copy_from_slice(&block[..chunk.len()]);
        }
        Ok(())
    }
}
