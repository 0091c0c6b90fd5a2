// Copyright 2017 Pants project contributors (see CONTRIBUTORS.md).
// Licensed under the Apache License, Version 2.0 (see LICENSE).

//! Content-addressing primitives shared by every crate in the artifact cache
//! core: a `Fingerprint` is the raw output of the configured hash function,
//! and a `Digest` pairs a fingerprint with the exact byte length of the data
//! it names.

use std::fmt;
use std::io::{self, Write};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use sha2::{Digest as _, Sha256};

/// The hash algorithms a store can be configured with. Exactly one is
/// selected per store instance, and it is never mixed with another within
/// that instance: a manifest's digests are only meaningful relative to the
/// algorithm that produced them.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub enum HashAlgorithm {
    Sha256,
}

impl HashAlgorithm {
    pub fn as_str(&self) -> &'static str {
        match self {
            HashAlgorithm::Sha256 => "sha256",
        }
    }
}

impl fmt::Display for HashAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for HashAlgorithm {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, String> {
        match s {
            "sha256" => Ok(HashAlgorithm::Sha256),
            other => Err(format!("Unknown hash algorithm: {other}")),
        }
    }
}

/// The length in bytes of a `Fingerprint`. Fixed because only one algorithm
/// (SHA-256) is currently supported; widening this to a variable-length
/// encoding is future work if a second algorithm is added.
pub const FINGERPRINT_LEN: usize = 32;

/// The raw output of hashing some bytes with the store's configured
/// algorithm. Two hosts that hash byte-equal input produce byte-equal
/// fingerprints, which is what lets two builders agree on an artifact
/// reference without comparing file contents directly.
#[derive(Clone, Copy, Eq, PartialEq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub struct Fingerprint(pub [u8; FINGERPRINT_LEN]);

impl Fingerprint {
    pub const EMPTY: Fingerprint = Fingerprint([0; FINGERPRINT_LEN]);

    pub fn from_bytes_unsafe(bytes: &[u8]) -> Fingerprint {
        if bytes.len() != FINGERPRINT_LEN {
            panic!(
                "Input length was invalid for Fingerprint: {:?}",
                bytes.len()
            );
        }
        let mut fingerprint = [0; FINGERPRINT_LEN];
        fingerprint.copy_from_slice(bytes);
        Fingerprint(fingerprint)
    }

    pub fn from_hex_string(hex_string: &str) -> Result<Fingerprint, String> {
        let bytes = hex::decode(hex_string)
            .map_err(|e| format!("Invalid hex string '{hex_string}': {e:?}"))?;
        if bytes.len() != FINGERPRINT_LEN {
            return Err(format!(
                "Invalid fingerprint '{}': expected {} bytes, got {}",
                hex_string,
                FINGERPRINT_LEN,
                bytes.len()
            ));
        }
        Ok(Fingerprint::from_bytes_unsafe(&bytes))
    }

    pub fn as_bytes(&self) -> &[u8; FINGERPRINT_LEN] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl fmt::Debug for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Fingerprint<{}>", self.to_hex())
    }
}

impl FromStr for Fingerprint {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, String> {
        Fingerprint::from_hex_string(s)
    }
}

/// A `(hash_algorithm, byte_length)` pair naming an immutable blob. Digests
/// are value types: two `Digest`s are equal iff their fields are equal,
/// regardless of provenance.
#[derive(Clone, Copy, Eq, PartialEq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub struct Digest {
    pub fingerprint: Fingerprint,
    pub size_bytes: usize,
}

impl Digest {
    pub const EMPTY: Digest = Digest {
        fingerprint: Fingerprint::EMPTY,
        size_bytes: 0,
    };

    pub fn new(fingerprint: Fingerprint, size_bytes: usize) -> Digest {
        Digest {
            fingerprint,
            size_bytes,
        }
    }

    /// Hashes `bytes` with the given algorithm and returns the digest naming
    /// them. The only algorithm implemented today is SHA-256; the parameter
    /// exists so call sites don't need to change when a second one lands.
    pub fn of_bytes(algorithm: HashAlgorithm, bytes: &[u8]) -> Digest {
        match algorithm {
            HashAlgorithm::Sha256 => {
                let mut hasher = Hasher::new();
                hasher.write_all(bytes).expect("writing to a Hasher cannot fail");
                hasher.finish_with_size(bytes.len())
            }
        }
    }
}

impl fmt::Debug for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Digest({:?}, {})",
            self.fingerprint, self.size_bytes
        )
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.fingerprint, self.size_bytes)
    }
}

/// A streaming SHA-256 hasher, usable as a `Write` sink so callers can hash
/// data as it's copied rather than buffering it twice.
pub struct Hasher(Sha256);

impl Hasher {
    pub fn new() -> Hasher {
        Hasher(Sha256::new())
    }

    /// Consumes the hasher and pairs its digest with an explicit byte count.
    /// Separate from `finish` because callers that stream through `Write`
    /// usually already track the count themselves (e.g. to compare against
    /// an expected size) and shouldn't need a second pass to get it.
    pub fn finish_with_size(self, size_bytes: usize) -> Digest {
        let fingerprint = Fingerprint::from_bytes_unsafe(&self.0.finalize());
        Digest::new(fingerprint, size_bytes)
    }
}

impl Default for Hasher {
    fn default() -> Self {
        Hasher::new()
    }
}

impl Write for Hasher {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.update(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn digest_of_bytes_is_deterministic() {
        let d1 = Digest::of_bytes(HashAlgorithm::Sha256, b"hello");
        let d2 = Digest::of_bytes(HashAlgorithm::Sha256, b"hello");
        assert_eq!(d1, d2);
        assert_eq!(d1.size_bytes, 5);
    }

    #[test]
    fn digest_distinguishes_content() {
        let d1 = Digest::of_bytes(HashAlgorithm::Sha256, b"hello");
        let d2 = Digest::of_bytes(HashAlgorithm::Sha256, b"world");
        assert_ne!(d1, d2);
    }

    #[test]
    fn fingerprint_hex_round_trips() {
        let d = Digest::of_bytes(HashAlgorithm::Sha256, b"round trip me");
        let hex = d.fingerprint.to_hex();
        let parsed = Fingerprint::from_hex_string(&hex).unwrap();
        assert_eq!(d.fingerprint, parsed);
    }

    #[test]
    fn fingerprint_rejects_wrong_length() {
        assert!(Fingerprint::from_hex_string("abcd").is_err());
    }

    #[test]
    fn hasher_streams_equivalently_to_of_bytes() {
        let mut hasher = Hasher::new();
        hasher.write_all(b"stream").unwrap();
        hasher.write_all(b"ed").unwrap();
        let streamed = hasher.finish_with_size(8);
        let direct = Digest::of_bytes(HashAlgorithm::Sha256, b"streamed");
        assert_eq!(streamed, direct);
    }
}
