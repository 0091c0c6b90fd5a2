// Copyright 2017 Pants project contributors (see CONTRIBUTORS.md).
// Licensed under the Apache License, Version 2.0 (see LICENSE).

//! Directory manifests: ordered lists of named child entries that the store
//! serializes in a canonical form, so that two hosts which submit byte-equal
//! trees compute byte-equal digests (invariant I4 of the artifact cache).

use hashing::{Digest, Fingerprint};

use crate::Error;

/// One child of a directory manifest.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ManifestEntry {
    File {
        name: String,
        digest: Digest,
        is_executable: bool,
    },
    Directory {
        name: String,
        digest: Digest,
    },
    Symlink {
        name: String,
        target: String,
    },
}

impl ManifestEntry {
    pub fn name(&self) -> &str {
        match self {
            ManifestEntry::File { name, .. } => name,
            ManifestEntry::Directory { name, .. } => name,
            ManifestEntry::Symlink { name, .. } => name,
        }
    }

    pub fn digest(&self) -> Option<Digest> {
        match self {
            ManifestEntry::File { digest, .. } => Some(*digest),
            ManifestEntry::Directory { digest, .. } => Some(*digest),
            ManifestEntry::Symlink { .. } => None,
        }
    }
}

/// A directory's entry list, held in canonical (byte-wise sorted-by-name)
/// order. Construction validates that names are unique, which is part of
/// the manifest's well-formedness the same way a digest mismatch is: a
/// manifest with a duplicate name could never have been produced by this
/// store, so it is rejected rather than silently de-duplicated.
#[derive(Clone, Debug, Eq, PartialEq, Default)]
pub struct Manifest {
    entries: Vec<ManifestEntry>,
}

impl Manifest {
    pub fn new(mut entries: Vec<ManifestEntry>) -> Result<Manifest, String> {
        entries.sort_by(|a, b| a.name().cmp(b.name()));
        for pair in entries.windows(2) {
            if pair[0].name() == pair[1].name() {
                return Err(format!("duplicate entry name in manifest: {}", pair[0].name()));
            }
        }
        Ok(Manifest { entries })
    }

    pub fn empty() -> Manifest {
        Manifest { entries: Vec::new() }
    }

    pub fn entries(&self) -> &[ManifestEntry] {
        &self.entries
    }

    pub fn get(&self, name: &str) -> Option<&ManifestEntry> {
        // Entries are sorted, but the list is small enough in practice
        // (a directory's immediate children) that a linear scan reads more
        // plainly than threading a binary search through `str` comparisons.
        self.entries.iter().find(|e| e.name() == name)
    }

    pub fn without(&self, name: &str) -> Manifest {
        Manifest {
            entries: self
                .entries
                .iter()
                .filter(|e| e.name() != name)
                .cloned()
                .collect(),
        }
    }

    /// Returns a copy of this manifest with `entry` inserted, replacing any
    /// existing entry of the same name (the "name collisions are overwritten"
    /// rule `import_files` and `descend` rely on).
    pub fn with_entry(&self, entry: ManifestEntry) -> Manifest {
        let mut entries: Vec<ManifestEntry> = self
            .entries
            .iter()
            .filter(|e| e.name() != entry.name())
            .cloned()
            .collect();
        entries.push(entry);
        entries.sort_by(|a, b| a.name().cmp(b.name()));
        Manifest { entries }
    }

    /// Serializes this manifest's entries in their canonical (sorted) order.
    /// The format is a plain line-oriented encoding, one entry per line,
    /// deliberately simple so that canonicalization is visibly just "sort by
    /// name then concatenate": `put_manifest(E) == put_manifest(permute(E))`
    /// falls directly out of sorting before serializing.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = String::new();
        for entry in &self.entries {
            match entry {
                ManifestEntry::File {
                    name,
                    digest,
                    is_executable,
                } => {
                    out.push_str(&format!(
                        "file\t{}\t{}\t{}\t{}\n",
                        encode_name(name),
                        digest.fingerprint,
                        digest.size_bytes,
                        is_executable
                    ));
                }
                ManifestEntry::Directory { name, digest } => {
                    out.push_str(&format!(
                        "dir\t{}\t{}\t{}\n",
                        encode_name(name),
                        digest.fingerprint,
                        digest.size_bytes
                    ));
                }
                ManifestEntry::Symlink { name, target } => {
                    out.push_str(&format!(
                        "link\t{}\t{}\n",
                        encode_name(name),
                        encode_name(target)
                    ));
                }
            }
        }
        out.into_bytes()
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Manifest, Error> {
        let text = std::str::from_utf8(bytes)
            .map_err(|e| Error::Malformed(format!("manifest is not valid UTF-8: {e}")))?;
        let mut entries = Vec::new();
        for (lineno, line) in text.lines().enumerate() {
            if line.is_empty() {
                continue;
            }
            let fields: Vec<&str> = line.split('\t').collect();
            let entry = match fields.as_slice() {
                ["file", name, fingerprint, size_bytes, is_executable] => ManifestEntry::File {
                    name: decode_name(name)?,
                    digest: parse_digest(fingerprint, size_bytes)?,
                    is_executable: is_executable.parse::<bool>().map_err(|e| {
                        Error::Malformed(format!("line {lineno}: bad executable flag: {e}"))
                    })?,
                },
                ["dir", name, fingerprint, size_bytes] => ManifestEntry::Directory {
                    name: decode_name(name)?,
                    digest: parse_digest(fingerprint, size_bytes)?,
                },
                ["link", name, target] => ManifestEntry::Symlink {
                    name: decode_name(name)?,
                    target: decode_name(target)?,
                },
                _ => {
                    return Err(Error::Malformed(format!(
                        "line {lineno}: unrecognized manifest entry: {line:?}"
                    )));
                }
            };
            entries.push(entry);
        }
        Manifest::new(entries).map_err(Error::Malformed)
    }
}

fn parse_digest(fingerprint: &str, size_bytes: &str) -> Result<Digest, Error> {
    let fingerprint = Fingerprint::from_hex_string(fingerprint)
        .map_err(|e| Error::Malformed(format!("bad fingerprint in manifest: {e}")))?;
    let size_bytes = size_bytes
        .parse::<usize>()
        .map_err(|e| Error::Malformed(format!("bad size in manifest: {e}")))?;
    Ok(Digest::new(fingerprint, size_bytes))
}

/// Entry names and symlink targets may not themselves contain the field
/// separator; we escape tabs and newlines rather than forbidding them so
/// that no legal filename is rejected by the store.
fn encode_name(name: &str) -> String {
    name.replace('\\', "\\\\")
        .replace('\t', "\\t")
        .replace('\n', "\\n")
}

fn decode_name(encoded: &str) -> Result<String, Error> {
    let mut out = String::with_capacity(encoded.len());
    let mut chars = encoded.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('\\') => out.push('\\'),
            Some('t') => out.push('\t'),
            Some('n') => out.push('\n'),
            other => {
                return Err(Error::Malformed(format!(
                    "bad escape sequence in manifest name: {other:?}"
                )));
            }
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use hashing::HashAlgorithm;

    fn digest(content: &str) -> Digest {
        Digest::of_bytes(HashAlgorithm::Sha256, content.as_bytes())
    }

    #[test]
    fn canonical_ordering_is_independent_of_input_order() {
        let a = ManifestEntry::File {
            name: "b.txt".to_string(),
            digest: digest("b"),
            is_executable: false,
        };
        let b = ManifestEntry::File {
            name: "a.txt".to_string(),
            digest: digest("a"),
            is_executable: false,
        };
        let m1 = Manifest::new(vec![a.clone(), b.clone()]).unwrap();
        let m2 = Manifest::new(vec![b, a]).unwrap();
        assert_eq!(m1.to_bytes(), m2.to_bytes());
    }

    #[test]
    fn duplicate_names_are_rejected() {
        let a = ManifestEntry::File {
            name: "dup".to_string(),
            digest: digest("a"),
            is_executable: false,
        };
        let b = ManifestEntry::Directory {
            name: "dup".to_string(),
            digest: digest("b"),
        };
        assert!(Manifest::new(vec![a, b]).is_err());
    }

    #[test]
    fn round_trips_through_bytes() {
        let entries = vec![
            ManifestEntry::File {
                name: "exec".to_string(),
                digest: digest("exec"),
                is_executable: true,
            },
            ManifestEntry::Directory {
                name: "sub".to_string(),
                digest: digest("sub"),
            },
            ManifestEntry::Symlink {
                name: "link".to_string(),
                target: "../elsewhere".to_string(),
            },
        ];
        let manifest = Manifest::new(entries).unwrap();
        let decoded = Manifest::from_bytes(&manifest.to_bytes()).unwrap();
        assert_eq!(manifest, decoded);
    }

    #[test]
    fn names_with_tabs_round_trip() {
        let entries = vec![ManifestEntry::File {
            name: "weird\tname\nwith\\escapes".to_string(),
            digest: digest("x"),
            is_executable: false,
        }];
        let manifest = Manifest::new(entries).unwrap();
        let decoded = Manifest::from_bytes(&manifest.to_bytes()).unwrap();
        assert_eq!(manifest, decoded);
    }

    #[test]
    fn with_entry_overwrites_same_name() {
        let manifest = Manifest::new(vec![ManifestEntry::File {
            name: "x".to_string(),
            digest: digest("old"),
            is_executable: false,
        }])
        .unwrap();
        let updated = manifest.with_entry(ManifestEntry::File {
            name: "x".to_string(),
            digest: digest("new"),
            is_executable: true,
        });
        assert_eq!(updated.entries().len(), 1);
        assert_eq!(updated.get("x").unwrap().digest(), Some(digest("new")));
    }
}
