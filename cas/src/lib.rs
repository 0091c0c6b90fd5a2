// Copyright 2017 Pants project contributors (see CONTRIBUTORS.md).
// Licensed under the Apache License, Version 2.0 (see LICENSE).

//! The content-addressable store: durable storage of blobs and directory
//! manifests keyed by digest, with manifest-only and deep containment
//! queries. See the crate's sibling `vfs` crate for the mutable-handle
//! abstraction built on top of this store.

mod error;
mod manifest;
mod store;

pub use error::Error;
pub use manifest::{Manifest, ManifestEntry};
pub use store::LocalStore;
