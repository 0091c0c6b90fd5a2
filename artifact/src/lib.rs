//! The artifact domain object: a fixed four-child tree (`files/`,
//! `buildtree/`, `logs/`, `meta/`) layered on a `vfs::VDirHandle`, together
//! with the commit protocol that assembles one and the lazy accessors that
//! read one back.

mod error;
mod meta;
mod policy;

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use cas::{LocalStore, ManifestEntry};
use hashing::Digest;
use log::debug;
use once_cell::sync::OnceCell;
use vfs::{ImportSource, VDirHandle};

pub use error::Error;
pub use meta::{BuildResult, Dependencies, Keys, Workspaced, WorkspacedDependencies};
pub use policy::MaterializationPolicy;

/// Everything a caller assembles before asking for a commit. The two VDir
/// fields and the log path are optional because an element may produce no
/// collected files (a metadata-only artifact), no captured build tree, or
/// no log output.
pub struct CommitInput<'a> {
    /// Scratch filesystem directory the commit owns for the duration of the
    /// call; metadata and (if present) the build log are authored here with
    /// ordinary file I/O before being imported into the CAS-backed tree.
    pub scratch_root: &'a Path,
    pub collected_files: Option<&'a VDirHandle>,
    pub build_tree: Option<&'a VDirHandle>,
    pub build_log_path: Option<&'a Path>,
    pub build_result: BuildResult,
    pub public_data: serde_yaml::Value,
    pub strong_key: String,
    pub weak_key: String,
    pub dependencies: BTreeMap<String, String>,
    pub workspaced: bool,
    pub workspaced_dependencies: Vec<String>,
}

/// A committed (or resolved-from-a-reference) artifact tree.
pub struct Artifact {
    store: LocalStore,
    root: VDirHandle,
    keys: OnceCell<Keys>,
    dependencies: OnceCell<Dependencies>,
    workspaced: OnceCell<Workspaced>,
    workspaced_dependencies: OnceCell<WorkspacedDependencies>,
    build_result: OnceCell<BuildResult>,
    public_data: OnceCell<serde_yaml::Value>,
}

impl Artifact {
    /// Wraps a handle already rooted at a known artifact digest, as when a
    /// reference has just been resolved.
    pub fn at_digest(store: LocalStore, digest: Digest) -> Artifact {
        Artifact {
            root: VDirHandle::at_digest(store.clone(), digest),
            store,
            keys: OnceCell::new(),
            dependencies: OnceCell::new(),
            workspaced: OnceCell::new(),
            workspaced_dependencies: OnceCell::new(),
            build_result: OnceCell::new(),
            public_data: OnceCell::new(),
        }
    }

    pub fn digest(&self) -> Digest {
        self.root.digest()
    }

    /// Assembles a new artifact tree from `input` and returns it along with
    /// the deduplicated list of reference strings it should be published
    /// under (the caller passes these to the reference index's `commit`).
    pub fn commit(store: LocalStore, input: CommitInput) -> Result<(Artifact, Vec<String>), Error> {
        let root = VDirHandle::empty(store.clone())?;

        root.descend("logs", true)?;
        root.descend("meta", true)?;
        if input.collected_files.is_some() {
            root.descend("files", true)?;
        }
        if input.build_tree.is_some() {
            root.descend("buildtree", true)?;
        }

        if let Some(files) = input.collected_files {
            root.descend("files", false)?
                .import_files(ImportSource::VDir(files))?;
        }
        if let Some(build_tree) = input.build_tree {
            root.descend("buildtree", false)?
                .import_files(ImportSource::VDir(build_tree))?;
        }

        let logs_scratch = input.scratch_root.join("logs");
        fs::create_dir_all(&logs_scratch)?;
        if let Some(log_path) = input.build_log_path {
            if log_path.exists() {
                fs::copy(log_path, logs_scratch.join("build.log"))?;
            }
        }
        root.descend("logs", false)?
            .import_files(ImportSource::Fs(&logs_scratch))?;

        let meta_scratch = input.scratch_root.join("meta");
        fs::create_dir_all(&meta_scratch)?;
        write_yaml(&meta_scratch.join("public.yaml"), &input.public_data)?;
        write_yaml(&meta_scratch.join("build-result.yaml"), &input.build_result)?;
        write_yaml(
            &meta_scratch.join("keys.yaml"),
            &Keys {
                strong: input.strong_key.clone(),
                weak: input.weak_key.clone(),
            },
        )?;
        write_yaml(&meta_scratch.join("dependencies.yaml"), &input.dependencies)?;
        write_yaml(
            &meta_scratch.join("workspaced.yaml"),
            &Workspaced {
                workspaced: input.workspaced,
            },
        )?;
        write_yaml(
            &meta_scratch.join("workspaced-dependencies.yaml"),
            &WorkspacedDependencies {
                workspaced_dependencies: input.workspaced_dependencies,
            },
        )?;
        root.descend("meta", false)?
            .import_files(ImportSource::Fs(&meta_scratch))?;

        let mut keys = vec![input.strong_key, input.weak_key];
        keys.dedup();

        debug!("committed artifact {} under {} reference(s)", root.digest(), keys.len());
        let artifact = Artifact::at_digest(store, root.digest());
        Ok((artifact, keys))
    }

    /// True iff `meta/` is fully present and, under `policy`, `files/` is
    /// materialized as required. An absent `files/` subtree is never a
    /// miss: the artifact may simply have collected no output files.
    pub fn cached(&self, policy: MaterializationPolicy) -> Result<bool, Error> {
        let manifest = self.store.get_manifest(&self.digest())?;

        let meta_digest = match manifest.get("meta") {
            Some(ManifestEntry::Directory { digest, .. }) => *digest,
            _ => return Ok(false),
        };
        if !self.store.contains_directory(meta_digest, true)? {
            return Ok(false);
        }

        match manifest.get("files") {
            None => Ok(true),
            Some(ManifestEntry::Directory { digest, .. }) => {
                if !policy.require_directories {
                    Ok(true)
                } else if !policy.require_files {
                    Ok(self.store.contains_directory(*digest, false)?)
                } else {
                    Ok(self.store.contains_directory(*digest, true)?)
                }
            }
            Some(_) => Err(Error::Malformed("files entry is not a directory".to_string())),
        }
    }

    pub fn cached_buildtree(&self) -> Result<bool, Error> {
        let manifest = self.store.get_manifest(&self.digest())?;
        match manifest.get("buildtree") {
            Some(ManifestEntry::Directory { digest, .. }) => {
                Ok(self.store.contains_directory(*digest, true)?)
            }
            _ => Ok(false),
        }
    }

    pub fn buildtree_exists(&self) -> Result<bool, Error> {
        let manifest = self.store.get_manifest(&self.digest())?;
        Ok(matches!(manifest.get("buildtree"), Some(ManifestEntry::Directory { .. })))
    }

    /// Requires `cached(policy)` to hold before checking `logs/`, mirroring
    /// the original's precondition of an already-cached element.
    pub fn cached_logs(&self, policy: MaterializationPolicy) -> Result<bool, Error> {
        if !self.cached(policy)? {
            return Ok(false);
        }
        let manifest = self.store.get_manifest(&self.digest())?;
        match manifest.get("logs") {
            Some(ManifestEntry::Directory { digest, .. }) => {
                Ok(self.store.contains_directory(*digest, true)?)
            }
            _ => Ok(false),
        }
    }

    pub fn get_files(&self) -> Result<Option<VDirHandle>, Error> {
        match self.root.descend("files", false) {
            Ok(handle) => Ok(Some(handle)),
            Err(vfs::Error::NotFound(_)) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    pub fn get_buildtree(&self) -> Result<Option<VDirHandle>, Error> {
        match self.root.descend("buildtree", false) {
            Ok(handle) => Ok(Some(handle)),
            Err(vfs::Error::NotFound(_)) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    pub fn keys(&self) -> Result<&Keys, Error> {
        self.load_meta("keys.yaml", &self.keys)
    }

    pub fn dependencies(&self) -> Result<&Dependencies, Error> {
        self.load_meta("dependencies.yaml", &self.dependencies)
    }

    pub fn workspaced(&self) -> Result<bool, Error> {
        Ok(self.load_meta("workspaced.yaml", &self.workspaced)?.workspaced)
    }

    pub fn workspaced_dependencies(&self) -> Result<&[String], Error> {
        Ok(self
            .load_meta("workspaced-dependencies.yaml", &self.workspaced_dependencies)?
            .workspaced_dependencies
            .as_slice())
    }

    pub fn build_result(&self) -> Result<&BuildResult, Error> {
        if let Some(cached) = self.build_result.get() {
            return Ok(cached);
        }
        let meta = self.root.descend("meta", false)?;
        let value = match meta.objpath("build-result.yaml") {
            Ok(path) => {
                let bytes = fs::read(path)?;
                serde_yaml::from_slice(&bytes)?
            }
            Err(vfs::Error::NotFound(_)) => BuildResult::back_compat_default(),
            Err(e) => return Err(e.into()),
        };
        Ok(self.build_result.get_or_init(|| value))
    }

    pub fn public_data(&self) -> Result<&serde_yaml::Value, Error> {
        if let Some(cached) = self.public_data.get() {
            return Ok(cached);
        }
        let meta = self.root.descend("meta", false)?;
        let path = meta.objpath("public.yaml")?;
        let bytes = fs::read(path)?;
        let value: serde_yaml::Value = serde_yaml::from_slice(&bytes)?;
        Ok(self.public_data.get_or_init(|| value))
    }

    /// The reference used to have fetched this artifact: the strong key if
    /// one was recorded, otherwise the weak key.
    pub fn get_extract_key(&self) -> Result<String, Error> {
        let keys = self.keys()?;
        Ok(if !keys.strong.is_empty() {
            keys.strong.clone()
        } else {
            keys.weak.clone()
        })
    }

    fn load_meta<T>(&self, filename: &str, cell: &OnceCell<T>) -> Result<&T, Error>
    where
        T: serde::de::DeserializeOwned,
    {
        if let Some(cached) = cell.get() {
            return Ok(cached);
        }
        let meta = self.root.descend("meta", false)?;
        let path = meta.objpath(filename)?;
        let bytes = fs::read(path)?;
        let value: T = serde_yaml::from_slice(&bytes)?;
        Ok(cell.get_or_init(|| value))
    }
}

fn write_yaml<T: serde::Serialize>(path: &Path, value: &T) -> Result<(), Error> {
    let text = serde_yaml::to_string(value)?;
    fs::write(path, text)?;
    Ok(())
}
