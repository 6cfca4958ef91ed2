//! Directory-backed catalog store.

use std::io;

use camino::{Utf8Path, Utf8PathBuf};
use cap_std::{ambient_authority, fs_utf8::Dir};

use super::{CatalogStore, Listing, StoreError, check_size, validate_path};

/// Store that keeps blobs as files beneath a root directory.
///
/// All access goes through a capability handle on the root, so paths cannot
/// escape it.
#[derive(Debug)]
pub struct DirStore {
    root: Utf8PathBuf,
    dir: Dir,
}

impl DirStore {
    /// Opens (creating if needed) a store rooted at `root`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Io`] when the directory cannot be created or
    /// opened.
    pub fn open(root: impl AsRef<Utf8Path>) -> Result<Self, StoreError> {
        let root_path = root.as_ref();
        let io_error = |err: io::Error| StoreError::Io {
            path: root_path.to_string(),
            message: err.to_string(),
        };
        Dir::create_ambient_dir_all(root_path, ambient_authority()).map_err(io_error)?;
        let dir = Dir::open_ambient_dir(root_path, ambient_authority()).map_err(io_error)?;
        Ok(Self {
            root: root_path.to_path_buf(),
            dir,
        })
    }

    /// Root directory of the store.
    #[must_use]
    pub fn root(&self) -> &Utf8Path {
        &self.root
    }

    fn io_error(path: &str, err: &io::Error) -> StoreError {
        if err.kind() == io::ErrorKind::NotFound {
            return StoreError::NotFound {
                path: path.to_owned(),
            };
        }
        StoreError::Io {
            path: path.to_owned(),
            message: err.to_string(),
        }
    }

    fn collect_files(&self, relative: &str, out: &mut Vec<String>) -> Result<(), StoreError> {
        let listed = if relative.is_empty() {
            self.dir.entries()
        } else {
            self.dir.read_dir(relative)
        };
        let entries = listed.map_err(|err| Self::io_error(relative, &err))?;

        for listed_entry in entries {
            let entry = listed_entry.map_err(|err| Self::io_error(relative, &err))?;
            let name = entry
                .file_name()
                .map_err(|err| Self::io_error(relative, &err))?;
            let path = if relative.is_empty() {
                name
            } else {
                format!("{relative}/{name}")
            };
            let file_type = entry
                .file_type()
                .map_err(|err| Self::io_error(&path, &err))?;
            if file_type.is_dir() {
                self.collect_files(&path, out)?;
            } else {
                out.push(path);
            }
        }
        Ok(())
    }
}

impl CatalogStore for DirStore {
    fn put(&self, path: &str, data: &[u8], size: u64) -> Result<(), StoreError> {
        let key = validate_path(path)?;
        check_size(key, data, size)?;
        if let Some((parent, _)) = key.rsplit_once('/') {
            self.dir
                .create_dir_all(parent)
                .map_err(|err| Self::io_error(key, &err))?;
        }
        self.dir
            .write(key, data)
            .map_err(|err| Self::io_error(key, &err))
    }

    fn get(&self, path: &str) -> Result<Vec<u8>, StoreError> {
        let key = validate_path(path)?;
        self.dir.read(key).map_err(|err| Self::io_error(key, &err))
    }

    fn list(&self, prefix: &str) -> Result<Listing, StoreError> {
        let mut paths = Vec::new();
        self.collect_files("", &mut paths)?;
        paths.retain(|path| path.starts_with(prefix));
        paths.sort();
        Ok(Listing::new(paths))
    }

    fn remove_all(&self) -> Result<(), StoreError> {
        let entries = self
            .dir
            .entries()
            .map_err(|err| Self::io_error(self.root.as_str(), &err))?;
        for listed_entry in entries {
            let entry = listed_entry.map_err(|err| Self::io_error(self.root.as_str(), &err))?;
            let name = entry
                .file_name()
                .map_err(|err| Self::io_error(self.root.as_str(), &err))?;
            let file_type = entry
                .file_type()
                .map_err(|err| Self::io_error(&name, &err))?;
            let removed = if file_type.is_dir() {
                self.dir.remove_dir_all(&name)
            } else {
                self.dir.remove_file(&name)
            };
            removed.map_err(|err| Self::io_error(&name, &err))?;
        }
        Ok(())
    }
}
