//! Mapping stored file references onto the filesystem.
//!
//! A reference is either private (`/system/files/<path>`) or public
//! (`sites/default/files/<percent-encoded path>`). Resolution happens in two
//! steps:
//!
//! 1. [`StorageRoots::resolve`] strips the prefix and joins the remainder to the
//!    matching root. Only plain path segments are accepted.
//! 2. [`StorageRoots::confine`] canonicalizes the result and checks it is still
//!    inside the canonical root, which also catches symlinks pointing outside.

use std::path::{Component, Path, PathBuf};

use crate::config::Config;

/// Which storage area a reference points into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageArea {
    Private,
    Public,
}

/// A reference joined to its root, not yet checked against the filesystem.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedPath {
    pub area: StorageArea,
    pub root: PathBuf,
    pub path: PathBuf,
}

impl ResolvedPath {
    /// Final path component, used as the download filename.
    pub fn file_name(&self) -> Option<String> {
        self.path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ResolveError {
    #[error("reference is not valid percent-encoded UTF-8")]
    InvalidEncoding,

    #[error("reference contains a disallowed path component: {0:?}")]
    InvalidComponent(String),

    #[error("resolved path escapes the storage root")]
    OutsideRoot,

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Private and public storage roots plus the URL prefixes that select them.
#[derive(Debug, Clone)]
pub struct StorageRoots {
    private_root: PathBuf,
    public_root: PathBuf,
    private_prefix: String,
    public_prefix: String,
}

impl StorageRoots {
    pub fn new(
        private_root: impl Into<PathBuf>,
        public_root: impl Into<PathBuf>,
        private_prefix: impl Into<String>,
        public_prefix: impl Into<String>,
    ) -> Self {
        Self {
            private_root: private_root.into(),
            public_root: public_root.into(),
            private_prefix: private_prefix.into(),
            public_prefix: public_prefix.into(),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            &config.private_files_root,
            &config.public_files_root,
            &config.private_files_prefix,
            &config.public_files_prefix,
        )
    }

    /// Join a reference to its storage root without touching the filesystem.
    pub fn resolve(&self, reference: &str) -> Result<ResolvedPath, ResolveError> {
        let private_rest = if self.private_prefix.is_empty() {
            None
        } else {
            reference.strip_prefix(self.private_prefix.as_str())
        };

        let (area, root, remainder) = match private_rest {
            Some(rest) => (StorageArea::Private, &self.private_root, rest.to_string()),
            None => {
                let stripped = if self.public_prefix.is_empty() {
                    reference.to_string()
                } else {
                    reference.replace(self.public_prefix.as_str(), "")
                };
                (
                    StorageArea::Public,
                    &self.public_root,
                    url_decode(&stripped)?,
                )
            }
        };

        let relative = relative_path(&remainder)?;

        Ok(ResolvedPath {
            area,
            root: root.clone(),
            path: root.join(relative),
        })
    }

    /// Canonicalize a resolved path and make sure it stays under its root.
    ///
    /// Missing files surface as [`ResolveError::Io`] with
    /// [`std::io::ErrorKind::NotFound`].
    pub async fn confine(&self, resolved: &ResolvedPath) -> Result<PathBuf, ResolveError> {
        let root = tokio::fs::canonicalize(&resolved.root).await?;
        let canonical = tokio::fs::canonicalize(&resolved.path).await?;

        if !canonical.starts_with(&root) {
            return Err(ResolveError::OutsideRoot);
        }

        Ok(canonical)
    }
}

/// Form-style percent decoding: `+` is a space, `%XX` is a byte.
fn url_decode(encoded: &str) -> Result<String, ResolveError> {
    urlencoding::decode(&encoded.replace('+', " "))
        .map(|decoded| decoded.into_owned())
        .map_err(|_| ResolveError::InvalidEncoding)
}

/// Turn the remainder of a reference into a relative path of plain segments.
fn relative_path(remainder: &str) -> Result<PathBuf, ResolveError> {
    if remainder.contains('\0') {
        return Err(ResolveError::InvalidComponent("\\0".to_string()));
    }

    let mut relative = PathBuf::new();
    for component in Path::new(remainder).components() {
        match component {
            Component::Normal(segment) => relative.push(segment),
            // Leading slash and `.` carry no meaning once joined to a root
            Component::RootDir | Component::CurDir => {}
            Component::ParentDir => return Err(ResolveError::InvalidComponent("..".to_string())),
            Component::Prefix(prefix) => {
                return Err(ResolveError::InvalidComponent(
                    prefix.as_os_str().to_string_lossy().into_owned(),
                ));
            }
        }
    }

    Ok(relative)
}
