use std::path::{Component, Path, PathBuf};

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PathError {
    #[error("remote name is empty")]
    Empty,
    #[error("remote name contains unsupported component")]
    UnsupportedComponent,
}

/// Maps one remote entry name to a child of `parent`. The name must stay a
/// single path component so the mirror never escapes its root.
pub fn local_child_path(parent: &Path, name: &str) -> Result<PathBuf, PathError> {
    if name.is_empty() {
        return Err(PathError::Empty);
    }
    if name.contains(['/', '\\', '\0']) {
        return Err(PathError::UnsupportedComponent);
    }

    let mut components = Path::new(name).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(part)), None) => Ok(parent.join(part)),
        _ => Err(PathError::UnsupportedComponent),
    }
}
