//! Path canonicalization that tolerates paths which do not exist yet.
//!
//! `std::fs::canonicalize` fails for a file that is about to be written, so
//! the resolver walks the path one component at a time, folding `.` and
//! `..` and following every symlink it meets, including dangling ones. The
//! result is the location the OS would actually touch.

use std::collections::VecDeque;
use std::ffi::OsString;
use std::io;
use std::path::{Component, Path, PathBuf};

/// Upper bound on symlink hops, mirroring the usual `ELOOP` limit.
const MAX_SYMLINK_HOPS: usize = 40;

enum Part {
    Root(PathBuf),
    Parent,
    Name(OsString),
}

fn parts_of(path: &Path) -> Vec<Part> {
    let mut parts = Vec::new();
    let mut prefix: Option<PathBuf> = None;
    for component in path.components() {
        match component {
            Component::Prefix(p) => prefix = Some(PathBuf::from(p.as_os_str())),
            Component::RootDir => {
                let mut root = prefix.take().unwrap_or_default();
                root.push(Component::RootDir.as_os_str());
                parts.push(Part::Root(root));
            }
            Component::CurDir => {}
            Component::ParentDir => parts.push(Part::Parent),
            Component::Normal(name) => parts.push(Part::Name(name.to_os_string())),
        }
    }
    parts
}

/// Resolve `path` to an absolute canonical path.
///
/// Relative paths are interpreted against `base`, which is expected to be
/// absolute. Components that do not exist are appended lexically.
pub fn resolve_path(path: &Path, base: &Path) -> io::Result<PathBuf> {
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    };

    let mut pending: VecDeque<Part> = parts_of(&absolute).into();
    let mut resolved = PathBuf::new();
    let mut hops = 0usize;

    while let Some(part) = pending.pop_front() {
        match part {
            Part::Root(root) => resolved = root,
            Part::Parent => {
                resolved.pop();
            }
            Part::Name(name) => {
                let candidate = resolved.join(&name);
                let is_link = std::fs::symlink_metadata(&candidate)
                    .map(|meta| meta.file_type().is_symlink())
                    .unwrap_or(false);
                if !is_link {
                    resolved = candidate;
                    continue;
                }

                hops += 1;
                if hops > MAX_SYMLINK_HOPS {
                    return Err(io::Error::new(
                        io::ErrorKind::Other,
                        format!("too many levels of symbolic links at {}", candidate.display()),
                    ));
                }
                let target = std::fs::read_link(&candidate)?;
                // Relative targets resolve against the link's parent, which
                // is `resolved` as it stands.
                for target_part in parts_of(&target).into_iter().rev() {
                    pending.push_front(target_part);
                }
            }
        }
    }

    if resolved.as_os_str().is_empty() {
        resolved.push(Component::RootDir.as_os_str());
    }
    Ok(resolved)
}

/// Component-wise containment: `/workspace-evil` is not within `/workspace`.
pub fn is_within(path: &Path, root: &Path) -> bool {
    path.starts_with(root)
}
