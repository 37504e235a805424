//! Resolution of numeric cgroup IDs to cgroup paths.
//!
//! On cgroup v2 (and for v1 hierarchies on kernfs) the ID of a cgroup is
//! the inode number of its directory. Resolving an ID hence amounts to
//! finding the directory with that inode number below a hierarchy root.

use std::collections::HashMap;
use std::fs;
use std::fs::File;
use std::io;
use std::io::BufRead as _;
use std::io::BufReader;
use std::io::Read;
use std::os::unix::fs::MetadataExt as _;
use std::path::Path;
use std::path::PathBuf;

use regex::Regex;

use crate::log::debug;
use crate::log::warn;
use crate::wildcard::WildcardPattern;
use crate::Error;
use crate::ErrorExt as _;
use crate::Result;


/// The label used for cgroup v2 hierarchies.
const UNIFIED_LABEL: &str = "unified";


/// Undo the octal escaping the kernel applies to white space and
/// backslashes in `/proc/mounts` fields.
fn unescape_mount_field(field: &str) -> String {
    let bytes = field.as_bytes();
    let mut unescaped = Vec::with_capacity(bytes.len());
    let mut idx = 0;

    while idx < bytes.len() {
        if bytes[idx] == b'\\' {
            if let Some(digits) = bytes.get(idx + 1..idx + 4) {
                if digits.iter().all(|digit| (b'0'..=b'7').contains(digit)) {
                    let value = digits
                        .iter()
                        .fold(0u32, |value, digit| value * 8 + u32::from(digit - b'0'));
                    if let Ok(byte) = u8::try_from(value) {
                        let () = unescaped.push(byte);
                        idx += 4;
                        continue
                    }
                }
            }
        }
        let () = unescaped.push(bytes[idx]);
        idx += 1;
    }
    String::from_utf8_lossy(&unescaped).into_owned()
}


/// The mount points of all cgroup hierarchies.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CgroupRoots {
    /// Mount points of cgroup v1 hierarchies, in mount order.
    pub legacy: Vec<PathBuf>,
    /// Mount points of cgroup v2 hierarchies, in mount order.
    pub unified: Vec<PathBuf>,
}

impl CgroupRoots {
    /// Collect cgroup hierarchy roots from a mount table in the
    /// `/proc/mounts` format.
    ///
    /// Only mount points referring to existing directories are
    /// reported.
    pub fn from_mounts<R>(reader: R) -> Result<Self>
    where
        R: Read,
    {
        let regex = Regex::new(r"^\S+ (\S+) (cgroup2?) ").map_err(Error::with_invalid_input)?;
        let mut roots = Self::default();

        for line in BufReader::new(reader).lines() {
            let line = line.context("failed to read mount table")?;
            let Some(captures) = regex.captures(&line) else {
                continue
            };

            let mount_point = PathBuf::from(unescape_mount_field(&captures[1]));
            if !mount_point.is_dir() {
                debug!("ignoring cgroup mount {}: not a directory", mount_point.display());
                continue
            }

            match &captures[2] {
                "cgroup" => roots.legacy.push(mount_point),
                _ => roots.unified.push(mount_point),
            }
        }
        Ok(roots)
    }

    /// Collect cgroup hierarchy roots of the running system.
    pub fn from_system() -> Result<Self> {
        let path = "/proc/mounts";
        let file = File::open(path).with_context(|| format!("failed to open `{path}`"))?;
        Self::from_mounts(file)
    }
}


/// A resolver of cgroup IDs to paths within cgroup hierarchies.
///
/// Resolved paths are cached. Cache entries are validated against the
/// file system before use, so a cgroup that got removed and whose ID
/// got recycled is not misreported.
#[derive(Debug, Default)]
pub struct CgroupPathResolver {
    cache: HashMap<(u64, PathBuf), String>,
}

impl CgroupPathResolver {
    /// Create a new [`CgroupPathResolver`].
    pub fn new() -> Self {
        Self::default()
    }

    fn inode(path: &Path) -> io::Result<u64> {
        fs::metadata(path).map(|meta| meta.ino())
    }

    fn cached_path(&self, id: u64, root: &Path) -> Option<&str> {
        let rel = self.cache.get(&(id, root.to_path_buf()))?;
        let path = root.join(rel.trim_start_matches('/'));
        match Self::inode(&path) {
            Ok(ino) if ino == id => Some(rel),
            _ => None,
        }
    }

    fn remember(&mut self, id: u64, root: &Path, rel: String) -> String {
        let _prev = self.cache.insert((id, root.to_path_buf()), rel.clone());
        rel
    }

    /// Find the path of cgroup `id` relative to hierarchy `root`.
    ///
    /// The root itself is reported as `/`. If the cgroup can't be
    /// found, or the hierarchy can't be walked, an empty string is
    /// reported.
    #[cfg_attr(feature = "tracing", crate::log::instrument(level = tracing::Level::TRACE, skip(self)))]
    pub fn path_in_hierarchy(&mut self, id: u64, root: &Path) -> String {
        if let Some(rel) = self.cached_path(id, root) {
            return rel.to_string()
        }

        // The walk below only reports entries beneath the root.
        if matches!(Self::inode(root), Ok(ino) if ino == id) {
            return self.remember(id, root, "/".to_string())
        }

        let mut stack = vec![root.to_path_buf()];
        while let Some(dir) = stack.pop() {
            let entries = match fs::read_dir(&dir) {
                Ok(entries) => entries,
                Err(err) => {
                    warn!("failed to read cgroup directory {}: {err}", dir.display());
                    return String::new()
                }
            };

            let mut subdirs = Vec::new();
            for result in entries {
                let entry = match result {
                    Ok(entry) => entry,
                    Err(err) => {
                        warn!("failed to read cgroup directory {}: {err}", dir.display());
                        return String::new()
                    }
                };

                let path = entry.path();
                let ino = match Self::inode(&path) {
                    Ok(ino) => ino,
                    Err(err) => {
                        debug!("failed to stat {}: {err}", path.display());
                        return String::new()
                    }
                };

                if ino == id {
                    let rel = match path.strip_prefix(root) {
                        Ok(rel) => format!("/{}", rel.display()),
                        Err(..) => path.display().to_string(),
                    };
                    return self.remember(id, root, rel)
                }

                if entry.file_type().map(|type_| type_.is_dir()).unwrap_or(false) {
                    let () = subdirs.push(path);
                }
            }

            // Visit sub-directories in directory order.
            let () = stack.extend(subdirs.into_iter().rev());
        }

        String::new()
    }

    /// Resolve cgroup `id` in all hierarchies in `roots` whose label
    /// matches the wildcard pattern `filter`.
    ///
    /// cgroup v2 hierarchies are labeled `unified` and reported first,
    /// in mount order. cgroup v1 hierarchies are labeled with the name
    /// of their mount point and reported sorted.
    pub fn cgroup_paths_in(
        &mut self,
        roots: &CgroupRoots,
        id: u64,
        filter: &str,
    ) -> Vec<(String, String)> {
        let filter = WildcardPattern::new(filter);

        let mut paths = roots
            .unified
            .iter()
            .filter(|_root| filter.matches(UNIFIED_LABEL))
            .map(|root| (UNIFIED_LABEL.to_string(), self.path_in_hierarchy(id, root)))
            .collect::<Vec<_>>();

        let mut legacy = roots
            .legacy
            .iter()
            .filter_map(|root| {
                let label = root.file_name()?.to_string_lossy().into_owned();
                filter.matches(&label).then_some((label, root))
            })
            .collect::<Vec<_>>()
            .into_iter()
            .map(|(label, root)| (label, self.path_in_hierarchy(id, root)))
            .collect::<Vec<_>>();
        let () = legacy.sort();
        let () = paths.extend(legacy);
        paths
    }

    /// Resolve cgroup `id` in the hierarchies of the running system.
    ///
    /// See [`CgroupPathResolver::cgroup_paths_in`] for details.
    pub fn cgroup_paths(&mut self, id: u64, filter: &str) -> Result<Vec<(String, String)>> {
        let roots = CgroupRoots::from_system()?;
        Ok(self.cgroup_paths_in(&roots, id, filter))
    }
}
