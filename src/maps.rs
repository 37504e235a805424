//! Discovery of the file backed images mapped into processes.

use std::collections::HashMap;
use std::collections::HashSet;
use std::fs;
use std::fs::File;
use std::io;
use std::io::BufRead;
use std::io::BufReader;
use std::io::Read;
use std::ops::Range;
use std::path::Path;
use std::path::PathBuf;

use crate::log::debug;
use crate::log::warn;
use crate::Addr;
use crate::Error;
use crate::ErrorExt as _;
use crate::Pid;
use crate::Result;


/// The marker the kernel appends to paths of deleted files.
const DELETED: &str = "(deleted)";


/// The path name component of a proc maps entry.
#[derive(Clone, Debug, PartialEq)]
pub(crate) enum PathName {
    /// A file backed mapping.
    Path(PathBuf),
    /// A mapping of a file that has since been deleted.
    Deleted(PathBuf),
    /// A pseudo mapping, such as `[heap]` or `[vdso]`.
    Component(String),
}


#[derive(Debug)]
pub(crate) struct MapsEntry {
    /// The virtual address range covered by this entry.
    pub range: Range<Addr>,
    pub path_name: Option<PathName>,
}


/// Parse a line of a proc maps file.
fn parse_maps_line<'line>(line: &'line str) -> Result<MapsEntry> {
    let full_line = line;

    let split_once = |line: &'line str, component| -> Result<(&'line str, &'line str)> {
        line.split_once(|c: char| c.is_ascii_whitespace())
            .ok_or_else(|| {
                Error::with_invalid_data(format!(
                    "failed to find {component} in proc maps line: {full_line}"
                ))
            })
    };

    // Lines have the following format:
    // address           perms offset  dev   inode      pathname
    // 08048000-08049000 r-xp 00000000 03:00 8312       /opt/test
    // 0804a000-0806b000 rw-p 00000000 00:00 0          [heap]
    // a7cb1000-a7cb2000 ---p 00000000 00:00 0
    // a7ed5000-a8008000 r-xp 00000000 03:00 4222       /lib/libc.so.6
    let (address_str, line) = split_once(line, "address range")?;
    let (start_str, end_str) = address_str.split_once('-').ok_or_else(|| {
        Error::with_invalid_data(format!(
            "encountered malformed address range in proc maps line: {full_line}"
        ))
    })?;
    let start = Addr::from_str_radix(start_str, 16)
        .map_err(Error::with_invalid_data)
        .with_context(|| format!("encountered malformed start address in: {full_line}"))?;
    let end = Addr::from_str_radix(end_str, 16)
        .map_err(Error::with_invalid_data)
        .with_context(|| format!("encountered malformed end address in: {full_line}"))?;

    let (_mode, line) = split_once(line.trim_start(), "permissions component")?;
    let (_offset, line) = split_once(line.trim_start(), "offset component")?;
    let (_dev, line) = split_once(line.trim_start(), "device component")?;
    // Note that by design, a path may not be present and so we may not be able
    // to successfully split.
    let path_str = split_once(line.trim_start(), "inode component")
        .map(|(_inode, line)| line.trim())
        .unwrap_or("");

    let path_name = if path_str.is_empty() {
        None
    } else if !path_str.starts_with('/') {
        Some(PathName::Component(path_str.to_string()))
    } else if path_str.contains(DELETED) {
        let path = path_str.trim_end_matches(DELETED).trim_end();
        Some(PathName::Deleted(PathBuf::from(path)))
    } else {
        Some(PathName::Path(PathBuf::from(path_str)))
    };

    let entry = MapsEntry {
        range: start..end,
        path_name,
    };
    Ok(entry)
}


#[derive(Debug)]
struct MapsEntryIter<R> {
    reader: R,
    line: String,
}

impl<R> Iterator for MapsEntryIter<R>
where
    R: BufRead,
{
    type Item = Result<MapsEntry>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let () = self.line.clear();
            match self.reader.read_line(&mut self.line) {
                Err(err) => return Some(Err(Error::from(err))),
                Ok(0) => break None,
                Ok(_) => {
                    let line_str = self.line.trim();
                    // There shouldn't be any empty lines, but we'd just ignore them. We
                    // need to trim anyway.
                    if !line_str.is_empty() {
                        let result = parse_maps_line(line_str);
                        break Some(result)
                    }
                }
            }
        }
    }
}


/// Parse a proc maps file from the provided reader.
fn parse_file<R>(reader: R) -> impl Iterator<Item = Result<MapsEntry>>
where
    R: Read,
{
    MapsEntryIter {
        reader: BufReader::new(reader),
        line: String::new(),
    }
}

/// Parse the maps file for the process with the given PID.
pub(crate) fn parse(pid: Pid) -> Result<impl Iterator<Item = Result<MapsEntry>>> {
    let path = format!("/proc/{pid}/maps");
    let file = File::open(&path).with_context(|| format!("failed to open `{path}`"))?;
    Ok(parse_file(file))
}

/// Collect the paths of all file backed, non-deleted mappings, in
/// order of first appearance.
fn mapped_file_paths<I>(entries: I, paths: &mut Vec<PathBuf>)
where
    I: IntoIterator<Item = Result<MapsEntry>>,
{
    let mut seen = paths.iter().cloned().collect::<HashSet<_>>();
    for result in entries {
        match result {
            Ok(MapsEntry {
                path_name: Some(PathName::Path(path)),
                ..
            }) => {
                if seen.insert(path.clone()) {
                    let () = paths.push(path);
                }
            }
            Ok(..) => (),
            Err(err) => warn!("skipping proc maps entry: {err:#}"),
        }
    }
}


/// Read the path of the executable of process `pid`.
///
/// `None` is reported if the link can't be resolved (the process is a
/// kernel thread or exited) or the executable got deleted.
fn pid_exe(pid: Pid) -> Result<Option<PathBuf>> {
    let link = format!("/proc/{pid}/exe");
    match fs::read_link(&link) {
        Ok(exe) if exe.to_string_lossy().contains(DELETED) => Ok(None),
        Ok(exe) => Ok(Some(exe)),
        Err(err)
            if err.kind() == io::ErrorKind::NotFound
                || err.raw_os_error() == Some(libc::EINVAL) =>
        {
            Ok(None)
        }
        Err(err) => Err(Error::from(err)).with_context(|| format!("failed to read `{link}`")),
    }
}


/// A per-session cache of the images mapped into processes.
///
/// The first inspection of a process is authoritative: libraries it
/// loads later on are not picked up.
#[derive(Debug, Default)]
pub struct MappedPaths {
    cache: HashMap<Pid, Vec<PathBuf>>,
}

impl MappedPaths {
    /// Create a new, empty, [`MappedPaths`] cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Retrieve the paths of all file backed images mapped into process
    /// `pid`: its executable followed by all mapped files, in order of
    /// appearance and without duplicates.
    ///
    /// If the process' memory map can't be read, only the executable
    /// is reported (and the result is not cached).
    #[cfg_attr(feature = "tracing", crate::log::instrument(skip(self)))]
    pub fn mapped_paths(&mut self, pid: Pid) -> Result<Vec<PathBuf>> {
        if let Some(paths) = self.cache.get(&pid) {
            return Ok(paths.clone())
        }

        let mut paths = Vec::new();
        if let Some(exe) = pid_exe(pid)? {
            let () = paths.push(exe);
        }

        let entries = match parse(pid) {
            Ok(entries) => entries,
            Err(err) => {
                warn!("unable to read memory map of process {pid}: {err:#}");
                return Ok(paths)
            }
        };
        let () = mapped_file_paths(entries, &mut paths);

        let paths = self.cache.entry(pid).or_insert(paths);
        Ok(paths.clone())
    }

    /// Retrieve the de-duplicated union of the mapped images of all
    /// running processes.
    pub fn mapped_paths_for_running_pids(&mut self) -> Result<Vec<PathBuf>> {
        let mut seen = HashSet::new();
        let mut paths = Vec::new();
        for pid in all_running_pids()? {
            let pid_paths = match self.mapped_paths(pid) {
                Ok(pid_paths) => pid_paths,
                Err(err) => {
                    debug!("skipping process {pid}: {err:#}");
                    continue
                }
            };

            for path in pid_paths {
                if seen.insert(path.clone()) {
                    let () = paths.push(path);
                }
            }
        }
        Ok(paths)
    }
}


fn pids_in(proc: &Path) -> Result<Vec<Pid>> {
    let mut pids = Vec::new();
    let dir = fs::read_dir(proc).with_context(|| format!("failed to read `{}`", proc.display()))?;
    for result in dir {
        let entry = result?;
        let name = entry.file_name();
        let name = match name.to_str() {
            Some(name) if !name.is_empty() && name.bytes().all(|b| b.is_ascii_digit()) => name,
            _ => continue,
        };
        if let Ok(pid) = name.parse::<Pid>() {
            let () = pids.push(pid);
        }
    }
    Ok(pids)
}

/// Retrieve the IDs of all running processes.
pub fn all_running_pids() -> Result<Vec<Pid>> {
    pids_in(Path::new("/proc"))
}

/// Retrieve the IDs of all processes running `program`.
///
/// Programs that can't be canonicalized (e.g., because they live in a
/// different mount namespace) don't match any process.
pub fn pids_for_program(program: &Path) -> Result<Vec<Pid>> {
    let program = match fs::canonicalize(program) {
        Ok(program) => program,
        Err(err) => {
            debug!("failed to canonicalize {}: {err}", program.display());
            return Ok(Vec::new())
        }
    };

    let pids = all_running_pids()?
        .into_iter()
        .filter(|pid| {
            fs::read_link(format!("/proc/{pid}/exe"))
                .map(|exe| exe == program)
                .unwrap_or(false)
        })
        .collect();
    Ok(pids)
}
