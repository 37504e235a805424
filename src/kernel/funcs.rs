use std::collections::HashMap;
use std::collections::HashSet;
use std::fs::File;
use std::io::BufRead as _;
use std::io::BufReader;
use std::path::Path;
use std::path::PathBuf;

use crate::log::debug;
use crate::log::warn;
use crate::symbol::split_addrrange_symbol_module;
use crate::symbol::split_symbol_module;
use crate::Config;


/// A mapping from kernel function names to the set of modules defining
/// them. Functions of the kernel image proper are attributed to
/// `vmlinux`.
pub type FuncsModulesMap = HashMap<String, HashSet<String>>;

/// The module name used for functions without explicit module.
const VMLINUX_MODULE: &str = "vmlinux";

/// The tracefs mount points to consult, in order.
const TRACEFS_DIRS: &[&str] = &["/sys/kernel/tracing", "/sys/kernel/debug/tracing"];

/// Functions known to destabilize the system when traced, even though
/// the kernel does not mark them `notrace`.
const BAD_FUNCS: &[&str] = &["arch_cpu_idle", "default_idle", "bpf_dispatcher_xdp_func"];
/// Prefixes of functions that must not be traced.
const BAD_FUNC_PREFIXES: &[&str] = &["__ftrace_invalid_address__", "rcu_"];

/// Functions that may recurse into tracing when attached to via
/// fentry/fexit and require additional protection.
const RECURSIVE_FUNCS: &[&str] = &[
    "_raw_spin_lock",
    "_raw_spin_lock_irqsave",
    "_raw_spin_unlock_irqrestore",
    "queued_spin_lock_slowpath",
];


/// Check whether tracing function `name` is known to be unsafe.
pub fn is_bad_func(name: &str) -> bool {
    BAD_FUNCS.contains(&name)
        || BAD_FUNC_PREFIXES
            .iter()
            .any(|prefix| name.starts_with(prefix))
}

/// Check whether attaching to function `name` may lead to recursion.
///
/// The name may be qualified as `vmlinux:<name>`.
pub fn is_recursive_func(name: &str) -> bool {
    let name = name
        .strip_prefix(VMLINUX_MODULE)
        .and_then(|rest| rest.strip_prefix(':'))
        .unwrap_or(name);
    RECURSIVE_FUNCS.contains(&name)
}


/// The catalog of kernel functions available for tracing.
#[derive(Debug)]
pub struct TraceableFuncs<'cfg> {
    config: &'cfg Config,
}

impl<'cfg> TraceableFuncs<'cfg> {
    /// Create a new [`TraceableFuncs`] object.
    pub fn new(config: &'cfg Config) -> Self {
        Self { config }
    }

    fn available_functions_path(&self) -> PathBuf {
        if let Some(path) = &self.config.available_functions {
            return path.clone()
        }

        TRACEFS_DIRS
            .iter()
            .map(|dir| Path::new(dir).join("available_filter_functions"))
            .find(|path| path.exists())
            .unwrap_or_else(|| Path::new(TRACEFS_DIRS[0]).join("available_filter_functions"))
    }

    fn remove_blacklisted(&self, funcs: &mut FuncsModulesMap) {
        let path = &self.config.kprobes_blacklist;
        let file = match File::open(path) {
            Ok(file) => file,
            Err(err) => {
                debug!("failed to open kprobe blacklist {}: {err}", path.display());
                return
            }
        };

        for line in BufReader::new(file).lines().map_while(Result::ok) {
            match split_addrrange_symbol_module(&line) {
                Some((_range, name, _module)) => {
                    let _removed = funcs.remove(name);
                }
                None => warn!("ignoring malformed kprobe blacklist line: {line}"),
            }
        }
    }

    /// Read the functions available for tracing, grouped by name.
    ///
    /// Functions deemed unsafe by [`is_bad_func`] are skipped and
    /// functions on the kprobe blacklist are removed, irrespective of
    /// their module. If the listing can't be read, the result is empty.
    #[cfg_attr(feature = "tracing", crate::log::instrument(skip_all))]
    pub fn parse(&self) -> FuncsModulesMap {
        let path = self.available_functions_path();
        let file = match File::open(&path) {
            Ok(file) => file,
            Err(err) => {
                debug!("failed to read traceable functions from {}: {err}", path.display());
                return FuncsModulesMap::new()
            }
        };

        let mut funcs = FuncsModulesMap::new();
        for line in BufReader::new(file).lines().map_while(Result::ok) {
            let (name, module) = split_symbol_module(&line);
            if name.is_empty() || is_bad_func(name) {
                continue
            }
            let module = if module.is_empty() {
                VMLINUX_MODULE
            } else {
                module
            };
            let _new = funcs
                .entry(name.to_string())
                .or_default()
                .insert(module.to_string());
        }

        let () = self.remove_blacklisted(&mut funcs);
        debug!("found {} traceable functions", funcs.len());
        funcs
    }
}
