//! **probenv** answers the environment questions a dynamic tracer has
//! to settle before it can attach a single probe.
//!
//! - where the running kernel's symbol and type image lives
//!   ([`kernel::find_vmlinux`]), where its headers are
//!   ([`kernel::kernel_dirs`]), how it was configured ([`kernel::KConfig`])
//!   and which version it is ([`kernel::KernelVersion`])
//! - which binaries a command name resolves to, even when the target
//!   process lives in a different mount namespace
//!   ([`path::BinaryResolver`], [`namespace`])
//! - which file backed images a process has mapped
//!   ([`maps::MappedPaths`])
//! - which kernel functions can safely be probed
//!   ([`kernel::TraceableFuncs`])
//! - which cgroup path a numeric cgroup ID corresponds to
//!   ([`cgroup::CgroupPathResolver`])
//!
//! Stateful components own their caches. A caller is expected to create
//! them once per tracing session and pass them around by reference;
//! none of them is `Sync`.
//!
//! All functionality is configured through a [`Config`] object, which
//! can be populated from the process environment using
//! [`Config::from_env`].

#![allow(clippy::let_and_return, clippy::let_unit_value)]
#![cfg_attr(docsrs, feature(doc_cfg))]


#[cfg(feature = "tracing")]
#[allow(unused_imports)]
mod log {
    pub(crate) use tracing::debug;
    pub(crate) use tracing::error;
    pub(crate) use tracing::info;
    pub(crate) use tracing::instrument;
    pub(crate) use tracing::trace;
    pub(crate) use tracing::warn;
}

#[cfg(not(feature = "tracing"))]
#[allow(unused_imports)]
mod log {
    // Only reachable through the `pub(crate) use` paths below, so that
    // modules import it the same way in both configurations.
    macro_rules! debug {
        ($($args:tt)*) => {{
          if false {
            // Make sure to use `args` to prevent any warnings about
            // unused variables.
            let _args = format_args!($($args)*);
          }
        }};
    }
    pub(crate) use debug;
    pub(crate) use debug as error;
    pub(crate) use debug as info;
    pub(crate) use debug as trace;
    pub(crate) use debug as warn;
}

pub mod cgroup;
mod config;
pub mod cpu;
pub mod elf;
mod error;
pub mod kernel;
pub mod maps;
mod mmap;
pub mod namespace;
pub mod path;
mod pid;
pub mod stdio;
pub mod symbol;
#[cfg(test)]
mod test_helper;
mod util;
pub mod wildcard;


pub use crate::config::Builder as ConfigBuilder;
pub use crate::config::Config;
pub use crate::error::Error;
pub use crate::error::ErrorExt;
pub use crate::error::ErrorKind;
pub use crate::error::IntoCowStr;
pub use crate::error::IntoError;
pub use crate::pid::Pid;


/// A type representing addresses.
pub type Addr = u64;

/// A result type using our [`Error`] by default.
pub type Result<T, E = Error> = std::result::Result<T, E>;
