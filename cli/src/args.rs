use anyhow::Context as _;
use anyhow::Result;

use clap::ArgAction;
use clap::Args as Arguments;
use clap::Parser;
use clap::Subcommand;
use clap::ValueEnum;

use probenv::Pid;


/// Parse a PID from a string.
fn parse_pid(s: &str) -> Result<Pid> {
    let pid = if let Some(s) = s.strip_prefix("0x") {
        u32::from_str_radix(s, 16)
    } else {
        s.parse::<u32>()
    }
    .with_context(|| format!("failed to parse PID: {s}"))?;

    Ok(Pid::from(pid))
}


/// A command line interface for probenv.
#[derive(Debug, Parser)]
#[clap(version = env!("VERSION"))]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,
    /// Increase verbosity (can be supplied multiple times).
    #[arg(short = 'v', long = "verbose", global = true, action = ArgAction::Count)]
    pub verbosity: u8,
}


#[derive(Debug, Subcommand)]
pub enum Command {
    /// Locate a kernel image with debug symbols.
    Vmlinux(Vmlinux),
    /// Report the kernel source and build directories.
    KernelDirs(Release),
    /// Print kernel configuration options.
    Kconfig(Kconfig),
    /// Report the version code of the running kernel.
    Version(Version),
    /// Print the compiler flags for parsing kernel headers.
    Cflags(Release),
    /// Resolve a command name to binaries.
    Resolve(Resolve),
    /// List the files mapped by processes.
    Maps(Maps),
    /// Resolve a cgroup ID to cgroup paths.
    Cgroup(Cgroup),
    /// List kernel functions available for tracing.
    Funcs(Funcs),
    /// List online and possible CPUs.
    Cpus,
}


#[derive(Debug, Arguments)]
pub struct Release {
    /// The kernel release to use instead of the running one.
    #[clap(short, long)]
    pub release: Option<String>,
}

#[derive(Debug, Arguments)]
pub struct Vmlinux {
    #[command(flatten)]
    pub release: Release,
    /// Only accept images defining this symbol.
    #[clap(short, long)]
    pub symbol: Option<String>,
}

#[derive(Debug, Arguments)]
pub struct Kconfig {
    /// The options to print (e.g., `CONFIG_BPF`). All options are
    /// printed if none are given.
    pub names: Vec<String>,
}

/// The strategy for determining the kernel version.
#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum VersionMethod {
    /// Read the version note of the vDSO.
    Vdso,
    /// Parse the `uname` release.
    Uts,
    /// Read the installed `linux/version.h`.
    File,
}

#[derive(Debug, Arguments)]
pub struct Version {
    /// The strategy to use. All are reported if not given.
    #[clap(short, long, value_enum)]
    pub method: Option<VersionMethod>,
}

#[derive(Debug, Arguments)]
pub struct Resolve {
    /// The command name, path, or glob pattern to resolve.
    pub command: String,
    /// Resolve from the point of view of this process.
    #[clap(short, long)]
    #[arg(value_parser = parse_pid)]
    pub pid: Option<Pid>,
}

#[derive(Debug, Arguments)]
pub struct Maps {
    /// The process to inspect. All running processes are inspected if
    /// not given.
    #[clap(short, long)]
    #[arg(value_parser = parse_pid)]
    pub pid: Option<Pid>,
}

#[derive(Debug, Arguments)]
pub struct Cgroup {
    /// The cgroup ID.
    pub id: u64,
    /// A wildcard pattern restricting the hierarchies to search.
    #[clap(short, long, default_value = "*")]
    pub filter: String,
}

#[derive(Debug, Arguments)]
pub struct Funcs {
    /// A wildcard pattern restricting the functions to list.
    #[clap(default_value = "*")]
    pub pattern: String,
}
