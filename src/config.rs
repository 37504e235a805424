use std::env;
use std::ffi::OsString;
use std::path::Path;
use std::path::PathBuf;


/// The environment variable overriding the kernel image location.
pub const VMLINUX_ENV: &str = "PROBENV_VMLINUX";
/// The environment variable overriding the kernel configuration file.
pub const KCONFIG_ENV: &str = "PROBENV_KCONFIG_TEST";
/// The environment variable overriding the kernel source directory.
pub const KERNEL_SOURCE_ENV: &str = "PROBENV_KERNEL_SOURCE";
/// The environment variable overriding the kernel build directory.
pub const KERNEL_BUILD_ENV: &str = "PROBENV_KERNEL_BUILD";
/// The environment variable overriding the listing of functions
/// available for probing.
pub const AVAILABLE_FUNCTIONS_ENV: &str = "PROBENV_AVAILABLE_FUNCTIONS_TEST";
/// The environment variable overriding the target architecture.
pub const ARCH_ENV: &str = "ARCH";

/// The default location of the kernel's kprobe blacklist.
const KPROBES_BLACKLIST: &str = "/sys/kernel/debug/kprobes/blacklist";


/// A builder for customizable [`Config`] objects.
#[derive(Clone, Debug, Default)]
pub struct Builder {
    config: Config,
}

impl Builder {
    /// Use the kernel image at `path` instead of searching the
    /// well-known locations.
    pub fn set_vmlinux<P>(mut self, path: Option<P>) -> Builder
    where
        P: Into<PathBuf>,
    {
        self.config.vmlinux = path.map(P::into);
        self
    }

    /// Read the kernel configuration from `path`.
    pub fn set_kconfig<P>(mut self, path: Option<P>) -> Builder
    where
        P: Into<PathBuf>,
    {
        self.config.kconfig = path.map(P::into);
        self
    }

    /// Set the kernel source and (optionally) build directories.
    ///
    /// The build directory defaults to the source directory.
    pub fn set_kernel_dirs<P, Q>(mut self, source: Option<P>, build: Option<Q>) -> Builder
    where
        P: Into<PathBuf>,
        Q: Into<PathBuf>,
    {
        self.config.kernel_source = source.map(P::into);
        self.config.kernel_build = build.map(Q::into);
        self
    }

    /// Read traceable functions from `path` instead of the tracefs
    /// provided listing.
    pub fn set_available_functions<P>(mut self, path: Option<P>) -> Builder
    where
        P: Into<PathBuf>,
    {
        self.config.available_functions = path.map(P::into);
        self
    }

    /// Set the path to the kprobe blacklist.
    pub fn set_kprobes_blacklist<P>(mut self, path: P) -> Builder
    where
        P: Into<PathBuf>,
    {
        self.config.kprobes_blacklist = path.into();
        self
    }

    /// Override the architecture name used for kernel header lookup.
    pub fn set_arch(mut self, arch: Option<String>) -> Builder {
        self.config.arch = arch;
        self
    }

    /// Set the executable search path, in the `PATH` format
    /// (colon separated directories).
    pub fn set_path<S>(mut self, path: Option<S>) -> Builder
    where
        S: Into<OsString>,
    {
        self.config.path = path.map(S::into);
        self
    }

    /// Create the [`Config`] object.
    pub fn build(self) -> Config {
        self.config
    }
}


/// Configuration shared by all environment queries.
///
/// None of the components consult the process environment directly.
/// Use [`Config::from_env`] to pick up the conventional environment
/// variables.
#[derive(Clone, Debug, PartialEq)]
pub struct Config {
    pub(crate) vmlinux: Option<PathBuf>,
    pub(crate) kconfig: Option<PathBuf>,
    pub(crate) kernel_source: Option<PathBuf>,
    pub(crate) kernel_build: Option<PathBuf>,
    pub(crate) available_functions: Option<PathBuf>,
    pub(crate) kprobes_blacklist: PathBuf,
    pub(crate) arch: Option<String>,
    pub(crate) path: Option<OsString>,
}

impl Config {
    /// Retrieve a [`Builder`] object for configurable construction
    /// of a [`Config`].
    pub fn builder() -> Builder {
        Builder::default()
    }

    /// Create a [`Config`] from the process environment.
    ///
    /// Empty variables are treated as unset, except for `PATH`.
    pub fn from_env() -> Self {
        fn var_path(name: &str) -> Option<PathBuf> {
            env::var_os(name)
                .filter(|value| !value.is_empty())
                .map(PathBuf::from)
        }

        Self::builder()
            .set_vmlinux(var_path(VMLINUX_ENV))
            .set_kconfig(var_path(KCONFIG_ENV))
            .set_kernel_dirs(var_path(KERNEL_SOURCE_ENV), var_path(KERNEL_BUILD_ENV))
            .set_available_functions(var_path(AVAILABLE_FUNCTIONS_ENV))
            .set_arch(env::var(ARCH_ENV).ok().filter(|arch| !arch.is_empty()))
            .set_path(env::var_os("PATH"))
            .build()
    }

    /// The kernel image override, if any.
    pub fn vmlinux(&self) -> Option<&Path> {
        self.vmlinux.as_deref()
    }

    /// The kernel configuration override, if any.
    pub fn kconfig(&self) -> Option<&Path> {
        self.kconfig.as_deref()
    }

    /// The architecture override, if any.
    pub fn arch(&self) -> Option<&str> {
        self.arch.as_deref()
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            vmlinux: None,
            kconfig: None,
            kernel_source: None,
            kernel_build: None,
            available_functions: None,
            kprobes_blacklist: PathBuf::from(KPROBES_BLACKLIST),
            arch: None,
            path: None,
        }
    }
}
