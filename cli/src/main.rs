#![allow(clippy::let_and_return, clippy::let_unit_value)]

mod args;

use anyhow::Context;
use anyhow::Result;

use probenv::cgroup::CgroupPathResolver;
use probenv::cpu;
use probenv::kernel;
use probenv::kernel::KConfig;
use probenv::kernel::KernelVersion;
use probenv::kernel::KernelVersionMethod;
use probenv::kernel::TraceableFuncs;
use probenv::maps::MappedPaths;
use probenv::path::BinaryResolver;
use probenv::wildcard::WildcardPattern;
use probenv::Config;

use clap::Parser as _;

use tracing::subscriber::set_global_default as set_global_subscriber;
use tracing::warn;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::fmt::time::SystemTime;
use tracing_subscriber::FmtSubscriber;


fn release(release: args::Release) -> Result<String> {
    match release.release {
        Some(release) => Ok(release),
        None => kernel::kernel_release().context("failed to determine kernel release"),
    }
}

fn vmlinux(config: &Config, vmlinux: args::Vmlinux) -> Result<()> {
    let args::Vmlinux { release, symbol } = vmlinux;
    let release = self::release(release)?;
    match kernel::find_vmlinux(config, symbol.as_deref(), &release) {
        Some(path) => println!("{}", path.display()),
        None => println!("<not-found>"),
    }
    Ok(())
}

fn kernel_dirs(config: &Config, release: args::Release) -> Result<()> {
    let release = self::release(release)?;
    let dirs = kernel::kernel_dirs(config, &release);
    let suffix = if dirs.found { "" } else { " (not found)" };
    println!("source: {}{suffix}", dirs.source.display());
    println!("build: {}{suffix}", dirs.build.display());
    Ok(())
}

fn kconfig(config: &Config, kconfig: args::Kconfig) -> Result<()> {
    let options = KConfig::new(config);
    if kconfig.names.is_empty() {
        // Options are not kept in file order, so sort them for stable
        // output.
        let mut all = options.iter().collect::<Vec<_>>();
        let () = all.sort();
        for (name, value) in all {
            println!("{name}={value}");
        }
        return Ok(())
    }

    for name in kconfig.names {
        match options.get(&name) {
            Some(value) => println!("{name}={value}"),
            None => println!("{name} is not set"),
        }
    }
    Ok(())
}

fn version(version: args::Version) -> Result<()> {
    let kernel_version = KernelVersion::new();
    let methods = match version.method {
        Some(args::VersionMethod::Vdso) => vec![KernelVersionMethod::Vdso],
        Some(args::VersionMethod::Uts) => vec![KernelVersionMethod::Uts],
        Some(args::VersionMethod::File) => vec![KernelVersionMethod::File],
        None => vec![
            KernelVersionMethod::Vdso,
            KernelVersionMethod::Uts,
            KernelVersionMethod::File,
        ],
    };

    for method in methods {
        let code = kernel_version.kernel_version(method);
        println!(
            "{method:?}: {}.{}.{} ({code:#x})",
            code >> 16,
            (code >> 8) & 0xff,
            code & 0xff
        );
    }
    Ok(())
}

fn cflags(config: &Config, release: args::Release) -> Result<()> {
    let release = self::release(release)?;
    let dirs = kernel::kernel_dirs(config, &release);
    if !dirs.found {
        warn!(
            "no kernel headers found for release {release}; assuming {} and {}",
            dirs.source.display(),
            dirs.build.display()
        );
    }
    let machine = kernel::kernel_machine().context("failed to determine machine name")?;
    let kconfig = KConfig::new(config);
    let cflags = kernel::kernel_cflags(&machine, &dirs.source, &dirs.build, &kconfig, config.arch());
    println!("{}", cflags.join(" "));
    Ok(())
}

fn resolve(config: &Config, resolve: args::Resolve) -> Result<()> {
    let args::Resolve { command, pid } = resolve;
    let resolver = BinaryResolver::new(config);
    let paths = resolver
        .resolve(&command, pid)
        .with_context(|| format!("failed to resolve `{command}`"))?;
    for path in paths {
        println!("{}", path.display());
    }
    Ok(())
}

fn maps(maps: args::Maps) -> Result<()> {
    let mut mapped = MappedPaths::new();
    let paths = match maps.pid {
        Some(pid) => mapped
            .mapped_paths(pid)
            .with_context(|| format!("failed to read mappings of process {pid}"))?,
        None => mapped
            .mapped_paths_for_running_pids()
            .context("failed to read mappings of running processes")?,
    };
    for path in paths {
        println!("{}", path.display());
    }
    Ok(())
}

fn cgroup(cgroup: args::Cgroup) -> Result<()> {
    let mut resolver = CgroupPathResolver::new();
    let paths = resolver
        .cgroup_paths(cgroup.id, &cgroup.filter)
        .context("failed to resolve cgroup paths")?;
    for (label, path) in paths {
        let path = if path.is_empty() { "<not-found>" } else { &path };
        println!("{label}: {path}");
    }
    Ok(())
}

fn funcs(config: &Config, funcs: args::Funcs) -> Result<()> {
    let pattern = WildcardPattern::new(&funcs.pattern);
    let catalog = TraceableFuncs::new(config).parse();

    let mut funcs = catalog
        .iter()
        .filter(|(name, _modules)| pattern.matches(name))
        .flat_map(|(name, modules)| modules.iter().map(move |module| (name, module)))
        .collect::<Vec<_>>();
    let () = funcs.sort();
    for (name, module) in funcs {
        println!("{module}:{name}");
    }
    Ok(())
}

fn cpus() -> Result<()> {
    let online = cpu::online_cpus().context("failed to read online CPUs")?;
    let possible = cpu::possible_cpus().context("failed to read possible CPUs")?;
    let max = cpu::max_cpu_id().context("failed to compute maximum CPU ID")?;
    println!("online: {online:?}");
    println!("possible: {possible:?}");
    println!("max CPU ID mask: {max:#x}");
    Ok(())
}


fn main() -> Result<()> {
    let args = args::Args::parse();
    let level = match args.verbosity {
        0 => LevelFilter::WARN,
        1 => LevelFilter::INFO,
        2 => LevelFilter::DEBUG,
        _ => LevelFilter::TRACE,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_span_events(FmtSpan::FULL)
        .with_timer(SystemTime)
        .finish();

    let () =
        set_global_subscriber(subscriber).with_context(|| "failed to set tracing subscriber")?;

    let config = Config::from_env();
    match args.command {
        args::Command::Vmlinux(vmlinux) => self::vmlinux(&config, vmlinux),
        args::Command::KernelDirs(release) => self::kernel_dirs(&config, release),
        args::Command::Kconfig(kconfig) => self::kconfig(&config, kconfig),
        args::Command::Version(version) => self::version(version),
        args::Command::Cflags(release) => self::cflags(&config, release),
        args::Command::Resolve(resolve) => self::resolve(&config, resolve),
        args::Command::Maps(maps) => self::maps(maps),
        args::Command::Cgroup(cgroup) => self::cgroup(cgroup),
        args::Command::Funcs(funcs) => self::funcs(&config, funcs),
        args::Command::Cpus => self::cpus(),
    }
}
