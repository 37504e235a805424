use std::env;

use anyhow::Result;

use grev::git_revision_auto;


fn main() -> Result<()> {
    let dir = env::var("CARGO_MANIFEST_DIR")?;
    let pkg_version = env!("CARGO_PKG_VERSION");
    let version = match git_revision_auto(dir)? {
        Some(git_rev) => format!("{pkg_version} ({git_rev})"),
        None => pkg_version.to_string(),
    };
    println!("cargo:rustc-env=VERSION={version}");
    Ok(())
}
