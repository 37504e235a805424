use std::fs;
use std::os::unix::fs::MetadataExt as _;
use std::path::Path;

use probenv::cgroup::CgroupPathResolver;
use probenv::cgroup::CgroupRoots;

use tempfile::tempdir;

use test_log::test;


/// Check that our own cgroup v2 path is found by its ID.
#[test]
fn own_unified_cgroup() {
    let Ok(content) = fs::read_to_string("/proc/self/cgroup") else {
        return
    };
    let Some(rel) = content.lines().find_map(|line| line.strip_prefix("0::")) else {
        return
    };
    let roots = CgroupRoots::from_system().unwrap();
    let Some(root) = roots.unified.first() else {
        return
    };

    let dir = root.join(rel.trim_start_matches('/'));
    let Ok(meta) = fs::metadata(&dir) else {
        // We may live in a cgroup namespace whose root is not the
        // hierarchy's root.
        return
    };

    let mut resolver = CgroupPathResolver::new();
    let paths = resolver.cgroup_paths(meta.ino(), "unified").unwrap();
    assert_eq!(paths.len(), roots.unified.len());
    assert_eq!(paths[0].0, "unified");
    assert_eq!(paths[0].1, rel);
}

/// Check resolution across hierarchies described by a mount table.
#[test]
fn mount_table_hierarchies() {
    let dir = tempdir().unwrap();
    let unified = dir.path().join("unified");
    let pids = dir.path().join("pids");
    let () = fs::create_dir_all(unified.join("system.slice/cron.service")).unwrap();
    let () = fs::create_dir_all(pids.join("system.slice/cron.service")).unwrap();

    let mounts = format!(
        "cgroup2 {} cgroup2 rw 0 0\ncgroup {} cgroup rw,pids 0 0\n",
        unified.display(),
        pids.display()
    );
    let roots = CgroupRoots::from_mounts(mounts.as_bytes()).unwrap();

    fn ino(path: &Path) -> u64 {
        fs::metadata(path).unwrap().ino()
    }

    let id = ino(&pids.join("system.slice/cron.service"));
    let mut resolver = CgroupPathResolver::new();
    let paths = resolver.cgroup_paths_in(&roots, id, "*");
    assert_eq!(
        paths,
        vec![
            ("unified".to_string(), String::new()),
            ("pids".to_string(), "/system.slice/cron.service".to_string()),
        ]
    );

    let paths = resolver.cgroup_paths_in(&roots, id, "pid*");
    assert_eq!(
        paths,
        vec![("pids".to_string(), "/system.slice/cron.service".to_string())]
    );
}
