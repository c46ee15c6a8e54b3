use std::fs;

use tempfile::tempdir;

use akroma_mn::{
    platform::DistroFamily,
    unit::{self, NodeConfig, UnitFile},
};

fn config() -> NodeConfig {
    NodeConfig {
        run_as_user: Some("akroma".to_string()),
        rpc_user: Some("rpc".to_string()),
        rpc_password: Some("secret99".to_string()),
        ..NodeConfig::default()
    }
}

#[test]
fn repeated_reconcile_converges_without_rewrites() {
    let dir = tempdir().expect("failed to create tempdir");
    let unit_file = UnitFile::new(dir.path().join("akromanode.service"));

    let rendered = unit::render(&config(), Some(DistroFamily::Debian));
    assert!(unit_file.reconcile(&rendered).expect("first reconcile"));

    // Re-render from the recovered on-disk configuration, the way a flag-less
    // re-run does, and confirm nothing changes.
    let recovered = unit_file.recovered();
    let rebuilt = NodeConfig {
        run_as_user: recovered.run_as_user,
        port: recovered.port.unwrap_or(30303),
        rpc_port: recovered.rpc_port.unwrap_or(8545),
        rpc_user: recovered.rpc_user,
        rpc_password: recovered.rpc_password,
        use_jemalloc: recovered.use_jemalloc,
    };
    let re_rendered = unit::render(&rebuilt, Some(DistroFamily::Debian));
    assert_eq!(re_rendered, rendered);
    assert!(!unit_file.reconcile(&re_rendered).expect("second reconcile"));
}

#[test]
fn changed_configuration_rewrites_the_unit() {
    let dir = tempdir().expect("failed to create tempdir");
    let unit_file = UnitFile::new(dir.path().join("akromanode.service"));

    let mut desired = config();
    let rendered = unit::render(&desired, Some(DistroFamily::RedHat));
    assert!(unit_file.reconcile(&rendered).expect("first reconcile"));

    desired.port = 30400;
    desired.use_jemalloc = true;
    let rendered = unit::render(&desired, Some(DistroFamily::RedHat));
    assert!(unit_file.reconcile(&rendered).expect("changed reconcile"));

    let on_disk = fs::read_to_string(unit_file.path()).expect("read unit file");
    assert!(on_disk.contains("--port 30400"));
    assert!(on_disk.contains("LD_PRELOAD=/usr/lib64/libjemalloc.so.1"));
}

#[test]
fn unit_removal_is_idempotent() {
    let dir = tempdir().expect("failed to create tempdir");
    let unit_file = UnitFile::new(dir.path().join("akromanode.service"));

    let rendered = unit::render(&config(), None);
    unit_file.reconcile(&rendered).expect("reconcile");
    assert!(unit_file.exists());

    unit_file.remove().expect("first remove");
    assert!(!unit_file.exists());
    unit_file.remove().expect("second remove");
}
