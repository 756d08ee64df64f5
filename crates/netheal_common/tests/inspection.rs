mod common;

use common::{hang_line, test_config, Call, FakeHost, Reach};
use netheal_common::diagnose::InterfaceRole;
use netheal_common::hang::{HangDetector, LogSource};
use netheal_common::topology::TopologyResolver;
use netheal_common::workaround::{PersistentWorkaroundRecord, UnitWrite, WorkaroundWriter};
use netheal_common::{diagnose, DryRunHost, ResetExecutor, ResetStrategy};

#[test]
fn test_hang_found_in_journal_when_dmesg_unreadable() {
    let journal = format!(
        "Oct 16 10:28:00 pve kernel: e1000e 0000:00:1f.6 eno1: {}:",
        "Detected Hardware Unit Hang"
    );
    let host = FakeHost::new()
        .physical("eno1", Some("e1000e"))
        .kernel_log(None)
        .journal(Some(&journal));
    let config = test_config();

    let evidence = HangDetector::new(&host, &config.hang).detect("eno1");
    assert!(evidence.found);
    assert_eq!(evidence.sources, vec![LogSource::SystemJournal]);
    assert_eq!(evidence.recent_window_minutes, config.hang.window_minutes);

    // Same text does not implicate a sibling interface
    assert!(!HangDetector::new(&host, &config.hang).detect("eno10").found);
}

#[test]
fn test_no_readable_logs_means_no_hang() {
    let host = FakeHost::new()
        .physical("eno1", Some("e1000e"))
        .kernel_log(None)
        .journal(None);
    let config = test_config();

    let evidence = HangDetector::new(&host, &config.hang).detect("eno1");
    assert!(!evidence.found);
    assert!(evidence.sources.is_empty());
}

#[test]
fn test_hang_in_both_sources() {
    let line = hang_line("eno1");
    let host = FakeHost::new()
        .physical("eno1", Some("e1000e"))
        .kernel_log(Some(&line))
        .journal(Some(&line));
    let config = test_config();

    let evidence = HangDetector::new(&host, &config.hang).detect("eno1");
    assert_eq!(
        evidence.sources,
        vec![LogSource::KernelRing, LogSource::SystemJournal]
    );
}

#[test]
fn test_workaround_install_is_idempotent() {
    let host = FakeHost::new().physical("eno1", Some("e1000e"));
    let config = test_config();
    let writer = WorkaroundWriter::new(&host, &config.workaround);
    let record =
        PersistentWorkaroundRecord::new("eno1", &config.policy.offload_features, &config.workaround);

    let first = writer.install(&record).unwrap();
    let second = writer.install(&record).unwrap();

    assert_eq!(first.write, UnitWrite::Created);
    assert_eq!(second.write, UnitWrite::Unchanged);
    assert_eq!(first.path, second.path);

    let calls = host.calls();
    let count = |wanted: &Call| calls.iter().filter(|c| *c == wanted).count();
    assert_eq!(count(&Call::Write(first.path.clone())), 1);
    // Reload runs on every install, not only after a write
    assert_eq!(count(&Call::DaemonReload), 2);
    assert_eq!(
        count(&Call::Enable("ethtool-workaround-eno1.service".into())),
        2
    );

    let fewer = vec!["tso".to_string()];
    let changed = PersistentWorkaroundRecord::new("eno1", &fewer, &config.workaround);
    assert_eq!(writer.install(&changed).unwrap().write, UnitWrite::Updated);
}

#[test]
fn test_workaround_reload_repeated_after_failure() {
    let host = FakeHost::new()
        .physical("eno1", Some("e1000e"))
        .failing_daemon_reload(1);
    let config = test_config();
    let writer = WorkaroundWriter::new(&host, &config.workaround);
    let record =
        PersistentWorkaroundRecord::new("eno1", &config.policy.offload_features, &config.workaround);

    assert!(writer.install(&record).is_err());
    assert!(host.calls().iter().any(|c| matches!(c, Call::Write(_))));
    assert!(!host.calls().contains(&Call::DaemonReload));

    let retry = writer.install(&record).unwrap();
    assert_eq!(retry.write, UnitWrite::Unchanged);
    let calls = host.calls();
    let reload = calls.iter().position(|c| *c == Call::DaemonReload).unwrap();
    let enable = calls
        .iter()
        .position(|c| *c == Call::Enable("ethtool-workaround-eno1.service".into()))
        .unwrap();
    assert!(reload < enable);
}

#[test]
fn test_topology_skips_unreadable_members() {
    let host = FakeHost::new()
        .physical("eno1", Some("e1000e"))
        .bridge("vmbr0", &["eno1", "gone0"]);
    let resolver = TopologyResolver::new(&host);

    let topology = resolver.topology("vmbr0");
    assert_eq!(topology.members.len(), 1);
    assert_eq!(topology.physical_members().count(), 1);
    assert!(resolver.bridge_members("eno1").is_empty());
}

#[test]
fn test_diagnose_changes_nothing() {
    let host = FakeHost::new()
        .physical("eno1", Some("e1000e"))
        .virtual_iface("fwpr1", Some("veth"))
        .bridge("vmbr0", &["eno1", "fwpr1"])
        .kernel_log(Some(&hang_line("eno1")))
        .reach("8.8.8.8", Reach::Always);
    let config = test_config();

    let report = diagnose(&host, &config, "vmbr0").unwrap();

    assert!(report.connectivity);
    assert!(report.hang_detected());
    assert_eq!(report.interfaces.len(), 3);

    let eno1 = &report.interfaces[0];
    assert_eq!(eno1.role, InterfaceRole::BridgeMember);
    assert_eq!(eno1.planned_strategy, Some(ResetStrategy::ModuleReload));

    let fwpr1 = &report.interfaces[1];
    assert!(fwpr1.hang.is_none());
    assert!(fwpr1.planned_strategy.is_none());

    let bridge = &report.interfaces[2];
    assert_eq!(bridge.role, InterfaceRole::Primary);
    assert_eq!(bridge.planned_strategy, Some(ResetStrategy::SoftToggle));

    assert!(host.calls().is_empty());
}

#[test]
fn test_dry_run_applies_nothing() {
    let fake = FakeHost::new()
        .physical("eno1", Some("e1000e"))
        .kernel_log(Some(&hang_line("eno1")));
    let config = test_config();
    let dry = DryRunHost::new(fake);

    let descriptor = TopologyResolver::new(&dry).resolve("eno1").unwrap();
    let outcome = ResetExecutor::new(&dry, &config).reset(&descriptor, true);

    // Decisions are still real
    assert_eq!(outcome.strategy_used, ResetStrategy::ModuleReload);
    assert!(outcome.succeeded);

    let fake = dry.into_inner();
    assert!(fake.calls().is_empty());
    assert!(fake.settles().is_empty());
    assert!(fake.files.lock().unwrap().is_empty());
}
