mod common;

use common::{test_config, FakeHost, Reach};
use netheal_common::verify::{ProbeKind, Verifier};

#[test]
fn test_primary_success_stops_early() {
    let host = FakeHost::new()
        .physical("eno1", Some("e1000e"))
        .reach("8.8.8.8", Reach::FromPing(2));
    let config = test_config();

    let outcome = Verifier::new(&host, &config.verify).verify("eno1", false);

    assert!(outcome.reachable);
    assert_eq!(outcome.reached_target(), Some("8.8.8.8"));
    assert_eq!(host.pings(), vec!["8.8.8.8", "8.8.8.8"]);
    assert_eq!(host.settles(), vec![config.verify.delay_for(false)]);
    assert!(outcome.diagnostics.is_none());
}

#[test]
fn test_alternative_target_counts_as_recovery() {
    let host = FakeHost::new()
        .physical("eno1", Some("e1000e"))
        .default_route("eno1", "192.168.1.1")
        .reach("9.9.9.9", Reach::Always);
    let config = test_config();

    let outcome = Verifier::new(&host, &config.verify).verify("eno1", false);

    assert!(outcome.reachable);
    assert_eq!(outcome.reached_target(), Some("9.9.9.9"));
    // Alternatives only start at the configured attempt
    let alternative = outcome
        .results
        .iter()
        .find(|r| r.kind == ProbeKind::Alternative)
        .unwrap();
    assert_eq!(alternative.attempt, config.verify.alternative_after);
    assert!(outcome
        .results
        .iter()
        .any(|r| r.kind == ProbeKind::Gateway && r.target == "192.168.1.1"));
}

#[test]
fn test_gateway_alone_does_not_verify() {
    let host = FakeHost::new()
        .physical("eno1", Some("e1000e"))
        .default_route("eno1", "192.168.1.1")
        .reach("192.168.1.1", Reach::Always);
    let config = test_config();

    let outcome = Verifier::new(&host, &config.verify).verify("eno1", false);

    assert!(!outcome.reachable);
    assert_eq!(outcome.reached_target(), None);
}

#[test]
fn test_exhaustion_produces_diagnostics() {
    let host = FakeHost::new().physical("eno1", Some("e1000e"));
    let config = test_config();

    let outcome = Verifier::new(&host, &config.verify).verify("eno1", false);

    assert!(!outcome.reachable);
    let primaries = outcome
        .results
        .iter()
        .filter(|r| r.kind == ProbeKind::Primary)
        .count();
    assert_eq!(primaries as u32, config.verify.attempts);
    // No settle after the last attempt
    assert_eq!(host.settles().len() as u32, config.verify.attempts - 1);

    let dump = outcome.diagnostics.unwrap();
    assert_eq!(dump.interface, "eno1");
    assert!(dump.address_state.is_some());
    assert!(!dump.dns_resolved);
}

#[test]
fn test_bridges_get_more_attempts() {
    let host = FakeHost::new()
        .physical("eno1", Some("e1000e"))
        .bridge("vmbr0", &["eno1"]);
    let config = test_config();

    let outcome = Verifier::new(&host, &config.verify).verify("vmbr0", true);

    let primaries = outcome
        .results
        .iter()
        .filter(|r| r.kind == ProbeKind::Primary)
        .count();
    assert_eq!(primaries as u32, config.verify.bridge_attempts);
    assert!(host
        .settles()
        .iter()
        .all(|d| *d == config.verify.delay_for(true)));
}

#[test]
fn test_quick_check() {
    let config = test_config();

    let down = FakeHost::new().physical("eno1", None);
    assert!(!Verifier::new(&down, &config.verify).quick_check());
    assert_eq!(down.pings(), vec!["8.8.8.8", "1.1.1.1", "9.9.9.9"]);

    let alt = FakeHost::new()
        .physical("eno1", None)
        .reach("1.1.1.1", Reach::Always);
    assert!(Verifier::new(&alt, &config.verify).quick_check());
    assert!(alt.settles().is_empty());
}
