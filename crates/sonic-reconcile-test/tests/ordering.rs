//! Ordering: a failed action skips the later actions on the same resource.

use std::sync::Arc;

use pretty_assertions::assert_eq;
use sonic_featured::{build_daemon, FeaturedConfig};
use sonic_reconcile_common::{
    row, Action, ActionOutcome, EventOutcome, MemoryStore, ServiceVerb,
};
use sonic_reconcile_test::{feature_fixtures, CommandVerifier, RecordingRunner, StateVerifier};

#[tokio::test]
async fn test_failed_stop_skips_disable_and_mask() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = FeaturedConfig::default();
    config.featured.systemd_dir = dir.path().to_path_buf();

    let store = MemoryStore::new();
    feature_fixtures::feature_enabled("dhcp_relay").apply_to(&store);
    let runner = Arc::new(RecordingRunner::new());
    let mut daemon = build_daemon(&config, Arc::new(store.clone()), runner.clone())
        .unwrap()
        .with_status_sink(Arc::new(store.clone()));

    let (_subscription, snapshot) = daemon.connect_with_retry().await.unwrap().unwrap();
    daemon.full_reconcile(snapshot).await;
    runner.clear();

    runner.fail_containing("stop dhcp_relay.service");
    let outcome = daemon
        .reconcile_event(feature_fixtures::feature_disabled("dhcp_relay").into_event())
        .await;

    let EventOutcome::Applied(report) = outcome else {
        panic!("expected the actions to run, got {:?}", outcome);
    };
    let actions: Vec<Action> = report.reports.iter().map(|r| r.action.clone()).collect();
    assert_eq!(
        actions,
        vec![
            Action::service("dhcp_relay.service", ServiceVerb::Stop),
            Action::service("dhcp_relay.service", ServiceVerb::Disable),
            Action::service("dhcp_relay.service", ServiceVerb::Mask),
        ]
    );
    assert!(matches!(report.reports[0].outcome, ActionOutcome::Failed(_)));
    assert!(matches!(report.reports[1].outcome, ActionOutcome::Skipped(_)));
    assert!(matches!(report.reports[2].outcome, ActionOutcome::Skipped(_)));

    let commands = CommandVerifier::new(&runner);
    commands.assert_count("stop dhcp_relay.service", 1).unwrap();
    commands
        .assert_commands(&["/bin/systemctl stop dhcp_relay.service"])
        .unwrap();

    // The cache keeps the last applied row so the change is retried.
    let state = StateVerifier::new(&daemon, &store);
    state
        .assert_applied("FEATURE", "dhcp_relay", Some(&row! { "state" => "enabled" }))
        .unwrap();
    state
        .assert_status("FEATURE", "dhcp_relay", Some(&row! { "state" => "failed" }))
        .unwrap();
}

#[tokio::test]
async fn test_failed_change_is_retried_by_the_same_event() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = FeaturedConfig::default();
    config.featured.systemd_dir = dir.path().to_path_buf();

    let store = MemoryStore::new();
    let runner = Arc::new(RecordingRunner::new());
    let mut daemon = build_daemon(&config, Arc::new(store.clone()), runner.clone()).unwrap();

    runner.fail_containing("unmask ntp.service");
    let event = feature_fixtures::feature_enabled("ntp").into_event();
    let first = daemon.reconcile_event(event.clone()).await;
    assert!(matches!(first, EventOutcome::Applied(ref r) if !r.all_succeeded()));
    assert_eq!(daemon.applied().get("FEATURE", "ntp"), None);

    runner.clear_rules();
    let second = daemon.reconcile_event(event).await;
    assert!(matches!(second, EventOutcome::Applied(ref r) if r.all_succeeded()));
    assert_eq!(
        daemon.applied().get("FEATURE", "ntp"),
        Some(row! { "state" => "enabled" })
    );
}
