use std::time::Duration;

use splitdiff::diff::Discrepancy;
use splitdiff::error::ErrorKind;
use splitdiff::row;
use splitdiff::test_utils::{
    FakeCluster, Failure, Operation, RemoteCall, VerticalSplit, position, table_definition,
};
use splitdiff::types::{ShardInfo, TabletAlias, TabletType};
use splitdiff::workers::base::{Worker, WorkerHandle};
use splitdiff::workers::state::WorkerState;
use splitdiff_telemetry::init_test_tracing;

use crate::common::{customers, orders, rows, start_replication, undrain};

fn assert_nothing_mutated(cluster: &FakeCluster) {
    let mutations: Vec<RemoteCall> = cluster
        .journal()
        .into_iter()
        .filter(|call| call.is_mutation())
        .collect();
    assert!(mutations.is_empty(), "unexpected mutations: {mutations:?}");
}

#[tokio::test(flavor = "multi_thread")]
async fn clean_split_is_done_and_restores_tablets() {
    init_test_tracing();

    let split = VerticalSplit::new(&["customers", "orders"]);
    split.add_table(&orders(), rows(50));
    split.add_table(&customers(), rows(20));

    let (worker, _cancel) = split.worker();
    let status = worker.status();
    let chain = worker.compensations().clone();

    let outcome = worker.run().await;

    assert!(outcome.is_success(), "{:?}", outcome.error);
    assert_eq!(outcome.state, WorkerState::Done);
    assert!(!outcome.had_differences);

    let report = outcome.report.unwrap();
    assert!(report.is_clean());
    assert_eq!(report.source_tablet, *split.source_tablet());
    assert_eq!(report.destination_tablet, split.destination_tablet);
    assert_eq!(report.tables.len(), 2);
    assert_eq!(report.tables["orders"].matching_rows, 50);
    assert_eq!(report.tables["customers"].matching_rows, 20);

    // Every mutation was undone, most recent first.
    assert_eq!(
        chain.executed().await,
        vec![
            start_replication(&split.destination_tablet),
            start_replication(split.source_tablet()),
            undrain(split.source_tablet()),
            undrain(&split.destination_tablet),
        ]
    );
    split.assert_restored();

    assert_eq!(
        status.as_text(),
        "Working on: customer/0\nState: done\nSuccess.\n"
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn both_tablets_are_stopped_at_the_same_point() {
    init_test_tracing();

    let split = VerticalSplit::new(&["orders"]);
    split.add_table(&orders(), rows(5));

    let (worker, _cancel) = split.worker();
    let outcome = worker.run().await;
    assert!(outcome.is_success());

    let stops = split.cluster.journal_of(Operation::StopReplicationMinimum);
    assert_eq!(stops.len(), 2);

    // The source stops right past the paused stream, the filtered stream then catches up
    // to the exact source position, and the destination stops past its primary.
    let source_stop = position(1_000 + FakeCluster::STOP_OVERSHOOT);
    assert_eq!(
        stops[0],
        RemoteCall::StopReplicationMinimum {
            tablet: split.source_tablet().clone(),
            minimum: position(1_000),
        }
    );
    assert_eq!(
        split.cluster.journal_of(Operation::WaitForFilteredPosition),
        vec![RemoteCall::WaitForFilteredPosition {
            primary: split.destination_primary.clone(),
            source_uid: split.source_uid,
            position: source_stop,
        }]
    );
    assert_eq!(
        stops[1],
        RemoteCall::StopReplicationMinimum {
            tablet: split.destination_tablet.clone(),
            minimum: position(5_000),
        }
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn reports_missing_rows_on_both_sides() {
    init_test_tracing();

    let split = VerticalSplit::new(&["orders"]);
    split.add_source_table(&orders(), vec![row!(1, "a"), row!(2, "b"), row!(4, "d")]);
    split.add_destination_table(&orders(), vec![row!(1, "a"), row!(3, "c"), row!(4, "d")]);

    let (worker, _cancel) = split.worker();
    let status = worker.status();
    let outcome = worker.run().await;

    assert_eq!(outcome.state, WorkerState::Error);
    assert!(outcome.had_differences);
    let err = outcome.error.unwrap();
    assert_eq!(err.kinds(), vec![ErrorKind::DiscrepancyFound]);

    let report = outcome.report.unwrap();
    let orders = &report.tables["orders"];
    assert!(orders.has_differences());
    assert_eq!(orders.processed_rows, 4);
    assert_eq!(orders.matching_rows, 2);
    assert_eq!(orders.mismatched_rows, 0);
    assert_eq!(orders.missing_in_destination, 1);
    assert_eq!(orders.missing_in_source, 1);
    assert_eq!(
        orders.samples,
        vec![
            Discrepancy::MissingInDestination { row: row!(2, "b") },
            Discrepancy::MissingInSource { row: row!(3, "c") },
        ]
    );

    split.assert_restored();
    assert_eq!(status.state(), WorkerState::Error);
    assert_eq!(status.as_text(), "Working on: customer/0\nState: error\n");
}

#[tokio::test(flavor = "multi_thread")]
async fn table_with_differences_does_not_stop_other_tables() {
    init_test_tracing();

    let split = VerticalSplit::new(&["customers", "orders"]);
    let mut changed = rows(30);
    changed[10] = row!(11, "changed");
    split.add_source_table(&orders(), rows(30));
    split.add_destination_table(&orders(), changed);
    split.add_table(&customers(), rows(40));

    let (worker, _cancel) = split.worker();
    let outcome = worker.run().await;

    assert_eq!(outcome.state, WorkerState::Error);
    assert!(outcome.had_differences);

    let report = outcome.report.unwrap();
    assert_eq!(report.tables["orders"].mismatched_rows, 1);
    assert_eq!(report.tables["orders"].matching_rows, 29);
    assert!(!report.tables["customers"].has_differences());
    assert_eq!(report.tables["customers"].matching_rows, 40);
    assert_eq!(
        split
            .cluster
            .rows_read(&split.destination_tablet, "customers"),
        41
    );

    split.assert_restored();
}

#[tokio::test(flavor = "multi_thread")]
async fn schema_differences_are_reported_without_failing() {
    init_test_tracing();

    let split = VerticalSplit::new(&["orders"]);
    let widened = table_definition(
        "orders",
        &[("id", "bigint"), ("item", "varchar(64)")],
        &["id"],
    );
    split.add_source_table(&orders(), rows(10));
    split.add_destination_table(&widened, rows(10));

    let (worker, _cancel) = split.worker();
    let outcome = worker.run().await;

    assert!(outcome.is_success(), "{:?}", outcome.error);
    let report = outcome.report.unwrap();
    assert_eq!(report.schema_diffs.len(), 1);
    assert!(report.schema_diffs[0].contains("item"));
    assert!(!report.is_clean());
    assert!(!report.tables["orders"].has_differences());
}

#[tokio::test(flavor = "multi_thread")]
async fn panicking_table_diff_is_isolated() {
    init_test_tracing();

    let split = VerticalSplit::new(&["customers", "orders"]);
    split.add_table(&orders(), rows(10));
    split.add_table(&customers(), rows(10));
    split.cluster.inject(
        Failure::on(Operation::NextRow)
            .on_tablet(split.destination_tablet.clone())
            .for_table("orders")
            .panicking(),
    );

    let (worker, _cancel) = split.worker();
    let outcome = worker.run().await;

    assert_eq!(outcome.state, WorkerState::Error);
    assert!(outcome.had_differences);
    assert_eq!(outcome.error.unwrap().kinds(), vec![ErrorKind::DiffWorkerPanic]);

    let report = outcome.report.unwrap();
    assert!(!report.tables.contains_key("orders"));
    assert_eq!(report.tables["customers"].matching_rows, 10);

    split.assert_restored();
}

#[tokio::test(flavor = "multi_thread")]
async fn shard_without_source_shards_is_a_configuration_error() {
    init_test_tracing();

    let split = VerticalSplit::new(&["orders"]);
    split.update_destination_shard(|shard| shard.source_shards.clear());

    let (worker, _cancel) = split.worker();
    let chain = worker.compensations().clone();
    let outcome = worker.run().await;

    assert_eq!(outcome.state, WorkerState::Error);
    assert_eq!(outcome.error.unwrap().kind(), ErrorKind::ConfigurationError);
    assert!(outcome.report.is_none());
    assert!(chain.executed().await.is_empty());
    assert_nothing_mutated(&split.cluster);
}

#[tokio::test(flavor = "multi_thread")]
async fn invalid_shard_metadata_is_rejected_before_any_mutation() {
    init_test_tracing();

    let cases: [(&str, fn(&mut ShardInfo)); 3] = [
        ("no primary", |shard: &mut ShardInfo| shard.primary = None),
        ("no tables", |shard: &mut ShardInfo| {
            shard.source_shards[0].tables.clear()
        }),
        ("several source shards", |shard: &mut ShardInfo| {
            let mut other = shard.source_shards[0].clone();
            other.uid = 1;
            shard.source_shards.push(other);
        }),
    ];

    for (name, update) in cases {
        let split = VerticalSplit::new(&["orders"]);
        split.update_destination_shard(update);

        let (worker, _cancel) = split.worker();
        let outcome = worker.run().await;

        assert_eq!(outcome.state, WorkerState::Error, "{name}");
        assert_eq!(
            outcome.error.unwrap().kind(),
            ErrorKind::ConfigurationError,
            "{name}"
        );
        assert_nothing_mutated(&split.cluster);
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn source_uid_selects_among_several_source_shards() {
    init_test_tracing();

    let split = VerticalSplit::new(&["orders"]);
    split.add_table(&orders(), rows(5));
    split.update_destination_shard(|shard| {
        let mut other = shard.source_shards[0].clone();
        other.uid = 7;
        other.tables = vec!["unrelated".to_string()];
        shard.source_shards.push(other);
    });

    let mut config = split.config();
    config.source_uid = Some(split.source_uid);
    let (worker, _cancel) = split.worker_with(config);
    let outcome = worker.run().await;

    assert!(outcome.is_success(), "{:?}", outcome.error);
    assert_eq!(outcome.report.unwrap().tables.len(), 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn unknown_keyspace_is_a_configuration_error() {
    init_test_tracing();

    let split = VerticalSplit::new(&["orders"]);
    let mut config = split.config();
    config.keyspace = "unknown".to_string();

    let (worker, _cancel) = split.worker_with(config);
    let outcome = worker.run().await;

    let err = outcome.error.unwrap();
    assert_eq!(err.kind(), ErrorKind::ConfigurationError);
    assert!(err.contains_kind(ErrorKind::RemoteActionFailed));
    assert_nothing_mutated(&split.cluster);
}

#[tokio::test(flavor = "multi_thread")]
async fn invalid_configuration_is_rejected_at_construction() {
    init_test_tracing();

    let split = VerticalSplit::new(&["orders"]);
    let mut config = split.config();
    config.parallel_diffs_count = 0;

    let (_cancel_tx, cancel_rx) = splitdiff::concurrency::cancel::create_cancel_channel();
    let err = splitdiff::workers::SplitDiffWorker::new(
        config,
        std::sync::Arc::new(split.cluster.clone()),
        cancel_rx,
    )
    .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::ConfigurationError);
    assert!(split.cluster.journal().is_empty());
}

#[tokio::test(flavor = "multi_thread")]
async fn tablet_selection_is_retried() {
    init_test_tracing();

    let split = VerticalSplit::new(&["orders"]);
    split.add_table(&orders(), rows(5));
    split
        .cluster
        .inject(Failure::on(Operation::FindHealthyTablet).times(2));

    let (worker, _cancel) = split.worker();
    let outcome = worker.run().await;

    assert!(outcome.is_success(), "{:?}", outcome.error);
    // Two failed attempts and one successful attempt for the destination, one for the source.
    assert_eq!(
        split.cluster.journal_of(Operation::FindHealthyTablet).len(),
        4
    );
    split.assert_restored();
}

#[tokio::test(flavor = "multi_thread")]
async fn missing_destination_tablet_is_target_unavailable() {
    init_test_tracing();

    let split = VerticalSplit::new(&["orders"]);
    split.cluster.set_healthy(&split.destination_tablet, false);

    let (worker, _cancel) = split.worker();
    let outcome = worker.run().await;

    assert_eq!(outcome.state, WorkerState::Error);
    assert_eq!(outcome.error.unwrap().kind(), ErrorKind::TargetUnavailable);
    assert_eq!(
        split.cluster.journal_of(Operation::FindHealthyTablet).len(),
        3
    );
    assert_nothing_mutated(&split.cluster);
}

#[tokio::test(flavor = "multi_thread")]
async fn under_provisioned_source_shard_restores_the_destination_tablet() {
    init_test_tracing();

    let split = VerticalSplit::new(&["orders"]);
    split.cluster.set_healthy(&split.source_tablets[1], false);

    let (worker, _cancel) = split.worker();
    let chain = worker.compensations().clone();
    let outcome = worker.run().await;

    assert_eq!(outcome.error.unwrap().kind(), ErrorKind::TargetUnavailable);
    assert_eq!(
        chain.executed().await,
        vec![undrain(&split.destination_tablet)]
    );
    assert_eq!(
        split.cluster.tablet_type(&split.destination_tablet),
        Some(TabletType::Rdonly)
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn replica_destination_type_is_restored() {
    init_test_tracing();

    let split = VerticalSplit::new(&["orders"]);
    split.add_table(&orders(), rows(5));
    let replica = TabletAlias::new("zone1", 202);
    split
        .cluster
        .add_tablet(&replica, "customer", "0", TabletType::Replica);
    split.cluster.add_table(&replica, &orders(), rows(5));

    let mut config = split.config();
    config.destination_tablet_type = TabletType::Replica;
    let (worker, _cancel) = split.worker_with(config);
    let outcome = worker.run().await;

    assert!(outcome.is_success(), "{:?}", outcome.error);
    assert_eq!(outcome.report.unwrap().destination_tablet, replica);
    assert_eq!(
        split.cluster.tablet_type(&replica),
        Some(TabletType::Replica)
    );
    assert!(split.cluster.replication_running(&replica));
}

#[tokio::test(flavor = "multi_thread")]
async fn cancellation_stops_before_any_mutation() {
    init_test_tracing();

    let split = VerticalSplit::new(&["orders"]);
    split.add_table(&orders(), rows(5));

    let (worker, cancel) = split.worker();
    cancel.cancel();
    let outcome = worker.run().await;

    assert_eq!(outcome.state, WorkerState::Error);
    let err = outcome.error.unwrap();
    assert_eq!(err.kind(), ErrorKind::Cancelled);
    assert_eq!(err.detail(), Some("cancelled after 'initializing'"));
    assert_nothing_mutated(&split.cluster);
}

#[tokio::test(flavor = "multi_thread")]
async fn started_worker_reports_its_progress() {
    init_test_tracing();

    let split = VerticalSplit::new(&["orders"]);
    split.add_table(&orders(), rows(20));
    split.slow_down_scans(Duration::from_millis(10));

    let (worker, _cancel) = split.worker();
    let handle = worker.start().await.unwrap();

    tokio::time::timeout(Duration::from_secs(10), async {
        while handle.state() != WorkerState::Diff {
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
    })
    .await
    .expect("worker never reached the diff phase");
    assert_eq!(
        handle.status().as_text(),
        "Working on: customer/0\nState: running the diff\nRunning...\n"
    );
    assert!(handle.status().as_html().contains("<b>Running</b>"));

    let outcome = handle.wait().await.unwrap();
    assert!(outcome.is_success(), "{:?}", outcome.error);
    split.assert_restored();
}
