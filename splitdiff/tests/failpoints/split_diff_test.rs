use fail::FailScenario;
use splitdiff::compensation::CompensationAction;
use splitdiff::error::ErrorKind;
use splitdiff::failpoints::{
    SPLIT_DIFF_AFTER_DIFF, SPLIT_DIFF_AFTER_FIND_TARGETS, SPLIT_DIFF_AFTER_INIT,
    SPLIT_DIFF_AFTER_SYNC_REPLICATION,
};
use splitdiff::row;
use splitdiff::test_utils::{VerticalSplit, table_definition};
use splitdiff::types::{TableRow, TabletAlias, TabletType};
use splitdiff::workers::RunOutcome;
use splitdiff::workers::state::WorkerState;
use splitdiff_telemetry::init_test_tracing;

fn undrain(tablet: &TabletAlias) -> CompensationAction {
    CompensationAction::ChangeTabletType {
        tablet: tablet.clone(),
        tablet_type: TabletType::Rdonly,
    }
}

fn start_replication(tablet: &TabletAlias) -> CompensationAction {
    CompensationAction::StartReplication {
        tablet: tablet.clone(),
    }
}

fn split_with_orders() -> VerticalSplit {
    let split = VerticalSplit::new(&["orders"]);
    let rows: Vec<TableRow> = (1..=10).map(|id| row!(id, format!("item-{id}"))).collect();
    split.add_table(
        &table_definition("orders", &[("id", "bigint"), ("item", "text")], &["id"]),
        rows,
    );

    split
}

async fn run_failing_after(split: &VerticalSplit, failpoint: &str) -> (RunOutcome, Vec<CompensationAction>) {
    fail::cfg(failpoint, "return").unwrap();

    let (worker, _cancel) = split.worker();
    let chain = worker.compensations().clone();
    let outcome = worker.run().await;

    assert_eq!(outcome.state, WorkerState::Error);
    let err = outcome.error.as_ref().unwrap();
    assert_eq!(err.kinds(), vec![ErrorKind::FailpointError]);
    split.assert_restored();

    let executed = chain.executed().await;
    (outcome, executed)
}

#[tokio::test(flavor = "multi_thread")]
async fn failure_after_init_mutates_nothing() {
    let _scenario = FailScenario::setup();
    init_test_tracing();

    let split = split_with_orders();
    let (outcome, executed) = run_failing_after(&split, SPLIT_DIFF_AFTER_INIT).await;

    assert!(executed.is_empty());
    assert!(outcome.report.is_none());
    assert!(split.cluster.journal().iter().all(|call| !call.is_mutation()));
}

#[tokio::test(flavor = "multi_thread")]
async fn failure_after_find_targets_restores_tablet_types() {
    let _scenario = FailScenario::setup();
    init_test_tracing();

    let split = split_with_orders();
    let (outcome, executed) = run_failing_after(&split, SPLIT_DIFF_AFTER_FIND_TARGETS).await;

    assert_eq!(
        executed,
        vec![
            undrain(split.source_tablet()),
            undrain(&split.destination_tablet)
        ]
    );
    assert!(outcome.report.is_none());
}

#[tokio::test(flavor = "multi_thread")]
async fn failure_after_sync_replication_restarts_replication() {
    let _scenario = FailScenario::setup();
    init_test_tracing();

    let split = split_with_orders();
    let (outcome, executed) =
        run_failing_after(&split, SPLIT_DIFF_AFTER_SYNC_REPLICATION).await;

    assert_eq!(
        executed,
        vec![
            start_replication(&split.destination_tablet),
            start_replication(split.source_tablet()),
            undrain(split.source_tablet()),
            undrain(&split.destination_tablet),
        ]
    );
    assert!(outcome.report.is_none());
}

#[tokio::test(flavor = "multi_thread")]
async fn failure_after_diff_keeps_the_report() {
    let _scenario = FailScenario::setup();
    init_test_tracing();

    let split = split_with_orders();
    let (outcome, executed) = run_failing_after(&split, SPLIT_DIFF_AFTER_DIFF).await;

    assert_eq!(executed.len(), 4);
    assert!(!outcome.had_differences);
    let report = outcome.report.unwrap();
    assert!(report.is_clean());
    assert_eq!(report.tables["orders"].matching_rows, 10);
}
