use splitdiff::compensation::CompensationAction;
use splitdiff::error::ErrorKind;
use splitdiff::test_utils::{Failure, Operation, VerticalSplit};
use splitdiff::workers::state::WorkerState;
use splitdiff_telemetry::init_test_tracing;

use crate::common::{orders, resume_stream, rows, start_replication, undrain};

/// Phase of the worker in which an injected failure is expected to surface.
#[derive(Debug, Clone, Copy)]
enum Stage {
    SourceReservation,
    SyncStart,
    SourceStopped,
    FilteredCatchUp,
    DestinationStopped,
    FilteredRestart,
    Diff,
}

struct Case {
    name: &'static str,
    failure: fn(&VerticalSplit) -> Failure,
    stage: Stage,
    kind: ErrorKind,
}

/// Compensations expected to run, in order, when the run fails at `stage`.
fn expected_cleanup(split: &VerticalSplit, stage: Stage) -> Vec<CompensationAction> {
    let source = split.source_tablet();
    let destination = &split.destination_tablet;
    let primary = &split.destination_primary;

    match stage {
        Stage::SourceReservation => vec![undrain(destination)],
        Stage::SyncStart => vec![undrain(source), undrain(destination)],
        Stage::SourceStopped => vec![
            resume_stream(primary, split.source_uid),
            undrain(source),
            undrain(destination),
        ],
        Stage::FilteredCatchUp | Stage::DestinationStopped => vec![
            start_replication(source),
            resume_stream(primary, split.source_uid),
            undrain(source),
            undrain(destination),
        ],
        Stage::FilteredRestart => vec![
            start_replication(destination),
            start_replication(source),
            resume_stream(primary, split.source_uid),
            undrain(source),
            undrain(destination),
        ],
        Stage::Diff => vec![
            start_replication(destination),
            start_replication(source),
            undrain(source),
            undrain(destination),
        ],
    }
}

fn cases() -> Vec<Case> {
    vec![
        Case {
            name: "source tablet cannot be drained",
            failure: |split| {
                Failure::on(Operation::ChangeTabletType).on_tablet(split.source_tablet().clone())
            },
            stage: Stage::SourceReservation,
            kind: ErrorKind::TargetUnavailable,
        },
        Case {
            name: "primary record cannot be read",
            failure: |_| Failure::on(Operation::GetTablet),
            stage: Stage::SyncStart,
            kind: ErrorKind::SyncReplicationError,
        },
        Case {
            name: "filtered stream cannot be paused",
            failure: |_| Failure::on(Operation::PauseFilteredStream),
            stage: Stage::SyncStart,
            kind: ErrorKind::SyncReplicationError,
        },
        Case {
            name: "source tablet cannot be stopped",
            failure: |split| {
                Failure::on(Operation::StopReplicationMinimum)
                    .on_tablet(split.source_tablet().clone())
            },
            stage: Stage::SourceStopped,
            kind: ErrorKind::SyncReplicationError,
        },
        Case {
            name: "filtered stream cannot be resumed up to the source position",
            failure: |_| Failure::on(Operation::ResumeFilteredStream).times(1),
            stage: Stage::FilteredCatchUp,
            kind: ErrorKind::SyncReplicationError,
        },
        Case {
            name: "filtered stream does not reach the source position",
            failure: |_| Failure::on(Operation::WaitForFilteredPosition),
            stage: Stage::FilteredCatchUp,
            kind: ErrorKind::SyncReplicationError,
        },
        Case {
            name: "primary position cannot be read",
            failure: |_| Failure::on(Operation::CurrentPosition),
            stage: Stage::FilteredCatchUp,
            kind: ErrorKind::SyncReplicationError,
        },
        Case {
            name: "destination tablet cannot be stopped",
            failure: |split| {
                Failure::on(Operation::StopReplicationMinimum)
                    .on_tablet(split.destination_tablet.clone())
            },
            stage: Stage::DestinationStopped,
            kind: ErrorKind::SyncReplicationError,
        },
        Case {
            name: "filtered stream cannot be restarted for good",
            failure: |_| Failure::on(Operation::ResumeFilteredStream).after(1).times(1),
            stage: Stage::FilteredRestart,
            kind: ErrorKind::SyncReplicationError,
        },
        Case {
            name: "no schema can be fetched",
            failure: |_| Failure::on(Operation::GetSchema),
            stage: Stage::Diff,
            kind: ErrorKind::DiffSetupError,
        },
    ]
}

#[tokio::test(flavor = "multi_thread")]
async fn cleanup_undoes_every_registered_mutation_in_reverse_order() {
    init_test_tracing();

    for case in cases() {
        let split = VerticalSplit::new(&["orders"]);
        split.add_table(&orders(), rows(10));
        split.cluster.inject((case.failure)(&split));

        let (worker, _cancel) = split.worker();
        let chain = worker.compensations().clone();
        let outcome = worker.run().await;

        assert_eq!(outcome.state, WorkerState::Error, "{}", case.name);
        let err = outcome.error.unwrap();
        assert_eq!(err.kind(), case.kind, "{}: {err}", case.name);
        assert!(!err.contains_kind(ErrorKind::CleanupError), "{}", case.name);

        assert_eq!(
            chain.executed().await,
            expected_cleanup(&split, case.stage),
            "{}",
            case.name
        );
        assert!(chain.is_consumed().await);
        split.assert_restored();
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn failing_compensation_does_not_stop_the_others() {
    init_test_tracing();

    let split = VerticalSplit::new(&["orders"]);
    split.add_table(&orders(), rows(10));
    split.cluster.inject(
        Failure::on(Operation::StartReplication).on_tablet(split.source_tablet().clone()),
    );

    let (worker, _cancel) = split.worker();
    let chain = worker.compensations().clone();
    let outcome = worker.run().await;

    assert_eq!(outcome.state, WorkerState::Error);
    assert!(!outcome.had_differences);
    assert!(outcome.report.unwrap().is_clean());

    let err = outcome.error.unwrap();
    assert_eq!(err.kind(), ErrorKind::CleanupError);
    assert!(err.contains_kind(ErrorKind::RemoteActionFailed));

    assert_eq!(chain.executed().await, expected_cleanup(&split, Stage::Diff));
    assert!(!split.cluster.replication_running(split.source_tablet()));
    assert!(split.cluster.replication_running(&split.destination_tablet));
}

#[tokio::test(flavor = "multi_thread")]
async fn run_and_cleanup_errors_are_combined() {
    init_test_tracing();

    let split = VerticalSplit::new(&["orders"]);
    split.add_table(&orders(), rows(10));
    split.cluster.inject(
        Failure::on(Operation::StopReplicationMinimum)
            .on_tablet(split.destination_tablet.clone()),
    );
    split.cluster.inject(
        Failure::on(Operation::StartReplication).on_tablet(split.source_tablet().clone()),
    );

    let (worker, _cancel) = split.worker();
    let chain = worker.compensations().clone();
    let outcome = worker.run().await;

    assert_eq!(outcome.state, WorkerState::Error);
    let err = outcome.error.unwrap();
    assert_eq!(err.kind(), ErrorKind::SyncReplicationError);
    assert!(err.contains_kind(ErrorKind::CleanupError));

    assert_eq!(
        chain.executed().await,
        expected_cleanup(&split, Stage::DestinationStopped)
    );
    assert!(
        split
            .cluster
            .filtered_stream_running(&split.destination_primary, split.source_uid)
    );
}

#[tokio::test(start_paused = true)]
async fn hanging_remote_call_times_out_and_is_cleaned_up() {
    init_test_tracing();

    let split = VerticalSplit::new(&["orders"]);
    split.add_table(&orders(), rows(10));
    split.cluster.inject(
        Failure::on(Operation::StopReplicationMinimum)
            .on_tablet(split.source_tablet().clone())
            .hanging(),
    );

    let (worker, _cancel) = split.worker();
    let chain = worker.compensations().clone();
    let outcome = worker.run().await;

    let err = outcome.error.unwrap();
    assert_eq!(err.kind(), ErrorKind::SyncReplicationError);
    assert!(err.contains_kind(ErrorKind::RemoteActionTimeout));

    assert_eq!(
        chain.executed().await,
        expected_cleanup(&split, Stage::SourceStopped)
    );
    split.assert_restored();
}
