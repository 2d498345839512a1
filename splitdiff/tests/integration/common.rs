use splitdiff::compensation::CompensationAction;
use splitdiff::row;
use splitdiff::test_utils::table_definition;
use splitdiff::types::{TableDefinition, TableRow, TabletAlias, TabletType};

pub fn orders() -> TableDefinition {
    table_definition("orders", &[("id", "bigint"), ("item", "varchar(32)")], &["id"])
}

pub fn customers() -> TableDefinition {
    table_definition(
        "customers",
        &[("customer_id", "bigint"), ("email", "varchar(128)")],
        &["customer_id"],
    )
}

pub fn rows(count: i64) -> Vec<TableRow> {
    (1..=count).map(|id| row!(id, format!("value-{id}"))).collect()
}

pub fn undrain(tablet: &TabletAlias) -> CompensationAction {
    CompensationAction::ChangeTabletType {
        tablet: tablet.clone(),
        tablet_type: TabletType::Rdonly,
    }
}

pub fn start_replication(tablet: &TabletAlias) -> CompensationAction {
    CompensationAction::StartReplication {
        tablet: tablet.clone(),
    }
}

pub fn resume_stream(primary: &TabletAlias, source_uid: u32) -> CompensationAction {
    CompensationAction::ResumeFilteredStream {
        primary: primary.clone(),
        source_uid,
    }
}
