use crate::types::{SchemaDefinition, TableDefinition};

/// Lists the structural differences between two schemas.
///
/// `left_name` and `right_name` identify the sides in the messages, usually by tablet alias.
/// Tables are matched by name. An empty result means both schemas describe the same tables
/// with the same columns, column types, collations included, and primary keys.
pub fn diff_schemas(
    left_name: &str,
    left: &SchemaDefinition,
    right_name: &str,
    right: &SchemaDefinition,
) -> Vec<String> {
    let mut differences = Vec::new();

    for table in &left.table_definitions {
        match right.table(&table.name) {
            Some(other) => diff_tables(left_name, table, right_name, other, &mut differences),
            None => differences.push(format!(
                "{left_name} has an extra table named {}",
                table.name
            )),
        }
    }

    for table in &right.table_definitions {
        if left.table(&table.name).is_none() {
            differences.push(format!(
                "{right_name} has an extra table named {}",
                table.name
            ));
        }
    }

    differences
}

fn diff_tables(
    left_name: &str,
    left: &TableDefinition,
    right_name: &str,
    right: &TableDefinition,
    differences: &mut Vec<String>,
) {
    let table = &left.name;

    let left_columns: Vec<&str> = left.columns.iter().map(|c| c.name.as_str()).collect();
    let right_columns: Vec<&str> = right.columns.iter().map(|c| c.name.as_str()).collect();
    if left_columns != right_columns {
        differences.push(format!(
            "{left_name} and {right_name} disagree on columns for table {table}: \
             {left_columns:?} vs {right_columns:?}"
        ));
    }

    for column in &left.columns {
        if let Some(other) = right.column(&column.name)
            && other.column_type != column.column_type
        {
            differences.push(format!(
                "{left_name} and {right_name} disagree on the type of column {} of table \
                 {table}: {} vs {}",
                column.name, column.column_type, other.column_type
            ));
        }
    }

    if left.primary_key_columns != right.primary_key_columns {
        differences.push(format!(
            "{left_name} and {right_name} disagree on the primary key of table {table}: \
             {:?} vs {:?}",
            left.primary_key_columns, right.primary_key_columns
        ));
    }
}
