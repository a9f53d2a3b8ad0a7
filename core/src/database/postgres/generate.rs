/// Staging table holding one row per source line, awaiting downstream cleaning.
pub const RAW_TABLE_NAME: &str = "raw_transactions";
pub const RAW_LINE_COLUMN: &str = "csvline";
pub const INSERTED_AT_COLUMN: &str = "createdat";

pub(crate) const RAW_LINE_SAVEPOINT: &str = "raw_line";

fn generate_columns_names_sql(column_names: &[&str]) -> String {
    column_names.iter().map(|name| format!("\"{}\"", name)).collect::<Vec<String>>().join(", ")
}

pub fn generate_insert_raw_line_sql(table_name: &str) -> String {
    format!(
        "INSERT INTO {} ({}) VALUES ($1, $2)",
        table_name,
        generate_columns_names_sql(&[RAW_LINE_COLUMN, INSERTED_AT_COLUMN]),
    )
}
