//! Bulk import between aliases
//!
//! The source query's rows are copied into a table on the target: one CREATE
//! TABLE derived from the cursor's column metadata, then INSERT statements in
//! sub-batches of the target's import buffer size.

use crate::db::driver::RowSet;
use crate::error::Result;
use crate::execution::dao::Dao;
use crate::result::ExecutionOutcome;
use crate::schema::TableSqlGenerator;
use crate::statement::Statement;

/// Copy the result of `source_sql` on `source` into `table` on `target`
pub async fn import_from(
    source: &mut Dao,
    source_sql: &str,
    target: &mut Dao,
    table: &str,
    generator: &dyn TableSqlGenerator,
) -> Result<ExecutionOutcome> {
    let rows = source.fetch_cursor(source_sql).await?;
    tracing::info!(
        source = %source.alias(),
        target = %target.alias(),
        table = %table,
        rows = rows.rows.len(),
        "Importing rows"
    );
    import_rows(target, table, rows, generator).await
}

/// Create `table` on `target` and insert every row of `rows`.
///
/// Each sub-batch commits on its own; affected rows and errors accumulate on the
/// returned outcome.
pub async fn import_rows(
    target: &mut Dao,
    table: &str,
    rows: RowSet,
    generator: &dyn TableSqlGenerator,
) -> Result<ExecutionOutcome> {
    let mut outcome = ExecutionOutcome::new();

    let create = Statement::from_sql(&generator.create_table_sql(table, &rows.columns)?)?;
    outcome.merge(target.execute_sqls(std::slice::from_ref(&create)).await);

    let chunk_size = target.options().import_buffer_size.max(1);
    for (index, chunk) in rows.rows.chunks(chunk_size).enumerate() {
        let statements = chunk
            .iter()
            .map(|row| Statement::from_sql(&generator.insert_sql(table, &rows.columns, row)?))
            .collect::<Result<Vec<_>>>()?;

        let batch = target.execute_sqls(&statements).await;
        tracing::debug!(
            table = %table,
            chunk = index,
            rows_affected = batch.rows_affected(),
            "Imported chunk"
        );
        outcome.merge(batch);
    }

    outcome.finish();
    Ok(outcome)
}
