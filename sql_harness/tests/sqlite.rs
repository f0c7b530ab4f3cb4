//! Engine behavior against real in-memory SQLite pools

use pretty_assertions::assert_eq;

use sql_harness::config::Config;
use sql_harness::result::CellValue;
use sql_harness::SqlHarness;

fn harness() -> SqlHarness {
    let config: Config = toml::from_str(
        r#"
        [engine]
        import_buffer_size = 2

        [datasources.main]
        type = "sqlite"
        url = "sqlite::memory:"
        treatNullAs = "(null)"

        [datasources.tx]
        type = "sqlite"
        url = "sqlite::memory:"
        autocommit = false

        [datasources.copy]
        type = "sqlite"
        url = "sqlite::memory:"
        "#,
    )
    .expect("Failed to parse test config");
    SqlHarness::new(config)
}

#[tokio::test]
async fn batch_with_variables_and_null_token() {
    let mut harness = harness();

    let outcome = harness
        .run(
            "main",
            "CREATE TABLE accounts (id INTEGER, owner TEXT, balance REAL);
             INSERT INTO accounts VALUES (1, 'ann', 10.5), (2, NULL, 3);
             -- nexial:owners
             SELECT id, owner FROM accounts ORDER BY id;",
        )
        .await
        .unwrap();

    assert!(!outcome.has_error(), "{:?}", outcome.error());
    assert_eq!(outcome.len(), 3);
    assert_eq!(outcome.results()[1].row_count(), 2);

    let owners = outcome.get("owners").unwrap();
    assert_eq!(owners.columns().unwrap(), ["id", "owner"]);
    assert_eq!(owners.cell(0, "owner"), Some(&CellValue::from("ann")));
    assert_eq!(owners.cell(1, "owner"), Some(&CellValue::from("(null)")));
    assert_eq!(owners.cell(1, "id"), Some(&CellValue::from("2")));

    harness.close().await;
}

#[tokio::test]
async fn empty_query_reports_zero_rows() {
    let mut harness = harness();

    let outcome = harness
        .run("main", "CREATE TABLE t (id INTEGER); SELECT id FROM t")
        .await
        .unwrap();

    let select = &outcome.results()[1];
    assert_eq!(select.row_count(), 0);
    assert_eq!(select.columns().unwrap(), ["id"]);
    assert!(select.summary().ends_with("returned 0 row(s)"));
}

#[tokio::test]
async fn only_dml_counts_toward_rows_affected() {
    let mut harness = harness();

    let outcome = harness
        .run(
            "main",
            "CREATE TABLE t (id INTEGER); INSERT INTO t VALUES (1), (2), (3);
             CREATE TABLE u (id INTEGER); DROP TABLE u",
        )
        .await
        .unwrap();

    let counts: Vec<i64> = outcome.results().iter().map(|r| r.row_count()).collect();
    assert_eq!(counts, [0, 3, 0, 0]);
    assert_eq!(outcome.rows_affected(), 3);
}

#[tokio::test]
async fn explicit_commit_reports_no_rows() {
    let mut harness = harness();

    let outcome = harness
        .run(
            "tx",
            "CREATE TABLE t (id INTEGER); INSERT INTO t VALUES (1), (2), (3); COMMIT",
        )
        .await
        .unwrap();

    assert!(!outcome.has_error(), "{:?}", outcome.error());
    assert_eq!(outcome.results()[2].row_count(), 0);
    assert_eq!(outcome.rows_affected(), 3);
}

#[tokio::test]
async fn rollback_discards_transacted_work() {
    let mut harness = harness();

    let outcome = harness
        .run(
            "tx",
            "CREATE TABLE t (id INTEGER); INSERT INTO t VALUES (1); ROLLBACK",
        )
        .await
        .unwrap();
    assert!(outcome.results()[2].is_rolled_back());

    let after = harness.run("tx", "SELECT COUNT(*) AS n FROM t").await.unwrap();
    assert!(after.has_error());
}

#[tokio::test]
async fn transacted_batch_commits_implicitly() {
    let mut harness = harness();

    harness
        .run("tx", "CREATE TABLE t (id INTEGER); INSERT INTO t VALUES (1), (2)")
        .await
        .unwrap();

    let result = harness
        .execute("tx", "SELECT COUNT(*) AS n FROM t", None)
        .await
        .unwrap();
    assert!(!result.has_error(), "{:?}", result.error());
    assert_eq!(result.cell(0, "n"), Some(&CellValue::from("2")));
}

#[tokio::test]
async fn import_copies_rows_between_aliases() {
    let mut harness = harness();
    harness
        .run(
            "main",
            "CREATE TABLE accounts (id INTEGER, owner TEXT);
             INSERT INTO accounts VALUES (1, 'ann'), (2, 'o''brien'), (3, NULL)",
        )
        .await
        .unwrap();

    let outcome = harness
        .import("main", "SELECT id, owner FROM accounts", "copy", "accounts_copy")
        .await
        .unwrap();
    assert!(!outcome.has_error(), "{:?}", outcome.error());
    assert_eq!(outcome.rows_affected(), 3);

    let copied = harness
        .execute("copy", "SELECT owner FROM accounts_copy WHERE id = 2", None)
        .await
        .unwrap();
    assert_eq!(copied.cell(0, "owner"), Some(&CellValue::from("o'brien")));
}

#[tokio::test]
async fn export_streams_rows_to_file() {
    let mut harness = harness();
    harness
        .run("main", "CREATE TABLE t (id INTEGER); INSERT INTO t VALUES (1), (2), (3)")
        .await
        .unwrap();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("t.jsonl");

    let result = harness
        .execute("main", "SELECT id FROM t", Some(&path))
        .await
        .unwrap();

    assert_eq!(result.row_count(), 3);
    assert!(result.is_empty());
    assert_eq!(std::fs::read_to_string(&path).unwrap().lines().count(), 3);
}
