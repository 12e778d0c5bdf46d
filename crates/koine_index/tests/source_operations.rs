use koine_index::{
    IndexConfig, MembershipIndex, MembershipReadApi, MembershipTriple, MembershipTxApi,
    MembershipWriteApi, ResourceId, Timestamp,
};
use sea_orm::{ConnectionTrait, Statement};
use tempfile::{TempDir, tempdir};

async fn open_index() -> (TempDir, MembershipIndex) {
    let dir = tempdir().expect("tempdir");
    let config = IndexConfig::default_sqlite(dir.path().join("index.sqlite").to_string_lossy());
    let index = MembershipIndex::connect(&config, dir.path())
        .await
        .expect("connect index");
    (dir, index)
}

fn ts(value: &str) -> Timestamp {
    Timestamp::parse_rfc3339(value).expect("instant")
}

/// Committed rows as `(subject, object, start, end)` ordered by subject.
async fn committed_rows(index: &MembershipIndex) -> Vec<(String, String, i64, i64)> {
    let stmt = Statement::from_string(
        index.connection().get_database_backend(),
        "SELECT subject_id, object_id, start_time, end_time FROM membership ORDER BY subject_id, start_time",
    );
    let rows = index
        .connection()
        .query_all(stmt)
        .await
        .expect("query membership");
    rows.into_iter()
        .map(|row| {
            (
                row.try_get::<String>("", "subject_id").expect("subject"),
                row.try_get::<String>("", "object_id").expect("object"),
                row.try_get::<i64>("", "start_time").expect("start"),
                row.try_get::<i64>("", "end_time").expect("end"),
            )
        })
        .collect()
}

#[tokio::test]
async fn source_wide_end_dates_every_live_row() {
    let (_dir, index) = open_index().await;
    let source = ResourceId::new("src/B");
    let first = MembershipTriple::new("s/1", "p/member", "o/1");
    let second = MembershipTriple::new("s/2", "p/member", "o/2");

    index
        .add_membership("tx1", &source, &first, ts("2024-01-01T00:00:00Z"))
        .await
        .expect("add");
    index
        .add_membership("tx1", &source, &second, ts("2024-01-01T00:00:00Z"))
        .await
        .expect("add");
    index.commit_transaction("tx1").await.expect("commit");

    let cutoff = ts("2024-04-01T00:00:00Z");
    index
        .end_membership_for_source("tx4", &source, cutoff)
        .await
        .expect("end for source");
    index.commit_transaction("tx4").await.expect("commit");

    let rows = committed_rows(&index).await;
    assert_eq!(rows.len(), 2);
    for (_, _, _, end) in &rows {
        assert_eq!(*end, cutoff.as_secs());
    }
    for subject in ["s/1", "s/2"] {
        let live = index
            .get_membership(None, &ResourceId::new(subject))
            .await
            .expect("query");
        assert!(live.is_empty(), "{subject} should have no live membership");
    }
}

#[tokio::test]
async fn source_wide_end_skips_rows_already_marked_for_delete() {
    let (_dir, index) = open_index().await;
    let source = ResourceId::new("src/B");
    let triple = MembershipTriple::new("s/1", "p/member", "o/1");

    index
        .add_membership("tx1", &source, &triple, ts("2024-01-01T00:00:00Z"))
        .await
        .expect("add");
    index.commit_transaction("tx1").await.expect("commit");

    let precise_end = ts("2024-02-01T00:00:00Z");
    index
        .end_membership("tx2", &source, &triple, precise_end)
        .await
        .expect("end one");
    // The bulk end must not stage a second delete for the same row.
    index
        .end_membership_for_source("tx2", &source, ts("2024-03-01T00:00:00Z"))
        .await
        .expect("end for source");
    index.commit_transaction("tx2").await.expect("commit");

    let rows = committed_rows(&index).await;
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].3, precise_end.as_secs());
}

#[tokio::test]
async fn force_delete_after_cutoff_erases_matching_history() {
    let (_dir, index) = open_index().await;
    let source = ResourceId::new("src/C");
    let closed_early = MembershipTriple::new("s/1", "p/member", "o/1");
    let still_live = MembershipTriple::new("s/2", "p/member", "o/2");
    let started_late = MembershipTriple::new("s/3", "p/member", "o/3");

    index
        .add_membership_with_end(
            "tx1",
            &source,
            &closed_early,
            ts("2023-01-01T00:00:00Z"),
            Some(ts("2023-06-01T00:00:00Z")),
        )
        .await
        .expect("add");
    index
        .add_membership("tx1", &source, &still_live, ts("2023-02-01T00:00:00Z"))
        .await
        .expect("add");
    index
        .add_membership_with_end(
            "tx1",
            &source,
            &started_late,
            ts("2024-05-01T00:00:00Z"),
            Some(ts("2024-06-01T00:00:00Z")),
        )
        .await
        .expect("add");
    index.commit_transaction("tx1").await.expect("commit");

    index
        .delete_membership_for_source_after("tx5", &source, Some(ts("2024-01-01T00:00:00Z")))
        .await
        .expect("delete after");
    index.commit_transaction("tx5").await.expect("commit");

    // Only the interval that closed before the cut-off survives, untouched.
    let rows = committed_rows(&index).await;
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].0, "s/1");
    assert_eq!(rows[0].3, ts("2023-06-01T00:00:00Z").as_secs());
}

#[tokio::test]
async fn force_delete_without_cutoff_erases_all_history() {
    let (_dir, index) = open_index().await;
    let source = ResourceId::new("src/C");
    let ancient = MembershipTriple::new("s/old", "p/member", "o/old");

    index
        .add_membership_with_end(
            "tx1",
            &source,
            &ancient,
            ts("1900-01-01T00:00:00Z"),
            Some(ts("1900-06-01T00:00:00Z")),
        )
        .await
        .expect("add");
    index
        .add_membership(
            "tx1",
            &source,
            &MembershipTriple::new("s/new", "p/member", "o/new"),
            ts("2024-01-01T00:00:00Z"),
        )
        .await
        .expect("add");
    index.commit_transaction("tx1").await.expect("commit");

    index
        .delete_membership_for_source_after("tx2", &source, None)
        .await
        .expect("delete all");
    index.commit_transaction("tx2").await.expect("commit");

    assert!(committed_rows(&index).await.is_empty());
}

#[tokio::test]
async fn force_delete_clears_this_transactions_adds_first() {
    let (_dir, index) = open_index().await;
    let source = ResourceId::new("src/C");
    let triple = MembershipTriple::new("s/tmp", "p/member", "o/tmp");

    index
        .add_membership("tx1", &source, &triple, ts("2024-01-01T00:00:00Z"))
        .await
        .expect("add");
    index
        .delete_membership_for_source_after("tx1", &source, None)
        .await
        .expect("delete after");
    index.commit_transaction("tx1").await.expect("commit");

    assert!(committed_rows(&index).await.is_empty());
    let visible = index
        .get_membership(None, &ResourceId::new("s/tmp"))
        .await
        .expect("query");
    assert!(visible.is_empty());
}

#[tokio::test]
async fn reference_purge_spans_source_subject_and_object() {
    let (_dir, index) = open_index().await;
    let source_a = ResourceId::new("src/A");
    let source_b = ResourceId::new("src/B");

    // Referenced as object from A, as subject from B.
    index
        .add_membership(
            "tx1",
            &source_a,
            &MembershipTriple::new("s/1", "p/member", "target/x"),
            ts("2024-01-01T00:00:00Z"),
        )
        .await
        .expect("add");
    index
        .add_membership(
            "tx1",
            &source_b,
            &MembershipTriple::new("target/x", "p/member", "o/1"),
            ts("2024-01-01T00:00:00Z"),
        )
        .await
        .expect("add");
    index
        .add_membership(
            "tx1",
            &source_a,
            &MembershipTriple::new("s/2", "p/member", "o/2"),
            ts("2024-01-01T00:00:00Z"),
        )
        .await
        .expect("add");
    index.commit_transaction("tx1").await.expect("commit");

    index
        .delete_membership_references("tx2", &ResourceId::new("target/x"))
        .await
        .expect("purge references");

    let rows = committed_rows(&index).await;
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].0, "s/2");

    // Purging an id no row references is a no-op, not an error.
    index
        .delete_membership_references("tx2", &ResourceId::new("target/unknown"))
        .await
        .expect("purge unknown");
    assert_eq!(committed_rows(&index).await.len(), 1);
}

#[tokio::test]
async fn reference_purge_also_drops_staged_rows() {
    let (_dir, index) = open_index().await;
    let source = ResourceId::new("src/A");
    let triple = MembershipTriple::new("s/1", "p/member", "target/x");

    index
        .add_membership("tx1", &source, &triple, ts("2024-01-01T00:00:00Z"))
        .await
        .expect("add");
    index
        .delete_membership_references("tx1", &ResourceId::new("target/x"))
        .await
        .expect("purge references");
    index.commit_transaction("tx1").await.expect("commit");

    let visible = index
        .get_membership(None, &ResourceId::new("s/1"))
        .await
        .expect("query");
    assert!(visible.is_empty());
}
