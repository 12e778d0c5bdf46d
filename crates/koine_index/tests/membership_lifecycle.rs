use koine_index::{
    IndexConfig, KoineError, MembershipIndex, MembershipReadApi, MembershipTriple,
    MembershipTxApi, MembershipWriteApi, ResourceId, Timestamp,
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

async fn staging_count(index: &MembershipIndex, tx_id: &str) -> usize {
    let stmt = Statement::from_sql_and_values(
        index.connection().get_database_backend(),
        "SELECT tx_id FROM membership_tx_operations WHERE tx_id = ?",
        [tx_id.into()],
    );
    index
        .connection()
        .query_all(stmt)
        .await
        .expect("query staging")
        .len()
}

async fn committed_count(index: &MembershipIndex) -> usize {
    let stmt = Statement::from_string(
        index.connection().get_database_backend(),
        "SELECT subject_id FROM membership",
    );
    index
        .connection()
        .query_all(stmt)
        .await
        .expect("query membership")
        .len()
}

#[tokio::test]
async fn add_commit_query_round_trip() {
    let (_dir, index) = open_index().await;
    let source = ResourceId::new("src/A");
    let triple = MembershipTriple::new("s/1", "p/member", "o/1");

    index
        .add_membership("tx1", &source, &triple, ts("2024-01-01T00:00:00Z"))
        .await
        .expect("add");
    index.commit_transaction("tx1").await.expect("commit");

    let visible = index
        .get_membership(None, &ResourceId::new("s/1"))
        .await
        .expect("query");
    assert_eq!(visible, vec![triple]);
    assert_eq!(staging_count(&index, "tx1").await, 0);
}

#[tokio::test]
async fn end_within_same_tx_is_withdrawal() {
    let (_dir, index) = open_index().await;
    let source = ResourceId::new("src/A");
    let triple = MembershipTriple::new("s/2", "p/m", "o/2");

    index
        .add_membership("tx2", &source, &triple, ts("2024-01-01T00:00:00Z"))
        .await
        .expect("add");
    index
        .end_membership("tx2", &source, &triple, ts("2024-01-02T00:00:00Z"))
        .await
        .expect("end");
    // The pair nets out before commit ever sees it.
    assert_eq!(staging_count(&index, "tx2").await, 0);

    index.commit_transaction("tx2").await.expect("commit");
    let visible = index
        .get_membership(None, &ResourceId::new("s/2"))
        .await
        .expect("query");
    assert!(visible.is_empty());
    assert_eq!(committed_count(&index).await, 0);
}

#[tokio::test]
async fn delete_then_add_within_one_tx_is_a_no_op() {
    let (_dir, index) = open_index().await;
    let source = ResourceId::new("src/A");
    let triple = MembershipTriple::new("s/3", "p/member", "o/3");

    index
        .add_membership("tx1", &source, &triple, ts("2024-01-01T00:00:00Z"))
        .await
        .expect("add");
    index.commit_transaction("tx1").await.expect("commit");

    index
        .end_membership("tx2", &source, &triple, ts("2024-02-01T00:00:00Z"))
        .await
        .expect("end");
    // Re-adding with the original start instant cancels the staged delete,
    // and commit's replay guard absorbs the add.
    index
        .add_membership("tx2", &source, &triple, ts("2024-01-01T00:00:00Z"))
        .await
        .expect("re-add");
    index.commit_transaction("tx2").await.expect("commit");

    let visible = index
        .get_membership(None, &ResourceId::new("s/3"))
        .await
        .expect("query");
    assert_eq!(visible, vec![triple]);
    assert_eq!(committed_count(&index).await, 1);
}

#[tokio::test]
async fn end_dating_preserves_memento_views() {
    let (_dir, index) = open_index().await;
    let source = ResourceId::new("src/A");
    let triple = MembershipTriple::new("s/1", "p/member", "o/1");

    index
        .add_membership("tx1", &source, &triple, ts("2024-01-01T00:00:00Z"))
        .await
        .expect("add");
    index.commit_transaction("tx1").await.expect("commit");

    index
        .end_membership("tx3", &source, &triple, ts("2024-06-01T00:00:00Z"))
        .await
        .expect("end");
    index.commit_transaction("tx3").await.expect("commit");

    let live = index
        .get_membership(None, &ResourceId::new("s/1"))
        .await
        .expect("live query");
    assert!(live.is_empty());

    let inside = index
        .get_membership(None, &ResourceId::parse("s/1@2024-03-01T00:00:00Z"))
        .await
        .expect("memento query");
    assert_eq!(inside, vec![triple]);

    let after = index
        .get_membership(None, &ResourceId::parse("s/1@2024-07-01T00:00:00Z"))
        .await
        .expect("memento query");
    assert!(after.is_empty());
}

#[tokio::test]
async fn rollback_leaves_no_trace() {
    let (_dir, index) = open_index().await;
    let source = ResourceId::new("src/D");
    let triple = MembershipTriple::new("s/6", "p/member", "o/6");

    index
        .add_membership("tx6", &source, &triple, ts("2024-01-01T00:00:00Z"))
        .await
        .expect("add");
    index.delete_transaction("tx6").await.expect("rollback");

    let visible = index
        .get_membership(None, &ResourceId::new("s/6"))
        .await
        .expect("query");
    assert!(visible.is_empty());
    assert_eq!(staging_count(&index, "tx6").await, 0);
}

#[tokio::test]
async fn staged_rows_are_read_your_writes_only() {
    let (_dir, index) = open_index().await;
    let source = ResourceId::new("src/A");
    let staged = MembershipTriple::new("s/7", "p/member", "o/7");
    let committed = MembershipTriple::new("s/8", "p/member", "o/8");

    index
        .add_membership("tx-c", &source, &committed, ts("2024-01-01T00:00:00Z"))
        .await
        .expect("add");
    index.commit_transaction("tx-c").await.expect("commit");

    index
        .add_membership("tx-a", &source, &staged, ts("2024-02-01T00:00:00Z"))
        .await
        .expect("add");
    index
        .end_membership("tx-a", &source, &committed, ts("2024-02-01T00:00:00Z"))
        .await
        .expect("end");

    // Inside the transaction the add is visible and the delete hides the
    // committed row.
    let in_tx = index
        .get_membership(Some("tx-a"), &ResourceId::new("s/7"))
        .await
        .expect("query");
    assert_eq!(in_tx, vec![staged.clone()]);
    let hidden = index
        .get_membership(Some("tx-a"), &ResourceId::new("s/8"))
        .await
        .expect("query");
    assert!(hidden.is_empty());

    // Without the transaction id only committed state shows.
    let outside = index
        .get_membership(None, &ResourceId::new("s/7"))
        .await
        .expect("query");
    assert!(outside.is_empty());
    let still_committed = index
        .get_membership(None, &ResourceId::new("s/8"))
        .await
        .expect("query");
    assert_eq!(still_committed, vec![committed]);

    // Another transaction sees neither staged change.
    let other_tx = index
        .get_membership(Some("tx-b"), &ResourceId::new("s/7"))
        .await
        .expect("query");
    assert!(other_tx.is_empty());
}

#[tokio::test]
async fn bounded_add_is_visible_only_to_mementos() {
    let (_dir, index) = open_index().await;
    let source = ResourceId::new("src/A");
    let triple = MembershipTriple::new("s/9", "p/member", "o/9");

    index
        .add_membership_with_end(
            "tx1",
            &source,
            &triple,
            ts("2024-01-01T00:00:00Z"),
            Some(ts("2024-03-01T00:00:00Z")),
        )
        .await
        .expect("add bounded");
    index.commit_transaction("tx1").await.expect("commit");

    let live = index
        .get_membership(None, &ResourceId::new("s/9"))
        .await
        .expect("live query");
    assert!(live.is_empty());

    let inside = index
        .get_membership(None, &ResourceId::parse("s/9@2024-02-01T00:00:00Z"))
        .await
        .expect("memento query");
    assert_eq!(inside, vec![triple]);

    let at_end = index
        .get_membership(None, &ResourceId::parse("s/9@2024-03-01T00:00:00Z"))
        .await
        .expect("memento query");
    assert!(at_end.is_empty());
}

#[tokio::test]
async fn memento_subject_returns_base_id() {
    let (_dir, index) = open_index().await;
    let source = ResourceId::new("src/A");
    let triple = MembershipTriple::new("s/10", "p/member", "o/10");

    index
        .add_membership("tx1", &source, &triple, ts("2024-01-01T00:00:00Z"))
        .await
        .expect("add");
    index.commit_transaction("tx1").await.expect("commit");

    let memento = index
        .get_membership(None, &ResourceId::parse("s/10@2024-02-01T00:00:00Z"))
        .await
        .expect("memento query");
    assert_eq!(memento.len(), 1);
    assert_eq!(memento[0].subject, "s/10");
}

#[tokio::test]
async fn two_live_rows_for_one_key_surface_as_invariant_violation() {
    let (_dir, index) = open_index().await;
    let insert = "INSERT INTO membership \
        (subject_id, property, object_id, source_id, start_time, end_time) \
        VALUES (?, ?, ?, ?, ?, ?)";
    for start in ["2024-01-01T00:00:00Z", "2024-02-01T00:00:00Z"] {
        let stmt = Statement::from_sql_and_values(
            index.connection().get_database_backend(),
            insert,
            [
                "s/dup".into(),
                "p/member".into(),
                "o/dup".into(),
                "src/A".into(),
                ts(start).as_secs().into(),
                Timestamp::NO_END.as_secs().into(),
            ],
        );
        index
            .connection()
            .execute(stmt)
            .await
            .expect("seed corrupt row");
    }

    let err = index
        .end_membership(
            "tx1",
            &ResourceId::new("src/A"),
            &MembershipTriple::new("s/dup", "p/member", "o/dup"),
            ts("2024-03-01T00:00:00Z"),
        )
        .await
        .expect_err("corrupt state must surface");
    assert!(matches!(err, KoineError::Invariant { .. }));
}

#[tokio::test]
async fn ending_an_unknown_triple_is_a_no_op() {
    let (_dir, index) = open_index().await;
    let source = ResourceId::new("src/A");
    let triple = MembershipTriple::new("s/none", "p/member", "o/none");

    index
        .end_membership("tx1", &source, &triple, ts("2024-01-01T00:00:00Z"))
        .await
        .expect("end of nonexistent triple");
    assert_eq!(staging_count(&index, "tx1").await, 0);
    index.commit_transaction("tx1").await.expect("commit");
}
