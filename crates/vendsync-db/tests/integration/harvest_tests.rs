use vendsync_core::AppError;
use vendsync_core::models::HarvestedLine;
use vendsync_core::testutil::staged_line;
use vendsync_db::HarvestRepository;

use crate::integration::common::{seed_catalog, setup_test_db};

fn full_line(target_id: i64, origin: i64) -> HarvestedLine {
    HarvestedLine {
        shipment: Some("2 days".into()),
        warranty: Some("12 months".into()),
        pics: vec!["https://acme.test/a.jpg".into(), "https://acme.test/b.jpg".into()],
        preview: Some("https://acme.test/thumb.jpg".into()),
        optional: Some("refurbished".into()),
        ..staged_line(target_id, origin, 950.0, Some(1000.0))
    }
}

#[tokio::test]
async fn replace_then_get_returns_exactly_the_rows() {
    let (pool, _container) = setup_test_db().await;
    seed_catalog(&pool).await;
    let repo = HarvestRepository::new(pool);

    let rows = vec![full_line(1, 30), staged_line(1, 10, 100.0, None), full_line(1, 20)];
    let inserted = repo.replace(1, &rows).await.unwrap();

    assert_eq!(inserted, 3);
    assert_eq!(repo.get(1).await.unwrap(), rows);
}

#[tokio::test]
async fn published_flag_round_trips() {
    let (pool, _container) = setup_test_db().await;
    seed_catalog(&pool).await;
    let repo = HarvestRepository::new(pool);

    let known = HarvestedLine {
        published: true,
        ..full_line(1, 7)
    };
    repo.replace(1, &[known, staged_line(1, 8, 50.0, Some(80.0))])
        .await
        .unwrap();

    let flags: Vec<(i64, bool)> = repo
        .get(1)
        .await
        .unwrap()
        .iter()
        .map(|l| (l.origin, l.published))
        .collect();
    assert_eq!(flags, vec![(7, true), (8, false)]);
}

#[tokio::test]
async fn replace_discards_previous_set() {
    let (pool, _container) = setup_test_db().await;
    seed_catalog(&pool).await;
    let repo = HarvestRepository::new(pool);

    repo.replace(1, &[full_line(1, 1), full_line(1, 2)]).await.unwrap();
    repo.replace(2, &[full_line(2, 1)]).await.unwrap();
    let second = vec![staged_line(1, 3, 10.0, Some(100.0))];
    repo.replace(1, &second).await.unwrap();

    assert_eq!(repo.get(1).await.unwrap(), second);
    assert_eq!(repo.get(2).await.unwrap().len(), 1);
}

#[tokio::test]
async fn empty_replace_empties_the_set() {
    let (pool, _container) = setup_test_db().await;
    seed_catalog(&pool).await;
    let repo = HarvestRepository::new(pool);

    repo.replace(1, &[full_line(1, 1)]).await.unwrap();
    assert_eq!(repo.replace(1, &[]).await.unwrap(), 0);
    assert!(repo.get(1).await.unwrap().is_empty());
}

#[tokio::test]
async fn duplicate_origins_keep_the_first_line() {
    let (pool, _container) = setup_test_db().await;
    seed_catalog(&pool).await;
    let repo = HarvestRepository::new(pool);

    let first = staged_line(1, 5, 100.0, Some(200.0));
    let dupe = staged_line(1, 5, 999.0, Some(1100.0));
    let inserted = repo.replace(1, &[first.clone(), dupe]).await.unwrap();

    assert_eq!(inserted, 1);
    assert_eq!(repo.get(1).await.unwrap(), vec![first]);
}

#[tokio::test]
async fn unknown_target_is_integrity_conflict_and_rolls_back() {
    let (pool, _container) = setup_test_db().await;
    seed_catalog(&pool).await;
    let repo = HarvestRepository::new(pool);

    let err = repo
        .replace(404, &[staged_line(404, 1, 1.0, None)])
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::IntegrityConflict(_)));
    assert!(repo.get(404).await.unwrap().is_empty());
}

#[tokio::test]
async fn get_many_spans_targets() {
    let (pool, _container) = setup_test_db().await;
    seed_catalog(&pool).await;
    let repo = HarvestRepository::new(pool);

    repo.replace(1, &[full_line(1, 1)]).await.unwrap();
    repo.replace(2, &[full_line(2, 1), full_line(2, 2)]).await.unwrap();

    let lines = repo.get_many(&[1, 2]).await.unwrap();
    let keys: Vec<(i64, i64)> = lines.iter().map(|l| (l.target_id, l.origin)).collect();
    assert_eq!(keys, vec![(1, 1), (2, 1), (2, 2)]);
}
