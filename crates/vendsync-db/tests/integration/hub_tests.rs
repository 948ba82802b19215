use vendsync_core::models::{DiffStatus, PriceChange};
use vendsync_core::reconcile::ReconcileService;
use vendsync_core::testutil::staged_line;
use vendsync_db::{HarvestRepository, HubRepository};

use crate::integration::common::{seed_catalog, setup_test_db};

#[tokio::test]
async fn entries_skip_deleted_origins_and_carry_parse_time() {
    let (pool, _container) = setup_test_db().await;
    seed_catalog(&pool).await;
    let repo = HubRepository::new(pool);

    assert!(repo.path_exists(10).await.unwrap());
    assert!(!repo.path_exists(99).await.unwrap());

    let entries = repo.entries_under_path(10).await.unwrap();
    let origins: Vec<i64> = entries.iter().map(|e| e.origin).collect();
    assert_eq!(origins, vec![1, 2]);
    assert_eq!(entries[0].title, "Phone A");
    assert!(entries[0].parsed_at.is_some());

    let published = repo.published_origins().await.unwrap();
    assert!(published.contains(&1) && published.contains(&4));
}

#[tokio::test]
async fn update_prices_touches_every_stock_of_the_origin() {
    let (pool, _container) = setup_test_db().await;
    seed_catalog(&pool).await;
    let repo = HubRepository::new(pool);

    let changes = vec![PriceChange {
        origin: 1,
        input_price: 400.0,
        output_price: 450.0,
        warranty: Some("24 months".into()),
    }];
    assert_eq!(repo.update_prices(&changes).await.unwrap(), 2);

    for path in [10, 11] {
        let entry = repo
            .entries_under_path(path)
            .await
            .unwrap()
            .into_iter()
            .find(|e| e.origin == 1)
            .unwrap();
        assert_eq!(entry.output_price, Some(450.0));
        assert_eq!(entry.input_price, Some(400.0));
        assert_eq!(entry.warranty.as_deref(), Some("24 months"));
        assert!(entry.updated_at.is_some());
    }

    // Without a warranty the stored one is kept.
    let keep = vec![PriceChange {
        warranty: None,
        ..changes[0].clone()
    }];
    repo.update_prices(&keep).await.unwrap();
    let entry = &repo.entries_under_path(10).await.unwrap()[0];
    assert_eq!(entry.warranty.as_deref(), Some("24 months"));
}

#[tokio::test]
async fn concurrent_commits_leave_one_complete_price_pair() {
    let (pool, _container) = setup_test_db().await;
    seed_catalog(&pool).await;
    let repo = HubRepository::new(pool);

    let first = vec![PriceChange {
        origin: 1,
        input_price: 400.0,
        output_price: 450.0,
        warranty: Some("6 months".into()),
    }];
    let second = vec![PriceChange {
        origin: 1,
        input_price: 600.0,
        output_price: 700.0,
        warranty: Some("36 months".into()),
    }];

    let (a, b) = tokio::join!(repo.update_prices(&first), repo.update_prices(&second));
    assert_eq!(a.unwrap(), 2);
    assert_eq!(b.unwrap(), 2);

    let mut finals = Vec::new();
    for path in [10, 11] {
        let entry = repo
            .entries_under_path(path)
            .await
            .unwrap()
            .into_iter()
            .find(|e| e.origin == 1)
            .unwrap();
        finals.push((entry.input_price, entry.output_price, entry.warranty));
    }

    // Both stocks end on the same commit, never a mix of the two.
    assert_eq!(finals[0], finals[1]);
    let winner = &finals[0];
    let expected = [
        (Some(400.0), Some(450.0), Some("6 months".to_string())),
        (Some(600.0), Some(700.0), Some("36 months".to_string())),
    ];
    assert!(expected.contains(winner), "mixed commit: {winner:?}");
}

#[tokio::test]
async fn update_without_matches_affects_nothing() {
    let (pool, _container) = setup_test_db().await;
    seed_catalog(&pool).await;
    let repo = HubRepository::new(pool);

    let changes = vec![PriceChange {
        origin: 999,
        input_price: 1.0,
        output_price: 100.0,
        warranty: None,
    }];
    assert_eq!(repo.update_prices(&changes).await.unwrap(), 0);
}

#[tokio::test]
async fn diff_and_commit_against_postgres() {
    let (pool, _container) = setup_test_db().await;
    seed_catalog(&pool).await;
    let staging = HarvestRepository::new(pool.clone());
    let hub = HubRepository::new(pool);
    let service = ReconcileService::new(hub.clone(), staging.clone());

    staging
        .replace(
            1,
            &[
                staged_line(1, 1, 450.0, Some(500.0)),
                staged_line(1, 2, 600.0, Some(700.0)),
            ],
        )
        .await
        .unwrap();

    let reports = service.diff(&[10, 11, 12], None).await.unwrap();
    assert_eq!(reports.len(), 3);
    let statuses: Vec<(i64, DiffStatus)> =
        reports[0].items.iter().map(|i| (i.origin, i.status)).collect();
    assert_eq!(
        statuses,
        vec![(1, DiffStatus::Equal), (2, DiffStatus::HubHigher)]
    );
    let tablets: Vec<(i64, DiffStatus)> =
        reports[1].items.iter().map(|i| (i.origin, i.status)).collect();
    assert_eq!(
        tablets,
        vec![(1, DiffStatus::Equal), (4, DiffStatus::OnlyHub)]
    );
    assert!(reports[2].items.is_empty());

    assert!(service.commit_reports(&reports[..1]).await.unwrap());
    let after = service.diff(&[10], None).await.unwrap();
    assert!(after[0].items.iter().all(|i| i.status == DiffStatus::Equal));

    // Committing the same reports again leaves the hub as it was.
    service.commit_reports(&reports[..1]).await.unwrap();
    let again = service.diff(&[10], None).await.unwrap();
    assert_eq!(
        again[0]
            .items
            .iter()
            .map(|i| i.hub_output_price)
            .collect::<Vec<_>>(),
        after[0]
            .items
            .iter()
            .map(|i| i.hub_output_price)
            .collect::<Vec<_>>()
    );
}
