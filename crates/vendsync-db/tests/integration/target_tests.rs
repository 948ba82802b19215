use chrono::{TimeZone, Utc};
use vendsync_core::models::RewardTier;
use vendsync_db::TargetRepository;

use crate::integration::common::{seed_catalog, setup_test_db};

#[tokio::test]
async fn loads_target_and_credentials() {
    let (pool, _container) = setup_test_db().await;
    seed_catalog(&pool).await;
    let repo = TargetRepository::new(pool);

    let target = repo.get_target(2).await.unwrap().expect("target 2 exists");
    assert_eq!(target.source, "acme");
    assert_eq!(target.default_reward_range_id, Some(2));
    assert!(repo.get_target(99).await.unwrap().is_none());

    let creds = repo.credentials(target.vendor_id).await.unwrap().unwrap();
    assert_eq!(creds.login, "buyer");
    assert!(repo.credentials(99).await.unwrap().is_none());

    assert_eq!(repo.list_targets().await.unwrap().len(), 2);
}

#[tokio::test]
async fn reward_tiers_follow_stored_order() {
    let (pool, _container) = setup_test_db().await;
    seed_catalog(&pool).await;
    let repo = TargetRepository::new(pool);

    assert_eq!(
        repo.reward_tiers(None).await.unwrap(),
        vec![
            RewardTier::new(0.0, 1000.0, false, 50.0),
            RewardTier::new(1000.0, 100000.0, true, 10.0),
        ]
    );
    assert_eq!(
        repo.reward_tiers(Some(2)).await.unwrap(),
        vec![
            RewardTier::new(0.0, 500.0, false, 100.0),
            RewardTier::new(0.0, 100000.0, true, 30.0),
        ]
    );
    assert!(repo.reward_tiers(Some(77)).await.unwrap().is_empty());
}

#[tokio::test]
async fn mark_parsed_stamps_target() {
    let (pool, _container) = setup_test_db().await;
    seed_catalog(&pool).await;
    let repo = TargetRepository::new(pool);

    let at = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap();
    repo.mark_parsed(2, at).await.unwrap();

    assert_eq!(repo.get_target(2).await.unwrap().unwrap().last_parsed_at, Some(at));
    assert!(repo.mark_parsed(99, at).await.is_err());
}
