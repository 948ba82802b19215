use std::sync::Arc;

use axum::Router;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use testcontainers::core::{ContainerPort, WaitFor};
use testcontainers::runners::AsyncRunner;
use testcontainers::{ContainerAsync, GenericImage, ImageExt};

use vendsync_client::{ClientConfig, registry_from_json};
use vendsync_core::{CrawlConfig, HarvestConfig};
use vendsync_db::Database;
use vendsync_server::routes;
use vendsync_server::state::AppState;

const SOURCES: &str = r#"[{
    "name": "acme",
    "login": {
        "url": "https://acme.test/login",
        "login_selector": "#login",
        "password_selector": "#password",
        "submit_selector": "button[type=submit]"
    },
    "authenticated": ".account",
    "item": ".product",
    "origin": "@data-id",
    "title": ".name",
    "link": "a.name",
    "price": ".price",
    "pagination": ".pager a"
}]"#;

const SEED: &[&str] = &[
    "INSERT INTO vendors (id, name, login, password) VALUES (1, 'Acme', 'buyer', 'secret')",
    "INSERT INTO reward_ranges (id, title, is_default) VALUES (1, 'Default', TRUE)",
    "INSERT INTO scrape_targets (id, vendor_id, url, source) VALUES (1, 1, 'https://acme.test/catalog', 'acme')",
    "INSERT INTO hub_paths (id, title) VALUES (10, 'Phones')",
    "INSERT INTO product_origins (origin, title) VALUES (1, 'Phone A'), (2, 'Phone B')",
    r#"INSERT INTO hub_stocks (origin, path_id, vsl_id, input_price, output_price) VALUES
        (1, 10, 1, 450, 500),
        (2, 10, 1, 700, 800)"#,
    r#"INSERT INTO harvest_lines (target_id, origin, position, title, link, input_price, output_price) VALUES
        (1, 1, 0, 'Phone A', 'https://acme.test/p/1', 450, 500),
        (1, 2, 1, 'Phone B', 'https://acme.test/p/2', 600, 700)"#,
];

pub struct TestApp {
    pub router: Router,
    pub state: Arc<AppState>,
    pub pool: PgPool,
    _sessions: tempfile::TempDir,
    _container: ContainerAsync<GenericImage>,
}

/// Spin up a seeded PostgreSQL container and build the app router around it.
pub async fn setup_test_app() -> TestApp {
    let container = GenericImage::new("postgres", "16")
        .with_exposed_port(ContainerPort::Tcp(5432))
        .with_wait_for(WaitFor::message_on_stderr(
            "database system is ready to accept connections",
        ))
        .with_env_var("POSTGRES_PASSWORD", "postgres")
        .with_env_var("POSTGRES_DB", "vendsync_test")
        .start()
        .await
        .expect("Failed to start PostgreSQL container");

    let host = container.get_host().await.expect("Failed to get host");
    let port = container
        .get_host_port_ipv4(5432)
        .await
        .expect("Failed to get port");

    let url = format!("postgresql://postgres:postgres@{host}:{port}/vendsync_test");

    let pool = retry_connect(&url).await;
    let db = Database::from_pool(pool.clone());
    db.migrate().await.expect("Failed to run migrations");
    for statement in SEED {
        sqlx::query(statement)
            .execute(&pool)
            .await
            .expect("Failed to seed database");
    }

    let sessions = tempfile::tempdir().expect("Failed to create session dir");
    let client = ClientConfig {
        session_dir: sessions.path().to_path_buf(),
        ..ClientConfig::default()
    };
    let state = Arc::new(
        AppState::new(
            db,
            registry_from_json(SOURCES).expect("Invalid test sources"),
            &client,
            CrawlConfig::default(),
            HarvestConfig::default(),
        )
        .expect("Failed to build app state"),
    );

    TestApp {
        router: routes::router(state.clone()),
        state,
        pool,
        _sessions: sessions,
        _container: container,
    }
}

async fn retry_connect(url: &str) -> PgPool {
    for _ in 0..30 {
        if let Ok(pool) = PgPoolOptions::new().max_connections(5).connect(url).await {
            return pool;
        }
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
    }
    panic!("Failed to connect to test database");
}
