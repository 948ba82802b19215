use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use testcontainers::core::{ContainerPort, WaitFor};
use testcontainers::runners::AsyncRunner;
use testcontainers::{ContainerAsync, GenericImage, ImageExt};
use vendsync_db::Database;

/// Spins up a PostgreSQL container and returns a migrated pool.
///
/// The `ContainerAsync` must be kept in scope for the test duration;
/// dropping it stops the container.
pub async fn setup_test_db() -> (PgPool, ContainerAsync<GenericImage>) {
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

    let connection_string = format!("postgresql://postgres:postgres@{host}:{port}/vendsync_test");

    // Retry connection until container is fully ready
    const MAX_RETRIES: u32 = 30;
    let mut retries = 0;
    let pool = loop {
        match PgPoolOptions::new()
            .max_connections(5)
            .connect(&connection_string)
            .await
        {
            Ok(pool) => break pool,
            Err(e) => {
                retries += 1;
                if retries >= MAX_RETRIES {
                    panic!("Failed to connect to database after {MAX_RETRIES} retries: {e}");
                }
                tokio::time::sleep(std::time::Duration::from_millis(100)).await;
            }
        }
    };

    Database::from_pool(pool.clone())
        .migrate()
        .await
        .expect("Failed to run migrations");

    (pool, container)
}

/// Minimal operator data: vendor 1, default range 1, range 2, targets 1 and 2,
/// paths 10 and 11, three origins (3 is deleted) and their stocks.
pub async fn seed_catalog(pool: &PgPool) {
    const SEED: &[&str] = &[
        "INSERT INTO vendors (id, name, login, password) VALUES (1, 'Acme', 'buyer', 'secret')",
        "INSERT INTO reward_ranges (id, title, is_default) VALUES (1, 'Default', TRUE), (2, 'Premium', FALSE)",
        r#"INSERT INTO reward_range_lines (range_id, position, line_from, line_to, is_percent, reward) VALUES
            (1, 0, 0, 1000, FALSE, 50),
            (1, 1, 1000, 100000, TRUE, 10),
            (2, 1, 0, 100000, TRUE, 30),
            (2, 0, 0, 500, FALSE, 100)"#,
        r#"INSERT INTO scrape_targets (id, vendor_id, url, source, last_parsed_at, default_reward_range_id) VALUES
            (1, 1, 'https://acme.test/catalog', 'acme', '2026-01-02T03:04:05Z', NULL),
            (2, 1, 'https://acme.test/outlet', 'acme', NULL, 2)"#,
        "INSERT INTO hub_paths (id, title) VALUES (10, 'Phones'), (11, 'Tablets'), (12, 'Empty')",
        r#"INSERT INTO product_origins (origin, title, is_deleted) VALUES
            (1, 'Phone A', FALSE), (2, 'Phone B', FALSE), (3, 'Retired', TRUE), (4, 'Tablet', FALSE)"#,
        r#"INSERT INTO hub_stocks (origin, path_id, vsl_id, input_price, output_price) VALUES
            (1, 10, 1, 450, 500),
            (2, 10, 1, 700, 800),
            (3, 10, 1, 100, 200),
            (4, 11, 2, 900, 1000),
            (1, 11, 1, 450, 500)"#,
    ];
    for statement in SEED {
        sqlx::query(statement)
            .execute(pool)
            .await
            .expect("Failed to seed catalog");
    }
}
