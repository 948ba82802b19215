/// Smoke-test for `ChromiumSessionFactory`.
///
/// Launches a headless Chromium with the default header profile, opens
/// <https://example.com> and prints what the crawl engine would see.
///
/// Run with:
///   cargo run -p vendsync-client --example browser_smoke --features browser
use vendsync_client::ChromiumSessionFactory;
use vendsync_core::models::HeaderProfile;
use vendsync_core::traits::{BrowserSession, SessionFactory};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().with_env_filter("info").init();

    println!("Launching headless browser…");
    let factory = ChromiumSessionFactory::default();
    let mut session = factory.open(&HeaderProfile::default()).await?;

    let url = "https://example.com";
    println!("Navigating to {url} …");
    let html = session.navigate(url).await?;
    let cookies = session.cookies().await?;
    session.close().await;

    assert!(
        html.contains("<h1>Example Domain</h1>"),
        "Expected <h1> not found in rendered HTML"
    );
    println!("OK: {} bytes of HTML, {} cookies", html.len(), cookies.len());
    Ok(())
}
