use std::path::PathBuf;
use std::time::Duration;

use chromiumoxide::cdp::browser_protocol::network::{
    CookieParam, Headers, SetExtraHttpHeadersParams, TimeSinceEpoch,
};
use chromiumoxide::cdp::browser_protocol::emulation::SetUserAgentOverrideParams;
use chromiumoxide::{Browser, BrowserConfig, Page};
use futures::StreamExt;
use tokio::task::JoinHandle;
use vendsync_core::error::AppError;
use vendsync_core::models::{HeaderProfile, SessionCookie};
use vendsync_core::traits::{BrowserSession, SessionFactory};

/// Launches one headless Chromium per crawl run.
///
/// Sessions never share a browser process, so cookies of one vendor cannot
/// leak into the run of another.
#[derive(Debug, Clone)]
pub struct ChromiumSessionFactory {
    timeout: Duration,
    chrome_bin: Option<PathBuf>,
}

impl Default for ChromiumSessionFactory {
    fn default() -> Self {
        Self::new(Duration::from_secs(30))
    }
}

impl ChromiumSessionFactory {
    /// `timeout` bounds every single navigation and DOM interaction.
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            chrome_bin: None,
        }
    }

    pub fn with_chrome_bin(mut self, bin: impl Into<PathBuf>) -> Self {
        self.chrome_bin = Some(bin.into());
        self
    }

    /// Tries to locate the real Chrome/Chromium binary.
    ///
    /// The snap wrapper at `/snap/bin/chromium` strips unknown flags and breaks
    /// headless mode, so the binary inside the snap is preferred. `None` lets
    /// `chromiumoxide` do its own lookup.
    fn find_chrome_binary(&self) -> Option<PathBuf> {
        if let Some(bin) = self.chrome_bin.as_ref().filter(|p| p.exists()) {
            return Some(bin.clone());
        }
        if let Some(path) = std::env::var_os("CHROME_BIN").map(PathBuf::from)
            && path.exists()
        {
            return Some(path);
        }

        [
            "/snap/chromium/current/usr/lib/chromium-browser/chrome",
            "/var/lib/flatpak/exports/bin/org.chromium.Chromium",
            "/usr/bin/google-chrome-stable",
            "/usr/bin/google-chrome",
            "/usr/bin/chromium",
            "/usr/bin/chromium-browser",
        ]
        .iter()
        .map(PathBuf::from)
        .find(|p| p.exists())
    }

    async fn launch(&self) -> Result<(Browser, JoinHandle<()>), AppError> {
        let mut builder = BrowserConfig::builder().no_sandbox().disable_default_args();
        if let Some(bin) = self.find_chrome_binary() {
            tracing::debug!(bin = %bin.display(), "Using Chrome binary");
            builder = builder.chrome_executable(bin);
        }

        let config = builder
            .arg("--headless=new")
            .arg("--disable-gpu")
            .arg("--disable-dev-shm-usage")
            .arg("--disable-extensions")
            .arg("--no-first-run")
            .request_timeout(self.timeout)
            .build()
            .map_err(|e| AppError::BrowserError(format!("Browser config error: {e}")))?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|e| AppError::BrowserError(format!("Failed to launch browser: {e}")))?;

        // The CDP handler must be polled for the connection to make progress.
        let handle = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if event.is_err() {
                    tracing::warn!("Browser CDP handler error: {event:?}");
                    break;
                }
            }
        });

        Ok((browser, handle))
    }
}

impl SessionFactory for ChromiumSessionFactory {
    type Session = ChromiumSession;

    async fn open(&self, profile: &HeaderProfile) -> Result<ChromiumSession, AppError> {
        let (mut browser, handler) = self.launch().await?;

        let page = match prepare_page(&browser, profile).await {
            Ok(page) => page,
            Err(e) => {
                let _ = browser.close().await;
                handler.abort();
                return Err(e);
            }
        };

        Ok(ChromiumSession {
            browser,
            page,
            handler,
            timeout: self.timeout,
        })
    }
}

/// Open a blank tab carrying the header profile on every request.
async fn prepare_page(browser: &Browser, profile: &HeaderProfile) -> Result<Page, AppError> {
    let page = browser
        .new_page("about:blank")
        .await
        .map_err(|e| AppError::BrowserError(format!("Failed to open tab: {e}")))?;

    let user_agent = SetUserAgentOverrideParams::builder()
        .user_agent(profile.user_agent.clone())
        .accept_language(profile.locale.clone())
        .build()
        .map_err(|e| AppError::BrowserError(format!("Invalid user agent override: {e}")))?;
    page.execute(user_agent)
        .await
        .map_err(|e| AppError::BrowserError(format!("Failed to set user agent: {e}")))?;

    let headers = Headers::new(serde_json::json!({
        "Accept-Language": profile.locale,
        "Referer": profile.referrer,
    }));
    page.execute(SetExtraHttpHeadersParams::new(headers))
        .await
        .map_err(|e| AppError::BrowserError(format!("Failed to set request headers: {e}")))?;

    Ok(page)
}

/// A Chromium tab driven over CDP, with the browser process it lives in.
pub struct ChromiumSession {
    browser: Browser,
    page: Page,
    handler: JoinHandle<()>,
    timeout: Duration,
}

impl ChromiumSession {
    /// Run one browser interaction under the per-request timeout.
    async fn bounded<T>(
        &self,
        what: &str,
        fut: impl Future<Output = Result<T, chromiumoxide::error::CdpError>>,
    ) -> Result<T, AppError> {
        match tokio::time::timeout(self.timeout, fut).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => Err(AppError::BrowserError(format!("{what}: {e}"))),
            Err(_) => Err(AppError::Timeout(self.timeout)),
        }
    }
}

impl BrowserSession for ChromiumSession {
    async fn navigate(&mut self, url: &str) -> Result<String, AppError> {
        tracing::debug!(%url, "Navigating");
        let page = &self.page;
        self.bounded(&format!("Failed to navigate to {url}"), async move {
            page.goto(url).await?;
            page.content().await
        })
        .await
        .map_err(|e| match e {
            AppError::BrowserError(msg) => AppError::HttpError(msg),
            other => other,
        })
    }

    async fn fill(&mut self, selector: &str, value: &str) -> Result<(), AppError> {
        let page = &self.page;
        self.bounded(&format!("Failed to fill '{selector}'"), async move {
            let element = page.find_element(selector).await?;
            element.click().await?;
            element.type_str(value).await?;
            Ok(())
        })
        .await
    }

    async fn submit(&mut self, selector: &str) -> Result<String, AppError> {
        let page = &self.page;
        self.bounded(&format!("Failed to submit via '{selector}'"), async move {
            page.find_element(selector).await?.click().await?;
            page.wait_for_navigation().await?;
            page.content().await
        })
        .await
    }

    async fn cookies(&mut self) -> Result<Vec<SessionCookie>, AppError> {
        let cookies = self
            .bounded("Failed to read cookies", self.page.get_cookies())
            .await?;
        Ok(cookies
            .into_iter()
            .map(|c| SessionCookie {
                name: c.name,
                value: c.value,
                domain: c.domain,
                path: c.path,
                // CDP reports -1 for session cookies.
                expires: (c.expires > 0.0).then_some(c.expires),
                secure: c.secure,
                http_only: c.http_only,
            })
            .collect())
    }

    async fn restore_cookies(&mut self, cookies: &[SessionCookie]) -> Result<(), AppError> {
        let params = cookies
            .iter()
            .map(|c| {
                let mut builder = CookieParam::builder()
                    .name(c.name.clone())
                    .value(c.value.clone())
                    .domain(c.domain.clone())
                    .path(c.path.clone())
                    .secure(c.secure)
                    .http_only(c.http_only);
                if let Some(expires) = c.expires {
                    builder = builder.expires(TimeSinceEpoch::new(expires));
                }
                builder
                    .build()
                    .map_err(|e| AppError::BrowserError(format!("Invalid cookie '{}': {e}", c.name)))
            })
            .collect::<Result<Vec<_>, _>>()?;

        self.bounded("Failed to restore cookies", self.page.set_cookies(params))
            .await?;
        Ok(())
    }

    async fn close(mut self) {
        if let Err(e) = self.page.clone().close().await {
            tracing::debug!("Failed to close tab: {e}");
        }
        if let Err(e) = self.browser.close().await {
            tracing::debug!("Failed to close browser: {e}");
        }
        let _ = self.browser.wait().await;
        self.handler.abort();
    }
}
