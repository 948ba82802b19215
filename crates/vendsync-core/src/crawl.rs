//! Authenticated breadth-first crawl of one scrape target.
//!
//! A run is a small state machine. Each state owns the browser session and the
//! walk so far, and each transition consumes the state and returns the next:
//!
//! ```text
//! open ──> CheckCredentials ──[no stored session]──> Authenticate ──> Crawl ─┐
//!                 │                                      ^               │   │
//!                 └──────[cookies restored]──────────────┼──────────────>┤   │
//!                                                        └─[expired, once]┘   │
//!                                                                             v
//!                                                          Done / Failed <────┘
//! ```
//!
//! Pages are visited one at a time through the same session. A session that
//! expires mid-crawl is re-authenticated once per run; a second expiry fails
//! the run. A failed run returns no rows.

use std::collections::HashSet;
use std::time::Instant;

use tokio_util::sync::CancellationToken;

use crate::config::CrawlConfig;
use crate::error::AppError;
use crate::frontier::Frontier;
use crate::models::{ParsedRow, VendorCredentials};
use crate::source::CrawlSource;
use crate::traits::{BrowserSession, SessionFactory, SessionStore};

/// Events emitted during a run for progress reporting.
#[derive(Debug, Clone)]
pub enum CrawlEvent<'a> {
    SessionOpened {
        source: &'a str,
    },
    SessionRestored {
        source: &'a str,
        cookies: usize,
    },
    Authenticating {
        source: &'a str,
    },
    Authenticated {
        source: &'a str,
    },
    SessionExpired {
        source: &'a str,
        url: &'a str,
    },
    PageProcessed {
        url: &'a str,
        page: usize,
        rows: usize,
        queued: usize,
    },
    Finished {
        pages: usize,
        rows: usize,
    },
    Failed {
        error: &'a AppError,
    },
}

/// Receives crawl events (decoupled from logging and the progress channel).
pub trait CrawlReporter: Send + Sync {
    fn report(&self, event: CrawlEvent<'_>) {
        let _ = event;
    }
}

/// Reporter that only logs through `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingCrawlReporter;

impl CrawlReporter for TracingCrawlReporter {
    fn report(&self, event: CrawlEvent<'_>) {
        match event {
            CrawlEvent::PageProcessed {
                url,
                page,
                rows,
                queued,
            } => tracing::info!(%url, %page, %rows, %queued, "Page processed"),
            CrawlEvent::Finished { pages, rows } => {
                tracing::info!(%pages, %rows, "Crawl finished")
            }
            CrawlEvent::Failed { error } => tracing::warn!(%error, "Crawl failed"),
            other => tracing::debug!(event = ?other, "Crawl event"),
        }
    }
}

/// What to crawl in one run.
#[derive(Debug, Clone)]
pub struct CrawlJob {
    pub start_url: String,
    pub credentials: VendorCredentials,
    /// Origins already present in the hub; matching rows get `published = true`.
    pub published: HashSet<i64>,
}

/// Rows of a finished run.
#[derive(Debug, Clone)]
pub struct CrawlOutput {
    pub rows: Vec<ParsedRow>,
    pub pages: usize,
    pub reauthenticated: bool,
}

/// Progress of the walk, carried from state to state.
#[derive(Debug, Default)]
struct Walk {
    frontier: Frontier,
    rows: Vec<ParsedRow>,
    pages: usize,
    reauths: u32,
}

enum CrawlState<S> {
    CheckCredentials { session: S, walk: Walk },
    Authenticate { session: S, walk: Walk },
    Crawl { session: S, walk: Walk },
    Done { session: S, walk: Walk },
    Failed { session: S, error: AppError },
}

/// Runs crawls with a session factory and a persistent session store.
#[derive(Clone)]
pub struct CrawlEngine<F, St>
where
    F: SessionFactory,
    St: SessionStore,
{
    factory: F,
    sessions: St,
    config: CrawlConfig,
}

impl<F, St> CrawlEngine<F, St>
where
    F: SessionFactory,
    St: SessionStore,
{
    pub fn new(factory: F, sessions: St, config: CrawlConfig) -> Self {
        Self {
            factory,
            sessions,
            config,
        }
    }

    pub fn config(&self) -> &CrawlConfig {
        &self.config
    }

    /// Crawl `job.start_url` with `source` until the frontier is exhausted.
    pub async fn run<R: CrawlReporter>(
        &self,
        source: &dyn CrawlSource,
        job: &CrawlJob,
        reporter: &R,
        cancel: &CancellationToken,
    ) -> Result<CrawlOutput, AppError> {
        let run = Run {
            engine: self,
            source,
            job,
            reporter,
            cancel,
            deadline: self.config.run_deadline.map(|d| Instant::now() + d),
        };
        run.execute().await
    }
}

/// Borrowed context of one run; the transitions live here.
struct Run<'a, F, St, R>
where
    F: SessionFactory,
    St: SessionStore,
{
    engine: &'a CrawlEngine<F, St>,
    source: &'a dyn CrawlSource,
    job: &'a CrawlJob,
    reporter: &'a R,
    cancel: &'a CancellationToken,
    deadline: Option<Instant>,
}

impl<F, St, R> Run<'_, F, St, R>
where
    F: SessionFactory,
    St: SessionStore,
    R: CrawlReporter,
{
    async fn execute(&self) -> Result<CrawlOutput, AppError> {
        let mut state = match self.open().await {
            Ok(state) => state,
            Err(error) => {
                self.reporter.report(CrawlEvent::Failed { error: &error });
                return Err(error);
            }
        };

        loop {
            state = match state {
                CrawlState::Done { session, walk } => {
                    session.close().await;
                    self.reporter.report(CrawlEvent::Finished {
                        pages: walk.pages,
                        rows: walk.rows.len(),
                    });
                    return Ok(CrawlOutput {
                        rows: walk.rows,
                        pages: walk.pages,
                        reauthenticated: walk.reauths > 0,
                    });
                }
                CrawlState::Failed { session, error } => {
                    session.close().await;
                    self.reporter.report(CrawlEvent::Failed { error: &error });
                    return Err(error);
                }
                other => match self.interruption() {
                    Some(error) => CrawlState::Failed {
                        session: other.into_session(),
                        error,
                    },
                    None => self.step(other).await,
                },
            };
        }
    }

    async fn step(&self, state: CrawlState<F::Session>) -> CrawlState<F::Session> {
        match state {
            CrawlState::CheckCredentials { session, walk } => {
                self.check_credentials(session, walk).await
            }
            CrawlState::Authenticate { session, walk } => self.authenticate(session, walk).await,
            CrawlState::Crawl { session, walk } => self.crawl_next(session, walk).await,
            terminal => terminal,
        }
    }

    /// Cancellation or deadline, checked between transitions.
    fn interruption(&self) -> Option<AppError> {
        if self.cancel.is_cancelled() {
            return Some(AppError::Cancelled);
        }
        match (self.deadline, self.engine.config.run_deadline) {
            (Some(deadline), Some(limit)) if Instant::now() >= deadline => {
                Some(AppError::Timeout(limit))
            }
            _ => None,
        }
    }

    /// Init: launch a session with the header profile.
    async fn open(&self) -> Result<CrawlState<F::Session>, AppError> {
        let session = self.engine.factory.open(&self.engine.config.profile).await?;
        self.reporter.report(CrawlEvent::SessionOpened {
            source: self.source.name(),
        });
        Ok(CrawlState::CheckCredentials {
            session,
            walk: Walk {
                frontier: Frontier::seeded(self.job.start_url.clone()),
                ..Walk::default()
            },
        })
    }

    async fn check_credentials(
        &self,
        mut session: F::Session,
        walk: Walk,
    ) -> CrawlState<F::Session> {
        let stored = match self.engine.sessions.load(self.source.name()).await {
            Ok(stored) => stored,
            Err(error) => return CrawlState::Failed { session, error },
        };

        match stored {
            Some(cookies) if !cookies.is_empty() => {
                if let Err(error) = session.restore_cookies(&cookies).await {
                    return CrawlState::Failed { session, error };
                }
                self.reporter.report(CrawlEvent::SessionRestored {
                    source: self.source.name(),
                    cookies: cookies.len(),
                });
                CrawlState::Crawl { session, walk }
            }
            _ => CrawlState::Authenticate { session, walk },
        }
    }

    async fn authenticate(&self, mut session: F::Session, walk: Walk) -> CrawlState<F::Session> {
        let name = self.source.name();
        self.reporter.report(CrawlEvent::Authenticating { source: name });

        if let Err(error) = self.login(&mut session).await {
            return CrawlState::Failed { session, error };
        }

        let saved = match session.cookies().await {
            Ok(cookies) => self.engine.sessions.save(name, &cookies).await,
            Err(error) => Err(error),
        };
        if let Err(error) = saved {
            return CrawlState::Failed { session, error };
        }

        self.reporter.report(CrawlEvent::Authenticated { source: name });
        CrawlState::Crawl { session, walk }
    }

    /// Fill and submit the source's login form.
    async fn login(&self, session: &mut F::Session) -> Result<(), AppError> {
        let name = self.source.name();
        let form = self.source.login_form();
        let creds = &self.job.credentials;
        let flow_failed = |e: AppError| AppError::auth(name, format!("login flow failed: {e}"));

        session.navigate(&form.url).await.map_err(flow_failed)?;
        session
            .fill(&form.login_selector, &creds.login)
            .await
            .map_err(flow_failed)?;
        session
            .fill(&form.password_selector, &creds.password)
            .await
            .map_err(flow_failed)?;
        let landing = session
            .submit(&form.submit_selector)
            .await
            .map_err(flow_failed)?;

        if !self.source.is_authenticated(&landing) {
            return Err(AppError::auth(name, "credentials rejected"));
        }
        Ok(())
    }

    /// Crawl: visit the next frontier URL and collect its rows and links.
    async fn crawl_next(&self, mut session: F::Session, mut walk: Walk) -> CrawlState<F::Session> {
        if let Some(limit) = self.engine.config.max_pages {
            if walk.pages >= limit {
                tracing::info!(limit, left = walk.frontier.len(), "Page limit reached");
                return CrawlState::Done { session, walk };
            }
        }

        let Some(url) = walk.frontier.pop() else {
            return CrawlState::Done { session, walk };
        };

        let page_url = self.source.page_url(&url);
        let html = match session.navigate(&page_url).await {
            Ok(html) => html,
            Err(error) => return CrawlState::Failed { session, error },
        };

        if !self.source.is_authenticated(&html) {
            let name = self.source.name();
            if walk.reauths >= self.engine.config.max_reauth {
                return CrawlState::Failed {
                    session,
                    error: AppError::auth(name, format!("session expired again at {page_url}")),
                };
            }
            walk.reauths += 1;
            self.reporter.report(CrawlEvent::SessionExpired {
                source: name,
                url: &page_url,
            });
            walk.frontier.requeue_front(url);
            return CrawlState::Authenticate { session, walk };
        }

        let mut rows = match self.source.extract_rows(&html, &page_url) {
            Ok(rows) => rows,
            Err(error) => return CrawlState::Failed { session, error },
        };
        for row in &mut rows {
            row.published = self.job.published.contains(&row.origin);
        }

        walk.frontier
            .extend(self.source.pagination_links(&html, &page_url));
        walk.pages += 1;
        self.reporter.report(CrawlEvent::PageProcessed {
            url: &page_url,
            page: walk.pages,
            rows: rows.len(),
            queued: walk.frontier.len(),
        });
        walk.rows.extend(rows);

        let delay = self.engine.config.page_delay;
        if !delay.is_zero() && !walk.frontier.is_empty() {
            tokio::time::sleep(delay).await;
        }

        CrawlState::Crawl { session, walk }
    }
}

impl<S> CrawlState<S> {
    fn into_session(self) -> S {
        match self {
            CrawlState::CheckCredentials { session, .. }
            | CrawlState::Authenticate { session, .. }
            | CrawlState::Crawl { session, .. }
            | CrawlState::Done { session, .. }
            | CrawlState::Failed { session, .. } => session,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::models::{HeaderProfile, SessionCookie};
    use crate::testutil::*;

    const START: &str = "https://vendor.test/catalog";

    fn job() -> CrawlJob {
        CrawlJob {
            start_url: START.to_string(),
            credentials: test_credentials(),
            published: HashSet::from([2]),
        }
    }

    fn engine(
        browser: &MockBrowser,
        store: &MockSessionStore,
    ) -> CrawlEngine<MockSessionFactory, MockSessionStore> {
        CrawlEngine::new(
            MockSessionFactory::new(browser.clone()),
            store.clone(),
            CrawlConfig::default(),
        )
    }

    fn three_page_browser() -> MockBrowser {
        MockBrowser::new()
            .with_page(
                START,
                "row:1:First:100\nrow:2:Second:1 200,50\npage:https://vendor.test/catalog?p=2\npage:https://vendor.test/catalog?p=3",
            )
            .with_page(
                "https://vendor.test/catalog?p=2",
                "row:3:Third:300\nrow:4:No price:n/a\npage:https://vendor.test/catalog\npage:https://vendor.test/catalog?p=3",
            )
            .with_page(
                "https://vendor.test/catalog?p=3",
                "row:5:Fifth:500\npage:https://vendor.test/catalog?p=2",
            )
    }

    #[tokio::test]
    async fn fresh_run_authenticates_and_walks_all_pages() {
        let browser = three_page_browser();
        let store = MockSessionStore::empty();
        let reporter = RecordingReporter::default();

        let output = engine(&browser, &store)
            .run(&StubSource::named("stub"), &job(), &reporter, &CancellationToken::new())
            .await
            .unwrap();

        let origins: Vec<i64> = output.rows.iter().map(|r| r.origin).collect();
        assert_eq!(origins, vec![1, 2, 3, 5]);
        assert_eq!(output.pages, 3);
        assert!(!output.reauthenticated);

        assert_eq!(
            browser.navigations(),
            vec![
                "https://vendor.test/login",
                START,
                "https://vendor.test/catalog?p=2",
                "https://vendor.test/catalog?p=3",
            ]
        );
        assert!(store.saved_for("stub").is_some());
        assert!(browser.is_closed());
        assert_eq!(reporter.count("page"), 3);
        assert_eq!(reporter.count("finished"), 1);
    }

    #[tokio::test]
    async fn rows_already_in_hub_are_flagged() {
        let browser = three_page_browser();
        let store = MockSessionStore::empty();

        let output = engine(&browser, &store)
            .run(&StubSource::named("stub"), &job(), &TracingCrawlReporter, &CancellationToken::new())
            .await
            .unwrap();

        let published: Vec<i64> = output
            .rows
            .iter()
            .filter(|r| r.published)
            .map(|r| r.origin)
            .collect();
        assert_eq!(published, vec![2]);
        assert_eq!(output.rows[1].input_price, 1200.5);
    }

    #[tokio::test]
    async fn stored_session_skips_login() {
        let browser = MockBrowser::new().with_page(START, "row:1:Only:100");
        let store = MockSessionStore::with_session("stub", vec![valid_cookie()]);

        let output = engine(&browser, &store)
            .run(&StubSource::named("stub"), &job(), &TracingCrawlReporter, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(output.rows.len(), 1);
        assert_eq!(browser.navigations(), vec![START]);
        assert!(browser.filled().is_empty());
    }

    #[tokio::test]
    async fn stale_stored_session_reauthenticates_once() {
        let browser = MockBrowser::new().with_page(START, "row:1:Only:100");
        let stale = SessionCookie {
            value: "stale".into(),
            ..valid_cookie()
        };
        let store = MockSessionStore::with_session("stub", vec![stale]);

        let output = engine(&browser, &store)
            .run(&StubSource::named("stub"), &job(), &TracingCrawlReporter, &CancellationToken::new())
            .await
            .unwrap();

        assert!(output.reauthenticated);
        assert_eq!(
            browser.navigations(),
            vec![START, "https://vendor.test/login", START]
        );
        assert_eq!(store.saved_for("stub"), Some(vec![valid_cookie()]));
    }

    #[tokio::test]
    async fn mid_crawl_expiry_retries_same_url() {
        let browser = three_page_browser().expire_after(1);
        let store = MockSessionStore::empty();

        let output = engine(&browser, &store)
            .run(&StubSource::named("stub"), &job(), &TracingCrawlReporter, &CancellationToken::new())
            .await
            .unwrap();

        assert!(output.reauthenticated);
        assert_eq!(output.pages, 3);
        assert_eq!(
            browser.navigations(),
            vec![
                "https://vendor.test/login",
                START,
                "https://vendor.test/catalog?p=2",
                "https://vendor.test/login",
                "https://vendor.test/catalog?p=2",
                "https://vendor.test/catalog?p=3",
            ]
        );
    }

    #[tokio::test]
    async fn second_expiry_fails_run_without_rows() {
        let browser = three_page_browser().expire_after(1).expire_after(1);
        let store = MockSessionStore::empty();
        let reporter = RecordingReporter::default();

        let err = engine(&browser, &store)
            .run(&StubSource::named("stub"), &job(), &reporter, &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::AuthenticationFailure { .. }));
        assert!(browser.is_closed());
        assert_eq!(reporter.count("failed"), 1);
    }

    #[tokio::test]
    async fn rejected_credentials_fail_run() {
        let browser = three_page_browser().with_valid_login("someone", "else");
        let store = MockSessionStore::empty();

        let err = engine(&browser, &store)
            .run(&StubSource::named("stub"), &job(), &TracingCrawlReporter, &CancellationToken::new())
            .await
            .unwrap_err();

        match err {
            AppError::AuthenticationFailure { source_name, message } => {
                assert_eq!(source_name, "stub");
                assert!(message.contains("rejected"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(store.saved_for("stub").is_none());
        assert!(browser.is_closed());
    }

    #[tokio::test]
    async fn broken_login_form_is_authentication_failure() {
        let browser = three_page_browser().without_selector("#password");
        let store = MockSessionStore::empty();

        let err = engine(&browser, &store)
            .run(&StubSource::named("stub"), &job(), &TracingCrawlReporter, &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::AuthenticationFailure { .. }));
    }

    #[tokio::test]
    async fn navigation_error_propagates() {
        let browser = MockBrowser::new().with_page(START, "page:https://vendor.test/missing");
        let store = MockSessionStore::empty();

        let err = engine(&browser, &store)
            .run(&StubSource::named("stub"), &job(), &TracingCrawlReporter, &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::HttpError(_)));
        assert!(browser.is_closed());
    }

    #[tokio::test]
    async fn session_open_failure_propagates() {
        let browser = MockBrowser::new().failing_open(AppError::BrowserError("no chrome".into()));
        let store = MockSessionStore::empty();

        let err = engine(&browser, &store)
            .run(&StubSource::named("stub"), &job(), &TracingCrawlReporter, &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::BrowserError(_)));
    }

    #[tokio::test]
    async fn cancelled_run_returns_cancelled() {
        let browser = three_page_browser();
        let store = MockSessionStore::empty();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = engine(&browser, &store)
            .run(&StubSource::named("stub"), &job(), &TracingCrawlReporter, &cancel)
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::Cancelled));
        assert!(browser.is_closed());
        assert!(browser.navigations().is_empty());
    }

    #[tokio::test]
    async fn page_limit_stops_walk() {
        let browser = three_page_browser();
        let store = MockSessionStore::empty();
        let config = CrawlConfig {
            max_pages: Some(1),
            ..CrawlConfig::default()
        };
        let engine = CrawlEngine::new(MockSessionFactory::new(browser.clone()), store, config);

        let output = engine
            .run(&StubSource::named("stub"), &job(), &TracingCrawlReporter, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(output.pages, 1);
        assert_eq!(output.rows.len(), 2);
    }

    #[tokio::test]
    async fn session_opens_with_configured_header_profile() {
        let browser = three_page_browser();
        let profile = HeaderProfile {
            user_agent: "vendsync-test/1.0".into(),
            locale: "de-DE".into(),
            referrer: "https://search.test/".into(),
        };
        let config = CrawlConfig {
            profile: profile.clone(),
            ..CrawlConfig::default()
        };
        let factory = MockSessionFactory::new(browser);
        let engine = CrawlEngine::new(factory.clone(), MockSessionStore::empty(), config);

        engine
            .run(&StubSource::named("stub"), &job(), &TracingCrawlReporter, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(factory.profiles(), vec![profile]);
    }

    #[tokio::test]
    async fn run_deadline_fails_slow_runs() {
        let browser = three_page_browser();
        let store = MockSessionStore::empty();
        let config = CrawlConfig {
            page_delay: Duration::from_millis(60),
            run_deadline: Some(Duration::from_millis(50)),
            ..CrawlConfig::default()
        };
        let engine = CrawlEngine::new(MockSessionFactory::new(browser.clone()), store, config);

        let err = engine
            .run(&StubSource::named("stub"), &job(), &TracingCrawlReporter, &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::Timeout(limit) if limit == Duration::from_millis(50)));
        assert_eq!(err.to_string(), "Timed out after 50ms");
    }
}
