//! Test utilities: mock implementations of all core traits.
//!
//! Handwritten mocks for dependency injection in unit tests. Shared state sits
//! behind `Arc<Mutex<_>>` so tests can keep a clone and assert on what was
//! recorded.

use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};

use crate::crawl::{CrawlEvent, CrawlReporter};
use crate::error::AppError;
use crate::models::{
    HarvestedLine, HeaderProfile, HubEntry, ParsedRow, PriceChange, RewardTier, ScrapeTarget,
    SessionCookie, VendorCredentials,
};
use crate::source::{CrawlSource, LoginForm};
use crate::traits::{
    BrowserSession, HarvestStore, HubStore, ImageUploader, SessionFactory, SessionStore,
    TargetDirectory,
};

pub const LOGIN_URL: &str = "https://vendor.test/login";
const LOGIN_WALL: &str = "<login-wall/>";

pub fn test_credentials() -> VendorCredentials {
    VendorCredentials {
        login: "buyer".into(),
        password: "secret".into(),
    }
}

/// The cookie a [`MockBrowser`] hands out after a successful login.
pub fn valid_cookie() -> SessionCookie {
    SessionCookie {
        name: "sid".into(),
        value: "valid".into(),
        domain: "vendor.test".into(),
        path: "/".into(),
        expires: None,
        secure: true,
        http_only: true,
    }
}

pub fn staged_line(target_id: i64, origin: i64, input: f64, output: Option<f64>) -> HarvestedLine {
    HarvestedLine {
        target_id,
        origin,
        title: format!("Item {origin}"),
        link: format!("https://vendor.test/p/{origin}"),
        shipment: None,
        warranty: None,
        input_price: input,
        output_price: output,
        pics: vec![],
        preview: None,
        optional: None,
        published: false,
    }
}

pub fn hub_entry(origin: i64, path_id: i64, vsl_id: i64, output: Option<f64>) -> HubEntry {
    HubEntry {
        origin,
        path_id,
        vsl_id,
        title: format!("Item {origin}"),
        warranty: None,
        input_price: output.map(|p| p - 100.0),
        output_price: output,
        updated_at: None,
        profit_range_id: None,
        parsed_at: None,
    }
}

pub fn scrape_target(id: i64, vendor_id: i64, source: &str) -> ScrapeTarget {
    ScrapeTarget {
        id,
        vendor_id,
        url: "https://vendor.test/catalog".into(),
        source: source.into(),
        last_parsed_at: None,
        default_reward_range_id: None,
    }
}

// ---------------------------------------------------------------------------
// StubSource
// ---------------------------------------------------------------------------

/// A line-based source for the mock browser.
///
/// Page bodies are lines of `row:<origin>:<title>:<price>`, `pic:<origin>:<url>`
/// and `page:<url>`. Any page containing `<login-wall/>` counts as
/// unauthenticated.
#[derive(Debug, Clone)]
pub struct StubSource {
    name: String,
}

impl StubSource {
    pub fn named(name: &str) -> Self {
        Self {
            name: name.to_string(),
        }
    }
}

impl CrawlSource for StubSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn login_form(&self) -> LoginForm {
        LoginForm {
            url: LOGIN_URL.into(),
            login_selector: "#login".into(),
            password_selector: "#password".into(),
            submit_selector: "#submit".into(),
        }
    }

    fn is_authenticated(&self, html: &str) -> bool {
        !html.contains(LOGIN_WALL)
    }

    fn extract_rows(&self, html: &str, page_url: &str) -> Result<Vec<ParsedRow>, AppError> {
        let mut pics: HashMap<i64, Vec<String>> = HashMap::new();
        for spec in html.lines().filter_map(|line| line.trim().strip_prefix("pic:")) {
            if let Some((origin, url)) = spec.split_once(':')
                && let Ok(origin) = origin.parse()
            {
                pics.entry(origin).or_default().push(url.to_string());
            }
        }

        let rows = html
            .lines()
            .filter_map(|line| line.trim().strip_prefix("row:"))
            .filter_map(|spec| {
                let mut parts = spec.splitn(3, ':');
                let origin = parts.next()?.parse().ok()?;
                let title = parts.next()?.to_string();
                let price = parts
                    .next()?
                    .chars()
                    .filter(|c| !c.is_whitespace())
                    .collect::<String>()
                    .replace(',', ".")
                    .parse()
                    .ok()?;
                Some(ParsedRow {
                    origin,
                    title,
                    link: format!("{page_url}#{origin}"),
                    shipment: None,
                    warranty: None,
                    input_price: price,
                    pics: pics.get(&origin).cloned().unwrap_or_default(),
                    preview: None,
                    optional: None,
                    published: false,
                })
            })
            .collect();
        Ok(rows)
    }

    fn pagination_links(&self, html: &str, _page_url: &str) -> Vec<String> {
        html.lines()
            .filter_map(|line| line.trim().strip_prefix("page:"))
            .map(str::to_string)
            .collect()
    }
}

// ---------------------------------------------------------------------------
// MockBrowser / MockSession / MockSessionFactory
// ---------------------------------------------------------------------------

#[derive(Default)]
struct BrowserScript {
    pages: HashMap<String, String>,
    valid_login: (String, String),
    missing_selectors: HashSet<String>,
    /// Each entry: number of pages served after a login before the session dies.
    expirations: VecDeque<usize>,
    fail_open: Option<AppError>,
    logged_in: bool,
    served_since_login: usize,
    filled: HashMap<String, String>,
    navigations: Vec<String>,
    closed: bool,
}

/// Scripted vendor site shared by every session the mock factory opens.
#[derive(Clone)]
pub struct MockBrowser {
    script: Arc<Mutex<BrowserScript>>,
}

impl Default for MockBrowser {
    fn default() -> Self {
        Self::new()
    }
}

impl MockBrowser {
    pub fn new() -> Self {
        let creds = test_credentials();
        Self {
            script: Arc::new(Mutex::new(BrowserScript {
                valid_login: (creds.login, creds.password),
                ..BrowserScript::default()
            })),
        }
    }

    pub fn with_page(self, url: &str, html: &str) -> Self {
        self.script
            .lock()
            .unwrap()
            .pages
            .insert(url.to_string(), html.to_string());
        self
    }

    pub fn with_valid_login(self, login: &str, password: &str) -> Self {
        self.script.lock().unwrap().valid_login = (login.to_string(), password.to_string());
        self
    }

    pub fn without_selector(self, selector: &str) -> Self {
        self.script
            .lock()
            .unwrap()
            .missing_selectors
            .insert(selector.to_string());
        self
    }

    /// Expire the session after `pages` pages have been served since the last
    /// login. Calls stack: the second call applies after the next login.
    pub fn expire_after(self, pages: usize) -> Self {
        self.script.lock().unwrap().expirations.push_back(pages);
        self
    }

    pub fn failing_open(self, error: AppError) -> Self {
        self.script.lock().unwrap().fail_open = Some(error);
        self
    }

    pub fn navigations(&self) -> Vec<String> {
        self.script.lock().unwrap().navigations.clone()
    }

    pub fn filled(&self) -> HashMap<String, String> {
        self.script.lock().unwrap().filled.clone()
    }

    pub fn is_closed(&self) -> bool {
        self.script.lock().unwrap().closed
    }
}

pub struct MockSession {
    browser: MockBrowser,
}

impl BrowserSession for MockSession {
    async fn navigate(&mut self, url: &str) -> Result<String, AppError> {
        let mut script = self.browser.script.lock().unwrap();
        script.navigations.push(url.to_string());

        if url == LOGIN_URL {
            return Ok(LOGIN_WALL.to_string());
        }
        if !script.pages.contains_key(url) {
            return Err(AppError::HttpError(format!("HTTP 404 for {url}")));
        }

        if script.logged_in && script.expirations.front() == Some(&script.served_since_login) {
            script.expirations.pop_front();
            script.logged_in = false;
        }
        if !script.logged_in {
            return Ok(LOGIN_WALL.to_string());
        }

        script.served_since_login += 1;
        Ok(script.pages[url].clone())
    }

    async fn fill(&mut self, selector: &str, value: &str) -> Result<(), AppError> {
        let mut script = self.browser.script.lock().unwrap();
        if script.missing_selectors.contains(selector) {
            return Err(AppError::BrowserError(format!("No element matches '{selector}'")));
        }
        script.filled.insert(selector.to_string(), value.to_string());
        Ok(())
    }

    async fn submit(&mut self, _selector: &str) -> Result<String, AppError> {
        let mut script = self.browser.script.lock().unwrap();
        let (login, password) = script.valid_login.clone();
        let accepted = script.filled.get("#login") == Some(&login)
            && script.filled.get("#password") == Some(&password);
        if accepted {
            script.logged_in = true;
            script.served_since_login = 0;
            Ok("<html>welcome</html>".to_string())
        } else {
            Ok(LOGIN_WALL.to_string())
        }
    }

    async fn cookies(&mut self) -> Result<Vec<SessionCookie>, AppError> {
        let script = self.browser.script.lock().unwrap();
        Ok(if script.logged_in {
            vec![valid_cookie()]
        } else {
            vec![]
        })
    }

    async fn restore_cookies(&mut self, cookies: &[SessionCookie]) -> Result<(), AppError> {
        let mut script = self.browser.script.lock().unwrap();
        if cookies.contains(&valid_cookie()) {
            script.logged_in = true;
            script.served_since_login = 0;
        }
        Ok(())
    }

    async fn close(self) {
        self.browser.script.lock().unwrap().closed = true;
    }
}

#[derive(Clone)]
pub struct MockSessionFactory {
    browser: MockBrowser,
    profiles: Arc<Mutex<Vec<HeaderProfile>>>,
}

impl MockSessionFactory {
    pub fn new(browser: MockBrowser) -> Self {
        Self {
            browser,
            profiles: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Header profiles passed to `open`, in call order.
    pub fn profiles(&self) -> Vec<HeaderProfile> {
        self.profiles.lock().unwrap().clone()
    }
}

impl SessionFactory for MockSessionFactory {
    type Session = MockSession;

    async fn open(&self, profile: &HeaderProfile) -> Result<MockSession, AppError> {
        self.profiles.lock().unwrap().push(profile.clone());
        if let Some(error) = self.browser.script.lock().unwrap().fail_open.take() {
            return Err(error);
        }
        Ok(MockSession {
            browser: self.browser.clone(),
        })
    }
}

// ---------------------------------------------------------------------------
// MockSessionStore
// ---------------------------------------------------------------------------

#[derive(Clone, Default)]
pub struct MockSessionStore {
    sessions: Arc<Mutex<HashMap<String, Vec<SessionCookie>>>>,
}

impl MockSessionStore {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn with_session(source: &str, cookies: Vec<SessionCookie>) -> Self {
        let store = Self::default();
        store
            .sessions
            .lock()
            .unwrap()
            .insert(source.to_string(), cookies);
        store
    }

    pub fn saved_for(&self, source: &str) -> Option<Vec<SessionCookie>> {
        self.sessions.lock().unwrap().get(source).cloned()
    }
}

impl SessionStore for MockSessionStore {
    async fn load(&self, source: &str) -> Result<Option<Vec<SessionCookie>>, AppError> {
        Ok(self.saved_for(source))
    }

    async fn save(&self, source: &str, cookies: &[SessionCookie]) -> Result<(), AppError> {
        self.sessions
            .lock()
            .unwrap()
            .insert(source.to_string(), cookies.to_vec());
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// MockTargetDirectory
// ---------------------------------------------------------------------------

#[derive(Clone, Default)]
pub struct MockTargetDirectory {
    targets: Arc<Mutex<HashMap<i64, ScrapeTarget>>>,
    credentials: Arc<Mutex<HashMap<i64, VendorCredentials>>>,
    /// `None` key holds the default range.
    ranges: Arc<Mutex<HashMap<Option<i64>, Vec<RewardTier>>>>,
    marked: Arc<Mutex<Vec<(i64, DateTime<Utc>)>>>,
    mark_error: Arc<Mutex<Option<AppError>>>,
}

impl MockTargetDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_target(self, target: ScrapeTarget) -> Self {
        self.targets.lock().unwrap().insert(target.id, target);
        self
    }

    pub fn with_credentials(self, vendor_id: i64, creds: VendorCredentials) -> Self {
        self.credentials.lock().unwrap().insert(vendor_id, creds);
        self
    }

    pub fn with_range(self, range_id: Option<i64>, tiers: Vec<RewardTier>) -> Self {
        self.ranges.lock().unwrap().insert(range_id, tiers);
        self
    }

    pub fn failing_mark_parsed(self, error: AppError) -> Self {
        *self.mark_error.lock().unwrap() = Some(error);
        self
    }

    pub fn marked(&self) -> Vec<(i64, DateTime<Utc>)> {
        self.marked.lock().unwrap().clone()
    }
}

impl TargetDirectory for MockTargetDirectory {
    async fn get_target(&self, target_id: i64) -> Result<Option<ScrapeTarget>, AppError> {
        Ok(self.targets.lock().unwrap().get(&target_id).cloned())
    }

    async fn credentials(&self, vendor_id: i64) -> Result<Option<VendorCredentials>, AppError> {
        Ok(self.credentials.lock().unwrap().get(&vendor_id).cloned())
    }

    async fn reward_tiers(&self, range_id: Option<i64>) -> Result<Vec<RewardTier>, AppError> {
        let ranges = self.ranges.lock().unwrap();
        Ok(ranges
            .get(&range_id)
            .or_else(|| ranges.get(&None))
            .cloned()
            .unwrap_or_default())
    }

    async fn mark_parsed(&self, target_id: i64, at: DateTime<Utc>) -> Result<(), AppError> {
        if let Some(error) = self.mark_error.lock().unwrap().take() {
            return Err(error);
        }
        self.marked.lock().unwrap().push((target_id, at));
        if let Some(target) = self.targets.lock().unwrap().get_mut(&target_id) {
            target.last_parsed_at = Some(at);
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// MemoryHarvestStore
// ---------------------------------------------------------------------------

/// In-memory staging with the same replace semantics as the database.
#[derive(Clone, Default)]
pub struct MemoryHarvestStore {
    sets: Arc<Mutex<BTreeMap<i64, Vec<HarvestedLine>>>>,
    replace_error: Arc<Mutex<Option<AppError>>>,
}

impl MemoryHarvestStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_lines(self, target_id: i64, lines: Vec<HarvestedLine>) -> Self {
        self.sets.lock().unwrap().insert(target_id, lines);
        self
    }

    pub fn failing_replace(self, error: AppError) -> Self {
        *self.replace_error.lock().unwrap() = Some(error);
        self
    }

    pub fn snapshot(&self, target_id: i64) -> Vec<HarvestedLine> {
        self.sets
            .lock()
            .unwrap()
            .get(&target_id)
            .cloned()
            .unwrap_or_default()
    }
}

impl HarvestStore for MemoryHarvestStore {
    async fn replace(&self, target_id: i64, lines: &[HarvestedLine]) -> Result<u64, AppError> {
        if let Some(error) = self.replace_error.lock().unwrap().take() {
            return Err(error);
        }
        let mut seen = HashSet::new();
        let kept: Vec<HarvestedLine> = lines
            .iter()
            .filter(|line| seen.insert(line.origin))
            .map(|line| HarvestedLine {
                target_id,
                ..line.clone()
            })
            .collect();
        let inserted = kept.len() as u64;
        self.sets.lock().unwrap().insert(target_id, kept);
        Ok(inserted)
    }

    async fn get(&self, target_id: i64) -> Result<Vec<HarvestedLine>, AppError> {
        Ok(self.snapshot(target_id))
    }

    async fn get_many(&self, target_ids: &[i64]) -> Result<Vec<HarvestedLine>, AppError> {
        let sets = self.sets.lock().unwrap();
        let wanted: HashSet<i64> = target_ids.iter().copied().collect();
        Ok(sets
            .iter()
            .filter(|(id, _)| wanted.contains(id))
            .flat_map(|(_, lines)| lines.iter().cloned())
            .collect())
    }
}

// ---------------------------------------------------------------------------
// MemoryHubStore
// ---------------------------------------------------------------------------

#[derive(Clone, Default)]
pub struct MemoryHubStore {
    paths: Arc<Mutex<HashSet<i64>>>,
    entries: Arc<Mutex<Vec<HubEntry>>>,
    commits: Arc<Mutex<Vec<Vec<PriceChange>>>>,
}

impl MemoryHubStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_path(self, path_id: i64) -> Self {
        self.paths.lock().unwrap().insert(path_id);
        self
    }

    pub fn with_entry(self, entry: HubEntry) -> Self {
        self.paths.lock().unwrap().insert(entry.path_id);
        self.entries.lock().unwrap().push(entry);
        self
    }

    pub fn entries(&self) -> Vec<HubEntry> {
        self.entries.lock().unwrap().clone()
    }

    pub fn commits(&self) -> Vec<Vec<PriceChange>> {
        self.commits.lock().unwrap().clone()
    }
}

impl HubStore for MemoryHubStore {
    async fn path_exists(&self, path_id: i64) -> Result<bool, AppError> {
        Ok(self.paths.lock().unwrap().contains(&path_id))
    }

    async fn entries_under_path(&self, path_id: i64) -> Result<Vec<HubEntry>, AppError> {
        Ok(self
            .entries()
            .into_iter()
            .filter(|entry| entry.path_id == path_id)
            .collect())
    }

    async fn published_origins(&self) -> Result<HashSet<i64>, AppError> {
        Ok(self.entries().iter().map(|entry| entry.origin).collect())
    }

    async fn update_prices(&self, changes: &[PriceChange]) -> Result<u64, AppError> {
        self.commits.lock().unwrap().push(changes.to_vec());
        let now = Utc::now();
        let mut entries = self.entries.lock().unwrap();
        let mut affected = 0;
        for change in changes {
            for entry in entries.iter_mut().filter(|e| e.origin == change.origin) {
                entry.input_price = Some(change.input_price);
                entry.output_price = Some(change.output_price);
                entry.updated_at = Some(now);
                if change.warranty.is_some() {
                    entry.warranty = change.warranty.clone();
                }
                affected += 1;
            }
        }
        Ok(affected)
    }
}

// ---------------------------------------------------------------------------
// MockUploader
// ---------------------------------------------------------------------------

/// Uploader that fails for any source URL containing `broken`.
#[derive(Clone, Default)]
pub struct MockUploader {
    calls: Arc<Mutex<Vec<(i64, usize, String)>>>,
}

impl MockUploader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> Vec<(i64, usize, String)> {
        self.calls.lock().unwrap().clone()
    }
}

impl ImageUploader for MockUploader {
    async fn upload(&self, origin: i64, index: usize, source_url: &str) -> Result<String, AppError> {
        self.calls
            .lock()
            .unwrap()
            .push((origin, index, source_url.to_string()));
        if source_url.contains("broken") {
            return Err(AppError::HttpError(format!("HTTP 500 for {source_url}")));
        }
        Ok(format!("https://cdn.test/{origin}/{index}.jpg"))
    }
}

// ---------------------------------------------------------------------------
// RecordingReporter
// ---------------------------------------------------------------------------

/// Records the kind of every crawl event.
#[derive(Clone, Default)]
pub struct RecordingReporter {
    events: Arc<Mutex<Vec<String>>>,
}

impl RecordingReporter {
    pub fn events(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }

    pub fn count(&self, kind: &str) -> usize {
        self.events().iter().filter(|e| *e == kind).count()
    }
}

impl CrawlReporter for RecordingReporter {
    fn report(&self, event: CrawlEvent<'_>) {
        let kind = match event {
            CrawlEvent::SessionOpened { .. } => "opened",
            CrawlEvent::SessionRestored { .. } => "restored",
            CrawlEvent::Authenticating { .. } => "authenticating",
            CrawlEvent::Authenticated { .. } => "authenticated",
            CrawlEvent::SessionExpired { .. } => "expired",
            CrawlEvent::PageProcessed { .. } => "page",
            CrawlEvent::Finished { .. } => "finished",
            CrawlEvent::Failed { .. } => "failed",
        };
        self.events.lock().unwrap().push(kind.to_string());
    }
}
