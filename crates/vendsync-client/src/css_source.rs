use std::path::Path;
use std::sync::Arc;

use scraper::{ElementRef, Html, Selector};
use serde::{Deserialize, Serialize};
use url::Url;
use vendsync_core::error::AppError;
use vendsync_core::models::ParsedRow;
use vendsync_core::source::{CrawlSource, LoginForm, SourceRegistry};

use crate::price::parse_price;

/// Markup description of one vendor site.
///
/// Field selectors are CSS selectors evaluated inside a listing block. A
/// trailing `@attr` reads that attribute instead of the element text, and a
/// bare `@attr` reads it from the block itself (`"@data-id"`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceSelectors {
    pub name: String,
    pub login: LoginForm,
    /// Present only on pages served to a logged-in session.
    pub authenticated: String,
    /// One match per listing block.
    pub item: String,
    pub origin: String,
    pub title: String,
    pub link: String,
    pub price: String,
    #[serde(default)]
    pub shipment: Option<String>,
    #[serde(default)]
    pub warranty: Option<String>,
    #[serde(default)]
    pub optional: Option<String>,
    #[serde(default)]
    pub pics: Option<String>,
    #[serde(default)]
    pub preview: Option<String>,
    /// Links to further listing pages, read from `href` unless an `@attr` is given.
    pub pagination: String,
    /// Query appended to every visited page, e.g. `"per_page=100"`.
    #[serde(default)]
    pub page_query: Option<String>,
}

#[derive(Debug)]
struct Field {
    selector: Option<Selector>,
    attr: Option<String>,
}

impl Field {
    fn parse(spec: &str, default_attr: Option<&str>) -> Result<Self, AppError> {
        let (css, attr) = match spec.rsplit_once('@') {
            Some((css, attr)) if is_attr_name(attr) => (css.trim(), Some(attr.to_string())),
            _ => (spec.trim(), default_attr.map(str::to_string)),
        };
        let selector = if css.is_empty() {
            None
        } else {
            Some(
                Selector::parse(css)
                    .map_err(|e| AppError::ConfigError(format!("Invalid selector '{css}': {e}")))?,
            )
        };
        Ok(Self { selector, attr })
    }

    fn elements<'a>(&'a self, scope: ElementRef<'a>) -> Vec<ElementRef<'a>> {
        match &self.selector {
            Some(sel) => scope.select(sel).collect(),
            None => vec![scope],
        }
    }

    fn value_of(&self, element: ElementRef<'_>) -> Option<String> {
        let raw = match &self.attr {
            Some(attr) => element.value().attr(attr)?.to_string(),
            None => element.text().collect::<Vec<_>>().join(" "),
        };
        let text = normalize_whitespace(&raw);
        (!text.is_empty()).then_some(text)
    }

    fn first(&self, scope: ElementRef<'_>) -> Option<String> {
        self.elements(scope)
            .into_iter()
            .find_map(|element| self.value_of(element))
    }

    fn all(&self, scope: ElementRef<'_>) -> Vec<String> {
        self.elements(scope)
            .into_iter()
            .filter_map(|element| self.value_of(element))
            .collect()
    }
}

fn is_attr_name(s: &str) -> bool {
    !s.is_empty()
        && s
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == ':')
}

fn normalize_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// A [`CrawlSource`] driven entirely by [`SourceSelectors`].
#[derive(Debug)]
pub struct CssSource {
    selectors: SourceSelectors,
    authenticated: Selector,
    item: Selector,
    origin: Field,
    title: Field,
    link: Field,
    price: Field,
    shipment: Option<Field>,
    warranty: Option<Field>,
    optional: Option<Field>,
    pics: Option<Field>,
    preview: Option<Field>,
    pagination: Field,
}

fn compile(spec: &str) -> Result<Selector, AppError> {
    Selector::parse(spec).map_err(|e| AppError::ConfigError(format!("Invalid selector '{spec}': {e}")))
}

fn optional_field(spec: &Option<String>, attr: Option<&str>) -> Result<Option<Field>, AppError> {
    spec.as_deref().map(|s| Field::parse(s, attr)).transpose()
}

impl CssSource {
    pub fn new(selectors: SourceSelectors) -> Result<Self, AppError> {
        Ok(Self {
            authenticated: compile(&selectors.authenticated)?,
            item: compile(&selectors.item)?,
            origin: Field::parse(&selectors.origin, None)?,
            title: Field::parse(&selectors.title, None)?,
            link: Field::parse(&selectors.link, Some("href"))?,
            price: Field::parse(&selectors.price, None)?,
            shipment: optional_field(&selectors.shipment, None)?,
            warranty: optional_field(&selectors.warranty, None)?,
            optional: optional_field(&selectors.optional, None)?,
            pics: optional_field(&selectors.pics, Some("src"))?,
            preview: optional_field(&selectors.preview, Some("src"))?,
            pagination: Field::parse(&selectors.pagination, Some("href"))?,
            selectors,
        })
    }

    pub fn selectors(&self) -> &SourceSelectors {
        &self.selectors
    }

    fn parse_block(&self, block: ElementRef<'_>, base: Option<&Url>) -> Option<ParsedRow> {
        let origin_text = self.origin.first(block)?;
        let Some(origin) = parse_origin(&origin_text) else {
            tracing::debug!(source = %self.selectors.name, raw = %origin_text, "Skipping block without identifier");
            return None;
        };

        let price_text = self.price.first(block).unwrap_or_default();
        let Some(input_price) = parse_price(&price_text) else {
            tracing::debug!(source = %self.selectors.name, %origin, raw = %price_text, "Skipping block without price");
            return None;
        };

        let text = |field: &Option<Field>| field.as_ref().and_then(|f| f.first(block));
        let link = self
            .link
            .first(block)
            .map(|href| resolve(base, &href))
            .unwrap_or_default();
        let pics = self
            .pics
            .as_ref()
            .map(|f| f.all(block).iter().map(|src| resolve(base, src)).collect())
            .unwrap_or_default();

        Some(ParsedRow {
            origin,
            title: self.title.first(block).unwrap_or_default(),
            link,
            shipment: text(&self.shipment),
            warranty: text(&self.warranty),
            input_price,
            pics,
            preview: text(&self.preview).map(|src| resolve(base, &src)),
            optional: text(&self.optional),
            published: false,
        })
    }
}

impl CrawlSource for CssSource {
    fn name(&self) -> &str {
        &self.selectors.name
    }

    fn login_form(&self) -> LoginForm {
        self.selectors.login.clone()
    }

    fn is_authenticated(&self, html: &str) -> bool {
        Html::parse_document(html)
            .select(&self.authenticated)
            .next()
            .is_some()
    }

    fn extract_rows(&self, html: &str, page_url: &str) -> Result<Vec<ParsedRow>, AppError> {
        let document = Html::parse_document(html);
        let base = Url::parse(page_url).ok();
        let rows: Vec<ParsedRow> = document
            .select(&self.item)
            .filter_map(|block| self.parse_block(block, base.as_ref()))
            .collect();
        tracing::debug!(source = %self.selectors.name, %page_url, rows = rows.len(), "Extracted rows");
        Ok(rows)
    }

    fn pagination_links(&self, html: &str, page_url: &str) -> Vec<String> {
        let Ok(base) = Url::parse(page_url) else {
            return Vec::new();
        };
        let document = Html::parse_document(html);
        self.pagination
            .all(document.root_element())
            .iter()
            .filter_map(|href| base.join(href).ok())
            .filter(|url| matches!(url.scheme(), "http" | "https"))
            .map(|mut url| {
                url.set_fragment(None);
                url.to_string()
            })
            .collect()
    }

    fn page_url(&self, url: &str) -> String {
        let Some(query) = self.selectors.page_query.as_deref() else {
            return url.to_string();
        };
        match Url::parse(url) {
            Ok(mut parsed) => {
                let present: Vec<String> =
                    parsed.query_pairs().map(|(k, _)| k.into_owned()).collect();
                let missing: Vec<(String, String)> = url::form_urlencoded::parse(query.as_bytes())
                    .into_owned()
                    .filter(|(key, _)| !present.contains(key))
                    .collect();
                if !missing.is_empty() {
                    parsed.query_pairs_mut().extend_pairs(missing);
                }
                parsed.to_string()
            }
            Err(_) => url.to_string(),
        }
    }
}

/// Leading digits of an identifier such as `"SKU 004512"` or `"item-77"`.
fn parse_origin(raw: &str) -> Option<i64> {
    let digits: String = raw
        .chars()
        .skip_while(|c| !c.is_ascii_digit())
        .take_while(char::is_ascii_digit)
        .collect();
    digits.parse().ok()
}

fn resolve(base: Option<&Url>, href: &str) -> String {
    base.and_then(|b| b.join(href).ok())
        .map(|u| u.to_string())
        .unwrap_or_else(|| href.to_string())
}

/// Build a registry from a JSON file holding an array of [`SourceSelectors`].
pub fn load_registry(path: &Path) -> Result<SourceRegistry, AppError> {
    let raw = std::fs::read_to_string(path).map_err(|e| {
        AppError::ConfigError(format!("Cannot read sources file {}: {e}", path.display()))
    })?;
    registry_from_json(&raw)
}

pub fn registry_from_json(raw: &str) -> Result<SourceRegistry, AppError> {
    let specs: Vec<SourceSelectors> = serde_json::from_str(raw)?;
    let mut registry = SourceRegistry::new();
    for spec in specs {
        registry.register(Arc::new(CssSource::new(spec)?));
    }
    tracing::info!(sources = registry.len(), "Crawl sources loaded");
    Ok(registry)
}
