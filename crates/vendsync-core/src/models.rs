use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One configured catalog source: a vendor URL crawled with a named parser.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScrapeTarget {
    pub id: i64,
    pub vendor_id: i64,
    pub url: String,
    /// Name of the [`crate::source::CrawlSource`] that knows this vendor's markup.
    pub source: String,
    pub last_parsed_at: Option<DateTime<Utc>>,
    pub default_reward_range_id: Option<i64>,
}

/// Vendor login used by the authentication step.
#[derive(Clone, Serialize, Deserialize)]
pub struct VendorCredentials {
    pub login: String,
    pub password: String,
}

impl fmt::Debug for VendorCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VendorCredentials")
            .field("login", &self.login)
            .field("password", &"***")
            .finish()
    }
}

/// One band of a reward range, covering `from <= price < to`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RewardTier {
    pub from: f64,
    pub to: f64,
    pub is_percent: bool,
    pub reward: f64,
}

impl RewardTier {
    pub fn new(from: f64, to: f64, is_percent: bool, reward: f64) -> Self {
        Self {
            from,
            to,
            is_percent,
            reward,
        }
    }

    pub fn contains(&self, price: f64) -> bool {
        self.from <= price && price < self.to
    }
}

/// A listing block as extracted from one page, before pricing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParsedRow {
    pub origin: i64,
    pub title: String,
    pub link: String,
    pub shipment: Option<String>,
    pub warranty: Option<String>,
    pub input_price: f64,
    pub pics: Vec<String>,
    pub preview: Option<String>,
    pub optional: Option<String>,
    /// The origin already has a hub entry.
    pub published: bool,
}

/// A priced listing held in the staging set of one scrape target.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HarvestedLine {
    pub target_id: i64,
    pub origin: i64,
    pub title: String,
    pub link: String,
    pub shipment: Option<String>,
    pub warranty: Option<String>,
    pub input_price: f64,
    pub output_price: Option<f64>,
    pub pics: Vec<String>,
    pub preview: Option<String>,
    pub optional: Option<String>,
    /// The origin already had a hub entry when the line was harvested.
    #[serde(default)]
    pub published: bool,
}

impl HarvestedLine {
    /// Price used for comparison against the hub: the output price once
    /// priced, otherwise the raw input price.
    pub fn parsing_price(&self) -> f64 {
        self.output_price.unwrap_or(self.input_price)
    }
}

/// A published hub entry joined with its product title.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HubEntry {
    pub origin: i64,
    pub path_id: i64,
    /// Scrape target the entry was published from.
    pub vsl_id: i64,
    pub title: String,
    pub warranty: Option<String>,
    pub input_price: Option<f64>,
    pub output_price: Option<f64>,
    pub updated_at: Option<DateTime<Utc>>,
    pub profit_range_id: Option<i64>,
    /// `last_parsed_at` of the referenced scrape target.
    pub parsed_at: Option<DateTime<Utc>>,
}

/// Drift classification of one diff item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiffStatus {
    Equal,
    HubHigher,
    ParsingHigher,
    OnlyHub,
    OnlyParsing,
}

impl DiffStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DiffStatus::Equal => "equal",
            DiffStatus::HubHigher => "hub_higher",
            DiffStatus::ParsingHigher => "parsing_higher",
            DiffStatus::OnlyHub => "only_hub",
            DiffStatus::OnlyParsing => "only_parsing",
        }
    }
}

impl fmt::Display for DiffStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for DiffStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "equal" => Ok(DiffStatus::Equal),
            "hub_higher" => Ok(DiffStatus::HubHigher),
            "parsing_higher" => Ok(DiffStatus::ParsingHigher),
            "only_hub" => Ok(DiffStatus::OnlyHub),
            "only_parsing" => Ok(DiffStatus::OnlyParsing),
            _ => Err(format!("Unknown diff status: {}", s)),
        }
    }
}

/// One comparison between a staged line and a hub entry for the same origin.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiffItem {
    pub origin: i64,
    pub title: String,
    pub status: DiffStatus,
    pub target_id: Option<i64>,
    pub parsing_input_price: Option<f64>,
    pub parsing_output_price: Option<f64>,
    pub hub_input_price: Option<f64>,
    pub hub_output_price: Option<f64>,
    pub parsed_at: Option<DateTime<Utc>>,
    pub hub_updated_at: Option<DateTime<Utc>>,
}

impl DiffItem {
    /// Ordering key inside a report: parsing price, else hub price, else 0.
    pub fn sort_price(&self) -> f64 {
        self.parsing_output_price
            .or(self.parsing_input_price)
            .or(self.hub_output_price)
            .unwrap_or(0.0)
    }
}

/// Ordered diff of one category path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiffReport {
    pub path_id: i64,
    pub items: Vec<DiffItem>,
}

/// An accepted price change to write into the hub.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceChange {
    pub origin: i64,
    pub input_price: f64,
    pub output_price: f64,
    #[serde(default)]
    pub warranty: Option<String>,
}

/// A browser cookie as persisted between runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionCookie {
    pub name: String,
    pub value: String,
    pub domain: String,
    pub path: String,
    #[serde(default)]
    pub expires: Option<f64>,
    #[serde(default)]
    pub secure: bool,
    #[serde(default)]
    pub http_only: bool,
}

/// Request headers applied to every browser session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeaderProfile {
    pub user_agent: String,
    pub locale: String,
    pub referrer: String,
}

impl Default for HeaderProfile {
    fn default() -> Self {
        Self {
            user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
                         (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36"
                .to_string(),
            locale: "ru-RU".to_string(),
            referrer: "https://www.google.com/".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_diff_status_roundtrip() {
        for status in [
            DiffStatus::Equal,
            DiffStatus::HubHigher,
            DiffStatus::ParsingHigher,
            DiffStatus::OnlyHub,
            DiffStatus::OnlyParsing,
        ] {
            let parsed: DiffStatus = status.as_str().parse().unwrap();
            assert_eq!(parsed, status);
            let json = serde_json::to_string(&status).unwrap();
            assert_eq!(json, format!("\"{}\"", status.as_str()));
        }
    }

    #[test]
    fn test_tier_is_half_open() {
        let tier = RewardTier::new(0.0, 1000.0, false, 50.0);
        assert!(tier.contains(0.0));
        assert!(tier.contains(999.99));
        assert!(!tier.contains(1000.0));
        assert!(!tier.contains(-1.0));
    }

    #[test]
    fn test_credentials_debug_hides_password() {
        let creds = VendorCredentials {
            login: "buyer".into(),
            password: "hunter2".into(),
        };
        let printed = format!("{creds:?}");
        assert!(printed.contains("buyer"));
        assert!(!printed.contains("hunter2"));
    }

    #[test]
    fn test_parsing_price_falls_back_to_input() {
        let mut line = HarvestedLine {
            target_id: 1,
            origin: 42,
            title: "Widget".into(),
            link: "https://vendor.test/p/42".into(),
            shipment: None,
            warranty: None,
            input_price: 450.0,
            output_price: None,
            pics: vec![],
            preview: None,
            optional: None,
            published: false,
        };
        assert_eq!(line.parsing_price(), 450.0);
        line.output_price = Some(500.0);
        assert_eq!(line.parsing_price(), 500.0);
    }
}
