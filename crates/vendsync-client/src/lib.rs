#[cfg(feature = "browser")]
pub mod browser;
pub mod config;
pub mod css_source;
pub mod image_mirror;
pub mod price;
pub mod session_store;

#[cfg(feature = "browser")]
pub use browser::{ChromiumSession, ChromiumSessionFactory};
pub use config::ClientConfig;
pub use css_source::{CssSource, SourceSelectors, load_registry, registry_from_json};
pub use image_mirror::HttpImageMirror;
pub use price::parse_price;
pub use session_store::FileSessionStore;
