mod catalog;
mod client;
mod location;

pub use catalog::{load_catalog, parse_catalog, CATALOG_FILE, CATALOG_KEY_FILE, CATALOG_SIGNATURE_FILE};
pub use client::RemoteCatalog;
pub use location::CatalogLocation;
