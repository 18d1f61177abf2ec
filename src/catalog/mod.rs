//! Catalog-side input: column layout, row predicates, the chunked reader
//! and the image-reference extractor.

mod columns;
mod filter;
mod image_ref;
mod reader;

pub use columns::ColumnLayout;
pub use filter::{is_blank_label, CategoryFilter};
pub use image_ref::extract_role_url;
pub use reader::{scan_catalog, scan_catalog_file, CatalogRow, CatalogScan, ScanOptions};
