use pattern_curator::config::{AppConfig, CliConfig};
use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;

pub struct CatalogFixtureRow {
    pub variant_sku: String,
    pub product_sku: &'static str,
    pub kind: &'static str,
    pub pattern: &'static str,
    pub images: String,
}

impl CatalogFixtureRow {
    pub fn new(variant_sku: impl Into<String>, kind: &'static str, pattern: &'static str) -> Self {
        Self {
            variant_sku: variant_sku.into(),
            product_sku: "PROD",
            kind,
            pattern,
            images: String::new(),
        }
    }

    /// Adds a design image descriptor (plus a front shot listed first).
    pub fn with_design_image(mut self, url: &str) -> Self {
        self.images = format!(
            r#"[{{"angle":"front","url":"https://cdn.example/front.jpg"}},{{"angle":"design","url":"{}"}}]"#,
            url
        );
        self
    }
}

/// Renders rows as a catalog export with the default column names.
pub fn catalog_csv(rows: &[CatalogFixtureRow]) -> String {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer
        .write_record(["Variant SKU", "Product SKU", "Type", "Patterns", "Images", "Title"])
        .unwrap();
    for row in rows {
        writer
            .write_record([
                row.variant_sku.as_str(),
                row.product_sku,
                row.kind,
                row.pattern,
                row.images.as_str(),
                "Some title",
            ])
            .unwrap();
    }
    String::from_utf8(writer.into_inner().unwrap()).unwrap()
}

/// A data directory with a catalog file and a resolved config pointing at it.
pub struct TestWorkspace {
    pub dir: TempDir,
    pub config: AppConfig,
}

impl TestWorkspace {
    pub fn with_catalog(rows: &[CatalogFixtureRow]) -> Self {
        let dir = TempDir::new().unwrap();
        let catalog_path = dir.path().join("catalog.csv");
        fs::write(&catalog_path, catalog_csv(rows)).unwrap();

        let cli = CliConfig {
            data_dir: Some(dir.path().to_path_buf()),
            catalog_path: Some(catalog_path),
            ..Default::default()
        };
        let mut config = AppConfig::resolve(&cli, None).unwrap();
        config.enrichment.requests_per_minute = 0;
        Self { dir, config }
    }

    pub fn results_path(&self) -> PathBuf {
        self.config.results_path.clone()
    }

    pub fn read_results(&self) -> String {
        fs::read_to_string(self.results_path()).unwrap()
    }
}
