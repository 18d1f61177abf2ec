/// Names of the columns the pipeline reads and writes.
///
/// Source columns describe the catalog export, derived columns the
/// work-queue and result files produced from it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnLayout {
    // Source catalog
    pub category: String,
    pub label: String,
    pub identifier: String,
    pub secondary_identifier: String,
    pub image_references: String,
    // Derived files
    pub image_url: String,
    pub original_label: String,
    pub detected_label: String,
    pub processed_at: String,
}

impl Default for ColumnLayout {
    fn default() -> Self {
        Self {
            category: "Type".to_string(),
            label: "Patterns".to_string(),
            identifier: "Variant SKU".to_string(),
            secondary_identifier: "Product SKU".to_string(),
            image_references: "Images".to_string(),
            image_url: "Design Image URL".to_string(),
            original_label: "Original Patterns".to_string(),
            detected_label: "AI Detected Pattern".to_string(),
            processed_at: "Processed Date".to_string(),
        }
    }
}

impl ColumnLayout {
    /// Header of the work-queue file.
    pub fn work_queue_header(&self) -> [&str; 4] {
        [
            self.identifier.as_str(),
            self.secondary_identifier.as_str(),
            self.label.as_str(),
            self.image_url.as_str(),
        ]
    }

    /// Header of the result file.
    pub fn result_header(&self) -> [&str; 6] {
        [
            self.identifier.as_str(),
            self.secondary_identifier.as_str(),
            self.original_label.as_str(),
            self.detected_label.as_str(),
            self.image_url.as_str(),
            self.processed_at.as_str(),
        ]
    }
}
