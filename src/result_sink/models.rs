use crate::enrichment::DetectedLabel;
use chrono::NaiveDateTime;
use serde::Serialize;

/// Format of the processed-at column.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// The outcome of enriching one work item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EnrichmentResult {
    pub identifier: String,
    pub secondary_identifier: String,
    pub existing_label: String,
    pub detected_label: DetectedLabel,
    pub image_url: String,
    #[serde(serialize_with = "serialize_timestamp")]
    pub processed_at: Option<NaiveDateTime>,
}

fn serialize_timestamp<S: serde::Serializer>(
    value: &Option<NaiveDateTime>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    match value {
        Some(ts) => serializer.serialize_str(&ts.format(TIMESTAMP_FORMAT).to_string()),
        None => serializer.serialize_none(),
    }
}

impl EnrichmentResult {
    /// Cells in result-file order: identifier, secondary identifier,
    /// original label, detected label, image URL, processed at.
    pub fn to_record(&self) -> Vec<String> {
        vec![
            self.identifier.clone(),
            self.secondary_identifier.clone(),
            self.existing_label.clone(),
            self.detected_label.to_string(),
            self.image_url.clone(),
            self.processed_at
                .map(|ts| ts.format(TIMESTAMP_FORMAT).to_string())
                .unwrap_or_default(),
        ]
    }

    /// True when this row should keep its item out of future work queues.
    pub fn counts_as_processed(&self) -> bool {
        self.detected_label != DetectedLabel::QuotaExceeded
    }
}

pub(super) fn parse_timestamp(value: &str) -> Option<NaiveDateTime> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }
    NaiveDateTime::parse_from_str(value, TIMESTAMP_FORMAT)
        .or_else(|_| NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f"))
        .ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::enrichment::PatternLabel;
    use chrono::NaiveDate;

    fn sample() -> EnrichmentResult {
        EnrichmentResult {
            identifier: "V1".to_string(),
            secondary_identifier: "P1".to_string(),
            existing_label: "".to_string(),
            detected_label: DetectedLabel::Pattern(PatternLabel::AnimalPrint),
            image_url: "https://cdn/x.jpg".to_string(),
            processed_at: NaiveDate::from_ymd_opt(2024, 3, 9)
                .and_then(|d| d.and_hms_opt(14, 5, 0)),
        }
    }

    #[test]
    fn test_to_record() {
        assert_eq!(
            sample().to_record(),
            vec![
                "V1",
                "P1",
                "",
                "Animal Print",
                "https://cdn/x.jpg",
                "2024-03-09 14:05:00"
            ]
        );
    }

    #[test]
    fn test_parse_timestamp() {
        assert_eq!(parse_timestamp("2024-03-09 14:05:00"), sample().processed_at);
        assert_eq!(parse_timestamp("2024-03-09T14:05:00.123"), sample().processed_at.map(|t| t + chrono::Duration::milliseconds(123)));
        assert_eq!(parse_timestamp(""), None);
        assert_eq!(parse_timestamp("yesterday"), None);
    }

    #[test]
    fn test_quota_rows_do_not_count_as_processed() {
        let mut result = sample();
        assert!(result.counts_as_processed());
        result.detected_label = DetectedLabel::Error;
        assert!(result.counts_as_processed());
        result.detected_label = DetectedLabel::QuotaExceeded;
        assert!(!result.counts_as_processed());
    }

    #[test]
    fn test_json_shape() {
        let json = serde_json::to_value(sample()).unwrap();
        assert_eq!(json["detected_label"], "Animal Print");
        assert_eq!(json["processed_at"], "2024-03-09 14:05:00");
    }
}
