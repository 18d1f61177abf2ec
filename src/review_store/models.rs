use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Decision {
    Approved,
    Rejected,
}

impl Decision {
    pub fn as_str(&self) -> &'static str {
        match self {
            Decision::Approved => "Approved",
            Decision::Rejected => "Rejected",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "approved" => Some(Decision::Approved),
            "rejected" => Some(Decision::Rejected),
            _ => None,
        }
    }
}

/// A reviewer's verdict on one enrichment result.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReviewDecision {
    pub identifier: String,
    pub secondary_identifier: String,
    pub detected_label: String,
    pub image_url: String,
    pub decision: Decision,
    pub reviewer: String,
    pub decided_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReviewCounts {
    pub approved: usize,
    pub rejected: usize,
}

impl ReviewCounts {
    pub fn total(&self) -> usize {
        self.approved + self.rejected
    }

    pub fn add(&mut self, decision: Decision) {
        match decision {
            Decision::Approved => self.approved += 1,
            Decision::Rejected => self.rejected += 1,
        }
    }
}
