//! Record types written to the output tables.
//!
//! Each type knows which table it belongs to and how to flatten itself into
//! that table's column order (see [`Record`]). Optional values flatten to
//! empty cells.

use std::fmt;

use crate::align::AlignedRow;
use crate::sink::Table;

/// A row destined for one of the output tables.
pub trait Record {
    const TABLE: Table;

    /// Cell values in the table's column order.
    fn fields(&self) -> Vec<String>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContributionKind {
    Review,
    Photo,
}

impl fmt::Display for ContributionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContributionKind::Review => f.write_str("Review"),
            ContributionKind::Photo => f.write_str("Photo"),
        }
    }
}

/// One review or photo attributed to a contributor.
///
/// A section with no content is recorded as a single sentinel contribution
/// whose optional fields are all empty: processed, nothing found.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Contribution {
    pub entity_id: String,
    pub kind: ContributionKind,
    pub target_name: String,
    pub target_address: String,
    pub rating: Option<String>,
    pub date: Option<String>,
    pub scraped: String,
    pub text: Option<String>,
}

impl Contribution {
    pub fn sentinel(entity_id: &str, kind: ContributionKind, scraped: &str) -> Self {
        Self {
            entity_id: entity_id.to_string(),
            kind,
            target_name: String::new(),
            target_address: String::new(),
            rating: None,
            date: None,
            scraped: scraped.to_string(),
            text: None,
        }
    }

    pub fn from_aligned(entity_id: &str, kind: ContributionKind, scraped: &str, row: AlignedRow) -> Self {
        Self {
            entity_id: entity_id.to_string(),
            kind,
            target_name: row.name,
            target_address: row.address,
            rating: row.rating,
            date: row.date,
            scraped: scraped.to_string(),
            text: row.text,
        }
    }

    #[cfg(test)]
    pub fn is_sentinel(&self) -> bool {
        self.target_name.is_empty()
            && self.target_address.is_empty()
            && self.rating.is_none()
            && self.date.is_none()
            && self.text.is_none()
    }
}

impl Record for Contribution {
    const TABLE: Table = Table::ContributionDetail;

    fn fields(&self) -> Vec<String> {
        vec![
            self.entity_id.clone(),
            self.kind.to_string(),
            self.target_name.clone(),
            self.target_address.clone(),
            self.rating.clone().unwrap_or_default(),
            self.date.clone().unwrap_or_default(),
            self.scraped.clone(),
            self.text.clone().unwrap_or_default(),
        ]
    }
}

/// Profile-level facts about a contributor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContributorSummary {
    pub entity_id: String,
    pub name: String,
    pub local_guide: bool,
    pub scraped: String,
    /// Counts in the configured contribution-type order.
    pub counts: Vec<String>,
}

impl Record for ContributorSummary {
    const TABLE: Table = Table::ContributorSummary;

    fn fields(&self) -> Vec<String> {
        let flag = if self.local_guide { "Yes" } else { "No" };
        [
            self.entity_id.clone(),
            self.name.clone(),
            flag.to_string(),
            self.scraped.clone(),
        ]
        .into_iter()
        .chain(self.counts.iter().cloned())
        .collect()
    }
}

/// Headline facts about a business.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BusinessSummary {
    pub name: String,
    pub address: String,
    pub category: String,
    pub average_rating: String,
    pub review_count: String,
    pub scraped: String,
}

impl Record for BusinessSummary {
    const TABLE: Table = Table::BusinessSummary;

    fn fields(&self) -> Vec<String> {
        vec![
            self.name.clone(),
            self.address.clone(),
            self.category.clone(),
            self.average_rating.clone(),
            self.review_count.clone(),
            self.scraped.clone(),
        ]
    }
}

/// One review left on a business, with the reviewer's identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BusinessReview {
    pub business_name: String,
    pub business_address: String,
    pub reviewer_id: String,
    pub reviewer_name: String,
    pub rating: Option<String>,
    pub date: Option<String>,
    pub scraped: String,
    pub text: Option<String>,
}

impl BusinessReview {
    pub fn sentinel(business_name: &str, business_address: &str, scraped: &str) -> Self {
        Self {
            business_name: business_name.to_string(),
            business_address: business_address.to_string(),
            reviewer_id: String::new(),
            reviewer_name: String::new(),
            rating: None,
            date: None,
            scraped: scraped.to_string(),
            text: None,
        }
    }
}

impl Record for BusinessReview {
    const TABLE: Table = Table::BusinessReviews;

    fn fields(&self) -> Vec<String> {
        vec![
            self.business_name.clone(),
            self.business_address.clone(),
            self.reviewer_id.clone(),
            self.reviewer_name.clone(),
            self.rating.clone().unwrap_or_default(),
            self.date.clone().unwrap_or_default(),
            self.scraped.clone(),
            self.text.clone().unwrap_or_default(),
        ]
    }
}
