//! Aligning independently extracted attribute streams into records.
//!
//! A review list is read as several parallel streams: one composite
//! name/address block per entry, one small group of tagged elements per entry
//! holding an optional rating and an optional relative date, and one free-text
//! body per entry. Entries may lack a rating or a date, so the secondary
//! streams are read per group by tag rather than zipped positionally; a
//! missing attribute leaves an empty field and never shifts later rows.

use chrono::NaiveDate;
use itertools::Itertools;
use tracing::{debug, instrument};

use crate::dates;
use crate::error::{Result, ScrapeError};

/// Name and address parsed from a composite text block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrimaryBlock {
    pub name: String,
    pub address: String,
}

impl PrimaryBlock {
    /// First line is the name; remaining lines, joined by spaces, the address.
    pub fn parse(text: &str) -> Self {
        let mut lines = text.split('\n');
        let name = lines.next().unwrap_or_default().to_string();
        let address = lines.join(" ");
        Self { name, address }
    }
}

/// One element inside a rating/date group.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TaggedElement {
    /// Space-separated kind tags (the element's class list).
    pub tags: String,
    /// Accessible label; ratings are carried here ("5 stars").
    pub label: Option<String>,
    pub text: String,
}

impl TaggedElement {
    fn has_tag(&self, tag: &str) -> bool {
        self.tags.split_whitespace().any(|t| t == tag)
    }
}

/// The tagged elements belonging to one entry.
pub type TagGroup = Vec<TaggedElement>;

/// One aligned entry. Optional fields are `None` when the entry lacks them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlignedRow {
    pub name: String,
    pub address: String,
    pub rating: Option<String>,
    pub date: Option<String>,
    pub text: Option<String>,
}

/// Zips a primary stream with tag-addressed secondary streams.
#[derive(Debug, Clone)]
pub struct StreamAligner<'a> {
    anchor: NaiveDate,
    rating_tag: &'a str,
    date_tag: &'a str,
}

impl<'a> StreamAligner<'a> {
    /// # Arguments
    ///
    /// * `anchor` - Run date that relative dates are resolved against
    /// * `rating_tag` - Kind tag marking the rating element of a group
    /// * `date_tag` - Kind tag marking the date element of a group
    pub fn new(anchor: NaiveDate, rating_tag: &'a str, date_tag: &'a str) -> Self {
        Self {
            anchor,
            rating_tag,
            date_tag,
        }
    }

    /// Align `primary` blocks with their rating/date `groups` and optional `texts`.
    ///
    /// # Returns
    ///
    /// Exactly one row per primary block, in order.
    ///
    /// # Errors
    ///
    /// [`ScrapeError::SchemaMismatch`] when `groups` (or `texts`) does not have
    /// one entry per primary block, when a group carries the same tag twice,
    /// when the date element precedes the rating element, or when a date
    /// cannot be resolved.
    #[instrument(level = "debug", skip_all, fields(rows = primary.len()))]
    pub fn align(
        &self,
        primary: &[String],
        groups: Option<&[TagGroup]>,
        texts: Option<&[String]>,
    ) -> Result<Vec<AlignedRow>> {
        if let Some(groups) = groups {
            if groups.len() != primary.len() {
                return Err(ScrapeError::schema(format!(
                    "{} rating/date groups for {} entries",
                    groups.len(),
                    primary.len()
                )));
            }
        }
        if let Some(texts) = texts {
            if texts.len() != primary.len() {
                return Err(ScrapeError::schema(format!(
                    "{} review texts for {} entries",
                    texts.len(),
                    primary.len()
                )));
            }
        }

        primary
            .iter()
            .enumerate()
            .map(|(i, block)| {
                let PrimaryBlock { name, address } = PrimaryBlock::parse(block);
                let (rating, date) = match groups {
                    Some(groups) => self.read_group(i, &groups[i])?,
                    None => (None, None),
                };
                let text = texts.map(|t| t[i].clone());
                debug!(row = i, %name, ?rating, ?date, "Aligned entry");
                Ok(AlignedRow {
                    name,
                    address,
                    rating,
                    date,
                    text,
                })
            })
            .collect()
    }

    fn read_group(&self, row: usize, group: &[TaggedElement]) -> Result<(Option<String>, Option<String>)> {
        let rating_at = self.sole_position(row, group, self.rating_tag)?;
        let date_at = self.sole_position(row, group, self.date_tag)?;

        if let (Some(r), Some(d)) = (rating_at, date_at) {
            if d <= r {
                return Err(ScrapeError::schema(format!(
                    "entry {row}: date element precedes rating element"
                )));
            }
        }

        let rating = rating_at.map(|r| {
            let el = &group[r];
            el.label.clone().unwrap_or_else(|| el.text.clone())
        });
        let date = date_at
            .map(|d| dates::resolve_formatted(self.anchor, &group[d].text))
            .transpose()?;
        Ok((rating, date))
    }

    fn sole_position(&self, row: usize, group: &[TaggedElement], tag: &str) -> Result<Option<usize>> {
        let positions = group
            .iter()
            .positions(|el| el.has_tag(tag))
            .collect::<Vec<_>>();
        match positions.as_slice() {
            [] => Ok(None),
            [only] => Ok(Some(*only)),
            _ => Err(ScrapeError::schema(format!(
                "entry {row}: tag {tag:?} appears {} times",
                positions.len()
            ))),
        }
    }
}

/// Check detected contribution-type labels against the configured names.
///
/// Labels such as `"Reviews 12"` or `"q&a 0"` are matched on their first
/// whitespace token, case-insensitively, and in order.
pub fn check_contribution_types(expected: &[String], labels: &[String]) -> Result<()> {
    let detected = labels
        .iter()
        .map(|l| l.split_whitespace().next().unwrap_or_default().to_lowercase())
        .collect::<Vec<_>>();
    let wanted = expected.iter().map(|e| e.to_lowercase()).collect::<Vec<_>>();
    if detected == wanted {
        Ok(())
    } else {
        Err(ScrapeError::schema(format!(
            "contribution types [{}] do not match configured [{}]",
            detected.join(", "),
            wanted.join(", ")
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RATING: &str = "kvMYJc";
    const DATE: &str = "rsqaWe";

    fn anchor() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, 31).unwrap()
    }

    fn rating(stars: &str) -> TaggedElement {
        TaggedElement {
            tags: RATING.into(),
            label: Some(stars.into()),
            text: String::new(),
        }
    }

    fn date(text: &str) -> TaggedElement {
        TaggedElement {
            tags: DATE.into(),
            label: None,
            text: text.into(),
        }
    }

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn composite_blocks_split_into_name_and_address() {
        let block = PrimaryBlock::parse("Cafe Uno\n12 Main St\nSpringfield");
        assert_eq!(block.name, "Cafe Uno");
        assert_eq!(block.address, "12 Main St Springfield");
        assert_eq!(PrimaryBlock::parse("Solo").address, "");
    }

    #[test]
    fn missing_attributes_never_shift_later_rows() {
        let aligner = StreamAligner::new(anchor(), RATING, DATE);
        let primary = strings(&["A\naddr a", "B\naddr b", "C\naddr c", "D"]);
        let groups = vec![
            vec![rating("5 stars"), date("1 month ago")],
            vec![date("a week ago")],
            vec![rating("2 stars")],
            vec![],
        ];
        let texts = strings(&["great", "ok", "bad", ""]);

        let rows = aligner.align(&primary, Some(&groups), Some(&texts)).unwrap();

        assert_eq!(rows.len(), 4);
        assert_eq!(rows[0].rating.as_deref(), Some("5 stars"));
        assert_eq!(rows[0].date.as_deref(), Some("31 Dec 2023"));
        assert_eq!(rows[1].rating, None);
        assert_eq!(rows[1].date.as_deref(), Some("24 Jan 2024"));
        assert_eq!(rows[2].rating.as_deref(), Some("2 stars"));
        assert_eq!(rows[2].date, None);
        assert_eq!(rows[3], AlignedRow {
            name: "D".into(),
            address: String::new(),
            rating: None,
            date: None,
            text: Some(String::new()),
        });
        assert_eq!(rows[2].text.as_deref(), Some("bad"));
    }

    #[test]
    fn an_empty_date_text_resolves_to_the_anchor() {
        let aligner = StreamAligner::new(anchor(), RATING, DATE);
        let rows = aligner
            .align(&strings(&["A"]), Some(&[vec![date("")]]), None)
            .unwrap();
        assert_eq!(rows[0].date.as_deref(), Some("31 Jan 2024"));
        assert_eq!(rows[0].text, None);
    }

    #[test]
    fn tags_are_matched_as_whole_class_tokens() {
        let aligner = StreamAligner::new(anchor(), RATING, DATE);
        let group = vec![
            TaggedElement {
                tags: format!("{RATING} fontBody"),
                label: Some("4 stars".into()),
                text: String::new(),
            },
            TaggedElement {
                tags: format!("{DATE}x"),
                label: None,
                text: "2 days ago".into(),
            },
        ];
        let rows = aligner.align(&strings(&["A"]), Some(&[group]), None).unwrap();
        assert_eq!(rows[0].rating.as_deref(), Some("4 stars"));
        assert_eq!(rows[0].date, None);
    }

    #[test]
    fn primary_only_streams_yield_bare_rows() {
        let aligner = StreamAligner::new(anchor(), RATING, DATE);
        let rows = aligner
            .align(&strings(&["Park\nNorth Rd", "Museum"]), None, None)
            .unwrap();
        assert_eq!(rows.len(), 2);
        assert!(rows.iter().all(|r| r.rating.is_none() && r.date.is_none() && r.text.is_none()));
    }

    #[test]
    fn group_count_mismatch_fails_fast() {
        let aligner = StreamAligner::new(anchor(), RATING, DATE);
        let err = aligner
            .align(&strings(&["A", "B"]), Some(&[vec![rating("1 star")]]), None)
            .unwrap_err();
        assert!(matches!(err, ScrapeError::SchemaMismatch(_)));
    }

    #[test]
    fn text_count_mismatch_fails_fast() {
        let aligner = StreamAligner::new(anchor(), RATING, DATE);
        let err = aligner
            .align(&strings(&["A"]), None, Some(&strings(&["x", "y"])))
            .unwrap_err();
        assert!(matches!(err, ScrapeError::SchemaMismatch(_)));
    }

    #[test]
    fn reordered_tags_fail_fast() {
        let aligner = StreamAligner::new(anchor(), RATING, DATE);
        let group = vec![date("a month ago"), rating("3 stars")];
        let err = aligner.align(&strings(&["A"]), Some(&[group]), None).unwrap_err();
        assert!(err.to_string().contains("precedes"));
    }

    #[test]
    fn repeated_tags_fail_fast() {
        let aligner = StreamAligner::new(anchor(), RATING, DATE);
        let group = vec![rating("3 stars"), rating("4 stars")];
        let err = aligner.align(&strings(&["A"]), Some(&[group]), None).unwrap_err();
        assert!(err.to_string().contains("appears 2 times"));
    }

    #[test]
    fn unparseable_dates_are_schema_errors() {
        let aligner = StreamAligner::new(anchor(), RATING, DATE);
        let group = vec![date("Edited last spring")];
        let err = aligner.align(&strings(&["A"]), Some(&[group]), None).unwrap_err();
        assert!(matches!(err, ScrapeError::SchemaMismatch(_)));
    }

    #[test]
    fn contribution_types_match_on_first_token_ignoring_case() {
        let expected = strings(&["Reviews", "Ratings", "Q&A"]);
        let labels = strings(&["reviews 12", "RATINGS 3", "q&a"]);
        assert!(check_contribution_types(&expected, &labels).is_ok());
    }

    #[test]
    fn contribution_type_mismatch_is_rejected() {
        let expected = strings(&["Reviews", "Ratings", "Photos"]);
        let reordered = strings(&["Ratings 3", "Reviews 12", "Photos 1"]);
        let short = strings(&["Reviews 12", "Ratings 3"]);
        let renamed = strings(&["Reviews 12", "Ratings 3", "Pictures 1"]);
        for labels in [reordered, short, renamed] {
            let err = check_contribution_types(&expected, &labels).unwrap_err();
            assert!(matches!(err, ScrapeError::SchemaMismatch(_)));
        }
    }
}
