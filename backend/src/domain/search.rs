//! Request search criteria.
//!
//! A search is a conjunction of typed filters over an enumerated field set.
//! Persistence adapters compile the filters into bound queries; the
//! [`RequestSearch::matches`] predicate gives the same semantics in memory.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::classification::Device;
use super::error::FieldErrors;
use super::imei::NormalizedImei;
use super::request::{CaseStatus, Request};

/// Default page size.
pub const DEFAULT_LIMIT: i64 = 20;
/// Largest page a caller may request.
pub const MAX_LIMIT: i64 = 100;

/// One search filter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "field", content = "value", rename_all = "snake_case")]
pub enum RequestFilter {
    /// Exact tracking id.
    TrackingId(Uuid),
    /// Exact case status.
    Status(CaseStatus),
    /// Creation time within `[from, to]`; either bound may be open.
    CreatedAt {
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
    },
    /// Case-insensitive substring of the submitter's name.
    UserName(String),
    /// Exact normalised IMEI held by one of the request's devices.
    Imei(NormalizedImei),
    /// Any of the listed brands.
    Brand(Vec<String>),
}

/// Paged request search.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestSearch {
    /// Restrict results to one submitter; reviewers search every request.
    pub submitter_id: Option<String>,
    pub filters: Vec<RequestFilter>,
    pub limit: i64,
    pub offset: i64,
}

impl Default for RequestSearch {
    fn default() -> Self {
        Self {
            submitter_id: None,
            filters: Vec::new(),
            limit: DEFAULT_LIMIT,
            offset: 0,
        }
    }
}

impl RequestSearch {
    /// Add a filter.
    pub fn with(mut self, filter: RequestFilter) -> Self {
        self.filters.push(filter);
        self
    }

    /// Restrict to one submitter.
    pub fn for_submitter(mut self, submitter_id: impl Into<String>) -> Self {
        self.submitter_id = Some(submitter_id.into());
        self
    }

    /// Set the page window.
    pub fn page(mut self, limit: i64, offset: i64) -> Self {
        self.limit = limit;
        self.offset = offset;
        self
    }

    /// Check the page window and filter values.
    pub fn validate(&self) -> Result<(), FieldErrors> {
        let mut errors = FieldErrors::new();
        if !(1..=MAX_LIMIT).contains(&self.limit) {
            errors.insert(
                "limit".to_owned(),
                format!("limit must be between 1 and {MAX_LIMIT}"),
            );
        }
        if self.offset < 0 {
            errors.insert("offset".to_owned(), "offset must not be negative".to_owned());
        }
        for filter in &self.filters {
            match filter {
                RequestFilter::CreatedAt {
                    from: Some(from),
                    to: Some(to),
                } if from > to => {
                    errors.insert(
                        "created_at".to_owned(),
                        "range start must not be after its end".to_owned(),
                    );
                }
                RequestFilter::Brand(brands) if brands.is_empty() => {
                    errors.insert("brand".to_owned(), "list at least one brand".to_owned());
                }
                RequestFilter::UserName(name) if name.trim().is_empty() => {
                    errors.insert("user_name".to_owned(), "name must not be empty".to_owned());
                }
                _ => {}
            }
        }
        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Whether `request` with its `devices` satisfies every filter.
    pub fn matches(&self, request: &Request, devices: &[Device]) -> bool {
        if self
            .submitter_id
            .as_ref()
            .is_some_and(|id| *id != request.submitter.id)
        {
            return false;
        }
        self.filters
            .iter()
            .all(|filter| filter_matches(filter, request, devices))
    }
}

fn filter_matches(filter: &RequestFilter, request: &Request, devices: &[Device]) -> bool {
    match filter {
        RequestFilter::TrackingId(tracking_id) => request.tracking_id == *tracking_id,
        RequestFilter::Status(status) => request.case_status == *status,
        RequestFilter::CreatedAt { from, to } => {
            from.is_none_or(|from| request.created_at >= from)
                && to.is_none_or(|to| request.created_at <= to)
        }
        RequestFilter::UserName(name) => request
            .submitter
            .name
            .to_lowercase()
            .contains(&name.to_lowercase()),
        RequestFilter::Imei(imei) => devices
            .iter()
            .flat_map(|device| &device.imeis)
            .any(|record| record.normalized == *imei),
        RequestFilter::Brand(brands) => devices.iter().any(|device| {
            brands
                .iter()
                .any(|brand| brand.eq_ignore_ascii_case(&device.description.brand))
        }),
    }
}

/// One page of search results.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestPage {
    pub items: Vec<Request>,
    pub total: i64,
    pub limit: i64,
    pub offset: i64,
}

#[cfg(test)]
mod tests {
    //! Regression coverage for search criteria.

    use rstest::rstest;

    use super::*;
    use crate::domain::request::{Actor, RequestDraft, RequestKind};

    fn request(name: &str) -> Request {
        Request::open(
            RequestDraft {
                kind: RequestKind::Registration,
                submitter: Actor::new("user-1", name),
                device_count: 1,
                imeis_per_device: 1,
                reason: None,
                file_name: "imeis.txt".to_owned(),
            },
            Utc::now(),
        )
    }

    #[rstest]
    #[case(0, 0, true)]
    #[case(101, 0, true)]
    #[case(20, -1, true)]
    #[case(20, 0, false)]
    fn page_window_is_validated(#[case] limit: i64, #[case] offset: i64, #[case] fails: bool) {
        let search = RequestSearch::default().page(limit, offset);
        assert_eq!(search.validate().is_err(), fails);
    }

    #[rstest]
    fn user_name_matches_case_insensitive_substrings() {
        let search = RequestSearch::default().with(RequestFilter::UserName("LOVE".to_owned()));
        assert!(search.matches(&request("Ada Lovelace"), &[]));
        assert!(!search.matches(&request("Grace Hopper"), &[]));
    }

    #[rstest]
    fn submitter_scope_is_applied() {
        let search = RequestSearch::default().for_submitter("someone-else");
        assert!(!search.matches(&request("Ada"), &[]));
    }

    #[rstest]
    fn inverted_date_range_is_rejected() {
        let now = Utc::now();
        let search = RequestSearch::default().with(RequestFilter::CreatedAt {
            from: Some(now),
            to: Some(now - chrono::TimeDelta::days(1)),
        });
        let errors = search.validate().expect_err("inverted range");
        assert!(errors.contains_key("created_at"));
    }
}
