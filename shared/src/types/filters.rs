use serde::Serialize;

use crate::validator::{Validator, permitted_value};

/// Paging and sorting parameters for list endpoints.
#[derive(Debug, Clone)]
pub struct Filters {
    pub page: i64,
    pub page_size: i64,
    pub sort: String,
    pub sort_safe_list: Vec<String>,
}

/// Pagination metadata; every field is omitted when zero.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Metadata {
    #[serde(skip_serializing_if = "is_zero")]
    pub current_page: i64,
    #[serde(skip_serializing_if = "is_zero")]
    pub page_size: i64,
    #[serde(skip_serializing_if = "is_zero")]
    pub first_page: i64,
    #[serde(skip_serializing_if = "is_zero")]
    pub last_page: i64,
    #[serde(skip_serializing_if = "is_zero")]
    pub total_records: i64,
}

fn is_zero(n: &i64) -> bool {
    *n == 0
}

impl Filters {
    /// Column to sort by, with any leading `-` stripped. `None` when the
    /// sort value is not on the safe list, so it can never reach SQL.
    pub fn sort_column(&self) -> Option<&str> {
        self.sort_safe_list
            .iter()
            .find(|safe| **safe == self.sort)
            .map(|safe| safe.trim_start_matches('-'))
    }

    pub fn sort_direction(&self) -> &'static str {
        if self.sort.starts_with('-') { "DESC" } else { "ASC" }
    }

    pub fn limit(&self) -> i64 {
        self.page_size
    }

    pub fn offset(&self) -> i64 {
        (self.page - 1) * self.page_size
    }
}

pub fn validate_filters(v: &mut Validator, f: &Filters) {
    v.check(f.page > 0, "page", "must be greater than zero");
    v.check(f.page <= 10_000_000, "page", "must be a maximum of 10 million");
    v.check(f.page_size > 0, "page_size", "must be greater than zero");
    v.check(f.page_size <= 100, "page_size", "must be a maximum of 100");

    v.check(
        permitted_value(&f.sort, &f.sort_safe_list),
        "sort",
        "invalid sort value",
    );
}

pub fn calculate_metadata(total_records: i64, page: i64, page_size: i64) -> Metadata {
    if total_records == 0 || page_size <= 0 {
        return Metadata::default();
    }

    Metadata {
        current_page: page,
        page_size,
        first_page: 1,
        last_page: (total_records + page_size - 1) / page_size,
        total_records,
    }
}
