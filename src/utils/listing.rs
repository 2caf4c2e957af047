//! In-memory search, sort and pagination shared by the list endpoints.
//!
//! Handlers push role scope and equality filters into SQL, then hand the
//! fetched rows to [`apply`] so that `total` and `total_pages` always describe
//! the fully filtered set.

use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::cmp::Ordering;
use utoipa::ToSchema;

pub const DEFAULT_PAGE_SIZE: u32 = 10;
pub const MAX_PAGE_SIZE: u32 = 100;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    Asc,
    #[default]
    Desc,
}

/// Value a row exposes for one sort key.
#[derive(Debug, Clone, PartialEq)]
pub enum SortValue<'a> {
    Number(f64),
    Text(Cow<'a, str>),
    Missing,
}

impl SortValue<'_> {
    fn as_lower_text(&self) -> String {
        match self {
            SortValue::Number(n) => n.to_string(),
            SortValue::Text(s) => s.to_lowercase(),
            SortValue::Missing => String::new(),
        }
    }
}

impl<'a> From<&'a str> for SortValue<'a> {
    fn from(value: &'a str) -> Self {
        SortValue::Text(Cow::Borrowed(value))
    }
}

impl<'a> From<Option<&'a str>> for SortValue<'a> {
    fn from(value: Option<&'a str>) -> Self {
        value.map_or(SortValue::Missing, SortValue::from)
    }
}

impl From<f64> for SortValue<'_> {
    fn from(value: f64) -> Self {
        SortValue::Number(value)
    }
}

impl From<Option<f64>> for SortValue<'_> {
    fn from(value: Option<f64>) -> Self {
        value.map_or(SortValue::Missing, SortValue::Number)
    }
}

/// A row that can be searched and sorted by the list endpoints.
pub trait Listable {
    type SortKey: Copy;

    /// Text fields the free-text search looks at.
    fn search_fields(&self) -> Vec<Option<&str>>;

    fn sort_value(&self, key: Self::SortKey) -> SortValue<'_>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pagination {
    pub page: u32,
    pub page_size: u32,
}

impl Pagination {
    pub fn new(page: Option<u32>, page_size: Option<u32>) -> Self {
        Self {
            page: page.unwrap_or(1).max(1),
            page_size: page_size
                .unwrap_or(DEFAULT_PAGE_SIZE)
                .clamp(1, MAX_PAGE_SIZE),
        }
    }

    fn offset(&self) -> usize {
        (self.page as usize - 1) * self.page_size as usize
    }
}

impl Default for Pagination {
    fn default() -> Self {
        Self::new(None, None)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Page<T> {
    pub data: Vec<T>,
    pub total: usize,
    pub page: u32,
    pub page_size: u32,
    pub total_pages: u32,
}

/// Equality filter value, treating `all` and blanks as "no filter".
pub fn equality_filter(value: Option<&str>) -> Option<&str> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty() && !v.eq_ignore_ascii_case("all"))
}

/// Lowercased search needle, or `None` when the term is blank.
pub fn search_needle(term: Option<&str>) -> Option<String> {
    term.map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
}

pub fn matches_search<T: Listable>(row: &T, needle: &str) -> bool {
    row.search_fields()
        .into_iter()
        .flatten()
        .any(|field| field.to_lowercase().contains(needle))
}

pub fn compare_by<T: Listable>(a: &T, b: &T, key: T::SortKey) -> Ordering {
    match (a.sort_value(key), b.sort_value(key)) {
        (SortValue::Number(x), SortValue::Number(y)) => x.partial_cmp(&y).unwrap_or(Ordering::Equal),
        (x, y) => x.as_lower_text().cmp(&y.as_lower_text()),
    }
}

pub fn sort_rows<T: Listable>(rows: &mut [T], key: T::SortKey, order: SortOrder) {
    rows.sort_by(|a, b| match order {
        SortOrder::Asc => compare_by(a, b, key),
        SortOrder::Desc => compare_by(b, a, key),
    });
}

pub fn paginate<T>(rows: Vec<T>, pagination: Pagination) -> Page<T> {
    let total = rows.len();
    let total_pages = total.div_ceil(pagination.page_size as usize) as u32;
    let data = rows
        .into_iter()
        .skip(pagination.offset())
        .take(pagination.page_size as usize)
        .collect();

    Page {
        data,
        total,
        page: pagination.page,
        page_size: pagination.page_size,
        total_pages,
    }
}

/// Keeps only the rows matching the search term.
pub fn search_rows<T: Listable>(mut rows: Vec<T>, search: Option<&str>) -> Vec<T> {
    if let Some(needle) = search_needle(search) {
        rows.retain(|row| matches_search(row, &needle));
    }
    rows
}

/// Search, then sort, then slice.
pub fn apply<T: Listable>(
    rows: Vec<T>,
    search: Option<&str>,
    sort_key: T::SortKey,
    order: SortOrder,
    pagination: Pagination,
) -> Page<T> {
    let mut rows = search_rows(rows, search);
    sort_rows(&mut rows, sort_key, order);
    paginate(rows, pagination)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    struct Row {
        name: &'static str,
        team: Option<&'static str>,
        amount: Option<f64>,
    }

    #[derive(Debug, Clone, Copy)]
    enum Key {
        Name,
        Team,
        Amount,
    }

    impl Listable for Row {
        type SortKey = Key;

        fn search_fields(&self) -> Vec<Option<&str>> {
            vec![Some(self.name), self.team]
        }

        fn sort_value(&self, key: Key) -> SortValue<'_> {
            match key {
                Key::Name => self.name.into(),
                Key::Team => self.team.into(),
                Key::Amount => self.amount.into(),
            }
        }
    }

    fn rows() -> Vec<Row> {
        vec![
            Row { name: "Jane Smith", team: Some("Design"), amount: Some(1200.0) },
            Row { name: "john doe", team: Some("Engineering"), amount: Some(500.0) },
            Row { name: "Mike Johnson", team: None, amount: Some(75.5) },
            Row { name: "Sarah Williams", team: Some("HR"), amount: Some(3000.0) },
            Row { name: "Ann Lee", team: Some("engineering"), amount: Some(9.0) },
        ]
    }

    #[test]
    fn search_is_case_insensitive_substring() {
        let page = apply(rows(), Some("JOHN"), Key::Name, SortOrder::Asc, Pagination::default());
        let names: Vec<_> = page.data.iter().map(|r| r.name).collect();
        assert_eq!(names, vec!["john doe", "Mike Johnson"]);
        assert_eq!(page.total, 2);
    }

    #[test]
    fn search_covers_every_listed_field() {
        let page = apply(rows(), Some("engineer"), Key::Name, SortOrder::Asc, Pagination::default());
        assert_eq!(page.total, 2);
        for row in &page.data {
            assert!(matches_search(row, "engineer"));
        }
    }

    #[test]
    fn blank_search_keeps_everything() {
        let page = apply(rows(), Some("   "), Key::Name, SortOrder::Asc, Pagination::default());
        assert_eq!(page.total, 5);
    }

    #[test]
    fn numeric_sort_is_monotonic_both_ways() {
        let asc = apply(rows(), None, Key::Amount, SortOrder::Asc, Pagination::default());
        let amounts: Vec<f64> = asc.data.iter().map(|r| r.amount.unwrap()).collect();
        assert!(amounts.windows(2).all(|w| w[0] <= w[1]), "{amounts:?}");

        let desc = apply(rows(), None, Key::Amount, SortOrder::Desc, Pagination::default());
        let amounts: Vec<f64> = desc.data.iter().map(|r| r.amount.unwrap()).collect();
        assert!(amounts.windows(2).all(|w| w[0] >= w[1]), "{amounts:?}");
        // 9 < 75.5 < 500 numerically, though not as strings
        assert_eq!(amounts.last(), Some(&9.0));
    }

    #[test]
    fn text_sort_ignores_case() {
        let page = apply(rows(), None, Key::Name, SortOrder::Asc, Pagination::default());
        let names: Vec<_> = page.data.iter().map(|r| r.name).collect();
        assert_eq!(
            names,
            vec!["Ann Lee", "Jane Smith", "john doe", "Mike Johnson", "Sarah Williams"]
        );
    }

    #[test]
    fn missing_values_sort_as_empty_text() {
        let page = apply(rows(), None, Key::Team, SortOrder::Asc, Pagination::default());
        assert_eq!(page.data[0].name, "Mike Johnson");
    }

    #[test]
    fn equal_keys_keep_fetch_order() {
        let page = apply(rows(), None, Key::Team, SortOrder::Asc, Pagination::default());
        let engineering: Vec<_> = page
            .data
            .iter()
            .filter(|r| r.team.map(str::to_lowercase).as_deref() == Some("engineering"))
            .map(|r| r.name)
            .collect();
        assert_eq!(engineering, vec!["john doe", "Ann Lee"]);
    }

    #[test]
    fn pagination_counts_pages_and_caps_page_size() {
        for n in 0..=23usize {
            for size in [1u32, 3, 5, 10] {
                let data: Vec<usize> = (0..n).collect();
                let pagination = Pagination::new(Some(1), Some(size));
                let first = paginate(data.clone(), pagination);
                assert_eq!(first.total, n);
                assert_eq!(first.total_pages as usize, n.div_ceil(size as usize));

                let mut seen = 0;
                for page in 1..=first.total_pages.max(1) {
                    let p = paginate(data.clone(), Pagination::new(Some(page), Some(size)));
                    assert!(p.data.len() <= size as usize);
                    seen += p.data.len();
                }
                assert_eq!(seen, n);
            }
        }
    }

    #[test]
    fn page_past_the_end_is_empty() {
        let page = paginate(vec![1, 2, 3], Pagination::new(Some(5), Some(2)));
        assert!(page.data.is_empty());
        assert_eq!(page.total, 3);
        assert_eq!(page.total_pages, 2);
    }

    #[test]
    fn pagination_clamps_inputs() {
        assert_eq!(Pagination::new(Some(0), Some(0)), Pagination { page: 1, page_size: 1 });
        assert_eq!(Pagination::new(None, Some(1000)).page_size, MAX_PAGE_SIZE);
        assert_eq!(Pagination::new(None, None), Pagination { page: 1, page_size: 10 });
    }

    #[test]
    fn all_means_no_filter() {
        assert_eq!(equality_filter(Some("all")), None);
        assert_eq!(equality_filter(Some("ALL")), None);
        assert_eq!(equality_filter(Some("")), None);
        assert_eq!(equality_filter(None), None);
        assert_eq!(equality_filter(Some(" pending ")), Some("pending"));
    }
}
