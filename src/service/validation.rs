use chrono::Datelike;
use serde::{Deserialize, Serialize};

use crate::db::{ListOptions, Movie};

pub const ACCEPTABLE_SORT_FIELDS: &[&str] = &["title", "yearofrelease"];
pub const MAX_PAGE_SIZE: u32 = 25;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationFailure {
    pub property_name: String,
    pub message: String,
}

impl ValidationFailure {
    pub fn new(property_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            property_name: property_name.into(),
            message: message.into(),
        }
    }
}

pub fn current_year() -> i32 {
    chrono::Utc::now().year()
}

pub fn validate_movie(movie: &Movie, current_year: i32) -> Vec<ValidationFailure> {
    let mut failures = Vec::new();

    if movie.title.trim().is_empty() {
        failures.push(ValidationFailure::new("Title", "'Title' must not be empty."));
    }
    if movie.year_of_release > current_year {
        failures.push(ValidationFailure::new(
            "YearOfRelease",
            format!("'Year Of Release' must be less than or equal to '{}'.", current_year),
        ));
    }
    if movie.genres.is_empty() {
        failures.push(ValidationFailure::new("Genres", "'Genres' must not be empty."));
    }

    failures
}

pub fn validate_list_options(options: &ListOptions, current_year: i32) -> Vec<ValidationFailure> {
    let mut failures = Vec::new();

    if let Some(year) = options.year_of_release {
        if year > current_year {
            failures.push(ValidationFailure::new(
                "YearOfRelease",
                format!("'Year Of Release' must be less than or equal to '{}'.", current_year),
            ));
        }
    }
    if let Some(ref field) = options.sort_field {
        if !ACCEPTABLE_SORT_FIELDS
            .iter()
            .any(|f| f.eq_ignore_ascii_case(field))
        {
            failures.push(ValidationFailure::new(
                "SortField",
                "You can only sort by 'title' or 'yearofrelease'",
            ));
        }
    }
    if options.page < 1 {
        failures.push(ValidationFailure::new(
            "Page",
            "'Page' must be greater than or equal to '1'.",
        ));
    }
    if options.page_size < 1 || options.page_size > MAX_PAGE_SIZE {
        failures.push(ValidationFailure::new(
            "PageSize",
            format!("You can get between 1 and {} movies per page", MAX_PAGE_SIZE),
        ));
    }

    failures
}

pub fn validate_rating(rating: i32) -> Vec<ValidationFailure> {
    if (1..=5).contains(&rating) {
        Vec::new()
    } else {
        vec![ValidationFailure::new("Rating", "Rating must be between 1 and 5")]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn movie(title: &str, year: i32, genres: &[&str]) -> Movie {
        Movie {
            id: Uuid::new_v4(),
            title: title.to_string(),
            year_of_release: year,
            genres: genres.iter().map(|g| g.to_string()).collect(),
            rating: None,
            user_rating: None,
        }
    }

    #[test]
    fn test_valid_movie() {
        assert!(validate_movie(&movie("Heat", 1995, &["Crime"]), 2026).is_empty());
    }

    #[test]
    fn test_invalid_movie_reports_every_field() {
        let failures = validate_movie(&movie("  ", 2030, &[]), 2026);
        let props: Vec<_> = failures.iter().map(|f| f.property_name.as_str()).collect();
        assert_eq!(props, vec!["Title", "YearOfRelease", "Genres"]);
    }

    #[test]
    fn test_list_options() {
        let ok = ListOptions {
            sort_field: Some("YearOfRelease".to_string()),
            ..ListOptions::default()
        };
        assert!(validate_list_options(&ok, 2026).is_empty());

        let bad = ListOptions {
            sort_field: Some("rating".to_string()),
            page: 0,
            page_size: 26,
            year_of_release: Some(2100),
            ..ListOptions::default()
        };
        let props: Vec<_> = validate_list_options(&bad, 2026)
            .into_iter()
            .map(|f| f.property_name)
            .collect();
        assert_eq!(props, vec!["YearOfRelease", "SortField", "Page", "PageSize"]);
    }

    #[test]
    fn test_rating_range() {
        assert!(validate_rating(1).is_empty());
        assert!(validate_rating(5).is_empty());
        assert_eq!(validate_rating(0).len(), 1);
        assert_eq!(validate_rating(6)[0].property_name, "Rating");
    }
}
