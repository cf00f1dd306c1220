use std::sync::OnceLock;

use regex::Regex;

fn slug_strip() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[^0-9A-Za-z _-]").unwrap())
}

/// Build the URL-safe alternate key of a movie: the title stripped of
/// anything but letters, digits, spaces, dashes and underscores, lowercased,
/// spaces turned into dashes, followed by the year.
pub fn make_slug(title: &str, year_of_release: i32) -> String {
    let cleaned = slug_strip().replace_all(title, "");
    format!(
        "{}-{}",
        cleaned.to_lowercase().replace(' ', "-"),
        year_of_release
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_make_slug() {
        assert_eq!(make_slug("Nick the Greek", 2023), "nick-the-greek-2023");
        assert_eq!(make_slug("Alien", 1979), "alien-1979");
        assert_eq!(make_slug("Amélie: Le Fabuleux Destin!", 2001), "amlie-le-fabuleux-destin-2001");
        assert_eq!(make_slug("Spider-Man_2", 2004), "spider-man_2-2004");
    }
}
