use async_trait::async_trait;

use super::DatabaseError;
use super::models::{Movie, MovieUpdate, NewMovie};

/// Settings key holding the serialized Drive OAuth token.
pub const DRIVE_TOKEN_KEY: &str = "drive_token";

#[async_trait]
pub trait MovieStore: Send + Sync {
    async fn list_movies(&self) -> Result<Vec<Movie>, DatabaseError>;
    async fn get_movie(&self, id: i64) -> Result<Option<Movie>, DatabaseError>;
    async fn create_movie(&self, movie: &NewMovie) -> Result<i64, DatabaseError>;
    async fn update_movie(&self, id: i64, update: &MovieUpdate) -> Result<usize, DatabaseError>;
    async fn increment_views(&self, id: i64) -> Result<usize, DatabaseError>;
    async fn delete_movie(&self, id: i64) -> Result<usize, DatabaseError>;
    async fn find_by_title_pattern(&self, pattern: &str) -> Result<Vec<Movie>, DatabaseError>;
}

#[async_trait]
pub trait SettingsStore: Send + Sync {
    async fn get_setting(&self, key: &str) -> Result<Option<String>, DatabaseError>;
    async fn set_setting(&self, key: &str, value: &str) -> Result<(), DatabaseError>;
    async fn delete_setting(&self, key: &str) -> Result<(), DatabaseError>;
}

/// Escape character used with `LIKE ... ESCAPE` in substring searches.
pub const LIKE_ESCAPE: char = '\\';

/// Builds a `LIKE` pattern matching `needle` literally anywhere in the value.
pub fn substring_pattern(needle: &str) -> String {
    let mut pattern = String::with_capacity(needle.len() + 2);
    pattern.push('%');
    for c in needle.chars() {
        if matches!(c, '%' | '_' | LIKE_ESCAPE) {
            pattern.push(LIKE_ESCAPE);
        }
        pattern.push(c);
    }
    pattern.push('%');
    pattern
}

#[cfg(test)]
mod tests {
    use test_case::test_case;

    use super::substring_pattern;

    #[test_case("Test Movie", "%Test Movie%"; "plain text")]
    #[test_case("%", "%\\%%"; "percent")]
    #[test_case("a_b", "%a\\_b%"; "underscore")]
    #[test_case("c:\\dir", "%c:\\\\dir%"; "backslash")]
    fn wildcards_are_escaped(needle: &str, expected: &str) {
        assert_eq!(substring_pattern(needle), expected);
    }
}
