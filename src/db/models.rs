use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Movie {
    pub id: i64,
    pub title: String,
    pub description: String,
    /// Local file name, Supabase public URL, or the default poster name.
    pub poster_path: String,
    /// Local file name inside the uploads directory, or a Drive share link.
    pub video_path: String,
    pub year: String,
    pub views: i64,
    pub date_added: DateTime<Utc>,
}

impl Movie {
    pub fn is_drive_hosted(&self) -> bool {
        self.video_path.contains("drive.google.com")
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewMovie {
    pub title: String,
    pub description: String,
    pub poster_path: String,
    pub video_path: String,
    pub year: String,
    #[serde(default)]
    pub views: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MovieUpdate {
    pub title: String,
    pub description: String,
    pub year: String,
}
