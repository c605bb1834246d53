use std::sync::Arc;

use tracing::info;

use crate::db::{DatabaseError, MovieStore, NewMovie};

pub fn demo_movies() -> Vec<NewMovie> {
    vec![
        NewMovie {
            title: "Cyberpunk: Edgerunners".to_string(),
            description: "In a dystopia riddled with corruption and cybernetic implants, a talented but reckless street kid strives to become an edgerunner: a mercenary outlaw.".to_string(),
            poster_path: "https://images.unsplash.com/photo-1536440136628-849c177e76a1?auto=format&fit=crop&q=80&w=800".to_string(),
            video_path: "https://drive.google.com/file/d/FAKE_ID_1/view?usp=sharing".to_string(),
            year: "2077".to_string(),
            views: 1337,
        },
        NewMovie {
            title: "Blade Runner 2049".to_string(),
            description: "Young Blade Runner K's discovery of a long-buried secret leads him to track down former Blade Runner Rick Deckard, who's been missing for thirty years.".to_string(),
            poster_path: "https://images.unsplash.com/photo-1485846234645-a62644f84728?auto=format&fit=crop&q=80&w=800".to_string(),
            video_path: "https://drive.google.com/file/d/FAKE_ID_2/view?usp=sharing".to_string(),
            year: "2049".to_string(),
            views: 892,
        },
    ]
}

/// Inserts the demo catalogue and returns the new ids.
pub async fn seed_movies(store: Arc<dyn MovieStore>) -> Result<Vec<i64>, DatabaseError> {
    let mut ids = Vec::new();
    for movie in demo_movies() {
        let id = store.create_movie(&movie).await?;
        info!("inserted demo movie {} ({})", id, movie.title);
        ids.push(id);
    }
    Ok(ids)
}

#[cfg(all(test, feature = "sqlite"))]
mod tests {
    use super::*;
    use crate::config::DatabaseConfig;
    use crate::db::DatabaseManager;

    #[tokio::test]
    async fn seeds_demo_movies() {
        let dir = tempfile::tempdir().expect("temp dir");
        let db_path = dir.path().join("seed.sqlite");
        let config = DatabaseConfig {
            url: None,
            filename: Some(db_path.to_string_lossy().to_string()),
            max_connections: Some(1),
            min_connections: Some(1),
        };
        let manager = DatabaseManager::new(&config).await.expect("open");
        manager.migrate().await.expect("migrate");

        let ids = seed_movies(manager.movie_store()).await.expect("seed");
        assert_eq!(ids.len(), 2);

        let movies = manager.movie_store().list_movies().await.expect("list");
        assert_eq!(movies.len(), 2);
        assert!(movies.iter().all(|m| m.is_drive_hosted()));
        assert!(movies.iter().any(|m| m.title == "Blade Runner 2049" && m.views == 892));
    }
}
