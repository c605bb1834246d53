diesel::table! {
    movies (id) {
        id -> BigInt,
        title -> Text,
        description -> Text,
        poster_path -> Text,
        video_path -> Text,
        year -> Text,
        views -> BigInt,
        date_added -> Timestamptz,
    }
}

diesel::table! {
    settings (key) {
        key -> Text,
        value -> Text,
    }
}

diesel::allow_tables_to_appear_in_same_query!(movies, settings);
