// Table definitions for the crawler store.
// Timestamps are stored as RFC 3339 TEXT; booleans as INTEGER 0/1.

diesel::table! {
    sources (site_name) {
        site_name -> Text,
        base_url -> Text,
        is_active -> Integer,
        crawl_interval_secs -> Integer,
        last_crawl_at -> Nullable<Text>,
        created_at -> Text,
        updated_at -> Text,
    }
}

diesel::table! {
    articles (id) {
        id -> Text,
        url_hash -> Text,
        title -> Text,
        content -> Text,
        source_site -> Text,
        source_url -> Text,
        metadata -> Text,
        crawl_timestamp -> Text,
        is_processed -> Integer,
    }
}

diesel::table! {
    crawl_logs (id) {
        id -> Text,
        site_name -> Text,
        status -> Text,
        start_time -> Text,
        end_time -> Nullable<Text>,
        duration_ms -> Nullable<BigInt>,
        articles_found -> Integer,
        articles_saved -> Integer,
        articles_skipped -> Integer,
        article_ids -> Text,
        error_message -> Nullable<Text>,
    }
}

diesel::allow_tables_to_appear_in_same_query!(sources, articles, crawl_logs);
