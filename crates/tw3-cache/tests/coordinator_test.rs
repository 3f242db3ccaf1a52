use std::time::Duration;

use pretty_assertions::assert_eq;
use tokio::time::advance;
use tw3_cache::{CacheConfig, CacheCoordinator, CoordinatorConfig, NewsQuery};

fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("tw3_cache=debug")
        .with_test_writer()
        .try_init();
}

fn query(text: &str) -> NewsQuery {
    NewsQuery::new(text, "2024-05-01", "publishedAt", 5)
}

#[tokio::test(start_paused = true)]
async fn test_news_round_trip_with_normalized_query() {
    init_test_tracing();
    let coordinator = CacheCoordinator::default();

    coordinator.set_news(&query("  Élections Europe "), "articles");
    assert_eq!(
        coordinator.get_news(&query("élections europe")),
        Some("articles".to_string())
    );
    assert_eq!(coordinator.get_news(&query("autre sujet")), None);
}

#[tokio::test(start_paused = true)]
async fn test_news_written_with_short_ttl() {
    let coordinator = CacheCoordinator::default();
    coordinator.set_news(&query("climat"), "articles");

    // Stored for 15 minutes, not the 30 minute cache default
    advance(Duration::from_secs(15 * 60)).await;
    assert!(coordinator.get_news(&query("climat")).is_some());
    advance(Duration::from_secs(1)).await;
    assert!(coordinator.get_news(&query("climat")).is_none());
}

#[tokio::test(start_paused = true)]
async fn test_model_responses_keyed_by_prompt() {
    let coordinator = CacheCoordinator::default();
    coordinator.set_response("Résume l'actualité", "Voici le résumé");

    assert_eq!(
        coordinator.get_response("Résume l'actualité"),
        Some("Voici le résumé".to_string())
    );
    assert_eq!(coordinator.get_response("Résume l'actualité "), None);

    advance(Duration::from_secs(2 * 60 * 60 + 1)).await;
    assert_eq!(coordinator.get_response("Résume l'actualité"), None);
}

#[tokio::test(start_paused = true)]
async fn test_global_stats_memory_estimate() {
    let coordinator = CacheCoordinator::default();
    let empty = coordinator.global_stats();
    assert_eq!(empty.total_memory_usage, "0 B");

    coordinator.set_news(&query("a"), "x");
    coordinator.set_news(&query("b"), "y");
    coordinator.set_response("prompt", "response");

    let stats = coordinator.global_stats();
    assert_eq!(stats.total_memory_bytes, 2 * 2048 + 4096);
    assert_eq!(stats.total_memory_usage, "8.0 KB");
    assert_eq!(stats.news_cache.size, 2);
    assert_eq!(stats.news_cache.max_size, 500);
    assert_eq!(stats.model_cache.size, 1);
    assert_eq!(stats.model_cache.max_size, 200);

    let json = serde_json::to_value(&stats).unwrap();
    assert_eq!(json["total_memory_usage"], "8.0 KB");
    assert_eq!(json["news_cache"]["hit_rate"], 0.0);
}

#[tokio::test(start_paused = true)]
async fn test_clear_all() {
    let coordinator = CacheCoordinator::default();
    coordinator.set_news(&query("a"), "x");
    coordinator.set_response("prompt", "response");
    coordinator.get_response("prompt");

    coordinator.clear_all();

    assert_eq!(coordinator.news_stats().size, 0);
    assert_eq!(coordinator.model_stats().size, 0);
    assert_eq!(coordinator.model_stats().hits, 1);
}

#[tokio::test(start_paused = true)]
async fn test_sweep_now_removes_unread_expired_entries() {
    let coordinator = CacheCoordinator::default();
    coordinator.set_news(&query("a"), "x");
    coordinator.set_response("prompt", "response");

    advance(Duration::from_secs(16 * 60)).await;
    assert_eq!(coordinator.sweep_now(), (1, 0));
    assert_eq!(coordinator.sweep_now(), (0, 0));
    assert_eq!(coordinator.model_stats().size, 1);
}

#[tokio::test(start_paused = true)]
async fn test_background_sweep_runs_and_stops() {
    init_test_tracing();
    let coordinator = CacheCoordinator::new(CoordinatorConfig {
        news: CacheConfig {
            max_size: 10,
            default_ttl_ms: 1_000,
        },
        news_write_ttl_ms: 1_000,
        model: CacheConfig {
            max_size: 10,
            default_ttl_ms: 1_000,
        },
        sweep_interval_ms: 5_000,
    });

    assert!(coordinator.start_sweep());
    assert!(!coordinator.start_sweep(), "second start is a no-op");
    assert!(coordinator.is_sweeping());

    coordinator.set_news(&query("a"), "x");
    coordinator.set_response("prompt", "response");

    // Let the first tick fire; nothing reads the entries in between
    tokio::time::sleep(Duration::from_millis(5_100)).await;
    assert_eq!(coordinator.news_stats().size, 0);
    assert_eq!(coordinator.model_stats().size, 0);
    assert_eq!(coordinator.news_stats().misses, 0);

    coordinator.stop_sweep().await;
    assert!(!coordinator.is_sweeping());

    // Stopped: expired entries are no longer removed proactively
    coordinator.set_news(&query("b"), "y");
    tokio::time::sleep(Duration::from_secs(20)).await;
    assert_eq!(coordinator.news_stats().size, 1);
}

#[tokio::test]
async fn test_stop_without_start_is_noop() {
    let coordinator = CacheCoordinator::default();
    coordinator.stop_sweep().await;
    assert!(!coordinator.is_sweeping());
}
