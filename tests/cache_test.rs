use adaptive_engine::cache::{fingerprint, ResponseCache};
use std::time::Duration;

fn cache(capacity: usize) -> ResponseCache {
    ResponseCache::new(capacity, Duration::from_secs(5 * 60))
}

#[tokio::test(start_paused = true)]
async fn test_entry_expires_after_ttl() {
    let cache = cache(10);
    cache.set("k".to_string(), "v".to_string());
    assert_eq!(cache.get("k").as_deref(), Some("v"), "fresh entry should hit");

    tokio::time::advance(Duration::from_secs(6 * 60)).await;
    assert_eq!(cache.get("k"), None, "entry older than the TTL should miss");
    assert!(cache.is_empty(), "expired entry should be evicted on read");
}

#[tokio::test(start_paused = true)]
async fn test_entry_survives_until_ttl() {
    let cache = cache(10);
    cache.set("k".to_string(), "v".to_string());
    tokio::time::advance(Duration::from_secs(4 * 60)).await;
    assert_eq!(cache.get("k").as_deref(), Some("v"));
}

#[tokio::test]
async fn test_least_recently_used_is_evicted() {
    let cache = cache(2);
    cache.set("a".to_string(), "1".to_string());
    cache.set("b".to_string(), "2".to_string());
    assert!(cache.get("a").is_some(), "touch a so b becomes least recent");

    cache.set("c".to_string(), "3".to_string());
    assert_eq!(cache.len(), 2);
    assert!(cache.get("b").is_none(), "b was least recently used");
    assert!(cache.get("a").is_some());
    assert!(cache.get("c").is_some());
}

#[tokio::test]
async fn test_untouched_oldest_is_evicted() {
    let cache = cache(2);
    cache.set("a".to_string(), "1".to_string());
    cache.set("b".to_string(), "2".to_string());
    cache.set("c".to_string(), "3".to_string());
    assert!(cache.get("a").is_none());
    assert!(cache.get("b").is_some());
}

#[tokio::test]
async fn test_overwriting_existing_key_does_not_evict() {
    let cache = cache(2);
    cache.set("a".to_string(), "1".to_string());
    cache.set("b".to_string(), "2".to_string());
    cache.set("a".to_string(), "updated".to_string());
    assert_eq!(cache.len(), 2);
    assert_eq!(cache.get("a").as_deref(), Some("updated"));
    assert!(cache.get("b").is_some());
}

#[tokio::test(start_paused = true)]
async fn test_clear_expired_sweeps_only_old_entries() {
    let cache = cache(10);
    cache.set("old-1".to_string(), "x".to_string());
    cache.set("old-2".to_string(), "x".to_string());
    tokio::time::advance(Duration::from_secs(4 * 60)).await;
    cache.set("new".to_string(), "x".to_string());
    tokio::time::advance(Duration::from_secs(2 * 60)).await;

    assert_eq!(cache.clear_expired(), 2);
    assert_eq!(cache.len(), 1);
    assert!(cache.get("new").is_some());
}

#[tokio::test]
async fn test_stats_track_hits() {
    let cache = cache(10);
    assert_eq!(cache.stats().size, 0);
    assert!(cache.stats().oldest.is_none());

    cache.set("a".to_string(), "1".to_string());
    cache.set("b".to_string(), "2".to_string());
    cache.get("a");
    cache.get("a");
    cache.get("b");
    cache.get("missing");

    let stats = cache.stats();
    assert_eq!(stats.size, 2);
    assert_eq!(stats.total_hits, 3);
    assert_eq!(stats.average_hits, 1.5);
    assert!(stats.oldest.is_some());
}

#[tokio::test]
async fn test_disabled_cache_always_misses() {
    let cache = ResponseCache::disabled();
    cache.set("a".to_string(), "1".to_string());
    assert!(cache.get("a").is_none());
    assert_eq!(cache.clear_expired(), 0);
    assert_eq!(cache.stats().size, 0);
}

#[test]
fn test_keys_ignore_case_and_spacing() {
    assert_eq!(
        ResponseCache::key("Algebra", "  What is  x? ", "USER"),
        ResponseCache::key("algebra", "what is x?", "user")
    );
    assert_ne!(
        ResponseCache::key("algebra", "q", fingerprint("prompt one").as_str()),
        ResponseCache::key("algebra", "q", fingerprint("prompt two").as_str())
    );
}
