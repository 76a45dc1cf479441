use std::{
    collections::HashMap,
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
};

use tokio::sync::Notify;

use super::*;

/// Loader whose calls block until released, recording every key it sees.
#[derive(Clone, Default)]
struct GatedLoader {
    calls: Arc<Mutex<Vec<&'static str>>>,
    release: Arc<Notify>,
    count: Arc<AtomicUsize>,
}

impl GatedLoader {
    fn calls(&self) -> Vec<&'static str> {
        self.calls.lock().expect("calls lock").clone()
    }
}

/// Value type whose identity can be checked with `Arc::ptr_eq`.
type Value = Arc<String>;

fn aliasing_cache(
    loader: &GatedLoader,
    aliases: HashMap<&'static str, Vec<&'static str>>,
) -> AliasCache<&'static str, Value> {
    let gate = loader.clone();
    AliasCache::with_aliases(
        move |key: &'static str| {
            let gate = gate.clone();
            async move {
                gate.calls.lock().expect("calls lock").push(key);
                gate.count.fetch_add(1, Ordering::SeqCst);
                gate.release.notified().await;
                Ok(Arc::new(format!("value-of-{key}")))
            }
        },
        move |key: &&'static str, _value: &Value| aliases.get(key).cloned().unwrap_or_default(),
    )
}

#[tokio::test]
async fn concurrent_gets_share_one_load() {
    let loader = GatedLoader::default();
    let cache = aliasing_cache(&loader, HashMap::new());

    let first = cache.get("k");
    let second = cache.get("k");
    tokio::task::yield_now().await;
    assert_eq!(loader.count.load(Ordering::SeqCst), 1);

    loader.release.notify_one();
    let (a, b) = tokio::join!(first, second);
    let (a, b) = (a.expect("first resolves"), b.expect("second resolves"));
    assert!(Arc::ptr_eq(&a, &b));
    assert_eq!(loader.calls(), vec!["k"]);

    let third = cache.get("k").await.expect("resolved entry is reused");
    assert!(Arc::ptr_eq(&a, &third));
    assert_eq!(cache.stats().loads, 1);
}

#[tokio::test]
async fn alias_requested_mid_flight_is_merged_without_load() {
    let loader = GatedLoader::default();
    let cache = aliasing_cache(&loader, HashMap::from([("A", vec!["B", "C"])]));

    let a = cache.get("A");
    tokio::task::yield_now().await;
    let b = cache.get("B");
    tokio::task::yield_now().await;
    assert!(!cache.is_resolved(&"B"));

    loader.release.notify_one();
    let (a, b) = tokio::join!(a, b);
    let (a, b) = (a.expect("A resolves"), b.expect("B resolves"));
    assert!(Arc::ptr_eq(&a, &b), "alias must resolve to the identical value");
    assert_eq!(loader.calls(), vec!["A"]);

    // C was never requested but is now served straight from the cache.
    assert!(cache.is_resolved(&"C"));
    let c = cache.get("C").await.expect("C resolves");
    assert!(Arc::ptr_eq(&a, &c));

    tokio::task::yield_now().await;
    let stats = cache.stats();
    assert_eq!(stats.loads, 1);
    assert_eq!(stats.alias_merges, 1);
    assert_eq!(stats.alias_inserts, 1);
}

#[tokio::test]
async fn parked_key_loads_once_slot_frees_when_not_an_alias() {
    let loader = GatedLoader::default();
    let cache = aliasing_cache(&loader, HashMap::from([("A", vec!["B"])]));

    let a = cache.get("A");
    let z = cache.get("Z");
    tokio::task::yield_now().await;
    assert_eq!(loader.calls(), vec!["A"]);

    loader.release.notify_one();
    a.await.expect("A resolves");
    tokio::task::yield_now().await;
    assert_eq!(loader.calls(), vec!["A", "Z"]);

    loader.release.notify_one();
    assert_eq!(*z.await.expect("Z resolves"), "value-of-Z");
}

#[tokio::test]
async fn late_alias_of_started_load_collapses_into_first_result() {
    let loader = GatedLoader::default();
    let cache = aliasing_cache(&loader, HashMap::from([("A", vec!["B"])]));
    cache.set_max_in_flight(2);

    let a = cache.get("A");
    let b = cache.get("B");
    tokio::task::yield_now().await;
    assert_eq!(loader.count.load(Ordering::SeqCst), 2);

    // Release A first; B's own load result arrives later and is ignored.
    loader.release.notify_one();
    let a = a.await.expect("A resolves");
    let b = b.await.expect("B resolves");
    assert!(Arc::ptr_eq(&a, &b));
    assert_eq!(*b, "value-of-A");

    loader.release.notify_one();
    tokio::task::yield_now().await;
    tokio::task::yield_now().await;
    let again = cache.get("B").await.expect("B stays resolved");
    assert!(Arc::ptr_eq(&a, &again));
}

#[tokio::test]
async fn failed_load_is_not_cached() {
    let attempts = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&attempts);
    let cache: AliasCache<&'static str, u32> = AliasCache::new(move |_key: &'static str| {
        let attempt = counter.fetch_add(1, Ordering::SeqCst);
        async move {
            if attempt == 0 {
                Err(LookupError::NotReady)
            } else {
                Ok(7)
            }
        }
    });

    let first = cache.get("X").await;
    assert_eq!(first, Err(LookupError::NotReady));
    assert!(!cache.contains(&"X"));

    let second = cache.get("X").await;
    assert_eq!(second, Ok(7));
    assert_eq!(attempts.load(Ordering::SeqCst), 2);
    assert_eq!(cache.stats().failures, 1);
}

#[tokio::test]
async fn every_waiter_sees_the_same_failure() {
    let cache: AliasCache<u8, u8> = AliasCache::new(|_key: u8| async {
        tokio::task::yield_now().await;
        Err(LookupError::UnsupportedInput("binary".to_string()))
    });

    let (a, b) = tokio::join!(cache.get(1), cache.get(1));
    assert_eq!(a, b);
    assert!(a.expect_err("load fails").is_unsupported());
}

#[tokio::test]
async fn panicking_loader_rejects_instead_of_hanging() {
    let cache: AliasCache<u8, u8> = AliasCache::new(|key: u8| async move {
        if key == 0 {
            panic!("loader bug");
        }
        Ok(key)
    });

    let error = cache.get(0).await.expect_err("panic surfaces as an error");
    assert!(matches!(error, LookupError::Backend { .. }));
    assert_eq!(cache.get(3).await, Ok(3));
}

#[tokio::test]
async fn clear_abandons_pending_waiters() {
    let loader = GatedLoader::default();
    let cache = aliasing_cache(&loader, HashMap::new());

    let pending = cache.get("k");
    tokio::task::yield_now().await;
    cache.clear();
    assert!(cache.is_empty());
    assert!(pending.await.is_err());

    loader.release.notify_one();
    tokio::task::yield_now().await;
    assert!(!cache.contains(&"k"));
}

#[tokio::test(start_paused = true)]
async fn hung_load_times_out_without_starving_other_keys() {
    let loads = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&loads);
    let cache: AliasCache<u8, u8> = AliasCache::new(move |key: u8| {
        counter.fetch_add(1, Ordering::SeqCst);
        async move {
            if key == 0 {
                std::future::pending::<()>().await;
            }
            Ok(key)
        }
    });
    cache.set_load_timeout(Some(Duration::from_millis(500)));

    let hung = cache.get(0);
    let unrelated = tokio::time::timeout(Duration::from_secs(2), cache.get(7))
        .await
        .expect("unrelated key is loaded once the hung load gives up");
    assert_eq!(unrelated, Ok(7));
    assert_eq!(
        hung.await,
        Err(LookupError::TimedOut {
            after_ms: 500
        })
    );
    assert!(!cache.contains(&0));
    assert_eq!(loads.load(Ordering::SeqCst), 2);
    assert_eq!(cache.stats().failures, 1);
}

#[tokio::test]
async fn panicking_alias_extraction_releases_the_load_slot() {
    let cache: AliasCache<u8, u8> = AliasCache::with_aliases(
        |key: u8| async move { Ok(key) },
        |key: &u8, _value: &u8| {
            if *key == 0 {
                panic!("extract bug");
            }
            Vec::new()
        },
    );

    assert_eq!(cache.get(0).await, Ok(0));
    let next = tokio::time::timeout(Duration::from_secs(1), cache.get(5)).await.expect("slot was released");
    assert_eq!(next, Ok(5));
    assert!(cache.is_resolved(&0));
}
