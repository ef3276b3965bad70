use std::sync::Arc;
use std::time::Duration;

use vb_cache::mock::VBMemoryRemote;
use vb_cache::prelude::*;
use vb_cache::vb_map;

type Result<T = ()> = std::result::Result<T, Box<dyn std::error::Error>>;

struct StaticIdentities;

impl VBIdentityResolver for StaticIdentities {
    fn identity_of(&self, raw: &str) -> Option<i64> {
        match raw {
            "Player1" => Some(1),
            "Player2" => Some(2),
            _ => None,
        }
    }
}

fn cache_over(remote: &Arc<VBMemoryRemote>) -> Result<Arc<VBCache<VBMemoryRemote>>> {
    Ok(VBCache::builder()
        .remote(Arc::clone(remote))
        .identity(Arc::new(StaticIdentities))
        .attempt_delay(Duration::from_millis(1))
        .autosave_interval(Duration::ZERO)
        .build()?)
}

#[tokio::test]
async fn resolve_returns_one_shared_instance() -> Result {
    let remote = Arc::new(VBMemoryRemote::new());
    let cache = cache_over(&remote)?;

    let first = cache.resolve("Player1").await?;
    let again = cache.resolve("Player1").await?;
    assert!(Arc::ptr_eq(&first, &again), "same identifier must share one entry");

    // The rewritten spelling lands on the same entry as the raw one.
    let aliased = cache.resolve("User1").await?;
    assert!(Arc::ptr_eq(&first, &aliased));
    assert_eq!(first.identity_id(), Some(1));

    // A different scope is an independent entry.
    let scoped = cache.resolve_in("Player1", Some("arena")).await?;
    assert!(!Arc::ptr_eq(&first, &scoped));
    assert_eq!(scoped.key().scope, "arena");

    // Non-identity identifiers go in verbatim.
    let plain = cache.resolve("Leaderboard").await?;
    assert_eq!(plain.key().name, "Leaderboard");
    assert_eq!(plain.identity_id(), None);

    Ok(())
}

#[tokio::test]
async fn empty_backend_roundtrip_survives_a_new_process() -> Result {
    let remote = Arc::new(VBMemoryRemote::new());
    let cache = cache_over(&remote)?;

    let entry = cache.resolve("Player1").await?;
    assert_eq!(entry.get(VBValue::from(0)).await?, VBValue::from(0));

    entry.set(VBValue::from(50)).await;
    assert_eq!(entry.save().await?, VBSaveOutcome::Saved(1));
    assert_eq!(remote.version_payload("global/User1", 1), Some(VBValue::from(50)));
    assert_eq!(remote.latest_indexed("global/User1/backups"), Some(1));

    // A second cache over the same backend models a fresh process.
    let second = cache_over(&remote)?;
    let reloaded = second.resolve("Player1").await?;
    assert_eq!(reloaded.get(VBValue::from(0)).await?, VBValue::from(50));

    Ok(())
}

#[tokio::test]
async fn save_makes_zero_remote_calls_when_clean() -> Result {
    let remote = Arc::new(VBMemoryRemote::new());
    let cache = cache_over(&remote)?;

    let entry = cache.resolve("Player1").await?;
    entry.set(VBValue::from(50)).await;
    entry.save().await?;

    let baseline = remote.calls();
    assert_eq!(entry.save().await?, VBSaveOutcome::Unchanged);
    // Re-setting the identical value does not dirty the entry either.
    entry.set(VBValue::from(50)).await;
    assert_eq!(entry.save().await?, VBSaveOutcome::Unchanged);
    assert_eq!(remote.calls(), baseline);

    // A freshly loaded, never-mutated entry behaves the same.
    let second = cache_over(&remote)?;
    let reloaded = second.resolve("Player1").await?;
    reloaded.get(VBValue::from(0)).await?;
    let baseline = remote.calls();
    assert_eq!(reloaded.save().await?, VBSaveOutcome::Unchanged);
    assert_eq!(remote.calls(), baseline);

    Ok(())
}

#[tokio::test]
async fn versions_append_instead_of_overwriting() -> Result {
    let remote = Arc::new(VBMemoryRemote::new());
    let cache = cache_over(&remote)?;

    let entry = cache.resolve("Player1").await?;
    for coins in [10, 20, 30] {
        entry.set(VBValue::from(coins)).await;
        entry.save().await?;
    }

    assert_eq!(remote.version_count("global/User1"), 3);
    for (version, coins) in [(1, 10), (2, 20), (3, 30)] {
        assert_eq!(remote.version_payload("global/User1", version), Some(VBValue::from(coins)));
    }
    assert_eq!(remote.latest_indexed("global/User1/backups"), Some(3));

    let second = cache_over(&remote)?;
    let reloaded = second.resolve("Player1").await?;
    assert_eq!(reloaded.get(VBValue::from(0)).await?, VBValue::from(30));

    Ok(())
}

#[tokio::test]
async fn defaults_fill_missing_keys_without_persisting() -> Result {
    let remote = Arc::new(VBMemoryRemote::new());
    let cache = cache_over(&remote)?;

    let entry = cache.resolve("Player1").await?;
    entry.set(vb_map! { "a" => 99 }).await;
    entry.save().await?;

    let second = cache_over(&remote)?;
    let reloaded = second.resolve("Player1").await?;
    let defaults = vb_map! { "a" => 1, "b" => 2 };
    let expected = vb_map! { "a" => 99, "b" => 2 };

    assert_eq!(reloaded.get(defaults.clone()).await?, expected);
    // Idempotent: the merge result was returned, not cached.
    assert_eq!(reloaded.get(defaults).await?, expected);
    assert!(!reloaded.dirty());
    assert_eq!(remote.version_count("global/User1"), 1);
    assert_eq!(remote.version_payload("global/User1", 1), Some(vb_map! { "a" => 99 }));

    Ok(())
}

#[tokio::test]
async fn increment_demands_a_loaded_number() -> Result {
    let remote = Arc::new(VBMemoryRemote::new());
    let cache = cache_over(&remote)?;

    let entry = cache.resolve("Player1").await?;
    // Never loaded yet.
    assert!(matches!(
        entry.increment(1.0).await,
        Err(VBError::InvalidOperand { actual: "not loaded" })
    ));

    // Loaded and confirmed absent is just as invalid.
    entry.get(VBValue::from(0)).await?;
    assert!(matches!(
        entry.increment(1.0).await,
        Err(VBError::InvalidOperand { actual: "no data" })
    ));

    entry.set(VBValue::from(5)).await;
    assert_eq!(entry.increment(2.5).await?, VBValue::Number(7.5));
    assert_eq!(entry.save().await?, VBSaveOutcome::Saved(1));

    entry.set(VBValue::from("not a number")).await;
    assert!(matches!(
        entry.increment(1.0).await,
        Err(VBError::InvalidOperand { actual: "string" })
    ));

    Ok(())
}

#[tokio::test]
async fn first_default_is_adopted_when_configured() -> Result {
    let remote = Arc::new(VBMemoryRemote::new());
    let cache = VBCache::<VBMemoryRemote>::builder()
        .remote(Arc::clone(&remote))
        .attempt_delay(Duration::from_millis(1))
        .autosave_interval(Duration::ZERO)
        .set_cache_to_first_default(true)
        .build()?;

    let entry = cache.resolve("Settings").await?;
    let defaults = vb_map! { "volume" => 7 };
    assert_eq!(entry.get(defaults.clone()).await?, defaults);
    assert!(entry.dirty(), "adopted default differs from what is persisted");

    // The adopted value is the cached one from now on.
    assert_eq!(entry.get(VBValue::Nil).await?, defaults);
    assert_eq!(entry.save().await?, VBSaveOutcome::Saved(1));
    assert_eq!(remote.version_payload("global/Settings", 1), Some(defaults));

    Ok(())
}

#[tokio::test]
async fn remove_discards_without_saving() -> Result {
    let remote = Arc::new(VBMemoryRemote::new());
    let cache = cache_over(&remote)?;

    let entry = cache.resolve("Player1").await?;
    entry.set(VBValue::from(50)).await;
    entry.remove().await;

    let fresh = cache.resolve("Player1").await?;
    assert!(!Arc::ptr_eq(&entry, &fresh), "removed entry must not be handed out again");
    assert_eq!(fresh.get(VBValue::from(0)).await?, VBValue::from(0));
    assert_eq!(remote.version_count("global/User1"), 0);

    Ok(())
}

#[tokio::test]
async fn session_bridge_saves_on_leave_and_tick() -> Result {
    let remote = Arc::new(VBMemoryRemote::new());
    let cache = cache_over(&remote)?;
    let bridge = VBSessionBridge::new(Arc::clone(&cache));

    let entry = bridge.on_join("Player1").await?;
    entry.set(VBValue::from(50)).await;
    assert_eq!(bridge.on_leave("Player1").await?, 1);
    assert_eq!(remote.version_payload("global/User1", 1), Some(VBValue::from(50)));

    let fresh = cache.resolve("Player1").await?;
    assert!(!Arc::ptr_eq(&entry, &fresh), "on_leave evicts the entry");

    let one = cache.resolve("Player2").await?;
    let two = cache.resolve_in("Player2", Some("arena")).await?;
    one.set(VBValue::from(1)).await;
    two.set(VBValue::from(2)).await;
    assert_eq!(bridge.on_tick().await?, 2);
    assert!(!one.dirty() && !two.dirty());

    // Erasure drops the cache but deliberately leaves persisted versions.
    assert_eq!(bridge.on_erasure_request("Player1").await, 1);
    assert_eq!(remote.version_count("global/User1"), 1);

    Ok(())
}

#[tokio::test]
async fn release_refuses_to_evict_when_the_save_fails() -> Result {
    let remote = Arc::new(VBMemoryRemote::new());
    let cache = cache_over(&remote)?;

    let entry = cache.resolve("Player1").await?;
    entry.set(VBValue::from(50)).await;

    remote.fail_next(100);
    assert!(cache.release("Player1").await.is_err());

    let retained = cache.resolve("Player1").await?;
    assert!(Arc::ptr_eq(&entry, &retained), "failed save must not evict");
    assert!(retained.dirty());

    remote.fail_next(0);
    assert_eq!(cache.release("Player1").await?, 1);
    assert_eq!(remote.version_payload("global/User1", 1), Some(VBValue::from(50)));

    Ok(())
}
