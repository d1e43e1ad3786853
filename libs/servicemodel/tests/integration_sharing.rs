//! Integration tests for channel-factory sharing across clients
//!
//! Run with: cargo test -p servicemodel --test integration_sharing
//! Verbose: TEST_VERBOSE=1 cargo test -p servicemodel --test integration_sharing -- --nocapture

mod common;

use common::*;
use servicemodel::*;
use std::sync::Arc;
use std::thread;

#[test]
fn test_clients_with_equal_traits_share_one_factory() {
    let fixture = Fixture::new();

    let a = fixture.client();
    a.channel().unwrap();
    let b = fixture.client();
    b.channel().unwrap();
    let c = fixture.client();

    assert!(a.is_using_cached_factory());
    assert!(b.is_using_cached_factory());
    assert!(c.is_using_cached_factory());
    // Three clients plus the cache
    assert_eq!(a.factory_ref_count(), 4);
    assert_eq!(fixture.faults().factories_built(), 1);
    assert_eq!(fixture.entries(), 1);
    verbose_println!("metrics after three clients: {:?}", fixture.metrics());

    a.close(TIMEOUT).unwrap();
    assert_eq!(b.factory_ref_count(), 3);
    assert_eq!(fixture.faults().factories_aborted(), 0);
    assert_eq!(fixture.faults().factories_closed(), 0);
    assert_eq!(b.channel().unwrap().echo("still up").unwrap(), "still up");

    b.close(TIMEOUT).unwrap();
    c.close(TIMEOUT).unwrap();
    assert_eq!(fixture.faults().factories_aborted(), 0);

    // The cache held the last reference
    assert_eq!(fixture.manager.shutdown(), 1);
    assert_eq!(fixture.faults().factories_aborted(), 1);
}

#[test]
fn test_identical_configuration_traits_are_equal() {
    let fixture = Fixture::new();
    let callback = CallbackInstance::new("events");

    assert_eq!(fixture.config_trait(None), fixture.config_trait(None));
    assert_eq!(
        fixture.config_trait(Some(callback.clone())),
        fixture.config_trait(Some(callback.clone()))
    );
    assert_ne!(fixture.config_trait(None), fixture.config_trait(Some(callback.clone())));
    assert_ne!(
        fixture.config_trait(Some(callback)),
        fixture.config_trait(Some(CallbackInstance::new("events")))
    );
    assert_ne!(fixture.programmatic_trait("a"), fixture.programmatic_trait("b"));
}

#[test]
fn test_callback_instances_split_the_cache() {
    let fixture = Fixture::new();
    let first = CallbackInstance::new(1u32);
    let second = CallbackInstance::new(1u32);

    let a = fixture.client_with_callback(first.clone());
    a.channel().unwrap();
    let b = fixture.client_with_callback(second);
    b.channel().unwrap();
    let c = fixture.client_with_callback(first);

    assert_eq!(fixture.faults().factories_built(), 2);
    assert_eq!(fixture.entries(), 2);
    assert!(c.is_using_cached_factory());
    assert_eq!(a.factory_ref_count(), 3);
    assert_eq!(b.factory_ref_count(), 2);
}

#[test]
fn test_always_off_never_touches_the_cache() {
    let fixture = Fixture::new();
    fixture
        .manager
        .set_cache_setting::<LoopbackChannel>(CacheSetting::AlwaysOff)
        .unwrap();

    let a = fixture.client();
    let b = fixture.client();
    a.channel().unwrap();
    b.channel().unwrap();

    assert_eq!(fixture.faults().factories_built(), 2);
    assert_eq!(fixture.entries(), 0);
    assert_eq!(fixture.metrics(), CacheMetrics::default());

    a.close(TIMEOUT).unwrap();
    b.close(TIMEOUT).unwrap();
    assert_eq!(fixture.faults().factories_closed(), 2);
    assert_eq!(fixture.faults().factories_aborted(), 0);
}

#[test]
fn test_setting_is_fixed_by_first_client() {
    let fixture = Fixture::new();
    let _client = fixture.client();

    let err = fixture
        .manager
        .set_cache_setting::<LoopbackChannel>(CacheSetting::AlwaysOff)
        .unwrap_err();
    assert!(matches!(err, ServiceModelError::InvalidOperation(_)));
    assert_eq!(fixture.manager.cache_setting::<LoopbackChannel>(), CacheSetting::Default);
}

#[test]
fn test_stale_entry_is_purged_and_replaced() {
    let fixture = Fixture::new();
    let key = fixture.config_trait(None);

    let a = fixture.client();
    a.channel().unwrap();

    let cached = fixture.manager.cache_for::<LoopbackChannel>().lock().peek(&key).unwrap();
    cached.abort();

    let b = fixture.client();
    assert!(!b.is_using_cached_factory());
    assert_eq!(fixture.entries(), 0);
    assert_eq!(fixture.metrics().stale_purges, 1);
    // Only A holds the dead factory now
    assert_eq!(a.factory_ref_count(), 1);

    b.channel().unwrap();
    assert!(b.is_using_cached_factory());
    assert_eq!(fixture.entries(), 1);
    assert_eq!(fixture.faults().factories_built(), 2);
}

#[test]
fn test_transient_failure_invalidates_and_retries_privately() {
    let fixture = Fixture::new();

    let a = fixture.client();
    let a_channel = a.channel().unwrap();
    let b = fixture.client();
    assert!(b.is_using_cached_factory());

    fixture.faults().fail_next_creates(1, FaultKind::Timeout);
    let b_channel = b.channel().unwrap();
    assert_eq!(b_channel.echo("retried").unwrap(), "retried");

    assert!(!b.is_using_cached_factory());
    assert!(!b.can_share_factory());
    assert_eq!(b.factory_ref_count(), 1);
    assert_eq!(fixture.entries(), 0);
    assert_eq!(fixture.metrics().invalidations, 1);
    assert_eq!(fixture.faults().factories_built(), 2);

    // A keeps the invalidated factory; nothing was aborted under it
    assert_eq!(a.factory_ref_count(), 1);
    assert_eq!(fixture.faults().factories_aborted(), 0);
    assert_eq!(a_channel.echo("unaffected").unwrap(), "unaffected");

    // A held the last reference to a formerly cached factory
    a.close(TIMEOUT).unwrap();
    assert_eq!(fixture.faults().factories_aborted(), 1);
}

#[test]
fn test_channel_after_close_leaves_shared_factory_alone() {
    let fixture = Fixture::new();
    let a = fixture.client();
    let a_channel = a.channel().unwrap();
    let b = fixture.client();
    assert_eq!(a.factory_ref_count(), 3);

    b.close(TIMEOUT).unwrap();
    let err = b.channel().unwrap_err();
    assert!(matches!(err, ServiceModelError::ObjectDisposed(_)));

    // No retry ran: the entry and A's reference survive
    assert_eq!(fixture.entries(), 1);
    assert_eq!(fixture.metrics().invalidations, 0);
    assert_eq!(a.factory_ref_count(), 2);
    assert_eq!(fixture.faults().factories_aborted(), 0);
    assert_eq!(a_channel.echo("alive").unwrap(), "alive");

    b.abort();
    a.close(TIMEOUT).unwrap();
    assert_eq!(a.factory_ref_count(), 1);
}

#[test]
fn test_failed_channel_close_still_releases_reference() {
    let fixture = Fixture::new();
    let a = fixture.client();
    let a_channel = a.channel().unwrap();
    a_channel.echo("open").unwrap();
    let b = fixture.client();
    let b_channel = b.channel().unwrap();
    assert_eq!(a.factory_ref_count(), 3);

    fixture.faults().set_fail_channel_close(true);
    let err = a.close(TIMEOUT).unwrap_err();
    assert!(matches!(err, ServiceModelError::Communication(_)));
    assert_eq!(a_channel.state(), CommunicationState::Closed);
    assert_eq!(a.state(), CommunicationState::Closed);

    // A's reference is gone; B and the cache keep the factory running
    assert_eq!(b.factory_ref_count(), 2);
    assert_eq!(fixture.faults().factories_aborted(), 0);
    assert_eq!(b_channel.echo("unaffected").unwrap(), "unaffected");

    fixture.faults().set_fail_channel_close(false);
    b.close(TIMEOUT).unwrap();
    assert_eq!(fixture.entries(), 1);
}

#[test]
fn test_failed_retry_surfaces_error() {
    let fixture = Fixture::new();
    let a = fixture.client();
    a.channel().unwrap();
    let b = fixture.client();

    fixture.faults().fail_next_creates(2, FaultKind::Communication);
    let err = b.channel().unwrap_err();
    assert!(matches!(err, ServiceModelError::Communication(_)));
    assert_eq!(fixture.entries(), 0);
    assert!(!b.is_using_cached_factory());
}

#[test]
fn test_private_factory_is_not_published_when_entry_exists() {
    let fixture = Fixture::new();
    let a = fixture.client();
    let b = fixture.client();

    // Both built private factories; only the first channel publishes
    a.channel().unwrap();
    b.channel().unwrap();

    assert!(a.is_using_cached_factory());
    assert!(!b.is_using_cached_factory());
    assert_eq!(fixture.entries(), 1);

    b.close(TIMEOUT).unwrap();
    assert_eq!(fixture.faults().factories_closed(), 1);
    assert_eq!(fixture.faults().factories_aborted(), 0);
}

#[test]
fn test_concurrent_clients_leave_one_cached_factory() {
    let fixture = Arc::new(Fixture::new());

    let handles: Vec<_> = (0..8)
        .map(|i| {
            let fixture = Arc::clone(&fixture);
            thread::spawn(move || {
                let client = fixture.client();
                let reply = client.channel().unwrap().echo(&format!("thread {}", i)).unwrap();
                verbose_println!("{}", reply);
                client
            })
        })
        .collect();

    let clients: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    assert_eq!(fixture.entries(), 1);
    assert!(clients.iter().any(|c| c.is_using_cached_factory()));

    for client in &clients {
        client.close(TIMEOUT).unwrap();
    }

    // Every private factory closed; the cached one is still open
    let faults = fixture.faults();
    assert_eq!(faults.factories_closed(), faults.factories_opened() - 1);
    assert_eq!(faults.factories_aborted(), 0);
}

#[test]
fn test_watermark_ages_out_least_recent_entries() {
    let fixture = Fixture::with_watermark(5);
    let aged = Arc::new(parking_lot::Mutex::new(Vec::new()));
    {
        let aged = Arc::clone(&aged);
        fixture
            .manager
            .cache_for::<LoopbackChannel>()
            .set_aged_out_observer(move |key| aged.lock().push(format!("{:?}", key)));
    }

    for path in 0..6 {
        let client = ClientBase::new(&fixture.manager, fixture.programmatic_trait(&path.to_string())).unwrap();
        client.channel().unwrap();
        client.close(TIMEOUT).unwrap();
    }

    // Trimmed to four fifths of the watermark
    assert_eq!(fixture.entries(), 4);
    assert_eq!(fixture.metrics().evictions, 2);
    assert_eq!(fixture.faults().factories_aborted(), 2);
    assert_eq!(aged.lock().len(), 2);

    let cache = fixture.manager.cache_for::<LoopbackChannel>();
    assert!(!cache.contains(&fixture.programmatic_trait("0")));
    assert!(!cache.contains(&fixture.programmatic_trait("1")));
    assert!(cache.contains(&fixture.programmatic_trait("5")));
}
