//! Tests for execution lock discipline

use super::*;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

#[test]
fn test_acquire_release() {
    let lock = ExecutionLock::new();
    lock.register_thread();

    assert!(!lock.held_by_current_thread());
    let token = lock.acquire_for_native_call();
    assert!(lock.held_by_current_thread());
    token.release();
    assert!(!lock.held_by_current_thread());
}

#[test]
fn test_reentrant_acquire() {
    let lock = ExecutionLock::new();
    lock.register_thread();

    // Nested acquires by the same thread must not block on themselves
    let outer = lock.acquire_for_native_call();
    let inner = lock.acquire_for_native_call();
    assert!(lock.held_by_current_thread());

    // Lock becomes free only after two matching releases
    inner.release();
    assert!(lock.held_by_current_thread());
    outer.release();
    assert!(!lock.held_by_current_thread());
}

#[test]
fn test_registration_idempotent() {
    let lock = ExecutionLock::new();
    assert!(!lock.is_registered());
    lock.register_thread();
    lock.register_thread();
    assert!(lock.is_registered());
}

#[test]
#[should_panic(expected = "never registered")]
fn test_unregistered_acquire_is_fatal() {
    let lock = ExecutionLock::new();
    let _token = lock.acquire_for_native_call();
}

#[test]
#[should_panic(expected = "non-holder thread")]
fn test_release_without_hold_is_fatal() {
    let lock = ExecutionLock::new();
    lock.register_thread();
    lock.release_raw();
}

#[test]
fn test_release_from_other_thread_is_fatal() {
    let lock = Arc::new(ExecutionLock::new());
    lock.register_thread();
    lock.acquire_raw();

    let lock2 = Arc::clone(&lock);
    let result = std::thread::spawn(move || {
        lock2.register_thread();
        lock2.release_raw();
    })
    .join();
    assert!(result.is_err());

    lock.release_raw();
}

#[test]
fn test_mutual_exclusion() {
    // Two threads increment a shared counter under the lock; the observed
    // values must be serializable (equivalent to some sequential order).
    let lock = Arc::new(ExecutionLock::new());
    let counter = Arc::new(AtomicUsize::new(0));
    let mut handles = Vec::new();

    for _ in 0..2 {
        let lock = Arc::clone(&lock);
        let counter = Arc::clone(&counter);
        handles.push(std::thread::spawn(move || {
            lock.register_thread();
            for _ in 0..1000 {
                let token = lock.acquire_for_native_call();
                // Non-atomic read-modify-write; only safe when exclusive
                let seen = counter.load(Ordering::Relaxed);
                counter.store(seen + 1, Ordering::Relaxed);
                token.release();
            }
        }));
    }
    for h in handles {
        h.join().unwrap();
    }
    assert_eq!(counter.load(Ordering::Relaxed), 2000);
}

#[test]
fn test_blocked_acquirer_eventually_proceeds() {
    let lock = Arc::new(ExecutionLock::new());
    lock.register_thread();
    lock.acquire_raw();

    let lock2 = Arc::clone(&lock);
    let waiter = std::thread::spawn(move || {
        lock2.register_thread();
        let token = lock2.acquire_for_native_call();
        token.release();
    });

    // Give the waiter time to block, then release
    std::thread::sleep(Duration::from_millis(50));
    lock.release_raw();
    waiter.join().unwrap();
    assert!(lock.contention_count() >= 1);
}

#[test]
fn test_without_lock_restores_depth() {
    let lock = ExecutionLock::new();
    lock.register_thread();

    let outer = lock.acquire_for_native_call();
    let inner = lock.acquire_for_native_call();

    let result = lock.without_lock(|| {
        assert!(!lock.held_by_current_thread());
        21 * 2
    });
    assert_eq!(result, 42);

    // Depth of 2 restored: still held after one release
    assert!(lock.held_by_current_thread());
    inner.release();
    assert!(lock.held_by_current_thread());
    outer.release();
    assert!(!lock.held_by_current_thread());
}

#[test]
fn test_without_lock_lets_other_threads_in() {
    let lock = Arc::new(ExecutionLock::new());
    lock.register_thread();
    let token = lock.acquire_for_native_call();

    let lock2 = Arc::clone(&lock);
    let observed = lock.without_lock(move || {
        // Another thread can take the lock while we run unlocked
        std::thread::spawn(move || {
            lock2.register_thread();
            let token = lock2.acquire_for_native_call();
            let held = lock2.held_by_current_thread();
            token.release();
            held
        })
        .join()
        .unwrap()
    });
    assert!(observed);

    assert!(lock.held_by_current_thread());
    token.release();
}

#[test]
#[should_panic(expected = "suspended by a non-holder")]
fn test_without_lock_requires_hold() {
    let lock = ExecutionLock::new();
    lock.register_thread();
    lock.without_lock(|| ());
}

#[test]
fn test_token_drop_releases() {
    let lock = ExecutionLock::new();
    lock.register_thread();
    {
        let _token = lock.acquire_for_native_call();
        assert!(lock.held_by_current_thread());
    }
    assert!(!lock.held_by_current_thread());
}
