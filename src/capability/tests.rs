//! Tests for the capability export table

use super::*;

extern "C" fn add_i32(a: i32, b: i32) -> i32 {
    a + b
}

extern "C" fn neg_i32(a: i32) -> i32 {
    -a
}

fn math_entries() -> Vec<(String, CapabilityFn)> {
    vec![
        ("add".to_string(), CapabilityFn::new(add_i32 as *const ())),
        ("neg".to_string(), CapabilityFn::new(neg_i32 as *const ())),
    ]
}

#[test]
fn test_import_before_publish_fails() {
    let registry = CapabilityRegistry::new();
    let err = registry.import("mathmod.api", 1).unwrap_err();
    match err {
        BridgeError::Import { name, message } => {
            assert_eq!(name, "mathmod.api");
            assert!(message.contains("not published"));
        }
        other => panic!("expected Import, got {:?}", other),
    }
}

#[test]
fn test_publish_then_import() {
    let registry = CapabilityRegistry::new();
    registry.publish("mathmod.api", 1, math_entries());
    assert!(registry.contains("mathmod.api"));

    let table = registry.import("mathmod.api", 1).unwrap();
    assert_eq!(table.name(), "mathmod.api");
    assert_eq!(table.version(), 1);
    assert_eq!(table.len(), 2);
}

#[test]
fn test_imported_entries_callable_like_direct_calls() {
    let registry = CapabilityRegistry::new();
    registry.publish("mathmod.api", 1, math_entries());

    let table = registry.import("mathmod.api", 1).unwrap();
    let add: extern "C" fn(i32, i32) -> i32 =
        unsafe { table.entry("add").unwrap().cast() };
    let neg: extern "C" fn(i32) -> i32 = unsafe { table.entry("neg").unwrap().cast() };

    assert_eq!(add(2, 40), add_i32(2, 40));
    assert_eq!(neg(7), -7);
    assert!(table.entry("missing").is_none());
}

#[test]
fn test_version_gate() {
    let registry = CapabilityRegistry::new();
    registry.publish("mathmod.api", 2, math_entries());

    // min_version at or below the published version succeeds
    assert!(registry.import("mathmod.api", 1).is_ok());
    assert!(registry.import("mathmod.api", 2).is_ok());

    let err = registry.import("mathmod.api", 3).unwrap_err();
    match err {
        BridgeError::Import { message, .. } => {
            assert!(message.contains("older than required"), "got: {}", message);
        }
        other => panic!("expected Import, got {:?}", other),
    }
}

#[test]
#[should_panic(expected = "published twice")]
fn test_duplicate_publish_is_fatal() {
    let registry = CapabilityRegistry::new();
    registry.publish("mathmod.api", 1, math_entries());
    registry.publish("mathmod.api", 2, math_entries());
}

#[test]
fn test_duplicate_publish_preserves_original_table() {
    let registry = CapabilityRegistry::new();
    registry.publish("mathmod.api", 3, math_entries());

    let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
        registry.publish("mathmod.api", 9, math_entries());
    }));
    assert!(result.is_err());

    // The table published first is still the one importers see
    let table = registry.import("mathmod.api", 1).unwrap();
    assert_eq!(table.version(), 3);
    assert_eq!(table.len(), 2);
}

#[test]
#[should_panic(expected = "form '<module>.<capability>'")]
fn test_malformed_name_is_fatal() {
    let registry = CapabilityRegistry::new();
    registry.publish("noseparator", 1, math_entries());
}

#[test]
fn test_name_validation() {
    assert!(is_valid_name("mod.api"));
    assert!(is_valid_name("mod.api.v2")); // extra dots land in the capability part
    assert!(!is_valid_name("mod"));
    assert!(!is_valid_name(".api"));
    assert!(!is_valid_name("mod."));
}

#[test]
fn test_tables_are_shared_snapshots() {
    let registry = CapabilityRegistry::new();
    let published = registry.publish("mathmod.api", 1, math_entries());
    let imported = registry.import("mathmod.api", 1).unwrap();
    assert!(Arc::ptr_eq(&published, &imported));
}
