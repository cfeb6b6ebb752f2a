//! Unit tests for the reconciliation diff engine

use super::*;
use crate::test_utils::*;
use ipam_core::OperationKind;

fn summary(ops: &[Operation]) -> Vec<(OperationKind, Option<&str>, Option<&str>, &str, Option<&str>)> {
    ops.iter()
        .map(|op| {
            (
                op.kind,
                op.host_name.as_deref(),
                op.key.as_deref(),
                op.pool.as_str(),
                op.explicit_address.as_deref(),
            )
        })
        .collect()
}

#[test]
fn test_create_replays_status_before_desired() {
    let h1 = host_spec("h1.example.com", "dev");
    let rsc = create_test_ipam(
        "ipam",
        "kube-system",
        vec![h1.clone(), key_spec("ns/svc", "dev")],
        vec![recorded(&h1, "10.0.0.1")],
    );

    let ops = on_create(&rsc);
    assert_eq!(
        summary(&ops),
        vec![
            (OperationKind::Create, Some("h1.example.com"), None, "dev", Some("10.0.0.1")),
            (OperationKind::Create, Some("h1.example.com"), None, "dev", None),
            (OperationKind::Create, None, Some("ns/svc"), "dev", None),
        ]
    );
    assert_eq!(ops[0].correlation, ResourceRef::new("ipam", "kube-system"));
}

#[test]
fn test_create_skips_incomplete_entries() {
    let no_pool = HostSpec {
        host: Some("h1.example.com".to_string()),
        ..Default::default()
    };
    let no_name = HostSpec {
        ipam_label: Some("dev".to_string()),
        ..Default::default()
    };
    let empty_ip = recorded(&host_spec("h2.example.com", "dev"), "");
    let rsc = create_test_ipam("ipam", "kube-system", vec![no_pool, no_name], vec![empty_ip]);

    // The entry without an address is not replayed, only cleaned up
    assert_eq!(
        summary(&on_create(&rsc)),
        vec![(OperationKind::Delete, Some("h2.example.com"), None, "dev", None)]
    );
}

#[test]
fn test_create_deletes_status_without_desired_entry() {
    let live = host_spec("live.example.com", "dev");
    let stale = host_spec("stale.example.com", "dev");
    let rsc = create_test_ipam(
        "ipam",
        "kube-system",
        vec![live.clone()],
        vec![recorded(&live, "10.0.0.1"), recorded(&stale, "10.0.0.2")],
    );

    assert_eq!(
        summary(&on_create(&rsc)),
        vec![
            (OperationKind::Create, Some("live.example.com"), None, "dev", Some("10.0.0.1")),
            (OperationKind::Create, Some("stale.example.com"), None, "dev", Some("10.0.0.2")),
            (OperationKind::Delete, Some("stale.example.com"), None, "dev", None),
            (OperationKind::Create, Some("live.example.com"), None, "dev", None),
        ]
    );
}

#[test]
fn test_create_stale_check_compares_pool() {
    // Same key recorded under another pool than the one now desired
    let rsc = create_test_ipam(
        "ipam",
        "kube-system",
        vec![key_spec("a", "prod")],
        vec![recorded(&key_spec("a", "dev"), "10.0.0.5")],
    );
    let ops = on_create(&rsc);
    assert_eq!(
        summary(&ops[1..]),
        vec![
            (OperationKind::Delete, None, Some("a"), "dev", None),
            (OperationKind::Create, None, Some("a"), "prod", None),
        ]
    );
}

#[test]
fn test_create_dedups_desired_entries() {
    let h1 = host_spec("h1.example.com", "dev");
    let rsc = create_test_ipam("ipam", "kube-system", vec![h1.clone(), h1], vec![]);
    assert_eq!(on_create(&rsc).len(), 1);
}

#[test]
fn test_cidr_is_the_pool_without_label() {
    let spec = HostSpec {
        host: Some("h1.example.com".to_string()),
        cidr: Some("172.16.4.0/24".to_string()),
        ..Default::default()
    };
    let rsc = create_test_ipam("ipam", "kube-system", vec![spec], vec![]);
    assert_eq!(on_create(&rsc)[0].pool, "172.16.4.0/24");
}

#[test]
fn test_update_emits_set_difference() {
    let kept = host_spec("kept.example.com", "dev");
    let gone = host_spec("gone.example.com", "dev");
    let new = key_spec("ns/new", "dev");
    let old_rsc = create_test_ipam("ipam", "kube-system", vec![kept.clone(), gone], vec![]);
    let new_rsc = create_test_ipam("ipam", "kube-system", vec![kept, new], vec![]);

    let ops = on_update(&old_rsc, &new_rsc);
    assert_eq!(
        summary(&ops),
        vec![
            (OperationKind::Delete, Some("gone.example.com"), None, "dev", None),
            (OperationKind::Create, None, Some("ns/new"), "dev", None),
        ]
    );
}

#[test]
fn test_update_pool_change_is_delete_then_create() {
    let old_rsc = create_test_ipam("ipam", "kube-system", vec![key_spec("a", "dev")], vec![]);
    let new_rsc = create_test_ipam("ipam", "kube-system", vec![key_spec("a", "prod")], vec![]);

    let ops = on_update(&old_rsc, &new_rsc);
    assert_eq!(
        summary(&ops),
        vec![
            (OperationKind::Delete, None, Some("a"), "dev", None),
            (OperationKind::Create, None, Some("a"), "prod", None),
        ]
    );
}

#[test]
fn test_update_same_key_different_pool_is_not_matched() {
    // "a" stays in dev; the prod entry for "a" is new
    let old_rsc = create_test_ipam("ipam", "kube-system", vec![key_spec("a", "dev")], vec![]);
    let new_rsc = create_test_ipam(
        "ipam",
        "kube-system",
        vec![key_spec("a", "dev"), key_spec("a", "prod")],
        vec![],
    );
    let ops = on_update(&old_rsc, &new_rsc);
    assert_eq!(summary(&ops), vec![(OperationKind::Create, None, Some("a"), "prod", None)]);
}

#[test]
fn test_update_without_spec_change_is_empty() {
    let spec = host_spec("h1.example.com", "dev");
    let old_rsc = create_test_ipam("ipam", "kube-system", vec![spec.clone()], vec![]);
    let new_rsc = create_test_ipam("ipam", "kube-system", vec![spec.clone()], vec![recorded(&spec, "10.0.0.1")]);
    assert!(on_update(&old_rsc, &new_rsc).is_empty());
}

#[test]
fn test_delete_skips_addresses_shared_with_other_resources() {
    let a = key_spec("a", "dev");
    let b = key_spec("b", "dev");
    let x = create_test_ipam(
        "x",
        "kube-system",
        vec![a.clone(), b.clone()],
        vec![recorded(&a, "10.0.0.5"), recorded(&b, "10.0.0.6")],
    );
    let y = create_test_ipam("y", "kube-system", vec![a.clone()], vec![recorded(&a, "10.0.0.5")]);

    let ops = on_delete(&x, &[x.clone(), y]);
    assert_eq!(summary(&ops), vec![(OperationKind::Delete, None, Some("b"), "dev", None)]);
}

#[test]
fn test_delete_ignores_itself_in_others() {
    let a = key_spec("a", "dev");
    let x = create_test_ipam("x", "kube-system", vec![a.clone()], vec![recorded(&a, "10.0.0.5")]);
    let ops = on_delete(&x, std::slice::from_ref(&x));
    assert_eq!(ops.len(), 1);
    assert_eq!(ops[0].explicit_address, None);
}
