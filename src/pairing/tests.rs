use super::*;

fn store(dir: &tempfile::TempDir) -> PairingStore {
    PairingStore::new(dir.path().join("pairing.json"), 300, 3).unwrap()
}

#[test]
fn first_contact_creates_pending_record() {
    let dir = tempfile::tempdir().unwrap();
    let store = store(&dir);
    let code = store
        .request_pairing("u1", "webhook", "support", None)
        .unwrap();
    assert!(code.len() >= 6);
    assert_eq!(
        store.sender_status("u1", "webhook"),
        Some(AuthStatus::Pending)
    );
}

#[test]
fn verify_pairing_approves_and_consumes_code() {
    let dir = tempfile::tempdir().unwrap();
    let store = store(&dir);
    let code = store
        .request_pairing("u1", "webhook", "support", None)
        .unwrap();
    assert!(store.verify_pairing("u1", "webhook", &code).unwrap());
    assert!(store.is_approved("u1", "webhook"));
    // single-use: re-verifying the same code fails
    assert!(!store.verify_pairing("u1", "webhook", &code).unwrap());
}

#[test]
fn verify_pairing_rejects_wrong_code() {
    let dir = tempfile::tempdir().unwrap();
    let store = store(&dir);
    store
        .request_pairing("u1", "webhook", "support", None)
        .unwrap();
    assert!(!store.verify_pairing("u1", "webhook", "WRONGCODE").unwrap());
    assert!(!store.is_approved("u1", "webhook"));
}

#[test]
fn expired_code_verifies_false() {
    let dir = tempfile::tempdir().unwrap();
    let store = store(&dir);
    let code = store
        .request_pairing("u1", "webhook", "support", None)
        .unwrap();
    store.expire_code_for_test("u1", "webhook");
    assert!(!store.verify_pairing("u1", "webhook", &code).unwrap());
}

#[test]
fn new_request_replaces_outstanding_code() {
    let dir = tempfile::tempdir().unwrap();
    let store = store(&dir);
    let first = store
        .request_pairing("u1", "webhook", "support", None)
        .unwrap();
    let second = store
        .request_pairing("u1", "webhook", "support", None)
        .unwrap();
    assert!(!store.verify_pairing("u1", "webhook", &first).unwrap());
    assert!(store.verify_pairing("u1", "webhook", &second).unwrap());
}

#[test]
fn block_then_unblock_returns_to_approved() {
    let dir = tempfile::tempdir().unwrap();
    let store = store(&dir);
    let code = store
        .request_pairing("u1", "webhook", "support", None)
        .unwrap();
    store.verify_pairing("u1", "webhook", &code).unwrap();
    store.block_sender("u1", "webhook").unwrap();
    assert_eq!(
        store.sender_status("u1", "webhook"),
        Some(AuthStatus::Blocked)
    );
    store.unblock_sender("u1", "webhook").unwrap();
    assert_eq!(
        store.sender_status("u1", "webhook"),
        Some(AuthStatus::Approved)
    );
}

#[test]
fn unblock_on_non_blocked_sender_is_a_noop() {
    let dir = tempfile::tempdir().unwrap();
    let store = store(&dir);
    let code = store
        .request_pairing("u1", "webhook", "support", None)
        .unwrap();
    store.verify_pairing("u1", "webhook", &code).unwrap();
    store.unblock_sender("u1", "webhook").unwrap();
    assert_eq!(
        store.sender_status("u1", "webhook"),
        Some(AuthStatus::Approved)
    );
}

#[test]
fn rate_limit_allows_up_to_max_then_denies() {
    let dir = tempfile::tempdir().unwrap();
    let store = store(&dir);
    assert!(store.check_rate_limit("u1", "webhook"));
    assert!(store.check_rate_limit("u1", "webhook"));
    assert!(store.check_rate_limit("u1", "webhook"));
    assert!(!store.check_rate_limit("u1", "webhook"));
}

#[test]
fn rate_limit_is_per_sender() {
    let dir = tempfile::tempdir().unwrap();
    let store = store(&dir);
    assert!(store.check_rate_limit("u1", "webhook"));
    assert!(store.check_rate_limit("u1", "webhook"));
    assert!(store.check_rate_limit("u1", "webhook"));
    assert!(store.check_rate_limit("u2", "webhook"));
}

#[test]
fn get_all_senders_filters_by_channel() {
    let dir = tempfile::tempdir().unwrap();
    let store = store(&dir);
    store.request_pairing("u1", "webhook", "support", None).unwrap();
    store.request_pairing("u2", "telegram", "main", None).unwrap();
    assert_eq!(store.get_all_senders(Some("webhook")).len(), 1);
    assert_eq!(store.get_all_senders(None).len(), 2);
}

#[test]
fn get_all_approved_excludes_pending_and_blocked() {
    let dir = tempfile::tempdir().unwrap();
    let store = store(&dir);
    let code = store
        .request_pairing("u1", "webhook", "support", None)
        .unwrap();
    store.verify_pairing("u1", "webhook", &code).unwrap();
    store.request_pairing("u2", "webhook", "support", None).unwrap();
    assert_eq!(store.get_all_approved(Some("webhook")).len(), 1);
}

#[test]
fn persisted_store_reloads_records_and_codes() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("pairing.json");
    let code = {
        let store = PairingStore::new(path.clone(), 300, 60).unwrap();
        store.request_pairing("u1", "webhook", "support", None).unwrap()
    };
    let reloaded = PairingStore::new(path, 300, 60).unwrap();
    assert!(reloaded.verify_pairing("u1", "webhook", &code).unwrap());
}
