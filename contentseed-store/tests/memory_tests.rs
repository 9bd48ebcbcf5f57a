use contentseed_store::{
    AclEntry, ContentRepository, ContentSession, MIX_VERSIONABLE, MemoryRepository, StoreError,
};
use contentseed_types::{AceOrder, PrincipalDefinition, PropertyValue, Value};
use pretty_assertions::assert_eq;
use std::collections::BTreeMap;

fn ace(principal: &str, allow: bool) -> AclEntry {
    AclEntry {
        principal: principal.into(),
        allow,
        privileges: vec!["read".into()],
        restrictions: BTreeMap::new(),
    }
}

// ── Nodes and properties ─────────────────────────────────────────

#[test]
fn add_node_requires_parent() {
    let repo = MemoryRepository::new();
    let mut s = repo.open(None).unwrap();
    assert_eq!(
        s.add_node("/a/b", "nt:unstructured"),
        Err(StoreError::NotFound("/a".into()))
    );
    s.add_node("/a", "nt:unstructured").unwrap();
    s.add_node("/a/b", "nt:unstructured").unwrap();
    assert!(s.node_exists("/a/b").unwrap());
}

#[test]
fn add_node_rejects_duplicates() {
    let repo = MemoryRepository::new();
    let mut s = repo.open(None).unwrap();
    s.add_node("/a", "nt:folder").unwrap();
    assert_eq!(
        s.add_node("/a", "nt:folder"),
        Err(StoreError::AlreadyExists("/a".into()))
    );
}

#[test]
fn children_keep_insertion_order() {
    let repo = MemoryRepository::new();
    let mut s = repo.open(None).unwrap();
    s.add_node("/p", "nt:unstructured").unwrap();
    for name in ["z", "a", "m"] {
        s.add_node(&format!("/p/{name}"), "nt:unstructured").unwrap();
    }
    assert_eq!(s.node("/p").unwrap().children, vec!["z", "a", "m"]);
}

#[test]
fn remove_node_drops_subtree() {
    let repo = MemoryRepository::new();
    let mut s = repo.open(None).unwrap();
    s.add_node("/a", "nt:unstructured").unwrap();
    s.add_node("/a/b", "nt:unstructured").unwrap();
    s.add_node("/ab", "nt:unstructured").unwrap();
    s.save().unwrap();

    s.remove_node("/a").unwrap();
    s.save().unwrap();
    assert!(!s.node_exists("/a/b").unwrap());
    assert!(s.node_exists("/ab").unwrap());
    assert_eq!(s.node("/").unwrap().children, vec!["ab"]);
    assert_eq!(repo.node_count("default"), 2);
}

#[test]
fn properties_round_trip() {
    let repo = MemoryRepository::new();
    let mut s = repo.open(None).unwrap();
    s.add_node("/a", "nt:unstructured").unwrap();
    s.set_property("/a", "title", PropertyValue::from("hello")).unwrap();
    s.set_property("/a", "count", Value::Long(3).into()).unwrap();
    assert_eq!(s.property_names("/a").unwrap(), vec!["count", "title"]);
    assert_eq!(s.property("/a", "title").unwrap(), Some(PropertyValue::from("hello")));

    s.remove_property("/a", "title").unwrap();
    assert_eq!(s.property("/a", "title").unwrap(), None);
}

#[test]
fn invalid_paths_are_rejected() {
    let repo = MemoryRepository::new();
    let mut s = repo.open(None).unwrap();
    assert!(matches!(s.add_node("relative", "x"), Err(StoreError::InvalidPath(_))));
    assert!(matches!(s.node_exists("/a//b"), Err(StoreError::InvalidPath(_))));
}

// ── Transactions ─────────────────────────────────────────────────

#[test]
fn unsaved_changes_are_private() {
    let repo = MemoryRepository::new();
    let mut writer = repo.open(None).unwrap();
    let reader = repo.open(None).unwrap();

    writer.add_node("/a", "nt:unstructured").unwrap();
    assert!(writer.has_pending_changes());
    assert!(!reader.node_exists("/a").unwrap());

    writer.save().unwrap();
    assert!(!writer.has_pending_changes());
    assert!(reader.node_exists("/a").unwrap());
}

#[test]
fn refresh_discards_changes() {
    let repo = MemoryRepository::new();
    let mut s = repo.open(None).unwrap();
    s.add_node("/a", "nt:unstructured").unwrap();
    s.refresh();
    assert!(!s.node_exists("/a").unwrap());
    s.save().unwrap();
    assert_eq!(repo.node_count("default"), 1);
}

#[test]
fn disjoint_sessions_both_commit() {
    let repo = MemoryRepository::new();
    let mut one = repo.open(None).unwrap();
    let mut two = repo.open(None).unwrap();
    one.add_node("/one", "nt:unstructured").unwrap();
    two.add_node("/two", "nt:unstructured").unwrap();
    one.save().unwrap();
    two.save().unwrap();

    let check = repo.open(None).unwrap();
    assert!(check.node_exists("/one").unwrap());
    assert!(check.node_exists("/two").unwrap());
}

#[test]
fn conflicting_save_fails_and_keeps_committed_state() {
    let repo = MemoryRepository::new();
    let mut one = repo.open(None).unwrap();
    let mut two = repo.open(None).unwrap();
    one.add_node("/x", "nt:folder").unwrap();
    two.add_node("/x", "nt:unstructured").unwrap();
    one.save().unwrap();
    assert_eq!(two.save(), Err(StoreError::AlreadyExists("/x".into())));

    let check = repo.open(None).unwrap();
    assert_eq!(check.node("/x").unwrap().primary_type, "nt:folder");
}

// ── Workspaces ───────────────────────────────────────────────────

#[test]
fn workspaces_are_isolated() {
    let repo = MemoryRepository::new();
    repo.create_workspace("staging");
    assert_eq!(repo.workspace_names(), vec!["default", "staging"]);

    let mut s = repo.login(Some("staging")).unwrap();
    assert_eq!(s.workspace(), "staging");
    s.add_node("/a", "nt:unstructured").unwrap();
    s.save().unwrap();

    let default = repo.login(None).unwrap();
    assert!(!default.node_exists("/a").unwrap());
}

#[test]
fn unknown_workspace_is_an_error() {
    let repo = MemoryRepository::new();
    assert!(matches!(
        repo.login(Some("nope")),
        Err(StoreError::NoSuchWorkspace(ws)) if ws == "nope"
    ));
}

// ── Versioning ───────────────────────────────────────────────────

#[test]
fn checked_in_nodes_reject_writes_until_checked_out() {
    let repo = MemoryRepository::new();
    let mut s = repo.open(None).unwrap();
    s.add_node("/v", "nt:unstructured").unwrap();
    s.add_mixin("/v", MIX_VERSIONABLE).unwrap();
    s.save().unwrap();
    s.checkin("/v").unwrap();
    s.save().unwrap();

    assert!(!s.node("/v").unwrap().checked_out);
    assert_eq!(
        s.set_property("/v", "p", PropertyValue::from("x")),
        Err(StoreError::CheckedIn("/v".into()))
    );
    assert_eq!(
        s.add_node("/v/child", "nt:unstructured"),
        Err(StoreError::CheckedIn("/v".into()))
    );

    s.checkout("/v").unwrap();
    s.set_property("/v", "p", PropertyValue::from("x")).unwrap();
}

#[test]
fn checkin_requires_versionable() {
    let repo = MemoryRepository::new();
    let mut s = repo.open(None).unwrap();
    s.add_node("/plain", "nt:unstructured").unwrap();
    assert!(matches!(s.checkin("/plain"), Err(StoreError::Unsupported { .. })));
}

// ── Locks ────────────────────────────────────────────────────────

#[test]
fn locks_are_exclusive_and_released_on_drop() {
    let repo = MemoryRepository::new();
    let mut setup = repo.open(None).unwrap();
    setup.add_node("/rec", "nt:unstructured").unwrap();
    setup.save().unwrap();

    let mut holder = repo.open(None).unwrap();
    let mut other = repo.open(None).unwrap();
    holder.lock("/rec").unwrap();
    assert!(other.is_locked("/rec").unwrap());
    assert_eq!(other.lock("/rec"), Err(StoreError::Locked("/rec".into())));
    assert_eq!(other.unlock("/rec"), Err(StoreError::Locked("/rec".into())));

    drop(holder);
    assert!(!other.is_locked("/rec").unwrap());
    other.lock("/rec").unwrap();
    other.unlock("/rec").unwrap();
}

#[test]
fn lock_requires_saved_node() {
    let repo = MemoryRepository::new();
    let mut s = repo.open(None).unwrap();
    s.add_node("/pending", "nt:unstructured").unwrap();
    assert_eq!(s.lock("/pending"), Err(StoreError::NotFound("/pending".into())));
}

// ── Access control and principals ────────────────────────────────

#[test]
fn ace_ordering() {
    let repo = MemoryRepository::new();
    let mut s = repo.open(None).unwrap();
    s.add_node("/secure", "nt:unstructured").unwrap();
    s.apply_access_control("/secure", ace("alice", true), None).unwrap();
    s.apply_access_control("/secure", ace("bob", true), Some(&AceOrder::First)).unwrap();
    s.apply_access_control("/secure", ace("carol", true), Some(&AceOrder::Before("alice".into())))
        .unwrap();
    s.apply_access_control("/secure", ace("dave", true), Some(&AceOrder::After("bob".into())))
        .unwrap();

    let order: Vec<_> = s
        .access_control_list("/secure")
        .unwrap()
        .into_iter()
        .map(|e| e.principal)
        .collect();
    assert_eq!(order, vec!["bob", "dave", "carol", "alice"]);
}

#[test]
fn ace_replaces_same_principal_and_kind() {
    let repo = MemoryRepository::new();
    let mut s = repo.open(None).unwrap();
    s.add_node("/secure", "nt:unstructured").unwrap();
    s.apply_access_control("/secure", ace("alice", true), None).unwrap();
    s.apply_access_control("/secure", ace("alice", false), None).unwrap();
    s.apply_access_control("/secure", ace("alice", true), None).unwrap();
    let acl = s.access_control_list("/secure").unwrap();
    assert_eq!(acl.len(), 2);
    assert!(!acl[0].allow);
    assert!(acl[1].allow);
}

#[test]
fn create_principal_keeps_existing() {
    let repo = MemoryRepository::new();
    let mut s = repo.open(None).unwrap();
    s.create_principal(&PrincipalDefinition::user("alice", Some("one".into())))
        .unwrap();
    s.create_principal(&PrincipalDefinition::group("alice", vec![]))
        .unwrap();
    s.save().unwrap();

    let other = repo.open(None).unwrap();
    let alice = other.principal("alice").unwrap().unwrap();
    assert!(!alice.is_group());
}
