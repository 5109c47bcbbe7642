// Tests for database functionality

use chrono::{TimeZone, Utc};
use oidwalk_core::data::{Database, NodeStore, SessionStatus};
use oidwalk_core::error::StoreError;
use oidwalk_scanner::record::{ChildRef, NodeCode, NodeRecord};
use tempfile::TempDir;

fn create_test_db() -> (TempDir, Database) {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("test.db");
    let db = Database::new(&db_path).unwrap();
    (temp_dir, db)
}

fn sample_record(dot_oid: &str) -> NodeRecord {
    let mut record = NodeRecord::new(dot_oid.to_string());
    record.node_code = Some(NodeCode::Number(4));
    record.node_names = vec!["identified-organization".to_string()];
    record.parent = Some("0".to_string());
    record.asn1_oid = vec!["{itu-t(0) identified-organization(4)}".to_string()];
    record.iri_oid = vec!["/ITU-T/Identified-Organization".to_string()];
    record.creation_date = Some(Utc.with_ymd_and_hms(2011, 9, 5, 0, 0, 0).unwrap());
    record
        .detailed_data
        .insert("description".to_string(), "Identified organizations".to_string());
    record.children = vec![ChildRef {
        identifier: format!("{}.0", dot_oid),
        direct_children: 12,
        subnodes_total: 1204,
    }];
    record
        .other_fields
        .insert("information".to_string(), "See ITU-T X.660".to_string());
    record
}

// ============================================================================
// Database Creation Tests
// ============================================================================

#[test]
fn test_database_creation() {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("test.db");

    let db = Database::new(&db_path);
    assert!(db.is_ok());
    assert!(db_path.exists());
}

#[test]
fn test_database_exists() {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("test.db");

    assert!(!Database::exists(&db_path));

    let _db = Database::new(&db_path).unwrap();
    assert!(Database::exists(&db_path));
}

#[test]
fn test_database_drop() {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("test.db");

    let db = Database::new(&db_path).unwrap();
    drop(db);
    assert!(Database::exists(&db_path));

    Database::drop(&db_path).unwrap();
    assert!(!Database::exists(&db_path));
}

#[test]
fn test_reopen_keeps_records() {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("test.db");

    {
        let db = Database::new(&db_path).unwrap();
        db.insert(&sample_record("0.4")).unwrap();
    }

    let db = Database::new(&db_path).unwrap();
    assert!(db.exists("0.4").unwrap());
    assert_eq!(db.count_nodes().unwrap(), 1);
}

// ============================================================================
// Node Tests
// ============================================================================

#[test]
fn test_insert_and_get_node() {
    let (_temp_dir, db) = create_test_db();
    let record = sample_record("0.4");

    db.insert(&record).unwrap();
    let stored = db.get_node("0.4").unwrap().unwrap();

    assert_eq!(stored.dot_oid, "0.4");
    assert_eq!(stored.node_code, Some(NodeCode::Number(4)));
    assert_eq!(stored.node_names, record.node_names);
    assert_eq!(stored.parent.as_deref(), Some("0"));
    assert_eq!(stored.creation_date, record.creation_date);
    assert_eq!(stored.modification_date, None);
    assert_eq!(stored.detailed_data, record.detailed_data);
    assert_eq!(stored.children, record.children);
    assert_eq!(stored.other_fields, record.other_fields);
}

#[test]
fn test_raw_and_null_node_codes() {
    let (_temp_dir, db) = create_test_db();

    let mut raw = sample_record("1.3");
    raw.node_code = Some(NodeCode::Raw("3a".to_string()));
    let mut null = sample_record("1.4");
    null.node_code = None;
    null.parent = None;

    db.insert(&raw).unwrap();
    db.insert(&null).unwrap();

    assert_eq!(
        db.get_node("1.3").unwrap().unwrap().node_code,
        Some(NodeCode::Raw("3a".to_string()))
    );
    let null = db.get_node("1.4").unwrap().unwrap();
    assert_eq!(null.node_code, None);
    assert_eq!(null.parent, None);
}

#[test]
fn test_get_missing_node() {
    let (_temp_dir, db) = create_test_db();
    assert!(db.get_node("2.999").unwrap().is_none());
    assert!(!db.exists("2.999").unwrap());
}

#[test]
fn test_duplicate_insert_keeps_one_record() {
    let (_temp_dir, db) = create_test_db();
    let record = sample_record("0.4");

    db.insert(&record).unwrap();
    let second = db.insert(&record);

    assert!(matches!(second, Err(StoreError::Duplicate(ref oid)) if oid == "0.4"));
    assert_eq!(db.count_nodes().unwrap(), 1);
}

#[test]
fn test_all_nodes_and_children_of() {
    let (_temp_dir, db) = create_test_db();

    db.insert(&sample_record("0.4")).unwrap();
    db.insert(&sample_record("0.3")).unwrap();
    let mut other_parent = sample_record("1.3");
    other_parent.parent = Some("1".to_string());
    db.insert(&other_parent).unwrap();

    let all: Vec<String> = db
        .all_nodes()
        .unwrap()
        .into_iter()
        .map(|r| r.dot_oid)
        .collect();
    assert_eq!(all, vec!["0.3", "0.4", "1.3"]);
    assert_eq!(db.children_of("0").unwrap(), vec!["0.3", "0.4"]);
}

#[test]
fn test_in_memory_database() {
    let db = Database::open_in_memory().unwrap();
    db.insert(&sample_record("2.5")).unwrap();
    assert_eq!(db.count_nodes().unwrap(), 1);
}

// ============================================================================
// Session Tests
// ============================================================================

#[test]
fn test_create_session() {
    let (_temp_dir, db) = create_test_db();

    let session_id = db.create_session("[\"0\",\"1\",\"2\"]", None).unwrap();
    assert!(!session_id.is_empty());

    let session = db.get_session(&session_id).unwrap().unwrap();
    assert_eq!(session.status, SessionStatus::Running);
    assert_eq!(session.end_time, None);
}

#[test]
fn test_create_multiple_sessions() {
    let (_temp_dir, db) = create_test_db();

    let session1 = db.create_session("[\"0\"]", None).unwrap();
    let session2 = db.create_session("[\"1\"]", Some("{\"max_depth\":3}")).unwrap();

    assert_ne!(session1, session2);
}

#[test]
fn test_complete_session() {
    let (_temp_dir, db) = create_test_db();

    let session_id = db.create_session("[\"0\"]", None).unwrap();
    db.complete_session(&session_id).unwrap();

    let session = db.get_session(&session_id).unwrap().unwrap();
    assert_eq!(session.status, SessionStatus::Completed);
    assert!(session.end_time.is_some());
}

#[test]
fn test_fail_session_records_abort_root() {
    let (_temp_dir, db) = create_test_db();

    let session_id = db.create_session("[\"0\",\"1\"]", None).unwrap();
    db.fail_session(&session_id, Some("1")).unwrap();

    let session = db.get_session(&session_id).unwrap().unwrap();
    assert_eq!(session.status, SessionStatus::Failed);
    assert_eq!(session.abort_root.as_deref(), Some("1"));

    let last = db.last_failed_session().unwrap().unwrap();
    assert_eq!(last.id, session_id);
}

#[test]
fn test_no_failed_session() {
    let (_temp_dir, db) = create_test_db();
    db.create_session("[\"0\"]", None).unwrap();
    assert!(db.last_failed_session().unwrap().is_none());
}
