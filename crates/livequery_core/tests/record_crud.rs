use livequery_core::db::{open_db, open_db_in_memory};
use livequery_core::{
    EntitySchema, FieldType, FieldValue, Filter, Record, RecordRepository, RecordValidationError,
    RepoError, SqliteRecordRepository,
};
use rusqlite::Connection;
use uuid::Uuid;

fn team(name: &str, zone: &str, wins: i64) -> Record {
    Record::new("Team")
        .with_field("teamName", name)
        .with_field("qualifyingZone", zone)
        .with_field("wins", wins)
}

fn team_schema() -> EntitySchema {
    EntitySchema::new("Team")
        .required("teamName", FieldType::Text)
        .required("qualifyingZone", FieldType::Text)
        .optional("wins", FieldType::Integer)
        .optional("imageName", FieldType::Text)
}

#[test]
fn insert_and_get_roundtrip() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteRecordRepository::try_new(&conn).unwrap();

    let brazil = team("Brazil", "South America", 3)
        .with_field("rating", 4.5)
        .with_field("flag", vec![0xde, 0xad]);
    let id = repo.insert_record(&brazil).unwrap();

    let loaded = repo.get_record(id).unwrap().unwrap();
    assert_eq!(loaded, brazil);
    assert_eq!(loaded.value("rating"), &FieldValue::Real(4.5));
    assert_eq!(loaded.value("missing"), &FieldValue::Null);
}

#[test]
fn update_replaces_fields() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteRecordRepository::try_new(&conn).unwrap();

    let mut brazil = team("Brazil", "South America", 3);
    repo.insert_record(&brazil).unwrap();

    brazil.set("wins", 4);
    brazil.remove("qualifyingZone");
    repo.update_record(&brazil).unwrap();

    let loaded = repo.get_record(brazil.id).unwrap().unwrap();
    assert_eq!(loaded.value("wins"), &FieldValue::Integer(4));
    assert!(loaded.field("qualifyingZone").is_none());
}

#[test]
fn update_and_delete_of_unknown_identity_return_not_found() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteRecordRepository::try_new(&conn).unwrap();

    let ghost = team("Atlantis", "Ocean", 0);
    assert!(matches!(
        repo.update_record(&ghost),
        Err(RepoError::NotFound(id)) if id == ghost.id
    ));
    assert!(matches!(
        repo.delete_record(ghost.id),
        Err(RepoError::NotFound(id)) if id == ghost.id
    ));
    assert!(!repo.has_staged_changes());
}

#[test]
fn update_cannot_change_kind() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteRecordRepository::try_new(&conn).unwrap();

    let brazil = team("Brazil", "South America", 3);
    repo.insert_record(&brazil).unwrap();

    let mut moved = brazil.clone();
    moved.kind = "Dog".to_string();
    let err = repo.update_record(&moved).unwrap_err();
    assert!(matches!(
        err,
        RepoError::Validation(RecordValidationError::KindChanged { .. })
    ));
}

#[test]
fn deleted_identity_is_retired_for_good() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteRecordRepository::try_new(&conn).unwrap();

    let brazil = team("Brazil", "South America", 3);
    repo.insert_record(&brazil).unwrap();
    repo.delete_record(brazil.id).unwrap();
    repo.flush().unwrap();

    assert!(repo.get_record(brazil.id).unwrap().is_none());
    let err = repo.insert_record(&brazil).unwrap_err();
    assert!(matches!(
        err,
        RepoError::Validation(RecordValidationError::RetiredIdentity(id)) if id == brazil.id
    ));
}

#[test]
fn duplicate_identity_is_rejected() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteRecordRepository::try_new(&conn).unwrap();

    let brazil = team("Brazil", "South America", 3);
    repo.insert_record(&brazil).unwrap();
    let err = repo.insert_record(&brazil).unwrap_err();
    assert!(matches!(
        err,
        RepoError::Validation(RecordValidationError::DuplicateIdentity(_))
    ));
}

#[test]
fn registered_schema_rejects_malformed_records() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteRecordRepository::try_new(&conn)
        .unwrap()
        .with_schema(team_schema());

    let missing_zone = Record::new("Team").with_field("teamName", "Brazil");
    assert!(matches!(
        repo.insert_record(&missing_zone),
        Err(RepoError::Validation(
            RecordValidationError::MissingRequiredField { .. }
        ))
    ));

    let wrong_type = team("Brazil", "South America", 3).with_field("imageName", 7);
    assert!(matches!(
        repo.insert_record(&wrong_type),
        Err(RepoError::Validation(RecordValidationError::TypeMismatch { .. }))
    ));

    let unknown = team("Brazil", "South America", 3).with_field("coach", "Tite");
    assert!(matches!(
        repo.insert_record(&unknown),
        Err(RepoError::Validation(RecordValidationError::UnknownField { .. }))
    ));

    assert_eq!(repo.count("Team", &Filter::All).unwrap(), 0);
}

#[test]
fn scan_filters_and_orders_by_identity() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteRecordRepository::try_new(&conn).unwrap();

    for (name, zone, wins) in [
        ("Brazil", "South America", 3),
        ("Argentina", "South America", 2),
        ("Germany", "Europe", 4),
    ] {
        repo.insert_record(&team(name, zone, wins)).unwrap();
    }
    repo.insert_record(&Record::new("Dog").with_field("name", "Rex"))
        .unwrap();

    let south = repo
        .scan("Team", &Filter::equals("qualifyingZone", "South America"))
        .unwrap();
    assert_eq!(south.len(), 2);
    assert!(south.windows(2).all(|pair| pair[0].id < pair[1].id));

    assert_eq!(repo.count("Team", &Filter::All).unwrap(), 3);
    assert_eq!(repo.count("Dog", &Filter::All).unwrap(), 1);
    assert_eq!(repo.count("Cat", &Filter::All).unwrap(), 0);
}

#[test]
fn sum_skips_nulls_and_rejects_text() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteRecordRepository::try_new(&conn).unwrap();

    repo.insert_record(&team("Brazil", "South America", 3)).unwrap();
    repo.insert_record(&Record::new("Team").with_field("teamName", "Nowhere"))
        .unwrap();
    assert_eq!(repo.sum("Team", &Filter::All, "wins").unwrap(), 3.0);

    repo.insert_record(&Record::new("Team").with_field("wins", "many"))
        .unwrap();
    assert!(matches!(
        repo.sum("Team", &Filter::All, "wins"),
        Err(RepoError::InvalidData(_))
    ));
}

#[test]
fn discard_rolls_back_staged_writes() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteRecordRepository::try_new(&conn).unwrap();

    let kept = team("Brazil", "South America", 3);
    repo.insert_record(&kept).unwrap();
    repo.flush().unwrap();
    assert!(!repo.has_staged_changes());

    repo.insert_record(&team("Germany", "Europe", 4)).unwrap();
    repo.delete_record(kept.id).unwrap();
    assert!(repo.has_staged_changes());

    repo.discard().unwrap();
    assert!(!repo.has_staged_changes());
    assert_eq!(repo.count("Team", &Filter::All).unwrap(), 1);
    assert!(repo.get_record(kept.id).unwrap().is_some());
}

#[test]
fn flushed_writes_survive_reopen_and_staged_writes_do_not() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("teams.db");

    let flushed = team("Brazil", "South America", 3);
    let staged = team("Germany", "Europe", 4);
    {
        let conn = open_db(&path).unwrap();
        let repo = SqliteRecordRepository::try_new(&conn).unwrap();
        repo.insert_record(&flushed).unwrap();
        repo.flush().unwrap();
        repo.insert_record(&staged).unwrap();
    }

    let conn = open_db(&path).unwrap();
    let repo = SqliteRecordRepository::try_new(&conn).unwrap();
    assert!(repo.get_record(flushed.id).unwrap().is_some());
    assert!(repo.get_record(staged.id).unwrap().is_none());
}

#[test]
fn try_new_requires_migrated_connection() {
    let conn = Connection::open_in_memory().unwrap();
    match SqliteRecordRepository::try_new(&conn) {
        Err(RepoError::UninitializedConnection {
            expected_version,
            actual_version,
        }) => {
            assert_eq!(actual_version, 0);
            assert!(expected_version > 0);
        }
        Err(other) => panic!("unexpected error: {other}"),
        Ok(_) => panic!("unmigrated connection must be rejected"),
    }
}

#[test]
fn malformed_fields_row_is_reported() {
    let conn = open_db_in_memory().unwrap();
    let id = Uuid::new_v4();
    conn.execute(
        "INSERT INTO records (uuid, kind, fields) VALUES (?1, 'Team', 'not json');",
        [id.to_string()],
    )
    .unwrap();

    let repo = SqliteRecordRepository::try_new(&conn).unwrap();
    assert!(matches!(
        repo.get_record(id),
        Err(RepoError::InvalidData(_))
    ));
}

#[test]
fn try_new_requires_record_tables() {
    let conn = open_db_in_memory().unwrap();
    conn.execute_batch("DROP TABLE retired_record_ids;").unwrap();
    assert!(matches!(
        SqliteRecordRepository::try_new(&conn),
        Err(RepoError::MissingRequiredTable("retired_record_ids"))
    ));
}

#[test]
fn reals_read_back_bit_for_bit() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteRecordRepository::try_new(&conn).unwrap();

    for i in 1..2_000_u32 {
        let rating = f64::from(i) / 7.0 * 1.37e5;
        let id = repo
            .insert_record(&Record::new("Team").with_field("rating", rating))
            .unwrap();
        let loaded = repo.get_record(id).unwrap().unwrap();
        match loaded.value("rating") {
            FieldValue::Real(stored) => assert_eq!(stored.to_bits(), rating.to_bits(), "i={i}"),
            other => panic!("expected a real, got {other:?}"),
        }
    }

    let exact = Filter::equals("rating", 9_100_714.285_714_285);
    repo.insert_record(&Record::new("Rating").with_field("rating", 9_100_714.285_714_285))
        .unwrap();
    assert_eq!(repo.count("Rating", &exact).unwrap(), 1);
}

#[test]
fn failed_retirement_keeps_the_deleted_row() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteRecordRepository::try_new(&conn).unwrap();
    let brazil = team("Brazil", "South America", 3);
    let id = repo.insert_record(&brazil).unwrap();
    conn.execute_batch(
        "CREATE TEMP TRIGGER block_retire BEFORE INSERT ON retired_record_ids
         BEGIN SELECT RAISE(ABORT, 'retirement blocked'); END;",
    )
    .unwrap();

    assert!(matches!(
        repo.delete_record(id),
        Err(RepoError::StorageUnavailable(_))
    ));
    assert_eq!(repo.get_record(id).unwrap(), Some(brazil));

    conn.execute_batch("DROP TRIGGER block_retire;").unwrap();
    repo.delete_record(id).unwrap();
    assert!(repo.get_record(id).unwrap().is_none());
}

#[test]
fn rolled_back_batch_keeps_earlier_staged_writes() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteRecordRepository::try_new(&conn).unwrap();
    let brazil_id = repo.insert_record(&team("Brazil", "South America", 3)).unwrap();

    repo.begin_batch().unwrap();
    let germany_id = repo.insert_record(&team("Germany", "Europe", 4)).unwrap();
    repo.rollback_batch().unwrap();

    assert!(repo.has_staged_changes());
    assert!(repo.get_record(brazil_id).unwrap().is_some());
    assert!(repo.get_record(germany_id).unwrap().is_none());

    repo.begin_batch().unwrap();
    let japan_id = repo.insert_record(&team("Japan", "Asia", 2)).unwrap();
    repo.commit_batch().unwrap();
    repo.flush().unwrap();
    assert!(!repo.has_staged_changes());
    assert!(repo.get_record(japan_id).unwrap().is_some());
    assert_eq!(repo.count("Team", &Filter::All).unwrap(), 2);
}
