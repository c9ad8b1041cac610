use livequery_core::db::open_db_in_memory;
use livequery_core::{
    import_seed_if_empty, ChangeLog, EntitySchema, FetchRequest, FieldType, FieldValue, Filter,
    QueryError, QueryService, Record, RepoError, SectionKey, SeedError, SeedImportReport, SortField,
    SqliteRecordRepository,
};

const TEAMS_JSON: &str = r#"[
    {"teamName": "Brazil", "qualifyingZone": "South America", "imageName": "brazil-flag", "wins": 3},
    {"teamName": "Germany", "qualifyingZone": "Europe", "imageName": "germany-flag", "wins": 4},
    {"teamName": "Argentina", "qualifyingZone": "South America", "imageName": "argentina-flag", "wins": 2}
]"#;

fn team_schema() -> EntitySchema {
    EntitySchema::new("Team")
        .required("teamName", FieldType::Text)
        .required("qualifyingZone", FieldType::Text)
        .optional("imageName", FieldType::Text)
        .optional("wins", FieldType::Integer)
}

#[test]
fn imports_into_empty_collection_and_reloads_projections() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteRecordRepository::try_new(&conn)
        .unwrap()
        .with_schema(team_schema());
    let mut service = QueryService::new(repo);

    let log = ChangeLog::new();
    let handle = service
        .open(
            FetchRequest::new("Team")
                .sectioned_by(SectionKey::field("qualifyingZone"))
                .sorted_by(SortField::descending("wins")),
            Box::new(log.clone()),
        )
        .unwrap();

    let report = import_seed_if_empty(&mut service, "Team", TEAMS_JSON).unwrap();
    assert_eq!(report, SeedImportReport::Imported { count: 3 });
    assert!(!service.has_staged_changes());
    assert_eq!(service.count("Team", &Filter::All).unwrap(), 3);
    assert_eq!(service.sum("Team", &Filter::All, "wins").unwrap(), 9.0);

    assert_eq!(log.reload_count(), 1);
    assert_eq!(log.batch_count(), 0, "bulk import sends no row events");
    let layout = service.layout(handle).unwrap();
    assert_eq!(layout.sections().len(), 2);
    assert_eq!(layout.len(), 3);
}

#[test]
fn non_empty_collection_is_skipped() {
    let conn = open_db_in_memory().unwrap();
    let mut service = QueryService::new(SqliteRecordRepository::try_new(&conn).unwrap());

    import_seed_if_empty(&mut service, "Team", TEAMS_JSON).unwrap();
    let report = import_seed_if_empty(&mut service, "Team", TEAMS_JSON).unwrap();

    assert_eq!(report, SeedImportReport::Skipped { existing: 3 });
    assert_eq!(report.imported_count(), 0);
    assert_eq!(service.count("Team", &Filter::All).unwrap(), 3);
}

#[test]
fn failing_record_discards_whole_import() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteRecordRepository::try_new(&conn)
        .unwrap()
        .with_schema(team_schema());
    let mut service = QueryService::new(repo);

    let broken = r#"[
        {"teamName": "Brazil", "qualifyingZone": "South America", "wins": 3},
        {"teamName": "Nowhere"}
    ]"#;
    let err = import_seed_if_empty(&mut service, "Team", broken).unwrap_err();

    assert!(matches!(
        err,
        SeedError::Query(QueryError::Repo(RepoError::Validation(_)))
    ));
    assert!(!service.has_staged_changes());
    assert_eq!(service.count("Team", &Filter::All).unwrap(), 0);
}

#[test]
fn failed_import_keeps_writes_staged_before_it() {
    let conn = open_db_in_memory().unwrap();
    let mut service = QueryService::new(SqliteRecordRepository::try_new(&conn).unwrap());
    let rex = Record::new("Dog").with_field("name", "Rex");
    let rex_id = service.insert_record(rex.clone()).unwrap();

    let err = import_seed_if_empty(&mut service, "Team", r#"[{"a": 1}, {"": 2}]"#).unwrap_err();

    assert!(matches!(
        err,
        SeedError::Query(QueryError::Repo(RepoError::Validation(_)))
    ));
    assert_eq!(service.count("Team", &Filter::All).unwrap(), 0);
    assert_eq!(service.get_record(rex_id).unwrap(), Some(rex));
    assert!(service.has_staged_changes(), "the staged dog is not flushed");
}

#[test]
fn successful_import_leaves_earlier_staged_writes_to_the_caller() {
    let conn = open_db_in_memory().unwrap();
    let mut service = QueryService::new(SqliteRecordRepository::try_new(&conn).unwrap());
    let rex_id = service
        .insert_record(Record::new("Dog").with_field("name", "Rex"))
        .unwrap();

    let report = import_seed_if_empty(&mut service, "Team", TEAMS_JSON).unwrap();
    assert_eq!(report.imported_count(), 3);
    assert!(service.has_staged_changes());

    service.discard().unwrap();
    assert_eq!(service.get_record(rex_id).unwrap(), None);
    assert_eq!(service.count("Team", &Filter::All).unwrap(), 0);
}

#[test]
fn malformed_document_writes_nothing() {
    let conn = open_db_in_memory().unwrap();
    let mut service = QueryService::new(SqliteRecordRepository::try_new(&conn).unwrap());

    let err = import_seed_if_empty(&mut service, "Team", r#"{"teamName": "Brazil"}"#).unwrap_err();
    assert!(matches!(err, SeedError::InvalidDocument(_)));
    assert_eq!(service.count("Team", &Filter::All).unwrap(), 0);
}

#[test]
fn schema_types_reference_fields_for_related_lookups() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteRecordRepository::try_new(&conn)
        .unwrap()
        .with_schema(
            EntitySchema::new("Walk")
                .required("date", FieldType::Date)
                .required("dog", FieldType::Reference),
        );
    let mut service = QueryService::new(repo);

    let dog_id = "6f9619ff-8b86-4d01-b42d-00cf4fc964ff";
    let walks = format!(
        r#"[{{"date": 1700000000000, "dog": "{dog_id}"}}, {{"date": 1700000600000, "dog": "{dog_id}"}}]"#
    );
    import_seed_if_empty(&mut service, "Walk", &walks).unwrap();

    let dog = uuid::Uuid::parse_str(dog_id).unwrap();
    let request = FetchRequest::new("Walk")
        .with_filter(Filter::equals("dog", dog))
        .sorted_by(SortField::descending("date"));
    let fetched = service.fetch(&request).unwrap();
    assert_eq!(fetched.len(), 2);
    assert_eq!(fetched[0].value("date"), &FieldValue::Date(1_700_000_600_000));
}
