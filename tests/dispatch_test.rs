mod common;

use anyhow::anyhow;
use common::{init_logging, Call, RecordingDriver};
use dyntable::{
    ActionKind, DynTableError, Outcome, QueryPredicate, Record, Registry, StoreDriver,
    ValidationResult, Value,
};
use serde_json::json;
use std::sync::{Arc, Mutex};

fn registry_with(driver: Arc<RecordingDriver>) -> Registry {
    init_logging();
    let registry = Registry::new();
    registry.add_connection("main", driver);
    registry
}

fn record(value: serde_json::Value) -> Record {
    Record::try_from_json(&value).unwrap()
}

fn error_of(err: &anyhow::Error) -> &DynTableError {
    err.downcast_ref::<DynTableError>()
        .unwrap_or_else(|| panic!("Not a DynTableError: {:?}", err))
}

#[test]
fn find_by_builds_the_predicate_in_column_order() {
    let driver = RecordingDriver::new();
    let registry = registry_with(driver.clone());
    let people = registry.create_context("People", None, None).unwrap();

    let outcome = people
        .dispatch("findByNameAndCity", &["Ann".into(), "Oslo".into()])
        .unwrap();
    assert_eq!(outcome, Outcome::Rows(vec![]));
    assert_eq!(
        driver.calls(),
        vec![Call::Find(
            "People".to_string(),
            QueryPredicate::new().and("name", "Ann").and("city", "Oslo")
        )]
    );
}

#[test]
fn find_by_returns_the_matching_rows() {
    let driver = RecordingDriver::new();
    driver
        .store
        .seed(
            "People",
            vec![
                record(json!({"Id": 1, "Name": "Ann", "City": "Oslo", "Age": 31})),
                record(json!({"Id": 2, "Name": "Ann", "City": "Bergen", "Age": 31})),
                record(json!({"Id": 3, "Name": "Bob", "City": "Oslo", "Age": 40})),
            ],
        )
        .unwrap();
    let registry = registry_with(driver.clone());
    let people = registry.create_context("People", None, None).unwrap();

    let rows = people.find_by("FindByNameAndAge", &["Ann".into(), 31.into()]).unwrap();
    assert_eq!(
        rows.iter().map(|r| r.get_i64("Id").unwrap()).collect::<Vec<_>>(),
        vec![1, 2]
    );

    let rows = people.find_by("find_by_city", &["Oslo".into()]).unwrap();
    assert_eq!(rows.len(), 2);
}

#[test]
fn too_few_arguments_are_rejected_before_reaching_the_store() {
    let driver = RecordingDriver::new();
    let registry = registry_with(driver.clone());
    let people = registry.create_context("People", None, None).unwrap();

    for method in ["findByNameAndCity", "findOrCreateByNameAndCity"] {
        let err = people.dispatch(method, &["Ann".into()]).unwrap_err();
        match error_of(&err) {
            DynTableError::ArgumentArityMismatch {
                method: m,
                expected,
                supplied,
            } => {
                assert_eq!(m, method);
                assert_eq!((*expected, *supplied), (2, 1));
            }
            other => panic!("Unexpected error: {:?}", other),
        }
    }
    assert!(driver.calls().is_empty());
}

#[test]
fn find_or_create_inserts_the_zipped_columns_when_nothing_is_found() {
    let driver = RecordingDriver::new();
    let registry = registry_with(driver.clone());
    let people = registry.create_context("People", None, None).unwrap();

    let outcome = people
        .dispatch(
            "findOrCreateByNameAndCity",
            &[
                "Ann".into(),
                "Oslo".into(),
                record(json!({"City": "Bergen", "Age": 31})).into(),
            ],
        )
        .unwrap();

    // The column values win over the seed; the seed only adds what is missing.
    let expected = record(json!({"name": "Ann", "city": "Oslo", "Age": 31}));
    assert_eq!(driver.inserts(), vec![expected.clone()]);
    match outcome {
        Outcome::Inserted { record, validation } => {
            assert_eq!(record, expected.with("Id", 1));
            assert!(validation.is_valid());
        }
        other => panic!("Unexpected outcome: {:?}", other),
    }
}

#[test]
fn find_or_create_returns_existing_rows_without_inserting() {
    let driver = RecordingDriver::new();
    let ann = record(json!({"Id": 7, "Name": "Ann", "City": "Oslo"}));
    driver.store.seed("People", vec![ann.clone()]).unwrap();
    let registry = registry_with(driver.clone());
    let people = registry.create_context("People", None, None).unwrap();

    let outcome = people
        .dispatch("findOrCreateByNameAndCity", &["Ann".into(), "Oslo".into()])
        .unwrap();
    assert_eq!(outcome, Outcome::Rows(vec![ann]));
    assert!(driver.inserts().is_empty());
}

#[test]
fn find_or_create_rejects_a_seed_that_is_not_a_record() {
    let driver = RecordingDriver::new();
    let registry = registry_with(driver.clone());
    let people = registry.create_context("People", None, None).unwrap();

    let err = people
        .dispatch("findOrCreateByName", &["Ann".into(), 12.into()])
        .unwrap_err();
    assert!(matches!(error_of(&err), DynTableError::ArgumentTypeError(_)));
    assert!(driver.inserts().is_empty());
}

#[test]
fn before_save_filters_run_in_registration_order() {
    let driver = RecordingDriver::new();
    let registry = registry_with(driver.clone());
    registry.register("Notes", |table| {
        table
            .before_save(|note| {
                let body = note.get_str("Body").unwrap_or("").to_string();
                note.insert("Body", format!("{}-first", body));
                Ok(())
            })
            .add_filter(ActionKind::BeforeSave, |note| {
                let body = note.get_str("Body").unwrap_or("").to_string();
                note.insert("Body", format!("{}-second", body));
                Ok(())
            })
            .before_delete(|note| {
                note.insert("Deleting", true);
                Ok(())
            })
    });
    let notes = registry.create_context("Notes", None, None).unwrap();

    notes
        .dispatch("insert", &[record(json!({"Body": "x"})).into()])
        .unwrap();
    assert_eq!(driver.inserts(), vec![record(json!({"Body": "x-first-second"}))]);

    // Delete filters do not run on save, and vice versa:
    let outcome = notes
        .dispatch("delete", &[record(json!({"Id": 1})).into()])
        .unwrap();
    assert_eq!(
        outcome,
        Outcome::Deleted(record(json!({"Id": 1, "Deleting": true})))
    );
    assert!(driver.store.rows("Notes").unwrap().is_empty());
}

#[test]
fn users_email_is_lower_cased_before_insert() {
    let driver = RecordingDriver::new();
    let registry = registry_with(driver.clone());
    registry.register("Users", |table| {
        table.set_primary_key("Id").before_save(|user| {
            if let Some(Value::String(email)) = user.get_mut("Email") {
                *email = email.to_lowercase();
            }
            Ok(())
        })
    });
    let users = registry.create_context("Users", None, None).unwrap();

    users
        .dispatch("insert", &[record(json!({"Email": "X@Y.com"})).into()])
        .unwrap();
    assert_eq!(driver.inserts(), vec![record(json!({"Email": "x@y.com"}))]);
}

#[test]
fn validators_report_failures_in_registration_order() {
    let driver = RecordingDriver::new();
    let registry = registry_with(driver.clone());
    registry.register("People", |table| {
        table
            .add_validator("required_name", |person| {
                person.get_str("Name").map_or(true, |n| n.is_empty())
            })
            .add_validator("positive_age", |person| {
                person.get_f64("Age").map_or(true, |a| a <= 0.0)
            })
            .add_validator("known_city", |person| person.get("City").is_none())
    });
    let people = registry.create_context("People", None, None).unwrap();

    let outcome = people
        .dispatch(
            "validate",
            &[record(json!({"Name": "", "Age": -1, "City": "Oslo"})).into()],
        )
        .unwrap();
    assert_eq!(
        outcome,
        Outcome::Validation(ValidationResult {
            failures: vec!["required_name".to_string(), "positive_age".to_string()]
        })
    );
    assert!(driver.calls().is_empty());

    // Failing validation does not prevent the insert; the failures are reported with it.
    let outcome = people
        .dispatch("insert", &[record(json!({"Name": "Ann", "Age": 0})).into()])
        .unwrap();
    match outcome {
        Outcome::Inserted { validation, .. } => assert_eq!(
            validation.failures(),
            &["positive_age".to_string(), "known_city".to_string()]
        ),
        other => panic!("Unexpected outcome: {:?}", other),
    }
    assert_eq!(driver.inserts().len(), 1);
}

#[test]
fn a_failing_filter_aborts_the_mutation() {
    let driver = RecordingDriver::new();
    let registry = registry_with(driver.clone());
    let trace = Arc::new(Mutex::new(vec![]));
    let (first, second) = (trace.clone(), trace.clone());
    registry.register("Accounts", |table| {
        table
            .before_delete(move |_| {
                first.lock().unwrap().push("first");
                Ok(())
            })
            .before_delete(move |_| {
                second.lock().unwrap().push("second");
                Err(anyhow!("Accounts cannot be deleted"))
            })
            .before_delete(|_| panic!("Filters after a failing filter must not run"))
    });
    let accounts = registry.create_context("Accounts", None, None).unwrap();

    let err = accounts
        .dispatch("delete", &[record(json!({"Id": 1})).into()])
        .unwrap_err();
    assert_eq!(err.to_string(), "Accounts cannot be deleted");
    assert_eq!(*trace.lock().unwrap(), vec!["first", "second"]);
    assert!(driver.calls().is_empty());
}

#[test]
fn unknown_methods_are_unresolved() {
    let driver = RecordingDriver::new();
    let registry = registry_with(driver.clone());
    let people = registry.create_context("People", None, None).unwrap();

    let err = people.dispatch("launchRocket", &[]).unwrap_err();
    assert!(matches!(error_of(&err), DynTableError::UnresolvedMember(_)));
    assert!(driver.calls().is_empty());
}

#[test]
fn direct_operations_check_their_arguments() {
    let driver = RecordingDriver::new();
    let registry = registry_with(driver.clone());
    let people = registry.create_context("People", None, None).unwrap();

    let err = people.dispatch("insert", &[]).unwrap_err();
    assert!(matches!(
        error_of(&err),
        DynTableError::ArgumentArityMismatch { expected: 1, supplied: 0, .. }
    ));
    let err = people.dispatch("insert", &["Ann".into()]).unwrap_err();
    assert!(matches!(error_of(&err), DynTableError::ArgumentTypeError(_)));
    let err = people.dispatch("all", &["Ann".into()]).unwrap_err();
    assert!(matches!(
        error_of(&err),
        DynTableError::ArgumentArityMismatch { expected: 0, supplied: 1, .. }
    ));
    let err = people.dispatch("update", &[record(json!({"Name": "Ann"})).into()]);
    assert!(matches!(
        error_of(&err.unwrap_err()),
        DynTableError::InputError(_)
    ));
}

#[test]
fn save_single_count_and_all() {
    let driver = RecordingDriver::new();
    let registry = registry_with(driver.clone());
    registry.register("People", |table| table.set_primary_key("PersonId"));
    let people = registry.create_context("People", None, None).unwrap();

    let outcome = people
        .dispatch("Save", &[record(json!({"Name": "Ann", "City": "Oslo"})).into()])
        .unwrap();
    let ann = match outcome {
        Outcome::Inserted { record, .. } => record,
        other => panic!("Unexpected outcome: {:?}", other),
    };
    assert_eq!(people.identity(&ann), Some(&Value::Integer(1)));
    people
        .dispatch("save", &[record(json!({"Name": "Bob", "City": "Oslo"})).into()])
        .unwrap();

    let outcome = people
        .dispatch("save", &[ann.clone().with("City", "Bergen").into()])
        .unwrap();
    assert!(matches!(outcome, Outcome::Updated { .. }));

    let outcome = people.dispatch("single", &[1.into()]).unwrap();
    assert_eq!(
        outcome,
        Outcome::Row(Some(record(
            json!({"Name": "Ann", "City": "Bergen", "PersonId": 1})
        )))
    );
    assert_eq!(
        people.dispatch("single", &[99.into()]).unwrap(),
        Outcome::Row(None)
    );
    assert_eq!(people.dispatch("count", &[]).unwrap(), Outcome::Count(2));
    assert_eq!(
        people
            .dispatch("count", &[record(json!({"City": "Oslo"})).into()])
            .unwrap(),
        Outcome::Count(1)
    );
    assert_eq!(people.dispatch("all", &[]).unwrap().records().len(), 2);
}

#[test]
fn registered_configuration_takes_precedence() {
    let main = RecordingDriver::new();
    let archive = RecordingDriver::new();
    let registry = registry_with(main.clone());
    registry.add_connection("archive", archive.clone());
    registry.register("Orders", |table| {
        table
            .set_table("order_archive")
            .set_connection("archive")
            .set_primary_key("OrderId")
    });

    let orders = registry
        .create_context("Orders", Some("main"), Some("Id"))
        .unwrap();
    assert_eq!(orders.table_name(), "order_archive");
    assert_eq!(orders.primary_key(), "OrderId");
    orders.dispatch("all", &[]).unwrap();
    assert!(main.calls().is_empty());
    assert_eq!(
        archive.calls(),
        vec![Call::Find("order_archive".to_string(), QueryPredicate::new())]
    );
}

#[test]
fn registering_again_replaces_the_configuration() {
    let driver = RecordingDriver::new();
    let registry = registry_with(driver.clone());
    registry.register("People", |table| {
        table
            .set_primary_key("PersonId")
            .add_validator("first", |_| true)
    });
    registry.register("People", |table| table.add_validator("second", |_| true));

    let config = registry.resolve("People").unwrap();
    assert_eq!(config.primary_key, "Id");
    assert_eq!(config.summary().validators, vec!["second"]);
    assert_eq!(registry.table_names(), vec!["People"]);
}

#[test]
fn unregistered_tables_pass_straight_through() {
    let main = RecordingDriver::new();
    let other = RecordingDriver::new();
    let registry = registry_with(main.clone());
    registry.add_connection("other", other.clone());

    let events = registry
        .create_context("Events", Some("other"), Some("EventId"))
        .unwrap();
    assert!(registry.resolve("Events").is_none());
    assert_eq!(events.primary_key(), "EventId");
    events
        .dispatch("insert", &[record(json!({"Kind": "login"})).into()])
        .unwrap();
    assert_eq!(other.inserts(), vec![record(json!({"Kind": "login"}))]);
    assert_eq!(
        other.store.rows("Events").unwrap(),
        vec![record(json!({"Kind": "login", "EventId": 1}))]
    );
    assert!(main.calls().is_empty());

    let defaulted = registry.create_context("Events", None, None).unwrap();
    assert_eq!(defaulted.primary_key(), "Id");
    assert_eq!(defaulted.dispatch("all", &[]).unwrap(), Outcome::Rows(vec![]));
    assert_eq!(main.calls().len(), 1);
}

#[test]
fn unknown_connections_are_configuration_errors() {
    let registry = Registry::new();
    let err = registry.create_context("People", None, None).unwrap_err();
    assert!(matches!(error_of(&err), DynTableError::ConfigError(_)));

    let registry = registry_with(RecordingDriver::new());
    let err = registry
        .create_context("People", Some("nowhere"), None)
        .unwrap_err();
    assert!(matches!(error_of(&err), DynTableError::ConfigError(_)));
}

#[test]
fn driver_errors_propagate_unchanged() {
    struct BrokenDriver;

    impl StoreDriver for BrokenDriver {
        fn find(&self, _: &str, _: &QueryPredicate) -> anyhow::Result<Vec<Record>> {
            Err(anyhow!("connection reset"))
        }
        fn insert(&self, _: &str, _: &str, _: Record) -> anyhow::Result<Record> {
            Err(anyhow!("disk full"))
        }
        fn update(&self, _: &str, _: &str, _: &Record) -> anyhow::Result<()> {
            unimplemented!()
        }
        fn delete(&self, _: &str, _: &str, _: &Record) -> anyhow::Result<()> {
            unimplemented!()
        }
    }

    let registry = Registry::new();
    registry.add_connection("broken", Arc::new(BrokenDriver));
    let people = registry.create_context("People", None, None).unwrap();
    let err = people.dispatch("findByName", &["Ann".into()]).unwrap_err();
    assert_eq!(err.to_string(), "connection reset");
    let err = people.dispatch("count", &[]).unwrap_err();
    assert_eq!(err.to_string(), "connection reset");
}
