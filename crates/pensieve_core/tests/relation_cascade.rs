use pensieve_core::db::open_db_in_memory;
use pensieve_core::repo::activity_repo::SqliteActivityRepository;
use pensieve_core::repo::event_repo::SqliteEventRepository;
use pensieve_core::repo::property_repo::SqlitePropertyRepository;
use pensieve_core::{
    ActivityUpdate, CascadeError, CascadeReport, CatalogService, ErrorClass, PropertyUpdate,
    RelationMaintainer, ServiceError, SuppliedValues, Value, ValueType,
};
use rusqlite::Connection;
use serde_json::json;
use uuid::Uuid;

fn values(pairs: &[(Uuid, serde_json::Value)]) -> SuppliedValues {
    pairs.iter().cloned().collect()
}

#[test]
fn adding_a_property_gives_every_event_its_default() {
    let conn = open_db_in_memory().unwrap();
    let service = CatalogService::try_new(&conn).unwrap();
    let p1 = service.create_property("note", "", "string").unwrap();
    let p3 = service.create_property("pace", "", "float").unwrap();
    let activity = service.create_activity("run", "", vec![p1.id]).unwrap();
    let first = service
        .create_event(activity.id, &values(&[(p1.id, json!("easy"))]))
        .unwrap();
    let second = service
        .create_event(activity.id, &SuppliedValues::new())
        .unwrap();

    let previous = service
        .update_activity(
            activity.id,
            &ActivityUpdate {
                defined_properties: Some(vec![p1.id, p3.id]),
                ..ActivityUpdate::default()
            },
        )
        .unwrap();
    assert_eq!(previous.defined_properties, vec![p1.id]);

    for id in [first.id, second.id] {
        let event = service.get_event(id).unwrap();
        assert_eq!(event.value_of(p3.id), Some(&Value::Float(0.0)));
    }
    assert_eq!(
        service.get_event(first.id).unwrap().value_of(p1.id),
        Some(&Value::String("easy".into()))
    );
}

#[test]
fn removing_a_property_drops_the_key_from_every_event() {
    let conn = open_db_in_memory().unwrap();
    let service = CatalogService::try_new(&conn).unwrap();
    let p1 = service.create_property("note", "", "string").unwrap();
    let p2 = service.create_property("count", "", "integer").unwrap();
    let activity = service
        .create_activity("journal", "", vec![p1.id, p2.id])
        .unwrap();
    let event = service
        .create_event(activity.id, &values(&[(p2.id, json!(9))]))
        .unwrap();

    service
        .update_activity(
            activity.id,
            &ActivityUpdate {
                defined_properties: Some(vec![p2.id]),
                ..ActivityUpdate::default()
            },
        )
        .unwrap();

    let stored = service.get_event(event.id).unwrap();
    assert!(stored.value_of(p1.id).is_none());
    assert_eq!(stored.value_of(p2.id), Some(&Value::Integer(9)));
    assert_eq!(stored.property_values.len(), 1);
}

#[test]
fn duplicate_count_changes_leave_values_untouched() {
    let conn = open_db_in_memory().unwrap();
    let service = CatalogService::try_new(&conn).unwrap();
    let p1 = service.create_property("count", "", "integer").unwrap();
    let activity = service.create_activity("lift", "", vec![p1.id]).unwrap();
    let event = service
        .create_event(activity.id, &values(&[(p1.id, json!(5))]))
        .unwrap();

    for defined in [vec![p1.id, p1.id], vec![p1.id]] {
        service
            .update_activity(
                activity.id,
                &ActivityUpdate {
                    defined_properties: Some(defined),
                    ..ActivityUpdate::default()
                },
            )
            .unwrap();
        let stored = service.get_event(event.id).unwrap();
        assert_eq!(stored.value_of(p1.id), Some(&Value::Integer(5)));
    }
}

#[test]
fn activity_update_rejects_unknown_property_without_writing() {
    let conn = open_db_in_memory().unwrap();
    let service = CatalogService::try_new(&conn).unwrap();
    let p1 = service.create_property("note", "", "string").unwrap();
    let activity = service.create_activity("journal", "", vec![p1.id]).unwrap();

    let err = service
        .update_activity(
            activity.id,
            &ActivityUpdate {
                name: Some("renamed".to_string()),
                defined_properties: Some(vec![p1.id, Uuid::new_v4()]),
                ..ActivityUpdate::default()
            },
        )
        .unwrap_err();
    assert_eq!(err.class(), ErrorClass::NotFound);

    let stored = service.get_activity(activity.id).unwrap();
    assert_eq!(stored.name, "journal");
    assert_eq!(stored.defined_properties, vec![p1.id]);
}

#[test]
fn deleting_a_property_removes_every_reference() {
    let conn = open_db_in_memory().unwrap();
    let service = CatalogService::try_new(&conn).unwrap();
    let p1 = service.create_property("note", "", "string").unwrap();
    let p2 = service.create_property("count", "", "integer").unwrap();
    let journal = service
        .create_activity("journal", "", vec![p1.id, p2.id])
        .unwrap();
    let tally = service.create_activity("tally", "", vec![p2.id, p2.id]).unwrap();
    for activity in [journal.id, journal.id, tally.id] {
        service
            .create_event(activity, &SuppliedValues::new())
            .unwrap();
    }

    service.delete_property(p2.id).unwrap();

    assert_eq!(
        service.get_property(p2.id).unwrap_err().class(),
        ErrorClass::NotFound
    );
    for activity in service.list_activities().unwrap() {
        assert!(!activity.declares(p2.id), "{} still declares", activity.name);
    }
    for event in service.list_events().unwrap() {
        assert!(event.value_of(p2.id).is_none());
    }
    assert_eq!(
        service.get_activity(journal.id).unwrap().defined_properties,
        vec![p1.id]
    );
    assert!(service
        .get_activity(tally.id)
        .unwrap()
        .defined_properties
        .is_empty());
}

#[test]
fn resaving_the_same_type_keeps_event_values() {
    let conn = open_db_in_memory().unwrap();
    let service = CatalogService::try_new(&conn).unwrap();
    let p2 = service.create_property("count", "", "integer").unwrap();
    let activity = service.create_activity("tally", "", vec![p2.id]).unwrap();
    let event = service
        .create_event(activity.id, &values(&[(p2.id, json!(42))]))
        .unwrap();

    service
        .update_property(
            p2.id,
            &PropertyUpdate {
                value_data_type: Some("Number".to_string()),
                description: Some("same type via alias".to_string()),
                ..PropertyUpdate::default()
            },
        )
        .unwrap();

    assert_eq!(
        service.get_event(event.id).unwrap().value_of(p2.id),
        Some(&Value::Integer(42))
    );
    assert_eq!(
        service.get_property(p2.id).unwrap().description,
        "same type via alias"
    );
}

#[test]
fn changing_the_type_resets_values_to_the_new_default() {
    let conn = open_db_in_memory().unwrap();
    let service = CatalogService::try_new(&conn).unwrap();
    let p2 = service.create_property("count", "", "integer").unwrap();
    let activity = service.create_activity("tally", "", vec![p2.id]).unwrap();
    let event = service
        .create_event(activity.id, &values(&[(p2.id, json!(42))]))
        .unwrap();

    let previous = service
        .update_property(
            p2.id,
            &PropertyUpdate {
                value_data_type: Some("string array".to_string()),
                ..PropertyUpdate::default()
            },
        )
        .unwrap();
    assert_eq!(previous.value_data_type.as_str(), "integer");

    assert_eq!(
        service.get_event(event.id).unwrap().value_of(p2.id),
        Some(&Value::StringArray(Vec::new()))
    );
}

#[test]
fn type_change_report_counts_only_written_events() {
    let conn = open_db_in_memory().unwrap();
    let service = CatalogService::try_new(&conn).unwrap();
    let p2 = service.create_property("count", "", "integer").unwrap();
    let tally = service.create_activity("tally", "", vec![p2.id]).unwrap();
    service.create_activity("empty", "", vec![p2.id]).unwrap();
    service
        .create_event(tally.id, &values(&[(p2.id, json!(3))]))
        .unwrap();

    let properties = SqlitePropertyRepository::try_new(&conn).unwrap();
    let activities = SqliteActivityRepository::try_new(&conn).unwrap();
    let events = SqliteEventRepository::try_new(&conn).unwrap();
    let maintainer = RelationMaintainer::new(&properties, &activities, &events);

    let report = maintainer
        .property_type_changed(p2.id, ValueType::Integer, ValueType::Float)
        .unwrap();
    assert_eq!(
        report,
        CascadeReport {
            activities_updated: 0,
            events_updated: 1,
        }
    );

    let unchanged = maintainer
        .property_type_changed(p2.id, ValueType::Float, ValueType::Float)
        .unwrap();
    assert_eq!(unchanged, CascadeReport::default());
}

#[test]
fn invalid_value_type_is_a_bad_request() {
    let conn = open_db_in_memory().unwrap();
    let service = CatalogService::try_new(&conn).unwrap();

    let err = service.create_property("mood", "", "colour").unwrap_err();
    assert!(matches!(err, ServiceError::InvalidValueType(_)));
    assert_eq!(err.class(), ErrorClass::BadRequest);
    assert!(service.list_properties().unwrap().is_empty());
}

#[test]
fn deleting_an_activity_keeps_its_events() {
    let conn = open_db_in_memory().unwrap();
    let service = CatalogService::try_new(&conn).unwrap();
    let activity = service.create_activity("idle", "", Vec::new()).unwrap();
    let event = service
        .create_event(activity.id, &SuppliedValues::new())
        .unwrap();

    service.delete_activity(activity.id).unwrap();

    assert_eq!(service.get_event(event.id).unwrap().activity_id, activity.id);
}

#[test]
fn corrupted_event_aborts_the_cascade_and_rolls_back() {
    let conn = open_db_in_memory().unwrap();
    let service = CatalogService::try_new(&conn).unwrap();
    let p1 = service.create_property("note", "", "string").unwrap();
    let p2 = service.create_property("count", "", "integer").unwrap();
    let activity = service
        .create_activity("journal", "", vec![p1.id, p2.id])
        .unwrap();
    let healthy = service
        .create_event(activity.id, &SuppliedValues::new())
        .unwrap();
    let corrupted = service
        .create_event(activity.id, &SuppliedValues::new())
        .unwrap();
    strip_value(&conn, corrupted.id, p2.id);

    let err = service.delete_property(p2.id).unwrap_err();
    match &err {
        ServiceError::CascadeInvariant(CascadeError::MissingEventValue {
            event_id,
            property_id,
            ..
        }) => {
            assert_eq!(*event_id, corrupted.id);
            assert_eq!(*property_id, p2.id);
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(err.class(), ErrorClass::ServerFault);

    assert_eq!(service.get_property(p2.id).unwrap().name, "count");
    assert!(service.get_activity(activity.id).unwrap().declares(p2.id));
    assert_eq!(
        service.get_event(healthy.id).unwrap().value_of(p2.id),
        Some(&Value::Integer(0))
    );
}

fn strip_value(conn: &Connection, event_id: Uuid, property_id: Uuid) {
    conn.execute(
        "UPDATE events
         SET property_values = (
            SELECT json_group_array(json(item.value))
            FROM json_each(events.property_values) item
            WHERE json_extract(item.value, '$.key') != ?2
         )
         WHERE id = ?1;",
        [event_id.to_string(), property_id.to_string()],
    )
    .unwrap();
}
