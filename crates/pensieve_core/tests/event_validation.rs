use pensieve_core::api;
use pensieve_core::db::open_db_in_memory;
use pensieve_core::repo::activity_repo::ActivityRepository;
use pensieve_core::repo::property_repo::PropertyRepository;
use pensieve_core::service::event_validator::parse_supplied_values;
use pensieve_core::{
    Activity, ActivityId, ApiStatus, CatalogService, ErrorClass, EventValidator, Property,
    PropertyId, RepoResult, ServiceError, Shape, SuppliedValues, ValidationError, Value,
    ValueType,
};
use rusqlite::Connection;
use serde_json::{json, Value as JsonValue};
use std::collections::{BTreeMap, HashMap};
use uuid::Uuid;

struct Fixture {
    activity: ActivityId,
    p1: PropertyId,
    p2: PropertyId,
}

fn seed(service: &CatalogService<'_>) -> Fixture {
    let p1 = service.create_property("note", "", "string").unwrap();
    let p2 = service.create_property("count", "", "integer").unwrap();
    let activity = service
        .create_activity("journal", "", vec![p1.id, p2.id])
        .unwrap();
    Fixture {
        activity: activity.id,
        p1: p1.id,
        p2: p2.id,
    }
}

fn supplied(pairs: &[(PropertyId, JsonValue)]) -> SuppliedValues {
    pairs.iter().cloned().collect()
}

fn event_count(conn: &Connection) -> i64 {
    conn.query_row("SELECT COUNT(*) FROM events;", [], |row| row.get(0))
        .unwrap()
}

#[test]
fn omitted_values_are_filled_with_defaults_on_create() {
    let conn = open_db_in_memory().unwrap();
    let service = CatalogService::try_new(&conn).unwrap();
    let fixture = seed(&service);

    let event = service
        .create_event(fixture.activity, &SuppliedValues::new())
        .unwrap();

    let stored = service.get_event(event.id).unwrap();
    assert_eq!(stored.activity_id, fixture.activity);
    assert_eq!(stored.property_values.len(), 2);
    assert_eq!(stored.value_of(fixture.p1), Some(&Value::String(String::new())));
    assert_eq!(stored.value_of(fixture.p2), Some(&Value::Integer(0)));
}

#[test]
fn type_mismatch_is_rejected_and_nothing_is_stored() {
    let conn = open_db_in_memory().unwrap();
    let service = CatalogService::try_new(&conn).unwrap();
    let fixture = seed(&service);

    let err = service
        .create_event(
            fixture.activity,
            &supplied(&[(fixture.p2, json!("not a number"))]),
        )
        .unwrap_err();

    match &err {
        ServiceError::TypeMismatch {
            property_id,
            supplied,
            expected,
        } => {
            assert_eq!(*property_id, fixture.p2);
            assert_eq!(*supplied, Shape::String);
            assert_eq!(*expected, ValueType::Integer);
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(err.class(), ErrorClass::BadRequest);
    assert_eq!(event_count(&conn), 0);
}

#[test]
fn update_carries_forward_values_not_resupplied() {
    let conn = open_db_in_memory().unwrap();
    let service = CatalogService::try_new(&conn).unwrap();
    let fixture = seed(&service);

    let event = service
        .create_event(
            fixture.activity,
            &supplied(&[(fixture.p1, json!("rainy")), (fixture.p2, json!(3))]),
        )
        .unwrap();

    let previous = service
        .update_event(
            event.id,
            fixture.activity,
            &supplied(&[(fixture.p2, json!(4))]),
        )
        .unwrap();
    assert_eq!(previous.value_of(fixture.p2), Some(&Value::Integer(3)));

    let stored = service.get_event(event.id).unwrap();
    assert_eq!(stored.value_of(fixture.p1), Some(&Value::String("rainy".into())));
    assert_eq!(stored.value_of(fixture.p2), Some(&Value::Integer(4)));
}

#[test]
fn update_can_retarget_event_to_another_activity() {
    let conn = open_db_in_memory().unwrap();
    let service = CatalogService::try_new(&conn).unwrap();
    let fixture = seed(&service);
    let tags = service.create_property("tags", "", "string array").unwrap();
    let other = service
        .create_activity("reading", "", vec![tags.id])
        .unwrap();

    let event = service
        .create_event(fixture.activity, &SuppliedValues::new())
        .unwrap();
    service
        .update_event(event.id, other.id, &supplied(&[(tags.id, json!(["a", "b"]))]))
        .unwrap();

    let stored = service.get_event(event.id).unwrap();
    assert_eq!(stored.activity_id, other.id);
    assert_eq!(stored.property_values.len(), 1);
    assert_eq!(
        stored.value_of(tags.id),
        Some(&Value::StringArray(vec!["a".into(), "b".into()]))
    );
    assert!(service
        .list_events_by_activity(fixture.activity)
        .unwrap()
        .is_empty());
}

#[test]
fn timelings_reject_zero_timestamp_and_accept_real_instant() {
    let conn = open_db_in_memory().unwrap();
    let service = CatalogService::try_new(&conn).unwrap();
    let span = service.create_property("span", "", "timelings").unwrap();
    let activity = service.create_activity("nap", "", vec![span.id]).unwrap();

    let err = service
        .create_event(activity.id, &supplied(&[(span.id, json!({"start": 0}))]))
        .unwrap_err();
    assert!(matches!(
        err,
        ServiceError::InvalidTimestamp { ref timestamp, ref label, .. }
            if label == "start" && timestamp.as_i64() == Some(0)
    ));
    assert_eq!(event_count(&conn), 0);

    let event = service
        .create_event(
            activity.id,
            &supplied(&[(span.id, json!({"start": 1_700_000_000}))]),
        )
        .unwrap();
    let expected: BTreeMap<String, i64> = [("start".to_string(), 1_700_000_000)].into();
    assert_eq!(event.value_of(span.id), Some(&Value::Timelings(expected)));
}

#[test]
fn timelings_reject_timestamps_beyond_i64_as_invalid_timestamp() {
    let conn = open_db_in_memory().unwrap();
    let service = CatalogService::try_new(&conn).unwrap();
    let span = service.create_property("span", "", "timelings").unwrap();
    let activity = service.create_activity("nap", "", vec![span.id]).unwrap();

    let err = service
        .create_event(
            activity.id,
            &supplied(&[(span.id, json!({"start": 1_700_000_000, "end": u64::MAX}))]),
        )
        .unwrap_err();
    match &err {
        ServiceError::InvalidTimestamp {
            property_id,
            label,
            timestamp,
        } => {
            assert_eq!(*property_id, span.id);
            assert_eq!(label, "end");
            assert_eq!(timestamp.as_u64(), Some(u64::MAX));
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(err.to_string().contains("18446744073709551615"));
    assert_eq!(err.class(), ErrorClass::BadRequest);
    assert_eq!(event_count(&conn), 0);
}

#[test]
fn integer_literals_are_accepted_for_float_properties() {
    let conn = open_db_in_memory().unwrap();
    let service = CatalogService::try_new(&conn).unwrap();
    let pace = service.create_property("pace", "", "float").unwrap();
    let splits = service.create_property("splits", "", "float array").unwrap();
    let activity = service
        .create_activity("run", "", vec![pace.id, splits.id])
        .unwrap();

    let event = service
        .create_event(
            activity.id,
            &supplied(&[(pace.id, json!(5)), (splits.id, json!([1, 2.5]))]),
        )
        .unwrap();
    assert_eq!(event.value_of(pace.id), Some(&Value::Float(5.0)));
    assert_eq!(
        event.value_of(splits.id),
        Some(&Value::FloatArray(vec![1.0, 2.5]))
    );
}

#[test]
fn undeclared_keys_are_dropped() {
    let conn = open_db_in_memory().unwrap();
    let service = CatalogService::try_new(&conn).unwrap();
    let fixture = seed(&service);

    let stray = Uuid::new_v4();
    let event = service
        .create_event(fixture.activity, &supplied(&[(stray, json!(true))]))
        .unwrap();

    assert_eq!(event.property_values.len(), 2);
    assert!(event.value_of(stray).is_none());
}

#[test]
fn unknown_activity_is_not_found() {
    let conn = open_db_in_memory().unwrap();
    let service = CatalogService::try_new(&conn).unwrap();

    let err = service
        .create_event(Uuid::new_v4(), &SuppliedValues::new())
        .unwrap_err();
    assert_eq!(err.class(), ErrorClass::NotFound);
}

#[test]
fn malformed_property_keys_are_rejected() {
    let mut raw = BTreeMap::new();
    raw.insert("not-a-uuid".to_string(), json!(1));

    let err = parse_supplied_values(raw).unwrap_err();
    assert!(matches!(err, ValidationError::MalformedReference(ref key) if key == "not-a-uuid"));
}

#[test]
fn differently_spelled_duplicate_keys_are_rejected() {
    let id = Uuid::new_v4();
    let mut raw = BTreeMap::new();
    raw.insert(id.to_string().to_uppercase(), json!("bad"));
    raw.insert(id.to_string(), json!(5));

    let err = parse_supplied_values(raw).unwrap_err();
    assert!(matches!(err, ValidationError::MalformedReference(_)));
}

#[test]
fn duplicate_keys_are_a_bad_request_through_the_api() {
    let conn = open_db_in_memory().unwrap();
    let service = CatalogService::try_new(&conn).unwrap();
    let fixture = seed(&service);

    let body = json!({
        "activityID": fixture.activity.to_string(),
        "propertyValues": {
            fixture.p2.to_string().to_uppercase(): "bad",
            fixture.p2.to_string(): 5,
        },
    });
    let response = api::create_event(&service, &body.to_string());

    assert_eq!(response.status, ApiStatus::BadRequest);
    assert_eq!(event_count(&conn), 0);
}

#[derive(Default)]
struct MemoryProperties {
    records: HashMap<PropertyId, Property>,
}

impl PropertyRepository for MemoryProperties {
    fn create_property(&self, _property: &Property) -> RepoResult<PropertyId> {
        unimplemented!("read-only double")
    }
    fn update_property(&self, _property: &Property) -> RepoResult<()> {
        unimplemented!("read-only double")
    }
    fn get_property(&self, id: PropertyId) -> RepoResult<Option<Property>> {
        Ok(self.records.get(&id).cloned())
    }
    fn get_property_by_name(&self, name: &str) -> RepoResult<Option<Property>> {
        Ok(self.records.values().find(|p| p.name == name).cloned())
    }
    fn list_properties(&self) -> RepoResult<Vec<Property>> {
        Ok(self.records.values().cloned().collect())
    }
    fn delete_property(&self, _id: PropertyId) -> RepoResult<()> {
        unimplemented!("read-only double")
    }
}

#[derive(Default)]
struct MemoryActivities {
    records: HashMap<ActivityId, Activity>,
}

impl ActivityRepository for MemoryActivities {
    fn create_activity(&self, _activity: &Activity) -> RepoResult<ActivityId> {
        unimplemented!("read-only double")
    }
    fn update_activity(&self, _activity: &Activity) -> RepoResult<()> {
        unimplemented!("read-only double")
    }
    fn get_activity(&self, id: ActivityId) -> RepoResult<Option<Activity>> {
        Ok(self.records.get(&id).cloned())
    }
    fn get_activity_by_name(&self, name: &str) -> RepoResult<Option<Activity>> {
        Ok(self.records.values().find(|a| a.name == name).cloned())
    }
    fn list_activities(&self) -> RepoResult<Vec<Activity>> {
        Ok(self.records.values().cloned().collect())
    }
    fn list_activities_referencing(&self, property_id: PropertyId) -> RepoResult<Vec<Activity>> {
        Ok(self
            .records
            .values()
            .filter(|a| a.declares(property_id))
            .cloned()
            .collect())
    }
    fn delete_activity(&self, _id: ActivityId) -> RepoResult<()> {
        unimplemented!("read-only double")
    }
}

#[test]
fn validator_runs_against_in_memory_repositories() {
    let label = Property::new("label", "", ValueType::String);
    let dangling = Uuid::new_v4();
    let activity = Activity::new("walk", "", vec![label.id, label.id]);
    let broken = Activity::new("broken", "", vec![dangling]);

    let mut properties = MemoryProperties::default();
    properties.records.insert(label.id, label.clone());
    let mut activities = MemoryActivities::default();
    activities.records.insert(activity.id, activity.clone());
    activities.records.insert(broken.id, broken.clone());

    let validator = EventValidator::new(&properties, &activities);

    let validated = validator
        .validate(activity.id, &supplied(&[(label.id, json!("park"))]), None)
        .unwrap();
    assert_eq!(validated.property_values.len(), 1);
    assert_eq!(validated.property_values[0].value, Value::String("park".into()));

    let err = validator
        .validate(broken.id, &SuppliedValues::new(), None)
        .unwrap_err();
    assert!(matches!(err, ValidationError::PropertyNotFound(id) if id == dangling));
}
