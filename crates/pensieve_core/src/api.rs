//! Request-level API adapter over the catalog service.
//!
//! # Responsibility
//! - Decode JSON request bodies and path ids for every REST verb.
//! - Map service outcomes to status-tagged JSON response envelopes.
//!
//! # Invariants
//! - Endpoint functions never panic; every failure becomes a response.
//! - Error bodies are `{"error": <message>}`.
//! - Event bodies use the plain wire form of values, never the stored form.

use crate::model::event::Event;
use crate::service::catalog_service::{
    ActivityUpdate, CatalogService, ErrorClass, PropertyUpdate, ServiceError,
};
use crate::service::event_validator::{parse_reference, parse_supplied_values, SuppliedValues};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value as JsonValue};
use std::collections::BTreeMap;
use uuid::Uuid;

/// Response status with its HTTP equivalent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiStatus {
    Ok,
    Created,
    NoContent,
    BadRequest,
    NotFound,
    ServerFault,
}

impl ApiStatus {
    pub fn http_code(self) -> u16 {
        match self {
            Self::Ok => 200,
            Self::Created => 201,
            Self::NoContent => 204,
            Self::BadRequest => 400,
            Self::NotFound => 404,
            Self::ServerFault => 500,
        }
    }

    pub fn is_success(self) -> bool {
        matches!(self, Self::Ok | Self::Created | Self::NoContent)
    }
}

impl From<ErrorClass> for ApiStatus {
    fn from(value: ErrorClass) -> Self {
        match value {
            ErrorClass::NotFound => Self::NotFound,
            ErrorClass::BadRequest => Self::BadRequest,
            ErrorClass::ServerFault => Self::ServerFault,
        }
    }
}

/// Response envelope returned by every endpoint.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiResponse {
    pub status: ApiStatus,
    /// `Null` for `NoContent`.
    pub body: JsonValue,
}

impl ApiResponse {
    fn success(status: ApiStatus, body: JsonValue) -> Self {
        Self { status, body }
    }

    fn no_content() -> Self {
        Self {
            status: ApiStatus::NoContent,
            body: JsonValue::Null,
        }
    }

    fn failure(status: ApiStatus, message: impl Into<String>) -> Self {
        Self {
            status,
            body: json!({ "error": message.into() }),
        }
    }
}

impl From<ServiceError> for ApiResponse {
    fn from(value: ServiceError) -> Self {
        Self::failure(value.class().into(), value.to_string())
    }
}

/// Property create/update payload. Absent fields stay untouched on update.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PropertyRequest {
    pub name: Option<String>,
    pub description: Option<String>,
    pub value_data_type: Option<String>,
}

/// Activity create/update payload.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ActivityRequest {
    pub name: Option<String>,
    pub description: Option<String>,
    pub defined_properties: Option<Vec<String>>,
}

/// Event create/update payload keyed by stringified property ids.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct EventRequest {
    #[serde(rename = "activityID", default)]
    pub activity_id: String,
    #[serde(rename = "propertyValues", default)]
    pub property_values: BTreeMap<String, JsonValue>,
}

/// Renders an event in wire form with plain JSON values.
pub fn event_to_wire(event: &Event) -> JsonValue {
    let property_values: Vec<JsonValue> = event
        .property_values
        .iter()
        .map(|pair| json!({ "key": pair.key, "value": pair.value.to_json() }))
        .collect();
    json!({
        "id": event.id,
        "activityID": event.activity_id,
        "propertyValues": property_values,
    })
}

// ---- properties ----

/// `POST /properties`
pub fn create_property(service: &CatalogService<'_>, body: &str) -> ApiResponse {
    let request: PropertyRequest = match decode_body(body) {
        Ok(request) => request,
        Err(response) => return response,
    };
    respond(
        ApiStatus::Created,
        service.create_property(
            request.name.as_deref().unwrap_or_default(),
            request.description.as_deref().unwrap_or_default(),
            request.value_data_type.as_deref().unwrap_or_default(),
        ),
    )
}

/// `PUT /properties/{id}`; responds with the previous document.
pub fn update_property(service: &CatalogService<'_>, id: &str, body: &str) -> ApiResponse {
    let id = match parse_id(id) {
        Ok(id) => id,
        Err(response) => return response,
    };
    let request: PropertyRequest = match decode_body(body) {
        Ok(request) => request,
        Err(response) => return response,
    };
    let update = PropertyUpdate {
        name: request.name,
        description: request.description,
        value_data_type: request.value_data_type,
    };
    respond(ApiStatus::Ok, service.update_property(id, &update))
}

/// `DELETE /properties/{id}`
pub fn delete_property(service: &CatalogService<'_>, id: &str) -> ApiResponse {
    match parse_id(id) {
        Ok(id) => respond_empty(service.delete_property(id)),
        Err(response) => response,
    }
}

/// `GET /properties/{id}`
pub fn get_property(service: &CatalogService<'_>, id: &str) -> ApiResponse {
    match parse_id(id) {
        Ok(id) => respond(ApiStatus::Ok, service.get_property(id)),
        Err(response) => response,
    }
}

/// `GET /properties/ByName/{name}`
pub fn get_property_by_name(service: &CatalogService<'_>, name: &str) -> ApiResponse {
    respond(ApiStatus::Ok, service.get_property_by_name(name))
}

/// `GET /properties`
pub fn list_properties(service: &CatalogService<'_>) -> ApiResponse {
    respond(ApiStatus::Ok, service.list_properties())
}

// ---- activities ----

/// `POST /activities`
pub fn create_activity(service: &CatalogService<'_>, body: &str) -> ApiResponse {
    let request: ActivityRequest = match decode_body(body) {
        Ok(request) => request,
        Err(response) => return response,
    };
    let defined_properties = match parse_ids(request.defined_properties.unwrap_or_default()) {
        Ok(ids) => ids,
        Err(response) => return response,
    };
    respond(
        ApiStatus::Created,
        service.create_activity(
            request.name.as_deref().unwrap_or_default(),
            request.description.as_deref().unwrap_or_default(),
            defined_properties,
        ),
    )
}

/// `PUT /activities/{id}`; responds with the previous document.
pub fn update_activity(service: &CatalogService<'_>, id: &str, body: &str) -> ApiResponse {
    let id = match parse_id(id) {
        Ok(id) => id,
        Err(response) => return response,
    };
    let request: ActivityRequest = match decode_body(body) {
        Ok(request) => request,
        Err(response) => return response,
    };
    let defined_properties = match request.defined_properties.map(parse_ids).transpose() {
        Ok(ids) => ids,
        Err(response) => return response,
    };
    let update = ActivityUpdate {
        name: request.name,
        description: request.description,
        defined_properties,
    };
    respond(ApiStatus::Ok, service.update_activity(id, &update))
}

/// `DELETE /activities/{id}`
pub fn delete_activity(service: &CatalogService<'_>, id: &str) -> ApiResponse {
    match parse_id(id) {
        Ok(id) => respond_empty(service.delete_activity(id)),
        Err(response) => response,
    }
}

/// `GET /activities/{id}`
pub fn get_activity(service: &CatalogService<'_>, id: &str) -> ApiResponse {
    match parse_id(id) {
        Ok(id) => respond(ApiStatus::Ok, service.get_activity(id)),
        Err(response) => response,
    }
}

/// `GET /activities/ByName/{name}`
pub fn get_activity_by_name(service: &CatalogService<'_>, name: &str) -> ApiResponse {
    respond(ApiStatus::Ok, service.get_activity_by_name(name))
}

/// `GET /activities`
pub fn list_activities(service: &CatalogService<'_>) -> ApiResponse {
    respond(ApiStatus::Ok, service.list_activities())
}

// ---- events ----

/// `POST /events`
pub fn create_event(service: &CatalogService<'_>, body: &str) -> ApiResponse {
    let (activity_id, supplied) = match decode_event_body(body) {
        Ok(parts) => parts,
        Err(response) => return response,
    };
    match service.create_event(activity_id, &supplied) {
        Ok(event) => ApiResponse::success(ApiStatus::Created, event_to_wire(&event)),
        Err(err) => err.into(),
    }
}

/// `PUT /events/{id}`; responds with the previous document.
pub fn update_event(service: &CatalogService<'_>, id: &str, body: &str) -> ApiResponse {
    let id = match parse_id(id) {
        Ok(id) => id,
        Err(response) => return response,
    };
    let (activity_id, supplied) = match decode_event_body(body) {
        Ok(parts) => parts,
        Err(response) => return response,
    };
    match service.update_event(id, activity_id, &supplied) {
        Ok(previous) => ApiResponse::success(ApiStatus::Ok, event_to_wire(&previous)),
        Err(err) => err.into(),
    }
}

/// `DELETE /events/{id}`
pub fn delete_event(service: &CatalogService<'_>, id: &str) -> ApiResponse {
    match parse_id(id) {
        Ok(id) => respond_empty(service.delete_event(id)),
        Err(response) => response,
    }
}

/// `GET /events/{id}`
pub fn get_event(service: &CatalogService<'_>, id: &str) -> ApiResponse {
    match parse_id(id).map(|id| service.get_event(id)) {
        Ok(Ok(event)) => ApiResponse::success(ApiStatus::Ok, event_to_wire(&event)),
        Ok(Err(err)) => err.into(),
        Err(response) => response,
    }
}

/// `GET /events`
pub fn list_events(service: &CatalogService<'_>) -> ApiResponse {
    respond_events(service.list_events())
}

/// `GET /events/by/{activityID}`
pub fn list_events_by_activity(service: &CatalogService<'_>, activity_id: &str) -> ApiResponse {
    match parse_id(activity_id) {
        Ok(activity_id) => respond_events(service.list_events_by_activity(activity_id)),
        Err(response) => response,
    }
}

fn decode_body<T: DeserializeOwned>(body: &str) -> Result<T, ApiResponse> {
    serde_json::from_str(body).map_err(|err| {
        ApiResponse::failure(ApiStatus::BadRequest, format!("invalid request body: {err}"))
    })
}

fn decode_event_body(body: &str) -> Result<(Uuid, SuppliedValues), ApiResponse> {
    let request: EventRequest = decode_body(body)?;
    let activity_id = parse_reference(&request.activity_id)
        .map_err(|err| ApiResponse::from(ServiceError::from(err)))?;
    let supplied = parse_supplied_values(request.property_values)
        .map_err(|err| ApiResponse::from(ServiceError::from(err)))?;
    Ok((activity_id, supplied))
}

fn parse_id(value: &str) -> Result<Uuid, ApiResponse> {
    parse_reference(value).map_err(|err| ApiResponse::from(ServiceError::from(err)))
}

fn parse_ids(values: Vec<String>) -> Result<Vec<Uuid>, ApiResponse> {
    values.iter().map(|value| parse_id(value)).collect()
}

fn respond<T: Serialize>(status: ApiStatus, outcome: Result<T, ServiceError>) -> ApiResponse {
    match outcome {
        Ok(value) => match serde_json::to_value(value) {
            Ok(body) => ApiResponse::success(status, body),
            Err(err) => ApiResponse::failure(
                ApiStatus::ServerFault,
                format!("cannot encode response: {err}"),
            ),
        },
        Err(err) => err.into(),
    }
}

fn respond_empty(outcome: Result<(), ServiceError>) -> ApiResponse {
    match outcome {
        Ok(()) => ApiResponse::no_content(),
        Err(err) => err.into(),
    }
}

fn respond_events(outcome: Result<Vec<Event>, ServiceError>) -> ApiResponse {
    match outcome {
        Ok(events) => ApiResponse::success(
            ApiStatus::Ok,
            JsonValue::Array(events.iter().map(event_to_wire).collect()),
        ),
        Err(err) => err.into(),
    }
}
