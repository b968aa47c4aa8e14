//! Referential-consistency maintenance across properties, activities and events.
//!
//! # Responsibility
//! - Propagate activity property-set changes into that activity's events.
//! - Propagate property deletion and value-type changes into every
//!   referencing activity and event.
//!
//! # Invariants
//! - All event writes for one activity finish before the next activity.
//! - A property-type change to the same type is a no-op.
//! - An event selected through a referencing activity must carry the
//!   property; a missing entry aborts the cascade with `CascadeError`.
//! - Values are never converted across types; they are reset to defaults.

use crate::model::activity::ActivityId;
use crate::model::event::EventId;
use crate::model::property::PropertyId;
use crate::model::value::ValueType;
use crate::repo::activity_repo::ActivityRepository;
use crate::repo::event_repo::EventRepository;
use crate::repo::property_repo::PropertyRepository;
use crate::repo::RepoError;
use log::{debug, error};
use std::collections::{HashMap, HashSet};
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Errors from cascade operations.
#[derive(Debug)]
pub enum CascadeError {
    /// A property added to an activity does not exist.
    PropertyNotFound(PropertyId),
    /// An event of a referencing activity lacks the cascaded property.
    MissingEventValue {
        event_id: EventId,
        activity_id: ActivityId,
        property_id: PropertyId,
    },
    /// An activity returned by the reference query does not hold the property.
    MissingActivityReference {
        activity_id: ActivityId,
        property_id: PropertyId,
    },
    Repo(RepoError),
}

impl Display for CascadeError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::PropertyNotFound(id) => write!(f, "property not found: {id}"),
            Self::MissingEventValue {
                event_id,
                activity_id,
                property_id,
            } => write!(
                f,
                "cascade invariant violated: event {event_id} of activity {activity_id} has no value for property {property_id}"
            ),
            Self::MissingActivityReference {
                activity_id,
                property_id,
            } => write!(
                f,
                "cascade invariant violated: activity {activity_id} does not reference property {property_id}"
            ),
            Self::Repo(err) => write!(f, "{err}"),
        }
    }
}

impl Error for CascadeError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Repo(err) => Some(err),
            _ => None,
        }
    }
}

impl From<RepoError> for CascadeError {
    fn from(value: RepoError) -> Self {
        Self::Repo(value)
    }
}

/// Multiset difference between two `defined_properties` lists.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PropertySetDiff {
    /// Ids in the new list with no remaining match in the old list.
    pub added: Vec<PropertyId>,
    /// Ids left over in the old list after matching the new list.
    pub removed: Vec<PropertyId>,
}

impl PropertySetDiff {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }
}

/// Computes a duplicate-count-aware diff of two property id lists.
///
/// Each id in `new` consumes one occurrence from `old` when available and is
/// otherwise reported as added. Occurrences of `old` left unconsumed are
/// reported as removed, once per occurrence, in `old` order.
pub fn diff_defined_properties(old: &[PropertyId], new: &[PropertyId]) -> PropertySetDiff {
    let mut remaining: HashMap<PropertyId, usize> = HashMap::new();
    for id in old {
        *remaining.entry(*id).or_insert(0) += 1;
    }

    let mut diff = PropertySetDiff::default();
    for id in new {
        match remaining.get_mut(id) {
            Some(count) if *count > 0 => *count -= 1,
            _ => diff.added.push(*id),
        }
    }

    for id in old {
        if let Some(count) = remaining.get_mut(id) {
            if *count > 0 {
                *count -= 1;
                diff.removed.push(*id);
            }
        }
    }
    diff
}

/// Counters describing one cascade run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CascadeReport {
    pub activities_updated: usize,
    pub events_updated: usize,
}

/// Keeps events and activities consistent with schema mutations.
pub struct RelationMaintainer<'r, P, A, E>
where
    P: PropertyRepository,
    A: ActivityRepository,
    E: EventRepository,
{
    properties: &'r P,
    activities: &'r A,
    events: &'r E,
}

impl<'r, P, A, E> RelationMaintainer<'r, P, A, E>
where
    P: PropertyRepository,
    A: ActivityRepository,
    E: EventRepository,
{
    pub fn new(properties: &'r P, activities: &'r A, events: &'r E) -> Self {
        Self {
            properties,
            activities,
            events,
        }
    }

    /// Applies an activity's property-set change to all of its events.
    ///
    /// Added properties get their type's default value. Removed properties
    /// are dropped from each event. Ids whose only change is a duplicate
    /// count (declared before and after) leave event values untouched.
    pub fn activity_properties_changed(
        &self,
        activity_id: ActivityId,
        old: &[PropertyId],
        new: &[PropertyId],
    ) -> Result<CascadeReport, CascadeError> {
        let diff = diff_defined_properties(old, new);
        if diff.is_empty() {
            return Ok(CascadeReport::default());
        }

        let previously_declared: HashSet<PropertyId> = old.iter().copied().collect();
        let mut defaults = Vec::with_capacity(diff.added.len());
        let mut seen = HashSet::new();
        for property_id in diff
            .added
            .iter()
            .copied()
            .filter(|id| !previously_declared.contains(id) && seen.insert(*id))
        {
            let property = self
                .properties
                .get_property(property_id)?
                .ok_or(CascadeError::PropertyNotFound(property_id))?;
            defaults.push((property_id, property.value_data_type.default_value()));
        }

        let still_declared: HashSet<PropertyId> = new.iter().copied().collect();
        let dropped: Vec<PropertyId> = diff
            .removed
            .iter()
            .copied()
            .filter(|id| !still_declared.contains(id))
            .collect();

        let mut report = CascadeReport::default();
        for mut event in self.events.list_events_by_activity(activity_id)? {
            for (property_id, default) in &defaults {
                event.set_value(*property_id, default.clone());
            }
            for property_id in &dropped {
                event.remove_value(*property_id);
            }
            self.events
                .update_event_values(event.id, &event.property_values)?;
            report.events_updated += 1;
        }

        debug!(
            "event=cascade_activity_properties module=service status=ok activity_id={} added={} removed={} events={}",
            activity_id,
            defaults.len(),
            dropped.len(),
            report.events_updated
        );
        Ok(report)
    }

    /// Removes a deleted property from every referencing activity and event.
    ///
    /// Events of each activity are updated before the activity itself.
    pub fn property_deleted(&self, property_id: PropertyId) -> Result<CascadeReport, CascadeError> {
        let mut report = CascadeReport::default();

        for mut activity in self.activities.list_activities_referencing(property_id)? {
            for mut event in self.events.list_events_by_activity(activity.id)? {
                if event.remove_value(property_id).is_none() {
                    return Err(invariant_violation(CascadeError::MissingEventValue {
                        event_id: event.id,
                        activity_id: activity.id,
                        property_id,
                    }));
                }
                self.events
                    .update_event_values(event.id, &event.property_values)?;
                report.events_updated += 1;
            }

            if !activity.remove_property(property_id) {
                return Err(invariant_violation(CascadeError::MissingActivityReference {
                    activity_id: activity.id,
                    property_id,
                }));
            }
            self.activities.update_activity(&activity)?;
            report.activities_updated += 1;
        }

        debug!(
            "event=cascade_property_delete module=service status=ok property_id={} activities={} events={}",
            property_id, report.activities_updated, report.events_updated
        );
        Ok(report)
    }

    /// Resets a property's value in every dependent event after a type change.
    ///
    /// No activity is written, so `activities_updated` stays zero. Returns an
    /// empty report without touching any event when `previous` equals `next`.
    pub fn property_type_changed(
        &self,
        property_id: PropertyId,
        previous: ValueType,
        next: ValueType,
    ) -> Result<CascadeReport, CascadeError> {
        let mut report = CascadeReport::default();
        if previous == next {
            return Ok(report);
        }

        let default = next.default_value();
        let mut activities_visited = 0usize;
        for activity in self.activities.list_activities_referencing(property_id)? {
            for mut event in self.events.list_events_by_activity(activity.id)? {
                if event.value_of(property_id).is_none() {
                    return Err(invariant_violation(CascadeError::MissingEventValue {
                        event_id: event.id,
                        activity_id: activity.id,
                        property_id,
                    }));
                }
                event.set_value(property_id, default.clone());
                self.events
                    .update_event_values(event.id, &event.property_values)?;
                report.events_updated += 1;
            }
            activities_visited += 1;
        }

        debug!(
            "event=cascade_property_type module=service status=ok property_id={} from={} to={} activities_visited={} events={}",
            property_id, previous, next, activities_visited, report.events_updated
        );
        Ok(report)
    }
}

fn invariant_violation(err: CascadeError) -> CascadeError {
    error!("event=cascade_invariant module=service status=error error={err}");
    err
}
