//! Routine slot document and its time/day value types.
//!
//! # Invariants
//! - Exactly one of `day` / `specific_date` is set.
//! - `start_time < end_time`; the window is half-open `[start, end)`.
//! - An inactive slot is an empty shell: no subject, batches, or teachers.

use crate::model::{
    AuditStamps, DeletionStamp, Document, EntityId, EntityKind, Relations, SoftDeletable,
};
use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Day of week for recurring slots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Weekday {
    Monday,
    Tuesday,
    Wednesday,
    Thursday,
    Friday,
    Saturday,
    Sunday,
}

impl Weekday {
    pub const ALL: [Weekday; 7] = [
        Self::Monday,
        Self::Tuesday,
        Self::Wednesday,
        Self::Thursday,
        Self::Friday,
        Self::Saturday,
        Self::Sunday,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Monday => "MONDAY",
            Self::Tuesday => "TUESDAY",
            Self::Wednesday => "WEDNESDAY",
            Self::Thursday => "THURSDAY",
            Self::Friday => "FRIDAY",
            Self::Saturday => "SATURDAY",
            Self::Sunday => "SUNDAY",
        }
    }

    /// Parses a day name case-insensitively (`monday`, `MONDAY`, `Monday`).
    pub fn parse(value: &str) -> Option<Self> {
        let normalized = value.trim().to_ascii_uppercase();
        Self::ALL
            .into_iter()
            .find(|day| day.as_str() == normalized)
    }
}

impl From<chrono::Weekday> for Weekday {
    fn from(value: chrono::Weekday) -> Self {
        match value {
            chrono::Weekday::Mon => Self::Monday,
            chrono::Weekday::Tue => Self::Tuesday,
            chrono::Weekday::Wed => Self::Wednesday,
            chrono::Weekday::Thu => Self::Thursday,
            chrono::Weekday::Fri => Self::Friday,
            chrono::Weekday::Sat => Self::Saturday,
            chrono::Weekday::Sun => Self::Sunday,
        }
    }
}

/// Minute-of-day value, serialized as 24h `HH:mm`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TimeOfDay(u16);

impl TimeOfDay {
    pub fn from_hm(hour: u16, minute: u16) -> Option<Self> {
        if hour > 23 || minute > 59 {
            return None;
        }
        Some(Self(hour * 60 + minute))
    }

    /// Parses strict 24h `HH:mm`.
    pub fn parse(value: &str) -> Option<Self> {
        let (hour, minute) = value.split_once(':')?;
        if hour.len() != 2 || minute.len() != 2 {
            return None;
        }
        let hour = hour.parse::<u16>().ok()?;
        let minute = minute.parse::<u16>().ok()?;
        Self::from_hm(hour, minute)
    }

    pub fn minutes(self) -> u16 {
        self.0
    }
}

impl Display for TimeOfDay {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:02}:{:02}", self.0 / 60, self.0 % 60)
    }
}

impl TryFrom<String> for TimeOfDay {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value).ok_or_else(|| format!("invalid HH:mm time `{value}`"))
    }
}

impl From<TimeOfDay> for String {
    fn from(value: TimeOfDay) -> Self {
        value.to_string()
    }
}

/// Half-open time window `[start, end)` within one day.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeWindow {
    pub start: TimeOfDay,
    pub end: TimeOfDay,
}

impl TimeWindow {
    pub fn new(start: TimeOfDay, end: TimeOfDay) -> Option<Self> {
        (start < end).then_some(Self { start, end })
    }

    /// Whether two windows intersect. Touching boundaries do not overlap.
    pub fn overlaps(&self, other: &Self) -> bool {
        self.start < other.end && other.start < self.end
    }
}

/// Delivery mode of a session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SlotMode {
    #[default]
    Offline,
    Online,
    Hybrid,
}

impl SlotMode {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_uppercase().as_str() {
            "OFFLINE" => Some(Self::Offline),
            "ONLINE" => Some(Self::Online),
            "HYBRID" => Some(Self::Hybrid),
            _ => None,
        }
    }
}

/// When a slot occurs: every week on a day, or once on a date.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotDay {
    Weekly(Weekday),
    OnDate(NaiveDate),
}

impl SlotDay {
    /// The weekday the session falls on.
    pub fn weekday(self) -> Weekday {
        match self {
            Self::Weekly(day) => day,
            Self::OnDate(date) => date.weekday().into(),
        }
    }

    /// Splits into the persisted `(day, specificDate)` pair.
    pub fn into_columns(self) -> (Option<Weekday>, Option<NaiveDate>) {
        match self {
            Self::Weekly(day) => (Some(day), None),
            Self::OnDate(date) => (None, Some(date)),
        }
    }

    /// Whether two sessions land on the same calendar day.
    ///
    /// Two one-off dates must match exactly; otherwise the resolved weekdays
    /// are compared.
    pub fn coincides_with(self, other: Self) -> bool {
        match (self, other) {
            (Self::OnDate(a), Self::OnDate(b)) => a == b,
            _ => self.weekday() == other.weekday(),
        }
    }
}

/// Shape violations on a persisted or merged slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SlotShapeError {
    MissingDay,
    DayAndDateBothSet,
    EmptyWindow { start: TimeOfDay, end: TimeOfDay },
    InactiveWithRelations(EntityId),
}

impl Display for SlotShapeError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingDay => write!(f, "slot needs either a day or a specific date"),
            Self::DayAndDateBothSet => {
                write!(f, "slot cannot have both a day and a specific date")
            }
            Self::EmptyWindow { start, end } => {
                write!(f, "slot start {start} must be before end {end}")
            }
            Self::InactiveWithRelations(id) => {
                write!(f, "inactive slot {id} still holds relations")
            }
        }
    }
}

impl Error for SlotShapeError {}

/// One scheduled class occurrence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoutineSlot {
    pub id: EntityId,
    pub subject: Option<EntityId>,
    #[serde(default)]
    pub batches: Vec<EntityId>,
    #[serde(default)]
    pub teachers: Vec<EntityId>,
    pub day: Option<Weekday>,
    pub specific_date: Option<NaiveDate>,
    pub start_time: TimeOfDay,
    pub end_time: TimeOfDay,
    pub room_number: Option<String>,
    #[serde(default)]
    pub mode: SlotMode,
    pub is_active: bool,
    #[serde(default)]
    pub is_cancelled: bool,
    #[serde(flatten)]
    pub audit: AuditStamps,
    #[serde(flatten)]
    pub deletion: DeletionStamp,
}

impl RoutineSlot {
    /// Resolves the day/date pair. Fails when the XOR invariant is broken.
    pub fn slot_day(&self) -> Result<SlotDay, SlotShapeError> {
        match (self.day, self.specific_date) {
            (Some(day), None) => Ok(SlotDay::Weekly(day)),
            (None, Some(date)) => Ok(SlotDay::OnDate(date)),
            (None, None) => Err(SlotShapeError::MissingDay),
            (Some(_), Some(_)) => Err(SlotShapeError::DayAndDateBothSet),
        }
    }

    pub fn window(&self) -> Result<TimeWindow, SlotShapeError> {
        TimeWindow::new(self.start_time, self.end_time).ok_or(SlotShapeError::EmptyWindow {
            start: self.start_time,
            end: self.end_time,
        })
    }

    pub fn validate(&self) -> Result<(), SlotShapeError> {
        self.slot_day()?;
        self.window()?;
        if !self.is_active && self.has_relations() {
            return Err(SlotShapeError::InactiveWithRelations(self.id));
        }
        Ok(())
    }

    /// Whether this slot takes part in conflict checks.
    pub fn is_schedulable(&self) -> bool {
        self.is_active && !self.is_cancelled
    }
}

impl Document for RoutineSlot {
    const KIND: EntityKind = EntityKind::RoutineSlot;

    fn id(&self) -> EntityId {
        self.id
    }

    fn is_active(&self) -> bool {
        self.is_active
    }
}

impl Relations for RoutineSlot {
    fn members(&self, field: &str) -> Option<Vec<EntityId>> {
        match field {
            "subject" => Some(self.subject.into_iter().collect()),
            "batches" => Some(self.batches.clone()),
            "teachers" => Some(self.teachers.clone()),
            _ => None,
        }
    }

    fn has_relations(&self) -> bool {
        self.subject.is_some() || !self.batches.is_empty() || !self.teachers.is_empty()
    }
}

impl SoftDeletable for RoutineSlot {
    fn deletion(&self) -> &DeletionStamp {
        &self.deletion
    }

    fn audit_mut(&mut self) -> &mut AuditStamps {
        &mut self.audit
    }

    fn mark_deleted(&mut self, stamp: DeletionStamp) {
        self.is_active = false;
        self.deletion = stamp;
    }

    /// A restored slot comes back uncancelled.
    fn mark_restored(&mut self) {
        self.is_active = true;
        self.is_cancelled = false;
        self.deletion = DeletionStamp::default();
    }

    fn check_shape(&self) -> Result<(), SlotShapeError> {
        self.validate()
    }
}
