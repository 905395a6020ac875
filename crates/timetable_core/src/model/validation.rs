//! Raw slot input validation.
//!
//! # Responsibility
//! - Turn caller-supplied strings into typed, range-checked slot drafts.
//! - Report every offending field at once instead of stopping at the first.
//!
//! # Invariants
//! - Times are strict 24h `HH:mm`; dates are `YYYY-MM-DD`.
//! - Exactly one of `day` / `specificDate` is accepted.
//! - Id lists are de-duplicated, first occurrence wins.

use crate::model::slot::{RoutineSlot, SlotDay, SlotMode, TimeOfDay, TimeWindow, Weekday};
use crate::model::EntityId;
use chrono::NaiveDate;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use std::collections::HashSet;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

static TIME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(?:[01]\d|2[0-3]):[0-5]\d$").expect("valid time regex"));
static DATE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\d{4}-\d{2}-\d{2}$").expect("valid date regex"));

const MAX_ROOM_NUMBER_CHARS: usize = 32;

/// One rejected input field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldError {
    pub field: &'static str,
    pub message: String,
}

impl FieldError {
    pub fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

impl Display for FieldError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Raw create request as received from the caller.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SlotInput {
    pub subject: Option<String>,
    #[serde(default)]
    pub batches: Vec<String>,
    #[serde(default)]
    pub teachers: Vec<String>,
    pub day: Option<String>,
    pub specific_date: Option<String>,
    pub start_time: String,
    pub end_time: String,
    pub room_number: Option<String>,
    pub mode: Option<String>,
}

/// Validated placement of a new slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotDraft {
    pub subject: EntityId,
    pub batches: Vec<EntityId>,
    pub teachers: Vec<EntityId>,
    pub day: SlotDay,
    pub window: TimeWindow,
    pub room_number: Option<String>,
    pub mode: SlotMode,
}

/// Raw partial update. `roomNumber: ""` clears the room.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SlotPatchInput {
    pub subject: Option<String>,
    pub batches: Option<Vec<String>>,
    pub teachers: Option<Vec<String>>,
    pub day: Option<String>,
    pub specific_date: Option<String>,
    pub start_time: Option<String>,
    pub end_time: Option<String>,
    pub room_number: Option<String>,
    pub mode: Option<String>,
}

/// Validated partial update; `None` leaves the field untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SlotPatch {
    pub subject: Option<EntityId>,
    pub batches: Option<Vec<EntityId>>,
    pub teachers: Option<Vec<EntityId>>,
    pub day: Option<SlotDay>,
    pub start_time: Option<TimeOfDay>,
    pub end_time: Option<TimeOfDay>,
    pub room_number: Option<Option<String>>,
    pub mode: Option<SlotMode>,
}

/// Validates a create request.
pub fn validate_slot_input(input: &SlotInput) -> Result<SlotDraft, Vec<FieldError>> {
    let mut errors = Vec::new();

    let subject = match input.subject.as_deref() {
        Some(raw) => parse_id("subject", raw, &mut errors),
        None => {
            errors.push(FieldError::new("subject", "is required"));
            None
        }
    };
    let batches = parse_ids("batches", &input.batches, &mut errors);
    let teachers = parse_ids("teachers", &input.teachers, &mut errors);
    let day = parse_slot_day(
        input.day.as_deref(),
        input.specific_date.as_deref(),
        &mut errors,
    );
    if day.is_none() && input.day.is_none() && input.specific_date.is_none() {
        errors.push(FieldError::new("day", "either day or specificDate is required"));
    }
    let start = parse_time("startTime", &input.start_time, &mut errors);
    let end = parse_time("endTime", &input.end_time, &mut errors);
    let window = match (start, end) {
        (Some(start), Some(end)) => {
            let window = TimeWindow::new(start, end);
            if window.is_none() {
                errors.push(FieldError::new(
                    "endTime",
                    format!("must be after startTime ({start})"),
                ));
            }
            window
        }
        _ => None,
    };
    let room_number = normalize_room(input.room_number.as_deref(), &mut errors);
    let mode = match input.mode.as_deref() {
        Some(raw) => parse_mode(raw, &mut errors),
        None => Some(SlotMode::default()),
    };

    match (subject, day, window, mode) {
        (Some(subject), Some(day), Some(window), Some(mode)) if errors.is_empty() => {
            Ok(SlotDraft {
                subject,
                batches,
                teachers,
                day,
                window,
                room_number,
                mode,
            })
        }
        _ => Err(errors),
    }
}

/// Validates a partial update request.
pub fn validate_slot_patch(input: &SlotPatchInput) -> Result<SlotPatch, Vec<FieldError>> {
    let mut errors = Vec::new();

    let subject = input
        .subject
        .as_deref()
        .and_then(|raw| parse_id("subject", raw, &mut errors));
    let batches = input
        .batches
        .as_ref()
        .map(|values| parse_ids("batches", values, &mut errors));
    let teachers = input
        .teachers
        .as_ref()
        .map(|values| parse_ids("teachers", values, &mut errors));
    let day = if input.day.is_some() || input.specific_date.is_some() {
        parse_slot_day(
            input.day.as_deref(),
            input.specific_date.as_deref(),
            &mut errors,
        )
    } else {
        None
    };
    let start_time = input
        .start_time
        .as_deref()
        .and_then(|raw| parse_time("startTime", raw, &mut errors));
    let end_time = input
        .end_time
        .as_deref()
        .and_then(|raw| parse_time("endTime", raw, &mut errors));
    if let (Some(start), Some(end)) = (start_time, end_time) {
        if start >= end {
            errors.push(FieldError::new(
                "endTime",
                format!("must be after startTime ({start})"),
            ));
        }
    }
    let room_number = input
        .room_number
        .as_deref()
        .map(|raw| normalize_room(Some(raw), &mut errors));
    let mode = input
        .mode
        .as_deref()
        .and_then(|raw| parse_mode(raw, &mut errors));

    if !errors.is_empty() {
        return Err(errors);
    }

    Ok(SlotPatch {
        subject,
        batches,
        teachers,
        day,
        start_time,
        end_time,
        room_number,
        mode,
    })
}

impl SlotPatch {
    /// Produces the slot as it would look after this patch.
    ///
    /// Fails when the merged start/end no longer form a window.
    pub fn merged_onto(&self, current: &RoutineSlot) -> Result<RoutineSlot, Vec<FieldError>> {
        let mut next = current.clone();
        if let Some(subject) = self.subject {
            next.subject = Some(subject);
        }
        if let Some(batches) = &self.batches {
            next.batches = batches.clone();
        }
        if let Some(teachers) = &self.teachers {
            next.teachers = teachers.clone();
        }
        if let Some(day) = self.day {
            (next.day, next.specific_date) = day.into_columns();
        }
        if let Some(start) = self.start_time {
            next.start_time = start;
        }
        if let Some(end) = self.end_time {
            next.end_time = end;
        }
        if let Some(room_number) = &self.room_number {
            next.room_number = room_number.clone();
        }
        if let Some(mode) = self.mode {
            next.mode = mode;
        }

        if next.start_time >= next.end_time {
            return Err(vec![FieldError::new(
                "endTime",
                format!("must be after startTime ({})", next.start_time),
            )]);
        }
        Ok(next)
    }

    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }
}

fn parse_id(field: &'static str, raw: &str, errors: &mut Vec<FieldError>) -> Option<EntityId> {
    match Uuid::parse_str(raw.trim()) {
        Ok(id) => Some(id),
        Err(_) => {
            errors.push(FieldError::new(field, format!("invalid id `{raw}`")));
            None
        }
    }
}

fn parse_ids(field: &'static str, raw: &[String], errors: &mut Vec<FieldError>) -> Vec<EntityId> {
    let mut seen = HashSet::new();
    raw.iter()
        .filter_map(|value| parse_id(field, value, errors))
        .filter(|id| seen.insert(*id))
        .collect()
}

fn parse_slot_day(
    day: Option<&str>,
    specific_date: Option<&str>,
    errors: &mut Vec<FieldError>,
) -> Option<SlotDay> {
    match (day, specific_date) {
        (Some(_), Some(_)) => {
            errors.push(FieldError::new(
                "specificDate",
                "cannot be combined with day",
            ));
            None
        }
        (Some(raw), None) => match Weekday::parse(raw) {
            Some(weekday) => Some(SlotDay::Weekly(weekday)),
            None => {
                errors.push(FieldError::new(
                    "day",
                    format!("`{raw}` is not one of MONDAY..SUNDAY"),
                ));
                None
            }
        },
        (None, Some(raw)) => {
            let trimmed = raw.trim();
            let parsed = DATE_RE
                .is_match(trimmed)
                .then(|| NaiveDate::parse_from_str(trimmed, "%Y-%m-%d").ok())
                .flatten();
            if parsed.is_none() {
                errors.push(FieldError::new(
                    "specificDate",
                    format!("`{raw}` is not a YYYY-MM-DD date"),
                ));
            }
            parsed.map(SlotDay::OnDate)
        }
        (None, None) => None,
    }
}

fn parse_time(field: &'static str, raw: &str, errors: &mut Vec<FieldError>) -> Option<TimeOfDay> {
    let trimmed = raw.trim();
    let parsed = TIME_RE
        .is_match(trimmed)
        .then(|| TimeOfDay::parse(trimmed))
        .flatten();
    if parsed.is_none() {
        errors.push(FieldError::new(
            field,
            format!("`{raw}` is not a 24h HH:mm time"),
        ));
    }
    parsed
}

fn parse_mode(raw: &str, errors: &mut Vec<FieldError>) -> Option<SlotMode> {
    let parsed = SlotMode::parse(raw);
    if parsed.is_none() {
        errors.push(FieldError::new(
            "mode",
            format!("`{raw}` is not one of OFFLINE|ONLINE|HYBRID"),
        ));
    }
    parsed
}

fn normalize_room(raw: Option<&str>, errors: &mut Vec<FieldError>) -> Option<String> {
    let trimmed = raw.map(str::trim).filter(|value| !value.is_empty())?;
    if trimmed.chars().count() > MAX_ROOM_NUMBER_CHARS {
        errors.push(FieldError::new(
            "roomNumber",
            format!("must be at most {MAX_ROOM_NUMBER_CHARS} characters"),
        ));
        return None;
    }
    Some(trimmed.to_string())
}
