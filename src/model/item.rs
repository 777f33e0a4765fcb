// File: ./src/model/item.rs
use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::Display;

pub const UNTITLED_EVENT: &str = "Untitled event";

/// The two invitation actions we act on, derived from the calendar METHOD.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, Serialize, Deserialize, Display)]
#[strum(serialize_all = "lowercase")]
pub enum InviteAction {
    /// METHOD:REQUEST. Create the entry, or replace it if it already exists.
    Publish,
    /// METHOD:CANCEL. Delete the entry if present.
    Cancel,
}

impl InviteAction {
    pub fn from_method(method: &str) -> Option<Self> {
        match method.trim().to_uppercase().as_str() {
            "REQUEST" => Some(Self::Publish),
            "CANCEL" => Some(Self::Cancel),
            _ => None,
        }
    }
}

// --- DATE TYPES ---

/// A timestamp exactly as the invite encoded it.
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value")]
pub enum EventTime {
    AllDay(NaiveDate),
    Utc(DateTime<Utc>),
    /// Local time with no zone information.
    Floating(NaiveDateTime),
    /// Local time qualified by a TZID parameter. The zone is carried, not resolved.
    Zoned { tzid: String, local: NaiveDateTime },
}

impl EventTime {
    pub fn is_all_day(&self) -> bool {
        matches!(self, EventTime::AllDay(_))
    }

    /// Shifts the time by `dur`. All-day values move by whole days only.
    pub fn shifted(&self, dur: Duration) -> Option<EventTime> {
        match self {
            EventTime::AllDay(d) => d
                .checked_add_signed(Duration::days(dur.num_days()))
                .map(EventTime::AllDay),
            EventTime::Utc(dt) => dt.checked_add_signed(dur).map(EventTime::Utc),
            EventTime::Floating(dt) => dt.checked_add_signed(dur).map(EventTime::Floating),
            EventTime::Zoned { tzid, local } => {
                local
                    .checked_add_signed(dur)
                    .map(|local| EventTime::Zoned {
                        tzid: tzid.clone(),
                        local,
                    })
            }
        }
    }

    /// Property value in iCalendar basic format.
    pub fn to_ics_value(&self) -> String {
        match self {
            EventTime::AllDay(d) => d.format("%Y%m%d").to_string(),
            EventTime::Utc(dt) => dt.format("%Y%m%dT%H%M%SZ").to_string(),
            EventTime::Floating(dt) => dt.format("%Y%m%dT%H%M%S").to_string(),
            EventTime::Zoned { local, .. } => local.format("%Y%m%dT%H%M%S").to_string(),
        }
    }
}

/// One parsed invitation document. Lives for a single pipeline call.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct InviteRecord {
    pub uid: String,
    pub action: InviteAction,
    pub summary: String,
    pub description: Option<String>,
    pub location: Option<String>,
    pub start: EventTime,
    pub end: EventTime,
    pub created: Option<DateTime<Utc>>,
}

/// Where a calendar entry came from. Set once, when the entry is created.
#[derive(Debug, Clone, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct Provenance {
    pub sent: Option<DateTime<Utc>>,
    pub originator: Option<String>,
    pub addressee: Option<String>,
    #[serde(default)]
    pub addressees: Vec<String>,
}

/// A persisted calendar entry, unique per uid within its calendar collection.
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub struct CalendarEntry {
    pub uid: String,
    pub summary: String,
    pub description: Option<String>,
    pub location: Option<String>,
    pub start: EventTime,
    pub end: EventTime,
    pub created: Option<DateTime<Utc>>,
    #[serde(default)]
    pub provenance: Provenance,
}

impl CalendarEntry {
    pub fn from_invite(record: &InviteRecord, provenance: Provenance) -> Self {
        Self {
            uid: record.uid.clone(),
            summary: record.summary.clone(),
            description: record.description.clone(),
            location: record.location.clone(),
            start: record.start.clone(),
            end: record.end.clone(),
            created: record.created,
            provenance,
        }
    }

    /// Replaces every descriptive field with the invite's. Fields the invite
    /// omits are cleared, not kept. Provenance is left alone.
    pub fn apply_invite(&mut self, record: &InviteRecord) {
        let provenance = std::mem::take(&mut self.provenance);
        *self = Self::from_invite(record, provenance);
    }
}
