use std::fmt;

use chrono::{Datelike, NaiveDate, NaiveTime, Timelike, Weekday};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Doctor {
    pub id: Uuid,
    pub first_name: String,
    pub last_name: String,
    #[serde(default)]
    pub specialties: Vec<String>,
    pub qualification: Option<String>,
    pub experience_years: Option<i32>,
    pub profile_image_url: Option<String>,
    #[serde(default = "default_true")]
    pub is_available: bool,
}

fn default_true() -> bool {
    true
}

impl Doctor {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }

    pub fn has_specialty(&self, specialty: &str) -> bool {
        self.specialties.iter().any(|s| s.eq_ignore_ascii_case(specialty))
    }
}

// ==============================================================================
// TIME SLOTS
// ==============================================================================

/// Granularity of every bookable slot.
pub const SLOT_STEP_MINUTES: u32 = 15;

const DISPLAY_FORMAT: &str = "%I:%M %p";

/// A bookable time of day. Ordered and hashed by the underlying 24-hour value;
/// the 12-hour form is only for display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(into = "TimeSlotRepr", try_from = "TimeSlotInput")]
pub struct TimeSlot(NaiveTime);

impl TimeSlot {
    pub fn new(time: NaiveTime) -> Self {
        Self(time)
    }

    pub fn from_hm(hour: u32, minute: u32) -> Option<Self> {
        NaiveTime::from_hms_opt(hour, minute, 0).map(Self)
    }

    pub fn time(&self) -> NaiveTime {
        self.0
    }

    /// Canonical 12-hour form, e.g. `09:30 AM`.
    pub fn display(&self) -> String {
        self.0.format(DISPLAY_FORMAT).to_string()
    }

    /// Minutes since midnight.
    pub fn minute_of_day(&self) -> u32 {
        self.0.hour() * 60 + self.0.minute()
    }

    /// Accepts `09:30 AM`, `09:30` or `09:30:00`.
    pub fn parse(raw: &str) -> Result<Self, TimeSlotParseError> {
        let trimmed = raw.trim();
        let upper = trimmed.to_ascii_uppercase();
        NaiveTime::parse_from_str(&upper, DISPLAY_FORMAT)
            .or_else(|_| NaiveTime::parse_from_str(trimmed, "%H:%M:%S"))
            .or_else(|_| NaiveTime::parse_from_str(trimmed, "%H:%M"))
            .map(Self)
            .map_err(|_| TimeSlotParseError(raw.to_string()))
    }
}

impl fmt::Display for TimeSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.display())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unrecognised time of day: {0}")]
pub struct TimeSlotParseError(pub String);

#[derive(Serialize)]
struct TimeSlotRepr {
    time: String,
    display: String,
}

impl From<TimeSlot> for TimeSlotRepr {
    fn from(slot: TimeSlot) -> Self {
        Self {
            time: slot.0.format("%H:%M").to_string(),
            display: slot.display(),
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum TimeSlotInput {
    Text(String),
    Repr { time: String },
}

impl TryFrom<TimeSlotInput> for TimeSlot {
    type Error = TimeSlotParseError;

    fn try_from(input: TimeSlotInput) -> Result<Self, Self::Error> {
        match input {
            TimeSlotInput::Text(raw) | TimeSlotInput::Repr { time: raw } => TimeSlot::parse(&raw),
        }
    }
}

/// Fixed business-hours windows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SlotTemplate {
    WeekdayMorning,
    WeekdayEvening,
    SundayMorning,
}

impl SlotTemplate {
    /// (start hour, start minute, end hour, end minute), end inclusive.
    pub fn window(&self) -> (u32, u32, u32, u32) {
        match self {
            SlotTemplate::WeekdayMorning => (9, 30, 16, 0),
            SlotTemplate::WeekdayEvening => (18, 0, 21, 0),
            SlotTemplate::SundayMorning => (9, 30, 13, 0),
        }
    }

    pub fn for_date(date: NaiveDate) -> &'static [SlotTemplate] {
        if date.weekday() == Weekday::Sun {
            &[SlotTemplate::SundayMorning]
        } else {
            &[SlotTemplate::WeekdayMorning, SlotTemplate::WeekdayEvening]
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DoctorListResponse {
    pub doctors: Vec<Doctor>,
    pub total: usize,
}
