// File: src/model/adapter.rs
use crate::error::ParseError;
use crate::model::item::{CalendarEntry, EventTime, InviteAction, InviteRecord, UNTITLED_EVENT};
use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, TimeZone, Utc};
use icalendar::{Calendar, CalendarComponent, Component, Event};

const SUPPORTED_VERSION: &str = "2.0";

/// Parses raw attachment bytes into an invite.
pub fn parse_invite(bytes: &[u8]) -> Result<InviteRecord, ParseError> {
    let raw = std::str::from_utf8(bytes)
        .map_err(|e| ParseError::Malformed(format!("not UTF-8: {}", e)))?;
    InviteRecord::from_ics(raw)
}

impl InviteRecord {
    pub fn from_ics(raw_ics: &str) -> Result<Self, ParseError> {
        // Normalize line endings to \r\n for consistent parsing
        let normalized = raw_ics.replace("\r\n", "\n").replace('\n', "\r\n");
        let calendar: Calendar = normalized
            .parse()
            .map_err(|e| ParseError::Malformed(format!("{}", e)))?;

        let calendar_prop = |key: &str| calendar_property(&normalized, key);

        match calendar_prop("VERSION") {
            Some(v) if v == SUPPORTED_VERSION => {}
            other => log::warn!(
                "Calendar version not recognized ({}), parsing anyway",
                other.as_deref().unwrap_or("missing")
            ),
        }

        let method = calendar_prop("METHOD");
        let action = method
            .as_deref()
            .and_then(InviteAction::from_method)
            .ok_or_else(|| ParseError::UnknownMethod(method.clone()))?;

        let event = primary_event(&calendar).ok_or(ParseError::MissingEvent)?;

        let uid = event
            .property_value("UID")
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or(ParseError::MissingIdentifier)?
            .to_string();

        let text = |key: &str| {
            event
                .property_value(key)
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
        };

        let summary = text("SUMMARY").unwrap_or_else(|| UNTITLED_EVENT.to_string());
        let description = text("DESCRIPTION");
        let location = text("LOCATION");

        let start = event
            .properties()
            .get("DTSTART")
            .ok_or(ParseError::MissingStart)
            .and_then(parse_time_prop)?;

        let end = match event.properties().get("DTEND") {
            Some(prop) => parse_time_prop(prop)?,
            None => default_end(event, &start)?,
        };

        let created = match event
            .properties()
            .get("CREATED")
            .or_else(|| event.properties().get("DTSTAMP"))
        {
            Some(prop) => Some(parse_utc(prop)?),
            None => None,
        };

        Ok(InviteRecord {
            uid,
            action,
            summary,
            description,
            location,
            start,
            end,
            created,
        })
    }
}

/// Value of a VCALENDAR-level property, ignoring anything nested in components.
fn calendar_property(ics: &str, key: &str) -> Option<String> {
    let mut depth = 0usize;
    for line in ics.lines() {
        let line = line.trim_end_matches('\r');
        if line.get(..6).is_some_and(|p| p.eq_ignore_ascii_case("BEGIN:")) {
            depth += 1;
            continue;
        }
        if line.get(..4).is_some_and(|p| p.eq_ignore_ascii_case("END:")) {
            depth = depth.saturating_sub(1);
            continue;
        }
        if depth != 1 {
            continue;
        }
        let Some((name, value)) = line.split_once(':') else {
            continue;
        };
        let name = name.split(';').next().unwrap_or_default();
        if name.eq_ignore_ascii_case(key) {
            return Some(value.trim().to_string());
        }
    }
    None
}

/// The master VEVENT: first one without RECURRENCE-ID, else the first one.
fn primary_event(calendar: &Calendar) -> Option<&Event> {
    let mut first: Option<&Event> = None;
    for component in &calendar.components {
        if let CalendarComponent::Event(e) = component {
            if !e.properties().contains_key("RECURRENCE-ID") {
                return Some(e);
            }
            first.get_or_insert(e);
        }
    }
    first
}

/// End of an event with no DTEND (RFC 5545 3.6.1).
fn default_end(event: &Event, start: &EventTime) -> Result<EventTime, ParseError> {
    if let Some(raw) = event.property_value("DURATION") {
        let dur = parse_duration(raw).ok_or_else(|| ParseError::InvalidTime {
            property: "DURATION".to_string(),
            value: raw.to_string(),
        })?;
        return start.shifted(dur).ok_or_else(|| ParseError::InvalidTime {
            property: "DURATION".to_string(),
            value: raw.to_string(),
        });
    }
    if start.is_all_day() {
        return Ok(start.shifted(Duration::days(1)).unwrap_or_else(|| start.clone()));
    }
    Ok(start.clone())
}

fn parse_time_prop(prop: &icalendar::Property) -> Result<EventTime, ParseError> {
    let val = prop.value().trim();
    let invalid = || ParseError::InvalidTime {
        property: prop.key().to_string(),
        value: val.to_string(),
    };

    let declared_date = prop
        .params()
        .get("VALUE")
        .map(|p| p.value().eq_ignore_ascii_case("DATE"))
        .unwrap_or(false);

    if declared_date || (val.len() == 8 && val.chars().all(|c| c.is_ascii_digit())) {
        return NaiveDate::parse_from_str(val, "%Y%m%d")
            .map(EventTime::AllDay)
            .map_err(|_| invalid());
    }

    if val.ends_with('Z') {
        return NaiveDateTime::parse_from_str(val, "%Y%m%dT%H%M%SZ")
            .map(|d| EventTime::Utc(Utc.from_utc_datetime(&d)))
            .map_err(|_| invalid());
    }

    let local = NaiveDateTime::parse_from_str(val, "%Y%m%dT%H%M%S").map_err(|_| invalid())?;
    match prop.params().get("TZID") {
        Some(tzid) => Ok(EventTime::Zoned {
            tzid: tzid.value().to_string(),
            local,
        }),
        None => Ok(EventTime::Floating(local)),
    }
}

/// CREATED and DTSTAMP must be UTC; a floating value is read as UTC.
fn parse_utc(prop: &icalendar::Property) -> Result<DateTime<Utc>, ParseError> {
    match parse_time_prop(prop)? {
        EventTime::Utc(dt) => Ok(dt),
        EventTime::Floating(dt) | EventTime::Zoned { local: dt, .. } => {
            Ok(Utc.from_utc_datetime(&dt))
        }
        EventTime::AllDay(d) => d
            .and_hms_opt(0, 0, 0)
            .map(|d| d.and_utc())
            .ok_or_else(|| ParseError::InvalidTime {
                property: prop.key().to_string(),
                value: prop.value().to_string(),
            }),
    }
}

/// ISO 8601 duration as used by RFC 5545 (`P1W`, `P1DT2H`, `-PT15M`).
pub fn parse_duration(val: &str) -> Option<Duration> {
    let val = val.trim();
    let (negative, body) = match val.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, val.strip_prefix('+').unwrap_or(val)),
    };
    let body = body.strip_prefix('P')?;

    let mut seconds: i64 = 0;
    let mut num_buf = String::new();
    let mut in_time = false;
    let mut saw_unit = false;
    for c in body.chars() {
        if c == 'T' {
            in_time = true;
        } else if c.is_ascii_digit() {
            num_buf.push(c);
        } else {
            let n = num_buf.parse::<i64>().ok()?;
            let unit: i64 = match (c, in_time) {
                ('W', false) => 7 * 86_400,
                ('D', false) => 86_400,
                ('H', true) => 3_600,
                ('M', true) => 60,
                ('S', true) => 1,
                _ => return None,
            };
            seconds = seconds.checked_add(n.checked_mul(unit)?)?;
            num_buf.clear();
            saw_unit = true;
        }
    }
    if !saw_unit || !num_buf.is_empty() {
        return None;
    }
    Duration::try_seconds(if negative { -seconds } else { seconds })
}

// --- EXPORT ---

fn time_property(key: &str, time: &EventTime) -> icalendar::Property {
    let mut prop = icalendar::Property::new(key, time.to_ics_value());
    match time {
        EventTime::AllDay(_) => {
            prop.add_parameter("VALUE", "DATE");
        }
        EventTime::Zoned { tzid, .. } => {
            prop.add_parameter("TZID", tzid);
        }
        EventTime::Utc(_) | EventTime::Floating(_) => {}
    }
    prop
}

impl CalendarEntry {
    pub fn to_event(&self) -> Event {
        let mut event = Event::new();
        event.uid(&self.uid);
        event.summary(&self.summary);
        if let Some(desc) = &self.description {
            event.description(desc);
        }
        if let Some(loc) = &self.location {
            event.add_property("LOCATION", loc);
        }
        event.append_property(time_property("DTSTART", &self.start));
        event.append_property(time_property("DTEND", &self.end));
        if let Some(created) = self.created {
            event.add_property("CREATED", created.format("%Y%m%dT%H%M%SZ").to_string());
        }
        if let Some(from) = &self.provenance.originator {
            event.add_property("ORGANIZER", format!("mailto:{}", from));
        }
        event
    }
}

/// A VCALENDAR holding every entry as a VEVENT.
pub fn entries_to_ics(entries: &[CalendarEntry]) -> String {
    let mut calendar = Calendar::new();
    for entry in entries {
        calendar.push(entry.to_event());
    }
    calendar.to_string()
}
