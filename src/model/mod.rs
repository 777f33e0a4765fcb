// File: ./src/model/mod.rs
pub mod adapter;
pub mod item;

pub use adapter::{entries_to_ics, parse_invite};
pub use item::{CalendarEntry, EventTime, InviteAction, InviteRecord, Provenance};
