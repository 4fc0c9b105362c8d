//! Persistence (spec §6): key-value abstractions for the speaker
//! gallery, alarms, memos, music favorites/history, the RSS feed list,
//! and the music file cache index. The core treats these as synchronous
//! method calls returning errors.

pub mod reminders;
pub mod sqlite;

pub use sqlite::{Alarm, Memo, SpeakerRecord, Store};
