use strum::{Display, EnumString};
use time::macros::format_description;
use time::OffsetDateTime;

use crate::storage::{Entry, NewEntry};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString)]
pub enum EditMode {
    Create,
    Edit,
}

/// What the editing screen receives: the entry fields plus the mode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EditRequest {
    pub id: Option<i64>,
    pub date: String,
    pub time: String,
    pub description: String,
    pub mood_label: String,
    pub mode: EditMode,
}

impl EditRequest {
    pub fn create(entry: NewEntry) -> Self {
        Self {
            id: None,
            date: entry.date,
            time: entry.time,
            description: entry.description,
            mood_label: entry.mood_label,
            mode: EditMode::Create,
        }
    }

    pub fn edit(entry: &Entry) -> Self {
        Self {
            id: Some(entry.id),
            date: entry.date.clone(),
            time: entry.time.clone(),
            description: entry.description.clone(),
            mood_label: entry.mood_label.clone(),
            mode: EditMode::Edit,
        }
    }

    pub fn fields(&self) -> NewEntry {
        NewEntry {
            date: self.date.clone(),
            time: self.time.clone(),
            mood_label: self.mood_label.clone(),
            description: self.description.clone(),
        }
    }
}

/// What the editing screen hands back when it closes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EditResult {
    pub id: i64,
    pub is_updated: bool,
}

impl EditResult {
    /// Only a confirmed update of a real entry earns a status annotation.
    pub fn wants_status(&self) -> bool {
        self.is_updated && self.id > 0
    }
}

/// `<prefix>dd-MM-yyyy HH:mm:ss`
pub fn status_text(prefix: &str, at: OffsetDateTime) -> String {
    let format = format_description!("[day]-[month]-[year] [hour]:[minute]:[second]");
    match at.format(format) {
        Ok(stamp) => format!("{prefix}{stamp}"),
        Err(err) => {
            tracing::warn!(?err, "failed to format status timestamp");
            format!("{prefix}{}", at.unix_timestamp())
        }
    }
}

pub fn local_now() -> OffsetDateTime {
    OffsetDateTime::now_local().unwrap_or_else(|_| OffsetDateTime::now_utc())
}
