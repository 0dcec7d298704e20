use std::cmp::Ordering;

use once_cell::sync::Lazy;
use time::format_description::{self, FormatItem};
use time::Date;

use crate::storage::Entry;

static ENTRY_DATE_FORMAT: Lazy<Vec<FormatItem<'static>>> = Lazy::new(|| {
    format_description::parse("[day padding:none].[month padding:none].[year]")
        .expect("valid entry date format description")
});

/// Parses an entry's `dd.MM.yyyy` date; `None` for anything else.
pub fn parse_entry_date(raw: &str) -> Option<Date> {
    Date::parse(raw.trim(), &*ENTRY_DATE_FORMAT).ok()
}

/// Case-insensitive substring match on the mood label only. An empty query
/// keeps every entry.
pub fn filter_by_label(entries: &[Entry], query: &str) -> Vec<Entry> {
    let needle = query.to_lowercase();
    entries
        .iter()
        .filter(|entry| entry.mood_label.to_lowercase().contains(&needle))
        .cloned()
        .collect()
}

/// Ascending order by parsed date, then by raw time text. Entries whose
/// date does not parse come first.
pub fn chronological(entries: &[Entry]) -> Vec<Entry> {
    let mut keyed: Vec<(Option<Date>, &Entry)> = entries
        .iter()
        .map(|entry| (parse_entry_date(&entry.date), entry))
        .collect();
    keyed.sort_by(|(a_date, a), (b_date, b)| compare_keys(*a_date, a, *b_date, b));
    keyed.into_iter().map(|(_, entry)| entry.clone()).collect()
}

fn compare_keys(a_date: Option<Date>, a: &Entry, b_date: Option<Date>, b: &Entry) -> Ordering {
    // `None < Some(_)` puts unparsable dates first.
    a_date.cmp(&b_date).then_with(|| a.time.cmp(&b.time))
}

/// Alternating chronological sort: the first toggle yields ascending order,
/// the next descending, and so on.
#[derive(Debug, Clone)]
pub struct ChronologicalSort {
    ascending: bool,
}

impl Default for ChronologicalSort {
    fn default() -> Self {
        Self { ascending: true }
    }
}

impl ChronologicalSort {
    /// Direction the next [`toggle`](Self::toggle) will produce.
    pub fn next_is_ascending(&self) -> bool {
        self.ascending
    }

    pub fn toggle(&mut self, entries: &[Entry]) -> Vec<Entry> {
        let mut ordered = chronological(entries);
        if !self.ascending {
            ordered.reverse();
        }
        self.ascending = !self.ascending;
        ordered
    }
}
