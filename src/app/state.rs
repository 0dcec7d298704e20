use serde::Serialize;

use crate::overlay::StatusIndex;
use crate::storage::Entry;

/// One renderable line: an entry joined with its status annotation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EntryRow {
    #[serde(flatten)]
    pub entry: Entry,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
}

/// Render-facing join of the displayed entry list with the status index.
///
/// The displayed list is whatever the foreground last handed over: the
/// full list after a store emission, or a search/sort result. Rows are
/// rebuilt wholesale on a list change and patched one at a time on a
/// status change.
#[derive(Debug, Clone, Default)]
pub struct JournalView {
    statuses: StatusIndex,
    rows: Vec<EntryRow>,
    last_error: Option<String>,
}

impl JournalView {
    pub fn new(statuses: StatusIndex) -> Self {
        Self {
            statuses,
            ..Self::default()
        }
    }

    pub fn rows(&self) -> &[EntryRow] {
        &self.rows
    }

    pub fn statuses(&self) -> &StatusIndex {
        &self.statuses
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn set_last_error(&mut self, message: Option<String>) {
        self.last_error = message;
    }

    pub fn show_entries(&mut self, entries: &[Entry]) {
        self.rows = entries
            .iter()
            .map(|entry| EntryRow {
                entry: entry.clone(),
                status: self.statuses.get(entry.id).map(str::to_owned),
            })
            .collect();
    }

    /// Records a freshly written status and updates the matching row only.
    pub fn apply_status(&mut self, id: i64, status: &str) {
        self.statuses.set(id, status);
        let visible = self.statuses.get(id).map(str::to_owned);
        for row in self.rows.iter_mut().filter(|row| row.entry.id == id) {
            row.status = visible.clone();
        }
    }

    pub fn row(&self, id: i64) -> Option<&EntryRow> {
        self.rows.iter().find(|row| row.entry.id == id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::NewEntry;

    fn entries() -> Vec<Entry> {
        vec![
            NewEntry::new("01.01.2024", "10:00", "Happy", "").with_id(1),
            NewEntry::new("02.01.2024", "09:00", "Sad", "").with_id(2),
        ]
    }

    #[test]
    fn rows_join_statuses_by_id() {
        let statuses: StatusIndex = [(2, "Updated: X".to_string())].into_iter().collect();
        let mut view = JournalView::new(statuses);
        view.show_entries(&entries());
        assert_eq!(view.row(1).and_then(|row| row.status.as_deref()), None);
        assert_eq!(
            view.row(2).and_then(|row| row.status.as_deref()),
            Some("Updated: X")
        );
    }

    #[test]
    fn redrawing_the_same_list_is_idempotent() {
        let mut view = JournalView::default();
        view.apply_status(1, "Updated: A");
        view.show_entries(&entries());
        let first = view.rows().to_vec();
        view.show_entries(&entries());
        assert_eq!(view.rows(), first.as_slice());
    }

    #[test]
    fn status_update_touches_only_its_row() {
        let mut view = JournalView::default();
        view.show_entries(&entries());
        view.apply_status(2, "Updated: 01-03-2024 12:00:00");
        assert_eq!(view.rows()[0].status, None);
        assert_eq!(
            view.rows()[1].status.as_deref(),
            Some("Updated: 01-03-2024 12:00:00")
        );
    }

    #[test]
    fn empty_status_is_hidden() {
        let mut view = JournalView::default();
        view.show_entries(&entries());
        view.apply_status(1, "");
        assert_eq!(view.rows()[0].status, None);
    }

    #[test]
    fn status_for_hidden_entry_shows_once_it_is_displayed() {
        let mut view = JournalView::default();
        view.show_entries(&entries()[..1]);
        view.apply_status(2, "Updated: later");
        assert!(view.row(2).is_none());
        view.show_entries(&entries());
        assert_eq!(
            view.row(2).and_then(|row| row.status.as_deref()),
            Some("Updated: later")
        );
    }

    #[test]
    fn rows_serialize_flat() -> anyhow::Result<()> {
        let mut view = JournalView::default();
        view.show_entries(&entries());
        view.apply_status(1, "Updated: X");
        let json = serde_json::to_value(view.rows())?;
        assert_eq!(json[0]["id"], 1);
        assert_eq!(json[0]["mood_label"], "Happy");
        assert_eq!(json[0]["status"], "Updated: X");
        assert!(json[1].get("status").is_none());
        Ok(())
    }
}
