use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};

use crate::config::AppConfig;
use crate::controller::ListController;
use crate::overlay::{OverlayEvent, OverlayWriter, StatusIndex, StatusOverlayStore};
use crate::repository::{Pending, Repository};
use crate::storage::{self, Entry, MutationOutcome, NewEntry};

pub mod edit;
pub mod state;

pub use edit::{local_now, status_text, EditMode, EditRequest, EditResult};
pub use state::{EntryRow, JournalView};

/// What one foreground [`App::tick`] applied to the view.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickSummary {
    pub list_replaced: bool,
    pub statuses_applied: usize,
    pub status_failures: usize,
}

impl TickSummary {
    pub fn is_idle(&self) -> bool {
        !self.list_replaced && self.statuses_applied == 0 && self.status_failures == 0
    }
}

/// Foreground side of the journal: wires the stores together and keeps the
/// rendered rows in step with both of them.
pub struct App {
    pub config: Arc<AppConfig>,
    controller: ListController,
    overlay: OverlayWriter,
    view: JournalView,
    pending_status_writes: usize,
}

impl App {
    pub fn new(config: Arc<AppConfig>) -> Result<Self> {
        let store = storage::init(&config.storage).context("opening entry store")?;
        let repository = Repository::new(store)?;
        let controller = ListController::new(repository);

        let overlay_store = StatusOverlayStore::open(config.overlay.status_dir.clone())
            .context("opening status overlay")?;
        let (statuses, load_error) = load_statuses(&overlay_store);
        let overlay = OverlayWriter::spawn(overlay_store)?;

        let mut view = JournalView::new(statuses);
        view.set_last_error(load_error);
        view.show_entries(&controller.current());
        Ok(Self {
            config,
            controller,
            overlay,
            view,
            pending_status_writes: 0,
        })
    }

    pub fn view(&self) -> &JournalView {
        &self.view
    }

    pub fn rows(&self) -> &[EntryRow] {
        self.view.rows()
    }

    pub fn controller(&self) -> &ListController {
        &self.controller
    }

    /// Applies every list emission and status completion that has arrived
    /// since the previous tick. Never blocks.
    pub fn tick(&mut self) -> TickSummary {
        let mut summary = TickSummary::default();
        if let Some(list) = self.controller.refresh() {
            self.view.show_entries(&list);
            summary.list_replaced = true;
        }
        for event in self.overlay.drain() {
            self.apply_overlay_event(event, &mut summary);
        }
        summary
    }

    /// Ticks until every queued status write has reported back or `timeout`
    /// passes. Returns `false` on timeout.
    pub fn settle(&mut self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        self.tick();
        while self.pending_status_writes > 0 {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match self.overlay.events().recv_timeout(remaining) {
                Ok(event) => {
                    let mut summary = TickSummary::default();
                    self.apply_overlay_event(event, &mut summary);
                }
                Err(_) => {
                    tracing::warn!(
                        pending = self.pending_status_writes,
                        "status writes still outstanding"
                    );
                    return false;
                }
            }
        }
        self.tick();
        true
    }

    pub fn insert(&self, entry: NewEntry) -> Pending<i64> {
        self.controller.insert(entry)
    }

    /// Deleting an entry leaves its status file in place.
    pub fn delete(&self, id: i64) -> Pending<MutationOutcome> {
        self.controller.delete(id)
    }

    pub fn open_for_edit(&self, id: i64) -> Option<EditRequest> {
        self.controller.find(id).map(EditRequest::edit)
    }

    /// Persists what the editing screen produced and reports the outcome
    /// in the screen's result shape.
    pub fn submit_edit(&self, request: EditRequest) -> Result<EditResult> {
        match (request.mode, request.id) {
            (EditMode::Create, _) => {
                let id = self
                    .controller
                    .insert(request.fields())
                    .wait()
                    .context("saving new entry")?;
                Ok(EditResult {
                    id,
                    is_updated: false,
                })
            }
            (EditMode::Edit, Some(id)) => {
                let outcome = self
                    .controller
                    .update(request.fields().with_id(id))
                    .wait()
                    .with_context(|| format!("saving entry {id}"))?;
                Ok(EditResult {
                    id,
                    is_updated: outcome.is_applied(),
                })
            }
            (EditMode::Edit, None) => bail!("edit request is missing an entry id"),
        }
    }

    /// Hook for the editing screen closing. A confirmed update queues a
    /// fresh status annotation; the row picks it up on a later tick.
    pub fn complete_edit(&mut self, result: EditResult) -> bool {
        if !result.wants_status() {
            return false;
        }
        self.view.set_last_error(None);
        let status = status_text(&self.config.overlay.status_prefix, local_now());
        if self.overlay.put(result.id, status) {
            self.pending_status_writes += 1;
            true
        } else {
            self.view
                .set_last_error(Some(format!("status for entry {} not saved", result.id)));
            false
        }
    }

    /// Explicit search over the mood labels.
    pub fn search(&mut self, query: &str) {
        let results = self.controller.search(query);
        self.view.show_entries(&results);
    }

    pub fn query_changed(&mut self, text: &str) {
        if let Some(full) = self.controller.query_changed(text) {
            self.view.show_entries(&full);
        }
    }

    pub fn toggle_sort(&mut self) -> bool {
        let ascending = self.controller.next_sort_is_ascending();
        let ordered = self.controller.toggle_chronological();
        self.view.show_entries(&ordered);
        ascending
    }

    pub fn entry(&self, id: i64) -> Option<&Entry> {
        self.controller.find(id)
    }

    /// Entries in the order the rows currently show them.
    pub fn displayed_entries(&self) -> Vec<Entry> {
        self.view.rows().iter().map(|row| row.entry.clone()).collect()
    }

    pub fn show_entries(&mut self, entries: &[Entry]) {
        self.view.show_entries(entries);
    }

    fn apply_overlay_event(&mut self, event: OverlayEvent, summary: &mut TickSummary) {
        self.pending_status_writes = self.pending_status_writes.saturating_sub(1);
        match event {
            OverlayEvent::Written { id, status } => {
                self.view.apply_status(id, &status);
                summary.statuses_applied += 1;
            }
            OverlayEvent::Failed { id, message } => {
                tracing::warn!(id, %message, "status annotation lost");
                self.view
                    .set_last_error(Some(format!("status for entry {id} not saved: {message}")));
                summary.status_failures += 1;
            }
        }
    }
}

/// Status annotations are decoration: a broken overlay directory degrades to
/// missing statuses plus an error note instead of stopping startup.
fn load_statuses(store: &StatusOverlayStore) -> (StatusIndex, Option<String>) {
    match store.scan() {
        Ok(scan) if scan.unreadable.is_empty() => (scan.index, None),
        Ok(scan) => {
            let message = format!(
                "{} status file(s) could not be read in {}",
                scan.unreadable.len(),
                store.directory().display()
            );
            (scan.index, Some(message))
        }
        Err(err) => {
            let err = anyhow::Error::from(err);
            tracing::warn!(error = %format!("{err:#}"), "starting without entry statuses");
            (StatusIndex::default(), Some(format!("{err:#}")))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use std::fs;
    use tempfile::TempDir;

    const WAIT: Duration = Duration::from_secs(5);

    fn temp_config(root: &TempDir) -> Arc<AppConfig> {
        let mut config = AppConfig::default();
        config.storage.database_path = root.path().join("data").join("journal.db");
        config.overlay.status_dir = root.path().join("data").join("status");
        Arc::new(config)
    }

    fn row_ids(app: &App) -> Vec<i64> {
        app.rows().iter().map(|row| row.entry.id).collect()
    }

    fn add(app: &mut App, date: &str, time: &str, mood: &str) -> anyhow::Result<i64> {
        let id = app.insert(NewEntry::new(date, time, mood, "")).wait()?;
        app.tick();
        Ok(id)
    }

    #[test]
    fn inserted_entries_show_up_in_insertion_order() -> anyhow::Result<()> {
        let temp = TempDir::new()?;
        let mut app = App::new(temp_config(&temp))?;
        let a = add(&mut app, "01.01.2024", "10:00", "Happy")?;
        let b = add(&mut app, "02.01.2024", "09:00", "Sad")?;
        assert_eq!(row_ids(&app), vec![a, b]);
        assert!(app.tick().is_idle());
        Ok(())
    }

    #[test]
    fn sort_then_search_walkthrough() -> anyhow::Result<()> {
        let temp = TempDir::new()?;
        let mut app = App::new(temp_config(&temp))?;
        let a = add(&mut app, "01.01.2024", "10:00", "Happy")?;
        let b = add(&mut app, "02.01.2024", "09:00", "Sad")?;

        assert!(app.toggle_sort());
        assert_eq!(row_ids(&app), vec![a, b]);
        assert!(!app.toggle_sort());
        assert_eq!(row_ids(&app), vec![b, a]);

        app.search("sad");
        assert_eq!(row_ids(&app), vec![b]);
        app.query_changed("sa");
        assert_eq!(row_ids(&app), vec![b]);
        app.query_changed("");
        assert_eq!(row_ids(&app), vec![a, b]);
        Ok(())
    }

    #[test]
    fn confirmed_edit_annotates_only_that_row() -> anyhow::Result<()> {
        let temp = TempDir::new()?;
        let config = temp_config(&temp);
        let mut app = App::new(config.clone())?;
        let a = add(&mut app, "01.01.2024", "10:00", "Happy")?;
        let b = add(&mut app, "02.01.2024", "09:00", "Sad")?;

        let mut request = app.open_for_edit(b).expect("entry b is listed");
        request.description = "rain all day".into();
        let result = app.submit_edit(request)?;
        assert_eq!(result, EditResult { id: b, is_updated: true });
        assert!(app.complete_edit(result));
        assert!(app.settle(WAIT));

        let status = app
            .view()
            .row(b)
            .and_then(|row| row.status.clone())
            .expect("status on b");
        assert!(status.starts_with("Updated: "), "unexpected status {status}");
        assert_eq!(app.view().row(a).and_then(|row| row.status.clone()), None);
        assert_eq!(
            app.entry(b).map(|entry| entry.description.as_str()),
            Some("rain all day")
        );

        let on_disk = StatusOverlayStore::open(config.overlay.status_dir.clone())?.load_all()?;
        assert_eq!(on_disk.get(b), Some(status.as_str()));
        Ok(())
    }

    #[test]
    fn creating_or_missing_edits_write_no_status() -> anyhow::Result<()> {
        let temp = TempDir::new()?;
        let mut app = App::new(temp_config(&temp))?;
        let created = app.submit_edit(EditRequest::create(NewEntry::new(
            "01.01.2024",
            "10:00",
            "Happy",
            "",
        )))?;
        assert!(!created.is_updated);
        assert!(!app.complete_edit(created));

        let mut ghost = EditRequest::create(NewEntry::new("01.01.2024", "10:00", "Gone", ""));
        ghost.mode = EditMode::Edit;
        ghost.id = Some(999);
        let result = app.submit_edit(ghost)?;
        assert!(!result.is_updated);
        assert!(!app.complete_edit(result));

        app.settle(WAIT);
        assert!(app.rows().iter().all(|row| row.status.is_none()));
        Ok(())
    }

    #[test]
    fn edit_without_id_is_rejected() -> anyhow::Result<()> {
        let temp = TempDir::new()?;
        let app = App::new(temp_config(&temp))?;
        let mut request = EditRequest::create(NewEntry::default());
        request.mode = EditMode::Edit;
        assert!(app.submit_edit(request).is_err());
        Ok(())
    }

    #[test]
    fn restart_restores_statuses_for_existing_entries() -> anyhow::Result<()> {
        let temp = TempDir::new()?;
        let config = temp_config(&temp);
        {
            let mut app = App::new(config.clone())?;
            for i in 0..7 {
                add(&mut app, "01.01.2024", &format!("0{i}:00"), "Calm")?;
            }
        }
        fs::write(config.overlay.status_dir.join("status_7.txt"), "Updated: X")?;
        fs::write(config.overlay.status_dir.join("status_x.txt"), "ignored")?;

        let app = App::new(config)?;
        assert_eq!(app.view().statuses().len(), 1);
        assert_eq!(
            app.view().row(7).and_then(|row| row.status.as_deref()),
            Some("Updated: X")
        );
        Ok(())
    }

    #[test]
    fn deleting_an_entry_orphans_its_status() -> anyhow::Result<()> {
        let temp = TempDir::new()?;
        let config = temp_config(&temp);
        let mut app = App::new(config.clone())?;
        let id = add(&mut app, "01.01.2024", "10:00", "Happy")?;
        app.complete_edit(EditResult {
            id,
            is_updated: true,
        });
        assert!(app.settle(WAIT));

        assert_matches!(app.delete(id).wait()?, MutationOutcome::Applied);
        app.tick();
        assert!(app.rows().is_empty());
        assert!(app.view().statuses().get(id).is_some());
        assert!(config
            .overlay
            .status_dir
            .join(crate::overlay::file_name(id))
            .is_file());
        Ok(())
    }

    #[test]
    fn failed_status_write_is_surfaced() -> anyhow::Result<()> {
        let temp = TempDir::new()?;
        let config = temp_config(&temp);
        let mut app = App::new(config.clone())?;
        let id = add(&mut app, "01.01.2024", "10:00", "Happy")?;
        fs::remove_dir_all(&config.overlay.status_dir)?;

        app.complete_edit(EditResult {
            id,
            is_updated: true,
        });
        assert!(app.settle(WAIT));
        assert!(app.view().last_error().is_some());
        assert_eq!(app.view().row(id).and_then(|row| row.status.clone()), None);
        Ok(())
    }

    #[test]
    fn undecodable_status_file_does_not_block_startup() -> anyhow::Result<()> {
        let temp = TempDir::new()?;
        let config = temp_config(&temp);
        {
            let mut app = App::new(config.clone())?;
            add(&mut app, "01.01.2024", "10:00", "Happy")?;
            add(&mut app, "02.01.2024", "09:00", "Sad")?;
        }
        fs::write(config.overlay.status_dir.join("status_1.txt"), "Updated: ok")?;
        fs::write(config.overlay.status_dir.join("status_2.txt"), [0xff, 0xfe, 0x41])?;

        let app = App::new(config)?;
        assert_eq!(
            app.view().row(1).and_then(|row| row.status.as_deref()),
            Some("Updated: ok")
        );
        assert!(app.view().row(2).and_then(|row| row.status.as_deref()).is_some());
        assert_eq!(app.view().last_error(), None);
        Ok(())
    }

    #[cfg(unix)]
    #[test]
    fn unreadable_status_file_is_noted_but_startup_succeeds() -> anyhow::Result<()> {
        let temp = TempDir::new()?;
        let config = temp_config(&temp);
        {
            let mut app = App::new(config.clone())?;
            add(&mut app, "01.01.2024", "10:00", "Happy")?;
        }
        fs::write(config.overlay.status_dir.join("status_1.txt"), "Updated: ok")?;
        std::os::unix::fs::symlink(
            temp.path().join("missing"),
            config.overlay.status_dir.join("status_2.txt"),
        )?;

        let mut app = App::new(config)?;
        assert_eq!(
            app.view().row(1).and_then(|row| row.status.as_deref()),
            Some("Updated: ok")
        );
        assert!(app
            .view()
            .last_error()
            .is_some_and(|error| error.contains("could not be read")));

        app.complete_edit(EditResult {
            id: 1,
            is_updated: true,
        });
        assert!(app.settle(WAIT));
        assert_eq!(app.view().last_error(), None);
        Ok(())
    }
}
