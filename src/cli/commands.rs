use std::fmt::Write as _;
use std::io::{self, Read};

use anyhow::{bail, Context, Result};
use clap::{ArgAction, Args};
use time::macros::format_description;

use crate::app::{local_now, App, EditRequest, EntryRow};
use crate::search::filter_by_label;
use crate::storage::{MutationOutcome, NewEntry};

#[derive(Args, Debug, Clone)]
pub struct AddArgs {
    /// Mood label, e.g. "Happy"
    #[arg(long)]
    pub mood: String,
    /// Entry date as dd.MM.yyyy (defaults to today)
    #[arg(long)]
    pub date: Option<String>,
    /// Clock time as HH:mm (defaults to now)
    #[arg(long)]
    pub time: Option<String>,
    /// Provide the description inline. If omitted, reads from stdin.
    #[arg(long)]
    pub description: Option<String>,
}

#[derive(Args, Debug, Clone)]
pub struct EditArgs {
    /// Entry identifier
    pub id: i64,
    #[arg(long)]
    pub mood: Option<String>,
    #[arg(long)]
    pub date: Option<String>,
    #[arg(long)]
    pub time: Option<String>,
    #[arg(long)]
    pub description: Option<String>,
}

#[derive(Args, Debug, Clone)]
pub struct DeleteArgs {
    /// Entry identifier
    pub id: i64,
}

#[derive(Args, Debug, Clone, Default)]
pub struct ListArgs {
    /// Only show entries whose mood label contains this text (case-insensitive)
    #[arg(long)]
    pub search: Option<String>,
    /// Toggle chronological order; repeat to flip direction (-s ascending, -ss descending)
    #[arg(short = 's', long = "sort", action = ArgAction::Count)]
    pub sort_toggles: u8,
    /// Print rows as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Args, Debug, Clone)]
pub struct ShowArgs {
    /// Entry identifier
    pub id: i64,
}

pub fn add_entry(app: &mut App, args: AddArgs) -> Result<()> {
    let mood = args.mood.trim().to_owned();
    if mood.is_empty() {
        bail!("mood label cannot be empty");
    }
    let now = local_now();
    let date = match args.date {
        Some(date) => date,
        None => now
            .format(format_description!("[day].[month].[year]"))
            .context("formatting today's date")?,
    };
    let time = match args.time {
        Some(time) => time,
        None => now
            .format(format_description!("[hour]:[minute]"))
            .context("formatting current time")?,
    };
    let description = match args.description {
        Some(description) => description,
        None => read_stdin()?.unwrap_or_default(),
    };

    let result = app
        .submit_edit(EditRequest::create(NewEntry::new(
            date,
            time,
            mood,
            description.trim_end(),
        )))
        .context("creating entry")?;
    println!("Created entry #{}", result.id);
    Ok(())
}

pub fn edit_entry(app: &mut App, args: EditArgs) -> Result<()> {
    let Some(mut request) = app.open_for_edit(args.id) else {
        bail!("entry {} not found", args.id);
    };
    if let Some(mood) = args.mood {
        request.mood_label = mood;
    }
    if let Some(date) = args.date {
        request.date = date;
    }
    if let Some(time) = args.time {
        request.time = time;
    }
    if let Some(description) = args.description {
        request.description = description;
    }

    let result = app
        .submit_edit(request)
        .with_context(|| format!("editing entry {}", args.id))?;
    if !result.is_updated {
        bail!("entry {} not found", args.id);
    }
    app.complete_edit(result);
    let timeout = app.config.list.settle_timeout();
    if !app.settle(timeout) {
        bail!("status for entry {} was not confirmed in time", args.id);
    }
    if let Some(error) = app.view().last_error() {
        bail!("{error}");
    }
    let status = app
        .view()
        .statuses()
        .get(args.id)
        .unwrap_or_default()
        .to_owned();
    println!("Updated entry #{}  {status}", args.id);
    Ok(())
}

pub fn delete_entry(app: &mut App, args: DeleteArgs) -> Result<()> {
    let outcome = app
        .delete(args.id)
        .wait()
        .with_context(|| format!("deleting entry {}", args.id))?;
    match outcome {
        MutationOutcome::Applied => println!("Deleted entry #{}", args.id),
        MutationOutcome::NotFound => println!("No entry #{}; nothing deleted", args.id),
    }
    Ok(())
}

pub fn list_entries(app: &mut App, args: ListArgs) -> Result<()> {
    let output = render_list(app, &args)?;
    print!("{output}");
    Ok(())
}

pub fn show_entry(app: &App, args: ShowArgs) -> Result<()> {
    let Some(row) = app.view().row(args.id) else {
        bail!("entry {} not found", args.id);
    };
    print!("{}", format_rows(std::slice::from_ref(row)));
    Ok(())
}

fn render_list(app: &mut App, args: &ListArgs) -> Result<String> {
    app.tick();
    for _ in 0..args.sort_toggles {
        app.toggle_sort();
    }
    if let Some(query) = &args.search {
        if args.sort_toggles == 0 {
            app.search(query);
        } else {
            // Keep the chronological order picked above.
            let filtered = filter_by_label(&app.displayed_entries(), query);
            app.show_entries(&filtered);
        }
    }
    if args.json {
        let mut out = serde_json::to_string_pretty(app.rows()).context("serialising rows")?;
        out.push('\n');
        return Ok(out);
    }
    Ok(format_rows(app.rows()))
}

fn format_rows(rows: &[EntryRow]) -> String {
    if rows.is_empty() {
        return "No entries.\n".to_string();
    }
    let mut out = String::new();
    for row in rows {
        let entry = &row.entry;
        let _ = writeln!(
            &mut out,
            "#{}  {} {}  {}",
            entry.id, entry.date, entry.time, entry.mood_label
        );
        if !entry.description.is_empty() {
            for line in entry.description.lines() {
                let _ = writeln!(&mut out, "    {line}");
            }
        }
        if let Some(status) = &row.status {
            let _ = writeln!(&mut out, "    [{status}]");
        }
        out.push('\n');
    }
    out
}

fn read_stdin() -> Result<Option<String>> {
    if atty::is(atty::Stream::Stdin) {
        return Ok(None);
    }
    let mut buf = String::new();
    io::stdin()
        .read_to_string(&mut buf)
        .context("reading description from stdin")?;
    Ok(Some(buf))
}
