//! List command - shows one directory level through a live view.
//!
//! Entries are added with their directory sizes unknown. Sizes are computed
//! by background tasks; each completion updates the entry, which notifies the
//! view, which repositions or re-filters the entry on its writer.

use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use sortview::{LiveView, ViewConfig, ViewEvent, ViewState};
use tokio::task::JoinSet;
use tracing::{debug, info};

use crate::{
    cli::ListArgs,
    entry::{self, EntryFilter, EntryRecord, FileEntry},
    output::{OutputFormat, human_size, print_table},
};

/// The final listing and the events that produced it.
#[derive(Debug)]
pub struct Listing {
    pub entries: Vec<Arc<FileEntry>>,
    pub events: Vec<String>,
    pub hidden: usize,
}

/// Load view settings from `path`, or defaults when no file is given.
pub fn load_config(path: Option<&Path>) -> Result<ViewConfig, Box<dyn std::error::Error>> {
    let Some(path) = path else {
        return Ok(ViewConfig::default());
    };
    let text = std::fs::read_to_string(path)
        .map_err(|e| format!("failed to read config {}: {e}", path.display()))?;
    let config: ViewConfig = serde_json::from_str(&text)
        .map_err(|e| format!("invalid config {}: {e}", path.display()))?;
    debug!(path = %path.display(), ?config, "loaded view config");
    Ok(config)
}

fn describe(event: &ViewEvent<FileEntry>) -> String {
    match event {
        ViewEvent::Added { item, index } => format!("added   {index:>4}        {}", item.name),
        ViewEvent::Removed { item, index } => format!("removed {index:>4}        {}", item.name),
        ViewEvent::Moved { item, from, to } => format!("moved   {from:>4} -> {to:<4} {}", item.name),
        ViewEvent::Reset => "reset".to_string(),
    }
}

/// Build the listing for `args` without printing it.
pub async fn build_listing(args: &ListArgs) -> Result<Listing, Box<dyn std::error::Error>> {
    let mut config = load_config(args.config.as_deref())?;
    if let Some(live_sorting) = args.live_sorting {
        config.live_sorting = live_sorting;
    }
    let sort = entry::parse_sort(&args.sort)?;
    let filter = EntryFilter {
        min_size: args.min_size,
        pattern: args.pattern.clone(),
        dirs_only: args.dirs_only,
        files_only: args.files_only,
    };

    let mut state: ViewState<PathBuf, FileEntry> = ViewState::with_config(
        Arc::new(|e: &FileEntry| e.path.clone()),
        sort,
        config,
    );
    state.set_filter(filter.build());
    let (view, owner) = LiveView::spawn(state);
    let mut events = view.subscribe().await?;

    let entries = entry::scan(&args.dir).await?;
    let dirs: Vec<Arc<FileEntry>> = entries.iter().filter(|e| e.is_dir).cloned().collect();
    view.add_bulk(entries).await?;

    let mut sizing = JoinSet::new();
    for dir in dirs {
        sizing.spawn(async move {
            let path = dir.path.clone();
            let size = tokio::task::spawn_blocking(move || entry::dir_size(&path)).await?;
            dir.set_size(size);
            Ok::<_, tokio::task::JoinError>(())
        });
    }
    while let Some(result) = sizing.join_next().await {
        result??;
    }

    // Size notifications are applied by the writer as they arrive; this
    // flushes any that are still queued.
    view.process_pending().await?;
    let entries = view.snapshot().await?;
    let hidden = view.total_len() - view.len();
    info!(shown = entries.len(), hidden, "listing complete");

    drop(view);
    owner.await?;

    let mut log = Vec::new();
    while let Ok(event) = events.try_recv() {
        log.push(describe(&event));
    }

    Ok(Listing {
        entries,
        events: log,
        hidden,
    })
}

/// Run the list command
pub async fn run(args: &ListArgs, format: OutputFormat) -> Result<(), Box<dyn std::error::Error>> {
    let listing = build_listing(args).await?;

    match format {
        OutputFormat::Human => {
            if args.events {
                for line in &listing.events {
                    println!("{line}");
                }
                println!();
            }
            let rows: Vec<Vec<String>> = listing
                .entries
                .iter()
                .map(|e| {
                    vec![
                        e.kind().to_string(),
                        human_size(e.size()),
                        e.name.clone(),
                    ]
                })
                .collect();
            print_table(&["KIND", "SIZE", "NAME"], &rows);
            if listing.hidden > 0 {
                println!("({} hidden by filter)", listing.hidden);
            }
        }
        OutputFormat::Json => {
            let records: Vec<EntryRecord> = listing.entries.iter().map(|e| e.record()).collect();
            let value = if args.events {
                serde_json::json!({
                    "entries": records,
                    "hidden": listing.hidden,
                    "events": listing.events,
                })
            } else {
                serde_json::json!({
                    "entries": records,
                    "hidden": listing.hidden,
                })
            };
            println!("{}", serde_json::to_string(&value)?);
        }
    }

    Ok(())
}
