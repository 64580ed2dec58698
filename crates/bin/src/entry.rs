//! Directory entries as observable view items.

use std::{
    io,
    path::{Path, PathBuf},
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::SystemTime,
};

use serde::Serialize;
use sortview::{
    Direction, FieldNotifier, Filter, Observable, SortOrder, SubscriptionId, observe::FieldListener,
};
use tracing::{debug, trace};

/// One directory entry.
///
/// Directory sizes start at zero and are filled in later by
/// [`set_size`](Self::set_size), which notifies the view.
#[derive(Debug)]
pub struct FileEntry {
    pub path: PathBuf,
    pub name: String,
    pub is_dir: bool,
    pub modified: Option<SystemTime>,
    size: AtomicU64,
    notifier: FieldNotifier,
}

impl FileEntry {
    pub fn new(path: PathBuf, is_dir: bool, size: u64, modified: Option<SystemTime>) -> Self {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        Self {
            path,
            name,
            is_dir,
            modified,
            size: AtomicU64::new(size),
            notifier: FieldNotifier::new(),
        }
    }

    pub fn size(&self) -> u64 {
        self.size.load(Ordering::Acquire)
    }

    pub fn set_size(&self, size: u64) {
        self.size.store(size, Ordering::Release);
        self.notifier.notify("size");
    }

    pub fn kind(&self) -> &'static str {
        if self.is_dir { "dir" } else { "file" }
    }

    pub fn record(&self) -> EntryRecord {
        EntryRecord {
            name: self.name.clone(),
            kind: self.kind(),
            size: self.size(),
            modified: self
                .modified
                .and_then(|t| t.duration_since(SystemTime::UNIX_EPOCH).ok())
                .map(|d| d.as_secs()),
        }
    }
}

impl Observable for FileEntry {
    fn subscribe(&self, listener: FieldListener) -> SubscriptionId {
        self.notifier.subscribe(listener)
    }

    fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.notifier.unsubscribe(id)
    }
}

/// Serializable form of a [`FileEntry`] for JSON output.
#[derive(Debug, Clone, Serialize)]
pub struct EntryRecord {
    pub name: String,
    pub kind: &'static str,
    pub size: u64,
    /// Seconds since the Unix epoch
    pub modified: Option<u64>,
}

/// Read one level of `dir`. Directory sizes are left at zero.
pub async fn scan(dir: &Path) -> io::Result<Vec<Arc<FileEntry>>> {
    let mut entries = Vec::new();
    let mut read_dir = tokio::fs::read_dir(dir).await?;
    while let Some(dirent) = read_dir.next_entry().await? {
        let metadata = match dirent.metadata().await {
            Ok(metadata) => metadata,
            Err(e) => {
                debug!(path = %dirent.path().display(), "skipping unreadable entry: {e}");
                continue;
            }
        };
        let is_dir = metadata.is_dir();
        let size = if is_dir { 0 } else { metadata.len() };
        entries.push(Arc::new(FileEntry::new(
            dirent.path(),
            is_dir,
            size,
            metadata.modified().ok(),
        )));
    }
    debug!(dir = %dir.display(), count = entries.len(), "scanned directory");
    Ok(entries)
}

/// Total size of regular files below `dir`. Symlinks are not followed and
/// unreadable subtrees count as empty.
pub fn dir_size(dir: &Path) -> u64 {
    let Ok(read_dir) = std::fs::read_dir(dir) else {
        trace!(dir = %dir.display(), "unreadable directory");
        return 0;
    };
    read_dir
        .filter_map(|dirent| dirent.ok())
        .map(|dirent| match dirent.path().symlink_metadata() {
            Ok(metadata) if metadata.is_dir() => dir_size(&dirent.path()),
            Ok(metadata) if metadata.is_file() => metadata.len(),
            _ => 0,
        })
        .sum()
}

/// Parse a comma-separated sort description such as `kind,size:desc`.
pub fn parse_sort(spec: &str) -> Result<SortOrder<FileEntry>, String> {
    let mut order = SortOrder::unsorted();
    for part in spec.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        let (field, direction) = match part.split_once(':') {
            Some((field, direction)) => (field, direction.parse::<Direction>()?),
            None => (part, Direction::Ascending),
        };
        order = match field.to_ascii_lowercase().as_str() {
            "name" => order.then_by("name", |e: &FileEntry| e.name.to_lowercase(), direction),
            "size" => order.then_by("size", FileEntry::size, direction),
            "modified" => order.then_by("modified", |e: &FileEntry| e.modified, direction),
            // Directories first when ascending
            "kind" => order.then_by("kind", |e: &FileEntry| !e.is_dir, direction),
            other => return Err(format!("unknown sort key '{other}'")),
        };
    }
    Ok(order)
}

/// Which entries to show.
#[derive(Debug, Clone, Default)]
pub struct EntryFilter {
    pub min_size: Option<u64>,
    pub pattern: Option<String>,
    pub dirs_only: bool,
    pub files_only: bool,
}

impl EntryFilter {
    /// Combine the active conditions, or `None` if nothing is filtered.
    pub fn build(&self) -> Option<Filter<FileEntry>> {
        let mut filters = Vec::new();
        if let Some(min) = self.min_size {
            filters.push(Filter::new(["size"], move |e: &FileEntry| e.size() >= min));
        }
        if let Some(pattern) = &self.pattern {
            let needle = pattern.to_lowercase();
            filters.push(Filter::new(["name"], move |e: &FileEntry| {
                e.name.to_lowercase().contains(&needle)
            }));
        }
        if self.dirs_only {
            filters.push(Filter::new(["kind"], |e: &FileEntry| e.is_dir));
        }
        if self.files_only {
            filters.push(Filter::new(["kind"], |e: &FileEntry| !e.is_dir));
        }
        filters.into_iter().reduce(Filter::and)
    }
}
