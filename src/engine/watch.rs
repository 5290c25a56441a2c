use crate::model::{ChangeEvent, ChangeKind};
use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{channel, Receiver};
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum WatchError {
    #[error("failed to create watcher: {0}")]
    Create(#[from] notify::Error),

    #[error("failed to watch path {path}: {source}")]
    WatchPath {
        path: PathBuf,
        source: notify::Error,
    },
}

/// Filesystem watcher over the configured roots. Raw events are converted to
/// [`ChangeEvent`]s and pushed onto a channel the reload thread drains; the
/// watcher itself must be kept alive for events to keep flowing.
pub struct ArtifactWatcher {
    _watcher: RecommendedWatcher,
}

impl ArtifactWatcher {
    pub fn subscribe(paths: &[PathBuf]) -> Result<(Self, Receiver<ChangeEvent>), WatchError> {
        let (tx, rx) = channel();
        let mut watcher = RecommendedWatcher::new(
            move |res: Result<Event, notify::Error>| match res {
                Ok(event) => {
                    for change in to_change_events(&event) {
                        let _ = tx.send(change);
                    }
                }
                Err(e) => log::warn!("filesystem watch error: {}", e),
            },
            Config::default().with_poll_interval(Duration::from_millis(100)),
        )?;
        for path in paths {
            watcher
                .watch(path, RecursiveMode::Recursive)
                .map_err(|source| WatchError::WatchPath {
                    path: path.clone(),
                    source,
                })?;
            log::info!("watching {} for compiled modules", path.display());
        }
        Ok((Self { _watcher: watcher }, rx))
    }
}

/// Flatten a raw notify event into per-path change events. Event kinds
/// outside create/modify/remove are dropped.
pub fn to_change_events(event: &Event) -> Vec<ChangeEvent> {
    let kind = match event.kind {
        EventKind::Create(_) => ChangeKind::Create,
        EventKind::Modify(_) => ChangeKind::Modify,
        EventKind::Remove(_) => ChangeKind::Remove,
        _ => return Vec::new(),
    };
    event
        .paths
        .iter()
        .filter_map(|path: &PathBuf| ChangeEvent::from_path(Path::new(path), kind))
        .collect()
}

/// Coalesce a burst of events to one event per path.
///
/// A compiler writes an artifact as a create followed by one or more
/// modifies, so Create dominates Modify; remove-then-create is a recreate
/// and stays Create, which restarts the module's lifecycle.
pub fn coalesce<I>(events: I) -> Vec<ChangeEvent>
where
    I: IntoIterator<Item = ChangeEvent>,
{
    let mut by_path: HashMap<PathBuf, ChangeEvent> = HashMap::new();
    for event in events {
        match by_path.entry(event.path()) {
            Entry::Occupied(mut existing) => {
                let kind = combine(existing.get().kind, event.kind);
                existing.get_mut().kind = kind;
            }
            Entry::Vacant(slot) => {
                slot.insert(event);
            }
        }
    }
    let mut out: Vec<ChangeEvent> = by_path.into_values().collect();
    out.sort_by(|a, b| a.path().cmp(&b.path()));
    out
}

fn combine(prev: ChangeKind, next: ChangeKind) -> ChangeKind {
    use ChangeKind::*;
    match (prev, next) {
        (Create, Modify) => Create,
        (Modify, Create) => Create,
        (Remove, Create) => Create,
        (Create, Remove) => Remove,
        (Modify, Remove) => Remove,
        (Remove, Modify) => Remove,
        (same, _) => same,
    }
}
