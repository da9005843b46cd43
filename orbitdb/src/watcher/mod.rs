use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::time::Duration;

const DEBOUNCE: Duration = Duration::from_millis(100);

/// A watched directory as the caller named it, plus its canonical form.
/// Some platforms report events under the canonical path.
#[derive(Debug, Clone)]
struct WatchedDir {
    path: PathBuf,
    canonical: Option<PathBuf>,
}

/// Reports which watched model directories had record files change.
///
/// Events are batched on a background thread until 100ms pass without a new
/// one, then each touched directory is sent once, under the exact path that
/// was passed to [`FileWatcher::start`] so it matches the driver cache keys.
/// Relational tables are not watched; they detect foreign writes through
/// `PRAGMA data_version` instead.
pub struct FileWatcher {
    _watcher: RecommendedWatcher,
    _thread: std::thread::JoinHandle<()>,
    dir_rx: mpsc::Receiver<PathBuf>,
}

impl FileWatcher {
    /// Watch `dirs` (non-recursively) for files ending in one of
    /// `extensions`. Directories that do not exist yet are skipped.
    pub fn start(dirs: &[PathBuf], extensions: &[String]) -> Result<Self, notify::Error> {
        let (notify_tx, notify_rx) = mpsc::channel::<notify::Result<Event>>();
        let (dir_tx, dir_rx) = mpsc::channel::<PathBuf>();

        let mut watcher = RecommendedWatcher::new(
            move |res| {
                let _ = notify_tx.send(res);
            },
            Config::default(),
        )?;

        let mut watched = Vec::new();
        for dir in dirs.iter().filter(|d| d.is_dir()) {
            watcher.watch(dir, RecursiveMode::NonRecursive)?;
            log::debug!("Watching {}", dir.display());
            watched.push(WatchedDir {
                path: dir.clone(),
                canonical: dir.canonicalize().ok(),
            });
        }

        let extensions = extensions.to_vec();
        let thread = std::thread::spawn(move || {
            let mut pending = BTreeSet::new();
            loop {
                match notify_rx.recv_timeout(DEBOUNCE) {
                    Ok(Ok(event)) => {
                        pending.extend(touched_directories(&event, &watched, &extensions));
                    }
                    Ok(Err(e)) => log::warn!("File watcher error: {e}"),
                    Err(mpsc::RecvTimeoutError::Timeout) => {
                        for dir in std::mem::take(&mut pending) {
                            if dir_tx.send(dir).is_err() {
                                return;
                            }
                        }
                    }
                    Err(mpsc::RecvTimeoutError::Disconnected) => break,
                }
            }
        });

        Ok(FileWatcher {
            _watcher: watcher,
            _thread: thread,
            dir_rx,
        })
    }

    /// Directories reported since the last call, without blocking.
    pub fn changed_directories(&self) -> BTreeSet<PathBuf> {
        self.dir_rx.try_iter().collect()
    }
}

/// Watched directories containing a record file named by `event`.
fn touched_directories(
    event: &Event,
    watched: &[WatchedDir],
    extensions: &[String],
) -> Vec<PathBuf> {
    if !matches!(
        event.kind,
        EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_)
    ) {
        return Vec::new();
    }

    event
        .paths
        .iter()
        .filter(|path| is_record_file(path, extensions))
        .filter_map(|path| path.parent())
        .filter_map(|parent| {
            watched
                .iter()
                .find(|w| w.path.as_path() == parent || w.canonical.as_deref() == Some(parent))
                .map(|w| w.path.clone())
        })
        .collect()
}

fn is_record_file(path: &Path, extensions: &[String]) -> bool {
    match path.extension().and_then(|e| e.to_str()) {
        Some(ext) => extensions.iter().any(|known| known == ext),
        None => false,
    }
}
