//! Rebuild-on-change for any [`BundlerAdapter`].
//!
//! A `notify` watcher covers the directories holding the entry files. Change
//! events are debounced, then the adapter rebuilds the whole config and the
//! outcome is broadcast as [`WatchEvent`]s. Both engines emit the same events.

use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use parking_lot::Mutex;
use path_clean::PathClean;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::adapter::BundlerAdapter;
use crate::result::BuildResult;
use crate::unified::UnifiedConfig;
use crate::{Error, Result};

/// Quiet period after the last change before rebuilding.
pub const DEBOUNCE: Duration = Duration::from_millis(100);

const EVENT_CAPACITY: usize = 16;

#[derive(Debug, Clone)]
pub enum WatchEvent {
    BuildStart,
    BuildEnd(Box<BuildResult>),
    Error(String),
}

pub struct BuildWatcher {
    events: broadcast::Sender<WatchEvent>,
    /// Subscribed before the first build so its events are not lost.
    first: Mutex<Option<broadcast::Receiver<WatchEvent>>>,
    roots: Vec<PathBuf>,
    shutdown: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
    _watcher: RecommendedWatcher,
}

impl std::fmt::Debug for BuildWatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BuildWatcher")
            .field("roots", &self.roots)
            .field("running", &self.shutdown.is_some())
            .finish()
    }
}

impl BuildWatcher {
    /// Watch the entry directories of `config` and build once immediately.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(adapter: Arc<dyn BundlerAdapter>, config: UnifiedConfig) -> Result<Self> {
        let roots = source_roots(&config);
        let ignored = vec![config.out_dir().clean(), config.cwd.join("node_modules")];

        let (change_tx, mut changes) = mpsc::channel::<PathBuf>(100);
        let filter_roots = roots.clone();
        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| {
            let Ok(event) = res else {
                return;
            };
            if !matches!(
                event.kind,
                EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_)
            ) {
                return;
            }
            for path in event.paths {
                if !should_ignore(&path, &filter_roots, &ignored) {
                    // A full queue already guarantees a rebuild.
                    let _ = change_tx.try_send(path);
                }
            }
        })
        .map_err(|e| watch_error(&config.cwd, e))?;

        for root in &roots {
            watcher
                .watch(root, RecursiveMode::Recursive)
                .map_err(|e| watch_error(root, e))?;
        }
        info!(roots = ?roots, bundler = %adapter.kind(), "Watching for changes");

        let (events, first) = broadcast::channel(EVENT_CAPACITY);
        let (shutdown, mut shutdown_rx) = oneshot::channel::<()>();
        let sender = events.clone();

        let task = tokio::spawn(async move {
            rebuild(adapter.as_ref(), &config, &sender).await;
            loop {
                tokio::select! {
                    _ = &mut shutdown_rx => break,
                    change = changes.recv() => {
                        let Some(path) = change else { break };
                        while let Ok(Some(_)) = timeout(DEBOUNCE, changes.recv()).await {}
                        debug!(path = %path.display(), "Source changed");
                        rebuild(adapter.as_ref(), &config, &sender).await;
                    }
                }
            }
            debug!("Watcher stopped");
        });

        Ok(Self {
            events,
            first: Mutex::new(Some(first)),
            roots,
            shutdown: Some(shutdown),
            task: Some(task),
            _watcher: watcher,
        })
    }

    /// Subscribe to build events. The first subscriber also sees the initial build.
    pub fn on(&self) -> broadcast::Receiver<WatchEvent> {
        self.first
            .lock()
            .take()
            .unwrap_or_else(|| self.events.subscribe())
    }

    /// Unsubscribe.
    pub fn off(&self, receiver: broadcast::Receiver<WatchEvent>) {
        drop(receiver);
    }

    pub fn roots(&self) -> &[PathBuf] {
        &self.roots
    }

    /// Stop watching and wait for an in-flight build to finish.
    pub async fn close(mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                warn!("Watch task ended abnormally: {e}");
            }
        }
    }
}

impl Drop for BuildWatcher {
    fn drop(&mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
    }
}

async fn rebuild(
    adapter: &dyn BundlerAdapter,
    config: &UnifiedConfig,
    events: &broadcast::Sender<WatchEvent>,
) {
    let _ = events.send(WatchEvent::BuildStart);
    match adapter.build(config).await {
        Ok(result) => {
            info!(
                build_id = %result.build_id,
                duration_ms = result.duration_ms,
                "Rebuilt"
            );
            let _ = events.send(WatchEvent::BuildEnd(Box::new(result)));
        }
        Err(e) => {
            warn!("Rebuild failed: {e}");
            let _ = events.send(WatchEvent::Error(e.to_string()));
        }
    }
}

fn watch_error(path: &Path, error: notify::Error) -> Error {
    Error::Filesystem {
        path: path.to_path_buf(),
        message: format!("Cannot watch ({error})"),
        source: None,
    }
}

/// Directories containing the entries, with nested ones folded into their parents.
pub(crate) fn source_roots(config: &UnifiedConfig) -> Vec<PathBuf> {
    let mut dirs: Vec<PathBuf> = config
        .input
        .paths()
        .into_iter()
        .map(|path| {
            let absolute = if path.is_absolute() {
                path.to_path_buf()
            } else {
                config.cwd.join(path)
            };
            absolute
                .clean()
                .parent()
                .map(Path::to_path_buf)
                .unwrap_or_else(|| config.cwd.clone())
        })
        .collect();

    dirs.sort();
    dirs.dedup();
    let mut roots: Vec<PathBuf> = Vec::with_capacity(dirs.len());
    for dir in dirs {
        if !roots.iter().any(|root| dir.starts_with(root)) {
            roots.push(dir);
        }
    }
    if roots.is_empty() {
        roots.push(config.cwd.clone());
    }
    roots
}

/// Outputs, dependencies and hidden files never trigger a rebuild.
fn should_ignore(path: &Path, roots: &[PathBuf], ignored: &[PathBuf]) -> bool {
    if ignored.iter().any(|dir| path.starts_with(dir)) {
        return true;
    }
    let Some(relative) = roots.iter().find_map(|root| path.strip_prefix(root).ok()) else {
        return true;
    };
    relative.components().any(|component| match component {
        Component::Normal(name) => {
            let name = name.to_string_lossy();
            name.starts_with('.') || name == "node_modules"
        }
        _ => false,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::fake::FakeAdapter;
    use crate::unified::{UnifiedInput, UnifiedOutputConfig};
    use kiln_config::OutputFormat;
    use std::collections::BTreeMap;
    use tempfile::TempDir;

    #[test]
    fn nested_entry_directories_fold_into_one_root() {
        let config = UnifiedConfig::new(
            "/project",
            UnifiedInput::Named(BTreeMap::from([
                ("index".to_string(), PathBuf::from("src/index.ts")),
                ("utils/math".to_string(), PathBuf::from("src/utils/math.ts")),
                ("cli".to_string(), PathBuf::from("bin/cli.ts")),
            ])),
        );
        assert_eq!(
            source_roots(&config),
            vec![PathBuf::from("/project/bin"), PathBuf::from("/project/src")]
        );
    }

    #[test]
    fn outputs_and_hidden_files_are_ignored() {
        let roots = vec![PathBuf::from("/project")];
        let ignored = vec![PathBuf::from("/project/dist")];
        assert!(should_ignore(Path::new("/project/dist/es/index.js"), &roots, &ignored));
        assert!(should_ignore(Path::new("/project/.git/index"), &roots, &ignored));
        assert!(should_ignore(Path::new("/project/node_modules/x/a.js"), &roots, &ignored));
        assert!(should_ignore(Path::new("/elsewhere/a.ts"), &roots, &ignored));
        assert!(!should_ignore(Path::new("/project/src/a.ts"), &roots, &ignored));
    }

    async fn next(events: &mut broadcast::Receiver<WatchEvent>) -> WatchEvent {
        timeout(Duration::from_secs(10), events.recv())
            .await
            .unwrap()
            .unwrap()
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn builds_on_start_and_after_changes() {
        let dir = TempDir::new().unwrap();
        let src = dir.path().join("src");
        std::fs::create_dir_all(&src).unwrap();
        std::fs::write(src.join("index.ts"), "export const a = 1;").unwrap();

        let mut config = UnifiedConfig::new(dir.path(), UnifiedInput::Single(PathBuf::from("src/index.ts")));
        config.output = vec![UnifiedOutputConfig::new(OutputFormat::Esm, dir.path().join("dist"))];

        let adapter = Arc::new(FakeAdapter::default());
        let watcher = BuildWatcher::start(adapter.clone(), config).unwrap();
        let mut events = watcher.on();

        assert!(matches!(next(&mut events).await, WatchEvent::BuildStart));
        assert!(matches!(next(&mut events).await, WatchEvent::BuildEnd(_)));

        std::fs::write(src.join("index.ts"), "export const a = 2;").unwrap();
        assert!(matches!(next(&mut events).await, WatchEvent::BuildStart));
        assert!(matches!(next(&mut events).await, WatchEvent::BuildEnd(_)));

        watcher.close().await;
        assert!(adapter.builds.load(std::sync::atomic::Ordering::SeqCst) >= 2);
    }
}
