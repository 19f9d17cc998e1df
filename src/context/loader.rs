//! Workspace context loader
//!
//! Contexts are keyed by configuration file. A file belongs to the nearest
//! `utility-css.json` (or `.utility-css.json`) found walking up from its
//! directory to the workspace root; files with no configuration share a
//! fallback context with an empty catalog.
//!
//! A `notify` watcher on the workspace root reloads or unloads contexts when
//! their configuration changes and announces it on a broadcast channel.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use dashmap::DashMap;
use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use parking_lot::{Mutex, RwLock};
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use super::{Context, ContextEvent, ContextId, ContextResolver, FileFilter};
use crate::engine::UtilityCatalog;
use crate::engine::catalog::CatalogConfig;

pub const CONFIG_FILE_NAMES: &[&str] = &["utility-css.json", ".utility-css.json"];

const EVENT_CAPACITY: usize = 64;

pub fn is_config_file(path: &Path) -> bool {
    path.file_name()
        .and_then(|name| name.to_str())
        .is_some_and(|name| CONFIG_FILE_NAMES.contains(&name))
}

/// Directories whose configuration files the default filter excludes, judged
/// by their path below `root` so that the root's own location does not count.
fn is_skipped_dir(filter: &FileFilter, root: &Path, dir: &Path) -> bool {
    let Ok(relative) = dir.strip_prefix(root) else {
        return false;
    };
    let candidate = Path::new(std::path::MAIN_SEPARATOR_STR)
        .join(relative)
        .join(CONFIG_FILE_NAMES[0]);
    filter.excludes(&candidate)
}

pub struct WorkspaceContextLoader {
    root: RwLock<Option<PathBuf>>,
    contexts: DashMap<PathBuf, Arc<Context>>,
    fallback: RwLock<Option<Arc<Context>>>,
    next_id: AtomicU64,
    events: broadcast::Sender<ContextEvent>,
    watcher: Mutex<Option<RecommendedWatcher>>,
}

impl Default for WorkspaceContextLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl WorkspaceContextLoader {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            root: RwLock::new(None),
            contexts: DashMap::new(),
            fallback: RwLock::new(None),
            next_id: AtomicU64::new(1),
            events,
            watcher: Mutex::new(None),
        }
    }

    pub fn set_root(&self, root: PathBuf) {
        info!("Workspace root: {}", root.display());
        *self.root.write() = Some(root);
        *self.fallback.write() = None;
    }

    pub fn root(&self) -> Option<PathBuf> {
        self.root.read().clone()
    }

    /// Number of loaded configuration contexts, not counting the fallback.
    pub fn len(&self) -> usize {
        self.contexts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.contexts.is_empty()
    }

    fn next_id(&self) -> ContextId {
        ContextId(self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    fn emit(&self, event: ContextEvent) {
        // No receivers is fine: nothing derived from the context exists yet.
        let _ = self.events.send(event);
    }

    /// The nearest configuration file for `path`, searching its directory and
    /// its ancestors up to the workspace root.
    pub fn find_config(&self, path: &Path) -> Option<PathBuf> {
        let root = self.root();
        let mut dir = path.parent();
        while let Some(current) = dir {
            if root.as_deref().is_some_and(|root| !current.starts_with(root)) {
                break;
            }
            for name in CONFIG_FILE_NAMES {
                let candidate = current.join(name);
                if candidate.is_file() {
                    return Some(candidate);
                }
            }
            if root.as_deref() == Some(current) {
                break;
            }
            dir = current.parent();
        }
        None
    }

    /// Returns the cached context for `config_path`, loading it on first use.
    pub async fn load(&self, config_path: &Path) -> anyhow::Result<Arc<Context>> {
        if let Some(context) = self.contexts.get(config_path).map(|entry| entry.value().clone()) {
            return Ok(context);
        }

        let context = Arc::new(self.build(config_path).await?);
        // A concurrent load may have won the race; keep the first one.
        let context = self
            .contexts
            .entry(config_path.to_path_buf())
            .or_insert(context)
            .value()
            .clone();
        Ok(context)
    }

    async fn build(&self, config_path: &Path) -> anyhow::Result<Context> {
        let config = CatalogConfig::load(config_path).await?;
        let filter = FileFilter::new(config.include.as_deref(), config.exclude.as_deref())?;
        let catalog = UtilityCatalog::from_config(&config);
        let id = self.next_id();
        info!(
            "Loaded {} with {} utilities as {}",
            config_path.display(),
            catalog.len(),
            id
        );

        Ok(Context {
            id,
            root: config_path.parent().map(Path::to_path_buf).unwrap_or_default(),
            config_path: Some(config_path.to_path_buf()),
            engine: Arc::new(catalog),
            filter,
        })
    }

    /// Context for files with no configuration file above them.
    pub fn fallback_context(&self, path: &Path) -> Arc<Context> {
        if let Some(context) = self.fallback.read().clone() {
            return context;
        }

        let root = self
            .root()
            .or_else(|| path.parent().map(Path::to_path_buf))
            .unwrap_or_default();
        let context = Arc::new(Context {
            id: self.next_id(),
            root,
            config_path: None,
            engine: Arc::new(UtilityCatalog::default()),
            filter: FileFilter::default(),
        });
        self.fallback.write().get_or_insert(context).clone()
    }

    /// Replaces a loaded context with a fresh load of its configuration and
    /// announces the old id. Returns `None` if the context was not loaded.
    pub async fn reload(&self, config_path: &Path) -> Option<ContextId> {
        let (_, previous) = self.contexts.remove(config_path)?;
        match self.load(config_path).await {
            Ok(context) => {
                info!("Reloaded {} ({} -> {})", config_path.display(), previous.id, context.id);
                self.emit(ContextEvent::Reload(previous.id));
            }
            Err(err) => {
                warn!("Failed to reload {}: {:#}", config_path.display(), err);
                self.emit(ContextEvent::Unload(previous.id));
            }
        }
        Some(previous.id)
    }

    pub fn unload(&self, config_path: &Path) -> Option<ContextId> {
        let (_, previous) = self.contexts.remove(config_path)?;
        info!("Unloaded {} ({})", config_path.display(), previous.id);
        self.emit(ContextEvent::Unload(previous.id));
        Some(previous.id)
    }

    /// Reacts to a created, changed or deleted file. Anything other than a
    /// configuration file is ignored.
    pub async fn handle_path_change(&self, path: &Path) {
        if !is_config_file(path) {
            return;
        }

        if !path.is_file() {
            self.unload(path);
        } else if self.contexts.contains_key(path) {
            self.reload(path).await;
        } else if let Err(err) = self.load(path).await {
            warn!("Failed to load {}: {:#}", path.display(), err);
        }
    }

    /// Loads every configuration file under the workspace root.
    pub async fn preload(&self) -> usize {
        let Some(root) = self.root() else {
            return 0;
        };

        let skipped = FileFilter::default();
        let configs: Vec<PathBuf> = WalkDir::new(&root)
            .into_iter()
            .filter_entry(|entry| {
                !(entry.file_type().is_dir() && is_skipped_dir(&skipped, &root, entry.path()))
            })
            .filter_map(Result::ok)
            .filter(|entry| entry.file_type().is_file() && is_config_file(entry.path()))
            .map(walkdir::DirEntry::into_path)
            .collect();

        let mut loaded = 0;
        for path in configs {
            match self.load(&path).await {
                Ok(_) => loaded += 1,
                Err(err) => warn!("Skipping {}: {:#}", path.display(), err),
            }
        }
        info!("Preloaded {} context(s) under {}", loaded, root.display());
        loaded
    }

    /// Starts watching the workspace root for configuration changes.
    pub fn watch(self: &Arc<Self>) -> anyhow::Result<()> {
        let Some(root) = self.root() else {
            debug!("No workspace root; configuration watcher not started");
            return Ok(());
        };

        let (tx, mut rx) = mpsc::unbounded_channel::<PathBuf>();
        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<notify::Event>| match res {
                Ok(event) => {
                    for path in event.paths.into_iter().filter(|path| is_config_file(path)) {
                        let _ = tx.send(path);
                    }
                }
                Err(err) => warn!("File watcher error: {}", err),
            },
            notify::Config::default(),
        )?;
        watcher.watch(&root, RecursiveMode::Recursive)?;
        *self.watcher.lock() = Some(watcher);

        let loader = Arc::downgrade(self);
        tokio::spawn(async move {
            while let Some(path) = rx.recv().await {
                let Some(loader) = loader.upgrade() else {
                    break;
                };
                debug!("Configuration changed: {}", path.display());
                loader.handle_path_change(&path).await;
            }
        });

        info!("Watching {} for configuration changes", root.display());
        Ok(())
    }
}

#[async_trait]
impl ContextResolver for WorkspaceContextLoader {
    async fn resolve(&self, text: &str, path: &Path) -> anyhow::Result<Option<Arc<Context>>> {
        let Some(config_path) = self.find_config(path) else {
            return Ok(None);
        };
        let context = self.load(&config_path).await?;
        Ok(context.accepts(text, path).then_some(context))
    }

    async fn resolve_closest(&self, _text: &str, path: &Path) -> anyhow::Result<Arc<Context>> {
        match self.find_config(path) {
            Some(config_path) => self.load(&config_path).await,
            None => Ok(self.fallback_context(path)),
        }
    }

    fn subscribe(&self) -> broadcast::Receiver<ContextEvent> {
        self.events.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    const CATALOG: &str = r#"{ "utilities": { "p-1": "padding: 0.25rem;" } }"#;

    fn workspace() -> (TempDir, WorkspaceContextLoader) {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("app/src")).unwrap();
        fs::write(dir.path().join("utility-css.json"), CATALOG).unwrap();
        let loader = WorkspaceContextLoader::new();
        loader.set_root(dir.path().to_path_buf());
        (dir, loader)
    }

    #[test]
    fn test_find_config_prefers_nearest() {
        let (dir, loader) = workspace();
        let file = dir.path().join("app/src/App.vue");
        assert_eq!(loader.find_config(&file), Some(dir.path().join("utility-css.json")));

        fs::write(dir.path().join("app/.utility-css.json"), CATALOG).unwrap();
        assert_eq!(loader.find_config(&file), Some(dir.path().join("app/.utility-css.json")));
    }

    #[tokio::test]
    async fn test_resolve_respects_filter() {
        let (dir, loader) = workspace();
        let vue = dir.path().join("app/src/App.vue");
        let rust = dir.path().join("app/src/main.rs");

        let context = loader.resolve("", &vue).await.unwrap().unwrap();
        assert_eq!(context.engine.utility_names(), vec!["p-1"]);
        assert!(loader.resolve("", &rust).await.unwrap().is_none());

        let closest = loader.resolve_closest("", &rust).await.unwrap();
        assert_eq!(closest.id, context.id);
        assert_eq!(loader.len(), 1);
    }

    #[tokio::test]
    async fn test_fallback_without_config() {
        let dir = tempfile::tempdir().unwrap();
        let loader = WorkspaceContextLoader::new();
        loader.set_root(dir.path().to_path_buf());
        let file = dir.path().join("index.html");

        assert!(loader.resolve("", &file).await.unwrap().is_none());
        let first = loader.resolve_closest("", &file).await.unwrap();
        let second = loader.resolve_closest("", &file).await.unwrap();
        assert!(first.config_path.is_none());
        assert_eq!(first.id, second.id);
        assert!(first.engine.utility_names().is_empty());
    }

    #[tokio::test]
    async fn test_reload_announces_previous_id() {
        let (dir, loader) = workspace();
        let mut events = loader.subscribe();
        let config = dir.path().join("utility-css.json");
        let before = loader.load(&config).await.unwrap();

        fs::write(&config, r#"{ "utilities": { "m-1": "margin: 0.25rem;" } }"#).unwrap();
        loader.handle_path_change(&config).await;

        assert_eq!(events.recv().await.unwrap(), ContextEvent::Reload(before.id));
        let after = loader.load(&config).await.unwrap();
        assert_ne!(after.id, before.id);
        assert_eq!(after.engine.utility_names(), vec!["m-1"]);
    }

    #[tokio::test]
    async fn test_removed_config_unloads() {
        let (dir, loader) = workspace();
        let mut events = loader.subscribe();
        let config = dir.path().join("utility-css.json");
        let context = loader.load(&config).await.unwrap();

        fs::remove_file(&config).unwrap();
        loader.handle_path_change(&config).await;

        assert_eq!(events.recv().await.unwrap(), ContextEvent::Unload(context.id));
        assert!(loader.is_empty());
    }

    #[tokio::test]
    async fn test_preload_skips_node_modules() {
        let (dir, loader) = workspace();
        fs::create_dir_all(dir.path().join("node_modules/pkg")).unwrap();
        fs::write(dir.path().join("node_modules/pkg/utility-css.json"), CATALOG).unwrap();
        fs::write(dir.path().join("app/utility-css.json"), "not json").unwrap();

        assert_eq!(loader.preload().await, 1);
        assert_eq!(loader.len(), 1);
    }

    #[tokio::test]
    async fn test_preload_judges_paths_below_root() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("node_modules/workspace");
        fs::create_dir_all(root.join(".git")).unwrap();
        fs::write(root.join("utility-css.json"), CATALOG).unwrap();
        fs::write(root.join(".git/utility-css.json"), CATALOG).unwrap();
        let loader = WorkspaceContextLoader::new();
        loader.set_root(root.clone());

        assert_eq!(loader.preload().await, 1);
        assert!(loader.find_config(&root.join("index.html")).is_some());
    }

    #[tokio::test]
    async fn test_invalid_config_is_an_error() {
        let (dir, loader) = workspace();
        fs::write(dir.path().join("utility-css.json"), "{").unwrap();
        let file = dir.path().join("index.html");
        assert!(loader.resolve("", &file).await.is_err());
    }
}
