//! Project contexts
//!
//! A [`Context`] is one loaded project configuration: the engine built from
//! it, the files it applies to, and the directory it governs. Contexts are
//! handed out by a [`ContextResolver`], which also announces when a context
//! is replaced or dropped so that state derived from it can be discarded.

pub mod filter;
pub mod loader;

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::broadcast;

use crate::engine::UtilityEngine;

pub use filter::FileFilter;
pub use loader::WorkspaceContextLoader;

/// Identity of a loaded context. A reloaded configuration gets a new id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContextId(pub u64);

impl fmt::Display for ContextId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ctx#{}", self.0)
    }
}

pub struct Context {
    pub id: ContextId,
    /// Directory the configuration governs
    pub root: PathBuf,
    /// `None` for the fallback context used when no configuration file exists
    pub config_path: Option<PathBuf>,
    pub engine: Arc<dyn UtilityEngine>,
    pub filter: FileFilter,
}

impl Context {
    pub fn accepts(&self, text: &str, path: &Path) -> bool {
        self.filter.accepts(text, path)
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("id", &self.id)
            .field("root", &self.root)
            .field("config_path", &self.config_path)
            .finish_non_exhaustive()
    }
}

/// Lifecycle notifications for contexts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextEvent {
    /// The configuration changed; the context with this id was replaced.
    Reload(ContextId),
    /// The configuration was removed.
    Unload(ContextId),
}

impl ContextEvent {
    pub fn id(&self) -> ContextId {
        match self {
            ContextEvent::Reload(id) | ContextEvent::Unload(id) => *id,
        }
    }
}

/// Maps files to contexts.
#[async_trait]
pub trait ContextResolver: Send + Sync {
    /// The context governing `path`, if there is one and it accepts the file.
    async fn resolve(&self, text: &str, path: &Path) -> anyhow::Result<Option<Arc<Context>>>;

    /// The nearest context for `path` regardless of its filter.
    async fn resolve_closest(&self, text: &str, path: &Path) -> anyhow::Result<Arc<Context>>;

    fn subscribe(&self) -> broadcast::Receiver<ContextEvent>;
}
