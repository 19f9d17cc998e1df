//! One autocomplete session per context
//!
//! Sessions are built lazily through the [`AutocompleteFactory`] with the
//! current match mode and kept until [`SessionCache::clear`] (settings
//! changed) or [`SessionCache::evict`] (context reloaded or unloaded). The
//! next [`SessionCache::get`] after either builds a fresh session.

use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::RwLock;
use tracing::debug;

use crate::context::{Context, ContextId};
use crate::engine::{AutocompleteFactory, AutocompleteOptions, AutocompleteSession, MatchMode};

pub struct SessionCache {
    factory: Arc<dyn AutocompleteFactory>,
    sessions: DashMap<ContextId, Arc<dyn AutocompleteSession>>,
    match_mode: RwLock<MatchMode>,
}

impl SessionCache {
    pub fn new(factory: Arc<dyn AutocompleteFactory>, match_mode: MatchMode) -> Self {
        Self {
            factory,
            sessions: DashMap::new(),
            match_mode: RwLock::new(match_mode),
        }
    }

    /// The session for `context`, created on first use.
    pub fn get(&self, context: &Context) -> Arc<dyn AutocompleteSession> {
        self.sessions
            .entry(context.id)
            .or_insert_with(|| {
                let match_mode = *self.match_mode.read();
                debug!("Creating {} autocomplete session for {}", match_mode, context.id);
                self.factory
                    .create(context.engine.clone(), AutocompleteOptions { match_mode })
            })
            .value()
            .clone()
    }

    pub fn clear(&self) {
        debug!("Clearing {} autocomplete session(s)", self.sessions.len());
        self.sessions.clear();
    }

    /// Drops the session for `id`. Returns whether one existed.
    pub fn evict(&self, id: ContextId) -> bool {
        let evicted = self.sessions.remove(&id).is_some();
        if evicted {
            debug!("Evicted autocomplete session for {}", id);
        }
        evicted
    }

    /// Match mode for sessions created from now on. Existing sessions keep
    /// theirs until cleared.
    pub fn set_match_mode(&self, match_mode: MatchMode) {
        *self.match_mode.write() = match_mode;
    }

    pub fn match_mode(&self) -> MatchMode {
        *self.match_mode.read()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::FileFilter;
    use crate::engine::{SuggestResult, UtilityCatalog, UtilityEngine};
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::path::PathBuf;

    struct EmptySession;

    #[async_trait]
    impl AutocompleteSession for EmptySession {
        async fn suggest_in_file(
            &self,
            _text: &str,
            offset: usize,
        ) -> anyhow::Result<SuggestResult> {
            Ok(SuggestResult::empty(offset))
        }
    }

    #[derive(Default)]
    struct RecordingFactory {
        created: Mutex<Vec<MatchMode>>,
    }

    impl AutocompleteFactory for RecordingFactory {
        fn create(
            &self,
            _engine: Arc<dyn UtilityEngine>,
            options: AutocompleteOptions,
        ) -> Arc<dyn AutocompleteSession> {
            self.created.lock().push(options.match_mode);
            Arc::new(EmptySession)
        }
    }

    fn context(id: u64) -> Context {
        Context {
            id: ContextId(id),
            root: PathBuf::from("/w"),
            config_path: None,
            engine: Arc::new(UtilityCatalog::default()),
            filter: FileFilter::default(),
        }
    }

    fn cache() -> (Arc<RecordingFactory>, SessionCache) {
        let factory = Arc::new(RecordingFactory::default());
        let cache = SessionCache::new(factory.clone(), MatchMode::Prefix);
        (factory, cache)
    }

    #[test]
    fn test_get_is_memoized_per_context() {
        let (factory, cache) = cache();
        let a = context(1);
        let first = cache.get(&a);
        let second = cache.get(&a);
        assert!(Arc::ptr_eq(&first, &second));

        let other = cache.get(&context(2));
        assert!(!Arc::ptr_eq(&first, &other));
        assert_eq!(factory.created.lock().len(), 2);
    }

    #[test]
    fn test_clear_forces_fresh_construction() {
        let (factory, cache) = cache();
        let a = context(1);
        let before = cache.get(&a);

        cache.set_match_mode(MatchMode::Fuzzy);
        assert!(Arc::ptr_eq(&before, &cache.get(&a)));

        cache.clear();
        let after = cache.get(&a);
        assert!(!Arc::ptr_eq(&before, &after));
        assert_eq!(*factory.created.lock(), vec![MatchMode::Prefix, MatchMode::Fuzzy]);
    }

    #[test]
    fn test_evict_only_affects_one_context() {
        let (_, cache) = cache();
        let (a, b) = (context(1), context(2));
        let a_before = cache.get(&a);
        let b_before = cache.get(&b);

        assert!(cache.evict(a.id));
        assert!(!cache.evict(a.id));
        assert_eq!(cache.len(), 1);
        assert!(!Arc::ptr_eq(&a_before, &cache.get(&a)));
        assert!(Arc::ptr_eq(&b_before, &cache.get(&b)));
    }
}
