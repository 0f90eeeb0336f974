//! Incremental cache of lowered functions.
//!
//! Entries are keyed by item name and validated by the content stamp of the
//! desugared body (see [`crate::hir::stamp`]). The cache is shared between
//! the workers lowering a module in parallel: when two of them race on the
//! same item and stamp, the first insertion wins and both end up with the
//! same function.

use crate::diag::LowerDiagnostic;

use kiln_ssa::{
    binary::{self, DecodeError},
    Const, Function, GlobalData, Module, Ty, TypeTable,
};
use rustc_hash::FxHashMap;
use thiserror::Error;

use std::{
    path::Path,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, PoisonError, RwLock,
    },
};

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("failed to access the cache file: {0}")]
    Io(#[from] std::io::Error),
    #[error("corrupt cache file: {0}")]
    Decode(#[from] DecodeError),
    #[error("corrupt cache file: no stamp for `{0}`")]
    MissingStamp(String),
}

#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub stamp: u64,
    pub func: Arc<Function>,
    pub diagnostics: Arc<[LowerDiagnostic]>,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: usize,
    pub misses: usize,
    pub entries: usize,
}

#[derive(Debug, Default)]
pub struct LoweringCache {
    entries: RwLock<FxHashMap<String, CacheEntry>>,
    hits: AtomicUsize,
    misses: AtomicUsize,
}

impl LoweringCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the entry for `item` if it was lowered from a body with the
    /// same `stamp`.
    pub fn get(&self, item: &str, stamp: u64) -> Option<CacheEntry> {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        match entries.get(item) {
            Some(entry) if entry.stamp == stamp => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                Some(entry.clone())
            }
            _ => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Stores `entry` unless an entry with the same stamp is already there,
    /// and returns the entry the cache ends up holding.
    pub fn insert(&self, item: &str, entry: CacheEntry) -> CacheEntry {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        match entries.get(item) {
            Some(existing) if existing.stamp == entry.stamp => existing.clone(),
            _ => {
                entries.insert(item.to_string(), entry.clone());
                entry
            }
        }
    }

    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            entries: self.len(),
        }
    }

    /// Writes the cached functions to `path` in the binary IR format. The
    /// stamp of each function is stored as a global of the same name.
    ///
    /// Diagnostics are not persisted: only entries without diagnostics are
    /// written.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), CacheError> {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        let mut items: Vec<(&String, &CacheEntry)> = entries
            .iter()
            .filter(|(_, entry)| entry.diagnostics.is_empty())
            .collect();
        items.sort_by(|a, b| a.0.cmp(b.0));

        let mut module = Module::new("cache", TypeTable::new());
        for (item, entry) in items {
            module.globals.push(GlobalData {
                name: item.as_str().into(),
                ty: Ty::I64,
                init: Const::Int(entry.stamp as i64),
            });
            module.functions.push(entry.func.clone());
        }
        std::fs::write(path, binary::encode(&module))?;
        Ok(())
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, CacheError> {
        let bytes = std::fs::read(path)?;
        let module = binary::decode(&bytes)?;

        let mut entries = FxHashMap::default();
        for func in module.functions.values() {
            let stamp = match module.global(&func.name) {
                Some(GlobalData {
                    init: Const::Int(stamp),
                    ..
                }) => *stamp as u64,
                _ => return Err(CacheError::MissingStamp(func.name.to_string())),
            };
            entries.insert(
                func.name.to_string(),
                CacheEntry {
                    stamp,
                    func: func.clone(),
                    diagnostics: Arc::from(Vec::new()),
                },
            );
        }
        log::debug!("loaded {} cached functions", entries.len());

        Ok(Self {
            entries: RwLock::new(entries),
            ..Self::default()
        })
    }
}

impl CacheEntry {
    pub fn new(stamp: u64, func: Function, diagnostics: Vec<LowerDiagnostic>) -> Self {
        Self {
            stamp,
            func: Arc::new(func),
            diagnostics: diagnostics.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diag::LowerDiagnosticKind;
    use kiln_sourcemap::SourceSpan;
    use kiln_ssa::{builder::FunctionBuilder, NodeId};

    fn func(name: &str, value: i64) -> Function {
        let mut b = FunctionBuilder::new(name, Ty::I64, SourceSpan::default(), NodeId(0));
        let value = b.ins(kiln_ssa::Inst::IConst(value));
        b.ret(Some(value));
        b.finish()
    }

    #[test]
    fn hits_only_on_matching_stamps() {
        let cache = LoweringCache::new();
        assert!(cache.get("f", 1).is_none());
        cache.insert("f", CacheEntry::new(1, func("f", 1), Vec::new()));

        assert!(cache.get("f", 1).is_some());
        assert!(cache.get("f", 2).is_none());
        assert_eq!(
            cache.stats(),
            CacheStats {
                hits: 1,
                misses: 2,
                entries: 1
            }
        );
    }

    #[test]
    fn first_insert_wins_for_equal_stamps() {
        let cache = LoweringCache::new();
        let first = cache.insert("f", CacheEntry::new(7, func("f", 1), Vec::new()));
        let second = cache.insert("f", CacheEntry::new(7, func("f", 2), Vec::new()));
        assert!(Arc::ptr_eq(&first.func, &second.func));

        let newer = cache.insert("f", CacheEntry::new(8, func("f", 3), Vec::new()));
        assert!(!Arc::ptr_eq(&first.func, &newer.func));
        assert_eq!(cache.get("f", 8).unwrap().stamp, 8);
    }

    #[test]
    fn concurrent_inserts_agree() {
        let cache = LoweringCache::new();
        let winners: Vec<CacheEntry> = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..8)
                .map(|i| {
                    let cache = &cache;
                    scope.spawn(move || cache.insert("f", CacheEntry::new(3, func("f", i), Vec::new())))
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });
        for winner in &winners {
            assert!(Arc::ptr_eq(&winner.func, &winners[0].func));
        }
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn survives_a_round_trip_through_disk() {
        let cache = LoweringCache::new();
        cache.insert("f", CacheEntry::new(u64::MAX, func("f", 1), Vec::new()));
        let diagnostic = LowerDiagnostic {
            kind: LowerDiagnosticKind::MissingReturn,
            span: SourceSpan::default(),
            message: "missing".to_string(),
        };
        cache.insert("g", CacheEntry::new(2, func("g", 2), vec![diagnostic]));

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("kiln.cache");
        cache.save(&path).unwrap();

        let loaded = LoweringCache::load(&path).unwrap();
        assert_eq!(loaded.len(), 1);
        let entry = loaded.get("f", u64::MAX).unwrap();
        assert_eq!(*entry.func, func("f", 1));
        assert!(loaded.get("g", 2).is_none());
    }

    #[test]
    fn rejects_garbage() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("kiln.cache");
        std::fs::write(&path, b"not a cache").unwrap();
        assert!(matches!(
            LoweringCache::load(&path),
            Err(CacheError::Decode(_))
        ));
    }
}
