use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use rkyv::{Archive, Deserialize, Serialize};
use tracing::warn;

use crate::error::{Error, Result};
use crate::model::Record;
use crate::storage::RecordStore;

/// Record ids in index position order: `ids[p]` is the record embedded at
/// position `p`. Written by the builder next to the index it describes.
#[derive(Archive, Deserialize, Serialize, Debug, Clone, PartialEq, Default)]
#[archive(check_bytes)]
pub struct PositionMap {
    ids: Vec<i64>,
}

impl PositionMap {
    pub fn new(ids: Vec<i64>) -> Self {
        Self { ids }
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn id_at(&self, position: usize) -> Option<i64> {
        self.ids.get(position).copied()
    }

    /// Sidecar path for the map belonging to `index_path`.
    pub fn path_for(index_path: &Path) -> PathBuf {
        index_path.with_extension("ids")
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let tmp = Self::staging_path(path);
        self.write_file(&tmp)?;
        fs::rename(&tmp, path)?;
        Ok(())
    }

    pub fn staging_path(path: &Path) -> PathBuf {
        path.with_extension("ids.tmp")
    }

    /// Archives the map into `path` and syncs it. No rename.
    pub fn write_file(&self, path: &Path) -> Result<()> {
        let bytes = rkyv::to_bytes::<_, 1024>(self)
        .map_err(|e| Error::Serialization(format!("position map: {}", e)))?;

        let mut file = File::create(path)?;
        file.write_all(&bytes)?;
        file.sync_all()?;
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read(path).map_err(|e| Error::index_load(path, e.to_string()))?;

        // rkyv needs an aligned buffer; fs::read gives no such guarantee.
        let mut aligned = rkyv::AlignedVec::with_capacity(raw.len());
        aligned.extend_from_slice(&raw);

        let archived = rkyv::check_archived_root::<PositionMap>(&aligned)
        .map_err(|e| Error::index_load(path, format!("corrupt position map: {}", e)))?;

        match archived.deserialize(&mut rkyv::Infallible) {
            Ok(map) => Ok(map),
            Err(never) => match never {},
        }
    }
}

/// Turns index positions back into records.
#[derive(Debug, Clone)]
pub enum PositionResolver {
    /// Explicit position → id table persisted at build time.
    Map(PositionMap),
    /// Index built without a sidecar: positions are re-derived from the
    /// store's enumeration order, which is only correct while the store is
    /// unchanged since the build.
    EnumerationOrder,
}

impl PositionResolver {
    /// Loads the sidecar for `index_path`, falling back to enumeration order
    /// when none exists. A map that disagrees with the index size is an error.
    pub fn for_index(index_path: &Path, index_len: usize) -> Result<Self> {
        let map_path = PositionMap::path_for(index_path);
        if !map_path.exists() {
            warn!(
                "No position map at {}; resolving positions by record order",
                map_path.display()
            );
            return Ok(PositionResolver::EnumerationOrder);
        }

        let map = PositionMap::load(&map_path)?;
        if map.len() != index_len {
            return Err(Error::index_load(
                &map_path,
                format!("position map has {} ids, index has {} vectors", map.len(), index_len),
            ));
        }
        Ok(PositionResolver::Map(map))
    }

    /// One entry per input position, `None` where nothing resolves.
    pub fn resolve(&self, store: &RecordStore, positions: &[usize]) -> Result<Vec<Option<Record>>> {
        match self {
            PositionResolver::Map(map) => positions
                .iter()
                .map(|&p| match map.id_at(p) {
                    Some(id) => store.get(id),
                    None => Ok(None),
                })
                .collect(),
            PositionResolver::EnumerationOrder => store.get_by_position_order(positions),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn map_round_trips_through_disk() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("history_index.ids");
        let map = PositionMap::new(vec![5, 9, 2]);

        map.save(&path).unwrap();
        let loaded = PositionMap::load(&path).unwrap();

        assert_eq!(loaded, map);
        assert_eq!(loaded.id_at(1), Some(9));
        assert_eq!(loaded.id_at(3), None);
    }

    #[test]
    fn sidecar_sits_next_to_index() {
        let p = PositionMap::path_for(Path::new("/data/history_index.bin"));
        assert_eq!(p, Path::new("/data/history_index.ids"));
    }

    #[test]
    fn garbage_map_is_index_load_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("x.ids");
        fs::write(&path, [0xffu8; 3]).unwrap();
        assert!(matches!(PositionMap::load(&path), Err(Error::IndexLoad { .. })));
    }

    #[test]
    fn missing_sidecar_falls_back_to_enumeration_order() {
        let dir = tempdir().unwrap();
        let resolver = PositionResolver::for_index(&dir.path().join("i.bin"), 3).unwrap();
        assert!(matches!(resolver, PositionResolver::EnumerationOrder));
    }

    #[test]
    fn map_length_must_match_index() {
        let dir = tempdir().unwrap();
        let index_path = dir.path().join("i.bin");
        PositionMap::new(vec![1, 2]).save(&PositionMap::path_for(&index_path)).unwrap();
        assert!(matches!(
            PositionResolver::for_index(&index_path, 3),
            Err(Error::IndexLoad { .. })
        ));
    }
}
