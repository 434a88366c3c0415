use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use ordered_float::OrderedFloat;

use crate::error::{Error, Result};
use crate::vector::squared_l2;

const MAGIC: &[u8; 4] = b"HSVI";
const FORMAT_VERSION: u32 = 1;
const HEADER_LEN: u64 = 4 + 4 + 4 + 8;

/// Position reported for result slots beyond the number of stored entries.
pub const PADDING_POSITION: i64 = -1;

#[derive(Debug, Clone, PartialEq, Eq)]
struct Candidate {
    dist: OrderedFloat<f32>,
    position: usize,
}

// Max-heap on (dist, position): the top is the worst candidate kept so far.
// Equal distances rank the lower position as better.
impl Ord for Candidate {
    fn cmp(&self, other: &Self) -> Ordering {
        self.dist.cmp(&other.dist).then(self.position.cmp(&other.position))
    }
}
impl PartialOrd for Candidate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Output of [`FlatIndex::search`]: `k` slots, of which only the first
/// `min(k, len)` are real entries. Padding is produced on iteration, never
/// stored, so `k` may be arbitrarily large.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchResult {
    k: usize,
    distances: Vec<f32>,
    positions: Vec<i64>,
}

impl SearchResult {
    /// Requested number of slots.
    pub fn k(&self) -> usize {
        self.k
    }

    /// Distances for all `k` slots, nearest first, `+inf` for padding.
    pub fn distances(&self) -> impl Iterator<Item = f32> + '_ {
        let pad = self.k - self.distances.len();
        self.distances.iter().copied().chain(std::iter::repeat(f32::INFINITY).take(pad))
    }

    /// Positions for all `k` slots, [`PADDING_POSITION`] for padding.
    pub fn positions(&self) -> impl Iterator<Item = i64> + '_ {
        let pad = self.k - self.positions.len();
        self.positions.iter().copied().chain(std::iter::repeat(PADDING_POSITION).take(pad))
    }

    /// Real (position, distance) pairs, skipping padding.
    pub fn hits(&self) -> impl Iterator<Item = (usize, f32)> + '_ {
        self.positions
            .iter()
            .zip(self.distances.iter())
            .map(|(p, d)| (*p as usize, *d))
    }
}

/// Exact nearest-neighbour index over squared Euclidean distance.
///
/// Vectors live in one contiguous buffer; entry `i` occupies
/// `data[i * dimension..(i + 1) * dimension]`. Positions are implicit and
/// follow insertion order.
#[derive(Debug, Clone, PartialEq)]
pub struct FlatIndex {
    dimension: usize,
    data: Vec<f32>,
}

impl FlatIndex {
    pub fn new(dimension: usize) -> Self {
        Self { dimension, data: Vec::new() }
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn len(&self) -> usize {
        if self.dimension == 0 { 0 } else { self.data.len() / self.dimension }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn vector(&self, position: usize) -> Option<&[f32]> {
        if position >= self.len() {
            return None;
        }
        let start = position * self.dimension;
        Some(&self.data[start..start + self.dimension])
    }

    /// Appends `vectors` as new entries, in order. All-or-nothing: if any
    /// vector has the wrong length, nothing is appended.
    pub fn add(&mut self, vectors: &[Vec<f32>]) -> Result<()> {
        if let Some(bad) = vectors.iter().find(|v| v.len() != self.dimension) {
            return Err(Error::DimensionMismatch { expected: self.dimension, got: bad.len() });
        }
        self.data.reserve(vectors.len() * self.dimension);
        for v in vectors {
            self.data.extend_from_slice(v);
        }
        Ok(())
    }

    pub fn search(&self, query: &[f32], k: usize) -> Result<SearchResult> {
        if query.len() != self.dimension {
            return Err(Error::DimensionMismatch { expected: self.dimension, got: query.len() });
        }

        let keep = k.min(self.len());
        let mut heap: BinaryHeap<Candidate> = BinaryHeap::with_capacity(keep + 1);
        if keep > 0 {
            for position in 0..self.len() {
                let start = position * self.dimension;
                let d = squared_l2(query, &self.data[start..start + self.dimension]);
                let cand = Candidate { dist: OrderedFloat(d), position };

                if heap.len() < keep {
                    heap.push(cand);
                } else if let Some(worst) = heap.peek() {
                    if cand < *worst {
                        heap.pop();
                        heap.push(cand);
                    }
                }
            }
        }

        let mut distances = Vec::with_capacity(keep);
        let mut positions = Vec::with_capacity(keep);
        for c in heap.into_sorted_vec() {
            distances.push(c.dist.into_inner());
            positions.push(c.position as i64);
        }

        Ok(SearchResult { k, distances, positions })
    }

    /// Writes to `<path>.tmp` and renames, so a crash never leaves a
    /// truncated index at `path`.
    pub fn save(&self, path: &Path) -> Result<()> {
        let tmp = Self::staging_path(path);
        self.write_file(&tmp)?;
        fs::rename(&tmp, path)?;
        Ok(())
    }

    /// Where [`save`](FlatIndex::save) stages the file before renaming it.
    pub fn staging_path(path: &Path) -> PathBuf {
        path.with_extension("tmp")
    }

    /// Writes the full index to `path` and syncs it. No rename.
    pub fn write_file(&self, path: &Path) -> Result<()> {
        let file = File::create(path)?;
        let mut writer = BufWriter::new(file);

        writer.write_all(MAGIC)?;
        writer.write_all(&FORMAT_VERSION.to_le_bytes())?;
        writer.write_all(&(self.dimension as u32).to_le_bytes())?;
        writer.write_all(&(self.len() as u64).to_le_bytes())?;
        for val in &self.data {
            writer.write_all(&val.to_le_bytes())?;
        }
        writer.flush()?;
        writer.get_ref().sync_all()?;
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self> {
        let file = File::open(path).map_err(|e| Error::index_load(path, e.to_string()))?;
        let file_len = file.metadata().map_err(|e| Error::index_load(path, e.to_string()))?.len();
        let mut reader = BufReader::new(file);

        Self::read_from(&mut reader, file_len).map_err(|e| match e {
            Error::IndexLoad { reason, .. } => Error::index_load(path, reason),
            other => Error::index_load(path, other.to_string()),
        })
    }

    fn read_from<R: Read>(reader: &mut R, file_len: u64) -> Result<Self> {
        let corrupt = |reason: String| Error::IndexLoad { path: String::new(), reason };

        let mut magic = [0u8; 4];
        read_exact(reader, &mut magic)?;
        if &magic != MAGIC {
            return Err(corrupt("not a vector index file (bad magic)".into()));
        }

        let mut u32_buf = [0u8; 4];
        read_exact(reader, &mut u32_buf)?;
        let version = u32::from_le_bytes(u32_buf);
        if version != FORMAT_VERSION {
            return Err(corrupt(format!("unsupported format version {}", version)));
        }

        read_exact(reader, &mut u32_buf)?;
        let dimension = u32::from_le_bytes(u32_buf) as usize;

        let mut u64_buf = [0u8; 8];
        read_exact(reader, &mut u64_buf)?;
        let count = u64::from_le_bytes(u64_buf);

        let expected_len = (count as u128) * (dimension as u128) * 4 + HEADER_LEN as u128;
        if expected_len != file_len as u128 {
            return Err(corrupt(format!(
                "size mismatch: header declares {} x {} floats, file is {} bytes",
                count, dimension, file_len
            )));
        }

        let total = count as usize * dimension;
        let mut data = Vec::with_capacity(total);
        let mut f32_buf = [0u8; 4];
        for _ in 0..total {
            read_exact(reader, &mut f32_buf)?;
            data.push(f32::from_le_bytes(f32_buf));
        }

        Ok(Self { dimension, data })
    }
}

fn read_exact<R: Read>(reader: &mut R, buf: &mut [u8]) -> Result<()> {
    reader.read_exact(buf).map_err(|e| match e.kind() {
        io::ErrorKind::UnexpectedEof => Error::IndexLoad {
            path: String::new(),
            reason: "file truncated".into(),
        },
        _ => Error::Io(e),
    })
}
