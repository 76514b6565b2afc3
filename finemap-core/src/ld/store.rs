//! Keyed store of precomputed LD matrices.
//!
//! One bincode file per variant-index range, named `<start>-<end>.ldm`.
//! Format: magic bytes (FMLD) + version (u32) + labelled matrix.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;

use finemap_io::VariantWindow;

use super::matrix::LdMatrix;

const EXTENSION: &str = "ldm";

#[derive(Serialize, Deserialize)]
struct StoredLd {
    magic: [u8; 4],
    version: u32,
    matrix: LdMatrix,
}

impl StoredLd {
    const MAGIC: [u8; 4] = *b"FMLD";
    const VERSION: u32 = 1;
}

/// Directory of range-keyed LD matrices.
#[derive(Debug, Clone)]
pub struct MatrixStore {
    dir: PathBuf,
}

impl MatrixStore {
    /// Open a store directory, creating it if needed.
    pub fn create(dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create LD store: {}", dir.display()))?;
        Ok(Self {
            dir: dir.to_path_buf(),
        })
    }

    /// Open an existing store directory.
    pub fn open(dir: &Path) -> Result<Self> {
        if !dir.is_dir() {
            bail!("LD store directory not found: {}", dir.display());
        }
        Ok(Self {
            dir: dir.to_path_buf(),
        })
    }

    pub fn path_for(&self, window: VariantWindow) -> PathBuf {
        self.dir
            .join(format!("{}-{}.{}", window.start, window.end, EXTENSION))
    }

    pub fn save(&self, window: VariantWindow, matrix: &LdMatrix) -> Result<PathBuf> {
        let path = self.path_for(window);
        let stored = StoredLd {
            magic: StoredLd::MAGIC,
            version: StoredLd::VERSION,
            matrix: matrix.clone(),
        };
        let encoded = bincode::serialize(&stored)?;
        std::fs::write(&path, &encoded)
            .with_context(|| format!("Failed to write LD matrix: {}", path.display()))?;
        Ok(path)
    }

    pub fn load(&self, window: VariantWindow) -> Result<LdMatrix> {
        let path = self.path_for(window);
        let data = std::fs::read(&path)
            .with_context(|| format!("Failed to read LD matrix: {}", path.display()))?;
        let stored: StoredLd = bincode::deserialize(&data)
            .with_context(|| format!("Corrupt LD matrix file: {}", path.display()))?;
        if stored.magic != StoredLd::MAGIC {
            bail!(
                "Invalid LD matrix file {}: expected magic bytes {:?}, got {:?}",
                path.display(),
                StoredLd::MAGIC,
                stored.magic
            );
        }
        if stored.version != StoredLd::VERSION {
            bail!(
                "Unsupported LD matrix file version {} in {}",
                stored.version,
                path.display()
            );
        }
        Ok(stored.matrix)
    }

    /// Every stored range.
    pub fn ranges(&self) -> Result<Vec<VariantWindow>> {
        let mut ranges = Vec::new();
        let entries = std::fs::read_dir(&self.dir)
            .with_context(|| format!("Failed to list LD store: {}", self.dir.display()))?;
        for entry in entries {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some(EXTENSION) {
                continue;
            }
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            match parse_range(stem) {
                Some(window) => ranges.push(window),
                None => debug!("Ignoring unrecognized file in LD store: {}", path.display()),
            }
        }
        ranges.sort_by_key(|w| (w.start, w.end));
        Ok(ranges)
    }

    /// Smallest stored range covering `window`.
    pub fn covering(&self, window: VariantWindow) -> Result<Option<VariantWindow>> {
        Ok(self
            .ranges()?
            .into_iter()
            .filter(|r| r.start <= window.start && r.end >= window.end)
            .min_by_key(|r| (r.span(), r.start)))
    }
}

fn parse_range(stem: &str) -> Option<VariantWindow> {
    let (start, end) = stem.split_once('-')?;
    let start = start.parse().ok()?;
    let end = end.parse().ok()?;
    (start <= end).then_some(VariantWindow { start, end })
}
