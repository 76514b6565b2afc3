//! PLINK bed/bim/fam reader using memory-mapped files.
//!
//! - .bed: Binary genotype data (2 bits per genotype, SNP-major)
//! - .bim: Variant information (chrom, id, cm, pos, a1, a2)
//! - .fam: Sample information (fid, iid, father, mother, sex, pheno)
//!
//! Reference: https://www.cog-genomics.org/plink/1.9/formats#bed

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use memmap2::Mmap;
use tracing::debug;

use crate::traits::{GenotypeReader, MarkerInfo};

/// PLINK BIM file entry (one per variant).
#[derive(Debug, Clone)]
pub struct BimEntry {
    pub chrom: String,
    pub id: String,
    pub pos: u64,
}

/// Reader for a PLINK panel.
pub struct PlinkPanel {
    /// Memory-mapped .bed file.
    mmap: Mmap,
    bim: Vec<BimEntry>,
    n_samples: usize,
    bytes_per_marker: usize,
    /// (chrom, pos) -> bim rows at that position, in file order.
    positions: HashMap<(String, u64), Vec<u64>>,
}

/// `<base>.<ext>`, keeping any dots already in the prefix.
fn panel_file(base: &Path, ext: &str) -> PathBuf {
    let mut path = base.as_os_str().to_owned();
    path.push(".");
    path.push(ext);
    PathBuf::from(path)
}

impl PlinkPanel {
    /// Open PLINK files from a base path (without extension).
    pub fn new<P: AsRef<Path>>(base_path: P) -> Result<Self> {
        let base = base_path.as_ref();
        let bed_path = panel_file(base, "bed");
        let bim_path = panel_file(base, "bim");
        let fam_path = panel_file(base, "fam");

        let n_samples = Self::count_fam(&fam_path)?;
        let bim = Self::parse_bim(&bim_path)?;

        let bed_file = std::fs::File::open(&bed_path)
            .with_context(|| format!("Failed to open bed file: {}", bed_path.display()))?;
        // SAFETY: the panel is opened read-only and not modified while mapped.
        let mmap = unsafe { Mmap::map(&bed_file)? };

        if mmap.len() < 3 {
            bail!("Bed file too small");
        }
        if mmap[0] != 0x6C || mmap[1] != 0x1B {
            bail!("Invalid PLINK bed file magic number");
        }
        if mmap[2] != 0x01 {
            bail!("Only SNP-major bed files are supported (mode byte = 0x01)");
        }

        let bytes_per_marker = n_samples.div_ceil(4);
        let expected_size = 3 + bytes_per_marker * bim.len();
        if mmap.len() < expected_size {
            bail!(
                "Bed file too small: expected at least {} bytes, got {}",
                expected_size,
                mmap.len()
            );
        }

        let mut positions: HashMap<_, Vec<u64>> = HashMap::with_capacity(bim.len());
        for (row, entry) in bim.iter().enumerate() {
            positions
                .entry((entry.chrom.clone(), entry.pos))
                .or_default()
                .push(row as u64);
        }

        debug!(
            "PLINK panel {}: {} markers x {} samples",
            base.display(),
            bim.len(),
            n_samples
        );

        Ok(Self {
            mmap,
            bim,
            n_samples,
            bytes_per_marker,
            positions,
        })
    }

    fn count_fam(path: &Path) -> Result<usize> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read fam file: {}", path.display()))?;
        let mut n = 0;
        for (line_num, line) in contents.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            if line.split_whitespace().count() < 6 {
                bail!("Fam file line {} has fewer than 6 fields", line_num + 1);
            }
            n += 1;
        }
        Ok(n)
    }

    fn parse_bim(path: &Path) -> Result<Vec<BimEntry>> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read bim file: {}", path.display()))?;
        let mut entries = Vec::new();
        for (line_num, line) in contents.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let fields: Vec<&str> = line.split_whitespace().collect();
            if fields.len() < 6 {
                bail!("Bim file line {} has fewer than 6 fields", line_num + 1);
            }
            let pos = fields[3].parse().with_context(|| {
                format!("Bim file line {}: bad position '{}'", line_num + 1, fields[3])
            })?;
            entries.push(BimEntry {
                chrom: fields[0].to_string(),
                id: fields[1].to_string(),
                pos,
            });
        }
        Ok(entries)
    }

    /// Decode a single genotype from the bed file.
    /// Returns dosage of allele1: 0, 1, 2, or NaN for missing.
    #[inline]
    fn decode_genotype(byte: u8, offset: usize) -> f64 {
        let bits = (byte >> (offset * 2)) & 0x03;
        match bits {
            0b00 => 2.0,
            0b01 => f64::NAN,
            0b10 => 1.0,
            _ => 0.0,
        }
    }
}

impl GenotypeReader for PlinkPanel {
    fn n_markers(&self) -> usize {
        self.bim.len()
    }

    fn n_samples(&self) -> usize {
        self.n_samples
    }

    fn marker_info(&self, index: u64) -> Result<MarkerInfo> {
        let bim = self
            .bim
            .get(index as usize)
            .with_context(|| format!("Marker index {} out of range ({})", index, self.bim.len()))?;
        Ok(MarkerInfo {
            chrom: bim.chrom.clone(),
            pos: bim.pos,
            id: bim.id.clone(),
        })
    }

    fn read_dosages(&self, index: u64) -> Result<Vec<f64>> {
        if index as usize >= self.bim.len() {
            bail!("Marker index {} out of range ({})", index, self.bim.len());
        }
        let offset = 3 + index as usize * self.bytes_per_marker;
        let row = &self.mmap[offset..offset + self.bytes_per_marker];
        Ok((0..self.n_samples)
            .map(|s| Self::decode_genotype(row[s / 4], s % 4))
            .collect())
    }

    fn find_markers(&self, chrom: &str, pos: u64) -> Vec<u64> {
        self.positions
            .get(&(chrom.to_string(), pos))
            .cloned()
            .unwrap_or_default()
    }
}

/// Write a PLINK panel from hard-call dosages (one vector per marker).
///
/// Dosages are rounded to 0/1/2; NaN is written as missing. Used to build
/// fixtures and small reference panels.
pub fn write_plink_panel<P: AsRef<Path>>(
    base_path: P,
    markers: &[(MarkerInfo, Vec<f64>)],
    n_samples: usize,
) -> Result<()> {
    use std::io::Write;

    let base = base_path.as_ref();
    let mut fam = std::fs::File::create(panel_file(base, "fam"))?;
    for s in 0..n_samples {
        writeln!(fam, "F{s}\tS{s}\t0\t0\t0\t-9")?;
    }

    let mut bim = std::fs::File::create(panel_file(base, "bim"))?;
    let bytes_per_marker = n_samples.div_ceil(4);
    let mut bed = vec![0x6C, 0x1B, 0x01];
    for (info, dosages) in markers {
        if dosages.len() != n_samples {
            bail!(
                "Marker {} has {} dosages, expected {}",
                info.id,
                dosages.len(),
                n_samples
            );
        }
        writeln!(bim, "{}\t{}\t0\t{}\tA\tG", info.chrom, info.id, info.pos)?;

        let mut row = vec![0u8; bytes_per_marker];
        for (s, &d) in dosages.iter().enumerate() {
            let bits: u8 = if d.is_nan() {
                0b01
            } else {
                match d.round() as i64 {
                    2 => 0b00,
                    1 => 0b10,
                    _ => 0b11,
                }
            };
            row[s / 4] |= bits << ((s % 4) * 2);
        }
        bed.extend_from_slice(&row);
    }
    std::fs::write(panel_file(base, "bed"), bed)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_genotype_offsets() {
        let byte: u8 = 0b11_10_01_00;
        assert_eq!(PlinkPanel::decode_genotype(byte, 0), 2.0);
        assert!(PlinkPanel::decode_genotype(byte, 1).is_nan());
        assert_eq!(PlinkPanel::decode_genotype(byte, 2), 1.0);
        assert_eq!(PlinkPanel::decode_genotype(byte, 3), 0.0);
    }

    #[test]
    fn test_write_then_read_panel() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().join("panel");
        let markers = vec![
            (
                MarkerInfo {
                    chrom: "1".into(),
                    pos: 100,
                    id: "rs1".into(),
                },
                vec![0.0, 1.0, 2.0, f64::NAN, 1.0],
            ),
            (
                MarkerInfo {
                    chrom: "1".into(),
                    pos: 200,
                    id: "rs2".into(),
                },
                vec![2.0, 2.0, 0.0, 0.0, 1.0],
            ),
        ];
        write_plink_panel(&base, &markers, 5).unwrap();

        let panel = PlinkPanel::new(&base).unwrap();
        assert_eq!(panel.n_markers(), 2);
        assert_eq!(panel.n_samples(), 5);
        assert_eq!(panel.find_markers("1", 200), vec![1]);
        assert!(panel.find_markers("2", 200).is_empty());
        assert_eq!(panel.marker_info(0).unwrap().id, "rs1");

        let d0 = panel.read_dosages(0).unwrap();
        assert_eq!(d0[..3], [0.0, 1.0, 2.0]);
        assert!(d0[3].is_nan());
        assert_eq!(panel.read_dosages(1).unwrap(), vec![2.0, 2.0, 0.0, 0.0, 1.0]);
        assert!(panel.read_dosages(2).is_err());
    }

    fn marker(pos: u64, id: &str, dosages: Vec<f64>) -> (MarkerInfo, Vec<f64>) {
        (
            MarkerInfo {
                chrom: "1".into(),
                pos,
                id: id.into(),
            },
            dosages,
        )
    }

    #[test]
    fn test_dotted_prefix_keeps_full_name() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().join("panel.chr1");
        write_plink_panel(&base, &[marker(100, "rs1", vec![0.0, 1.0, 2.0])], 3).unwrap();

        assert!(dir.path().join("panel.chr1.bed").exists());
        assert!(dir.path().join("panel.chr1.bim").exists());
        assert!(dir.path().join("panel.chr1.fam").exists());
        assert!(!dir.path().join("panel.fam").exists());

        let panel = PlinkPanel::new(&base).unwrap();
        assert_eq!(panel.n_markers(), 1);
        assert_eq!(panel.read_dosages(0).unwrap(), vec![0.0, 1.0, 2.0]);
    }

    #[test]
    fn test_multiallelic_rows_kept_in_bim_order() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().join("panel");
        let markers = vec![
            marker(50, "rs0", vec![1.0, 1.0, 0.0, 0.0]),
            marker(100, "rs1_A", vec![0.0, 1.0, 2.0, 0.0]),
            marker(100, "rs1_C", vec![2.0, 1.0, 0.0, 2.0]),
        ];
        write_plink_panel(&base, &markers, 4).unwrap();

        let panel = PlinkPanel::new(&base).unwrap();
        assert_eq!(panel.find_markers("1", 100), vec![1, 2]);
        assert_eq!(panel.find_markers("1", 50), vec![0]);
        assert_eq!(panel.read_dosages(2).unwrap(), vec![2.0, 1.0, 0.0, 2.0]);
    }
}
