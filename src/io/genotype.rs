//! PHASE-style genotype file reader (§6). Produces the raw positions
//! and haplotype rows `dataset.rs` assembles into a `Dataset`; knows
//! nothing about donor/recipient mode (that partitioning is the
//! dispatcher's job, spec §9's "single reader, mode selects
//! partitioning" note).

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use log::warn;

use crate::core::dataset::Allele;
use crate::errors::Error;

pub struct GenotypeFile {
    pub positions: Vec<f64>,
    pub nhaps_startpop: usize,
    /// every haplotype row in file order, donors first
    pub haps: Vec<Vec<Allele>>,
}

/// Reads the PHASE-style layout: `nhaps_startpop`, `nind`, `L`, a `P
/// <positions...>` line, an ignored site-type line, then one row per
/// haplotype. `haploid` comes from the `-j` flag and determines whether
/// `nind` counts haplotypes directly or individuals (×2).
pub fn read_genotype_file(path: impl AsRef<Path>, haploid: bool, jitter: bool) -> Result<GenotypeFile, Error> {
    let path = path.as_ref();
    let file = File::open(path).map_err(|e| Error::Io { path: path.to_path_buf(), source: e.into() })?;
    let mut lines = BufReader::new(file).lines();

    let nhaps_startpop: usize = next_token(&mut lines, path)?;
    let nind: f64 = next_token(&mut lines, path)?;
    if nind.fract().abs() > 1e-9 {
        return Err(Error::DonorCountMismatch { found: nind as usize, expected: nind.round() as usize });
    }
    let total_haps = if haploid { nind.round() as usize } else { 2 * nind.round() as usize };

    let n_sites: usize = next_token(&mut lines, path)?;

    let positions_line = next_line(&mut lines, path)?;
    let mut tokens = positions_line.split_whitespace();
    let marker = tokens.next().unwrap_or("");
    if marker != "P" {
        return Err(Error::WrongLineLength { path: path.to_path_buf(), line: 4, expected: n_sites + 1, found: 0 });
    }
    let mut positions: Vec<f64> = tokens
        .map(|t| t.parse::<f64>().map_err(|_| Error::WrongLineLength { path: path.to_path_buf(), line: 4, expected: n_sites, found: 0 }))
        .collect::<Result<_, _>>()?;
    if positions.len() != n_sites {
        return Err(Error::WrongLineLength { path: path.to_path_buf(), line: 4, expected: n_sites, found: positions.len() });
    }

    for i in 1..positions.len() {
        if positions[i] <= positions[i - 1] {
            if jitter {
                warn!("non-monotone position at site {} in {:?}; jittering to prev+1", i, path);
                positions[i] = positions[i - 1] + 1.0;
            } else {
                return Err(Error::NonMonotonePositions { site: i, prev: positions[i - 1], next: positions[i] });
            }
        }
    }

    let _site_type_line = next_line(&mut lines, path)?;

    let mut haps = Vec::with_capacity(total_haps);
    for hap_idx in 0..total_haps {
        let row = next_line(&mut lines, path)?;
        let chars: Vec<char> = row.chars().filter(|c| !c.is_whitespace()).collect();
        if chars.len() != n_sites {
            return Err(Error::WrongLineLength { path: path.to_path_buf(), line: 6 + hap_idx, expected: n_sites, found: chars.len() });
        }
        let alleles: Vec<Allele> = chars
            .into_iter()
            .enumerate()
            .map(|(site, c)| {
                Allele::from_char(c).ok_or(Error::InvalidAllele { path: path.to_path_buf(), hap: hap_idx, site, allele: c })
            })
            .collect::<Result<_, _>>()?;
        haps.push(alleles);
    }

    Ok(GenotypeFile { positions, nhaps_startpop, haps })
}

fn next_line(lines: &mut std::io::Lines<BufReader<File>>, path: &Path) -> Result<String, Error> {
    loop {
        let line = lines
            .next()
            .ok_or_else(|| Error::WrongLineLength { path: path.to_path_buf(), line: 0, expected: 1, found: 0 })?
            .map_err(|e| Error::Io { path: path.to_path_buf(), source: e.into() })?;
        if !line.trim().is_empty() {
            return Ok(line);
        }
    }
}

fn next_token<T: std::str::FromStr>(lines: &mut std::io::Lines<BufReader<File>>, path: &Path) -> Result<T, Error> {
    let line = next_line(lines, path)?;
    line.trim()
        .parse()
        .map_err(|_| Error::WrongLineLength { path: path.to_path_buf(), line: 0, expected: 1, found: 0 })
}

#[allow(dead_code)]
fn default_prefix(path: &Path) -> PathBuf {
    path.with_extension("")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_sample(content: &str) -> NamedTempFile {
        let mut f = NamedTempFile::new().unwrap();
        write!(f, "{}", content).unwrap();
        f
    }

    #[test]
    fn parses_minimal_haploid_file() {
        // nind is the total haplotype count for the whole file (donors
        // included): 2 donor rows + 1 recipient row = 3 total.
        let content = "2\n3\n3\nP 0 1000 2000\nS S S\n000\n111\n010\n";
        let file = write_sample(content);
        let parsed = read_genotype_file(file.path(), true, false).unwrap();
        assert_eq!(parsed.positions, vec![0.0, 1000.0, 2000.0]);
        assert_eq!(parsed.nhaps_startpop, 2);
        assert_eq!(parsed.haps.len(), 3);
    }

    #[test]
    fn rejects_wrong_row_length() {
        let content = "1\n1\n3\nP 0 1000 2000\nS S S\n00\n111\n";
        let file = write_sample(content);
        let result = read_genotype_file(file.path(), true, false);
        assert!(matches!(result, Err(Error::WrongLineLength { .. })));
    }

    #[test]
    fn rejects_non_monotone_positions_without_jitter() {
        let content = "1\n1\n3\nP 0 1000 900\nS S S\n000\n111\n";
        let file = write_sample(content);
        let result = read_genotype_file(file.path(), true, false);
        assert!(matches!(result, Err(Error::NonMonotonePositions { .. })));
    }
}
