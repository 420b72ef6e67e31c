//! Genetic-map file reader (§6): a header line followed by one row per
//! site, `<basepair> <rate>`. The basepair column must line up with the
//! genotype file's `positions` or the run aborts, unless jittering
//! downgrades the mismatch to a warning.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use log::warn;

use crate::constants::MIN_RECOM_RATE;
use crate::errors::Error;

pub fn read_recomb_map(path: impl AsRef<Path>, positions: &[f64], jitter: bool) -> Result<Vec<f64>, Error> {
    let path = path.as_ref();
    let file = File::open(path).map_err(|e| Error::Io { path: path.to_path_buf(), source: e.into() })?;
    let mut lines = BufReader::new(file).lines();

    lines
        .next()
        .ok_or_else(|| Error::RecombMapMismatch { row: 0, expected: 0.0, found: 0.0 })?
        .map_err(|e| Error::Io { path: path.to_path_buf(), source: e.into() })?;

    let mut recom_map = Vec::with_capacity(positions.len().saturating_sub(1));
    for (row, expected) in positions.iter().enumerate() {
        let line = lines
            .next()
            .ok_or_else(|| Error::RecombMapMismatch { row, expected: *expected, found: f64::NAN })?
            .map_err(|e| Error::Io { path: path.to_path_buf(), source: e.into() })?;
        let mut tokens = line.split_whitespace();
        let basepair: f64 = tokens
            .next()
            .and_then(|t| t.parse().ok())
            .ok_or(Error::RecombMapMismatch { row, expected: *expected, found: f64::NAN })?;

        if (basepair - expected).abs() > 1e-6 {
            if jitter {
                warn!("genetic map basepair mismatch at row {} ({} vs {}); continuing (jitter enabled)", row, basepair, expected);
            } else {
                return Err(Error::RecombMapMismatch { row, expected: *expected, found: basepair });
            }
        }

        if row + 1 < positions.len() {
            let mut rate: f64 = tokens
                .next()
                .and_then(|t| t.parse().ok())
                .ok_or(Error::RecombMapMismatch { row, expected: *expected, found: f64::NAN })?;
            if rate >= 0.0 && rate <= MIN_RECOM_RATE {
                rate = MIN_RECOM_RATE;
            }
            recom_map.push(rate);
        }
    }

    Ok(recom_map)
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
    fn parses_matching_map() {
        let content = "position rate\n0 1e-8\n1000 1e-8\n2000 1e-8\n";
        let file = write_sample(content);
        let positions = vec![0.0, 1000.0, 2000.0];
        let map = read_recomb_map(file.path(), &positions, false).unwrap();
        assert_eq!(map.len(), 2);
    }

    #[test]
    fn floors_tiny_nonnegative_rates() {
        let content = "position rate\n0 1e-20\n1000 1e-8\n";
        let file = write_sample(content);
        let positions = vec![0.0, 1000.0];
        let map = read_recomb_map(file.path(), &positions, false).unwrap();
        assert_eq!(map[0], MIN_RECOM_RATE);
    }

    #[test]
    fn rejects_mismatched_basepair_without_jitter() {
        let content = "position rate\n0 1e-8\n999 1e-8\n";
        let file = write_sample(content);
        let positions = vec![0.0, 1000.0];
        let result = read_recomb_map(file.path(), &positions, false);
        assert!(matches!(result, Err(Error::RecombMapMismatch { .. })));
    }
}
