//! Donor-list reader (§6): `<popname> <count>` rows, with optional
//! `<prior_prob>` and/or `<mut_rate>` trailing columns. Doubles as
//! population metadata and as the label source for output rows.

use std::path::Path;

use crate::errors::Error;

pub struct DonorListFile {
    pub pop_names: Vec<String>,
    pub pop_sizes: Vec<usize>,
    pub priors: Option<Vec<f64>>,
    pub mut_rates: Option<Vec<f64>>,
}

/// Rows are whitespace-delimited, not comma-delimited, so the reader is
/// built with a space delimiter and no headers; blank lines are skipped
/// by `csv`'s reader automatically.
pub fn read_donor_list(path: impl AsRef<Path>) -> Result<DonorListFile, Error> {
    let path = path.as_ref();
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(b' ')
        .has_headers(false)
        .flexible(true)
        .from_path(path)
        .map_err(|e| Error::Io { path: path.to_path_buf(), source: std::io::Error::new(std::io::ErrorKind::Other, e).into() })?;

    let mut pop_names = Vec::new();
    let mut pop_sizes = Vec::new();
    let mut priors = Vec::new();
    let mut mut_rates = Vec::new();
    let mut has_priors = false;
    let mut has_mut_rates = false;

    for record in reader.records() {
        let record = record.map_err(|e| Error::Io { path: path.to_path_buf(), source: std::io::Error::new(std::io::ErrorKind::Other, e).into() })?;
        let tokens: Vec<&str> = record.iter().filter(|t| !t.is_empty()).collect();
        if tokens.is_empty() {
            continue;
        }
        if tokens.len() < 2 {
            return Err(Error::DonorCountMismatch { found: tokens.len(), expected: 2 });
        }
        pop_names.push(tokens[0].to_owned());
        let count: usize = tokens[1].parse().map_err(|_| Error::DonorCountMismatch { found: 0, expected: 0 })?;
        pop_sizes.push(count);

        if let Some(raw) = tokens.get(2) {
            has_priors = true;
            let prior: f64 = raw.parse().map_err(|_| Error::InvalidPriorSum { sum: 0.0, expected: "parseable float".to_owned() })?;
            priors.push(prior);
        }
        if let Some(raw) = tokens.get(3) {
            has_mut_rates = true;
            let mu: f64 = raw.parse().map_err(|_| Error::InvalidMutationRate { hap: pop_names.len() - 1, value: 0.0 })?;
            mut_rates.push(mu);
        }
    }

    Ok(DonorListFile {
        pop_names,
        pop_sizes,
        priors: if has_priors { Some(priors) } else { None },
        mut_rates: if has_mut_rates { Some(mut_rates) } else { None },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn parses_counts_only() {
        let mut f = NamedTempFile::new().unwrap();
        write!(f, "popA 3\npopB 2\n").unwrap();
        let parsed = read_donor_list(f.path()).unwrap();
        assert_eq!(parsed.pop_sizes, vec![3, 2]);
        assert!(parsed.priors.is_none());
    }

    #[test]
    fn parses_priors_and_mut_rates() {
        let mut f = NamedTempFile::new().unwrap();
        write!(f, "popA 3 0.6 0.001\npopB 2 0.4 0.002\n").unwrap();
        let parsed = read_donor_list(f.path()).unwrap();
        assert_eq!(parsed.priors.unwrap(), vec![0.6, 0.4]);
        assert_eq!(parsed.mut_rates.unwrap(), vec![0.001, 0.002]);
    }
}
