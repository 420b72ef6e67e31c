//! Output writer (C9, §6): one flat text file per statistic, plus an
//! optional gzipped per-locus posterior stream. Every `<out>.*` file is
//! opened once per run and appended to, recipient by recipient.

use std::fs::File;
use std::io::{BufWriter, Write};

use flate2::write::GzEncoder;
use flate2::Compression;
use itertools::Itertools;

use crate::core::em::RecipientEmOutput;
use crate::errors::Error;

pub struct OutputWriters {
    samples: BufWriter<File>,
    prop: BufWriter<File>,
    chunkcounts: BufWriter<File>,
    chunklengths: BufWriter<File>,
    mutationprobs: BufWriter<File>,
    regionchunkcounts: BufWriter<File>,
    regionsquaredchunkcounts: BufWriter<File>,
    emprobs: BufWriter<File>,
    copyprobsperlocus: Option<GzEncoder<BufWriter<File>>>,
}

fn open(prefix: &str, suffix: &str) -> Result<BufWriter<File>, Error> {
    let path = format!("{}{}", prefix, suffix);
    let file = File::create(&path).map_err(|e| Error::Io { path: path.into(), source: e.into() })?;
    Ok(BufWriter::new(file))
}

impl OutputWriters {
    pub fn create(prefix: &str, emit_per_locus: bool) -> Result<Self, Error> {
        let copyprobsperlocus = if emit_per_locus {
            let path = format!("{}.copyprobsperlocus.out.gz", prefix);
            let file = File::create(&path).map_err(|e| Error::Io { path: path.into(), source: e.into() })?;
            Some(GzEncoder::new(BufWriter::new(file), Compression::default()))
        } else {
            None
        };

        Ok(OutputWriters {
            samples: open(prefix, ".samples.out")?,
            prop: open(prefix, ".prop.out")?,
            chunkcounts: open(prefix, ".chunkcounts.out")?,
            chunklengths: open(prefix, ".chunklengths.out")?,
            mutationprobs: open(prefix, ".mutationprobs.out")?,
            regionchunkcounts: open(prefix, ".regionchunkcounts.out")?,
            regionsquaredchunkcounts: open(prefix, ".regionsquaredchunkcounts.out")?,
            emprobs: open(prefix, ".EMprobs.out")?,
            copyprobsperlocus,
        })
    }

    fn io(&self, e: std::io::Error) -> Error {
        Error::Io { path: "<output stream>".into(), source: e.into() }
    }

    /// Writes every per-recipient output row: proportions, chunk
    /// counts/lengths, mutation probabilities, regional counts, raw
    /// samples, and the per-iteration EM diagnostics line.
    pub fn write_recipient(&mut self, label: &str, output: &RecipientEmOutput) -> Result<(), Error> {
        write_row(&mut self.prop, label, &output.copy_prob_pop)?;
        write_row(&mut self.chunkcounts, label, &output.chunk_count_pop)?;
        write_row(&mut self.chunklengths, label, &output.chunk_length_pop)?;
        write_row(&mut self.mutationprobs, label, &output.mutationprob_pop)?;

        writeln!(
            self.regionchunkcounts,
            "{} {} {}",
            label,
            output.num_regions,
            output.regional_chunk_count_pop.iter().join(" ")
        )
        .map_err(|e| self.io(e))?;
        writeln!(
            self.regionsquaredchunkcounts,
            "{} {} {}",
            label,
            output.num_regions,
            output.regional_chunk_count_sq_pop.iter().join(" ")
        )
        .map_err(|e| self.io(e))?;

        for (iter, ll) in output.log_likelihoods.iter().enumerate() {
            writeln!(self.emprobs, "{} {} {}", label, iter, ll).map_err(|e| self.io(e))?;
        }

        for (hap_idx, hap_samples) in output.samples.iter().enumerate() {
            writeln!(self.samples, "HAP {}", hap_idx + 1).map_err(|e| self.io(e))?;
            for (sample_id, path) in hap_samples.iter().enumerate() {
                let states = path.iter().map(|s| s + 1).join(" ");
                writeln!(self.samples, "{} {} {}", label, sample_id + 1, states).map_err(|e| self.io(e))?;
            }
        }

        if let Some(encoder) = self.copyprobsperlocus.as_mut() {
            if let Some(posteriors) = output.locus_posteriors.as_ref() {
                for (hap_idx, hap_posteriors) in posteriors.iter().enumerate() {
                    for (site, pop_probs) in hap_posteriors.iter().enumerate() {
                        writeln!(encoder, "{} {} {} {}", label, hap_idx + 1, site, pop_probs.iter().join(" ")).map_err(|e| self.io(e))?;
                    }
                }
            }
        }

        Ok(())
    }

    pub fn finish(mut self) -> Result<(), Error> {
        self.samples.flush().map_err(|e| self.io(e))?;
        self.prop.flush().map_err(|e| self.io(e))?;
        self.chunkcounts.flush().map_err(|e| self.io(e))?;
        self.chunklengths.flush().map_err(|e| self.io(e))?;
        self.mutationprobs.flush().map_err(|e| self.io(e))?;
        self.regionchunkcounts.flush().map_err(|e| self.io(e))?;
        self.regionsquaredchunkcounts.flush().map_err(|e| self.io(e))?;
        self.emprobs.flush().map_err(|e| self.io(e))?;
        if let Some(encoder) = self.copyprobsperlocus.take() {
            encoder.finish().map_err(|e| Error::Io { path: "<gzip stream>".into(), source: e.into() })?;
        }
        Ok(())
    }
}

fn write_row(out: &mut BufWriter<File>, label: &str, values: &[f64]) -> Result<(), Error> {
    writeln!(out, "{} {}", label, values.iter().join(" ")).map_err(|e| Error::Io { path: "<output stream>".into(), source: e.into() })
}
