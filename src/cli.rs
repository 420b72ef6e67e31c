use std::io::BufRead;
use std::path::PathBuf;
use std::process::exit;

use log::info;
use structopt::StructOpt;

use crate::dispatch;
use crate::errors::Error;
use crate::option_validator;

/// Flat flag set, §6. Unlike the teacher's subcommand tree this crate
/// has one mode of operation; mode selection (donor / `-c` / `-a`)
/// happens through flag combinations rather than subcommands.
#[derive(Debug, StructOpt, Clone)]
#[structopt(
    name = "chromopainter-mutem",
    about = "Reconstructs recipient haplotypes as mosaics of donor haplotypes under the Li & Stephens copying HMM.",
    setting = structopt::clap::AppSettings::ColoredHelp,
)]
pub struct Opt {
    #[structopt(short = "g", long = "geno", parse(from_os_str), help = "Genotype input file (PHASE-style).")]
    pub geno: PathBuf,

    #[structopt(short = "r", long = "recombmap", parse(from_os_str), help = "Recombination map file (required unless -u).")]
    pub recomb_map: Option<PathBuf>,

    #[structopt(short = "f", long = "donorlist", parse(from_os_str), help = "Donor list file (required unless -a).")]
    pub donor_list: Option<PathBuf>,

    #[structopt(short = "i", long = "emiterations", default_value = "0", help = "Number of EM iterations.")]
    pub em_iters: usize,

    #[structopt(long = "in", help = "Maximize N_e by EM.")]
    pub maximize_n_e: bool,
    #[structopt(long = "ip", help = "Maximize copying proportions by EM.")]
    pub maximize_copy_prob: bool,
    #[structopt(long = "im", help = "Maximize per-population mutation rate by EM.")]
    pub maximize_mut_rate_per_pop: bool,
    #[structopt(long = "iM", help = "Maximize global mutation rate by EM.")]
    pub maximize_mut_rate_global: bool,

    #[structopt(short = "s", long = "samples", default_value = "10", help = "Posterior samples drawn per recipient haplotype.")]
    pub n_samples: usize,

    #[structopt(short = "n", long = "ne-start", help = "N_e starting value (default 400000 / total_haps).")]
    pub n_e_start: Option<f64>,

    #[structopt(short = "p", long = "use-priors", help = "Use prior copying probabilities from the donor list.")]
    pub use_priors: bool,

    #[structopt(short = "m", long = "donor-mut-rate", help = "Use mutation rates from the donor list; value is the self-mutation rate under -c.")]
    pub donor_mut_rate_self: Option<f64>,

    #[structopt(short = "M", long = "global-mut-rate", help = "Global mutation rate (default: Li & Stephens theta-based value).")]
    pub global_mut_rate: Option<f64>,

    #[structopt(short = "k", long = "region-size", default_value = "100", help = "Expected chunks per region for regional statistics.")]
    pub region_size: f64,

    #[structopt(short = "c", long = "condition", help = "Condition on own-population recipients (recipient-conditioning mode).")]
    pub conditioning: bool,

    #[structopt(short = "j", long = "haploid", help = "Treat recipients/donors as haploid (one haplotype per individual).")]
    pub haploid: bool,

    #[structopt(short = "u", long = "unlinked", help = "Treat sites as unlinked (forces TransProb = 1 everywhere).")]
    pub unlinked: bool,

    #[structopt(short = "a", long = "all-vs-all", help = "All-vs-all mode: start/end individual indices (0 0 = all).", number_of_values = 2)]
    pub all_vs_all: Option<Vec<usize>>,

    #[structopt(short = "b", long = "gzip-per-locus", help = "Emit gzipped per-population per-locus posteriors.")]
    pub emit_per_locus: bool,

    #[structopt(short = "y", long = "suppress-suffix", help = "Suppress per-individual numeric suffix in labels.")]
    pub suppress_suffix: bool,

    #[structopt(short = "o", long = "out", help = "Output file prefix (default: genotype file name).")]
    pub out_prefix: Option<String>,

    #[structopt(short = "J", long = "jitter", help = "Jitter colliding SNP positions instead of failing.")]
    pub jitter: bool,

    #[structopt(long = "internalerrors", help = "Block with a prompt on fatal error instead of exiting immediately (GUI integration).")]
    pub internal_errors: bool,
}

impl Opt {
    pub fn output_prefix(&self) -> String {
        self.out_prefix.clone().unwrap_or_else(|| {
            self.geno.file_stem().map(|s| s.to_string_lossy().into_owned()).unwrap_or_else(|| "chromopainter".to_owned())
        })
    }
}

pub fn run(opt: Opt) -> Result<(), Error> {
    option_validator::validate_flags(&opt)?;
    dispatch::run(&opt)
}

/// Binary entry point: parses args, sets up logging, and translates a
/// fatal `Error` into the §7 "single line + nonzero exit" contract.
/// `--internalerrors` substitutes a blocking prompt for the immediate
/// exit, a pure shell-integration concern (spec §7).
pub fn main() {
    let opt = Opt::from_args();
    let internal_errors = opt.internal_errors;

    fern::Dispatch::new()
        .format(|out, message, record| {
            out.finish(format_args!("[{}] {}", record.level(), message))
        })
        .level(log::LevelFilter::Info)
        .chain(std::io::stderr())
        .apply()
        .expect("logger can only be initialized once");

    info!("chromopainter-mutem starting");

    let code = match run(opt) {
        Ok(()) => 0,
        Err(e) => {
            eprintln!("Error: {}", e);
            if internal_errors {
                eprintln!("Press enter to exit...");
                let mut discard = String::new();
                let _ = std::io::stdin().read_line(&mut discard);
            }
            1
        }
    };
    exit(code);
}
