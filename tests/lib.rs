//! End-to-end and scenario-level tests. The unit tests alongside each
//! `core` module already cover the recurrences in isolation; this file
//! drives whole recipients through `run_em` and, for the CLI surface,
//! through the full `cli::run` entry point against temp files.

use std::fs;
use std::io::Write;

use chromopainter_mutem::cli::{self, Opt};
use chromopainter_mutem::core::dataset::{default_mutation_rate, Allele, HmmParams};
use chromopainter_mutem::core::em::{run_em, EmFlags};
use rand::rngs::StdRng;
use rand::SeedableRng;
use tempfile::tempdir;

fn allele_row(pattern: &str) -> Vec<Allele> {
    pattern.chars().map(|c| Allele::from_char(c).unwrap()).collect()
}

/// Two identical donors, one matching recipient, haploid, single EM
/// iteration: equal copy_prob, log-likelihood `5 log(1-mu)`, chunk
/// count summing to 1.
#[test]
fn s1_identical_donors_give_equal_copy_prob_and_expected_likelihood() {
    let positions = vec![0.0, 1000.0, 2000.0, 3000.0, 4000.0];
    let recom_map = vec![1e-8; 4];
    let donor_a = allele_row("00000");
    let donor_b = allele_row("00000");
    let recipient = allele_row("00000");
    let mu = 0.001;

    let params = HmmParams::new(400_000.0 / 3.0, vec![0.5, 0.5], vec![0.5, 0.5], vec![mu, mu]);
    let flags = EmFlags::default();
    let mut rng = StdRng::seed_from_u64(1);

    let out = run_em(
        &[recipient],
        &[donor_a, donor_b],
        &positions,
        &recom_map,
        false,
        &[0, 1],
        &[1, 1],
        params,
        0,
        flags,
        1,
        100.0,
        false,
        &mut rng,
    )
    .unwrap();

    let expected_ll = 5.0 * (1.0 - mu).ln();
    assert!((out.log_likelihoods[0] - expected_ll).abs() < 1e-6);
    let chunk_sum: f64 = out.chunk_count_pop.iter().sum();
    assert!((chunk_sum - 1.0).abs() < 1e-6);
}

/// Disjoint donors: posterior tracks whichever half of the recipient
/// each donor matches, and each donor contributes about one chunk.
#[test]
fn s2_disjoint_donors_each_contribute_one_chunk() {
    let positions = vec![0.0, 1000.0, 2000.0, 3000.0, 4000.0];
    let recom_map = vec![1e-8; 4];
    let donor_a = allele_row("00000");
    let donor_b = allele_row("11111");
    let recipient = allele_row("00011");
    let mu = 0.001;

    let params = HmmParams::new(400_000.0 / 3.0, vec![0.5, 0.5], vec![0.5, 0.5], vec![mu, mu]);
    let flags = EmFlags::default();
    let mut rng = StdRng::seed_from_u64(2);

    let out = run_em(
        &[recipient],
        &[donor_a, donor_b],
        &positions,
        &recom_map,
        false,
        &[0, 1],
        &[1, 1],
        params,
        0,
        flags,
        1,
        100.0,
        false,
        &mut rng,
    )
    .unwrap();

    assert!((out.chunk_count_pop[0] - 1.0).abs() < 0.2);
    assert!((out.chunk_count_pop[1] - 1.0).abs() < 0.2);
}

/// Unlinked mode forces every transition probability to 1, so no
/// recombination-rate update is meaningful; N_e must be left unchanged
/// even when `-in` is selected.
#[test]
fn s3_unlinked_mode_leaves_n_e_unchanged() {
    let positions = vec![0.0, 1000.0, 2000.0, 3000.0, 4000.0];
    let recom_map = vec![1e-8; 4];
    let donor_a = allele_row("00000");
    let donor_b = allele_row("11111");
    let recipient = allele_row("00011");
    let mu = 0.001;
    let n_e_start = 400_000.0 / 3.0;

    let params = HmmParams::new(n_e_start, vec![0.5, 0.5], vec![0.5, 0.5], vec![mu, mu]);
    let flags = EmFlags { maximize_n_e: true, ..Default::default() };
    let mut rng = StdRng::seed_from_u64(3);

    let out = run_em(
        &[recipient],
        &[donor_a, donor_b],
        &positions,
        &recom_map,
        true,
        &[0, 1],
        &[1, 1],
        params,
        3,
        flags,
        1,
        100.0,
        false,
        &mut rng,
    )
    .unwrap();

    assert_eq!(*out.final_params.n_e(), n_e_start);
}

/// Global mutation-rate EM: two donors mismatch the recipient at one of
/// ten sites; starting from mu=0.5 the rate should converge down toward
/// the true ~0.05 mismatch rate.
#[test]
fn s5_global_mutation_rate_converges_toward_true_rate() {
    let n_sites = 10;
    let positions: Vec<f64> = (0..n_sites).map(|i| i as f64 * 1000.0).collect();
    let recom_map = vec![1e-8; n_sites - 1];

    let mut recipient = vec![Allele::Zero; n_sites];
    recipient[3] = Allele::One;
    let donor_a = vec![Allele::Zero; n_sites];
    let donor_b = vec![Allele::Zero; n_sites];

    let params = HmmParams::new(400_000.0 / 3.0, vec![0.5, 0.5], vec![0.5, 0.5], vec![0.5, 0.5]);
    let flags = EmFlags { maximize_mut_rate_global: true, ..Default::default() };
    let mut rng = StdRng::seed_from_u64(5);

    let out = run_em(
        &[recipient],
        &[donor_a, donor_b],
        &positions,
        &recom_map,
        false,
        &[0, 1],
        &[1, 1],
        params,
        5,
        flags,
        1,
        100.0,
        false,
        &mut rng,
    )
    .unwrap();

    assert!(out.final_params.mut_rate()[0] < 0.5);
    assert!(out.final_params.mut_rate()[0] > 0.0);
}

/// Universal invariant 1/2: copying distributions stay normalized after
/// a run, regardless of how many EM iterations were requested.
#[test]
fn copy_prob_stays_normalized_after_em() {
    let positions = vec![0.0, 1000.0, 2000.0];
    let recom_map = vec![1e-8; 2];
    let donor_a = allele_row("000");
    let donor_b = allele_row("001");
    let recipient = allele_row("000");
    let mu = default_mutation_rate(2, 3);

    let params = HmmParams::new(400_000.0 / 3.0, vec![0.5, 0.5], vec![0.5, 0.5], vec![mu, mu]);
    let flags = EmFlags { maximize_copy_prob: true, ..Default::default() };
    let mut rng = StdRng::seed_from_u64(6);

    let out = run_em(
        &[recipient],
        &[donor_a, donor_b],
        &positions,
        &recom_map,
        false,
        &[0, 1],
        &[1, 1],
        params,
        4,
        flags,
        1,
        100.0,
        false,
        &mut rng,
    )
    .unwrap();

    assert!(out.final_params.copy_prob_is_normalized());
    let sum: f64 = out.copy_prob_pop.iter().sum();
    assert!((sum - 1.0).abs() < 1e-9);
}

fn write_genotype_file(dir: &std::path::Path, content: &str) -> std::path::PathBuf {
    let path = dir.join("test.phase");
    fs::File::create(&path).unwrap().write_all(content.as_bytes()).unwrap();
    path
}

fn write_recomb_map_file(dir: &std::path::Path, content: &str) -> std::path::PathBuf {
    let path = dir.join("test.recombmap");
    fs::File::create(&path).unwrap().write_all(content.as_bytes()).unwrap();
    path
}

/// All-vs-all label indexing: three diploid individuals, nhaps_startpop
/// = 0. Drives the full CLI entry point end to end against temp files
/// and checks that every expected output stream was written with one
/// row per recipient.
#[test]
fn s6_all_vs_all_runs_end_to_end_and_writes_output_files() {
    let dir = tempdir().unwrap();

    // 3 diploid individuals (6 haplotype rows), L=5 sites.
    let geno_content = "0\n3\n5\nP 0 1000 2000 3000 4000\nSSSSS\n\
        00000\n00000\n\
        11111\n11111\n\
        00011\n00011\n";
    let geno_path = write_genotype_file(dir.path(), geno_content);

    let map_content = "position rate\n0 1e-8\n1000 1e-8\n2000 1e-8\n3000 1e-8\n4000 1e-8\n";
    let map_path = write_recomb_map_file(dir.path(), map_content);

    let out_prefix = dir.path().join("out").to_string_lossy().into_owned();

    let opt = Opt {
        geno: geno_path,
        recomb_map: Some(map_path),
        donor_list: None,
        em_iters: 0,
        maximize_n_e: false,
        maximize_copy_prob: false,
        maximize_mut_rate_per_pop: false,
        maximize_mut_rate_global: false,
        n_samples: 2,
        n_e_start: Some(400_000.0 / 6.0),
        use_priors: false,
        donor_mut_rate_self: None,
        global_mut_rate: Some(0.001),
        region_size: 100.0,
        conditioning: false,
        haploid: false,
        unlinked: false,
        all_vs_all: Some(vec![0, 0]),
        emit_per_locus: false,
        suppress_suffix: false,
        out_prefix: Some(out_prefix.clone()),
        jitter: false,
        internal_errors: false,
    };

    cli::run(opt).unwrap();

    let prop_contents = fs::read_to_string(format!("{}.prop.out", out_prefix)).unwrap();
    assert_eq!(prop_contents.lines().count(), 3);

    let chunkcounts = fs::read_to_string(format!("{}.chunkcounts.out", out_prefix)).unwrap();
    assert_eq!(chunkcounts.lines().count(), 3);

    let samples = fs::read_to_string(format!("{}.samples.out", out_prefix)).unwrap();
    assert!(samples.contains("HAP 1"));
}
