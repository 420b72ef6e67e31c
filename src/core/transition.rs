//! C2: site-to-site jump probabilities (§4.1).

use crate::constants::DELTA;

/// Per-interval "jump" probability: redraw the copied donor from the
/// stationary distribution with this probability, otherwise keep
/// copying the same donor. `lambda[i] < 0` or `unlinked` forces a total
/// reset (`TransProb[i] = 1.0`), matching a chromosome break.
pub fn transition_probs(positions: &[f64], recom_map: &[f64], n_e: f64, unlinked: bool) -> Vec<f64> {
    let l = positions.len();
    (0..l.saturating_sub(1))
        .map(|i| {
            if unlinked || recom_map[i] < 0.0 {
                1.0
            } else {
                let dist = (positions[i + 1] - positions[i]) * recom_map[i] * DELTA;
                1.0 - (-dist * n_e).exp()
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unlinked_forces_total_reset() {
        let positions = vec![0.0, 1000.0, 2000.0];
        let recom_map = vec![1e-8, 1e-8];
        let probs = transition_probs(&positions, &recom_map, 1000.0, true);
        assert_eq!(probs, vec![1.0, 1.0]);
    }

    #[test]
    fn negative_lambda_marks_chromosome_break() {
        let positions = vec![0.0, 1000.0, 2000.0];
        let recom_map = vec![-1.0, 1e-8];
        let probs = transition_probs(&positions, &recom_map, 1000.0, false);
        assert_eq!(probs[0], 1.0);
        assert!(probs[1] < 1.0);
    }

    #[test]
    fn transition_prob_increases_with_distance_and_ne() {
        let positions = vec![0.0, 1000.0, 5000.0];
        let recom_map = vec![1e-8, 1e-8];
        let probs = transition_probs(&positions, &recom_map, 1000.0, false);
        assert!(probs[1] > probs[0]);
    }
}
