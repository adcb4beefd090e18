//! Ranked, human-readable view of a prediction.

use crate::{target::Target, types::PredictionResult};

pub const BAR_WIDTH: usize = 50;

/// Non-null predictions, most likely first. Equal probabilities keep
/// target order.
pub fn rank(result: &PredictionResult) -> Vec<(Target, f64)> {
    let mut ranked: Vec<(Target, f64)> = result
        .iter()
        .filter_map(|(t, p)| p.map(|p| (t, p)))
        .collect();
    // stable sort: iteration is already in target order
    ranked.sort_by(|a, b| b.1.total_cmp(&a.1));
    ranked
}

pub fn best_outcome(result: &PredictionResult) -> Option<(Target, f64)> {
    rank(result).into_iter().next()
}

pub fn interpretation(probability: f64) -> &'static str {
    if probability > 0.5 {
        "Strong chance"
    } else if probability > 0.3 {
        "Moderate chance"
    } else {
        "Challenging"
    }
}

pub fn render_bar(probability: f64) -> String {
    let filled = (probability.clamp(0.0, 1.0) * BAR_WIDTH as f64) as usize;
    format!("{}{}", "█".repeat(filled), "░".repeat(BAR_WIDTH - filled))
}

/// Multi-line report as printed by the `predict` binary.
pub fn render(result: &PredictionResult) -> String {
    let mut out = String::from("Prediction results\n");
    for (target, p) in rank(result) {
        out.push_str(&format!(
            "{:<22} {:>6.1}%  {}\n",
            target.label(),
            p * 100.0,
            render_bar(p)
        ));
    }
    for (target, p) in result.iter() {
        if p.is_none() {
            out.push_str(&format!("{:<22} unavailable\n", target.label()));
        }
    }
    if let Some((target, p)) = best_outcome(result) {
        out.push_str(&format!(
            "\nMost likely outcome: {} ({:.1}%) - {}\n",
            target,
            p * 100.0,
            interpretation(p)
        ));
    }
    out
}
