//! Hold-out evaluation of a fitted classifier.

use serde::Serialize;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ConfusionMatrix {
    pub true_negative: usize,
    pub false_positive: usize,
    pub false_negative: usize,
    pub true_positive: usize,
}

impl ConfusionMatrix {
    pub fn from_predictions(y_true: &[bool], y_pred: &[bool]) -> Self {
        let mut cm = Self::default();
        for (t, p) in y_true.iter().zip(y_pred) {
            match (t, p) {
                (false, false) => cm.true_negative += 1,
                (false, true) => cm.false_positive += 1,
                (true, false) => cm.false_negative += 1,
                (true, true) => cm.true_positive += 1,
            }
        }
        cm
    }

    pub fn total(&self) -> usize {
        self.true_negative + self.false_positive + self.false_negative + self.true_positive
    }

    pub fn accuracy(&self) -> f64 {
        ratio(self.true_positive + self.true_negative, self.total())
    }

    pub fn precision(&self) -> f64 {
        ratio(self.true_positive, self.true_positive + self.false_positive)
    }

    pub fn recall(&self) -> f64 {
        ratio(self.true_positive, self.true_positive + self.false_negative)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CurvePoint {
    pub x: f64,
    pub y: f64,
    pub threshold: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct Evaluation {
    pub accuracy: f64,
    pub precision: f64,
    pub recall: f64,
    pub roc_auc: Option<f64>,
    pub confusion_matrix: ConfusionMatrix,
    /// x = false positive rate, y = true positive rate.
    pub roc_curve: Vec<CurvePoint>,
    /// x = recall, y = precision.
    pub pr_curve: Vec<CurvePoint>,
}

impl Evaluation {
    /// Scores are positive-class probabilities; 0.5 is the decision threshold.
    pub fn compute(y_true: &[bool], scores: &[f64]) -> Self {
        let y_pred: Vec<bool> = scores.iter().map(|s| *s >= 0.5).collect();
        let confusion_matrix = ConfusionMatrix::from_predictions(y_true, &y_pred);
        let roc = roc_curve(y_true, scores);
        Self {
            accuracy: confusion_matrix.accuracy(),
            precision: confusion_matrix.precision(),
            recall: confusion_matrix.recall(),
            roc_auc: roc.as_deref().map(auc),
            confusion_matrix,
            roc_curve: roc.unwrap_or_default(),
            pr_curve: pr_curve(y_true, scores),
        }
    }
}

fn ratio(num: usize, den: usize) -> f64 {
    if den == 0 {
        0.0
    } else {
        num as f64 / den as f64
    }
}

/// Scores sorted descending with ties grouped, as (threshold, tp, fp)
/// cumulative counts at each distinct threshold.
fn cumulative_counts(y_true: &[bool], scores: &[f64]) -> Vec<(f64, usize, usize)> {
    let mut order: Vec<usize> = (0..scores.len()).collect();
    order.sort_by(|a, b| scores[*b].total_cmp(&scores[*a]));

    let mut out: Vec<(f64, usize, usize)> = Vec::new();
    let (mut tp, mut fp) = (0, 0);
    for (pos, &i) in order.iter().enumerate() {
        if y_true[i] {
            tp += 1;
        } else {
            fp += 1;
        }
        let last_of_group = order
            .get(pos + 1)
            .map_or(true, |next| scores[*next] != scores[i]);
        if last_of_group {
            out.push((scores[i], tp, fp));
        }
    }
    out
}

/// `None` when either class is absent and the curve is undefined.
pub fn roc_curve(y_true: &[bool], scores: &[f64]) -> Option<Vec<CurvePoint>> {
    let positives = y_true.iter().filter(|v| **v).count();
    let negatives = y_true.len() - positives;
    if positives == 0 || negatives == 0 {
        return None;
    }
    let mut points = vec![CurvePoint {
        x: 0.0,
        y: 0.0,
        threshold: f64::INFINITY,
    }];
    points.extend(
        cumulative_counts(y_true, scores)
            .into_iter()
            .map(|(threshold, tp, fp)| CurvePoint {
                x: fp as f64 / negatives as f64,
                y: tp as f64 / positives as f64,
                threshold,
            }),
    );
    Some(points)
}

pub fn pr_curve(y_true: &[bool], scores: &[f64]) -> Vec<CurvePoint> {
    let positives = y_true.iter().filter(|v| **v).count();
    cumulative_counts(y_true, scores)
        .into_iter()
        .map(|(threshold, tp, fp)| CurvePoint {
            x: ratio(tp, positives),
            y: ratio(tp, tp + fp),
            threshold,
        })
        .collect()
}

/// Trapezoidal area under a curve whose x is non-decreasing.
pub fn auc(points: &[CurvePoint]) -> f64 {
    points
        .windows(2)
        .map(|w| (w[1].x - w[0].x) * (w[1].y + w[0].y) / 2.0)
        .sum()
}
