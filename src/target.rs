use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

/// Binary race outcome a model is trained to predict.
///
/// Declaration order is significant: it is the order predictions are
/// reported in, and the tie-break order when two outcomes share a
/// probability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Target {
    #[serde(rename = "Race Winner")]
    RaceWinner,
    #[serde(rename = "Podium")]
    Podium,
    #[serde(rename = "Points Finish")]
    PointsFinish,
    #[serde(rename = "Top 5")]
    Top5,
    #[serde(rename = "Top Qualifier")]
    TopQualifier,
    #[serde(rename = "Position Improvement")]
    PositionImprovement,
    #[serde(rename = "Strong Result")]
    StrongResult,
}

impl Target {
    pub const ALL: [Target; 7] = [
        Target::RaceWinner,
        Target::Podium,
        Target::PointsFinish,
        Target::Top5,
        Target::TopQualifier,
        Target::PositionImprovement,
        Target::StrongResult,
    ];

    /// Targets the inference service answers for unless configured otherwise.
    pub const SERVED: [Target; 4] = [
        Target::RaceWinner,
        Target::Podium,
        Target::PointsFinish,
        Target::Top5,
    ];

    pub fn label(self) -> &'static str {
        match self {
            Target::RaceWinner => "Race Winner",
            Target::Podium => "Podium",
            Target::PointsFinish => "Points Finish",
            Target::Top5 => "Top 5",
            Target::TopQualifier => "Top Qualifier",
            Target::PositionImprovement => "Position Improvement",
            Target::StrongResult => "Strong Result",
        }
    }

    /// Stem used to name this target's artifacts on disk.
    pub fn file_stem(self) -> &'static str {
        match self {
            Target::RaceWinner => "race_winner",
            Target::Podium => "podium",
            Target::PointsFinish => "points_finish",
            Target::Top5 => "top_5",
            Target::TopQualifier => "top_qualifier",
            Target::PositionImprovement => "position_improvement",
            Target::StrongResult => "strong_result",
        }
    }

    pub fn from_label(s: &str) -> Option<Target> {
        Target::ALL
            .into_iter()
            .find(|t| t.label().eq_ignore_ascii_case(s) || t.file_stem().eq_ignore_ascii_case(s))
    }

    /// Binary label for one historical row. `None` when a column the
    /// predicate needs is unavailable.
    pub fn label_for(
        self,
        position: f64,
        grid_position: Option<f64>,
        positions_gained: Option<f64>,
    ) -> Option<bool> {
        let label = match self {
            Target::RaceWinner => position == 1.0,
            Target::Podium => position <= 3.0,
            Target::PointsFinish => position <= 10.0,
            Target::Top5 => position <= 5.0,
            Target::TopQualifier => grid_position? <= 3.0,
            Target::PositionImprovement => positions_gained? > 0.0,
            Target::StrongResult => position <= 5.0 && grid_position? > 5.0,
        };
        Some(label)
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unknown target '{0}'")]
pub struct UnknownTarget(pub String);

impl FromStr for Target {
    type Err = UnknownTarget;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Target::from_label(s.trim()).ok_or_else(|| UnknownTarget(s.to_string()))
    }
}
