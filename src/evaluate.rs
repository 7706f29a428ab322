use crate::fixture::Score;
use crate::signal::{OutcomeLabel, Pick};

/// Label for `pick` given the final score, `Pending` while it is unknown.
pub fn evaluate(pick: Pick, score: Option<Score>) -> OutcomeLabel {
    let Some(score) = score else {
        return OutcomeLabel::Pending;
    };
    let hit = match pick {
        Pick::Win(side) => score.winner() == Some(side),
        Pick::Over15 => score.total() >= 2,
        Pick::BothTeamsScore => score.home >= 1 && score.away >= 1,
        Pick::TeamScores(side) => score.goals(side) >= 1,
    };
    if hit {
        OutcomeLabel::Correct
    } else {
        OutcomeLabel::Wrong
    }
}

/// Fills in the outcome of a pick. Returns true when the label changed, so
/// callers only write back what moved.
pub fn settle(pick: Pick, outcome: &mut OutcomeLabel, score: Option<Score>) -> bool {
    let label = evaluate(pick, score);
    // A score that disappears again never un-settles a signal.
    if !label.is_resolved() || label == *outcome {
        return false;
    }
    *outcome = label;
    true
}
