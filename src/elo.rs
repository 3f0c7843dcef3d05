// Elo rating calculation for 1v1 matches.

pub const STARTING_RATING: i32 = 1000;
pub const K_FACTOR: f64 = 32.0;

/// Match outcome from the perspective of one player.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Win,
    Loss,
}

impl Outcome {
    pub fn score(self) -> f64 {
        match self {
            Outcome::Win => 1.0,
            Outcome::Loss => 0.0,
        }
    }
}

/// Expected score for player A against player B.
pub fn expected_score(rating_a: i32, rating_b: i32) -> f64 {
    1.0 / (1.0 + 10.0_f64.powf((rating_b - rating_a) as f64 / 400.0))
}

/// New rating after a decided 1v1 match. Drawn matches leave ratings untouched
/// and never reach this function.
pub fn calculate_new_rating(rating: i32, opponent_rating: i32, outcome: Outcome) -> i32 {
    let expected = expected_score(rating, opponent_rating);
    (rating as f64 + K_FACTOR * (outcome.score() - expected)).round() as i32
}

/// Both new ratings for a decided match, winner first.
pub fn rate_match(winner_rating: i32, loser_rating: i32) -> (i32, i32) {
    (
        calculate_new_rating(winner_rating, loser_rating, Outcome::Win),
        calculate_new_rating(loser_rating, winner_rating, Outcome::Loss),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expected_score_equal_ratings() {
        let e = expected_score(1200, 1200);
        assert!((e - 0.5).abs() < 0.001);
    }

    #[test]
    fn test_expected_score_higher_rated() {
        let e = expected_score(1500, 1200);
        assert!(e > 0.8);
        assert!(e < 1.0);
    }

    #[test]
    fn test_equal_ratings_win() {
        // K=32, expected=0.5: winner +16, loser -16
        let (w, l) = rate_match(1200, 1200);
        assert_eq!(w, 1216);
        assert_eq!(l, 1184);
    }

    #[test]
    fn test_underdog_win_pays_more() {
        let (w, l) = rate_match(1000, 1400);
        assert!(w - 1000 > 16);
        assert!(1400 - l > 16);
    }

    #[test]
    fn test_favorite_win_pays_less() {
        let (w, _) = rate_match(1400, 1000);
        assert!(w - 1400 < 16);
        assert!(w > 1400);
    }

    #[test]
    fn test_zero_sum_at_equal_ratings() {
        let (w, l) = rate_match(1000, 1000);
        assert_eq!((w - 1000) + (l - 1000), 0);
    }
}
