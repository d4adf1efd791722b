use crate::config::DuelConfig;
use crate::types::{Duel, DuelStatus, DuelType, UserId, Winner};
use std::cmp::Ordering;
use std::collections::HashMap;

pub const WIN: f64 = 1.0;
pub const DRAW: f64 = 0.5;

pub fn elo_prob(player: i32, opponent: i32) -> f64 {
    1.0 / (1.0 + 10f64.powf(f64::from(opponent - player) / 400.0))
}

/// Rating points moved from `loser` to `winner`; negative when a draw
/// favours the lower-rated `loser`.
pub fn elo_delta(winner: i32, loser: i32, score: f64, k: f64) -> i32 {
    (k * (score - elo_prob(winner, loser))).round() as i32
}

pub fn placement_delta(placement: u32, problems_solved: u32, config: &DuelConfig) -> i32 {
    if problems_solved == 0 {
        return config.no_solve_delta;
    }
    placement
        .checked_sub(1)
        .and_then(|i| config.placement_deltas.get(i as usize))
        .copied()
        .unwrap_or(config.lower_placement_delta)
}

#[derive(Debug, Clone, PartialEq)]
pub struct Standing {
    pub user_id: UserId,
    pub problems_solved: u32,
    pub total_time: f64,
}

#[must_use]
#[derive(Debug, Clone, PartialEq)]
pub struct Placement {
    pub user_id: UserId,
    pub placement: u32,
    pub problems_solved: u32,
    pub total_time: f64,
    pub rating_delta: i32,
}

fn compare_standings(a: &Standing, b: &Standing) -> Ordering {
    b.problems_solved
        .cmp(&a.problems_solved)
        .then_with(|| a.total_time.total_cmp(&b.total_time))
        .then_with(|| a.user_id.cmp(&b.user_id))
}

/// Orders standings by solves (desc), total time (asc) and user id (asc),
/// then hands out placements 1..=n and their fixed deltas.
pub fn rank_standings(
    mut standings: Vec<Standing>,
    duel_type: DuelType,
    config: &DuelConfig,
) -> Vec<Placement> {
    standings.sort_by(compare_standings);
    standings
        .into_iter()
        .enumerate()
        .map(|(i, s)| {
            let placement = i as u32 + 1;
            let rating_delta = match duel_type {
                DuelType::Official => placement_delta(placement, s.problems_solved, config),
                DuelType::Unofficial => 0,
            };
            Placement {
                user_id: s.user_id,
                placement,
                problems_solved: s.problems_solved,
                total_time: s.total_time,
                rating_delta,
            }
        })
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DuelRank {
    pub low: i32,
    pub high: i32,
    pub title: &'static str,
    pub abbr: &'static str,
}

pub const DUEL_RANKS: [DuelRank; 10] = [
    DuelRank { low: i32::MIN, high: 1300, title: "Newbie", abbr: "N" },
    DuelRank { low: 1300, high: 1400, title: "Pupil", abbr: "P" },
    DuelRank { low: 1400, high: 1500, title: "Specialist", abbr: "S" },
    DuelRank { low: 1500, high: 1600, title: "Expert", abbr: "E" },
    DuelRank { low: 1600, high: 1700, title: "Candidate Master", abbr: "CM" },
    DuelRank { low: 1700, high: 1800, title: "Master", abbr: "M" },
    DuelRank { low: 1800, high: 1900, title: "International Master", abbr: "IM" },
    DuelRank { low: 1900, high: 2000, title: "Grandmaster", abbr: "GM" },
    DuelRank { low: 2000, high: 2100, title: "International Grandmaster", abbr: "IGM" },
    DuelRank { low: 2100, high: i32::MAX, title: "Legendary Grandmaster", abbr: "LGM" },
];

pub fn rank_for(rating: i32) -> &'static DuelRank {
    DUEL_RANKS
        .iter()
        .find(|r| r.low <= rating && rating < r.high)
        .unwrap_or(&DUEL_RANKS[DUEL_RANKS.len() - 1])
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RatingPoint {
    pub tick: usize,
    pub rating: i32,
}

/// Rebuilds 1v1 ratings from scratch by replaying completed official duels
/// in the order given.
#[derive(Debug, Clone)]
pub struct RatingReplay {
    initial: i32,
    k: f64,
    ratings: HashMap<UserId, i32>,
    history: HashMap<UserId, Vec<RatingPoint>>,
    tick: usize,
}

impl RatingReplay {
    pub fn new(config: &DuelConfig) -> Self {
        Self {
            initial: config.default_rating,
            k: config.elo_k,
            ratings: HashMap::new(),
            history: HashMap::new(),
            tick: 0,
        }
    }

    pub fn apply(&mut self, duel: &Duel, tracked: &[UserId]) {
        if duel.status != DuelStatus::Complete || duel.duel_type != DuelType::Official {
            return;
        }
        let Some(winner) = duel.winner else {
            return;
        };
        let challenger_r = self.rating(duel.challenger);
        let challengee_r = self.rating(duel.challengee);
        let score = match winner {
            Winner::Challenger => WIN,
            Winner::Challengee => 0.0,
            Winner::Draw => DRAW,
        };
        let delta = elo_delta(challenger_r, challengee_r, score, self.k);
        self.ratings.insert(duel.challenger, challenger_r + delta);
        self.ratings.insert(duel.challengee, challengee_r - delta);

        let mut touched = false;
        for user in [duel.challenger, duel.challengee] {
            if tracked.is_empty() || tracked.contains(&user) {
                let rating = self.rating(user);
                self.history.entry(user).or_default().push(RatingPoint {
                    tick: self.tick,
                    rating,
                });
                touched = true;
            }
        }
        if touched {
            self.tick += 1;
        }
    }

    pub fn rating(&self, user: UserId) -> i32 {
        self.ratings.get(&user).copied().unwrap_or(self.initial)
    }

    pub fn history(&self, user: UserId) -> &[RatingPoint] {
        self.history.get(&user).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn ticks(&self) -> usize {
        self.tick
    }

    pub fn ratings(&self) -> &HashMap<UserId, i32> {
        &self.ratings
    }
}
