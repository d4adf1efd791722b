use crate::config::DuelConfig;
use crate::error::DuelError;
use crate::judge::ProblemCatalog;
use crate::types::{Handle, Problem};
use rand::Rng;
use std::collections::HashSet;

#[derive(Debug, Clone, Default)]
pub struct SelectionConstraints {
    pub include_tags: Vec<String>,
    pub exclude_tags: Vec<String>,
    /// Names already solved or used in an earlier duel by anyone involved.
    pub excluded_names: HashSet<String>,
    /// Handles of everyone involved; their own contests are off limits.
    pub handles: Vec<Handle>,
}

/// Nearest hundred; an exact half goes to the even hundred.
pub fn round_to_hundred(rating: i32) -> i32 {
    let (hundreds, rest) = (rating.div_euclid(100), rating.rem_euclid(100));
    let up = rest > 50 || (rest == 50 && hundreds % 2 != 0);
    (hundreds + i32::from(up)) * 100
}

/// Default problem rating for a pairing: the weakest judge rating, rounded
/// to the nearest hundred and shifted by the configured offset.
pub fn suggested_rating(judge_ratings: &[Option<i32>], config: &DuelConfig) -> i32 {
    let lowest = judge_ratings
        .iter()
        .map(|r| r.unwrap_or(0))
        .min()
        .unwrap_or(0);
    (round_to_hundred(lowest) + config.suggested_rating_offset).max(config.min_suggested_rating)
}

pub struct ProblemSelector<'a> {
    catalog: &'a dyn ProblemCatalog,
    floor: i32,
}

impl<'a> ProblemSelector<'a> {
    pub fn new(catalog: &'a dyn ProblemCatalog, floor: i32) -> Self {
        Self { catalog, floor }
    }

    fn is_eligible(
        &self,
        problem: &Problem,
        rating: i32,
        constraints: &SelectionConstraints,
        taken: &HashSet<String>,
    ) -> bool {
        problem.rating == Some(rating)
            && !constraints.excluded_names.contains(&problem.name)
            && !taken.contains(&problem.name)
            && !constraints.handles.iter().any(|h| problem.is_written_by(h))
            && !self.catalog.is_nonstandard(problem)
            && problem.matches_all_tags(&constraints.include_tags)
            && !problem.matches_any_tag(&constraints.exclude_tags)
    }

    fn pick<R>(
        &self,
        problems: &[Problem],
        rating: i32,
        constraints: &SelectionConstraints,
        taken: &HashSet<String>,
        rng: &mut R,
    ) -> Result<Problem, DuelError>
    where
        R: Rng + ?Sized,
    {
        let mut bucket = rating;
        while bucket > self.floor {
            let mut pool: Vec<&Problem> = problems
                .iter()
                .filter(|p| self.is_eligible(p, bucket, constraints, taken))
                .collect();
            if !pool.is_empty() {
                pool.sort_by_key(|p| p.contest_start_time);
                // Max of two uniform draws leans toward later contests.
                let choice = rng
                    .random_range(0..pool.len())
                    .max(rng.random_range(0..pool.len()));
                tracing::debug!(
                    target_rating = rating,
                    bucket,
                    pool = pool.len(),
                    choice,
                    "problem selected"
                );
                return Ok(pool[choice].clone());
            }
            bucket -= 100;
        }
        Err(DuelError::NoEligibleProblem { rating })
    }

    pub fn select<R>(
        &self,
        rating: i32,
        constraints: &SelectionConstraints,
        rng: &mut R,
    ) -> Result<Problem, DuelError>
    where
        R: Rng + ?Sized,
    {
        let problems = self.catalog.problems().map_err(DuelError::External)?;
        self.pick(&problems, rating, constraints, &HashSet::new(), rng)
    }

    /// One problem per target rating, no repeats, presented easiest first.
    pub fn select_batch<R>(
        &self,
        ratings: &[i32],
        constraints: &SelectionConstraints,
        rng: &mut R,
    ) -> Result<Vec<Problem>, DuelError>
    where
        R: Rng + ?Sized,
    {
        let problems = self.catalog.problems().map_err(DuelError::External)?;
        let mut targets = ratings.to_vec();
        targets.sort_unstable();
        let mut taken = HashSet::new();
        let mut chosen = Vec::with_capacity(targets.len());
        for target in targets {
            let problem = self.pick(&problems, target, constraints, &taken, rng)?;
            taken.insert(problem.name.clone());
            chosen.push(problem);
        }
        chosen.sort_by_key(|p| p.rating.unwrap_or(0));
        Ok(chosen)
    }
}
