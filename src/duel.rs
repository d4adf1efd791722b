use crate::context::DuelContext;
use crate::error::{DuelError, Precondition, Result};
use crate::handicap::{adjusted_time, handicap};
use crate::rating::{elo_delta, DRAW, WIN};
use crate::scheduler::ScheduledAction;
use crate::selector::round_to_hundred;
use crate::store::{DuelCompletion, DuelFilter, NewDuel, RatingChange, StatusUpdate};
use crate::types::{
    Duel, DuelId, DuelStatus, DuelType, Duelist, Handle, ProblemLink, ProblemRef, UserId, Verdict,
    Winner,
};
use chrono::{DateTime, Utc};
use std::sync::Arc;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChallengeOptions {
    pub rating: Option<i32>,
    pub include_tags: Vec<String>,
    pub exclude_tags: Vec<String>,
    pub no_handicap: bool,
    /// A specific problem instead of a random one. Makes the duel unofficial.
    pub problem: Option<ProblemLink>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChallengeIssued {
    pub duel: Duel,
    pub challenger_rating: i32,
    pub challengee_rating: i32,
    /// Seconds granted to (challenger, challengee); zero with `no_handicap`.
    pub handicap: (f64, f64),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RatingUpdate {
    pub user: UserId,
    pub before: i32,
    pub after: i32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DuelResult {
    pub duel: Duel,
    pub winner: Winner,
    /// Empty for unofficial duels.
    pub rating_updates: Vec<RatingUpdate>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum CompleteOutcome {
    /// A submission to the duel problem is still being judged.
    PendingJudgement,
    NobodySolved,
    Completed(DuelResult),
}

#[derive(Debug, Clone, PartialEq)]
pub enum DrawOutcome {
    TooEarly { remaining_secs: i64 },
    Offered { duel: Duel, offeree: UserId },
    AlreadyOffered,
    Accepted { offerer: UserId, result: DuelResult },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SolveState {
    Unsolved,
    Testing,
    SolvedAt(DateTime<Utc>),
}

/// Drives the 1v1 lifecycle. Every status change goes through a conditional
/// store update; losing that race is reported as [`DuelError::Conflict`] for
/// user actions and ignored for timers.
pub struct DuelOrchestrator {
    ctx: Arc<DuelContext>,
}

impl DuelOrchestrator {
    pub fn new(ctx: Arc<DuelContext>) -> Self {
        Self { ctx }
    }

    pub fn register(&self, user: UserId) -> Result<Duelist> {
        let rating = self.ctx.config.default_rating;
        if !self
            .ctx
            .store
            .register_duelist(user, rating)
            .map_err(DuelError::Store)?
        {
            return Err(Precondition::AlreadyRegistered(user).into());
        }
        tracing::info!(user = user.0, rating, "duelist registered");
        Ok(Duelist {
            user_id: user,
            rating,
        })
    }

    pub fn challenge(
        &self,
        challenger: UserId,
        challengee: UserId,
        options: ChallengeOptions,
    ) -> Result<ChallengeIssued> {
        let ctx = &self.ctx;
        let challenger_rating = ctx.duelist(challenger)?.rating;
        let challengee_rating = ctx.duelist(challengee)?.rating;
        if challenger == challengee {
            return Err(Precondition::SelfChallenge(challenger).into());
        }
        ctx.ensure_idle(challenger)?;
        ctx.ensure_idle(challengee)?;

        let users = [challenger, challengee];
        let handles = ctx.handles_of(&users)?;
        let (problem, duel_type) = match &options.problem {
            Some(link) => (self.lookup_problem(link)?, DuelType::Unofficial),
            None => {
                let rating = match options.rating {
                    Some(r) => round_to_hundred(r),
                    None => ctx.suggested_rating(&handles)?,
                };
                let constraints = ctx.selection_constraints(
                    &users,
                    handles,
                    options.include_tags.clone(),
                    options.exclude_tags.clone(),
                )?;
                let picked = ctx
                    .selector()
                    .select(rating, &constraints, &mut *ctx.rng())?;
                (picked.reference(), DuelType::Official)
            }
        };

        let id = ctx
            .store
            .create_duel(NewDuel {
                challenger,
                challengee,
                issue_time: ctx.now(),
                problem,
                duel_type,
                no_handicap: options.no_handicap,
            })
            .map_err(DuelError::Store)?;
        tracing::info!(
            duel_id = id.0,
            challenger = challenger.0,
            challengee = challengee.0,
            ?duel_type,
            "challenge issued"
        );
        ctx.schedule(ctx.config.expiry_secs, ScheduledAction::ExpireDuel(id));

        let handicap = if options.no_handicap {
            (0.0, 0.0)
        } else {
            handicap(
                challenger_rating,
                challengee_rating,
                ctx.config.handicap_secs_per_100,
            )
        };
        Ok(ChallengeIssued {
            duel: self.load(id)?,
            challenger_rating,
            challengee_rating,
            handicap,
        })
    }

    fn lookup_problem(&self, link: &ProblemLink) -> Result<ProblemRef> {
        self.ctx
            .catalog
            .find(link.contest_id, &link.index)
            .map_err(DuelError::External)?
            .map(|p| p.reference())
            .ok_or_else(|| {
                Precondition::UnknownProblem(format!("{}{}", link.contest_id, link.index)).into()
            })
    }

    /// Accepting only stamps `accepted_at` and arms the start countdown; the
    /// duel stays PENDING until [`DuelOrchestrator::start`] fires.
    pub fn accept(&self, user: UserId) -> Result<Duel> {
        let duel = self
            .find_one(DuelFilter::challengee(user).with_status(&[DuelStatus::Pending]))?
            .ok_or(Precondition::NotChallenged(user))?;
        if duel.accepted_at.is_some() {
            return Err(Precondition::AlreadyAccepted(user).into());
        }
        if !self
            .ctx
            .store
            .record_acceptance(duel.id, self.ctx.now())
            .map_err(DuelError::Store)?
        {
            tracing::debug!(duel_id = duel.id.0, "acceptance lost a race");
            return Err(DuelError::Conflict);
        }
        tracing::info!(duel_id = duel.id.0, "challenge accepted, start countdown armed");
        self.ctx.schedule(
            self.ctx.config.start_delay_secs,
            ScheduledAction::StartDuel(duel.id),
        );
        self.load(duel.id)
    }

    /// PENDING -> ONGOING. `None` when the duel was declined, withdrawn or
    /// expired in the meantime.
    pub fn start(&self, id: DuelId) -> Result<Option<Duel>> {
        let now = self.ctx.now();
        if !self.transition(
            id,
            DuelStatus::Pending,
            StatusUpdate::to(DuelStatus::Ongoing).started_at(now),
        )? {
            return Ok(None);
        }
        self.load(id).map(Some)
    }

    /// PENDING -> EXPIRED; a no-op once the duel has moved on.
    pub fn expire(&self, id: DuelId) -> Result<bool> {
        self.transition(id, DuelStatus::Pending, StatusUpdate::to(DuelStatus::Expired))
    }

    pub fn decline(&self, user: UserId) -> Result<Duel> {
        let duel = self
            .find_one(DuelFilter::challengee(user).with_status(&[DuelStatus::Pending]))?
            .ok_or(Precondition::NotChallenged(user))?;
        self.transition_or_conflict(duel.id, DuelStatus::Pending, DuelStatus::Declined)
    }

    pub fn withdraw(&self, user: UserId) -> Result<Duel> {
        let duel = self
            .find_one(DuelFilter::challenger(user).with_status(&[DuelStatus::Pending]))?
            .ok_or(Precondition::NotChallenging(user))?;
        self.transition_or_conflict(duel.id, DuelStatus::Pending, DuelStatus::Withdrawn)
    }

    /// A participant may void their own duel shortly after it starts.
    pub fn invalidate(&self, actor: UserId) -> Result<Duel> {
        let duel = self.ongoing_for(actor)?;
        let window = self.ctx.config.invalidate_window_secs;
        if elapsed_secs(&duel, self.ctx.now()) > window {
            return Err(Precondition::InvalidateWindowPassed(actor).into());
        }
        self.transition_or_conflict(duel.id, DuelStatus::Ongoing, DuelStatus::Invalid)
    }

    /// Moderator override: voids `target`'s ongoing duel at any time.
    pub fn force_invalidate(&self, moderator: UserId, target: UserId) -> Result<Duel> {
        if !self.ctx.config.moderators.contains(&moderator) {
            return Err(Precondition::NotModerator(moderator).into());
        }
        let duel = self.ongoing_for(target)?;
        tracing::info!(
            duel_id = duel.id.0,
            moderator = moderator.0,
            "moderator invalidation"
        );
        self.transition_or_conflict(duel.id, DuelStatus::Ongoing, DuelStatus::Invalid)
    }

    pub fn complete(&self, actor: UserId) -> Result<CompleteOutcome> {
        let duel = self.ongoing_for(actor)?;
        let start = duel.start_time.unwrap_or(duel.issue_time);
        let challenger_state = self.solve_state(&self.ctx.handle_of(duel.challenger)?, &duel.problem)?;
        let challengee_state = self.solve_state(&self.ctx.handle_of(duel.challengee)?, &duel.problem)?;
        if challenger_state == SolveState::Testing || challengee_state == SolveState::Testing {
            tracing::debug!(duel_id = duel.id.0, "completion deferred, submission in queue");
            return Ok(CompleteOutcome::PendingJudgement);
        }

        let challenger_rating = self.ctx.duelist(duel.challenger)?.rating;
        let challengee_rating = self.ctx.duelist(duel.challengee)?.rating;
        let (challenger_hc, challengee_hc) = if duel.no_handicap {
            (0.0, 0.0)
        } else {
            handicap(
                challenger_rating,
                challengee_rating,
                self.ctx.config.handicap_secs_per_100,
            )
        };

        let (winner, finish) = match (challenger_state, challengee_state) {
            (SolveState::SolvedAt(a), SolveState::SolvedAt(b)) => {
                let adjusted_a = adjusted_time(offset_secs(start, a), challenger_hc);
                let adjusted_b = adjusted_time(offset_secs(start, b), challengee_hc);
                let winner = if adjusted_a < adjusted_b {
                    Winner::Challenger
                } else if adjusted_b < adjusted_a {
                    Winner::Challengee
                } else {
                    Winner::Draw
                };
                (winner, a.min(b))
            }
            (SolveState::SolvedAt(a), _) => (Winner::Challenger, a),
            (_, SolveState::SolvedAt(b)) => (Winner::Challengee, b),
            _ => return Ok(CompleteOutcome::NobodySolved),
        };

        let result = match winner {
            Winner::Challengee => {
                self.finish(&duel, winner, duel.challengee, duel.challenger, finish, WIN)?
            }
            Winner::Challenger => {
                self.finish(&duel, winner, duel.challenger, duel.challengee, finish, WIN)?
            }
            Winner::Draw => {
                self.finish(&duel, winner, duel.challenger, duel.challengee, finish, DRAW)?
            }
        };
        Ok(CompleteOutcome::Completed(result))
    }

    /// Offers a draw, or accepts the opponent's standing offer.
    pub fn draw(&self, actor: UserId) -> Result<DrawOutcome> {
        let duel = self.ongoing_for(actor)?;
        let now = self.ctx.now();
        let elapsed = elapsed_secs(&duel, now);
        let no_draw = self.ctx.config.no_draw_secs;
        if elapsed < no_draw {
            return Ok(DrawOutcome::TooEarly {
                remaining_secs: no_draw - elapsed,
            });
        }

        let offerer = match duel.pending_drawer {
            Some(offerer) => offerer,
            None => {
                if self
                    .ctx
                    .store
                    .record_draw_offer(duel.id, actor)
                    .map_err(DuelError::Store)?
                {
                    tracing::info!(duel_id = duel.id.0, offerer = actor.0, "draw offered");
                    let offeree = duel.opponent_of(actor).unwrap_or(actor);
                    return Ok(DrawOutcome::Offered {
                        duel: self.load(duel.id)?,
                        offeree,
                    });
                }
                // The opponent's offer landed first.
                self.load(duel.id)?
                    .pending_drawer
                    .ok_or(DuelError::Conflict)?
            }
        };
        if offerer == actor {
            return Ok(DrawOutcome::AlreadyOffered);
        }
        let result = self.finish(&duel, Winner::Draw, offerer, actor, now, DRAW)?;
        Ok(DrawOutcome::Accepted { offerer, result })
    }

    /// Re-arms expiry timers for PENDING duels from their issue time, and the
    /// start countdown from `accepted_at` for those already accepted.
    pub fn rehydrate(&self) -> Result<usize> {
        let now = self.ctx.now();
        let config = &self.ctx.config;
        let pending = self
            .ctx
            .store
            .duels(&DuelFilter::all().with_status(&[DuelStatus::Pending]))
            .map_err(DuelError::Store)?;
        let remaining = |since: DateTime<Utc>, delay: u64| {
            delay.saturating_sub((now - since).num_seconds().max(0) as u64)
        };
        for duel in &pending {
            self.ctx.schedule(
                remaining(duel.issue_time, config.expiry_secs),
                ScheduledAction::ExpireDuel(duel.id),
            );
            if let Some(accepted_at) = duel.accepted_at {
                self.ctx.schedule(
                    remaining(accepted_at, config.start_delay_secs),
                    ScheduledAction::StartDuel(duel.id),
                );
            }
        }
        tracing::info!(count = pending.len(), "pending duel timers rehydrated");
        Ok(pending.len())
    }

    /// `better` and `worse` fix the Elo ordering; for draws that is
    /// challenger/challengee, or offerer/acceptor.
    fn finish(
        &self,
        duel: &Duel,
        winner: Winner,
        better: UserId,
        worse: UserId,
        finish_time: DateTime<Utc>,
        score: f64,
    ) -> Result<DuelResult> {
        let better_rating = self.ctx.duelist(better)?.rating;
        let worse_rating = self.ctx.duelist(worse)?.rating;
        let rating_updates = match duel.duel_type {
            DuelType::Official => {
                let delta = elo_delta(better_rating, worse_rating, score, self.ctx.config.elo_k);
                vec![
                    RatingUpdate {
                        user: better,
                        before: better_rating,
                        after: better_rating + delta,
                    },
                    RatingUpdate {
                        user: worse,
                        before: worse_rating,
                        after: worse_rating - delta,
                    },
                ]
            }
            DuelType::Unofficial => Vec::new(),
        };
        let completion = DuelCompletion {
            winner,
            finish_time,
            rating_changes: rating_updates
                .iter()
                .map(|u| RatingChange {
                    user: u.user,
                    delta: u.after - u.before,
                })
                .collect(),
        };
        if !self
            .ctx
            .store
            .complete_duel(duel.id, &completion)
            .map_err(DuelError::Store)?
        {
            tracing::debug!(duel_id = duel.id.0, "completion lost a race");
            return Err(DuelError::Conflict);
        }
        tracing::info!(
            duel_id = duel.id.0,
            from = %DuelStatus::Ongoing,
            to = %DuelStatus::Complete,
            ?winner,
            "duel completed"
        );
        Ok(DuelResult {
            duel: self.load(duel.id)?,
            winner,
            rating_updates,
        })
    }

    fn solve_state(&self, handle: &Handle, problem: &ProblemRef) -> Result<SolveState> {
        let submissions = self.ctx.feed.submissions(handle).map_err(|err| {
            tracing::warn!(handle = %handle, error = %err, "submission feed failed");
            DuelError::External(err)
        })?;
        let relevant: Vec<_> = submissions
            .iter()
            .filter(|s| s.problem.is_same_problem(problem))
            .filter(|s| matches!(s.verdict, Verdict::Ok | Verdict::Testing))
            .collect();
        if relevant.iter().any(|s| s.verdict == Verdict::Testing) {
            return Ok(SolveState::Testing);
        }
        Ok(relevant
            .iter()
            .map(|s| s.creation_time)
            .min()
            .map_or(SolveState::Unsolved, SolveState::SolvedAt))
    }

    fn ongoing_for(&self, user: UserId) -> Result<Duel> {
        self.find_one(DuelFilter::involving(user).with_status(&[DuelStatus::Ongoing]))?
            .ok_or_else(|| Precondition::NotInDuel(user).into())
    }

    fn find_one(&self, filter: DuelFilter) -> Result<Option<Duel>> {
        Ok(self
            .ctx
            .store
            .duels(&filter)
            .map_err(DuelError::Store)?
            .into_iter()
            .next())
    }

    fn load(&self, id: DuelId) -> Result<Duel> {
        self.ctx
            .store
            .duel(id)
            .map_err(DuelError::Store)?
            .ok_or_else(|| DuelError::Store(format!("duel {} vanished", id)))
    }

    fn transition(&self, id: DuelId, from: DuelStatus, update: StatusUpdate) -> Result<bool> {
        let to = update.status;
        let moved = self
            .ctx
            .store
            .transition_duel(id, from, update)
            .map_err(DuelError::Store)?;
        if moved {
            tracing::info!(duel_id = id.0, %from, %to, "duel transition");
        } else {
            tracing::debug!(duel_id = id.0, %from, %to, "duel already moved on");
        }
        Ok(moved)
    }

    fn transition_or_conflict(&self, id: DuelId, from: DuelStatus, to: DuelStatus) -> Result<Duel> {
        if !self.transition(id, from, StatusUpdate::to(to))? {
            return Err(DuelError::Conflict);
        }
        self.load(id)
    }
}

fn offset_secs(start: DateTime<Utc>, at: DateTime<Utc>) -> f64 {
    (at - start).num_seconds().max(0) as f64
}

fn elapsed_secs(duel: &Duel, now: DateTime<Utc>) -> i64 {
    (now - duel.start_time.unwrap_or(duel.issue_time)).num_seconds()
}
