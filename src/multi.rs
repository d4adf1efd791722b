use crate::context::DuelContext;
use crate::error::{DuelError, Precondition, Result};
use crate::handicap::{adjusted_time, handicap};
use crate::rating::{rank_standings, Placement, Standing};
use crate::scheduler::ScheduledAction;
use crate::selector::round_to_hundred;
use crate::store::{MultiFilter, NewMultiplayerDuel, StatusUpdate};
use crate::types::{
    DuelId, DuelStatus, DuelType, MultiplayerDuel, Participant, ParticipantStatus,
    ProblemAssignment, UserId, Verdict,
};
use std::sync::Arc;

/// How many problems a multiplayer duel gets, and at which ratings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProblemPlan {
    /// `count` problems at one rating. Unset parts fall back to the configured
    /// count and the suggested rating.
    Count {
        count: Option<usize>,
        rating: Option<i32>,
    },
    /// One problem per listed rating.
    Ratings(Vec<i32>),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MultiOptions {
    /// Defaults to the configured count at the suggested rating.
    pub plan: Option<ProblemPlan>,
    pub include_tags: Vec<String>,
    pub exclude_tags: Vec<String>,
    pub no_handicap: bool,
    pub guild_id: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MultiDuelView {
    pub duel: MultiplayerDuel,
    pub participants: Vec<Participant>,
    pub problems: Vec<ProblemAssignment>,
}

impl MultiDuelView {
    pub fn count(&self, status: ParticipantStatus) -> usize {
        self.participants.iter().filter(|p| p.status == status).count()
    }

    pub fn remaining(&self) -> usize {
        self.participants.len() - self.count(ParticipantStatus::Declined)
    }

    fn everyone_accepted(&self) -> bool {
        self.count(ParticipantStatus::Invited) == 0
            && self.count(ParticipantStatus::Accepted) >= 2
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LeaveOutcome {
    pub view: MultiDuelView,
    /// Too few participants were left, so the whole duel was called off.
    pub cancelled: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AcceptOutcome {
    pub view: MultiDuelView,
    pub starting: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MultiResult {
    pub view: MultiDuelView,
    pub placements: Vec<Placement>,
    /// Ratings before the placement deltas were applied, in placement order.
    pub ratings_before: Vec<i32>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum MultiCompleteOutcome {
    PendingJudgement,
    Completed(MultiResult),
}

pub struct MultiplayerOrchestrator {
    ctx: Arc<DuelContext>,
}

impl MultiplayerOrchestrator {
    pub fn new(ctx: Arc<DuelContext>) -> Self {
        Self { ctx }
    }

    pub fn multistart(
        &self,
        creator: UserId,
        invitees: &[UserId],
        options: MultiOptions,
    ) -> Result<MultiDuelView> {
        let ctx = &self.ctx;
        let config = &ctx.config;
        let mut users = vec![creator];
        for user in invitees {
            if !users.contains(user) {
                users.push(*user);
            }
        }
        if users.len() < config.min_participants || users.len() > config.max_participants {
            return Err(Precondition::ParticipantCount {
                min: config.min_participants,
                max: config.max_participants,
                got: users.len(),
            }
            .into());
        }
        for user in &users {
            ctx.duelist(*user)?;
        }
        for user in &users {
            ctx.ensure_idle(*user)?;
        }

        let handles = ctx.handles_of(&users)?;
        let plan = options.plan.clone().unwrap_or(ProblemPlan::Count {
            count: None,
            rating: None,
        });
        let mut targets = match plan {
            ProblemPlan::Count { count, rating } => {
                let count = count.unwrap_or(config.default_problem_count);
                self.check_problem_count(count)?;
                let rating = match rating {
                    Some(r) => round_to_hundred(r),
                    None => ctx.suggested_rating(&handles)?,
                };
                vec![rating; count]
            }
            ProblemPlan::Ratings(ratings) => {
                self.check_problem_count(ratings.len())?;
                ratings.into_iter().map(round_to_hundred).collect()
            }
        };
        targets.sort_unstable();

        let constraints = ctx.selection_constraints(
            &users,
            handles,
            options.include_tags.clone(),
            options.exclude_tags.clone(),
        )?;
        let problems = ctx
            .selector()
            .select_batch(&targets, &constraints, &mut *ctx.rng())?;

        let count = targets.len();
        let target_rating = targets.iter().sum::<i32>() / count as i32;
        let id = ctx
            .store
            .create_multi(NewMultiplayerDuel {
                creator,
                guild_id: options.guild_id,
                issue_time: ctx.now(),
                num_problems: count as u8,
                target_rating,
                duel_type: DuelType::Official,
                no_handicap: options.no_handicap,
            })
            .map_err(DuelError::Store)?;
        for user in &users {
            let status = if *user == creator {
                ParticipantStatus::Accepted
            } else {
                ParticipantStatus::Invited
            };
            ctx.store
                .add_participant(id, *user, status)
                .map_err(DuelError::Store)?;
        }
        for (i, problem) in problems.iter().enumerate() {
            ctx.store
                .add_problem(
                    id,
                    ProblemAssignment {
                        problem: problem.reference(),
                        order: i as u8 + 1,
                    },
                )
                .map_err(DuelError::Store)?;
        }
        tracing::info!(
            duel_id = id.0,
            creator = creator.0,
            participants = users.len(),
            problems = count,
            target_rating,
            "multiplayer duel created"
        );
        ctx.schedule(config.expiry_secs, ScheduledAction::ExpireMulti(id));
        self.view(id)
    }

    fn check_problem_count(&self, count: usize) -> Result<()> {
        let max = self.ctx.config.max_problem_count;
        if count == 0 || count > max {
            return Err(Precondition::ProblemCount { max, got: count }.into());
        }
        Ok(())
    }

    pub fn multiaccept(&self, user: UserId) -> Result<AcceptOutcome> {
        let current = self
            .current_for(user)?
            .ok_or(Precondition::NotInvited(user))?;
        let id = current.duel.id;
        let mine = current.participants.iter().find(|p| p.user_id == user);
        if mine.map(|p| p.status) == Some(ParticipantStatus::Accepted) {
            return Err(Precondition::AlreadyAccepted(user).into());
        }
        self.require_status(&current.duel, DuelStatus::Pending)?;
        if !self
            .ctx
            .store
            .set_participant_status(
                id,
                user,
                DuelStatus::Pending,
                &[ParticipantStatus::Invited],
                ParticipantStatus::Accepted,
            )
            .map_err(DuelError::Store)?
        {
            return Err(DuelError::Conflict);
        }
        tracing::info!(duel_id = id.0, user = user.0, "multiplayer invite accepted");
        let view = self.view(id)?;
        let starting = self.arm_start_if_ready(&view);
        Ok(AcceptOutcome { view, starting })
    }

    fn arm_start_if_ready(&self, view: &MultiDuelView) -> bool {
        if view.duel.status != DuelStatus::Pending || !view.everyone_accepted() {
            return false;
        }
        tracing::info!(duel_id = view.duel.id.0, "everyone accepted, start countdown armed");
        self.ctx.schedule(
            self.ctx.config.start_delay_secs,
            ScheduledAction::StartMulti(view.duel.id),
        );
        true
    }

    /// PENDING -> ONGOING, provided everyone still in the duel has accepted.
    pub fn start_multi(&self, id: DuelId) -> Result<Option<MultiDuelView>> {
        let view = self.view(id)?;
        if !view.everyone_accepted() {
            tracing::debug!(duel_id = id.0, "start skipped, not everyone accepted");
            return Ok(None);
        }
        let update = StatusUpdate::to(DuelStatus::Ongoing).started_at(self.ctx.now());
        if !self.transition(id, DuelStatus::Pending, update)? {
            return Ok(None);
        }
        self.view(id).map(Some)
    }

    pub fn expire_multi(&self, id: DuelId) -> Result<bool> {
        self.transition(id, DuelStatus::Pending, StatusUpdate::to(DuelStatus::Expired))
    }

    pub fn multidecline(&self, user: UserId) -> Result<LeaveOutcome> {
        let current = self
            .current_for(user)?
            .ok_or(Precondition::NotInvited(user))?;
        self.require_status(&current.duel, DuelStatus::Pending)?;
        let id = current.duel.id;
        self.leave(
            id,
            user,
            DuelStatus::Pending,
            &[ParticipantStatus::Invited, ParticipantStatus::Accepted],
        )?;
        let view = self.view(id)?;
        if view.remaining() < 2 {
            return self.call_off(view, DuelStatus::Pending, DuelStatus::Declined);
        }
        self.arm_start_if_ready(&view);
        Ok(LeaveOutcome {
            view,
            cancelled: false,
        })
    }

    pub fn multicancel(&self, user: UserId) -> Result<MultiDuelView> {
        let current = self
            .current_for(user)?
            .ok_or(Precondition::NotInDuel(user))?;
        self.require_status(&current.duel, DuelStatus::Pending)?;
        if current.duel.creator != user {
            return Err(Precondition::NotCreator(user).into());
        }
        let id = current.duel.id;
        if !self.transition(id, DuelStatus::Pending, StatusUpdate::to(DuelStatus::Withdrawn))? {
            return Err(DuelError::Conflict);
        }
        self.view(id)
    }

    pub fn multiwithdraw(&self, user: UserId) -> Result<LeaveOutcome> {
        let current = self
            .current_for(user)?
            .ok_or(Precondition::NotInDuel(user))?;
        self.require_status(&current.duel, DuelStatus::Ongoing)?;
        let id = current.duel.id;
        self.leave(id, user, DuelStatus::Ongoing, &[ParticipantStatus::Accepted])?;
        let view = self.view(id)?;
        if view.count(ParticipantStatus::Accepted) < 2 {
            return self.call_off(view, DuelStatus::Ongoing, DuelStatus::Withdrawn);
        }
        Ok(LeaveOutcome {
            view,
            cancelled: false,
        })
    }

    fn leave(
        &self,
        id: DuelId,
        user: UserId,
        duel_status: DuelStatus,
        from: &[ParticipantStatus],
    ) -> Result<()> {
        if !self
            .ctx
            .store
            .set_participant_status(id, user, duel_status, from, ParticipantStatus::Declined)
            .map_err(DuelError::Store)?
        {
            return Err(DuelError::Conflict);
        }
        tracing::info!(duel_id = id.0, user = user.0, "participant left");
        Ok(())
    }

    fn call_off(&self, view: MultiDuelView, from: DuelStatus, to: DuelStatus) -> Result<LeaveOutcome> {
        let id = view.duel.id;
        let cancelled = self.transition(id, from, StatusUpdate::to(to))?;
        let view = if cancelled { self.view(id)? } else { view };
        Ok(LeaveOutcome { view, cancelled })
    }

    pub fn multicomplete(&self, user: UserId) -> Result<MultiCompleteOutcome> {
        let current = self
            .current_for(user)?
            .ok_or(Precondition::NotInDuel(user))?;
        self.require_status(&current.duel, DuelStatus::Ongoing)?;
        let duel = &current.duel;
        let start = duel.start_time.unwrap_or(duel.issue_time);

        let accepted: Vec<UserId> = current
            .participants
            .iter()
            .filter(|p| p.status == ParticipantStatus::Accepted)
            .map(|p| p.user_id)
            .collect();
        let mut ratings = Vec::with_capacity(accepted.len());
        for user in &accepted {
            ratings.push(self.ctx.duelist(*user)?.rating);
        }
        let top = ratings.iter().copied().max().unwrap_or(self.ctx.config.default_rating);

        let mut standings = Vec::with_capacity(accepted.len());
        for (user, rating) in accepted.iter().zip(&ratings) {
            let handle = self.ctx.handle_of(*user)?;
            let submissions = self.ctx.feed.submissions(&handle).map_err(|err| {
                tracing::warn!(handle = %handle, error = %err, "submission feed failed");
                DuelError::External(err)
            })?;
            let bonus = if duel.no_handicap {
                0.0
            } else {
                handicap(*rating, top, self.ctx.config.handicap_secs_per_100).0
            };

            let mut problems_solved = 0;
            let mut total_time = 0.0;
            for assignment in &current.problems {
                let attempts: Vec<_> = submissions
                    .iter()
                    .filter(|s| s.problem.is_same_problem(&assignment.problem))
                    .filter(|s| s.creation_time >= start)
                    .collect();
                if attempts.iter().any(|s| s.verdict == Verdict::Testing) {
                    tracing::debug!(duel_id = duel.id.0, "completion deferred, submission in queue");
                    return Ok(MultiCompleteOutcome::PendingJudgement);
                }
                if let Some(first_ok) = attempts
                    .iter()
                    .filter(|s| s.verdict == Verdict::Ok)
                    .map(|s| s.creation_time)
                    .min()
                {
                    problems_solved += 1;
                    let offset = (first_ok - start).num_seconds() as f64;
                    total_time += adjusted_time(offset, bonus);
                }
            }
            standings.push(Standing {
                user_id: *user,
                problems_solved,
                total_time,
            });
        }

        let placements = rank_standings(standings, duel.duel_type, &self.ctx.config);
        let ratings_before = placements
            .iter()
            .map(|p| {
                accepted
                    .iter()
                    .position(|u| *u == p.user_id)
                    .map_or(self.ctx.config.default_rating, |i| ratings[i])
            })
            .collect();
        if !self
            .ctx
            .store
            .complete_multi(duel.id, self.ctx.now(), &placements)
            .map_err(DuelError::Store)?
        {
            tracing::debug!(duel_id = duel.id.0, "completion lost a race");
            return Err(DuelError::Conflict);
        }
        tracing::info!(
            duel_id = duel.id.0,
            from = %DuelStatus::Ongoing,
            to = %DuelStatus::Complete,
            participants = placements.len(),
            "multiplayer duel completed"
        );
        Ok(MultiCompleteOutcome::Completed(MultiResult {
            view: self.view(duel.id)?,
            placements,
            ratings_before,
        }))
    }

    /// Re-arms expiry for every PENDING multiplayer duel, and the start
    /// countdown for those whose participants have all accepted.
    pub fn rehydrate(&self) -> Result<usize> {
        let now = self.ctx.now();
        let pending = self
            .ctx
            .store
            .multis(&MultiFilter::default().with_status(&[DuelStatus::Pending]))
            .map_err(DuelError::Store)?;
        for duel in &pending {
            let waited = (now - duel.issue_time).num_seconds().max(0) as u64;
            let remaining = self.ctx.config.expiry_secs.saturating_sub(waited);
            self.ctx.schedule(remaining, ScheduledAction::ExpireMulti(duel.id));
            self.arm_start_if_ready(&self.view(duel.id)?);
        }
        tracing::info!(count = pending.len(), "pending multiplayer timers rehydrated");
        Ok(pending.len())
    }

    /// The PENDING or ONGOING multiplayer duel `user` has not declined.
    pub fn current_for(&self, user: UserId) -> Result<Option<MultiDuelView>> {
        let found = self
            .ctx
            .store
            .multis(&MultiFilter::participant(user).with_status(&DuelStatus::ACTIVE))
            .map_err(DuelError::Store)?;
        match found.first() {
            Some(duel) => self.view(duel.id).map(Some),
            None => Ok(None),
        }
    }

    pub fn view(&self, id: DuelId) -> Result<MultiDuelView> {
        let store = &self.ctx.store;
        let duel = store
            .multi(id)
            .map_err(DuelError::Store)?
            .ok_or_else(|| DuelError::Store(format!("multiplayer duel {} vanished", id)))?;
        Ok(MultiDuelView {
            duel,
            participants: store.participants(id).map_err(DuelError::Store)?,
            problems: store.problems(id).map_err(DuelError::Store)?,
        })
    }

    fn require_status(&self, duel: &MultiplayerDuel, expected: DuelStatus) -> Result<()> {
        if duel.status != expected {
            return Err(Precondition::WrongState {
                expected,
                actual: duel.status,
            }
            .into());
        }
        Ok(())
    }

    fn transition(&self, id: DuelId, from: DuelStatus, update: StatusUpdate) -> Result<bool> {
        let to = update.status;
        let moved = self
            .ctx
            .store
            .transition_multi(id, from, update)
            .map_err(DuelError::Store)?;
        if moved {
            tracing::info!(duel_id = id.0, %from, %to, "multiplayer transition");
        } else {
            tracing::debug!(duel_id = id.0, %from, %to, "multiplayer duel already moved on");
        }
        Ok(moved)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::Clock;
    use crate::duel::ChallengeOptions;
    use crate::fixtures::{arena_fixture, Fixture};
    use crate::store::DuelStore;
    use crate::types::{ProblemRef, Submission};
    use chrono::{DateTime, Duration, Utc};
    use std::collections::HashSet;

    fn submit(fx: &Fixture, user: UserId, problem: &ProblemRef, at: DateTime<Utc>, verdict: Verdict) {
        fx.feed.push(
            &fx.handle(user),
            Submission {
                problem: problem.clone(),
                verdict,
                creation_time: at,
            },
        );
    }

    fn plan(count: usize, rating: i32) -> MultiOptions {
        MultiOptions {
            plan: Some(ProblemPlan::Count { count: Some(count), rating: Some(rating) }),
            ..MultiOptions::default()
        }
    }

    fn started(fx: &Fixture, users: &[UserId], options: MultiOptions) -> MultiDuelView {
        let view = fx.multis.multistart(users[0], &users[1..], options).unwrap();
        for user in &users[1..] {
            fx.multis.multiaccept(*user).unwrap();
        }
        fx.clock.advance_secs(15);
        fx.multis.start_multi(view.duel.id).unwrap().unwrap()
    }

    #[test]
    fn multistart_invites_everyone_but_the_creator() {
        let fx = arena_fixture();
        let view = fx
            .multis
            .multistart(fx.alice, &[fx.bob, fx.carol, fx.bob], plan(2, 1000))
            .unwrap();
        assert_eq!(view.duel.status, DuelStatus::Pending);
        assert_eq!(view.participants.len(), 3);
        assert_eq!(view.participants[0].status, ParticipantStatus::Accepted);
        assert_eq!(view.count(ParticipantStatus::Invited), 2);
        assert_eq!(view.problems.len(), 2);
        assert_eq!(view.duel.target_rating, 1000);
        let names: HashSet<_> = view.problems.iter().map(|a| &a.problem.name).collect();
        assert_eq!(names.len(), 2);
        assert_eq!(
            fx.scheduler.drain(),
            vec![ScheduledAction::ExpireMulti(view.duel.id)]
        );
    }

    #[test]
    fn explicit_ratings_are_sorted_ascending() {
        let fx = arena_fixture();
        let options = MultiOptions {
            plan: Some(ProblemPlan::Ratings(vec![1400, 900, 1210])),
            ..MultiOptions::default()
        };
        let view = fx.multis.multistart(fx.alice, &[fx.bob], options).unwrap();
        let ratings: Vec<_> = view.problems.iter().map(|a| a.problem.rating).collect();
        assert_eq!(ratings, vec![Some(900), Some(1200), Some(1400)]);
        let orders: Vec<_> = view.problems.iter().map(|a| a.order).collect();
        assert_eq!(orders, vec![1, 2, 3]);
        assert_eq!(view.duel.target_rating, 1166);
    }

    #[test]
    fn multistart_bounds() {
        let fx = arena_fixture();
        assert_eq!(
            fx.multis.multistart(fx.alice, &[], MultiOptions::default()).unwrap_err(),
            Precondition::ParticipantCount { min: 2, max: 10, got: 1 }.into()
        );
        assert_eq!(
            fx.multis.multistart(fx.alice, &[fx.bob], plan(6, 1000)).unwrap_err(),
            Precondition::ProblemCount { max: 5, got: 6 }.into()
        );
        let too_many: Vec<UserId> = (10..20).map(UserId).collect();
        assert!(matches!(
            fx.multis.multistart(fx.alice, &too_many, MultiOptions::default()).unwrap_err(),
            DuelError::Precondition(Precondition::ParticipantCount { got: 11, .. })
        ));
    }

    #[test]
    fn busy_users_cannot_be_pulled_into_another_duel() {
        let fx = arena_fixture();
        fx.duels.challenge(fx.alice, fx.bob, ChallengeOptions::default()).unwrap();
        assert_eq!(
            fx.multis.multistart(fx.carol, &[fx.bob], MultiOptions::default()).unwrap_err(),
            Precondition::AlreadyInDuel(fx.bob).into()
        );
        fx.multis.multistart(fx.carol, &[fx.dave], MultiOptions::default()).unwrap();
        assert_eq!(
            fx.multis.multistart(fx.erin, &[fx.dave], MultiOptions::default()).unwrap_err(),
            Precondition::AlreadyInDuel(fx.dave).into()
        );
        assert_eq!(
            fx.duels.challenge(fx.erin, fx.carol, ChallengeOptions::default()).unwrap_err(),
            Precondition::AlreadyInDuel(fx.carol).into()
        );
    }

    #[test]
    fn last_accept_arms_the_start() {
        let fx = arena_fixture();
        let view = fx.multis.multistart(fx.alice, &[fx.bob, fx.carol], plan(1, 1000)).unwrap();
        fx.scheduler.drain();
        let first = fx.multis.multiaccept(fx.bob).unwrap();
        assert!(!first.starting);
        assert_eq!(fx.multis.multiaccept(fx.bob).unwrap_err(), Precondition::AlreadyAccepted(fx.bob).into());
        assert_eq!(fx.multis.start_multi(view.duel.id).unwrap(), None);

        let last = fx.multis.multiaccept(fx.carol).unwrap();
        assert!(last.starting);
        assert_eq!(fx.scheduler.drain(), vec![ScheduledAction::StartMulti(view.duel.id)]);
        let started = fx.multis.start_multi(view.duel.id).unwrap().unwrap();
        assert_eq!(started.duel.status, DuelStatus::Ongoing);
        assert_eq!(started.duel.start_time, Some(fx.clock.now()));
        assert!(!fx.multis.expire_multi(view.duel.id).unwrap());
        assert_eq!(fx.multis.start_multi(view.duel.id).unwrap(), None);
        assert_eq!(fx.multis.multiaccept(fx.dave).unwrap_err(), Precondition::NotInvited(fx.dave).into());
    }

    #[test]
    fn declines_below_two_cancel_the_duel() {
        let fx = arena_fixture();
        let view = fx.multis.multistart(fx.alice, &[fx.bob, fx.carol], plan(1, 1000)).unwrap();
        fx.multis.multiaccept(fx.bob).unwrap();
        fx.scheduler.drain();

        let first = fx.multis.multidecline(fx.carol).unwrap();
        assert!(!first.cancelled);
        // Everyone left has accepted now.
        assert_eq!(fx.scheduler.drain(), vec![ScheduledAction::StartMulti(view.duel.id)]);
        // A decliner is free again.
        fx.duels.challenge(fx.carol, fx.dave, ChallengeOptions::default()).unwrap();

        let second = fx.multis.multidecline(fx.bob).unwrap();
        assert!(second.cancelled);
        assert_eq!(second.view.duel.status, DuelStatus::Declined);
        assert_eq!(fx.multis.start_multi(view.duel.id).unwrap(), None);
    }

    #[test]
    fn cancel_is_creator_only_and_pending_only() {
        let fx = arena_fixture();
        fx.multis.multistart(fx.alice, &[fx.bob], plan(1, 1000)).unwrap();
        assert_eq!(fx.multis.multicancel(fx.bob).unwrap_err(), Precondition::NotCreator(fx.bob).into());
        assert_eq!(
            fx.multis.multiwithdraw(fx.alice).unwrap_err(),
            Precondition::WrongState { expected: DuelStatus::Ongoing, actual: DuelStatus::Pending }.into()
        );
        let cancelled = fx.multis.multicancel(fx.alice).unwrap();
        assert_eq!(cancelled.duel.status, DuelStatus::Withdrawn);
        assert_eq!(fx.multis.multicancel(fx.alice).unwrap_err(), Precondition::NotInDuel(fx.alice).into());
    }

    #[test]
    fn withdrawals_below_two_end_the_duel() {
        let fx = arena_fixture();
        let view = started(&fx, &[fx.alice, fx.bob, fx.carol], plan(1, 1000));
        assert_eq!(
            fx.multis.multidecline(fx.bob).unwrap_err(),
            Precondition::WrongState { expected: DuelStatus::Pending, actual: DuelStatus::Ongoing }.into()
        );
        assert!(!fx.multis.multiwithdraw(fx.bob).unwrap().cancelled);
        let last = fx.multis.multiwithdraw(fx.carol).unwrap();
        assert!(last.cancelled);
        assert_eq!(last.view.duel.status, DuelStatus::Withdrawn);
        assert_eq!(fx.store.multi(view.duel.id).unwrap().unwrap().status, DuelStatus::Withdrawn);
    }

    #[test]
    fn three_player_placements() {
        let fx = arena_fixture();
        let users = [fx.alice, fx.carol, fx.dave];
        let view = started(&fx, &users, MultiOptions { no_handicap: true, ..plan(2, 1000) });
        let start = view.duel.start_time.unwrap();
        let (p1, p2) = (&view.problems[0].problem, &view.problems[1].problem);
        // Submissions before the start never count.
        submit(&fx, fx.dave, p1, start - Duration::seconds(30), Verdict::Ok);
        submit(&fx, fx.alice, p1, start + Duration::seconds(100), Verdict::Ok);
        submit(&fx, fx.alice, p2, start + Duration::seconds(400), Verdict::Ok);
        submit(&fx, fx.carol, p2, start + Duration::seconds(50), Verdict::Ok);
        submit(&fx, fx.dave, p2, start + Duration::seconds(60), Verdict::Rejected);
        fx.clock.advance_secs(900);

        let MultiCompleteOutcome::Completed(result) = fx.multis.multicomplete(fx.dave).unwrap() else {
            panic!("duel should complete");
        };
        let summary: Vec<_> = result
            .placements
            .iter()
            .map(|p| (p.user_id, p.placement, p.problems_solved, p.rating_delta))
            .collect();
        assert_eq!(
            summary,
            vec![(fx.alice, 1, 2, 40), (fx.carol, 2, 1, 20), (fx.dave, 3, 0, -15)]
        );
        assert_eq!(result.placements[0].total_time, 500.0);
        assert_eq!(result.ratings_before, vec![1500, 1500, 1500]);
        assert_eq!(result.view.duel.status, DuelStatus::Complete);
        assert_eq!(result.view.duel.finish_time, Some(fx.clock.now()));
        assert_eq!(fx.store.duelist(fx.dave).unwrap().unwrap().rating, 1485);
        let stored = result.view.participants.iter().find(|p| p.user_id == fx.carol).unwrap();
        assert_eq!(stored.placement, Some(2));
        assert_eq!(stored.rating_delta, Some(20));
    }

    #[test]
    fn offline_feed_leaves_a_multiplayer_duel_untouched() {
        let fx = arena_fixture();
        let users = [fx.alice, fx.carol, fx.erin];
        let view = started(&fx, &users, plan(2, 1000));
        let start = view.duel.start_time.unwrap();
        submit(&fx, fx.carol, &view.problems[0].problem, start + Duration::seconds(90), Verdict::Ok);
        fx.clock.advance_secs(600);
        fx.feed.set_offline(true);

        let err = fx.multis.multicomplete(fx.carol).unwrap_err();
        assert!(matches!(err, DuelError::External(_)), "{err:?}");
        let stored = fx.store.multi(view.duel.id).unwrap().unwrap();
        assert_eq!(stored.status, DuelStatus::Ongoing);
        assert_eq!(stored.finish_time, None);
        for user in users {
            assert_eq!(fx.store.duelist(user).unwrap().unwrap().rating, 1500);
        }
        let after = fx.multis.view(view.duel.id).unwrap();
        assert!(after.participants.iter().all(|p| p.placement.is_none()));

        fx.feed.set_offline(false);
        assert!(matches!(
            fx.multis.multicomplete(fx.carol).unwrap(),
            MultiCompleteOutcome::Completed(_)
        ));
    }

    #[test]
    fn handicap_is_measured_against_the_top_rating() {
        let fx = arena_fixture();
        let view = started(&fx, &[fx.alice, fx.bob], plan(1, 1000));
        let start = view.duel.start_time.unwrap();
        let problem = &view.problems[0].problem;
        submit(&fx, fx.alice, problem, start + Duration::seconds(100), Verdict::Ok);
        submit(&fx, fx.bob, problem, start + Duration::seconds(50), Verdict::Ok);
        let MultiCompleteOutcome::Completed(result) = fx.multis.multicomplete(fx.alice).unwrap() else {
            panic!("duel should complete");
        };
        // 1500 vs 1700: alice's 100s become 40s.
        assert_eq!(result.placements[0].user_id, fx.alice);
        assert_eq!(result.placements[0].total_time, 40.0);
        assert_eq!(result.placements[1].total_time, 50.0);
    }

    #[test]
    fn testing_verdict_defers_multicomplete() {
        let fx = arena_fixture();
        let view = started(&fx, &[fx.alice, fx.bob], plan(1, 1000));
        let start = view.duel.start_time.unwrap();
        let problem = &view.problems[0].problem;
        submit(&fx, fx.bob, problem, start + Duration::seconds(10), Verdict::Testing);
        assert_eq!(fx.multis.multicomplete(fx.alice).unwrap(), MultiCompleteOutcome::PendingJudgement);
        assert_eq!(fx.store.multi(view.duel.id).unwrap().unwrap().status, DuelStatus::Ongoing);

        fx.feed.rejudge(&fx.handle(fx.bob), problem, Verdict::Testing, Verdict::Ok);
        assert!(matches!(
            fx.multis.multicomplete(fx.alice).unwrap(),
            MultiCompleteOutcome::Completed(_)
        ));
    }

    #[test]
    fn rehydrate_rearms_expiry_and_ready_starts() {
        let fx = arena_fixture();
        let view = fx.multis.multistart(fx.alice, &[fx.bob], plan(1, 1000)).unwrap();
        fx.multis.multiaccept(fx.bob).unwrap();
        fx.scheduler.drain();
        fx.clock.advance_secs(10);
        assert_eq!(fx.multis.rehydrate().unwrap(), 1);
        assert_eq!(
            fx.scheduler.drain(),
            vec![ScheduledAction::ExpireMulti(view.duel.id), ScheduledAction::StartMulti(view.duel.id)]
        );
    }
}
