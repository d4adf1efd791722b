use crate::context::DuelContext;
use crate::error::{DuelError, Precondition, Result};
use crate::rating::{rank_for, DuelRank, RatingPoint, RatingReplay};
use crate::store::{DuelFilter, MultiFilter};
use crate::types::{Duel, DuelStatus, DuelType, MultiplayerDuel, UserId, Winner};
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq)]
pub struct Profile {
    pub user_id: UserId,
    pub rating: i32,
    pub rank: &'static DuelRank,
    pub wins: usize,
    pub losses: usize,
    pub draws: usize,
    /// Challenges this user declined.
    pub declined: usize,
    /// Challenges of this user that were declined.
    pub got_declined: usize,
    pub fastest_win: Option<Duel>,
    pub slowest_win: Option<Duel>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct HeadToHead {
    pub wins: usize,
    pub draws: usize,
    pub losses: usize,
    pub duels: Vec<Duel>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RankEntry {
    pub user_id: UserId,
    pub rating: i32,
    pub rank: &'static DuelRank,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RatingSeries {
    pub user_id: UserId,
    pub points: Vec<RatingPoint>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MultiHistoryEntry {
    pub duel: MultiplayerDuel,
    pub placement: u32,
    pub problems_solved: u32,
    pub total_time: f64,
    pub rating_delta: i32,
}

/// Read-only views over the duel store.
pub struct Stats {
    ctx: Arc<DuelContext>,
}

impl Stats {
    pub fn new(ctx: Arc<DuelContext>) -> Self {
        Self { ctx }
    }

    fn duels(&self, filter: DuelFilter) -> Result<Vec<Duel>> {
        self.ctx.store.duels(&filter).map_err(DuelError::Store)
    }

    fn completed(&self, filter: DuelFilter) -> Result<Vec<Duel>> {
        let mut duels = self.duels(filter.with_status(&[DuelStatus::Complete]))?;
        duels.sort_by(|a, b| b.finish_time.cmp(&a.finish_time).then(b.id.cmp(&a.id)));
        Ok(duels)
    }

    pub fn profile(&self, user: UserId) -> Result<Profile> {
        let rating = self.ctx.duelist(user)?.rating;
        let completed = self.completed(DuelFilter::involving(user))?;
        let mut wins: Vec<Duel> = completed
            .iter()
            .filter(|d| d.winner_id() == Some(user))
            .cloned()
            .collect();
        let losses = completed.iter().filter(|d| d.loser_id() == Some(user)).count();
        let draws = completed
            .iter()
            .filter(|d| d.winner == Some(Winner::Draw))
            .count();
        let declined = self
            .duels(DuelFilter::challengee(user).with_status(&[DuelStatus::Declined]))?
            .len();
        let got_declined = self
            .duels(DuelFilter::challenger(user).with_status(&[DuelStatus::Declined]))?
            .len();
        wins.sort_by_key(|d| d.duration_seconds().unwrap_or(0));
        Ok(Profile {
            user_id: user,
            rating,
            rank: rank_for(rating),
            wins: wins.len(),
            losses,
            draws,
            declined,
            got_declined,
            fastest_win: wins.first().cloned(),
            slowest_win: wins.last().cloned(),
        })
    }

    /// Completed duels of `user`, newest first.
    pub fn history(&self, user: UserId) -> Result<Vec<Duel>> {
        self.completed(DuelFilter::involving(user))
    }

    /// Head-to-head record, counted from `user`'s side.
    pub fn vshistory(&self, user: UserId, other: UserId) -> Result<HeadToHead> {
        let duels = self.completed(DuelFilter::pair(user, other))?;
        let mut record = HeadToHead {
            wins: 0,
            draws: 0,
            losses: 0,
            duels: Vec::new(),
        };
        for duel in &duels {
            match duel.winner_id() {
                Some(winner) if winner == user => record.wins += 1,
                Some(_) => record.losses += 1,
                None => record.draws += 1,
            }
        }
        record.duels = duels;
        Ok(record)
    }

    pub fn recent(&self) -> Result<Vec<Duel>> {
        let mut duels = self.completed(DuelFilter::all())?;
        duels.truncate(self.ctx.config.recent_limit);
        Ok(duels)
    }

    pub fn ongoing(&self) -> Result<Vec<Duel>> {
        let mut duels = self.duels(DuelFilter::all().with_status(&DuelStatus::ACTIVE))?;
        duels.sort_by_key(|d| (d.issue_time, d.id));
        Ok(duels)
    }

    /// Duelists with at least one completed duel, best first.
    pub fn ranklist(&self) -> Result<Vec<RankEntry>> {
        let completed = self.duels(DuelFilter::all().with_status(&[DuelStatus::Complete]))?;
        let mut entries: Vec<RankEntry> = self
            .ctx
            .store
            .duelists()
            .map_err(DuelError::Store)?
            .into_iter()
            .filter(|d| completed.iter().any(|duel| duel.involves(d.user_id)))
            .map(|d| RankEntry {
                user_id: d.user_id,
                rating: d.rating,
                rank: rank_for(d.rating),
            })
            .collect();
        entries.sort_by(|a, b| b.rating.cmp(&a.rating).then(a.user_id.cmp(&b.user_id)));
        Ok(entries)
    }

    /// Replays every completed official 1v1 duel in finish order and returns
    /// the trajectory of each requested user who took part in one.
    pub fn rating_history(&self, users: &[UserId]) -> Result<Vec<RatingSeries>> {
        let max = self.ctx.config.max_rating_plot_users;
        if users.len() > max {
            return Err(Precondition::TooManyUsers { max }.into());
        }
        let mut duels: Vec<Duel> = self
            .duels(DuelFilter::all().with_status(&[DuelStatus::Complete]))?
            .into_iter()
            .filter(|d| d.duel_type == DuelType::Official)
            .collect();
        duels.sort_by_key(|d| (d.finish_time, d.id));

        let mut replay = RatingReplay::new(&self.ctx.config);
        for duel in &duels {
            replay.apply(duel, users);
        }
        Ok(users
            .iter()
            .filter(|u| !replay.history(**u).is_empty())
            .map(|u| RatingSeries {
                user_id: *u,
                points: replay.history(*u).to_vec(),
            })
            .collect())
    }

    pub fn multihistory(&self, user: UserId) -> Result<Vec<MultiHistoryEntry>> {
        let mut entries = Vec::new();
        for duel in self
            .ctx
            .store
            .multis(&MultiFilter::participant(user).with_status(&[DuelStatus::Complete]))
            .map_err(DuelError::Store)?
        {
            let participants = self.ctx.store.participants(duel.id).map_err(DuelError::Store)?;
            let Some(row) = participants.into_iter().find(|p| p.user_id == user) else {
                continue;
            };
            let Some(placement) = row.placement else {
                continue;
            };
            entries.push(MultiHistoryEntry {
                duel,
                placement,
                problems_solved: row.problems_solved,
                total_time: row.total_time,
                rating_delta: row.rating_delta.unwrap_or(0),
            });
        }
        entries.sort_by(|a, b| {
            b.duel
                .finish_time
                .cmp(&a.duel.finish_time)
                .then(b.duel.id.cmp(&a.duel.id))
        });
        entries.truncate(self.ctx.config.multihistory_limit);
        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::duel::{ChallengeOptions, CompleteOutcome, DrawOutcome};
    use crate::fixtures::{arena_fixture, Fixture};
    use crate::multi::{MultiCompleteOutcome, MultiOptions, ProblemPlan};
    use crate::store::DuelStore;
    use crate::types::{Submission, Verdict};
    use chrono::Duration;

    /// Plays a 1v1 where `winner` solves after `secs` seconds.
    fn play(fx: &Fixture, a: UserId, b: UserId, winner: UserId, secs: i64) -> Duel {
        let issued = fx.duels.challenge(a, b, ChallengeOptions::default()).unwrap();
        fx.duels.accept(b).unwrap();
        fx.clock.advance_secs(15);
        let duel = fx.duels.start(issued.duel.id).unwrap().unwrap();
        fx.feed.push(
            &fx.handle(winner),
            Submission {
                problem: duel.problem.clone(),
                verdict: Verdict::Ok,
                creation_time: duel.start_time.unwrap() + Duration::seconds(secs),
            },
        );
        fx.clock.advance_secs(secs + 5);
        let CompleteOutcome::Completed(result) = fx.duels.complete(a).unwrap() else {
            panic!("duel should complete");
        };
        result.duel
    }

    fn draw(fx: &Fixture, a: UserId, b: UserId) -> Duel {
        let issued = fx.duels.challenge(a, b, ChallengeOptions::default()).unwrap();
        fx.duels.accept(b).unwrap();
        fx.clock.advance_secs(15);
        fx.duels.start(issued.duel.id).unwrap().unwrap();
        fx.clock.advance_secs(600);
        fx.duels.draw(a).unwrap();
        let DrawOutcome::Accepted { result, .. } = fx.duels.draw(b).unwrap() else {
            panic!("draw should be accepted");
        };
        result.duel
    }

    #[test]
    fn profile_counts_outcomes_and_win_speeds() {
        let fx = arena_fixture();
        play(&fx, fx.alice, fx.bob, fx.alice, 100);
        play(&fx, fx.alice, fx.carol, fx.alice, 700);
        play(&fx, fx.dave, fx.alice, fx.dave, 50);
        draw(&fx, fx.alice, fx.bob);
        fx.duels.challenge(fx.alice, fx.carol, ChallengeOptions::default()).unwrap();
        fx.duels.decline(fx.carol).unwrap();
        fx.duels.challenge(fx.erin, fx.alice, ChallengeOptions::default()).unwrap();
        fx.duels.decline(fx.alice).unwrap();

        let profile = fx.stats.profile(fx.alice).unwrap();
        assert_eq!((profile.wins, profile.losses, profile.draws), (2, 1, 1));
        assert_eq!((profile.declined, profile.got_declined), (1, 1));
        assert_eq!(profile.fastest_win.unwrap().duration_seconds(), Some(100));
        assert_eq!(profile.slowest_win.unwrap().duration_seconds(), Some(700));
        assert_eq!(profile.rank.title, rank_for(profile.rating).title);
        assert_eq!(
            fx.stats.profile(UserId(404)).unwrap_err(),
            Precondition::NotDuelist(UserId(404)).into()
        );
    }

    #[test]
    fn history_and_head_to_head() {
        let fx = arena_fixture();
        let first = play(&fx, fx.alice, fx.bob, fx.bob, 100);
        play(&fx, fx.alice, fx.carol, fx.alice, 100);
        let last = play(&fx, fx.bob, fx.alice, fx.alice, 100);

        let history = fx.stats.history(fx.alice).unwrap();
        assert_eq!(history.len(), 3);
        assert_eq!(history[0].id, last.id);
        assert_eq!(history[2].id, first.id);

        let vs = fx.stats.vshistory(fx.alice, fx.bob).unwrap();
        assert_eq!((vs.wins, vs.draws, vs.losses), (1, 0, 1));
        assert_eq!(vs.duels.len(), 2);
    }

    #[test]
    fn recent_and_ongoing() {
        let fx = arena_fixture();
        play(&fx, fx.alice, fx.bob, fx.bob, 100);
        fx.duels.challenge(fx.carol, fx.dave, ChallengeOptions::default()).unwrap();
        assert_eq!(fx.stats.recent().unwrap().len(), 1);
        let ongoing = fx.stats.ongoing().unwrap();
        assert_eq!(ongoing.len(), 1);
        assert_eq!(ongoing[0].challenger, fx.carol);
    }

    #[test]
    fn ranklist_lists_only_active_duelists() {
        let fx = arena_fixture();
        play(&fx, fx.alice, fx.carol, fx.carol, 100);
        let ranks = fx.stats.ranklist().unwrap();
        let users: Vec<UserId> = ranks.iter().map(|r| r.user_id).collect();
        assert_eq!(users, vec![fx.carol, fx.alice]);
        assert!(ranks[0].rating > ranks[1].rating);
    }

    #[test]
    fn rating_history_replays_official_duels_only() {
        let fx = arena_fixture();
        play(&fx, fx.alice, fx.carol, fx.alice, 100);
        play(&fx, fx.carol, fx.dave, fx.dave, 100);
        play(&fx, fx.dave, fx.alice, fx.alice, 100);

        let series = fx.stats.rating_history(&[fx.alice, fx.erin]).unwrap();
        assert_eq!(series.len(), 1);
        let points: Vec<usize> = series[0].points.iter().map(|p| p.tick).collect();
        assert_eq!(points, vec![0, 1]);
        assert_eq!(
            series[0].points.last().unwrap().rating,
            fx.store.duelist(fx.alice).unwrap().unwrap().rating
        );

        let six: Vec<UserId> = (1..=6).map(UserId).collect();
        assert_eq!(
            fx.stats.rating_history(&six).unwrap_err(),
            Precondition::TooManyUsers { max: 5 }.into()
        );
    }

    #[test]
    fn multihistory_reports_placements() {
        let fx = arena_fixture();
        let options = MultiOptions {
            plan: Some(ProblemPlan::Count { count: Some(1), rating: Some(1000) }),
            ..MultiOptions::default()
        };
        let view = fx.multis.multistart(fx.alice, &[fx.carol], options).unwrap();
        fx.multis.multiaccept(fx.carol).unwrap();
        fx.clock.advance_secs(15);
        let view = fx.multis.start_multi(view.duel.id).unwrap().unwrap();
        fx.feed.push(
            &fx.handle(fx.carol),
            Submission {
                problem: view.problems[0].problem.clone(),
                verdict: Verdict::Ok,
                creation_time: view.duel.start_time.unwrap() + Duration::seconds(42),
            },
        );
        let MultiCompleteOutcome::Completed(_) = fx.multis.multicomplete(fx.alice).unwrap() else {
            panic!("duel should complete");
        };

        let history = fx.stats.multihistory(fx.alice).unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].placement, 2);
        assert_eq!(history[0].rating_delta, -15);
        let winner = fx.stats.multihistory(fx.carol).unwrap();
        assert_eq!((winner[0].placement, winner[0].total_time), (1, 42.0));
    }
}
