use crate::clock::Clock;
use crate::config::DuelConfig;
use crate::error::{DuelError, Precondition, Result};
use crate::judge::{HandleResolver, ProblemCatalog, SubmissionFeed};
use crate::scheduler::{ScheduledAction, Scheduler};
use crate::selector::{suggested_rating, ProblemSelector, SelectionConstraints};
use crate::store::{DuelFilter, DuelStore, MultiFilter};
use crate::types::{DuelStatus, Duelist, Handle, UserId, Verdict};
use chrono::{DateTime, Utc};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

/// Everything the orchestrators talk to.
#[derive(Clone)]
pub struct Collaborators {
    pub store: Arc<dyn DuelStore + Send + Sync>,
    pub catalog: Arc<dyn ProblemCatalog + Send + Sync>,
    pub feed: Arc<dyn SubmissionFeed + Send + Sync>,
    pub handles: Arc<dyn HandleResolver + Send + Sync>,
    pub scheduler: Arc<dyn Scheduler + Send + Sync>,
    pub clock: Arc<dyn Clock + Send + Sync>,
}

pub struct DuelContext {
    pub store: Arc<dyn DuelStore + Send + Sync>,
    pub catalog: Arc<dyn ProblemCatalog + Send + Sync>,
    pub feed: Arc<dyn SubmissionFeed + Send + Sync>,
    pub handles: Arc<dyn HandleResolver + Send + Sync>,
    pub scheduler: Arc<dyn Scheduler + Send + Sync>,
    pub clock: Arc<dyn Clock + Send + Sync>,
    pub config: DuelConfig,
    rng: Mutex<StdRng>,
}

impl DuelContext {
    pub fn new(collaborators: Collaborators, config: DuelConfig) -> Self {
        Self::with_rng(collaborators, config, StdRng::from_os_rng())
    }

    pub fn with_seed(collaborators: Collaborators, config: DuelConfig, seed: u64) -> Self {
        Self::with_rng(collaborators, config, StdRng::seed_from_u64(seed))
    }

    fn with_rng(collaborators: Collaborators, config: DuelConfig, rng: StdRng) -> Self {
        let Collaborators {
            store,
            catalog,
            feed,
            handles,
            scheduler,
            clock,
        } = collaborators;
        Self {
            store,
            catalog,
            feed,
            handles,
            scheduler,
            clock,
            config,
            rng: Mutex::new(rng),
        }
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    pub(crate) fn rng(&self) -> MutexGuard<'_, StdRng> {
        self.rng.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub(crate) fn selector(&self) -> ProblemSelector<'_> {
        ProblemSelector::new(self.catalog.as_ref(), self.config.rating_floor)
    }

    pub(crate) fn schedule(&self, delay_secs: u64, action: ScheduledAction) {
        self.scheduler.schedule(Duration::from_secs(delay_secs), action);
    }

    pub(crate) fn duelist(&self, user: UserId) -> Result<Duelist> {
        self.store
            .duelist(user)
            .map_err(DuelError::Store)?
            .ok_or_else(|| Precondition::NotDuelist(user).into())
    }

    /// Fails if `user` is in a PENDING or ONGOING duel of either kind.
    pub(crate) fn ensure_idle(&self, user: UserId) -> Result<()> {
        let busy_1v1 = !self
            .store
            .duels(&DuelFilter::involving(user).with_status(&DuelStatus::ACTIVE))
            .map_err(DuelError::Store)?
            .is_empty();
        let busy_multi = !self
            .store
            .multis(&MultiFilter::participant(user).with_status(&DuelStatus::ACTIVE))
            .map_err(DuelError::Store)?
            .is_empty();
        if busy_1v1 || busy_multi {
            return Err(Precondition::AlreadyInDuel(user).into());
        }
        Ok(())
    }

    pub(crate) fn handle_of(&self, user: UserId) -> Result<Handle> {
        self.handles.resolve(user).map_err(|err| {
            tracing::warn!(user = user.0, error = %err, "handle lookup failed");
            Precondition::NoHandle(user).into()
        })
    }

    pub(crate) fn handles_of(&self, users: &[UserId]) -> Result<Vec<Handle>> {
        users.iter().map(|u| self.handle_of(*u)).collect()
    }

    pub(crate) fn suggested_rating(&self, handles: &[Handle]) -> Result<i32> {
        let ratings = handles
            .iter()
            .map(|h| self.feed.judge_rating(h))
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|err| {
                tracing::warn!(error = %err, "judge rating lookup failed");
                DuelError::External(err)
            })?;
        Ok(suggested_rating(&ratings, &self.config))
    }

    /// Problems solved (any verdict but a compilation error) or already used
    /// in an earlier duel by any of `users` are excluded.
    pub(crate) fn selection_constraints(
        &self,
        users: &[UserId],
        handles: Vec<Handle>,
        include_tags: Vec<String>,
        exclude_tags: Vec<String>,
    ) -> Result<SelectionConstraints> {
        let mut excluded_names = HashSet::new();
        for handle in &handles {
            let submissions = self.feed.submissions(handle).map_err(|err| {
                tracing::warn!(handle = %handle, error = %err, "submission feed failed");
                DuelError::External(err)
            })?;
            excluded_names.extend(
                submissions
                    .into_iter()
                    .filter(|s| s.verdict != Verdict::CompilationError)
                    .map(|s| s.problem.name),
            );
        }
        for user in users {
            for duel in self
                .store
                .duels(&DuelFilter::involving(*user))
                .map_err(DuelError::Store)?
            {
                excluded_names.insert(duel.problem.name);
            }
            for multi in self
                .store
                .multis(&MultiFilter::participant(*user))
                .map_err(DuelError::Store)?
            {
                for assignment in self.store.problems(multi.id).map_err(DuelError::Store)? {
                    excluded_names.insert(assignment.problem.name);
                }
            }
        }
        Ok(SelectionConstraints {
            include_tags,
            exclude_tags,
            excluded_names,
            handles,
        })
    }
}
