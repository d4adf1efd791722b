use crate::rating::Placement;
use crate::types::{
    Duel, DuelId, DuelStatus, DuelType, Duelist, MultiplayerDuel, Participant, ParticipantStatus,
    ProblemAssignment, ProblemRef, UserId, Winner,
};
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

#[derive(Debug, Clone, PartialEq)]
pub struct NewDuel {
    pub challenger: UserId,
    pub challengee: UserId,
    pub issue_time: DateTime<Utc>,
    pub problem: ProblemRef,
    pub duel_type: DuelType,
    pub no_handicap: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewMultiplayerDuel {
    pub creator: UserId,
    pub guild_id: u64,
    pub issue_time: DateTime<Utc>,
    pub num_problems: u8,
    pub target_rating: i32,
    pub duel_type: DuelType,
    pub no_handicap: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DuelFilter {
    pub involving: Option<UserId>,
    pub challenger: Option<UserId>,
    pub challengee: Option<UserId>,
    pub pair: Option<(UserId, UserId)>,
    pub statuses: Vec<DuelStatus>,
}

impl DuelFilter {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn involving(user: UserId) -> Self {
        Self {
            involving: Some(user),
            ..Self::default()
        }
    }

    pub fn challenger(user: UserId) -> Self {
        Self {
            challenger: Some(user),
            ..Self::default()
        }
    }

    pub fn challengee(user: UserId) -> Self {
        Self {
            challengee: Some(user),
            ..Self::default()
        }
    }

    pub fn pair(a: UserId, b: UserId) -> Self {
        Self {
            pair: Some((a, b)),
            ..Self::default()
        }
    }

    pub fn with_status(mut self, statuses: &[DuelStatus]) -> Self {
        self.statuses = statuses.to_vec();
        self
    }

    pub fn matches(&self, duel: &Duel) -> bool {
        self.involving.map_or(true, |u| duel.involves(u))
            && self.challenger.map_or(true, |u| duel.challenger == u)
            && self.challengee.map_or(true, |u| duel.challengee == u)
            && self.pair.map_or(true, |(a, b)| duel.involves(a) && duel.involves(b))
            && (self.statuses.is_empty() || self.statuses.contains(&duel.status))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MultiFilter {
    /// Only duels where this user holds a participant row that is not DECLINED.
    pub participant: Option<UserId>,
    pub statuses: Vec<DuelStatus>,
}

impl MultiFilter {
    pub fn participant(user: UserId) -> Self {
        Self {
            participant: Some(user),
            ..Self::default()
        }
    }

    pub fn with_status(mut self, statuses: &[DuelStatus]) -> Self {
        self.statuses = statuses.to_vec();
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StatusUpdate {
    pub status: DuelStatus,
    pub start_time: Option<DateTime<Utc>>,
    pub finish_time: Option<DateTime<Utc>>,
}

impl StatusUpdate {
    pub fn to(status: DuelStatus) -> Self {
        Self {
            status,
            start_time: None,
            finish_time: None,
        }
    }

    pub fn started_at(mut self, at: DateTime<Utc>) -> Self {
        self.start_time = Some(at);
        self
    }

    pub fn finished_at(mut self, at: DateTime<Utc>) -> Self {
        self.finish_time = Some(at);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RatingChange {
    pub user: UserId,
    pub delta: i32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DuelCompletion {
    pub winner: Winner,
    pub finish_time: DateTime<Utc>,
    pub rating_changes: Vec<RatingChange>,
}

/// Persistence for duelists and duels.
///
/// Every lifecycle write is conditional on the entity's current status and
/// reports `Ok(false)` when that condition no longer holds.
pub trait DuelStore {
    fn register_duelist(&self, user: UserId, rating: i32) -> Result<bool, String>;
    fn duelist(&self, user: UserId) -> Result<Option<Duelist>, String>;
    fn duelists(&self) -> Result<Vec<Duelist>, String>;

    fn create_duel(&self, duel: NewDuel) -> Result<DuelId, String>;
    fn duel(&self, id: DuelId) -> Result<Option<Duel>, String>;
    fn duels(&self, filter: &DuelFilter) -> Result<Vec<Duel>, String>;
    fn transition_duel(
        &self,
        id: DuelId,
        from: DuelStatus,
        update: StatusUpdate,
    ) -> Result<bool, String>;
    /// ONGOING -> COMPLETE together with the rating changes it causes.
    fn complete_duel(&self, id: DuelId, completion: &DuelCompletion) -> Result<bool, String>;
    /// Records the first draw offer of an ONGOING duel.
    fn record_draw_offer(&self, id: DuelId, user: UserId) -> Result<bool, String>;
    /// Stamps the acceptance of a PENDING duel that has not been accepted yet.
    fn record_acceptance(&self, id: DuelId, at: DateTime<Utc>) -> Result<bool, String>;

    fn create_multi(&self, duel: NewMultiplayerDuel) -> Result<DuelId, String>;
    fn add_participant(
        &self,
        id: DuelId,
        user: UserId,
        status: ParticipantStatus,
    ) -> Result<(), String>;
    fn add_problem(&self, id: DuelId, assignment: ProblemAssignment) -> Result<(), String>;
    fn multi(&self, id: DuelId) -> Result<Option<MultiplayerDuel>, String>;
    fn multis(&self, filter: &MultiFilter) -> Result<Vec<MultiplayerDuel>, String>;
    fn participants(&self, id: DuelId) -> Result<Vec<Participant>, String>;
    fn problems(&self, id: DuelId) -> Result<Vec<ProblemAssignment>, String>;
    fn transition_multi(
        &self,
        id: DuelId,
        from: DuelStatus,
        update: StatusUpdate,
    ) -> Result<bool, String>;
    /// Moves `user` from one of `from` to `to` while the duel is in `duel_status`.
    fn set_participant_status(
        &self,
        id: DuelId,
        user: UserId,
        duel_status: DuelStatus,
        from: &[ParticipantStatus],
        to: ParticipantStatus,
    ) -> Result<bool, String>;
    /// ONGOING -> COMPLETE, writing every placement and applying its delta.
    fn complete_multi(
        &self,
        id: DuelId,
        finish_time: DateTime<Utc>,
        placements: &[Placement],
    ) -> Result<bool, String>;
}

#[derive(Debug, Default)]
struct StoreInner {
    duelists: BTreeMap<UserId, Duelist>,
    duels: BTreeMap<DuelId, Duel>,
    multis: BTreeMap<DuelId, MultiplayerDuel>,
    participants: BTreeMap<DuelId, Vec<Participant>>,
    problems: BTreeMap<DuelId, Vec<ProblemAssignment>>,
    next_id: u64,
}

impl StoreInner {
    fn allocate_id(&mut self) -> DuelId {
        self.next_id += 1;
        DuelId(self.next_id)
    }

    fn apply_delta(&mut self, user: UserId, delta: i32) -> Result<(), String> {
        let duelist = self
            .duelists
            .get_mut(&user)
            .ok_or_else(|| format!("{} is not a duelist", user))?;
        duelist.rating += delta;
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct InMemoryDuelStore {
    inner: Mutex<StoreInner>,
}

impl InMemoryDuelStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, StoreInner>, String> {
        self.inner
            .lock()
            .map_err(|_| "duel store lock poisoned".to_string())
    }
}

impl DuelStore for InMemoryDuelStore {
    fn register_duelist(&self, user: UserId, rating: i32) -> Result<bool, String> {
        let mut inner = self.lock()?;
        if inner.duelists.contains_key(&user) {
            return Ok(false);
        }
        inner.duelists.insert(user, Duelist { user_id: user, rating });
        Ok(true)
    }

    fn duelist(&self, user: UserId) -> Result<Option<Duelist>, String> {
        Ok(self.lock()?.duelists.get(&user).copied())
    }

    fn duelists(&self) -> Result<Vec<Duelist>, String> {
        Ok(self.lock()?.duelists.values().copied().collect())
    }

    fn create_duel(&self, duel: NewDuel) -> Result<DuelId, String> {
        let mut inner = self.lock()?;
        let id = inner.allocate_id();
        inner.duels.insert(
            id,
            Duel {
                id,
                challenger: duel.challenger,
                challengee: duel.challengee,
                issue_time: duel.issue_time,
                start_time: None,
                finish_time: None,
                problem: duel.problem,
                status: DuelStatus::Pending,
                duel_type: duel.duel_type,
                no_handicap: duel.no_handicap,
                winner: None,
                pending_drawer: None,
                accepted_at: None,
            },
        );
        Ok(id)
    }

    fn duel(&self, id: DuelId) -> Result<Option<Duel>, String> {
        Ok(self.lock()?.duels.get(&id).cloned())
    }

    fn duels(&self, filter: &DuelFilter) -> Result<Vec<Duel>, String> {
        Ok(self
            .lock()?
            .duels
            .values()
            .filter(|d| filter.matches(d))
            .cloned()
            .collect())
    }

    fn transition_duel(
        &self,
        id: DuelId,
        from: DuelStatus,
        update: StatusUpdate,
    ) -> Result<bool, String> {
        let mut inner = self.lock()?;
        let Some(duel) = inner.duels.get_mut(&id) else {
            return Ok(false);
        };
        if duel.status != from {
            return Ok(false);
        }
        duel.status = update.status;
        if update.start_time.is_some() {
            duel.start_time = update.start_time;
        }
        if update.finish_time.is_some() {
            duel.finish_time = update.finish_time;
        }
        Ok(true)
    }

    fn complete_duel(&self, id: DuelId, completion: &DuelCompletion) -> Result<bool, String> {
        let mut inner = self.lock()?;
        match inner.duels.get(&id) {
            Some(duel) if duel.status == DuelStatus::Ongoing => {}
            _ => return Ok(false),
        }
        for change in &completion.rating_changes {
            if !inner.duelists.contains_key(&change.user) {
                return Err(format!("{} is not a duelist", change.user));
            }
        }
        for change in &completion.rating_changes {
            inner.apply_delta(change.user, change.delta)?;
        }
        if let Some(duel) = inner.duels.get_mut(&id) {
            duel.status = DuelStatus::Complete;
            duel.winner = Some(completion.winner);
            duel.finish_time = Some(completion.finish_time);
            duel.pending_drawer = None;
        }
        Ok(true)
    }

    fn record_draw_offer(&self, id: DuelId, user: UserId) -> Result<bool, String> {
        let mut inner = self.lock()?;
        match inner.duels.get_mut(&id) {
            Some(duel) if duel.status == DuelStatus::Ongoing && duel.pending_drawer.is_none() => {
                duel.pending_drawer = Some(user);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    fn record_acceptance(&self, id: DuelId, at: DateTime<Utc>) -> Result<bool, String> {
        let mut inner = self.lock()?;
        match inner.duels.get_mut(&id) {
            Some(duel) if duel.status == DuelStatus::Pending && duel.accepted_at.is_none() => {
                duel.accepted_at = Some(at);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    fn create_multi(&self, duel: NewMultiplayerDuel) -> Result<DuelId, String> {
        let mut inner = self.lock()?;
        let id = inner.allocate_id();
        inner.multis.insert(
            id,
            MultiplayerDuel {
                id,
                creator: duel.creator,
                guild_id: duel.guild_id,
                issue_time: duel.issue_time,
                start_time: None,
                finish_time: None,
                num_problems: duel.num_problems,
                target_rating: duel.target_rating,
                status: DuelStatus::Pending,
                duel_type: duel.duel_type,
                no_handicap: duel.no_handicap,
            },
        );
        inner.participants.insert(id, Vec::new());
        inner.problems.insert(id, Vec::new());
        Ok(id)
    }

    fn add_participant(
        &self,
        id: DuelId,
        user: UserId,
        status: ParticipantStatus,
    ) -> Result<(), String> {
        let mut inner = self.lock()?;
        let rows = inner
            .participants
            .get_mut(&id)
            .ok_or_else(|| format!("multiplayer duel {} not found", id))?;
        if rows.iter().any(|p| p.user_id == user) {
            return Err(format!("{} already takes part in duel {}", user, id));
        }
        rows.push(Participant::new(user, status));
        Ok(())
    }

    fn add_problem(&self, id: DuelId, assignment: ProblemAssignment) -> Result<(), String> {
        let mut inner = self.lock()?;
        let rows = inner
            .problems
            .get_mut(&id)
            .ok_or_else(|| format!("multiplayer duel {} not found", id))?;
        rows.push(assignment);
        rows.sort_by_key(|a| a.order);
        Ok(())
    }

    fn multi(&self, id: DuelId) -> Result<Option<MultiplayerDuel>, String> {
        Ok(self.lock()?.multis.get(&id).cloned())
    }

    fn multis(&self, filter: &MultiFilter) -> Result<Vec<MultiplayerDuel>, String> {
        let inner = self.lock()?;
        Ok(inner
            .multis
            .values()
            .filter(|m| filter.statuses.is_empty() || filter.statuses.contains(&m.status))
            .filter(|m| {
                filter.participant.map_or(true, |user| {
                    inner.participants.get(&m.id).is_some_and(|rows| {
                        rows.iter().any(|p| {
                            p.user_id == user && p.status != ParticipantStatus::Declined
                        })
                    })
                })
            })
            .cloned()
            .collect())
    }

    fn participants(&self, id: DuelId) -> Result<Vec<Participant>, String> {
        Ok(self
            .lock()?
            .participants
            .get(&id)
            .cloned()
            .unwrap_or_default())
    }

    fn problems(&self, id: DuelId) -> Result<Vec<ProblemAssignment>, String> {
        Ok(self.lock()?.problems.get(&id).cloned().unwrap_or_default())
    }

    fn transition_multi(
        &self,
        id: DuelId,
        from: DuelStatus,
        update: StatusUpdate,
    ) -> Result<bool, String> {
        let mut inner = self.lock()?;
        let Some(duel) = inner.multis.get_mut(&id) else {
            return Ok(false);
        };
        if duel.status != from {
            return Ok(false);
        }
        duel.status = update.status;
        if update.start_time.is_some() {
            duel.start_time = update.start_time;
        }
        if update.finish_time.is_some() {
            duel.finish_time = update.finish_time;
        }
        Ok(true)
    }

    fn set_participant_status(
        &self,
        id: DuelId,
        user: UserId,
        duel_status: DuelStatus,
        from: &[ParticipantStatus],
        to: ParticipantStatus,
    ) -> Result<bool, String> {
        let mut inner = self.lock()?;
        if inner.multis.get(&id).map(|m| m.status) != Some(duel_status) {
            return Ok(false);
        }
        let Some(row) = inner
            .participants
            .get_mut(&id)
            .and_then(|rows| rows.iter_mut().find(|p| p.user_id == user))
        else {
            return Ok(false);
        };
        if !from.contains(&row.status) {
            return Ok(false);
        }
        row.status = to;
        Ok(true)
    }

    fn complete_multi(
        &self,
        id: DuelId,
        finish_time: DateTime<Utc>,
        placements: &[Placement],
    ) -> Result<bool, String> {
        let mut inner = self.lock()?;
        match inner.multis.get(&id) {
            Some(duel) if duel.status == DuelStatus::Ongoing => {}
            _ => return Ok(false),
        }
        for placement in placements {
            if !inner.duelists.contains_key(&placement.user_id) {
                return Err(format!("{} is not a duelist", placement.user_id));
            }
        }
        for placement in placements {
            inner.apply_delta(placement.user_id, placement.rating_delta)?;
        }
        if let Some(rows) = inner.participants.get_mut(&id) {
            for placement in placements {
                if let Some(row) = rows.iter_mut().find(|p| p.user_id == placement.user_id) {
                    row.problems_solved = placement.problems_solved;
                    row.total_time = placement.total_time;
                    row.placement = Some(placement.placement);
                    row.rating_delta = Some(placement.rating_delta);
                }
            }
        }
        if let Some(duel) = inner.multis.get_mut(&id) {
            duel.status = DuelStatus::Complete;
            duel.finish_time = Some(finish_time);
        }
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(seconds: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(seconds, 0).unwrap()
    }

    fn new_duel(a: u64, b: u64) -> NewDuel {
        NewDuel {
            challenger: UserId(a),
            challengee: UserId(b),
            issue_time: at(0),
            problem: ProblemRef::new(1, "A", "Theatre Square", Some(1000)),
            duel_type: DuelType::Official,
            no_handicap: false,
        }
    }

    #[test]
    fn duelists_register_once() {
        let store = InMemoryDuelStore::new();
        assert!(store.register_duelist(UserId(1), 1500).unwrap());
        assert!(!store.register_duelist(UserId(1), 1200).unwrap());
        assert_eq!(store.duelist(UserId(1)).unwrap().unwrap().rating, 1500);
        assert!(store.duelist(UserId(2)).unwrap().is_none());
    }

    #[test]
    fn transitions_are_compare_and_set() {
        let store = InMemoryDuelStore::new();
        let id = store.create_duel(new_duel(1, 2)).unwrap();
        assert!(store
            .transition_duel(id, DuelStatus::Pending, StatusUpdate::to(DuelStatus::Ongoing).started_at(at(15)))
            .unwrap());
        assert!(!store
            .transition_duel(id, DuelStatus::Pending, StatusUpdate::to(DuelStatus::Expired))
            .unwrap());
        let duel = store.duel(id).unwrap().unwrap();
        assert_eq!(duel.status, DuelStatus::Ongoing);
        assert_eq!(duel.start_time, Some(at(15)));
        assert!(!store
            .transition_duel(DuelId(99), DuelStatus::Pending, StatusUpdate::to(DuelStatus::Expired))
            .unwrap());
    }

    #[test]
    fn acceptance_is_stamped_once_while_pending() {
        let store = InMemoryDuelStore::new();
        let id = store.create_duel(new_duel(1, 2)).unwrap();
        assert!(store.record_acceptance(id, at(5)).unwrap());
        assert!(!store.record_acceptance(id, at(9)).unwrap());
        assert_eq!(store.duel(id).unwrap().unwrap().accepted_at, Some(at(5)));

        let declined = store.create_duel(new_duel(3, 4)).unwrap();
        store
            .transition_duel(declined, DuelStatus::Pending, StatusUpdate::to(DuelStatus::Declined))
            .unwrap();
        assert!(!store.record_acceptance(declined, at(5)).unwrap());
        assert!(!store.record_acceptance(DuelId(99), at(5)).unwrap());
    }

    #[test]
    fn completion_applies_ratings_once() {
        let store = InMemoryDuelStore::new();
        store.register_duelist(UserId(1), 1500).unwrap();
        store.register_duelist(UserId(2), 1500).unwrap();
        let id = store.create_duel(new_duel(1, 2)).unwrap();
        store
            .transition_duel(id, DuelStatus::Pending, StatusUpdate::to(DuelStatus::Ongoing))
            .unwrap();
        let completion = DuelCompletion {
            winner: Winner::Challenger,
            finish_time: at(100),
            rating_changes: vec![
                RatingChange { user: UserId(1), delta: 30 },
                RatingChange { user: UserId(2), delta: -30 },
            ],
        };
        assert!(store.complete_duel(id, &completion).unwrap());
        assert!(!store.complete_duel(id, &completion).unwrap());
        assert_eq!(store.duelist(UserId(1)).unwrap().unwrap().rating, 1530);
        assert_eq!(store.duelist(UserId(2)).unwrap().unwrap().rating, 1470);
    }

    #[test]
    fn draw_offer_is_recorded_once_while_ongoing() {
        let store = InMemoryDuelStore::new();
        let id = store.create_duel(new_duel(1, 2)).unwrap();
        assert!(!store.record_draw_offer(id, UserId(1)).unwrap());
        store
            .transition_duel(id, DuelStatus::Pending, StatusUpdate::to(DuelStatus::Ongoing))
            .unwrap();
        assert!(store.record_draw_offer(id, UserId(1)).unwrap());
        assert!(!store.record_draw_offer(id, UserId(2)).unwrap());
        assert_eq!(store.duel(id).unwrap().unwrap().pending_drawer, Some(UserId(1)));
    }

    #[test]
    fn filters_select_by_role_pair_and_status() {
        let store = InMemoryDuelStore::new();
        let a = store.create_duel(new_duel(1, 2)).unwrap();
        store.create_duel(new_duel(3, 1)).unwrap();
        store
            .transition_duel(a, DuelStatus::Pending, StatusUpdate::to(DuelStatus::Declined))
            .unwrap();
        assert_eq!(store.duels(&DuelFilter::involving(UserId(1))).unwrap().len(), 2);
        assert_eq!(store.duels(&DuelFilter::challenger(UserId(1))).unwrap().len(), 1);
        assert_eq!(store.duels(&DuelFilter::pair(UserId(2), UserId(1))).unwrap().len(), 1);
        let active = DuelFilter::involving(UserId(1)).with_status(&DuelStatus::ACTIVE);
        let found = store.duels(&active).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].challenger, UserId(3));
    }

    fn new_multi() -> NewMultiplayerDuel {
        NewMultiplayerDuel {
            creator: UserId(1),
            guild_id: 7,
            issue_time: at(0),
            num_problems: 2,
            target_rating: 1200,
            duel_type: DuelType::Official,
            no_handicap: false,
        }
    }

    #[test]
    fn participant_updates_are_conditional() {
        let store = InMemoryDuelStore::new();
        let id = store.create_multi(new_multi()).unwrap();
        store.add_participant(id, UserId(1), ParticipantStatus::Accepted).unwrap();
        store.add_participant(id, UserId(2), ParticipantStatus::Invited).unwrap();
        assert!(store.add_participant(id, UserId(2), ParticipantStatus::Invited).is_err());

        let invited = [ParticipantStatus::Invited];
        assert!(!store
            .set_participant_status(id, UserId(2), DuelStatus::Ongoing, &invited, ParticipantStatus::Accepted)
            .unwrap());
        assert!(store
            .set_participant_status(id, UserId(2), DuelStatus::Pending, &invited, ParticipantStatus::Accepted)
            .unwrap());
        assert!(!store
            .set_participant_status(id, UserId(2), DuelStatus::Pending, &invited, ParticipantStatus::Accepted)
            .unwrap());

        store
            .set_participant_status(
                id,
                UserId(2),
                DuelStatus::Pending,
                &[ParticipantStatus::Accepted],
                ParticipantStatus::Declined,
            )
            .unwrap();
        assert!(store.multis(&MultiFilter::participant(UserId(2))).unwrap().is_empty());
        assert_eq!(store.multis(&MultiFilter::participant(UserId(1))).unwrap().len(), 1);
    }

    #[test]
    fn problems_are_kept_in_order() {
        let store = InMemoryDuelStore::new();
        let id = store.create_multi(new_multi()).unwrap();
        store
            .add_problem(id, ProblemAssignment { problem: ProblemRef::new(2, "B", "Two", Some(1300)), order: 2 })
            .unwrap();
        store
            .add_problem(id, ProblemAssignment { problem: ProblemRef::new(1, "A", "One", Some(1200)), order: 1 })
            .unwrap();
        let orders: Vec<u8> = store.problems(id).unwrap().iter().map(|p| p.order).collect();
        assert_eq!(orders, vec![1, 2]);
    }

    #[test]
    fn multi_completion_writes_placements_and_ratings() {
        let store = InMemoryDuelStore::new();
        store.register_duelist(UserId(1), 1500).unwrap();
        store.register_duelist(UserId(2), 1500).unwrap();
        let id = store.create_multi(new_multi()).unwrap();
        store.add_participant(id, UserId(1), ParticipantStatus::Accepted).unwrap();
        store.add_participant(id, UserId(2), ParticipantStatus::Accepted).unwrap();
        let placements = vec![
            Placement { user_id: UserId(2), placement: 1, problems_solved: 2, total_time: 90.0, rating_delta: 40 },
            Placement { user_id: UserId(1), placement: 2, problems_solved: 0, total_time: 0.0, rating_delta: -15 },
        ];
        assert!(!store.complete_multi(id, at(500), &placements).unwrap());
        store
            .transition_multi(id, DuelStatus::Pending, StatusUpdate::to(DuelStatus::Ongoing))
            .unwrap();
        assert!(store.complete_multi(id, at(500), &placements).unwrap());
        assert!(!store.complete_multi(id, at(501), &placements).unwrap());
        assert_eq!(store.duelist(UserId(2)).unwrap().unwrap().rating, 1540);
        assert_eq!(store.duelist(UserId(1)).unwrap().unwrap().rating, 1485);
        let rows = store.participants(id).unwrap();
        let winner = rows.iter().find(|p| p.user_id == UserId(2)).unwrap();
        assert_eq!(winner.placement, Some(1));
        assert_eq!(winner.problems_solved, 2);
        assert_eq!(store.multi(id).unwrap().unwrap().finish_time, Some(at(500)));
    }
}
