use crate::adapter::{InMemoryCatalog, InMemoryFeed, StaticHandleResolver};
use crate::clock::ManualClock;
use crate::command::Arena;
use crate::config::DuelConfig;
use crate::context::{Collaborators, DuelContext};
use crate::duel::DuelOrchestrator;
use crate::multi::MultiplayerOrchestrator;
use crate::scheduler::ManualScheduler;
use crate::stats::Stats;
use crate::store::{DuelStore, InMemoryDuelStore};
use crate::types::{Handle, Problem, UserId};
use chrono::DateTime;
use std::sync::Arc;

pub const GUILD: u64 = 7;
const TAGS: [&str; 4] = ["dp", "math", "greedy", "graphs"];

pub struct Fixture {
    pub ctx: Arc<DuelContext>,
    pub store: Arc<InMemoryDuelStore>,
    pub feed: Arc<InMemoryFeed>,
    pub catalog: Arc<InMemoryCatalog>,
    pub scheduler: Arc<ManualScheduler>,
    pub clock: Arc<ManualClock>,
    pub duels: DuelOrchestrator,
    pub multis: MultiplayerOrchestrator,
    pub stats: Stats,
    pub alice: UserId,
    pub bob: UserId,
    pub carol: UserId,
    pub dave: UserId,
    pub erin: UserId,
    /// Listed in the config's moderators; not a duelist.
    pub moderator: UserId,
}

impl Fixture {
    pub fn handle(&self, user: UserId) -> Handle {
        Handle::new(format!("duelist{}", user.0))
    }

    pub fn arena(&self) -> Arena {
        Arena::new(self.ctx.clone(), GUILD)
    }
}

/// Four problems per hundred from 800 to 1600, contest ids from 1000 up,
/// all on index A. Five registered duelists: bob at 1700, the rest at 1500.
/// User 50 moderates.
pub fn arena_fixture() -> Fixture {
    let catalog = Arc::new(InMemoryCatalog::new());
    for (bucket, rating) in (800..=1600).step_by(100).enumerate() {
        for slot in 0..4 {
            let contest_id = 1000 + (bucket * 4 + slot) as u32;
            catalog.insert(Problem {
                contest_id,
                index: "A".to_string(),
                name: format!("Problem {}", contest_id),
                rating: Some(rating),
                tags: vec![TAGS[slot].to_string()],
                contest_start_time: DateTime::from_timestamp(1_500_000_000 + i64::from(contest_id) * 86_400, 0)
                    .unwrap(),
                authors: Vec::new(),
            });
        }
    }

    let store = Arc::new(InMemoryDuelStore::new());
    let feed = Arc::new(InMemoryFeed::new());
    let mut handles = StaticHandleResolver::new();
    let users = [(1, 1500, 1600), (2, 1700, 1900), (3, 1500, 1500), (4, 1500, 1650), (5, 1500, 1400)];
    for (id, rating, judge_rating) in users {
        let user = UserId(id);
        let handle = Handle::new(format!("duelist{}", id));
        store.register_duelist(user, rating).unwrap();
        handles.insert(user, handle.as_str());
        feed.set_rating(&handle, judge_rating);
    }

    let scheduler = Arc::new(ManualScheduler::new());
    let clock = Arc::new(ManualClock::at_timestamp(1_700_000_000));
    let collaborators = Collaborators {
        store: store.clone(),
        catalog: catalog.clone(),
        feed: feed.clone(),
        handles: Arc::new(handles),
        scheduler: scheduler.clone(),
        clock: clock.clone(),
    };
    let config = DuelConfig {
        moderators: vec![UserId(50)],
        ..DuelConfig::default()
    };
    let ctx = Arc::new(DuelContext::with_seed(collaborators, config, 7));

    Fixture {
        duels: DuelOrchestrator::new(ctx.clone()),
        multis: MultiplayerOrchestrator::new(ctx.clone()),
        stats: Stats::new(ctx.clone()),
        ctx,
        store,
        feed,
        catalog,
        scheduler,
        clock,
        alice: UserId(1),
        bob: UserId(2),
        carol: UserId(3),
        dave: UserId(4),
        erin: UserId(5),
        moderator: UserId(50),
    }
}
