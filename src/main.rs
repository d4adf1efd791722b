use duel_engine::adapter::{InMemoryCatalog, InMemoryFeed, StaticHandleResolver};
use duel_engine::clock::SystemClock;
use duel_engine::scheduler::{drive_timers, TokioScheduler};
use duel_engine::store::{DuelFilter, DuelStore, InMemoryDuelStore, MultiFilter};
use duel_engine::types::{DuelStatus, Handle, Problem, Submission, UserId, Verdict};
use duel_engine::{Arena, Collaborators, DuelConfig, DuelContext};
use std::env;
use std::fs;
use std::sync::Arc;
use std::time::Duration;

const DEMO_SCRIPT: &str = "\
1 register
2 register
3 register
1 challenge <@2> 1200
2 accept
wait 2
2 solve
1 complete
3 challenge <@1>
1 decline
1 multistart <@2> <@3> count=2 rating=1000
2 multiaccept
3 multiaccept
wait 2
3 solve
1 multicomplete
1 profile
1 ranklist
1 rating <@1> <@2>
";

fn demo_catalog() -> InMemoryCatalog {
    let catalog = InMemoryCatalog::new();
    let tags = ["dp", "math", "greedy"];
    for (n, rating) in (800..=1600).step_by(100).enumerate() {
        for (slot, tag) in tags.iter().enumerate() {
            let contest_id = 1500 + (n * tags.len() + slot) as u32;
            catalog.insert(Problem {
                contest_id,
                index: "A".to_string(),
                name: format!("Demo problem {contest_id}"),
                rating: Some(rating),
                tags: vec![tag.to_string()],
                contest_start_time: chrono::DateTime::from_timestamp(
                    1_600_000_000 + i64::from(contest_id) * 3_600,
                    0,
                )
                .unwrap_or_default(),
                authors: Vec::new(),
            });
        }
    }
    catalog
}

fn parse_args() -> Result<(Option<String>, Option<String>), String> {
    let mut config = None;
    let mut script = None;
    let mut args = env::args().skip(1);
    while let Some(arg) = args.next() {
        let slot = match arg.as_str() {
            "--config" => &mut config,
            "--script" => &mut script,
            other => return Err(format!("unexpected argument {other}")),
        };
        *slot = Some(args.next().ok_or_else(|| format!("missing value for {arg}"))?);
    }
    Ok((config, script))
}

/// Marks `user`'s current problems as solved right now.
fn solve(store: &InMemoryDuelStore, feed: &InMemoryFeed, user: UserId) -> Result<(), String> {
    let handle = Handle::new(format!("demo{}", user.0));
    let now = chrono::Utc::now();
    let mut problems: Vec<_> = store
        .duels(&DuelFilter::involving(user).with_status(&[DuelStatus::Ongoing]))?
        .into_iter()
        .map(|d| d.problem)
        .collect();
    for multi in store.multis(&MultiFilter::participant(user).with_status(&[DuelStatus::Ongoing]))? {
        problems.extend(store.problems(multi.id)?.into_iter().map(|a| a.problem));
    }
    for problem in problems {
        feed.push(
            &handle,
            Submission {
                problem,
                verdict: Verdict::Ok,
                creation_time: now,
            },
        );
    }
    Ok(())
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), String> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let (config_path, script_path) = parse_args()?;
    let config = match config_path {
        Some(path) => DuelConfig::from_path(path).map_err(|e| e.to_string())?,
        None => DuelConfig {
            start_delay_secs: 1,
            ..DuelConfig::default()
        },
    };
    let script = match script_path {
        Some(path) => fs::read_to_string(&path).map_err(|e| format!("failed reading script: {e}"))?,
        None => DEMO_SCRIPT.to_string(),
    };

    let store = Arc::new(InMemoryDuelStore::new());
    let feed = Arc::new(InMemoryFeed::new());
    let mut handles = StaticHandleResolver::new();
    for id in 1..=4 {
        let handle = Handle::new(format!("demo{id}"));
        feed.set_rating(&handle, 1400 + 100 * id as i32);
        handles.insert(UserId(id), handle.as_str());
    }
    let (scheduler, timers) = TokioScheduler::channel(tokio::runtime::Handle::current());
    let ctx = Arc::new(DuelContext::new(
        Collaborators {
            store: store.clone(),
            catalog: Arc::new(demo_catalog()),
            feed: feed.clone(),
            handles: Arc::new(handles),
            scheduler: Arc::new(scheduler),
            clock: Arc::new(SystemClock),
        },
        config,
    ));
    let arena = Arc::new(Arena::new(ctx, 0));

    let driver = arena.clone();
    tokio::spawn(drive_timers(timers, move |action| {
        if let Some(reply) = driver.fire(action) {
            println!("[timer] {}", reply.text);
        }
    }));

    for line in script.lines().map(str::trim).filter(|l| !l.is_empty() && !l.starts_with('#')) {
        let (head, rest) = line.split_once(' ').unwrap_or((line, ""));
        if head == "wait" {
            let secs: u64 = rest.trim().parse().map_err(|_| format!("bad wait in `{line}`"))?;
            tokio::time::sleep(Duration::from_secs(secs)).await;
            continue;
        }
        let actor = UserId(head.parse().map_err(|_| format!("bad user in `{line}`"))?);
        if rest.trim() == "solve" {
            solve(&store, &feed, actor)?;
            continue;
        }
        let reply = arena.handle_line(actor, rest);
        let marker = if reply.ok { ">" } else { "!" };
        println!("{marker} {actor}: {rest}\n{}", reply.text);
    }
    Ok(())
}
