use duel_engine::config::DuelConfig;
use duel_engine::rating::{rank_for, RatingReplay};
use duel_engine::types::{Duel, UserId};
use std::collections::HashMap;
use std::env;
use std::fs;
use std::path::Path;

fn parse_args() -> Result<HashMap<String, Vec<String>>, String> {
    let mut map: HashMap<String, Vec<String>> = HashMap::new();
    let mut args = env::args().skip(1);
    while let Some(arg) = args.next() {
        let Some(key) = arg.strip_prefix("--") else {
            return Err(format!("unexpected argument {arg}"));
        };
        let val = args
            .next()
            .ok_or_else(|| format!("missing value for --{key}"))?;
        map.entry(key.to_string()).or_default().push(val);
    }
    Ok(map)
}

fn load_duels(path: &str) -> Result<Vec<Duel>, String> {
    let raw = fs::read_to_string(path).map_err(|e| format!("failed reading duels: {e}"))?;
    let ext = Path::new(path)
        .extension()
        .and_then(|v| v.to_str())
        .unwrap_or_default()
        .to_ascii_lowercase();
    match ext.as_str() {
        "yaml" | "yml" => serde_yaml::from_str(&raw).map_err(|e| format!("yaml parse error: {e}")),
        "json" => serde_json::from_str(&raw).map_err(|e| format!("json parse error: {e}")),
        _ => Err(format!("unsupported duel log extension '{ext}'")),
    }
}

fn main() -> Result<(), String> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    let args = parse_args()?;
    let duels_path = args
        .get("duels")
        .and_then(|v| v.first())
        .ok_or_else(|| "--duels is required".to_string())?;
    let config = match args.get("config").and_then(|v| v.first()) {
        Some(path) => DuelConfig::from_path(path).map_err(|e| e.to_string())?,
        None => DuelConfig::default(),
    };
    let tracked = args
        .get("user")
        .map(|ids| {
            ids.iter()
                .map(|id| id.parse().map(UserId).map_err(|_| format!("invalid --user {id}")))
                .collect::<Result<Vec<_>, _>>()
        })
        .transpose()?
        .unwrap_or_default();

    let mut duels = load_duels(duels_path)?;
    duels.sort_by_key(|d| (d.finish_time, d.id));
    let mut replay = RatingReplay::new(&config);
    for duel in &duels {
        replay.apply(duel, &tracked);
    }
    tracing::info!(duels = duels.len(), ticks = replay.ticks(), "replay finished");

    let mut standings: Vec<(UserId, i32)> = replay.ratings().iter().map(|(u, r)| (*u, *r)).collect();
    standings.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
    println!("Replayed {} duels", duels.len());
    for (user, rating) in &standings {
        if !tracked.is_empty() && !tracked.contains(user) {
            continue;
        }
        println!("{:>8} {:>5} {}", user.0, rating, rank_for(*rating).title);
    }
    for user in &tracked {
        let path: Vec<String> = replay
            .history(*user)
            .iter()
            .map(|p| format!("{}@{}", p.rating, p.tick))
            .collect();
        if !path.is_empty() {
            println!("{}: {}", user.0, path.join(" "));
        }
    }
    Ok(())
}
