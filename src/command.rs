use crate::context::DuelContext;
use crate::duel::{
    ChallengeIssued, ChallengeOptions, CompleteOutcome, DrawOutcome, DuelOrchestrator, DuelResult,
};
use crate::error::{DuelError, Result};
use crate::multi::{
    LeaveOutcome, MultiCompleteOutcome, MultiDuelView, MultiOptions, MultiplayerOrchestrator,
    ProblemPlan,
};
use crate::scheduler::ScheduledAction;
use crate::stats::Stats;
use crate::types::{Duel, ParticipantStatus, ProblemLink, UserId, Winner};
use std::fmt::Write as _;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("empty command")]
    Empty,
    #[error("unknown command `{0}`")]
    Unknown(String),
    #[error("`{command}` needs {what}")]
    Missing {
        command: &'static str,
        what: &'static str,
    },
    #[error("cannot understand `{0}`")]
    BadArgument(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Register(UserId),
    Challenge {
        challenger: UserId,
        challengee: UserId,
        options: ChallengeOptions,
    },
    Accept(UserId),
    Decline(UserId),
    Withdraw(UserId),
    Complete(UserId),
    Draw(UserId),
    Invalidate(UserId),
    ModInvalidate { moderator: UserId, target: UserId },
    Profile(UserId),
    History(UserId),
    VsHistory(UserId, UserId),
    Recent,
    Ongoing,
    Ranklist,
    Rating(Vec<UserId>),
    MultiStart {
        creator: UserId,
        invitees: Vec<UserId>,
        options: MultiOptions,
    },
    MultiAccept(UserId),
    MultiDecline(UserId),
    MultiCancel(UserId),
    MultiWithdraw(UserId),
    MultiComplete(UserId),
    MultiHistory(UserId),
}

fn parse_mention(token: &str) -> Option<UserId> {
    let inner = token.strip_prefix("<@")?.strip_suffix('>')?;
    inner.trim_start_matches('!').parse().ok().map(UserId)
}

fn parse_int(token: &str) -> std::result::Result<i32, ParseError> {
    token
        .trim()
        .parse()
        .map_err(|_| ParseError::BadArgument(token.to_string()))
}

impl Command {
    /// Parses one line such as `challenge <@2> 1400 +dp nohandicap` issued by `actor`.
    pub fn parse(actor: UserId, line: &str) -> std::result::Result<Self, ParseError> {
        let mut tokens = line.split_whitespace();
        let verb = tokens.next().ok_or(ParseError::Empty)?.to_ascii_lowercase();
        let mut mentions = Vec::new();
        let mut rest = Vec::new();
        for token in tokens {
            match parse_mention(token) {
                Some(user) => mentions.push(user),
                None => rest.push(token),
            }
        }
        let target = mentions.first().copied().unwrap_or(actor);

        let command = match verb.as_str() {
            "register" => Self::Register(target),
            "challenge" => {
                let challengee = *mentions.first().ok_or(ParseError::Missing {
                    command: "challenge",
                    what: "an opponent",
                })?;
                Self::Challenge {
                    challenger: actor,
                    challengee,
                    options: parse_challenge_options(&rest)?,
                }
            }
            "accept" => Self::Accept(actor),
            "decline" => Self::Decline(actor),
            "withdraw" => Self::Withdraw(actor),
            "complete" => Self::Complete(actor),
            "draw" => Self::Draw(actor),
            "invalidate" => Self::Invalidate(actor),
            "modinvalidate" => Self::ModInvalidate {
                moderator: actor,
                target: *mentions.first().ok_or(ParseError::Missing {
                    command: "modinvalidate",
                    what: "a duelist",
                })?,
            },
            "profile" => Self::Profile(target),
            "history" => Self::History(target),
            "vshistory" => {
                let first = *mentions.first().ok_or(ParseError::Missing {
                    command: "vshistory",
                    what: "one or two duelists",
                })?;
                Self::VsHistory(first, mentions.get(1).copied().unwrap_or(actor))
            }
            "recent" => Self::Recent,
            "ongoing" => Self::Ongoing,
            "ranklist" => Self::Ranklist,
            "rating" => Self::Rating(if mentions.is_empty() { vec![actor] } else { mentions }),
            "multistart" => Self::MultiStart {
                creator: actor,
                invitees: mentions,
                options: parse_multi_options(&rest)?,
            },
            "multiaccept" => Self::MultiAccept(actor),
            "multidecline" => Self::MultiDecline(actor),
            "multicancel" => Self::MultiCancel(actor),
            "multiwithdraw" => Self::MultiWithdraw(actor),
            "multicomplete" => Self::MultiComplete(actor),
            "multihistory" => Self::MultiHistory(target),
            other => return Err(ParseError::Unknown(other.to_string())),
        };
        Ok(command)
    }
}

/// Splits off `+tag`, `~tag` and `nohandicap`; whatever is left is returned.
fn parse_common<'a>(
    args: &[&'a str],
    include: &mut Vec<String>,
    exclude: &mut Vec<String>,
    no_handicap: &mut bool,
) -> Vec<&'a str> {
    let mut rest = Vec::new();
    for arg in args {
        if let Some(tag) = arg.strip_prefix('+').filter(|t| !t.is_empty()) {
            include.push(tag.to_string());
        } else if let Some(tag) = arg.strip_prefix('~').filter(|t| !t.is_empty()) {
            exclude.push(tag.to_string());
        } else if arg.eq_ignore_ascii_case("nohandicap") {
            *no_handicap = true;
        } else {
            rest.push(*arg);
        }
    }
    rest
}

fn parse_challenge_options(args: &[&str]) -> std::result::Result<ChallengeOptions, ParseError> {
    let mut options = ChallengeOptions::default();
    let rest = parse_common(
        args,
        &mut options.include_tags,
        &mut options.exclude_tags,
        &mut options.no_handicap,
    );
    for arg in rest {
        if let Some(link) = ProblemLink::parse(arg) {
            options.problem = Some(link);
        } else {
            options.rating = Some(parse_int(arg)?);
        }
    }
    Ok(options)
}

fn parse_multi_options(args: &[&str]) -> std::result::Result<MultiOptions, ParseError> {
    let mut options = MultiOptions::default();
    let rest = parse_common(
        args,
        &mut options.include_tags,
        &mut options.exclude_tags,
        &mut options.no_handicap,
    );
    let mut count = None;
    let mut rating = None;
    let mut ratings = None;
    for arg in rest {
        match arg.split_once('=') {
            Some(("count", v)) => count = Some(parse_int(v)?),
            Some(("rating", v)) => rating = Some(parse_int(v)?),
            Some(("ratings", v)) => {
                ratings = Some(v.split(',').map(parse_int).collect::<std::result::Result<Vec<_>, _>>()?)
            }
            _ => return Err(ParseError::BadArgument(arg.to_string())),
        }
    }
    options.plan = match (ratings, count, rating) {
        (Some(list), None, None) => Some(ProblemPlan::Ratings(list)),
        (Some(_), _, _) => {
            return Err(ParseError::BadArgument(
                "ratings= cannot be combined with count= or rating=".to_string(),
            ))
        }
        (None, None, None) => None,
        (None, count, rating) => Some(ProblemPlan::Count {
            count: match count {
                Some(c) if c > 0 => Some(c as usize),
                Some(c) => return Err(ParseError::BadArgument(format!("count={}", c))),
                None => None,
            },
            rating,
        }),
    };
    Ok(options)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub ok: bool,
    pub text: String,
}

impl Reply {
    fn ok(text: impl Into<String>) -> Self {
        Self {
            ok: true,
            text: text.into(),
        }
    }

    fn failed(text: impl Into<String>) -> Self {
        Self {
            ok: false,
            text: text.into(),
        }
    }
}

pub fn pretty_secs(secs: f64) -> String {
    let total = secs.max(0.0).round() as i64;
    let (h, m, s) = (total / 3600, total / 60 % 60, total % 60);
    match (h, m) {
        (0, 0) => format!("{}s", s),
        (0, _) => format!("{}m {}s", m, s),
        _ => format!("{}h {}m {}s", h, m, s),
    }
}

/// One community's duel arena: both orchestrators and the queries behind a
/// single command entry point.
pub struct Arena {
    ctx: Arc<DuelContext>,
    guild_id: u64,
    pub duels: DuelOrchestrator,
    pub multis: MultiplayerOrchestrator,
    pub stats: Stats,
}

impl Arena {
    pub fn new(ctx: Arc<DuelContext>, guild_id: u64) -> Self {
        Self {
            duels: DuelOrchestrator::new(ctx.clone()),
            multis: MultiplayerOrchestrator::new(ctx.clone()),
            stats: Stats::new(ctx.clone()),
            ctx,
            guild_id,
        }
    }

    pub fn handle_line(&self, actor: UserId, line: &str) -> Reply {
        match Command::parse(actor, line) {
            Ok(command) => self.execute(command),
            Err(err) => Reply::failed(err.to_string()),
        }
    }

    pub fn execute(&self, command: Command) -> Reply {
        match self.run(command) {
            Ok(reply) => reply,
            Err(err) => {
                if !err.is_user_facing() {
                    tracing::warn!(error = %err, "command failed");
                }
                Reply::failed(err.to_string())
            }
        }
    }

    /// Runs a fired timer. Returns an announcement when the timer changed
    /// something.
    pub fn fire(&self, action: ScheduledAction) -> Option<Reply> {
        self.fire_inner(action).unwrap_or_else(|err| {
            tracing::warn!(%action, error = %err, "timer action failed");
            None
        })
    }

    fn fire_inner(&self, action: ScheduledAction) -> Result<Option<Reply>> {
        let reply = match action {
            ScheduledAction::ExpireDuel(id) => {
                if !self.duels.expire(id)? {
                    return Ok(None);
                }
                let duel = self
                    .ctx
                    .store
                    .duel(id)
                    .map_err(DuelError::Store)?
                    .ok_or_else(|| DuelError::Store(format!("duel {} vanished", id)))?;
                Reply::ok(format!(
                    "{}, your request to duel {} has expired!",
                    duel.challenger, duel.challengee
                ))
            }
            ScheduledAction::StartDuel(id) => match self.duels.start(id)? {
                Some(duel) => render_duel_started(&duel),
                None => return Ok(None),
            },
            ScheduledAction::ExpireMulti(id) => {
                if !self.multis.expire_multi(id)? {
                    return Ok(None);
                }
                Reply::ok(format!("Multiplayer duel {} has expired!", id))
            }
            ScheduledAction::StartMulti(id) => match self.multis.start_multi(id)? {
                Some(view) => render_multi_started(&view),
                None => return Ok(None),
            },
        };
        Ok(Some(reply))
    }

    fn run(&self, command: Command) -> Result<Reply> {
        let reply = match command {
            Command::Register(user) => {
                let duelist = self.duels.register(user)?;
                Reply::ok(format!(
                    "{} successfully registered as a duelist with rating {}.",
                    user, duelist.rating
                ))
            }
            Command::Challenge {
                challenger,
                challengee,
                options,
            } => render_challenge(&self.duels.challenge(challenger, challengee, options)?),
            Command::Accept(user) => {
                let duel = self.duels.accept(user)?;
                Reply::ok(format!(
                    "Duel between {} and {} starting in {} seconds!",
                    duel.challenger, duel.challengee, self.ctx.config.start_delay_secs
                ))
            }
            Command::Decline(user) => {
                let duel = self.duels.decline(user)?;
                Reply::ok(format!("{} declined a challenge by {}.", user, duel.challenger))
            }
            Command::Withdraw(user) => {
                let duel = self.duels.withdraw(user)?;
                Reply::ok(format!("{} withdrew a challenge to {}.", user, duel.challengee))
            }
            Command::Complete(user) => match self.duels.complete(user)? {
                CompleteOutcome::PendingJudgement => Reply::ok(format!(
                    "Wait a bit, {}. A submission is still being judged.",
                    user
                )),
                CompleteOutcome::NobodySolved => Reply::ok("Nobody solved the problem yet."),
                CompleteOutcome::Completed(result) => render_result(&result),
            },
            Command::Draw(user) => match self.duels.draw(user)? {
                DrawOutcome::TooEarly { remaining_secs } => Reply::ok(format!(
                    "Think more {}. You can offer a draw in {}.",
                    user,
                    pretty_secs(remaining_secs as f64)
                )),
                DrawOutcome::Offered { offeree, .. } => {
                    Reply::ok(format!("{} is offering a draw to {}!", user, offeree))
                }
                DrawOutcome::AlreadyOffered => {
                    Reply::ok(format!("{}, you've already offered a draw.", user))
                }
                DrawOutcome::Accepted { offerer, result } => {
                    let mut reply = render_result(&result);
                    reply.text = format!(
                        "{} accepted draw offer by {}.\n{}",
                        user, offerer, reply.text
                    );
                    reply
                }
            },
            Command::Invalidate(user) => render_invalidated(&self.duels.invalidate(user)?),
            Command::ModInvalidate { moderator, target } => {
                render_invalidated(&self.duels.force_invalidate(moderator, target)?)
            }
            Command::Profile(user) => {
                let p = self.stats.profile(user)?;
                let mut text = format!(
                    "Duelist profile of {} {}\nRating: {}\nWins: {}  Losses: {}  Draws: {}\nDeclined: {}  Got declined: {}",
                    p.rank.title, user, p.rating, p.wins, p.losses, p.draws, p.declined, p.got_declined
                );
                if let (Some(fastest), Some(slowest)) = (&p.fastest_win, &p.slowest_win) {
                    let _ = write!(text, "\nFastest win: {}", describe_win(fastest, user));
                    let _ = write!(text, "\nSlowest win: {}", describe_win(slowest, user));
                }
                Reply::ok(text)
            }
            Command::History(user) => {
                render_duel_list(&format!("Dueling history of {}", user), &self.stats.history(user)?)
            }
            Command::VsHistory(a, b) => {
                let record = self.stats.vshistory(a, b)?;
                render_duel_list(
                    &format!("{} ({}/{}/{}) {}", a, record.wins, record.draws, record.losses, b),
                    &record.duels,
                )
            }
            Command::Recent => render_duel_list("List of recent duels", &self.stats.recent()?),
            Command::Ongoing => {
                let duels = self.stats.ongoing()?;
                if duels.is_empty() {
                    Reply::failed("There are no ongoing duels.")
                } else {
                    let lines: Vec<String> = duels
                        .iter()
                        .map(|d| format!("{} vs {}: {} ({})", d.challenger, d.challengee, d.problem, d.status))
                        .collect();
                    Reply::ok(format!("List of ongoing duels:\n{}", lines.join("\n")))
                }
            }
            Command::Ranklist => {
                let ranks = self.stats.ranklist()?;
                if ranks.is_empty() {
                    Reply::failed("There are no active duelists.")
                } else {
                    let mut text = String::from("#  Name  Rating");
                    for (i, entry) in ranks.iter().enumerate() {
                        let _ = write!(text, "\n{}  {}  {} ({})", i, entry.user_id, entry.rating, entry.rank.abbr);
                    }
                    Reply::ok(text)
                }
            }
            Command::Rating(users) => {
                let series = self.stats.rating_history(&users)?;
                if series.is_empty() {
                    Reply::failed("Nothing to plot.")
                } else {
                    let lines: Vec<String> = series
                        .iter()
                        .map(|s| {
                            let path: Vec<String> = s.points.iter().map(|p| p.rating.to_string()).collect();
                            format!("{}: {}", s.user_id, path.join(" -> "))
                        })
                        .collect();
                    Reply::ok(lines.join("\n"))
                }
            }
            Command::MultiStart {
                creator,
                invitees,
                mut options,
            } => {
                options.guild_id = self.guild_id;
                let view = self.multis.multistart(creator, &invitees, options)?;
                let who: Vec<String> = view.participants.iter().map(|p| p.user_id.to_string()).collect();
                Reply::ok(format!(
                    "Multiplayer duel created by {} with {}: {} problems at rating {}. Use multiaccept to join!",
                    creator,
                    who.join(", "),
                    view.duel.num_problems,
                    view.duel.target_rating
                ))
            }
            Command::MultiAccept(user) => {
                let outcome = self.multis.multiaccept(user)?;
                let mut text = format!("{} has accepted the multiplayer duel!", user);
                if outcome.starting {
                    let _ = write!(
                        text,
                        "\nAll participants have accepted! Starting duel in {} seconds...",
                        self.ctx.config.start_delay_secs
                    );
                }
                Reply::ok(text)
            }
            Command::MultiDecline(user) => render_leave(user, "declined", &self.multis.multidecline(user)?),
            Command::MultiCancel(user) => {
                self.multis.multicancel(user)?;
                Reply::ok(format!("{} has cancelled the multiplayer duel.", user))
            }
            Command::MultiWithdraw(user) => {
                render_leave(user, "withdrawn from", &self.multis.multiwithdraw(user)?)
            }
            Command::MultiComplete(user) => match self.multis.multicomplete(user)? {
                MultiCompleteOutcome::PendingJudgement => Reply::ok(format!(
                    "Wait a bit, {}. A submission is still being judged.",
                    user
                )),
                MultiCompleteOutcome::Completed(result) => {
                    let total = result.view.duel.num_problems;
                    let mut text = String::from("Multiplayer duel complete!");
                    for (p, before) in result.placements.iter().zip(&result.ratings_before) {
                        let _ = write!(
                            text,
                            "\n{}. {} {}/{} solved in {} ({:+}) {} -> {}",
                            p.placement,
                            p.user_id,
                            p.problems_solved,
                            total,
                            pretty_secs(p.total_time),
                            p.rating_delta,
                            before,
                            before + p.rating_delta
                        );
                    }
                    Reply::ok(text)
                }
            },
            Command::MultiHistory(user) => {
                let entries = self.stats.multihistory(user)?;
                if entries.is_empty() {
                    Reply::failed(format!("{} has no completed multiplayer duels.", user))
                } else {
                    let mut text = format!("Multiplayer duel history of {}", user);
                    for e in &entries {
                        let _ = write!(
                            text,
                            "\n#{} {}/{} solved in {} ({:+})",
                            e.placement,
                            e.problems_solved,
                            e.duel.num_problems,
                            pretty_secs(e.total_time),
                            e.rating_delta
                        );
                    }
                    Reply::ok(text)
                }
            }
        };
        Ok(reply)
    }
}

fn render_challenge(issued: &ChallengeIssued) -> Reply {
    let duel = &issued.duel;
    let kind = match duel.duel_type {
        crate::types::DuelType::Official => "an official",
        crate::types::DuelType::Unofficial => "an unofficial",
    };
    let mut text = format!(
        "{} ({}) is challenging {} ({}) to {} {} rated duel!",
        duel.challenger,
        issued.challenger_rating,
        duel.challengee,
        issued.challengee_rating,
        kind,
        duel.problem.rating.map_or_else(|| "un".to_string(), |r| r.to_string())
    );
    if duel.no_handicap {
        text.push_str("\nNo handicap mode");
    } else if issued.handicap.0 > 0.0 {
        let _ = write!(text, "\n{} gets {}s time handicap!", duel.challenger, issued.handicap.0 as i64);
    } else if issued.handicap.1 > 0.0 {
        let _ = write!(text, "\n{} gets {}s time handicap!", duel.challengee, issued.handicap.1 as i64);
    }
    Reply::ok(text)
}

fn render_duel_started(duel: &Duel) -> Reply {
    Reply::ok(format!(
        "Starting duel: {} vs {}\n{}\n{}",
        duel.challenger,
        duel.challengee,
        duel.problem,
        duel.problem.url()
    ))
}

fn render_multi_started(view: &MultiDuelView) -> Reply {
    let who: Vec<String> = view
        .participants
        .iter()
        .filter(|p| p.status == ParticipantStatus::Accepted)
        .map(|p| p.user_id.to_string())
        .collect();
    let mut text = format!("Multiplayer duel started! Participants: {}", who.join(", "));
    for assignment in &view.problems {
        let _ = write!(text, "\n{}. {} {}", assignment.order, assignment.problem, assignment.problem.url());
    }
    Reply::ok(text)
}

fn render_result(result: &DuelResult) -> Reply {
    let duel = &result.duel;
    let mut text = match result.winner {
        Winner::Draw => format!("{} and {} drew the duel!", duel.challenger, duel.challengee),
        _ => format!(
            "{} beat {} in a duel!",
            duel.winner_id().unwrap_or(duel.challenger),
            duel.loser_id().unwrap_or(duel.challengee)
        ),
    };
    for update in &result.rating_updates {
        let _ = write!(text, "\n{}: {} -> {}", update.user, update.before, update.after);
    }
    Reply::ok(text)
}

fn render_invalidated(duel: &Duel) -> Reply {
    Reply::ok(format!(
        "Duel between {} and {} has been invalidated.",
        duel.challenger, duel.challengee
    ))
}

fn render_leave(user: UserId, verb: &str, outcome: &LeaveOutcome) -> Reply {
    if outcome.cancelled {
        Reply::ok(format!(
            "{} has {} the multiplayer duel. Not enough participants remain. Duel cancelled.",
            user, verb
        ))
    } else {
        Reply::ok(format!("{} has {} the multiplayer duel.", user, verb))
    }
}

fn describe_win(duel: &Duel, user: UserId) -> String {
    format!(
        "{} versus {} in {}",
        duel.problem,
        duel.opponent_of(user).unwrap_or(duel.challengee),
        pretty_secs(duel.duration_seconds().unwrap_or(0) as f64)
    )
}

fn render_duel_list(title: &str, duels: &[Duel]) -> Reply {
    if duels.is_empty() {
        return Reply::failed("There are no duels to show.");
    }
    let mut text = title.to_string();
    for duel in duels {
        let took = pretty_secs(duel.duration_seconds().unwrap_or(0) as f64);
        let line = match (duel.winner_id(), duel.loser_id()) {
            (Some(winner), Some(loser)) => {
                format!("{}: {} won by {} vs {} in {}", duel.id, duel.problem, winner, loser, took)
            }
            _ => format!(
                "{}: {} drawn by {} and {} after {}",
                duel.id, duel.problem, duel.challenger, duel.challengee, took
            ),
        };
        text.push('\n');
        text.push_str(&line);
    }
    Reply::ok(text)
}
