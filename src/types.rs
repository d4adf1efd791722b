use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub u64);

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<@{}>", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DuelId(pub u64);

impl fmt::Display for DuelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A handle on the judge. Comparisons are case-insensitive, as on the judge.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Handle(String);

impl Handle {
    pub fn new(value: impl AsRef<str>) -> Self {
        Self(value.as_ref().trim().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl PartialEq for Handle {
    fn eq(&self, other: &Self) -> bool {
        self.0.eq_ignore_ascii_case(&other.0)
    }
}

impl Eq for Handle {}

impl fmt::Display for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DuelStatus {
    Pending,
    Declined,
    Withdrawn,
    Expired,
    Ongoing,
    Complete,
    Invalid,
}

impl DuelStatus {
    pub const ACTIVE: [DuelStatus; 2] = [DuelStatus::Pending, DuelStatus::Ongoing];

    pub fn is_active(self) -> bool {
        matches!(self, Self::Pending | Self::Ongoing)
    }
}

impl fmt::Display for DuelStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::Pending => "pending",
            Self::Declined => "declined",
            Self::Withdrawn => "withdrawn",
            Self::Expired => "expired",
            Self::Ongoing => "ongoing",
            Self::Complete => "complete",
            Self::Invalid => "invalid",
        };
        f.write_str(text)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DuelType {
    Official,
    Unofficial,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Winner {
    Draw,
    Challenger,
    Challengee,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ParticipantStatus {
    Invited,
    Accepted,
    Declined,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Verdict {
    Ok,
    Testing,
    CompilationError,
    Rejected,
}

impl Verdict {
    pub fn from_judge(raw: &str) -> Self {
        match raw.trim().to_ascii_uppercase().as_str() {
            "OK" => Self::Ok,
            "TESTING" => Self::Testing,
            "COMPILATION_ERROR" => Self::CompilationError,
            _ => Self::Rejected,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProblemRef {
    pub contest_id: u32,
    pub index: String,
    pub name: String,
    pub rating: Option<i32>,
}

impl ProblemRef {
    pub fn new(contest_id: u32, index: impl AsRef<str>, name: impl AsRef<str>, rating: Option<i32>) -> Self {
        Self {
            contest_id,
            index: index.as_ref().trim().to_ascii_uppercase(),
            name: name.as_ref().trim().to_string(),
            rating,
        }
    }

    pub fn is_same_problem(&self, other: &ProblemRef) -> bool {
        self.contest_id == other.contest_id && self.index == other.index
    }

    pub fn url(&self) -> String {
        format!(
            "https://codeforces.com/contest/{}/problem/{}",
            self.contest_id, self.index
        )
    }
}

impl fmt::Display for ProblemRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}. {}", self.contest_id, self.index, self.name)?;
        if let Some(rating) = self.rating {
            write!(f, " [{}]", rating)?;
        }
        Ok(())
    }
}

/// A problem named by contest and index, as found in a judge problem URL.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ProblemLink {
    pub contest_id: u32,
    pub index: String,
}

impl ProblemLink {
    /// Accepts `/contest/<id>/problem/<idx>`, `/problemset/problem/<id>/<idx>`
    /// and `/gym/<id>/problem/<idx>` links on the judge host.
    pub fn parse(url: &str) -> Option<Self> {
        let (_, path) = url.split_once("codeforces.com/")?;
        let parts: Vec<&str> = path.split('/').collect();
        let (contest, index) = match parts.as_slice() {
            ["contest" | "gym", contest, "problem", index, ..] => (*contest, *index),
            ["problemset", "problem", contest, index, ..] => (*contest, *index),
            _ => return None,
        };
        let contest_id = contest.parse().ok()?;
        let index: String = index
            .chars()
            .take_while(|c| c.is_ascii_alphanumeric())
            .collect();
        if index.is_empty() {
            return None;
        }
        Some(Self {
            contest_id,
            index: index.to_ascii_uppercase(),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Problem {
    pub contest_id: u32,
    pub index: String,
    pub name: String,
    pub rating: Option<i32>,
    #[serde(default)]
    pub tags: Vec<String>,
    pub contest_start_time: DateTime<Utc>,
    #[serde(default)]
    pub authors: Vec<Handle>,
}

impl Problem {
    pub fn reference(&self) -> ProblemRef {
        ProblemRef::new(self.contest_id, &self.index, &self.name, self.rating)
    }

    pub fn matches_all_tags(&self, tags: &[String]) -> bool {
        tags.iter().all(|tag| self.has_tag(tag))
    }

    pub fn matches_any_tag(&self, tags: &[String]) -> bool {
        tags.iter().any(|tag| self.has_tag(tag))
    }

    // Partial match, so `+dp` also picks up "dp" inside longer tag names.
    fn has_tag(&self, tag: &str) -> bool {
        let tag = tag.trim().to_ascii_lowercase();
        self.tags
            .iter()
            .any(|t| t.to_ascii_lowercase().contains(&tag))
    }

    pub fn is_written_by(&self, handle: &Handle) -> bool {
        self.authors.iter().any(|a| a == handle)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Submission {
    pub problem: ProblemRef,
    pub verdict: Verdict,
    pub creation_time: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Duelist {
    pub user_id: UserId,
    pub rating: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Duel {
    pub id: DuelId,
    pub challenger: UserId,
    pub challengee: UserId,
    pub issue_time: DateTime<Utc>,
    pub start_time: Option<DateTime<Utc>>,
    pub finish_time: Option<DateTime<Utc>>,
    pub problem: ProblemRef,
    pub status: DuelStatus,
    pub duel_type: DuelType,
    pub no_handicap: bool,
    pub winner: Option<Winner>,
    #[serde(default)]
    pub pending_drawer: Option<UserId>,
    /// When the challengee accepted; the start countdown runs from here.
    #[serde(default)]
    pub accepted_at: Option<DateTime<Utc>>,
}

impl Duel {
    pub fn involves(&self, user: UserId) -> bool {
        self.challenger == user || self.challengee == user
    }

    pub fn opponent_of(&self, user: UserId) -> Option<UserId> {
        if user == self.challenger {
            Some(self.challengee)
        } else if user == self.challengee {
            Some(self.challenger)
        } else {
            None
        }
    }

    pub fn winner_id(&self) -> Option<UserId> {
        match self.winner? {
            Winner::Challenger => Some(self.challenger),
            Winner::Challengee => Some(self.challengee),
            Winner::Draw => None,
        }
    }

    pub fn loser_id(&self) -> Option<UserId> {
        match self.winner? {
            Winner::Challenger => Some(self.challengee),
            Winner::Challengee => Some(self.challenger),
            Winner::Draw => None,
        }
    }

    pub fn duration_seconds(&self) -> Option<i64> {
        Some((self.finish_time? - self.start_time?).num_seconds())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MultiplayerDuel {
    pub id: DuelId,
    pub creator: UserId,
    pub guild_id: u64,
    pub issue_time: DateTime<Utc>,
    pub start_time: Option<DateTime<Utc>>,
    pub finish_time: Option<DateTime<Utc>>,
    pub num_problems: u8,
    pub target_rating: i32,
    pub status: DuelStatus,
    pub duel_type: DuelType,
    pub no_handicap: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Participant {
    pub user_id: UserId,
    pub status: ParticipantStatus,
    pub problems_solved: u32,
    pub total_time: f64,
    pub placement: Option<u32>,
    pub rating_delta: Option<i32>,
}

impl Participant {
    pub fn new(user_id: UserId, status: ParticipantStatus) -> Self {
        Self {
            user_id,
            status,
            problems_solved: 0,
            total_time: 0.0,
            placement: None,
            rating_delta: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProblemAssignment {
    pub problem: ProblemRef,
    pub order: u8,
}
