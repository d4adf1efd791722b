use crate::judge::{ProblemCatalog, SubmissionFeed};
use crate::types::{Handle, Problem, ProblemRef, Submission, Verdict};
use chrono::DateTime;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::collections::{HashMap, HashSet};
use std::sync::RwLock;

/// Raw access to the judge's public API. Each call returns the response body.
pub trait ExternalJudgeSource {
    fn problemset(&self) -> Result<String, String>;
    fn contests(&self) -> Result<String, String>;
    fn user_status(&self, handle: &str) -> Result<String, String>;
    fn user_info(&self, handle: &str) -> Result<String, String>;
}

const NONSTANDARD_CONTEST_MARKERS: [&str; 13] = [
    "wild", "fools", "unrated", "surprise", "unknown", "friday", "q#", "testing",
    "marathon", "kotlin", "onsite", "experimental", "abbyy",
];

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    status: String,
    comment: Option<String>,
    result: Option<T>,
}

fn unwrap_envelope<T: DeserializeOwned>(body: &str) -> Result<T, String> {
    let envelope: Envelope<T> =
        serde_json::from_str(body).map_err(|e| format!("malformed judge response: {}", e))?;
    if envelope.status != "OK" {
        return Err(envelope
            .comment
            .unwrap_or_else(|| format!("judge returned status {}", envelope.status)));
    }
    envelope
        .result
        .ok_or_else(|| "judge response has no result".to_string())
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiProblem {
    contest_id: Option<u32>,
    index: String,
    name: String,
    rating: Option<i32>,
    #[serde(default)]
    tags: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct ApiProblemset {
    problems: Vec<ApiProblem>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiContest {
    id: u32,
    name: String,
    start_time_seconds: Option<i64>,
    prepared_by: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiSubmission {
    problem: ApiProblem,
    verdict: Option<String>,
    creation_time_seconds: i64,
}

#[derive(Debug, Deserialize)]
struct ApiUser {
    rating: Option<i32>,
}

#[derive(Debug, Default)]
struct CatalogCache {
    problems: Vec<Problem>,
    nonstandard_contests: HashSet<u32>,
}

pub struct CatalogAdapter<S> {
    source: S,
    cache: RwLock<Option<CatalogCache>>,
}

impl<S> CatalogAdapter<S>
where
    S: ExternalJudgeSource,
{
    pub fn new(source: S) -> Self {
        Self {
            source,
            cache: RwLock::new(None),
        }
    }

    pub fn refresh(&self) -> Result<usize, String> {
        let problemset: ApiProblemset = unwrap_envelope(&self.source.problemset()?)?;
        let contests: Vec<ApiContest> = unwrap_envelope(&self.source.contests()?)?;

        let mut nonstandard_contests = HashSet::new();
        let mut by_id = HashMap::new();
        for contest in contests {
            let lowered = contest.name.to_ascii_lowercase();
            if NONSTANDARD_CONTEST_MARKERS.iter().any(|m| lowered.contains(m)) {
                nonstandard_contests.insert(contest.id);
            }
            by_id.insert(contest.id, contest);
        }

        let problems: Vec<Problem> = problemset
            .problems
            .into_iter()
            .filter_map(|p| {
                let contest = by_id.get(&p.contest_id?)?;
                let start = DateTime::from_timestamp(contest.start_time_seconds?, 0)?;
                Some(Problem {
                    contest_id: contest.id,
                    index: p.index.trim().to_ascii_uppercase(),
                    name: p.name,
                    rating: p.rating,
                    tags: p.tags,
                    contest_start_time: start,
                    authors: contest.prepared_by.iter().map(Handle::new).collect(),
                })
            })
            .collect();
        let count = problems.len();
        *self.cache.write().unwrap_or_else(|e| e.into_inner()) = Some(CatalogCache {
            problems,
            nonstandard_contests,
        });
        Ok(count)
    }

    fn ensure_loaded(&self) -> Result<(), String> {
        let loaded = self
            .cache
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .is_some();
        if !loaded {
            self.refresh()?;
        }
        Ok(())
    }
}

impl<S> ProblemCatalog for CatalogAdapter<S>
where
    S: ExternalJudgeSource,
{
    fn problems(&self) -> Result<Vec<Problem>, String> {
        self.ensure_loaded()?;
        Ok(self
            .cache
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .as_ref()
            .map(|c| c.problems.clone())
            .unwrap_or_default())
    }

    fn is_nonstandard(&self, problem: &Problem) -> bool {
        let flagged_contest = self
            .cache
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .as_ref()
            .is_some_and(|c| c.nonstandard_contests.contains(&problem.contest_id));
        flagged_contest
            || problem
                .tags
                .iter()
                .any(|t| t.trim().eq_ignore_ascii_case("*special"))
    }
}

pub struct FeedAdapter<S> {
    source: S,
}

impl<S> FeedAdapter<S> {
    pub fn new(source: S) -> Self {
        Self { source }
    }
}

impl<S> SubmissionFeed for FeedAdapter<S>
where
    S: ExternalJudgeSource,
{
    fn submissions(&self, handle: &Handle) -> Result<Vec<Submission>, String> {
        let raw: Vec<ApiSubmission> = unwrap_envelope(&self.source.user_status(handle.as_str())?)?;
        let mut out: Vec<Submission> = raw
            .into_iter()
            .filter_map(|s| {
                let contest_id = s.problem.contest_id?;
                Some(Submission {
                    problem: ProblemRef::new(contest_id, &s.problem.index, &s.problem.name, s.problem.rating),
                    // Queued submissions carry no verdict yet.
                    verdict: s
                        .verdict
                        .as_deref()
                        .map(Verdict::from_judge)
                        .unwrap_or(Verdict::Testing),
                    creation_time: DateTime::from_timestamp(s.creation_time_seconds, 0)?,
                })
            })
            .collect();
        out.sort_by(|a, b| b.creation_time.cmp(&a.creation_time));
        Ok(out)
    }

    fn judge_rating(&self, handle: &Handle) -> Result<Option<i32>, String> {
        let users: Vec<ApiUser> = unwrap_envelope(&self.source.user_info(handle.as_str())?)?;
        Ok(users.first().and_then(|u| u.rating))
    }
}
