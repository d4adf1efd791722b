use crate::judge::{HandleResolver, ProblemCatalog, SubmissionFeed};
use crate::types::{Handle, Problem, ProblemRef, Submission, UserId, Verdict};
use std::collections::{HashMap, HashSet};
use std::sync::RwLock;

#[derive(Debug, Default)]
pub struct InMemoryCatalog {
    problems: RwLock<Vec<Problem>>,
    nonstandard: RwLock<HashSet<(u32, String)>>,
}

impl InMemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, problem: Problem) {
        let mut problems = self.problems.write().unwrap_or_else(|e| e.into_inner());
        problems.retain(|p| !(p.contest_id == problem.contest_id && p.index == problem.index));
        problems.push(problem);
    }

    pub fn mark_nonstandard(&self, contest_id: u32, index: impl AsRef<str>) {
        self.nonstandard
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert((contest_id, index.as_ref().trim().to_ascii_uppercase()));
    }
}

impl ProblemCatalog for InMemoryCatalog {
    fn problems(&self) -> Result<Vec<Problem>, String> {
        Ok(self
            .problems
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone())
    }

    fn is_nonstandard(&self, problem: &Problem) -> bool {
        let flagged = self
            .nonstandard
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .contains(&(problem.contest_id, problem.index.to_ascii_uppercase()));
        flagged
            || problem
                .tags
                .iter()
                .any(|t| t.trim().eq_ignore_ascii_case("*special"))
    }
}

/// Submission feed held in memory. Each handle's list is kept freshest first.
#[derive(Debug, Default)]
pub struct InMemoryFeed {
    submissions: RwLock<HashMap<String, Vec<Submission>>>,
    ratings: RwLock<HashMap<String, i32>>,
    offline: RwLock<bool>,
}

impl InMemoryFeed {
    pub fn new() -> Self {
        Self::default()
    }

    fn key(handle: &Handle) -> String {
        handle.as_str().to_ascii_lowercase()
    }

    pub fn push(&self, handle: &Handle, submission: Submission) {
        let mut map = self.submissions.write().unwrap_or_else(|e| e.into_inner());
        let list = map.entry(Self::key(handle)).or_default();
        list.push(submission);
        list.sort_by(|a, b| b.creation_time.cmp(&a.creation_time));
    }

    /// Rejudges every submission of `handle` to `problem` that matches `from`.
    pub fn rejudge(
        &self,
        handle: &Handle,
        problem: &ProblemRef,
        from: Verdict,
        to: Verdict,
    ) {
        let mut map = self.submissions.write().unwrap_or_else(|e| e.into_inner());
        if let Some(list) = map.get_mut(&Self::key(handle)) {
            for sub in list
                .iter_mut()
                .filter(|s| s.problem.is_same_problem(problem) && s.verdict == from)
            {
                sub.verdict = to;
            }
        }
    }

    pub fn set_rating(&self, handle: &Handle, rating: i32) {
        self.ratings
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(Self::key(handle), rating);
    }

    pub fn set_offline(&self, offline: bool) {
        *self.offline.write().unwrap_or_else(|e| e.into_inner()) = offline;
    }

    fn check_online(&self) -> Result<(), String> {
        if *self.offline.read().unwrap_or_else(|e| e.into_inner()) {
            Err("submission feed unavailable".to_string())
        } else {
            Ok(())
        }
    }
}

impl SubmissionFeed for InMemoryFeed {
    fn submissions(&self, handle: &Handle) -> Result<Vec<Submission>, String> {
        self.check_online()?;
        Ok(self
            .submissions
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(&Self::key(handle))
            .cloned()
            .unwrap_or_default())
    }

    fn judge_rating(&self, handle: &Handle) -> Result<Option<i32>, String> {
        self.check_online()?;
        Ok(self
            .ratings
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(&Self::key(handle))
            .copied())
    }
}

#[derive(Debug, Default, Clone)]
pub struct StaticHandleResolver {
    map: HashMap<UserId, Handle>,
}

impl StaticHandleResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, user: UserId, handle: impl AsRef<str>) {
        self.map.insert(user, Handle::new(handle));
    }
}

impl HandleResolver for StaticHandleResolver {
    fn resolve(&self, user: UserId) -> Result<Handle, String> {
        self.map
            .get(&user)
            .cloned()
            .ok_or_else(|| format!("no handle set for {}", user))
    }
}

pub struct FnHandleResolver<F> {
    lookup: F,
}

impl<F> FnHandleResolver<F> {
    pub fn new(lookup: F) -> Self {
        Self { lookup }
    }
}

impl<F> HandleResolver for FnHandleResolver<F>
where
    F: Fn(UserId) -> Option<Handle>,
{
    fn resolve(&self, user: UserId) -> Result<Handle, String> {
        (self.lookup)(user).ok_or_else(|| format!("no handle set for {}", user))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::DateTime;

    fn problem(contest_id: u32, index: &str, tags: &[&str]) -> Problem {
        Problem {
            contest_id,
            index: index.to_string(),
            name: format!("Problem {contest_id}{index}"),
            rating: Some(1200),
            tags: tags.iter().map(|t| t.to_string()).collect(),
            contest_start_time: DateTime::UNIX_EPOCH,
            authors: Vec::new(),
        }
    }

    #[test]
    fn catalog_replaces_and_finds_problems() {
        let catalog = InMemoryCatalog::new();
        catalog.insert(problem(1, "A", &[]));
        catalog.insert(problem(1, "A", &["dp"]));
        catalog.insert(problem(2, "B", &[]));
        assert_eq!(catalog.problems().unwrap().len(), 2);
        let found = catalog.find(1, "a").unwrap().unwrap();
        assert_eq!(found.tags, vec!["dp".to_string()]);
        assert!(catalog.find(3, "A").unwrap().is_none());
    }

    #[test]
    fn catalog_flags_nonstandard_problems() {
        let catalog = InMemoryCatalog::new();
        let special = problem(1, "A", &["*special"]);
        let plain = problem(2, "B", &[]);
        assert!(catalog.is_nonstandard(&special));
        assert!(!catalog.is_nonstandard(&plain));
        catalog.mark_nonstandard(2, "b");
        assert!(catalog.is_nonstandard(&plain));
    }

    #[test]
    fn feed_keeps_freshest_first_and_rejudges() {
        let feed = InMemoryFeed::new();
        let handle = Handle::new("Tourist");
        let p = ProblemRef::new(1, "A", "Problem 1A", None);
        for (t, verdict) in [(10, Verdict::Testing), (30, Verdict::Rejected), (20, Verdict::Ok)] {
            feed.push(
                &handle,
                Submission {
                    problem: p.clone(),
                    verdict,
                    creation_time: DateTime::from_timestamp(t, 0).unwrap(),
                },
            );
        }
        let subs = feed.submissions(&Handle::new("tourist")).unwrap();
        let times: Vec<i64> = subs.iter().map(|s| s.creation_time.timestamp()).collect();
        assert_eq!(times, vec![30, 20, 10]);

        feed.rejudge(&handle, &p, Verdict::Testing, Verdict::Ok);
        let subs = feed.submissions(&handle).unwrap();
        assert_eq!(subs[2].verdict, Verdict::Ok);

        feed.set_offline(true);
        assert!(feed.submissions(&handle).is_err());
        assert!(feed.judge_rating(&handle).is_err());
    }

    #[test]
    fn static_and_fn_handle_resolvers() {
        let mut handles = StaticHandleResolver::new();
        handles.insert(UserId(1), "tourist");
        assert_eq!(handles.resolve(UserId(1)).unwrap(), Handle::new("tourist"));
        assert!(handles.resolve(UserId(2)).is_err());

        let resolver = FnHandleResolver::new(|user: UserId| {
            (user.0 == 5).then(|| Handle::new("petr"))
        });
        assert_eq!(resolver.resolve(UserId(5)).unwrap(), Handle::new("petr"));
        assert!(resolver.resolve(UserId(6)).is_err());
    }
}
