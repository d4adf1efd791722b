use crate::types::{Handle, Problem, Submission, UserId};

pub trait ProblemCatalog {
    fn problems(&self) -> Result<Vec<Problem>, String>;

    /// Problems that cannot be judged the usual way (interactive-only,
    /// special judges, joke rounds) and must never be drawn.
    fn is_nonstandard(&self, problem: &Problem) -> bool {
        problem
            .tags
            .iter()
            .any(|t| t.trim().eq_ignore_ascii_case("*special"))
    }

    fn find(&self, contest_id: u32, index: &str) -> Result<Option<Problem>, String> {
        let index = index.trim().to_ascii_uppercase();
        Ok(self
            .problems()?
            .into_iter()
            .find(|p| p.contest_id == contest_id && p.index.eq_ignore_ascii_case(&index)))
    }
}

pub trait SubmissionFeed {
    /// Submissions of `handle`, freshest first.
    fn submissions(&self, handle: &Handle) -> Result<Vec<Submission>, String>;

    /// The user's rating on the judge itself, if rated.
    fn judge_rating(&self, handle: &Handle) -> Result<Option<i32>, String>;
}

pub trait HandleResolver {
    fn resolve(&self, user: UserId) -> Result<Handle, String>;
}
