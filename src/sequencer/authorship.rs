//! Scoped ownership of the author/committer date overrides.
//!
//! Git reads `GIT_AUTHOR_DATE` and `GIT_COMMITTER_DATE` from its environment.
//! The values are never written into this process's environment; a step
//! borrows the [`AuthorshipContext`] for the length of its stage and commit,
//! and backends copy the held pair onto the child commit process only. The
//! borrow makes the scope exclusive and dropping it releases the overrides.

use super::SequenceError;

/// Environment variable git reads the author date from.
pub const AUTHOR_DATE_VAR: &str = "GIT_AUTHOR_DATE";
/// Environment variable git reads the committer date from.
pub const COMMITTER_DATE_VAR: &str = "GIT_COMMITTER_DATE";

/// The timestamp pair recorded on one commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Authorship {
    pub author_date: String,
    pub committer_date: String,
}

impl Authorship {
    /// Variables to set on the git process, in a fixed order.
    pub fn env_vars(&self) -> [(&'static str, &str); 2] {
        [
            (AUTHOR_DATE_VAR, self.author_date.as_str()),
            (COMMITTER_DATE_VAR, self.committer_date.as_str()),
        ]
    }
}

/// Tracks which step, if any, currently holds the overrides.
#[derive(Debug, Default)]
pub struct AuthorshipContext {
    holder: Option<Holder>,
}

/// The step holding the overrides, kept so a leak can be reported by name.
#[derive(Debug)]
struct Holder {
    step: usize,
    message: String,
}

impl AuthorshipContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Hand the overrides to `step` until the returned scope is dropped.
    pub fn acquire(
        &mut self,
        step: usize,
        message: &str,
        authorship: Authorship,
    ) -> AuthorshipScope<'_> {
        self.holder = Some(Holder {
            step,
            message: message.to_string(),
        });
        AuthorshipScope {
            context: self,
            step,
            authorship,
        }
    }

    /// Step currently holding the overrides.
    pub fn holder(&self) -> Option<usize> {
        self.holder.as_ref().map(|h| h.step)
    }

    pub fn is_released(&self) -> bool {
        self.holder.is_none()
    }

    /// Fail if a scope was leaked instead of dropped.
    pub fn ensure_released(&self) -> Result<(), SequenceError> {
        match &self.holder {
            None => Ok(()),
            Some(holder) => Err(SequenceError::EnvironmentCleanup {
                step: holder.step,
                message: holder.message.clone(),
            }),
        }
    }
}

/// A step's exclusive hold on the overrides.
#[derive(Debug)]
pub struct AuthorshipScope<'a> {
    context: &'a mut AuthorshipContext,
    step: usize,
    authorship: Authorship,
}

impl AuthorshipScope<'_> {
    pub fn step(&self) -> usize {
        self.step
    }

    pub fn authorship(&self) -> &Authorship {
        &self.authorship
    }

    pub fn env_vars(&self) -> [(&'static str, &str); 2] {
        self.authorship.env_vars()
    }
}

impl Drop for AuthorshipScope<'_> {
    fn drop(&mut self) {
        self.context.holder = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pair(author: &str, committer: &str) -> Authorship {
        Authorship {
            author_date: author.to_string(),
            committer_date: committer.to_string(),
        }
    }

    #[test]
    fn test_scope_releases_on_drop() {
        let mut context = AuthorshipContext::new();
        {
            let scope = context.acquire(
                3,
                "add b",
                pair("2025-01-01T10:00:00", "2025-01-01T10:01:00"),
            );
            assert_eq!(scope.step(), 3);
            assert_eq!(
                scope.env_vars(),
                [
                    (AUTHOR_DATE_VAR, "2025-01-01T10:00:00"),
                    (COMMITTER_DATE_VAR, "2025-01-01T10:01:00"),
                ]
            );
        }
        assert!(context.is_released());
        assert!(context.ensure_released().is_ok());
    }

    #[test]
    fn test_scope_releases_on_early_return() {
        fn failing_step(context: &mut AuthorshipContext) -> Result<(), &'static str> {
            let _scope = context.acquire(
                1,
                "init",
                pair("2025-01-01T10:00:00", "2025-01-01T10:00:00"),
            );
            Err("commit refused")
        }

        let mut context = AuthorshipContext::new();
        assert!(failing_step(&mut context).is_err());
        assert!(context.is_released());
    }

    #[test]
    fn test_leaked_scope_is_reported() {
        let mut context = AuthorshipContext::new();
        let scope = context.acquire(
            2,
            "update a",
            pair("2025-01-01T10:00:00", "2025-01-01T10:00:00"),
        );
        std::mem::forget(scope);

        assert_eq!(context.holder(), Some(2));
        assert!(matches!(
            context.ensure_released(),
            Err(SequenceError::EnvironmentCleanup { step: 2, ref message })
                if message == "update a"
        ));
    }

    #[test]
    fn test_overrides_never_touch_process_environment() {
        let mut context = AuthorshipContext::new();
        let before_author = std::env::var_os(AUTHOR_DATE_VAR);
        let before_committer = std::env::var_os(COMMITTER_DATE_VAR);
        {
            let _scope = context.acquire(
                1,
                "init",
                pair("1999-12-31T23:59:59", "1999-12-31T23:59:59"),
            );
            assert_eq!(std::env::var_os(AUTHOR_DATE_VAR), before_author);
            assert_eq!(std::env::var_os(COMMITTER_DATE_VAR), before_committer);
        }
    }
}
