//! Teardown chaining and advisory cleanup results.

use std::fmt;

use crate::env::Environment;
use crate::{Biome, BiomeError, Context, Descriptor, Dirs, Invocation};

/// A cleanup step that failed without affecting the build outcome.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Advisory {
    pub step: String,
    pub message: String,
}

impl fmt::Display for Advisory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.step, self.message)
    }
}

/// Result of tearing a biome down. Never an error: failures are advisories.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Teardown {
    pub advisories: Vec<Advisory>,
}

impl Teardown {
    pub fn clean() -> Self {
        Self::default()
    }

    pub fn is_clean(&self) -> bool {
        self.advisories.is_empty()
    }

    /// Record a best-effort failure and log it as a warning.
    pub fn warn(&mut self, step: impl Into<String>, err: impl fmt::Display) {
        let advisory = Advisory {
            step: step.into(),
            message: err.to_string(),
        };
        tracing::warn!("{}", advisory);
        self.advisories.push(advisory);
    }

    pub fn extend(&mut self, other: Teardown) {
        self.advisories.extend(other.advisories);
    }
}

/// A biome that owns resources which must be released after the build.
///
/// The owner calls [`BiomeCloser::close`] exactly once, after every command
/// for the target has finished.
pub trait BiomeCloser: Biome {
    fn close(&self) -> Teardown;
}

type CleanupFn = Box<dyn Fn(&dyn BiomeCloser) -> Teardown + Send + Sync>;

/// Adds a teardown action on top of a biome's own.
///
/// The action registered here runs before the wrapped biome's teardown, so
/// the most recently registered action always runs first.
pub struct WithClose {
    inner: Box<dyn BiomeCloser>,
    cleanup: CleanupFn,
}

/// Register `cleanup` to run when the returned biome is closed. The action
/// receives the wrapped biome so it can run commands inside it.
pub fn with_close<F>(bio: Box<dyn BiomeCloser>, cleanup: F) -> Box<dyn BiomeCloser>
where
    F: Fn(&dyn BiomeCloser) -> Teardown + Send + Sync + 'static,
{
    Box::new(WithClose {
        inner: bio,
        cleanup: Box::new(cleanup),
    })
}

impl Biome for WithClose {
    fn describe(&self) -> Descriptor {
        self.inner.describe()
    }

    fn dirs(&self) -> &Dirs {
        self.inner.dirs()
    }

    fn join_path(&self, parts: &[&str]) -> String {
        self.inner.join_path(parts)
    }

    fn run(&self, ctx: &Context, invocation: Invocation<'_>) -> Result<(), BiomeError> {
        self.inner.run(ctx, invocation)
    }

    fn write_file(&self, ctx: &Context, path: &str, data: &[u8]) -> Result<(), BiomeError> {
        self.inner.write_file(ctx, path, data)
    }

    fn environment(&self) -> Environment {
        self.inner.environment()
    }
}

impl BiomeCloser for WithClose {
    fn close(&self) -> Teardown {
        let mut teardown = (self.cleanup)(self.inner.as_ref());
        teardown.extend(self.inner.close());
        teardown
    }
}
