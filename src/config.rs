/// Options for [`crate::compile`].
///
/// The CLI maps its flags onto these; library callers usually start
/// from `CompileOptions::default()`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompileOptions {
    /// Run constant folding and dead-branch removal before generating.
    pub optimize: bool,
    /// Generate output even when error diagnostics exist.
    pub force: bool,
    /// Attach "did you mean" and closing hints to diagnostics.
    pub suggest: bool,
}

impl CompileOptions {
    #[must_use]
    pub const fn with_optimize(mut self, optimize: bool) -> Self {
        self.optimize = optimize;
        self
    }

    #[must_use]
    pub const fn with_force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }

    #[must_use]
    pub const fn with_suggest(mut self, suggest: bool) -> Self {
        self.suggest = suggest;
        self
    }
}

impl Default for CompileOptions {
    fn default() -> Self {
        Self {
            optimize: false,
            force: false,
            suggest: true,
        }
    }
}
