//! Pipeline configuration.

use pare_argprop::PropagatorOptions;
use pare_enum::UnboxerOptions;
use pare_merge::MergerOptions;

/// What the pipeline runs and with how many workers.
///
/// Pass-local option structs are derived from this one, so a caller only
/// ever configures the pipeline here.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Options {
    /// Worker threads. `None` uses the available parallelism.
    pub jobs: Option<usize>,
    pub horizontal_class_merging: bool,
    /// Merge groups larger than this are split.
    pub max_group_size: usize,
    pub enum_unboxing: bool,
    /// Stop collecting rejection reasons for an enum after the first one.
    pub enum_unboxing_early_exit: bool,
    pub argument_propagation: bool,
    /// Parameters and fields depending on more sources are unknown.
    pub max_in_flow_size: usize,
    /// Check after every pass that the lens chain still leads each
    /// surviving member back to its original.
    pub verify_lenses: bool,
}

impl Default for Options {
    fn default() -> Self {
        Options {
            jobs: None,
            horizontal_class_merging: true,
            max_group_size: MergerOptions::default().max_group_size,
            enum_unboxing: true,
            enum_unboxing_early_exit: false,
            argument_propagation: true,
            max_in_flow_size: PropagatorOptions::default().max_in_flow_size,
            verify_lenses: false,
        }
    }
}

impl Options {
    /// Defaults, overridden by `PARE_JOBS` and the `PARE_DISABLE_*`
    /// variables.
    pub fn from_env() -> Self {
        Options::default().with_env(|key| std::env::var(key).ok())
    }

    /// Apply the overrides `lookup` finds.
    #[must_use]
    pub fn with_env(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(value) = lookup("PARE_JOBS") {
            match value.trim().parse::<usize>() {
                Ok(jobs) if jobs > 0 => self.jobs = Some(jobs),
                _ => tracing::warn!(%value, "ignoring invalid PARE_JOBS"),
            }
        }
        let disabled = |key: &str| lookup(key).is_some_and(|value| is_enabled(&value));
        if disabled("PARE_DISABLE_HORIZONTAL_CLASS_MERGING") {
            self.horizontal_class_merging = false;
        }
        if disabled("PARE_DISABLE_ENUM_UNBOXING") {
            self.enum_unboxing = false;
        }
        if disabled("PARE_DISABLE_ARGUMENT_PROPAGATION") {
            self.argument_propagation = false;
        }
        self
    }

    // ── Builders ────────────────────────────────────────────────

    #[must_use]
    pub fn with_jobs(mut self, jobs: usize) -> Self {
        self.jobs = Some(jobs);
        self
    }

    #[must_use]
    pub fn with_horizontal_class_merging(mut self, enabled: bool) -> Self {
        self.horizontal_class_merging = enabled;
        self
    }

    #[must_use]
    pub fn with_max_group_size(mut self, max_group_size: usize) -> Self {
        self.max_group_size = max_group_size;
        self
    }

    #[must_use]
    pub fn with_enum_unboxing(mut self, enabled: bool) -> Self {
        self.enum_unboxing = enabled;
        self
    }

    #[must_use]
    pub fn with_enum_unboxing_early_exit(mut self, early_exit: bool) -> Self {
        self.enum_unboxing_early_exit = early_exit;
        self
    }

    #[must_use]
    pub fn with_argument_propagation(mut self, enabled: bool) -> Self {
        self.argument_propagation = enabled;
        self
    }

    #[must_use]
    pub fn with_max_in_flow_size(mut self, max_in_flow_size: usize) -> Self {
        self.max_in_flow_size = max_in_flow_size;
        self
    }

    #[must_use]
    pub fn with_lens_verification(mut self, enabled: bool) -> Self {
        self.verify_lenses = enabled;
        self
    }

    // ── Pass options ────────────────────────────────────────────

    pub fn merger_options(&self) -> MergerOptions {
        MergerOptions {
            max_group_size: self.max_group_size,
        }
    }

    pub fn unboxer_options(&self) -> UnboxerOptions {
        UnboxerOptions {
            early_exit: self.enum_unboxing_early_exit,
            ..UnboxerOptions::default()
        }
    }

    pub fn propagator_options(&self) -> PropagatorOptions {
        PropagatorOptions {
            max_in_flow_size: self.max_in_flow_size,
        }
    }
}

/// `1`, `true`, `yes` and any other non-empty value except `0` and `false`.
fn is_enabled(value: &str) -> bool {
    let value = value.trim();
    !(value.is_empty() || value == "0" || value.eq_ignore_ascii_case("false"))
}

#[cfg(test)]
mod tests;
