//! Benchmark execution engine

pub mod batch;
pub mod prompts;
pub mod rate_limiter;

pub use batch::{fold_verdicts, BatchRunner, RunError, RunOutcome, RunnerConfig};
pub use prompts::{choice_prompt, verdict_prompt};
pub use rate_limiter::RateLimiter;
