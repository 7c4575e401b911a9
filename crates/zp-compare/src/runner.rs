//! Boundary to the engines that produce transcripts.

use std::time::Instant;

use crate::error::RunnerError;
use crate::transcript::{Side, Transcript};

/// Produces transcripts by playing a command sequence on one engine.
///
/// Runners are shared across worker threads. A runner that reaches
/// `deadline` before all commands are played returns the blocks captured so
/// far with [`Transcript::timed_out`] set rather than an error.
pub trait SessionRunner: Sync {
    fn run(
        &self,
        side: Side,
        seed: u64,
        commands: &[String],
        deadline: Instant,
    ) -> Result<Transcript, RunnerError>;
}

impl<T: SessionRunner + ?Sized> SessionRunner for &T {
    fn run(
        &self,
        side: Side,
        seed: u64,
        commands: &[String],
        deadline: Instant,
    ) -> Result<Transcript, RunnerError> {
        (**self).run(side, seed, commands, deadline)
    }
}
