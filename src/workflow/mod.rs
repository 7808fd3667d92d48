pub mod document;
pub mod mutate;

pub use document::{parse_set_pairs, JobDocument};
pub use mutate::{mutate, MutationOutcome, MutationTarget, SamplerOverrides};
