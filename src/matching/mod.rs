pub mod duplicates;
pub mod merge;
pub mod scorer;

pub use duplicates::{find_duplicates, DuplicateCandidate};
pub use merge::{absorb_external, merge};
pub use scorer::{score, Signal, SignalKind, SimilarityScore, DUPLICATE_THRESHOLD};
