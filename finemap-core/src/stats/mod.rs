//! Summary statistics on their way to the fitter: extraction, threshold
//! filtering and effect-size normalization.

pub mod extract;
pub mod filter;
pub mod normalize;

pub use extract::SummaryStatisticsExtractor;
pub use filter::{apply_thresholds, Exclusion, FilterOutcome};
pub use normalize::{prepare, PreparedStat};
