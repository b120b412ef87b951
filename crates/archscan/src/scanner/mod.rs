//! Scanner invocation, rule packs and report parsing.

pub mod result;
pub mod ruleset;
pub mod runner;

pub use result::{normalize, ClassificationList, Finding, ScanReport};
pub use ruleset::Ruleset;
pub use runner::{strip_workdir_prefix, ScanRunner};
