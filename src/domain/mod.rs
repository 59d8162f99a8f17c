pub mod matching;

pub use matching::MatchType;
