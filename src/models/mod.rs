//! Domain types shared by the registry, the change detector and the formatter.
//!
//! - `state`: RepoId, Branch, Revision, HeadState, FollowedState
//! - `change`: ChangeReport, one per repository that advanced during a poll

pub mod change;
pub mod state;

pub use change::*;
pub use state::*;
