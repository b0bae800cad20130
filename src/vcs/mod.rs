//! Version control integration
//!
//! Restores recordings after confirmed failures and publishes refreshed ones
//! to the shared remote.

mod git;
mod publish;

pub use git::{GitCli, VcsError, VersionControl};
pub use publish::{CommitDescriptor, Publisher, RetryPolicy};
