//! Git abstraction layer for bgav.
//!
//! This crate defines the [`GitRepo`] trait, the single interface through
//! which the versioning engine interacts with git. The engine never imports
//! gix (or shells out to git) directly; it depends on `bgav-git` and programs
//! against the trait.
//!
//! # Crate layout
//!
//! - [`repo`]: the [`GitRepo`] trait definition.
//! - [`types`]: value types used in trait signatures ([`GitOid`], [`Branch`],
//!   [`HeadState`], [`Credentials`], etc.).
//! - [`error`]: the [`GitError`] enum returned by all trait methods.

pub mod error;
pub mod repo;
pub mod types;

// gix-backed implementation modules
mod cli;
mod gix_repo;
mod refs_impl;
mod status_impl;

pub use gix_repo::GixRepo;

// Re-export the main trait and commonly used types at the crate root for
// ergonomic imports: `use bgav_git::{GitRepo, GitOid, GitError};`
pub use error::GitError;
pub use repo::GitRepo;
pub use types::{
    Branch, BranchScope, Credentials, FileStatus, GitOid, HeadState, OidParseError, StatusEntry,
    authenticated_url,
};
