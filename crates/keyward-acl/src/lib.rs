// SPDX-FileCopyrightText: 2026 Keyward Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Access control lists for Keyward stores and keys.
//!
//! An [`Acl`] is an owner subject plus a list of [`Entry`] values, each pairing
//! a set of authorization tags with a [`Subject`]. Validation may rewrite the
//! ACL it ran against: remembered prompt answers and trust upgrades come back
//! as [`Outcome::GrantedAclRewritten`] for the holder to apply under its own
//! lock with [`Acl::apply_upgrades`].

pub mod acl;
pub mod context;
pub mod heuristic;
pub mod subject;

pub use acl::{Acl, AclEdit, Entry, USAGE_TAGS, try_upgrade};
pub use context::{AclEnvironment, Outcome, ValidationContext};
pub use heuristic::LegacyGroupHeuristic;
pub use subject::{MAX_SUBJECT_DEPTH, SecretDigest, Subject};
