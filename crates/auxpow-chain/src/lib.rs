// SPDX-License-Identifier: MIT

//! # AuxPow Chain
//! This crate provides the consensus logic for merge-mined proof-of-work: the
//! [AuxPow] evidence object carried by auxiliary block headers, the verifier
//! that decides whether a parent-chain block really committed to an auxiliary
//! block, and the builder that synthesizes minimal valid evidence for mining
//! and testing.
//!
//! The main entry points are [AuxBlockHeader::verify_auxpow] for full
//! header-level validation and [AuxPow::check] for the raw commitment check.
//! Everything here is pure and synchronous; once constructed, an [AuxPow] is
//! immutable and safe to share across threads.

pub mod merged_mining;

pub(crate) use auxpow_common::prelude;
pub use merged_mining::auxpow::*;
pub use merged_mining::chainparams::*;
pub use merged_mining::error::*;
pub use merged_mining::header::*;
pub use merged_mining::merkle::*;
pub use merged_mining::parent::*;
pub use merged_mining::stake::*;
