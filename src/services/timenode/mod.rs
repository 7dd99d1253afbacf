// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 ® John Hauger Mitander <john@mitander.dev>

pub mod actions;
pub mod buckets;
pub mod cache;
pub mod economic;
pub mod engine;
pub mod ledger;
pub mod router;
pub mod scanner;
pub mod stats;
pub mod wallet;

pub use engine::{TimeNode, TimeNodeConfig, TimeNodeParts};
pub use router::RequestStatus;
