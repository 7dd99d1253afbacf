// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 ® John Hauger Mitander <john@oxidity.com>

pub mod gas;
pub mod ingest;
pub use ingest::{peer_relay, pending_logs, txpool};

pub mod provider;
pub mod reconnect;
pub mod transport;
