// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 ® John Hauger Mitander <john@oxidity.com>

pub mod peer_relay;
pub mod pending_logs;
pub mod txpool;
