// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 ® John Hauger Mitander <john@mitander.dev>

use regex::Regex;
use std::fs;
use std::path::Path;

/// Fail CI if a committed settings file carries operator keys.
#[test]
fn no_committed_wallet_keys_in_configs() {
    let re = Regex::new(r"0x?[a-fA-F0-9]{64}").unwrap();
    let candidates = [
        "timenode.toml",
        "timenode.yaml",
        "timenode.json",
        "timenode.example.toml",
    ];
    for file in candidates {
        if !Path::new(file).exists() {
            continue;
        }
        let body = fs::read_to_string(file).expect("read config");
        for (idx, line) in body.lines().enumerate() {
            if re.is_match(line) {
                panic!("Secret-looking hex in {} at line {}", file, idx + 1);
            }
        }
    }
}
