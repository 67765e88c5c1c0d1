// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Mark Wells <contact@markwells.dev>

//! Build script that embeds git version info into the binary.
//!
//! Sets `WORDLINT_VERSION` from `git describe --tags --always --dirty`:
//! - `0.4.1` on a release tag
//! - `0.4.1-3-gabc1234` when commits follow the tag
//! - `0.4.1-3-gabc1234-dirty` with local edits
//!
//! Outside a git checkout the version is `CARGO_PKG_VERSION`.

use std::process::Command;

fn main() {
    // Re-run after commits, checkouts and new tags
    println!("cargo:rerun-if-changed=.git/HEAD");
    println!("cargo:rerun-if-changed=.git/refs");

    // `wordlint --version` prints this through clap
    let version = git_describe().unwrap_or_else(|| env!("CARGO_PKG_VERSION").to_string());
    println!("cargo:rustc-env=WORDLINT_VERSION={version}");
}

fn git_describe() -> Option<String> {
    let output = Command::new("git")
        .args(["describe", "--tags", "--always", "--dirty"])
        .output()
        .ok()?;

    // Not a repository, or git refused
    if !output.status.success() {
        return None;
    }

    let desc = String::from_utf8(output.stdout).ok()?;
    let desc = desc.trim();

    if desc.is_empty() {
        return None;
    }

    // Strip leading 'v' from tags like v0.4.1
    Some(desc.strip_prefix('v').unwrap_or(desc).to_string())
}
