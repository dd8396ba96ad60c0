//! Build script for binkeeper.
//!
//! Sets `BINKEEPER_RUSTC_VERSION` to the version of the compiler building the
//! crate, for the HTTP user agent.

use std::process::Command;

fn main() {
    let rustc = std::env::var("RUSTC").unwrap_or_else(|_| "rustc".to_string());

    // `rustc --version` prints e.g. "rustc 1.85.0 (4d91de4e4 2025-02-17)"
    let version = Command::new(rustc)
        .arg("--version")
        .output()
        .ok()
        .filter(|output| output.status.success())
        .and_then(|output| String::from_utf8(output.stdout).ok())
        .and_then(|stdout| stdout.split_whitespace().nth(1).map(str::to_string))
        .unwrap_or_else(|| "unknown".to_string());

    println!("cargo:rustc-env=BINKEEPER_RUSTC_VERSION={version}");
    println!("cargo:rerun-if-env-changed=RUSTC");
}
