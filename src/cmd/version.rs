//! `foremandns version`

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Build date stamped by build.rs
pub const BUILD_DATE: &str = env!("FOREMANDNS_BUILD_DATE");

pub fn version_string() -> String {
    format!("foremandns {} Build date {}", VERSION, BUILD_DATE)
}

pub fn run() {
    println!("{}", version_string());
}
