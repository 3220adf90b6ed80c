//! Native host manifest installer, driven by the embedded `browsers.toml`.

pub mod manifest;
pub mod paths;

#[cfg(all(windows, feature = "windows-registry"))]
pub mod winreg;

pub use manifest::*;
pub use paths::*;
