use once_cell::sync::Lazy;
use serde::Deserialize;
use std::{collections::BTreeMap, io, path::PathBuf};

const BROWSERS_TOML: &str = include_str!("browsers.toml");

/// Env vars that may appear as `$NAME` in directory templates.
const TEMPLATE_VARS: &[&str] = &["LOCALAPPDATA", "PROGRAMDATA", "APPDATA", "HOME"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    User,
    System,
}

/// Decides which allowlist field a manifest carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Family {
    /// `allowed_origins`: `chrome-extension://<id>/`
    Chromium,
    /// `allowed_extensions`: addon ids
    Firefox,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct ScopeDirs {
    user: Option<String>,
    system: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BrowserConfig {
    pub family: Family,
    pub registry: Option<String>,
    #[serde(default)]
    linux: ScopeDirs,
    #[serde(default)]
    macos: ScopeDirs,
    #[serde(default)]
    windows: ScopeDirs,
}

impl BrowserConfig {
    fn dirs(&self) -> &ScopeDirs {
        if cfg!(target_os = "windows") {
            &self.windows
        } else if cfg!(target_os = "macos") {
            &self.macos
        } else {
            &self.linux
        }
    }
}

#[derive(Deserialize)]
struct BrowsersFile {
    browsers: BTreeMap<String, BrowserConfig>,
}

static BROWSERS: Lazy<Result<BTreeMap<String, BrowserConfig>, String>> = Lazy::new(|| {
    toml::from_str::<BrowsersFile>(BROWSERS_TOML)
        .map(|f| f.browsers)
        .map_err(|e| e.to_string())
});

fn browsers() -> io::Result<&'static BTreeMap<String, BrowserConfig>> {
    BROWSERS
        .as_ref()
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, format!("browsers.toml: {e}")))
}

/// Keys accepted wherever a browser name is expected.
pub fn known_browsers() -> io::Result<Vec<&'static str>> {
    Ok(browsers()?.keys().map(String::as_str).collect())
}

pub fn browser_config(browser: &str) -> io::Result<&'static BrowserConfig> {
    browsers()?.get(browser).ok_or_else(|| {
        io::Error::new(io::ErrorKind::NotFound, format!("unknown browser {browser:?}"))
    })
}

fn expand(template: &str) -> io::Result<PathBuf> {
    let mut out = template.to_string();
    for var in TEMPLATE_VARS {
        let token = format!("${var}");
        if out.contains(&token) {
            let value = std::env::var(var).map_err(|_| {
                io::Error::new(io::ErrorKind::NotFound, format!("{var} not set"))
            })?;
            out = out.replace(&token, &value);
        }
    }
    Ok(PathBuf::from(out))
}

/// Directory holding manifests for `browser` in `scope` on this OS.
pub fn manifest_dir(browser: &str, scope: Scope) -> io::Result<PathBuf> {
    let dirs = browser_config(browser)?.dirs();
    let template = match scope {
        Scope::User => dirs.user.as_deref(),
        Scope::System => dirs.system.as_deref(),
    }
    .ok_or_else(|| {
        io::Error::new(
            io::ErrorKind::Unsupported,
            format!("{browser} has no {scope:?} manifest location on this OS"),
        )
    })?;
    expand(template)
}

pub fn manifest_path(browser: &str, scope: Scope, name: &str) -> io::Result<PathBuf> {
    Ok(manifest_dir(browser, scope)?.join(format!("{name}.json")))
}

/// Registry key (relative to HKCU/HKLM) that points at the manifest on Windows.
pub fn winreg_key_path(browser: &str, _scope: Scope, name: &str) -> io::Result<String> {
    let registry = browser_config(browser)?.registry.as_deref().ok_or_else(|| {
        io::Error::new(io::ErrorKind::Unsupported, format!("{browser} has no registry key"))
    })?;
    Ok(format!(r"{registry}\{name}"))
}
