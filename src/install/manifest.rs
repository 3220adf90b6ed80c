use super::paths::{self, Family, Scope};
use serde::{Deserialize, Serialize};
use std::{fs, io, path::Path, path::PathBuf};
use tracing::{debug, info};

/// A native messaging host manifest.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Manifest {
    pub name: String,
    pub description: String,
    pub path: PathBuf,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub allowed_origins: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub allowed_extensions: Option<Vec<String>>,
}

impl Manifest {
    /// Build the manifest for one browser family. Only the family's allowlist
    /// is written.
    pub fn for_family(
        family: Family,
        name: &str,
        description: &str,
        exe_path: &Path,
        allowed_origins: &[String],
        allowed_extensions: &[String],
    ) -> Self {
        let (allowed_origins, allowed_extensions) = match family {
            Family::Chromium => (Some(allowed_origins.to_vec()), None),
            Family::Firefox => (None, Some(allowed_extensions.to_vec())),
        };
        Self {
            name: name.to_string(),
            description: description.to_string(),
            path: exe_path.to_path_buf(),
            kind: "stdio".to_string(),
            allowed_origins,
            allowed_extensions,
        }
    }
}

/// Installs the host manifest for each of `browsers`.
///
/// # Examples
///
/// ```no_run
/// use proof_of_device::install::{install, Scope};
/// use std::path::Path;
///
/// install(
///     "pod_app",
///     "Proof of device native host",
///     Path::new("/usr/local/bin/pod-app"),
///     &["chrome-extension://aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa/".to_string()],
///     &["pod@example.org".to_string()],
///     &["chrome", "firefox"],
///     Scope::User,
/// )
/// .expect("install manifests");
/// ```
pub fn install(
    name: &str,
    description: &str,
    exe_path: &Path,
    allowed_origins: &[String],
    allowed_extensions: &[String],
    browsers: &[&str],
    scope: Scope,
) -> io::Result<()> {
    if cfg!(unix) && !exe_path.is_absolute() {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            "native host path must be absolute on macOS/Linux",
        ));
    }

    for &browser in browsers {
        let family = paths::browser_config(browser)?.family;
        let manifest_file = paths::manifest_path(browser, scope, name)?;
        if let Some(dir) = manifest_file.parent() {
            fs::create_dir_all(dir)?;
        }
        let manifest = Manifest::for_family(
            family,
            name,
            description,
            exe_path,
            allowed_origins,
            allowed_extensions,
        );
        let manifest_json = serde_json::to_string_pretty(&manifest)?;
        fs::write(&manifest_file, manifest_json)?;

        #[cfg(all(windows, feature = "windows-registry"))]
        super::winreg::write_manifest_reg(
            scope,
            &paths::winreg_key_path(browser, scope, name)?,
            &manifest_file,
        )?;

        info!(browser, path = %manifest_file.display(), "installed native host manifest");
    }
    Ok(())
}

/// Whether a manifest for `name` is installed for any of `browsers`
/// (all known browsers when `None`).
pub fn verify_installed(name: &str, browsers: Option<&[&str]>, scope: Scope) -> io::Result<bool> {
    let all;
    let browsers = match browsers {
        Some(b) => b,
        None => {
            all = paths::known_browsers()?;
            &all[..]
        }
    };
    for &browser in browsers {
        let manifest_file = match paths::manifest_path(browser, scope, name) {
            Ok(p) => p,
            Err(e) if e.kind() == io::ErrorKind::Unsupported => continue,
            Err(e) => return Err(e),
        };
        if !manifest_file.exists() {
            continue;
        }

        #[cfg(all(windows, feature = "windows-registry"))]
        {
            let key_path = paths::winreg_key_path(browser, scope, name)?;
            match super::winreg::read_manifest_path_from_reg(scope, &key_path)? {
                Some(p) if p.exists() => {}
                _ => continue,
            }
        }

        debug!(browser, path = %manifest_file.display(), "manifest present");
        return Ok(true);
    }
    Ok(false)
}

/// Read back the installed manifest for one browser.
pub fn read_manifest(name: &str, browser: &str, scope: Scope) -> io::Result<Manifest> {
    let raw = fs::read_to_string(paths::manifest_path(browser, scope, name)?)?;
    Ok(serde_json::from_str(&raw)?)
}

/// Removes the manifest file for each of `browsers`. Missing files are fine.
pub fn remove(name: &str, browsers: &[&str], scope: Scope) -> io::Result<()> {
    for &browser in browsers {
        let manifest_file = paths::manifest_path(browser, scope, name)?;
        if manifest_file.exists() {
            fs::remove_file(&manifest_file)?;
            info!(browser, path = %manifest_file.display(), "removed native host manifest");
        }

        #[cfg(all(windows, feature = "windows-registry"))]
        super::winreg::remove_manifest_reg(scope, &paths::winreg_key_path(browser, scope, name)?)?;
    }
    Ok(())
}
