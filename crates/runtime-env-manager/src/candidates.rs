//! Tiered candidate plans for Python discovery
//!
//! A plan is generated fresh for each lookup from a [`HostLayout`]. Order
//! inside the plan is the search order; the locator stops at the first hit.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

/// Python minor versions probed for versioned installs, newest first.
const VERSIONS: &[(u8, u8)] = &[(3, 13), (3, 12), (3, 11), (3, 10), (3, 9), (3, 8)];

/// Package family of the Python Software Foundation Store builds.
const STORE_PACKAGE_PREFIX: &str = "PythonSoftwareFoundation.Python.";
const STORE_PUBLISHER_ID: &str = "qbz5n2kfra8p0";

/// Trust tier of a candidate, most specific first.
///
/// The derived ordering follows declaration order, so `Override < PathResolved`
/// means "consulted earlier".
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CandidateTier {
    /// Explicit user configuration
    Override,
    /// Found by resolving a command name against PATH
    PathResolved,
    /// Platform store per-user install (Microsoft Store)
    PlatformStore,
    /// Per-user install of a specific Python version
    UserVersioned,
    /// System-wide install of a specific Python version
    SystemVersioned,
    /// Conda, pyenv, Scoop, Chocolatey, Homebrew and friends
    PackageManager,
    /// Bare command name, resolved through PATH at launch
    BareCommand,
}

impl CandidateTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            CandidateTier::Override => "override",
            CandidateTier::PathResolved => "path-resolved",
            CandidateTier::PlatformStore => "platform-store",
            CandidateTier::UserVersioned => "user-versioned",
            CandidateTier::SystemVersioned => "system-versioned",
            CandidateTier::PackageManager => "package-manager",
            CandidateTier::BareCommand => "bare-command",
        }
    }
}

impl fmt::Display for CandidateTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a candidate points at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CandidateTarget {
    /// Absolute filesystem location
    Path(PathBuf),
    /// Command name to be looked up on PATH
    Command(String),
}

/// One entry of a search plan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeCandidate {
    pub tier: CandidateTier,
    pub target: CandidateTarget,
}

impl RuntimeCandidate {
    fn path(tier: CandidateTier, path: PathBuf) -> Self {
        RuntimeCandidate {
            tier,
            target: CandidateTarget::Path(path),
        }
    }

    fn command(name: &str) -> Self {
        RuntimeCandidate {
            tier: CandidateTier::BareCommand,
            target: CandidateTarget::Command(name.to_string()),
        }
    }
}

/// Host platform family, as far as install layouts are concerned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Windows,
    MacOs,
    Linux,
}

impl Platform {
    /// Platform this binary was compiled for.
    pub fn current() -> Self {
        if cfg!(target_os = "windows") {
            Platform::Windows
        } else if cfg!(target_os = "macos") {
            Platform::MacOs
        } else {
            Platform::Linux
        }
    }
}

/// Directories that anchor every candidate path.
///
/// Tests point these at a temporary directory so the whole plan can be
/// materialised without touching the real system.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostLayout {
    pub platform: Platform,
    /// User home directory
    pub home: PathBuf,
    /// Filesystem root (`C:\` on Windows, `/` elsewhere)
    pub system_root: PathBuf,
}

impl HostLayout {
    /// Layout of the machine we are running on.
    pub fn detect() -> Self {
        let platform = Platform::current();
        let system_root = match platform {
            Platform::Windows => std::env::var_os("SystemDrive")
                .map(|drive| {
                    let mut root = drive.into_string().unwrap_or_else(|_| "C:".to_string());
                    root.push('\\');
                    PathBuf::from(root)
                })
                .unwrap_or_else(|| PathBuf::from("C:\\")),
            _ => PathBuf::from("/"),
        };
        HostLayout {
            platform,
            home: dirs::home_dir().unwrap_or_else(|| system_root.clone()),
            system_root,
        }
    }

    /// Layout rooted under `root`, with the home directory at `root/home`.
    pub fn rooted_at(platform: Platform, root: &Path) -> Self {
        HostLayout {
            platform,
            home: root.join("home"),
            system_root: root.to_path_buf(),
        }
    }

    fn local_app_data(&self) -> PathBuf {
        self.home.join("AppData").join("Local")
    }
}

/// Command names resolved against PATH before the static plan, in priority order.
///
/// Only Windows resolves PATH up front, where `where` also reports Store
/// redirectors. Unix hosts reach PATH through the bare-command tier at the
/// end of their plan.
pub fn path_commands(platform: Platform) -> &'static [&'static str] {
    match platform {
        Platform::Windows => &["python", "python3", "py"],
        Platform::MacOs | Platform::Linux => &[],
    }
}

/// Build the static search plan for a host, in search order.
pub fn candidate_plan(layout: &HostLayout) -> Vec<RuntimeCandidate> {
    match layout.platform {
        Platform::Windows => windows_plan(layout),
        Platform::MacOs | Platform::Linux => unix_plan(layout),
    }
}

fn windows_plan(layout: &HostLayout) -> Vec<RuntimeCandidate> {
    use CandidateTier::*;

    let home = &layout.home;
    let root = &layout.system_root;
    let local = layout.local_app_data();
    let mut plan = Vec::new();

    // Per-package aliases only exist for a real Store install; the bare
    // python.exe/python3.exe next to them are redirectors.
    let store = local.join("Microsoft").join("WindowsApps");
    for (major, minor) in VERSIONS.iter().take(5) {
        plan.push(RuntimeCandidate::path(
            PlatformStore,
            store
                .join(format!(
                    "{STORE_PACKAGE_PREFIX}{major}.{minor}_{STORE_PUBLISHER_ID}"
                ))
                .join("python.exe"),
        ));
    }

    for (major, minor) in VERSIONS {
        plan.push(RuntimeCandidate::path(
            UserVersioned,
            local
                .join("Programs")
                .join("Python")
                .join(format!("Python{major}{minor}"))
                .join("python.exe"),
        ));
    }

    for (major, minor) in VERSIONS {
        let dir = format!("Python{major}{minor}");
        for base in [
            root.clone(),
            root.join("Program Files"),
            root.join("Program Files (x86)"),
        ] {
            plan.push(RuntimeCandidate::path(
                SystemVersioned,
                base.join(&dir).join("python.exe"),
            ));
        }
    }

    for dist in ["anaconda3", "miniconda3", "Anaconda3", "Miniconda3"] {
        plan.push(RuntimeCandidate::path(
            PackageManager,
            home.join(dist).join("python.exe"),
        ));
    }
    for dist in ["anaconda3", "miniconda3"] {
        plan.push(RuntimeCandidate::path(
            PackageManager,
            root.join("ProgramData").join(dist).join("python.exe"),
        ));
    }
    for dist in ["Anaconda3", "Miniconda3"] {
        plan.push(RuntimeCandidate::path(
            PackageManager,
            root.join(dist).join("python.exe"),
        ));
    }

    let pyenv = home.join(".pyenv").join("pyenv-win");
    plan.push(RuntimeCandidate::path(
        PackageManager,
        pyenv.join("shims").join("python.exe"),
    ));
    for version in ["3.12.0", "3.11.0"] {
        plan.push(RuntimeCandidate::path(
            PackageManager,
            pyenv.join("versions").join(version).join("python.exe"),
        ));
    }

    plan.push(RuntimeCandidate::path(
        PackageManager,
        home.join("scoop")
            .join("apps")
            .join("python")
            .join("current")
            .join("python.exe"),
    ));
    for dir in ["python3", "python"] {
        plan.push(RuntimeCandidate::path(
            PackageManager,
            root.join("tools").join(dir).join("python.exe"),
        ));
    }
    plan.push(RuntimeCandidate::path(
        PackageManager,
        root.join("Windows").join("py.exe"),
    ));
    plan
}

fn unix_plan(layout: &HostLayout) -> Vec<RuntimeCandidate> {
    use CandidateTier::*;

    let home = &layout.home;
    let root = &layout.system_root;
    let mut plan = Vec::new();

    for (major, minor) in VERSIONS {
        plan.push(RuntimeCandidate::path(
            UserVersioned,
            home.join(".local")
                .join("bin")
                .join(format!("python{major}.{minor}")),
        ));
    }

    if layout.platform == Platform::MacOs {
        let frameworks = root
            .join("Library")
            .join("Frameworks")
            .join("Python.framework")
            .join("Versions");
        for (major, minor) in VERSIONS {
            plan.push(RuntimeCandidate::path(
                SystemVersioned,
                frameworks
                    .join(format!("{major}.{minor}"))
                    .join("bin")
                    .join("python3"),
            ));
        }
    }
    for (major, minor) in VERSIONS {
        for bin in [root.join("usr").join("local").join("bin"), root.join("usr").join("bin")] {
            plan.push(RuntimeCandidate::path(
                SystemVersioned,
                bin.join(format!("python{major}.{minor}")),
            ));
        }
    }

    for dist in ["miniconda3", "anaconda3", "miniforge3"] {
        plan.push(RuntimeCandidate::path(
            PackageManager,
            home.join(dist).join("bin").join("python3"),
        ));
    }
    plan.push(RuntimeCandidate::path(
        PackageManager,
        root.join("opt").join("conda").join("bin").join("python3"),
    ));
    plan.push(RuntimeCandidate::path(
        PackageManager,
        home.join(".pyenv").join("shims").join("python3"),
    ));
    if layout.platform == Platform::MacOs {
        plan.push(RuntimeCandidate::path(
            PackageManager,
            root.join("opt").join("homebrew").join("bin").join("python3"),
        ));
    }
    plan.push(RuntimeCandidate::path(
        PackageManager,
        root.join("usr").join("local").join("bin").join("python3"),
    ));
    plan.push(RuntimeCandidate::path(
        PackageManager,
        root.join("usr").join("bin").join("python3"),
    ));

    plan.push(RuntimeCandidate::command("python3"));
    plan.push(RuntimeCandidate::command("python"));
    plan
}
