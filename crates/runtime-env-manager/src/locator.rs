//! Python runtime discovery
//!
//! Search order, first valid hit wins:
//! 1. Explicit override path (returned without any probing)
//! 2. PATH resolution of the [`path_commands`] (Windows only), skipping store stubs
//! 3. The static [`candidate_plan`] for the host layout, ending on Unix with
//!    bare command names that are returned as-is once PATH resolves them
//!
//! "Valid" only means the path exists and is not a store stub. Nothing is
//! executed here; a broken interpreter shows up at launch time.

use crate::candidates::{
    candidate_plan, path_commands, CandidateTarget, CandidateTier, HostLayout, RuntimeCandidate,
};
use crate::error::LocateError;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

/// Marker present in Microsoft Store app-execution-alias paths.
const STORE_STUB_MARKER: &str = "WindowsApps";
/// Marker present when the alias belongs to a real Store Python install.
const STORE_REAL_MARKER: &str = "PythonSoftwareFoundation";

/// Resolves a command name to every matching executable on PATH.
pub trait PathResolver: Send + Sync {
    /// All matches, in PATH order. Lookup failures yield an empty list.
    fn resolve_all(&self, command: &str) -> Vec<PathBuf>;
}

/// PATH resolution backed by the `which` crate.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemPathResolver;

impl PathResolver for SystemPathResolver {
    fn resolve_all(&self, command: &str) -> Vec<PathBuf> {
        match which::which_all(command) {
            Ok(paths) => paths.collect(),
            Err(e) => {
                debug!("PATH lookup for '{}' failed: {}", command, e);
                Vec::new()
            }
        }
    }
}

/// Returns `true` for Microsoft Store redirector stubs that only open the
/// Store instead of running Python.
pub fn is_store_stub(path: &Path) -> bool {
    let text = path.to_string_lossy();
    text.contains(STORE_STUB_MARKER) && !text.contains(STORE_REAL_MARKER)
}

/// A runtime picked by the locator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocatedRuntime {
    /// Executable path, or a bare command name for [`CandidateTier::BareCommand`]
    pub path: PathBuf,
    /// Tier that produced the hit
    pub tier: CandidateTier,
}

/// Locates a Python interpreter able to run the companion server.
#[derive(Clone)]
pub struct RuntimeLocator {
    layout: HostLayout,
    resolver: Arc<dyn PathResolver>,
    override_path: Option<PathBuf>,
}

impl std::fmt::Debug for RuntimeLocator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RuntimeLocator")
            .field("layout", &self.layout)
            .field("override_path", &self.override_path)
            .finish_non_exhaustive()
    }
}

impl RuntimeLocator {
    /// Locator for `layout` using the system PATH.
    pub fn new(layout: HostLayout) -> Self {
        RuntimeLocator {
            layout,
            resolver: Arc::new(SystemPathResolver),
            override_path: None,
        }
    }

    /// Locator for the current machine.
    pub fn for_host() -> Self {
        Self::new(HostLayout::detect())
    }

    /// Replace the PATH resolver
    pub fn with_resolver(mut self, resolver: Arc<dyn PathResolver>) -> Self {
        self.resolver = resolver;
        self
    }

    /// Set the explicit override. Empty paths are ignored.
    pub fn with_override(mut self, path: Option<PathBuf>) -> Self {
        self.override_path = path.filter(|p| !p.as_os_str().is_empty());
        self
    }

    pub fn layout(&self) -> &HostLayout {
        &self.layout
    }

    /// The static part of the plan for this host.
    pub fn candidates(&self) -> Vec<RuntimeCandidate> {
        candidate_plan(&self.layout)
    }

    /// Find a runtime.
    ///
    /// The override is returned as-is, even when it does not exist; existence
    /// is checked by the launcher.
    pub fn locate(&self) -> Result<LocatedRuntime, LocateError> {
        if let Some(path) = &self.override_path {
            info!("Using configured Python override: {:?}", path);
            return Ok(LocatedRuntime {
                path: path.clone(),
                tier: CandidateTier::Override,
            });
        }

        let commands = path_commands(self.layout.platform);
        for command in commands {
            if let Some(path) = self.resolve_genuine(command) {
                info!("Found Python via PATH lookup of '{}': {:?}", command, path);
                return Ok(LocatedRuntime {
                    path,
                    tier: CandidateTier::PathResolved,
                });
            }
        }

        let plan = self.candidates();
        debug!("Checking {} candidate paths", plan.len());
        for candidate in &plan {
            let hit = match &candidate.target {
                CandidateTarget::Path(path) => genuine(path).then(|| path.clone()),
                CandidateTarget::Command(name) => self
                    .resolve_genuine(name)
                    .map(|resolved| {
                        debug!("'{}' currently resolves to {:?}", name, resolved);
                        PathBuf::from(name)
                    }),
            };
            if let Some(path) = hit {
                info!("Found Python at {:?} ({})", path, candidate.tier);
                return Ok(LocatedRuntime {
                    path,
                    tier: candidate.tier,
                });
            }
        }

        info!("No Python executable found after checking all candidates");
        Err(LocateError::NotFound {
            candidates_checked: commands.len() + plan.len(),
        })
    }

    fn resolve_genuine(&self, command: &str) -> Option<PathBuf> {
        self.resolver
            .resolve_all(command)
            .into_iter()
            .find(|path| genuine(path))
    }
}

/// Existing and not a store redirector. Probe errors count as "absent".
fn genuine(path: &Path) -> bool {
    if is_store_stub(path) {
        debug!("Skipping Windows Store stub: {:?}", path);
        return false;
    }
    std::fs::metadata(path).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::candidates::Platform;
    use std::collections::HashMap;
    use tempfile::tempdir;

    #[derive(Default)]
    struct FakePath {
        entries: HashMap<String, Vec<PathBuf>>,
    }

    impl FakePath {
        fn with(mut self, command: &str, paths: Vec<PathBuf>) -> Self {
            self.entries.insert(command.to_string(), paths);
            self
        }
    }

    impl PathResolver for FakePath {
        fn resolve_all(&self, command: &str) -> Vec<PathBuf> {
            self.entries.get(command).cloned().unwrap_or_default()
        }
    }

    fn touch(path: &Path) {
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, b"").unwrap();
    }

    #[test]
    fn test_store_stub_detection() {
        assert!(is_store_stub(Path::new(
            r"C:\Users\me\AppData\Local\Microsoft\WindowsApps\python.exe"
        )));
        assert!(!is_store_stub(Path::new(
            r"C:\Users\me\AppData\Local\Microsoft\WindowsApps\PythonSoftwareFoundation.Python.3.12_qbz5n2kfra8p0\python.exe"
        )));
        assert!(!is_store_stub(Path::new("/usr/bin/python3")));
    }

    #[test]
    fn test_override_wins_without_probing() {
        let dir = tempdir().unwrap();
        let on_path = dir.path().join("bin").join("python3");
        touch(&on_path);

        let locator = RuntimeLocator::new(HostLayout::rooted_at(Platform::Linux, dir.path()))
            .with_resolver(Arc::new(FakePath::default().with("python3", vec![on_path])))
            .with_override(Some(PathBuf::from("/does/not/exist/python")));

        let found = locator.locate().unwrap();
        assert_eq!(found.tier, CandidateTier::Override);
        assert_eq!(found.path, PathBuf::from("/does/not/exist/python"));
    }

    #[test]
    fn test_empty_override_is_ignored() {
        let dir = tempdir().unwrap();
        let locator = RuntimeLocator::new(HostLayout::rooted_at(Platform::Linux, dir.path()))
            .with_resolver(Arc::new(FakePath::default()))
            .with_override(Some(PathBuf::new()));

        assert!(matches!(
            locator.locate(),
            Err(LocateError::NotFound { .. })
        ));
    }

    fn windows_apps(root: &Path) -> PathBuf {
        root.join("home")
            .join("AppData")
            .join("Local")
            .join("Microsoft")
            .join("WindowsApps")
    }

    #[test]
    fn test_path_hit_beats_static_plan() {
        let dir = tempdir().unwrap();
        let layout = HostLayout::rooted_at(Platform::Windows, dir.path());
        let on_path = dir.path().join("custom").join("python.exe");
        touch(&on_path);
        touch(&dir.path().join("Python312").join("python.exe"));

        let locator = RuntimeLocator::new(layout)
            .with_resolver(Arc::new(FakePath::default().with("python", vec![on_path.clone()])));

        let found = locator.locate().unwrap();
        assert_eq!(found.path, on_path);
        assert_eq!(found.tier, CandidateTier::PathResolved);
    }

    #[test]
    fn test_stub_is_never_returned_from_path() {
        let dir = tempdir().unwrap();
        let stub = windows_apps(dir.path()).join("python.exe");
        touch(&stub);
        let launcher = dir.path().join("Windows").join("py.exe");
        touch(&launcher);

        let locator = RuntimeLocator::new(HostLayout::rooted_at(Platform::Windows, dir.path()))
            .with_resolver(Arc::new(
                FakePath::default()
                    .with("python", vec![stub.clone()])
                    .with("python3", vec![stub]),
            ));

        let found = locator.locate().unwrap();
        assert!(!is_store_stub(&found.path), "{:?}", found.path);
        assert_eq!(found.path, launcher);
        assert_eq!(found.tier, CandidateTier::PackageManager);
    }

    #[test]
    fn test_store_redirectors_on_disk_are_not_found() {
        let dir = tempdir().unwrap();
        let apps = windows_apps(dir.path());
        touch(&apps.join("python.exe"));
        touch(&apps.join("python3.exe"));

        let locator = RuntimeLocator::new(HostLayout::rooted_at(Platform::Windows, dir.path()))
            .with_resolver(Arc::new(FakePath::default()));

        assert!(matches!(
            locator.locate(),
            Err(LocateError::NotFound { .. })
        ));
    }

    #[test]
    fn test_real_store_install_is_found() {
        let dir = tempdir().unwrap();
        let apps = windows_apps(dir.path());
        touch(&apps.join("python.exe"));
        let real = apps
            .join("PythonSoftwareFoundation.Python.3.12_qbz5n2kfra8p0")
            .join("python.exe");
        touch(&real);

        let locator = RuntimeLocator::new(HostLayout::rooted_at(Platform::Windows, dir.path()))
            .with_resolver(Arc::new(FakePath::default()));

        let found = locator.locate().unwrap();
        assert_eq!(found.path, real);
        assert_eq!(found.tier, CandidateTier::PlatformStore);
    }

    #[test]
    fn test_stub_only_path_result_yields_not_found() {
        let dir = tempdir().unwrap();
        let stub = dir.path().join("WindowsApps").join("python3");
        touch(&stub);

        let locator = RuntimeLocator::new(HostLayout::rooted_at(Platform::Linux, dir.path()))
            .with_resolver(Arc::new(
                FakePath::default()
                    .with("python3", vec![stub.clone()])
                    .with("python", vec![stub]),
            ));

        assert!(locator.locate().is_err());
    }

    #[test]
    fn test_path_entries_must_exist() {
        let dir = tempdir().unwrap();
        let ghost = dir.path().join("ghost").join("python.exe");
        let real = dir.path().join("real").join("python.exe");
        touch(&real);

        let locator = RuntimeLocator::new(HostLayout::rooted_at(Platform::Windows, dir.path()))
            .with_resolver(Arc::new(
                FakePath::default().with("python", vec![ghost, real.clone()]),
            ));

        assert_eq!(locator.locate().unwrap().path, real);
    }

    #[test]
    fn test_single_existing_candidate_found_at_any_position() {
        for platform in [Platform::Windows, Platform::MacOs, Platform::Linux] {
            let probe = HostLayout::rooted_at(platform, Path::new("/unused"));
            let count = candidate_plan(&probe)
                .iter()
                .filter(|c| matches!(c.target, CandidateTarget::Path(_)))
                .count();

            for index in 0..count {
                let dir = tempdir().unwrap();
                let locator = RuntimeLocator::new(HostLayout::rooted_at(platform, dir.path()))
                    .with_resolver(Arc::new(FakePath::default()));
                let target = locator
                    .candidates()
                    .into_iter()
                    .filter_map(|c| match c.target {
                        CandidateTarget::Path(p) => Some((p, c.tier)),
                        CandidateTarget::Command(_) => None,
                    })
                    .nth(index)
                    .unwrap();
                touch(&target.0);

                let found = locator.locate().unwrap();
                assert_eq!(found.path, target.0, "{:?} index {}", platform, index);
                assert_eq!(found.tier, target.1);
                assert!(!is_store_stub(&found.path));
            }
        }
    }

    #[test]
    fn test_secondary_command_name_resolves() {
        let dir = tempdir().unwrap();
        let resolved = dir.path().join("elsewhere").join("py.exe");
        touch(&resolved);

        // Nothing for python or python3 on PATH, but `py` resolves.
        let locator = RuntimeLocator::new(HostLayout::rooted_at(Platform::Windows, dir.path()))
            .with_resolver(Arc::new(FakePath::default().with("py", vec![resolved.clone()])));
        let found = locator.locate().unwrap();
        assert_eq!(found.tier, CandidateTier::PathResolved);
        assert_eq!(found.path, resolved);
    }

    #[test]
    fn test_bare_command_tier_returns_name() {
        let dir = tempdir().unwrap();
        let venv = dir.path().join("venv").join("bin").join("python3");
        touch(&venv);

        let locator = RuntimeLocator::new(HostLayout::rooted_at(Platform::Linux, dir.path()))
            .with_resolver(Arc::new(FakePath::default().with("python3", vec![venv])));

        let found = locator.locate().unwrap();
        assert_eq!(found.tier, CandidateTier::BareCommand);
        assert_eq!(found.path, PathBuf::from("python3"));
    }

    #[test]
    fn test_static_plan_beats_bare_command_on_unix() {
        let dir = tempdir().unwrap();
        let venv = dir.path().join("venv").join("bin").join("python3");
        touch(&venv);
        let system = dir.path().join("usr").join("bin").join("python3");
        touch(&system);

        let locator = RuntimeLocator::new(HostLayout::rooted_at(Platform::Linux, dir.path()))
            .with_resolver(Arc::new(FakePath::default().with("python3", vec![venv])));

        let found = locator.locate().unwrap();
        assert_eq!(found.path, system);
        assert_eq!(found.tier, CandidateTier::PackageManager);
    }

    #[test]
    fn test_bare_command_skips_stub_for_next_name() {
        let dir = tempdir().unwrap();
        let stub = dir.path().join("WindowsApps").join("python3");
        touch(&stub);
        let real = dir.path().join("opt").join("py").join("python");
        touch(&real);

        let locator = RuntimeLocator::new(HostLayout::rooted_at(Platform::MacOs, dir.path()))
            .with_resolver(Arc::new(
                FakePath::default()
                    .with("python3", vec![stub])
                    .with("python", vec![real]),
            ));

        let found = locator.locate().unwrap();
        assert_eq!(found.tier, CandidateTier::BareCommand);
        assert_eq!(found.path, PathBuf::from("python"));
    }

    #[test]
    fn test_not_found_counts_everything_checked() {
        let dir = tempdir().unwrap();
        let locator = RuntimeLocator::new(HostLayout::rooted_at(Platform::Windows, dir.path()))
            .with_resolver(Arc::new(FakePath::default()));
        let expected = locator.candidates().len() + path_commands(Platform::Windows).len();

        match locator.locate() {
            Err(LocateError::NotFound { candidates_checked }) => {
                assert_eq!(candidates_checked, expected)
            }
            other => panic!("expected NotFound, got {:?}", other),
        }
    }
}
