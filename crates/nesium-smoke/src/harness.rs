//! Builds the smoke harness executable.
//!
//! The harness is a throwaway binary crate generated into a scratch directory.
//! It depends on `nesium-probe` and on the emulator core under test, and its
//! `main` hands control to `nesium_probe::run_main` with the core type filled
//! in. It is compiled once per run and shared by every ROM.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use tempfile::TempDir;
use toml::{Table, Value};
use tracing::{debug, info};

use crate::config::{CoreBinding, SmokeConfig};
use crate::error::BuildError;

/// Package (and binary) name of the generated crate.
pub const HARNESS_PACKAGE: &str = "nesium-smoke-harness";

/// A ready-to-run harness executable.
///
/// Keeps the scratch build directory alive for as long as the binary is in use.
#[derive(Debug)]
pub struct Harness {
    binary: PathBuf,
    _scratch: Option<TempDir>,
}

impl Harness {
    /// Wraps an existing harness executable instead of building one.
    pub fn prebuilt(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
            _scratch: None,
        }
    }

    pub fn path(&self) -> &Path {
        &self.binary
    }
}

/// Core crate location with every default filled in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedCore {
    pub package: String,
    pub manifest_dir: PathBuf,
    pub type_path: String,
}

impl ResolvedCore {
    pub fn resolve(binding: &CoreBinding) -> Result<Self, BuildError> {
        let manifest_dir = absolute(&binding.manifest_dir)?;
        let package = match &binding.package {
            Some(package) => package.clone(),
            None => read_package_name(&manifest_dir.join("Cargo.toml"))?,
        };
        let type_path = binding
            .type_path
            .clone()
            .unwrap_or_else(|| format!("{}::SmokeCore", crate_ident(&package)));

        Ok(Self {
            package,
            manifest_dir,
            type_path,
        })
    }
}

fn read_package_name(manifest: &Path) -> Result<String, BuildError> {
    let contents = fs::read_to_string(manifest).map_err(|source| BuildError::CoreManifest {
        path: manifest.to_path_buf(),
        source,
    })?;
    let table: Table = toml::from_str(&contents).map_err(|source| BuildError::CoreManifestParse {
        path: manifest.to_path_buf(),
        source,
    })?;
    table
        .get("package")
        .and_then(|package| package.get("name"))
        .and_then(Value::as_str)
        .map(str::to_owned)
        .ok_or_else(|| BuildError::MissingPackageName(manifest.to_path_buf()))
}

fn crate_ident(package: &str) -> String {
    package.replace('-', "_")
}

fn absolute(path: &Path) -> Result<PathBuf, BuildError> {
    Ok(std::path::absolute(path)?)
}

/// Generates and compiles the harness crate.
#[derive(Debug, Clone)]
pub struct HarnessBuilder {
    cargo: PathBuf,
    probe_dir: PathBuf,
    core: CoreBinding,
}

impl HarnessBuilder {
    pub fn new(cargo: impl Into<PathBuf>, probe_dir: impl Into<PathBuf>, core: CoreBinding) -> Self {
        Self {
            cargo: cargo.into(),
            probe_dir: probe_dir.into(),
            core,
        }
    }

    pub fn from_config(config: &SmokeConfig) -> Self {
        Self::new(&config.cargo, &config.probe_dir, config.core.clone())
    }

    /// `Cargo.toml` of the generated crate.
    pub fn render_manifest(&self, core: &ResolvedCore) -> Result<String, BuildError> {
        let mut package = Table::new();
        package.insert("name".into(), Value::String(HARNESS_PACKAGE.into()));
        package.insert("version".into(), Value::String("0.0.0".into()));
        package.insert("edition".into(), Value::String("2024".into()));
        package.insert("publish".into(), Value::Boolean(false));

        let mut dependencies = Table::new();
        dependencies.insert(
            "nesium-probe".into(),
            path_dependency(&absolute(&self.probe_dir)?),
        );
        dependencies.insert(core.package.clone(), path_dependency(&core.manifest_dir));

        let mut root = Table::new();
        root.insert("package".into(), Value::Table(package));
        // Empty workspace table keeps the crate out of any enclosing workspace.
        root.insert("workspace".into(), Value::Table(Table::new()));
        root.insert("dependencies".into(), Value::Table(dependencies));

        Ok(toml::to_string(&root)?)
    }

    /// `src/main.rs` of the generated crate.
    pub fn render_main(core: &ResolvedCore) -> String {
        format!(
            "// Generated by nesium-smoke.\n\
             fn main() -> std::process::ExitCode {{\n    \
             nesium_probe::run_main::<{}>()\n\
             }}\n",
            core.type_path
        )
    }

    /// Writes the harness crate into a fresh scratch directory and compiles it
    /// in release mode.
    pub fn build(&self) -> Result<Harness, BuildError> {
        let core = ResolvedCore::resolve(&self.core)?;
        let scratch = tempfile::Builder::new().prefix("nesium_smoke_").tempdir()?;

        let manifest = scratch.path().join("Cargo.toml");
        let src_dir = scratch.path().join("src");
        let target_dir = scratch.path().join("target");
        fs::create_dir_all(&src_dir)?;
        fs::write(&manifest, self.render_manifest(&core)?)?;
        fs::write(src_dir.join("main.rs"), Self::render_main(&core))?;

        info!(
            "building smoke harness for {} ({})",
            core.type_path,
            core.manifest_dir.display()
        );
        let output = Command::new(&self.cargo)
            .args(["build", "--release", "--quiet", "--manifest-path"])
            .arg(&manifest)
            .arg("--target-dir")
            .arg(&target_dir)
            .output()
            .map_err(|source| BuildError::Spawn {
                cargo: self.cargo.clone(),
                source,
            })?;

        if !output.status.success() {
            return Err(BuildError::Compile {
                status: output.status,
                stderr: String::from_utf8_lossy(&output.stderr).trim_end().to_string(),
            });
        }

        let binary = target_dir.join("release").join(format!(
            "{HARNESS_PACKAGE}{}",
            std::env::consts::EXE_SUFFIX
        ));
        if !binary.is_file() {
            return Err(BuildError::MissingBinary(binary));
        }
        debug!("harness ready at {}", binary.display());

        Ok(Harness {
            binary,
            _scratch: Some(scratch),
        })
    }
}

fn path_dependency(path: &Path) -> Value {
    let mut dep = Table::new();
    dep.insert(
        "path".into(),
        Value::String(path.to_string_lossy().into_owned()),
    );
    Value::Table(dep)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn core_crate(dir: &Path, name: &str) {
        fs::write(
            dir.join("Cargo.toml"),
            format!("[package]\nname = \"{name}\"\nversion = \"0.1.0\"\n"),
        )
        .unwrap();
    }

    #[test]
    fn resolves_package_and_default_type_from_manifest() {
        let dir = tempfile::tempdir().unwrap();
        core_crate(dir.path(), "tiny-nes-core");

        let core = ResolvedCore::resolve(&CoreBinding {
            manifest_dir: dir.path().to_path_buf(),
            ..CoreBinding::default()
        })
        .unwrap();

        assert_eq!(core.package, "tiny-nes-core");
        assert_eq!(core.type_path, "tiny_nes_core::SmokeCore");
        assert!(core.manifest_dir.is_absolute());
    }

    #[test]
    fn explicit_binding_wins() {
        let dir = tempfile::tempdir().unwrap();
        let core = ResolvedCore::resolve(&CoreBinding {
            manifest_dir: dir.path().to_path_buf(),
            package: Some("emu".into()),
            type_path: Some("emu::headless::Console".into()),
        })
        .unwrap();
        assert_eq!(core.package, "emu");
        assert_eq!(core.type_path, "emu::headless::Console");
    }

    #[test]
    fn missing_manifest_is_a_build_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = ResolvedCore::resolve(&CoreBinding {
            manifest_dir: dir.path().join("absent"),
            ..CoreBinding::default()
        })
        .unwrap_err();
        assert!(matches!(err, BuildError::CoreManifest { .. }));
    }

    #[test]
    fn workspace_manifest_without_package_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("Cargo.toml"), "[workspace]\nmembers = []\n").unwrap();
        let err = ResolvedCore::resolve(&CoreBinding {
            manifest_dir: dir.path().to_path_buf(),
            ..CoreBinding::default()
        })
        .unwrap_err();
        assert!(matches!(err, BuildError::MissingPackageName(_)));
    }

    #[test]
    fn manifest_links_probe_and_core() {
        let dir = tempfile::tempdir().unwrap();
        let core = ResolvedCore {
            package: "tiny-nes-core".into(),
            manifest_dir: dir.path().to_path_buf(),
            type_path: "tiny_nes_core::SmokeCore".into(),
        };
        let builder = HarnessBuilder::new("cargo", "/opt/probe", CoreBinding::default());

        let manifest: Table = toml::from_str(&builder.render_manifest(&core).unwrap()).unwrap();
        assert_eq!(manifest["package"]["name"].as_str(), Some(HARNESS_PACKAGE));
        assert!(manifest["workspace"].as_table().unwrap().is_empty());

        let deps = manifest["dependencies"].as_table().unwrap();
        assert!(
            deps["nesium-probe"]["path"]
                .as_str()
                .unwrap()
                .ends_with("probe")
        );
        assert_eq!(
            deps["tiny-nes-core"]["path"].as_str(),
            Some(dir.path().to_string_lossy().as_ref())
        );
    }

    #[test]
    fn main_calls_probe_with_core_type() {
        let core = ResolvedCore {
            package: "emu".into(),
            manifest_dir: PathBuf::from("/emu"),
            type_path: "emu::SmokeCore".into(),
        };
        let main = HarnessBuilder::render_main(&core);
        assert!(main.contains("nesium_probe::run_main::<emu::SmokeCore>()"));
        assert!(main.contains("fn main() -> std::process::ExitCode"));
    }

    #[test]
    fn unspawnable_cargo_is_a_build_error() {
        let dir = tempfile::tempdir().unwrap();
        core_crate(dir.path(), "emu");
        let builder = HarnessBuilder::new(
            dir.path().join("no-such-cargo"),
            "/opt/probe",
            CoreBinding {
                manifest_dir: dir.path().to_path_buf(),
                ..CoreBinding::default()
            },
        );
        assert!(matches!(builder.build(), Err(BuildError::Spawn { .. })));
    }
}
