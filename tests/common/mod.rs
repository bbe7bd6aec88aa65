//! Shared fixtures for integration tests

#![allow(dead_code)]

use anaconda_payloads::{
    EnvironmentData, GroupRecord, MetadataResolver, ModuleRecord, PackageRecord,
    ProgressReporter, RepositoryMetadata,
};
use anaconda_payloads::PackageInstaller;
use std::sync::{Arc, Mutex};
use tempfile::NamedTempFile;

pub fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

fn package(name: &str, requires: &[&str]) -> PackageRecord {
    PackageRecord {
        name: name.to_string(),
        requires: strings(requires),
        ..Default::default()
    }
}

fn group(id: &str, name: &str, mandatory: &[&str], optional: &[&str]) -> GroupRecord {
    GroupRecord {
        id: id.to_string(),
        name: name.to_string(),
        mandatory_packages: strings(mandatory),
        optional_packages: strings(optional),
        ..Default::default()
    }
}

/// A small Fedora-like repository
///
/// - `workstation`: default `gnome`, optional `dev-tools`, `office`
/// - `server`: default `headless`, optional `dev-tools`, visible `cockpit`
/// - `minimal` (default environment): default `standard`
pub fn fedora_metadata() -> RepositoryMetadata {
    RepositoryMetadata {
        default_environment: Some("minimal".to_string()),
        environments: vec![
            EnvironmentData {
                id: "workstation".to_string(),
                name: "Fedora Workstation".to_string(),
                default_groups: strings(&["gnome"]),
                optional_groups: strings(&["dev-tools", "office"]),
                ..Default::default()
            },
            EnvironmentData {
                id: "server".to_string(),
                name: "Fedora Server Edition".to_string(),
                default_groups: strings(&["headless"]),
                optional_groups: strings(&["dev-tools"]),
                visible_groups: strings(&["cockpit"]),
                ..Default::default()
            },
            EnvironmentData {
                id: "minimal".to_string(),
                name: "Minimal Install".to_string(),
                default_groups: strings(&["standard"]),
                ..Default::default()
            },
        ],
        groups: vec![
            group("core", "Core", &["bash", "systemd"], &[]),
            group("gnome", "GNOME", &["gnome-shell"], &[]),
            group("dev-tools", "Development Tools", &["gcc", "git"], &["valgrind"]),
            group("office", "Office Suite", &["libreoffice"], &[]),
            group("headless", "Headless Management", &["openssh-server"], &[]),
            group("cockpit", "Cockpit", &["cockpit"], &[]),
            group("standard", "Standard", &["vim-minimal"], &[]),
        ],
        packages: vec![
            package("bash", &["glibc"]),
            package("systemd", &["glibc"]),
            package("glibc", &[]),
            package("kernel", &[]),
            package("gnome-shell", &["mutter"]),
            package("mutter", &["glibc"]),
            package("gcc", &["glibc"]),
            package("git", &["glibc"]),
            package("libreoffice", &["java"]),
            package("openssh-server", &["glibc"]),
            package("cockpit", &["glibc"]),
            package("vim-minimal", &["glibc"]),
            PackageRecord {
                name: "nano".to_string(),
                conflicts: strings(&["vim-minimal"]),
                ..Default::default()
            },
        ],
        modules: vec![ModuleRecord {
            name: "nodejs".to_string(),
            streams: strings(&["18", "20"]),
        }],
    }
}

pub fn fedora_resolver() -> MetadataResolver {
    MetadataResolver::new(fedora_metadata())
}

/// Write the metadata to a temporary JSON file.
pub fn write_metadata(metadata: &RepositoryMetadata) -> NamedTempFile {
    let file = NamedTempFile::new().expect("temp file");
    std::fs::write(file.path(), serde_json::to_string_pretty(metadata).expect("json"))
        .expect("write metadata");
    file
}

/// Installer reporting fixed kernels and counting transactions
#[derive(Default)]
pub struct RecordingInstaller {
    pub kernels: Vec<String>,
    pub transactions: Mutex<usize>,
}

impl RecordingInstaller {
    pub fn with_kernels(kernels: &[&str]) -> Self {
        Self {
            kernels: strings(kernels),
            ..Default::default()
        }
    }

    pub fn transactions(&self) -> usize {
        *self.transactions.lock().unwrap()
    }
}

impl PackageInstaller for RecordingInstaller {
    fn install_packages(&self, progress: &ProgressReporter) -> anyhow::Result<Vec<String>> {
        progress.report(1, "Running the transaction");
        *self.transactions.lock().unwrap() += 1;
        Ok(self.kernels.clone())
    }
}

/// Log output collected by a scoped subscriber
#[derive(Clone, Default)]
pub struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

impl std::io::Write for CapturedLogs {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

/// Run the action with a thread-local subscriber and return what it logged.
pub fn capture_logs(action: impl FnOnce()) -> String {
    let logs = CapturedLogs::default();
    let writer = logs.clone();
    let subscriber = tracing_subscriber::fmt()
        .with_writer(move || writer.clone())
        .with_ansi(false)
        .finish();

    tracing::subscriber::with_default(subscriber, action);
    let output = logs.0.lock().unwrap();
    String::from_utf8_lossy(&output).into_owned()
}
