//! Type-safe payload and source types
//!
//! Source kinds, source states and payload kinds are closed sets, so they are
//! modelled as enums with strum derives for parsing and display.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString};

/// Kind of installation source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[derive(Display, EnumString, EnumIter)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum SourceType {
    Cdrom,
    #[strum(serialize = "HDD")]
    #[serde(rename = "HDD")]
    HardDrive,
    Hmc,
    Nfs,
    RepoFiles,
    RepoPath,
    Url,
    ClosestMirror,
    Cdn,
    LiveOsImage,
    LiveImage,
    LiveTar,
    RpmOstree,
    Flatpak,
}

impl SourceType {
    /// Does a source of this kind need to be mounted or attached before use?
    ///
    /// Sources of any other kind start in `NotApplicable` and never transition.
    pub fn requires_setup(self) -> bool {
        matches!(
            self,
            Self::Cdrom
                | Self::HardDrive
                | Self::Hmc
                | Self::Nfs
                | Self::RepoPath
                | Self::LiveOsImage
                | Self::LiveImage
                | Self::LiveTar
        )
    }

    /// Does a source of this kind fetch its content over the network by default?
    pub fn is_network(self) -> bool {
        matches!(
            self,
            Self::Nfs | Self::Url | Self::ClosestMirror | Self::Cdn | Self::RpmOstree | Self::Flatpak
        )
    }

    /// Source kinds that provide package repositories
    pub fn is_package_repository(self) -> bool {
        matches!(
            self,
            Self::Cdrom
                | Self::HardDrive
                | Self::Hmc
                | Self::Nfs
                | Self::RepoFiles
                | Self::RepoPath
                | Self::Url
                | Self::ClosestMirror
                | Self::Cdn
        )
    }
}

/// Lifecycle state of a single source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[derive(Display, EnumString, EnumIter)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum SourceState {
    /// The source needs no setup at all
    NotApplicable,
    /// The source needs setup and isn't set up
    Unready,
    /// The source is set up and in use
    Ready,
}

/// Kind of payload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[derive(Display, EnumString, EnumIter)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum PayloadType {
    Dnf,
    LiveOs,
    LiveImage,
    RpmOstree,
    Flatpak,
}

impl PayloadType {
    /// Source kinds this payload kind accepts
    pub fn supported_source_types(self) -> &'static [SourceType] {
        match self {
            Self::Dnf => &[
                SourceType::Cdrom,
                SourceType::HardDrive,
                SourceType::Hmc,
                SourceType::Nfs,
                SourceType::RepoFiles,
                SourceType::RepoPath,
                SourceType::Url,
                SourceType::ClosestMirror,
                SourceType::Cdn,
            ],
            Self::LiveOs => &[SourceType::LiveOsImage],
            Self::LiveImage => &[SourceType::LiveImage, SourceType::LiveTar],
            Self::RpmOstree => &[SourceType::RpmOstree],
            Self::Flatpak => &[SourceType::Flatpak],
        }
    }
}

/// Package types inside a comps group
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[derive(Display, EnumString, EnumIter)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum GroupPackageType {
    Mandatory,
    Default,
    Optional,
    Conditional,
}
