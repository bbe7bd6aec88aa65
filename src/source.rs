//! Installation sources and their state machine
//!
//! Every source carries a `SourceState`. The state only moves through the
//! source's own `set_up()` / `tear_down()` calls:
//!
//! ```text
//! NotApplicable            (no setup needed, never transitions)
//!
//! Unready ──set_up()──► Ready
//!    ▲                    │
//!    └────tear_down()─────┘
//! ```
//!
//! - Setting up a `Ready` source is an error.
//! - Tearing down anything that isn't `Ready` is a no-op.
//!
//! The mount/attach work itself belongs to a `SourceBackend`.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::error::{PayloadError, Result};
use crate::types::{SourceState, SourceType};

/// The system work behind a source transition (mounting media, attaching
/// images, ...).
pub trait SourceBackend: Send + Sync {
    /// Make the source content available.
    fn set_up(&self, source_type: SourceType) -> anyhow::Result<()>;

    /// Release whatever `set_up` acquired.
    fn tear_down(&self, source_type: SourceType) -> anyhow::Result<()>;
}

/// Backend for sources whose transitions have no system side effects.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopBackend;

impl SourceBackend for NoopBackend {
    fn set_up(&self, _source_type: SourceType) -> anyhow::Result<()> {
        Ok(())
    }

    fn tear_down(&self, _source_type: SourceType) -> anyhow::Result<()> {
        Ok(())
    }
}

/// One installation source attached to a payload.
///
/// Sources are shared as `Arc<Source>` between the payload's source set and
/// the setup/teardown tasks created from it.
pub struct Source {
    source_type: SourceType,
    state: Mutex<SourceState>,
    network_required: bool,
    required_space: u64,
    description: String,
    backend: Arc<dyn SourceBackend>,
}

impl Source {
    /// Create a source with the defaults of its kind.
    pub fn new(source_type: SourceType) -> Self {
        let state = if source_type.requires_setup() {
            SourceState::Unready
        } else {
            SourceState::NotApplicable
        };

        Self {
            source_type,
            state: Mutex::new(state),
            network_required: source_type.is_network(),
            required_space: 0,
            description: source_type.to_string(),
            backend: Arc::new(NoopBackend),
        }
    }

    pub fn with_network_required(mut self, required: bool) -> Self {
        self.network_required = required;
        self
    }

    /// Space in bytes the source needs on the target (e.g. an unpacked image).
    pub fn with_required_space(mut self, bytes: u64) -> Self {
        self.required_space = bytes;
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_backend(mut self, backend: Arc<dyn SourceBackend>) -> Self {
        self.backend = backend;
        self
    }

    /// Wrap the source for attaching to a payload.
    pub fn into_shared(self) -> Arc<Self> {
        Arc::new(self)
    }

    #[inline]
    pub fn source_type(&self) -> SourceType {
        self.source_type
    }

    #[inline]
    pub fn network_required(&self) -> bool {
        self.network_required
    }

    #[inline]
    pub fn required_space(&self) -> u64 {
        self.required_space
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    /// Current state of the source.
    pub fn get_state(&self) -> SourceState {
        *self.lock_state()
    }

    /// Returns true if the source is set up.
    pub fn is_ready(&self) -> bool {
        self.get_state() == SourceState::Ready
    }

    /// Set up the source: `Unready → Ready`.
    ///
    /// # Errors
    ///
    /// - `SourceSetup` if the source is already `Ready`
    /// - `SourceSetup` if the backend fails; the source stays `Unready`
    pub fn set_up(&self) -> Result<()> {
        let mut state = self.lock_state();

        match *state {
            SourceState::NotApplicable => {
                tracing::debug!("Source {} doesn't need to be set up.", self);
                Ok(())
            }
            SourceState::Ready => Err(PayloadError::source_setup(format!(
                "The source {} is already set up.",
                self
            ))),
            SourceState::Unready => {
                tracing::debug!("Setting up the source {}.", self);
                self.backend.set_up(self.source_type).map_err(|e| {
                    PayloadError::source_setup(format!(
                        "Failed to set up the source {}: {:#}",
                        self, e
                    ))
                })?;

                *state = SourceState::Ready;
                tracing::info!("The source {} is ready.", self);
                Ok(())
            }
        }
    }

    /// Tear down the source: `Ready → Unready`.
    ///
    /// Idempotent: tearing down a source that isn't `Ready` does nothing.
    ///
    /// # Errors
    ///
    /// - `SourceTearDown` if the backend fails; the source is still marked
    ///   `Unready` so a cleanup pass can move on
    pub fn tear_down(&self) -> Result<()> {
        let mut state = self.lock_state();

        if *state != SourceState::Ready {
            tracing::debug!("Nothing to tear down for the source {}.", self);
            return Ok(());
        }

        tracing::debug!("Tearing down the source {}.", self);
        *state = SourceState::Unready;

        self.backend.tear_down(self.source_type).map_err(|e| {
            PayloadError::source_tear_down(format!(
                "Failed to tear down the source {}: {:#}",
                self, e
            ))
        })
    }

    fn lock_state(&self) -> MutexGuard<'_, SourceState> {
        // The state is a plain enum, a poisoned lock still holds a valid value.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.description == self.source_type.to_string() {
            write!(f, "{}", self.source_type)
        } else {
            write!(f, "{} ({})", self.source_type, self.description)
        }
    }
}

impl fmt::Debug for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Source")
            .field("type", &self.source_type)
            .field("state", &self.get_state())
            .field("network_required", &self.network_required)
            .field("required_space", &self.required_space)
            .field("description", &self.description)
            .finish()
    }
}
