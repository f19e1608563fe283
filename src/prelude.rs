//! # Prelude
//!
//! Re-exports commonly used types and traits for convenience.
//!
//! ```rust
//! use telemetry_agent_operator::prelude::*;
//! ```

// CRD types
pub use crate::crd::*;

// Artifact model and the engine
pub use crate::controller::artifact::{
    resolve_key, ArtifactKey, ArtifactKind, DesiredState, OwnerIdentity, PersistedObject,
    RenderedArtifact,
};
pub use crate::controller::engine::{ReconcileEngine, ReconcileError, ReconcileOutcome};

// Collaborator seams and their implementations
pub use crate::controller::render::{
    render, KubeSecretResolver, RenderError, SecretResolver, StaticSecretResolver,
};
pub use crate::controller::store::{ArtifactStore, KubeSecretStore, StoreError};

// Reconciler types
pub use crate::controller::reconciler::{reconcile, Reconciler, ReconcilerError};

pub use crate::config::ControllerConfig;
