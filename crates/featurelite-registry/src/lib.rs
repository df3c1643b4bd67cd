//! FeatureLite Registry: from accepted candidate to live, invocable feature.
//!
//! - `pipeline`: Plan → Static → Sandbox state machine; only it can produce `Accepted`.
//! - `quarantine`: append-only record of every rejected candidate.
//! - `artifact` / `store`: one `<id>.rhai` file per feature with a metadata block.
//! - `capability`: recognized entry-point shapes and route derivation.
//! - `registry`: load, register, invoke, dispatch, hot reload, deactivate, delete.

pub mod artifact;
pub mod capability;
pub mod error;
pub mod pipeline;
pub mod quarantine;
pub mod registry;
pub mod store;

pub use artifact::{CodeArtifact, FeatureMetadata};
pub use capability::{Capability, Route};
pub use error::{RegistryError, StoreError};
pub use pipeline::{Accepted, ApprovedPlan, CandidateState, Outcome, Rejection, Stage, ValidationPipeline};
pub use quarantine::{QuarantineRecord, QuarantineStore};
pub use registry::{Feature, FeatureRegistry, InvocationResult, LoadIssue};
pub use store::FeatureStore;

#[cfg(test)]
mod tests;

#[cfg(test)]
#[global_allocator]
static GLOBAL: featurelite_sandbox::heap::TrackingAllocator = featurelite_sandbox::heap::TrackingAllocator;
