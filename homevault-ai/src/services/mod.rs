//! Service modules for household asset intake and analysis

pub mod asset_persistence;
pub mod batch_orchestrator;
pub mod batch_registry;
pub mod blob_store;
pub mod image_intake;
pub mod policy_comparator;
pub mod prompts;
pub mod vision_client;

pub use asset_persistence::{content_key, AssetStore, DeleteOutcome};
pub use batch_orchestrator::BatchOrchestrator;
pub use batch_registry::{BatchHandle, BatchRegistry, BatchUpdate};
pub use blob_store::{BlobStore, StorageError, StoredImage};
pub use image_intake::{
    validate_file, AcceptedType, IntakeError, IntakeFile, IntakeLimits, IntakeSelection,
};
pub use policy_comparator::{PolicyComparator, PolicyError, PolicyReport};
pub use vision_client::{
    extract_json_block, AnalysisError, GeminiModel, GenerativeModel, InlineData, ModelError,
    SharedApiKey, VisionClient,
};
