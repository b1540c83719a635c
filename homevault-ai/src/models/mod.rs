//! Data models for homevault-ai

pub mod asset;
pub mod batch;
pub mod lenient;
pub mod policy;

pub use asset::{Asset, AssetUpdate, Category, Condition, EstimatedValue, ItemAnalysis};
pub use batch::{BatchSession, BatchState, BatchSummary, FileMeta, FileOutcome, SummaryEntry};
pub use policy::{
    CategoryGap, CoverageAnalysis, CoverageLimit, InventoryLine, PolicyAnalysis, PolicyDetails,
    Recommendation,
};
