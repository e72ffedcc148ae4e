//! Context window assembly and token accounting

pub mod accountant;
pub mod assembler;

pub use accountant::{HeuristicEstimator, TokenAccountant, TokenEstimator};
pub use assembler::{
    render_summary, ContextAssembler, ContextUsageReport, ContextWindow, SummaryPreview,
    TurnPreview,
};
