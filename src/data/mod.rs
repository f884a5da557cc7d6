//! Data layer: the track-geometry analysis pipeline.
//!
//! Architecture:
//! ```text
//!  .csv / .json
//!        │
//!        ▼
//!   ┌──────────┐
//!   │  loader   │  parse file → TrackTable
//!   └──────────┘
//!        │
//!        ▼
//!   ┌──────────┐   ┌──────────┐   ┌──────────┐   ┌──────────┐
//!   │  impute   │ → │  filter   │ → │ metrics   │ → │  flags    │
//!   └──────────┘   └──────────┘   └──────────┘   └──────────┘
//!    fill missing    smooth noisy    derive          threshold
//!    values          channels        composites      comparison
//!        │
//!        ▼
//!   ┌──────────┐
//!   │  export   │  annotated table → .csv / .json
//!   └──────────┘
//! ```
//!
//! Every stage is a pure `TrackTable → TrackTable` transformation composed by
//! [`pipeline::run`]; row count and chainage order are invariant throughout.

pub mod error;
pub mod export;
pub mod filter;
pub mod flags;
pub mod impute;
pub mod loader;
pub mod metrics;
pub mod model;
pub mod pipeline;
