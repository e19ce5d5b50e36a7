//! ML Module
//! =========
//! Feature extraction and the ensemble prediction contract. Model
//! training happens elsewhere; the pipeline only invokes predictions.
//!
//! Copyright © 2025 Stephen Bilodeau. All rights reserved.
//! Licensed under GPL-3.0.

pub mod ensemble;
pub mod features;

pub use ensemble::{EnsemblePredictor, MlPrediction};
pub use features::{FeatureExtractor, FeatureMap};
