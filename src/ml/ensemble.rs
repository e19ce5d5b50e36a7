//! Ensemble Predictor
//! ==================
//! Combines an anomaly score and a multiclass attack probability into a
//! single prediction. Models are invoked, never trained here; an absent or
//! untrained sub-model contributes nothing and the other is used alone.
//!
//! Copyright © 2025 Stephen Bilodeau. All rights reserved.
//! Licensed under GPL-3.0.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use statrs::statistics::{Data, Distribution};
use std::collections::VecDeque;
use std::sync::Arc;
use tracing::warn;

use crate::detect::AttackType;
use crate::error::PipelineResult;
use crate::ml::features::FeatureMap;

/// Output of the anomaly sub-model
#[derive(Debug, Clone, Copy)]
pub struct AnomalyScore {
    pub is_anomaly: bool,
    pub score: f64,
}

/// Output of the attack classification sub-model
#[derive(Debug, Clone)]
pub struct Classification {
    pub attack_type: AttackType,
    pub confidence: f64,
}

/// Isolation-style anomaly scoring capability
pub trait AnomalyModel: Send + Sync {
    fn is_trained(&self) -> bool;
    fn score(&self, features: &FeatureMap) -> PipelineResult<AnomalyScore>;

    /// Online models may learn from observed traffic; batch-trained
    /// models ignore this.
    fn observe(&self, _features: &FeatureMap) {}
}

/// Multiclass attack classification capability
pub trait AttackClassifier: Send + Sync {
    fn is_trained(&self) -> bool;
    fn classify(&self, features: &FeatureMap) -> PipelineResult<Classification>;
}

/// Combined prediction attached to the canonical record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MlPrediction {
    pub is_threat: bool,
    pub is_anomaly: bool,
    pub is_attack: bool,
    pub attack_type: AttackType,
    pub confidence: f64,
    pub anomaly_score: f64,
    pub combined_confidence: f64,
    pub model_ready: bool,
}

impl MlPrediction {
    /// Prediction used when no model is available.
    pub fn neutral() -> Self {
        Self {
            is_threat: false,
            is_anomaly: false,
            is_attack: false,
            attack_type: AttackType::Normal,
            confidence: 0.0,
            anomaly_score: 0.0,
            combined_confidence: 0.0,
            model_ready: false,
        }
    }
}

/// Ensemble of the two sub-models with configurable weights
pub struct EnsemblePredictor {
    anomaly: Option<Arc<dyn AnomalyModel>>,
    classifier: Option<Arc<dyn AttackClassifier>>,
    anomaly_weight: f64,
    classification_weight: f64,
}

impl EnsemblePredictor {
    pub fn new(
        anomaly: Option<Arc<dyn AnomalyModel>>,
        classifier: Option<Arc<dyn AttackClassifier>>,
    ) -> Self {
        Self {
            anomaly,
            classifier,
            anomaly_weight: 0.5,
            classification_weight: 0.5,
        }
    }

    pub fn with_weights(mut self, anomaly_weight: f64, classification_weight: f64) -> Self {
        self.anomaly_weight = anomaly_weight;
        self.classification_weight = classification_weight;
        self
    }

    pub fn predict(&self, features: &FeatureMap) -> MlPrediction {
        let anomaly = self.anomaly.as_ref().and_then(|m| {
            // Score before observing so a record cannot bias its own score.
            let score = if m.is_trained() {
                match m.score(features) {
                    Ok(score) => Some(score),
                    Err(error) => {
                        warn!(%error, "anomaly model failed");
                        None
                    }
                }
            } else {
                None
            };
            m.observe(features);
            score
        });

        let classification = self
            .classifier
            .as_ref()
            .filter(|m| m.is_trained())
            .and_then(|m| match m.classify(features) {
                Ok(result) => Some(result),
                Err(error) => {
                    warn!(%error, "attack classifier failed");
                    None
                }
            });

        if anomaly.is_none() && classification.is_none() {
            return MlPrediction::neutral();
        }

        let (is_anomaly, anomaly_score) = anomaly
            .map(|a| (a.is_anomaly, a.score))
            .unwrap_or((false, 0.0));
        let (attack_type, confidence) = classification
            .map(|c| (c.attack_type, c.confidence))
            .unwrap_or((AttackType::Normal, 0.0));

        let is_attack = attack_type != AttackType::Normal && confidence > 0.5;
        let anomaly_confidence = if anomaly_score != 0.0 {
            anomaly_score.abs() / 10.0
        } else {
            0.0
        };

        MlPrediction {
            is_threat: is_anomaly || is_attack,
            is_anomaly,
            is_attack,
            attack_type,
            confidence,
            anomaly_score,
            combined_confidence: anomaly_confidence * self.anomaly_weight
                + confidence * self.classification_weight,
            model_ready: true,
        }
    }
}

/// Baseline anomaly model scoring the deviation of a record's feature
/// magnitude from the recent population (Welford-style rolling window).
pub struct ZScoreAnomalyModel {
    window: RwLock<VecDeque<f64>>,
    window_size: usize,
    min_samples: usize,
    z_threshold: f64,
}

impl ZScoreAnomalyModel {
    pub fn new(window_size: usize, min_samples: usize, z_threshold: f64) -> Self {
        Self {
            window: RwLock::new(VecDeque::with_capacity(window_size)),
            window_size,
            min_samples,
            z_threshold,
        }
    }

    /// L2 magnitude of the feature vector; the ordered map keeps columns stable.
    fn magnitude(features: &FeatureMap) -> f64 {
        features.values().map(|v| v * v).sum::<f64>().sqrt()
    }
}

impl AnomalyModel for ZScoreAnomalyModel {
    fn is_trained(&self) -> bool {
        self.window.read().len() >= self.min_samples
    }

    fn score(&self, features: &FeatureMap) -> PipelineResult<AnomalyScore> {
        let samples: Vec<f64> = self.window.read().iter().copied().collect();
        let data = Data::new(samples);
        let mean = data.mean().unwrap_or(0.0);
        let std_dev = data.std_dev().unwrap_or(0.0);
        if std_dev == 0.0 {
            return Ok(AnomalyScore {
                is_anomaly: false,
                score: 0.0,
            });
        }
        let z = (Self::magnitude(features) - mean) / std_dev;
        Ok(AnomalyScore {
            is_anomaly: z.abs() > self.z_threshold,
            score: z,
        })
    }

    fn observe(&self, features: &FeatureMap) {
        let mut window = self.window.write();
        if window.len() >= self.window_size {
            window.pop_front();
        }
        window.push_back(Self::magnitude(features));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PipelineError;

    pub(crate) struct StaticAnomaly {
        pub score: f64,
        pub anomaly: bool,
    }

    impl AnomalyModel for StaticAnomaly {
        fn is_trained(&self) -> bool {
            true
        }

        fn score(&self, _features: &FeatureMap) -> PipelineResult<AnomalyScore> {
            Ok(AnomalyScore {
                is_anomaly: self.anomaly,
                score: self.score,
            })
        }
    }

    struct StaticClassifier {
        attack_type: AttackType,
        confidence: f64,
    }

    impl AttackClassifier for StaticClassifier {
        fn is_trained(&self) -> bool {
            true
        }

        fn classify(&self, _features: &FeatureMap) -> PipelineResult<Classification> {
            Ok(Classification {
                attack_type: self.attack_type,
                confidence: self.confidence,
            })
        }
    }

    struct Broken;

    impl AttackClassifier for Broken {
        fn is_trained(&self) -> bool {
            true
        }

        fn classify(&self, _features: &FeatureMap) -> PipelineResult<Classification> {
            Err(PipelineError::ModelUnavailable("broken".to_string()))
        }
    }

    #[test]
    fn test_neutral_when_no_models() {
        let predictor = EnsemblePredictor::new(None, None);
        let prediction = predictor.predict(&FeatureMap::new());
        assert!(!prediction.is_threat);
        assert_eq!(prediction.attack_type, AttackType::Normal);
        assert_eq!(prediction.confidence, 0.0);
        assert!(!prediction.model_ready);
    }

    #[test]
    fn test_anomaly_alone_flags_threat() {
        let predictor = EnsemblePredictor::new(
            Some(Arc::new(StaticAnomaly {
                score: -4.0,
                anomaly: true,
            })),
            None,
        );
        let prediction = predictor.predict(&FeatureMap::new());
        assert!(prediction.is_threat);
        assert!(prediction.is_anomaly);
        assert!(!prediction.is_attack);
        // 0.5 * |-4.0| / 10 = 0.2
        assert!((prediction.combined_confidence - 0.2).abs() < 1e-9);
    }

    #[test]
    fn test_attack_requires_confidence() {
        let predictor = EnsemblePredictor::new(
            None,
            Some(Arc::new(StaticClassifier {
                attack_type: AttackType::Ddos,
                confidence: 0.4,
            })),
        );
        let prediction = predictor.predict(&FeatureMap::new());
        assert!(!prediction.is_attack);
        assert!(!prediction.is_threat);

        let predictor = EnsemblePredictor::new(
            None,
            Some(Arc::new(StaticClassifier {
                attack_type: AttackType::Ddos,
                confidence: 0.9,
            })),
        );
        let prediction = predictor.predict(&FeatureMap::new());
        assert!(prediction.is_attack);
        assert!(prediction.is_threat);
    }

    #[test]
    fn test_broken_model_degrades_to_other() {
        let predictor = EnsemblePredictor::new(
            Some(Arc::new(StaticAnomaly {
                score: -6.0,
                anomaly: true,
            })),
            Some(Arc::new(Broken)),
        );
        let prediction = predictor.predict(&FeatureMap::new());
        assert!(prediction.is_threat);
        assert_eq!(prediction.attack_type, AttackType::Normal);
    }

    #[test]
    fn test_zscore_model_trains_and_scores() {
        let model = ZScoreAnomalyModel::new(100, 10, 3.0);
        let mut features = FeatureMap::new();
        for i in 0..20 {
            features.insert("message_length".to_string(), 10.0 + (i % 3) as f64);
            model.observe(&features);
        }
        assert!(model.is_trained());

        features.insert("message_length".to_string(), 11.0);
        let score = model.score(&features).unwrap();
        assert!(!score.is_anomaly);

        features.insert("message_length".to_string(), 500.0);
        let score = model.score(&features).unwrap();
        assert!(score.is_anomaly);
    }
}
