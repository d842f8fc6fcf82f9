// THEORY:
// The `detection` module is the boundary between the tracking engine and the
// object-detection model that feeds it. The engine never looks at pixels: it
// receives, once per sampled frame, a list of `Detection`s and nothing more.
//
// Key architectural principles:
// 1.  **Ephemeral Input**: A `Detection` lives for exactly one matching cycle.
//     It has no identity; identity is assigned later by the tracker.
// 2.  **Narrow Contract**: The `DetectionAdapter` trait is the only thing the
//     engine knows about the model. How inference is done, on what backend and
//     with which weights, is the adapter's business.
// 3.  **Person Filtering**: Models in the COCO family report many classes.
//     `person_detections` reduces a raw prediction list to the people the
//     engine cares about, above a confidence floor.

use crate::core_modules::geometry::BoundingBox;
use crate::error::DetectionError;
use futures::future::BoxFuture;
use image::RgbaImage;
use serde::{Deserialize, Serialize};

#[cfg(test)]
use mockall::automock;

/// The class label a COCO-style detector uses for people.
pub const PERSON_CLASS: &str = "person";
/// Default minimum confidence a detection needs to be considered a person.
pub const DEFAULT_CONFIDENCE_FLOOR: f32 = 0.5;

/// One frame's observation of a candidate person.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub bounding_box: BoundingBox,
    pub confidence: f32,
}

impl Detection {
    pub fn new(bounding_box: BoundingBox, confidence: f32) -> Self {
        Self { bounding_box, confidence }
    }
}

/// A single prediction straight out of a multi-class detector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawPrediction {
    pub class: String,
    pub score: f32,
    pub bounding_box: BoundingBox,
}

/// Keeps only `person` predictions whose score is strictly above `floor`.
pub fn person_detections(predictions: &[RawPrediction], floor: f32) -> Vec<Detection> {
    predictions
        .iter()
        .filter(|p| p.class == PERSON_CLASS && p.score > floor)
        .map(|p| Detection::new(p.bounding_box, p.score))
        .collect()
}

/// Produces the person detections for one frame.
#[cfg_attr(test, automock)]
pub trait DetectionAdapter {
    /// Whether the model is loaded and able to take frames.
    fn is_ready(&self) -> bool;

    fn detect(&mut self, frame: &RgbaImage) -> Result<Vec<Detection>, DetectionError>;
}

/// Asynchronous flavour of [`DetectionAdapter`] used by the monitoring session,
/// for detectors whose inference suspends (remote models, GPU queues).
pub trait AsyncDetectionAdapter: Send + 'static {
    fn is_ready(&self) -> bool;

    fn detect<'a>(
        &'a mut self,
        frame: &'a RgbaImage,
    ) -> BoxFuture<'a, Result<Vec<Detection>, DetectionError>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn prediction(class: &str, score: f32) -> RawPrediction {
        RawPrediction {
            class: class.to_string(),
            score,
            bounding_box: BoundingBox::new(0.0, 0.0, 10.0, 20.0),
        }
    }

    #[test]
    fn keeps_only_confident_people() {
        let predictions = vec![
            prediction("person", 0.9),
            prediction("dog", 0.99),
            prediction("person", 0.5),
            prediction("person", 0.51),
            prediction("chair", 0.2),
        ];

        let people = person_detections(&predictions, DEFAULT_CONFIDENCE_FLOOR);
        let scores: Vec<f32> = people.iter().map(|d| d.confidence).collect();
        assert_eq!(scores, vec![0.9, 0.51]);
    }

    #[test]
    fn empty_predictions_yield_no_detections() {
        assert!(person_detections(&[], DEFAULT_CONFIDENCE_FLOOR).is_empty());
    }
}
