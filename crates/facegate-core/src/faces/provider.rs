use std::time::Instant;

use crate::errors::AppResult;
use crate::faces::embedding::EmbeddingVector;

/// A face found by the external extractor.
#[derive(Debug, Clone, PartialEq)]
pub struct FaceDetection {
    pub embedding: EmbeddingVector,
    pub detection_confidence: f64,
}

/// Event pushed by the frame source: one detected face at one instant.
#[derive(Debug, Clone, PartialEq)]
pub struct FaceObservation {
    pub embedding: EmbeddingVector,
    pub detection_confidence: f64,
    pub timestamp: Instant,
}

impl FaceObservation {
    pub fn new(embedding: EmbeddingVector, detection_confidence: f64, timestamp: Instant) -> Self {
        Self {
            embedding,
            detection_confidence,
            timestamp,
        }
    }

    pub fn from_detection(detection: FaceDetection, timestamp: Instant) -> Self {
        Self::new(detection.embedding, detection.detection_confidence, timestamp)
    }
}

/// Turns raw frame data into at most one face embedding.
///
/// Camera access, image decoding and the embedding model live behind this
/// trait; the decision core only consumes its output.
pub trait FaceEmbeddingProvider {
    type Frame;

    fn extract(&self, frame: &Self::Frame) -> AppResult<Option<FaceDetection>>;
}
