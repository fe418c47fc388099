use crate::{
    classification::{softmax, top_k, Classification, Detection, Detections},
    labels::LabelTable,
    model_service::{ModelError, ModelService},
    preprocessing::{preprocess, ImageTensor, PreprocessError, CROP_SIZE},
};
use std::sync::Arc;
use thiserror::Error;
use tracing::instrument;

#[derive(Error, Debug)]
pub enum ClassifyError {
    #[error("Empty upload")]
    EmptyUpload,
    #[error("Invalid image: {0}")]
    InvalidImage(#[from] PreprocessError),
    #[error("Model error: {0}")]
    Model(#[from] ModelError),
    #[error("Model returned {scores} scores for {labels} labels")]
    LabelMismatch { scores: usize, labels: usize },
}

#[derive(Clone)]
pub struct InferenceService<M: ModelService> {
    model_service: Arc<M>,
    labels: Arc<LabelTable>,
    top_k: usize,
}

impl<M: ModelService> InferenceService<M> {
    pub fn new(model_service: M, labels: LabelTable, top_k: usize) -> Self {
        Self {
            model_service: Arc::new(model_service),
            labels: Arc::new(labels),
            top_k,
        }
    }

    pub fn labels(&self) -> &LabelTable {
        &self.labels
    }

    /// Runs one forward pass on a blank input so a label file that does not match the
    /// model fails at startup instead of on every request.
    pub async fn check_label_count(&self) -> Result<(), ClassifyError> {
        let side = CROP_SIZE as usize;
        let scores = self
            .model_service
            .forward(ImageTensor::zeros((1, 3, side, side)))
            .await?;
        self.check_scores(&scores)
    }

    fn check_scores(&self, scores: &[f32]) -> Result<(), ClassifyError> {
        if scores.len() != self.labels.len() {
            return Err(ClassifyError::LabelMismatch {
                scores: scores.len(),
                labels: self.labels.len(),
            });
        }
        Ok(())
    }

    #[instrument(skip(self, image_data), fields(bytes = image_data.len()))]
    pub async fn classify(&self, image_data: Vec<u8>) -> Result<Classification, ClassifyError> {
        if image_data.is_empty() {
            return Err(ClassifyError::EmptyUpload);
        }

        let input = tokio::task::spawn_blocking(move || preprocess(&image_data))
            .await
            .map_err(ModelError::from)??;

        let scores = self.model_service.forward(input).await?;
        self.check_scores(&scores)?;

        let probabilities = softmax(&scores);
        let detections = top_k(&probabilities, self.top_k)
            .into_iter()
            .filter_map(|(index, probability)| {
                self.labels.get(index).map(|label| Detection {
                    label: label.to_string(),
                    probability,
                })
            })
            .collect::<Vec<_>>();

        for (rank, detection) in detections.iter().enumerate() {
            tracing::debug!(
                "Rank {}: {} ({:.4})",
                rank + 1,
                detection.label,
                detection.probability
            );
        }

        Ok(Classification {
            detections: Detections(detections),
        })
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::preprocessing::tests::png_bytes;
    use async_trait::async_trait;

    pub(crate) const MOCK_LABELS: [&str; 8] = [
        "tench",
        "goldfish",
        "tabby",
        "tiger cat",
        "egyptian cat",
        "lynx",
        "crane",
        "crane",
    ];

    /// Scores derived from the mean of the input so different images rank differently.
    #[derive(Clone)]
    pub(crate) struct MockModelService {}

    #[async_trait]
    impl ModelService for MockModelService {
        async fn forward(&self, input: ImageTensor) -> Result<Vec<f32>, ModelError> {
            let mean = input.mean().unwrap_or(0.0);
            Ok(vec![0.1, 0.2, 3.5 + mean.clamp(-0.4, 0.4), 2.5, 2.0, 0.3, 1.0, 1.5])
        }
    }

    #[derive(Clone)]
    struct WrongSizeModelService {}

    #[async_trait]
    impl ModelService for WrongSizeModelService {
        async fn forward(&self, _input: ImageTensor) -> Result<Vec<f32>, ModelError> {
            Ok(vec![1.0; 3])
        }
    }

    pub(crate) fn mock_service() -> InferenceService<MockModelService> {
        let labels = LabelTable::from_names(MOCK_LABELS.iter().map(|s| s.to_string()).collect());
        InferenceService::new(MockModelService {}, labels, 5)
    }

    #[tokio::test]
    async fn test_classify_returns_ranked_top_five() -> Result<(), Box<dyn std::error::Error>> {
        let service = mock_service();
        let result = service.classify(png_bytes(320, 240, [120, 90, 60])).await?;

        let detections = &result.detections.0;
        assert_eq!(detections.len(), 5);
        assert_eq!(detections[0].label, "tabby");
        assert_eq!(detections[1].label, "tiger cat");
        assert_eq!(detections[2].label, "egyptian cat");
        assert_eq!(detections[3].label, "crane (7)");
        assert_eq!(detections[4].label, "crane");

        assert!(detections
            .windows(2)
            .all(|pair| pair[0].probability >= pair[1].probability));
        assert!(detections
            .iter()
            .all(|d| (0.0..=1.0).contains(&d.probability)));
        let sum: f32 = detections.iter().map(|d| d.probability).sum();
        assert!(sum <= 1.0 + 1e-6);

        Ok(())
    }

    #[tokio::test]
    async fn test_classify_is_deterministic() -> Result<(), Box<dyn std::error::Error>> {
        let service = mock_service();
        let image = png_bytes(64, 128, [200, 10, 10]);

        let first = service.classify(image.clone()).await?;
        let second = service.classify(image).await?;
        assert_eq!(first, second);

        Ok(())
    }

    #[tokio::test]
    async fn test_classify_rejects_empty_upload() {
        let result = mock_service().classify(Vec::new()).await;
        assert!(matches!(result, Err(ClassifyError::EmptyUpload)));
    }

    #[tokio::test]
    async fn test_classify_rejects_invalid_image() {
        let result = mock_service().classify(b"not an image".to_vec()).await;
        assert!(matches!(result, Err(ClassifyError::InvalidImage(_))));
    }

    #[tokio::test]
    async fn test_classify_rejects_label_mismatch() {
        let labels = LabelTable::from_names(MOCK_LABELS.iter().map(|s| s.to_string()).collect());
        let service = InferenceService::new(WrongSizeModelService {}, labels, 5);

        let result = service.classify(png_bytes(10, 10, [0, 0, 0])).await;
        assert!(matches!(
            result,
            Err(ClassifyError::LabelMismatch {
                scores: 3,
                labels: 8
            })
        ));
    }

    #[tokio::test]
    async fn test_label_count_check() {
        assert!(mock_service().check_label_count().await.is_ok());

        let labels = LabelTable::from_names(MOCK_LABELS.iter().map(|s| s.to_string()).collect());
        let service = InferenceService::new(WrongSizeModelService {}, labels, 5);
        assert!(matches!(
            service.check_label_count().await,
            Err(ClassifyError::LabelMismatch {
                scores: 3,
                labels: 8
            })
        ));
    }
}
