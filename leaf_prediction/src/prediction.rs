use ndarray::ArrayView1;
use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PredictionError {
    #[error("Model returned an empty output")]
    EmptyOutput,
    #[error("Model returned {outputs} scores but {labels} class labels are configured")]
    LabelMismatch { labels: usize, outputs: usize },
    #[error("Model returned a non-finite score {score} at index {index}")]
    NonFinite { index: usize, score: f32 },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Prediction {
    #[serde(rename = "class")]
    pub class_label: String,
    pub confidence: f32,
}

/// Picks the highest scoring class. Ties go to the lowest index.
pub fn top_prediction(
    scores: ArrayView1<f32>,
    class_labels: &[String],
) -> Result<Prediction, PredictionError> {
    if scores.len() != class_labels.len() {
        return Err(PredictionError::LabelMismatch {
            labels: class_labels.len(),
            outputs: scores.len(),
        });
    }

    if let Some((index, score)) = scores
        .iter()
        .copied()
        .enumerate()
        .find(|(_, score)| !score.is_finite())
    {
        return Err(PredictionError::NonFinite { index, score });
    }

    let (class_id, confidence) = scores
        .iter()
        .copied()
        .enumerate()
        .reduce(|accum, row| if row.1 > accum.1 { row } else { accum })
        .ok_or(PredictionError::EmptyOutput)?;

    Ok(Prediction {
        class_label: class_labels[class_id].clone(),
        confidence,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn labels() -> Vec<String> {
        vec![
            "Early Blight".to_string(),
            "Late Blight".to_string(),
            "Healthy".to_string(),
        ]
    }

    #[test]
    fn test_top_prediction_uses_argmax() {
        let scores = array![0.1, 0.7, 0.2];
        let prediction = top_prediction(scores.view(), &labels()).unwrap();

        assert_eq!(prediction.class_label, "Late Blight");
        assert_eq!(prediction.confidence, 0.7);
    }

    #[test]
    fn test_ties_resolve_to_first_index() {
        let scores = array![0.4, 0.2, 0.4];
        let prediction = top_prediction(scores.view(), &labels()).unwrap();

        assert_eq!(prediction.class_label, "Early Blight");
    }

    #[test]
    fn test_label_mismatch_is_an_error() {
        let scores = array![0.1, 0.9];
        let result = top_prediction(scores.view(), &labels());

        assert!(matches!(
            result,
            Err(PredictionError::LabelMismatch {
                labels: 3,
                outputs: 2
            })
        ));
    }

    #[test]
    fn test_empty_output_is_an_error() {
        let scores = ndarray::Array1::<f32>::zeros(0);
        let result = top_prediction(scores.view(), &[]);

        assert!(matches!(result, Err(PredictionError::EmptyOutput)));
    }

    #[test]
    fn test_non_finite_scores_are_an_error() {
        let scores = array![f32::NAN, 0.7, 0.2];
        let result = top_prediction(scores.view(), &labels());
        assert!(matches!(
            result,
            Err(PredictionError::NonFinite { index: 0, .. })
        ));

        let scores = array![0.1, f32::NAN, 0.2];
        let result = top_prediction(scores.view(), &labels());
        assert!(matches!(
            result,
            Err(PredictionError::NonFinite { index: 1, .. })
        ));

        let scores = array![0.1, 0.2, f32::INFINITY];
        let result = top_prediction(scores.view(), &labels());
        assert!(matches!(
            result,
            Err(PredictionError::NonFinite { index: 2, .. })
        ));
    }

    #[test]
    fn test_serializes_with_class_key() {
        let prediction = Prediction {
            class_label: "Healthy".to_string(),
            confidence: 0.5,
        };
        let json = serde_json::to_value(&prediction).unwrap();

        assert_eq!(json["class"], "Healthy");
        assert_eq!(json["confidence"], 0.5);
    }
}
