use super::preprocess::Preprocessor;
use super::types::{Mask, SegmentationProvider};
use crate::capture::Frame;
use crate::config::ModelConfig;
use crate::error::{InferenceError, ModelLoadError};
use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;
use ort::value::TensorRef;
use std::sync::{Arc, Mutex};

/// Person segmentation through a single-output ONNX model.
///
/// The model takes a `[1, 3, H, W]` RGB tensor in [0, 1] and produces a person
/// probability map, either `[1, 1, H, W]`, `[1, H, W, 1]`, `[1, H, W]`, or a
/// two-class `[1, 2, H, W]` / `[1, H, W, 2]` map whose second class is the
/// person. No state is carried between frames.
pub struct OnnxSegmenter {
    session: Arc<Mutex<Session>>,
    preprocessor: Preprocessor,
}

impl OnnxSegmenter {
    /// Load the model described by `config`.
    pub fn load(config: &ModelConfig) -> Result<Self, ModelLoadError> {
        let path = &config.path;
        tracing::info!("Loading segmentation model from {}", path.display());

        if !path.exists() {
            return Err(ModelLoadError::NotFound(path.display().to_string()));
        }

        let session = Session::builder()
            .map_err(|e| ModelLoadError::Runtime(e.to_string()))?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(|e| ModelLoadError::Runtime(e.to_string()))?
            .with_intra_threads(config.intra_threads)
            .map_err(|e| ModelLoadError::Runtime(e.to_string()))?
            .commit_from_file(path)
            .map_err(|e| ModelLoadError::Runtime(e.to_string()))?;

        tracing::info!(
            "Segmentation model loaded, input {}x{}",
            config.input_width,
            config.input_height
        );

        Ok(Self {
            session: Arc::new(Mutex::new(session)),
            preprocessor: Preprocessor::new(config.input_width, config.input_height),
        })
    }
}

impl SegmentationProvider for OnnxSegmenter {
    async fn segment(&mut self, frame: &Frame, threshold: f32) -> Result<Mask, InferenceError> {
        let session = Arc::clone(&self.session);
        let preprocessor = self.preprocessor;
        let frame = frame.clone();

        // Keep the runtime thread free while the model runs
        tokio::task::spawn_blocking(move || run_model(&session, preprocessor, &frame, threshold))
            .await
            .map_err(|e| InferenceError(format!("inference task aborted: {e}")))?
    }
}

fn run_model(
    session: &Mutex<Session>,
    preprocessor: Preprocessor,
    frame: &Frame,
    threshold: f32,
) -> Result<Mask, InferenceError> {
    let _span = tracing::debug_span!("onnx_segment").entered();

    let input = preprocessor.preprocess(frame.image());
    let tensor =
        TensorRef::from_array_view(input.view()).map_err(|e| InferenceError(e.to_string()))?;

    let mut session = session
        .lock()
        .map_err(|_| InferenceError("session lock poisoned".to_string()))?;

    let _infer_span = tracing::debug_span!("inference").entered();
    let outputs = session
        .run(ort::inputs![tensor])
        .map_err(|e| InferenceError(e.to_string()))?;
    drop(_infer_span);

    let (shape, data) = outputs[0]
        .try_extract_tensor::<f32>()
        .map_err(|e| InferenceError(e.to_string()))?;

    let (model_width, model_height, plane) = person_plane(shape, data)
        .ok_or_else(|| InferenceError(format!("unexpected output shape {:?}", &shape[..])))?;

    let (frame_width, frame_height) = frame.dimensions();
    let probabilities =
        Preprocessor::postprocess(plane, model_width, model_height, frame_width, frame_height)
            .ok_or_else(|| InferenceError("output size does not match its shape".to_string()))?;

    Mask::from_probabilities(frame_width, frame_height, &probabilities, threshold)
        .ok_or_else(|| InferenceError("mask size mismatch".to_string()))
}

/// Pull the person probability plane out of a model output, returning
/// `(width, height, values)`.
fn person_plane(shape: &[i64], data: &[f32]) -> Option<(u32, u32, Vec<f32>)> {
    let dims: Vec<usize> = shape
        .iter()
        .map(|&d| usize::try_from(d).ok())
        .collect::<Option<_>>()?;

    let (height, width, channels, channels_last) = match dims.as_slice() {
        [1, c @ (1 | 2), h, w] => (*h, *w, *c, false),
        [1, h, w, c @ (1 | 2)] => (*h, *w, *c, true),
        [1, h, w] => (*h, *w, 1, false),
        _ => return None,
    };

    if data.len() != height * width * channels {
        return None;
    }

    let person = channels - 1;
    let plane = if channels == 1 {
        data.to_vec()
    } else if channels_last {
        data.iter().skip(person).step_by(channels).copied().collect()
    } else {
        data[person * height * width..(person + 1) * height * width].to_vec()
    };

    Some((u32::try_from(width).ok()?, u32::try_from(height).ok()?, plane))
}
