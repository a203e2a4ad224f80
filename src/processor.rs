//! Background removal processor
//!
//! [`BackgroundRemovalProcessor`] sequences one removal call: provision the
//! model, decode, preprocess, infer, composite, encode and (for files) write
//! the result. CPU-bound stages run on the blocking thread pool. Every error
//! leaving the processor is annotated with the stage that produced it.

use crate::{
    cache::write_atomically,
    config::RemovalConfig,
    error::{BgRemovalError, Result},
    inference::{BackendFactory, DefaultBackendFactory, InferenceBackend},
    provision::ModelProvisioner,
    services::{NoOpProgressReporter, ProcessingStage, ProgressReporter, ProgressTracker},
    session_cache::{SessionCache, SessionCacheStats, SessionKey, SharedBackend},
    types::{ProcessingTimings, RemovalResult, SegmentationMask},
    utils::{ImagePreprocessor, MaskPostprocessor},
};
use image::{DynamicImage, RgbaImage};
use instant::Instant;
use ndarray::Array4;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::{debug, info, instrument, span, Instrument, Level};

/// Suffix appended to the input stem when no output path is given
pub const DEFAULT_OUTPUT_SUFFIX: &str = "_nobg.png";

/// Output path used when none is given: `<dir>/<stem>_nobg.png`
///
/// ```rust
/// use cleancut::default_output_path;
/// use std::path::Path;
///
/// assert_eq!(default_output_path("photos/cat.jpg"), Path::new("photos/cat_nobg.png"));
/// assert_eq!(default_output_path("scan"), Path::new("scan_nobg.png"));
/// ```
#[must_use]
pub fn default_output_path<P: AsRef<Path>>(input: P) -> PathBuf {
    let input = input.as_ref();
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    input.with_file_name(format!("{stem}{DEFAULT_OUTPUT_SUFFIX}"))
}

/// Run a CPU-bound step on the blocking pool and annotate its error with `stage`
async fn run_blocking<T, F>(stage: ProcessingStage, task: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    let joined = tokio::task::spawn_blocking(task).await;
    let result = match joined {
        Ok(result) => result,
        Err(e) => Err(BgRemovalError::internal(format!("{stage} task failed: {e}"))),
    };
    result.map_err(|e| e.in_stage(stage))
}

fn elapsed_ms(start: Instant) -> u64 {
    u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX)
}

/// Sequences a background removal call end to end
pub struct BackgroundRemovalProcessor {
    config: RemovalConfig,
    provisioner: ModelProvisioner,
    backend_factory: Arc<dyn BackendFactory>,
    session_cache: Arc<SessionCache>,
    reporter: Arc<dyn ProgressReporter>,
}

impl std::fmt::Debug for BackgroundRemovalProcessor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackgroundRemovalProcessor")
            .field("config", &self.config)
            .field("provisioner", &self.provisioner)
            .finish_non_exhaustive()
    }
}

impl BackgroundRemovalProcessor {
    /// Create a processor that downloads the model over HTTP(S) and uses the
    /// compiled-in inference backends with the process-wide session cache
    ///
    /// # Errors
    /// - Invalid configuration
    /// - HTTP client creation failure
    pub fn new(config: RemovalConfig) -> Result<Self> {
        config.validate()?;
        let provisioner =
            ModelProvisioner::new(config.model_descriptor()?)?.show_progress(config.show_progress);
        Ok(Self {
            config,
            provisioner,
            backend_factory: Arc::new(DefaultBackendFactory),
            session_cache: SessionCache::global(),
            reporter: Arc::new(NoOpProgressReporter),
        })
    }

    /// Create a processor from explicit collaborators
    ///
    /// The processor gets its own session cache so custom factories never
    /// share sessions with the default one.
    #[must_use]
    pub fn with_components(
        config: RemovalConfig,
        provisioner: ModelProvisioner,
        backend_factory: Arc<dyn BackendFactory>,
    ) -> Self {
        Self {
            config,
            provisioner,
            backend_factory,
            session_cache: Arc::new(SessionCache::new()),
            reporter: Arc::new(NoOpProgressReporter),
        }
    }

    /// Receive stage transitions through `reporter`
    #[must_use]
    pub fn with_progress_reporter(mut self, reporter: Arc<dyn ProgressReporter>) -> Self {
        self.reporter = reporter;
        self
    }

    #[must_use]
    pub fn config(&self) -> &RemovalConfig {
        &self.config
    }

    #[must_use]
    pub fn provisioner(&self) -> &ModelProvisioner {
        &self.provisioner
    }

    /// Hit/miss statistics of the session cache used by this processor
    #[must_use]
    pub fn session_cache_stats(&self) -> SessionCacheStats {
        self.session_cache.stats()
    }

    /// Remove the background of `input` and write a PNG to `output`.
    ///
    /// The output is written to a temporary file in the destination directory
    /// and renamed into place, so a failed call never leaves a partial file.
    ///
    /// # Errors
    /// - Model provisioning failure
    /// - Input cannot be read or decoded
    /// - Inference failure
    /// - Output cannot be encoded or written
    #[instrument(
        skip(self, input, output),
        fields(input = %input.as_ref().display(), backend = %self.config.backend_type)
    )]
    pub async fn process_file<P: AsRef<Path>, Q: AsRef<Path>>(
        &self,
        input: P,
        output: Q,
    ) -> Result<RemovalResult> {
        let input = input.as_ref().to_path_buf();
        let output = output.as_ref().to_path_buf();
        let mut tracker = ProgressTracker::new(self.reporter.as_ref());

        let result = self.run_file(&input, &output, &mut tracker).await;
        Self::finish(&mut tracker, result)
    }

    /// Remove the background of an encoded image held in memory
    ///
    /// # Errors
    /// - Model provisioning failure
    /// - Bytes cannot be decoded
    /// - Inference failure
    /// - Output cannot be encoded
    #[instrument(
        skip(self, image_bytes),
        fields(size = image_bytes.len(), backend = %self.config.backend_type)
    )]
    pub async fn process_bytes(&self, image_bytes: Vec<u8>) -> Result<RemovalResult> {
        let mut tracker = ProgressTracker::new(self.reporter.as_ref());
        let mut timings = ProcessingTimings::default();
        let total_start = Instant::now();

        let result = async {
            let model_path = self.provision(&mut tracker, &mut timings).await?;
            self.run_pipeline(image_bytes, &model_path, &mut tracker, &mut timings)
                .await
        }
        .await
        .map(|mut result| {
            result.timings.total_ms = elapsed_ms(total_start);
            result
        });
        Self::finish(&mut tracker, result)
    }

    fn finish(
        tracker: &mut ProgressTracker<'_>,
        result: Result<RemovalResult>,
    ) -> Result<RemovalResult> {
        match &result {
            Ok(removal) => tracker.report_completion(&removal.timings),
            Err(e) => {
                let stage = e
                    .stage()
                    .or(tracker.current_stage())
                    .unwrap_or(ProcessingStage::Provisioning);
                tracker.report_error(stage, &e.to_string());
            },
        }
        result
    }

    async fn run_file(
        &self,
        input: &Path,
        output: &Path,
        tracker: &mut ProgressTracker<'_>,
    ) -> Result<RemovalResult> {
        let mut timings = ProcessingTimings::default();
        let total_start = Instant::now();

        let model_path = self.provision(tracker, &mut timings).await?;

        tracker.report_stage(ProcessingStage::ImageLoading);
        let read_start = Instant::now();
        let image_bytes = tokio::fs::read(input)
            .await
            .map_err(|e| {
                BgRemovalError::file_io_error("read input image", input, &e)
                    .in_stage(ProcessingStage::ImageLoading)
            })?;
        timings.image_decode_ms = elapsed_ms(read_start);

        let mut result = self
            .run_pipeline(image_bytes, &model_path, tracker, &mut timings)
            .await?;

        tracker.report_stage(ProcessingStage::FileSaving);
        let png = result.png_bytes.clone();
        let target = output.to_path_buf();
        run_blocking(ProcessingStage::FileSaving, move || {
            write_atomically(&target, &png, "write output image")
                .map_err(|e| BgRemovalError::output(e.to_string()))
        })
        .instrument(span!(Level::DEBUG, "file_saving"))
        .await?;

        info!(output = %output.display(), "Background removed");
        result.timings = ProcessingTimings {
            total_ms: elapsed_ms(total_start),
            ..result.timings
        };
        Ok(result)
    }

    async fn provision(
        &self,
        tracker: &mut ProgressTracker<'_>,
        timings: &mut ProcessingTimings,
    ) -> Result<PathBuf> {
        tracker.report_stage(ProcessingStage::Provisioning);
        let start = Instant::now();
        let model_path = self
            .provisioner
            .ensure_model()
            .instrument(span!(Level::INFO, "provisioning"))
            .await
            .map_err(|e| e.in_stage(ProcessingStage::Provisioning))?;
        timings.provisioning_ms = elapsed_ms(start);
        Ok(model_path)
    }

    async fn run_pipeline(
        &self,
        image_bytes: Vec<u8>,
        model_path: &Path,
        tracker: &mut ProgressTracker<'_>,
        timings: &mut ProcessingTimings,
    ) -> Result<RemovalResult> {
        // Decode
        tracker.report_stage(ProcessingStage::ImageLoading);
        let start = Instant::now();
        let image: Arc<DynamicImage> = Arc::new(
            run_blocking(ProcessingStage::ImageLoading, move || {
                ImagePreprocessor::decode(&image_bytes)
            })
            .instrument(span!(Level::DEBUG, "decode"))
            .await?,
        );
        timings.image_decode_ms += elapsed_ms(start);
        let (width, height) = (image.width(), image.height());
        debug!(width, height, "Decoded input image");

        // Preprocess
        tracker.report_stage(ProcessingStage::Preprocessing);
        let start = Instant::now();
        let source = Arc::clone(&image);
        let tensor = run_blocking(ProcessingStage::Preprocessing, move || {
            Ok(ImagePreprocessor::tensor_from_image(&source))
        })
        .instrument(span!(Level::DEBUG, "preprocessing", width, height))
        .await?;
        timings.preprocessing_ms = elapsed_ms(start);

        // Load or reuse the session
        tracker.report_stage(ProcessingStage::ModelLoading);
        let start = Instant::now();
        let backend = self
            .acquire_backend(model_path.to_path_buf())
            .instrument(span!(Level::DEBUG, "model_loading"))
            .await?;
        timings.model_load_ms = elapsed_ms(start);

        // Forward pass
        tracker.report_stage(ProcessingStage::Inference);
        let start = Instant::now();
        let matte = run_blocking(ProcessingStage::Inference, move || {
            let mut backend = backend
                .lock()
                .map_err(|_| BgRemovalError::internal("Inference session lock poisoned"))?;
            backend.infer(&tensor)
        })
        .instrument(span!(Level::INFO, "inference", backend = %self.config.backend_type))
        .await?;
        timings.inference_ms = elapsed_ms(start);

        // Composite
        tracker.report_stage(ProcessingStage::Postprocessing);
        let start = Instant::now();
        let (rgba, mask) = run_blocking(ProcessingStage::Postprocessing, move || {
            Self::composite(&image, &matte, width, height)
        })
        .instrument(span!(Level::DEBUG, "postprocessing", width, height))
        .await?;
        timings.postprocessing_ms = elapsed_ms(start);

        // Encode
        tracker.report_stage(ProcessingStage::Encoding);
        let start = Instant::now();
        let png_bytes = run_blocking(ProcessingStage::Encoding, move || {
            MaskPostprocessor::encode_png(&rgba)
        })
        .instrument(span!(Level::DEBUG, "encoding"))
        .await?;
        timings.image_encode_ms = elapsed_ms(start);

        Ok(RemovalResult::new(
            png_bytes,
            mask,
            (width, height),
            timings.clone(),
        ))
    }

    fn composite(
        image: &DynamicImage,
        matte: &Array4<f32>,
        width: u32,
        height: u32,
    ) -> Result<(RgbaImage, SegmentationMask)> {
        let mask = MaskPostprocessor::matte_to_mask(matte, width, height)?;
        let rgba = MaskPostprocessor::apply_alpha(image, &mask)?;
        Ok((rgba, mask))
    }

    /// Initialized backend for `model_path`, from the session cache unless disabled
    async fn acquire_backend(&self, model_path: PathBuf) -> Result<SharedBackend> {
        let factory = Arc::clone(&self.backend_factory);
        let cache = Arc::clone(&self.session_cache);
        let config = self.config.clone();

        run_blocking(ProcessingStage::ModelLoading, move || {
            let backend_type = config.backend_type;
            let load = || -> Result<Box<dyn InferenceBackend>> {
                let mut backend = factory.create_backend(backend_type, &config)?;
                if let Some(load_time) = backend.initialize(&model_path)? {
                    debug!(
                        load_ms = load_time.as_millis() as u64,
                        input = backend.input_name().unwrap_or("?"),
                        output = backend.output_name().unwrap_or("?"),
                        "Inference session loaded"
                    );
                }
                Ok(backend)
            };

            if config.disable_cache {
                return Ok(Arc::new(Mutex::new(load()?)));
            }

            let key = SessionKey::for_model(backend_type, &model_path, config.intra_threads)?;
            let (backend, _loaded) = cache.get_or_try_insert_with(key, load)?;
            Ok(backend)
        })
        .await
    }
}
