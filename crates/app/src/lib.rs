//! Viewer controller: ties document loading, page rendering, annotation
//! capture and saving together behind one `&mut self` API.
//!
//! Every failure is turned into a [`Notice`] as well as returned, so a front
//! end can either inspect the `Result` or just drain notices after each call.

mod notice;
mod paint;

pub use notice::{Notice, NoticeLevel};
pub use paint::{paint_overlay, MARKER_SIZE};

use doc_model::{
    apply_session_action, AnnotationRecord, DocumentSession, InteractionMode, RecordError,
    SessionAction, SurfaceSize,
};
use page_scheduler::{RenderEvent, RenderPipeline};
use pdf_engine::{
    DocumentHandle, OpenSource, PdfEngine, PdfEngineError, PdfUpload, RgbaImage, UploadError,
};
use save_transport::{SaveRequest, SaveTransport, TransportError};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Arc, RwLock};
use storage::ViewerConfig;
use tracing::{debug, info, warn};
use viewer_core::{
    ClickDispatcher, ClickOutcome, ClickPoint, CommentPrompt, OverlayLayer, PageLayout,
    PromptError,
};

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error(transparent)]
    Upload(#[from] UploadError),
    #[error("Failed to load PDF: {0}")]
    Load(PdfEngineError),
    #[error("Please upload a PDF file first.")]
    NoDocument,
    #[error(transparent)]
    Prompt(#[from] PromptError),
    #[error("invalid annotation: {0}")]
    Seed(#[from] RecordError),
    #[error("Failed to save annotations.")]
    SaveRejected,
    #[error("Error saving annotations.")]
    SaveFailed(#[source] TransportError),
}

pub const SAVE_SUCCESS_MESSAGE: &str = "Annotations saved successfully!";

pub struct ViewerApp<E, T> {
    engine: Arc<RwLock<E>>,
    transport: T,
    config: ViewerConfig,
    dispatcher: ClickDispatcher,
    session: DocumentSession,
    prompt: CommentPrompt,
    overlay: OverlayLayer,
    surfaces: BTreeMap<u32, RgbaImage>,
    upload: Option<PdfUpload>,
    handle: Option<DocumentHandle>,
    pipeline: Option<RenderPipeline>,
    generation: u64,
    notices: Vec<Notice>,
}

impl<E, T> ViewerApp<E, T>
where
    E: PdfEngine + Send + Sync + 'static,
    T: SaveTransport,
{
    pub fn new(engine: E, transport: T, config: ViewerConfig) -> Self {
        let dispatcher = ClickDispatcher::new(config.resolver, config.highlight_size());

        Self {
            engine: Arc::new(RwLock::new(engine)),
            transport,
            config,
            dispatcher,
            session: DocumentSession::new(),
            prompt: CommentPrompt::new(),
            overlay: OverlayLayer::new(),
            surfaces: BTreeMap::new(),
            upload: None,
            handle: None,
            pipeline: None,
            generation: 0,
            notices: Vec::new(),
        }
    }

    pub fn config(&self) -> &ViewerConfig {
        &self.config
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn session(&self) -> &DocumentSession {
        &self.session
    }

    pub fn prompt(&self) -> &CommentPrompt {
        &self.prompt
    }

    pub fn overlay(&self) -> &OverlayLayer {
        &self.overlay
    }

    pub fn upload(&self) -> Option<&PdfUpload> {
        self.upload.as_ref()
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn page_image(&self, page: u32) -> Option<&RgbaImage> {
        self.surfaces.get(&page)
    }

    /// Pages that finished rendering, in page order.
    pub fn rendered_pages(&self) -> impl Iterator<Item = u32> + '_ {
        self.surfaces.keys().copied()
    }

    pub fn is_rendering(&self) -> bool {
        self.pipeline.as_ref().is_some_and(|pipeline| !pipeline.is_finished())
    }

    /// A file chosen by the user, with the MIME type the picker reported.
    pub fn select_file(
        &mut self,
        file_name: &str,
        mime_type: &str,
        bytes: Vec<u8>,
    ) -> Result<u32, AppError> {
        let result = match PdfUpload::new(file_name, mime_type, bytes) {
            Ok(upload) => self.load(upload),
            Err(err) => Err(err.into()),
        };
        self.report(result)
    }

    pub fn select_path(&mut self, path: &Path) -> Result<u32, AppError> {
        let result = match PdfUpload::from_path(path) {
            Ok(upload) => self.load(upload),
            Err(err) => Err(err.into()),
        };
        self.report(result)
    }

    /// Adds previously saved records to the current document. They are drawn
    /// on pages that already rendered and replayed on the rest as they finish.
    pub fn seed_annotations(&mut self, records: Vec<AnnotationRecord>) -> Result<usize, AppError> {
        let result = self.seed(records);
        self.report(result)
    }

    /// Applies every render event that is already waiting.
    pub fn pump_render_events(&mut self) -> usize {
        let mut handled = 0;
        while let Some(event) = self.pipeline.as_mut().and_then(RenderPipeline::try_next) {
            self.handle_render_event(event);
            handled += 1;
        }
        handled
    }

    /// Blocks until every page of the current document has reported.
    pub fn wait_for_render(&mut self) -> usize {
        let mut handled = 0;
        while let Some(event) = self.pipeline.as_mut().and_then(RenderPipeline::next_blocking) {
            self.handle_render_event(event);
            handled += 1;
        }
        handled
    }

    pub fn toggle_highlight(&mut self) -> InteractionMode {
        apply_session_action(&mut self.session, SessionAction::ToggleHighlight);
        self.session.mode()
    }

    pub fn toggle_comment(&mut self) -> InteractionMode {
        apply_session_action(&mut self.session, SessionAction::ToggleComment);
        self.session.mode()
    }

    /// A click inside the page container, in container coordinates.
    pub fn click(&mut self, x: f64, y: f64) -> ClickOutcome {
        let outcome =
            self.dispatcher.dispatch(&mut self.session, &mut self.prompt, ClickPoint { x, y });

        if let ClickOutcome::Highlighted(record) = &outcome {
            let layout = self.layout();
            self.overlay.draw(record, &layout);
        }

        outcome
    }

    pub fn confirm_comment(&mut self, text: &str) -> Result<(), AppError> {
        let result = self.prompt.confirm(text).map_err(AppError::from);
        let record = self.report(result)?;

        debug!(page = record.page(), x = record.x(), y = record.y(), "comment added");
        let layout = self.layout();
        self.overlay.draw(&record, &layout);
        apply_session_action(&mut self.session, SessionAction::Append(record));
        Ok(())
    }

    pub fn close_comment_prompt(&mut self) -> bool {
        self.prompt.close()
    }

    pub fn dismiss_comment_prompt(&mut self) -> bool {
        self.prompt.dismiss_outside()
    }

    /// Sends the selected file and every annotation to the save endpoint.
    /// The annotation store is left as is whatever the outcome.
    pub fn save(&mut self) -> Result<(), AppError> {
        let result = self.submit();
        if result.is_ok() {
            self.notices.push(Notice::info(SAVE_SUCCESS_MESSAGE));
        }
        self.report(result)
    }

    pub fn take_notices(&mut self) -> Vec<Notice> {
        std::mem::take(&mut self.notices)
    }

    /// The rendered page with its overlay painted on top.
    pub fn export_page(&self, page: u32) -> Option<RgbaImage> {
        let surface = self.surfaces.get(&page)?;
        let page_top = self.layout().page_top(page)?;
        Some(paint_overlay(surface, page_top, self.overlay.for_page(page)))
    }

    fn load(&mut self, upload: PdfUpload) -> Result<u32, AppError> {
        let (handle, page_count) = {
            let mut engine = self.engine.write().map_err(|_| {
                AppError::Load(PdfEngineError::Backend("render engine lock poisoned".to_owned()))
            })?;

            let handle =
                engine.open(OpenSource::Bytes(upload.bytes().to_vec())).map_err(AppError::Load)?;
            let page_count = match engine.page_count(handle) {
                Ok(page_count) => page_count,
                Err(err) => {
                    if let Err(close_err) = engine.close(handle) {
                        warn!(err = %close_err, "failed to close unreadable document");
                    }
                    return Err(AppError::Load(err));
                }
            };

            if let Some(previous) = self.handle.take() {
                if let Err(err) = engine.close(previous) {
                    warn!(%err, "failed to close previous document");
                }
            }

            (handle, page_count)
        };

        self.generation += 1;
        self.handle = Some(handle);
        apply_session_action(
            &mut self.session,
            SessionAction::OpenDocument { title: upload.file_name().to_owned(), page_count },
        );
        self.prompt = CommentPrompt::new();
        self.overlay.clear();
        self.surfaces.clear();
        self.pipeline = Some(RenderPipeline::spawn(
            Arc::clone(&self.engine),
            handle,
            page_count,
            self.config.render_scale,
            self.generation,
        ));

        info!(file = upload.file_name(), page_count, generation = self.generation, "document loaded");
        self.upload = Some(upload);
        Ok(page_count)
    }

    fn seed(&mut self, records: Vec<AnnotationRecord>) -> Result<usize, AppError> {
        if self.upload.is_none() {
            return Err(AppError::NoDocument);
        }

        let count = records.len();
        self.session.seed(records)?;

        self.overlay.clear();
        let layout = self.layout();
        for page in self.surfaces.keys() {
            self.overlay.replay_page(self.session.store(), *page, &layout);
        }

        Ok(count)
    }

    fn submit(&self) -> Result<(), AppError> {
        let upload = self.upload.as_ref().ok_or(AppError::NoDocument)?;
        let request = SaveRequest {
            file_name: upload.file_name(),
            mime_type: upload.mime_type(),
            file_bytes: upload.bytes(),
            annotations: self.session.store().serialize(),
        };

        match self.transport.save(&request) {
            Ok(()) => {
                info!(count = request.annotations.len(), "annotations saved");
                Ok(())
            }
            Err(TransportError::Rejected) => Err(AppError::SaveRejected),
            Err(err) => {
                warn!(%err, "save failed");
                Err(AppError::SaveFailed(err))
            }
        }
    }

    fn handle_render_event(&mut self, event: RenderEvent) {
        if event.generation() != self.generation {
            debug!(
                generation = event.generation(),
                current = self.generation,
                page = event.page(),
                "dropping stale render event"
            );
            return;
        }

        match event {
            RenderEvent::PageReady { page, image, .. } => {
                let surface = SurfaceSize { width: image.width(), height: image.height() };
                apply_session_action(&mut self.session, SessionAction::PageRendered { page, surface });
                self.surfaces.insert(page, image);

                let layout = self.layout();
                self.overlay.replay_page(self.session.store(), page, &layout);
            }
            RenderEvent::PageFailed { page, message, .. } => {
                self.notices.push(Notice::warning(format!("Failed to render page {page}: {message}")));
            }
        }
    }

    fn layout(&self) -> PageLayout {
        PageLayout::from_session(&self.session, self.dispatcher.policy())
    }

    fn report<V>(&mut self, result: Result<V, AppError>) -> Result<V, AppError> {
        if let Err(err) = &result {
            self.notices.push(Notice::error(err.to_string()));
        }
        result
    }
}
