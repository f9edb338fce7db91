use pdf_engine::{DocumentHandle, PdfEngine, RenderRequest, RgbaImage};
use std::any::Any;
use std::num::NonZeroUsize;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, RwLock};
use std::thread;
use tracing::{debug, warn};

/// Worker count used when the platform cannot report its parallelism.
const FALLBACK_WORKERS: usize = 4;

/// Outcome of one page render task. Pages are numbered from 1.
#[derive(Debug)]
pub enum RenderEvent {
    PageReady { generation: u64, page: u32, image: RgbaImage },
    PageFailed { generation: u64, page: u32, message: String },
}

impl RenderEvent {
    pub fn generation(&self) -> u64 {
        match self {
            Self::PageReady { generation, .. } | Self::PageFailed { generation, .. } => *generation,
        }
    }

    pub fn page(&self) -> u32 {
        match self {
            Self::PageReady { page, .. } | Self::PageFailed { page, .. } => *page,
        }
    }
}

/// Number of render workers for the current machine.
pub fn default_worker_count() -> usize {
    thread::available_parallelism().map(NonZeroUsize::get).unwrap_or(FALLBACK_WORKERS)
}

/// Pages still waiting for a worker. Workers take the next page number until
/// the document is exhausted.
struct PageQueue {
    next: AtomicU32,
    page_count: u32,
}

impl PageQueue {
    fn new(page_count: u32) -> Self {
        Self { next: AtomicU32::new(1), page_count }
    }

    fn take(&self) -> Option<u32> {
        let page = self.next.fetch_add(1, Ordering::Relaxed);
        (page <= self.page_count).then_some(page)
    }
}

/// The render work for one document.
///
/// A fixed number of workers pull pages from a shared queue, so completion
/// order is unspecified. Every page reports exactly once, even when its
/// render panics. Tasks are not cancellable: dropping the pipeline only
/// stops listening, and results still in flight are discarded.
pub struct RenderPipeline {
    generation: u64,
    page_count: u32,
    received: u32,
    receiver: Receiver<RenderEvent>,
}

impl RenderPipeline {
    pub fn spawn<E>(
        engine: Arc<RwLock<E>>,
        handle: DocumentHandle,
        page_count: u32,
        scale: f32,
        generation: u64,
    ) -> Self
    where
        E: PdfEngine + Send + Sync + 'static,
    {
        Self::spawn_with_workers(
            engine,
            handle,
            page_count,
            scale,
            generation,
            default_worker_count(),
        )
    }

    /// Like [`RenderPipeline::spawn`] with an explicit worker count. Never
    /// starts more workers than there are pages.
    pub fn spawn_with_workers<E>(
        engine: Arc<RwLock<E>>,
        handle: DocumentHandle,
        page_count: u32,
        scale: f32,
        generation: u64,
        workers: usize,
    ) -> Self
    where
        E: PdfEngine + Send + Sync + 'static,
    {
        let (sender, receiver) = mpsc::channel();
        let queue = Arc::new(PageQueue::new(page_count));
        let workers = workers.max(1).min(page_count as usize);

        let mut started = 0;
        for id in 0..workers {
            let engine = Arc::clone(&engine);
            let queue = Arc::clone(&queue);
            let sender = sender.clone();

            let spawned = thread::Builder::new()
                .name(format!("render-worker-{id}"))
                .spawn(move || worker_loop(&engine, &queue, &sender, handle, scale, generation));

            match spawned {
                Ok(_) => started += 1,
                Err(err) => warn!(worker = id, %err, "failed to start render worker"),
            }
        }

        if started == 0 {
            while let Some(page) = queue.take() {
                let message = "no render worker could be started".to_owned();
                let _ = sender.send(RenderEvent::PageFailed { generation, page, message });
            }
        }

        debug!(generation, page_count, workers = started, "render workers started");

        Self { generation, page_count, received: 0, receiver }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn page_count(&self) -> u32 {
        self.page_count
    }

    /// True once every page has reported, successfully or not.
    pub fn is_finished(&self) -> bool {
        self.received >= self.page_count
    }

    /// Next finished page, if one is already waiting.
    pub fn try_next(&mut self) -> Option<RenderEvent> {
        let event = self.receiver.try_recv().ok()?;
        self.received += 1;
        Some(event)
    }

    /// Waits for the next page to finish. Returns `None` once all pages have
    /// reported.
    pub fn next_blocking(&mut self) -> Option<RenderEvent> {
        if self.is_finished() {
            return None;
        }

        let event = self.receiver.recv().ok()?;
        self.received += 1;
        Some(event)
    }
}

fn worker_loop<E: PdfEngine>(
    engine: &RwLock<E>,
    queue: &PageQueue,
    sender: &Sender<RenderEvent>,
    handle: DocumentHandle,
    scale: f32,
    generation: u64,
) {
    while let Some(page) = queue.take() {
        let event = panic::catch_unwind(AssertUnwindSafe(|| {
            render_one(engine, handle, page, scale, generation)
        }))
        .unwrap_or_else(|payload| {
            let message = format!("render task panicked: {}", panic_message(payload.as_ref()));
            warn!(generation, page, %message, "page render panicked");
            RenderEvent::PageFailed { generation, page, message }
        });

        // The receiver is gone once a newer document replaced this one.
        if sender.send(event).is_err() {
            debug!(generation, "render results no longer wanted");
            return;
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("unknown panic")
}

fn render_one<E: PdfEngine>(
    engine: &RwLock<E>,
    handle: DocumentHandle,
    page: u32,
    scale: f32,
    generation: u64,
) -> RenderEvent {
    let result = match engine.read() {
        Ok(engine) => engine
            .render_page(handle, RenderRequest { page_index: page - 1, scale })
            .map_err(|err| err.to_string()),
        Err(_) => Err("render engine lock poisoned".to_owned()),
    };

    match result {
        Ok(image) => {
            debug!(generation, page, width = image.width(), height = image.height(), "page ready");
            RenderEvent::PageReady { generation, page, image }
        }
        Err(message) => {
            warn!(generation, page, %message, "page render failed");
            RenderEvent::PageFailed { generation, page, message }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pdf_engine::fixtures::blank_pdf;
    use pdf_engine::{LopdfEngine, OpenSource, PageSize, PdfEngineError};
    use std::collections::BTreeSet;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    /// Renders pages in reverse speed order, fails the pages in `failing` and
    /// panics on the pages in `panicking`. Tracks how many renders overlap.
    #[derive(Default)]
    struct SlowEngine {
        page_count: u32,
        failing: Vec<u32>,
        panicking: Vec<u32>,
        active: AtomicUsize,
        peak: AtomicUsize,
    }

    impl SlowEngine {
        fn new(page_count: u32) -> Self {
            Self { page_count, ..Self::default() }
        }
    }

    impl PdfEngine for SlowEngine {
        fn open(&mut self, _source: OpenSource) -> Result<DocumentHandle, PdfEngineError> {
            Err(PdfEngineError::Backend("unused".to_owned()))
        }

        fn page_count(&self, _handle: DocumentHandle) -> Result<u32, PdfEngineError> {
            Ok(self.page_count)
        }

        fn page_size(
            &self,
            _handle: DocumentHandle,
            _page_index: u32,
        ) -> Result<PageSize, PdfEngineError> {
            Ok(PageSize::LETTER)
        }

        fn render_page(
            &self,
            _handle: DocumentHandle,
            request: RenderRequest,
        ) -> Result<RgbaImage, PdfEngineError> {
            let active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(active, Ordering::SeqCst);

            let delay = u64::from(self.page_count - request.page_index) * 5;
            thread::sleep(Duration::from_millis(delay));
            self.active.fetch_sub(1, Ordering::SeqCst);

            let page = request.page_index + 1;
            if self.panicking.contains(&page) {
                panic!("raster buffer overflow on page {page}");
            }
            if self.failing.contains(&page) {
                return Err(PdfEngineError::Backend("corrupt page".to_owned()));
            }

            Ok(RgbaImage::new(10, 20))
        }

        fn close(&mut self, _handle: DocumentHandle) -> Result<(), PdfEngineError> {
            Ok(())
        }
    }

    fn drain(pipeline: &mut RenderPipeline) -> Vec<RenderEvent> {
        let mut events = Vec::new();
        while let Some(event) = pipeline.next_blocking() {
            events.push(event);
        }
        events
    }

    #[test]
    fn every_page_reports_exactly_once() {
        let mut engine = LopdfEngine::new();
        let handle = engine
            .open(OpenSource::Bytes(blank_pdf(&[PageSize::LETTER; 3])))
            .expect("open should succeed");

        let mut pipeline =
            RenderPipeline::spawn(Arc::new(RwLock::new(engine)), handle, 3, 1.0, 7);
        let events = drain(&mut pipeline);

        let pages: BTreeSet<u32> = events.iter().map(RenderEvent::page).collect();
        assert_eq!(pages, BTreeSet::from([1, 2, 3]));
        assert!(events.iter().all(|event| event.generation() == 7));
        assert!(events.iter().all(|event| matches!(
            event,
            RenderEvent::PageReady { image, .. } if image.width() == 612 && image.height() == 792
        )));
        assert!(pipeline.is_finished());
        assert!(pipeline.next_blocking().is_none());
    }

    #[test]
    fn failures_are_reported_per_page() {
        let engine = SlowEngine { failing: vec![2], ..SlowEngine::new(3) };
        let handle = DocumentHandle::from_raw(1);

        let mut pipeline = RenderPipeline::spawn(Arc::new(RwLock::new(engine)), handle, 3, 1.0, 1);
        let events = drain(&mut pipeline);

        let failed: Vec<u32> = events
            .iter()
            .filter(|event| matches!(event, RenderEvent::PageFailed { .. }))
            .map(RenderEvent::page)
            .collect();
        assert_eq!(failed, vec![2]);
        assert_eq!(events.len(), 3);
    }

    #[test]
    fn empty_document_is_immediately_finished() {
        let engine = SlowEngine::new(0);
        let mut pipeline = RenderPipeline::spawn(
            Arc::new(RwLock::new(engine)),
            DocumentHandle::from_raw(1),
            0,
            1.0,
            1,
        );

        assert!(pipeline.is_finished());
        assert!(pipeline.try_next().is_none());
    }

    #[test]
    fn panicking_render_still_reports_the_page() {
        let engine = SlowEngine { panicking: vec![1], ..SlowEngine::new(3) };

        let mut pipeline = RenderPipeline::spawn_with_workers(
            Arc::new(RwLock::new(engine)),
            DocumentHandle::from_raw(1),
            3,
            1.0,
            4,
            2,
        );
        let events = drain(&mut pipeline);

        assert_eq!(events.len(), 3);
        assert!(pipeline.is_finished());
        let failure = events
            .iter()
            .find_map(|event| match event {
                RenderEvent::PageFailed { page: 1, message, .. } => Some(message.as_str()),
                _ => None,
            })
            .expect("page 1 should report a failure");
        assert_eq!(failure, "render task panicked: raster buffer overflow on page 1");
    }

    #[test]
    fn worker_count_bounds_concurrent_renders() {
        let engine = Arc::new(RwLock::new(SlowEngine::new(12)));

        let mut pipeline = RenderPipeline::spawn_with_workers(
            Arc::clone(&engine),
            DocumentHandle::from_raw(1),
            12,
            1.0,
            1,
            3,
        );
        let events = drain(&mut pipeline);

        let pages: BTreeSet<u32> = events.iter().map(RenderEvent::page).collect();
        assert_eq!(pages, (1..=12).collect::<BTreeSet<u32>>());
        let peak = engine.read().expect("lock").peak.load(Ordering::SeqCst);
        assert!((1..=3).contains(&peak), "peak concurrency was {peak}");
    }
}
