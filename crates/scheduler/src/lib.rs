//! Page render scheduling.
//!
//! Pages of a freshly opened document are rendered by a small pool of
//! workers pulling page numbers from a shared queue. Each page reports back
//! over a channel as it finishes, so pages become ready in whatever order
//! rendering completes. Each event carries the generation of
//! the document it was started for, letting the consumer drop results that
//! belong to a document which has since been replaced.
//!
//! # Example
//!
//! ```
//! use page_scheduler::{RenderEvent, RenderPipeline};
//! use pdf_engine::{default_engine, OpenSource, PdfEngine};
//! use std::sync::{Arc, RwLock};
//!
//! # fn demo(bytes: Vec<u8>) -> Result<(), pdf_engine::PdfEngineError> {
//! let mut engine = default_engine();
//! let handle = engine.open(OpenSource::Bytes(bytes))?;
//! let page_count = engine.page_count(handle)?;
//!
//! let mut pipeline =
//!     RenderPipeline::spawn(Arc::new(RwLock::new(engine)), handle, page_count, 1.5, 1);
//!
//! while let Some(event) = pipeline.next_blocking() {
//!     if let RenderEvent::PageReady { page, image, .. } = event {
//!         println!("page {page} is {}x{}", image.width(), image.height());
//!     }
//! }
//! # Ok(())
//! # }
//! ```

mod pipeline;

pub use pipeline::{default_worker_count, RenderEvent, RenderPipeline};
