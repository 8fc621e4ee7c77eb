//! Serialized access to one engine from many threads.

use std::{
    sync::{
        Arc, Mutex, PoisonError,
        mpsc::{self, Receiver, RecvTimeoutError, Sender},
    },
    thread::{self, JoinHandle},
    time::Duration,
};

use image::DynamicImage;
use log::{debug, warn};

use crate::{
    engine::InferenceEngine,
    error::EngineError,
    model::TractBackend,
    postprocess::ClassificationResult,
    runtime::Backend,
};

/// An engine behind a mutex, for callers that prefer locking over a worker thread.
pub type SharedEngine<B = TractBackend> = Arc<Mutex<InferenceEngine<B>>>;

pub fn shared_engine<B: Backend>(engine: InferenceEngine<B>) -> SharedEngine<B> {
    Arc::new(Mutex::new(engine))
}

/// Classify through a [`SharedEngine`], recovering the engine if a previous holder panicked.
pub fn classify_shared<B: Backend>(
    engine: &SharedEngine<B>,
    image: &DynamicImage,
) -> ClassificationResult {
    let mut guard = engine.lock().unwrap_or_else(PoisonError::into_inner);
    guard.classify(image)
}

struct Job {
    image: DynamicImage,
    reply: Sender<ClassificationResult>,
}

/// Runs one engine on a dedicated thread and answers requests in submission order.
///
/// Dropping the worker finishes queued requests, disposes the engine, and joins the thread.
pub struct ClassificationWorker {
    jobs: Option<Sender<Job>>,
    handle: Option<JoinHandle<()>>,
}

impl ClassificationWorker {
    pub fn spawn<B: Backend + 'static>(engine: InferenceEngine<B>) -> std::io::Result<Self> {
        let (jobs, queue) = mpsc::channel::<Job>();
        let handle = thread::Builder::new()
            .name("scrawl-classifier".to_string())
            .spawn(move || serve(engine, queue))?;
        Ok(Self {
            jobs: Some(jobs),
            handle: Some(handle),
        })
    }

    /// Queue `image` for classification.
    pub fn submit(&self, image: DynamicImage) -> PendingClassification {
        let (reply, result) = mpsc::channel();
        let sent = self
            .jobs
            .as_ref()
            .is_some_and(|jobs| jobs.send(Job { image, reply }).is_ok());
        if !sent {
            warn!("classification worker is not running; request dropped");
        }
        PendingClassification { result }
    }

    /// Submit and block for the answer.
    pub fn classify(&self, image: DynamicImage) -> ClassificationResult {
        self.submit(image).wait()
    }
}

impl Drop for ClassificationWorker {
    fn drop(&mut self) {
        drop(self.jobs.take());
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                warn!("classification worker thread panicked");
            }
        }
    }
}

fn serve<B: Backend>(mut engine: InferenceEngine<B>, queue: Receiver<Job>) {
    debug!("classification worker started");
    for job in queue {
        let result = engine.classify(&job.image);
        // The caller may have stopped waiting.
        let _ = job.reply.send(result);
    }
    engine.dispose();
    debug!("classification worker stopped");
}

/// Handle to a queued classification.
#[derive(Debug)]
pub struct PendingClassification {
    result: Receiver<ClassificationResult>,
}

impl PendingClassification {
    /// Block until the worker answers.
    pub fn wait(self) -> ClassificationResult {
        self.result
            .recv()
            .unwrap_or_else(|_| ClassificationResult::failure(&worker_gone()))
    }

    /// Block for at most `timeout`. `None` means the deadline passed; the request still
    /// runs to completion on the worker and its result is discarded.
    pub fn wait_timeout(self, timeout: Duration) -> Option<ClassificationResult> {
        match self.result.recv_timeout(timeout) {
            Ok(result) => Some(result),
            Err(RecvTimeoutError::Timeout) => None,
            Err(RecvTimeoutError::Disconnected) => {
                Some(ClassificationResult::failure(&worker_gone()))
            }
        }
    }
}

fn worker_gone() -> EngineError {
    EngineError::runtime("classification worker stopped before answering")
}
