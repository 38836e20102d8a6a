//! Bounded worker pool for fetch-and-decode jobs.
//!
//! Workers drain a bounded queue. When the queue is full the submitter runs
//! the job itself instead of queueing it, which bounds memory at the cost
//! of occasionally stalling the caller. Every job delivers exactly once,
//! through either its success or its error callback, even when the fetch
//! panics.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use parking_lot::Mutex;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use super::error::{FetchError, FetchFailure};
use super::fetcher::{FetchOutcome, ImageFetcher};
use crate::config::PoolConfig;
use crate::decode::DecodedImage;

/// What a [`Delivery::channel`] receiver yields.
pub type DeliveryResult = Result<(DecodedImage, bool), (FetchFailure, bool)>;

type DeliverFn = Box<dyn FnOnce(DeliveryResult) + Send>;

/// Where a job reports its single result. Consumed by value, so it runs at
/// most once.
pub struct Delivery {
    deliver: DeliverFn,
}

impl Delivery {
    /// `on_success(image, from_cache)` / `on_error(failure, is_video_or_audio)`.
    pub fn new<S, E>(on_success: S, on_error: E) -> Self
    where
        S: FnOnce(DecodedImage, bool) + Send + 'static,
        E: FnOnce(FetchFailure, bool) + Send + 'static,
    {
        Self {
            deliver: Box::new(move |result| match result {
                Ok((image, from_cache)) => on_success(image, from_cache),
                Err((failure, video)) => on_error(failure, video),
            }),
        }
    }

    /// A delivery that forwards its result into a oneshot channel.
    pub fn channel() -> (Self, oneshot::Receiver<DeliveryResult>) {
        let (tx, rx) = oneshot::channel();
        let delivery = Self {
            deliver: Box::new(move |result| {
                let _ = tx.send(result);
            }),
        };
        (delivery, rx)
    }

    fn deliver(self, result: Result<FetchOutcome, FetchFailure>) {
        let result = match result {
            Ok(outcome) => Ok((outcome.image, outcome.from_cache)),
            Err(failure) => {
                let video = failure.is_video_or_audio();
                Err((failure, video))
            }
        };
        (self.deliver)(result)
    }
}

struct FetchJob {
    input: String,
    delivery: Delivery,
}

pub struct FetchPool {
    fetcher: Arc<ImageFetcher>,
    sender: Mutex<Option<mpsc::Sender<FetchJob>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    worker_count: usize,
}

impl FetchPool {
    /// Spawn the workers. Must be called from within a tokio runtime.
    pub fn new(fetcher: Arc<ImageFetcher>, config: &PoolConfig) -> Self {
        let worker_count = config.worker_count();
        let (tx, rx) = mpsc::channel(config.queue_depth.max(1));
        let rx = Arc::new(tokio::sync::Mutex::new(rx));

        let workers = (0..worker_count)
            .map(|id| {
                let rx = Arc::clone(&rx);
                let fetcher = Arc::clone(&fetcher);
                tokio::spawn(worker_loop(id, rx, fetcher))
            })
            .collect();

        info!(
            workers = worker_count,
            queue_depth = config.queue_depth,
            "Fetch pool started"
        );

        Self {
            fetcher,
            sender: Mutex::new(Some(tx)),
            workers: Mutex::new(workers),
            worker_count,
        }
    }

    pub fn worker_count(&self) -> usize {
        self.worker_count
    }

    pub fn fetcher(&self) -> &Arc<ImageFetcher> {
        &self.fetcher
    }

    /// Queue a job. When the queue is full (or the pool is shut down) the
    /// job runs to completion on the calling task before this returns.
    pub async fn submit(&self, input: impl Into<String>, delivery: Delivery) {
        let job = FetchJob {
            input: input.into(),
            delivery,
        };

        let sender = self.sender.lock().clone();
        let job = match sender {
            Some(tx) => match tx.try_send(job) {
                Ok(()) => return,
                Err(TrySendError::Full(job)) => {
                    debug!(uri = %job.input, "Fetch queue full, running on submitter");
                    job
                }
                Err(TrySendError::Closed(job)) => job,
            },
            None => job,
        };

        run_job(&self.fetcher, job).await;
    }

    /// Submit and wait for the result.
    pub async fn fetch(&self, input: impl Into<String>) -> DeliveryResult {
        let input = input.into();
        let (delivery, rx) = Delivery::channel();
        self.submit(input.clone(), delivery).await;
        rx.await.unwrap_or_else(|_| {
            let failure = FetchFailure::new(input, FetchError::fatal("job dropped without result"));
            Err((failure, false))
        })
    }

    /// Stop accepting queued work and wait for workers to drain the queue.
    pub async fn shutdown(&self) {
        self.sender.lock().take();
        let workers = std::mem::take(&mut *self.workers.lock());
        for worker in workers {
            if let Err(e) = worker.await {
                error!(error = %e, "Fetch worker terminated abnormally");
            }
        }
        info!("Fetch pool stopped");
    }
}

async fn worker_loop(
    id: usize,
    rx: Arc<tokio::sync::Mutex<mpsc::Receiver<FetchJob>>>,
    fetcher: Arc<ImageFetcher>,
) {
    debug!(worker = id, "Fetch worker started");
    loop {
        let job = rx.lock().await.recv().await;
        let Some(job) = job else {
            break;
        };
        run_job(&fetcher, job).await;
    }
    debug!(worker = id, "Fetch worker exiting");
}

async fn run_job(fetcher: &ImageFetcher, job: FetchJob) {
    let FetchJob { input, delivery } = job;

    let result = match AssertUnwindSafe(fetcher.fetch(&input)).catch_unwind().await {
        Ok(result) => result,
        Err(panic) => {
            let message = panic_message(panic.as_ref());
            error!(uri = %input, panic = %message, "Fetch job panicked");
            Err(FetchFailure::new(
                input.clone(),
                FetchError::fatal(format!("fetch panicked: {message}")),
            ))
        }
    };

    if let Err(panic) = std::panic::catch_unwind(AssertUnwindSafe(|| delivery.deliver(result))) {
        error!(uri = %input, panic = %panic_message(panic.as_ref()), "Delivery callback panicked");
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decode::{DecodedImage, Frame};
    use image::{ImageFormat, RgbaImage};

    fn image() -> DecodedImage {
        DecodedImage {
            format: ImageFormat::Png,
            frames: vec![Frame::still(RgbaImage::new(1, 1))],
            decoder: "test",
        }
    }

    #[tokio::test]
    async fn channel_delivers_success() {
        let (delivery, rx) = Delivery::channel();
        delivery.deliver(Ok(FetchOutcome {
            image: image(),
            from_cache: true,
            resolved: url::Url::parse("https://example.com/a.png").unwrap(),
        }));

        let (image, from_cache) = rx.await.unwrap().unwrap();
        assert_eq!(image.frame_count(), 1);
        assert!(from_cache);
    }

    #[tokio::test]
    async fn channel_delivers_error_with_video_flag() {
        let (delivery, rx) = Delivery::channel();
        delivery.deliver(Err(FetchFailure::new(
            "water://local/a.mp4",
            FetchError::video_or_audio("file:///a.mp4", "mp4"),
        )));

        let (failure, video) = rx.await.unwrap().unwrap_err();
        assert!(video);
        assert_eq!(failure.uri, "water://local/a.mp4");
    }

    #[test]
    fn panic_messages() {
        let boxed: Box<dyn Any + Send> = Box::new("static str");
        assert_eq!(panic_message(boxed.as_ref()), "static str");
        let boxed: Box<dyn Any + Send> = Box::new(String::from("owned"));
        assert_eq!(panic_message(boxed.as_ref()), "owned");
        let boxed: Box<dyn Any + Send> = Box::new(42u8);
        assert_eq!(panic_message(boxed.as_ref()), "unknown panic");
    }
}
