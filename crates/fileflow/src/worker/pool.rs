use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::{unbounded, Receiver, Sender};
use log::{debug, error, info};

use crate::error::{panic_message, WorkerError};
use crate::pipeline::ChainRunner;
use crate::result::{StepResult, CANCELLED_REASON};
use crate::worker::job::Job;

/// Fixed set of threads pulling jobs from a shared queue.
///
/// The queue is unbounded so the whole plan can be submitted up front;
/// closing it with [`WorkerPool::close`] lets workers exit once it drains.
pub struct WorkerPool {
    job_sender: Option<Sender<Job>>,
    result_receiver: Receiver<StepResult>,
    workers: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    pub fn new(runner: Arc<ChainRunner>, worker_count: usize) -> Result<Self, WorkerError> {
        let worker_count = worker_count.max(1);
        let (job_sender, job_receiver) = unbounded::<Job>();
        let (result_sender, result_receiver) = unbounded::<StepResult>();

        let mut workers = Vec::with_capacity(worker_count);

        for worker_id in 0..worker_count {
            let job_rx = job_receiver.clone();
            let result_tx = result_sender.clone();
            let worker_runner = Arc::clone(&runner);

            let handle = thread::Builder::new()
                .name(format!("fileflow-worker-{}", worker_id))
                .spawn(move || run_worker(worker_id, job_rx, result_tx, worker_runner))
                .map_err(|e| WorkerError::SpawnFailed(e.to_string()))?;

            workers.push(handle);
        }

        info!("Started {} workers", worker_count);

        Ok(Self {
            job_sender: Some(job_sender),
            result_receiver,
            workers,
        })
    }

    pub fn submit(&self, job: Job) -> Result<(), WorkerError> {
        self.job_sender
            .as_ref()
            .ok_or(WorkerError::ChannelClosed)?
            .send(job)
            .map_err(|_| WorkerError::ChannelClosed)
    }

    /// No more jobs will be submitted.
    pub fn close(&mut self) {
        self.job_sender = None;
    }

    /// Next finished result. `None` once the queue is closed, every worker
    /// has exited and all results were received.
    pub fn recv_result(&self) -> Option<StepResult> {
        self.result_receiver.recv().ok()
    }

    pub fn wait(mut self) {
        self.close();

        for (i, worker) in self.workers.into_iter().enumerate() {
            if let Err(e) = worker.join() {
                error!("Worker {} panicked: {}", i, panic_message(e.as_ref()));
            } else {
                debug!("Worker {} finished", i);
            }
        }

        info!("All workers have stopped");
    }
}

fn run_worker(
    worker_id: usize,
    job_receiver: Receiver<Job>,
    result_sender: Sender<StepResult>,
    runner: Arc<ChainRunner>,
) {
    debug!("Worker {} started", worker_id);

    for job in job_receiver.iter() {
        let result = if runner.cancel_token().is_cancelled() {
            StepResult::skipped(job.input_path(), CANCELLED_REASON)
                .with_input_bytes(job.operation.input_bytes)
        } else {
            debug!("Worker {} processing job: {:?}", worker_id, job);
            panic::catch_unwind(AssertUnwindSafe(|| runner.run(&job))).unwrap_or_else(|payload| {
                StepResult::failed(job.input_path(), "panicked while processing")
                    .with_detail(panic_message(payload.as_ref()))
            })
        };

        if let Err(e) = result_sender.send(result) {
            error!("Worker {} failed to send result: {}", worker_id, e);
            break;
        }
    }

    debug!("Worker {} stopped", worker_id);
}
