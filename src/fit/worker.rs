//! Runs one fit on a dedicated thread.
//!
//! The caller keeps a `FitHandle`: it can read the shared `FitProgress` at any
//! time, poll for the result without blocking, or block until it arrives. The
//! worker owns `Arc`s to the data and the model, so swapping the session's data
//! set mid-fit does not affect the running fit.

use std::sync::Arc;
use std::sync::mpsc::{Receiver, RecvTimeoutError, TryRecvError, channel};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::domain::{DataSet, FitMethod, FitOptions, FitResult};
use crate::error::{LabFitError, Result};
use crate::expr::CompiledModel;
use crate::fit::progress::{FitProgress, ProgressSnapshot};
use crate::fit::run_fit;

/// Everything a worker needs, owned.
#[derive(Debug, Clone)]
pub struct FitRequest {
    pub method: FitMethod,
    pub data: Arc<DataSet>,
    pub model: Arc<CompiledModel>,
    pub initial: Vec<f64>,
    pub max_iter: usize,
    pub opts: FitOptions,
}

pub struct FitHandle {
    progress: Arc<FitProgress>,
    rx: Receiver<Result<FitResult>>,
    handle: Option<JoinHandle<()>>,
}

/// Start `request` on a new thread.
pub fn spawn_fit(request: FitRequest) -> Result<FitHandle> {
    let progress = Arc::new(FitProgress::new());
    let (tx, rx) = channel();
    let worker_progress = Arc::clone(&progress);

    let handle = thread::Builder::new()
        .name("labfit-fit".to_string())
        .spawn(move || {
            let data = &request.data;
            let result = run_fit(
                request.method,
                data.x(),
                data.y(),
                data.sigma_x(),
                data.sigma_y(),
                Some(request.model.as_ref()),
                &request.initial,
                request.max_iter,
                &request.opts,
                &worker_progress,
            );
            // The receiver may have been dropped; nothing left to report to.
            let _ = tx.send(result);
        })
        .map_err(|e| LabFitError::Internal(format!("failed to start fit thread: {e}")))?;

    Ok(FitHandle {
        progress,
        rx,
        handle: Some(handle),
    })
}

impl FitHandle {
    pub fn progress(&self) -> ProgressSnapshot {
        self.progress.snapshot()
    }

    pub fn is_finished(&self) -> bool {
        self.progress.is_done()
    }

    /// Non-blocking: `Some` once the worker has delivered its result.
    pub fn poll(&mut self) -> Option<Result<FitResult>> {
        match self.rx.try_recv() {
            Ok(result) => {
                self.reap();
                Some(result)
            }
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => Some(Err(self.panic_error())),
        }
    }

    /// Block until the result arrives.
    pub fn join(mut self) -> Result<FitResult> {
        match self.rx.recv() {
            Ok(result) => {
                self.reap();
                result
            }
            Err(_) => Err(self.panic_error()),
        }
    }

    /// Block, calling `on_progress` every `interval` until the worker is done.
    pub fn wait_with_progress<F>(mut self, interval: Duration, mut on_progress: F) -> Result<FitResult>
    where
        F: FnMut(ProgressSnapshot),
    {
        loop {
            match self.rx.recv_timeout(interval) {
                Ok(result) => {
                    on_progress(self.progress.snapshot());
                    self.reap();
                    return result;
                }
                Err(RecvTimeoutError::Timeout) => on_progress(self.progress.snapshot()),
                Err(RecvTimeoutError::Disconnected) => return Err(self.panic_error()),
            }
        }
    }

    fn reap(&mut self) {
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }

    fn panic_error(&mut self) -> LabFitError {
        self.progress.finish();
        let detail = match self.handle.take().map(JoinHandle::join) {
            Some(Err(payload)) => payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string()),
            _ => "worker exited without a result".to_string(),
        };
        LabFitError::Internal(format!("fit thread panicked: {detail}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ColumnFormat, RawTable};
    use crate::expr::compile_equation;
    use approx::assert_relative_eq;

    fn request(initial: Vec<f64>) -> FitRequest {
        let x: Vec<f64> = (1..=6).map(f64::from).collect();
        let y: Vec<f64> = x.iter().map(|v| 3.0 * v).collect();
        let n = x.len();
        let data = DataSet::new(x, vec![0.0; n], y, vec![0.1; n], ColumnFormat::XYSigmaY, RawTable::default()).unwrap();
        FitRequest {
            method: FitMethod::LeastSquares,
            data: Arc::new(data),
            model: Arc::new(compile_equation("k*x").unwrap()),
            initial,
            max_iter: 100,
            opts: FitOptions::default(),
        }
    }

    #[test]
    fn worker_delivers_result_and_marks_progress_done() {
        let handle = spawn_fit(request(vec![1.0])).unwrap();
        let mut seen = Vec::new();
        let result = handle
            .wait_with_progress(Duration::from_millis(1), |snap| seen.push(snap))
            .unwrap();
        assert_relative_eq!(result.parameter_values[0], 3.0, epsilon = 1e-9);
        assert!(seen.last().is_some_and(|s| s.done));
    }

    #[test]
    fn worker_errors_are_returned_not_panicked() {
        let handle = spawn_fit(request(vec![1.0, 2.0])).unwrap();
        let err = handle.join().unwrap_err();
        assert!(matches!(err, LabFitError::Validation(_)));
    }

    #[test]
    fn poll_eventually_yields() {
        let mut handle = spawn_fit(request(vec![0.5])).unwrap();
        let result = loop {
            if let Some(r) = handle.poll() {
                break r;
            }
            thread::sleep(Duration::from_millis(1));
        };
        assert!(result.is_ok());
        assert!(handle.is_finished());
    }
}
