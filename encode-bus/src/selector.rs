use std::time::Duration;

use crate::error::{RecorderError, Result};

pub type WorkerIndex = usize;

/// What the selector needs to know about a worker.
pub trait WorkLoad {
    fn is_busy(&self) -> bool;
    /// Time spent on the current frame; zero when idle.
    fn work_duration(&self) -> Duration;
}

/// Picks the worker for the next frame: the first idle one, otherwise the
/// one that has been busy the longest since it is likely to finish first.
pub fn select_worker<W: WorkLoad>(workers: &[W]) -> Result<WorkerIndex> {
    let mut best: Option<(WorkerIndex, Duration)> = None;
    for (index, worker) in workers.iter().enumerate() {
        if !worker.is_busy() {
            return Ok(index);
        }
        let duration = worker.work_duration();
        match best {
            Some((_, longest)) if duration < longest => {}
            _ => best = Some((index, duration)),
        }
    }
    best.map(|(index, _)| index)
        .ok_or(RecorderError::NoWorkersAvailable)
}
