//! Bounded-concurrency fan-out.
//!
//! `run_bounded` is a plain function: the concurrency limit is an argument
//! and every call builds its own stream, so separate requests never share a
//! pool. A worker that returns `Err` or panics only affects its own item.

use futures::stream::{self, StreamExt};
use futures::FutureExt;
use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;

use crate::error::WatermarkError;

#[derive(Debug)]
struct ItemOutcome<T> {
    item: T,
    result: Result<(), WatermarkError>,
}

/// Outcomes of a batch run, in completion order
#[derive(Debug)]
pub struct BatchReport<T> {
    outcomes: Vec<ItemOutcome<T>>,
}

impl<T> BatchReport<T> {
    pub fn len(&self) -> usize {
        self.outcomes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }

    pub fn succeeded(&self) -> usize {
        self.outcomes.iter().filter(|o| o.result.is_ok()).count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes.len() - self.succeeded()
    }

    pub fn failures(&self) -> impl Iterator<Item = (&T, &WatermarkError)> {
        self.outcomes
            .iter()
            .filter_map(|o| o.result.as_ref().err().map(|e| (&o.item, e)))
    }
}

/// Run `worker` over `items` with at most `limit` futures in flight.
///
/// Every item is processed regardless of how its siblings end. A `limit` of
/// zero is treated as one.
pub async fn run_bounded<I, T, F, Fut>(items: I, limit: usize, worker: F) -> BatchReport<T>
where
    I: IntoIterator<Item = T>,
    T: Clone,
    F: Fn(T) -> Fut,
    Fut: Future<Output = Result<(), WatermarkError>>,
{
    let outcomes = stream::iter(items)
        .map(|item| {
            let task = worker(item.clone());
            async move {
                let result = match AssertUnwindSafe(task).catch_unwind().await {
                    Ok(result) => result,
                    Err(panic) => Err(WatermarkError::Internal(format!(
                        "worker panicked: {}",
                        panic_message(panic.as_ref())
                    ))),
                };
                ItemOutcome { item, result }
            }
        })
        .buffer_unordered(limit.max(1))
        .collect::<Vec<_>>()
        .await;

    BatchReport { outcomes }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
