use std::future::Future;
use std::sync::LazyLock;
use std::time::Duration;

use tokio::runtime::{Builder, Handle, Runtime};

use crate::logger::{sdk_debug, sdk_warn};

static BACKGROUND_RUNTIME: LazyLock<Option<Runtime>> = LazyLock::new(|| {
    match Builder::new_multi_thread()
        .worker_threads(1)
        .thread_name("moments-sdk-background")
        .enable_all()
        .build()
    {
        Ok(runtime) => Some(runtime),
        Err(err) => {
            sdk_warn!("background runtime unavailable, deferred work is disabled: {err}");
            None
        }
    }
});

/// Spawns an async task that runs in the background.
///
/// The task lands on the caller's tokio runtime when there is one. Hosts that never run
/// tokio get a shared single-worker runtime that drives the task on its own thread, so
/// the caller never has to poll anything. If that runtime could not be built the task
/// is dropped.
pub fn spawn_detached<F>(future: F)
where
    F: Future<Output = ()> + Send + 'static,
{
    if let Ok(handle) = Handle::try_current() {
        handle.spawn(future);
    } else {
        spawn_background(BACKGROUND_RUNTIME.as_ref(), future);
    }
}

fn spawn_background<F>(runtime: Option<&Runtime>, future: F)
where
    F: Future<Output = ()> + Send + 'static,
{
    match runtime {
        Some(runtime) => {
            let _ = runtime.spawn(future);
        }
        None => sdk_debug!("no background runtime; dropping detached task"),
    }
}

/// Asynchronously waits for the provided duration.
pub async fn sleep(duration: Duration) {
    if duration.is_zero() {
        return;
    }

    tokio::time::sleep(duration).await;
}
