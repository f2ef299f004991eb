use std::future::Future;
use std::time::Instant;

use crate::error::ClientError;
use crate::progress::Progress;

/// Wall-clock milliseconds since `start`.
pub fn elapsed_ms(start: Instant) -> f64 {
    start.elapsed().as_secs_f64() * 1000.0
}

/// Awaits `op` and returns how long it took in milliseconds.
///
/// `start_msg` is reported before the clock starts and `end_msg` after it
/// stops, suffixed with the duration. Errors from `op` are returned as-is;
/// no timing is produced for a failed operation.
pub async fn measure<F, E>(
    progress: &dyn Progress,
    start_msg: Option<&str>,
    end_msg: Option<&str>,
    op: F,
) -> Result<f64, E>
where
    F: Future<Output = Result<(), E>>,
{
    if let Some(msg) = start_msg {
        progress.info(msg);
    }

    let start = Instant::now();
    op.await?;
    let ms = elapsed_ms(start);

    if let Some(msg) = end_msg {
        progress.info(&format!("{msg} Took {:.3}s", ms / 1000.0));
    }

    Ok(ms)
}

/// Runs a precondition such as "destroy if it exists".
///
/// Failures accepted by `tolerated` (for setup, [`ClientError::is_not_found`])
/// are swallowed and, when `on_failure` is given, reported as a warning.
/// Everything else is returned to the caller.
pub async fn attempt<F>(
    progress: &dyn Progress,
    tolerated: fn(&ClientError) -> bool,
    on_failure: Option<&str>,
    op: F,
) -> Result<(), ClientError>
where
    F: Future<Output = Result<(), ClientError>>,
{
    match op.await {
        Ok(()) => Ok(()),
        Err(err) if tolerated(&err) => {
            if let Some(msg) = on_failure {
                progress.warn(&format!("{msg} ({err})"));
            }
            Ok(())
        }
        Err(err) => Err(err),
    }
}

/// Runs a cleanup step that must never fail its caller. Any failure is
/// reported as a warning `"{on_failure} ({err})"`.
pub async fn best_effort<F>(progress: &dyn Progress, on_failure: &str, op: F)
where
    F: Future<Output = Result<(), ClientError>>,
{
    if let Err(err) = op.await {
        progress.warn(&format!("{on_failure} ({err})"));
    }
}
