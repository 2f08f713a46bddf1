use std::future::Future;

/// Awaits `fut` if there is one, otherwise never resolves. Lets an optional timer or oneshot sit
/// in a `tokio::select!` branch without a precondition.
pub async fn dynamic_fut<F: Future>(fut: Option<F>) -> F::Output {
    match fut {
        Some(fut) => fut.await,
        None => std::future::pending().await,
    }
}
