//! Connection timing for the HTTP prober.
//!
//! Installed as a reqwest connector layer, so the measured duration covers
//! name resolution, the TCP connect and the TLS handshake of the connection
//! that actually carries the request.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tower::{Layer, Service};

/// Records how long the most recent successful connection took to establish
#[derive(Debug, Clone, Default)]
pub(crate) struct ConnectTimer {
    elapsed: Arc<Mutex<Option<Duration>>>,
}

impl ConnectTimer {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn elapsed(&self) -> Option<Duration> {
        *self.elapsed.lock()
    }
}

impl<S> Layer<S> for ConnectTimer {
    type Service = TimedConnect<S>;

    fn layer(&self, inner: S) -> Self::Service {
        TimedConnect { inner, timer: self.clone() }
    }
}

/// Connector wrapped by [`ConnectTimer`]
#[derive(Debug, Clone)]
pub(crate) struct TimedConnect<S> {
    inner: S,
    timer: ConnectTimer,
}

impl<S, R> Service<R> for TimedConnect<S>
where
    S: Service<R>,
    S::Future: Send + 'static,
    S::Response: Send + 'static,
    S::Error: Send + 'static,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = Pin<Box<dyn Future<Output = Result<S::Response, S::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, request: R) -> Self::Future {
        let started = Instant::now();
        let slot = Arc::clone(&self.timer.elapsed);
        let connecting = self.inner.call(request);

        Box::pin(async move {
            let connection = connecting.await?;
            *slot.lock() = Some(started.elapsed());
            Ok(connection)
        })
    }
}

#[cfg(test)]
mod tests {
    use std::convert::Infallible;

    use tower::{ServiceExt, service_fn};

    use super::*;

    #[tokio::test]
    async fn test_records_successful_connection() {
        let timer = ConnectTimer::new();
        let connector = timer.layer(service_fn(|port: u16| async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            Ok::<_, Infallible>(port)
        }));

        assert!(timer.elapsed().is_none());
        assert_eq!(connector.oneshot(443).await.unwrap(), 443);
        assert!(timer.elapsed().unwrap() >= Duration::from_millis(20));
    }

    #[tokio::test]
    async fn test_failed_connection_is_not_recorded() {
        let timer = ConnectTimer::new();
        let connector = timer.layer(service_fn(|_: u16| async { Err::<u16, _>("refused") }));

        assert_eq!(connector.oneshot(443).await.unwrap_err(), "refused");
        assert!(timer.elapsed().is_none());
    }
}
