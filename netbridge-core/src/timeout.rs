//! Optional deadlines for I/O futures.

use compio::time::timeout;
use std::future::Future;
use std::io;
use std::time::Duration;

/// Run `fut` under an optional deadline.
///
/// - `None`: no deadline
/// - `Some(d)`: `io::ErrorKind::TimedOut` once `d` elapses
///
/// `what` names the operation in the timeout error.
pub async fn deadline<F, T>(duration: Option<Duration>, what: &str, fut: F) -> io::Result<T>
where
    F: Future<Output = io::Result<T>>,
{
    match duration {
        None => fut.await,
        Some(d) => match timeout(d, fut).await {
            Ok(result) => result,
            Err(_elapsed) => Err(io::Error::new(
                io::ErrorKind::TimedOut,
                format!("{what} timed out after {d:?}"),
            )),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[compio::test]
    async fn test_no_deadline_passes_through() {
        let value = deadline(None, "noop", async { Ok::<_, io::Error>(5) }).await;
        assert_eq!(value.unwrap(), 5);
    }

    #[compio::test]
    async fn test_deadline_elapses() {
        let err = deadline(Some(Duration::from_millis(10)), "read", async {
            compio::time::sleep(Duration::from_secs(60)).await;
            Ok::<_, io::Error>(())
        })
        .await
        .unwrap_err();

        assert_eq!(err.kind(), io::ErrorKind::TimedOut);
        assert!(err.to_string().starts_with("read timed out"));
    }

    #[compio::test]
    async fn test_inner_error_kept() {
        let err = deadline(Some(Duration::from_secs(5)), "connect", async {
            Err::<(), _>(io::Error::from(io::ErrorKind::ConnectionRefused))
        })
        .await
        .unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::ConnectionRefused);
    }
}
