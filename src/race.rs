use std::future::Future;
use std::pin::Pin;
use thiserror::Error;
use tokio::task::{JoinError, JoinSet};

/// One fallible way of producing a result, raced against its siblings.
pub type Strategy<T, E> = Pin<Box<dyn Future<Output = Result<T, E>> + Send + 'static>>;

#[derive(Debug, Error)]
pub enum RaceError<E: std::error::Error + 'static> {
    #[error("no strategies to race")]
    Empty,
    #[error(transparent)]
    Aborted(E),
    #[error("all {} strategies failed", .0.len())]
    Exhausted(Vec<E>),
    #[error("strategy task failed: {0}")]
    Join(#[from] JoinError),
}

impl<E: std::error::Error + 'static> RaceError<E> {
    /// The most relevant underlying error, if any strategy produced one.
    pub fn into_last(self) -> Option<E> {
        match self {
            RaceError::Aborted(err) => Some(err),
            RaceError::Exhausted(mut errors) => errors.pop(),
            RaceError::Empty | RaceError::Join(_) => None,
        }
    }
}

pub fn strategy<T, E, F>(future: F) -> Strategy<T, E>
where
    F: Future<Output = Result<T, E>> + Send + 'static,
{
    Box::pin(future)
}

/// Runs every strategy concurrently and returns the first success.
///
/// A failure for which `keep_waiting` returns true is remembered while the
/// remaining strategies keep running; any other failure ends the race. Tasks
/// still running when the race ends are dropped with the join set.
pub async fn first_acceptable<T, E, P>(
    strategies: Vec<Strategy<T, E>>,
    keep_waiting: P,
) -> Result<T, RaceError<E>>
where
    T: Send + 'static,
    E: std::error::Error + Send + 'static,
    P: Fn(&E) -> bool,
{
    if strategies.is_empty() {
        return Err(RaceError::Empty);
    }
    let mut join_set = JoinSet::new();
    for strategy in strategies {
        join_set.spawn(strategy);
    }
    let mut waited_on = Vec::new();
    while let Some(joined) = join_set.join_next().await {
        match joined? {
            Ok(value) => return Ok(value),
            Err(err) if keep_waiting(&err) => waited_on.push(err),
            Err(err) => return Err(RaceError::Aborted(err)),
        }
    }
    Err(RaceError::Exhausted(waited_on))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::MediaError;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;
    use tokio::time::sleep;

    fn not_found() -> MediaError {
        MediaError::NotFound {
            uri: "x".to_string(),
        }
    }

    #[tokio::test]
    async fn waits_past_not_found_for_slower_success() {
        let strategies: Vec<Strategy<&'static str, MediaError>> = vec![
            strategy(async { Err(not_found()) }),
            strategy(async {
                sleep(Duration::from_millis(20)).await;
                Ok("image/png")
            }),
        ];
        let result = first_acceptable(strategies, MediaError::is_not_found).await;
        assert_eq!(result.unwrap(), "image/png");
    }

    #[tokio::test]
    async fn aborts_on_non_waitable_error() {
        let strategies: Vec<Strategy<&'static str, MediaError>> = vec![
            strategy(async { Err(MediaError::transport("x", "reset")) }),
            strategy(async {
                sleep(Duration::from_secs(5)).await;
                Ok("late")
            }),
        ];
        let err = first_acceptable(strategies, MediaError::is_not_found)
            .await
            .unwrap_err();
        assert!(matches!(err, RaceError::Aborted(MediaError::Transport { .. })));
    }

    #[tokio::test]
    async fn exhausted_keeps_all_waitable_errors() {
        let strategies: Vec<Strategy<(), MediaError>> = vec![
            strategy(async { Err(not_found()) }),
            strategy(async {
                sleep(Duration::from_millis(5)).await;
                Err(not_found())
            }),
        ];
        let err = first_acceptable(strategies, MediaError::is_not_found)
            .await
            .unwrap_err();
        match err {
            RaceError::Exhausted(errors) => assert_eq!(errors.len(), 2),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn first_success_wins_and_loser_is_dropped() {
        let finished = Arc::new(AtomicBool::new(false));
        let flag = finished.clone();
        let strategies: Vec<Strategy<u32, MediaError>> = vec![
            strategy(async { Ok(1) }),
            strategy(async move {
                sleep(Duration::from_millis(200)).await;
                flag.store(true, Ordering::SeqCst);
                Ok(2)
            }),
        ];
        let value = first_acceptable(strategies, MediaError::is_not_found)
            .await
            .unwrap();
        assert_eq!(value, 1);
        sleep(Duration::from_millis(250)).await;
        assert!(!finished.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn empty_race_is_an_error() {
        let strategies: Vec<Strategy<u32, MediaError>> = Vec::new();
        let err = first_acceptable(strategies, MediaError::is_not_found)
            .await
            .unwrap_err();
        assert!(matches!(err, RaceError::Empty));
        assert!(err.into_last().is_none());
    }
}
