use core::future::Future;
use futures::stream::{FuturesUnordered, StreamExt};
use glyphstrip_core::{CharacterRequest, DispatchResult, Error, Result};

/// Dispatches every request concurrently and collects the results by
/// position.
///
/// All dispatches are started at once and awaited as a single barrier:
/// nothing is returned until every one has completed. Completion order is
/// arbitrary, so each result is written into the slot named by its position
/// and the slots are returned in order, one per request.
///
/// There is no limit on fan-out width: a request with `n` characters has `n`
/// dispatches in flight. Callers bound `n` up front.
///
/// # Errors
///
/// [`Error::Internal`] if the request positions are not a permutation of
/// `0..n`, or if a dispatch reports a position it was not given. Dispatches
/// themselves cannot fail.
pub async fn aggregate<F, Fut>(requests: Vec<CharacterRequest>, dispatch: F) -> Result<Vec<DispatchResult>>
where
    F: Fn(CharacterRequest) -> Fut,
    Fut: Future<Output = DispatchResult>,
{
    let len = requests.len();
    let mut slots: Vec<Option<DispatchResult>> = (0..len).map(|_| None).collect();

    let mut seen = vec![false; len];
    for request in &requests {
        match seen.get_mut(request.position()) {
            Some(taken @ false) => *taken = true,
            _ => {
                return Err(Error::Internal {
                    context: format!(
                        "position {} is out of range or repeated for {len} characters",
                        request.position()
                    ),
                });
            }
        }
    }

    let mut inflight: FuturesUnordered<Fut> = requests.into_iter().map(dispatch).collect();
    while let Some(result) = inflight.next().await {
        let position = result.position;
        match slots.get_mut(position) {
            Some(slot @ None) => *slot = Some(result),
            _ => {
                return Err(Error::Internal {
                    context: format!("dispatch reported unexpected position {position}"),
                });
            }
        }
    }

    slots
        .into_iter()
        .enumerate()
        .map(|(position, slot)| {
            slot.ok_or_else(|| Error::Internal {
                context: format!("no result for position {position}"),
            })
        })
        .collect()
}
