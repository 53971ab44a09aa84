//! Apply-then-confirm-or-revert mutations against the session store.

use crate::store::SessionStore;
use parking_lot::Mutex;
use std::future::Future;

/// Run an optimistic mutation.
///
/// `write` installs a value into the store. It is called once with `next`
/// before `confirm` is awaited, so the change is visible immediately, and
/// once more with the captured `prior` value if confirmation fails.
/// Reverting to the captured value rather than toggling back keeps a
/// failed mutation from landing on a third state when the field is not
/// strictly two-valued.
pub async fn apply<T, W, Fut, E>(
    store: &Mutex<SessionStore>,
    prior: T,
    next: T,
    write: W,
    confirm: Fut,
) -> std::result::Result<(), E>
where
    T: Clone,
    W: Fn(&mut SessionStore, T),
    Fut: Future<Output = std::result::Result<(), E>>,
{
    write(&mut store.lock(), next);
    match confirm.await {
        Ok(()) => Ok(()),
        Err(e) => {
            write(&mut store.lock(), prior);
            Err(e)
        }
    }
}
