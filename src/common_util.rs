use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};

// A poisoned lock means a peer worker panicked; the data under these locks
// stays consistent (writers hold them only for full updates), so keep going
// instead of cascading the panic.
pub(crate) fn hold<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

pub(crate) fn block_on<'a, T>(
    condvar: &Condvar,
    guard: MutexGuard<'a, T>,
) -> MutexGuard<'a, T> {
    condvar.wait(guard).unwrap_or_else(PoisonError::into_inner)
}
