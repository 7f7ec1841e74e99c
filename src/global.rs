//! Process-wide singleton arena.
//!
//! The core allocator is an explicit [`Arena`] value, but the classic
//! contract for this kind of heap is a single region per process that is
//! initialized exactly once and lives until exit. This module recovers that
//! contract: one hidden arena behind a [`Mutex`], free functions mirroring
//! the [`Arena`] methods, and [`InitError::AlreadyInitialized`] on any
//! second attempt to establish it.
//!
//! The lock only serializes access to the singleton, the allocator itself
//! remains single threaded by design.

use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::{Address, Arena, FreeError, InitError};

static ARENA: Mutex<Option<Arena>> = Mutex::new(None);

/// A poisoned lock just means some other thread panicked mid-operation;
/// the boundary tags themselves are either fully written or untouched, so
/// we keep going with whatever state is there.
fn lock() -> MutexGuard<'static, Option<Arena>> {
    ARENA.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Establishes the process-wide arena. Fails with
/// [`InitError::AlreadyInitialized`] if any previous call succeeded, no
/// matter the thread. See [`Arena::init`] for the other failure modes.
pub fn init(region_size: usize) -> Result<(), InitError> {
    let mut arena = lock();

    if arena.is_some() {
        return Err(InitError::AlreadyInitialized);
    }

    *arena = Some(Arena::init(region_size)?);

    Ok(())
}

/// [`Arena::alloc`] on the process-wide arena. `None` if the arena was
/// never initialized.
pub fn alloc(size: usize) -> Option<Address> {
    lock().as_mut()?.alloc(size)
}

/// [`Arena::free`] on the process-wide arena. An uninitialized arena
/// cannot have produced any token, so every token is invalid then.
pub fn free(address: Address) -> Result<(), FreeError> {
    match lock().as_mut() {
        Some(arena) => arena.free(address),
        None => Err(FreeError::InvalidPointer),
    }
}

/// [`Arena::coalesce`] on the process-wide arena. Does nothing before
/// initialization, there is no block list to scan yet.
pub fn coalesce() {
    if let Some(arena) = lock().as_mut() {
        arena.coalesce();
    }
}

/// Runs `f` with the process-wide arena held, for diagnostics such as
/// [`Arena::blocks`] or printing the heap table. `None` before
/// initialization.
pub fn with_arena<T>(f: impl FnOnce(&mut Arena) -> T) -> Option<T> {
    lock().as_mut().map(f)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// The singleton survives across tests in the same process, so the
    /// whole lifecycle lives in one test function.
    #[test]
    fn singleton_lifecycle() {
        assert_eq!(alloc(100), None);
        assert_eq!(free(Address::from_raw(8)), Err(FreeError::InvalidPointer));
        coalesce();

        init(4096).unwrap();
        assert_eq!(init(4096), Err(InitError::AlreadyInitialized));
        assert_eq!(init(1), Err(InitError::AlreadyInitialized));

        let address = alloc(100).unwrap();
        let capacity = with_arena(|arena| arena.capacity()).unwrap();
        assert_eq!(with_arena(|arena| arena.stats().used), Some(104));

        free(address).unwrap();
        assert_eq!(free(address), Err(FreeError::DoubleFree));

        coalesce();
        assert_eq!(with_arena(|arena| arena.blocks().count()), Some(1));
        assert_eq!(with_arena(|arena| arena.stats().free), Some(capacity));
    }
}
