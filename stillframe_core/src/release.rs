// Copyright 2026 the Stillframe Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Move-only release obligations for GPU resources.
//!
//! Every texture handed out by the capture pipeline carries a
//! [`ScopedRelease`]. Whoever owns the texture owns the obligation: dropping
//! it runs the release callback exactly once with the latest [`SyncToken`],
//! which returns the resource to its allocator. Moves transfer the
//! obligation; there is no way to run it twice.

use alloc::boxed::Box;
use core::fmt;

use crate::gpu::SyncToken;

/// Returns a GPU resource to its owner.
///
/// Arguments are the sync token after which the resource is no longer used
/// and whether the resource was lost (its contents can't be trusted).
pub type ReleaseCallback = Box<dyn FnOnce(SyncToken, bool)>;

/// Exclusively owned, optional release callback that runs on drop.
#[derive(Default)]
pub struct ScopedRelease {
    callback: Option<ReleaseCallback>,
    sync_token: SyncToken,
}

impl fmt::Debug for ScopedRelease {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScopedRelease")
            .field("armed", &self.callback.is_some())
            .field("sync_token", &self.sync_token)
            .finish()
    }
}

impl ScopedRelease {
    /// Wraps `callback`, to be run with `sync_token` unless the token is
    /// updated first.
    #[must_use]
    pub fn new(callback: ReleaseCallback, sync_token: SyncToken) -> Self {
        Self {
            callback: Some(callback),
            sync_token,
        }
    }

    /// Wraps a closure.
    #[must_use]
    pub fn from_fn(callback: impl FnOnce(SyncToken, bool) + 'static, sync_token: SyncToken) -> Self {
        Self::new(Box::new(callback), sync_token)
    }

    /// An obligation with nothing to release.
    #[must_use]
    pub fn none() -> Self {
        Self::default()
    }

    /// Returns `true` if a callback is still pending.
    #[inline]
    #[must_use]
    pub fn is_armed(&self) -> bool {
        self.callback.is_some()
    }

    /// Token the callback will be run with.
    #[inline]
    #[must_use]
    pub fn sync_token(&self) -> SyncToken {
        self.sync_token
    }

    /// Records the latest use of the resource.
    pub fn update_sync_token(&mut self, sync_token: SyncToken) {
        self.sync_token = sync_token;
    }

    /// Runs the callback now with `sync_token`.
    pub fn release(mut self, sync_token: SyncToken, is_lost: bool) {
        if let Some(callback) = self.callback.take() {
            callback(sync_token, is_lost);
        }
    }

    /// Disarms this value and returns the callback, moving the obligation to
    /// the caller.
    #[must_use]
    pub fn into_callback(mut self) -> Option<ReleaseCallback> {
        self.callback.take()
    }
}

impl Drop for ScopedRelease {
    fn drop(&mut self) {
        if let Some(callback) = self.callback.take() {
            callback(self.sync_token, false);
        }
    }
}

#[cfg(test)]
mod tests {
    use alloc::rc::Rc;
    use alloc::vec::Vec;
    use core::cell::RefCell;

    use super::*;

    fn recording() -> (Rc<RefCell<Vec<(SyncToken, bool)>>>, ScopedRelease) {
        let calls = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&calls);
        let release = ScopedRelease::from_fn(
            move |token, lost| sink.borrow_mut().push((token, lost)),
            SyncToken::new(1, 1),
        );
        (calls, release)
    }

    #[test]
    fn drop_runs_callback_with_latest_token() {
        let (calls, mut release) = recording();
        release.update_sync_token(SyncToken::new(1, 5));
        drop(release);
        assert_eq!(*calls.borrow(), [(SyncToken::new(1, 5), false)]);
    }

    #[test]
    fn move_transfers_obligation() {
        let (calls, release) = recording();
        let moved = release;
        assert!(calls.borrow().is_empty());
        drop(moved);
        assert_eq!(calls.borrow().len(), 1);
    }

    #[test]
    fn explicit_release_runs_once() {
        let (calls, release) = recording();
        release.release(SyncToken::new(2, 9), true);
        assert_eq!(*calls.borrow(), [(SyncToken::new(2, 9), true)]);
    }

    #[test]
    fn into_callback_disarms() {
        let (calls, release) = recording();
        let callback = release.into_callback().expect("armed");
        assert!(calls.borrow().is_empty());
        callback(SyncToken::EMPTY, false);
        assert_eq!(calls.borrow().len(), 1);
    }

    #[test]
    fn none_is_not_armed() {
        let release = ScopedRelease::none();
        assert!(!release.is_armed());
        drop(release);
    }
}
