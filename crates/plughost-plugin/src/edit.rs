//! Edit tokens for text commands.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use plughost_core::ViewId;

use crate::types::{PluginError, PluginResult};

/// Proof that a text command is running against a view.
///
/// The token is shared with the runtime, which zeroes it when the command's
/// `run` returns. Any buffer mutation attempted with it afterwards fails
/// with [`PluginError::InvalidEdit`].
#[derive(Debug, Clone)]
pub struct Edit {
    view: ViewId,
    token: Arc<AtomicU64>,
}

impl Edit {
    pub(crate) fn new(view: ViewId, token: u64) -> Self {
        Self {
            view,
            token: Arc::new(AtomicU64::new(token)),
        }
    }

    /// The view this edit belongs to.
    pub fn view(&self) -> ViewId {
        self.view
    }

    /// Whether the owning command is still running.
    pub fn is_valid(&self) -> bool {
        self.token.load(Ordering::Acquire) != 0
    }

    /// The raw token, checked against the target view.
    pub fn token_for(&self, view: ViewId) -> PluginResult<u64> {
        let token = self.token.load(Ordering::Acquire);
        if token == 0 {
            return Err(PluginError::InvalidEdit);
        }
        if view != self.view {
            return Err(PluginError::WrongScope {
                expected: self.view,
                found: view,
            });
        }
        Ok(token)
    }

    pub(crate) fn expire(&self) {
        self.token.store(0, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expired_edit_is_invalid() {
        let view = ViewId::new(4);
        let edit = Edit::new(view, 17);
        let kept = edit.clone();

        assert_eq!(edit.token_for(view).unwrap(), 17);
        assert!(matches!(
            edit.token_for(ViewId::new(5)),
            Err(PluginError::WrongScope { .. })
        ));

        edit.expire();
        assert!(!kept.is_valid());
        assert!(matches!(kept.token_for(view), Err(PluginError::InvalidEdit)));
    }
}
