//! Completion results, including ones that arrive after the query returned.
//!
//! Every source of a query is turned into a [`CompletionList`]. The
//! dispatcher points all of them at one [`CompletionJoin`], which merges
//! results in arrival order and reports to the host exactly once, when the
//! last source has delivered.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use futures::FutureExt;
use parking_lot::Mutex;
use plughost_core::{normalize_completion, AutoCompleteFlags, CompletionItem, CompletionValue, ViewId};
use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;

use crate::host::Host;
use crate::types::{PluginError, PluginResult};

/// The merged answer to one completion query.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct CompletionResponse {
    pub items: Vec<CompletionItem>,
    pub flags: AutoCompleteFlags,
}

#[derive(Default)]
struct ListState {
    completions: Option<(Vec<CompletionValue>, AutoCompleteFlags)>,
    target: Option<Arc<CompletionJoin>>,
}

/// A completion result that can be set once, possibly later.
///
/// Return it from a `query_completions` handler and call
/// [`CompletionList::set_completions`] whenever the items are ready.
#[derive(Clone, Default)]
pub struct CompletionList {
    state: Arc<Mutex<ListState>>,
}

impl CompletionList {
    /// A pending list.
    pub fn new() -> Self {
        Self::default()
    }

    /// A list that is already complete.
    pub fn ready(items: Vec<CompletionValue>, flags: AutoCompleteFlags) -> Self {
        let list = Self::new();
        list.state.lock().completions = Some((items, flags));
        list
    }

    /// Complete the list. Fails if it was already completed.
    pub fn set_completions(&self, items: Vec<CompletionValue>, flags: AutoCompleteFlags) -> PluginResult<()> {
        let target = {
            let mut state = self.state.lock();
            if state.completions.is_some() {
                return Err(PluginError::CompletionsAlreadySet);
            }
            state.completions = Some((items.clone(), flags));
            state.target.clone()
        };
        if let Some(target) = target {
            target.deliver(items, flags);
        }
        Ok(())
    }

    pub fn is_ready(&self) -> bool {
        self.state.lock().completions.is_some()
    }

    pub(crate) fn set_target(&self, target: Arc<CompletionJoin>) {
        let ready = {
            let mut state = self.state.lock();
            state.target = Some(Arc::clone(&target));
            state.completions.clone()
        };
        if let Some((items, flags)) = ready {
            target.deliver(items, flags);
        }
    }
}

impl fmt::Debug for CompletionList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompletionList").field("ready", &self.is_ready()).finish()
    }
}

struct JoinState {
    remaining: usize,
    response: CompletionResponse,
    done: Option<oneshot::Sender<CompletionResponse>>,
}

/// Fan-in point for all sources of one query.
pub(crate) struct CompletionJoin {
    view: ViewId,
    request: u64,
    host: Arc<dyn Host>,
    state: Mutex<JoinState>,
}

impl CompletionJoin {
    pub(crate) fn new(sources: usize, view: ViewId, id: u64, host: Arc<dyn Host>) -> (Arc<Self>, CompletionRequest) {
        let (tx, rx) = oneshot::channel();
        let join = Arc::new(Self {
            view,
            request: id,
            host,
            state: Mutex::new(JoinState {
                remaining: sources,
                response: CompletionResponse::default(),
                done: Some(tx),
            }),
        });
        let request = CompletionRequest {
            view,
            id,
            receiver: rx,
        };
        (join, request)
    }

    fn deliver(&self, items: Vec<CompletionValue>, flags: AutoCompleteFlags) {
        let finished = {
            let mut state = self.state.lock();
            if state.remaining == 0 {
                return;
            }
            state.response.items.extend(items.into_iter().map(normalize_completion));
            state.response.flags |= flags;
            state.remaining -= 1;
            if state.remaining == 0 {
                Some((state.response.clone(), state.done.take()))
            } else {
                None
            }
        };

        if let Some((response, done)) = finished {
            tracing::debug!(
                target: "plughost::dispatch",
                "Completions for {} (request {}): {} items",
                self.view,
                self.request,
                response.items.len()
            );
            self.host.set_completions(self.view, self.request, response.clone());
            if let Some(done) = done {
                // The caller may have dropped its request handle.
                let _ = done.send(response);
            }
        }
    }
}

/// Handle for an in-flight completion query.
#[derive(Debug)]
pub struct CompletionRequest {
    view: ViewId,
    id: u64,
    receiver: oneshot::Receiver<CompletionResponse>,
}

impl CompletionRequest {
    pub fn view(&self) -> ViewId {
        self.view
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    /// The merged response, if every source has reported.
    pub fn try_response(&mut self) -> Option<CompletionResponse> {
        self.receiver.try_recv().ok()
    }

    /// Wait for every source to report. `None` if the query can no longer
    /// complete because all pending lists were dropped.
    pub fn wait(self) -> impl Future<Output = Option<CompletionResponse>> + Send {
        self.receiver.map(Result::ok)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::HeadlessHost;

    #[test]
    fn test_list_is_set_once() {
        let list = CompletionList::new();
        assert!(!list.is_ready());
        list.set_completions(vec!["a".into()], AutoCompleteFlags::NONE).unwrap();
        assert!(list.is_ready());
        assert!(matches!(
            list.set_completions(vec![], AutoCompleteFlags::NONE),
            Err(PluginError::CompletionsAlreadySet)
        ));
    }

    #[test]
    fn test_join_waits_for_all_sources() {
        let host = Arc::new(HeadlessHost::new());
        let view = ViewId::new(1);
        let (join, mut request) = CompletionJoin::new(2, view, 7, host.clone());

        let ready = CompletionList::ready(vec!["one".into()], AutoCompleteFlags::INHIBIT_WORD_COMPLETIONS);
        let pending = CompletionList::new();
        ready.set_target(Arc::clone(&join));
        pending.set_target(Arc::clone(&join));

        assert!(request.try_response().is_none());
        assert!(host.completions().is_empty());

        pending
            .set_completions(vec!["two".into()], AutoCompleteFlags::DYNAMIC_COMPLETIONS)
            .unwrap();

        let response = request.try_response().unwrap();
        let triggers: Vec<_> = response.items.iter().map(|i| i.trigger.as_str()).collect();
        assert_eq!(triggers, vec!["one", "two"]);
        assert!(response.flags.contains(AutoCompleteFlags::INHIBIT_WORD_COMPLETIONS));
        assert!(response.flags.contains(AutoCompleteFlags::DYNAMIC_COMPLETIONS));
        assert_eq!(host.completions().len(), 1);
        assert_eq!(host.completions()[0].1, 7);
    }

    #[test]
    fn test_dropped_list_ends_wait() {
        let host = Arc::new(HeadlessHost::new());
        let (join, request) = CompletionJoin::new(1, ViewId::new(1), 1, host.clone());
        let pending = CompletionList::new();
        pending.set_target(join);
        drop(pending);

        assert_eq!(futures::executor::block_on(request.wait()), None);
        assert!(host.completions().is_empty());
    }
}
