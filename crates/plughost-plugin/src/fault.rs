//! Fault isolation and profiling for extension callbacks.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::{Duration, Instant};

use indexmap::IndexMap;
use itertools::Itertools;
use parking_lot::Mutex;
use plughost_core::{ExtResult, ExtensionError};

use crate::console::Console;
use crate::hooks::EventKind;
use crate::types::{PluginError, ProfileEntry};

/// How a callback is wrapped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Guard {
    /// Blocking half: trapped and timed.
    TimedFaultIsolated,
    /// Non-blocking half and lifecycle hooks: trapped only.
    FaultIsolated,
}

impl Guard {
    /// The wrapper for a callback implementing `kind`.
    pub fn for_kind(kind: EventKind) -> Self {
        if kind.is_async() {
            Self::FaultIsolated
        } else {
            Self::TimedFaultIsolated
        }
    }
}

/// Where a wrapped call happens, for tracebacks and profiling.
#[derive(Debug, Clone, Copy)]
pub struct CallSite<'a> {
    /// Runtime entry point that triggered the call.
    pub entry: &'a str,
    /// Extension method being called.
    pub method: &'a str,
    pub module: &'a str,
    pub class: &'a str,
}

impl<'a> CallSite<'a> {
    /// A module-level hook such as `plugin_loaded`.
    pub fn module_hook(entry: &'a str, module: &'a str, method: &'a str) -> Self {
        Self {
            entry,
            method,
            module,
            class: "",
        }
    }

    fn callee(&self) -> String {
        if self.class.is_empty() {
            format!("{}.{}", self.module, self.method)
        } else {
            format!("{}.{}.{}", self.module, self.class, self.method)
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct Summary {
    count: u64,
    sum: Duration,
    max: Duration,
}

impl Summary {
    fn record(&mut self, elapsed: Duration) {
        self.count += 1;
        self.sum += elapsed;
        self.max = self.max.max(elapsed);
    }
}

/// Running timing summaries keyed by (event, module).
#[derive(Debug, Default)]
pub struct Profiler {
    data: Mutex<IndexMap<String, IndexMap<String, Summary>>>,
}

impl Profiler {
    pub fn record(&self, event: &str, module: &str, elapsed: Duration) {
        let mut data = self.data.lock();
        data.entry(event.to_string())
            .or_default()
            .entry(module.to_string())
            .or_default()
            .record(elapsed);
    }

    /// `(event, module, summary)` triples, grouped by event.
    pub fn entries(&self) -> Vec<(String, String, ProfileEntry)> {
        let data = self.data.lock();
        data.iter()
            .flat_map(|(event, modules)| {
                modules.iter().map(move |(module, s)| {
                    (
                        event.clone(),
                        module.clone(),
                        ProfileEntry {
                            count: s.count,
                            max: s.max.as_secs_f64(),
                            sum: s.sum.as_secs_f64(),
                        },
                    )
                })
            })
            .collect()
    }

    pub fn clear(&self) {
        self.data.lock().clear();
    }
}

/// Runs extension code so that faults never reach the dispatcher.
#[derive(Debug, Clone)]
pub struct FaultWrapper {
    console: Console,
    profiler: Arc<Profiler>,
    profiling: bool,
}

impl FaultWrapper {
    pub fn new(console: Console, profiling: bool) -> Self {
        Self {
            console,
            profiler: Arc::new(Profiler::default()),
            profiling,
        }
    }

    pub fn profiler(&self) -> &Profiler {
        &self.profiler
    }

    /// Call `f`, trapping errors and panics. Returns `None` on a fault.
    pub fn call<T>(&self, guard: Guard, site: &CallSite<'_>, f: impl FnOnce() -> ExtResult<T>) -> Option<T> {
        let start = Instant::now();
        let result = trap(f);
        if guard == Guard::TimedFaultIsolated && self.profiling {
            self.profiler.record(site.method, site.module, start.elapsed());
        }
        match result {
            Ok(value) => Some(value),
            Err(err) => {
                self.report(site, &err);
                None
            }
        }
    }

    /// Construct an extension object, logging the class on failure.
    pub fn instantiate<T>(&self, module: &str, class: &str, f: impl FnOnce() -> ExtResult<T>) -> Option<T> {
        match trap(f) {
            Ok(value) => Some(value),
            Err(source) => {
                let site = CallSite {
                    entry: "instantiate",
                    method: "new",
                    module,
                    class,
                };
                let trace = traceback(&site, &source);
                let err = PluginError::Instantiation {
                    class: format!("{module}.{class}"),
                    source,
                };
                tracing::error!(target: "plughost::registry", "{}", err);
                self.console.print(&trace);
                None
            }
        }
    }

    fn report(&self, site: &CallSite<'_>, err: &ExtensionError) {
        tracing::error!(
            target: "plughost::dispatch",
            module = site.module,
            class = site.class,
            method = site.method,
            "{}",
            err
        );
        self.console.print(&traceback(site, err));
    }
}

/// Run extension code, turning panics into faults.
pub(crate) fn trap<T>(f: impl FnOnce() -> ExtResult<T>) -> ExtResult<T> {
    match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(result) => result,
        Err(payload) => Err(ExtensionError::new(panic_message(payload.as_ref()))),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "extension code panicked".to_string()
    }
}

/// One continuous stack: the dispatcher's frames, then the extension's.
pub fn traceback(site: &CallSite<'_>, err: &ExtensionError) -> String {
    let frames = [format!("  at PluginHost::{}", site.entry), format!("  at {}", site.callee())]
        .into_iter()
        .chain(err.frames.iter().map(ToString::to_string))
        .join("\n");
    format!("Traceback (most recent call last):\n{frames}\nError: {}\n", err.message)
}

#[cfg(test)]
mod tests {
    use plughost_core::Frame;

    use super::*;
    use crate::host::HeadlessHost;

    fn wrapper() -> (Arc<HeadlessHost>, FaultWrapper) {
        let host = Arc::new(HeadlessHost::new());
        let wrapper = FaultWrapper::new(Console::new(host.clone()), true);
        (host, wrapper)
    }

    const SITE: CallSite<'static> = CallSite {
        entry: "on_modified",
        method: "on_modified",
        module: "Pkg.mod",
        class: "Listener",
    };

    #[test]
    fn test_guard_for_kind() {
        assert_eq!(Guard::for_kind(EventKind::Modified), Guard::TimedFaultIsolated);
        assert_eq!(Guard::for_kind(EventKind::ModifiedAsync), Guard::FaultIsolated);
    }

    #[test]
    fn test_fault_prints_merged_traceback() {
        let (host, wrapper) = wrapper();
        let result: Option<()> = wrapper.call(Guard::FaultIsolated, &SITE, || {
            Err(ExtensionError::new("boom").with_frame(Frame::new("helper").at("Pkg.mod 4:9")))
        });
        assert!(result.is_none());

        let log = host.log_lines().join("");
        let lines: Vec<&str> = log.lines().collect();
        assert_eq!(
            lines,
            vec![
                "Traceback (most recent call last):",
                "  at PluginHost::on_modified",
                "  at Pkg.mod.Listener.on_modified",
                "  at helper (Pkg.mod 4:9)",
                "Error: boom",
            ]
        );
    }

    #[test]
    fn test_panic_is_trapped() {
        let (_host, wrapper) = wrapper();
        let result: Option<u32> = wrapper.call(Guard::FaultIsolated, &SITE, || panic!("kaboom"));
        assert!(result.is_none());
    }

    #[test]
    fn test_only_timed_calls_are_profiled() {
        let (_host, wrapper) = wrapper();
        wrapper.call(Guard::TimedFaultIsolated, &SITE, || Ok(()));
        wrapper.call(Guard::TimedFaultIsolated, &SITE, || Err::<(), _>("x".into()));
        wrapper.call(
            Guard::FaultIsolated,
            &CallSite {
                method: "on_modified_async",
                ..SITE
            },
            || Ok(()),
        );

        let entries = wrapper.profiler().entries();
        assert_eq!(entries.len(), 1);
        let (event, module, summary) = &entries[0];
        assert_eq!((event.as_str(), module.as_str()), ("on_modified", "Pkg.mod"));
        assert_eq!(summary.count, 2);
        assert!(summary.max <= summary.sum);
    }

    #[test]
    fn test_instantiation_failure_names_class() {
        let (host, wrapper) = wrapper();
        let made: Option<u8> = wrapper.instantiate("Pkg.mod", "Broken", || Err("ctor failed".into()));
        assert!(made.is_none());
        assert!(host.log_lines().join("").contains("at Pkg.mod.Broken.new"));
    }
}
