//! Extension console output.

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::host::Host;

/// Where extension output and tracebacks go.
///
/// Normally forwards to [`Host::log`]. While capturing, output is buffered
/// instead, which is how exit listeners are logged after the host's own
/// sink has gone away.
#[derive(Clone)]
pub struct Console {
    host: Arc<dyn Host>,
    capture: Arc<Mutex<Option<String>>>,
}

impl Console {
    pub fn new(host: Arc<dyn Host>) -> Self {
        Self {
            host,
            capture: Arc::new(Mutex::new(None)),
        }
    }

    /// Print one chunk of output.
    pub fn print(&self, text: &str) {
        {
            let mut capture = self.capture.lock();
            if let Some(buffer) = capture.as_mut() {
                buffer.push_str(text);
                if !text.ends_with('\n') {
                    buffer.push('\n');
                }
                return;
            }
        }
        self.host.log(text);
    }

    /// Start buffering output. Anything captured earlier is discarded.
    pub fn begin_capture(&self) {
        *self.capture.lock() = Some(String::new());
    }

    /// Stop buffering and return what was captured.
    pub fn end_capture(&self) -> String {
        self.capture.lock().take().unwrap_or_default()
    }

    pub fn is_capturing(&self) -> bool {
        self.capture.lock().is_some()
    }
}

impl fmt::Debug for Console {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Console")
            .field("capturing", &self.is_capturing())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::HeadlessHost;

    #[test]
    fn test_capture_diverts_output() {
        let host = Arc::new(HeadlessHost::new());
        let console = Console::new(host.clone());

        console.print("before");
        console.begin_capture();
        console.print("during");
        console.print("line\n");
        assert_eq!(console.end_capture(), "during\nline\n");
        console.print("after");

        assert_eq!(host.log_lines(), vec!["before", "after"]);
        assert!(!console.is_capturing());
    }
}
