//! Process exit reasons and one-shot exit notification.

use std::fmt;
use std::process::ExitStatus;
use std::sync::{Mutex, MutexGuard};

/// How a plugin process ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitReason {
    /// The process exited on its own with this status code.
    Exited {
        /// Exit status code.
        code: i32,
    },
    /// The process was terminated by a signal it did not expect.
    Signalled {
        /// Signal number.
        signal: i32,
    },
    /// The host stopped the process deliberately.
    Stopped,
}

impl ExitReason {
    /// Classifies an unexpected exit status.
    #[must_use]
    pub fn from_status(status: ExitStatus) -> Self {
        if let Some(code) = status.code() {
            return Self::Exited { code };
        }
        #[cfg(unix)]
        {
            use std::os::unix::process::ExitStatusExt;
            if let Some(signal) = status.signal() {
                return Self::Signalled { signal };
            }
        }
        Self::Exited { code: -1 }
    }
}

impl fmt::Display for ExitReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exited { code } => write!(f, "exited with code {code}"),
            Self::Signalled { signal } => write!(f, "terminated by signal {signal}"),
            Self::Stopped => f.write_str("stopped"),
        }
    }
}

type ExitHandler = Box<dyn FnOnce(ExitReason) + Send>;

#[derive(Default)]
struct NotifierState {
    reason: Option<ExitReason>,
    handlers: Vec<ExitHandler>,
}

/// Delivers a process's [`ExitReason`] to its subscribers exactly once.
///
/// Handlers run on the thread that observes the exit, outside the internal
/// lock, so a handler may safely call back into the supervisor.
#[derive(Default)]
pub(crate) struct ExitNotifier {
    state: Mutex<NotifierState>,
}

impl ExitNotifier {
    fn lock(&self) -> MutexGuard<'_, NotifierState> {
        self.state
            .lock()
            .unwrap_or_else(|poison| poison.into_inner())
    }

    /// Registers a handler; runs it immediately if the exit already fired.
    pub(crate) fn subscribe(&self, handler: ExitHandler) {
        let mut state = self.lock();
        if let Some(reason) = state.reason {
            drop(state);
            handler(reason);
            return;
        }
        state.handlers.push(handler);
    }

    /// Records the exit and runs every handler. Returns `false` if the exit
    /// had already been recorded, in which case nothing runs.
    pub(crate) fn fire(&self, reason: ExitReason) -> bool {
        let handlers = {
            let mut state = self.lock();
            if state.reason.is_some() {
                return false;
            }
            state.reason = Some(reason);
            std::mem::take(&mut state.handlers)
        };
        for handler in handlers {
            handler(reason);
        }
        true
    }

    pub(crate) fn reason(&self) -> Option<ExitReason> {
        self.lock().reason
    }
}

impl fmt::Debug for ExitNotifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.lock();
        f.debug_struct("ExitNotifier")
            .field("reason", &state.reason)
            .field("handlers", &state.handlers.len())
            .finish()
    }
}
