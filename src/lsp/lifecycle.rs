// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Mark Wells <contact@markwells.dev>

//! Server lifecycle gate.
//!
//! Every inbound message is admitted or refused here before its handler
//! runs, and admission performs the state transition the message implies.

use tracing::debug;

use super::protocol::{INVALID_REQUEST, SERVER_NOT_INITIALIZED};

/// Session-wide phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    /// Waiting for `initialize`.
    Uninitialized,
    /// `initialize` answered, waiting for `initialized`.
    Initializing,
    /// Serving documents.
    Active,
    /// `shutdown` received; only `exit` remains.
    ShuttingDown,
    /// `exit` received.
    Exited,
}

/// Refused request, answered with an error response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rejection {
    /// JSON-RPC error code.
    pub code: i64,
    /// Error message.
    pub message: &'static str,
}

/// How the process should terminate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitStatus {
    /// `exit` followed `shutdown`.
    Clean,
    /// The session ended without `shutdown`.
    Abnormal,
}

impl ExitStatus {
    /// Process exit code.
    #[must_use]
    pub const fn code(self) -> i32 {
        match self {
            Self::Clean => 0,
            Self::Abnormal => 1,
        }
    }
}

/// Lifecycle state machine.
#[derive(Debug)]
pub struct Lifecycle {
    state: LifecycleState,
    shutdown_received: bool,
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self::new()
    }
}

impl Lifecycle {
    /// Starts in [`LifecycleState::Uninitialized`].
    #[must_use]
    pub const fn new() -> Self {
        Self {
            state: LifecycleState::Uninitialized,
            shutdown_received: false,
        }
    }

    /// Current state.
    #[must_use]
    pub const fn state(&self) -> LifecycleState {
        self.state
    }

    /// Admits or refuses a request.
    ///
    /// # Errors
    ///
    /// Returns the [`Rejection`] to send if the request is illegal in the
    /// current state.
    pub fn admit_request(&mut self, method: &str) -> Result<(), Rejection> {
        use LifecycleState::{Active, Exited, Initializing, ShuttingDown, Uninitialized};

        match (self.state, method) {
            (Uninitialized, "initialize") => self.state = Initializing,
            (Uninitialized, _) => {
                return Err(Rejection {
                    code: SERVER_NOT_INITIALIZED,
                    message: "server not initialized",
                });
            }
            (Initializing | Active, "initialize") => {
                return Err(Rejection {
                    code: INVALID_REQUEST,
                    message: "initialize may only be sent once",
                });
            }
            (Initializing | Active, "shutdown") => {
                self.state = ShuttingDown;
                self.shutdown_received = true;
            }
            (Initializing, _) => self.promote(method),
            (Active, _) => {}
            (ShuttingDown, _) => {
                return Err(Rejection {
                    code: INVALID_REQUEST,
                    message: "server is shutting down",
                });
            }
            (Exited, _) => {
                return Err(Rejection {
                    code: INVALID_REQUEST,
                    message: "server has exited",
                });
            }
        }

        Ok(())
    }

    /// Admits or drops a notification.
    ///
    /// `exit` is admitted in every state except [`LifecycleState::Exited`].
    /// `$/cancelRequest` stays admitted while shutting down so an unanswered
    /// `shutdown` can be cancelled.
    ///
    /// # Errors
    ///
    /// Returns the reason the notification is dropped.
    pub fn admit_notification(&mut self, method: &str) -> Result<(), &'static str> {
        use LifecycleState::{Active, Exited, Initializing, ShuttingDown, Uninitialized};

        match (self.state, method) {
            (Exited, _) => return Err("server has exited"),
            (_, "exit") => self.state = Exited,
            (Uninitialized, _) => return Err("server not initialized"),
            (Initializing, "initialized") => self.state = Active,
            (Initializing, _) => self.promote(method),
            (Active, "initialized") => return Err("duplicate initialized notification"),
            (Active, _) => {}
            (ShuttingDown, "$/cancelRequest") => {}
            (ShuttingDown, _) => return Err("server is shutting down"),
        }

        Ok(())
    }

    /// Undoes an unanswered `shutdown` the client cancelled.
    ///
    /// The session is active again and the cancelled shutdown no longer
    /// counts towards a clean exit.
    pub fn cancel_shutdown(&mut self) {
        if self.state == LifecycleState::ShuttingDown {
            debug!("Shutdown cancelled; session active again");
            self.state = LifecycleState::Active;
            self.shutdown_received = false;
        }
    }

    /// Exit status implied by the messages seen so far.
    #[must_use]
    pub const fn exit_status(&self) -> ExitStatus {
        if self.shutdown_received {
            ExitStatus::Clean
        } else {
            ExitStatus::Abnormal
        }
    }

    fn promote(&mut self, method: &str) {
        debug!("No initialized notification before {method}; treating session as active");
        self.state = LifecycleState::Active;
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    reason = "Tests use unwrap for clear failure messages"
)]
mod tests {
    use super::*;

    fn active() -> Lifecycle {
        let mut lifecycle = Lifecycle::new();
        lifecycle.admit_request("initialize").unwrap();
        lifecycle.admit_notification("initialized").unwrap();
        lifecycle
    }

    #[test]
    fn test_happy_path() {
        let mut lifecycle = Lifecycle::new();
        assert_eq!(lifecycle.state(), LifecycleState::Uninitialized);

        lifecycle.admit_request("initialize").unwrap();
        assert_eq!(lifecycle.state(), LifecycleState::Initializing);

        lifecycle.admit_notification("initialized").unwrap();
        assert_eq!(lifecycle.state(), LifecycleState::Active);

        lifecycle.admit_notification("textDocument/didOpen").unwrap();
        lifecycle.admit_request("shutdown").unwrap();
        assert_eq!(lifecycle.state(), LifecycleState::ShuttingDown);

        lifecycle.admit_notification("exit").unwrap();
        assert_eq!(lifecycle.state(), LifecycleState::Exited);
        assert_eq!(lifecycle.exit_status(), ExitStatus::Clean);
        assert_eq!(lifecycle.exit_status().code(), 0);
    }

    #[test]
    fn test_request_before_initialize() {
        let mut lifecycle = Lifecycle::new();
        let rejection = lifecycle.admit_request("shutdown").unwrap_err();
        assert_eq!(rejection.code, SERVER_NOT_INITIALIZED);
        assert_eq!(lifecycle.state(), LifecycleState::Uninitialized);

        // A later initialize still works
        lifecycle.admit_request("initialize").unwrap();
        assert_eq!(lifecycle.state(), LifecycleState::Initializing);
    }

    #[test]
    fn test_notifications_dropped_before_initialize() {
        let mut lifecycle = Lifecycle::new();
        assert!(lifecycle.admit_notification("textDocument/didOpen").is_err());
        assert!(lifecycle.admit_notification("initialized").is_err());
        assert_eq!(lifecycle.state(), LifecycleState::Uninitialized);
    }

    #[test]
    fn test_exit_without_shutdown_is_abnormal() {
        let mut lifecycle = Lifecycle::new();
        lifecycle.admit_notification("exit").unwrap();
        assert_eq!(lifecycle.state(), LifecycleState::Exited);
        assert_eq!(lifecycle.exit_status().code(), 1);

        let mut lifecycle = active();
        lifecycle.admit_notification("exit").unwrap();
        assert_eq!(lifecycle.exit_status(), ExitStatus::Abnormal);
    }

    #[test]
    fn test_second_initialize_rejected() {
        let mut lifecycle = active();
        let rejection = lifecycle.admit_request("initialize").unwrap_err();
        assert_eq!(rejection.code, INVALID_REQUEST);
        assert_eq!(lifecycle.state(), LifecycleState::Active);
    }

    #[test]
    fn test_missing_initialized_promotes() {
        let mut lifecycle = Lifecycle::new();
        lifecycle.admit_request("initialize").unwrap();
        lifecycle.admit_notification("textDocument/didOpen").unwrap();
        assert_eq!(lifecycle.state(), LifecycleState::Active);
    }

    #[test]
    fn test_shutting_down_refuses_work() {
        let mut lifecycle = active();
        lifecycle.admit_request("shutdown").unwrap();

        assert_eq!(
            lifecycle.admit_request("shutdown").unwrap_err().code,
            INVALID_REQUEST
        );
        assert!(lifecycle.admit_notification("textDocument/didChange").is_err());
        assert_eq!(lifecycle.state(), LifecycleState::ShuttingDown);
    }

    #[test]
    fn test_cancelled_shutdown_resumes() {
        let mut lifecycle = active();
        lifecycle.admit_request("shutdown").unwrap();
        lifecycle.admit_notification("$/cancelRequest").unwrap();

        lifecycle.cancel_shutdown();
        assert_eq!(lifecycle.state(), LifecycleState::Active);
        assert_eq!(lifecycle.exit_status(), ExitStatus::Abnormal);
        lifecycle.admit_notification("textDocument/didChange").unwrap();

        lifecycle.admit_request("shutdown").unwrap();
        lifecycle.admit_notification("exit").unwrap();
        assert_eq!(lifecycle.exit_status(), ExitStatus::Clean);
    }

    #[test]
    fn test_cancel_shutdown_outside_shutdown_is_noop() {
        let mut lifecycle = active();
        lifecycle.cancel_shutdown();
        assert_eq!(lifecycle.state(), LifecycleState::Active);
    }

    #[test]
    fn test_nothing_after_exit() {
        let mut lifecycle = active();
        lifecycle.admit_notification("exit").unwrap();
        assert!(lifecycle.admit_notification("exit").is_err());
        assert!(lifecycle.admit_request("initialize").is_err());
    }
}
