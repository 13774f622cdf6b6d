//! Sync cycle state machine and retry backoff.
//!
//! This module provides a pure, side-effect-free state machine for one sync
//! cycle. It takes events as input and produces a new phase plus a list of
//! actions to execute. The I/O (store reads, HTTP, commits) is performed by
//! shavar-client; this module only decides what happens next and what the
//! retry schedule becomes.
//!
//! ```text
//! Idle -> BuildingRequest -> AwaitingResponse -> Parsing -> Applying -> Idle
//!            |                    |                |           |
//!            +--------------------+----------------+-----------+--> Idle (failed)
//! ```

use shavar_types::{Directive, RetrySchedule};

/// Seconds to wait after a successful cycle when the server sent no `n:`.
pub const DEFAULT_TIMEOUT_SECS: u64 = 15 * 60;

/// Backoff after the `error_count`-th consecutive failure, in minutes.
pub fn backoff_minutes(error_count: u32) -> u64 {
    match error_count {
        1 => 1,
        2 => 30,
        3 => 60,
        4 => 120,
        5 => 240,
        _ => 480,
    }
}

/// Schedule after a committed cycle at `now`.
///
/// `timeout` is the server-requested delay; 0 means none was sent.
pub fn on_success(now: u64, timeout: u64) -> RetrySchedule {
    let delay = if timeout > 0 {
        timeout
    } else {
        DEFAULT_TIMEOUT_SECS
    };
    RetrySchedule {
        next_attempt: now.saturating_add(delay),
        error_count: 0,
        last_attempt: now,
        last_success: now,
    }
}

/// Schedule after a failed cycle at `now`. `last_success` is kept.
pub fn on_failure(previous: RetrySchedule, now: u64) -> RetrySchedule {
    let error_count = previous.error_count.saturating_add(1);
    RetrySchedule {
        next_attempt: now.saturating_add(backoff_minutes(error_count) * 60),
        error_count,
        last_attempt: now,
        last_success: previous.last_success,
    }
}

/// The poll delay requested by a directive batch. The last `n:` wins; 0 if
/// the batch has none.
pub fn requested_timeout(directives: &[Directive]) -> u64 {
    directives
        .iter()
        .rev()
        .find_map(|d| match d {
            Directive::SetTimeout { seconds } => Some(*seconds),
            _ => None,
        })
        .unwrap_or(0)
}

/// Where a sync cycle currently is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CyclePhase {
    /// No cycle in flight.
    Idle,
    /// Reading chunk inventory and formatting the request body.
    BuildingRequest {
        /// Schedule read when the cycle started.
        started: RetrySchedule,
        /// Clock value for this cycle.
        now: u64,
    },
    /// Request sent, waiting on the transport.
    AwaitingResponse {
        /// Schedule read when the cycle started.
        started: RetrySchedule,
        /// Clock value for this cycle.
        now: u64,
    },
    /// Decoding the response and resolving redirects.
    Parsing {
        /// Schedule read when the cycle started.
        started: RetrySchedule,
        /// Clock value for this cycle.
        now: u64,
    },
    /// Committing the directive batch with the success schedule.
    Applying {
        /// Schedule read when the cycle started.
        started: RetrySchedule,
        /// Clock value for this cycle.
        now: u64,
        /// Schedule written with the batch.
        next: RetrySchedule,
    },
}

impl CyclePhase {
    /// Create a new state machine in the Idle phase.
    pub fn new() -> Self {
        Self::Idle
    }

    /// Short phase name, used in logs.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::BuildingRequest { .. } => "building_request",
            Self::AwaitingResponse { .. } => "awaiting_response",
            Self::Parsing { .. } => "parsing",
            Self::Applying { .. } => "applying",
        }
    }

    /// Process an event and return the new phase plus actions to execute.
    ///
    /// Pure function; the caller performs the returned actions.
    pub fn on_event(self, event: CycleEvent) -> (Self, Vec<CycleAction>) {
        match (self, event) {
            // From Idle
            (
                Self::Idle,
                CycleEvent::Start {
                    now,
                    force,
                    schedule,
                },
            ) => match schedule.wait_secs(now) {
                Some(wait_secs) if !force => {
                    (Self::Idle, vec![CycleAction::AbortTooSoon { wait_secs }])
                }
                Some(wait_secs) => (
                    Self::BuildingRequest {
                        started: schedule,
                        now,
                    },
                    vec![
                        CycleAction::IgnoreTimeoutGuidance { wait_secs },
                        CycleAction::BuildRequest,
                    ],
                ),
                None => (
                    Self::BuildingRequest {
                        started: schedule,
                        now,
                    },
                    vec![CycleAction::BuildRequest],
                ),
            },

            (Self::BuildingRequest { started, now }, CycleEvent::RequestBuilt) => (
                Self::AwaitingResponse { started, now },
                vec![CycleAction::SendRequest],
            ),

            (Self::AwaitingResponse { started, now }, CycleEvent::ResponseReceived) => (
                Self::Parsing { started, now },
                vec![CycleAction::ParseResponse],
            ),

            (Self::Parsing { started, now }, CycleEvent::Parsed { requested_timeout }) => {
                let next = on_success(now, requested_timeout);
                (
                    Self::Applying { started, now, next },
                    vec![CycleAction::ApplyBatch {
                        expected: started,
                        next,
                    }],
                )
            }

            (Self::Applying { next, .. }, CycleEvent::Committed) => {
                (Self::Idle, vec![CycleAction::Finished { schedule: next }])
            }

            // Any in-flight phase can fail
            (
                Self::BuildingRequest { started, now }
                | Self::AwaitingResponse { started, now }
                | Self::Parsing { started, now }
                | Self::Applying { started, now, .. },
                CycleEvent::Failed { error },
            ) => {
                let next = on_failure(started, now);
                (
                    Self::Idle,
                    vec![CycleAction::RecordFailure {
                        expected: started,
                        next,
                        backoff_minutes: backoff_minutes(next.error_count),
                        error,
                    }],
                )
            }

            // Invalid transitions - stay in current phase
            (phase, _) => (phase, vec![]),
        }
    }

    /// Whether a cycle is in flight.
    pub fn is_active(&self) -> bool {
        !matches!(self, Self::Idle)
    }
}

impl Default for CyclePhase {
    fn default() -> Self {
        Self::new()
    }
}

/// Events that drive a sync cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleEvent {
    /// A cycle was requested.
    Start {
        /// Current unix time in seconds.
        now: u64,
        /// Run even if the schedule says it is too soon.
        force: bool,
        /// Schedule as currently persisted.
        schedule: RetrySchedule,
    },
    /// The request body is ready.
    RequestBuilt,
    /// The transport returned an acceptable response.
    ResponseReceived,
    /// The response was decoded into a directive batch.
    Parsed {
        /// Delay requested by the batch (0 if none).
        requested_timeout: u64,
    },
    /// The batch and schedule were committed.
    Committed,
    /// The current step failed.
    Failed {
        /// Error message describing the failure.
        error: String,
    },
}

/// Actions for shavar-client to execute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleAction {
    /// Too soon to sync; nothing to do.
    AbortTooSoon {
        /// Seconds until the next allowed attempt.
        wait_secs: u64,
    },
    /// Forced run before the next allowed attempt.
    IgnoreTimeoutGuidance {
        /// Seconds the schedule asked to wait.
        wait_secs: u64,
    },
    /// Read chunk inventory and format the request body.
    BuildRequest,
    /// Post the body to the downloads endpoint.
    SendRequest,
    /// Decode the response and resolve redirects.
    ParseResponse,
    /// Commit the batch, swapping `expected` for `next`.
    ApplyBatch {
        /// Schedule the store must still hold.
        expected: RetrySchedule,
        /// Schedule to persist.
        next: RetrySchedule,
    },
    /// Persist the failure schedule, swapping `expected` for `next`.
    RecordFailure {
        /// Schedule the store must still hold.
        expected: RetrySchedule,
        /// Schedule to persist.
        next: RetrySchedule,
        /// Backoff chosen for this failure.
        backoff_minutes: u64,
        /// Error message describing the failure.
        error: String,
    },
    /// The cycle committed.
    Finished {
        /// Schedule now in effect.
        schedule: RetrySchedule,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use shavar_types::ListName;

    const NOW: u64 = 1_700_000_000;

    fn start(schedule: RetrySchedule, force: bool) -> CycleEvent {
        CycleEvent::Start {
            now: NOW,
            force,
            schedule,
        }
    }

    fn fail(phase: CyclePhase) -> (CyclePhase, Vec<CycleAction>) {
        phase.on_event(CycleEvent::Failed {
            error: "boom".into(),
        })
    }

    #[test]
    fn backoff_table() {
        let minutes: Vec<u64> = (1..=7).map(backoff_minutes).collect();
        assert_eq!(minutes, vec![1, 30, 60, 120, 240, 480, 480]);
    }

    #[test]
    fn success_resets_errors_and_uses_timeout() {
        let next = on_success(NOW, 1800);
        assert_eq!(next.error_count, 0);
        assert_eq!(next.last_attempt, NOW);
        assert_eq!(next.last_success, NOW);
        assert_eq!(next.next_attempt, NOW + 1800);
    }

    #[test]
    fn success_without_timeout_waits_fifteen_minutes() {
        assert_eq!(on_success(NOW, 0).next_attempt, NOW + 900);
    }

    #[test]
    fn third_failure_backs_off_an_hour() {
        let mut schedule = RetrySchedule::default();
        for i in 0..3 {
            schedule = on_failure(schedule, NOW + i * 10_000);
        }
        assert_eq!(schedule.error_count, 3);
        assert_eq!(schedule.next_attempt - schedule.last_attempt, 60 * 60);
    }

    #[test]
    fn sixth_failure_uses_default_backoff() {
        let mut schedule = RetrySchedule::default();
        for i in 0..6 {
            schedule = on_failure(schedule, NOW + i * 100_000);
        }
        assert_eq!(schedule.next_attempt - schedule.last_attempt, 480 * 60);
    }

    #[test]
    fn failure_keeps_last_success() {
        let ok = on_success(NOW, 0);
        let failed = on_failure(ok, NOW + 5000);
        assert_eq!(failed.last_success, NOW);
        assert_eq!(failed.last_attempt, NOW + 5000);
    }

    #[test]
    fn last_timeout_wins() {
        let batch = vec![
            Directive::SetTimeout { seconds: 60 },
            Directive::AddEmpty {
                list: ListName::from("goog-malware-shavar"),
                add_chunk: 1,
            },
            Directive::SetTimeout { seconds: 1200 },
        ];
        assert_eq!(requested_timeout(&batch), 1200);
        assert_eq!(requested_timeout(&[]), 0);
    }

    #[test]
    fn too_soon_aborts_without_work() {
        let schedule = RetrySchedule {
            next_attempt: NOW + 300,
            ..Default::default()
        };
        let (phase, actions) = CyclePhase::Idle.on_event(start(schedule, false));

        assert_eq!(phase, CyclePhase::Idle);
        assert_eq!(actions, vec![CycleAction::AbortTooSoon { wait_secs: 300 }]);
    }

    #[test]
    fn forced_start_ignores_guidance() {
        let schedule = RetrySchedule {
            next_attempt: NOW + 300,
            ..Default::default()
        };
        let (phase, actions) = CyclePhase::Idle.on_event(start(schedule, true));

        assert!(matches!(phase, CyclePhase::BuildingRequest { .. }));
        assert_eq!(
            actions,
            vec![
                CycleAction::IgnoreTimeoutGuidance { wait_secs: 300 },
                CycleAction::BuildRequest
            ]
        );
    }

    #[test]
    fn full_successful_cycle() {
        let started = RetrySchedule::default();
        let (phase, actions) = CyclePhase::Idle.on_event(start(started, false));
        assert_eq!(actions, vec![CycleAction::BuildRequest]);

        let (phase, actions) = phase.on_event(CycleEvent::RequestBuilt);
        assert!(matches!(phase, CyclePhase::AwaitingResponse { .. }));
        assert_eq!(actions, vec![CycleAction::SendRequest]);

        let (phase, actions) = phase.on_event(CycleEvent::ResponseReceived);
        assert!(matches!(phase, CyclePhase::Parsing { .. }));
        assert_eq!(actions, vec![CycleAction::ParseResponse]);

        let (phase, actions) = phase.on_event(CycleEvent::Parsed {
            requested_timeout: 1800,
        });
        let next = on_success(NOW, 1800);
        assert_eq!(
            actions,
            vec![CycleAction::ApplyBatch {
                expected: started,
                next
            }]
        );

        let (phase, actions) = phase.on_event(CycleEvent::Committed);
        assert_eq!(phase, CyclePhase::Idle);
        assert_eq!(actions, vec![CycleAction::Finished { schedule: next }]);
    }

    #[test]
    fn failure_from_every_active_phase_records_backoff() {
        let started = RetrySchedule::default();
        let phases = vec![
            CyclePhase::BuildingRequest { started, now: NOW },
            CyclePhase::AwaitingResponse { started, now: NOW },
            CyclePhase::Parsing { started, now: NOW },
            CyclePhase::Applying {
                started,
                now: NOW,
                next: on_success(NOW, 0),
            },
        ];

        for phase in phases {
            let (phase, actions) = fail(phase);
            assert_eq!(phase, CyclePhase::Idle);
            match &actions[..] {
                [CycleAction::RecordFailure {
                    expected,
                    next,
                    backoff_minutes,
                    ..
                }] => {
                    assert_eq!(*expected, started);
                    assert_eq!(next.error_count, 1);
                    assert_eq!(*backoff_minutes, 1);
                    assert_eq!(next.next_attempt, NOW + 60);
                }
                other => panic!("Expected RecordFailure, got {:?}", other),
            }
        }
    }

    #[test]
    fn invalid_transition_is_ignored() {
        let (phase, actions) = CyclePhase::Idle.on_event(CycleEvent::Committed);
        assert_eq!(phase, CyclePhase::Idle);
        assert!(actions.is_empty());

        let (phase, actions) = fail(CyclePhase::Idle);
        assert_eq!(phase, CyclePhase::Idle);
        assert!(actions.is_empty());
    }
}
