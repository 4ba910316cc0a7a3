//! Property checks over the status state machine.

use exception_collector::models::ResolutionMethod;
use exception_collector::state_machine::{ExceptionEvent, ExceptionStateMachine, ExceptionStatus};
use proptest::prelude::*;

fn any_status() -> impl Strategy<Value = ExceptionStatus> {
    prop::sample::select(vec![
        ExceptionStatus::New,
        ExceptionStatus::Acknowledged,
        ExceptionStatus::RetriedSuccess,
        ExceptionStatus::RetriedFailed,
        ExceptionStatus::Escalated,
        ExceptionStatus::Resolved,
        ExceptionStatus::Closed,
    ])
}

fn any_event() -> impl Strategy<Value = ExceptionEvent> {
    prop::sample::select(vec![
        ExceptionEvent::Acknowledge {
            acknowledged_by: "ops".to_string(),
            notes: None,
        },
        ExceptionEvent::Resolve {
            resolved_by: "ops".to_string(),
            method: ResolutionMethod::ManualResolution,
            notes: None,
        },
        ExceptionEvent::RetrySucceeded,
        ExceptionEvent::RetryFailed,
        ExceptionEvent::Escalate,
        ExceptionEvent::Close,
    ])
}

proptest! {
    /// Terminal states admit no transitions at all.
    #[test]
    fn terminal_states_are_absorbing(status in any_status(), event in any_event()) {
        if status.is_terminal() {
            prop_assert!(ExceptionStateMachine::determine_target_state(status, &event).is_err());
        }
    }

    /// Whatever the machine allows, it never leads back to NEW, and a
    /// retry-completion edge only fires from a state that admits retries
    /// or from an acknowledged exception with a retry in flight.
    #[test]
    fn transitions_never_reenter_new(status in any_status(), event in any_event()) {
        if let Ok(target) = ExceptionStateMachine::determine_target_state(status, &event) {
            prop_assert_ne!(target, ExceptionStatus::New);

            if matches!(event, ExceptionEvent::RetrySucceeded | ExceptionEvent::RetryFailed) {
                prop_assert!(status.allows_retry() || status == ExceptionStatus::Acknowledged);
            }
        }
    }

    /// Status serialization round-trips through its display form.
    #[test]
    fn status_display_round_trips(status in any_status()) {
        let text = status.to_string();
        prop_assert_eq!(text.parse::<ExceptionStatus>().unwrap(), status);
    }
}
