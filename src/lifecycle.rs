use serde::{Deserialize, Serialize};

use crate::errors::{LoanError, Result};
use crate::types::{LoanStatus, TerminationKind};

/// validate a requested status transition against the lifecycle graph
///
/// Transitions are one-directional: the signing track advances step by step,
/// funding opens billing, and the terminal statuses accept nothing further.
/// The two exceptions are the decline/void route back to review and the
/// derogatory sidestep from any active-style status.
pub fn validate_transition(from: LoanStatus, to: LoanStatus) -> Result<()> {
    use LoanStatus::*;

    if from.is_terminal() {
        return Err(LoanError::AlreadyTerminal { status: from });
    }

    let allowed = match (from, to) {
        (Draft, ApplicationSent) => true,
        (ApplicationSent, ApplicationCompleted) => true,
        (ApplicationCompleted, IpayApproved) => true,
        (IpayApproved, DealerApproved) => true,
        (DealerApproved, FullySigned) => true,
        (FullySigned, Funded) => true,
        (Funded, Active) => true,

        // terminal resolutions
        (Funded | Active | PendingDerogatoryReview, Closed | Settled | Derogatory) => true,
        (Funded | Active, PendingDerogatoryReview) => true,
        (PendingDerogatoryReview, Active) => true,

        // declined/voided signing routes back to review
        (s, Review) if s.is_signing_track() => true,
        (Review, ApplicationSent) => true,

        _ => false,
    };

    if allowed {
        Ok(())
    } else {
        Err(LoanError::InvalidTransition { from, to })
    }
}

/// funding precondition: the immediately preceding status must be exactly
/// fully_signed
pub fn ensure_fundable(status: LoanStatus) -> Result<()> {
    match status {
        LoanStatus::FullySigned => Ok(()),
        LoanStatus::Funded => Err(LoanError::AlreadyFunded),
        other => Err(LoanError::FundingNotAllowed { status: other }),
    }
}

/// termination eligibility check
///
/// A loan already in a terminal state rejects further closure or derogatory
/// requests with a conflict; pre-funding loans have nothing billed and are
/// not terminable through this path.
pub fn ensure_terminable(status: LoanStatus, kind: TerminationKind) -> Result<()> {
    if status.is_terminal() {
        return Err(LoanError::AlreadyTerminal { status });
    }
    if !status.is_active_style() {
        let to = match kind {
            TerminationKind::Closure => LoanStatus::Closed,
            TerminationKind::Derogatory => LoanStatus::Derogatory,
        };
        return Err(LoanError::InvalidTransition { from: status, to });
    }
    Ok(())
}

/// external e-signature outcome, already translated from the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SigningEvent {
    Signed,
    Declined,
    Voided,
}

/// status a signing event routes a loan to
///
/// `signed` completes the signing track and is only accepted once the
/// dealer has approved; `declined`/`voided` send any signing-track loan
/// back to review. Events arriving for loans off the signing track are
/// invalid. The returned status is always a valid transition target.
pub fn route_signing_event(status: LoanStatus, event: SigningEvent) -> Result<LoanStatus> {
    if !status.is_signing_track() {
        return Err(LoanError::InvalidTransition {
            from: status,
            to: LoanStatus::Review,
        });
    }
    match event {
        SigningEvent::Signed if status == LoanStatus::DealerApproved => {
            Ok(LoanStatus::FullySigned)
        }
        SigningEvent::Signed => Err(LoanError::InvalidTransition {
            from: status,
            to: LoanStatus::FullySigned,
        }),
        SigningEvent::Declined | SigningEvent::Voided => Ok(LoanStatus::Review),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::LoanStatus::*;

    #[test]
    fn test_signing_track_advances_in_order() {
        let track = [
            Draft,
            ApplicationSent,
            ApplicationCompleted,
            IpayApproved,
            DealerApproved,
            FullySigned,
            Funded,
            Active,
        ];
        for pair in track.windows(2) {
            validate_transition(pair[0], pair[1]).unwrap();
        }
    }

    #[test]
    fn test_no_skipping_ahead() {
        assert!(matches!(
            validate_transition(Draft, FullySigned),
            Err(LoanError::InvalidTransition { .. })
        ));
        assert!(matches!(
            validate_transition(ApplicationSent, Funded),
            Err(LoanError::InvalidTransition { .. })
        ));
    }

    #[test]
    fn test_terminal_states_reject_everything() {
        for terminal in [Closed, Settled, Derogatory] {
            for to in [Active, Closed, Derogatory, Review] {
                assert!(matches!(
                    validate_transition(terminal, to),
                    Err(LoanError::AlreadyTerminal { .. })
                ));
            }
        }
    }

    #[test]
    fn test_derogatory_sidestep_from_active_style_only() {
        validate_transition(Funded, Derogatory).unwrap();
        validate_transition(Active, Derogatory).unwrap();
        validate_transition(PendingDerogatoryReview, Derogatory).unwrap();

        assert!(validate_transition(Draft, Derogatory).is_err());
        assert!(validate_transition(FullySigned, Derogatory).is_err());
    }

    #[test]
    fn test_pending_review_can_return_to_active() {
        validate_transition(Active, PendingDerogatoryReview).unwrap();
        validate_transition(PendingDerogatoryReview, Active).unwrap();
    }

    #[test]
    fn test_funding_guard() {
        ensure_fundable(FullySigned).unwrap();

        assert!(matches!(ensure_fundable(Funded), Err(LoanError::AlreadyFunded)));
        for status in [Draft, ApplicationSent, DealerApproved, Review, Active] {
            assert!(matches!(
                ensure_fundable(status),
                Err(LoanError::FundingNotAllowed { .. })
            ));
        }
    }

    #[test]
    fn test_termination_guard() {
        ensure_terminable(Active, TerminationKind::Closure).unwrap();
        ensure_terminable(Funded, TerminationKind::Derogatory).unwrap();

        for terminal in [Closed, Settled, Derogatory] {
            assert!(matches!(
                ensure_terminable(terminal, TerminationKind::Closure),
                Err(LoanError::AlreadyTerminal { .. })
            ));
            assert!(matches!(
                ensure_terminable(terminal, TerminationKind::Derogatory),
                Err(LoanError::AlreadyTerminal { .. })
            ));
        }

        assert!(ensure_terminable(Draft, TerminationKind::Closure).is_err());
    }

    #[test]
    fn test_declined_signing_routes_to_review() {
        assert_eq!(
            route_signing_event(FullySigned, SigningEvent::Declined).unwrap(),
            Review
        );
        assert_eq!(
            route_signing_event(ApplicationSent, SigningEvent::Voided).unwrap(),
            Review
        );
        assert_eq!(
            route_signing_event(DealerApproved, SigningEvent::Signed).unwrap(),
            FullySigned
        );

        // review can re-enter the track
        validate_transition(Review, ApplicationSent).unwrap();

        assert!(route_signing_event(Funded, SigningEvent::Declined).is_err());
    }

    #[test]
    fn test_signed_event_requires_dealer_approval_first() {
        for status in [ApplicationSent, ApplicationCompleted, IpayApproved, FullySigned] {
            assert!(matches!(
                route_signing_event(status, SigningEvent::Signed),
                Err(LoanError::InvalidTransition { .. })
            ));
        }

        // every status a signing event routes to is a legal transition
        for status in [
            ApplicationSent,
            ApplicationCompleted,
            IpayApproved,
            DealerApproved,
            FullySigned,
        ] {
            for event in [SigningEvent::Signed, SigningEvent::Declined, SigningEvent::Voided] {
                if let Ok(next) = route_signing_event(status, event) {
                    validate_transition(status, next).unwrap();
                }
            }
        }
    }
}
