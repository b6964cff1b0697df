//! Text-backed status enums and their transition tables.
//!
//! Every status column is stored as text; these types are the only place the
//! allowed values and the legal moves between them are spelled out.

use std::fmt;

use thiserror::Error;

#[derive(Debug, Clone, Error)]
#[error("unknown {kind} value: {value}")]
pub struct UnknownVariant {
    pub kind: &'static str,
    pub value: String,
}

macro_rules! text_enum {
    ($(#[$meta:meta])* $name:ident { $($variant:ident => $text:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, ::serde::Serialize, ::serde::Deserialize)]
        pub enum $name {
            $(
                #[serde(rename = $text)]
                $variant,
            )+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn as_str(self) -> &'static str {
                match self {
                    $($name::$variant => $text,)+
                }
            }
        }

        impl ::std::fmt::Display for $name {
            fn fmt(&self, f: &mut ::std::fmt::Formatter<'_>) -> ::std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl ::std::str::FromStr for $name {
            type Err = $crate::status::UnknownVariant;

            fn from_str(value: &str) -> Result<Self, Self::Err> {
                match value {
                    $($text => Ok($name::$variant),)+
                    other => Err($crate::status::UnknownVariant {
                        kind: stringify!($name),
                        value: other.to_string(),
                    }),
                }
            }
        }
    };
}

pub(crate) use text_enum;

/// A status enum with an explicit table of legal moves.
pub trait StateMachine: Copy + PartialEq + fmt::Display {
    const ENTITY: &'static str;

    fn can_transition_to(self, next: Self) -> bool;
}

text_enum!(TicketStatus {
    Open => "open",
    InProgress => "in_progress",
    Resolved => "resolved",
    Closed => "closed",
    Cancelled => "cancelled",
});

impl StateMachine for TicketStatus {
    const ENTITY: &'static str = "ticket";

    fn can_transition_to(self, next: Self) -> bool {
        use TicketStatus::*;
        matches!(
            (self, next),
            (Open, InProgress | Resolved | Cancelled)
                | (InProgress, Open | Resolved | Cancelled)
                | (Resolved, Closed | InProgress)
        )
    }
}

text_enum!(Priority {
    Low => "low",
    Medium => "medium",
    High => "high",
    Urgent => "urgent",
});

impl Default for Priority {
    fn default() -> Self {
        Priority::Medium
    }
}

text_enum!(DispatchStatus {
    Pending => "pending",
    InTransit => "in_transit",
    Delivered => "delivered",
    Cancelled => "cancelled",
});

impl StateMachine for DispatchStatus {
    const ENTITY: &'static str = "dispatch order";

    fn can_transition_to(self, next: Self) -> bool {
        use DispatchStatus::*;
        matches!(
            (self, next),
            (Pending, InTransit | Cancelled) | (InTransit, Delivered | Cancelled)
        )
    }
}

text_enum!(DispatchItemStatus {
    Pending => "pending",
    Packed => "packed",
    Dispatched => "dispatched",
    Delivered => "delivered",
});

impl DispatchItemStatus {
    fn rank(self) -> u8 {
        match self {
            DispatchItemStatus::Pending => 0,
            DispatchItemStatus::Packed => 1,
            DispatchItemStatus::Dispatched => 2,
            DispatchItemStatus::Delivered => 3,
        }
    }
}

impl StateMachine for DispatchItemStatus {
    const ENTITY: &'static str = "dispatch item";

    // Items only move forward; skipping a step is allowed.
    fn can_transition_to(self, next: Self) -> bool {
        next.rank() > self.rank()
    }
}

text_enum!(JobStatus {
    Scheduled => "scheduled",
    InProgress => "in_progress",
    Completed => "completed",
    Cancelled => "cancelled",
    Rescheduled => "rescheduled",
});

impl StateMachine for JobStatus {
    const ENTITY: &'static str = "installation job";

    fn can_transition_to(self, next: Self) -> bool {
        use JobStatus::*;
        matches!(
            (self, next),
            (Scheduled, InProgress | Rescheduled | Cancelled)
                | (Rescheduled, Scheduled | InProgress | Cancelled)
                | (InProgress, Completed | Cancelled)
        )
    }
}

text_enum!(TaskStatus {
    Pending => "pending",
    InProgress => "in_progress",
    Completed => "completed",
    Cancelled => "cancelled",
    Blocked => "blocked",
});

impl StateMachine for TaskStatus {
    const ENTITY: &'static str = "installation task";

    fn can_transition_to(self, next: Self) -> bool {
        use TaskStatus::*;
        matches!(
            (self, next),
            (Pending, InProgress | Blocked | Cancelled)
                | (Blocked, Pending | InProgress | Cancelled)
                | (InProgress, Completed | Blocked | Cancelled)
        )
    }
}

text_enum!(ClosureStatus {
    Pending => "pending",
    Approved => "approved",
    Closed => "closed",
    Reopened => "reopened",
});

impl StateMachine for ClosureStatus {
    const ENTITY: &'static str = "service closure";

    fn can_transition_to(self, next: Self) -> bool {
        use ClosureStatus::*;
        matches!(
            (self, next),
            (Pending, Approved | Closed) | (Approved, Closed) | (Closed, Reopened) | (Reopened, Pending)
        )
    }
}

text_enum!(FeedbackStatus {
    Submitted => "submitted",
    Reviewed => "reviewed",
    Responded => "responded",
    Closed => "closed",
});

impl StateMachine for FeedbackStatus {
    const ENTITY: &'static str = "customer feedback";

    fn can_transition_to(self, next: Self) -> bool {
        use FeedbackStatus::*;
        matches!(
            (self, next),
            (Submitted, Reviewed) | (Reviewed, Responded | Closed) | (Responded, Closed)
        )
    }
}

text_enum!(SlaStatus {
    Pending => "pending",
    Met => "met",
    Breached => "breached",
});

text_enum!(SatisfactionLevel {
    VerySatisfied => "very_satisfied",
    Satisfied => "satisfied",
    Neutral => "neutral",
    Dissatisfied => "dissatisfied",
    VeryDissatisfied => "very_dissatisfied",
});

#[cfg(test)]
mod tests {
    use super::*;

    fn reachable<S: StateMachine>(all: &[S], from: S) -> Vec<String> {
        all.iter()
            .copied()
            .filter(|next| from.can_transition_to(*next))
            .map(|next| next.to_string())
            .collect()
    }

    #[test]
    fn parses_and_prints_round_values() {
        assert_eq!("in_transit".parse::<DispatchStatus>().unwrap(), DispatchStatus::InTransit);
        assert_eq!(JobStatus::Rescheduled.to_string(), "rescheduled");
        let err = "shipped".parse::<DispatchStatus>().unwrap_err();
        assert_eq!(err.kind, "DispatchStatus");
        assert_eq!(err.value, "shipped");
    }

    #[test]
    fn serde_uses_snake_case_text() {
        let json = serde_json::to_string(&TicketStatus::InProgress).unwrap();
        assert_eq!(json, "\"in_progress\"");
        let parsed: SatisfactionLevel = serde_json::from_str("\"very_dissatisfied\"").unwrap();
        assert_eq!(parsed, SatisfactionLevel::VeryDissatisfied);
        assert!(serde_json::from_str::<Priority>("\"critical\"").is_err());
    }

    #[test]
    fn dispatch_cannot_go_backwards() {
        assert!(DispatchStatus::Pending.can_transition_to(DispatchStatus::InTransit));
        assert!(DispatchStatus::InTransit.can_transition_to(DispatchStatus::Delivered));
        assert!(!DispatchStatus::Delivered.can_transition_to(DispatchStatus::Pending));
        assert!(!DispatchStatus::Pending.can_transition_to(DispatchStatus::Delivered));
        assert!(reachable(DispatchStatus::ALL, DispatchStatus::Cancelled).is_empty());
    }

    #[test]
    fn dispatch_items_only_move_forward() {
        assert!(DispatchItemStatus::Pending.can_transition_to(DispatchItemStatus::Dispatched));
        assert!(!DispatchItemStatus::Delivered.can_transition_to(DispatchItemStatus::Packed));
        assert!(!DispatchItemStatus::Packed.can_transition_to(DispatchItemStatus::Packed));
    }

    #[test]
    fn job_terminal_states_have_no_exits() {
        assert!(reachable(JobStatus::ALL, JobStatus::Completed).is_empty());
        assert!(reachable(JobStatus::ALL, JobStatus::Cancelled).is_empty());
        assert_eq!(
            reachable(JobStatus::ALL, JobStatus::Rescheduled),
            vec!["scheduled", "in_progress", "cancelled"]
        );
        assert!(!JobStatus::Scheduled.can_transition_to(JobStatus::Completed));
    }

    #[test]
    fn blocked_tasks_can_resume() {
        assert!(TaskStatus::Blocked.can_transition_to(TaskStatus::InProgress));
        assert!(TaskStatus::InProgress.can_transition_to(TaskStatus::Blocked));
        assert!(!TaskStatus::Completed.can_transition_to(TaskStatus::InProgress));
        assert!(!TaskStatus::Pending.can_transition_to(TaskStatus::Completed));
    }

    #[test]
    fn ticket_table_matches_lifecycle() {
        assert_eq!(
            reachable(TicketStatus::ALL, TicketStatus::Resolved),
            vec!["in_progress", "closed"]
        );
        assert!(reachable(TicketStatus::ALL, TicketStatus::Closed).is_empty());
        assert!(!TicketStatus::Open.can_transition_to(TicketStatus::Closed));
    }

    #[test]
    fn closure_reopen_cycle() {
        assert!(ClosureStatus::Closed.can_transition_to(ClosureStatus::Reopened));
        assert!(ClosureStatus::Reopened.can_transition_to(ClosureStatus::Pending));
        assert!(!ClosureStatus::Approved.can_transition_to(ClosureStatus::Pending));
        assert!(!ClosureStatus::Closed.can_transition_to(ClosureStatus::Approved));
    }

    #[test]
    fn feedback_review_flow() {
        assert!(FeedbackStatus::Submitted.can_transition_to(FeedbackStatus::Reviewed));
        assert!(FeedbackStatus::Reviewed.can_transition_to(FeedbackStatus::Closed));
        assert!(!FeedbackStatus::Submitted.can_transition_to(FeedbackStatus::Responded));
    }
}
