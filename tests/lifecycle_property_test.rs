//! Property tests for the activity lifecycle state machine.

mod common;

use activity_engine::domain::models::ActivityStatus;
use activity_engine::domain::ports::ActivityLogFilter;
use activity_engine::DomainError;
use chrono::Duration;
use common::{engine, login_activity, t0};
use proptest::prelude::*;

#[derive(Debug, Clone, Copy)]
enum Op {
    Publish,
    Start,
    Pause,
    Resume,
    Complete,
    Cancel,
}

impl Op {
    /// Status reached when `op` is legal from `from`.
    fn expected(self, from: ActivityStatus) -> Option<ActivityStatus> {
        use ActivityStatus::*;
        match (self, from) {
            (Op::Publish, Draft) => Some(Pending),
            (Op::Start, Pending) => Some(Active),
            (Op::Pause, Active) => Some(Paused),
            (Op::Resume, Paused) => Some(Active),
            (Op::Complete, Active | Paused) => Some(Completed),
            (Op::Cancel, Draft | Pending | Paused) => Some(Cancelled),
            _ => None,
        }
    }
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        Just(Op::Publish),
        Just(Op::Start),
        Just(Op::Pause),
        Just(Op::Resume),
        Just(Op::Complete),
        Just(Op::Cancel),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn only_table_transitions_succeed(ops in proptest::collection::vec(op_strategy(), 1..12)) {
        tokio_test::block_on(async {
            let te = engine(Vec::new()).await;
            let service = te.engine.activities();
            let now = t0() + Duration::hours(1);
            let id = service.create(login_activity(10), now).await.unwrap().id;

            let mut status = ActivityStatus::Draft;
            let mut successes = 0;
            for op in ops {
                let result = match op {
                    Op::Publish => service.publish(id, now).await,
                    Op::Start => service.start(id, now).await,
                    Op::Pause => service.pause(id, now).await,
                    Op::Resume => service.resume(id, now).await,
                    Op::Complete => service.complete(id, now).await,
                    Op::Cancel => service.cancel(id, now).await,
                };

                match (op.expected(status), result) {
                    (Some(next), Ok(activity)) => {
                        assert_eq!(activity.status, next, "{op:?} from {status}");
                        status = next;
                        successes += 1;
                    }
                    (None, Err(DomainError::InvalidTransition { from, .. })) => {
                        assert_eq!(from, status, "{op:?} rejected from the wrong state");
                    }
                    (expected, other) => panic!("{op:?} from {status}: expected {expected:?}, got {other:?}"),
                }
                assert_eq!(service.get(id).await.unwrap().status, status);
            }

            let logs = te
                .engine
                .logs()
                .list(ActivityLogFilter { activity_id: Some(id), ..Default::default() })
                .await
                .unwrap();
            assert_eq!(logs.len(), 1 + successes, "one create entry plus one per transition");
        });
    }

    #[test]
    fn terminal_states_have_no_exits(target in proptest::sample::select(ActivityStatus::ALL.to_vec())) {
        for terminal in [ActivityStatus::Completed, ActivityStatus::Cancelled] {
            prop_assert!(!terminal.can_transition_to(target));
        }
    }
}
