//! `run` and `action` semantics end to end.

#[macro_use]
mod common;

use common::*;
use corral::{Error, ErrorKind};

#[test]
fn run_resolves_to_returned_value() {
    init_test_logging();
    test_phase!("run_resolves_to_returned_value");
    let runtime = test_runtime();
    let task = runtime.run(|_cx| async { Ok(42) });
    assert_eq!(runtime.block_on(&task).expect("run"), 42);
    assert!(runtime.is_quiescent());
    test_complete!("run_resolves_to_returned_value");
}

#[test]
fn action_resolves_with_value() {
    init_test_logging();
    let runtime = test_runtime();
    let task = runtime.run(|cx| async move {
        let word = cx
            .action(|_cx, resolve, _reject| async move {
                resolve.resolve(String::from("moo"));
                Ok(())
            })
            .await?;
        Ok(word.len())
    });
    assert_eq!(runtime.block_on(&task).expect("run"), 3);
}

#[test]
fn unsettled_action_is_protocol_violation() {
    init_test_logging();
    let runtime = test_runtime();
    let task = runtime.run(|cx| async move {
        cx.action::<u8, _, _>(|_cx, _resolve, _reject| async { Ok(()) })
            .await
    });
    let err = runtime.block_on(&task).expect_err("violation");
    assert_eq!(err.kind(), ErrorKind::ProtocolViolation);
    assert!(err.message().is_some_and(|m| m.contains("resolve")));
}

#[test]
fn action_rejects_with_error() {
    init_test_logging();
    let runtime = test_runtime();
    let task = runtime.run(|cx| async move {
        cx.action::<u8, _, _>(|_cx, _resolve, reject| async move {
            reject.reject(Error::user("nope"));
            Ok(())
        })
        .await
    });
    let err = runtime.block_on(&task).expect_err("rejected");
    assert_eq!(err.message(), Some("nope"));
}

#[test]
fn action_body_error_fails_action() {
    init_test_logging();
    let runtime = test_runtime();
    let task = runtime.run(|cx| async move {
        let caught = cx
            .action::<u8, _, _>(|_cx, _resolve, _reject| async {
                Err(Error::user("body failed"))
            })
            .await;
        Ok(caught.expect_err("failed").message().map(String::from))
    });
    assert_eq!(
        runtime.block_on(&task).expect("caught"),
        Some("body failed".to_string())
    );
}

#[test]
fn first_settlement_wins_inside_action() {
    init_test_logging();
    let runtime = test_runtime();
    let task = runtime.run(|cx| async move {
        cx.action(|_cx, resolve, reject| async move {
            resolve.resolve(1_u8);
            resolve.resolve(2);
            reject.reject(Error::user("late"));
            Ok(())
        })
        .await
    });
    assert_eq!(runtime.block_on(&task).expect("run"), 1);
}

#[test]
fn failing_cleanup_supersedes_success() {
    init_test_logging();
    let runtime = test_runtime();
    let task = runtime.run(|cx| async move {
        cx.resource(|_cx, provide| async move {
            let _ = provide.provide(1_u8).await;
            Err(Error::user("cleanup failed"))
        })
        .await?;
        Ok(5)
    });
    let err = runtime.block_on(&task).expect_err("teardown failure wins");
    assert_eq!(err.message(), Some("cleanup failed"));
    assert!(runtime.is_quiescent());
}

#[test]
fn action_cleanup_finishes_before_result() {
    init_test_logging();
    let runtime = test_runtime();
    let log = std::rc::Rc::new(std::cell::RefCell::new(Vec::new()));
    let inner_log = std::rc::Rc::clone(&log);
    let task = runtime.run(move |cx| async move {
        let body_log = std::rc::Rc::clone(&inner_log);
        let value = cx
            .action(move |cx, resolve, _reject| async move {
                resolve.resolve(7_u8);
                let _ = cx.suspend().await;
                body_log.borrow_mut().push("body cleanup");
                Ok(())
            })
            .await?;
        inner_log.borrow_mut().push("caller resumed");
        Ok(value)
    });
    assert_eq!(runtime.block_on(&task).expect("run"), 7);
    assert_eq!(*log.borrow(), vec!["body cleanup", "caller resumed"]);
}
