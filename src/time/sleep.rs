use std::time::Duration;

use crate::cx::Cx;
use crate::instruction::Instruct;
use crate::tracing_compat::trace;
use crate::types::Time;

/// Waits for `duration` on the runtime's clock.
///
/// Implemented as an action: the timer lives in the action's child frame and
/// is cleared when that frame tears down, including when the caller is
/// halted mid-sleep.
pub fn sleep(cx: &Cx, duration: Duration) -> Instruct<()> {
    timed(cx, move |_now| duration)
}

/// Waits until the runtime's clock reads `deadline`.
///
/// Returns on the next turn if the deadline already passed.
pub fn sleep_until(cx: &Cx, deadline: Time) -> Instruct<()> {
    timed(cx, move |now| deadline.saturating_since(now))
}

fn timed(cx: &Cx, delay: impl FnOnce(Time) -> Duration + 'static) -> Instruct<()> {
    cx.action(move |cx, resolve, _reject| async move {
        let handle = cx.get_frame().await?.handle();
        let duration = delay(handle.now());
        let timer = handle.set_timeout(duration, move || resolve.resolve(()));
        trace!(frame = %cx.frame_id(), ?duration, "sleeping");
        let _ = cx.suspend().await;
        handle.clear_timeout(timer);
        Ok(())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{init_test_logging, test_runtime};

    #[test]
    fn sleep_advances_virtual_clock() {
        init_test_logging();
        let runtime = test_runtime();
        let task = runtime.run(|cx| async move {
            sleep(&cx, Duration::from_millis(250)).await?;
            sleep(&cx, Duration::from_millis(250)).await?;
            Ok(())
        });
        runtime.block_on(&task).expect("slept");
        assert_eq!(runtime.now(), Time::from_millis(500));
        assert!(runtime.is_quiescent());
    }

    #[test]
    fn sleep_until_past_deadline_is_immediate() {
        init_test_logging();
        let runtime = test_runtime();
        let task = runtime.run(|cx| async move {
            sleep(&cx, Duration::from_millis(10)).await?;
            sleep_until(&cx, Time::from_millis(5)).await?;
            sleep_until(&cx, Time::from_millis(30)).await
        });
        runtime.block_on(&task).expect("slept");
        assert_eq!(runtime.now(), Time::from_millis(30));
    }
}
