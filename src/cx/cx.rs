//! The instruction handle given to every operation.
//!
//! `Cx` is the only way an operation reaches its block. Each method returns
//! a future that, when awaited from inside the operation, hands one
//! instruction to the block and resumes with the handler's result:
//!
//! | Method | Instruction | Resumes with |
//! |--------|-------------|--------------|
//! | [`suspend`](Cx::suspend) | `suspend` | the halted error, once the block is aborted |
//! | [`action`](Cx::action) | `action` | the value passed to `resolve`, or the error |
//! | [`resource`](Cx::resource) | `resource` | the provided value |
//! | [`spawn`](Cx::spawn) | `spawn` | a supervised [`Task`] |
//! | [`go`](Cx::go) | `spawn` (unsupervised) | a [`Task`] over the child's `Result` |
//! | [`get_frame`](Cx::get_frame) | `get-frame` | the block's [`Frame`] |
//!
//! Instruction futures must be awaited by the operation that owns the `Cx`.
//! Awaiting one anywhere else (a foreign executor, a detached job) fails with
//! a protocol violation, as does awaiting two at once.

use std::fmt;
use std::future::Future as StdFuture;
use std::rc::Rc;

use super::{Context, Scope};
use crate::error::Result;
use crate::instruction::spawn::Spawned;
use crate::instruction::{
    Instruct, Instruction, NestedBody, Provide, Reject, Resolve, Settlement, SharedSlot,
};
use crate::runtime::block::{BoxOperation, OperationFactory};
use crate::runtime::{Frame, Task};
use crate::types::{BlockId, FrameId};

/// The instruction handle of one block.
#[derive(Clone)]
pub struct Cx {
    frame: FrameId,
    block: BlockId,
    slot: SharedSlot,
}

impl fmt::Debug for Cx {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cx")
            .field("frame", &self.frame)
            .field("block", &self.block)
            .finish()
    }
}

impl Cx {
    pub(crate) fn new(frame: FrameId, block: BlockId, slot: SharedSlot) -> Self {
        Self { frame, block, slot }
    }

    /// The frame this operation runs in.
    #[must_use]
    pub fn frame_id(&self) -> FrameId {
        self.frame
    }

    /// The block driving this operation.
    #[must_use]
    pub fn block_id(&self) -> BlockId {
        self.block
    }

    fn instruct<T>(&self, instruction: Instruction) -> Instruct<T> {
        Instruct::new(Rc::clone(&self.slot), instruction)
    }

    /// Parks until the block is aborted, then resumes with the halted error.
    ///
    /// Code after the await runs as cleanup; it may issue further
    /// instructions but can no longer be aborted.
    pub fn suspend(&self) -> Instruct<()> {
        self.instruct(Instruction::Suspend)
    }

    /// The frame this operation runs in.
    pub fn get_frame(&self) -> Instruct<Frame> {
        self.instruct(Instruction::GetFrame)
    }

    /// Runs `body` in a child frame until it resolves or rejects.
    ///
    /// The child frame is torn down before the result is delivered, so
    /// anything `body` started is finished by then. A body that returns
    /// without settling fails the action with a protocol violation; one that
    /// returns an error fails it with that error.
    pub fn action<T, F, Fut>(&self, body: F) -> Instruct<T>
    where
        T: 'static,
        F: FnOnce(Cx, Resolve<T>, Reject) -> Fut + 'static,
        Fut: StdFuture<Output = Result<()>> + 'static,
    {
        let nested: NestedBody = Box::new(move |settlement: Rc<Settlement>| {
            let factory: OperationFactory<()> = Box::new(move |cx: Cx| {
                let resolve = Resolve::new(Rc::clone(&settlement));
                let reject = Reject::new(settlement);
                let operation: BoxOperation<()> = Box::pin(body(cx, resolve, reject));
                operation
            });
            factory
        });
        self.instruct(Instruction::Action(nested))
    }

    /// Acquires a value from `body`, which keeps running until this frame
    /// is torn down.
    ///
    /// `body` hands its value over with [`Provide::provide`], which parks it;
    /// its code after that await is the resource's release logic. If the body
    /// later fails, this operation's frame is crashed.
    pub fn resource<T, F, Fut>(&self, body: F) -> Instruct<T>
    where
        T: 'static,
        F: FnOnce(Cx, Provide<T>) -> Fut + 'static,
        Fut: StdFuture<Output = Result<()>> + 'static,
    {
        let nested: NestedBody = Box::new(move |settlement: Rc<Settlement>| {
            let factory: OperationFactory<()> = Box::new(move |cx: Cx| {
                let provide = Provide::new(settlement, cx.clone());
                let operation: BoxOperation<()> = Box::pin(body(cx, provide));
                operation
            });
            factory
        });
        self.instruct(Instruction::Resource(nested))
    }

    /// Starts `operation` in a child frame and returns its task at once.
    ///
    /// Supervised: if the child fails, or its frame fails to tear down, this
    /// operation's frame is crashed with that error.
    pub fn spawn<T, F, Fut>(&self, operation: F) -> Instruct<Task<T>>
    where
        T: Clone + 'static,
        F: FnOnce(Cx) -> Fut + 'static,
        Fut: StdFuture<Output = Result<T>> + 'static,
    {
        self.instruct(Instruction::Spawn {
            body: spawn_body(operation),
            supervised: true,
        })
    }

    /// Like [`spawn`](Self::spawn), but never crashes this frame.
    ///
    /// The returned task resolves with the child's `Result` whatever it is.
    pub fn go<T, F, Fut>(&self, operation: F) -> impl StdFuture<Output = Result<Task<Result<T>>>>
    where
        T: Clone + 'static,
        F: FnOnce(Cx) -> Fut + 'static,
        Fut: StdFuture<Output = Result<T>> + 'static,
    {
        let spawned: Instruct<Task<T>> = self.instruct(Instruction::Spawn {
            body: spawn_body(operation),
            supervised: false,
        });
        async move { Ok(spawned.await?.into_outcome()) }
    }

    /// Awaits a future from outside the runtime through an action.
    ///
    /// If this block is aborted meanwhile, `future` is dropped.
    pub fn expect<T, Fut>(&self, future: Fut) -> Instruct<T>
    where
        T: 'static,
        Fut: StdFuture<Output = Result<T>> + 'static,
    {
        self.action(move |_cx, resolve, reject| async move {
            match future.await {
                Ok(value) => resolve.resolve(value),
                Err(err) => reject.reject(err),
            }
            Ok(())
        })
    }

    /// A scope over this operation's own frame.
    pub fn use_scope(&self) -> impl StdFuture<Output = Result<Scope>> {
        let frame = self.get_frame();
        async move { Ok(Scope::new(frame.await?)) }
    }

    /// Looks `key` up from this frame towards the root.
    pub async fn context<T: Clone + 'static>(&self, key: &Context<T>) -> Result<Option<T>> {
        let frame = self.get_frame().await?;
        Ok(frame.context(key))
    }

    /// Sets `key` on this frame; children see it, ancestors do not.
    pub async fn set_context<T: 'static>(&self, key: &Context<T>, value: T) -> Result<()> {
        let frame = self.get_frame().await?;
        frame.set_context(key, value)
    }
}

fn spawn_body<T, F, Fut>(operation: F) -> crate::instruction::SpawnBody
where
    T: Clone + 'static,
    F: FnOnce(Cx) -> Fut + 'static,
    Fut: StdFuture<Output = Result<T>> + 'static,
{
    Box::new(move |child: &Frame| {
        let block = child.run(operation)?;
        let exhausted = block.exhausted();
        let task = Task::for_frame(child.clone(), block.clone());
        block.enter();
        Ok(Spawned {
            task: Box::new(task),
            exhausted,
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{Error, ErrorKind};
    use crate::test_utils::{init_test_logging, test_runtime};

    #[test]
    fn get_frame_returns_own_frame() {
        init_test_logging();
        let runtime = test_runtime();
        let task = runtime.run(|cx| async move {
            let frame = cx.get_frame().await?;
            Ok(frame.id() == cx.frame_id())
        });
        assert!(runtime.block_on(&task).expect("run"));
    }

    #[test]
    fn expect_bridges_foreign_future() {
        init_test_logging();
        let runtime = test_runtime();
        let (future, settle) = crate::sync::Future::<u32>::create();
        runtime.handle().set_timeout(std::time::Duration::from_millis(5), move || {
            settle.resolve(9);
        });
        let task = runtime.run(move |cx| async move { cx.expect(future).await });
        assert_eq!(runtime.block_on(&task).expect("run"), 9);
    }

    #[test]
    fn instruction_outside_its_block_is_rejected() {
        init_test_logging();
        let runtime = test_runtime();
        let leaked = Rc::new(std::cell::RefCell::new(None));
        let store = Rc::clone(&leaked);
        let task = runtime.run(move |cx| async move {
            *store.borrow_mut() = Some(cx);
            Ok(())
        });
        runtime.block_on(&task).expect("run");
        let cx = leaked.borrow_mut().take().expect("cx");
        let probe = runtime.handle().create_scope().expect("scope");
        let escaped = probe.run(move |_inner| async move {
            cx.suspend().await?;
            Ok(())
        });
        let err = runtime.block_on(&escaped).expect_err("foreign await");
        assert_eq!(err.kind(), ErrorKind::ProtocolViolation);
    }

    #[test]
    fn context_inherits_and_shadows() {
        init_test_logging();
        static ROLE: Context<&'static str> = Context::new("role");
        let runtime = test_runtime();
        let task = runtime.run(|cx| async move {
            cx.set_context(&ROLE, "parent").await?;
            let seen_in_child = cx
                .action(|child, resolve, _reject| async move {
                    let inherited = child.context(&ROLE).await?;
                    child.set_context(&ROLE, "child").await?;
                    let shadowed = child.context(&ROLE).await?;
                    resolve.resolve((inherited, shadowed));
                    Ok(())
                })
                .await?;
            let after = cx.context(&ROLE).await?;
            Ok((seen_in_child, after))
        });
        let ((inherited, shadowed), after) = runtime.block_on(&task).expect("run");
        assert_eq!(inherited, Some("parent"));
        assert_eq!(shadowed, Some("child"));
        assert_eq!(after, Some("parent"));
    }

    #[test]
    fn go_never_crashes_the_parent() {
        init_test_logging();
        let runtime = test_runtime();
        let task = runtime.run(|cx| async move {
            let child = cx
                .go(|_cx| async { Err::<u8, _>(Error::user("child failed")) })
                .await?;
            let outcome = child.await?;
            Ok(outcome.is_err())
        });
        assert!(runtime.block_on(&task).expect("parent survives"));
    }
}
