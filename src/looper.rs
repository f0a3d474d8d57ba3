//! Run-on-one-thread handoff.
//!
//! A [`Looper`] owns a message queue that only its own thread drains. Any
//! thread can post work to it through a [`Handler`]. Bind a promise chain to
//! that thread with `promise.on(&Runtime::new(handler))` and its
//! continuations run wherever the looper is being driven, typically a UI or
//! main thread.
//!
//! ```
//! use promise_kit::{Looper, Promise, Runtime};
//!
//! let (looper, handler) = Looper::new();
//! let main = Runtime::new(handler.clone());
//! let quit = handler.clone();
//!
//! let _ = Promise::resolve(&main, 21)
//!     .then(|v| Ok(v * 2))
//!     .then_accept(move |v| {
//!         assert_eq!(v, 42);
//!         quit.quit();
//!     });
//!
//! looper.run();
//! ```

use std::marker::PhantomData;
use std::rc::Rc;
use std::sync::mpsc::{channel, Receiver, Sender, TryRecvError};
use std::thread::{self, ThreadId};

use tracing::{error, warn};

use crate::error::{panic_message, ScheduleError};
use crate::runtime::{Schedule, Task};

enum Message {
    Run(Task),
    Quit,
}

/// The receiving end. Not `Send`: it stays on the thread that created it.
pub struct Looper {
    receiver: Receiver<Message>,
    thread: ThreadId,
    _not_send: PhantomData<Rc<()>>,
}

/// Posts work to a [`Looper`]'s thread.
#[derive(Debug, Clone)]
pub struct Handler {
    sender: Sender<Message>,
    thread: ThreadId,
}

impl Looper {
    /// Create a looper bound to the current thread.
    pub fn new() -> (Looper, Handler) {
        let (sender, receiver) = channel();
        let thread = thread::current().id();
        (
            Looper {
                receiver,
                thread,
                _not_send: PhantomData,
            },
            Handler { sender, thread },
        )
    }

    /// Run posted tasks until [`Handler::quit`] is called or every handler
    /// has been dropped.
    pub fn run(&self) {
        while let Ok(message) = self.receiver.recv() {
            match message {
                Message::Run(task) => run_task(task),
                Message::Quit => break,
            }
        }
    }

    /// Run whatever is queued right now without blocking. Returns how many
    /// tasks ran. A pending quit request stops the batch early.
    pub fn run_pending(&self) -> usize {
        let mut ran = 0;
        loop {
            match self.receiver.try_recv() {
                Ok(Message::Run(task)) => {
                    run_task(task);
                    ran += 1;
                }
                Ok(Message::Quit) | Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => {
                    return ran
                }
            }
        }
    }

    pub fn thread_id(&self) -> ThreadId {
        self.thread
    }
}

impl Handler {
    pub fn post(&self, task: impl FnOnce() + Send + 'static) -> Result<(), ScheduleError> {
        self.send(Message::Run(Box::new(task)))
    }

    /// Ask [`Looper::run`] to return after the tasks already posted.
    pub fn quit(&self) {
        if self.send(Message::Quit).is_err() {
            warn!("quit posted to a looper that is gone");
        }
    }

    /// True when called on the looper's own thread.
    pub fn is_current(&self) -> bool {
        thread::current().id() == self.thread
    }

    fn send(&self, message: Message) -> Result<(), ScheduleError> {
        self.sender
            .send(message)
            .map_err(|_| ScheduleError::Disconnected)
    }
}

impl Schedule for Handler {
    fn schedule(&self, task: Task) -> Result<(), ScheduleError> {
        self.send(Message::Run(task))
    }
}

fn run_task(task: Task) {
    if let Err(payload) = std::panic::catch_unwind(std::panic::AssertUnwindSafe(task)) {
        error!(panic = %panic_message(&*payload), "looper task panicked");
    }
}
