//! Cooperative scheduling for imports.
//!
//! An [`ImportTask`] runs a queue of phases over a shared state, one bounded
//! step per [`advance`](ImportTask::advance). Hosts call it once per frame or
//! in a loop. Nothing here blocks or spawns threads.

use std::{
    collections::VecDeque,
    fmt::{self, Debug, Formatter},
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    task::Poll,
};

use log::{debug, error};

use crate::error::ImportError;

/// Result of one phase step. `Ready(Some(_))` is only meaningful for the
/// last phase.
pub type Step<R> = Result<Poll<Option<R>>, ImportError>;

pub trait Phase<S, R> {
    fn resume(&mut self, state: &mut S) -> Step<R>;
}

impl<S, R, F> Phase<S, R> for F
where
    F: FnMut(&mut S) -> Step<R>,
{
    fn resume(&mut self, state: &mut S) -> Step<R> {
        self(state)
    }
}

/// Outcome of a single [`ImportTask::advance`] call.
pub enum TaskStatus<R> {
    Running,
    Completed(R),
    Aborted,
    Failed(ImportError),
    /// The task already ended on an earlier call.
    Finished,
}

impl<R> Debug for TaskStatus<R> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            TaskStatus::Running => write!(f, "Running"),
            TaskStatus::Completed(_) => write!(f, "Completed"),
            TaskStatus::Aborted => write!(f, "Aborted"),
            TaskStatus::Failed(error) => write!(f, "Failed({})", error),
            TaskStatus::Finished => write!(f, "Finished"),
        }
    }
}

/// Shared abort flag, checked before every step.
#[derive(Debug, Clone, Default)]
pub struct AbortHandle(Arc<AtomicBool>);

impl AbortHandle {
    pub fn abort(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_aborted(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

type CompletedHandler<R> = Box<dyn FnMut(&R)>;
type AbortedHandler<S> = Box<dyn FnMut(&mut S)>;
type ExceptionHandler<S> = Box<dyn FnMut(&mut S, &ImportError)>;

pub struct ImportTask<S, R> {
    state: S,
    phases: VecDeque<(&'static str, Box<dyn Phase<S, R>>)>,
    abort: AbortHandle,
    finished: bool,
    on_completed: Vec<CompletedHandler<R>>,
    on_aborted: Vec<AbortedHandler<S>>,
    on_exception: Vec<ExceptionHandler<S>>,
}

impl<S, R> ImportTask<S, R> {
    pub fn new(state: S) -> Self {
        Self {
            state,
            phases: VecDeque::new(),
            abort: AbortHandle::default(),
            finished: false,
            on_completed: Vec::new(),
            on_aborted: Vec::new(),
            on_exception: Vec::new(),
        }
    }

    pub fn add_phase(&mut self, name: &'static str, phase: impl Phase<S, R> + 'static) {
        self.phases.push_back((name, Box::new(phase)));
    }

    pub fn on_completed(&mut self, handler: impl FnMut(&R) + 'static) {
        self.on_completed.push(Box::new(handler));
    }

    /// Handlers run in registration order when the task is aborted.
    pub fn on_aborted(&mut self, handler: impl FnMut(&mut S) + 'static) {
        self.on_aborted.push(Box::new(handler));
    }

    /// Handlers run in registration order when a phase fails, before the
    /// failure is returned from `advance`.
    pub fn on_exception(&mut self, handler: impl FnMut(&mut S, &ImportError) + 'static) {
        self.on_exception.push(Box::new(handler));
    }

    pub fn state(&self) -> &S {
        &self.state
    }

    pub fn state_mut(&mut self) -> &mut S {
        &mut self.state
    }

    pub fn abort_handle(&self) -> AbortHandle {
        self.abort.clone()
    }

    /// Requests an abort. It takes effect on the next `advance`.
    pub fn abort(&self) {
        self.abort.abort();
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Name of the phase the next step will run.
    pub fn current_phase(&self) -> Option<&'static str> {
        self.phases.front().map(|(name, _)| *name)
    }

    /// Runs one step of the current phase.
    pub fn advance(&mut self) -> TaskStatus<R> {
        if self.finished {
            return TaskStatus::Finished;
        }
        if self.abort.is_aborted() {
            debug!("Import aborted before phase {:?}", self.current_phase());
            self.finished = true;
            for handler in &mut self.on_aborted {
                handler(&mut self.state);
            }
            return TaskStatus::Aborted;
        }
        let Some((name, phase)) = self.phases.front_mut() else {
            return self.fail(ImportError::MissingResult);
        };
        let name = *name;
        match phase.resume(&mut self.state) {
            Ok(Poll::Pending) => TaskStatus::Running,
            Ok(Poll::Ready(value)) => {
                debug!("Import phase {} done", name);
                self.phases.pop_front();
                if !self.phases.is_empty() {
                    return TaskStatus::Running;
                }
                match value {
                    Some(value) => {
                        self.finished = true;
                        for handler in &mut self.on_completed {
                            handler(&value);
                        }
                        TaskStatus::Completed(value)
                    }
                    None => self.fail(ImportError::MissingResult),
                }
            }
            Err(error) => {
                error!("Import phase {} failed: {}", name, error);
                self.fail(error)
            }
        }
    }

    fn fail(&mut self, error: ImportError) -> TaskStatus<R> {
        self.finished = true;
        for handler in &mut self.on_exception {
            handler(&mut self.state, &error);
        }
        TaskStatus::Failed(error)
    }

    /// Advances until the task ends.
    pub fn run_to_end(&mut self) -> TaskStatus<R> {
        loop {
            match self.advance() {
                TaskStatus::Running => continue,
                status => return status,
            }
        }
    }
}

/// A unit of work driven by an [`InterleavedTaskSet`].
pub trait Resumable<C, T> {
    fn resume(&mut self, context: &mut C) -> Result<Poll<T>, ImportError>;
}

impl<C, T, F> Resumable<C, T> for F
where
    F: FnMut(&mut C) -> Result<Poll<T>, ImportError>,
{
    fn resume(&mut self, context: &mut C) -> Result<Poll<T>, ImportError> {
        self(context)
    }
}

type SetCompletedHandler<C, T> = Box<dyn FnMut(&mut C, usize, T) -> Result<(), ImportError>>;

/// Steps several sub-tasks round robin, so a set of tasks finishes after as
/// many advances as its longest member needs.
pub struct InterleavedTaskSet<C, T> {
    tasks: Vec<Option<Box<dyn Resumable<C, T>>>>,
    on_completed: Option<SetCompletedHandler<C, T>>,
    num_completed: usize,
}

impl<C, T> Default for InterleavedTaskSet<C, T> {
    fn default() -> Self {
        Self {
            tasks: Vec::new(),
            on_completed: None,
            num_completed: 0,
        }
    }
}

impl<C, T> InterleavedTaskSet<C, T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, task: impl Resumable<C, T> + 'static) -> usize {
        self.tasks.push(Some(Box::new(task)));
        self.tasks.len() - 1
    }

    /// Called with the index and value of each task as it completes.
    pub fn on_completed(
        &mut self,
        handler: impl FnMut(&mut C, usize, T) -> Result<(), ImportError> + 'static,
    ) {
        self.on_completed = Some(Box::new(handler));
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn num_completed(&self) -> usize {
        self.num_completed
    }

    pub fn is_done(&self) -> bool {
        self.num_completed == self.tasks.len()
    }

    /// Resumes every unfinished task once.
    pub fn advance(&mut self, context: &mut C) -> Result<Poll<()>, ImportError> {
        for (index, slot) in self.tasks.iter_mut().enumerate() {
            let Some(task) = slot else {
                continue;
            };
            if let Poll::Ready(value) = task.resume(context)? {
                *slot = None;
                self.num_completed += 1;
                if let Some(handler) = &mut self.on_completed {
                    handler(context, index, value)?;
                }
            }
        }
        if self.is_done() {
            Ok(Poll::Ready(()))
        } else {
            Ok(Poll::Pending)
        }
    }
}

#[cfg(test)]
mod test {
    use std::{cell::RefCell, rc::Rc};

    use super::*;

    fn countdown(steps: usize) -> impl FnMut(&mut Vec<usize>) -> Result<Poll<usize>, ImportError> {
        let mut left = steps;
        move |_log: &mut Vec<usize>| {
            left -= 1;
            if left == 0 {
                Ok(Poll::Ready(steps))
            } else {
                Ok(Poll::Pending)
            }
        }
    }

    #[test]
    fn interleaved_set_finishes_after_longest_task() {
        let mut set = InterleavedTaskSet::new();
        for latency in [1, 3, 5, 2] {
            set.push(countdown(latency));
        }
        set.on_completed(|log: &mut Vec<usize>, index, value| {
            log.push(index);
            assert!(value > 0);
            Ok(())
        });

        let mut log = Vec::new();
        let mut advances = 0;
        loop {
            advances += 1;
            if set.advance(&mut log).unwrap().is_ready() {
                break;
            }
        }
        assert_eq!(advances, 5);
        assert_eq!(set.num_completed(), 4);
        assert_eq!(log, vec![0, 3, 1, 2]);
    }

    #[test]
    fn empty_set_is_ready() {
        let mut set: InterleavedTaskSet<(), ()> = InterleavedTaskSet::new();
        assert!(set.advance(&mut ()).unwrap().is_ready());
    }

    fn counting_task(total: u32) -> ImportTask<u32, u32> {
        let mut task = ImportTask::new(0);
        task.add_phase("count", move |count: &mut u32| -> Step<u32> {
            *count += 1;
            Ok(if *count < total {
                Poll::Pending
            } else {
                Poll::Ready(None)
            })
        });
        task.add_phase("finish", |count: &mut u32| -> Step<u32> {
            Ok(Poll::Ready(Some(*count * 10)))
        });
        task
    }

    #[test]
    fn runs_phases_in_order() {
        let completed = Rc::new(RefCell::new(None));
        let mut task = counting_task(3);
        let sink = completed.clone();
        task.on_completed(move |value| *sink.borrow_mut() = Some(*value));

        let mut steps = 0;
        let result = loop {
            steps += 1;
            match task.advance() {
                TaskStatus::Running => {}
                TaskStatus::Completed(value) => break value,
                status => panic!("unexpected {:?}", status),
            }
        };
        assert_eq!(result, 30);
        assert_eq!(steps, 4);
        assert_eq!(*completed.borrow(), Some(30));
        assert!(matches!(task.advance(), TaskStatus::Finished));
    }

    #[test]
    fn abort_fires_handlers_once() {
        let aborted = Rc::new(RefCell::new(0));
        let mut task = counting_task(10);
        let counter = aborted.clone();
        task.on_aborted(move |state| {
            *state = 0;
            *counter.borrow_mut() += 1;
        });
        task.on_completed(|_| panic!("aborted task must not complete"));

        assert!(matches!(task.advance(), TaskStatus::Running));
        task.abort_handle().abort();
        assert!(matches!(task.advance(), TaskStatus::Aborted));
        assert!(matches!(task.advance(), TaskStatus::Finished));
        assert_eq!(*aborted.borrow(), 1);
        assert_eq!(*task.state(), 0);
    }

    #[test]
    fn failure_reaches_exception_handlers_first() {
        let seen = Rc::new(RefCell::new(String::new()));
        let mut task: ImportTask<(), ()> = ImportTask::new(());
        task.add_phase("fail", |_: &mut ()| -> Step<()> {
            Err(ImportError::MissingDefaultScene)
        });
        let log = seen.clone();
        task.on_exception(move |_, error| *log.borrow_mut() = error.to_string());

        let TaskStatus::Failed(error) = task.advance() else {
            panic!("phase failure must fail the task");
        };
        assert!(matches!(error, ImportError::MissingDefaultScene));
        assert_eq!(*seen.borrow(), error.to_string());
    }

    #[test]
    fn last_phase_must_produce_a_result() {
        let mut task: ImportTask<(), ()> = ImportTask::new(());
        task.add_phase("empty", |_: &mut ()| -> Step<()> { Ok(Poll::Ready(None)) });
        assert!(matches!(
            task.run_to_end(),
            TaskStatus::Failed(ImportError::MissingResult)
        ));
    }
}
