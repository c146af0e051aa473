// src/flux/mod.rs

//! Cooperative step computations.
//!
//! A computation is an ordered list of *elements*: step closures, nested
//! sequential lists, and parallel groups whose members all start together
//! and are joined through a [`Barrier`]. Each step receives a [`Step`]
//! control handle and must advance it exactly once, either synchronously or
//! later from an asynchronous callback (timer, process exit, file IO) the
//! handle was moved into. The computation's end callback fires exactly once
//! after the last step advanced and every parallel group settled.
//!
//! The driver is iterative: a step advancing synchronously from inside its
//! own invocation sets a pending flag instead of recursing, so arbitrarily
//! long synchronous chains run in constant stack space. Advancing a step
//! twice is a usage error: it is reported through `tracing::error!` and
//! ignored, leaving the computation's state intact.

pub mod barrier;

pub use barrier::Barrier;

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use tracing::error;

/// A single step closure.
pub type StepFn<C> = Box<dyn FnOnce(Step<C>) + Send>;

/// Building block of a computation.
pub enum Element<C> {
    /// One step.
    Action(StepFn<C>),
    /// Steps run one after another (splice point for sub-computations).
    Sequence(Vec<Element<C>>),
    /// Members started together; the computation resumes only once every
    /// member has finished.
    Parallel(Vec<Element<C>>),
}

impl<C: Send + 'static> Element<C> {
    pub fn step(f: impl FnOnce(Step<C>) + Send + 'static) -> Self {
        Element::Action(Box::new(f))
    }
}

/// A pre-built list of elements, spliced into another computation or run
/// on its own.
pub struct Computation<C> {
    elements: Vec<Element<C>>,
}

impl<C: Send + 'static> Computation<C> {
    pub fn new() -> Self {
        Self {
            elements: Vec::new(),
        }
    }

    pub fn push(&mut self, element: Element<C>) -> &mut Self {
        self.elements.push(element);
        self
    }

    pub fn start(
        self,
        context: C,
        at_end: impl FnOnce(Flux<C>) + Send + 'static,
    ) -> Flux<C> {
        run(context, self.elements, at_end)
    }
}

impl<C: Send + 'static> Default for Computation<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C> From<Computation<C>> for Element<C> {
    fn from(computation: Computation<C>) -> Self {
        Element::Sequence(computation.elements)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Status {
    Started,
    Aborted,
    Terminated,
}

struct FluxState<C> {
    actions: VecDeque<StepFn<C>>,
    status: Status,
    end: Option<Box<dyn FnOnce(Flux<C>) + Send>>,
    /// A step closure is currently on the stack.
    executing: bool,
    /// `advance` was requested while `executing`; the driver loops instead
    /// of recursing.
    pending: bool,
}

/// A running computation. Cloning yields another handle to the same
/// computation; the context is shared with parallel group members.
pub struct Flux<C> {
    context: Arc<Mutex<C>>,
    state: Arc<Mutex<FluxState<C>>>,
}

impl<C> Clone for Flux<C> {
    fn clone(&self) -> Self {
        Self {
            context: Arc::clone(&self.context),
            state: Arc::clone(&self.state),
        }
    }
}

/// Start a computation over `context`, invoking `at_end` exactly once when
/// the element list is exhausted (or the computation was aborted).
pub fn run<C: Send + 'static>(
    context: C,
    elements: Vec<Element<C>>,
    at_end: impl FnOnce(Flux<C>) + Send + 'static,
) -> Flux<C> {
    let flux = Flux::with_shared_context(Arc::new(Mutex::new(context)), elements, Some(Box::new(at_end)));
    flux.advance();
    flux
}

impl<C: Send + 'static> Flux<C> {
    fn with_shared_context(
        context: Arc<Mutex<C>>,
        elements: Vec<Element<C>>,
        end: Option<Box<dyn FnOnce(Flux<C>) + Send>>,
    ) -> Self {
        let mut actions = Vec::new();
        compile(elements, &mut actions);
        Self {
            context,
            state: Arc::new(Mutex::new(FluxState {
                actions: actions.into(),
                status: Status::Started,
                end,
                executing: false,
                pending: false,
            })),
        }
    }

    /// Access the shared computation context.
    pub fn with<R>(&self, f: impl FnOnce(&mut C) -> R) -> R {
        f(&mut self.context.lock().unwrap())
    }

    fn prepend(&self, elements: Vec<Element<C>>) {
        let mut compiled = Vec::new();
        compile(elements, &mut compiled);
        let mut state = self.state.lock().unwrap();
        if state.status == Status::Terminated {
            error!("prepend called on an already-terminated computation");
            return;
        }
        for action in compiled.into_iter().rev() {
            state.actions.push_front(action);
        }
    }

    fn abort(&self) {
        let mut state = self.state.lock().unwrap();
        if state.status == Status::Started {
            state.status = Status::Aborted;
            state.actions.clear();
        }
    }

    fn advance(&self) {
        {
            let mut state = self.state.lock().unwrap();
            if state.executing {
                state.pending = true;
                return;
            }
            state.executing = true;
        }
        loop {
            let next = {
                let mut state = self.state.lock().unwrap();
                state.pending = false;
                if state.status == Status::Aborted {
                    None
                } else {
                    state.actions.pop_front()
                }
            };
            match next {
                Some(action) => {
                    action(Step::new(self.clone()));
                    let mut state = self.state.lock().unwrap();
                    if state.pending {
                        continue;
                    }
                    // The step parked itself in an async callback; its
                    // later advance re-enters this driver.
                    state.executing = false;
                    return;
                }
                None => {
                    let end = {
                        let mut state = self.state.lock().unwrap();
                        if state.status != Status::Aborted {
                            state.status = Status::Terminated;
                        }
                        state.executing = false;
                        state.end.take()
                    };
                    if let Some(end) = end {
                        end(self.clone());
                    }
                    return;
                }
            }
        }
    }
}

/// Control handle given to each step. Clones share the same call-count
/// guard, so a step moved into several callbacks still advances at most
/// once.
pub struct Step<C> {
    flux: Flux<C>,
    used: Arc<AtomicU32>,
}

impl<C> Clone for Step<C> {
    fn clone(&self) -> Self {
        Self {
            flux: self.flux.clone(),
            used: Arc::clone(&self.used),
        }
    }
}

impl<C: Send + 'static> Step<C> {
    fn new(flux: Flux<C>) -> Self {
        Self {
            flux,
            used: Arc::new(AtomicU32::new(0)),
        }
    }

    /// Hand control back to the computation. Must be called exactly once
    /// per step; extra calls are reported and ignored.
    pub fn advance(&self) {
        let calls = self.used.fetch_add(1, Ordering::SeqCst) + 1;
        if calls > 1 {
            error!(calls, "step advanced more than once; ignoring");
            return;
        }
        self.flux.advance();
    }

    /// Queue elements to run before the remainder of the current list.
    /// Loop and conditional constructs are built from this primitive.
    pub fn prepend(&self, elements: Vec<Element<C>>) {
        if self.used.load(Ordering::SeqCst) > 0 {
            error!("prepend called after the step already advanced; ignoring");
            return;
        }
        self.flux.prepend(elements);
    }

    /// Abandon the remaining steps. The end callback still fires once the
    /// step advances.
    pub fn abort(&self) {
        self.flux.abort();
    }

    /// Access the shared computation context.
    pub fn with<R>(&self, f: impl FnOnce(&mut C) -> R) -> R {
        self.flux.with(f)
    }
}

fn compile<C: Send + 'static>(elements: Vec<Element<C>>, out: &mut Vec<StepFn<C>>) {
    for element in elements {
        match element {
            Element::Action(f) => out.push(f),
            Element::Sequence(seq) => compile(seq, out),
            Element::Parallel(members) => out.push(parallel_action(members)),
        }
    }
}

/// A single action that fans out into one sub-computation per member and
/// resumes the parent once all of them finished.
fn parallel_action<C: Send + 'static>(members: Vec<Element<C>>) -> StepFn<C> {
    Box::new(move |step: Step<C>| {
        if members.is_empty() {
            step.advance();
            return;
        }
        let barrier = Barrier::new("parallel-group", members.len() as u64);
        let launched: Vec<Flux<C>> = members
            .into_iter()
            .map(|member| {
                let done = barrier.dec_callback();
                Flux::with_shared_context(
                    Arc::clone(&step.flux.context),
                    vec![member],
                    Some(Box::new(move |_| done())),
                )
            })
            .collect();
        // Launch only after every member is constructed so that a member
        // finishing synchronously cannot complete the barrier early.
        for member in &launched {
            member.advance();
        }
        let resume = step.clone();
        barrier.end_with(move || resume.advance());
    })
}

type Cond<C> = Arc<dyn Fn(&mut C) -> bool + Send + Sync>;
type BodyFactory<C> = Arc<dyn Fn() -> Element<C> + Send + Sync>;

fn while_iteration<C: Send + 'static>(cond: Cond<C>, body: BodyFactory<C>) -> StepFn<C> {
    Box::new(move |step: Step<C>| {
        if step.with(|c| cond(c)) {
            let next = while_iteration(Arc::clone(&cond), Arc::clone(&body));
            step.prepend(vec![body(), Element::Action(next)]);
        }
        step.advance();
    })
}

/// Run `body` for as long as `cond` holds, re-checking after every
/// iteration. Built purely from [`Step::prepend`].
pub fn while_loop<C: Send + 'static>(
    cond: impl Fn(&mut C) -> bool + Send + Sync + 'static,
    body: impl Fn() -> Element<C> + Send + Sync + 'static,
) -> Element<C> {
    Element::Action(while_iteration(Arc::new(cond), Arc::new(body)))
}

/// Evaluate `cond` once and splice in the chosen branch.
pub fn if_else<C: Send + 'static>(
    cond: impl FnOnce(&mut C) -> bool + Send + 'static,
    then_branch: Element<C>,
    else_branch: Option<Element<C>>,
) -> Element<C> {
    Element::step(move |step| {
        if step.with(cond) {
            step.prepend(vec![then_branch]);
        } else if let Some(branch) = else_branch {
            step.prepend(vec![branch]);
        }
        step.advance();
    })
}
