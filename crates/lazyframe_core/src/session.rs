use std::cell::{Cell, RefCell};
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use hashbrown::HashMap;
use lazyframe_error::{ErrorKind, LazyError, Result};
use parking_lot::{Mutex, ReentrantMutex};
use tracing::{debug, trace};

use crate::config::SessionConfig;
use crate::expr::{Expression, ExpressionId, ExpressionSignature};

thread_local! {
    /// Nesting depth of `Session::evaluate` calls on this thread.
    static EVAL_DEPTH: Cell<u64> = const { Cell::new(0) };
}

/// A mapping of expressions to concrete values.
///
/// Bindings typically hold the placeholders of a graph, but any expression
/// may be bound. Every other value is computed on demand and cached for the
/// lifetime of the session; nothing is evicted.
///
/// Each identity has its own slot guarded by a lock that is re-entrant for
/// the owning thread. The slot lock makes the check-then-compute step atomic
/// per identity, so an expression is computed at most once per session even
/// when evaluated from multiple threads.
///
/// The signature of the first definition seen for an identity is recorded
/// alongside its slot, and later definitions are checked against it before
/// waiting on the slot lock.
pub struct Session<V> {
    config: SessionConfig,
    slots: Mutex<HashMap<ExpressionId, SlotEntry<V>>>,
    /// Number of values computed (cache misses that succeeded).
    evaluations: AtomicUsize,
}

struct SlotEntry<V> {
    /// None for bindings made by id only, until an expression with this id is
    /// evaluated.
    signature: Option<ExpressionSignature>,
    slot: Arc<Slot<V>>,
}

struct Slot<V> {
    state: ReentrantMutex<RefCell<SlotState<V>>>,
}

enum SlotState<V> {
    Empty,
    /// Currently being computed by the thread holding the slot lock.
    InProgress,
    Ready(V),
}

impl<V> Slot<V> {
    fn new(state: SlotState<V>) -> Self {
        Slot {
            state: ReentrantMutex::new(RefCell::new(state)),
        }
    }

    fn is_ready(&self) -> bool {
        let guard = self.state.lock();
        let ready = matches!(&*guard.borrow(), SlotState::Ready(_));
        ready
    }
}

impl<V> Session<V>
where
    V: Clone + Send + Sync + 'static,
{
    /// Create a session with the default config and the provided bindings.
    ///
    /// If the same identity appears more than once, the last binding wins.
    pub fn new(bindings: impl IntoIterator<Item = (Expression<V>, V)>) -> Self {
        Self::with_config(SessionConfig::default(), bindings)
    }

    /// Create a session without any bindings.
    pub fn empty() -> Self {
        Self::new(std::iter::empty())
    }

    pub fn with_config(
        config: SessionConfig,
        bindings: impl IntoIterator<Item = (Expression<V>, V)>,
    ) -> Self {
        let slots: HashMap<_, _> = bindings
            .into_iter()
            .map(|(expr, value)| {
                let entry = SlotEntry {
                    signature: Some(expr.signature().clone()),
                    slot: Arc::new(Slot::new(SlotState::Ready(value))),
                };
                (expr.id().clone(), entry)
            })
            .collect();

        debug!(bindings = slots.len(), "created session");

        Session {
            config,
            slots: Mutex::new(slots),
            evaluations: AtomicUsize::new(0),
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Evaluate an expression, reusing the cached value if this session has
    /// already seen its identity.
    ///
    /// All evaluation of nested expressions goes through this method.
    pub fn evaluate(&self, expr: &Expression<V>) -> Result<V> {
        let slot = self.get_or_create_slot(expr.id(), Some(expr.signature()))?;
        let guard = slot.state.lock();

        match &*guard.borrow() {
            SlotState::Ready(value) => {
                trace!(id = %expr.id(), "session cache hit");
                return Ok(value.clone());
            }
            SlotState::InProgress => {
                return Err(LazyError::with_kind(
                    ErrorKind::CyclicEvaluation,
                    "Expression re-entered while being evaluated",
                )
                .with_field("id", expr.id().clone()));
            }
            SlotState::Empty => (),
        }

        // Only computing a value nests further, cache hits never count.
        let _depth = DepthGuard::enter(self.config.max_depth, expr.id())?;

        trace!(id = %expr.id(), name = expr.name(), "session cache miss");
        *guard.borrow_mut() = SlotState::InProgress;

        let result = expr.evaluate_at(self);

        let mut state = guard.borrow_mut();
        match result {
            Ok(value) => {
                *state = SlotState::Ready(value.clone());
                self.evaluations.fetch_add(1, Ordering::Relaxed);
                Ok(value)
            }
            Err(e) => {
                *state = SlotState::Empty;
                Err(e)
            }
        }
    }

    /// Get the value bound or computed for this expression without computing
    /// it.
    ///
    /// Errors with an unbound reference if there's no value.
    pub fn lookup(&self, expr: &Expression<V>) -> Result<V> {
        let slot = {
            let slots = self.slots.lock();
            match slots.get(expr.id()) {
                Some(entry) => {
                    if let Some(existing) = &entry.signature {
                        self.verify_signature(expr.id(), existing, expr.signature())?;
                    }
                    Some(entry.slot.clone())
                }
                None => None,
            }
        };

        if let Some(slot) = slot {
            let guard = slot.state.lock();
            if let SlotState::Ready(value) = &*guard.borrow() {
                return Ok(value.clone());
            }
        }

        debug!(id = %expr.id(), "missing binding for expression");
        Err(
            LazyError::unbound(format!("No value bound for expression '{}'", expr.id()))
                .with_field("name", expr.name().to_string()),
        )
    }

    /// Bind a value to an expression after the session was created.
    ///
    /// Errors if the identity already has a value.
    pub fn bind(&self, expr: &Expression<V>, value: V) -> Result<()> {
        self.bind_inner(expr.id(), value, Some(expr.signature()))
    }

    /// Bind a value by identity alone, e.g. an id received from another
    /// process.
    pub fn bind_id(&self, id: impl Into<ExpressionId>, value: V) -> Result<()> {
        self.bind_inner(&id.into(), value, None)
    }

    fn bind_inner(
        &self,
        id: &ExpressionId,
        value: V,
        signature: Option<&ExpressionSignature>,
    ) -> Result<()> {
        let slot = self.get_or_create_slot(id, signature)?;
        let guard = slot.state.lock();
        let mut state = guard.borrow_mut();

        if !matches!(&*state, SlotState::Empty) {
            return Err(LazyError::conflicting(format!(
                "Expression '{id}' already has a value in this session"
            )));
        }

        *state = SlotState::Ready(value);
        Ok(())
    }

    /// Whether a value is bound or has been computed for this expression.
    pub fn contains(&self, expr: &Expression<V>) -> bool {
        let slot = self.slots.lock().get(expr.id()).map(|e| e.slot.clone());
        match slot {
            Some(slot) => slot.is_ready(),
            None => false,
        }
    }

    /// Number of identities with a value.
    pub fn len(&self) -> usize {
        let slots: Vec<_> = self.slots.lock().values().map(|e| e.slot.clone()).collect();
        slots.iter().filter(|slot| slot.is_ready()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of expressions this session has computed (excluding bindings
    /// and cache hits).
    pub fn evaluation_count(&self) -> usize {
        self.evaluations.load(Ordering::Relaxed)
    }

    /// Get the slot for an id, creating it if needed.
    ///
    /// The signature check happens here under the map lock, never while
    /// waiting on a slot.
    fn get_or_create_slot(
        &self,
        id: &ExpressionId,
        signature: Option<&ExpressionSignature>,
    ) -> Result<Arc<Slot<V>>> {
        let mut slots = self.slots.lock();

        if let Some(entry) = slots.get_mut(id) {
            if let Some(requested) = signature {
                if let Some(existing) = entry.signature.as_ref() {
                    self.verify_signature(id, existing, requested)?;
                }
                if entry.signature.is_none() {
                    entry.signature = Some(requested.clone());
                }
            }
            return Ok(entry.slot.clone());
        }

        let slot = Arc::new(Slot::new(SlotState::Empty));
        let entry = SlotEntry {
            signature: signature.cloned(),
            slot: slot.clone(),
        };
        slots.insert(id.clone(), entry);

        Ok(slot)
    }

    fn verify_signature(
        &self,
        id: &ExpressionId,
        existing: &ExpressionSignature,
        requested: &ExpressionSignature,
    ) -> Result<()> {
        if !self.config.verify_definitions || existing == requested {
            return Ok(());
        }

        debug!(%id, "conflicting definitions for expression id");
        Err(LazyError::conflicting(format!(
            "Expression id '{id}' is used by two different definitions"
        ))
        .with_field("existing", existing.clone())
        .with_field("requested", requested.clone()))
    }
}

impl<V> fmt::Debug for Session<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("config", &self.config)
            .field("evaluations", &self.evaluations.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

/// Tracks evaluation nesting on the current thread, decrementing on drop.
#[derive(Debug)]
struct DepthGuard;

impl DepthGuard {
    fn enter(max_depth: u64, id: &ExpressionId) -> Result<Self> {
        let depth = EVAL_DEPTH.with(|d| d.get());
        if depth >= max_depth {
            return Err(LazyError::with_kind(
                ErrorKind::DepthExceeded,
                format!("Evaluation exceeded maximum depth of {max_depth}"),
            )
            .with_field("id", id.clone()));
        }
        EVAL_DEPTH.with(|d| d.set(depth + 1));
        Ok(DepthGuard)
    }
}

impl Drop for DepthGuard {
    fn drop(&mut self) {
        EVAL_DEPTH.with(|d| d.set(d.get().saturating_sub(1)));
    }
}
