//! Bytecode interpreter.
//!
//! The interpreter owns everything a running program touches: the frame
//! stack, globals, the frame-entry hook chain, the currently handled
//! exception and the `print` output buffer. Bytecode calls recurse through
//! [`Interpreter::run_frame`], so each bytecode frame corresponds to one
//! native `eval_frame` activation and the depth is bounded by
//! [`VmConfig::recursion_limit`].

use crate::builtins::{self, Args};
use crate::config::VmConfig;
use crate::continuation::{self, Continuation};
use crate::dispatch::{dispatch, ControlFlow};
use crate::error::{VmError, VmResult};
use crate::frame::Frame;
use crate::hooks::{FrameHook, HookAction, HookChain, HookId, HookPosition};
use crate::ops::exception::unwind;
use crate::ops::kw_binding::bind_arguments;
use crate::value::{BuiltinFn, BuiltinFunction, FunctionObject, Value};
use rewind_compiler::bytecode::CodeObject;
use rustc_hash::FxHashMap;
use std::rc::Rc;
use std::sync::Arc;
use tracing::{debug, trace};

/// Bytecode interpreter.
pub struct Interpreter {
    /// Live frames, outermost first.
    pub(crate) frames: Vec<Frame>,

    /// Module globals, builtins included.
    pub(crate) globals: FxHashMap<Arc<str>, Value>,

    /// Frame-entry interceptors.
    hooks: HookChain,

    /// Resume hook installed by an in-flight `resume`, if still armed.
    armed_resume: Option<HookId>,

    /// Exception currently being handled by an `except` block.
    pub(crate) exc_state: Option<Value>,

    /// Lines written by `print`.
    output: Vec<String>,

    config: VmConfig,
}

impl Interpreter {
    /// Create an interpreter with the default configuration.
    pub fn new() -> Self {
        Self::with_config(VmConfig::default())
    }

    /// Create an interpreter with builtins installed.
    pub fn with_config(config: VmConfig) -> Self {
        let mut interp = Self {
            frames: Vec::new(),
            globals: FxHashMap::default(),
            hooks: HookChain::new(),
            armed_resume: None,
            exc_state: None,
            output: Vec::new(),
            config,
        };
        builtins::install(&mut interp);
        interp
    }

    #[inline]
    pub fn config(&self) -> &VmConfig {
        &self.config
    }

    // =========================================================================
    // Globals
    // =========================================================================

    pub fn define_global(&mut self, name: impl Into<Arc<str>>, value: Value) {
        self.globals.insert(name.into(), value);
    }

    pub fn global(&self, name: &str) -> Option<&Value> {
        self.globals.get(name)
    }

    /// Register a native function as a global.
    pub fn define_builtin(&mut self, name: &'static str, func: BuiltinFn) {
        self.define_global(
            name,
            Value::Builtin(Rc::new(BuiltinFunction { name, func })),
        );
    }

    /// Wrap `code` in a function and bind it to a global of the same name.
    pub fn define_function(&mut self, code: CodeObject) -> Rc<FunctionObject> {
        let function = Rc::new(FunctionObject::new(Arc::new(code)));
        self.define_global(
            function.name().clone(),
            Value::Function(function.clone()),
        );
        function
    }

    // =========================================================================
    // Frames
    // =========================================================================

    /// Live frames, outermost first.
    #[inline]
    pub fn frames(&self) -> &[Frame] {
        &self.frames
    }

    #[inline]
    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    #[inline]
    pub fn frame_mut(&mut self, index: usize) -> Option<&mut Frame> {
        self.frames.get_mut(index)
    }

    #[inline]
    pub fn current_frame(&self) -> VmResult<&Frame> {
        self.frames
            .last()
            .ok_or_else(|| VmError::internal("no active frame"))
    }

    #[inline]
    pub fn current_frame_mut(&mut self) -> VmResult<&mut Frame> {
        self.frames
            .last_mut()
            .ok_or_else(|| VmError::internal("no active frame"))
    }

    /// Exception being handled by the innermost active `except` block.
    #[inline]
    pub fn handled_exception(&self) -> Option<&Value> {
        self.exc_state.as_ref()
    }

    // =========================================================================
    // Hooks
    // =========================================================================

    #[inline]
    pub fn hooks(&self) -> &HookChain {
        &self.hooks
    }

    #[inline]
    pub fn hooks_mut(&mut self) -> &mut HookChain {
        &mut self.hooks
    }

    /// Run `f` with `hook` installed at the end of the chain.
    ///
    /// The hook is uninstalled when `f` returns, whatever it returns.
    pub fn with_hook<R>(
        &mut self,
        hook: Box<dyn FrameHook>,
        f: impl FnOnce(&mut Self, HookId) -> R,
    ) -> R {
        self.with_hook_at(HookPosition::Last, hook, f)
    }

    /// Run `f` with `hook` installed at `position`.
    pub fn with_hook_at<R>(
        &mut self,
        position: HookPosition,
        hook: Box<dyn FrameHook>,
        f: impl FnOnce(&mut Self, HookId) -> R,
    ) -> R {
        let id = self.hooks.install_at(position, hook);
        let result = f(self, id);
        self.hooks.remove(id);
        result
    }

    /// Whether a resume hook is waiting to be disarmed.
    #[inline]
    pub fn resume_armed(&self) -> bool {
        self.armed_resume.is_some()
    }

    pub(crate) fn arm_resume(&mut self, id: HookId) {
        self.armed_resume = Some(id);
    }

    pub(crate) fn take_armed_resume(&mut self) -> Option<HookId> {
        self.armed_resume.take()
    }

    pub(crate) fn disarm_resume_if(&mut self, id: HookId) {
        if self.armed_resume == Some(id) {
            self.armed_resume = None;
        }
    }

    fn run_hooks(&mut self, frame: usize) -> VmResult<()> {
        if self.hooks.is_empty() {
            return Ok(());
        }
        for id in self.hooks.ids() {
            let Some(mut hook) = self.hooks.take(id) else {
                continue;
            };
            match hook.on_frame_enter(self, frame) {
                Ok(HookAction::Keep) => self.hooks.put_back(id, hook),
                Ok(HookAction::Remove) => {
                    trace!(hook = hook.name(), "hook removed itself");
                    self.hooks.remove(id);
                }
                Err(err) => {
                    self.hooks.put_back(id, hook);
                    return Err(err);
                }
            }
        }
        Ok(())
    }

    // =========================================================================
    // Output
    // =========================================================================

    /// Lines written by `print` so far.
    #[inline]
    pub fn output(&self) -> &[String] {
        &self.output
    }

    pub fn take_output(&mut self) -> Vec<String> {
        std::mem::take(&mut self.output)
    }

    pub(crate) fn write_line(&mut self, line: String) {
        if self.config.echo_print {
            println!("{}", line);
        }
        self.output.push(line);
    }

    // =========================================================================
    // Calls
    // =========================================================================

    /// Call the global `name` with positional arguments.
    pub fn call_function(&mut self, name: &str, args: Vec<Value>) -> VmResult<Value> {
        let callee = self
            .globals
            .get(name)
            .cloned()
            .ok_or_else(|| VmError::name_error(name))?;
        self.call_value(&callee, Args::positional(args))
    }

    /// Call any callable value.
    pub fn call_value(&mut self, callee: &Value, args: Args) -> VmResult<Value> {
        match callee {
            Value::Function(function) => {
                let locals = bind_arguments(function, args).map_err(|err| err.into_vm_error())?;
                let frame = Frame::with_locals(function.clone(), self.top_index(), locals);
                self.run_frame(frame)
            }
            Value::Builtin(builtin) => (builtin.func)(self, args),
            other => Err(VmError::type_error(format!(
                "'{}' object is not callable",
                other.type_name()
            ))),
        }
    }

    /// Run top-level code as a function with no arguments.
    pub fn run(&mut self, code: CodeObject) -> VmResult<Value> {
        let function = Rc::new(FunctionObject::new(Arc::new(code)));
        let frame = Frame::new(function, self.top_index());
        self.run_frame(frame)
    }

    /// Push `frame`, run the frame-entry hooks, then evaluate it.
    pub fn run_frame(&mut self, frame: Frame) -> VmResult<Value> {
        let limit = self.config.recursion_limit;
        if self.frames.len() >= limit {
            return Err(VmError::RecursionLimit { limit });
        }

        trace!(function = %frame.qualname(), depth = self.frames.len(), "enter frame");
        self.frames.push(frame);
        let index = self.frames.len() - 1;

        let result = self.run_hooks(index).and_then(|()| self.eval_frame());
        self.frames.truncate(index);
        result
    }

    fn top_index(&self) -> Option<u32> {
        self.frames.len().checked_sub(1).map(|i| i as u32)
    }

    // =========================================================================
    // Continuations
    // =========================================================================

    /// Capture the live call chain.
    pub fn capture(&mut self) -> VmResult<Continuation> {
        continuation::capture(self)
    }

    /// Rebuild a captured call chain and run it to completion.
    pub fn resume(&mut self, continuation: &Continuation) -> VmResult<Value> {
        continuation::resume(self, continuation)
    }

    // =========================================================================
    // Evaluation Loop
    // =========================================================================

    fn eval_frame(&mut self) -> VmResult<Value> {
        loop {
            let frame = self.current_frame_mut()?;
            if frame.is_done() {
                return Ok(Value::None);
            }
            let inst = frame.fetch()?;

            let flow = match dispatch(self, inst) {
                Ok(flow) => flow,
                Err(VmError::Exception(exc)) => ControlFlow::Raise(exc),
                Err(err) => return Err(err),
            };

            match flow {
                ControlFlow::Continue => {}
                ControlFlow::Jump(target) => self.current_frame_mut()?.ip = target,
                ControlFlow::Return(value) => return Ok(value),
                ControlFlow::Raise(exc) => {
                    debug!(exception = %exc.repr(), offset = inst.offset, "exception raised");
                    unwind(self, exc)?;
                }
            }
        }
    }
}

impl Default for Interpreter {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Interpreter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Interpreter")
            .field("depth", &self.frames.len())
            .field("globals", &self.globals.len())
            .field("hooks", &self.hooks)
            .field("resume_armed", &self.resume_armed())
            .finish()
    }
}
