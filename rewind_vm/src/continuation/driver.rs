//! Capture and resume.
//!
//! Resuming installs a [`ResumeHook`] at the front of the hook chain and
//! re-invokes the outermost captured function. Each frame entered while the
//! hook is installed receives the next record, outermost first; the frame
//! then re-executes its captured call, which enters the next frame, and so
//! on down to the innermost frame.
//!
//! The innermost frame re-executes the `capture()` call itself. While a
//! resume is armed, `capture` disarms it and returns an empty continuation
//! instead of snapshotting, which is how a program tells a fresh capture
//! from a resumed one.

use super::{restore, snapshot, Continuation, FrameRecord};
use crate::error::{VmError, VmResult};
use crate::frame::Frame;
use crate::hooks::{FrameHook, HookAction, HookPosition};
use crate::interpreter::Interpreter;
use crate::value::Value;
use tracing::{debug, instrument, trace};

// =============================================================================
// Resume Hook
// =============================================================================

/// Frame-entry hook that restores one record per entered frame.
#[derive(Debug)]
pub struct ResumeHook {
    /// Records still to restore; the next one is at the end.
    pending: Vec<FrameRecord>,
}

impl ResumeHook {
    /// Build a hook for `continuation`, whose records are innermost first.
    pub fn new(continuation: &Continuation) -> Self {
        Self {
            pending: continuation.records().to_vec(),
        }
    }

    /// Number of records not yet restored.
    #[inline]
    pub fn remaining(&self) -> usize {
        self.pending.len()
    }
}

impl FrameHook for ResumeHook {
    fn name(&self) -> &'static str {
        "continuation-resume"
    }

    fn on_frame_enter(&mut self, interp: &mut Interpreter, index: usize) -> VmResult<HookAction> {
        let Some(record) = self.pending.pop() else {
            return Ok(HookAction::Remove);
        };
        let frame = interp.frame_mut(index).ok_or_else(|| {
            VmError::internal(format!("resume hook fired for missing frame {}", index))
        })?;
        restore(frame, &record)?;

        if self.pending.is_empty() {
            debug!(function = %record.function().code.qualname, "innermost frame restored");
            Ok(HookAction::Remove)
        } else {
            Ok(HookAction::Keep)
        }
    }
}

// =============================================================================
// Capture
// =============================================================================

/// Snapshot every bytecode frame from the innermost outwards.
///
/// While a resume is armed this instead disarms it and returns an empty
/// continuation.
#[instrument(level = "debug", skip_all, fields(depth = interp.depth()))]
pub fn capture(interp: &mut Interpreter) -> VmResult<Continuation> {
    if let Some(id) = interp.take_armed_resume() {
        interp.hooks_mut().remove(id);
        debug!("resume disarmed by capture");
        return Ok(Continuation::empty());
    }

    let frames = interp.frames();
    let mut records = Vec::with_capacity(frames.len());
    let mut next = frames.len().checked_sub(1);
    while let Some(index) = next {
        let frame = frames
            .get(index)
            .ok_or_else(|| VmError::internal(format!("dangling parent frame {}", index)))?;
        records.push(snapshot(frame)?);
        next = frame.parent.map(|parent| parent as usize);
    }

    debug!(frames = records.len(), "continuation captured");
    Ok(Continuation::new(records))
}

// =============================================================================
// Resume
// =============================================================================

/// Rebuild the captured call chain on top of the current frames and run it.
///
/// Returns what the outermost captured function returns. An empty
/// continuation resumes to `None`.
#[instrument(level = "debug", skip_all, fields(depth = continuation.len()))]
pub fn resume(interp: &mut Interpreter, continuation: &Continuation) -> VmResult<Value> {
    let Some(outermost) = continuation.outermost() else {
        return Ok(Value::None);
    };
    let function = outermost.function().clone();

    if let Some(stale) = interp.take_armed_resume() {
        trace!("dropping stale resume hook");
        interp.hooks_mut().remove(stale);
    }

    interp.with_hook_at(
        HookPosition::First,
        Box::new(ResumeHook::new(continuation)),
        |interp, id| {
            interp.arm_resume(id);
            debug!(function = %function.code.qualname, "resume armed");
            let parent = interp.depth().checked_sub(1).map(|i| i as u32);
            let result = interp.run_frame(Frame::new(function, parent));
            interp.disarm_resume_if(id);
            result
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ContinuationError;
    use crate::value::FunctionObject;
    use rewind_compiler::bytecode::FunctionBuilder;
    use std::rc::Rc;
    use std::sync::Arc;

    /// k = capture(); print(len(k)); if k: return resume(k); return 42
    fn round_trip() -> FunctionBuilder {
        let mut builder = FunctionBuilder::new("main");
        let k = builder.define_local("k");
        let done = builder.create_label();
        builder.emit_load_global("capture");
        builder.emit_call_function(0);
        builder.emit_store_fast(k);
        builder.emit_load_global("print");
        builder.emit_load_global("len");
        builder.emit_load_fast(k);
        builder.emit_call_function(1);
        builder.emit_call_function(1);
        builder.emit_pop_top();
        builder.emit_load_fast(k);
        builder.emit_pop_jump_if_false(done);
        builder.emit_load_global("resume");
        builder.emit_load_fast(k);
        builder.emit_call_function(1);
        builder.emit_return();
        builder.bind_label(done);
        builder.emit_load_int(42);
        builder.emit_return();
        builder
    }

    #[test]
    fn test_round_trip() {
        let mut interp = Interpreter::new();
        let result = interp.run(round_trip().finish().unwrap()).unwrap();
        assert_eq!(result, Value::Int(42));
        assert_eq!(interp.output(), &["1".to_string(), "0".to_string()]);
        assert!(!interp.resume_armed());
        assert!(interp.hooks().is_empty());
    }

    #[test]
    fn test_capture_without_frames_is_empty() {
        let mut interp = Interpreter::new();
        assert!(capture(&mut interp).unwrap().is_empty());
    }

    #[test]
    fn test_resume_empty_is_none() {
        let mut interp = Interpreter::new();
        assert_eq!(resume(&mut interp, &Continuation::empty()).unwrap(), Value::None);
        assert!(interp.hooks().is_empty());
    }

    #[test]
    fn test_resume_hook_restores_then_removes_itself() {
        let mut builder = FunctionBuilder::new("leaf");
        builder.emit_load_global("capture");
        let site = builder.emit_call_function(0);
        builder.emit_return();
        let func = Rc::new(FunctionObject::new(Arc::new(builder.finish().unwrap())));

        let mut frame = Frame::new(func.clone(), None);
        frame.push(Value::None);
        frame.lasti = site;
        let record = snapshot(&frame).unwrap();

        let mut hook = ResumeHook::new(&Continuation::new(vec![record]));
        assert_eq!(hook.remaining(), 1);

        let mut interp = Interpreter::new();
        interp.frames.push(Frame::new(func, None));
        let action = hook.on_frame_enter(&mut interp, 0).unwrap();
        assert_eq!(action, HookAction::Remove);
        assert_eq!(interp.frames()[0].ip, site);
        assert_eq!(interp.frames()[0].stack_depth(), 1);
    }

    #[test]
    fn test_resume_into_changed_code_fails() {
        let mut builder = FunctionBuilder::new("leaf");
        builder.emit_load_global("capture");
        let site = builder.emit_call_function(0);
        builder.emit_return();
        let func = Rc::new(FunctionObject::new(Arc::new(builder.finish().unwrap())));
        let mut frame = Frame::new(func, None);
        frame.push(Value::None);
        frame.lasti = site;
        let record = snapshot(&frame).unwrap();

        let mut other = FunctionBuilder::new("leaf");
        other.emit_nop();
        other.emit_return_none();
        let changed = Rc::new(FunctionObject::new(Arc::new(other.finish().unwrap())));

        let mut hook = ResumeHook::new(&Continuation::new(vec![record]));
        let mut interp = Interpreter::new();
        interp.frames.push(Frame::new(changed, None));
        let err = hook.on_frame_enter(&mut interp, 0).unwrap_err();
        assert!(matches!(
            err,
            VmError::Continuation(ContinuationError::CodeMismatch { .. })
        ));
    }
}
