//! Frame-entry hooks.
//!
//! Every bytecode frame passes through the interpreter's [`HookChain`] after
//! it is pushed and before its first instruction runs. Hooks see the new
//! frame by index and may rewrite it; the continuation resume driver uses
//! this to restore captured state into each frame as the chain is rebuilt.
//!
//! A hook is taken out of the chain while it runs, so nothing it triggers can
//! re-enter it.

use crate::error::VmResult;
use crate::interpreter::Interpreter;
use smallvec::SmallVec;
use std::fmt;

// =============================================================================
// Hook Trait
// =============================================================================

/// What to do with a hook after it has run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookAction {
    /// Stay installed.
    Keep,
    /// Uninstall.
    Remove,
}

/// Interceptor invoked on entry to every bytecode frame.
pub trait FrameHook {
    /// Name used in logs.
    fn name(&self) -> &'static str;

    /// Called with the index of the newly pushed frame.
    fn on_frame_enter(&mut self, interp: &mut Interpreter, frame: usize)
        -> VmResult<HookAction>;
}

/// Type alias for closure hooks.
pub type FrameHookFn = Box<dyn FnMut(&mut Interpreter, usize) -> VmResult<HookAction>>;

/// Adapts a closure into a [`FrameHook`].
pub struct FnHook {
    name: &'static str,
    func: FrameHookFn,
}

impl FnHook {
    pub fn new(
        name: &'static str,
        func: impl FnMut(&mut Interpreter, usize) -> VmResult<HookAction> + 'static,
    ) -> Self {
        Self {
            name,
            func: Box::new(func),
        }
    }
}

impl FrameHook for FnHook {
    fn name(&self) -> &'static str {
        self.name
    }

    fn on_frame_enter(&mut self, interp: &mut Interpreter, frame: usize) -> VmResult<HookAction> {
        (self.func)(interp, frame)
    }
}

// =============================================================================
// Hook Chain
// =============================================================================

/// Handle to an installed hook.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HookId(u64);

/// Where a new hook goes in the chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookPosition {
    /// Runs before every installed hook.
    First,
    /// Runs after every installed hook.
    Last,
}

struct HookEntry {
    id: HookId,
    /// `None` while the hook is running.
    hook: Option<Box<dyn FrameHook>>,
}

/// Ordered chain of frame-entry hooks.
#[derive(Default)]
pub struct HookChain {
    entries: Vec<HookEntry>,
    next_id: u64,
}

impl HookChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install `hook` at the end of the chain.
    pub fn install(&mut self, hook: Box<dyn FrameHook>) -> HookId {
        self.install_at(HookPosition::Last, hook)
    }

    /// Install `hook` at `position`.
    pub fn install_at(&mut self, position: HookPosition, hook: Box<dyn FrameHook>) -> HookId {
        let id = HookId(self.next_id);
        self.next_id += 1;
        let entry = HookEntry {
            id,
            hook: Some(hook),
        };
        match position {
            HookPosition::First => self.entries.insert(0, entry),
            HookPosition::Last => self.entries.push(entry),
        }
        id
    }

    /// Uninstall a hook. Returns false if it was not installed.
    ///
    /// Removing a hook that is currently running drops it once it returns.
    pub fn remove(&mut self, id: HookId) -> bool {
        let before = self.entries.len();
        self.entries.retain(|entry| entry.id != id);
        self.entries.len() != before
    }

    #[inline]
    pub fn contains(&self, id: HookId) -> bool {
        self.entries.iter().any(|entry| entry.id == id)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Installed hook ids in chain order.
    pub fn ids(&self) -> SmallVec<[HookId; 4]> {
        self.entries.iter().map(|entry| entry.id).collect()
    }

    /// Take a hook out of its entry so it can run with the interpreter
    /// borrowed mutably.
    pub(crate) fn take(&mut self, id: HookId) -> Option<Box<dyn FrameHook>> {
        self.entries
            .iter_mut()
            .find(|entry| entry.id == id)
            .and_then(|entry| entry.hook.take())
    }

    /// Put a hook back after it ran. Dropped if it was removed meanwhile.
    pub(crate) fn put_back(&mut self, id: HookId, hook: Box<dyn FrameHook>) {
        if let Some(entry) = self.entries.iter_mut().find(|entry| entry.id == id) {
            entry.hook = Some(hook);
        }
    }
}

impl fmt::Debug for HookChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self
            .entries
            .iter()
            .map(|entry| entry.hook.as_ref().map_or("<running>", |h| h.name()))
            .collect();
        f.debug_struct("HookChain").field("hooks", &names).finish()
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn noop(name: &'static str) -> Box<dyn FrameHook> {
        Box::new(FnHook::new(name, |_, _| Ok(HookAction::Keep)))
    }

    #[test]
    fn test_install_order() {
        let mut chain = HookChain::new();
        let a = chain.install(noop("a"));
        let b = chain.install(noop("b"));
        let c = chain.install_at(HookPosition::First, noop("c"));
        assert_eq!(chain.ids().as_slice(), &[c, a, b]);
    }

    #[test]
    fn test_remove() {
        let mut chain = HookChain::new();
        let a = chain.install(noop("a"));
        assert!(chain.contains(a));
        assert!(chain.remove(a));
        assert!(!chain.remove(a));
        assert!(chain.is_empty());
    }

    #[test]
    fn test_take_and_put_back() {
        let mut chain = HookChain::new();
        let a = chain.install(noop("a"));
        let hook = chain.take(a).unwrap();
        assert!(chain.take(a).is_none(), "running hook cannot be taken twice");
        assert!(format!("{:?}", chain).contains("<running>"));
        chain.put_back(a, hook);
        assert!(chain.take(a).is_some());
    }

    #[test]
    fn test_put_back_after_remove_drops_hook() {
        let mut chain = HookChain::new();
        let a = chain.install(noop("a"));
        let hook = chain.take(a).unwrap();
        chain.remove(a);
        chain.put_back(a, hook);
        assert!(!chain.contains(a));
        assert_eq!(chain.len(), 0);
    }
}
