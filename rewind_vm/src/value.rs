//! Runtime values.
//!
//! Values are reference counted with `Rc`; cloning a `Value` shares the
//! underlying object. Continuations capture values by cloning them, so a
//! captured object stays alive for as long as any record refers to it.
//!
//! Truthiness, equality, `repr` and type names follow Python conventions.

use crate::builtins::Args;
use crate::continuation::{CodeFingerprint, Continuation};
use crate::error::VmResult;
use crate::interpreter::Interpreter;
use rewind_compiler::bytecode::CodeObject;
use rustc_hash::FxHashMap;
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;
use std::sync::Arc;

// =============================================================================
// Value
// =============================================================================

/// A runtime value.
#[derive(Clone)]
pub enum Value {
    None,
    Bool(bool),
    Int(i64),
    Str(Arc<str>),
    Tuple(Rc<[Value]>),
    List(Rc<RefCell<Vec<Value>>>),
    Dict(Rc<RefCell<FxHashMap<Arc<str>, Value>>>),
    Function(Rc<FunctionObject>),
    Builtin(Rc<BuiltinFunction>),
    Object(Rc<Instance>),
    Iterator(Rc<RefCell<SeqIterator>>),
    Exception(Rc<ExceptionValue>),
    Continuation(Rc<Continuation>),
}

impl Value {
    /// Build a string value.
    #[inline]
    pub fn str(s: &str) -> Self {
        Value::Str(Arc::from(s))
    }

    /// Build a list value.
    pub fn list(items: Vec<Value>) -> Self {
        Value::List(Rc::new(RefCell::new(items)))
    }

    /// Build a tuple value.
    pub fn tuple(items: Vec<Value>) -> Self {
        Value::Tuple(items.into())
    }

    /// Build an empty dict.
    pub fn dict() -> Self {
        Value::Dict(Rc::new(RefCell::new(FxHashMap::default())))
    }

    #[inline]
    pub fn is_none(&self) -> bool {
        matches!(self, Value::None)
    }

    #[inline]
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            Value::Bool(b) => Some(*b as i64),
            _ => None,
        }
    }

    #[inline]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Python truthiness.
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::None => false,
            Value::Bool(b) => *b,
            Value::Int(i) => *i != 0,
            Value::Str(s) => !s.is_empty(),
            Value::Tuple(items) => !items.is_empty(),
            Value::List(items) => !items.borrow().is_empty(),
            Value::Dict(map) => !map.borrow().is_empty(),
            Value::Continuation(k) => !k.is_empty(),
            _ => true,
        }
    }

    /// Python type name, as used in error messages.
    pub fn type_name(&self) -> &str {
        match self {
            Value::None => "NoneType",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Str(_) => "str",
            Value::Tuple(_) => "tuple",
            Value::List(_) => "list",
            Value::Dict(_) => "dict",
            Value::Function(_) => "function",
            Value::Builtin(_) => "builtin_function_or_method",
            Value::Object(_) => "object",
            Value::Iterator(_) => "iterator",
            Value::Exception(exc) => &exc.type_name,
            Value::Continuation(_) => "continuation",
        }
    }

    /// `repr()` of the value.
    pub fn repr(&self) -> String {
        match self {
            Value::None => "None".to_string(),
            Value::Bool(true) => "True".to_string(),
            Value::Bool(false) => "False".to_string(),
            Value::Int(i) => i.to_string(),
            Value::Str(s) => format!("'{}'", s),
            Value::Tuple(items) => {
                let inner = join_repr(items.iter());
                if items.len() == 1 {
                    format!("({},)", inner)
                } else {
                    format!("({})", inner)
                }
            }
            Value::List(items) => format!("[{}]", join_repr(items.borrow().iter())),
            Value::Dict(map) => {
                let map = map.borrow();
                let mut keys: Vec<&Arc<str>> = map.keys().collect();
                keys.sort();
                let entries: Vec<String> = keys
                    .into_iter()
                    .map(|k| format!("'{}': {}", k, map[k].repr()))
                    .collect();
                format!("{{{}}}", entries.join(", "))
            }
            Value::Function(func) => format!("<function {}>", func.code.qualname),
            Value::Builtin(builtin) => format!("<built-in function {}>", builtin.name),
            Value::Object(_) => "<object>".to_string(),
            Value::Iterator(_) => "<iterator>".to_string(),
            Value::Exception(exc) => format!("{}('{}')", exc.type_name, exc.message),
            Value::Continuation(k) => format!("<continuation depth={}>", k.len()),
        }
    }
}

fn join_repr<'a>(items: impl Iterator<Item = &'a Value>) -> String {
    items.map(Value::repr).collect::<Vec<_>>().join(", ")
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::None, Value::None) => true,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Tuple(a), Value::Tuple(b)) => a == b,
            (Value::List(a), Value::List(b)) => Rc::ptr_eq(a, b) || *a.borrow() == *b.borrow(),
            (Value::Dict(a), Value::Dict(b)) => Rc::ptr_eq(a, b) || *a.borrow() == *b.borrow(),
            (Value::Function(a), Value::Function(b)) => Rc::ptr_eq(a, b),
            (Value::Builtin(a), Value::Builtin(b)) => Rc::ptr_eq(a, b),
            (Value::Object(a), Value::Object(b)) => Rc::ptr_eq(a, b),
            (Value::Iterator(a), Value::Iterator(b)) => Rc::ptr_eq(a, b),
            (Value::Exception(a), Value::Exception(b)) => Rc::ptr_eq(a, b),
            (Value::Continuation(a), Value::Continuation(b)) => Rc::ptr_eq(a, b),
            // bool is an int subtype
            (a, b) => match (a.as_int(), b.as_int()) {
                (Some(x), Some(y)) => x == y,
                _ => false,
            },
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.repr())
    }
}

/// `str()` of the value.
impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Str(s) => f.write_str(s),
            Value::Exception(exc) => f.write_str(&exc.message),
            other => f.write_str(&other.repr()),
        }
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::str(s)
    }
}

// =============================================================================
// Functions
// =============================================================================

/// A bytecode function.
#[derive(Debug)]
pub struct FunctionObject {
    pub code: Arc<CodeObject>,
    /// Identity of `code`, computed once at creation.
    pub fingerprint: CodeFingerprint,
}

impl FunctionObject {
    pub fn new(code: Arc<CodeObject>) -> Self {
        let fingerprint = CodeFingerprint::of(&code);
        Self { code, fingerprint }
    }

    #[inline]
    pub fn name(&self) -> &Arc<str> {
        &self.code.name
    }
}

/// Native function signature.
pub type BuiltinFn = fn(&mut Interpreter, Args) -> VmResult<Value>;

/// A native function. Calling it pushes no bytecode frame.
pub struct BuiltinFunction {
    pub name: &'static str,
    pub func: BuiltinFn,
}

impl fmt::Debug for BuiltinFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BuiltinFunction")
            .field("name", &self.name)
            .finish()
    }
}

// =============================================================================
// Objects
// =============================================================================

/// A plain attribute-bag object.
///
/// Attribute lookups that miss fall back to `class`. Functions found on the
/// class are bound to the instance by `LoadMethod`.
#[derive(Default)]
pub struct Instance {
    pub class: Option<Rc<Instance>>,
    pub attrs: RefCell<FxHashMap<Arc<str>, Value>>,
}

/// Where an attribute lookup was satisfied.
#[derive(Debug, Clone, PartialEq)]
pub enum AttrLookup {
    Own(Value),
    Class(Value),
}

impl Instance {
    pub fn new(class: Option<Rc<Instance>>) -> Self {
        Self {
            class,
            attrs: RefCell::new(FxHashMap::default()),
        }
    }

    /// Look up `name` on the instance, then along the class chain.
    pub fn lookup(&self, name: &str) -> Option<AttrLookup> {
        if let Some(value) = self.attrs.borrow().get(name) {
            return Some(AttrLookup::Own(value.clone()));
        }
        let mut class = self.class.clone();
        while let Some(cls) = class {
            if let Some(value) = cls.attrs.borrow().get(name) {
                return Some(AttrLookup::Class(value.clone()));
            }
            class = cls.class.clone();
        }
        None
    }

    pub fn set_attr(&self, name: Arc<str>, value: Value) {
        self.attrs.borrow_mut().insert(name, value);
    }
}

impl fmt::Debug for Instance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Instance")
            .field("attrs", &self.attrs.borrow().len())
            .field("has_class", &self.class.is_some())
            .finish()
    }
}

// =============================================================================
// Iterators
// =============================================================================

/// What a [`SeqIterator`] walks over.
#[derive(Debug)]
pub enum IterSource {
    List(Rc<RefCell<Vec<Value>>>),
    Tuple(Rc<[Value]>),
    Range { stop: i64, step: i64 },
    Keys(Vec<Arc<str>>),
}

/// Iterator state pushed by `GetIter` and advanced by `ForIter`.
#[derive(Debug)]
pub struct SeqIterator {
    source: IterSource,
    /// Element index, or the next integer for ranges.
    cursor: i64,
}

impl SeqIterator {
    pub fn new(source: IterSource) -> Self {
        Self { source, cursor: 0 }
    }

    /// Lazy integer range.
    pub fn range(start: i64, stop: i64, step: i64) -> Self {
        Self {
            source: IterSource::Range { stop, step },
            cursor: start,
        }
    }

    /// Advance, returning `None` once exhausted.
    pub fn next_value(&mut self) -> Option<Value> {
        let value = match &self.source {
            IterSource::List(items) => items.borrow().get(self.cursor as usize).cloned(),
            IterSource::Tuple(items) => items.get(self.cursor as usize).cloned(),
            IterSource::Keys(keys) => keys.get(self.cursor as usize).cloned().map(Value::Str),
            IterSource::Range { stop, step } => {
                let (stop, step) = (*stop, *step);
                let current = self.cursor;
                let done = if step > 0 { current >= stop } else { current <= stop };
                if done {
                    return None;
                }
                self.cursor = current.saturating_add(step);
                return Some(Value::Int(current));
            }
        };
        if value.is_some() {
            self.cursor += 1;
        }
        value
    }
}

// =============================================================================
// Exceptions
// =============================================================================

/// An exception instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExceptionValue {
    pub type_name: Arc<str>,
    pub message: Arc<str>,
}

impl ExceptionValue {
    pub fn new(type_name: &str, message: impl Into<Arc<str>>) -> Self {
        Self {
            type_name: Arc::from(type_name),
            message: message.into(),
        }
    }
}
