//! Object model for Mython programs: values, classes, scopes, and the
//! execution context.
//!
//! Every value is reached through an [`ObjectHolder`], a shared-ownership
//! handle that is either empty (`None`) or points at exactly one [`Object`].
//! Instances carry their mutable field scope behind a `RefCell`; everything
//! else is immutable once constructed.

use std::cell::RefCell;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt;
use std::io::Write;
use std::rc::{Rc, Weak};

use thiserror::Error;

pub(crate) const INIT_METHOD: &str = "__init__";
pub(crate) const STR_METHOD: &str = "__str__";
pub(crate) const BOOL_METHOD: &str = "__bool__";
pub(crate) const ADD_METHOD: &str = "__add__";
pub(crate) const SUB_METHOD: &str = "__sub__";
pub(crate) const MUL_METHOD: &str = "__mul__";
pub(crate) const DIV_METHOD: &str = "__div__";
pub(crate) const EQ_METHOD: &str = "__eq__";
pub(crate) const LT_METHOD: &str = "__lt__";

const SELF_NAME: &str = "self";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RuntimeError {
    #[error("Undefined variable '{name}'")]
    UndefinedVariable { name: String },
    #[error("'{class}' object has no field '{field}'")]
    UndefinedField { class: String, field: String },
    #[error("Cannot access field '{field}' on a value of type {type_name}")]
    FieldOnNonInstance { field: String, type_name: String },
    #[error("Cannot call method '{method}' on a value of type {type_name}")]
    MethodOnNonInstance { method: String, type_name: String },
    #[error("Class '{class}' has no method '{method}' taking {argc} arguments")]
    UnknownMethod {
        class: String,
        method: String,
        argc: usize,
    },
    #[error("Operation '{operation}' is not supported between {lhs} and {rhs}")]
    UnsupportedOperation {
        operation: char,
        lhs: String,
        rhs: String,
    },
    #[error("Division by zero")]
    DivisionByZero,
    #[error("Cannot compare values of types {lhs} and {rhs}")]
    NotComparable { lhs: String, rhs: String },
    #[error("Return outside of a method body")]
    ReturnOutsideMethod,
    #[error("Could not write program output: {0}")]
    Output(String),
}

/// Non-local transfers that unwind statement evaluation: the `return` signal
/// and runtime failures. `Return` is not an error; it is caught exclusively
/// by the enclosing method body, while `Error` propagates to the driver.
#[derive(Debug)]
pub enum Interrupt {
    Return(ObjectHolder),
    Error(RuntimeError),
}

impl From<RuntimeError> for Interrupt {
    fn from(error: RuntimeError) -> Self {
        Interrupt::Error(error)
    }
}

pub type ExecResult = Result<ObjectHolder, Interrupt>;

/// A scope: mapping from identifier to value handle. Used both for the
/// top-level program scope and for method-local scopes.
pub type Closure = HashMap<String, ObjectHolder>;

/// An executable tree node. Every AST node evaluates itself against a
/// closure and a context.
pub trait Executable: fmt::Debug {
    fn execute(&self, closure: &mut Closure, context: &mut dyn Context) -> ExecResult;
}

/// Sink for program output. Its lifetime covers one program execution.
pub trait Context {
    fn output(&mut self) -> &mut dyn Write;
}

/// Context writing to a caller-owned stream.
pub struct SimpleContext<'a> {
    output: &'a mut dyn Write,
}

impl<'a> SimpleContext<'a> {
    pub fn new(output: &'a mut dyn Write) -> Self {
        Self { output }
    }
}

impl Context for SimpleContext<'_> {
    fn output(&mut self) -> &mut dyn Write {
        &mut *self.output
    }
}

/// Context whose output is collected in memory and thrown away. Used when a
/// value is rendered without reaching program output.
#[derive(Default)]
pub struct DummyContext {
    buffer: Vec<u8>,
}

impl Context for DummyContext {
    fn output(&mut self) -> &mut dyn Write {
        &mut self.buffer
    }
}

/// A method of a class: name, formal parameter names, and the body to
/// execute against a fresh local closure.
#[derive(Debug)]
pub struct Method {
    pub name: String,
    pub formal_params: Vec<String>,
    pub body: Box<dyn Executable>,
}

/// A class descriptor. Immutable once constructed; the parent link is weak,
/// the strong handle lives in the syntax tree node that declared the parent.
#[derive(Debug)]
pub struct Class {
    name: String,
    methods: Vec<Rc<Method>>,
    parent: Option<Weak<Class>>,
}

impl Class {
    pub fn new(name: String, methods: Vec<Method>, parent: Option<&Rc<Class>>) -> Self {
        Self {
            name,
            methods: methods.into_iter().map(Rc::new).collect(),
            parent: parent.map(Rc::downgrade),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Looks `name` up in this class's own methods, then in the parent chain.
    pub fn get_method(&self, name: &str) -> Option<Rc<Method>> {
        if let Some(method) = self.methods.iter().find(|method| method.name == name) {
            return Some(Rc::clone(method));
        }
        self.parent.as_ref()?.upgrade()?.get_method(name)
    }
}

/// A class instance: its class descriptor plus a field scope of its own.
#[derive(Debug)]
pub struct ClassInstance {
    class: Rc<Class>,
    fields: RefCell<Closure>,
}

impl ClassInstance {
    fn new(class: Rc<Class>) -> Self {
        Self {
            class,
            fields: RefCell::new(Closure::new()),
        }
    }

    pub fn class(&self) -> &Rc<Class> {
        &self.class
    }

    /// True when a method `name` with exactly `argc` formal parameters is
    /// reachable through this instance's class chain.
    pub fn has_method(&self, name: &str, argc: usize) -> bool {
        self.class
            .get_method(name)
            .is_some_and(|method| method.formal_params.len() == argc)
    }

    pub fn field(&self, name: &str) -> Option<ObjectHolder> {
        self.fields.borrow().get(name).cloned()
    }

    pub fn set_field(&self, name: &str, value: ObjectHolder) {
        self.fields.borrow_mut().insert(name.to_string(), value);
    }
}

#[derive(Debug)]
pub enum Object {
    Number(i64),
    String(String),
    Bool(bool),
    Class(Rc<Class>),
    Instance(ClassInstance),
}

/// Shared-ownership value handle. An empty handle is the `None` value.
#[derive(Debug, Clone, Default)]
pub struct ObjectHolder(Option<Rc<Object>>);

impl ObjectHolder {
    pub fn none() -> Self {
        Self(None)
    }

    pub fn number(value: i64) -> Self {
        Self(Some(Rc::new(Object::Number(value))))
    }

    pub fn string(value: impl Into<String>) -> Self {
        Self(Some(Rc::new(Object::String(value.into()))))
    }

    pub fn boolean(value: bool) -> Self {
        Self(Some(Rc::new(Object::Bool(value))))
    }

    pub fn class(class: Rc<Class>) -> Self {
        Self(Some(Rc::new(Object::Class(class))))
    }

    /// Allocates a fresh, field-less instance of `class`.
    pub fn new_instance(class: Rc<Class>) -> Self {
        Self(Some(Rc::new(Object::Instance(ClassInstance::new(class)))))
    }

    pub fn is_none(&self) -> bool {
        self.0.is_none()
    }

    pub fn try_as_number(&self) -> Option<i64> {
        match self.0.as_deref() {
            Some(Object::Number(value)) => Some(*value),
            _ => None,
        }
    }

    pub fn try_as_string(&self) -> Option<&str> {
        match self.0.as_deref() {
            Some(Object::String(value)) => Some(value),
            _ => None,
        }
    }

    pub fn try_as_bool(&self) -> Option<bool> {
        match self.0.as_deref() {
            Some(Object::Bool(value)) => Some(*value),
            _ => None,
        }
    }

    pub fn try_as_class(&self) -> Option<&Rc<Class>> {
        match self.0.as_deref() {
            Some(Object::Class(class)) => Some(class),
            _ => None,
        }
    }

    pub fn try_as_instance(&self) -> Option<&ClassInstance> {
        match self.0.as_deref() {
            Some(Object::Instance(instance)) => Some(instance),
            _ => None,
        }
    }

    pub fn type_name(&self) -> String {
        match self.0.as_deref() {
            None => "NoneType".to_string(),
            Some(Object::Number(_)) => "int".to_string(),
            Some(Object::String(_)) => "str".to_string(),
            Some(Object::Bool(_)) => "bool".to_string(),
            Some(Object::Class(_)) => "class".to_string(),
            Some(Object::Instance(instance)) => instance.class().name().to_string(),
        }
    }

    /// An empty handle, zero, `False`, and the empty string are false;
    /// everything else, classes and instances included, is true.
    pub fn is_truthy(&self) -> bool {
        match self.0.as_deref() {
            None => false,
            Some(Object::Number(value)) => *value != 0,
            Some(Object::String(value)) => !value.is_empty(),
            Some(Object::Bool(value)) => *value,
            Some(Object::Class(_)) | Some(Object::Instance(_)) => true,
        }
    }

    /// Invokes method `name` on an instance value: binds `self` and the
    /// formal parameters in a fresh local closure and executes the body.
    /// The body is expected to handle the return signal itself; whatever it
    /// yields is the call's result.
    pub fn call_method(
        &self,
        name: &str,
        args: Vec<ObjectHolder>,
        context: &mut dyn Context,
    ) -> ExecResult {
        let Some(instance) = self.try_as_instance() else {
            return Err(RuntimeError::MethodOnNonInstance {
                method: name.to_string(),
                type_name: self.type_name(),
            }
            .into());
        };
        let method = instance
            .class()
            .get_method(name)
            .filter(|method| method.formal_params.len() == args.len());
        let Some(method) = method else {
            return Err(RuntimeError::UnknownMethod {
                class: instance.class().name().to_string(),
                method: name.to_string(),
                argc: args.len(),
            }
            .into());
        };

        let mut local = Closure::new();
        local.insert(SELF_NAME.to_string(), self.clone());
        for (formal, actual) in method.formal_params.iter().zip(args) {
            local.insert(formal.clone(), actual);
        }
        method.body.execute(&mut local, context)
    }

    /// Renders the value into `out`. Instances dispatch to `__str__` when one
    /// with zero parameters exists, falling back to an identity rendering.
    /// Nested output produced while `__str__` runs goes to `context`.
    pub fn print(&self, out: &mut dyn Write, context: &mut dyn Context) -> Result<(), Interrupt> {
        let write_error = |error: std::io::Error| RuntimeError::Output(error.to_string());
        match self.0.as_deref() {
            None => write!(out, "None").map_err(write_error)?,
            Some(Object::Number(value)) => write!(out, "{value}").map_err(write_error)?,
            Some(Object::String(value)) => write!(out, "{value}").map_err(write_error)?,
            Some(Object::Bool(value)) => {
                write!(out, "{}", if *value { "True" } else { "False" }).map_err(write_error)?;
            }
            Some(Object::Class(class)) => {
                write!(out, "Class {}", class.name()).map_err(write_error)?;
            }
            Some(Object::Instance(instance)) => {
                if instance.has_method(STR_METHOD, 0) {
                    let rendered = self.call_method(STR_METHOD, Vec::new(), context)?;
                    rendered.print(out, context)?;
                } else {
                    write!(out, "<{} object>", instance.class().name()).map_err(write_error)?;
                }
            }
        }
        Ok(())
    }
}

/// `lhs == rhs`. Instance left-hand sides dispatch to `__eq__`; otherwise
/// both sides must be the same primitive variant.
pub fn equal(
    lhs: &ObjectHolder,
    rhs: &ObjectHolder,
    context: &mut dyn Context,
) -> Result<bool, Interrupt> {
    compare(lhs, rhs, context, EQ_METHOD, Ordering::is_eq)
}

/// `lhs < rhs`. Instance left-hand sides dispatch to `__lt__`; strings
/// compare in byte order.
pub fn less(
    lhs: &ObjectHolder,
    rhs: &ObjectHolder,
    context: &mut dyn Context,
) -> Result<bool, Interrupt> {
    compare(lhs, rhs, context, LT_METHOD, Ordering::is_lt)
}

pub fn not_equal(
    lhs: &ObjectHolder,
    rhs: &ObjectHolder,
    context: &mut dyn Context,
) -> Result<bool, Interrupt> {
    Ok(!equal(lhs, rhs, context)?)
}

pub fn greater(
    lhs: &ObjectHolder,
    rhs: &ObjectHolder,
    context: &mut dyn Context,
) -> Result<bool, Interrupt> {
    Ok(!less(lhs, rhs, context)? && !equal(lhs, rhs, context)?)
}

pub fn less_or_equal(
    lhs: &ObjectHolder,
    rhs: &ObjectHolder,
    context: &mut dyn Context,
) -> Result<bool, Interrupt> {
    Ok(!greater(lhs, rhs, context)?)
}

pub fn greater_or_equal(
    lhs: &ObjectHolder,
    rhs: &ObjectHolder,
    context: &mut dyn Context,
) -> Result<bool, Interrupt> {
    Ok(!less(lhs, rhs, context)?)
}

fn compare(
    lhs: &ObjectHolder,
    rhs: &ObjectHolder,
    context: &mut dyn Context,
    dunder: &str,
    accept: fn(Ordering) -> bool,
) -> Result<bool, Interrupt> {
    if let Some(instance) = lhs.try_as_instance() {
        if instance.has_method(dunder, 1) {
            let verdict = lhs.call_method(dunder, vec![rhs.clone()], context)?;
            return Ok(verdict.is_truthy());
        }
    }
    match primitive_ordering(lhs, rhs) {
        Some(ordering) => Ok(accept(ordering)),
        None => Err(RuntimeError::NotComparable {
            lhs: lhs.type_name(),
            rhs: rhs.type_name(),
        }
        .into()),
    }
}

fn primitive_ordering(lhs: &ObjectHolder, rhs: &ObjectHolder) -> Option<Ordering> {
    match (lhs.0.as_deref()?, rhs.0.as_deref()?) {
        (Object::Number(a), Object::Number(b)) => Some(a.cmp(b)),
        (Object::String(a), Object::String(b)) => Some(a.cmp(b)),
        (Object::Bool(a), Object::Bool(b)) => Some(a.cmp(b)),
        _ => None,
    }
}
