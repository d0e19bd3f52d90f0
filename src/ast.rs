//! Executable syntax tree.
//!
//! The parser builds these nodes once; each node then evaluates itself
//! against a closure and a context. The `return` statement raises
//! [`Interrupt::Return`], which travels up through `?` until the nearest
//! `MethodBody` node catches it.

use std::io::Write;
use std::rc::Rc;

use crate::runtime::{
    self, Class, Closure, Context, DummyContext, ExecResult, Executable, Interrupt, ObjectHolder,
    RuntimeError,
};
use crate::runtime::{
    ADD_METHOD, BOOL_METHOD, DIV_METHOD, INIT_METHOD, MUL_METHOD, STR_METHOD, SUB_METHOD,
};

/// Comparison operators, resolved by the runtime comparison functions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Equal,
    NotEqual,
    Less,
    Greater,
    LessOrEqual,
    GreaterOrEqual,
}

#[derive(Debug)]
pub enum Statement {
    NumericConst(i64),
    StringConst(String),
    BoolConst(bool),
    None,
    /// Variable lookup through a chain of instance fields: `a.b.c`.
    VariableValue(Vec<String>),
    /// `name = value` in the current closure.
    Assignment {
        name: String,
        value: Box<Statement>,
    },
    /// `object.field = value`, where `object` is a dotted path.
    FieldAssignment {
        object: Vec<String>,
        field: String,
        value: Box<Statement>,
    },
    Print(Vec<Statement>),
    /// Statement-position method call; the method's result is discarded.
    MethodCall {
        object: Box<Statement>,
        method: String,
        args: Vec<Statement>,
    },
    /// Expression-position method call; yields the method's result.
    MethodCallExpr {
        object: Box<Statement>,
        method: String,
        args: Vec<Statement>,
    },
    /// `ClassName(args)`: allocates a fresh instance on every evaluation and
    /// runs `__init__` when one with a matching parameter count exists.
    NewInstance {
        class: Rc<Class>,
        args: Vec<Statement>,
    },
    /// `str(arg)`.
    Stringify(Box<Statement>),
    Add(Box<Statement>, Box<Statement>),
    Sub(Box<Statement>, Box<Statement>),
    Mult(Box<Statement>, Box<Statement>),
    Div(Box<Statement>, Box<Statement>),
    Or(Box<Statement>, Box<Statement>),
    And(Box<Statement>, Box<Statement>),
    Not(Box<Statement>),
    /// A statement sequence: the program itself, a suite, a branch body.
    Compound(Vec<Statement>),
    /// Method body boundary: the only place the return signal is caught.
    MethodBody(Box<Statement>),
    Return(Box<Statement>),
    /// Binds the class name to the class value in the enclosing closure.
    ClassDefinition(Rc<Class>),
    IfElse {
        condition: Box<Statement>,
        if_body: Box<Statement>,
        else_body: Option<Box<Statement>>,
    },
    Comparison {
        op: CompareOp,
        lhs: Box<Statement>,
        rhs: Box<Statement>,
    },
}

impl Executable for Statement {
    fn execute(&self, closure: &mut Closure, context: &mut dyn Context) -> ExecResult {
        match self {
            Statement::NumericConst(value) => Ok(ObjectHolder::number(*value)),
            Statement::StringConst(value) => Ok(ObjectHolder::string(value.clone())),
            Statement::BoolConst(value) => Ok(ObjectHolder::boolean(*value)),
            Statement::None => Ok(ObjectHolder::none()),
            Statement::VariableValue(ids) => Ok(resolve_dotted(ids, closure)?),
            Statement::Assignment { name, value } => {
                let value = value.execute(closure, context)?;
                closure.insert(name.clone(), value.clone());
                Ok(value)
            }
            Statement::FieldAssignment {
                object,
                field,
                value,
            } => {
                let target = resolve_dotted(object, closure)?;
                let value = value.execute(closure, context)?;
                let Some(instance) = target.try_as_instance() else {
                    return Err(RuntimeError::FieldOnNonInstance {
                        field: field.clone(),
                        type_name: target.type_name(),
                    }
                    .into());
                };
                instance.set_field(field, value.clone());
                Ok(value)
            }
            Statement::Print(args) => execute_print(args, closure, context),
            Statement::MethodCall {
                object,
                method,
                args,
            } => {
                invoke_method(object, method, args, closure, context)?;
                Ok(ObjectHolder::none())
            }
            Statement::MethodCallExpr {
                object,
                method,
                args,
            } => invoke_method(object, method, args, closure, context),
            Statement::NewInstance { class, args } => {
                let instance = ObjectHolder::new_instance(Rc::clone(class));
                let has_init = instance
                    .try_as_instance()
                    .is_some_and(|instance| instance.has_method(INIT_METHOD, args.len()));
                if has_init {
                    let args = execute_all(args, closure, context)?;
                    instance.call_method(INIT_METHOD, args, context)?;
                }
                Ok(instance)
            }
            Statement::Stringify(arg) => {
                let value = arg.execute(closure, context)?;
                let has_str = value
                    .try_as_instance()
                    .is_some_and(|instance| instance.has_method(STR_METHOD, 0));
                let value = if has_str {
                    value.call_method(STR_METHOD, Vec::new(), context)?
                } else {
                    value
                };
                let mut rendered = Vec::new();
                let mut dummy = DummyContext::default();
                value.print(&mut rendered, &mut dummy)?;
                Ok(ObjectHolder::string(
                    String::from_utf8_lossy(&rendered).into_owned(),
                ))
            }
            Statement::Add(lhs, rhs) => {
                let lhs = lhs.execute(closure, context)?;
                let rhs = rhs.execute(closure, context)?;
                if let (Some(a), Some(b)) = (lhs.try_as_number(), rhs.try_as_number()) {
                    return Ok(ObjectHolder::number(a + b));
                }
                if let (Some(a), Some(b)) = (lhs.try_as_string(), rhs.try_as_string()) {
                    return Ok(ObjectHolder::string(format!("{a}{b}")));
                }
                dunder_arithmetic('+', ADD_METHOD, &lhs, &rhs, context)
            }
            Statement::Sub(lhs, rhs) => {
                numeric_binary(lhs, rhs, closure, context, '-', SUB_METHOD, |a, b| {
                    Ok(a - b)
                })
            }
            Statement::Mult(lhs, rhs) => {
                numeric_binary(lhs, rhs, closure, context, '*', MUL_METHOD, |a, b| {
                    Ok(a * b)
                })
            }
            Statement::Div(lhs, rhs) => {
                numeric_binary(lhs, rhs, closure, context, '/', DIV_METHOD, |a, b| {
                    if b == 0 {
                        return Err(RuntimeError::DivisionByZero);
                    }
                    Ok(a / b)
                })
            }
            Statement::Or(lhs, rhs) => {
                if coerce_truthy(&lhs.execute(closure, context)?, context)? {
                    return Ok(ObjectHolder::boolean(true));
                }
                let rhs = rhs.execute(closure, context)?;
                Ok(ObjectHolder::boolean(coerce_truthy(&rhs, context)?))
            }
            Statement::And(lhs, rhs) => {
                if !coerce_truthy(&lhs.execute(closure, context)?, context)? {
                    return Ok(ObjectHolder::boolean(false));
                }
                let rhs = rhs.execute(closure, context)?;
                Ok(ObjectHolder::boolean(coerce_truthy(&rhs, context)?))
            }
            Statement::Not(arg) => {
                let value = arg.execute(closure, context)?;
                Ok(ObjectHolder::boolean(!coerce_truthy(&value, context)?))
            }
            Statement::Compound(statements) => {
                for statement in statements {
                    statement.execute(closure, context)?;
                }
                Ok(ObjectHolder::none())
            }
            Statement::MethodBody(body) => match body.execute(closure, context) {
                Ok(_) => Ok(ObjectHolder::none()),
                Err(Interrupt::Return(value)) => Ok(value),
                Err(error) => Err(error),
            },
            Statement::Return(value) => {
                Err(Interrupt::Return(value.execute(closure, context)?))
            }
            Statement::ClassDefinition(class) => {
                closure.insert(
                    class.name().to_string(),
                    ObjectHolder::class(Rc::clone(class)),
                );
                Ok(ObjectHolder::none())
            }
            Statement::IfElse {
                condition,
                if_body,
                else_body,
            } => {
                if condition.execute(closure, context)?.is_truthy() {
                    return if_body.execute(closure, context);
                }
                if let Some(else_body) = else_body {
                    return else_body.execute(closure, context);
                }
                Ok(ObjectHolder::none())
            }
            Statement::Comparison { op, lhs, rhs } => {
                let lhs = lhs.execute(closure, context)?;
                let rhs = rhs.execute(closure, context)?;
                let verdict = match op {
                    CompareOp::Equal => runtime::equal(&lhs, &rhs, context)?,
                    CompareOp::NotEqual => runtime::not_equal(&lhs, &rhs, context)?,
                    CompareOp::Less => runtime::less(&lhs, &rhs, context)?,
                    CompareOp::Greater => runtime::greater(&lhs, &rhs, context)?,
                    CompareOp::LessOrEqual => runtime::less_or_equal(&lhs, &rhs, context)?,
                    CompareOp::GreaterOrEqual => runtime::greater_or_equal(&lhs, &rhs, context)?,
                };
                Ok(ObjectHolder::boolean(verdict))
            }
        }
    }
}

/// Walks a dotted identifier path: the first id comes from the closure, each
/// following id from the fields of the instance reached so far.
fn resolve_dotted(ids: &[String], closure: &Closure) -> Result<ObjectHolder, RuntimeError> {
    let Some((first, rest)) = ids.split_first() else {
        return Err(RuntimeError::UndefinedVariable {
            name: String::new(),
        });
    };
    let mut value = closure
        .get(first)
        .cloned()
        .ok_or_else(|| RuntimeError::UndefinedVariable { name: first.clone() })?;
    for name in rest {
        let Some(instance) = value.try_as_instance() else {
            return Err(RuntimeError::FieldOnNonInstance {
                field: name.clone(),
                type_name: value.type_name(),
            });
        };
        let field = instance
            .field(name)
            .ok_or_else(|| RuntimeError::UndefinedField {
                class: instance.class().name().to_string(),
                field: name.clone(),
            })?;
        value = field;
    }
    Ok(value)
}

fn execute_all(
    args: &[Statement],
    closure: &mut Closure,
    context: &mut dyn Context,
) -> Result<Vec<ObjectHolder>, Interrupt> {
    let mut values = Vec::with_capacity(args.len());
    for arg in args {
        values.push(arg.execute(closure, context)?);
    }
    Ok(values)
}

fn execute_print(
    args: &[Statement],
    closure: &mut Closure,
    context: &mut dyn Context,
) -> ExecResult {
    let write_error = |error: std::io::Error| RuntimeError::Output(error.to_string());
    for (index, arg) in args.iter().enumerate() {
        let value = arg.execute(closure, context)?;
        // Render to a buffer first: __str__ dispatch may itself print, and
        // that output goes to the context stream, not into this line.
        let mut rendered = Vec::new();
        value.print(&mut rendered, context)?;
        let out = context.output();
        if index > 0 {
            write!(out, " ").map_err(write_error)?;
        }
        out.write_all(&rendered).map_err(write_error)?;
    }
    writeln!(context.output()).map_err(write_error)?;
    Ok(ObjectHolder::none())
}

fn invoke_method(
    object: &Statement,
    method: &str,
    args: &[Statement],
    closure: &mut Closure,
    context: &mut dyn Context,
) -> ExecResult {
    let receiver = object.execute(closure, context)?;
    if receiver.try_as_instance().is_none() {
        return Err(RuntimeError::MethodOnNonInstance {
            method: method.to_string(),
            type_name: receiver.type_name(),
        }
        .into());
    }
    let args = execute_all(args, closure, context)?;
    receiver.call_method(method, args, context)
}

fn numeric_binary(
    lhs: &Statement,
    rhs: &Statement,
    closure: &mut Closure,
    context: &mut dyn Context,
    operation: char,
    dunder: &str,
    apply: fn(i64, i64) -> Result<i64, RuntimeError>,
) -> ExecResult {
    let lhs = lhs.execute(closure, context)?;
    let rhs = rhs.execute(closure, context)?;
    if let (Some(a), Some(b)) = (lhs.try_as_number(), rhs.try_as_number()) {
        return Ok(ObjectHolder::number(apply(a, b)?));
    }
    dunder_arithmetic(operation, dunder, &lhs, &rhs, context)
}

fn dunder_arithmetic(
    operation: char,
    dunder: &str,
    lhs: &ObjectHolder,
    rhs: &ObjectHolder,
    context: &mut dyn Context,
) -> ExecResult {
    if lhs.try_as_instance().is_some() {
        return lhs.call_method(dunder, vec![rhs.clone()], context);
    }
    Err(RuntimeError::UnsupportedOperation {
        operation,
        lhs: lhs.type_name(),
        rhs: rhs.type_name(),
    }
    .into())
}

/// Coerces a value to a Boolean for the logical operators: instances with a
/// zero-parameter `__bool__` dispatch to it, everything else uses plain
/// truthiness.
fn coerce_truthy(value: &ObjectHolder, context: &mut dyn Context) -> Result<bool, Interrupt> {
    match value.try_as_instance() {
        Some(instance) if instance.has_method(BOOL_METHOD, 0) => {
            Ok(value.call_method(BOOL_METHOD, Vec::new(), context)?.is_truthy())
        }
        _ => Ok(value.is_truthy()),
    }
}
