//! A small stack machine that runs assembled bytecode.
//!
//! It implements just enough of the Nest object model to observe what a
//! program does: what it prints, what it returns and which error escapes.
//! Optimizations must not change any of the three.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;
use std::sync::Arc;

use nest_codegen::assembler::{Bytecode, OpCode};
use nest_codegen::ast::Operator;
use nest_codegen::optimizer::builtins;
use nest_codegen::runtime::ops;
use nest_codegen::runtime::{Type, Value};

const MAX_DEPTH: usize = 64;
const FUEL: usize = 2_000_000;
const MAX_RANGE: i64 = 10_000;

type Scope = Rc<RefCell<HashMap<Arc<str>, Obj>>>;
type Fallible<T> = Result<T, String>;

/// A runtime object.
#[derive(Debug, Clone)]
pub enum Obj {
    Val(Value),
    Seq(Rc<RefCell<Vec<Obj>>>),
    Map(Rc<RefCell<Vec<(Obj, Obj)>>>),
    Iter { items: Vec<Obj>, pos: usize },
    Scope(Scope),
}

impl Obj {
    fn seq(items: Vec<Obj>) -> Self {
        Obj::Seq(Rc::new(RefCell::new(items)))
    }

    fn type_of(&self) -> Type {
        match self {
            Obj::Val(value) => value.type_of(),
            Obj::Seq(_) => Type::Array,
            Obj::Map(_) | Obj::Scope(_) => Type::Map,
            Obj::Iter { .. } => Type::Iter,
        }
    }

    fn is_truthy(&self) -> bool {
        match self {
            Obj::Val(value) => value.is_truthy(),
            Obj::Seq(items) => !items.borrow().is_empty(),
            Obj::Map(entries) => !entries.borrow().is_empty(),
            Obj::Iter { .. } | Obj::Scope(_) => true,
        }
    }

    fn is_hashable(&self) -> bool {
        match self {
            Obj::Val(value) => value.is_hashable(),
            Obj::Seq(items) => items.borrow().iter().all(Obj::is_hashable),
            _ => false,
        }
    }

    fn as_int(&self) -> Fallible<i64> {
        match self {
            Obj::Val(Value::Int(i)) => Ok(*i),
            Obj::Val(Value::Byte(b)) => Ok(i64::from(*b)),
            other => Err(format!("expected an Int, got {}", other.type_of())),
        }
    }

    /// Source-like rendering, used for results.
    pub fn render(&self) -> String {
        match self {
            Obj::Val(value) => value.repr(),
            Obj::Seq(items) => {
                let items: Vec<String> = items.borrow().iter().map(Obj::render).collect();
                format!("{{{}}}", items.join(", "))
            }
            Obj::Map(entries) => {
                let entries: Vec<String> = entries
                    .borrow()
                    .iter()
                    .map(|(k, v)| format!("{}: {}", k.render(), v.render()))
                    .collect();
                format!("{{{}}}", entries.join(", "))
            }
            Obj::Iter { .. } => "<Iter>".to_string(),
            Obj::Scope(_) => "<Scope>".to_string(),
        }
    }

    /// What `>>>` prints: strings without quotes.
    fn print(&self) -> String {
        match self {
            Obj::Val(Value::Str(s)) => s.to_string(),
            other => other.render(),
        }
    }
}

fn obj_eq(a: &Obj, b: &Obj) -> bool {
    match (a, b) {
        (Obj::Val(x), Obj::Val(y)) => ops::equals(x, y),
        (Obj::Seq(x), Obj::Seq(y)) => {
            Rc::ptr_eq(x, y) || {
                let (x, y) = (x.borrow(), y.borrow());
                x.len() == y.len() && x.iter().zip(y.iter()).all(|(a, b)| obj_eq(a, b))
            }
        }
        (Obj::Map(x), Obj::Map(y)) => Rc::ptr_eq(x, y),
        (Obj::Scope(x), Obj::Scope(y)) => Rc::ptr_eq(x, y),
        _ => false,
    }
}

/// What running a unit produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outcome {
    /// Lines printed with `>>>`
    pub output: Vec<String>,
    /// The rendered return value, or the message of the escaping error
    pub result: Result<String, String>,
}

/// Runs a unit with fresh globals.
pub fn execute(bytecode: &Bytecode) -> Outcome {
    let mut vm = Vm::new();
    let globals = Rc::clone(&vm.globals);
    let result = vm.run(bytecode, globals).map(|value| value.render());
    Outcome {
        output: vm.output,
        result,
    }
}

struct Vm {
    globals: Scope,
    builtins: HashMap<&'static str, Value>,
    output: Vec<String>,
    depth: usize,
    fuel: usize,
}

struct Frame<'a> {
    code: &'a Bytecode,
    locals: Scope,
    stack: Vec<Obj>,
    /// Catch target and stack depth of every installed handler
    handlers: Vec<(usize, usize)>,
    error: Option<String>,
}

impl Frame<'_> {
    fn pop(&mut self) -> Fallible<Obj> {
        self.stack.pop().ok_or_else(|| "stack underflow".to_string())
    }

    fn pop_n(&mut self, n: usize) -> Fallible<Vec<Obj>> {
        let start = self
            .stack
            .len()
            .checked_sub(n)
            .ok_or_else(|| "stack underflow".to_string())?;
        Ok(self.stack.split_off(start))
    }

    fn top(&self) -> Fallible<&Obj> {
        self.stack.last().ok_or_else(|| "stack underflow".to_string())
    }

    fn top_mut(&mut self) -> Fallible<&mut Obj> {
        self.stack
            .last_mut()
            .ok_or_else(|| "stack underflow".to_string())
    }

    fn constant(&self, index: usize) -> Fallible<&Value> {
        self.code
            .constants
            .get(index)
            .ok_or_else(|| format!("no constant {index}"))
    }

    fn name(&self, index: usize) -> Fallible<Arc<str>> {
        match self.constant(index)? {
            Value::Str(name) => Ok(Arc::clone(name)),
            other => Err(format!("constant {} is not a name", other.repr())),
        }
    }
}

impl Vm {
    fn new() -> Self {
        Self {
            globals: Rc::new(RefCell::new(HashMap::new())),
            builtins: builtins::builtins().collect(),
            output: Vec::new(),
            depth: 0,
            fuel: FUEL,
        }
    }

    fn run(&mut self, code: &Bytecode, locals: Scope) -> Fallible<Obj> {
        let mut frame = Frame {
            code,
            locals,
            stack: Vec::new(),
            handlers: Vec::new(),
            error: None,
        };
        let mut pc = 0;

        loop {
            self.fuel = self
                .fuel
                .checked_sub(1)
                .ok_or_else(|| "out of fuel".to_string())?;
            let decoded = code
                .decode_at(pc)
                .ok_or_else(|| format!("no instruction at {pc}"))?;
            pc = decoded.next;

            match self.step(&mut frame, decoded.op, decoded.arg as usize, &mut pc) {
                Ok(Some(value)) => return Ok(value),
                Ok(None) => {}
                Err(message) => {
                    let Some(&(target, depth)) = frame.handlers.last() else {
                        return Err(message);
                    };
                    frame.stack.truncate(depth);
                    frame.error = Some(message);
                    pc = target;
                }
            }
        }
    }

    fn step(
        &mut self,
        frame: &mut Frame<'_>,
        op: OpCode,
        arg: usize,
        pc: &mut usize,
    ) -> Fallible<Option<Obj>> {
        match op {
            OpCode::PopVal => {
                frame.pop()?;
            }
            OpCode::ForStart => {
                let iterable = frame.pop()?;
                let items = iterate(&iterable)?;
                frame.stack.push(Obj::Iter { items, pos: 0 });
            }
            OpCode::ForIsDone => {
                let Obj::Iter { items, pos } = frame.top()? else {
                    return Err("not an iterator".to_string());
                };
                let done = *pos >= items.len();
                frame.stack.push(Obj::Val(Value::Bool(done)));
            }
            OpCode::ForGetVal => {
                let Obj::Iter { items, pos } = frame.top()? else {
                    return Err("not an iterator".to_string());
                };
                let item = items
                    .get(*pos)
                    .cloned()
                    .ok_or_else(|| "iterator exhausted".to_string())?;
                frame.stack.push(item);
            }
            OpCode::ForAdvance => {
                let Obj::Iter { pos, .. } = frame.top_mut()? else {
                    return Err("not an iterator".to_string());
                };
                *pos += 1;
            }
            OpCode::ReturnVal => return frame.pop().map(Some),
            OpCode::ReturnVars => {
                let mut entries: Vec<(Obj, Obj)> = frame
                    .locals
                    .borrow()
                    .iter()
                    .map(|(name, value)| (Obj::Val(Value::Str(Arc::clone(name))), value.clone()))
                    .collect();
                entries.sort_by_key(|(name, _)| name.render());
                return Ok(Some(Obj::Map(Rc::new(RefCell::new(entries)))));
            }
            OpCode::SetValLoc => {
                let name = frame.name(arg)?;
                let value = frame.pop()?;
                frame.locals.borrow_mut().insert(name, value);
            }
            OpCode::SetVal => {
                let name = frame.name(arg)?;
                let value = frame.top()?.clone();
                frame.locals.borrow_mut().insert(name, value);
            }
            OpCode::GetVal => {
                let name = frame.name(arg)?;
                let value = self.lookup(&frame.locals, &name);
                frame.stack.push(value);
            }
            OpCode::PushVal | OpCode::MakeFunc => {
                let value = frame.constant(arg)?.clone();
                frame.stack.push(Obj::Val(value));
            }
            OpCode::SetContVal | OpCode::SetContLoc => {
                let key = frame.pop()?;
                let container = frame.pop()?;
                let value = if op == OpCode::SetContLoc {
                    frame.pop()?
                } else {
                    frame.top()?.clone()
                };
                store(&container, key, value)?;
            }
            OpCode::ThrowErr => {
                let message = frame.pop()?;
                return Err(message.print());
            }
            OpCode::PushCatch => frame.handlers.push((arg, frame.stack.len())),
            OpCode::PopCatch => {
                frame.handlers.pop();
            }
            OpCode::SaveError => {
                let message = frame.error.take().unwrap_or_default();
                frame.stack.push(Obj::Val(Value::str(&message)));
            }
            OpCode::Call => {
                let func = frame.pop()?;
                let args = frame.pop_n(arg)?;
                let result = self.call(func, args)?;
                frame.stack.push(result);
            }
            OpCode::SeqCall => {
                let func = frame.pop()?;
                let Obj::Seq(items) = frame.pop()? else {
                    return Err("'*@' needs a sequence".to_string());
                };
                let args = items.borrow().clone();
                let result = self.call(func, args)?;
                frame.stack.push(result);
            }
            OpCode::Cast => {
                let ty = frame.pop()?;
                let value = frame.pop()?;
                frame.stack.push(cast(value, &ty)?);
            }
            OpCode::Range => {
                let bounds = frame.pop_n(arg)?;
                frame.stack.push(range(&bounds)?);
            }
            OpCode::StackOp => {
                let b = frame.pop()?;
                let a = frame.pop()?;
                frame.stack.push(binary(operator(arg)?, a, b)?);
            }
            OpCode::LocalOp => {
                let value = frame.pop()?;
                let result = self.unary(operator(arg)?, value)?;
                frame.stack.push(result);
            }
            OpCode::Import => return Err("imports are not available".to_string()),
            OpCode::Extract => {
                let key = frame.pop()?;
                let container = frame.pop()?;
                frame.stack.push(self.extract(&container, &key)?);
            }
            OpCode::NewInt => {
                frame.top()?.as_int()?;
            }
            OpCode::DecInt => {
                let counter = frame.top_mut()?;
                let n = counter.as_int()?;
                *counter = Obj::Val(Value::Int(n.wrapping_sub(1)));
            }
            OpCode::JumpIfZero => {
                if frame.top()?.as_int()? <= 0 {
                    *pc = arg;
                }
            }
            OpCode::Dup => {
                let top = frame.top()?.clone();
                frame.stack.push(top);
            }
            OpCode::Rot2 => {
                let len = frame.stack.len();
                if len < 2 {
                    return Err("stack underflow".to_string());
                }
                frame.stack.swap(len - 1, len - 2);
            }
            OpCode::Rot3 => {
                let top = frame.pop()?;
                let at = frame
                    .stack
                    .len()
                    .checked_sub(2)
                    .ok_or_else(|| "stack underflow".to_string())?;
                frame.stack.insert(at, top);
            }
            OpCode::MakeArr | OpCode::MakeVec => {
                let items = frame.pop_n(arg)?;
                frame.stack.push(Obj::seq(items));
            }
            OpCode::MakeArrRep | OpCode::MakeVecRep => {
                let count = frame.pop()?.as_int()?;
                let value = frame.pop()?;
                let count = usize::try_from(count).map_err(|_| "negative repetition".to_string())?;
                frame.stack.push(Obj::seq(vec![value; count]));
            }
            OpCode::MakeMap => {
                let flat = frame.pop_n(arg)?;
                let entries = flat
                    .chunks(2)
                    .map(|pair| (pair[0].clone(), pair[1].clone()))
                    .collect();
                frame.stack.push(Obj::Map(Rc::new(RefCell::new(entries))));
            }
            OpCode::UnpackSeq => {
                let Obj::Seq(items) = frame.pop()? else {
                    return Err("only sequences can be unpacked".to_string());
                };
                let items = items.borrow();
                if items.len() != arg {
                    return Err(format!(
                        "cannot unpack {} items into {arg} names",
                        items.len()
                    ));
                }
                frame.stack.extend(items.iter().rev().cloned());
            }
            OpCode::TypeCheck => {
                let Value::Type(expected) = *frame.constant(arg)? else {
                    return Err("type check without a type".to_string());
                };
                let found = frame.top()?.type_of();
                if found != expected {
                    return Err(format!("expected type '{expected}', got '{found}'"));
                }
            }
            OpCode::HashCheck => {
                let key = frame.top()?;
                if !key.is_hashable() {
                    return Err(format!("'{}' is not hashable", key.type_of()));
                }
            }
            OpCode::ExtendArg => return Err("dangling extension word".to_string()),
            OpCode::Jump => *pc = arg,
            OpCode::JumpIfT => {
                if frame.pop()?.is_truthy() {
                    *pc = arg;
                }
            }
            OpCode::JumpIfF => {
                if !frame.pop()?.is_truthy() {
                    *pc = arg;
                }
            }
        }
        Ok(None)
    }

    fn lookup(&self, locals: &Scope, name: &Arc<str>) -> Obj {
        if let Some(value) = locals.borrow().get(name) {
            return value.clone();
        }
        if let Some(value) = self.globals.borrow().get(name) {
            return value.clone();
        }
        match &**name {
            "_vars_" => Obj::Scope(Rc::clone(locals)),
            "_globals_" => Obj::Scope(Rc::clone(&self.globals)),
            other => Obj::Val(self.builtins.get(other).cloned().unwrap_or(Value::Null)),
        }
    }

    fn call(&mut self, func: Obj, args: Vec<Obj>) -> Fallible<Obj> {
        let Obj::Val(Value::Func(func)) = func else {
            return Err(format!("'{}' is not callable", func.type_of()));
        };
        if args.len() != func.arity() {
            return Err(format!(
                "expected {} arguments, got {}",
                func.arity(),
                args.len()
            ));
        }
        if self.depth >= MAX_DEPTH {
            return Err("maximum recursion depth exceeded".to_string());
        }

        let locals = func.params.iter().cloned().zip(args).collect();
        self.depth += 1;
        let result = self.run(&func.body, Rc::new(RefCell::new(locals)));
        self.depth -= 1;
        result
    }

    fn unary(&mut self, op: Operator, value: Obj) -> Fallible<Obj> {
        if op == Operator::Stdout {
            self.output.push(value.print());
            return Ok(value);
        }
        match (op, &value) {
            (Operator::Len, Obj::Seq(items)) => Ok(Obj::Val(Value::Int(items.borrow().len() as i64))),
            (Operator::Len, Obj::Map(entries)) => {
                Ok(Obj::Val(Value::Int(entries.borrow().len() as i64)))
            }
            (Operator::Len, Obj::Scope(vars)) => Ok(Obj::Val(Value::Int(vars.borrow().len() as i64))),
            (Operator::Not, other) => Ok(Obj::Val(Value::Bool(!other.is_truthy()))),
            (Operator::Typeof, other) => Ok(Obj::Val(Value::Type(other.type_of()))),
            (_, Obj::Val(v)) => ops::local_op(op, v)
                .map(Obj::Val)
                .map_err(|e| e.to_string()),
            (_, other) => Err(format!(
                "invalid type '{}' for '{}'",
                other.type_of(),
                op.symbol()
            )),
        }
    }

    fn extract(&self, container: &Obj, key: &Obj) -> Fallible<Obj> {
        match (container, key) {
            (Obj::Seq(items), key) => {
                let items = items.borrow();
                let index = index(items.len(), key.as_int()?)?;
                Ok(items[index].clone())
            }
            (Obj::Map(entries), key) => entries
                .borrow()
                .iter()
                .find(|(k, _)| obj_eq(k, key))
                .map(|(_, v)| v.clone())
                .ok_or_else(|| format!("key {} not found", key.render())),
            (Obj::Scope(vars), Obj::Val(Value::Str(name))) => Ok(vars
                .borrow()
                .get(name)
                .cloned()
                .unwrap_or(Obj::Val(Value::Null))),
            (Obj::Val(Value::Str(s)), key) => {
                let chars: Vec<char> = s.chars().collect();
                let index = index(chars.len(), key.as_int()?)?;
                Ok(Obj::Val(Value::str(&chars[index].to_string())))
            }
            (container, _) => Err(format!("cannot index '{}'", container.type_of())),
        }
    }
}

fn operator(code: usize) -> Fallible<Operator> {
    Operator::from_code(code as i64).ok_or_else(|| format!("unknown operator {code}"))
}

fn index(len: usize, i: i64) -> Fallible<usize> {
    let resolved = if i < 0 { len as i64 + i } else { i };
    usize::try_from(resolved)
        .ok()
        .filter(|&idx| idx < len)
        .ok_or_else(|| format!("index {i} out of range"))
}

fn binary(op: Operator, a: Obj, b: Obj) -> Fallible<Obj> {
    match (op, &a, &b) {
        (Operator::Eq, _, _) => Ok(Obj::Val(Value::Bool(obj_eq(&a, &b)))),
        (Operator::Ne, _, _) => Ok(Obj::Val(Value::Bool(!obj_eq(&a, &b)))),
        (_, Obj::Val(x), Obj::Val(y)) => ops::stack_op(op, x, y)
            .map(Obj::Val)
            .map_err(|e| e.to_string()),
        _ => Err(format!(
            "invalid types '{}' and '{}' for '{}'",
            a.type_of(),
            b.type_of(),
            op.symbol()
        )),
    }
}

fn store(container: &Obj, key: Obj, value: Obj) -> Fallible<()> {
    match (container, &key) {
        (Obj::Seq(items), key) => {
            let mut items = items.borrow_mut();
            let index = index(items.len(), key.as_int()?)?;
            items[index] = value;
        }
        (Obj::Map(entries), _) => {
            if !key.is_hashable() {
                return Err(format!("'{}' is not hashable", key.type_of()));
            }
            let mut entries = entries.borrow_mut();
            match entries.iter_mut().find(|(k, _)| obj_eq(k, &key)) {
                Some(entry) => entry.1 = value,
                None => entries.push((key, value)),
            }
        }
        (Obj::Scope(vars), Obj::Val(Value::Str(name))) => {
            vars.borrow_mut().insert(Arc::clone(name), value);
        }
        (container, _) => {
            return Err(format!("cannot assign into '{}'", container.type_of()));
        }
    }
    Ok(())
}

fn iterate(iterable: &Obj) -> Fallible<Vec<Obj>> {
    match iterable {
        Obj::Seq(items) => Ok(items.borrow().clone()),
        Obj::Map(entries) => Ok(entries
            .borrow()
            .iter()
            .map(|(k, v)| Obj::seq(vec![k.clone(), v.clone()]))
            .collect()),
        Obj::Val(Value::Str(s)) => Ok(s
            .chars()
            .map(|c| Obj::Val(Value::str(&c.to_string())))
            .collect()),
        other => Err(format!("'{}' is not iterable", other.type_of())),
    }
}

fn range(bounds: &[Obj]) -> Fallible<Obj> {
    let (start, end, step) = match bounds {
        [start, end] => {
            let (start, end) = (start.as_int()?, end.as_int()?);
            (start, end, if start <= end { 1 } else { -1 })
        }
        [start, end, step] => (start.as_int()?, end.as_int()?, step.as_int()?),
        _ => return Err("a range needs 2 or 3 bounds".to_string()),
    };
    if step == 0 {
        return Err("range step cannot be zero".to_string());
    }
    if (end - start) / step > MAX_RANGE {
        return Err("range too long".to_string());
    }

    let mut items = Vec::new();
    let mut i = start;
    while (step > 0 && i < end) || (step < 0 && i > end) {
        items.push(Obj::Val(Value::Int(i)));
        i += step;
    }
    Ok(Obj::seq(items))
}

fn cast(value: Obj, ty: &Obj) -> Fallible<Obj> {
    let Obj::Val(Value::Type(ty)) = ty else {
        return Err("'::' needs a type".to_string());
    };
    if value.type_of() == *ty {
        return Ok(value);
    }
    let cast = match (&value, ty) {
        (_, Type::Str) => Value::str(&value.print()),
        (_, Type::Bool) => Value::Bool(value.is_truthy()),
        (Obj::Val(Value::Real(r)), Type::Int) => Value::Int(*r as i64),
        (Obj::Val(Value::Bool(b)), Type::Int) => Value::Int(i64::from(*b)),
        (Obj::Val(Value::Byte(b)), Type::Int) => Value::Int(i64::from(*b)),
        (Obj::Val(Value::Str(s)), Type::Int) => Value::Int(
            s.trim()
                .parse()
                .map_err(|_| format!("cannot cast '{s}' to Int"))?,
        ),
        (Obj::Val(Value::Int(i)), Type::Real) => Value::Real(*i as f64),
        _ => {
            return Err(format!(
                "cannot cast '{}' to '{}'",
                value.type_of(),
                ty
            ));
        }
    };
    Ok(Obj::Val(cast))
}
