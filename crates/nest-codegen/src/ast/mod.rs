//! Syntax tree definitions for Nest.
//!
//! The tree is built by the parser, which lives outside this crate, and is
//! consumed here by the tree optimizer and the compiler. Every node carries
//! the span it was parsed from so that later stages can attribute errors.
//!
//! Node kinds come in two families: statements, which never leave a value
//! on the evaluation stack, and expressions, which always leave exactly one.
//! [`NodeKind::returns_value`] tells them apart.

use std::fmt;
use std::sync::Arc;

use crate::runtime::value::Value;

/// A position in the source text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, PartialOrd, Ord)]
pub struct Pos {
    /// Zero-based line
    pub line: u32,
    /// Zero-based column
    pub col: u32,
}

impl Pos {
    /// Creates a new position.
    pub const fn new(line: u32, col: u32) -> Self {
        Self { line, col }
    }
}

/// A range of source text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Span {
    /// First position covered
    pub start: Pos,
    /// Last position covered
    pub end: Pos,
}

impl Span {
    /// Creates a new span.
    pub const fn new(start: Pos, end: Pos) -> Self {
        Self { start, end }
    }

    /// Returns the smallest span covering both `self` and `other`.
    pub fn join(self, other: Span) -> Span {
        Span {
            start: self.start.min(other.start),
            end: self.end.max(other.end),
        }
    }
}

impl fmt::Display for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}-{}:{}",
            self.start.line + 1,
            self.start.col + 1,
            self.end.line + 1,
            self.end.col + 1
        )
    }
}

/// Operators that can appear in stack, local-stack and local operations.
///
/// The discriminant is the operand of `STACK_OP` and `LOCAL_OP`
/// instructions, so the order is part of the bytecode format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Operator {
    // Arithmetic
    /// `+`
    Add,
    /// `-`
    Sub,
    /// `*`
    Mul,
    /// `/`
    Div,
    /// `^`
    Pow,
    /// `%`
    Mod,

    // Bitwise
    /// `&`
    BitAnd,
    /// `|`
    BitOr,
    /// `^^`
    BitXor,
    /// `<<`
    Shl,
    /// `>>`
    Shr,

    /// `><`
    Concat,

    // Logical
    /// `&&`
    And,
    /// `||`
    Or,
    /// `&|`
    Xor,

    // Comparison
    /// `>`
    Gt,
    /// `<`
    Lt,
    /// `==`
    Eq,
    /// `!=`
    Ne,
    /// `>=`
    Ge,
    /// `<=`
    Le,

    // Local-stack operators
    /// `::`
    Cast,
    /// `@`
    Call,
    /// `*@`
    SeqCall,
    /// `!!`
    Throw,
    /// `->`
    Range,

    // Local operators
    /// `$`
    Len,
    /// `!`
    Not,
    /// `~`
    BitNot,
    /// `>>>`
    Stdout,
    /// `<<<`
    Stdin,
    /// `|#|`
    Import,
    /// `@@`
    LocCall,
    /// `-:`
    Neg,
    /// `?::`
    Typeof,
}

impl Operator {
    const ALL: [Operator; 35] = [
        Operator::Add,
        Operator::Sub,
        Operator::Mul,
        Operator::Div,
        Operator::Pow,
        Operator::Mod,
        Operator::BitAnd,
        Operator::BitOr,
        Operator::BitXor,
        Operator::Shl,
        Operator::Shr,
        Operator::Concat,
        Operator::And,
        Operator::Or,
        Operator::Xor,
        Operator::Gt,
        Operator::Lt,
        Operator::Eq,
        Operator::Ne,
        Operator::Ge,
        Operator::Le,
        Operator::Cast,
        Operator::Call,
        Operator::SeqCall,
        Operator::Throw,
        Operator::Range,
        Operator::Len,
        Operator::Not,
        Operator::BitNot,
        Operator::Stdout,
        Operator::Stdin,
        Operator::Import,
        Operator::LocCall,
        Operator::Neg,
        Operator::Typeof,
    ];

    /// Returns the operator's numeric code.
    pub fn code(self) -> u8 {
        self as u8
    }

    /// Looks an operator up by its numeric code.
    pub fn from_code(code: i64) -> Option<Operator> {
        usize::try_from(code)
            .ok()
            .and_then(|idx| Self::ALL.get(idx).copied())
    }

    /// Returns the operator as written in source code.
    pub fn symbol(self) -> &'static str {
        match self {
            Operator::Add => "+",
            Operator::Sub => "-",
            Operator::Mul => "*",
            Operator::Div => "/",
            Operator::Pow => "^",
            Operator::Mod => "%",
            Operator::BitAnd => "&",
            Operator::BitOr => "|",
            Operator::BitXor => "^^",
            Operator::Shl => "<<",
            Operator::Shr => ">>",
            Operator::Concat => "><",
            Operator::And => "&&",
            Operator::Or => "||",
            Operator::Xor => "&|",
            Operator::Gt => ">",
            Operator::Lt => "<",
            Operator::Eq => "==",
            Operator::Ne => "!=",
            Operator::Ge => ">=",
            Operator::Le => "<=",
            Operator::Cast => "::",
            Operator::Call => "@",
            Operator::SeqCall => "*@",
            Operator::Throw => "!!",
            Operator::Range => "->",
            Operator::Len => "$",
            Operator::Not => "!",
            Operator::BitNot => "~",
            Operator::Stdout => ">>>",
            Operator::Stdin => "<<<",
            Operator::Import => "|#|",
            Operator::LocCall => "@@",
            Operator::Neg => "-:",
            Operator::Typeof => "?::",
        }
    }

    /// Returns true for `>`, `<`, `==`, `!=`, `>=` and `<=`.
    pub fn is_comparison(self) -> bool {
        matches!(
            self,
            Operator::Gt | Operator::Lt | Operator::Eq | Operator::Ne | Operator::Ge | Operator::Le
        )
    }

    /// Returns true for the short-circuiting operators `&&` and `||`.
    pub fn is_short_circuit(self) -> bool {
        matches!(self, Operator::And | Operator::Or)
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

/// The flavour of a sequence literal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeqKind {
    /// `{a, b, c}`
    Array,
    /// `{value; count}`: `values` holds the value then the count
    ArrayRep,
    /// `<{a, b, c}>`
    Vector,
    /// `<{value; count}>`: `values` holds the value then the count
    VectorRep,
    /// The left side of an unpacking assignment
    AssignmentNames,
}

/// One `case` of a switch statement.
#[derive(Debug, Clone, PartialEq)]
pub struct SwitchCase {
    /// The value compared against the switched expression
    pub value: Node,
    /// The code run when the value matches
    pub body: Node,
}

/// A syntax tree node.
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    /// What the node is
    pub kind: NodeKind,
    /// Where the node comes from
    pub span: Span,
}

/// The different kinds of node.
#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    // Statements
    /// A list of statements run in order
    Block(Vec<Node>),
    /// `while` and `do-while` loops
    While {
        /// Loop condition
        condition: Box<Node>,
        /// Loop body
        body: Box<Node>,
        /// Whether the body runs once before the first check
        is_do_while: bool,
    },
    /// Counted loops (no assignment) and iterator loops
    For {
        /// Repetition count or iterable
        iterator: Box<Node>,
        /// Assignment target of an iterator loop
        assignment: Option<Box<Node>>,
        /// Loop body
        body: Box<Node>,
    },
    /// A named function declaration
    FuncDecl {
        /// The name the function is bound to
        name: Arc<str>,
        /// Parameter names
        params: Vec<Arc<str>>,
        /// Function body
        body: Box<Node>,
    },
    /// `return` with an optional value
    Return(Option<Box<Node>>),
    /// `continue`
    Continue,
    /// `break`
    Break,
    /// A switch statement
    Switch {
        /// The switched expression
        expr: Box<Node>,
        /// Cases in source order
        cases: Vec<SwitchCase>,
        /// Code run when no case matches
        default: Option<Box<Node>>,
    },
    /// A try-catch statement
    TryCatch {
        /// Guarded code
        try_body: Box<Node>,
        /// Handler
        catch_body: Box<Node>,
        /// Variable receiving the error
        error_name: Arc<str>,
    },
    /// A bracketed statement list
    StatementWrapper(Box<Node>),
    /// A statement that does nothing
    NoOp,

    // Expressions
    /// A chain of operands combined left-to-right by the same operator
    StackOp {
        /// The operator
        op: Operator,
        /// The operands, at least one
        values: Vec<Node>,
    },
    /// Range, cast, call, sequence call and throw
    LocalStackOp {
        /// The operator
        op: Operator,
        /// Leading operands
        values: Vec<Node>,
        /// The operand written next to the operator
        special: Box<Node>,
    },
    /// A unary operation
    LocalOp {
        /// The operator
        op: Operator,
        /// The operand
        value: Box<Node>,
    },
    /// Array and vector literals, and unpacking targets
    SeqLit {
        /// Literal flavour
        kind: SeqKind,
        /// Elements
        values: Vec<Node>,
    },
    /// A map literal
    MapLit {
        /// Key-value pairs in source order
        entries: Vec<(Node, Node)>,
    },
    /// A literal value
    Value(Value),
    /// A variable read
    Access(Arc<str>),
    /// `container.key`
    Extract {
        /// Indexed value
        container: Box<Node>,
        /// Index
        key: Box<Node>,
    },
    /// `value = target`
    Assign {
        /// Where the value is stored
        target: Box<Node>,
        /// Stored value
        value: Box<Node>,
    },
    /// `target op= values`
    CompoundAssign {
        /// The operator
        op: Operator,
        /// Variable or container slot updated
        target: Box<Node>,
        /// Right-hand operands, at least one
        values: Vec<Node>,
    },
    /// An if expression
    If {
        /// Condition
        condition: Box<Node>,
        /// Code run when the condition is true
        then_body: Box<Node>,
        /// Code run otherwise
        else_body: Option<Box<Node>>,
    },
    /// An anonymous function
    Lambda {
        /// Parameter names
        params: Vec<Arc<str>>,
        /// Function body
        body: Box<Node>,
    },
    /// A parenthesised expression
    ExprWrapper(Box<Node>),
}

impl NodeKind {
    /// Returns true if compiling this node leaves one value on the stack.
    pub fn returns_value(&self) -> bool {
        match self {
            NodeKind::Block(_)
            | NodeKind::While { .. }
            | NodeKind::For { .. }
            | NodeKind::FuncDecl { .. }
            | NodeKind::Return(_)
            | NodeKind::Continue
            | NodeKind::Break
            | NodeKind::Switch { .. }
            | NodeKind::TryCatch { .. }
            | NodeKind::StatementWrapper(_)
            | NodeKind::NoOp => false,
            NodeKind::StackOp { .. }
            | NodeKind::LocalStackOp { .. }
            | NodeKind::LocalOp { .. }
            | NodeKind::SeqLit { .. }
            | NodeKind::MapLit { .. }
            | NodeKind::Value(_)
            | NodeKind::Access(_)
            | NodeKind::Extract { .. }
            | NodeKind::Assign { .. }
            | NodeKind::CompoundAssign { .. }
            | NodeKind::If { .. }
            | NodeKind::Lambda { .. }
            | NodeKind::ExprWrapper(_) => true,
        }
    }
}

impl Node {
    /// Creates a node with the given span.
    pub fn new(kind: NodeKind, span: Span) -> Self {
        Self { kind, span }
    }

    /// Replaces the node's span.
    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    /// Returns true if compiling this node leaves one value on the stack.
    pub fn returns_value(&self) -> bool {
        self.kind.returns_value()
    }

    /// Returns the literal value of a `Value` node.
    pub fn as_literal(&self) -> Option<&Value> {
        match &self.kind {
            NodeKind::Value(value) => Some(value),
            _ => None,
        }
    }

    /// Returns true if the node is a literal value.
    pub fn is_literal(&self) -> bool {
        self.as_literal().is_some()
    }

    // ========================================================================
    // Constructors
    // ========================================================================
    //
    // Every constructor uses an empty span; chain `with_span` to attach one.

    /// A statement list.
    pub fn block(statements: Vec<Node>) -> Self {
        Self::new(NodeKind::Block(statements), Span::default())
    }

    /// A `while` loop.
    pub fn while_loop(condition: Node, body: Node) -> Self {
        Self::new(
            NodeKind::While {
                condition: Box::new(condition),
                body: Box::new(body),
                is_do_while: false,
            },
            Span::default(),
        )
    }

    /// A `do-while` loop.
    pub fn do_while(body: Node, condition: Node) -> Self {
        Self::new(
            NodeKind::While {
                condition: Box::new(condition),
                body: Box::new(body),
                is_do_while: true,
            },
            Span::default(),
        )
    }

    /// A counted loop repeating `body` `count` times.
    pub fn repeat(count: Node, body: Node) -> Self {
        Self::new(
            NodeKind::For {
                iterator: Box::new(count),
                assignment: None,
                body: Box::new(body),
            },
            Span::default(),
        )
    }

    /// An iterator loop assigning every item of `iterable` to `target`.
    pub fn for_as(iterable: Node, target: Node, body: Node) -> Self {
        Self::new(
            NodeKind::For {
                iterator: Box::new(iterable),
                assignment: Some(Box::new(target)),
                body: Box::new(body),
            },
            Span::default(),
        )
    }

    /// A named function declaration.
    pub fn func_decl(name: &str, params: &[&str], body: Node) -> Self {
        Self::new(
            NodeKind::FuncDecl {
                name: Arc::from(name),
                params: params.iter().map(|p| Arc::from(*p)).collect(),
                body: Box::new(body),
            },
            Span::default(),
        )
    }

    /// An anonymous function.
    pub fn lambda(params: &[&str], body: Node) -> Self {
        Self::new(
            NodeKind::Lambda {
                params: params.iter().map(|p| Arc::from(*p)).collect(),
                body: Box::new(body),
            },
            Span::default(),
        )
    }

    /// A `return` statement.
    pub fn ret(value: Option<Node>) -> Self {
        Self::new(NodeKind::Return(value.map(Box::new)), Span::default())
    }

    /// A `break` statement.
    pub fn brk() -> Self {
        Self::new(NodeKind::Break, Span::default())
    }

    /// A `continue` statement.
    pub fn cont() -> Self {
        Self::new(NodeKind::Continue, Span::default())
    }

    /// A switch statement.
    pub fn switch(expr: Node, cases: Vec<(Node, Node)>, default: Option<Node>) -> Self {
        Self::new(
            NodeKind::Switch {
                expr: Box::new(expr),
                cases: cases
                    .into_iter()
                    .map(|(value, body)| SwitchCase { value, body })
                    .collect(),
                default: default.map(Box::new),
            },
            Span::default(),
        )
    }

    /// A try-catch statement.
    pub fn try_catch(try_body: Node, error_name: &str, catch_body: Node) -> Self {
        Self::new(
            NodeKind::TryCatch {
                try_body: Box::new(try_body),
                catch_body: Box::new(catch_body),
                error_name: Arc::from(error_name),
            },
            Span::default(),
        )
    }

    /// A stack operation over `values`.
    pub fn stack_op(op: Operator, values: Vec<Node>) -> Self {
        Self::new(NodeKind::StackOp { op, values }, Span::default())
    }

    /// A local-stack operation.
    pub fn local_stack_op(op: Operator, values: Vec<Node>, special: Node) -> Self {
        Self::new(
            NodeKind::LocalStackOp {
                op,
                values,
                special: Box::new(special),
            },
            Span::default(),
        )
    }

    /// A call of `func` with `args`.
    pub fn call(func: Node, args: Vec<Node>) -> Self {
        Self::local_stack_op(Operator::Call, args, func)
    }

    /// A unary operation.
    pub fn local_op(op: Operator, value: Node) -> Self {
        Self::new(
            NodeKind::LocalOp {
                op,
                value: Box::new(value),
            },
            Span::default(),
        )
    }

    /// A sequence literal.
    pub fn seq(kind: SeqKind, values: Vec<Node>) -> Self {
        Self::new(NodeKind::SeqLit { kind, values }, Span::default())
    }

    /// A map literal.
    pub fn map(entries: Vec<(Node, Node)>) -> Self {
        Self::new(NodeKind::MapLit { entries }, Span::default())
    }

    /// A literal.
    pub fn value(value: impl Into<Value>) -> Self {
        Self::new(NodeKind::Value(value.into()), Span::default())
    }

    /// A variable read.
    pub fn access(name: &str) -> Self {
        Self::new(NodeKind::Access(Arc::from(name)), Span::default())
    }

    /// `container.key`.
    pub fn extract(container: Node, key: Node) -> Self {
        Self::new(
            NodeKind::Extract {
                container: Box::new(container),
                key: Box::new(key),
            },
            Span::default(),
        )
    }

    /// Stores `value` into `target`.
    pub fn assign(target: Node, value: Node) -> Self {
        Self::new(
            NodeKind::Assign {
                target: Box::new(target),
                value: Box::new(value),
            },
            Span::default(),
        )
    }

    /// `target op= values`.
    pub fn compound_assign(op: Operator, target: Node, values: Vec<Node>) -> Self {
        Self::new(
            NodeKind::CompoundAssign {
                op,
                target: Box::new(target),
                values,
            },
            Span::default(),
        )
    }

    /// An if expression.
    pub fn if_expr(condition: Node, then_body: Node, else_body: Option<Node>) -> Self {
        Self::new(
            NodeKind::If {
                condition: Box::new(condition),
                then_body: Box::new(then_body),
                else_body: else_body.map(Box::new),
            },
            Span::default(),
        )
    }

    /// A parenthesised expression.
    pub fn wrap_expr(expr: Node) -> Self {
        Self::new(NodeKind::ExprWrapper(Box::new(expr)), Span::default())
    }

    /// A bracketed statement list.
    pub fn wrap_statement(statement: Node) -> Self {
        Self::new(NodeKind::StatementWrapper(Box::new(statement)), Span::default())
    }

    /// A statement that does nothing.
    pub fn no_op() -> Self {
        Self::new(NodeKind::NoOp, Span::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_operator_codes_round_trip() {
        for op in Operator::ALL {
            assert_eq!(Operator::from_code(op.code() as i64), Some(op));
        }
        assert_eq!(Operator::from_code(-1), None);
        assert_eq!(Operator::from_code(35), None);
    }

    #[test]
    fn test_statements_do_not_return_values() {
        assert!(!Node::block(vec![]).returns_value());
        assert!(!Node::brk().returns_value());
        assert!(!Node::func_decl("f", &[], Node::block(vec![])).returns_value());
        assert!(Node::lambda(&[], Node::block(vec![])).returns_value());
        assert!(Node::access("x").returns_value());
        assert!(Node::if_expr(Node::value(true), Node::block(vec![]), None).returns_value());
    }

    #[test]
    fn test_span_join_and_display() {
        let a = Span::new(Pos::new(0, 4), Pos::new(0, 9));
        let b = Span::new(Pos::new(2, 0), Pos::new(2, 3));
        let joined = a.join(b);
        assert_eq!(joined.start, Pos::new(0, 4));
        assert_eq!(joined.end, Pos::new(2, 3));
        assert_eq!(joined.to_string(), "1:5-3:4");
    }
}
