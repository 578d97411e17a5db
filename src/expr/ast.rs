use std::rc::Rc;

/// The fixed function library permitted by spec.md §3: `sin cos sqrt log exp
/// abs`, plus the arithmetic operators `+ - * / ^`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Func {
    Sin,
    Cos,
    Sqrt,
    Log,
    Exp,
    Abs,
}

impl Func {
    pub fn name(self) -> &'static str {
        match self {
            Func::Sin => "sin",
            Func::Cos => "cos",
            Func::Sqrt => "sqrt",
            Func::Log => "log",
            Func::Exp => "exp",
            Func::Abs => "abs",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "sin" => Some(Func::Sin),
            "cos" => Some(Func::Cos),
            "sqrt" => Some(Func::Sqrt),
            "log" => Some(Func::Log),
            "exp" => Some(Func::Exp),
            "abs" => Some(Func::Abs),
            _ => None,
        }
    }
}

/// A mini-AST for scalar expressions, differentiated by structural recursion
/// (design notes §9) rather than via a runtime symbolic-algebra library.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Num(f64),
    /// A free name not yet resolved to a state slot — resolved to `State`
    /// during compilation, or left as a parameter name looked up by name at
    /// evaluation time.
    Name(String),
    /// Resolved reference into the state vector at the given slot index.
    State(usize),
    Neg(Rc<Expr>),
    Add(Rc<Expr>, Rc<Expr>),
    Sub(Rc<Expr>, Rc<Expr>),
    Mul(Rc<Expr>, Rc<Expr>),
    Div(Rc<Expr>, Rc<Expr>),
    Pow(Rc<Expr>, Rc<Expr>),
    Call(Func, Rc<Expr>),
}

impl Expr {
    pub fn rc(self) -> Rc<Expr> {
        Rc::new(self)
    }
}
