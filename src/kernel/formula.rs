//! Per-iteration formula language.
//!
//! A formula is a short list of assignments run once per iteration, e.g.
//!
//! ```text
//! z.im = abs(z.im)
//! z = pow(z, mod) + c
//! z = log(z)
//! ```
//!
//! Names are checked against `z`, `c`, the declared kernel parameters and
//! the locals the formula assigns, so mistakes surface before any device
//! compile. The same tree is evaluated on the CPU and lowered to Metal.

use num_complex::Complex64;
use std::fmt;
use std::fmt::Write as _;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FormulaError {
    Empty,
    Syntax { line: usize, message: String },
    UndeclaredName { line: usize, name: String },
    UnknownFunction { line: usize, name: String },
    Arity { line: usize, name: String, expected: usize, got: usize },
    ReadOnly { line: usize, name: String },
}

impl fmt::Display for FormulaError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => write!(f, "formula has no statements"),
            Self::Syntax { line, message } => write!(f, "formula line {line}: {message}"),
            Self::UndeclaredName { line, name } => {
                write!(f, "formula line {line}: '{name}' is not z, c, a local or a declared parameter")
            }
            Self::UnknownFunction { line, name } => {
                write!(f, "formula line {line}: unknown function '{name}'")
            }
            Self::Arity { line, name, expected, got } => {
                write!(f, "formula line {line}: {name}() takes {expected} argument(s), got {got}")
            }
            Self::ReadOnly { line, name } => {
                write!(f, "formula line {line}: cannot assign to '{name}'")
            }
        }
    }
}

impl std::error::Error for FormulaError {}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Var {
    Z,
    C,
    Local(usize),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Part {
    Re,
    Im,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Pow,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Func {
    Abs,
    Arg,
    Conj,
    Re,
    Im,
    RAbs,
    IAbs,
    FAbs,
    Sqr,
    Sqrt,
    Exp,
    Log,
    Sin,
    Cos,
    Tan,
    Sinh,
    Cosh,
    Tanh,
    Pow,
}

impl Func {
    fn lookup(name: &str) -> Option<Self> {
        Some(match name {
            "abs" => Self::Abs,
            "arg" => Self::Arg,
            "conj" => Self::Conj,
            "re" => Self::Re,
            "im" => Self::Im,
            "rabs" => Self::RAbs,
            "iabs" => Self::IAbs,
            "fabs" => Self::FAbs,
            "sqr" => Self::Sqr,
            "sqrt" => Self::Sqrt,
            "exp" => Self::Exp,
            "log" => Self::Log,
            "sin" => Self::Sin,
            "cos" => Self::Cos,
            "tan" => Self::Tan,
            "sinh" => Self::Sinh,
            "cosh" => Self::Cosh,
            "tanh" => Self::Tanh,
            "pow" => Self::Pow,
            _ => return None,
        })
    }

    fn arity(self) -> usize {
        match self {
            Self::Pow => 2,
            _ => 1,
        }
    }

    fn msl_name(self) -> &'static str {
        match self {
            Self::Abs => "c_abs",
            Self::Arg => "c_arg",
            Self::Conj => "c_conj",
            Self::Re => "c_re",
            Self::Im => "c_im",
            Self::RAbs => "c_rabs",
            Self::IAbs => "c_iabs",
            Self::FAbs => "c_fabs",
            Self::Sqr => "c_sqr",
            Self::Sqrt => "c_sqrt",
            Self::Exp => "c_exp",
            Self::Log => "c_log",
            Self::Sin => "c_sin",
            Self::Cos => "c_cos",
            Self::Tan => "c_tan",
            Self::Sinh => "c_sinh",
            Self::Cosh => "c_cosh",
            Self::Tanh => "c_tanh",
            Self::Pow => "c_pow",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Const(Complex64),
    Var(Var),
    Param(usize),
    Part(Var, Part),
    Neg(Box<Expr>),
    Bin(BinOp, Box<Expr>, Box<Expr>),
    PowInt(Box<Expr>, u32),
    Call(Func, Vec<Expr>),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Stmt {
    Assign(Var, Expr),
    AssignPart(Var, Part, Expr),
}

/// Iteration state threaded through [`Formula::step`].
#[derive(Debug, Clone, PartialEq)]
pub struct OrbitState {
    pub z: Complex64,
    pub c: Complex64,
    pub locals: Vec<Complex64>,
}

impl OrbitState {
    pub fn new(z: Complex64, c: Complex64, locals: usize) -> Self {
        Self {
            z,
            c,
            locals: vec![Complex64::new(0.0, 0.0); locals],
        }
    }

    fn get(&self, var: Var) -> Complex64 {
        match var {
            Var::Z => self.z,
            Var::C => self.c,
            Var::Local(idx) => self.locals[idx],
        }
    }

    fn slot(&mut self, var: Var) -> &mut Complex64 {
        match var {
            Var::Z => &mut self.z,
            Var::C => &mut self.c,
            Var::Local(idx) => &mut self.locals[idx],
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Formula {
    source: String,
    stmts: Vec<Stmt>,
    locals: Vec<String>,
    params: Vec<String>,
}

const NAMED_FORMULAS: &[(&str, &str)] = &[
    ("mandelbrot", "z = z^2 + c"),
    ("duck", "z = iabs(z)\nz = log(z + c)"),
    ("burning-ship", "z = fabs(z)^2 + c"),
    ("buffalo", "z = fabs(z^2) + c"),
    ("duck2", "z = z / cos(z)\nz = z + c\nz = log(z)"),
];

impl Formula {
    /// Source text of a built-in formula.
    pub fn named(name: &str) -> Option<&'static str> {
        NAMED_FORMULAS
            .iter()
            .find(|(n, _)| *n == name)
            .map(|(_, src)| *src)
    }

    pub fn named_list() -> impl Iterator<Item = &'static str> {
        NAMED_FORMULAS.iter().map(|(n, _)| *n)
    }

    /// Parses `src` (or the built-in formula it names) against `params`,
    /// the ordered extra kernel parameters.
    pub fn parse(src: &str, params: &[String]) -> Result<Self, FormulaError> {
        let source = Self::named(src.trim()).unwrap_or(src);
        let toks = lex(source)?;
        let locals = collect_locals(&toks, params);
        let mut parser = Parser {
            toks: &toks,
            pos: 0,
            params,
            locals: &locals,
        };
        let mut stmts = Vec::new();
        while let Some(stmt) = parser.statement()? {
            stmts.push(stmt);
        }
        if stmts.is_empty() {
            return Err(FormulaError::Empty);
        }
        Ok(Self {
            source: source.to_string(),
            stmts,
            locals,
            params: params.to_vec(),
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn statements(&self) -> &[Stmt] {
        &self.stmts
    }

    pub fn locals(&self) -> &[String] {
        &self.locals
    }

    pub fn params(&self) -> &[String] {
        &self.params
    }

    /// Runs every statement once. `params` are bound in declaration order.
    pub fn step(&self, st: &mut OrbitState, params: &[f64]) {
        for stmt in &self.stmts {
            match stmt {
                Stmt::Assign(var, expr) => {
                    let v = eval(expr, st, params);
                    *st.slot(*var) = v;
                }
                Stmt::AssignPart(var, part, expr) => {
                    let v = eval(expr, st, params).re;
                    let slot = st.slot(*var);
                    match part {
                        Part::Re => slot.re = v,
                        Part::Im => slot.im = v,
                    }
                }
            }
        }
    }

    /// Metal statements for the loop body, one per line.
    pub fn to_msl(&self) -> String {
        let mut out = String::new();
        for stmt in &self.stmts {
            let _ = match stmt {
                Stmt::Assign(var, expr) => {
                    writeln!(out, "        {} = {};", self.msl_var(*var), self.msl_expr(expr))
                }
                Stmt::AssignPart(var, part, expr) => writeln!(
                    out,
                    "        {}.{} = ({}).x;",
                    self.msl_var(*var),
                    msl_part(*part),
                    self.msl_expr(expr)
                ),
            };
        }
        out
    }

    pub fn msl_local(&self, idx: usize) -> String {
        format!("l_{}", self.locals[idx])
    }

    pub fn msl_param(&self, idx: usize) -> String {
        format!("p_{}", self.params[idx])
    }

    fn msl_var(&self, var: Var) -> String {
        match var {
            Var::Z => "z".to_string(),
            Var::C => "c".to_string(),
            Var::Local(idx) => self.msl_local(idx),
        }
    }

    fn msl_expr(&self, expr: &Expr) -> String {
        match expr {
            Expr::Const(v) => format!("float2({}, {})", msl_float(v.re), msl_float(v.im)),
            Expr::Var(var) => self.msl_var(*var),
            Expr::Param(idx) => format!("float2({}, 0.0f)", self.msl_param(*idx)),
            Expr::Part(var, part) => {
                format!("float2({}.{}, 0.0f)", self.msl_var(*var), msl_part(*part))
            }
            Expr::Neg(inner) => format!("(-{})", self.msl_expr(inner)),
            Expr::Bin(op, a, b) => {
                let (a, b) = (self.msl_expr(a), self.msl_expr(b));
                match op {
                    BinOp::Add => format!("({a} + {b})"),
                    BinOp::Sub => format!("({a} - {b})"),
                    BinOp::Mul => format!("c_mul({a}, {b})"),
                    BinOp::Div => format!("c_div({a}, {b})"),
                    BinOp::Pow => format!("c_pow({a}, {b})"),
                }
            }
            Expr::PowInt(base, n) => format!("c_powi({}, {n}u)", self.msl_expr(base)),
            Expr::Call(func, args) => {
                let args: Vec<String> = args.iter().map(|a| self.msl_expr(a)).collect();
                format!("{}({})", func.msl_name(), args.join(", "))
            }
        }
    }
}

fn msl_part(part: Part) -> &'static str {
    match part {
        Part::Re => "x",
        Part::Im => "y",
    }
}

/// Metal `float` literal.
pub fn msl_float(v: f64) -> String {
    format!("{:?}f", v as f32)
}

fn eval(expr: &Expr, st: &OrbitState, params: &[f64]) -> Complex64 {
    match expr {
        Expr::Const(v) => *v,
        Expr::Var(var) => st.get(*var),
        Expr::Param(idx) => Complex64::new(params.get(*idx).copied().unwrap_or(0.0), 0.0),
        Expr::Part(var, part) => {
            let v = st.get(*var);
            match part {
                Part::Re => Complex64::new(v.re, 0.0),
                Part::Im => Complex64::new(v.im, 0.0),
            }
        }
        Expr::Neg(inner) => -eval(inner, st, params),
        Expr::Bin(op, a, b) => {
            let (a, b) = (eval(a, st, params), eval(b, st, params));
            match op {
                BinOp::Add => a + b,
                BinOp::Sub => a - b,
                BinOp::Mul => a * b,
                BinOp::Div => a / b,
                BinOp::Pow => complex_pow(a, b),
            }
        }
        Expr::PowInt(base, n) => {
            let base = eval(base, st, params);
            let mut acc = base;
            for _ in 1..*n {
                acc *= base;
            }
            acc
        }
        Expr::Call(func, args) => {
            let a = eval(&args[0], st, params);
            match func {
                Func::Abs => Complex64::new(a.norm(), 0.0),
                Func::Arg => Complex64::new(a.arg(), 0.0),
                Func::Conj => a.conj(),
                Func::Re => Complex64::new(a.re, 0.0),
                Func::Im => Complex64::new(a.im, 0.0),
                Func::RAbs => Complex64::new(a.re.abs(), a.im),
                Func::IAbs => Complex64::new(a.re, a.im.abs()),
                Func::FAbs => Complex64::new(a.re.abs(), a.im.abs()),
                Func::Sqr => a * a,
                Func::Sqrt => a.sqrt(),
                Func::Exp => a.exp(),
                Func::Log => a.ln(),
                Func::Sin => a.sin(),
                Func::Cos => a.cos(),
                Func::Tan => a.tan(),
                Func::Sinh => a.sinh(),
                Func::Cosh => a.cosh(),
                Func::Tanh => a.tanh(),
                Func::Pow => complex_pow(a, eval(&args[1], st, params)),
            }
        }
    }
}

/// `a^b` through `exp(b * ln a)`, with `0^b == 0`.
pub fn complex_pow(a: Complex64, b: Complex64) -> Complex64 {
    if a.re == 0.0 && a.im == 0.0 {
        return Complex64::new(0.0, 0.0);
    }
    (b * a.ln()).exp()
}

#[derive(Debug, Clone, PartialEq)]
enum Tok {
    Num(f64),
    Ident(String),
    Sym(char),
    End,
}

#[derive(Debug, Clone, PartialEq)]
struct Token {
    tok: Tok,
    line: usize,
}

fn lex(src: &str) -> Result<Vec<Token>, FormulaError> {
    let mut out = Vec::new();
    for (line_idx, raw) in src.lines().enumerate() {
        let line = line_idx + 1;
        let text = match (raw.find("//"), raw.find('#')) {
            (Some(a), Some(b)) => &raw[..a.min(b)],
            (Some(a), None) | (None, Some(a)) => &raw[..a],
            (None, None) => raw,
        };
        let chars: Vec<char> = text.chars().collect();
        let mut i = 0;
        while i < chars.len() {
            let ch = chars[i];
            if ch.is_whitespace() {
                i += 1;
            } else if ch.is_ascii_digit() {
                let start = i;
                while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                    i += 1;
                }
                if i < chars.len() && (chars[i] == 'e' || chars[i] == 'E') {
                    let mut j = i + 1;
                    if j < chars.len() && (chars[j] == '+' || chars[j] == '-') {
                        j += 1;
                    }
                    if j < chars.len() && chars[j].is_ascii_digit() {
                        i = j;
                        while i < chars.len() && chars[i].is_ascii_digit() {
                            i += 1;
                        }
                    }
                }
                let lit: String = chars[start..i].iter().collect();
                let value = lit.parse::<f64>().map_err(|_| FormulaError::Syntax {
                    line,
                    message: format!("invalid number '{lit}'"),
                })?;
                out.push(Token { tok: Tok::Num(value), line });
            } else if ch.is_ascii_alphabetic() || ch == '_' {
                let start = i;
                while i < chars.len() && (chars[i].is_ascii_alphanumeric() || chars[i] == '_') {
                    i += 1;
                }
                let ident: String = chars[start..i].iter().collect();
                out.push(Token { tok: Tok::Ident(ident), line });
            } else if ch == ';' {
                out.push(Token { tok: Tok::End, line });
                i += 1;
            } else if "+-*/^(),=.".contains(ch) {
                out.push(Token { tok: Tok::Sym(ch), line });
                i += 1;
            } else {
                return Err(FormulaError::Syntax {
                    line,
                    message: format!("unexpected character '{ch}'"),
                });
            }
        }
        out.push(Token { tok: Tok::End, line });
    }
    Ok(out)
}

fn is_reserved(name: &str, params: &[String]) -> bool {
    matches!(name, "z" | "c" | "i" | "pi" | "e")
        || Func::lookup(name).is_some()
        || params.iter().any(|p| p == name)
}

/// Names assigned at the start of a statement that are not reserved.
fn collect_locals(toks: &[Token], params: &[String]) -> Vec<String> {
    let mut locals: Vec<String> = Vec::new();
    let mut at_start = true;
    for (idx, t) in toks.iter().enumerate() {
        if at_start {
            if let Tok::Ident(name) = &t.tok {
                let next = toks.get(idx + 1).map(|t| &t.tok);
                let assigned = match next {
                    Some(Tok::Sym('=')) => true,
                    Some(Tok::Sym('.')) => {
                        matches!(toks.get(idx + 3).map(|t| &t.tok), Some(Tok::Sym('=')))
                    }
                    _ => false,
                };
                if assigned && !is_reserved(name, params) && !locals.contains(name) {
                    locals.push(name.clone());
                }
            }
        }
        at_start = t.tok == Tok::End;
    }
    locals
}

struct Parser<'a> {
    toks: &'a [Token],
    pos: usize,
    params: &'a [String],
    locals: &'a [String],
}

impl<'a> Parser<'a> {
    fn peek(&self) -> Option<&'a Tok> {
        self.toks.get(self.pos).map(|t| &t.tok)
    }

    fn line(&self) -> usize {
        self.toks
            .get(self.pos)
            .or_else(|| self.toks.last())
            .map(|t| t.line)
            .unwrap_or(1)
    }

    fn advance(&mut self) -> Option<&'a Tok> {
        let t = self.toks.get(self.pos).map(|t| &t.tok);
        self.pos += 1;
        t
    }

    fn syntax<T>(&self, message: impl Into<String>) -> Result<T, FormulaError> {
        Err(FormulaError::Syntax {
            line: self.line(),
            message: message.into(),
        })
    }

    fn expect(&mut self, sym: char) -> Result<(), FormulaError> {
        match self.peek() {
            Some(Tok::Sym(s)) if *s == sym => {
                self.pos += 1;
                Ok(())
            }
            other => {
                let found = describe(other);
                self.syntax(format!("expected '{sym}', found {found}"))
            }
        }
    }

    fn statement(&mut self) -> Result<Option<Stmt>, FormulaError> {
        while self.peek() == Some(&Tok::End) {
            self.pos += 1;
        }
        let line = self.line();
        let name = match self.advance() {
            None => return Ok(None),
            Some(Tok::Ident(name)) => name.clone(),
            Some(other) => {
                let found = describe(Some(other));
                self.pos -= 1;
                return self.syntax(format!("expected an assignment, found {found}"));
            }
        };
        let part = if self.peek() == Some(&Tok::Sym('.')) {
            self.pos += 1;
            Some(self.part()?)
        } else {
            None
        };
        self.expect('=')?;
        let var = self.target(&name, line)?;
        let expr = self.expr(0)?;
        match self.peek() {
            None | Some(Tok::End) => {}
            other => {
                let found = describe(other);
                return self.syntax(format!("unexpected {found} after expression"));
            }
        }
        Ok(Some(match part {
            Some(part) => Stmt::AssignPart(var, part, expr),
            None => Stmt::Assign(var, expr),
        }))
    }

    fn part(&mut self) -> Result<Part, FormulaError> {
        match self.advance() {
            Some(Tok::Ident(p)) => match p.as_str() {
                "re" | "real" | "x" => Ok(Part::Re),
                "im" | "imag" | "y" => Ok(Part::Im),
                other => self.syntax(format!("unknown component '{other}' (use re or im)")),
            },
            _ => self.syntax("expected a component name after '.'"),
        }
    }

    fn target(&self, name: &str, line: usize) -> Result<Var, FormulaError> {
        match name {
            "z" => Ok(Var::Z),
            "c" => Ok(Var::C),
            _ => match self.locals.iter().position(|l| l == name) {
                Some(idx) => Ok(Var::Local(idx)),
                None => Err(FormulaError::ReadOnly {
                    line,
                    name: name.to_string(),
                }),
            },
        }
    }

    fn variable(&self, name: &str) -> Option<Var> {
        match name {
            "z" => Some(Var::Z),
            "c" => Some(Var::C),
            _ => self.locals.iter().position(|l| l == name).map(Var::Local),
        }
    }

    fn expr(&mut self, min_bp: u8) -> Result<Expr, FormulaError> {
        let mut lhs = self.prefix()?;
        loop {
            let (op, lbp, rbp) = match self.peek() {
                Some(Tok::Sym('+')) => (BinOp::Add, 1, 2),
                Some(Tok::Sym('-')) => (BinOp::Sub, 1, 2),
                Some(Tok::Sym('*')) => (BinOp::Mul, 3, 4),
                Some(Tok::Sym('/')) => (BinOp::Div, 3, 4),
                Some(Tok::Sym('^')) => (BinOp::Pow, 7, 6),
                _ => break,
            };
            if lbp < min_bp {
                break;
            }
            self.pos += 1;
            let rhs = self.expr(rbp)?;
            lhs = binary(op, lhs, rhs);
        }
        Ok(lhs)
    }

    fn prefix(&mut self) -> Result<Expr, FormulaError> {
        let line = self.line();
        let tok = self.advance().cloned();
        match tok {
            // GPU kernels compute in `float`.
            Some(Tok::Num(v)) if !(v as f32).is_finite() => Err(FormulaError::Syntax {
                line,
                message: format!("number {v} is out of range for a float kernel"),
            }),
            Some(Tok::Num(v)) => Ok(Expr::Const(Complex64::new(v, 0.0))),
            Some(Tok::Sym('-')) => Ok(Expr::Neg(Box::new(self.expr(5)?))),
            Some(Tok::Sym('+')) => self.expr(5),
            Some(Tok::Sym('(')) => {
                let inner = self.expr(0)?;
                self.expect(')')?;
                Ok(inner)
            }
            Some(Tok::Ident(name)) => match self.peek() {
                Some(Tok::Sym('(')) => {
                    self.pos += 1;
                    self.call(&name, line)
                }
                Some(Tok::Sym('.')) => {
                    self.pos += 1;
                    let var = self.variable(&name).ok_or(FormulaError::UndeclaredName {
                        line,
                        name: name.clone(),
                    })?;
                    Ok(Expr::Part(var, self.part()?))
                }
                _ => self.name(&name, line),
            },
            other => {
                self.pos -= 1;
                let found = describe(other.as_ref());
                self.syntax(format!("expected an expression, found {found}"))
            }
        }
    }

    fn name(&self, name: &str, line: usize) -> Result<Expr, FormulaError> {
        if let Some(var) = self.variable(name) {
            return Ok(Expr::Var(var));
        }
        if let Some(idx) = self.params.iter().position(|p| p == name) {
            return Ok(Expr::Param(idx));
        }
        match name {
            "i" => Ok(Expr::Const(Complex64::new(0.0, 1.0))),
            "pi" => Ok(Expr::Const(Complex64::new(std::f64::consts::PI, 0.0))),
            "e" => Ok(Expr::Const(Complex64::new(std::f64::consts::E, 0.0))),
            _ => Err(FormulaError::UndeclaredName {
                line,
                name: name.to_string(),
            }),
        }
    }

    fn call(&mut self, name: &str, line: usize) -> Result<Expr, FormulaError> {
        let func = Func::lookup(name).ok_or(FormulaError::UnknownFunction {
            line,
            name: name.to_string(),
        })?;
        let mut args = Vec::new();
        if self.peek() != Some(&Tok::Sym(')')) {
            loop {
                args.push(self.expr(0)?);
                if self.peek() == Some(&Tok::Sym(',')) {
                    self.pos += 1;
                } else {
                    break;
                }
            }
        }
        self.expect(')')?;
        if args.len() != func.arity() {
            return Err(FormulaError::Arity {
                line,
                name: name.to_string(),
                expected: func.arity(),
                got: args.len(),
            });
        }
        Ok(Expr::Call(func, args))
    }
}

fn binary(op: BinOp, lhs: Expr, rhs: Expr) -> Expr {
    if op == BinOp::Pow {
        if let Expr::Const(v) = rhs {
            if v.im == 0.0 && v.re.fract() == 0.0 && (1.0..=8.0).contains(&v.re) {
                return Expr::PowInt(Box::new(lhs), v.re as u32);
            }
        }
    }
    Expr::Bin(op, Box::new(lhs), Box::new(rhs))
}

fn describe(tok: Option<&Tok>) -> String {
    match tok {
        None => "end of formula".to_string(),
        Some(Tok::End) => "end of statement".to_string(),
        Some(Tok::Num(v)) => format!("number {v}"),
        Some(Tok::Ident(name)) => format!("'{name}'"),
        Some(Tok::Sym(s)) => format!("'{s}'"),
    }
}
