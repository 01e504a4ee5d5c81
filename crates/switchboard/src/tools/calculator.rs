//! Arithmetic evaluator.
//!
//! Input is normalised first (thousands separators, `√`, "square root of N",
//! `N^M`, `N!`), checked to be pure math, then parsed into an expression tree
//! with `nom` and evaluated in `f64`.
//!
//! Grammar, loosest binding first:
//!
//! ```text
//! expr  := term (('+' | '-') term)*
//! term  := unary (('*' | '/') unary)*
//! unary := ('-' | '+') unary | power
//! power := atom (('**' | '^') unary)?
//! atom  := number | 'sqrt' '(' expr ')' | '(' expr ')'
//! ```

use async_trait::async_trait;
use lazy_static::lazy_static;
use nom::{
    branch::alt,
    bytes::complete::{tag, tag_no_case},
    character::complete::{char, digit0, digit1, multispace0, one_of},
    combinator::{all_consuming, map, map_res, opt, recognize},
    multi::fold_many0,
    sequence::{delimited, pair, preceded},
    IResult,
};
use regex::Regex;
use thiserror::Error;

use super::{Tool, ToolError};
use crate::cues::SQUARE_ROOT;
use crate::plan::ToolName;

/// Largest factorial that still fits in an `f64`
pub const MAX_FACTORIAL: u64 = 170;

/// Parentheses, unary signs and exponents the parser may recurse through
pub const MAX_NESTING: usize = 64;

/// Binary operators a single expression may chain
pub const MAX_OPERATORS: usize = 1000;

lazy_static! {
    static ref RADICAL_NUMBER: Regex = Regex::new(r"√\s*(\d+(?:\.\d+)?)").unwrap();
    static ref CARET_POWER: Regex = Regex::new(r"(\d+)\s*\^\s*(\d+)").unwrap();
    static ref FACTORIAL: Regex = Regex::new(r"(\d+)\s*!").unwrap();
    static ref SQRT_CALL: Regex = Regex::new(r"(?i)sqrt\s*\(").unwrap();
    static ref LETTER: Regex = Regex::new(r"[A-Za-z]").unwrap();
    static ref PURE_MATH: Regex = Regex::new(r"^[0-9\.\s\+\-\*/\(\)\^]+$").unwrap();
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum CalcError {
    #[error("Not a pure math expression.")]
    NotPureMath,

    #[error("Invalid expression: {0}")]
    Syntax(String),

    #[error("division by zero")]
    DivisionByZero,

    #[error("square root of a negative number")]
    NegativeRoot,

    #[error("result is not a finite number")]
    NonFinite,

    #[error("factorial of {0} is too large (maximum is 170)")]
    FactorialTooLarge(String),
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Op {
    Add,
    Sub,
    Mul,
    Div,
    Pow,
}

#[derive(Debug, Clone, PartialEq)]
enum Expr {
    Number(f64),
    Neg(Box<Expr>),
    Sqrt(Box<Expr>),
    Binary(Op, Box<Expr>, Box<Expr>),
}

impl Expr {
    fn binary(op: Op, lhs: Expr, rhs: Expr) -> Self {
        Expr::Binary(op, Box::new(lhs), Box::new(rhs))
    }

    fn eval(&self) -> Result<f64, CalcError> {
        match self {
            Expr::Number(n) => Ok(*n),
            Expr::Neg(inner) => Ok(-inner.eval()?),
            Expr::Sqrt(inner) => {
                let v = inner.eval()?;
                if v < 0.0 {
                    return Err(CalcError::NegativeRoot);
                }
                Ok(v.sqrt())
            }
            Expr::Binary(op, lhs, rhs) => {
                let (l, r) = (lhs.eval()?, rhs.eval()?);
                let value = match op {
                    Op::Add => l + r,
                    Op::Sub => l - r,
                    Op::Mul => l * r,
                    Op::Div if r == 0.0 => return Err(CalcError::DivisionByZero),
                    Op::Div => l / r,
                    Op::Pow => l.powf(r),
                };
                if value.is_finite() {
                    Ok(value)
                } else {
                    Err(CalcError::NonFinite)
                }
            }
        }
    }
}

fn ws<'a, O, F>(inner: F) -> impl FnMut(&'a str) -> IResult<&'a str, O>
where
    F: FnMut(&'a str) -> IResult<&'a str, O>,
{
    delimited(multispace0, inner, multispace0)
}

fn number(input: &str) -> IResult<&str, Expr> {
    map_res(
        recognize(alt((
            recognize(pair(digit1, opt(pair(char('.'), digit0)))),
            recognize(pair(char('.'), digit1)),
        ))),
        |s: &str| s.parse::<f64>().map(Expr::Number),
    )(input)
}

fn sqrt_call(input: &str) -> IResult<&str, Expr> {
    map(
        preceded(
            tag_no_case("sqrt"),
            delimited(ws(char('(')), expr, ws(char(')'))),
        ),
        |inner| Expr::Sqrt(Box::new(inner)),
    )(input)
}

fn atom(input: &str) -> IResult<&str, Expr> {
    ws(alt((
        number,
        sqrt_call,
        delimited(ws(char('(')), expr, ws(char(')'))),
    )))(input)
}

fn power(input: &str) -> IResult<&str, Expr> {
    let (input, base) = atom(input)?;
    let (input, exponent) = opt(preceded(ws(alt((tag("**"), tag("^")))), unary))(input)?;
    Ok(match exponent {
        Some(exponent) => (input, Expr::binary(Op::Pow, base, exponent)),
        None => (input, base),
    })
}

fn unary(input: &str) -> IResult<&str, Expr> {
    alt((
        map(preceded(ws(char('-')), unary), |e| Expr::Neg(Box::new(e))),
        preceded(ws(char('+')), unary),
        power,
    ))(input)
}

fn term(input: &str) -> IResult<&str, Expr> {
    let (input, first) = unary(input)?;
    fold_many0(
        pair(ws(one_of("*/")), unary),
        move || first.clone(),
        |acc, (op, rhs)| {
            let op = if op == '*' { Op::Mul } else { Op::Div };
            Expr::binary(op, acc, rhs)
        },
    )(input)
}

fn expr(input: &str) -> IResult<&str, Expr> {
    let (input, first) = term(input)?;
    fold_many0(
        pair(ws(one_of("+-")), term),
        move || first.clone(),
        |acc, (op, rhs)| {
            let op = if op == '+' { Op::Add } else { Op::Sub };
            Expr::binary(op, acc, rhs)
        },
    )(input)
}

fn parse(input: &str) -> Result<Expr, CalcError> {
    match all_consuming(ws(expr))(input) {
        Ok((_, tree)) => Ok(tree),
        Err(nom::Err::Error(e)) | Err(nom::Err::Failure(e)) if !e.input.trim().is_empty() => Err(
            CalcError::Syntax(format!("unexpected input at '{}'", e.input.trim())),
        ),
        Err(_) => Err(CalcError::Syntax("unexpected end of expression".to_string())),
    }
}

fn factorial(digits: &str) -> Result<f64, CalcError> {
    let n: u64 = digits
        .parse()
        .ok()
        .filter(|n| *n <= MAX_FACTORIAL)
        .ok_or_else(|| CalcError::FactorialTooLarge(digits.to_string()))?;
    Ok((2..=n).fold(1.0, |acc, k| acc * k as f64))
}

/// Replace every `N!` with its value, repeating so that `3!!` also resolves
fn expand_factorials(expr: &str) -> Result<String, CalcError> {
    let mut current = expr.to_string();
    while let Some(caps) = FACTORIAL.captures(&current) {
        let range = caps.get(0).map_or(0..0, |m| m.range());
        let value = format_number(factorial(&caps[1])?);
        current.replace_range(range, &value);
    }
    Ok(current)
}

/// Normalise the surface forms the evaluator accepts into its core grammar
pub fn preprocess(expr: &str) -> Result<String, CalcError> {
    let s = expr.trim().replace(',', "");
    let s = RADICAL_NUMBER.replace_all(&s, "sqrt(${1})").replace('√', "sqrt");
    let s = SQUARE_ROOT.replace_all(&s, "sqrt(${1})");
    let s = CARET_POWER.replace_all(&s, "${1}**${2}");
    Ok(expand_factorials(&s)?.trim().to_string())
}

/// Bound the recursion `parse` and `eval` will need before running them.
///
/// The count is an upper bound: every unary sign and exponent adds to the
/// deepest parenthesis level even when they sit side by side.
fn check_nesting(expr: &str) -> Result<(), CalcError> {
    let mut parens = 0usize;
    let mut deepest = 0usize;
    let mut links = 0usize;
    let mut operators = 0usize;
    let mut after_operand = false;

    let mut chars = expr.chars().filter(|c| !c.is_whitespace()).peekable();
    while let Some(c) = chars.next() {
        match c {
            '(' => {
                parens += 1;
                deepest = deepest.max(parens);
                after_operand = false;
            }
            ')' => {
                parens = parens.saturating_sub(1);
                after_operand = true;
            }
            '+' | '-' if !after_operand => links += 1,
            '*' if chars.peek() == Some(&'*') => {
                chars.next();
                links += 1;
                after_operand = false;
            }
            '^' => {
                links += 1;
                after_operand = false;
            }
            '+' | '-' | '*' | '/' => {
                operators += 1;
                after_operand = false;
            }
            _ => after_operand = true,
        }
    }

    if deepest + links > MAX_NESTING {
        return Err(CalcError::Syntax("expression nested too deeply".to_string()));
    }
    if operators > MAX_OPERATORS {
        return Err(CalcError::Syntax("expression has too many operators".to_string()));
    }
    Ok(())
}

fn is_pure_math(expr: &str) -> bool {
    let without_sqrt = SQRT_CALL.replace_all(expr, "(");
    !LETTER.is_match(&without_sqrt) && PURE_MATH.is_match(&without_sqrt)
}

/// Evaluate an arithmetic expression
pub fn calculate(expression: &str) -> Result<f64, CalcError> {
    let expr = preprocess(expression)?;
    if !is_pure_math(&expr) {
        return Err(CalcError::NotPureMath);
    }
    check_nesting(&expr)?;
    let value = parse(&expr)?.eval()?;
    if value.is_finite() {
        Ok(value)
    } else {
        Err(CalcError::NonFinite)
    }
}

/// Integral values print without a fractional part
pub fn format_number(value: f64) -> String {
    if value == 0.0 {
        // avoids "-0"
        "0".to_string()
    } else {
        format!("{}", value)
    }
}

pub struct CalculatorTool;

#[async_trait]
impl Tool for CalculatorTool {
    fn name(&self) -> ToolName {
        ToolName::Calculator
    }

    async fn call(&self, input: &str, _context: &str) -> Result<String, ToolError> {
        Ok(format_number(calculate(input)?))
    }
}
