//! Calculator 工具：四则运算、乘方（`^` 或 `**`）、括号、一元负号、sqrt / pow
//!
//! 递归下降求值，不支持其他标识符。嵌套（括号、函数调用、一元符号、乘方链）超过 MAX_DEPTH 层时
//! 返回 InvalidArguments，递归深度因此有界。

use async_trait::async_trait;
use serde_json::{json, Map, Value};

use crate::tools::{Tool, ToolError};

pub struct CalculatorTool;

/// 最大嵌套层数
pub const MAX_DEPTH: usize = 256;

#[derive(Debug, Clone, PartialEq)]
enum Tok {
    Num(f64),
    Ident(String),
    Op(char),
    LParen,
    RParen,
    Comma,
}

fn lex(src: &str) -> Result<Vec<Tok>, ToolError> {
    let chars: Vec<char> = src.chars().collect();
    let mut out = Vec::new();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        match c {
            c if c.is_whitespace() => i += 1,
            '0'..='9' | '.' => {
                let start = i;
                while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                    i += 1;
                }
                let text: String = chars[start..i].iter().collect();
                let n = text
                    .parse::<f64>()
                    .map_err(|_| ToolError::InvalidArguments(format!("invalid number '{text}'")))?;
                out.push(Tok::Num(n));
            }
            c if c.is_ascii_alphabetic() || c == '_' => {
                let start = i;
                while i < chars.len() && (chars[i].is_ascii_alphanumeric() || chars[i] == '_') {
                    i += 1;
                }
                out.push(Tok::Ident(chars[start..i].iter().collect()));
            }
            '*' if chars.get(i + 1) == Some(&'*') => {
                out.push(Tok::Op('^'));
                i += 2;
            }
            '+' | '-' | '*' | '/' | '^' => {
                out.push(Tok::Op(c));
                i += 1;
            }
            '(' => {
                out.push(Tok::LParen);
                i += 1;
            }
            ')' => {
                out.push(Tok::RParen);
                i += 1;
            }
            ',' => {
                out.push(Tok::Comma);
                i += 1;
            }
            other => {
                return Err(ToolError::InvalidArguments(format!(
                    "unsupported character '{other}'"
                )))
            }
        }
    }
    Ok(out)
}

struct Parser {
    toks: Vec<Tok>,
    pos: usize,
    depth: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Tok> {
        self.toks.get(self.pos)
    }

    fn next(&mut self) -> Option<Tok> {
        let t = self.toks.get(self.pos).cloned();
        self.pos += 1;
        t
    }

    fn expect(&mut self, tok: Tok) -> Result<(), ToolError> {
        match self.next() {
            Some(t) if t == tok => Ok(()),
            other => Err(ToolError::InvalidArguments(format!(
                "expected {tok:?}, found {other:?}"
            ))),
        }
    }

    /// 进入一层嵌套；出错时整个求值终止，无需回退计数
    fn descend(&mut self) -> Result<(), ToolError> {
        self.depth += 1;
        if self.depth > MAX_DEPTH {
            return Err(ToolError::InvalidArguments(
                "expression too deeply nested".to_string(),
            ));
        }
        Ok(())
    }

    fn ascend(&mut self) {
        self.depth -= 1;
    }

    fn expr(&mut self) -> Result<f64, ToolError> {
        let mut acc = self.term()?;
        while let Some(Tok::Op(op @ ('+' | '-'))) = self.peek().cloned() {
            self.pos += 1;
            let rhs = self.term()?;
            acc = if op == '+' { acc + rhs } else { acc - rhs };
        }
        Ok(acc)
    }

    fn term(&mut self) -> Result<f64, ToolError> {
        let mut acc = self.unary()?;
        while let Some(Tok::Op(op @ ('*' | '/'))) = self.peek().cloned() {
            self.pos += 1;
            let rhs = self.unary()?;
            if op == '*' {
                acc *= rhs;
            } else {
                if rhs == 0.0 {
                    return Err(ToolError::Execution("division by zero".to_string()));
                }
                acc /= rhs;
            }
        }
        Ok(acc)
    }

    fn unary(&mut self) -> Result<f64, ToolError> {
        match self.peek() {
            Some(Tok::Op('-')) => {
                self.pos += 1;
                self.descend()?;
                let v = -self.unary()?;
                self.ascend();
                Ok(v)
            }
            Some(Tok::Op('+')) => {
                self.pos += 1;
                self.descend()?;
                let v = self.unary()?;
                self.ascend();
                Ok(v)
            }
            _ => self.power(),
        }
    }

    /// 右结合：2 ^ 3 ^ 2 = 2 ^ 9
    fn power(&mut self) -> Result<f64, ToolError> {
        let base = self.primary()?;
        if let Some(Tok::Op('^')) = self.peek() {
            self.pos += 1;
            self.descend()?;
            let exp = self.unary()?;
            self.ascend();
            return Ok(base.powf(exp));
        }
        Ok(base)
    }

    fn primary(&mut self) -> Result<f64, ToolError> {
        match self.next() {
            Some(Tok::Num(n)) => Ok(n),
            Some(Tok::LParen) => {
                self.descend()?;
                let v = self.expr()?;
                self.expect(Tok::RParen)?;
                self.ascend();
                Ok(v)
            }
            Some(Tok::Ident(name)) => {
                self.expect(Tok::LParen)?;
                self.descend()?;
                let mut args = vec![self.expr()?];
                while let Some(Tok::Comma) = self.peek() {
                    self.pos += 1;
                    args.push(self.expr()?);
                }
                self.expect(Tok::RParen)?;
                self.ascend();
                call_function(&name, &args)
            }
            other => Err(ToolError::InvalidArguments(format!(
                "unexpected token {other:?}"
            ))),
        }
    }
}

fn call_function(name: &str, args: &[f64]) -> Result<f64, ToolError> {
    match (name, args) {
        ("sqrt", [x]) if *x < 0.0 => Err(ToolError::Execution("math domain error".to_string())),
        ("sqrt", [x]) => Ok(x.sqrt()),
        ("pow", [x, y]) => Ok(x.powf(*y)),
        ("sqrt" | "pow", _) => Err(ToolError::InvalidArguments(format!(
            "wrong number of arguments for {name}"
        ))),
        _ => Err(ToolError::InvalidArguments(format!("unknown function '{name}'"))),
    }
}

pub fn evaluate(expression: &str) -> Result<f64, ToolError> {
    let mut parser = Parser {
        toks: lex(expression)?,
        pos: 0,
        depth: 0,
    };
    let value = parser.expr()?;
    if parser.pos < parser.toks.len() {
        return Err(ToolError::InvalidArguments(format!(
            "unexpected trailing input in '{expression}'"
        )));
    }
    Ok(value)
}

/// 整数结果输出为 JSON 整数
fn to_json_number(v: f64) -> Value {
    if v.is_finite() && v.fract() == 0.0 && v.abs() < 1e15 {
        json!(v as i64)
    } else {
        json!(v)
    }
}

#[async_trait]
impl Tool for CalculatorTool {
    fn name(&self) -> &str {
        "calculator"
    }

    fn description(&self) -> &str {
        "Evaluate an arithmetic expression (+ - * / ^, parentheses, sqrt, pow). Args: {\"expression\": \"42 + 8\"}."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "expression": { "type": "string", "description": "Arithmetic expression" }
            },
            "required": ["expression"]
        })
    }

    async fn call(&self, args: &Map<String, Value>) -> Result<Value, ToolError> {
        let expression = args
            .get("expression")
            .and_then(|v| v.as_str())
            .unwrap_or("")
            .trim();
        if expression.is_empty() {
            return Err(ToolError::InvalidArguments("empty_expression".to_string()));
        }
        let value = evaluate(expression)?;
        if !value.is_finite() {
            return Err(ToolError::Execution(format!("non-finite result for '{expression}'")));
        }
        Ok(json!({
            "expression": expression,
            "value": to_json_number(value),
        }))
    }
}
