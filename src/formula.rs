//! Sandboxed evaluator for operator-editable scoring formulas.
//!
//! Formulas are plain arithmetic over numeric literals and the single
//! variable `n` (participant count): `+ - * / ^`, unary minus, parentheses.
//! Nothing else is reachable from a formula, so a hostile or mistyped
//! formula can at worst fail to evaluate.

#[derive(Debug, Clone, Copy, PartialEq)]
enum Token {
    Number(f64),
    Variable,
    Plus,
    Minus,
    Star,
    Slash,
    Caret,
    OpenParen,
    CloseParen,
}

fn tokenize(src: &str) -> Result<Vec<Token>, String> {
    let mut tokens = Vec::new();
    let mut chars = src.chars().peekable();
    while let Some(&c) = chars.peek() {
        match c {
            c if c.is_whitespace() => {
                chars.next();
            }
            '+' => {
                chars.next();
                tokens.push(Token::Plus);
            }
            '-' => {
                chars.next();
                tokens.push(Token::Minus);
            }
            '*' => {
                chars.next();
                tokens.push(Token::Star);
            }
            '/' => {
                chars.next();
                tokens.push(Token::Slash);
            }
            '^' => {
                chars.next();
                tokens.push(Token::Caret);
            }
            '(' => {
                chars.next();
                tokens.push(Token::OpenParen);
            }
            ')' => {
                chars.next();
                tokens.push(Token::CloseParen);
            }
            '0'..='9' | '.' => {
                let mut literal = String::new();
                while let Some(&d) = chars.peek() {
                    if d.is_ascii_digit() || d == '.' {
                        literal.push(d);
                        chars.next();
                    } else {
                        break;
                    }
                }
                let value = literal
                    .parse::<f64>()
                    .map_err(|_| format!("invalid number literal {literal:?}"))?;
                tokens.push(Token::Number(value));
            }
            c if c.is_ascii_alphabetic() || c == '_' => {
                let mut ident = String::new();
                while let Some(&a) = chars.peek() {
                    if a.is_ascii_alphanumeric() || a == '_' {
                        ident.push(a);
                        chars.next();
                    } else {
                        break;
                    }
                }
                if ident == "n" {
                    tokens.push(Token::Variable);
                } else {
                    return Err(format!("unknown identifier {ident:?}"));
                }
            }
            other => return Err(format!("unexpected character {other:?}")),
        }
    }
    Ok(tokens)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    n: f64,
}

impl Parser {
    fn peek(&self) -> Option<Token> {
        self.tokens.get(self.pos).copied()
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.peek();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    // Precedence climbing. `^` is right-associative and binds tighter than
    // unary minus, so `-2^2` is `-(2^2)`.
    fn expression(&mut self, min_bp: u8) -> Result<f64, String> {
        let mut lhs = self.operand()?;
        while let Some(op) = self.peek() {
            let (lbp, rbp) = match op {
                Token::Plus | Token::Minus => (1, 2),
                Token::Star | Token::Slash => (3, 4),
                Token::Caret => (6, 5),
                _ => break,
            };
            if lbp < min_bp {
                break;
            }
            self.pos += 1;
            let rhs = self.expression(rbp)?;
            lhs = match op {
                Token::Plus => lhs + rhs,
                Token::Minus => lhs - rhs,
                Token::Star => lhs * rhs,
                Token::Slash => lhs / rhs,
                _ => lhs.powf(rhs),
            };
        }
        Ok(lhs)
    }

    fn operand(&mut self) -> Result<f64, String> {
        match self.next() {
            Some(Token::Number(value)) => Ok(value),
            Some(Token::Variable) => Ok(self.n),
            Some(Token::Minus) => Ok(-self.expression(5)?),
            Some(Token::OpenParen) => {
                let value = self.expression(0)?;
                match self.next() {
                    Some(Token::CloseParen) => Ok(value),
                    _ => Err("missing closing parenthesis".to_string()),
                }
            }
            Some(token) => Err(format!("unexpected token {token:?}")),
            None => Err("formula ended unexpectedly".to_string()),
        }
    }
}

/// Evaluate `src` with the variable `n` bound. Errors on any malformed
/// input and on non-finite results, since an infinite modifier would
/// poison every later standings comparison.
pub fn eval_formula(src: &str, n: f64) -> Result<f64, String> {
    let trimmed = src.trim();
    if trimmed.is_empty() {
        return Err("empty formula".to_string());
    }
    let tokens = tokenize(trimmed)?;
    let mut parser = Parser { tokens, pos: 0, n };
    let value = parser.expression(0)?;
    if parser.pos != parser.tokens.len() {
        return Err(format!("unexpected trailing input in {trimmed:?}"));
    }
    if !value.is_finite() {
        return Err(format!("formula {trimmed:?} produced a non-finite value for n = {n}"));
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constants_and_variable() {
        assert_eq!(eval_formula("2", 4.0).unwrap(), 2.0);
        assert_eq!(eval_formula("n", 3.0).unwrap(), 3.0);
        assert_eq!(eval_formula(" 1.5 ", 0.0).unwrap(), 1.5);
    }

    #[test]
    fn test_precedence_and_parentheses() {
        assert_eq!(eval_formula("1+2*3", 0.0).unwrap(), 7.0);
        assert_eq!(eval_formula("(1+2)*3", 0.0).unwrap(), 9.0);
        assert_eq!(eval_formula("n*2-1", 4.0).unwrap(), 7.0);
        assert_eq!(eval_formula("10/4", 0.0).unwrap(), 2.5);
    }

    #[test]
    fn test_power_is_right_associative() {
        assert_eq!(eval_formula("2^3", 0.0).unwrap(), 8.0);
        assert_eq!(eval_formula("2^3^2", 0.0).unwrap(), 512.0);
        assert_eq!(eval_formula("n^2", 3.0).unwrap(), 9.0);
    }

    #[test]
    fn test_unary_minus() {
        assert_eq!(eval_formula("-2", 0.0).unwrap(), -2.0);
        assert_eq!(eval_formula("-n+5", 2.0).unwrap(), 3.0);
        assert_eq!(eval_formula("-2^2", 0.0).unwrap(), -4.0);
        assert_eq!(eval_formula("3--2", 0.0).unwrap(), 5.0);
    }

    #[test]
    fn test_malformed_formulas_error() {
        assert!(eval_formula("n.", 2.0).is_err());
        assert!(eval_formula("", 2.0).is_err());
        assert!(eval_formula("2+", 2.0).is_err());
        assert!(eval_formula("x", 2.0).is_err());
        assert!(eval_formula("(1+2", 2.0).is_err());
        assert!(eval_formula("1 2", 2.0).is_err());
        assert!(eval_formula("alert(1)", 2.0).is_err());
    }

    #[test]
    fn test_non_finite_result_errors() {
        assert!(eval_formula("1/0", 2.0).is_err());
        assert!(eval_formula("n/0", 0.0).is_err());
    }
}
