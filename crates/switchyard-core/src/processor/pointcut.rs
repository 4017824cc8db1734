//! Pointcut expressions selecting which methods an interceptor applies to.
//!
//! Grammar:
//!
//! ```text
//! expr    := and ( "||" and )*
//! and     := unary ( "&&" unary )*
//! unary   := "!" unary | primary
//! primary := "(" expr ")" | "@(" Name ")" | Interface [ "::" method ]
//! ```
//!
//! Interface and method names may end in `*` to match by prefix. An empty
//! expression matches every method.

use switchyard_types::{Annotation, InterfaceToCall, MessagingError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Pointcut {
    Any,
    Annotation(String),
    Interface(String),
    Method { interface: String, method: String },
    Not(Box<Pointcut>),
    And(Box<Pointcut>, Box<Pointcut>),
    Or(Box<Pointcut>, Box<Pointcut>),
}

impl Pointcut {
    /// Parse an expression. Malformed input is a configuration error.
    pub fn parse(expression: &str) -> Result<Self, MessagingError> {
        let tokens = tokenize(expression)?;
        if tokens.is_empty() {
            return Ok(Pointcut::Any);
        }

        let mut parser = Parser { tokens, position: 0 };
        let pointcut = parser.or_expression()?;
        if parser.position != parser.tokens.len() {
            return Err(invalid(expression, "unexpected trailing input"));
        }
        Ok(pointcut)
    }

    /// Whether `interface` (invoked through an endpoint carrying
    /// `endpoint_annotations`) is selected.
    pub fn matches(&self, interface: &InterfaceToCall, endpoint_annotations: &[Annotation]) -> bool {
        match self {
            Pointcut::Any => true,
            Pointcut::Annotation(name) => {
                interface.has_annotation(name) || endpoint_annotations.iter().any(|a| a.name == *name)
            }
            Pointcut::Interface(pattern) => glob(pattern, interface.interface_name()),
            Pointcut::Method { interface: i, method } => {
                glob(i, interface.interface_name()) && glob(method, interface.method_name())
            }
            Pointcut::Not(inner) => !inner.matches(interface, endpoint_annotations),
            Pointcut::And(left, right) => {
                left.matches(interface, endpoint_annotations) && right.matches(interface, endpoint_annotations)
            }
            Pointcut::Or(left, right) => {
                left.matches(interface, endpoint_annotations) || right.matches(interface, endpoint_annotations)
            }
        }
    }
}

fn glob(pattern: &str, value: &str) -> bool {
    match pattern.strip_suffix('*') {
        Some(prefix) => value.starts_with(prefix),
        None => pattern == value,
    }
}

fn invalid(expression: &str, reason: &str) -> MessagingError {
    MessagingError::configuration(format!("invalid pointcut `{expression}`: {reason}"))
}

// ---------------------------------------------------------------------------
// Tokenizer / parser
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Open,
    Close,
    And,
    Or,
    Not,
    Annotation(String),
    Target(String),
}

fn is_name_char(ch: char) -> bool {
    ch.is_alphanumeric() || matches!(ch, '_' | '\\' | '.' | '*' | ':' | '-')
}

fn tokenize(expression: &str) -> Result<Vec<Token>, MessagingError> {
    let mut tokens = Vec::new();
    let mut chars = expression.char_indices().peekable();

    while let Some((index, ch)) = chars.next() {
        match ch {
            c if c.is_whitespace() => {}
            '(' => tokens.push(Token::Open),
            ')' => tokens.push(Token::Close),
            '!' => tokens.push(Token::Not),
            '&' | '|' => {
                if chars.next_if(|(_, next)| *next == ch).is_none() {
                    return Err(invalid(expression, "single `&` or `|`"));
                }
                tokens.push(if ch == '&' { Token::And } else { Token::Or });
            }
            '@' => {
                if chars.next_if(|(_, next)| *next == '(').is_none() {
                    return Err(invalid(expression, "expected `(` after `@`"));
                }
                let mut name = String::new();
                loop {
                    match chars.next() {
                        Some((_, ')')) => break,
                        Some((_, c)) => name.push(c),
                        None => return Err(invalid(expression, "unterminated annotation")),
                    }
                }
                let name = name.trim();
                if name.is_empty() {
                    return Err(invalid(expression, "empty annotation name"));
                }
                tokens.push(Token::Annotation(name.to_string()));
            }
            c if is_name_char(c) => {
                let mut end = index + c.len_utf8();
                while let Some((next_index, next)) = chars.next_if(|(_, next)| is_name_char(*next)) {
                    end = next_index + next.len_utf8();
                }
                tokens.push(Token::Target(expression[index..end].to_string()));
            }
            other => return Err(invalid(expression, &format!("unexpected character `{other}`"))),
        }
    }

    Ok(tokens)
}

struct Parser {
    tokens: Vec<Token>,
    position: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.position)
    }

    fn advance(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.position).cloned();
        self.position += 1;
        token
    }

    fn or_expression(&mut self) -> Result<Pointcut, MessagingError> {
        let mut left = self.and_expression()?;
        while self.peek() == Some(&Token::Or) {
            self.position += 1;
            let right = self.and_expression()?;
            left = Pointcut::Or(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn and_expression(&mut self) -> Result<Pointcut, MessagingError> {
        let mut left = self.unary()?;
        while self.peek() == Some(&Token::And) {
            self.position += 1;
            let right = self.unary()?;
            left = Pointcut::And(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn unary(&mut self) -> Result<Pointcut, MessagingError> {
        if self.peek() == Some(&Token::Not) {
            self.position += 1;
            return Ok(Pointcut::Not(Box::new(self.unary()?)));
        }
        self.primary()
    }

    fn primary(&mut self) -> Result<Pointcut, MessagingError> {
        match self.advance() {
            Some(Token::Open) => {
                let inner = self.or_expression()?;
                match self.advance() {
                    Some(Token::Close) => Ok(inner),
                    _ => Err(MessagingError::configuration("invalid pointcut: missing `)`")),
                }
            }
            Some(Token::Annotation(name)) => Ok(Pointcut::Annotation(name)),
            Some(Token::Target(target)) => Ok(match target.split_once("::") {
                Some((interface, method)) => Pointcut::Method {
                    interface: interface.to_string(),
                    method: method.to_string(),
                },
                None => Pointcut::Interface(target),
            }),
            other => Err(MessagingError::configuration(format!(
                "invalid pointcut: unexpected {other:?}"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn order_service() -> InterfaceToCall {
        InterfaceToCall::new("App\\OrderService", "placeOrder")
            .with_annotation(Annotation::new("Transactional"))
    }

    #[test]
    fn empty_expression_matches_everything() {
        assert_eq!(Pointcut::parse("  ").unwrap(), Pointcut::Any);
        assert!(Pointcut::Any.matches(&order_service(), &[]));
    }

    #[test]
    fn annotation_on_method_or_endpoint() {
        let pointcut = Pointcut::parse("@(Transactional)").unwrap();
        assert!(pointcut.matches(&order_service(), &[]));

        let logged = Pointcut::parse("@(Logged)").unwrap();
        assert!(!logged.matches(&order_service(), &[]));
        assert!(logged.matches(&order_service(), &[Annotation::new("Logged")]));
    }

    #[test]
    fn interface_and_method_patterns() {
        let service = order_service();
        assert!(Pointcut::parse("App\\OrderService").unwrap().matches(&service, &[]));
        assert!(Pointcut::parse("App\\*").unwrap().matches(&service, &[]));
        assert!(Pointcut::parse("App\\OrderService::place*").unwrap().matches(&service, &[]));
        assert!(!Pointcut::parse("App\\OrderService::cancel").unwrap().matches(&service, &[]));
        assert!(!Pointcut::parse("Billing\\*").unwrap().matches(&service, &[]));
    }

    #[test]
    fn boolean_combinations() {
        let service = order_service();
        let pointcut = Pointcut::parse("(Billing\\* || App\\*) && !@(ReadOnly)").unwrap();
        assert!(pointcut.matches(&service, &[]));
        assert!(!pointcut.matches(&service, &[Annotation::new("ReadOnly")]));
        assert!(
            Pointcut::parse("Billing\\* || @(Transactional) && App\\*")
                .unwrap()
                .matches(&service, &[])
        );
    }

    #[test]
    fn malformed_expressions_are_configuration_errors() {
        for expression in ["@(", "(App", "App &", "App ||", "App $", "@()", "App Other"] {
            let err = Pointcut::parse(expression).unwrap_err();
            assert!(err.is_configuration(), "{expression} gave {err:?}");
        }
    }
}
