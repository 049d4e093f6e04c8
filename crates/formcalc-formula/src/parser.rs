//! Expression parser
//!
//! A recursive descent parser with operator precedence. Text checks from
//! [`crate::safety`] run first; infix and prefix operators are desugared
//! into calls of the corresponding registry functions.

use crate::ast::Expr;
use crate::error::{FormulaError, FormulaResult};
use crate::safety::{check_text, ParseOptions};
use formcalc_core::{Decimal, Value};
use std::str::FromStr;

/// Parse expression text into a tree using the default limits
///
/// # Example
/// ```rust
/// use formcalc_formula::parse_expression;
///
/// let ast = parse_expression("ADD(1, 2)").unwrap();
/// let ast = parse_expression("quantity * unitPrice").unwrap();
/// let ast = parse_expression("IF($country == 'US', STATIC('[]'), null)").unwrap();
/// ```
pub fn parse_expression(text: &str) -> FormulaResult<Expr> {
    parse_expression_with(text, &ParseOptions::default())
}

/// Parse expression text with explicit limits
pub fn parse_expression_with(text: &str, options: &ParseOptions) -> FormulaResult<Expr> {
    check_text(text, options)?;

    let mut parser = ExpressionParser::new(text.trim(), options.max_depth)?;
    let expr = parser.expression()?;

    // Make sure we consumed all input
    if !matches!(parser.current_token(), Token::Eof) {
        return Err(FormulaError::Syntax(format!(
            "Unexpected {} at position {}",
            parser.current_token().describe(),
            parser.token_start
        )));
    }

    Ok(expr)
}

/// An operator accepted in expression text
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct OperatorInfo {
    pub symbol: &'static str,
    /// Registry function the operator is rewritten to, if any
    pub function: Option<&'static str>,
    pub description: &'static str,
}

const OPERATORS: &[OperatorInfo] = &[
    OperatorInfo { symbol: "+", function: Some("ADD"), description: "Addition" },
    OperatorInfo { symbol: "-", function: Some("SUBTRACT"), description: "Subtraction or negation" },
    OperatorInfo { symbol: "*", function: Some("MULTIPLY"), description: "Multiplication" },
    OperatorInfo { symbol: "/", function: Some("DIVIDE"), description: "Division" },
    OperatorInfo { symbol: "==", function: Some("EQUALS"), description: "Equal to" },
    OperatorInfo { symbol: "!=", function: Some("EQUALS"), description: "Not equal to" },
    OperatorInfo { symbol: ">", function: Some("GREATER_THAN"), description: "Greater than" },
    OperatorInfo { symbol: "<", function: Some("LESS_THAN"), description: "Less than" },
    OperatorInfo { symbol: ">=", function: Some("LESS_THAN"), description: "Greater than or equal to" },
    OperatorInfo { symbol: "<=", function: Some("GREATER_THAN"), description: "Less than or equal to" },
    OperatorInfo { symbol: "&&", function: Some("AND"), description: "Logical and" },
    OperatorInfo { symbol: "||", function: Some("OR"), description: "Logical or" },
    OperatorInfo { symbol: "!", function: Some("NOT"), description: "Logical not" },
    OperatorInfo { symbol: "(", function: None, description: "Group or argument list start" },
    OperatorInfo { symbol: ")", function: None, description: "Group or argument list end" },
    OperatorInfo { symbol: ",", function: None, description: "Argument separator" },
];

/// Operators and delimiters the parser accepts
pub fn supported_operators() -> &'static [OperatorInfo] {
    OPERATORS
}

/// Token types
#[derive(Debug, Clone, PartialEq)]
enum Token {
    // Literals
    Number(Decimal),
    String(String),
    Boolean(bool),
    Null,
    Json(Vec<formcalc_core::OptionItem>),

    // Identifiers (function names and variables)
    Identifier(String),
    Variable(String),

    // Operators
    Plus,
    Minus,
    Star,
    Slash,
    Equal,
    NotEqual,
    LessThan,
    LessEqual,
    GreaterThan,
    GreaterEqual,
    And,
    Or,
    Bang,
    Comma,

    // Delimiters
    LeftParen,
    RightParen,

    // End of input
    Eof,
}

impl Token {
    fn describe(&self) -> String {
        match self {
            Token::Number(n) => format!("number {}", n),
            Token::String(s) => format!("string '{}'", s),
            Token::Boolean(b) => format!("boolean {}", b),
            Token::Null => "null".into(),
            Token::Json(_) => "option list".into(),
            Token::Identifier(name) | Token::Variable(name) => format!("identifier '{}'", name),
            Token::Eof => "end of expression".into(),
            other => format!("{:?}", other),
        }
    }
}

/// Expression parser
struct ExpressionParser<'a> {
    input: &'a str,
    pos: usize,
    token_start: usize,
    current_token: Option<Token>,
    depth: usize,
    max_depth: usize,
}

impl<'a> ExpressionParser<'a> {
    fn new(input: &'a str, max_depth: usize) -> FormulaResult<Self> {
        let mut parser = Self {
            input,
            pos: 0,
            token_start: 0,
            current_token: None,
            depth: 0,
            max_depth,
        };
        parser.advance_token()?;
        Ok(parser)
    }

    // === Token scanning ===

    fn advance_token(&mut self) -> FormulaResult<()> {
        self.skip_whitespace();
        self.token_start = self.pos;
        self.current_token = Some(self.scan_token()?);
        Ok(())
    }

    fn scan_token(&mut self) -> FormulaResult<Token> {
        let Some(c) = self.peek_char() else {
            return Ok(Token::Eof);
        };

        // Single-character tokens
        let single = match c {
            '+' => Some(Token::Plus),
            '-' => Some(Token::Minus),
            '*' => Some(Token::Star),
            '/' => Some(Token::Slash),
            ',' => Some(Token::Comma),
            '(' => Some(Token::LeftParen),
            ')' => Some(Token::RightParen),
            _ => None,
        };
        if let Some(token) = single {
            self.advance();
            return Ok(token);
        }

        // One- or two-character operators
        match c {
            '<' => {
                self.advance();
                return Ok(match self.peek_char() {
                    Some('=') => {
                        self.advance();
                        Token::LessEqual
                    }
                    Some('>') => {
                        self.advance();
                        Token::NotEqual
                    }
                    _ => Token::LessThan,
                });
            }
            '>' => {
                self.advance();
                if self.peek_char() == Some('=') {
                    self.advance();
                    return Ok(Token::GreaterEqual);
                }
                return Ok(Token::GreaterThan);
            }
            '=' => {
                self.advance();
                if self.peek_char() == Some('=') {
                    self.advance();
                }
                return Ok(Token::Equal);
            }
            '!' => {
                self.advance();
                if self.peek_char() == Some('=') {
                    self.advance();
                    return Ok(Token::NotEqual);
                }
                return Ok(Token::Bang);
            }
            '&' | '|' => {
                self.advance();
                if self.peek_char() == Some(c) {
                    self.advance();
                    return Ok(if c == '&' { Token::And } else { Token::Or });
                }
                return Err(self.syntax_error(format!("Unsupported operator '{}'", c)));
            }
            _ => {}
        }

        if c == '"' || c == '\'' {
            return self.scan_string(c);
        }

        if c == '[' {
            return self.scan_json_array();
        }

        if c.is_ascii_digit()
            || (c == '.' && self.peek_char_at(1).map_or(false, |c| c.is_ascii_digit()))
        {
            return self.scan_number();
        }

        if c.is_alphabetic() || c == '_' || c == '$' {
            return self.scan_identifier();
        }

        Err(self.syntax_error(format!("Unexpected character '{}'", c)))
    }

    fn scan_string(&mut self, quote: char) -> FormulaResult<Token> {
        let start = self.pos;
        self.advance(); // Skip opening quote

        let mut s = String::new();
        loop {
            match self.peek_char() {
                Some(c) if c == quote => {
                    // Doubled quote is an escaped quote
                    if self.peek_char_at(1) == Some(quote) {
                        s.push(quote);
                        self.advance();
                        self.advance();
                    } else {
                        self.advance();
                        return Ok(Token::String(s));
                    }
                }
                Some(c) => {
                    s.push(c);
                    self.advance();
                }
                None => return Err(FormulaError::UnterminatedString { position: start }),
            }
        }
    }

    fn scan_number(&mut self) -> FormulaResult<Token> {
        let start = self.pos;

        // Integer part
        while self.peek_char().map_or(false, |c| c.is_ascii_digit()) {
            self.advance();
        }

        // Decimal part
        if self.peek_char() == Some('.') {
            self.advance();
            while self.peek_char().map_or(false, |c| c.is_ascii_digit()) {
                self.advance();
            }
        }

        // Exponent part
        let mut scientific = false;
        if self.peek_char().map_or(false, |c| c == 'e' || c == 'E')
            && self
                .peek_char_at(1)
                .map_or(false, |c| c.is_ascii_digit() || c == '+' || c == '-')
        {
            scientific = true;
            self.advance();
            if self.peek_char().map_or(false, |c| c == '+' || c == '-') {
                self.advance();
            }
            while self.peek_char().map_or(false, |c| c.is_ascii_digit()) {
                self.advance();
            }
        }

        let num_str = &self.input[start..self.pos];
        let parsed = if scientific {
            Decimal::from_scientific(num_str)
        } else {
            Decimal::from_str(num_str)
        };
        parsed
            .map(Token::Number)
            .map_err(|_| FormulaError::Syntax(format!("Invalid number '{}' at position {}", num_str, start)))
    }

    fn scan_identifier(&mut self) -> FormulaResult<Token> {
        let start = self.pos;
        let prefixed = self.peek_char() == Some('$');
        if prefixed {
            self.advance();
        }
        let name_start = self.pos;

        while self
            .peek_char()
            .map_or(false, |c| c.is_alphanumeric() || c == '_' || c == '.')
        {
            self.advance();
        }

        let name = &self.input[name_start..self.pos];
        if name.is_empty() {
            return Err(FormulaError::Syntax(format!(
                "Expected a variable name after '$' at position {}",
                start
            )));
        }
        if prefixed {
            return Ok(Token::Variable(name.to_string()));
        }

        // Keywords, unless used as a function name
        if self.peek_char() != Some('(') {
            match name.to_ascii_lowercase().as_str() {
                "true" => return Ok(Token::Boolean(true)),
                "false" => return Ok(Token::Boolean(false)),
                "null" => return Ok(Token::Null),
                _ => {}
            }
        }

        Ok(Token::Identifier(name.to_string()))
    }

    /// Scan a bracketed JSON array literal up to its matching `]`
    fn scan_json_array(&mut self) -> FormulaResult<Token> {
        let start = self.pos;
        let mut nesting = 0usize;
        let mut in_string = false;
        let mut escaped = false;

        while let Some(c) = self.peek_char() {
            self.advance();
            if in_string {
                match c {
                    _ if escaped => escaped = false,
                    '\\' => escaped = true,
                    '"' => in_string = false,
                    _ => {}
                }
                continue;
            }
            match c {
                '"' => in_string = true,
                '[' | '{' => nesting += 1,
                ']' | '}' => {
                    nesting -= 1;
                    if nesting == 0 {
                        break;
                    }
                }
                _ => {}
            }
        }
        if nesting != 0 {
            return Err(FormulaError::Syntax(format!(
                "Unterminated option list starting at position {}",
                start
            )));
        }

        let raw = &self.input[start..self.pos];
        let json: serde_json::Value = serde_json::from_str(raw)
            .map_err(|e| FormulaError::Syntax(format!("Invalid option list at position {}: {}", start, e)))?;
        match Value::from_json(&json) {
            Ok(Value::OptionList(items)) => Ok(Token::Json(items)),
            Ok(_) => Err(FormulaError::Syntax(format!(
                "Expected an option list at position {}",
                start
            ))),
            Err(e) => Err(FormulaError::Syntax(format!(
                "Invalid option list at position {}: {}",
                start, e
            ))),
        }
    }

    // === Helper methods ===

    fn peek_char(&self) -> Option<char> {
        self.input[self.pos..].chars().next()
    }

    fn peek_char_at(&self, offset: usize) -> Option<char> {
        self.input[self.pos..].chars().nth(offset)
    }

    fn advance(&mut self) {
        if let Some(c) = self.peek_char() {
            self.pos += c.len_utf8();
        }
    }

    fn skip_whitespace(&mut self) {
        while self.peek_char().map_or(false, |c| c.is_whitespace()) {
            self.advance();
        }
    }

    fn syntax_error(&self, message: String) -> FormulaError {
        FormulaError::Syntax(format!("{} at position {}", message, self.pos))
    }

    fn current_token(&self) -> &Token {
        self.current_token.as_ref().unwrap_or(&Token::Eof)
    }

    fn consume(&mut self) -> FormulaResult<Token> {
        let token = self.current_token.take().unwrap_or(Token::Eof);
        self.advance_token()?;
        Ok(token)
    }

    fn expect(&mut self, expected: &Token) -> FormulaResult<()> {
        if self.current_token() == expected {
            self.consume()?;
            Ok(())
        } else {
            Err(FormulaError::Syntax(format!(
                "Expected {}, got {} at position {}",
                expected.describe(),
                self.current_token().describe(),
                self.token_start
            )))
        }
    }

    fn enter(&mut self) -> FormulaResult<()> {
        self.depth += 1;
        if self.depth > self.max_depth {
            return Err(FormulaError::NestingTooDeep {
                limit: self.max_depth,
            });
        }
        Ok(())
    }

    fn leave(&mut self) {
        self.depth -= 1;
    }

    // === Expression parsing with precedence ===
    // Precedence (lowest to highest):
    // 1. Logical or: ||
    // 2. Logical and: &&
    // 3. Comparison: ==, !=, <, <=, >, >=
    // 4. Addition/Subtraction: +, -
    // 5. Multiplication/Division: *, /
    // 6. Unary: -, !
    // 7. Primary: literals, variables, function calls, parentheses

    fn expression(&mut self) -> FormulaResult<Expr> {
        self.parse_or()
    }

    fn parse_or(&mut self) -> FormulaResult<Expr> {
        let mut left = self.parse_and()?;

        while matches!(self.current_token(), Token::Or) {
            self.consume()?;
            let right = self.parse_and()?;
            left = Expr::call("OR", vec![left, right]);
        }

        Ok(left)
    }

    fn parse_and(&mut self) -> FormulaResult<Expr> {
        let mut left = self.parse_comparison()?;

        while matches!(self.current_token(), Token::And) {
            self.consume()?;
            let right = self.parse_comparison()?;
            left = Expr::call("AND", vec![left, right]);
        }

        Ok(left)
    }

    fn parse_comparison(&mut self) -> FormulaResult<Expr> {
        let mut left = self.parse_additive()?;

        loop {
            let op = match self.current_token() {
                Token::Equal
                | Token::NotEqual
                | Token::LessThan
                | Token::LessEqual
                | Token::GreaterThan
                | Token::GreaterEqual => self.current_token().clone(),
                _ => break,
            };

            self.consume()?;
            let right = self.parse_additive()?;
            let args = vec![left, right];
            left = match op {
                Token::Equal => Expr::call("EQUALS", args),
                Token::NotEqual => Expr::call("NOT", vec![Expr::call("EQUALS", args)]),
                Token::LessThan => Expr::call("LESS_THAN", args),
                Token::GreaterThan => Expr::call("GREATER_THAN", args),
                Token::LessEqual => Expr::call("NOT", vec![Expr::call("GREATER_THAN", args)]),
                _ => Expr::call("NOT", vec![Expr::call("LESS_THAN", args)]),
            };
        }

        Ok(left)
    }

    fn parse_additive(&mut self) -> FormulaResult<Expr> {
        let mut left = self.parse_multiplicative()?;

        loop {
            let name = match self.current_token() {
                Token::Plus => "ADD",
                Token::Minus => "SUBTRACT",
                _ => break,
            };

            self.consume()?;
            let right = self.parse_multiplicative()?;
            left = Expr::call(name, vec![left, right]);
        }

        Ok(left)
    }

    fn parse_multiplicative(&mut self) -> FormulaResult<Expr> {
        let mut left = self.parse_unary()?;

        loop {
            let name = match self.current_token() {
                Token::Star => "MULTIPLY",
                Token::Slash => "DIVIDE",
                _ => break,
            };

            self.consume()?;
            let right = self.parse_unary()?;
            left = Expr::call(name, vec![left, right]);
        }

        Ok(left)
    }

    fn parse_unary(&mut self) -> FormulaResult<Expr> {
        match self.current_token() {
            Token::Minus => {
                self.consume()?;
                self.enter()?;
                let operand = self.parse_unary()?;
                self.leave();
                // Fold negative literals
                if let Expr::Literal(Value::Number(n)) = operand {
                    return Ok(Expr::Literal(Value::Number(-n)));
                }
                Ok(Expr::call(
                    "SUBTRACT",
                    vec![Expr::Literal(Value::Number(Decimal::ZERO)), operand],
                ))
            }
            // Prefix plus (no-op)
            Token::Plus => {
                self.consume()?;
                self.parse_unary()
            }
            Token::Bang => {
                self.consume()?;
                self.enter()?;
                let operand = self.parse_unary()?;
                self.leave();
                Ok(Expr::call("NOT", vec![operand]))
            }
            _ => self.parse_primary(),
        }
    }

    fn parse_primary(&mut self) -> FormulaResult<Expr> {
        match self.current_token().clone() {
            Token::Number(n) => {
                self.consume()?;
                Ok(Expr::Literal(Value::Number(n)))
            }

            Token::String(s) => {
                self.consume()?;
                Ok(Expr::Literal(Value::String(s)))
            }

            Token::Boolean(b) => {
                self.consume()?;
                Ok(Expr::Literal(Value::Boolean(b)))
            }

            Token::Null => {
                self.consume()?;
                Ok(Expr::Literal(Value::Null))
            }

            Token::Json(items) => {
                self.consume()?;
                Ok(Expr::Literal(Value::OptionList(items)))
            }

            Token::LeftParen => {
                self.consume()?;
                self.enter()?;
                let expr = self.expression()?;
                self.leave();
                self.expect(&Token::RightParen)?;
                Ok(expr)
            }

            Token::Variable(name) => {
                self.consume()?;
                Ok(Expr::Variable(name))
            }

            Token::Identifier(name) => {
                self.consume()?;
                // Check if it's a function call
                if matches!(self.current_token(), Token::LeftParen) {
                    self.parse_function_call(name)
                } else {
                    Ok(Expr::Variable(name))
                }
            }

            other => Err(FormulaError::Syntax(format!(
                "Unexpected {} at position {}",
                other.describe(),
                self.token_start
            ))),
        }
    }

    fn parse_function_call(&mut self, name: String) -> FormulaResult<Expr> {
        self.expect(&Token::LeftParen)?;
        self.enter()?;

        let mut args = Vec::new();

        // Parse arguments
        if !matches!(self.current_token(), Token::RightParen) {
            args.push(self.expression()?);

            while matches!(self.current_token(), Token::Comma) {
                self.consume()?;
                args.push(self.expression()?);
            }
        }

        self.leave();
        self.expect(&Token::RightParen)?;

        Ok(Expr::call(&name, args))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn num(n: i64) -> Expr {
        Expr::Literal(Value::from(n))
    }

    #[test]
    fn test_parse_number() {
        assert_eq!(parse_expression("42").unwrap(), num(42));
        assert_eq!(
            parse_expression("25.50").unwrap(),
            Expr::Literal(Value::Number(Decimal::new(2550, 2)))
        );
        assert_eq!(parse_expression("-3").unwrap(), num(-3));
        assert_eq!(parse_expression("1e3").unwrap(), num(1000));
    }

    #[test]
    fn test_parse_string() {
        assert_eq!(
            parse_expression("\"Hello \"\"World\"\"\"").unwrap(),
            Expr::Literal(Value::string("Hello \"World\""))
        );
        assert_eq!(
            parse_expression("'it''s'").unwrap(),
            Expr::Literal(Value::string("it's"))
        );
    }

    #[test]
    fn test_parse_keywords() {
        assert_eq!(parse_expression("TRUE").unwrap(), Expr::Literal(Value::from(true)));
        assert_eq!(parse_expression("false").unwrap(), Expr::Literal(Value::from(false)));
        assert_eq!(parse_expression("Null").unwrap(), Expr::Literal(Value::Null));
    }

    #[test]
    fn test_parse_variables() {
        assert_eq!(parse_expression("quantity").unwrap(), Expr::variable("quantity"));
        assert_eq!(parse_expression("$quantity").unwrap(), Expr::variable("quantity"));
        assert_eq!(parse_expression("option.value").unwrap(), Expr::variable("option.value"));
    }

    #[test]
    fn test_parse_function_call() {
        let ast = parse_expression("add(1, round(x, 2))").unwrap();
        assert_eq!(
            ast,
            Expr::call(
                "ADD",
                vec![num(1), Expr::call("ROUND", vec![Expr::variable("x"), num(2)])]
            )
        );
        assert_eq!(parse_expression("NOW()").unwrap(), Expr::call("NOW", vec![]));
    }

    #[test]
    fn test_parse_arithmetic_precedence() {
        // Should parse as 1+(2*3) due to precedence
        let ast = parse_expression("1 + 2 * 3").unwrap();
        assert_eq!(
            ast,
            Expr::call("ADD", vec![num(1), Expr::call("MULTIPLY", vec![num(2), num(3)])])
        );

        // Left associative
        let ast = parse_expression("10 - 4 - 3").unwrap();
        assert_eq!(
            ast,
            Expr::call(
                "SUBTRACT",
                vec![Expr::call("SUBTRACT", vec![num(10), num(4)]), num(3)]
            )
        );
    }

    #[test]
    fn test_parse_comparison_and_logic() {
        let ast = parse_expression("a > 1 && b <= 2 || !c").unwrap();
        let expected = Expr::call(
            "OR",
            vec![
                Expr::call(
                    "AND",
                    vec![
                        Expr::call("GREATER_THAN", vec![Expr::variable("a"), num(1)]),
                        Expr::call(
                            "NOT",
                            vec![Expr::call("GREATER_THAN", vec![Expr::variable("b"), num(2)])],
                        ),
                    ],
                ),
                Expr::call("NOT", vec![Expr::variable("c")]),
            ],
        );
        assert_eq!(ast, expected);

        let ast = parse_expression("a != 'x'").unwrap();
        assert_eq!(
            ast,
            Expr::call(
                "NOT",
                vec![Expr::call("EQUALS", vec![Expr::variable("a"), Expr::Literal(Value::string("x"))])]
            )
        );
    }

    #[test]
    fn test_parse_unary_minus_on_variable() {
        let ast = parse_expression("-x").unwrap();
        assert_eq!(
            ast,
            Expr::call("SUBTRACT", vec![num(0), Expr::variable("x")])
        );
    }

    #[test]
    fn test_parse_json_option_list() {
        let ast = parse_expression(r#"STATIC([{"value":"us","label":"United States (US)"}])"#).unwrap();
        if let Expr::Function { name, args } = ast {
            assert_eq!(name, "STATIC");
            assert_eq!(
                args,
                vec![Expr::Literal(Value::OptionList(vec![formcalc_core::OptionItem::new(
                    "us",
                    "United States (US)"
                )]))]
            );
        } else {
            panic!("Expected Function");
        }
    }

    #[test]
    fn test_parse_errors() {
        assert_eq!(parse_expression(""), Err(FormulaError::EmptyExpression));
        assert!(matches!(
            parse_expression("ADD(1, 2"),
            Err(FormulaError::UnbalancedParentheses { .. })
        ));
        assert!(matches!(
            parse_expression("ADD(1, 2))"),
            Err(FormulaError::UnbalancedParentheses { .. })
        ));
        assert!(matches!(parse_expression("1 +"), Err(FormulaError::Syntax(_))));
        assert!(matches!(parse_expression("1 2"), Err(FormulaError::Syntax(_))));
        assert!(matches!(parse_expression("a % b"), Err(FormulaError::Syntax(_))));
        assert!(matches!(parse_expression("a & b"), Err(FormulaError::Syntax(_))));
        assert!(matches!(parse_expression("ADD(1,)"), Err(FormulaError::Syntax(_))));
        assert!(matches!(
            parse_expression("EXEC(1)"),
            Err(FormulaError::UnsafeExpression { .. })
        ));
    }

    #[test]
    fn test_parse_depth_limit() {
        let options = ParseOptions {
            max_depth: 3,
            ..ParseOptions::default()
        };
        assert!(parse_expression_with("ABS(ABS(ABS(1)))", &options).is_ok());
        assert_eq!(
            parse_expression_with("ABS(ABS(ABS(ABS(1))))", &options),
            Err(FormulaError::NestingTooDeep { limit: 3 })
        );
        assert_eq!(
            parse_expression_with("((((1))))", &options),
            Err(FormulaError::NestingTooDeep { limit: 3 })
        );
    }
}
