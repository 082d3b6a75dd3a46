//! Lua front end: lexer and recursive-descent parser
//!
//! Accepts the Lua 5.x subset the transpiler understands (see `ast`):
//! statements, function definitions, calls and method sugar, indexing,
//! table constructors, control flow, and the full operator set with Lua
//! precedence. Constructs outside that subset (`goto`, method
//! definitions on tables) produce a parse error naming the construct and
//! line rather than being silently dropped.

use crate::ast::{
    BinOp, Block, Chunk, ElseIf, Expr, FuncBody, Stmt, TableEntry, UnOp,
};

/// A lexed token with the 1-based line it starts on.
#[derive(Debug, Clone, PartialEq)]
struct Token {
    kind: TokenKind,
    line: usize,
}

#[derive(Debug, Clone, PartialEq)]
enum TokenKind {
    Name(String),
    Number(f64),
    Str(String),

    // keywords
    And,
    Break,
    Do,
    Else,
    ElseIf,
    End,
    False,
    For,
    Function,
    Goto,
    If,
    In,
    Local,
    Nil,
    Not,
    Or,
    Repeat,
    Return,
    Then,
    True,
    Until,
    While,

    // punctuation
    Plus,
    Minus,
    Star,
    Slash,
    DoubleSlash,
    Percent,
    Caret,
    Hash,
    EqEq,
    NotEq,
    LessEq,
    GreaterEq,
    Less,
    Greater,
    Assign,
    LParen,
    RParen,
    LBrace,
    RBrace,
    LBracket,
    RBracket,
    Semi,
    Colon,
    Comma,
    Dot,
    Concat,
    Ellipsis,
}

impl TokenKind {
    fn describe(&self) -> String {
        match self {
            TokenKind::Name(n) => format!("name '{}'", n),
            TokenKind::Number(n) => format!("number '{}'", n),
            TokenKind::Str(_) => "string literal".to_string(),
            TokenKind::And => "'and'".to_string(),
            TokenKind::Break => "'break'".to_string(),
            TokenKind::Do => "'do'".to_string(),
            TokenKind::Else => "'else'".to_string(),
            TokenKind::ElseIf => "'elseif'".to_string(),
            TokenKind::End => "'end'".to_string(),
            TokenKind::False => "'false'".to_string(),
            TokenKind::For => "'for'".to_string(),
            TokenKind::Function => "'function'".to_string(),
            TokenKind::Goto => "'goto'".to_string(),
            TokenKind::If => "'if'".to_string(),
            TokenKind::In => "'in'".to_string(),
            TokenKind::Local => "'local'".to_string(),
            TokenKind::Nil => "'nil'".to_string(),
            TokenKind::Not => "'not'".to_string(),
            TokenKind::Or => "'or'".to_string(),
            TokenKind::Repeat => "'repeat'".to_string(),
            TokenKind::Return => "'return'".to_string(),
            TokenKind::Then => "'then'".to_string(),
            TokenKind::True => "'true'".to_string(),
            TokenKind::Until => "'until'".to_string(),
            TokenKind::While => "'while'".to_string(),
            TokenKind::Plus => "'+'".to_string(),
            TokenKind::Minus => "'-'".to_string(),
            TokenKind::Star => "'*'".to_string(),
            TokenKind::Slash => "'/'".to_string(),
            TokenKind::DoubleSlash => "'//'".to_string(),
            TokenKind::Percent => "'%'".to_string(),
            TokenKind::Caret => "'^'".to_string(),
            TokenKind::Hash => "'#'".to_string(),
            TokenKind::EqEq => "'=='".to_string(),
            TokenKind::NotEq => "'~='".to_string(),
            TokenKind::LessEq => "'<='".to_string(),
            TokenKind::GreaterEq => "'>='".to_string(),
            TokenKind::Less => "'<'".to_string(),
            TokenKind::Greater => "'>'".to_string(),
            TokenKind::Assign => "'='".to_string(),
            TokenKind::LParen => "'('".to_string(),
            TokenKind::RParen => "')'".to_string(),
            TokenKind::LBrace => "'{'".to_string(),
            TokenKind::RBrace => "'}'".to_string(),
            TokenKind::LBracket => "'['".to_string(),
            TokenKind::RBracket => "']'".to_string(),
            TokenKind::Semi => "';'".to_string(),
            TokenKind::Colon => "':'".to_string(),
            TokenKind::Comma => "','".to_string(),
            TokenKind::Dot => "'.'".to_string(),
            TokenKind::Concat => "'..'".to_string(),
            TokenKind::Ellipsis => "'...'".to_string(),
        }
    }
}

fn keyword(name: &str) -> Option<TokenKind> {
    let kind = match name {
        "and" => TokenKind::And,
        "break" => TokenKind::Break,
        "do" => TokenKind::Do,
        "else" => TokenKind::Else,
        "elseif" => TokenKind::ElseIf,
        "end" => TokenKind::End,
        "false" => TokenKind::False,
        "for" => TokenKind::For,
        "function" => TokenKind::Function,
        "goto" => TokenKind::Goto,
        "if" => TokenKind::If,
        "in" => TokenKind::In,
        "local" => TokenKind::Local,
        "nil" => TokenKind::Nil,
        "not" => TokenKind::Not,
        "or" => TokenKind::Or,
        "repeat" => TokenKind::Repeat,
        "return" => TokenKind::Return,
        "then" => TokenKind::Then,
        "true" => TokenKind::True,
        "until" => TokenKind::Until,
        "while" => TokenKind::While,
        _ => return None,
    };
    Some(kind)
}

struct Lexer<'a> {
    chars: std::iter::Peekable<std::str::Chars<'a>>,
    line: usize,
}

impl<'a> Lexer<'a> {
    fn new(source: &'a str) -> Self {
        Lexer {
            chars: source.chars().peekable(),
            line: 1,
        }
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.chars.next();
        if c == Some('\n') {
            self.line += 1;
        }
        c
    }

    fn peek(&mut self) -> Option<char> {
        self.chars.peek().copied()
    }

    fn eat(&mut self, expected: char) -> bool {
        if self.peek() == Some(expected) {
            self.bump();
            true
        } else {
            false
        }
    }

    fn tokenize(mut self) -> Result<Vec<Token>, String> {
        let mut tokens = Vec::new();

        while let Some(c) = self.peek() {
            if c == '\n' || c.is_whitespace() {
                self.bump();
                continue;
            }

            let line = self.line;

            if c == '-' {
                self.bump();
                if self.eat('-') {
                    self.skip_comment()?;
                } else {
                    tokens.push(Token {
                        kind: TokenKind::Minus,
                        line,
                    });
                }
                continue;
            }

            let kind = if c.is_ascii_digit() {
                self.lex_number()?
            } else if c == '_' || c.is_alphabetic() {
                self.lex_name()
            } else if c == '"' || c == '\'' {
                self.lex_string(c)?
            } else {
                self.lex_punct()?
            };

            tokens.push(Token { kind, line });
        }

        Ok(tokens)
    }

    fn skip_comment(&mut self) -> Result<(), String> {
        // Block comment: --[[ ... ]]
        if self.peek() == Some('[') {
            let mut probe = self.chars.clone();
            probe.next();
            if probe.peek() == Some(&'[') {
                self.bump();
                self.bump();
                let start_line = self.line;
                loop {
                    match self.bump() {
                        Some(']') if self.eat(']') => return Ok(()),
                        Some(_) => {}
                        None => {
                            return Err(format!(
                                "line {}: unterminated block comment",
                                start_line
                            ));
                        }
                    }
                }
            }
        }
        // Line comment
        while let Some(c) = self.peek() {
            if c == '\n' {
                break;
            }
            self.bump();
        }
        Ok(())
    }

    fn lex_name(&mut self) -> TokenKind {
        let mut name = String::new();
        while let Some(c) = self.peek() {
            if c == '_' || c.is_alphanumeric() {
                name.push(c);
                self.bump();
            } else {
                break;
            }
        }
        keyword(&name).unwrap_or(TokenKind::Name(name))
    }

    fn lex_number(&mut self) -> Result<TokenKind, String> {
        let line = self.line;
        let mut text = String::new();

        // Hex literal
        if self.peek() == Some('0') {
            let mut probe = self.chars.clone();
            probe.next();
            if matches!(probe.peek(), Some('x') | Some('X')) {
                self.bump();
                self.bump();
                let mut digits = String::new();
                while let Some(c) = self.peek() {
                    if c.is_ascii_hexdigit() {
                        digits.push(c);
                        self.bump();
                    } else {
                        break;
                    }
                }
                if digits.is_empty() {
                    return Err(format!("line {}: malformed hex literal", line));
                }
                let value = u64::from_str_radix(&digits, 16)
                    .map_err(|_| format!("line {}: hex literal out of range", line))?;
                return Ok(TokenKind::Number(value as f64));
            }
        }

        while let Some(c) = self.peek() {
            if c.is_ascii_digit() {
                text.push(c);
                self.bump();
            } else {
                break;
            }
        }
        if self.peek() == Some('.') {
            // Don't consume `..` (concat) after a number.
            let mut probe = self.chars.clone();
            probe.next();
            if probe.peek() != Some(&'.') {
                text.push('.');
                self.bump();
                while let Some(c) = self.peek() {
                    if c.is_ascii_digit() {
                        text.push(c);
                        self.bump();
                    } else {
                        break;
                    }
                }
            }
        }
        if matches!(self.peek(), Some('e') | Some('E')) {
            text.push('e');
            self.bump();
            if matches!(self.peek(), Some('+') | Some('-')) {
                text.push(self.bump().expect("peeked"));
            }
            let mut saw_digit = false;
            while let Some(c) = self.peek() {
                if c.is_ascii_digit() {
                    text.push(c);
                    self.bump();
                    saw_digit = true;
                } else {
                    break;
                }
            }
            if !saw_digit {
                return Err(format!("line {}: malformed number exponent", line));
            }
        }

        text.parse::<f64>()
            .map(TokenKind::Number)
            .map_err(|_| format!("line {}: malformed number '{}'", line, text))
    }

    fn lex_string(&mut self, quote: char) -> Result<TokenKind, String> {
        let line = self.line;
        self.bump();
        let mut value = String::new();
        loop {
            match self.bump() {
                Some(c) if c == quote => return Ok(TokenKind::Str(value)),
                Some('\\') => {
                    let escaped = self.bump().ok_or_else(|| {
                        format!("line {}: unterminated string literal", line)
                    })?;
                    match escaped {
                        'n' => value.push('\n'),
                        't' => value.push('\t'),
                        'r' => value.push('\r'),
                        'a' => value.push('\x07'),
                        '0' => value.push('\0'),
                        '\\' => value.push('\\'),
                        '"' => value.push('"'),
                        '\'' => value.push('\''),
                        '\n' => value.push('\n'),
                        other => {
                            return Err(format!(
                                "line {}: unsupported string escape '\\{}'",
                                line, other
                            ));
                        }
                    }
                }
                Some('\n') => {
                    return Err(format!("line {}: unterminated string literal", line));
                }
                Some(c) => value.push(c),
                None => return Err(format!("line {}: unterminated string literal", line)),
            }
        }
    }

    fn lex_punct(&mut self) -> Result<TokenKind, String> {
        let line = self.line;
        let c = self.bump().expect("caller peeked");
        let kind = match c {
            '+' => TokenKind::Plus,
            '*' => TokenKind::Star,
            '/' => {
                if self.eat('/') {
                    TokenKind::DoubleSlash
                } else {
                    TokenKind::Slash
                }
            }
            '%' => TokenKind::Percent,
            '^' => TokenKind::Caret,
            '#' => TokenKind::Hash,
            '=' => {
                if self.eat('=') {
                    TokenKind::EqEq
                } else {
                    TokenKind::Assign
                }
            }
            '~' => {
                if self.eat('=') {
                    TokenKind::NotEq
                } else {
                    return Err(format!("line {}: unexpected character '~'", line));
                }
            }
            '<' => {
                if self.eat('=') {
                    TokenKind::LessEq
                } else {
                    TokenKind::Less
                }
            }
            '>' => {
                if self.eat('=') {
                    TokenKind::GreaterEq
                } else {
                    TokenKind::Greater
                }
            }
            '(' => TokenKind::LParen,
            ')' => TokenKind::RParen,
            '{' => TokenKind::LBrace,
            '}' => TokenKind::RBrace,
            '[' => TokenKind::LBracket,
            ']' => TokenKind::RBracket,
            ';' => TokenKind::Semi,
            ':' => TokenKind::Colon,
            ',' => TokenKind::Comma,
            '.' => {
                if self.eat('.') {
                    if self.eat('.') {
                        TokenKind::Ellipsis
                    } else {
                        TokenKind::Concat
                    }
                } else {
                    TokenKind::Dot
                }
            }
            other => return Err(format!("line {}: unexpected character '{}'", line, other)),
        };
        Ok(kind)
    }
}

/// Binary operator priorities (left, right). Right-associative operators
/// have a lower right priority, exactly as in the Lua reference parser.
fn binop_priority(kind: &TokenKind) -> Option<(BinOp, u8, u8)> {
    let entry = match kind {
        TokenKind::Or => (BinOp::Or, 1, 1),
        TokenKind::And => (BinOp::And, 2, 2),
        TokenKind::Less => (BinOp::Lt, 3, 3),
        TokenKind::Greater => (BinOp::Gt, 3, 3),
        TokenKind::LessEq => (BinOp::Le, 3, 3),
        TokenKind::GreaterEq => (BinOp::Ge, 3, 3),
        TokenKind::EqEq => (BinOp::Eq, 3, 3),
        TokenKind::NotEq => (BinOp::Ne, 3, 3),
        TokenKind::Concat => (BinOp::Concat, 5, 4),
        TokenKind::Plus => (BinOp::Add, 6, 6),
        TokenKind::Minus => (BinOp::Sub, 6, 6),
        TokenKind::Star => (BinOp::Mul, 7, 7),
        TokenKind::Slash => (BinOp::Div, 7, 7),
        TokenKind::DoubleSlash => (BinOp::FloorDiv, 7, 7),
        TokenKind::Percent => (BinOp::Mod, 7, 7),
        TokenKind::Caret => (BinOp::Pow, 10, 9),
        _ => return None,
    };
    Some(entry)
}

const UNARY_PRIORITY: u8 = 8;

/// Recursive-descent parser over the token stream.
pub struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    pub fn new(source: &str) -> Result<Self, String> {
        let tokens = Lexer::new(source).tokenize()?;
        Ok(Parser { tokens, pos: 0 })
    }

    /// Parse a complete chunk.
    pub fn parse(mut self) -> Result<Chunk, String> {
        let block = self.parse_block()?;
        if let Some(token) = self.tokens.get(self.pos) {
            return Err(format!(
                "line {}: unexpected {} after end of chunk",
                token.line,
                token.kind.describe()
            ));
        }
        Ok(Chunk { block })
    }

    fn peek(&self) -> Option<&TokenKind> {
        self.tokens.get(self.pos).map(|t| &t.kind)
    }

    fn line(&self) -> usize {
        self.tokens
            .get(self.pos)
            .map(|t| t.line)
            .or_else(|| self.tokens.last().map(|t| t.line))
            .unwrap_or(1)
    }

    fn advance(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn check(&self, kind: &TokenKind) -> bool {
        self.peek() == Some(kind)
    }

    fn eat(&mut self, kind: &TokenKind) -> bool {
        if self.check(kind) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, kind: TokenKind) -> Result<(), String> {
        if self.eat(&kind) {
            Ok(())
        } else {
            let found = self
                .peek()
                .map(|k| k.describe())
                .unwrap_or_else(|| "end of input".to_string());
            Err(format!(
                "line {}: expected {}, found {}",
                self.line(),
                kind.describe(),
                found
            ))
        }
    }

    fn expect_name(&mut self) -> Result<String, String> {
        match self.peek() {
            Some(TokenKind::Name(_)) => {
                let Some(Token {
                    kind: TokenKind::Name(name),
                    ..
                }) = self.advance()
                else {
                    unreachable!("peeked a name");
                };
                Ok(name)
            }
            other => {
                let found = other
                    .map(|k| k.describe())
                    .unwrap_or_else(|| "end of input".to_string());
                Err(format!("line {}: expected a name, found {}", self.line(), found))
            }
        }
    }

    fn block_ends(&self) -> bool {
        matches!(
            self.peek(),
            None | Some(TokenKind::End)
                | Some(TokenKind::Else)
                | Some(TokenKind::ElseIf)
                | Some(TokenKind::Until)
        )
    }

    fn parse_block(&mut self) -> Result<Block, String> {
        let mut stmts = Vec::new();
        while !self.block_ends() {
            if self.eat(&TokenKind::Semi) {
                continue;
            }
            let stmt = self.parse_statement()?;
            let is_terminator =
                matches!(stmt, Stmt::Return { .. } | Stmt::Break { .. });
            stmts.push(stmt);
            if is_terminator {
                self.eat(&TokenKind::Semi);
                break;
            }
        }
        Ok(Block::new(stmts))
    }

    fn parse_statement(&mut self) -> Result<Stmt, String> {
        let line = self.line();
        match self.peek() {
            Some(TokenKind::Local) => self.parse_local(),
            Some(TokenKind::Function) => self.parse_function_stmt(),
            Some(TokenKind::If) => self.parse_if(),
            Some(TokenKind::While) => self.parse_while(),
            Some(TokenKind::Repeat) => self.parse_repeat(),
            Some(TokenKind::For) => self.parse_for(),
            Some(TokenKind::Return) => self.parse_return(),
            Some(TokenKind::Break) => {
                self.advance();
                Ok(Stmt::Break { line })
            }
            Some(TokenKind::Do) => {
                self.advance();
                let body = self.parse_block()?;
                self.expect(TokenKind::End)?;
                Ok(Stmt::Do { body, line })
            }
            Some(TokenKind::Goto) => Err(format!(
                "line {}: 'goto' is not supported by the transpiler",
                line
            )),
            Some(_) => self.parse_expr_statement(),
            None => Err("unexpected end of input".to_string()),
        }
    }

    fn parse_local(&mut self) -> Result<Stmt, String> {
        let line = self.line();
        self.advance(); // local

        if self.eat(&TokenKind::Function) {
            let name = self.expect_name()?;
            let body = self.parse_func_body()?;
            return Ok(Stmt::LocalFunction { name, body, line });
        }

        let mut names = vec![self.expect_name()?];
        while self.eat(&TokenKind::Comma) {
            names.push(self.expect_name()?);
        }

        let mut values = Vec::new();
        if self.eat(&TokenKind::Assign) {
            values = self.parse_expr_list()?;
        }

        Ok(Stmt::LocalAssign {
            names,
            values,
            line,
        })
    }

    fn parse_function_stmt(&mut self) -> Result<Stmt, String> {
        let line = self.line();
        self.advance(); // function
        let name = self.expect_name()?;
        if matches!(self.peek(), Some(TokenKind::Dot) | Some(TokenKind::Colon)) {
            return Err(format!(
                "line {}: table-field function definitions are not supported",
                line
            ));
        }
        let body = self.parse_func_body()?;
        Ok(Stmt::Function { name, body, line })
    }

    fn parse_func_body(&mut self) -> Result<FuncBody, String> {
        self.expect(TokenKind::LParen)?;
        let mut params = Vec::new();
        let mut is_vararg = false;
        if !self.check(&TokenKind::RParen) {
            loop {
                if self.eat(&TokenKind::Ellipsis) {
                    is_vararg = true;
                    break;
                }
                params.push(self.expect_name()?);
                if !self.eat(&TokenKind::Comma) {
                    break;
                }
            }
        }
        self.expect(TokenKind::RParen)?;
        let body = self.parse_block()?;
        self.expect(TokenKind::End)?;
        Ok(FuncBody {
            params,
            is_vararg,
            body,
        })
    }

    fn parse_if(&mut self) -> Result<Stmt, String> {
        let line = self.line();
        self.advance(); // if
        let cond = self.parse_expr()?;
        self.expect(TokenKind::Then)?;
        let then_body = self.parse_block()?;

        let mut elseifs = Vec::new();
        while self.eat(&TokenKind::ElseIf) {
            let cond = self.parse_expr()?;
            self.expect(TokenKind::Then)?;
            let body = self.parse_block()?;
            elseifs.push(ElseIf { cond, body });
        }

        let else_body = if self.eat(&TokenKind::Else) {
            Some(self.parse_block()?)
        } else {
            None
        };
        self.expect(TokenKind::End)?;

        Ok(Stmt::If {
            cond,
            then_body,
            elseifs,
            else_body,
            line,
        })
    }

    fn parse_while(&mut self) -> Result<Stmt, String> {
        let line = self.line();
        self.advance(); // while
        let cond = self.parse_expr()?;
        self.expect(TokenKind::Do)?;
        let body = self.parse_block()?;
        self.expect(TokenKind::End)?;
        Ok(Stmt::While { cond, body, line })
    }

    fn parse_repeat(&mut self) -> Result<Stmt, String> {
        let line = self.line();
        self.advance(); // repeat
        let body = self.parse_block()?;
        self.expect(TokenKind::Until)?;
        let until = self.parse_expr()?;
        Ok(Stmt::Repeat { body, until, line })
    }

    fn parse_for(&mut self) -> Result<Stmt, String> {
        let line = self.line();
        self.advance(); // for
        let first = self.expect_name()?;

        if self.eat(&TokenKind::Assign) {
            let start = self.parse_expr()?;
            self.expect(TokenKind::Comma)?;
            let stop = self.parse_expr()?;
            let step = if self.eat(&TokenKind::Comma) {
                Some(self.parse_expr()?)
            } else {
                None
            };
            self.expect(TokenKind::Do)?;
            let body = self.parse_block()?;
            self.expect(TokenKind::End)?;
            return Ok(Stmt::NumericFor {
                var: first,
                start,
                stop,
                step,
                body,
                line,
            });
        }

        let mut names = vec![first];
        while self.eat(&TokenKind::Comma) {
            names.push(self.expect_name()?);
        }
        self.expect(TokenKind::In)?;
        let exprs = self.parse_expr_list()?;
        self.expect(TokenKind::Do)?;
        let body = self.parse_block()?;
        self.expect(TokenKind::End)?;
        Ok(Stmt::GenericFor {
            names,
            exprs,
            body,
            line,
        })
    }

    fn parse_return(&mut self) -> Result<Stmt, String> {
        let line = self.line();
        self.advance(); // return
        let values = if self.block_ends() || self.check(&TokenKind::Semi) {
            Vec::new()
        } else {
            self.parse_expr_list()?
        };
        Ok(Stmt::Return { values, line })
    }

    /// A statement that starts with an expression: either an assignment
    /// or a bare call.
    fn parse_expr_statement(&mut self) -> Result<Stmt, String> {
        let line = self.line();
        let first = self.parse_suffixed_expr()?;

        if self.check(&TokenKind::Assign) || self.check(&TokenKind::Comma) {
            let mut targets = vec![first];
            while self.eat(&TokenKind::Comma) {
                targets.push(self.parse_suffixed_expr()?);
            }
            for target in &targets {
                if !matches!(
                    target,
                    Expr::Name(_) | Expr::Index { .. } | Expr::Field { .. }
                ) {
                    return Err(format!(
                        "line {}: cannot assign to this expression",
                        line
                    ));
                }
            }
            self.expect(TokenKind::Assign)?;
            let values = self.parse_expr_list()?;
            return Ok(Stmt::Assign {
                targets,
                values,
                line,
            });
        }

        match first {
            call @ (Expr::Call { .. } | Expr::MethodCall { .. }) => {
                Ok(Stmt::CallStmt { call, line })
            }
            _ => Err(format!("line {}: expression is not a statement", line)),
        }
    }

    fn parse_expr_list(&mut self) -> Result<Vec<Expr>, String> {
        let mut exprs = vec![self.parse_expr()?];
        while self.eat(&TokenKind::Comma) {
            exprs.push(self.parse_expr()?);
        }
        Ok(exprs)
    }

    fn parse_expr(&mut self) -> Result<Expr, String> {
        self.parse_binary_expr(0)
    }

    /// Precedence-climbing binary expression parser.
    fn parse_binary_expr(&mut self, limit: u8) -> Result<Expr, String> {
        let mut lhs = match self.peek() {
            Some(TokenKind::Not) => {
                self.advance();
                let operand = self.parse_binary_expr(UNARY_PRIORITY)?;
                Expr::Unary {
                    op: UnOp::Not,
                    operand: Box::new(operand),
                }
            }
            Some(TokenKind::Minus) => {
                self.advance();
                let operand = self.parse_binary_expr(UNARY_PRIORITY)?;
                Expr::Unary {
                    op: UnOp::Neg,
                    operand: Box::new(operand),
                }
            }
            Some(TokenKind::Hash) => {
                self.advance();
                let operand = self.parse_binary_expr(UNARY_PRIORITY)?;
                Expr::Unary {
                    op: UnOp::Len,
                    operand: Box::new(operand),
                }
            }
            _ => self.parse_simple_expr()?,
        };

        while let Some((op, left_prio, right_prio)) =
            self.peek().and_then(binop_priority)
        {
            if left_prio <= limit {
                break;
            }
            self.advance();
            let rhs = self.parse_binary_expr(right_prio)?;
            lhs = Expr::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            };
        }

        Ok(lhs)
    }

    fn parse_simple_expr(&mut self) -> Result<Expr, String> {
        match self.peek() {
            Some(TokenKind::Nil) => {
                self.advance();
                Ok(Expr::Nil)
            }
            Some(TokenKind::True) => {
                self.advance();
                Ok(Expr::True)
            }
            Some(TokenKind::False) => {
                self.advance();
                Ok(Expr::False)
            }
            Some(TokenKind::Number(_)) => {
                let Some(Token {
                    kind: TokenKind::Number(n),
                    ..
                }) = self.advance()
                else {
                    unreachable!("peeked a number");
                };
                Ok(Expr::Number(n))
            }
            Some(TokenKind::Str(_)) => {
                let Some(Token {
                    kind: TokenKind::Str(s),
                    ..
                }) = self.advance()
                else {
                    unreachable!("peeked a string");
                };
                Ok(Expr::Str(s))
            }
            Some(TokenKind::Ellipsis) => {
                self.advance();
                Ok(Expr::Varargs)
            }
            Some(TokenKind::Function) => {
                self.advance();
                let body = self.parse_func_body()?;
                Ok(Expr::Function(body))
            }
            Some(TokenKind::LBrace) => self.parse_table(),
            _ => self.parse_suffixed_expr(),
        }
    }

    /// primary expression followed by any number of `.name`, `[expr]`,
    /// `:method(args)`, or call suffixes.
    fn parse_suffixed_expr(&mut self) -> Result<Expr, String> {
        let mut expr = match self.peek() {
            Some(TokenKind::Name(_)) => Expr::Name(self.expect_name()?),
            Some(TokenKind::LParen) => {
                self.advance();
                let inner = self.parse_expr()?;
                self.expect(TokenKind::RParen)?;
                inner
            }
            other => {
                let found = other
                    .map(|k| k.describe())
                    .unwrap_or_else(|| "end of input".to_string());
                return Err(format!(
                    "line {}: unexpected {} in expression",
                    self.line(),
                    found
                ));
            }
        };

        loop {
            let line = self.line();
            match self.peek() {
                Some(TokenKind::Dot) => {
                    self.advance();
                    let field = self.expect_name()?;
                    expr = Expr::Field {
                        value: Box::new(expr),
                        field,
                    };
                }
                Some(TokenKind::LBracket) => {
                    self.advance();
                    let key = self.parse_expr()?;
                    self.expect(TokenKind::RBracket)?;
                    expr = Expr::Index {
                        value: Box::new(expr),
                        key: Box::new(key),
                    };
                }
                Some(TokenKind::Colon) => {
                    self.advance();
                    let method = self.expect_name()?;
                    let args = self.parse_call_args()?;
                    expr = Expr::MethodCall {
                        object: Box::new(expr),
                        method,
                        args,
                        line,
                    };
                }
                Some(TokenKind::LParen) | Some(TokenKind::Str(_)) | Some(TokenKind::LBrace) => {
                    let args = self.parse_call_args()?;
                    expr = Expr::Call {
                        func: Box::new(expr),
                        args,
                        line,
                    };
                }
                _ => break,
            }
        }

        Ok(expr)
    }

    fn parse_call_args(&mut self) -> Result<Vec<Expr>, String> {
        match self.peek() {
            Some(TokenKind::LParen) => {
                self.advance();
                let args = if self.check(&TokenKind::RParen) {
                    Vec::new()
                } else {
                    self.parse_expr_list()?
                };
                self.expect(TokenKind::RParen)?;
                Ok(args)
            }
            // `f "literal"` and `f {table}` sugar
            Some(TokenKind::Str(_)) => {
                let Some(Token {
                    kind: TokenKind::Str(s),
                    ..
                }) = self.advance()
                else {
                    unreachable!("peeked a string");
                };
                Ok(vec![Expr::Str(s)])
            }
            Some(TokenKind::LBrace) => Ok(vec![self.parse_table()?]),
            other => {
                let found = other
                    .map(|k| k.describe())
                    .unwrap_or_else(|| "end of input".to_string());
                Err(format!(
                    "line {}: expected call arguments, found {}",
                    self.line(),
                    found
                ))
            }
        }
    }

    fn parse_table(&mut self) -> Result<Expr, String> {
        self.expect(TokenKind::LBrace)?;
        let mut entries = Vec::new();

        while !self.check(&TokenKind::RBrace) {
            match self.peek() {
                Some(TokenKind::LBracket) => {
                    self.advance();
                    let key = self.parse_expr()?;
                    self.expect(TokenKind::RBracket)?;
                    self.expect(TokenKind::Assign)?;
                    let value = self.parse_expr()?;
                    entries.push(TableEntry::Keyed(key, value));
                }
                Some(TokenKind::Name(_)) => {
                    // `name = value` or a plain expression starting with a name
                    let next = self.tokens.get(self.pos + 1).map(|t| &t.kind);
                    if next == Some(&TokenKind::Assign) {
                        let name = self.expect_name()?;
                        self.advance(); // =
                        let value = self.parse_expr()?;
                        entries.push(TableEntry::Named(name, value));
                    } else {
                        entries.push(TableEntry::Item(self.parse_expr()?));
                    }
                }
                _ => entries.push(TableEntry::Item(self.parse_expr()?)),
            }

            if !self.eat(&TokenKind::Comma) && !self.eat(&TokenKind::Semi) {
                break;
            }
        }

        self.expect(TokenKind::RBrace)?;
        Ok(Expr::Table(entries))
    }
}

/// Parse a Lua source string into a chunk.
pub fn parse(source: &str) -> Result<Chunk, String> {
    Parser::new(source)?.parse()
}
