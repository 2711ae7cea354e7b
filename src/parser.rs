//! Pratt parser: token stream to syntax tree.
//!
//! Each token kind owns up to two handlers — a prefix handler for when the
//! token opens an expression, and an infix handler (with a binding
//! precedence) for when it continues one. [`Parser::parse_precedence`]
//! drives them: run the prefix handler for the next token, then keep
//! folding infix handlers while the upcoming token binds at least as
//! tightly as requested. Assignment is only accepted when the surrounding
//! precedence allows it, which rejects targets like `a + b = c` at parse
//! time.
//!
//! Compound assignment, `++`, and `--` are desugared here: `x += e` parses
//! as `x = x + e`, `obj.f++` as `obj.f = obj.f + 1`. For dot and subscript
//! targets this evaluates the target expression twice, which is observable
//! through side-effecting accessors and accepted as documented behavior.
//!
//! On error the parser enters panic mode, suppresses further reports, and
//! resynchronizes at the next statement boundary.

use crate::ast::{BinaryOp, Expr, ExprKind, FunctionDecl, LogicalOp, Stmt, StmtKind, UnaryOp};
use crate::error::{Error, Result};
use crate::object::{Heap, ObjRef};
use crate::scanner::{Scanner, Token, TokenKind};
use crate::value::Value;

/// Binding strength, weakest first. `PartialOrd` follows declaration
/// order, so `Precedence::Term > Precedence::Or` holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Precedence {
    None,
    Assignment, // =
    Ternary,    // ?:
    Or,         // or, ||
    And,        // and, &&
    Equality,   // == !=
    Comparison, // < > <= >=
    Term,       // + -
    Factor,     // * /
    Unary,      // ! -
    Call,       // . () []
    IncrDecr,   // ++ --
}

impl Precedence {
    /// The next-tighter level, for left-associative infix operators.
    fn tighter(self) -> Precedence {
        match self {
            Precedence::None => Precedence::Assignment,
            Precedence::Assignment => Precedence::Ternary,
            Precedence::Ternary => Precedence::Or,
            Precedence::Or => Precedence::And,
            Precedence::And => Precedence::Equality,
            Precedence::Equality => Precedence::Comparison,
            Precedence::Comparison => Precedence::Term,
            Precedence::Term => Precedence::Factor,
            Precedence::Factor => Precedence::Unary,
            Precedence::Unary => Precedence::Call,
            Precedence::Call => Precedence::IncrDecr,
            Precedence::IncrDecr => Precedence::IncrDecr,
        }
    }
}

/// Infix binding precedence per token kind; `None` for tokens with no
/// infix role.
fn infix_precedence(kind: TokenKind) -> Precedence {
    match kind {
        TokenKind::QuestionMark => Precedence::Ternary,
        TokenKind::Or => Precedence::Or,
        TokenKind::And => Precedence::And,
        TokenKind::EqualEqual | TokenKind::BangEqual => Precedence::Equality,
        TokenKind::Greater | TokenKind::GreaterEqual | TokenKind::Less | TokenKind::LessEqual => {
            Precedence::Comparison
        }
        TokenKind::Plus | TokenKind::Minus => Precedence::Term,
        TokenKind::Star | TokenKind::Slash => Precedence::Factor,
        TokenKind::LeftParen | TokenKind::Dot | TokenKind::LeftBracket => Precedence::Call,
        TokenKind::PlusPlus | TokenKind::MinusMinus => Precedence::IncrDecr,
        _ => Precedence::None,
    }
}

pub struct Parser<'src> {
    scanner: Scanner<'src>,
    heap: &'src mut Heap,
    current: Token<'src>,
    previous: Token<'src>,
    had_error: bool,
    panic_mode: bool,
    errors: Vec<String>,
}

/// Parse `source` into a list of top-level statements. Identifier and
/// string payloads are interned into `heap` as the tree is built. All
/// parse errors are collected; any error fails the whole parse.
pub fn parse(source: &str, heap: &mut Heap) -> Result<Vec<Stmt>> {
    let placeholder = Token {
        kind: TokenKind::Eof,
        text: "",
        line: 1,
    };
    let mut parser = Parser {
        scanner: Scanner::new(source),
        heap,
        current: placeholder,
        previous: placeholder,
        had_error: false,
        panic_mode: false,
        errors: Vec::new(),
    };

    parser.advance();

    let mut statements = Vec::new();
    while !parser.match_token(TokenKind::Eof) {
        statements.push(parser.declaration());
    }

    if parser.had_error {
        Err(Error::Parse(parser.errors.join("\n")))
    } else {
        Ok(statements)
    }
}

impl<'src> Parser<'src> {
    // -----------------------------------------------------------------------
    // Error reporting
    // -----------------------------------------------------------------------

    fn error_at(&mut self, token: Token<'src>, message: &str) {
        if self.panic_mode {
            return;
        }
        self.panic_mode = true;
        self.had_error = true;

        let location = match token.kind {
            TokenKind::Eof => " at end".to_string(),
            TokenKind::Error => String::new(),
            _ => format!(" at '{}'", token.text),
        };
        self.errors
            .push(format!("[line {}] Parse Error{}: {}", token.line, location, message));
    }

    fn error(&mut self, message: &str) {
        self.error_at(self.previous, message);
    }

    fn error_at_current(&mut self, message: &str) {
        self.error_at(self.current, message);
    }

    fn synchronize(&mut self) {
        self.panic_mode = false;

        while self.current.kind != TokenKind::Eof {
            if self.previous.kind == TokenKind::Semicolon {
                return;
            }
            match self.current.kind {
                TokenKind::Class
                | TokenKind::Function
                | TokenKind::Var
                | TokenKind::For
                | TokenKind::If
                | TokenKind::While
                | TokenKind::Return => return,
                _ => {}
            }
            self.advance();
        }
    }

    // -----------------------------------------------------------------------
    // Token plumbing
    // -----------------------------------------------------------------------

    fn advance(&mut self) {
        self.previous = self.current;

        loop {
            self.current = self.scanner.scan_token();
            if self.current.kind != TokenKind::Error {
                break;
            }
            let token = self.current;
            let message = token.text;
            self.error_at(token, message);
        }
    }

    fn consume(&mut self, kind: TokenKind, message: &str) {
        if self.current.kind == kind {
            self.advance();
            return;
        }
        self.error_at_current(message);
    }

    fn check(&self, kind: TokenKind) -> bool {
        self.current.kind == kind
    }

    fn match_token(&mut self, kind: TokenKind) -> bool {
        if !self.check(kind) {
            return false;
        }
        self.advance();
        true
    }

    /// After a consumed `=`, look for the split second half of a compound
    /// assignment operator.
    fn match_compound_op(&mut self) -> Option<BinaryOp> {
        for (kind, op) in [
            (TokenKind::Plus, BinaryOp::Add),
            (TokenKind::SplitMinus, BinaryOp::Subtract),
            (TokenKind::Star, BinaryOp::Multiply),
            (TokenKind::Slash, BinaryOp::Divide),
        ] {
            if self.match_token(kind) {
                return Some(op);
            }
        }
        None
    }

    fn intern_previous(&mut self) -> ObjRef {
        self.heap.intern(self.previous.text)
    }

    fn consume_name(&mut self, message: &str) -> ObjRef {
        self.consume(TokenKind::Identifier, message);
        if self.previous.kind == TokenKind::Identifier {
            self.intern_previous()
        } else {
            // Error recovery: bind a throwaway name.
            self.heap.intern("")
        }
    }

    // -----------------------------------------------------------------------
    // Expressions
    // -----------------------------------------------------------------------

    fn expression(&mut self) -> Expr {
        self.parse_precedence(Precedence::Assignment)
    }

    fn parse_precedence(&mut self, precedence: Precedence) -> Expr {
        self.advance();

        let can_assign = precedence <= Precedence::Assignment;
        let mut expr = match self.prefix(self.previous.kind, can_assign) {
            Some(expr) => expr,
            None => {
                self.error("Expect expression.");
                return Expr::null(self.previous.line);
            }
        };

        while precedence <= infix_precedence(self.current.kind) {
            self.advance();
            expr = self.infix(self.previous.kind, expr, can_assign);
        }

        if can_assign && self.match_token(TokenKind::Equal) {
            self.error("Invalid assignment target.");
        }

        expr
    }

    fn prefix(&mut self, kind: TokenKind, can_assign: bool) -> Option<Expr> {
        let expr = match kind {
            TokenKind::LeftParen => self.grouping(),
            TokenKind::LeftBracket => self.list_literal(),
            TokenKind::Minus | TokenKind::Bang => self.unary(),
            TokenKind::Number => self.number(),
            TokenKind::String => self.string(),
            TokenKind::True => Expr::new(ExprKind::Literal(Value::Bool(true)), self.previous.line),
            TokenKind::False => {
                Expr::new(ExprKind::Literal(Value::Bool(false)), self.previous.line)
            }
            TokenKind::Null => Expr::new(ExprKind::Literal(Value::Null), self.previous.line),
            TokenKind::Identifier => self.variable(can_assign),
            TokenKind::This => self.variable(false),
            TokenKind::Base => self.base(),
            _ => return None,
        };
        Some(expr)
    }

    fn infix(&mut self, kind: TokenKind, left: Expr, can_assign: bool) -> Expr {
        match kind {
            TokenKind::Plus
            | TokenKind::Minus
            | TokenKind::Star
            | TokenKind::Slash
            | TokenKind::EqualEqual
            | TokenKind::BangEqual
            | TokenKind::Greater
            | TokenKind::GreaterEqual
            | TokenKind::Less
            | TokenKind::LessEqual => self.binary(left),
            TokenKind::And | TokenKind::Or => self.logical(left),
            TokenKind::QuestionMark => self.ternary(left),
            TokenKind::LeftParen => self.call(left),
            TokenKind::Dot => self.dot(left, can_assign),
            TokenKind::LeftBracket => self.subscript(left, can_assign),
            TokenKind::PlusPlus => self.incr_decr(left, BinaryOp::Add),
            TokenKind::MinusMinus => self.incr_decr(left, BinaryOp::Subtract),
            _ => unreachable!("no infix rule for {:?}", kind),
        }
    }

    fn grouping(&mut self) -> Expr {
        let expr = self.expression();
        self.consume(TokenKind::RightParen, "Expect ')' after expression.");
        expr
    }

    fn unary(&mut self) -> Expr {
        let line = self.previous.line;
        let op = match self.previous.kind {
            TokenKind::Minus => UnaryOp::Negate,
            _ => UnaryOp::Not,
        };
        let target = self.parse_precedence(Precedence::Unary);
        Expr::new(
            ExprKind::Unary {
                op,
                target: Box::new(target),
            },
            line,
        )
    }

    fn binary(&mut self, left: Expr) -> Expr {
        let line = self.previous.line;
        let op_kind = self.previous.kind;
        let op = match op_kind {
            TokenKind::Plus => BinaryOp::Add,
            TokenKind::Minus => BinaryOp::Subtract,
            TokenKind::Star => BinaryOp::Multiply,
            TokenKind::Slash => BinaryOp::Divide,
            TokenKind::EqualEqual => BinaryOp::Equal,
            TokenKind::BangEqual => BinaryOp::NotEqual,
            TokenKind::Greater => BinaryOp::Greater,
            TokenKind::GreaterEqual => BinaryOp::GreaterEqual,
            TokenKind::Less => BinaryOp::Less,
            _ => BinaryOp::LessEqual,
        };

        // One level tighter on the right keeps these left-associative.
        let right = self.parse_precedence(infix_precedence(op_kind).tighter());
        Expr::new(
            ExprKind::Binary {
                left: Box::new(left),
                op,
                right: Box::new(right),
            },
            line,
        )
    }

    fn logical(&mut self, left: Expr) -> Expr {
        let line = self.previous.line;
        let op_kind = self.previous.kind;
        let op = if op_kind == TokenKind::And {
            LogicalOp::And
        } else {
            LogicalOp::Or
        };
        let right = self.parse_precedence(infix_precedence(op_kind).tighter());
        Expr::new(
            ExprKind::Logical {
                left: Box::new(left),
                op,
                right: Box::new(right),
            },
            line,
        )
    }

    fn ternary(&mut self, condition: Expr) -> Expr {
        let line = self.previous.line;
        let then_branch = self.parse_precedence(Precedence::Ternary);
        self.consume(TokenKind::Colon, "Expect ':' after first ternary branch.");
        // Right-associative: the else branch re-opens at assignment level.
        let else_branch = self.parse_precedence(Precedence::Assignment);
        Expr::new(
            ExprKind::Ternary {
                condition: Box::new(condition),
                then_branch: Box::new(then_branch),
                else_branch: Box::new(else_branch),
            },
            line,
        )
    }

    fn variable(&mut self, can_assign: bool) -> Expr {
        let line = self.previous.line;
        let name = self.intern_previous();

        if can_assign && self.match_token(TokenKind::Equal) {
            let value = match self.match_compound_op() {
                // `x op= e` becomes `x = x op e`.
                Some(op) => Expr::new(
                    ExprKind::Binary {
                        left: Box::new(Expr::new(ExprKind::Variable { name }, line)),
                        op,
                        right: Box::new(self.expression()),
                    },
                    line,
                ),
                None => self.expression(),
            };
            Expr::new(
                ExprKind::Assign {
                    name,
                    value: Box::new(value),
                },
                line,
            )
        } else {
            Expr::new(ExprKind::Variable { name }, line)
        }
    }

    fn base(&mut self) -> Expr {
        let line = self.previous.line;
        self.consume(TokenKind::Dot, "Expect '.' after 'base'.");
        let method = self.consume_name("Expect parent method name after 'base'.");
        Expr::new(ExprKind::Base { method }, line)
    }

    fn number(&mut self) -> Expr {
        let value: f64 = self.previous.text.parse().unwrap_or(0.0);
        Expr::new(
            ExprKind::Literal(Value::Number(value)),
            self.previous.line,
        )
    }

    fn string(&mut self) -> Expr {
        let line = self.previous.line;
        let text = self.previous.text;
        let translated = translate_escapes(&text[1..text.len() - 1]);
        let string = self.heap.intern(&translated);
        Expr::new(ExprKind::Literal(Value::Obj(string)), line)
    }

    fn list_literal(&mut self) -> Expr {
        let line = self.previous.line;
        let mut items = Vec::new();

        if !self.check(TokenKind::RightBracket) {
            loop {
                if self.check(TokenKind::RightBracket) {
                    break; // trailing comma
                }
                if items.len() == 256 {
                    self.error("Cannot have more than 256 items in a list literal.");
                }
                items.push(self.parse_precedence(Precedence::Or));
                if !self.match_token(TokenKind::Comma) {
                    break;
                }
            }
        }

        self.consume(TokenKind::RightBracket, "Expect ']' after list literal.");
        Expr::new(ExprKind::List { items }, line)
    }

    fn argument_list(&mut self) -> Vec<Expr> {
        let mut args = Vec::new();
        if !self.check(TokenKind::RightParen) {
            loop {
                if args.len() == 255 {
                    self.error("Cannot have more than 255 arguments in a call.");
                }
                args.push(self.expression());
                if !self.match_token(TokenKind::Comma) {
                    break;
                }
            }
        }
        self.consume(TokenKind::RightParen, "Expect ')' after arguments.");
        args
    }

    fn call(&mut self, callee: Expr) -> Expr {
        let line = self.previous.line;
        let args = self.argument_list();
        Expr::new(
            ExprKind::Call {
                callee: Box::new(callee),
                args,
            },
            line,
        )
    }

    fn dot(&mut self, instance: Expr, can_assign: bool) -> Expr {
        let line = self.previous.line;
        let field = self.consume_name("Expect property name after '.'.");

        // `can_assign` is checked first so a disallowed `=` is left for
        // the caller to report as an invalid assignment target.
        if can_assign && self.match_token(TokenKind::Equal) {
            let value = match self.match_compound_op() {
                // `obj.f op= e`: read the field, combine, write it back.
                // The instance expression is evaluated twice.
                Some(op) => {
                    let get = Expr::new(
                        ExprKind::Dot {
                            instance: Box::new(instance.clone()),
                            field,
                            value: None,
                            args: None,
                        },
                        line,
                    );
                    Expr::new(
                        ExprKind::Binary {
                            left: Box::new(get),
                            op,
                            right: Box::new(self.expression()),
                        },
                        line,
                    )
                }
                None => self.expression(),
            };
            Expr::new(
                ExprKind::Dot {
                    instance: Box::new(instance),
                    field,
                    value: Some(Box::new(value)),
                    args: None,
                },
                line,
            )
        } else if self.match_token(TokenKind::LeftParen) {
            let args = self.argument_list();
            Expr::new(
                ExprKind::Dot {
                    instance: Box::new(instance),
                    field,
                    value: None,
                    args: Some(args),
                },
                line,
            )
        } else {
            Expr::new(
                ExprKind::Dot {
                    instance: Box::new(instance),
                    field,
                    value: None,
                    args: None,
                },
                line,
            )
        }
    }

    fn subscript(&mut self, target: Expr, can_assign: bool) -> Expr {
        let line = self.previous.line;
        let index = self.expression();
        self.consume(TokenKind::RightBracket, "Expect ']' after subscript index.");

        if can_assign && self.match_token(TokenKind::Equal) {
            let value = match self.match_compound_op() {
                Some(op) => {
                    let get = Expr::new(
                        ExprKind::Subscript {
                            target: Box::new(target.clone()),
                            index: Box::new(index.clone()),
                            value: None,
                        },
                        line,
                    );
                    Expr::new(
                        ExprKind::Binary {
                            left: Box::new(get),
                            op,
                            right: Box::new(self.expression()),
                        },
                        line,
                    )
                }
                None => self.expression(),
            };
            Expr::new(
                ExprKind::Subscript {
                    target: Box::new(target),
                    index: Box::new(index),
                    value: Some(Box::new(value)),
                },
                line,
            )
        } else {
            Expr::new(
                ExprKind::Subscript {
                    target: Box::new(target),
                    index: Box::new(index),
                    value: None,
                },
                line,
            )
        }
    }

    /// Postfix `++`/`--` on a variable or field, desugared to an
    /// assignment of the adjusted value.
    fn incr_decr(&mut self, target: Expr, op: BinaryOp) -> Expr {
        let line = self.previous.line;
        let one = Expr::new(ExprKind::Literal(Value::Number(1.0)), line);

        match &target.kind {
            ExprKind::Variable { name } => {
                let name = *name;
                Expr::new(
                    ExprKind::Assign {
                        name,
                        value: Box::new(Expr::new(
                            ExprKind::Binary {
                                left: Box::new(target),
                                op,
                                right: Box::new(one),
                            },
                            line,
                        )),
                    },
                    line,
                )
            }
            ExprKind::Dot {
                instance,
                field,
                value: None,
                args: None,
            } => {
                let instance = instance.clone();
                let field = *field;
                let adjusted = Expr::new(
                    ExprKind::Binary {
                        left: Box::new(target.clone()),
                        op,
                        right: Box::new(one),
                    },
                    line,
                );
                Expr::new(
                    ExprKind::Dot {
                        instance,
                        field,
                        value: Some(Box::new(adjusted)),
                        args: None,
                    },
                    line,
                )
            }
            _ => {
                self.error("Invalid increment target.");
                Expr::null(line)
            }
        }
    }

    // -----------------------------------------------------------------------
    // Statements
    // -----------------------------------------------------------------------

    fn declaration(&mut self) -> Stmt {
        let stmt = if self.match_token(TokenKind::Var) {
            self.var_declaration()
        } else if self.match_token(TokenKind::Function) {
            let line = self.previous.line;
            let decl = self.function_declaration(false);
            Stmt::new(StmtKind::Function(decl), line)
        } else if self.match_token(TokenKind::Class) {
            self.class_declaration()
        } else {
            self.statement()
        };

        if self.panic_mode {
            self.synchronize();
        }
        stmt
    }

    fn statement(&mut self) -> Stmt {
        if self.match_token(TokenKind::If) {
            self.if_statement()
        } else if self.match_token(TokenKind::While) {
            self.while_statement()
        } else if self.match_token(TokenKind::For) {
            self.for_statement()
        } else if self.match_token(TokenKind::LeftBrace) {
            self.block()
        } else if self.match_token(TokenKind::Break) {
            let line = self.previous.line;
            self.consume(TokenKind::Semicolon, "Expect ';' after 'break'.");
            Stmt::new(StmtKind::Break, line)
        } else if self.match_token(TokenKind::Continue) {
            let line = self.previous.line;
            self.consume(TokenKind::Semicolon, "Expect ';' after 'continue'.");
            Stmt::new(StmtKind::Continue, line)
        } else if self.match_token(TokenKind::Switch) {
            self.switch_statement()
        } else if self.match_token(TokenKind::Return) {
            self.return_statement()
        } else {
            self.expression_statement()
        }
    }

    fn expression_statement(&mut self) -> Stmt {
        let expr = self.expression();
        let line = expr.line;
        self.consume(TokenKind::Semicolon, "Expect ';' after expression.");
        Stmt::new(StmtKind::Expression(expr), line)
    }

    fn block(&mut self) -> Stmt {
        let line = self.previous.line;
        let mut statements = Vec::new();

        while !self.check(TokenKind::RightBrace) && !self.check(TokenKind::Eof) {
            statements.push(self.declaration());
        }

        self.consume(TokenKind::RightBrace, "Expect '}' after block.");
        Stmt::new(StmtKind::Block(statements), line)
    }

    fn if_statement(&mut self) -> Stmt {
        let line = self.previous.line;
        self.consume(TokenKind::LeftParen, "Expect '(' after 'if'.");
        let condition = self.expression();
        self.consume(TokenKind::RightParen, "Expect ')' after condition.");

        let then_branch = Box::new(self.statement());
        let else_branch = if self.match_token(TokenKind::Else) {
            Some(Box::new(self.statement()))
        } else {
            None
        };

        Stmt::new(
            StmtKind::If {
                condition,
                then_branch,
                else_branch,
            },
            line,
        )
    }

    fn while_statement(&mut self) -> Stmt {
        let line = self.previous.line;
        self.consume(TokenKind::LeftParen, "Expect '(' after 'while'.");
        let condition = self.expression();
        self.consume(TokenKind::RightParen, "Expect ')' after condition.");

        let body = Box::new(self.statement());
        Stmt::new(StmtKind::While { condition, body }, line)
    }

    fn for_statement(&mut self) -> Stmt {
        let line = self.previous.line;
        self.consume(TokenKind::LeftParen, "Expect '(' after 'for'.");

        let initializer = if self.match_token(TokenKind::Semicolon) {
            None
        } else if self.match_token(TokenKind::Var) {
            Some(Box::new(self.var_declaration()))
        } else {
            Some(Box::new(self.expression_statement()))
        };

        let condition = if self.match_token(TokenKind::Semicolon) {
            None
        } else {
            let condition = self.expression();
            self.consume(TokenKind::Semicolon, "Expect ';' after loop condition.");
            Some(condition)
        };

        let increment = if self.match_token(TokenKind::RightParen) {
            None
        } else {
            let increment = self.expression();
            self.consume(TokenKind::RightParen, "Expect ')' after for clauses.");
            Some(increment)
        };

        let body = Box::new(self.statement());
        Stmt::new(
            StmtKind::For {
                initializer,
                condition,
                increment,
                body,
            },
            line,
        )
    }

    fn switch_statement(&mut self) -> Stmt {
        let line = self.previous.line;
        self.consume(TokenKind::LeftParen, "Expect '(' after 'switch'.");
        let value = self.expression();
        self.consume(TokenKind::RightParen, "Expect ')' after condition.");
        self.consume(TokenKind::LeftBrace, "Expect '{' after ')'.");

        let mut cases = Vec::new();
        let mut default = None;

        loop {
            if self.match_token(TokenKind::Case) {
                let condition = self.expression();
                self.consume(TokenKind::Colon, "Expect ':' after case expression.");
                cases.push((condition, self.statement()));
            } else if self.match_token(TokenKind::Default) {
                self.consume(TokenKind::Colon, "Expect ':' after 'default'.");
                default = Some(Box::new(self.statement()));
            } else {
                break;
            }
        }

        self.consume(
            TokenKind::RightBrace,
            "Expect '}' at the end of switch statement.",
        );
        Stmt::new(
            StmtKind::Switch {
                value,
                cases,
                default,
            },
            line,
        )
    }

    fn return_statement(&mut self) -> Stmt {
        let line = self.previous.line;
        let value = if self.match_token(TokenKind::Semicolon) {
            None
        } else {
            let value = self.expression();
            self.consume(TokenKind::Semicolon, "Expect ';' after return value.");
            Some(value)
        };
        Stmt::new(StmtKind::Return { value }, line)
    }

    fn var_declaration(&mut self) -> Stmt {
        let line = self.previous.line;
        let name = self.consume_name("Expect variable name after 'var'.");

        let initializer = if self.match_token(TokenKind::Equal) {
            Some(self.expression())
        } else {
            None
        };

        self.consume(
            TokenKind::Semicolon,
            "Expect ';' after variable declaration.",
        );
        Stmt::new(StmtKind::Variable { name, initializer }, line)
    }

    fn function_declaration(&mut self, is_method: bool) -> FunctionDecl {
        let line = self.previous.line;
        let name = self.consume_name(if is_method {
            "Expect method name."
        } else {
            "Expect function name."
        });

        self.consume(
            TokenKind::LeftParen,
            if is_method {
                "Expect '(' after method name."
            } else {
                "Expect '(' after function name."
            },
        );

        let mut params = Vec::new();
        if !self.match_token(TokenKind::RightParen) {
            loop {
                if params.len() == 255 {
                    self.error("Cannot have more than 255 parameters.");
                }
                params.push(self.consume_name("Expect parameter name."));
                if self.match_token(TokenKind::RightParen) {
                    break;
                }
                self.consume(TokenKind::Comma, "Expect ',' after parameter.");
                if self.panic_mode || self.check(TokenKind::Eof) {
                    break;
                }
            }
        }

        self.consume(
            TokenKind::LeftBrace,
            if is_method {
                "Expect '{' at the start of method body."
            } else {
                "Expect '{' at the start of function body."
            },
        );

        let mut body = Vec::new();
        while !self.check(TokenKind::RightBrace) && !self.check(TokenKind::Eof) {
            body.push(self.declaration());
        }
        self.consume(TokenKind::RightBrace, "Expect '}' after body.");

        FunctionDecl {
            name,
            params,
            body,
            line,
        }
    }

    fn class_declaration(&mut self) -> Stmt {
        let line = self.previous.line;
        let name = self.consume_name("Expect class name.");
        let class_name_text = self.previous.text;

        let parent = if self.match_token(TokenKind::Colon) {
            self.consume(TokenKind::Identifier, "Expect parent name.");
            if self.previous.text == class_name_text {
                self.error("A class can't inherit from itself.");
            }
            Some(self.intern_previous())
        } else {
            None
        };

        self.consume(TokenKind::LeftBrace, "Expect '{' before class body.");

        let mut methods = Vec::new();
        while !self.check(TokenKind::RightBrace) && !self.check(TokenKind::Eof) {
            methods.push(self.function_declaration(true));
        }

        self.consume(TokenKind::RightBrace, "Expect '}' after class body.");
        Stmt::new(
            StmtKind::Class {
                name,
                parent,
                methods,
            },
            line,
        )
    }
}

/// Translate backslash escapes inside a string literal's body. Known
/// escapes map to their control characters; an unknown escape yields the
/// escaped character itself.
fn translate_escapes(body: &str) -> String {
    let mut out = String::with_capacity(body.len());
    let mut chars = body.chars();

    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some('t') => out.push('\t'),
            Some('b') => out.push('\x08'),
            Some('f') => out.push('\x0c'),
            Some('v') => out.push('\x0b'),
            Some('"') => out.push('"'),
            Some(other) => out.push(other),
            None => break,
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_ok(source: &str) -> (Heap, Vec<Stmt>) {
        let mut heap = Heap::new();
        let statements = parse(source, &mut heap).expect("parse failed");
        (heap, statements)
    }

    fn parse_err(source: &str) -> String {
        let mut heap = Heap::new();
        match parse(source, &mut heap) {
            Err(Error::Parse(message)) => message,
            other => panic!("expected parse error, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn precedence_shapes_the_tree() {
        let (_, stmts) = parse_ok("1 + 2 * 3;");
        let StmtKind::Expression(expr) = &stmts[0].kind else {
            panic!("expected expression statement");
        };
        let ExprKind::Binary { op, right, .. } = &expr.kind else {
            panic!("expected binary node");
        };
        assert_eq!(*op, BinaryOp::Add);
        assert!(matches!(
            right.kind,
            ExprKind::Binary {
                op: BinaryOp::Multiply,
                ..
            }
        ));
    }

    #[test]
    fn compound_assignment_desugars() {
        let (_, stmts) = parse_ok("x += 2;");
        let StmtKind::Expression(expr) = &stmts[0].kind else {
            panic!("expected expression statement");
        };
        let ExprKind::Assign { value, .. } = &expr.kind else {
            panic!("expected assignment");
        };
        assert!(matches!(
            value.kind,
            ExprKind::Binary {
                op: BinaryOp::Add,
                ..
            }
        ));
    }

    #[test]
    fn minus_equal_is_not_negation() {
        let (_, stmts) = parse_ok("x = -1;");
        let StmtKind::Expression(expr) = &stmts[0].kind else {
            panic!("expected expression statement");
        };
        let ExprKind::Assign { value, .. } = &expr.kind else {
            panic!("expected assignment");
        };
        assert!(matches!(value.kind, ExprKind::Unary { .. }));
    }

    #[test]
    fn postfix_increment_desugars_to_assignment() {
        let (_, stmts) = parse_ok("i++;");
        let StmtKind::Expression(expr) = &stmts[0].kind else {
            panic!("expected expression statement");
        };
        assert!(matches!(expr.kind, ExprKind::Assign { .. }));
    }

    #[test]
    fn invalid_assignment_target_is_rejected() {
        let message = parse_err("a + b = c;");
        assert!(message.contains("Invalid assignment target."));
    }

    #[test]
    fn dot_and_subscript_targets_respect_assignment_precedence() {
        // The dot/subscript handlers must not eat the `=` when the
        // surrounding precedence forbids assignment.
        let message = parse_err("!a.b = 1;");
        assert!(message.contains("Invalid assignment target."));
        let message = parse_err("!a[0] = 1;");
        assert!(message.contains("Invalid assignment target."));
    }

    #[test]
    fn missing_semicolon_reports_line() {
        let message = parse_err("var x = 1\nvar y = 2;");
        assert!(message.contains("[line 2]"));
        assert!(message.contains("Expect ';'"));
    }

    #[test]
    fn recovery_reports_later_errors_too() {
        let message = parse_err("var = 1;\nvar y 2;\n");
        assert!(message.lines().count() >= 2);
    }

    #[test]
    fn class_cannot_inherit_from_itself() {
        let message = parse_err("class A : A {}");
        assert!(message.contains("can't inherit from itself"));
    }

    #[test]
    fn parameter_limit_is_255() {
        let mut many = String::from("function f(");
        for i in 0..256 {
            if i > 0 {
                many.push(',');
            }
            many.push_str(&format!("p{}", i));
        }
        many.push_str(") {}");
        let message = parse_err(&many);
        assert!(message.contains("more than 255 parameters"));

        let mut ok = String::from("function f(");
        for i in 0..255 {
            if i > 0 {
                ok.push(',');
            }
            ok.push_str(&format!("p{}", i));
        }
        ok.push_str(") {}");
        parse_ok(&ok);
    }

    #[test]
    fn list_literal_accepts_trailing_comma() {
        let (_, stmts) = parse_ok("var xs = [1, 2, 3,];");
        let StmtKind::Variable {
            initializer: Some(init),
            ..
        } = &stmts[0].kind
        else {
            panic!("expected var with initializer");
        };
        let ExprKind::List { items } = &init.kind else {
            panic!("expected list literal");
        };
        assert_eq!(items.len(), 3);
    }

    #[test]
    fn escape_translation() {
        assert_eq!(translate_escapes(r"a\nb"), "a\nb");
        assert_eq!(translate_escapes(r#"say \"hi\""#), "say \"hi\"");
        assert_eq!(translate_escapes(r"odd \q"), "odd q");
    }

    #[test]
    fn switch_parses_cases_and_default() {
        let (_, stmts) = parse_ok(
            "switch (x) { case 1: print(1); case 2: { print(2); } default: print(0); }",
        );
        let StmtKind::Switch { cases, default, .. } = &stmts[0].kind else {
            panic!("expected switch");
        };
        assert_eq!(cases.len(), 2);
        assert!(default.is_some());
    }
}
