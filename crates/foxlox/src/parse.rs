//! The recursive-descent parser.
//!
//! Errors panic-and-synchronize to the next statement boundary so later
//! errors still get reported; no AST is handed to the resolver once any
//! error was recorded.

use smallvec::SmallVec;

use crate::ast::{AssignTarget, ClassDecl, DeclId, Expr, FunctionDecl, Stmt};
use crate::error::Diagnostics;
use crate::scanner::{Token, TokenType};
use crate::value::CompiletimeValue;

/// Marker for panic-mode unwinding up to the statement level.
struct ParseAbort;

type PResult<T> = Result<T, ParseAbort>;

/// Parses the token stream into a list of statements. The returned
/// diagnostics decide whether compilation proceeds.
pub(crate) fn parse(tokens: Vec<Token>) -> (Vec<Stmt>, Diagnostics) {
    let mut parser = Parser {
        tokens,
        current: 0,
        diags: Diagnostics::new(),
        next_decl: 0,
    };
    let mut ast = Vec::new();
    while !parser.is_at_end() {
        if let Some(stmt) = parser.declaration() {
            ast.push(stmt);
        }
    }
    (ast, parser.diags)
}

struct Parser {
    tokens: Vec<Token>,
    current: usize,
    diags: Diagnostics,
    next_decl: DeclId,
}

impl Parser {
    fn fresh_decl(&mut self) -> DeclId {
        let id = self.next_decl;
        self.next_decl += 1;
        id
    }

    // === token plumbing ===

    fn peek(&self) -> &Token {
        &self.tokens[self.current]
    }

    fn previous(&self) -> &Token {
        &self.tokens[self.current - 1]
    }

    fn is_at_end(&self) -> bool {
        self.peek().ttype == TokenType::Eof
    }

    fn check(&self, ttype: TokenType) -> bool {
        !self.is_at_end() && self.peek().ttype == ttype
    }

    /// Consumes the next token. Scanner error tokens are reported here and
    /// skipped so the grammar never sees them.
    fn advance(&mut self) -> Token {
        loop {
            if self.is_at_end() {
                return self.peek().clone();
            }
            self.current += 1;
            let tk = self.previous().clone();
            if tk.ttype == TokenType::Error {
                let msg = tk.lexeme.clone();
                self.diags.error(&tk, &msg);
            } else {
                return tk;
            }
        }
    }

    fn match_one(&mut self, ttype: TokenType) -> bool {
        if self.check(ttype) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn match_any(&mut self, types: &[TokenType]) -> bool {
        if types.iter().any(|t| self.check(*t)) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn consume(&mut self, ttype: TokenType, message: &str) -> PResult<Token> {
        if self.check(ttype) {
            Ok(self.advance())
        } else {
            let tk = self.peek().clone();
            self.error(&tk, message);
            Err(ParseAbort)
        }
    }

    fn error(&mut self, token: &Token, message: &str) {
        self.diags.error(token, message);
    }

    fn synchronize(&mut self) {
        self.advance();
        while !self.is_at_end() {
            if self.previous().ttype == TokenType::Semicolon {
                return;
            }
            match self.peek().ttype {
                TokenType::Class
                | TokenType::Fun
                | TokenType::Var
                | TokenType::For
                | TokenType::If
                | TokenType::While
                | TokenType::Return => return,
                _ => {}
            }
            self.advance();
        }
    }

    // === declarations ===

    fn declaration(&mut self) -> Option<Stmt> {
        let result = if self.match_one(TokenType::Class) {
            self.class_declaration()
        } else if self.match_one(TokenType::Fun) {
            self.function("function").map(Stmt::Function)
        } else if self.match_one(TokenType::Var) {
            self.var_declaration()
        } else if self.match_one(TokenType::Import) {
            self.import_statement()
        } else if self.match_one(TokenType::From) {
            self.from_statement()
        } else if self.match_one(TokenType::Export) {
            self.export_statement()
        } else {
            self.statement()
        };
        match result {
            Ok(stmt) => Some(stmt),
            Err(ParseAbort) => {
                self.synchronize();
                None
            }
        }
    }

    fn class_declaration(&mut self) -> PResult<Stmt> {
        let id = self.fresh_decl();
        let name = self.consume(TokenType::Identifier, "Expect class name.")?;
        let superclass = if self.match_one(TokenType::Colon) {
            Some(self.expression()?)
        } else {
            None
        };
        self.consume(TokenType::LeftBrace, "Expect `{' before class body.")?;
        let mut methods = Vec::new();
        while !self.check(TokenType::RightBrace) && !self.is_at_end() {
            methods.push(self.function("method")?);
        }
        self.consume(TokenType::RightBrace, "Expect `}' after class body.")?;
        Ok(Stmt::Class(ClassDecl { id, name, superclass, methods }))
    }

    fn function(&mut self, kind: &str) -> PResult<FunctionDecl> {
        let id = self.fresh_decl();
        let name = self.consume(TokenType::Identifier, &format!("Expect {kind} name."))?;
        self.consume(TokenType::LeftParen, &format!("Expect `(' after {kind} name."))?;
        let mut params = Vec::new();
        if !self.check(TokenType::RightParen) {
            loop {
                if params.len() == 255 {
                    let tk = self.peek().clone();
                    self.error(&tk, "Can't have more than 255 parameters.");
                }
                params.push(self.consume(TokenType::Identifier, "Expect parameter name.")?);
                if !self.match_one(TokenType::Comma) {
                    break;
                }
            }
        }
        self.consume(TokenType::RightParen, "Expect `)' after parameters.")?;
        self.consume(TokenType::LeftBrace, &format!("Expect `{{' before {kind} body."))?;
        let mut body = self.block()?;
        if !matches!(body.last(), Some(Stmt::Return { .. })) {
            // there's no return at the end; add one
            body.push(Stmt::Return {
                keyword: Token::new(TokenType::Return, "", name.line),
                value: None,
            });
        }
        Ok(FunctionDecl { id, name, params, body })
    }

    fn var_declaration(&mut self) -> PResult<Stmt> {
        let id = self.fresh_decl();
        let mut names = Vec::new();
        let mut initializers = Vec::new();
        loop {
            names.push(self.consume(TokenType::Identifier, "Expect variable name.")?);
            let init = if self.match_one(TokenType::Equal) {
                Some(self.expression()?)
            } else {
                None
            };
            initializers.push(init);
            if !self.match_one(TokenType::Comma) {
                break;
            }
        }
        self.consume(TokenType::Semicolon, "Expect `;' after variable declaration.")?;
        Ok(Stmt::Var { id, names, initializers })
    }

    fn import_path(&mut self) -> PResult<SmallVec<[Token; 4]>> {
        let mut path = SmallVec::new();
        loop {
            path.push(self.consume(TokenType::Identifier, "Expect library name.")?);
            if !self.match_one(TokenType::Dot) {
                break;
            }
        }
        Ok(path)
    }

    fn import_statement(&mut self) -> PResult<Stmt> {
        let id = self.fresh_decl();
        let path = self.import_path()?;
        let name = if self.match_one(TokenType::As) {
            self.consume(TokenType::Identifier, "Expect name after `as'.")?
        } else {
            path.last().expect("path has at least one component").clone()
        };
        self.consume(TokenType::Semicolon, "Expect `;' after import statement.")?;
        Ok(Stmt::Import { id, name, path })
    }

    fn from_statement(&mut self) -> PResult<Stmt> {
        let id = self.fresh_decl();
        let path = self.import_path()?;
        self.consume(TokenType::Import, "Expect `import' after library name.")?;
        let mut names = Vec::new();
        loop {
            let source = self.consume(TokenType::Identifier, "Expect name to import.")?;
            let bound = if self.match_one(TokenType::As) {
                self.consume(TokenType::Identifier, "Expect name after `as'.")?
            } else {
                source.clone()
            };
            names.push((source, bound));
            if !self.match_one(TokenType::Comma) {
                break;
            }
        }
        self.consume(TokenType::Semicolon, "Expect `;' after import statement.")?;
        Ok(Stmt::From { id, path, names })
    }

    fn export_statement(&mut self) -> PResult<Stmt> {
        let keyword = self.previous().clone();
        let declaration = if self.match_one(TokenType::Var) {
            self.var_declaration()?
        } else if self.match_one(TokenType::Fun) {
            Stmt::Function(self.function("function")?)
        } else if self.match_one(TokenType::Class) {
            self.class_declaration()?
        } else {
            let tk = self.peek().clone();
            self.error(&tk, "Expect declaration after `export'.");
            return Err(ParseAbort);
        };
        Ok(Stmt::Export { keyword, declaration: Box::new(declaration) })
    }

    // === statements ===

    fn statement(&mut self) -> PResult<Stmt> {
        if self.match_one(TokenType::For) {
            return self.for_statement();
        }
        if self.match_one(TokenType::If) {
            return self.if_statement();
        }
        if self.match_one(TokenType::Return) {
            return self.return_statement();
        }
        if self.match_one(TokenType::Break) {
            let keyword = self.previous().clone();
            self.consume(TokenType::Semicolon, "Expect `;' after `break'.")?;
            return Ok(Stmt::Break { keyword });
        }
        if self.match_one(TokenType::Continue) {
            let keyword = self.previous().clone();
            self.consume(TokenType::Semicolon, "Expect `;' after `continue'.")?;
            return Ok(Stmt::Continue { keyword });
        }
        if self.match_one(TokenType::While) {
            return self.while_statement();
        }
        if self.match_one(TokenType::LeftBrace) {
            return Ok(Stmt::Block { statements: self.block()? });
        }
        self.expression_statement()
    }

    fn block(&mut self) -> PResult<Vec<Stmt>> {
        let mut statements = Vec::new();
        while !self.check(TokenType::RightBrace) && !self.is_at_end() {
            if let Some(stmt) = self.declaration() {
                statements.push(stmt);
            }
        }
        self.consume(TokenType::RightBrace, "Expect `}' after block.")?;
        Ok(statements)
    }

    fn return_statement(&mut self) -> PResult<Stmt> {
        let keyword = self.previous().clone();
        let value = if self.check(TokenType::Semicolon) {
            None
        } else {
            Some(self.expression()?)
        };
        self.consume(TokenType::Semicolon, "Expect `;' after return value.")?;
        Ok(Stmt::Return { keyword, value })
    }

    fn for_statement(&mut self) -> PResult<Stmt> {
        self.consume(TokenType::LeftParen, "Expect `(' after `for'.")?;
        let initializer = if self.match_one(TokenType::Semicolon) {
            None
        } else if self.match_one(TokenType::Var) {
            Some(Box::new(self.var_declaration()?))
        } else {
            Some(Box::new(self.expression_statement()?))
        };
        let condition = if self.check(TokenType::Semicolon) {
            None
        } else {
            Some(self.expression()?)
        };
        self.consume(TokenType::Semicolon, "Expect `;' after loop condition.")?;
        let increment = if self.check(TokenType::RightParen) {
            None
        } else {
            Some(self.expression()?)
        };
        let right_paren = self.consume(TokenType::RightParen, "Expect `)' after for clauses.")?;
        let body = Box::new(self.statement()?);
        Ok(Stmt::For { initializer, condition, increment, body, right_paren })
    }

    fn while_statement(&mut self) -> PResult<Stmt> {
        self.consume(TokenType::LeftParen, "Expect `(' after `while'.")?;
        let condition = self.expression()?;
        let right_paren = self.consume(TokenType::RightParen, "Expect `)' after condition.")?;
        let body = Box::new(self.statement()?);
        Ok(Stmt::While { condition, body, right_paren })
    }

    fn if_statement(&mut self) -> PResult<Stmt> {
        self.consume(TokenType::LeftParen, "Expect `(' after `if'.")?;
        let condition = self.expression()?;
        let right_paren = self.consume(TokenType::RightParen, "Expect `)' after if condition.")?;
        let then_branch = Box::new(self.statement()?);
        let else_branch = if self.match_one(TokenType::Else) {
            Some(Box::new(self.statement()?))
        } else {
            None
        };
        Ok(Stmt::If { condition, then_branch, else_branch, right_paren })
    }

    fn expression_statement(&mut self) -> PResult<Stmt> {
        let expr = self.expression()?;
        self.consume(TokenType::Semicolon, "Expect `;' after expression.")?;
        Ok(Stmt::Expression { expr })
    }

    // === expressions, lowest to highest precedence ===

    fn expression(&mut self) -> PResult<Expr> {
        self.assignment()
    }

    fn assignment(&mut self) -> PResult<Expr> {
        let expr = self.or_expr()?;
        if self.match_any(&[
            TokenType::Equal,
            TokenType::PlusEqual,
            TokenType::MinusEqual,
            TokenType::StarEqual,
            TokenType::SlashEqual,
            TokenType::SlashSlashEqual,
        ]) {
            let equals = self.previous().clone();
            let mut value = self.assignment()?;
            if equals.ttype != TokenType::Equal {
                // desugar `target op= value` into `target = target op value`,
                // re-using a clone of the target expression
                let op_type = match equals.ttype {
                    TokenType::PlusEqual => TokenType::Plus,
                    TokenType::MinusEqual => TokenType::Minus,
                    TokenType::StarEqual => TokenType::Star,
                    TokenType::SlashEqual => TokenType::Slash,
                    _ => TokenType::SlashSlash,
                };
                let op = Token::new(op_type, equals.lexeme.clone(), equals.line);
                value = Expr::Binary {
                    left: Box::new(expr.clone()),
                    op,
                    right: Box::new(value),
                };
            }
            if is_valid_target(&expr) {
                let target = to_assign_target(expr);
                return Ok(Expr::Assign { target, value: Box::new(value) });
            }
            self.error(&equals, "Invalid assignment target.");
            return Ok(value);
        }
        Ok(expr)
    }

    fn or_expr(&mut self) -> PResult<Expr> {
        let mut expr = self.and_expr()?;
        while self.match_one(TokenType::Or) {
            let op = self.previous().clone();
            let right = self.and_expr()?;
            expr = Expr::Logical { left: Box::new(expr), op, right: Box::new(right) };
        }
        Ok(expr)
    }

    fn and_expr(&mut self) -> PResult<Expr> {
        let mut expr = self.equality()?;
        while self.match_one(TokenType::And) {
            let op = self.previous().clone();
            let right = self.equality()?;
            expr = Expr::Logical { left: Box::new(expr), op, right: Box::new(right) };
        }
        Ok(expr)
    }

    fn equality(&mut self) -> PResult<Expr> {
        let mut expr = self.comparison()?;
        while self.match_any(&[TokenType::BangEqual, TokenType::EqualEqual]) {
            let op = self.previous().clone();
            let right = self.comparison()?;
            expr = Expr::Binary { left: Box::new(expr), op, right: Box::new(right) };
        }
        Ok(expr)
    }

    fn comparison(&mut self) -> PResult<Expr> {
        let mut expr = self.term()?;
        while self.match_any(&[
            TokenType::Greater,
            TokenType::GreaterEqual,
            TokenType::Less,
            TokenType::LessEqual,
        ]) {
            let op = self.previous().clone();
            let right = self.term()?;
            expr = Expr::Binary { left: Box::new(expr), op, right: Box::new(right) };
        }
        Ok(expr)
    }

    fn term(&mut self) -> PResult<Expr> {
        let mut expr = self.factor()?;
        while self.match_any(&[TokenType::Minus, TokenType::Plus]) {
            let op = self.previous().clone();
            let right = self.factor()?;
            expr = Expr::Binary { left: Box::new(expr), op, right: Box::new(right) };
        }
        Ok(expr)
    }

    fn factor(&mut self) -> PResult<Expr> {
        let mut expr = self.unary()?;
        while self.match_any(&[TokenType::Slash, TokenType::Star, TokenType::SlashSlash]) {
            let op = self.previous().clone();
            let right = self.unary()?;
            expr = Expr::Binary { left: Box::new(expr), op, right: Box::new(right) };
        }
        Ok(expr)
    }

    fn unary(&mut self) -> PResult<Expr> {
        if self.match_any(&[TokenType::Bang, TokenType::Minus]) {
            let op = self.previous().clone();
            let operand = self.unary()?;
            return Ok(Expr::Unary { op, operand: Box::new(operand) });
        }
        if self.match_any(&[TokenType::PlusPlus, TokenType::MinusMinus]) {
            let op = self.previous().clone();
            let operand = self.unary()?;
            // desugar `++x` into `x = x + 1`
            let is_target = matches!(&operand, Expr::Variable { .. } | Expr::Get { .. });
            if is_target {
                let target = to_assign_target(operand.clone());
                let bin_type = if op.ttype == TokenType::PlusPlus {
                    TokenType::Plus
                } else {
                    TokenType::Minus
                };
                let one = Expr::Literal {
                    value: CompiletimeValue::Int(1),
                    token: op.clone(),
                };
                let bin = Expr::Binary {
                    left: Box::new(operand),
                    op: Token::new(bin_type, op.lexeme.clone(), op.line),
                    right: Box::new(one),
                };
                return Ok(Expr::Assign { target, value: Box::new(bin) });
            }
            self.error(&op, "Operand of `++' and `--' must be a variable or a property.");
            return Ok(operand);
        }
        self.call()
    }

    fn call(&mut self) -> PResult<Expr> {
        let mut expr = self.primary()?;
        loop {
            if self.match_one(TokenType::LeftParen) {
                expr = self.finish_call(expr)?;
            } else if self.match_one(TokenType::Dot) {
                let name = self.consume(TokenType::Identifier, "Expect property name after `.'.")?;
                expr = Expr::Get { object: Box::new(expr), name };
            } else {
                break;
            }
        }
        Ok(expr)
    }

    fn finish_call(&mut self, callee: Expr) -> PResult<Expr> {
        let mut arguments = Vec::new();
        if !self.check(TokenType::RightParen) {
            loop {
                if arguments.len() == 255 {
                    let tk = self.peek().clone();
                    self.error(&tk, "Can't have more than 255 arguments.");
                }
                arguments.push(self.expression()?);
                if !self.match_one(TokenType::Comma) {
                    break;
                }
            }
        }
        let paren = self.consume(TokenType::RightParen, "Expect `)' after arguments.")?;
        Ok(Expr::Call { callee: Box::new(callee), paren, arguments })
    }

    fn primary(&mut self) -> PResult<Expr> {
        if self.match_one(TokenType::False) {
            return Ok(Expr::Literal {
                value: CompiletimeValue::Bool(false),
                token: self.previous().clone(),
            });
        }
        if self.match_one(TokenType::True) {
            return Ok(Expr::Literal {
                value: CompiletimeValue::Bool(true),
                token: self.previous().clone(),
            });
        }
        if self.match_one(TokenType::Nil) {
            return Ok(Expr::Literal {
                value: CompiletimeValue::Nil,
                token: self.previous().clone(),
            });
        }
        if self.match_any(&[TokenType::Int, TokenType::Double, TokenType::Str]) {
            let token = self.previous().clone();
            let value = token.literal.clone().expect("literal token without payload");
            return Ok(Expr::Literal { value, token });
        }
        if self.match_one(TokenType::LeftParen) {
            if self.match_one(TokenType::RightParen) {
                // empty tuple
                return Ok(Expr::Tuple { elements: Vec::new() });
            }
            let expr = self.expression()?;
            if self.check(TokenType::Comma) {
                return self.tuple(expr);
            }
            self.consume(TokenType::RightParen, "Expect `)' after expression.")?;
            return Ok(Expr::Grouping { inner: Box::new(expr) });
        }
        if self.match_one(TokenType::This) {
            return Ok(Expr::This { keyword: self.previous().clone(), declare: None });
        }
        if self.match_one(TokenType::Super) {
            let keyword = self.previous().clone();
            self.consume(TokenType::Dot, "Expect `.' after `super'.")?;
            let method = self.consume(TokenType::Identifier, "Expect superclass method name.")?;
            return Ok(Expr::Super { keyword, method, declare: None });
        }
        if self.match_one(TokenType::Identifier) {
            return Ok(Expr::Variable { name: self.previous().clone(), declare: None });
        }
        let tk = self.peek().clone();
        self.error(&tk, "Expect expression.");
        Err(ParseAbort)
    }

    fn tuple(&mut self, first: Expr) -> PResult<Expr> {
        let mut elements = vec![first];
        while !self.match_one(TokenType::RightParen) {
            self.consume(TokenType::Comma, "Expect `,' after expression.")?;
            if self.match_one(TokenType::RightParen) {
                break;
            }
            elements.push(self.expression()?);
        }
        Ok(Expr::Tuple { elements })
    }
}

/// Only variables, property accesses, tuples of legal targets, and the
/// placeholder `_` may be assigned to.
fn is_valid_target(expr: &Expr) -> bool {
    match expr {
        Expr::Variable { .. } | Expr::Get { .. } => true,
        Expr::Tuple { elements } => !elements.is_empty() && elements.iter().all(is_valid_target),
        _ => false,
    }
}

/// Converts a checked l-value expression into an assignment target.
/// Callers must have verified [`is_valid_target`] first.
fn to_assign_target(expr: Expr) -> AssignTarget {
    match expr {
        Expr::Variable { name, declare } => {
            if name.lexeme == "_" {
                AssignTarget::Placeholder { token: name }
            } else {
                AssignTarget::Variable { name, declare }
            }
        }
        Expr::Get { object, name } => AssignTarget::Property { object, name },
        Expr::Tuple { elements } => AssignTarget::Tuple {
            elements: elements.into_iter().map(to_assign_target).collect(),
        },
        _ => unreachable!("is_valid_target admitted a non-lvalue"),
    }
}
