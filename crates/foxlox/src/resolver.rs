//! The resolver: binds every name use to its declaration site, decides
//! which declarations must live in the static pool (closure capture,
//! exports), and enforces the language's context rules.

use ahash::AHashMap;

use crate::ast::{AssignTarget, ClassDecl, Expr, FunctionDecl, Stmt, VarDeclareAt, VarStoreType};
use crate::error::Diagnostics;
use crate::scanner::{Token, TokenType};

/// Output of the resolver: storage class per declaration site. Declarations
/// not present are stack-stored.
#[derive(Debug, Default)]
pub(crate) struct Resolution {
    store_types: AHashMap<VarDeclareAt, VarStoreType>,
}

impl Resolution {
    pub(crate) fn store_type(&self, at: VarDeclareAt) -> VarStoreType {
        self.store_types.get(&at).copied().unwrap_or_default()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FunctionType {
    None,
    Function,
    Method,
    Initializer,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ClassType {
    None,
    Class,
    Subclass,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LoopType {
    None,
    While,
    For,
}

#[derive(Debug, Clone, Copy)]
struct ValueInfo {
    ready: bool,
    declare: VarDeclareAt,
}

#[derive(Debug)]
struct Scope {
    /// Number of enclosing function bodies, the global scope counting as one.
    function_level: u32,
    vars: AHashMap<String, ValueInfo>,
}

/// Resolves the AST in place (filling `declare` references) and returns the
/// storage-class table.
pub(crate) fn resolve(ast: &mut [Stmt]) -> (Resolution, Diagnostics) {
    let mut resolver = Resolver {
        scopes: Vec::new(),
        resolution: Resolution::default(),
        diags: Diagnostics::new(),
        current_function: FunctionType::None,
        current_class: ClassType::None,
        current_loop: LoopType::None,
    };
    // global is also a scope
    resolver.begin_scope(true);
    resolver.resolve_stmts(ast);
    resolver.end_scope();
    (resolver.resolution, resolver.diags)
}

struct Resolver {
    scopes: Vec<Scope>,
    resolution: Resolution,
    diags: Diagnostics,
    current_function: FunctionType,
    current_class: ClassType,
    current_loop: LoopType,
}

impl Resolver {
    fn error(&mut self, token: &Token, message: &str) {
        self.diags.error(token, message);
    }

    fn begin_scope(&mut self, is_new_function: bool) {
        let last_level = self.scopes.last().map_or(0, |s| s.function_level);
        self.scopes.push(Scope {
            function_level: if is_new_function { last_level + 1 } else { last_level },
            vars: AHashMap::new(),
        });
    }

    fn end_scope(&mut self) {
        self.scopes.pop();
    }

    /// Declares `name` in the innermost scope, not yet ready. The
    /// placeholder `_` may be declared any number of times and is never
    /// readable, so it gets no scope entry.
    fn declare(&mut self, name: &Token, at: VarDeclareAt) {
        if name.lexeme == "_" {
            return;
        }
        let taken = self
            .scopes
            .last()
            .expect("no scope to declare in")
            .vars
            .contains_key(&name.lexeme);
        if taken {
            self.error(name, "Redefine variable with the same name in this scope.");
            return;
        }
        self.scopes
            .last_mut()
            .expect("no scope to declare in")
            .vars
            .insert(name.lexeme.clone(), ValueInfo { ready: false, declare: at });
    }

    fn define(&mut self, name: &Token) {
        if name.lexeme == "_" {
            return;
        }
        if let Some(info) = self
            .scopes
            .last_mut()
            .expect("no scope to define in")
            .vars
            .get_mut(&name.lexeme)
        {
            info.ready = true;
        }
    }

    /// Finds the declaration `name` binds to, walking scopes innermost-out.
    /// A use from a deeper function level escalates the declaration to
    /// static storage (closure capture without boxed locals).
    fn resolve_local(&mut self, name: &Token) -> Option<VarDeclareAt> {
        if name.lexeme == "_" {
            self.error(name, "Can't read the placeholder variable `_'.");
            return None;
        }
        let current_level = self.scopes.last().expect("no scope").function_level;
        for i in (0..self.scopes.len()).rev() {
            let Some(info) = self.scopes[i].vars.get(&name.lexeme).copied() else {
                continue;
            };
            if !info.ready {
                self.error(name, "Can't read local variable in its own initializer.");
                return None;
            }
            let scope_level = self.scopes[i].function_level;
            if current_level != scope_level {
                // access from inside a nested function: move the value from
                // the stack to the static pool
                if let VarDeclareAt::ClassThis { .. } = info.declare {
                    if current_level - scope_level >= 2 {
                        self.error(name, "Capturing `this' in non-method function is not allowed.");
                        return None;
                    }
                } else {
                    self.resolution.store_types.insert(info.declare, VarStoreType::Static);
                }
            }
            return Some(info.declare);
        }
        self.error(name, &format!("Can't find variable with name: `{}'.", name.lexeme));
        None
    }

    fn resolve_stmts(&mut self, stmts: &mut [Stmt]) {
        for stmt in stmts {
            self.resolve_stmt(stmt);
        }
    }

    fn resolve_stmt(&mut self, stmt: &mut Stmt) {
        match stmt {
            Stmt::Expression { expr } => self.resolve_expr(expr),
            Stmt::Var { id, names, initializers } => {
                let id = *id;
                for (index, (name, init)) in names.iter().zip(initializers.iter_mut()).enumerate() {
                    let name = name.clone();
                    self.declare(&name, VarDeclareAt::Var { stmt: id, index });
                    if let Some(init) = init {
                        self.resolve_expr(init);
                    }
                    self.define(&name);
                }
            }
            Stmt::Block { statements } => {
                self.begin_scope(false);
                self.resolve_stmts(statements);
                self.end_scope();
            }
            Stmt::If { condition, then_branch, else_branch, .. } => {
                self.resolve_expr(condition);
                self.check_conditioned_declaration(then_branch);
                self.resolve_stmt(then_branch);
                if let Some(else_branch) = else_branch {
                    self.check_conditioned_declaration(else_branch);
                    self.resolve_stmt(else_branch);
                }
            }
            Stmt::While { condition, body, .. } => {
                self.resolve_expr(condition);
                let enclosing = self.current_loop;
                self.current_loop = LoopType::While;
                self.check_conditioned_declaration(body);
                self.resolve_stmt(body);
                self.current_loop = enclosing;
            }
            Stmt::For { initializer, condition, increment, body, .. } => {
                self.begin_scope(false);
                if let Some(init) = initializer {
                    self.resolve_stmt(init);
                }
                if let Some(cond) = condition {
                    self.resolve_expr(cond);
                }
                if let Some(incr) = increment {
                    self.resolve_expr(incr);
                }
                let enclosing = self.current_loop;
                self.current_loop = LoopType::For;
                self.check_conditioned_declaration(body);
                self.resolve_stmt(body);
                self.current_loop = enclosing;
                self.end_scope();
            }
            Stmt::Function(func) => {
                let name = func.name.clone();
                self.declare(&name, VarDeclareAt::Function { stmt: func.id });
                self.define(&name);
                self.resolve_function(func, FunctionType::Function);
            }
            Stmt::Return { keyword, value } => {
                if let Some(value) = value {
                    if self.current_function == FunctionType::Initializer {
                        let keyword = keyword.clone();
                        self.error(&keyword, "Can't return a value from an class initializer.");
                    }
                    self.resolve_expr(value);
                } else if self.current_function == FunctionType::Initializer {
                    // make the initializer return `this`
                    let mut this = Expr::This {
                        keyword: Token::new(TokenType::This, "this", keyword.line),
                        declare: None,
                    };
                    self.resolve_expr(&mut this);
                    *value = Some(this);
                }
            }
            Stmt::Break { keyword } => {
                if self.current_loop == LoopType::None {
                    let keyword = keyword.clone();
                    self.error(&keyword, "Can't use `break' outside of a loop body.");
                }
            }
            Stmt::Continue { keyword } => {
                if self.current_loop == LoopType::None {
                    let keyword = keyword.clone();
                    self.error(&keyword, "Can't use `continue' outside of a loop body.");
                }
            }
            Stmt::Class(class) => self.resolve_class(class),
            Stmt::Import { id, name, .. } => {
                let name = name.clone();
                self.declare(&name, VarDeclareAt::Import { stmt: *id });
                self.define(&name);
            }
            Stmt::From { id, names, .. } => {
                let id = *id;
                for (index, (_, bound)) in names.iter().enumerate() {
                    let bound = bound.clone();
                    self.declare(&bound, VarDeclareAt::FromImport { stmt: id, index });
                    self.define(&bound);
                }
            }
            Stmt::Export { keyword, declaration } => {
                self.resolve_stmt(declaration);
                // exported slots must outlive the top-level body
                match declaration.as_ref() {
                    Stmt::Var { id, names, .. } => {
                        for index in 0..names.len() {
                            self.resolution
                                .store_types
                                .insert(VarDeclareAt::Var { stmt: *id, index }, VarStoreType::Static);
                        }
                    }
                    Stmt::Function(func) => {
                        self.resolution
                            .store_types
                            .insert(VarDeclareAt::Function { stmt: func.id }, VarStoreType::Static);
                    }
                    Stmt::Class(class) => {
                        self.resolution
                            .store_types
                            .insert(VarDeclareAt::Class { stmt: class.id }, VarStoreType::Static);
                    }
                    _ => {
                        let keyword = keyword.clone();
                        self.error(&keyword, "Not a valid declaration in the `export' statement.");
                    }
                }
            }
        }
    }

    /// A `var` directly as a loop/conditional body would declare into the
    /// enclosing scope under a condition.
    fn check_conditioned_declaration(&mut self, body: &Stmt) {
        if let Stmt::Var { names, .. } = body {
            let name = names[0].clone();
            self.error(&name, "Conditioned variable declaration is not allowed.");
        }
    }

    fn resolve_function(&mut self, func: &mut FunctionDecl, ftype: FunctionType) {
        let enclosing = self.current_function;
        self.current_function = ftype;
        self.begin_scope(true);
        for (index, param) in func.params.clone().iter().enumerate() {
            self.declare(param, VarDeclareAt::Param { stmt: func.id, index });
            self.define(param);
        }
        self.resolve_stmts(&mut func.body);
        self.end_scope();
        self.current_function = enclosing;
    }

    fn resolve_class(&mut self, class: &mut ClassDecl) {
        let enclosing_class = self.current_class;
        self.current_class = ClassType::Class;

        let name = class.name.clone();
        self.declare(&name, VarDeclareAt::Class { stmt: class.id });
        self.define(&name);

        if let Some(superclass) = &mut class.superclass {
            if let Expr::Variable { name: super_name, .. } = superclass
                && super_name.lexeme == class.name.lexeme
            {
                let super_name = super_name.clone();
                self.error(&super_name, "A class can't inherit from itself.");
            }
            self.resolve_expr(superclass);
            self.current_class = ClassType::Subclass;
        }

        self.begin_scope(true);
        let this_info = ValueInfo {
            ready: true,
            declare: VarDeclareAt::ClassThis { stmt: class.id },
        };
        self.scopes
            .last_mut()
            .expect("class scope just pushed")
            .vars
            .insert("this".to_owned(), this_info);
        if self.current_class == ClassType::Subclass {
            self.scopes
                .last_mut()
                .expect("class scope just pushed")
                .vars
                .insert("super".to_owned(), this_info);
        }
        for method in &mut class.methods {
            let ftype = if method.name.lexeme == "__init__" {
                FunctionType::Initializer
            } else {
                FunctionType::Method
            };
            self.resolve_function(method, ftype);
        }
        self.end_scope();

        self.current_class = enclosing_class;
    }

    fn resolve_expr(&mut self, expr: &mut Expr) {
        match expr {
            Expr::Literal { .. } => {}
            Expr::Variable { name, declare } => {
                let name = name.clone();
                *declare = self.resolve_local(&name);
            }
            Expr::Assign { target, value } => {
                self.resolve_expr(value);
                self.resolve_target(target);
            }
            Expr::Binary { left, right, .. } => {
                self.resolve_expr(left);
                self.resolve_expr(right);
            }
            Expr::Logical { left, right, .. } => {
                self.resolve_expr(left);
                self.resolve_expr(right);
            }
            Expr::Unary { operand, .. } => self.resolve_expr(operand),
            Expr::Grouping { inner } => self.resolve_expr(inner),
            Expr::Tuple { elements } => {
                for e in elements {
                    self.resolve_expr(e);
                }
            }
            Expr::Call { callee, arguments, .. } => {
                self.resolve_expr(callee);
                for arg in arguments {
                    self.resolve_expr(arg);
                }
            }
            Expr::Get { object, name } => {
                // access through `super' is a Super expression, not a Get,
                // so it is not checked here
                let name_tk = name.clone();
                if name_tk.lexeme == "__init__" {
                    self.error(
                        &name_tk,
                        "Explicit call on constructor is not allowed (unless after `super').",
                    );
                } else if name_tk.lexeme.starts_with('_') && !matches!(object.as_ref(), Expr::This { .. }) {
                    self.error(
                        &name_tk,
                        "Can't access private members on instance other than `this' or `super'.",
                    );
                }
                self.resolve_expr(object);
            }
            Expr::This { keyword, declare } => {
                let keyword = keyword.clone();
                if self.current_class == ClassType::None {
                    self.error(&keyword, "Can't use `this' outside of a class.");
                    return;
                }
                *declare = self.resolve_local(&keyword);
            }
            Expr::Super { keyword, declare, .. } => {
                let keyword = keyword.clone();
                if self.current_class == ClassType::None {
                    self.error(&keyword, "Can't use `super' outside of a class.");
                } else if self.current_class != ClassType::Subclass {
                    self.error(&keyword, "Can't use `super' in a class with no superclass.");
                }
                *declare = self.resolve_local(&keyword);
            }
        }
    }

    fn resolve_target(&mut self, target: &mut AssignTarget) {
        match target {
            AssignTarget::Variable { name, declare } => {
                let name = name.clone();
                *declare = self.resolve_local(&name);
            }
            AssignTarget::Property { object, name } => {
                let name_tk = name.clone();
                if name_tk.lexeme.starts_with('_') && !matches!(object.as_ref(), Expr::This { .. }) {
                    self.error(
                        &name_tk,
                        "Can't access private members on instance other than `this'.",
                    );
                }
                self.resolve_expr(object);
            }
            AssignTarget::Tuple { elements } => {
                for e in elements {
                    self.resolve_target(e);
                }
            }
            AssignTarget::Placeholder { .. } => {}
        }
    }
}
