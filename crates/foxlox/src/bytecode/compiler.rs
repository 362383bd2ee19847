//! The code generator: one walk over the resolved AST per chunk.
//!
//! The generator simulates the operand-stack depth while emitting, so
//! stack-relative slots and `PopN` counts are computed at compile time.
//! Scoped values are popped on every exit path: block ends emit `PopN`,
//! `break`/`continue` pop back to the loop-start depth, and returns rely on
//! the VM truncating to the frame floor.

use ahash::AHashMap;

use crate::ast::{AssignTarget, ClassDecl, Expr, FunctionDecl, Stmt, VarDeclareAt, VarStoreType};
use crate::bytecode::chunk::{Chunk, CompiletimeClass, Constant};
use crate::bytecode::op::Op;
use crate::error::{ChunkError, Diagnostics};
use crate::resolver::Resolution;
use crate::scanner::{Token, TokenType};
use crate::value::CompiletimeValue;

/// Storage assigned to one declaration: a stack depth or a static slot.
#[derive(Debug, Clone, Copy)]
struct ValueIdx {
    store: VarStoreType,
    idx: u16,
}

/// Generates a chunk for the resolved AST. Subroutine 0 is the top-level
/// script body named after the module.
pub(crate) fn r#gen(ast: &[Stmt], resolution: &Resolution, source_name: &str) -> (Chunk, Diagnostics) {
    let mut chunk = Chunk::default();
    let top = chunk
        .add_subroutine(source_name, 0)
        .expect("first subroutine cannot overflow the table");
    let mut generator = CodeGen {
        chunk,
        resolution,
        source_name,
        value_idxs: AHashMap::new(),
        current_subroutine_idx: top,
        current_line: 1,
        current_stack_size: 0,
        loop_start_stack_size: 0,
        break_jumps: Vec::new(),
        continue_jumps: Vec::new(),
        diags: Diagnostics::new(),
    };
    for stmt in ast {
        generator.compile_stmt(stmt);
    }
    generator.current_line = -1; // <EOF>
    // Op::Return takes charge of popping the script body's locals
    generator.emit(Op::Return);
    (generator.chunk, generator.diags)
}

struct CodeGen<'a> {
    chunk: Chunk,
    resolution: &'a Resolution,
    source_name: &'a str,
    value_idxs: AHashMap<VarDeclareAt, ValueIdx>,
    current_subroutine_idx: u16,
    current_line: i32,
    current_stack_size: u16,
    loop_start_stack_size: u16,
    break_jumps: Vec<usize>,
    continue_jumps: Vec<usize>,
    diags: Diagnostics,
}

impl CodeGen<'_> {
    fn error(&mut self, token: &Token, message: &str) {
        self.diags.error(token, message);
    }

    fn chunk_err(&mut self, token: &Token, err: ChunkError) {
        self.diags.error(token, err.0);
    }

    // === stack simulation ===

    fn push_stack(&mut self) {
        self.current_stack_size += 1;
    }

    fn pop_stack(&mut self, n: u16) {
        assert!(n <= self.current_stack_size, "wrong simulated stack size");
        self.current_stack_size -= n;
    }

    /// Converts an absolute simulated depth into a distance from the top.
    fn idx_cast(&self, idx: u16) -> u16 {
        self.current_stack_size - idx - 1
    }

    /// Emits pops down to `stack_size_before` without changing the
    /// simulated depth (used by break/continue, where the simulation is
    /// settled at the end of the enclosing block).
    fn emit_pop_to(&mut self, stack_size_before: u16) {
        assert!(self.current_stack_size >= stack_size_before, "wrong simulated stack size");
        let n = self.current_stack_size - stack_size_before;
        if n > 1 {
            self.emit_u16(Op::PopN, n);
        } else if n == 1 {
            self.emit(Op::Pop);
        }
    }

    fn pop_stack_to(&mut self, stack_size_before: u16) {
        assert!(self.current_stack_size >= stack_size_before, "wrong simulated stack size");
        self.current_stack_size = stack_size_before;
    }

    // === emission ===

    fn emit(&mut self, op: Op) {
        let line = self.current_line;
        self.chunk.subroutine_mut(self.current_subroutine_idx).add_op(op, line);
    }

    fn emit_u8(&mut self, op: Op, v: u8) {
        let line = self.current_line;
        let sub = self.chunk.subroutine_mut(self.current_subroutine_idx);
        sub.add_op(op, line);
        sub.add_u8(v, line);
    }

    fn emit_u16(&mut self, op: Op, v: u16) {
        let line = self.current_line;
        let sub = self.chunk.subroutine_mut(self.current_subroutine_idx);
        sub.add_op(op, line);
        sub.add_u16(v, line);
    }

    fn code_len(&self) -> usize {
        self.chunk.subroutine(self.current_subroutine_idx).code_len()
    }

    /// Emits a forward jump with a zero placeholder, returning the operand
    /// position for later patching.
    fn emit_jump(&mut self, op: Op) -> usize {
        self.emit(op);
        let ip = self.code_len();
        let line = self.current_line;
        self.chunk.subroutine_mut(self.current_subroutine_idx).add_i16(0, line);
        ip
    }

    fn patch_jump(&mut self, ip: usize, token: &Token) {
        let jump_length = self.code_len() as i64 - ip as i64 - 2;
        assert!(jump_length >= 0, "backward patch of a forward jump");
        if jump_length > i64::from(i16::MAX) {
            self.error(token, "Jump length is too long.");
            return;
        }
        self.chunk
            .subroutine_mut(self.current_subroutine_idx)
            .edit_i16(ip, jump_length as i16);
    }

    fn patch_jumps(&mut self, ips: Vec<usize>, token: &Token) {
        for ip in ips {
            self.patch_jump(ip, token);
        }
    }

    fn prepare_loop(&self) -> usize {
        self.code_len()
    }

    /// Emits the backward jump closing a loop.
    fn emit_loop(&mut self, start: usize, token: &Token) {
        self.emit(Op::Jump);
        let jump_length = start as i64 - self.code_len() as i64 - 2;
        assert!(jump_length <= 0, "forward loop edge");
        if jump_length < i64::from(i16::MIN) {
            self.error(token, "Jump length is too long.");
            let line = self.current_line;
            self.chunk.subroutine_mut(self.current_subroutine_idx).add_i16(0, line);
            return;
        }
        let line = self.current_line;
        self.chunk
            .subroutine_mut(self.current_subroutine_idx)
            .add_i16(jump_length as i16, line);
    }

    fn add_string(&mut self, token: &Token, s: &[u8]) -> Option<u16> {
        match self.chunk.add_string(s) {
            Ok(idx) => Some(idx),
            Err(e) => {
                self.chunk_err(token, e);
                None
            }
        }
    }

    fn add_referenced_static(&mut self, slot: u16) {
        self.chunk
            .subroutine_mut(self.current_subroutine_idx)
            .add_referenced_static(slot);
    }

    fn value_idx(&self, declare: Option<VarDeclareAt>) -> ValueIdx {
        let at = declare.expect("unresolved name reached the code generator");
        *self
            .value_idxs
            .get(&at)
            .expect("use of a declaration the generator has not seen")
    }

    // === expressions ===

    fn compile_expr(&mut self, expr: &Expr) {
        match expr {
            Expr::Literal { value, token } => self.compile_literal(value, token),
            Expr::Variable { name, declare } => {
                self.current_line = name.line;
                let info = self.value_idx(*declare);
                match info.store {
                    VarStoreType::Stack => {
                        let k = self.idx_cast(info.idx);
                        self.emit_u16(Op::LoadStack, k);
                    }
                    VarStoreType::Static => {
                        self.add_referenced_static(info.idx);
                        self.emit_u16(Op::LoadStatic, info.idx);
                    }
                }
                self.push_stack();
            }
            Expr::Assign { target, value } => {
                self.compile_expr(value);
                self.compile_assign_target(target);
            }
            Expr::Binary { left, op, right } => {
                self.current_line = op.line;
                self.compile_expr(left);
                self.compile_expr(right);
                let opcode = match op.ttype {
                    TokenType::Minus => Op::Subtract,
                    TokenType::Slash => Op::Divide,
                    TokenType::Star => Op::Multiply,
                    TokenType::Plus => Op::Add,
                    TokenType::SlashSlash => Op::IntDiv,
                    TokenType::Greater => Op::Gt,
                    TokenType::GreaterEqual => Op::Ge,
                    TokenType::Less => Op::Lt,
                    TokenType::LessEqual => Op::Le,
                    TokenType::BangEqual => Op::Ne,
                    TokenType::EqualEqual => Op::Eq,
                    _ => unreachable!("unknown binary operator"),
                };
                self.emit(opcode);
                self.pop_stack(1);
            }
            Expr::Logical { left, op, right } => {
                self.current_line = op.line;
                self.compile_expr(left);
                let jump = if op.ttype == TokenType::Or {
                    self.emit_jump(Op::JumpIfTrueNoPop)
                } else {
                    self.emit_jump(Op::JumpIfFalseNoPop)
                };
                self.pop_stack(1);
                self.emit(Op::Pop);
                self.compile_expr(right);
                self.patch_jump(jump, op);
            }
            Expr::Unary { op, operand } => {
                self.current_line = op.line;
                self.compile_expr(operand);
                match op.ttype {
                    TokenType::Minus => self.emit(Op::Negate),
                    TokenType::Bang => self.emit(Op::Not),
                    _ => unreachable!("unknown unary operator"),
                }
            }
            Expr::Grouping { inner } => self.compile_expr(inner),
            Expr::Tuple { elements } => {
                for e in elements {
                    self.compile_expr(e);
                }
                let n = u16::try_from(elements.len()).expect("parser caps arity below u16");
                self.emit_u16(Op::Tuple, n);
                self.pop_stack(n);
                self.push_stack();
            }
            Expr::Call { callee, paren, arguments } => {
                self.current_line = paren.line;
                let enclosing_stack_size = self.current_stack_size;
                for arg in arguments {
                    self.compile_expr(arg);
                }
                self.compile_expr(callee);
                let n = u16::try_from(arguments.len()).expect("parser caps arity at 255");
                self.emit_u16(Op::Call, n);
                // + 1 for the return value
                self.pop_stack_to(enclosing_stack_size + 1);
            }
            Expr::Get { object, name } => {
                self.compile_expr(object);
                if let Some(idx) = self.add_string(name, name.lexeme.as_bytes()) {
                    self.emit_u16(Op::GetProperty, idx);
                }
            }
            Expr::This { keyword, declare } => {
                self.current_line = keyword.line;
                let info = self.value_idx(*declare);
                assert!(matches!(info.store, VarStoreType::Stack), "wrong store type for `this'");
                let k = self.idx_cast(info.idx);
                self.emit_u16(Op::LoadStack, k);
                self.push_stack();
            }
            Expr::Super { keyword, method, declare } => {
                self.current_line = keyword.line;
                let info = self.value_idx(*declare);
                assert!(matches!(info.store, VarStoreType::Stack), "wrong store type for `super'");
                let k = self.idx_cast(info.idx);
                self.emit_u16(Op::LoadStack, k);
                self.push_stack();
                if let Some(idx) = self.add_string(method, method.lexeme.as_bytes()) {
                    self.emit_u16(Op::GetSuperMethod, idx);
                }
            }
        }
    }

    fn compile_literal(&mut self, value: &CompiletimeValue, token: &Token) {
        let result = match value {
            CompiletimeValue::Nil => {
                self.emit(Op::Nil);
                Ok(())
            }
            CompiletimeValue::Bool(b) => {
                self.emit_u8(Op::Bool, u8::from(*b));
                Ok(())
            }
            CompiletimeValue::Int(i) => self.chunk.add_constant(Constant::Int(*i)).map(|idx| {
                self.emit_u16(Op::Constant, idx);
            }),
            CompiletimeValue::Float(f) => self.chunk.add_constant(Constant::Float(*f)).map(|idx| {
                self.emit_u16(Op::Constant, idx);
            }),
            CompiletimeValue::Str(s) => self.chunk.add_string(s).map(|idx| {
                self.emit_u16(Op::String, idx);
            }),
            CompiletimeValue::HostFn(_) => panic!("host functions cannot be serialized into a chunk"),
        };
        if let Err(e) = result {
            self.chunk_err(token, e);
        }
        self.push_stack();
    }

    /// Stores the value on top of the stack into `target`, leaving the
    /// value as the expression result.
    fn compile_assign_target(&mut self, target: &AssignTarget) {
        match target {
            AssignTarget::Variable { name, declare } => {
                self.current_line = name.line;
                let info = self.value_idx(*declare);
                match info.store {
                    VarStoreType::Stack => {
                        let k = self.idx_cast(info.idx);
                        self.emit_u16(Op::StoreStack, k);
                    }
                    VarStoreType::Static => {
                        self.add_referenced_static(info.idx);
                        self.emit_u16(Op::StoreStatic, info.idx);
                    }
                }
            }
            AssignTarget::Property { object, name } => {
                self.compile_expr(object);
                if let Some(idx) = self.add_string(name, name.lexeme.as_bytes()) {
                    self.emit_u16(Op::SetProperty, idx);
                }
                self.pop_stack(1);
            }
            AssignTarget::Placeholder { .. } => {
                // assigning to `_` stores nothing; the value stays as the
                // expression result
            }
            AssignTarget::Tuple { elements } => {
                // duplicate the tuple so the pattern consumes the copy and
                // the original remains as the expression result
                self.emit_u16(Op::LoadStack, 0);
                self.push_stack();
                self.compile_unpack_pattern(elements);
            }
        }
    }

    /// Consumes the tuple on top of the stack, storing its elements into
    /// the pattern's targets in reverse source order.
    fn compile_unpack_pattern(&mut self, elements: &[AssignTarget]) {
        let n = u16::try_from(elements.len()).expect("parser caps tuple arity");
        self.emit_u16(Op::Unpack, n);
        self.pop_stack(1);
        for _ in 0..n {
            self.push_stack();
        }
        for element in elements.iter().rev() {
            match element {
                AssignTarget::Tuple { elements: nested } => {
                    self.compile_unpack_pattern(nested);
                }
                AssignTarget::Placeholder { .. } => {
                    self.emit(Op::Pop);
                    self.pop_stack(1);
                }
                target => {
                    self.compile_assign_target(target);
                    self.emit(Op::Pop);
                    self.pop_stack(1);
                }
            }
        }
    }

    // === statements ===

    fn compile_stmt(&mut self, stmt: &Stmt) {
        match stmt {
            Stmt::Expression { expr } => {
                self.compile_expr(expr);
                self.pop_stack(1);
                self.emit(Op::Pop);
            }
            Stmt::Var { id, names, initializers } => {
                for (index, (name, init)) in names.iter().zip(initializers).enumerate() {
                    self.current_line = name.line;
                    match init {
                        Some(expr) => self.compile_expr(expr),
                        None => {
                            self.emit(Op::Nil);
                            self.push_stack();
                        }
                    }
                    self.declare_a_var(VarDeclareAt::Var { stmt: *id, index }, name);
                }
            }
            Stmt::Block { statements } => {
                let stack_size_before = self.current_stack_size;
                for s in statements {
                    self.compile_stmt(s);
                }
                self.emit_pop_to(stack_size_before);
                self.pop_stack_to(stack_size_before);
            }
            Stmt::If { condition, then_branch, else_branch, right_paren } => {
                self.current_line = right_paren.line;
                self.compile_expr(condition);
                let then_jump = self.emit_jump(Op::JumpIfFalse);
                self.pop_stack(1);
                self.compile_stmt(then_branch);
                if let Some(else_branch) = else_branch {
                    let else_jump = self.emit_jump(Op::Jump);
                    self.patch_jump(then_jump, right_paren);
                    self.compile_stmt(else_branch);
                    self.patch_jump(else_jump, right_paren);
                } else {
                    self.patch_jump(then_jump, right_paren);
                }
            }
            Stmt::While { condition, body, right_paren } => {
                self.current_line = right_paren.line;
                let start = self.prepare_loop();
                self.compile_expr(condition);
                let jump_to_end = self.emit_jump(Op::JumpIfFalse);
                self.pop_stack(1);

                let enclosing_loop_start = self.loop_start_stack_size;
                self.loop_start_stack_size = self.current_stack_size;
                let enclosing_breaks = std::mem::take(&mut self.break_jumps);
                let enclosing_continues = std::mem::take(&mut self.continue_jumps);

                self.compile_stmt(body);

                let continues = std::mem::replace(&mut self.continue_jumps, enclosing_continues);
                self.patch_jumps(continues, right_paren);
                self.emit_loop(start, right_paren);
                let breaks = std::mem::replace(&mut self.break_jumps, enclosing_breaks);
                self.patch_jumps(breaks, right_paren);
                self.patch_jump(jump_to_end, right_paren);

                self.loop_start_stack_size = enclosing_loop_start;
            }
            Stmt::For { initializer, condition, increment, body, right_paren } => {
                self.current_line = right_paren.line;
                let stack_size_before_initializer = self.current_stack_size;
                if let Some(init) = initializer {
                    self.compile_stmt(init);
                }
                let start = self.prepare_loop();
                let jump_to_end = condition.as_ref().map(|cond| {
                    self.compile_expr(cond);
                    let jump = self.emit_jump(Op::JumpIfFalse);
                    self.pop_stack(1);
                    jump
                });

                let enclosing_loop_start = self.loop_start_stack_size;
                self.loop_start_stack_size = self.current_stack_size;
                let enclosing_breaks = std::mem::take(&mut self.break_jumps);
                let enclosing_continues = std::mem::take(&mut self.continue_jumps);

                self.compile_stmt(body);

                let continues = std::mem::replace(&mut self.continue_jumps, enclosing_continues);
                self.patch_jumps(continues, right_paren);
                if let Some(incr) = increment {
                    self.compile_expr(incr);
                    self.pop_stack(1);
                    self.emit(Op::Pop);
                }
                self.emit_loop(start, right_paren);
                let breaks = std::mem::replace(&mut self.break_jumps, enclosing_breaks);
                self.patch_jumps(breaks, right_paren);
                if let Some(jump) = jump_to_end {
                    self.patch_jump(jump, right_paren);
                }
                self.loop_start_stack_size = enclosing_loop_start;

                self.emit_pop_to(stack_size_before_initializer);
                self.pop_stack_to(stack_size_before_initializer);
            }
            Stmt::Function(func) => self.compile_function_stmt(func),
            Stmt::Return { keyword, value } => {
                self.current_line = keyword.line;
                match value {
                    Some(expr) => {
                        self.compile_expr(expr);
                        self.emit(Op::ReturnV);
                        self.pop_stack(1);
                    }
                    None => self.emit(Op::Return),
                }
            }
            Stmt::Break { .. } => {
                // popping the simulated depth is the enclosing block's job
                let depth = self.loop_start_stack_size;
                self.emit_pop_to(depth);
                let jump = self.emit_jump(Op::Jump);
                self.break_jumps.push(jump);
            }
            Stmt::Continue { .. } => {
                let depth = self.loop_start_stack_size;
                self.emit_pop_to(depth);
                let jump = self.emit_jump(Op::Jump);
                self.continue_jumps.push(jump);
            }
            Stmt::Class(class) => self.compile_class_stmt(class),
            Stmt::Import { id, name, path } => {
                for component in path {
                    self.current_line = component.line;
                    if let Some(idx) = self.add_string(component, component.lexeme.as_bytes()) {
                        self.emit_u16(Op::String, idx);
                    }
                    self.push_stack();
                }
                let n = u16::try_from(path.len()).expect("path length is token-bounded");
                self.emit_u16(Op::Import, n);
                self.pop_stack(n);
                self.push_stack();
                self.declare_a_var(VarDeclareAt::Import { stmt: *id }, name);
            }
            Stmt::From { id, path, names } => {
                for component in path {
                    self.current_line = component.line;
                    if let Some(idx) = self.add_string(component, component.lexeme.as_bytes()) {
                        self.emit_u16(Op::String, idx);
                    }
                    self.push_stack();
                }
                let n = u16::try_from(path.len()).expect("path length is token-bounded");
                self.emit_u16(Op::Import, n);
                self.pop_stack(n);
                let lib_stack_idx = self.current_stack_size;
                self.push_stack();
                for (index, (source, bound)) in names.iter().enumerate() {
                    self.current_line = bound.line;
                    let k = self.idx_cast(lib_stack_idx);
                    self.emit_u16(Op::LoadStack, k);
                    self.push_stack();
                    if let Some(idx) = self.add_string(source, source.lexeme.as_bytes()) {
                        self.emit_u16(Op::GetProperty, idx);
                    }
                    self.declare_a_var(VarDeclareAt::FromImport { stmt: *id, index }, bound);
                }
                // the imported lib dict is not useful anymore, but popping it
                // would shift the slots declared above it; nil it out instead
                self.emit(Op::Nil);
                self.push_stack();
                let k = self.idx_cast(lib_stack_idx);
                self.emit_u16(Op::StoreStack, k);
                self.emit(Op::Pop);
                self.pop_stack(1);
            }
            Stmt::Export { declaration, .. } => {
                self.compile_stmt(declaration);
                let exports: Vec<(Token, VarDeclareAt)> = match declaration.as_ref() {
                    Stmt::Var { id, names, .. } => names
                        .iter()
                        .enumerate()
                        .map(|(index, name)| (name.clone(), VarDeclareAt::Var { stmt: *id, index }))
                        .collect(),
                    Stmt::Function(func) => {
                        vec![(func.name.clone(), VarDeclareAt::Function { stmt: func.id })]
                    }
                    Stmt::Class(class) => {
                        vec![(class.name.clone(), VarDeclareAt::Class { stmt: class.id })]
                    }
                    _ => Vec::new(),
                };
                for (name, at) in exports {
                    let info = self.value_idx(Some(at));
                    assert!(
                        matches!(info.store, VarStoreType::Static),
                        "exported value must be static storage"
                    );
                    if let Err(e) = self.chunk.add_export(name.lexeme.as_bytes(), info.idx) {
                        self.chunk_err(&name, e);
                    }
                }
            }
        }
    }

    /// Assigns storage to a declaration whose initial value sits on top of
    /// the stack: stack values simply stay where they are; static values
    /// are moved into their slot.
    fn declare_a_var(&mut self, at: VarDeclareAt, name: &Token) {
        self.current_line = name.line;
        match self.resolution.store_type(at) {
            VarStoreType::Stack => {
                let idx = self.current_stack_size - 1;
                self.value_idxs.insert(at, ValueIdx { store: VarStoreType::Stack, idx });
            }
            VarStoreType::Static => match self.chunk.add_static_value() {
                Ok(slot) => {
                    self.emit_u16(Op::StoreStatic, slot);
                    self.pop_stack(1);
                    self.emit(Op::Pop);
                    self.value_idxs
                        .insert(at, ValueIdx { store: VarStoreType::Static, idx: slot });
                    self.add_referenced_static(slot);
                }
                Err(e) => self.chunk_err(name, e),
            },
        }
    }

    fn compile_function_stmt(&mut self, func: &FunctionDecl) {
        // register the name before generating the body, for recursion
        self.current_line = func.name.line;
        let at = VarDeclareAt::Function { stmt: func.id };
        let store = self.resolution.store_type(at);
        let mut static_slot = 0;
        match store {
            VarStoreType::Stack => {
                self.push_stack();
                let idx = self.current_stack_size - 1;
                self.value_idxs.insert(at, ValueIdx { store: VarStoreType::Stack, idx });
            }
            VarStoreType::Static => {
                match self.chunk.add_static_value() {
                    Ok(slot) => static_slot = slot,
                    Err(e) => self.chunk_err(&func.name, e),
                }
                self.value_idxs
                    .insert(at, ValueIdx { store: VarStoreType::Static, idx: static_slot });
                self.add_referenced_static(static_slot);
            }
        }

        let subroutine_idx = self.gen_subroutine(func, None);
        self.emit_u16(Op::Func, subroutine_idx);

        self.current_line = func.name.line;
        if matches!(store, VarStoreType::Static) {
            self.emit_u16(Op::StoreStatic, static_slot);
            self.emit(Op::Pop);
        }
    }

    fn compile_class_stmt(&mut self, class: &ClassDecl) {
        self.current_line = class.name.line;
        let at = VarDeclareAt::Class { stmt: class.id };
        let store = self.resolution.store_type(at);
        let mut static_slot = 0;
        match store {
            VarStoreType::Stack => {
                // the class value will sit at the current depth once pushed
                let idx = self.current_stack_size;
                self.value_idxs.insert(at, ValueIdx { store: VarStoreType::Stack, idx });
            }
            VarStoreType::Static => {
                match self.chunk.add_static_value() {
                    Ok(slot) => static_slot = slot,
                    Err(e) => self.chunk_err(&class.name, e),
                }
                self.value_idxs
                    .insert(at, ValueIdx { store: VarStoreType::Static, idx: static_slot });
                self.add_referenced_static(static_slot);
            }
        }

        let mut compiletime_class = CompiletimeClass::new(class.name.lexeme.clone());
        for method in &class.methods {
            let subroutine_idx = self.gen_subroutine(method, Some(class));
            if let Some(str_idx) = self.add_string(&method.name, method.name.lexeme.as_bytes()) {
                compiletime_class.add_method(str_idx, subroutine_idx);
            }
        }

        self.current_line = class.name.line;
        match self.chunk.add_class(compiletime_class) {
            Ok(class_idx) => {
                self.push_stack();
                self.emit_u16(Op::Class, class_idx);
            }
            Err(e) => self.chunk_err(&class.name, e),
        }

        if let Some(superclass) = &class.superclass {
            self.compile_expr(superclass);
            self.emit(Op::Inherit);
            self.pop_stack(1);
        }

        if matches!(store, VarStoreType::Static) {
            self.emit_u16(Op::StoreStatic, static_slot);
            self.emit(Op::Pop);
            self.pop_stack(1);
        }
    }

    /// Generates a subroutine for a function or method body. Parameter
    /// slots continue the enclosing simulated depth; stack addressing is
    /// top-relative, so the shared base cancels out at run time.
    fn gen_subroutine(&mut self, func: &FunctionDecl, klass: Option<&ClassDecl>) -> u16 {
        self.current_line = func.name.line;
        let name = format!("{}:{}", self.source_name, func.name.lexeme);
        let arity = u32::try_from(func.params.len()).expect("parser caps parameters at 255");
        let subroutine_idx = match self.chunk.add_subroutine(&name, arity) {
            Ok(idx) => idx,
            Err(e) => {
                self.chunk_err(&func.name, e);
                return 0;
            }
        };

        let stack_size_before = self.current_stack_size;

        for index in 0..func.params.len() {
            self.push_stack();
            let at = VarDeclareAt::Param { stmt: func.id, index };
            match self.resolution.store_type(at) {
                VarStoreType::Stack => {
                    let idx = self.current_stack_size - 1;
                    self.value_idxs.insert(at, ValueIdx { store: VarStoreType::Stack, idx });
                }
                VarStoreType::Static => {
                    let slot = match self.chunk.add_static_value() {
                        Ok(slot) => slot,
                        Err(e) => {
                            self.chunk_err(&func.name, e);
                            0
                        }
                    };
                    self.value_idxs
                        .insert(at, ValueIdx { store: VarStoreType::Static, idx: slot });
                    self.add_referenced_static(slot);
                }
            }
        }

        if let Some(klass) = klass {
            // `this' is pushed by the VM as a trailing parameter
            self.push_stack();
            let at = VarDeclareAt::ClassThis { stmt: klass.id };
            assert!(
                matches!(self.resolution.store_type(at), VarStoreType::Stack),
                "wrong store type for `this'"
            );
            let idx = self.current_stack_size - 1;
            self.value_idxs.insert(at, ValueIdx { store: VarStoreType::Stack, idx });
        }

        let enclosing_subroutine_idx = self.current_subroutine_idx;
        self.current_subroutine_idx = subroutine_idx;

        // a parameter promoted to static storage is relocated on entry
        let param_num = func.params.len() + usize::from(klass.is_some());
        for index in 0..func.params.len() {
            let at = VarDeclareAt::Param { stmt: func.id, index };
            if matches!(self.resolution.store_type(at), VarStoreType::Static) {
                let slot = self.value_idxs[&at].idx;
                let k = u16::try_from(param_num - index - 1).expect("parameter count fits u16");
                self.emit_u16(Op::LoadStack, k);
                self.emit_u16(Op::StoreStatic, slot);
                self.emit(Op::Pop);
                self.add_referenced_static(slot);
            }
        }

        for stmt in &func.body {
            self.compile_stmt(stmt);
        }
        // Op::Return takes charge of popping, so no Op::Pop here
        self.pop_stack_to(stack_size_before);
        self.current_subroutine_idx = enclosing_subroutine_idx;

        subroutine_idx
    }
}
