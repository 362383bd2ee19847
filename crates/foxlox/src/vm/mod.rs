//! The virtual machine: a single-threaded stack interpreter over loaded
//! chunks, owning the heap, the string intern pool, the class/static/
//! const-string pools, and the module cache.

mod gc;

use std::path::{Path, PathBuf};

use ahash::AHashMap;
use smallvec::SmallVec;

use crate::bytecode::{Chunk, Constant, Op, SubrRef};
use crate::error::{ChunkError, RunError, RunResult, RuntimeError};
use crate::heap::{ClassId, ClassObj, DictKey, Heap, InstanceId, MethodEntry};
use crate::intern::{StrId, StringPool};
use crate::modules::{LibValue, RuntimeLib, default_libs};
use crate::value::{self, BoundMethod, Object, Value};

/// Operand-stack capacity.
const STACK_MAX: usize = 1024;
/// Call-trace capacity.
const CALLTRACE_MAX: usize = 256;
/// Initial GC threshold.
const FIRST_GC_HEAP_SIZE: usize = 1024 * 1024;
/// Threshold growth after each collection.
const GC_HEAP_GROW_FACTOR: usize = 2;

/// A saved call frame: where to resume when the callee returns.
#[derive(Debug, Clone, Copy)]
struct Frame {
    subr: SubrRef,
    ip: usize,
    /// Everything above this is the callee's; truncated on return, and the
    /// return value lands here.
    stack_floor: usize,
    super_level: u16,
}

/// The foxlox virtual machine.
///
/// A VM executes one top-level module (plus whatever that module imports);
/// pools grow monotonically across module loads and are reset only by
/// dropping the VM.
pub struct Vm {
    chunks: Vec<Chunk>,
    stack: Vec<Value>,
    frames: Vec<Frame>,
    current: SubrRef,
    ip: usize,
    current_super_level: u16,
    pub(crate) heap: Heap,
    pub(crate) strings: StringPool,
    classes: Vec<ClassObj>,
    static_values: Vec<Value>,
    /// Interned handles for every loaded chunk's string table; GC roots.
    const_strings: Vec<StrId>,
    next_gc_heap_size: usize,
    /// Reused gray worklist for the collector.
    gray: Vec<gc::GrayItem>,
    libs: AHashMap<String, RuntimeLib>,
    /// Already-imported external modules, by canonical path. Cached dicts
    /// are GC roots.
    module_cache: AHashMap<PathBuf, crate::heap::DictId>,
    init_str: StrId,
}

impl Default for Vm {
    fn default() -> Self {
        Self::new()
    }
}

impl Vm {
    /// A VM with the default `fox.*` libraries preloaded.
    #[must_use]
    pub fn new() -> Self {
        let mut vm = Self::without_default_libs();
        for (path, lib) in default_libs() {
            vm.load_lib(path, lib);
        }
        vm
    }

    /// A VM with no builtin libraries registered.
    #[must_use]
    pub fn without_default_libs() -> Self {
        let mut strings = StringPool::new();
        let init_str = strings.intern(b"__init__");
        // `__init__` must survive every sweep
        let const_strings = vec![init_str];
        Self {
            chunks: Vec::new(),
            stack: Vec::with_capacity(STACK_MAX),
            frames: Vec::with_capacity(CALLTRACE_MAX),
            current: SubrRef { chunk: 0, index: 0 },
            ip: 0,
            current_super_level: 0,
            heap: Heap::new(),
            strings,
            classes: Vec::new(),
            static_values: Vec::new(),
            const_strings,
            next_gc_heap_size: FIRST_GC_HEAP_SIZE,
            gray: Vec::new(),
            libs: AHashMap::new(),
            module_cache: AHashMap::new(),
            init_str,
        }
    }

    /// Registers a builtin library under an import path such as `fox.io`.
    pub fn load_lib(&mut self, path: impl Into<String>, lib: RuntimeLib) {
        self.libs.insert(path.into(), lib);
    }

    /// Loads a serialized module and executes its top-level body, returning
    /// the body's result value.
    pub fn run(&mut self, binary: &[u8]) -> Result<Value, RuntimeError> {
        if !self.chunks.is_empty() {
            return Err(RuntimeError::bare("The VM has already been loaded with some other binary."));
        }
        let chunk_idx = self
            .load_binary(binary)
            .map_err(|e| RuntimeError::bare(e.0))?;
        self.stack.clear();
        self.frames.clear();
        self.current_super_level = 0;
        self.jump_to(SubrRef { chunk: chunk_idx, index: 0 });
        self.run_loop().map_err(|e| self.wrap_error(&e))
    }

    /// Materializes a self-contained [`Object`] from a runtime value.
    #[must_use]
    pub fn to_object(&self, v: &Value) -> Object {
        match *v {
            Value::Nil => Object::Nil,
            Value::Bool(b) => Object::Bool(b),
            Value::Int(i) => Object::Int(i),
            Value::Float(f) => Object::Float(f),
            Value::Str(id) => Object::Str(self.strings.get_lossy(id).into_owned()),
            Value::Tuple(id) => {
                Object::Tuple(self.heap.tuple(id).items.iter().map(|e| self.to_object(e)).collect())
            }
            Value::Subr(s) => Object::Function(self.subroutine(s).name().to_owned()),
            Value::HostFn(_) => Object::NativeFunction,
            Value::Method(m) => {
                let class = self.heap.instance(m.instance).class;
                Object::Method(
                    self.strings.get_lossy(self.classes[class.0 as usize].name).into_owned(),
                    self.subroutine(m.subr).name().to_owned(),
                )
            }
            Value::Class(c) => {
                Object::Class(self.strings.get_lossy(self.classes[c.0 as usize].name).into_owned())
            }
            Value::Instance(id) => {
                let class = self.heap.instance(id).class;
                Object::Instance(self.strings.get_lossy(self.classes[class.0 as usize].name).into_owned())
            }
            Value::Dict(id) => Object::Dict(
                self.heap
                    .dict(id)
                    .entries
                    .iter()
                    .map(|(k, val)| (self.to_object(&k.to_value()), self.to_object(val)))
                    .collect(),
            ),
        }
    }

    /// Renders a value the way diagnostics and tuple printing do (strings
    /// come out quoted).
    pub(crate) fn display_value(&self, v: &Value) -> String {
        match *v {
            Value::Nil => "nil".to_owned(),
            Value::Bool(b) => if b { "true" } else { "false" }.to_owned(),
            Value::Int(i) => i.to_string(),
            Value::Float(f) => f.to_string(),
            Value::Str(id) => format!("\"{}\"", self.strings.get_lossy(id)),
            Value::Tuple(id) => {
                let mut out = String::from("(");
                for e in &self.heap.tuple(id).items {
                    out.push_str(&self.display_value(e));
                    out.push_str(", ");
                }
                out.push(')');
                out
            }
            Value::Subr(s) => format!("<fn {}>", self.subroutine(s).name()),
            Value::HostFn(_) => "<native fn>".to_owned(),
            Value::Method(m) => {
                let class = self.heap.instance(m.instance).class;
                format!(
                    "<class {} method {}>",
                    self.strings.get_lossy(self.classes[class.0 as usize].name),
                    self.subroutine(m.subr).name()
                )
            }
            Value::Class(c) => {
                format!("<class {}>", self.strings.get_lossy(self.classes[c.0 as usize].name))
            }
            Value::Instance(id) => {
                let class = self.heap.instance(id).class;
                format!("<{} instance>", self.strings.get_lossy(self.classes[class.0 as usize].name))
            }
            Value::Dict(_) => "<dict>".to_owned(),
        }
    }

    /// Renders a value for `print`: like [`Self::display_value`] except
    /// top-level strings print their raw content.
    pub(crate) fn print_value(&self, v: &Value) -> String {
        if let Value::Str(id) = v {
            self.strings.get_lossy(*id).into_owned()
        } else {
            self.display_value(v)
        }
    }

    // === chunk loading ===

    /// Deserializes a chunk and splices it into the VM-global pools,
    /// recording the chunk's base indices.
    fn load_binary(&mut self, binary: &[u8]) -> Result<u16, ChunkError> {
        let mut chunk = Chunk::load(binary)?;
        let chunk_idx =
            u16::try_from(self.chunks.len()).map_err(|_| ChunkError("Too many chunks loaded."))?;

        let static_base = self.static_values.len();
        self.static_values
            .extend(std::iter::repeat_n(Value::Nil, usize::from(chunk.static_value_num())));

        let string_base = self.const_strings.len();
        for s in chunk.const_strings() {
            let id = self.strings.intern(s);
            self.const_strings.push(id);
        }

        let class_base = self.classes.len();
        for class in chunk.classes() {
            let name = self.strings.intern(class.name().as_bytes());
            let mut obj = ClassObj {
                name,
                superclass: None,
                methods: AHashMap::new(),
                mark: false,
            };
            for &(name_idx, func_idx) in class.methods() {
                let method_name = self.const_strings[string_base + usize::from(name_idx)];
                obj.methods.insert(
                    method_name,
                    MethodEntry {
                        super_level: 0,
                        subr: SubrRef { chunk: chunk_idx, index: func_idx },
                    },
                );
            }
            self.classes.push(obj);
        }

        chunk.set_bases(static_base, class_base, string_base);
        self.chunks.push(chunk);
        Ok(chunk_idx)
    }

    // === dispatch helpers ===

    fn chunk(&self) -> &Chunk {
        &self.chunks[usize::from(self.current.chunk)]
    }

    fn subroutine(&self, s: SubrRef) -> &crate::bytecode::Subroutine {
        self.chunks[usize::from(s.chunk)].subroutine(s.index)
    }

    fn read_u8(&mut self) -> u8 {
        let byte = self.subroutine(self.current).code()[self.ip];
        self.ip += 1;
        byte
    }

    fn read_u16(&mut self) -> u16 {
        let hi = u16::from(self.read_u8());
        let lo = u16::from(self.read_u8());
        (hi << 8) | lo
    }

    fn read_i16(&mut self) -> i16 {
        self.read_u16().cast_signed()
    }

    fn push(&mut self, v: Value) -> RunResult<()> {
        if self.stack.len() >= STACK_MAX {
            return Err(RunError::internal("Stack overflow."));
        }
        self.stack.push(v);
        Ok(())
    }

    fn pop_value(&mut self) -> Value {
        self.stack.pop().expect("operand stack underflow")
    }

    fn top(&self) -> Value {
        *self.stack.last().expect("operand stack underflow")
    }

    fn jump_to(&mut self, subr: SubrRef) {
        self.current = subr;
        self.ip = 0;
    }

    fn push_frame(&mut self, num_args: u16) -> RunResult<()> {
        if self.frames.len() >= CALLTRACE_MAX {
            return Err(RunError::internal("Call trace overflow."));
        }
        self.frames.push(Frame {
            subr: self.current,
            ip: self.ip,
            stack_floor: self.stack.len() - usize::from(num_args),
            super_level: self.current_super_level,
        });
        Ok(())
    }

    fn pop_frame(&mut self) {
        let frame = self.frames.pop().expect("call trace underflow");
        self.current = frame.subr;
        self.ip = frame.ip;
        self.current_super_level = frame.super_level;
        self.stack.truncate(frame.stack_floor);
    }

    fn const_string(&self, idx: u16) -> StrId {
        self.const_strings[self.chunk().const_string_idx_base() + usize::from(idx)]
    }

    fn wrap_error(&self, e: &RunError) -> RuntimeError {
        let line = self.subroutine(self.current).line_of(self.ip);
        RuntimeError {
            message: e.message.clone(),
            line,
            source: self.chunk().source_line(line).to_owned(),
        }
    }

    // === the dispatch loop ===

    /// Runs until the current chunk's top-level body returns. Imports
    /// re-enter this loop for the imported module's body.
    fn run_loop(&mut self) -> RunResult<Value> {
        loop {
            let byte = self.read_u8();
            let op = Op::from_repr(byte)
                .unwrap_or_else(|| panic!("unknown opcode byte 0x{byte:02x}"));
            match op {
                Op::Nop => {}
                Op::Nil => self.push(Value::Nil)?,
                Op::Return => {
                    if self.current.index == 0 {
                        self.collect_garbage();
                        return Ok(Value::Nil);
                    }
                    self.pop_frame();
                    self.push(Value::Nil)?;
                    self.collect_garbage();
                }
                Op::ReturnV => {
                    let v = self.top();
                    if self.current.index == 0 {
                        self.collect_garbage();
                        return Ok(v);
                    }
                    self.pop_frame();
                    self.push(v)?;
                    self.collect_garbage();
                }
                Op::Pop => {
                    self.pop_value();
                }
                Op::PopN => {
                    let n = usize::from(self.read_u16());
                    self.stack.truncate(self.stack.len() - n);
                }
                Op::Negate => {
                    let t = self.stack.last_mut().expect("operand stack underflow");
                    *t = value::neg(*t)?;
                }
                Op::Not => {
                    let t = self.stack.last_mut().expect("operand stack underflow");
                    *t = value::not(*t)?;
                }
                Op::Add => self.binary_add()?,
                Op::Subtract => self.binary_op(value::sub)?,
                Op::Multiply => self.binary_op(value::mul)?,
                Op::Divide => self.binary_op(value::div)?,
                Op::IntDiv => self.binary_op(value::intdiv)?,
                Op::Eq => {
                    let r = self.pop_value();
                    let l = self.top();
                    *self.stack.last_mut().expect("operand stack underflow") =
                        Value::Bool(value::value_eq(l, r));
                }
                Op::Ne => {
                    let r = self.pop_value();
                    let l = self.top();
                    *self.stack.last_mut().expect("operand stack underflow") =
                        Value::Bool(!value::value_eq(l, r));
                }
                Op::Gt => self.compare_op(|o| matches!(o, Some(std::cmp::Ordering::Greater)))?,
                Op::Ge => self.compare_op(|o| {
                    matches!(o, Some(std::cmp::Ordering::Greater | std::cmp::Ordering::Equal))
                })?,
                Op::Lt => self.compare_op(|o| matches!(o, Some(std::cmp::Ordering::Less)))?,
                Op::Le => self.compare_op(|o| {
                    matches!(o, Some(std::cmp::Ordering::Less | std::cmp::Ordering::Equal))
                })?,
                Op::Constant => {
                    let idx = self.read_u16();
                    let v = match self.chunk().constant(idx) {
                        Constant::Int(i) => Value::Int(i),
                        Constant::Float(f) => Value::Float(f),
                    };
                    self.push(v)?;
                }
                Op::String => {
                    let idx = self.read_u16();
                    let id = self.const_string(idx);
                    self.push(Value::Str(id))?;
                }
                Op::Bool => {
                    let b = self.read_u8();
                    self.push(Value::Bool(b != 0))?;
                }
                Op::Tuple => {
                    let n = usize::from(self.read_u16());
                    let base = self.stack.len() - n;
                    let items: Box<[Value]> = self.stack[base..].into();
                    self.stack.truncate(base);
                    let id = self.heap.alloc_tuple(items);
                    self.push(Value::Tuple(id))?;
                }
                Op::Func => {
                    let index = self.read_u16();
                    let subr = SubrRef { chunk: self.current.chunk, index };
                    self.push(Value::Subr(subr))?;
                }
                Op::Class => {
                    let idx = self.read_u16();
                    let id = ClassId(
                        u32::try_from(self.chunk().class_idx_base() + usize::from(idx))
                            .expect("class pool exceeds u32 ids"),
                    );
                    self.push(Value::Class(id))?;
                }
                Op::Inherit => self.inherit()?,
                Op::LoadStack => {
                    let k = usize::from(self.read_u16());
                    let v = self.stack[self.stack.len() - 1 - k];
                    self.push(v)?;
                }
                Op::StoreStack => {
                    let k = usize::from(self.read_u16());
                    let v = self.top();
                    let len = self.stack.len();
                    self.stack[len - 1 - k] = v;
                }
                Op::LoadStatic => {
                    let slot = usize::from(self.read_u16());
                    let v = self.static_values[self.chunk().static_value_idx_base() + slot];
                    self.push(v)?;
                }
                Op::StoreStatic => {
                    let slot = usize::from(self.read_u16());
                    let v = self.top();
                    let base = self.chunk().static_value_idx_base();
                    self.static_values[base + slot] = v;
                }
                Op::Jump => {
                    let offset = self.read_i16();
                    self.apply_jump(offset);
                    if offset < 0 {
                        self.collect_garbage();
                    }
                }
                Op::JumpIfTrue => {
                    let offset = self.read_i16();
                    if self.pop_value().is_truthy() {
                        self.apply_jump(offset);
                    }
                    if offset < 0 {
                        self.collect_garbage();
                    }
                }
                Op::JumpIfFalse => {
                    let offset = self.read_i16();
                    if !self.pop_value().is_truthy() {
                        self.apply_jump(offset);
                    }
                    if offset < 0 {
                        self.collect_garbage();
                    }
                }
                Op::JumpIfTrueNoPop => {
                    let offset = self.read_i16();
                    if self.top().is_truthy() {
                        self.apply_jump(offset);
                    }
                }
                Op::JumpIfFalseNoPop => {
                    let offset = self.read_i16();
                    if !self.top().is_truthy() {
                        self.apply_jump(offset);
                    }
                }
                Op::Call => self.call()?,
                Op::SetProperty => {
                    let idx = self.read_u16();
                    let name = self.const_string(idx);
                    let receiver = self.pop_value();
                    let Value::Instance(instance) = receiver else {
                        return Err(RunError::value(format!(
                            "Value type error. Expected: INSTANCE, got: {}.",
                            receiver.type_name()
                        )));
                    };
                    let class = self.heap.instance(instance).class;
                    if self.classes[class.0 as usize].methods.contains_key(&name) {
                        return Err(RunError::value(
                            "Attempt to rewrite class method. This is not allowed",
                        ));
                    }
                    let v = self.top();
                    self.heap.instance_set_field(instance, name, v);
                }
                Op::GetProperty => {
                    let idx = self.read_u16();
                    let name = self.const_string(idx);
                    let receiver = self.top();
                    let result = self.get_property(receiver, name)?;
                    *self.stack.last_mut().expect("operand stack underflow") = result;
                }
                Op::GetSuperMethod => {
                    let idx = self.read_u16();
                    let name = self.const_string(idx);
                    let receiver = self.top();
                    let Value::Instance(instance) = receiver else {
                        return Err(RunError::value(format!(
                            "Value type error. Expected: INSTANCE, got: {}.",
                            receiver.type_name()
                        )));
                    };
                    let method = self.get_super_method(instance, name)?;
                    *self.stack.last_mut().expect("operand stack underflow") = method;
                }
                Op::Import => self.import()?,
                Op::Unpack => {
                    let n = usize::from(self.read_u16());
                    let v = self.pop_value();
                    let Value::Tuple(id) = v else {
                        return Err(RunError::value(format!(
                            "Value type error. Expected: TUPLE, got: {}.",
                            v.type_name()
                        )));
                    };
                    let len = self.heap.tuple(id).items.len();
                    if len != n {
                        return Err(RunError::internal(format!(
                            "Tuple size mismatch. Expect: {n}, got: {len}."
                        )));
                    }
                    for i in 0..len {
                        let e = self.heap.tuple(id).items[i];
                        self.push(e)?;
                    }
                }
            }
        }
    }

    fn apply_jump(&mut self, offset: i16) {
        let target = i64::try_from(self.ip).expect("instruction pointer exceeds i64") + i64::from(offset);
        self.ip = usize::try_from(target).expect("jump left the code span");
    }

    fn binary_op(&mut self, f: fn(Value, Value) -> RunResult<Value>) -> RunResult<()> {
        let r = self.pop_value();
        let l = self.top();
        *self.stack.last_mut().expect("operand stack underflow") = f(l, r)?;
        Ok(())
    }

    fn compare_op(&mut self, f: fn(Option<std::cmp::Ordering>) -> bool) -> RunResult<()> {
        let r = self.pop_value();
        let l = self.top();
        let ord = value::partial_cmp(l, r, &self.strings);
        *self.stack.last_mut().expect("operand stack underflow") = Value::Bool(f(ord));
        Ok(())
    }

    /// `+` is overloaded: string concatenation (through the intern pool),
    /// tuple concatenation, or numeric addition.
    fn binary_add(&mut self) -> RunResult<()> {
        let r = self.pop_value();
        let l = self.top();
        let result = match (l, r) {
            (Value::Str(a), Value::Str(b)) => Value::Str(self.strings.intern_concat(a, b)),
            (Value::Tuple(_), _) | (_, Value::Tuple(_)) => {
                let mut items: Vec<Value> = Vec::new();
                match l {
                    Value::Tuple(a) => items.extend_from_slice(&self.heap.tuple(a).items),
                    other => items.push(other),
                }
                match r {
                    Value::Tuple(b) => items.extend_from_slice(&self.heap.tuple(b).items),
                    other => items.push(other),
                }
                Value::Tuple(self.heap.alloc_tuple(items.into_boxed_slice()))
            }
            _ => value::add(l, r)?,
        };
        *self.stack.last_mut().expect("operand stack underflow") = result;
        Ok(())
    }

    fn inherit(&mut self) -> RunResult<()> {
        let base = self.pop_value();
        let derived = self.top();
        let (Value::Class(derived), Value::Class(base)) = (derived, base) else {
            return Err(RunError::value("Value is not a class."));
        };
        let base_methods: Vec<(StrId, MethodEntry)> = self.classes[base.0 as usize]
            .methods
            .iter()
            .map(|(k, v)| (*k, *v))
            .collect();
        let derived_obj = &mut self.classes[derived.0 as usize];
        derived_obj.superclass = Some(base);
        for (name, mut entry) in base_methods {
            entry.super_level = entry
                .super_level
                .checked_add(1)
                .ok_or_else(|| RunError::internal("Inheritance chain too deep."))?;
            // an existing method with the same name shadows the base one
            derived_obj.methods.entry(name).or_insert(entry);
        }
        Ok(())
    }

    fn get_property(&mut self, receiver: Value, name: StrId) -> RunResult<Value> {
        match receiver {
            Value::Instance(instance) => {
                let class = self.heap.instance(instance).class;
                if let Some(entry) = self.classes[class.0 as usize].methods.get(&name) {
                    return Ok(Value::Method(BoundMethod {
                        instance,
                        subr: entry.subr,
                        super_level: u16::from(entry.super_level),
                    }));
                }
                // missing fields read as nil
                Ok(self
                    .heap
                    .instance(instance)
                    .fields
                    .get(&name)
                    .copied()
                    .unwrap_or(Value::Nil))
            }
            Value::Dict(id) => Ok(self
                .heap
                .dict(id)
                .entries
                .get(&DictKey::Str(name))
                .copied()
                .unwrap_or(Value::Nil)),
            other => Err(RunError::value(format!(
                "Value type error. Expected: INSTANCE, DICT, got: {}.",
                other.type_name()
            ))),
        }
    }

    /// Resolves `super.name` for the receiver: walk `current_super_level`
    /// layers past the receiver's class, then bind with the combined depth
    /// so nested super-calls keep climbing.
    fn get_super_method(&mut self, instance: InstanceId, name: StrId) -> RunResult<Value> {
        let class = self.heap.instance(instance).class;
        let mut super_class = self.classes[class.0 as usize]
            .superclass
            .ok_or_else(|| RunError::internal("No superclass to dispatch to."))?;
        for _ in 0..self.current_super_level {
            super_class = self.classes[super_class.0 as usize]
                .superclass
                .ok_or_else(|| RunError::internal("No superclass to dispatch to."))?;
        }
        match self.classes[super_class.0 as usize].methods.get(&name) {
            Some(entry) => Ok(Value::Method(BoundMethod {
                instance,
                subr: entry.subr,
                super_level: self.current_super_level + u16::from(entry.super_level) + 1,
            })),
            None => Err(RunError::value(format!(
                "Super class has no method with name `{}'",
                self.strings.get_lossy(name)
            ))),
        }
    }

    fn call(&mut self) -> RunResult<()> {
        let num_args = self.read_u16();
        let callee = self.pop_value();
        match callee {
            Value::Subr(subr) => {
                self.push_frame(num_args)?;
                let arity = self.subroutine(subr).arity();
                if arity != u32::from(num_args) {
                    return Err(RunError::internal(format!(
                        "Wrong number of function parameters. Expect: {arity}, got: {num_args}."
                    )));
                }
                self.jump_to(subr);
            }
            Value::HostFn(f) => {
                let argc = usize::from(num_args);
                let base = self.stack.len() - argc;
                let mut args: SmallVec<[Value; 8]> = SmallVec::from_slice(&self.stack[base..]);
                // the originals stay on the stack as GC roots during the call
                let result = f(self, &mut args)?;
                self.stack.truncate(base);
                self.push(result)?;
            }
            Value::Method(m) => {
                self.push_frame(num_args)?;
                self.current_super_level = m.super_level;
                self.push(Value::Instance(m.instance))?; // `this'
                let arity = self.subroutine(m.subr).arity();
                if arity != u32::from(num_args) {
                    return Err(RunError::internal(format!(
                        "Wrong number of function parameters. Expect: {arity}, got: {num_args}."
                    )));
                }
                self.jump_to(m.subr);
            }
            Value::Class(class) => {
                let instance = self.heap.alloc_instance(class);
                let init = self.classes[class.0 as usize].methods.get(&self.init_str).copied();
                match init {
                    Some(entry) => {
                        self.push_frame(num_args)?;
                        self.current_super_level = u16::from(entry.super_level);
                        self.push(Value::Instance(instance))?; // `this'
                        let arity = self.subroutine(entry.subr).arity();
                        if arity != u32::from(num_args) {
                            return Err(RunError::internal(format!(
                                "Wrong number of function parameters. Expect: {arity}, got: {num_args}."
                            )));
                        }
                        self.jump_to(entry.subr);
                    }
                    None => {
                        if num_args != 0 {
                            return Err(RunError::internal(format!(
                                "Wrong number of function parameters. Expect: 0, got: {num_args}."
                            )));
                        }
                        self.push(Value::Instance(instance))?;
                    }
                }
            }
            Value::Nil => return Err(RunError::value("Value of type NIL is not callable.")),
            other => {
                return Err(RunError::value(format!(
                    "Value of type {} is not callable.",
                    other.type_name()
                )));
            }
        }
        Ok(())
    }

    // === imports ===

    fn import(&mut self) -> RunResult<()> {
        let path_len = usize::from(self.read_u16());
        debug_assert!(path_len >= 1);
        let base = self.stack.len() - path_len;
        let mut parts: Vec<String> = Vec::with_capacity(path_len);
        for v in &self.stack[base..] {
            let Value::Str(id) = v else {
                return Err(RunError::value(format!(
                    "Value type error. Expected: STR, got: {}.",
                    v.type_name()
                )));
            };
            parts.push(self.strings.get_lossy(*id).into_owned());
        }
        self.stack.truncate(base);
        let dict = self.import_lib(&parts)?;
        self.push(Value::Dict(dict))
    }

    fn import_lib(&mut self, parts: &[String]) -> RunResult<crate::heap::DictId> {
        let combined = parts.join(".");
        if let Some(lib) = self.libs.get(&combined).cloned() {
            // an internal lib materializes a fresh dict on every import
            let dict = self.heap.alloc_dict();
            for (name, lib_value) in lib {
                let key = DictKey::Str(self.strings.intern(name.as_bytes()));
                let v = self.materialize(lib_value);
                self.heap.dict_set(dict, key, v);
            }
            return Ok(dict);
        }

        // an external module, compiled and executed on first import
        let file = self.find_lib(parts)?;
        let canonical = std::fs::canonicalize(&file).unwrap_or_else(|_| file.clone());
        if let Some(&cached) = self.module_cache.get(&canonical) {
            return Ok(cached);
        }
        let binary = crate::compile::compile_file(&file)
            .map_err(|_| RunError::internal(format!("Failed to load file: {}.", file.display())))?;
        let chunk_idx = self.load_binary(&binary).map_err(|e| RunError::internal(e.0))?;
        tracing::debug!(path = %file.display(), "loading module");
        self.push_frame(0)?;
        self.jump_to(SubrRef { chunk: chunk_idx, index: 0 });
        self.run_loop()?;
        let dict = self.gen_export_dict();
        self.pop_frame();
        self.module_cache.insert(canonical, dict);
        Ok(dict)
    }

    fn materialize(&mut self, v: LibValue) -> Value {
        match v {
            LibValue::Nil => Value::Nil,
            LibValue::Bool(b) => Value::Bool(b),
            LibValue::Int(i) => Value::Int(i),
            LibValue::Float(f) => Value::Float(f),
            LibValue::Str(s) => Value::Str(self.strings.intern(s.as_bytes())),
            LibValue::Fn(f) => Value::HostFn(f),
        }
    }

    /// Builds the import result for the chunk that just finished running:
    /// each exported name mapped to its static slot's current value.
    fn gen_export_dict(&mut self) -> crate::heap::DictId {
        let chunk = self.chunk();
        let string_base = chunk.const_string_idx_base();
        let static_base = chunk.static_value_idx_base();
        let exports: Vec<(StrId, Value)> = chunk
            .export_list()
            .iter()
            .map(|&(name_idx, value_idx)| {
                (
                    self.const_strings[string_base + usize::from(name_idx)],
                    self.static_values[static_base + usize::from(value_idx)],
                )
            })
            .collect();
        let dict = self.heap.alloc_dict();
        for (name, value) in exports {
            self.heap.dict_set(dict, DictKey::Str(name), value);
        }
        dict
    }

    /// Searches for `a/b/c.fox` relative to the importing chunk's source
    /// path, the working directory, and the executable's directory.
    fn find_lib(&self, parts: &[String]) -> RunResult<PathBuf> {
        let mut rel = PathBuf::new();
        for p in parts {
            rel.push(p);
        }
        rel.set_extension("fox");

        let chunk_dir = Path::new(self.chunk().source_path()).parent().map(Path::to_path_buf);
        let cwd = std::env::current_dir().ok();
        let exe_dir = std::env::current_exe()
            .ok()
            .and_then(|p| p.parent().map(Path::to_path_buf));
        for dir in [chunk_dir, cwd, exe_dir].into_iter().flatten() {
            let candidate = dir.join(&rel);
            if candidate.is_file() {
                return Ok(candidate);
            }
        }
        Err(RunError::internal(format!("Failed to find file: {}.", rel.display())))
    }
}
