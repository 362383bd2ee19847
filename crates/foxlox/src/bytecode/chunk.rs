//! The compiled module: subroutines, tables, exports, and the big-endian
//! binary serialization with its magic header.

use smallvec::SmallVec;

use crate::bytecode::op::Op;
use crate::error::ChunkError;

/// The 8-byte magic prefix of a serialized module.
pub(crate) const BINARY_HEADER: [u8; 8] = [0x04, 0x02, b'F', b'O', b'X', b'L', b'O', b'X'];

/// Reference to a subroutine: owning chunk index in the VM + index within
/// the chunk's subroutine table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubrRef {
    pub(crate) chunk: u16,
    pub(crate) index: u16,
}

/// A numeric constant in a chunk's constant table.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) enum Constant {
    Int(i64),
    Float(f64),
}

/// Maps byte offsets to source lines: a sorted list of
/// (first-byte-offset, line) pairs with equal consecutive lines collapsed.
#[derive(Debug, Clone, Default)]
pub(crate) struct LineInfo {
    lines: Vec<(usize, i32)>,
}

impl LineInfo {
    fn add_line(&mut self, code_index: usize, line: i32) {
        if let Some(&(_, last)) = self.lines.last()
            && last == line
        {
            return;
        }
        self.lines.push((code_index, line));
    }

    /// The line attached to the largest recorded offset <= `code_index`.
    pub(crate) fn get_line(&self, code_index: usize) -> i32 {
        let mut last = self.lines.first().map_or(0, |&(_, l)| l);
        for &(idx, line) in &self.lines {
            if idx > code_index {
                return last;
            }
            last = line;
        }
        last
    }
}

/// A compiled function body.
#[derive(Debug)]
pub(crate) struct Subroutine {
    arity: u32,
    code: Vec<u8>,
    /// Diagnostic name, `source:function`.
    name: String,
    lines: LineInfo,
    /// Static slots this subroutine reads or writes; GC marking roots.
    referenced_statics: SmallVec<[u16; 4]>,
    /// GC mark bit; runtime-only.
    pub(crate) mark: bool,
}

impl Subroutine {
    fn new(name: impl Into<String>, arity: u32) -> Self {
        Self {
            arity,
            code: Vec::new(),
            name: name.into(),
            lines: LineInfo::default(),
            referenced_statics: SmallVec::new(),
            mark: false,
        }
    }

    pub(crate) fn arity(&self) -> u32 {
        self.arity
    }

    pub(crate) fn code(&self) -> &[u8] {
        &self.code
    }

    pub(crate) fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn line_of(&self, code_index: usize) -> i32 {
        self.lines.get_line(code_index)
    }

    pub(crate) fn referenced_statics(&self) -> &[u16] {
        &self.referenced_statics
    }

    pub(crate) fn add_referenced_static(&mut self, slot: u16) {
        if !self.referenced_statics.contains(&slot) {
            self.referenced_statics.push(slot);
        }
    }

    pub(crate) fn code_len(&self) -> usize {
        self.code.len()
    }

    pub(crate) fn add_op(&mut self, op: Op, line: i32) {
        self.lines.add_line(self.code.len(), line);
        self.code.push(op as u8);
    }

    pub(crate) fn add_u8(&mut self, v: u8, line: i32) {
        self.lines.add_line(self.code.len(), line);
        self.code.push(v);
    }

    pub(crate) fn add_u16(&mut self, v: u16, line: i32) {
        self.lines.add_line(self.code.len(), line);
        self.code.extend_from_slice(&v.to_be_bytes());
    }

    pub(crate) fn add_i16(&mut self, v: i16, line: i32) {
        self.add_u16(v.cast_unsigned(), line);
    }

    pub(crate) fn edit_i16(&mut self, idx: usize, v: i16) {
        let bytes = v.to_be_bytes();
        self.code[idx] = bytes[0];
        self.code[idx + 1] = bytes[1];
    }
}

/// A compile-time class descriptor: name plus
/// (method-name-index, subroutine-index) pairs.
#[derive(Debug, Clone)]
pub(crate) struct CompiletimeClass {
    name: String,
    methods: Vec<(u16, u16)>,
}

impl CompiletimeClass {
    pub(crate) fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), methods: Vec::new() }
    }

    pub(crate) fn add_method(&mut self, name_idx: u16, subroutine_idx: u16) {
        self.methods.push((name_idx, subroutine_idx));
    }

    pub(crate) fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn methods(&self) -> &[(u16, u16)] {
        &self.methods
    }
}

/// A compiled module. Subroutine 0 is the top-level script body.
#[derive(Debug, Default)]
pub(crate) struct Chunk {
    source_path: String,
    /// One entry per source line, for error reporting.
    source: Vec<String>,
    subroutines: Vec<Subroutine>,
    classes: Vec<CompiletimeClass>,
    export_list: Vec<(u16, u16)>,
    constants: Vec<Constant>,
    const_strings: Vec<Box<[u8]>>,
    static_value_num: u16,
    // Cross-module bases into the VM-global pools, set at load time.
    static_value_idx_base: usize,
    class_idx_base: usize,
    const_string_idx_base: usize,
}

impl Chunk {
    pub(crate) fn add_constant(&mut self, v: Constant) -> Result<u16, ChunkError> {
        self.constants.push(v);
        u16::try_from(self.constants.len() - 1)
            .map_err(|_| ChunkError("Too many constants. Chunk constant table is full."))
    }

    pub(crate) fn add_subroutine(&mut self, name: &str, arity: u32) -> Result<u16, ChunkError> {
        self.subroutines.push(Subroutine::new(name, arity));
        u16::try_from(self.subroutines.len() - 1)
            .map_err(|_| ChunkError("Too many subroutines. Chunk subroutine table is full."))
    }

    /// Adds a string to the const-string table, deduplicating equal content.
    pub(crate) fn add_string(&mut self, s: &[u8]) -> Result<u16, ChunkError> {
        if let Some(found) = self.const_strings.iter().position(|e| e.as_ref() == s) {
            return Ok(u16::try_from(found).expect("table grew past its insert-time check"));
        }
        self.const_strings.push(s.into());
        u16::try_from(self.const_strings.len() - 1)
            .map_err(|_| ChunkError("Too many strings. Chunk string table is full."))
    }

    pub(crate) fn add_static_value(&mut self) -> Result<u16, ChunkError> {
        let idx = self.static_value_num;
        self.static_value_num = self
            .static_value_num
            .checked_add(1)
            .ok_or(ChunkError("Too many static values. Chunk static table is full."))?;
        Ok(idx)
    }

    pub(crate) fn add_class(&mut self, class: CompiletimeClass) -> Result<u16, ChunkError> {
        self.classes.push(class);
        u16::try_from(self.classes.len() - 1)
            .map_err(|_| ChunkError("Too many classes. Chunk class table is full."))
    }

    pub(crate) fn add_export(&mut self, name: &[u8], value_idx: u16) -> Result<(), ChunkError> {
        let name_idx = self.add_string(name)?;
        self.export_list.push((name_idx, value_idx));
        Ok(())
    }

    pub(crate) fn set_source(&mut self, source: Vec<String>) {
        self.source = source;
    }

    pub(crate) fn set_source_path(&mut self, path: impl Into<String>) {
        self.source_path = path.into();
    }

    pub(crate) fn source_path(&self) -> &str {
        &self.source_path
    }

    /// Source text of a 1-based line, for error reports.
    pub(crate) fn source_line(&self, line: i32) -> &str {
        if line <= -1 {
            return "<EOF>";
        }
        if line == 0 {
            return "<RUNTIME>";
        }
        self.source.get(line as usize - 1).map_or("", String::as_str)
    }

    pub(crate) fn subroutine(&self, idx: u16) -> &Subroutine {
        &self.subroutines[idx as usize]
    }

    pub(crate) fn subroutine_mut(&mut self, idx: u16) -> &mut Subroutine {
        &mut self.subroutines[idx as usize]
    }

    pub(crate) fn subroutines_mut(&mut self) -> &mut [Subroutine] {
        &mut self.subroutines
    }

    pub(crate) fn constant(&self, idx: u16) -> Constant {
        self.constants[idx as usize]
    }

    pub(crate) fn const_strings(&self) -> &[Box<[u8]>] {
        &self.const_strings
    }

    pub(crate) fn classes(&self) -> &[CompiletimeClass] {
        &self.classes
    }

    pub(crate) fn export_list(&self) -> &[(u16, u16)] {
        &self.export_list
    }

    pub(crate) fn static_value_num(&self) -> u16 {
        self.static_value_num
    }

    pub(crate) fn static_value_idx_base(&self) -> usize {
        self.static_value_idx_base
    }

    pub(crate) fn class_idx_base(&self) -> usize {
        self.class_idx_base
    }

    pub(crate) fn const_string_idx_base(&self) -> usize {
        self.const_string_idx_base
    }

    pub(crate) fn set_bases(&mut self, static_base: usize, class_base: usize, string_base: usize) {
        self.static_value_idx_base = static_base;
        self.class_idx_base = class_base;
        self.const_string_idx_base = string_base;
    }

    // === serialization ===

    /// Serializes the chunk, magic header included.
    pub(crate) fn dump(&self) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(&BINARY_HEADER);
        dump_str(&mut out, self.source_path.as_bytes());
        dump_i64(&mut out, self.source.len() as i64);
        for line in &self.source {
            dump_str(&mut out, line.as_bytes());
        }
        dump_i64(&mut out, self.subroutines.len() as i64);
        for sub in &self.subroutines {
            sub.dump(&mut out);
        }
        dump_i64(&mut out, self.classes.len() as i64);
        for class in &self.classes {
            dump_str(&mut out, class.name.as_bytes());
            dump_i64(&mut out, class.methods.len() as i64);
            for &(name_idx, func_idx) in &class.methods {
                dump_u16(&mut out, name_idx);
                dump_u16(&mut out, func_idx);
            }
        }
        dump_i64(&mut out, self.export_list.len() as i64);
        for &(name_idx, value_idx) in &self.export_list {
            dump_u16(&mut out, name_idx);
            dump_u16(&mut out, value_idx);
        }
        dump_i64(&mut out, self.constants.len() as i64);
        for c in &self.constants {
            match c {
                Constant::Int(i) => {
                    out.push(0);
                    dump_i64(&mut out, *i);
                }
                Constant::Float(f) => {
                    out.push(1);
                    out.extend_from_slice(&f.to_bits().to_be_bytes());
                }
            }
        }
        dump_i64(&mut out, self.const_strings.len() as i64);
        for s in &self.const_strings {
            dump_str(&mut out, s);
        }
        dump_u16(&mut out, self.static_value_num);
        out
    }

    /// Deserializes a chunk; `data` must start with the magic header.
    pub(crate) fn load(data: &[u8]) -> Result<Self, ChunkError> {
        const WRONG: ChunkError = ChunkError("Wrong binary format.");
        if data.len() < BINARY_HEADER.len() || data[..BINARY_HEADER.len()] != BINARY_HEADER {
            return Err(WRONG);
        }
        let mut r = Reader { data, pos: BINARY_HEADER.len() };
        let mut chunk = Self {
            source_path: String::from_utf8(r.read_str()?.to_vec()).map_err(|_| WRONG)?,
            ..Self::default()
        };
        let n_lines = r.read_i64()?;
        for _ in 0..n_lines {
            let line = String::from_utf8(r.read_str()?.to_vec()).map_err(|_| WRONG)?;
            chunk.source.push(line);
        }
        let n_subs = r.read_i64()?;
        for _ in 0..n_subs {
            chunk.subroutines.push(Subroutine::load(&mut r)?);
        }
        let n_classes = r.read_i64()?;
        for _ in 0..n_classes {
            let name = String::from_utf8(r.read_str()?.to_vec()).map_err(|_| WRONG)?;
            let mut class = CompiletimeClass::new(name);
            let n_methods = r.read_i64()?;
            for _ in 0..n_methods {
                let name_idx = r.read_u16()?;
                let func_idx = r.read_u16()?;
                class.add_method(name_idx, func_idx);
            }
            chunk.classes.push(class);
        }
        let n_exports = r.read_i64()?;
        for _ in 0..n_exports {
            let name_idx = r.read_u16()?;
            let value_idx = r.read_u16()?;
            chunk.export_list.push((name_idx, value_idx));
        }
        let n_consts = r.read_i64()?;
        for _ in 0..n_consts {
            match r.read_u8()? {
                0 => chunk.constants.push(Constant::Int(r.read_i64()?)),
                1 => chunk.constants.push(Constant::Float(f64::from_bits(r.read_u64()?))),
                _ => return Err(WRONG),
            }
        }
        let n_strings = r.read_i64()?;
        for _ in 0..n_strings {
            chunk.const_strings.push(r.read_str()?.into());
        }
        chunk.static_value_num = r.read_u16()?;
        Ok(chunk)
    }
}

impl Subroutine {
    fn dump(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.arity.cast_signed().to_be_bytes());
        dump_i64(out, self.code.len() as i64);
        out.extend_from_slice(&self.code);
        dump_str(out, self.name.as_bytes());
        dump_i64(out, self.lines.lines.len() as i64);
        for &(code_index, line) in &self.lines.lines {
            dump_i64(out, code_index as i64);
            out.extend_from_slice(&line.to_be_bytes());
        }
        dump_i64(out, self.referenced_statics.len() as i64);
        for &slot in &self.referenced_statics {
            dump_u16(out, slot);
        }
    }

    fn load(r: &mut Reader<'_>) -> Result<Self, ChunkError> {
        const WRONG: ChunkError = ChunkError("Wrong binary format.");
        let arity = r.read_i32()?.cast_unsigned();
        let code_len = usize::try_from(r.read_i64()?).map_err(|_| WRONG)?;
        let code = r.read_bytes(code_len)?.to_vec();
        let name = String::from_utf8(r.read_str()?.to_vec()).map_err(|_| WRONG)?;
        let mut sub = Self::new(name, arity);
        sub.code = code;
        let n_lines = r.read_i64()?;
        for _ in 0..n_lines {
            let code_index = usize::try_from(r.read_i64()?).map_err(|_| WRONG)?;
            let line = r.read_i32()?;
            sub.lines.lines.push((code_index, line));
        }
        let n_refs = r.read_i64()?;
        for _ in 0..n_refs {
            sub.referenced_statics.push(r.read_u16()?);
        }
        Ok(sub)
    }
}

fn dump_i64(out: &mut Vec<u8>, v: i64) {
    out.extend_from_slice(&v.to_be_bytes());
}

fn dump_u16(out: &mut Vec<u8>, v: u16) {
    out.extend_from_slice(&v.to_be_bytes());
}

/// `str` on the wire: i64 length followed by the bytes.
fn dump_str(out: &mut Vec<u8>, s: &[u8]) {
    dump_i64(out, s.len() as i64);
    out.extend_from_slice(s);
}

struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn read_bytes(&mut self, n: usize) -> Result<&'a [u8], ChunkError> {
        let end = self
            .pos
            .checked_add(n)
            .filter(|&e| e <= self.data.len())
            .ok_or(ChunkError("Wrong binary format."))?;
        let bytes = &self.data[self.pos..end];
        self.pos = end;
        Ok(bytes)
    }

    fn read_u8(&mut self) -> Result<u8, ChunkError> {
        Ok(self.read_bytes(1)?[0])
    }

    fn read_u16(&mut self) -> Result<u16, ChunkError> {
        let b = self.read_bytes(2)?;
        Ok(u16::from_be_bytes([b[0], b[1]]))
    }

    fn read_i32(&mut self) -> Result<i32, ChunkError> {
        let b = self.read_bytes(4)?;
        Ok(i32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn read_u64(&mut self) -> Result<u64, ChunkError> {
        let b = self.read_bytes(8)?;
        Ok(u64::from_be_bytes(b.try_into().expect("read_bytes returned 8 bytes")))
    }

    fn read_i64(&mut self) -> Result<i64, ChunkError> {
        Ok(self.read_u64()?.cast_signed())
    }

    fn read_str(&mut self) -> Result<&'a [u8], ChunkError> {
        let len = usize::try_from(self.read_i64()?).map_err(|_| ChunkError("Wrong binary format."))?;
        self.read_bytes(len)
    }
}
