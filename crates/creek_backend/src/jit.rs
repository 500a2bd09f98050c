//! Compilation units, symbol resolution, and native entry points.
//!
//! A single [`JITModule`] backs every unit, so a call that crosses unit
//! boundaries is satisfied by ordinary relocation; the unit list on top of
//! it decides what a script name resolves to.

use std::collections::HashMap;
use std::ffi::{c_char, CStr};
use std::fmt;
use std::mem;

use cranelift::codegen::ir::types::{F64, I64, I8};
use cranelift::codegen::ir::{self, AbiParam, Signature};
use cranelift::codegen::isa::TargetIsa;
use cranelift::codegen::Context;
use cranelift_jit::{JITBuilder, JITModule};
use cranelift_module::{DataDescription, DataId, FuncId, Linkage, Module};

use creek_ir::ast::Prototype;
use creek_ir::Type;

use crate::BackendResult;

/// A named function known to the resolver.
pub struct FunctionEntry {
    pub id: FuncId,
    pub proto: Prototype,
    /// Whether a body has been attached. A bare `extern` declaration stays
    /// undefined until (unless) a definition reuses it.
    pub defined: bool,
}

/// One incrementally-compiled group of functions. A sealed unit no longer
/// accepts declarations; its code has been handed to the native layer.
#[derive(Default)]
pub struct Unit {
    functions: HashMap<String, FunctionEntry>,
    sealed: bool,
}

impl Unit {
    pub fn is_sealed(&self) -> bool {
        self.sealed
    }

    /// Names declared in this unit.
    pub fn function_names(&self) -> impl Iterator<Item = &str> {
        self.functions.keys().map(String::as_str)
    }
}

/// A primitive value returned from JIT-compiled code.
#[derive(Debug, Clone, PartialEq)]
pub enum ExecValue {
    Int(i64),
    Float(f64),
    Bool(bool),
    Str(String),
    Void,
}

impl fmt::Display for ExecValue {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ExecValue::Int(value) => write!(f, "{value}"),
            ExecValue::Float(value) => write!(f, "{value}"),
            ExecValue::Bool(value) => write!(f, "{value}"),
            ExecValue::Str(value) => write!(f, "{value}"),
            ExecValue::Void => f.write_str("void"),
        }
    }
}

pub struct Jit {
    module: JITModule,
    units: Vec<Unit>,
    /// How many times each script name has been declared. The first
    /// declaration keeps its plain name, so an `extern` can fall through to
    /// a process symbol (the libm/libc case); any redeclaration after a
    /// discarded failure gets a uniquifying suffix, since the native layer
    /// merges declarations by name and would reject a changed signature.
    symbol_counts: HashMap<String, u32>,
}

impl Jit {
    pub fn new() -> BackendResult<Self> {
        let builder = JITBuilder::new(cranelift_module::default_libcall_names())?;

        Ok(Self {
            module: JITModule::new(builder),
            units: vec![],
            symbol_counts: HashMap::new(),
        })
    }

    /// Finds a function by name: the open unit first, then sealed units
    /// newest-first.
    pub fn resolve(&self, name: &str) -> Option<&FunctionEntry> {
        self.units
            .iter()
            .rev()
            .find_map(|unit| unit.functions.get(name))
    }

    pub fn units(&self) -> impl Iterator<Item = &Unit> {
        self.units.iter()
    }

    /// Declares a named function into the open unit, opening one if needed.
    pub fn declare_function(&mut self, proto: &Prototype) -> BackendResult<FuncId> {
        let sig = self.signature(proto);

        let count = self.symbol_counts.entry(proto.name.clone()).or_insert(0);
        let symbol = if *count == 0 {
            proto.name.clone()
        } else {
            format!("{}.{count}", proto.name)
        };
        *count += 1;

        let id = self.module.declare_function(&symbol, Linkage::Export, &sig)?;

        self.open_unit().functions.insert(
            proto.name.clone(),
            FunctionEntry {
                id,
                proto: proto.clone(),
                defined: false,
            },
        );

        Ok(id)
    }

    /// Declares a function that is never resolvable by name; used for the
    /// wrappers around bare top-level expressions.
    pub fn declare_anonymous(&mut self, sig: &Signature) -> BackendResult<FuncId> {
        // an anonymous wrapper still belongs to a unit, it just has no name
        self.open_unit();
        Ok(self.module.declare_anonymous_function(sig)?)
    }

    pub fn define_function(&mut self, id: FuncId, ctx: &mut Context) -> BackendResult<()> {
        self.module.define_function(id, ctx)?;
        Ok(())
    }

    pub fn mark_defined(&mut self, name: &str) {
        for unit in self.units.iter_mut().rev() {
            if let Some(entry) = unit.functions.get_mut(name) {
                entry.defined = true;
                return;
            }
        }
    }

    /// Drops a name from the resolver entirely; a failed definition leaves
    /// nothing behind, not even the declaration it reused.
    pub fn remove(&mut self, name: &str) {
        for unit in self.units.iter_mut().rev() {
            if unit.functions.remove(name).is_some() {
                return;
            }
        }
    }

    /// Seals the open unit: everything defined so far is compiled to native
    /// code and the next declaration will open a fresh unit.
    pub fn seal(&mut self) -> BackendResult<()> {
        self.module.finalize_definitions()?;
        if let Some(unit) = self.units.last_mut() {
            unit.sealed = true;
        }
        Ok(())
    }

    /// Executes a finished zero-argument function and returns its value.
    /// Seals the open unit first so the entry point exists.
    pub fn invoke(&mut self, id: FuncId, ret: Type) -> BackendResult<ExecValue> {
        self.seal()?;

        let code = self.module.get_finalized_function(id);

        // The signature of `id` was built from `ret` by codegen, so the
        // transmuted pointer matches the native calling convention.
        let value = unsafe {
            match ret {
                Type::I64 => ExecValue::Int(mem::transmute::<*const u8, extern "C" fn() -> i64>(
                    code,
                )()),
                Type::F64 => ExecValue::Float(mem::transmute::<*const u8, extern "C" fn() -> f64>(
                    code,
                )()),
                Type::Bool => ExecValue::Bool(
                    mem::transmute::<*const u8, extern "C" fn() -> i8>(code)() != 0,
                ),
                Type::Str => {
                    let ptr = mem::transmute::<*const u8, extern "C" fn() -> *const c_char>(code)();
                    ExecValue::Str(CStr::from_ptr(ptr).to_string_lossy().into_owned())
                }
                Type::Void => {
                    mem::transmute::<*const u8, extern "C" fn()>(code)();
                    ExecValue::Void
                }
            }
        };

        Ok(value)
    }

    /// Defines a null-terminated, read-only byte buffer for a string
    /// literal.
    pub fn string_constant(&mut self, text: &str) -> BackendResult<DataId> {
        let mut contents = text.as_bytes().to_vec();
        contents.push(0);

        let mut data = DataDescription::new();
        data.define(contents.into_boxed_slice());

        let id = self.module.declare_anonymous_data(false, false)?;
        self.module.define_data(id, &data)?;
        Ok(id)
    }

    /// Builds the native signature for a prototype.
    pub fn signature(&self, proto: &Prototype) -> Signature {
        let mut sig = self.module.make_signature();
        for param in &proto.params {
            if let Some(ty) = self.value_type(param.ty) {
                sig.params.push(AbiParam::new(ty));
            }
        }
        if let Some(ret) = self.value_type(proto.ret) {
            sig.returns.push(AbiParam::new(ret));
        }
        sig
    }

    /// The native value type carrying a script type; `None` for void.
    pub fn value_type(&self, ty: Type) -> Option<ir::Type> {
        match ty {
            Type::I64 => Some(I64),
            Type::F64 => Some(F64),
            Type::Bool => Some(I8),
            Type::Str => Some(self.module.target_config().pointer_type()),
            Type::Void => None,
        }
    }

    pub fn make_context(&self) -> Context {
        self.module.make_context()
    }

    pub fn clear_context(&self, ctx: &mut Context) {
        self.module.clear_context(ctx);
    }

    pub fn func_ref(&mut self, id: FuncId, func: &mut ir::Function) -> ir::FuncRef {
        self.module.declare_func_in_func(id, func)
    }

    pub fn data_ref(&mut self, id: DataId, func: &mut ir::Function) -> ir::GlobalValue {
        self.module.declare_data_in_func(id, func)
    }

    pub fn pointer_type(&self) -> ir::Type {
        self.module.target_config().pointer_type()
    }

    pub fn isa(&self) -> &dyn TargetIsa {
        self.module.isa()
    }

    fn open_unit(&mut self) -> &mut Unit {
        match self.units.last() {
            Some(unit) if !unit.sealed => {}
            _ => self.units.push(Unit::default()),
        }

        let open = self.units.len() - 1;
        &mut self.units[open]
    }
}
