//! Lowers parsed functions to native IR through the JIT's instruction
//! builder, applying the type checking and coercion rules on the way.

use std::collections::HashMap;

use cranelift::codegen::ir::condcodes::{FloatCC, IntCC};
use cranelift::codegen::ir::types::{F64, I64, I8};
use cranelift::codegen::ir::{self, AbiParam, InstBuilder, Value};
use cranelift::codegen::{self, verify_function};
use cranelift::frontend::{FunctionBuilder, FunctionBuilderContext};
use cranelift_module::FuncId;

use creek_ir::ast::{Expr, FunctionDef, Prototype};
use creek_ir::{BinOp, Type, UnOp};
use creek_session::diagnostics::{Diagnostic, IntoDiagnostic};

use crate::jit::Jit;
use crate::BackendError;

#[derive(thiserror::Error, Debug)]
pub enum CodegenError {
    #[error("unknown variable `{0}`")]
    UnknownVariable(String),

    #[error("unknown function `{0}`")]
    UnknownFunction(String),

    #[error("no implicit conversion between {lhs} and {rhs}")]
    NoImplicitConversion { lhs: Type, rhs: Type },

    #[error("cannot negate a value of type {0}")]
    CannotNegate(Type),

    #[error("argument count mismatch in call to `{callee}`: expected {expected}, found {found}")]
    CallArgCount {
        callee: String,
        expected: usize,
        found: usize,
    },

    #[error("argument {index} of call to `{callee}` has type {found}, expected {expected}")]
    CallArgType {
        callee: String,
        index: usize,
        expected: Type,
        found: Type,
    },

    #[error("redefinition of function `{0}`")]
    Redefinition(String),

    #[error("redefinition of function `{name}` with a different argument count: expected {expected}, found {found}")]
    RedefinitionArgCount {
        name: String,
        expected: usize,
        found: usize,
    },

    #[error("the branches of an `if` must return the same type: {then} vs {else_}")]
    BranchTypeMismatch { then: Type, else_: Type },

    #[error("`if` condition has type {0}, expected bool or a number")]
    BadConditionType(Type),

    #[error("return type mismatch in `{name}`: expected {expected}, found {found}")]
    ReturnTypeMismatch {
        name: String,
        expected: Type,
        found: Type,
    },

    /// A combination the closed type set should make unreachable; a logic
    /// bug, not a user mistake.
    #[error("internal error: {0}")]
    Internal(String),

    #[error(transparent)]
    Backend(#[from] BackendError),
}

impl IntoDiagnostic for CodegenError {
    fn into_diagnostic(self) -> Diagnostic {
        Diagnostic::error(self.to_string())
    }
}

pub type CodegenResult<T> = Result<T, CodegenError>;

/// A generated value paired with its script type. `value` is `None` exactly
/// when `ty` is void.
#[derive(Debug, Clone, Copy)]
struct TypedValue {
    ty: Type,
    value: Option<Value>,
}

impl TypedValue {
    const VOID: TypedValue = TypedValue {
        ty: Type::Void,
        value: None,
    };

    fn new(ty: Type, value: Value) -> Self {
        Self {
            ty,
            value: Some(value),
        }
    }

    fn expect_value(self) -> CodegenResult<Value> {
        self.value
            .ok_or_else(|| CodegenError::Internal("void value used where a value is required".to_owned()))
    }
}

pub struct Codegen {
    jit: Jit,
    ctx: codegen::Context,
    builder_ctx: FunctionBuilderContext,
    diagnostics: Vec<Diagnostic>,
}

impl Codegen {
    pub fn new() -> Result<Self, BackendError> {
        let jit = Jit::new()?;
        let ctx = jit.make_context();

        Ok(Self {
            jit,
            ctx,
            builder_ctx: FunctionBuilderContext::new(),
            diagnostics: vec![],
        })
    }

    pub fn jit(&self) -> &Jit {
        &self.jit
    }

    pub fn jit_mut(&mut self) -> &mut Jit {
        &mut self.jit
    }

    /// Warnings and verifier reports accumulated since the last call.
    pub fn take_diagnostics(&mut self) -> Vec<Diagnostic> {
        std::mem::take(&mut self.diagnostics)
    }

    /// Declares an `extern` prototype in the open unit, subject to the
    /// redefinition rules.
    pub fn gen_extern(&mut self, proto: &Prototype) -> CodegenResult<()> {
        self.declare_or_reuse(proto, false)?;
        Ok(())
    }

    /// Generates a named function definition.
    pub fn gen_definition(&mut self, def: &FunctionDef) -> CodegenResult<()> {
        self.gen_function(def)?;
        Ok(())
    }

    /// Generates the anonymous wrapper around a bare expression, returning
    /// the handle and result type the driver needs to execute it.
    pub fn gen_top_level(&mut self, def: &FunctionDef) -> CodegenResult<(FuncId, Type)> {
        self.gen_function(def)
    }

    /// Declares `proto`, or reuses an existing function of the same name.
    ///
    /// Reuse keeps the existing parameter types (they are what is physically
    /// in the IR) and rebinds the incoming parameter names over them.
    fn declare_or_reuse(
        &mut self,
        proto: &Prototype,
        with_body: bool,
    ) -> CodegenResult<(FuncId, Prototype)> {
        if let Some(existing) = self.jit.resolve(&proto.name) {
            if existing.defined && with_body {
                return Err(CodegenError::Redefinition(proto.name.clone()));
            }

            if existing.proto.params.len() != proto.params.len() {
                return Err(CodegenError::RedefinitionArgCount {
                    name: proto.name.clone(),
                    expected: existing.proto.params.len(),
                    found: proto.params.len(),
                });
            }

            let mut effective = existing.proto.clone();
            for (param, incoming) in effective.params.iter_mut().zip(&proto.params) {
                param.name.clone_from(&incoming.name);
            }

            return Ok((existing.id, effective));
        }

        let id = self.jit.declare_function(proto)?;
        Ok((id, proto.clone()))
    }

    fn gen_function(&mut self, def: &FunctionDef) -> CodegenResult<(FuncId, Type)> {
        let proto = &def.proto;
        let anonymous = proto.is_anonymous();

        let declared = if anonymous {
            None
        } else {
            Some(self.declare_or_reuse(proto, true)?)
        };

        self.jit.clear_context(&mut self.ctx);
        if let Some((_, bound)) = &declared {
            self.ctx.func.signature = self.jit.signature(bound);
        }

        let mut builder = FunctionBuilder::new(&mut self.ctx.func, &mut self.builder_ctx);

        let entry = builder.create_block();
        builder.append_block_params_for_function_params(entry);
        builder.switch_to_block(entry);
        builder.seal_block(entry); // no predecessors

        // Fresh symbol table per function; a duplicate parameter name
        // rebinds, so the last one wins.
        let mut symbols = HashMap::new();
        if let Some((_, bound)) = &declared {
            let values = builder.block_params(entry).to_vec();
            for (param, value) in bound.params.iter().zip(values) {
                symbols.insert(param.name.clone(), TypedValue::new(param.ty, value));
            }
        }

        let generated = FuncCodegen {
            jit: &mut self.jit,
            builder,
            symbols,
            diagnostics: &mut self.diagnostics,
        }
        .run(def);

        let ret = match generated {
            Ok(ret) => ret,
            Err(err) => {
                // no partial artifact survives a failed body
                if !anonymous {
                    self.jit.remove(&proto.name);
                }
                return Err(err);
            }
        };

        let label = if anonymous {
            "<top-level expression>"
        } else {
            proto.name.as_str()
        };

        // Structural verification is diagnostic-only; a failure here is a
        // compiler bug, not a script error.
        if let Err(errors) = verify_function(&self.ctx.func, self.jit.isa()) {
            self.diagnostics.push(Diagnostic::error(format!(
                "internal error: verifier rejected `{label}`: {errors}"
            )));
        }

        let id = match declared {
            Some((id, _)) => id,
            None => {
                let sig = self.ctx.func.signature.clone();
                self.jit.declare_anonymous(&sig)?
            }
        };

        if let Err(err) = self.jit.define_function(id, &mut self.ctx) {
            if !anonymous {
                self.jit.remove(&proto.name);
            }
            return Err(err.into());
        }

        if !anonymous {
            self.jit.mark_defined(&proto.name);
        }

        Ok((id, ret))
    }
}

struct FuncCodegen<'a> {
    jit: &'a mut Jit,
    builder: FunctionBuilder<'a>,
    symbols: HashMap<String, TypedValue>,
    diagnostics: &'a mut Vec<Diagnostic>,
}

impl FuncCodegen<'_> {
    /// Lowers the body, emits the return, and finalizes the function.
    /// Returns the function's actual return type.
    fn run(mut self, def: &FunctionDef) -> CodegenResult<Type> {
        let body = self.gen_expr(&def.body)?;

        if def.proto.is_anonymous() {
            // The wrapper takes its return type from the expression so the
            // driver can read the computed value back out.
            if let Some(value) = body.value {
                let clif = self.value_type(body.ty)?;
                self.builder.func.signature.returns.push(AbiParam::new(clif));
                self.builder.ins().return_(&[value]);
            } else {
                self.builder.ins().return_(&[]);
            }

            self.builder.finalize();
            return Ok(body.ty);
        }

        let name = &def.proto.name;
        match def.proto.ret {
            Type::Void => {
                if body.ty != Type::Void {
                    self.diagnostics.push(Diagnostic::warning(format!(
                        "value of type {} is ignored in void function `{name}`",
                        body.ty
                    )));
                }
                self.builder.ins().return_(&[]);
            }

            ret => {
                if body.ty != ret {
                    return Err(CodegenError::ReturnTypeMismatch {
                        name: name.clone(),
                        expected: ret,
                        found: body.ty,
                    });
                }

                let value = body.expect_value()?;
                self.builder.ins().return_(&[value]);
            }
        }

        self.builder.finalize();
        Ok(def.proto.ret)
    }

    fn gen_expr(&mut self, expr: &Expr) -> CodegenResult<TypedValue> {
        match expr {
            Expr::Int(value) => {
                let value = self.builder.ins().iconst(I64, *value);
                Ok(TypedValue::new(Type::I64, value))
            }

            Expr::Float(value) => {
                let value = self.builder.ins().f64const(*value);
                Ok(TypedValue::new(Type::F64, value))
            }

            Expr::Bool(value) => {
                let value = self.builder.ins().iconst(I8, i64::from(*value));
                Ok(TypedValue::new(Type::Bool, value))
            }

            Expr::Str(text) => {
                let data = self.jit.string_constant(text)?;
                let global = self.jit.data_ref(data, self.builder.func);
                let pointer_type = self.jit.pointer_type();
                let value = self.builder.ins().symbol_value(pointer_type, global);
                Ok(TypedValue::new(Type::Str, value))
            }

            Expr::Var(name) => self
                .symbols
                .get(name)
                .copied()
                .ok_or_else(|| CodegenError::UnknownVariable(name.clone())),

            Expr::Unary { op, operand } => self.gen_unary(*op, operand),

            Expr::Binary { op, lhs, rhs } => self.gen_binary(*op, lhs, rhs),

            Expr::Sequence { first, second } => {
                // the first value, if any, is deliberately discarded
                self.gen_expr(first)?;
                self.gen_expr(second)
            }

            Expr::Call { callee, args } => self.gen_call(callee, args),

            Expr::If { cond, then, else_ } => self.gen_if(cond, then, else_),

            Expr::Void => Ok(TypedValue::VOID),
        }
    }

    fn gen_unary(&mut self, op: UnOp, operand: &Expr) -> CodegenResult<TypedValue> {
        let operand = self.gen_expr(operand)?;

        match op {
            UnOp::Plus => Ok(operand),

            UnOp::Negate => {
                let value = match operand.ty {
                    Type::I64 => {
                        let value = operand.expect_value()?;
                        self.builder.ins().ineg(value)
                    }
                    Type::F64 => {
                        let value = operand.expect_value()?;
                        self.builder.ins().fneg(value)
                    }
                    ty => return Err(CodegenError::CannotNegate(ty)),
                };

                Ok(TypedValue::new(operand.ty, value))
            }
        }
    }

    fn gen_binary(&mut self, op: BinOp, lhs: &Expr, rhs: &Expr) -> CodegenResult<TypedValue> {
        let lhs = self.gen_expr(lhs)?;
        let rhs = self.gen_expr(rhs)?;

        let Some(operand_ty) = lhs.ty.unify(rhs.ty) else {
            return Err(CodegenError::NoImplicitConversion {
                lhs: lhs.ty,
                rhs: rhs.ty,
            });
        };

        let l = self.coerce(lhs, operand_ty)?;
        let r = self.coerce(rhs, operand_ty)?;

        let ins = self.builder.ins();
        let (ty, value) = match (op, operand_ty) {
            (BinOp::Add, Type::I64) => (Type::I64, ins.iadd(l, r)),
            (BinOp::Sub, Type::I64) => (Type::I64, ins.isub(l, r)),
            (BinOp::Mul, Type::I64) => (Type::I64, ins.imul(l, r)),
            (BinOp::Less, Type::I64) => (Type::Bool, ins.icmp(IntCC::SignedLessThan, l, r)),

            (BinOp::Add, Type::F64) => (Type::F64, ins.fadd(l, r)),
            (BinOp::Sub, Type::F64) => (Type::F64, ins.fsub(l, r)),
            (BinOp::Mul, Type::F64) => (Type::F64, ins.fmul(l, r)),
            // keeps the IEEE "unordered" behavior for NaN operands
            (BinOp::Less, Type::F64) => (Type::Bool, ins.fcmp(FloatCC::UnorderedOrLessThan, l, r)),

            (op, ty) => {
                return Err(CodegenError::Internal(format!(
                    "binary `{}` applied to {ty} operands",
                    op.symbol()
                )))
            }
        };

        Ok(TypedValue::new(ty, value))
    }

    /// Rewrites `from` as a value of type `to`; `unify` only ever asks for
    /// an int or bool to widen into a float.
    fn coerce(&mut self, from: TypedValue, to: Type) -> CodegenResult<Value> {
        let value = from.expect_value()?;
        if from.ty == to {
            return Ok(value);
        }

        match from.ty {
            Type::I64 => Ok(self.builder.ins().fcvt_from_sint(F64, value)),
            Type::Bool => Ok(self.builder.ins().fcvt_from_uint(F64, value)),
            ty => Err(CodegenError::Internal(format!(
                "no conversion from {ty} to {to}"
            ))),
        }
    }

    fn gen_call(&mut self, callee: &str, args: &[Expr]) -> CodegenResult<TypedValue> {
        let Some(entry) = self.jit.resolve(callee) else {
            return Err(CodegenError::UnknownFunction(callee.to_owned()));
        };
        let func_id = entry.id;
        let proto = entry.proto.clone();

        if proto.params.len() != args.len() {
            return Err(CodegenError::CallArgCount {
                callee: callee.to_owned(),
                expected: proto.params.len(),
                found: args.len(),
            });
        }

        let mut values = Vec::with_capacity(args.len());
        for (index, (arg, param)) in args.iter().zip(&proto.params).enumerate() {
            let arg = self.gen_expr(arg)?;

            // call arguments never coerce, unlike binary operands
            if arg.ty != param.ty {
                return Err(CodegenError::CallArgType {
                    callee: callee.to_owned(),
                    index: index + 1,
                    expected: param.ty,
                    found: arg.ty,
                });
            }

            values.push(arg.expect_value()?);
        }

        let func_ref = self.jit.func_ref(func_id, self.builder.func);
        let call = self.builder.ins().call(func_ref, &values);

        match proto.ret {
            Type::Void => Ok(TypedValue::VOID),
            ret => match self.builder.inst_results(call).first() {
                Some(&value) => Ok(TypedValue::new(ret, value)),
                None => Err(CodegenError::Internal(format!(
                    "call to `{callee}` produced no result"
                ))),
            },
        }
    }

    fn gen_if(&mut self, cond: &Expr, then: &Expr, else_: &Expr) -> CodegenResult<TypedValue> {
        let cond = self.gen_expr(cond)?;
        let cond = self.normalize_condition(cond)?;

        let then_block = self.builder.create_block();
        let else_block = self.builder.create_block();
        let join_block = self.builder.create_block();

        self.builder
            .ins()
            .brif(cond, then_block, &[], else_block, &[]);

        self.builder.switch_to_block(then_block);
        self.builder.seal_block(then_block);
        let then_value = self.gen_expr(then)?;

        // The join's block parameter is the two-predecessor merge carrying
        // the branch values; a void `if` joins without one.
        let merged = match then_value.ty {
            Type::Void => None,
            ty => {
                let clif = self.value_type(ty)?;
                Some(self.builder.append_block_param(join_block, clif))
            }
        };

        let then_args: Vec<Value> = then_value.value.into_iter().collect();
        self.builder.ins().jump(join_block, &then_args);

        self.builder.switch_to_block(else_block);
        self.builder.seal_block(else_block);
        let else_value = self.gen_expr(else_)?;

        if else_value.ty != then_value.ty {
            return Err(CodegenError::BranchTypeMismatch {
                then: then_value.ty,
                else_: else_value.ty,
            });
        }

        let else_args: Vec<Value> = else_value.value.into_iter().collect();
        self.builder.ins().jump(join_block, &else_args);

        self.builder.switch_to_block(join_block);
        self.builder.seal_block(join_block);

        Ok(TypedValue {
            ty: then_value.ty,
            value: merged,
        })
    }

    /// Normalizes an `if` condition to a boolean: booleans pass through,
    /// numbers compare against their zero value (nonzero is true).
    fn normalize_condition(&mut self, cond: TypedValue) -> CodegenResult<Value> {
        match cond.ty {
            Type::Bool => cond.expect_value(),

            Type::I64 => {
                let value = cond.expect_value()?;
                Ok(self.builder.ins().icmp_imm(IntCC::NotEqual, value, 0))
            }

            Type::F64 => {
                let value = cond.expect_value()?;
                let zero = self.builder.ins().f64const(0.0);
                Ok(self.builder.ins().fcmp(FloatCC::NotEqual, value, zero))
            }

            ty => Err(CodegenError::BadConditionType(ty)),
        }
    }

    fn value_type(&self, ty: Type) -> CodegenResult<ir::Type> {
        self.jit
            .value_type(ty)
            .ok_or_else(|| CodegenError::Internal(format!("{ty} has no runtime representation")))
    }
}
