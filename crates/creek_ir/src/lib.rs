//! Types shared by every stage of the pipeline: the primitive type system,
//! the operator enums, and the trees the parser hands to the code generator.

#[macro_use]
extern crate macro_rules_attribute;

pub mod ast;

use std::fmt;

derive_alias! {
    #[derive(Node!)] = #[derive(Debug, Clone, PartialEq)];
    #[derive(NodeCopy!)] = #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)];
}

/// The closed set of primitive types. Equality is tag identity; there are no
/// composite or user-defined types.
#[derive(NodeCopy!)]
pub enum Type {
    I64,
    F64,
    Str,
    Bool,
    Void,
}

impl Type {
    /// The keyword that names this type in script source.
    pub fn keyword(self) -> &'static str {
        match self {
            Type::I64 => "int",
            Type::F64 => "float",
            Type::Str => "string",
            Type::Bool => "bool",
            Type::Void => "void",
        }
    }

    /// Whether a value of this type silently widens to a float when the
    /// other operand of a binary operator is a float.
    pub fn widens_to_float(self) -> bool {
        matches!(self, Type::I64 | Type::Bool)
    }

    /// The common operand type for a binary operator, applying at most one
    /// implicit widening. `None` means the pair has no implicit conversion;
    /// strings in particular never convert.
    pub fn unify(self, other: Type) -> Option<Type> {
        if self == other {
            return Some(self);
        }

        match (self, other) {
            (Type::F64, t) | (t, Type::F64) if t.widens_to_float() => Some(Type::F64),
            _ => None,
        }
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.keyword())
    }
}

#[derive(NodeCopy!)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Less,
}

impl BinOp {
    pub fn symbol(self) -> char {
        match self {
            BinOp::Add => '+',
            BinOp::Sub => '-',
            BinOp::Mul => '*',
            BinOp::Less => '<',
        }
    }
}

#[derive(NodeCopy!)]
pub enum UnOp {
    /// Prefix `+`; the identity.
    Plus,
    Negate,
}
