//! The shader type system.
//!
//! Types are interned in a per-context `TypeTable` and referenced by `TypeId`.
//! Equality is structural. Every type has a `reg_size` measured in
//! 4-component register slots: scalars and vectors take one, a matrix takes
//! its dominant-axis length (rows if row-major, columns otherwise), an array
//! takes `element_reg_size * count`, and a struct the sum of its fields laid
//! out in declaration order.

use crate::{Semantic, SourceLocation};
use bitflags::bitflags;
use std::fmt::Write as _;

bitflags! {
    /// Storage and type modifiers.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct Modifiers: u32 {
        const EXTERN = 1 << 0;
        const NOINTERPOLATION = 1 << 1;
        const PRECISE = 1 << 2;
        const SHARED = 1 << 3;
        const GROUPSHARED = 1 << 4;
        const STATIC = 1 << 5;
        const UNIFORM = 1 << 6;
        const VOLATILE = 1 << 7;
        const CONST = 1 << 8;
        const ROW_MAJOR = 1 << 9;
        const COLUMN_MAJOR = 1 << 10;
        const IN = 1 << 11;
        const OUT = 1 << 12;
    }
}

impl Modifiers {
    pub const MAJORITY: Modifiers = Modifiers::ROW_MAJOR.union(Modifiers::COLUMN_MAJOR);

    /// Space-separated keyword list, for dumps.
    pub fn display(&self) -> String {
        const NAMES: &[(Modifiers, &str)] = &[
            (Modifiers::EXTERN, "extern"),
            (Modifiers::NOINTERPOLATION, "nointerpolation"),
            (Modifiers::PRECISE, "precise"),
            (Modifiers::SHARED, "shared"),
            (Modifiers::GROUPSHARED, "groupshared"),
            (Modifiers::STATIC, "static"),
            (Modifiers::UNIFORM, "uniform"),
            (Modifiers::VOLATILE, "volatile"),
            (Modifiers::CONST, "const"),
            (Modifiers::ROW_MAJOR, "row_major"),
            (Modifiers::COLUMN_MAJOR, "column_major"),
        ];
        let mut out = String::new();
        for (flag, name) in NAMES {
            if self.contains(*flag) {
                if !out.is_empty() {
                    out.push(' ');
                }
                out.push_str(name);
            }
        }
        if self.contains(Modifiers::IN | Modifiers::OUT) {
            if !out.is_empty() {
                out.push(' ');
            }
            out.push_str("inout");
        } else if self.contains(Modifiers::IN) {
            if !out.is_empty() {
                out.push(' ');
            }
            out.push_str("in");
        } else if self.contains(Modifiers::OUT) {
            if !out.is_empty() {
                out.push(' ');
            }
            out.push_str("out");
        }
        out
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum TypeClass {
    Scalar,
    Vector,
    Matrix,
    Struct,
    Array,
    Object,
}

impl TypeClass {
    pub fn is_numeric(&self) -> bool {
        matches!(self, TypeClass::Scalar | TypeClass::Vector | TypeClass::Matrix)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum BaseType {
    Bool,
    Half,
    Float,
    Double,
    Int,
    Uint,
    Sampler,
    Texture,
}

impl BaseType {
    pub fn is_numeric(&self) -> bool {
        !matches!(self, BaseType::Sampler | BaseType::Texture)
    }

    pub fn name(&self) -> &'static str {
        match self {
            BaseType::Bool => "bool",
            BaseType::Half => "half",
            BaseType::Float => "float",
            BaseType::Double => "double",
            BaseType::Int => "int",
            BaseType::Uint => "uint",
            BaseType::Sampler => "sampler",
            BaseType::Texture => "texture",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum SamplerDim {
    #[default]
    Generic,
    Dim1D,
    Dim2D,
    Dim3D,
    Cube,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TypeId(pub u32);

#[derive(Debug, Clone)]
pub struct StructField {
    pub name: String,
    pub ty: TypeId,
    pub semantic: Option<Semantic>,
    pub modifiers: Modifiers,
    /// Offset of the field within the struct, in register slots.
    pub reg_offset: u32,
    pub loc: SourceLocation,
}

#[derive(Debug, Clone)]
pub enum TypeExtra {
    None,
    Array { element: TypeId, count: u32 },
    Record { fields: Vec<StructField> },
}

#[derive(Debug, Clone)]
pub struct Type {
    pub name: Option<String>,
    pub class: TypeClass,
    pub base: BaseType,
    /// Width; columns for matrices.
    pub dimx: u32,
    /// Height; 1 for everything but matrices.
    pub dimy: u32,
    pub modifiers: Modifiers,
    pub sampler_dim: SamplerDim,
    /// Size in 4-component register slots.
    pub reg_size: u32,
    pub extra: TypeExtra,
}

impl Type {
    pub fn is_row_major(&self) -> bool {
        self.modifiers.contains(Modifiers::ROW_MAJOR)
    }

    /// Scalar, or a one-wide vector.
    pub fn is_vec1(&self) -> bool {
        self.class == TypeClass::Scalar || (self.class == TypeClass::Vector && self.dimx == 1)
    }

    pub fn is_single_reg(&self) -> bool {
        matches!(self.class, TypeClass::Scalar | TypeClass::Vector)
    }
}

fn matrix_reg_size(modifiers: Modifiers, dimx: u32, dimy: u32) -> u32 {
    if modifiers.contains(Modifiers::ROW_MAJOR) {
        dimy
    } else {
        dimx
    }
}

/// Why two expression operands have no common type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommonTypeError {
    /// An operand is not scalar/vector/matrix shaped.
    NonNumeric,
    /// The operand shapes cannot be reconciled.
    Incompatible,
}

const NUMERIC_BASES: [BaseType; 6] = [
    BaseType::Bool,
    BaseType::Int,
    BaseType::Uint,
    BaseType::Half,
    BaseType::Float,
    BaseType::Double,
];

/// Interning table; one per compilation context.
#[derive(Debug)]
pub struct TypeTable {
    types: Vec<Type>,
    scalar: [TypeId; 6],
    vector: [[TypeId; 4]; 6],
}

impl TypeTable {
    pub fn new() -> Self {
        let mut table = Self {
            types: Vec::new(),
            scalar: [TypeId(0); 6],
            vector: [[TypeId(0); 4]; 6],
        };
        for (i, base) in NUMERIC_BASES.iter().enumerate() {
            table.scalar[i] = table.push(Type {
                name: Some(base.name().to_string()),
                class: TypeClass::Scalar,
                base: *base,
                dimx: 1,
                dimy: 1,
                modifiers: Modifiers::empty(),
                sampler_dim: SamplerDim::Generic,
                reg_size: 1,
                extra: TypeExtra::None,
            });
            for dim in 1..=4u32 {
                table.vector[i][(dim - 1) as usize] = table.push(Type {
                    name: Some(format!("{}{}", base.name(), dim)),
                    class: TypeClass::Vector,
                    base: *base,
                    dimx: dim,
                    dimy: 1,
                    modifiers: Modifiers::empty(),
                    sampler_dim: SamplerDim::Generic,
                    reg_size: 1,
                    extra: TypeExtra::None,
                });
            }
        }
        table
    }

    fn push(&mut self, ty: Type) -> TypeId {
        let id = TypeId(self.types.len() as u32);
        self.types.push(ty);
        id
    }

    pub fn get(&self, id: TypeId) -> &Type {
        &self.types[id.0 as usize]
    }

    fn base_index(base: BaseType) -> usize {
        NUMERIC_BASES
            .iter()
            .position(|b| *b == base)
            .expect("numeric base type")
    }

    pub fn scalar(&self, base: BaseType) -> TypeId {
        self.scalar[Self::base_index(base)]
    }

    /// The builtin vector type `base`×`dimx`. `dimx` must be 1..=4.
    pub fn vector(&self, base: BaseType, dimx: u32) -> TypeId {
        self.vector[Self::base_index(base)][(dimx - 1) as usize]
    }

    pub fn matrix(&mut self, base: BaseType, dimx: u32, dimy: u32, modifiers: Modifiers) -> TypeId {
        self.push(Type {
            name: None,
            class: TypeClass::Matrix,
            base,
            dimx,
            dimy,
            modifiers,
            sampler_dim: SamplerDim::Generic,
            reg_size: matrix_reg_size(modifiers, dimx, dimy),
            extra: TypeExtra::None,
        })
    }

    pub fn array(&mut self, element: TypeId, count: u32) -> TypeId {
        let elem = self.get(element);
        let (modifiers, dimx, dimy, reg_size) =
            (elem.modifiers, elem.dimx, elem.dimy, elem.reg_size * count);
        self.push(Type {
            name: None,
            class: TypeClass::Array,
            base: self.get(element).base,
            dimx,
            dimy,
            modifiers,
            sampler_dim: SamplerDim::Generic,
            reg_size,
            extra: TypeExtra::Array { element, count },
        })
    }

    /// A struct type. Field register offsets are assigned here, in
    /// declaration order without reordering.
    pub fn record(&mut self, name: Option<String>, mut fields: Vec<StructField>) -> TypeId {
        let mut reg_size = 0;
        for field in &mut fields {
            field.reg_offset = reg_size;
            reg_size += self.get(field.ty).reg_size;
        }
        self.push(Type {
            name,
            class: TypeClass::Struct,
            base: BaseType::Float,
            dimx: 0,
            dimy: 0,
            modifiers: Modifiers::empty(),
            sampler_dim: SamplerDim::Generic,
            reg_size,
            extra: TypeExtra::Record { fields },
        })
    }

    pub fn object(&mut self, base: BaseType, sampler_dim: SamplerDim) -> TypeId {
        self.push(Type {
            name: None,
            class: TypeClass::Object,
            base,
            dimx: 1,
            dimy: 1,
            modifiers: Modifiers::empty(),
            sampler_dim,
            reg_size: 1,
            extra: TypeExtra::None,
        })
    }

    /// Deep-clone a type, filling in `default_majority` wherever no majority
    /// modifier is present. Register sizes and field offsets are recomputed.
    pub fn clone_with_majority(&mut self, id: TypeId, default_majority: Modifiers) -> TypeId {
        let old = self.get(id).clone();
        let mut modifiers = old.modifiers;
        if !modifiers.intersects(Modifiers::MAJORITY) {
            modifiers |= default_majority;
        }
        match old.extra.clone() {
            TypeExtra::Array { element, count } => {
                let element = self.clone_with_majority(element, default_majority);
                let reg_size = self.get(element).reg_size * count;
                self.push(Type {
                    modifiers,
                    reg_size,
                    extra: TypeExtra::Array { element, count },
                    ..old
                })
            }
            TypeExtra::Record { fields } => {
                let mut new_fields = Vec::with_capacity(fields.len());
                let mut reg_size = 0;
                for field in fields {
                    let ty = self.clone_with_majority(field.ty, default_majority);
                    let offset = reg_size;
                    reg_size += self.get(ty).reg_size;
                    new_fields.push(StructField {
                        ty,
                        reg_offset: offset,
                        ..field
                    });
                }
                self.push(Type {
                    modifiers,
                    reg_size,
                    extra: TypeExtra::Record { fields: new_fields },
                    ..old
                })
            }
            TypeExtra::None => {
                let reg_size = if old.class == TypeClass::Matrix {
                    matrix_reg_size(modifiers, old.dimx, old.dimy)
                } else {
                    old.reg_size
                };
                self.push(Type {
                    modifiers,
                    reg_size,
                    ..old
                })
            }
        }
    }

    /// Total component count of a type.
    pub fn components(&self, id: TypeId) -> u32 {
        let ty = self.get(id);
        match &ty.extra {
            _ if ty.class.is_numeric() => ty.dimx * ty.dimy,
            TypeExtra::Array { element, count } => self.components(*element) * count,
            TypeExtra::Record { fields } => {
                fields.iter().map(|f| self.components(f.ty)).sum()
            }
            TypeExtra::None => {
                tracing::error!(target: "types", class = ?ty.class, "unexpected data type");
                0
            }
        }
    }

    /// Structural equality, including matrix majority and sampler dimension.
    pub fn equal(&self, a: TypeId, b: TypeId) -> bool {
        if a == b {
            return true;
        }
        let (t1, t2) = (self.get(a), self.get(b));
        if t1.class != t2.class || t1.base != t2.base {
            return false;
        }
        if t1.base == BaseType::Sampler && t1.sampler_dim != t2.sampler_dim {
            return false;
        }
        if t1.modifiers & Modifiers::MAJORITY != t2.modifiers & Modifiers::MAJORITY {
            return false;
        }
        if t1.dimx != t2.dimx || t1.dimy != t2.dimy {
            return false;
        }
        match (&t1.extra, &t2.extra) {
            (
                TypeExtra::Record { fields: f1 },
                TypeExtra::Record { fields: f2 },
            ) => {
                f1.len() == f2.len()
                    && f1
                        .iter()
                        .zip(f2)
                        .all(|(a, b)| a.name == b.name && self.equal(a.ty, b.ty))
            }
            (
                TypeExtra::Array {
                    element: e1,
                    count: c1,
                },
                TypeExtra::Array {
                    element: e2,
                    count: c2,
                },
            ) => c1 == c2 && self.equal(*e1, *e2),
            _ => true,
        }
    }

    fn convertible(&self, id: TypeId) -> bool {
        self.get(id).class != TypeClass::Object
    }

    /// Explicit-cast compatibility; strictly looser than implicit
    /// compatibility (component-count truncation is allowed).
    pub fn cast_compatible(&self, from: TypeId, to: TypeId) -> bool {
        if !self.convertible(from) || !self.convertible(to) {
            return false;
        }
        let (t1, t2) = (self.get(from), self.get(to));

        if t1.class.is_numeric() {
            // Scalars cast to pretty much everything.
            if t1.dimx == 1 && t1.dimy == 1 {
                return true;
            }
            if t1.class == TypeClass::Vector && t2.class == TypeClass::Vector {
                return t1.dimx >= t2.dimx;
            }
        }

        // The other way around holds too: anything numeric casts to a scalar.
        if t2.class.is_numeric() && t2.dimx == 1 && t2.dimy == 1 {
            return true;
        }

        if t1.class == TypeClass::Array {
            if let TypeExtra::Array { element, .. } = t1.extra {
                // e.g. float4[3] to float4.
                if self.equal(element, to) {
                    return true;
                }
            }
            return if matches!(t2.class, TypeClass::Array | TypeClass::Struct) {
                self.components(from) >= self.components(to)
            } else {
                self.components(from) == self.components(to)
            };
        }

        if t1.class == TypeClass::Struct {
            return self.components(from) >= self.components(to);
        }

        if matches!(t2.class, TypeClass::Array | TypeClass::Struct) {
            return self.components(from) == self.components(to);
        }

        if t1.class == TypeClass::Matrix || t2.class == TypeClass::Matrix {
            if t1.class == TypeClass::Matrix
                && t2.class == TypeClass::Matrix
                && t1.dimx >= t2.dimx
                && t1.dimy >= t2.dimy
            {
                return true;
            }
            // Matrix-vector casts need matching component counts.
            return (t1.class == TypeClass::Vector || t2.class == TypeClass::Vector)
                && self.components(from) == self.components(to);
        }

        self.components(from) >= self.components(to)
    }

    /// Implicit-conversion compatibility.
    pub fn implicit_compatible(&self, from: TypeId, to: TypeId) -> bool {
        if !self.convertible(from) || !self.convertible(to) {
            return false;
        }
        let (t1, t2) = (self.get(from), self.get(to));

        if t1.class.is_numeric() {
            // Scalars convert to any numeric type, and vice versa.
            if t1.dimx == 1 && t1.dimy == 1 && t2.class.is_numeric() {
                return true;
            }
            if t2.dimx == 1 && t2.dimy == 1 && t2.class.is_numeric() {
                return true;
            }
        }

        if t1.class == TypeClass::Array && t2.class == TypeClass::Array {
            return self.components(from) == self.components(to);
        }

        if (t1.class == TypeClass::Array && t2.class.is_numeric())
            || (t1.class.is_numeric() && t2.class == TypeClass::Array)
        {
            if let TypeExtra::Array { element, .. } = t1.extra {
                // e.g. float4[3] to float4.
                if self.equal(element, to) {
                    return true;
                }
            }
            return self.components(from) == self.components(to);
        }

        if t1.class <= TypeClass::Vector && t2.class <= TypeClass::Vector {
            return t1.dimx >= t2.dimx;
        }

        if t1.class == TypeClass::Matrix || t2.class == TypeClass::Matrix {
            if t1.class == TypeClass::Matrix
                && t2.class == TypeClass::Matrix
                && t1.dimx >= t2.dimx
                && t1.dimy >= t2.dimy
            {
                return true;
            }
            return (t1.class == TypeClass::Vector || t2.class == TypeClass::Vector)
                && self.components(from) == self.components(to);
        }

        if t1.class == TypeClass::Struct && t2.class == TypeClass::Struct {
            return self.equal(from, to);
        }

        false
    }

    fn expr_compatible(&self, a: TypeId, b: TypeId) -> bool {
        let (t1, t2) = (self.get(a), self.get(b));
        if !t1.base.is_numeric() || !t2.base.is_numeric() {
            return false;
        }

        if (t1.dimx == 1 && t1.dimy == 1) || (t2.dimx == 1 && t2.dimy == 1) {
            return true;
        }

        if t1.class == TypeClass::Vector && t2.class == TypeClass::Vector {
            return true;
        }

        if t1.class == TypeClass::Matrix || t2.class == TypeClass::Matrix {
            // Matrix-vector mixes work when the component counts match or the
            // matrix is vector-shaped (1×n or n×1).
            if t1.class == TypeClass::Vector || t2.class == TypeClass::Vector {
                if self.components(a) == self.components(b) {
                    return true;
                }
                return (t1.class == TypeClass::Matrix && (t1.dimx == 1 || t1.dimy == 1))
                    || (t2.class == TypeClass::Matrix && (t2.dimx == 1 || t2.dimy == 1));
            }

            // Both matrices.
            if (t1.dimx >= t2.dimx && t1.dimy >= t2.dimy)
                || (t1.dimx <= t2.dimx && t1.dimy <= t2.dimy)
            {
                return true;
            }
        }

        false
    }

    fn common_base(a: BaseType, b: BaseType) -> BaseType {
        // Rank along bool < int < uint < half < float < double, always
        // demoting half one step toward float.
        let rank = |base: BaseType| {
            let idx = Self::base_index(base);
            if base == BaseType::Half { idx + 1 } else { idx }
        };
        if rank(a) >= rank(b) { a } else { b }
    }

    /// The result type of a binary expression over `a` and `b`.
    pub fn expr_common_type(&mut self, a: TypeId, b: TypeId) -> Result<TypeId, CommonTypeError> {
        if !self.get(a).class.is_numeric() || !self.get(b).class.is_numeric() {
            return Err(CommonTypeError::NonNumeric);
        }

        if self.equal(a, b) {
            return Ok(a);
        }

        if !self.expr_compatible(a, b) {
            return Err(CommonTypeError::Incompatible);
        }

        let (t1, t2) = (self.get(a).clone(), self.get(b).clone());
        let base = if t1.base == t2.base {
            t1.base
        } else {
            Self::common_base(t1.base, t2.base)
        };

        let (class, dimx, dimy);
        if t1.dimx == 1 && t1.dimy == 1 {
            class = t2.class;
            dimx = t2.dimx;
            dimy = t2.dimy;
        } else if t2.dimx == 1 && t2.dimy == 1 {
            class = t1.class;
            dimx = t1.dimx;
            dimy = t1.dimy;
        } else if t1.class == TypeClass::Matrix && t2.class == TypeClass::Matrix {
            class = TypeClass::Matrix;
            dimx = t1.dimx.min(t2.dimx);
            dimy = t1.dimy.min(t2.dimy);
        } else {
            // Two vectors, or a vector and a vector-shaped matrix.
            let max_dim_1 = t1.dimx.max(t1.dimy);
            let max_dim_2 = t2.dimx.max(t2.dimy);
            if t1.dimx * t1.dimy == t2.dimx * t2.dimy {
                class = TypeClass::Vector;
                dimx = t1.dimx.max(t2.dimx);
                dimy = 1;
            } else if max_dim_1 <= max_dim_2 {
                class = t1.class;
                if class == TypeClass::Vector {
                    dimx = max_dim_1;
                    dimy = 1;
                } else {
                    dimx = t1.dimx;
                    dimy = t1.dimy;
                }
            } else {
                class = t2.class;
                if class == TypeClass::Vector {
                    dimx = max_dim_2;
                    dimy = 1;
                } else {
                    dimx = t2.dimx;
                    dimy = t2.dimy;
                }
            }
        }

        Ok(match class {
            TypeClass::Scalar => self.scalar(base),
            TypeClass::Vector => self.vector(base, dimx),
            _ => self.matrix(base, dimx, dimy, Modifiers::empty()),
        })
    }

    /// Debug name of a type (`float4`, `half3x2`, `float[3]`, struct name).
    pub fn name(&self, id: TypeId) -> String {
        let ty = self.get(id);
        if let Some(name) = &ty.name {
            return name.clone();
        }
        match &ty.extra {
            TypeExtra::Record { .. } => "<anonymous struct>".to_string(),
            TypeExtra::Array { element, count } => {
                format!("{}[{}]", self.name(*element), count)
            }
            TypeExtra::None => {
                let base = if ty.base == BaseType::Sampler {
                    match ty.sampler_dim {
                        SamplerDim::Generic => "sampler",
                        SamplerDim::Dim1D => "sampler1D",
                        SamplerDim::Dim2D => "sampler2D",
                        SamplerDim::Dim3D => "sampler3D",
                        SamplerDim::Cube => "samplerCUBE",
                    }
                    .to_string()
                } else {
                    ty.base.name().to_string()
                };
                let mut out = base;
                match ty.class {
                    TypeClass::Vector => {
                        let _ = write!(out, "{}", ty.dimx);
                    }
                    TypeClass::Matrix => {
                        let _ = write!(out, "{}x{}", ty.dimx, ty.dimy);
                    }
                    _ => {}
                }
                out
            }
        }
    }
}

impl Default for TypeTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> TypeTable {
        TypeTable::new()
    }

    #[test]
    fn builtin_reg_sizes() {
        let t = table();
        assert_eq!(t.get(t.scalar(BaseType::Float)).reg_size, 1);
        assert_eq!(t.get(t.vector(BaseType::Float, 4)).reg_size, 1);
    }

    #[test]
    fn matrix_reg_size_follows_majority() {
        let mut t = table();
        let row = t.matrix(BaseType::Float, 4, 3, Modifiers::ROW_MAJOR);
        let col = t.matrix(BaseType::Float, 4, 3, Modifiers::COLUMN_MAJOR);
        assert_eq!(t.get(row).reg_size, 3);
        assert_eq!(t.get(col).reg_size, 4);
    }

    #[test]
    fn array_and_struct_reg_sizes() {
        let mut t = table();
        let f4 = t.vector(BaseType::Float, 4);
        let arr = t.array(f4, 3);
        assert_eq!(t.get(arr).reg_size, 3);

        let f = t.scalar(BaseType::Float);
        let f3 = t.vector(BaseType::Float, 3);
        let rec = t.record(
            Some("light".to_string()),
            vec![
                StructField {
                    name: "a".to_string(),
                    ty: f,
                    semantic: None,
                    modifiers: Modifiers::empty(),
                    reg_offset: 0,
                    loc: SourceLocation::default(),
                },
                StructField {
                    name: "b".to_string(),
                    ty: f3,
                    semantic: None,
                    modifiers: Modifiers::empty(),
                    reg_offset: 0,
                    loc: SourceLocation::default(),
                },
            ],
        );
        let ty = t.get(rec);
        assert_eq!(ty.reg_size, 2);
        let TypeExtra::Record { fields } = &ty.extra else {
            panic!("expected record");
        };
        assert_eq!(fields[0].reg_offset, 0);
        assert_eq!(fields[1].reg_offset, 1);
    }

    #[test]
    fn structural_equality() {
        let mut t = table();
        let a = t.matrix(BaseType::Float, 2, 2, Modifiers::ROW_MAJOR);
        let b = t.matrix(BaseType::Float, 2, 2, Modifiers::ROW_MAJOR);
        let c = t.matrix(BaseType::Float, 2, 2, Modifiers::COLUMN_MAJOR);
        assert!(t.equal(a, b));
        assert!(!t.equal(a, c));
        assert!(t.equal(t.scalar(BaseType::Int), t.scalar(BaseType::Int)));
    }

    #[test]
    fn common_type_promotes_toward_float() {
        let mut t = table();
        let int1 = t.scalar(BaseType::Int);
        let uint1 = t.scalar(BaseType::Uint);
        let half1 = t.scalar(BaseType::Half);
        assert_eq!(
            t.expr_common_type(int1, uint1).unwrap(),
            t.scalar(BaseType::Uint)
        );
        // half ranks alongside float, so it outranks uint...
        let common = t.expr_common_type(half1, uint1).unwrap();
        assert_eq!(t.get(common).base, BaseType::Half);
        // ...and float wins over half when it is the higher-ranked operand.
        let float1 = t.scalar(BaseType::Float);
        let common = t.expr_common_type(float1, half1).unwrap();
        assert_eq!(t.get(common).base, BaseType::Float);
    }

    #[test]
    fn common_type_scalar_lifts_to_vector() {
        let mut t = table();
        let f1 = t.scalar(BaseType::Float);
        let f4 = t.vector(BaseType::Float, 4);
        assert_eq!(t.expr_common_type(f1, f4).unwrap(), f4);
        assert_eq!(t.expr_common_type(f4, f1).unwrap(), f4);
    }

    #[test]
    fn common_type_matrices_take_min_dims() {
        let mut t = table();
        let m43 = t.matrix(BaseType::Float, 4, 3, Modifiers::empty());
        let m24 = t.matrix(BaseType::Float, 2, 4, Modifiers::empty());
        // 4x3 vs 2x4 is not expression-compatible (neither dominates).
        assert_eq!(
            t.expr_common_type(m43, m24),
            Err(CommonTypeError::Incompatible)
        );
        let m22 = t.matrix(BaseType::Float, 2, 2, Modifiers::empty());
        let common = t.expr_common_type(m43, m22).unwrap();
        let ty = t.get(common);
        assert_eq!((ty.dimx, ty.dimy), (2, 2));
    }

    #[test]
    fn common_type_vector_and_vector_shaped_matrix() {
        let mut t = table();
        let f3 = t.vector(BaseType::Float, 3);
        let m13 = t.matrix(BaseType::Float, 1, 3, Modifiers::empty());
        let common = t.expr_common_type(f3, m13).unwrap();
        let ty = t.get(common);
        assert_eq!(ty.class, TypeClass::Vector);
        assert_eq!(ty.dimx, 3);
    }

    #[test]
    fn common_type_rejects_objects() {
        let mut t = table();
        let s = t.object(BaseType::Sampler, SamplerDim::Dim2D);
        let f = t.scalar(BaseType::Float);
        assert_eq!(t.expr_common_type(s, f), Err(CommonTypeError::NonNumeric));
    }

    #[test]
    fn implicit_allows_truncation_to_narrower_vector() {
        let mut t = table();
        let f4 = t.vector(BaseType::Float, 4);
        let f2 = t.vector(BaseType::Float, 2);
        assert!(t.implicit_compatible(f4, f2));
        assert!(!t.implicit_compatible(f2, f4));
    }

    #[test]
    fn implicit_array_splat() {
        let mut t = table();
        let f4 = t.vector(BaseType::Float, 4);
        let arr = t.array(f4, 3);
        // float4[3] -> float4 is allowed.
        assert!(t.implicit_compatible(arr, f4));
    }

    #[test]
    fn implicit_struct_requires_identity() {
        let mut t = table();
        let f = t.scalar(BaseType::Float);
        let field = |name: &str, ty| StructField {
            name: name.to_string(),
            ty,
            semantic: None,
            modifiers: Modifiers::empty(),
            reg_offset: 0,
            loc: SourceLocation::default(),
        };
        let a = t.record(None, vec![field("x", f)]);
        let b = t.record(None, vec![field("x", f)]);
        let c = t.record(None, vec![field("y", f)]);
        assert!(t.implicit_compatible(a, b));
        assert!(!t.implicit_compatible(a, c));
    }

    #[test]
    fn cast_compatibility_is_looser_than_implicit() {
        let mut t = table();
        let f2 = t.vector(BaseType::Float, 2);
        let f4 = t.vector(BaseType::Float, 4);
        let m22 = t.matrix(BaseType::Float, 2, 2, Modifiers::empty());
        // Vector-to-matrix casts with equal component counts are explicit-only.
        assert!(t.cast_compatible(f4, m22));
        assert!(!t.implicit_compatible(f4, m22));
        assert!(!t.cast_compatible(f2, m22));
    }

    #[test]
    fn clone_with_majority_fills_unset() {
        let mut t = table();
        let m = t.matrix(BaseType::Float, 4, 2, Modifiers::empty());
        let cloned = t.clone_with_majority(m, Modifiers::ROW_MAJOR);
        assert!(t.get(cloned).is_row_major());
        assert_eq!(t.get(cloned).reg_size, 2);
        // An explicit majority is preserved.
        let m2 = t.matrix(BaseType::Float, 4, 2, Modifiers::COLUMN_MAJOR);
        let cloned2 = t.clone_with_majority(m2, Modifiers::ROW_MAJOR);
        assert!(!t.get(cloned2).is_row_major());
        assert_eq!(t.get(cloned2).reg_size, 4);
    }

    #[test]
    fn type_names() {
        let mut t = table();
        let f4 = t.vector(BaseType::Float, 4);
        assert_eq!(t.name(f4), "float4");
        let m = t.matrix(BaseType::Half, 3, 2, Modifiers::empty());
        assert_eq!(t.name(m), "half3x2");
        let arr = t.array(f4, 5);
        assert_eq!(t.name(arr), "float4[5]");
    }
}
