//! The translation unit context: owner of every arena, the interning
//! tables, the identifier table and the builtin types.
//!
//! All AST nodes live exactly as long as the `Context`. Base types are
//! created once at construction; the qualified/array/pointer/record
//! constructors intern, so handle equality is type equality.

use std::collections::HashMap;

use crate::arena::{Arena, InternTable, Profile};
use crate::decl::{Decl, DeclId, DeclKind};
use crate::expr::{ConstantValue, Expr, ExprId, ExprKind};
use crate::fold;
use crate::ident::IdentTable;
use crate::source::SourceLocation;
use crate::stmt::{Stmt, StmtId};
use crate::types::{
    ArraySpec, ArraySpecId, ArrayType, BuiltinType, PointerType, QualifiedType, Qualifiers, Type,
    TypeId, TypeKind,
};

pub struct Context {
    pub idents: IdentTable,

    types: Arena<TypeId, Type>,
    type_table: InternTable<TypeId>,
    array_specs: Arena<ArraySpecId, ArraySpec>,
    exprs: Arena<ExprId, Expr>,
    stmts: Arena<StmtId, Stmt>,
    decls: Arena<DeclId, Decl>,

    /// Cache for types synthesized with a specific evaluated kind, so that
    /// e.g. every INTEGER(8) the analyzer conjures is one handle.
    kind_cache: HashMap<(BuiltinType, i64), TypeId>,

    pub integer_ty: TypeId,
    pub real_ty: TypeId,
    pub double_precision_ty: TypeId,
    pub complex_ty: TypeId,
    pub character_ty: TypeId,
    pub logical_ty: TypeId,

    root: DeclId,
}

impl Context {
    pub fn new() -> Context {
        let mut types = Arena::new();
        let integer_ty = types.alloc(Type::Builtin(BuiltinType::Integer));
        let real_ty = types.alloc(Type::Builtin(BuiltinType::Real));
        let double_precision_ty = types.alloc(Type::Builtin(BuiltinType::DoublePrecision));
        let complex_ty = types.alloc(Type::Builtin(BuiltinType::Complex));
        let character_ty = types.alloc(Type::Builtin(BuiltinType::Character));
        let logical_ty = types.alloc(Type::Builtin(BuiltinType::Logical));

        let mut decls = Arena::new();
        let root = decls.alloc(Decl {
            kind: DeclKind::TranslationUnit { decls: Vec::new() },
            loc: SourceLocation::INVALID,
            name: None,
            parent: None,
        });

        Context {
            idents: IdentTable::new(),
            types,
            type_table: InternTable::new(),
            array_specs: Arena::new(),
            exprs: Arena::new(),
            stmts: Arena::new(),
            decls,
            kind_cache: HashMap::new(),
            integer_ty,
            real_ty,
            double_precision_ty,
            complex_ty,
            character_ty,
            logical_ty,
            root,
        }
    }

    /// The translation-unit declaration, the root of the context tree.
    pub fn translation_unit(&self) -> DeclId {
        self.root
    }

    // Node access.

    pub fn typ(&self, id: TypeId) -> &Type {
        self.types.get(id)
    }

    pub fn expr(&self, id: ExprId) -> &Expr {
        self.exprs.get(id)
    }

    pub(crate) fn expr_mut(&mut self, id: ExprId) -> &mut Expr {
        self.exprs.get_mut(id)
    }

    pub fn stmt(&self, id: StmtId) -> &Stmt {
        self.stmts.get(id)
    }

    pub(crate) fn stmt_mut(&mut self, id: StmtId) -> &mut Stmt {
        self.stmts.get_mut(id)
    }

    pub fn decl(&self, id: DeclId) -> &Decl {
        self.decls.get(id)
    }

    pub(crate) fn decl_mut(&mut self, id: DeclId) -> &mut Decl {
        self.decls.get_mut(id)
    }

    pub fn array_spec(&self, id: ArraySpecId) -> &ArraySpec {
        self.array_specs.get(id)
    }

    // Allocation.

    pub fn alloc_expr(&mut self, expr: Expr) -> ExprId {
        self.exprs.alloc(expr)
    }

    pub fn alloc_stmt(&mut self, stmt: Stmt) -> StmtId {
        self.stmts.alloc(stmt)
    }

    pub fn alloc_decl(&mut self, decl: Decl) -> DeclId {
        self.decls.alloc(decl)
    }

    pub fn alloc_array_spec(&mut self, spec: ArraySpec) -> ArraySpecId {
        self.array_specs.alloc(spec)
    }

    /// Appends `member` to the ordered declaration list of `context`.
    pub fn add_to_context(&mut self, context: DeclId, member: DeclId) {
        let decl = self.decls.get_mut(context);
        decl.context_decls_mut()
            .expect("declaration context expected")
            .push(member);
    }

    /// Synthesizes an integer constant expression, used for computed kind
    /// selectors and lengths.
    pub fn int_constant_expr(&mut self, value: i64, loc: SourceLocation) -> ExprId {
        self.exprs.alloc(Expr {
            kind: ExprKind::Constant {
                value: ConstantValue::Integer(value.into()),
                kind: None,
                end_loc: loc,
            },
            ty: self.integer_ty,
            loc,
        })
    }

    // Interned type constructors.

    /// A qualifier bundle over `base`. Reduces to `base` when there is
    /// nothing semantically significant to record.
    pub fn qualified_type(
        &mut self,
        base: TypeId,
        quals: Qualifiers,
        kind: Option<ExprId>,
        len: Option<ExprId>,
    ) -> TypeId {
        if quals.is_empty() && kind.is_none() && len.is_none() {
            return base;
        }
        let mut profile = Profile::new();
        profile
            .add_byte(b'Q')
            .add_handle(base)
            .add_opt_handle(kind)
            .add_opt_handle(len)
            .add_u32(quals.profile_word());
        let types = &mut self.types;
        self.type_table.insert_or_find(profile, || {
            types.alloc(Type::Qualified(QualifiedType {
                base,
                quals,
                kind,
                len,
            }))
        })
    }

    /// CHARACTER with an optional length and kind selector.
    pub fn character_type(&mut self, len: Option<ExprId>, kind: Option<ExprId>) -> TypeId {
        self.qualified_type(self.character_ty, Qualifiers::default(), kind, len)
    }

    pub fn array_type(&mut self, element: TypeId, dims: Vec<ArraySpecId>) -> TypeId {
        let mut profile = Profile::new();
        profile.add_byte(b'A').add_handle(element);
        for &dim in &dims {
            profile.add_handle(dim);
        }
        let types = &mut self.types;
        self.type_table.insert_or_find(profile, || {
            types.alloc(Type::Array(ArrayType { element, dims }))
        })
    }

    pub fn pointer_type(&mut self, pointee: TypeId, num_dims: u32) -> TypeId {
        let mut profile = Profile::new();
        profile
            .add_byte(b'P')
            .add_handle(pointee)
            .add_u32(num_dims);
        let types = &mut self.types;
        self.type_table.insert_or_find(profile, || {
            types.alloc(Type::Pointer(PointerType { pointee, num_dims }))
        })
    }

    pub fn record_type(&mut self, record: DeclId) -> TypeId {
        let mut profile = Profile::new();
        profile.add_byte(b'R').add_handle(record);
        let types = &mut self.types;
        self.type_table
            .insert_or_find(profile, || types.alloc(Type::Record(record)))
    }

    /// The builtin handle for a base type.
    pub fn builtin_type(&self, spec: BuiltinType) -> TypeId {
        match spec {
            BuiltinType::Integer => self.integer_ty,
            BuiltinType::Real => self.real_ty,
            BuiltinType::DoublePrecision => self.double_precision_ty,
            BuiltinType::Complex => self.complex_ty,
            BuiltinType::Character => self.character_ty,
            BuiltinType::Logical => self.logical_ty,
        }
    }

    /// A base type carrying a specific evaluated kind. Cached so repeated
    /// requests share one handle.
    pub fn type_with_kind(&mut self, base: BuiltinType, kind: i64) -> TypeId {
        if TypeKind::default_for(base).map(|k| k.selector()) == Some(kind) {
            return self.builtin_type(base);
        }
        if let Some(&found) = self.kind_cache.get(&(base, kind)) {
            return found;
        }
        let base_id = self.builtin_type(base);
        let kind_expr = self.int_constant_expr(kind, SourceLocation::INVALID);
        let ty = self.qualified_type(base_id, Qualifiers::default(), Some(kind_expr), None);
        self.kind_cache.insert((base, kind), ty);
        ty
    }

    /// `base` rebuilt with the arithmetic kind of `kind_from`.
    pub fn type_with_kind_of(&mut self, base: BuiltinType, kind_from: TypeId) -> TypeId {
        match self.arith_kind(kind_from) {
            Some(k) => self.type_with_kind(base, k.selector()),
            None => self.builtin_type(base),
        }
    }

    // Type predicates. All of them look through qualifier bundles.

    /// Strips qualifier bundles down to the underlying base type.
    pub fn base_type(&self, ty: TypeId) -> TypeId {
        match self.typ(ty) {
            Type::Qualified(q) => self.base_type(q.base),
            _ => ty,
        }
    }

    pub fn builtin_of(&self, ty: TypeId) -> Option<BuiltinType> {
        match self.typ(self.base_type(ty)) {
            Type::Builtin(b) => Some(*b),
            _ => None,
        }
    }

    pub fn is_integer_type(&self, ty: TypeId) -> bool {
        self.builtin_of(ty) == Some(BuiltinType::Integer)
    }

    pub fn is_real_type(&self, ty: TypeId) -> bool {
        matches!(
            self.builtin_of(ty),
            Some(BuiltinType::Real) | Some(BuiltinType::DoublePrecision)
        )
    }

    pub fn is_double_precision_type(&self, ty: TypeId) -> bool {
        if self.builtin_of(ty) == Some(BuiltinType::DoublePrecision) {
            return true;
        }
        self.builtin_of(ty) == Some(BuiltinType::Real)
            && self.arith_kind(ty) == Some(TypeKind::Real8)
    }

    pub fn is_complex_type(&self, ty: TypeId) -> bool {
        self.builtin_of(ty) == Some(BuiltinType::Complex)
    }

    pub fn is_double_complex_type(&self, ty: TypeId) -> bool {
        self.is_complex_type(ty) && self.arith_kind(ty) == Some(TypeKind::Real8)
    }

    pub fn is_logical_type(&self, ty: TypeId) -> bool {
        self.builtin_of(ty) == Some(BuiltinType::Logical)
    }

    pub fn is_character_type(&self, ty: TypeId) -> bool {
        self.builtin_of(ty) == Some(BuiltinType::Character)
    }

    pub fn is_arithmetic_type(&self, ty: TypeId) -> bool {
        matches!(
            self.builtin_of(ty),
            Some(BuiltinType::Integer)
                | Some(BuiltinType::Real)
                | Some(BuiltinType::DoublePrecision)
                | Some(BuiltinType::Complex)
        )
    }

    pub fn as_array_type(&self, ty: TypeId) -> Option<&ArrayType> {
        match self.typ(self.strip_to_wrapper(ty)) {
            Type::Array(at) => Some(at),
            _ => None,
        }
    }

    /// Looks through qualifier bundles but stops at array/pointer wrappers.
    fn strip_to_wrapper(&self, ty: TypeId) -> TypeId {
        match self.typ(ty) {
            Type::Qualified(q) => self.strip_to_wrapper(q.base),
            _ => ty,
        }
    }

    /// The element type for arrays, the type itself otherwise.
    pub fn element_type(&self, ty: TypeId) -> TypeId {
        match self.as_array_type(ty) {
            Some(at) => at.element,
            None => ty,
        }
    }

    /// The arithmetic/logical storage kind of a scalar type, evaluating the
    /// kind selector when one is attached.
    pub fn arith_kind(&self, ty: TypeId) -> Option<TypeKind> {
        let base = self.builtin_of(ty)?;
        let mut selector = None;
        let mut cursor = ty;
        loop {
            match self.typ(cursor) {
                Type::Qualified(q) => {
                    if selector.is_none() {
                        selector = q.kind;
                    }
                    cursor = q.base;
                }
                _ => break,
            }
        }
        match selector {
            Some(kind_expr) => {
                let value = fold::evaluate_as_int(self, kind_expr)?;
                TypeKind::from_selector(base, value)
            }
            None => TypeKind::default_for(base),
        }
    }

    pub fn kind_bit_width(&self, ty: TypeId) -> u32 {
        self.arith_kind(ty).map(|k| k.bit_width()).unwrap_or(32)
    }

    /// The type class used for kind comparisons; DOUBLE PRECISION counts as
    /// REAL.
    pub fn type_class(&self, ty: TypeId) -> Option<BuiltinType> {
        match self.builtin_of(ty) {
            Some(BuiltinType::DoublePrecision) => Some(BuiltinType::Real),
            other => other,
        }
    }

    /// True when two types have the same type class and the same kind.
    pub fn same_type_and_kind(&self, a: TypeId, b: TypeId) -> bool {
        let class_a = self.type_class(a);
        let class_b = self.type_class(b);
        if class_a.is_none() || class_a != class_b {
            return class_a.is_none() && class_b.is_none() && a == b;
        }
        if self.is_character_type(a) {
            return self.character_length(a) == self.character_length(b);
        }
        self.arith_kind(a) == self.arith_kind(b)
    }

    /// Declared character length; the default length is 1.
    pub fn character_length(&self, ty: TypeId) -> Option<i64> {
        if !self.is_character_type(ty) {
            return None;
        }
        let mut cursor = ty;
        loop {
            match self.typ(cursor) {
                Type::Qualified(q) => {
                    if let Some(len) = q.len {
                        return fold::evaluate_as_int(self, len);
                    }
                    cursor = q.base;
                }
                _ => return Some(1),
            }
        }
    }

    /// Renders a type for diagnostics.
    pub fn display_type(&self, ty: TypeId) -> String {
        match self.typ(ty) {
            Type::Builtin(b) => match b {
                BuiltinType::Character => "CHARACTER".to_string(),
                BuiltinType::Logical => "LOGICAL".to_string(),
                BuiltinType::DoublePrecision => "REAL(8)".to_string(),
                _ => match self.arith_kind(ty) {
                    Some(k) => format!("{}({})", b.name(), k.selector()),
                    None => b.name().to_string(),
                },
            },
            Type::Qualified(q) => {
                let base = self.builtin_of(ty);
                match base {
                    Some(BuiltinType::Character) => match q.len.and_then(|l| fold::evaluate_as_int(self, l)) {
                        Some(len) => format!("CHARACTER(len={})", len),
                        None => "CHARACTER".to_string(),
                    },
                    Some(b) => match self.arith_kind(ty) {
                        Some(k) => format!("{}({})", b.name(), k.selector()),
                        None => b.name().to_string(),
                    },
                    None => self.display_type(q.base),
                }
            }
            Type::Array(at) => {
                let dims = vec![":"; at.dims.len()].join(",");
                format!("{}, DIMENSION({})", self.display_type(at.element), dims)
            }
            Type::Pointer(pt) => format!("POINTER to {}", self.display_type(pt.pointee)),
            Type::Record(decl) => {
                let name = self
                    .decl(*decl)
                    .name
                    .map(|n| self.idents.text(n).to_string())
                    .unwrap_or_else(|| "<anonymous>".to_string());
                format!("TYPE({})", name)
            }
        }
    }

    /// Total element count of an array type, when every dimension has
    /// foldable bounds.
    pub fn array_size(&self, ty: TypeId) -> Option<u64> {
        let at = self.as_array_type(ty)?;
        let mut total: u64 = 1;
        for &dim in &at.dims {
            let (lb, ub) = self.spec_bounds(dim)?;
            if ub < lb {
                return Some(0);
            }
            total = total.checked_mul((ub - lb + 1) as u64)?;
        }
        Some(total)
    }

    /// Constant bounds of one dimension specification.
    pub fn spec_bounds(&self, spec: ArraySpecId) -> Option<(i64, i64)> {
        match self.array_spec(spec) {
            ArraySpec::ExplicitShape { lower, upper } => {
                let lb = match lower {
                    Some(l) => fold::evaluate_as_int(self, *l)?,
                    None => 1,
                };
                let ub = fold::evaluate_as_int(self, *upper)?;
                Some((lb, ub))
            }
            _ => None,
        }
    }
}

impl Default for Context {
    fn default() -> Self {
        Context::new()
    }
}
