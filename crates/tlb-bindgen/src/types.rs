//! Resolved value types and their native layout.

/// A resolved type together with its native size and alignment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VarType {
    pub kind: VarKind,
    pub size: usize,
    pub align: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VarKind {
    Void,
    Primitive(Primitive),
    Pointer(Box<VarType>),
    Array { elem: Box<VarType>, dims: Vec<u32> },
    /// Record or union, referenced by name.
    Struct { name: String, union: bool },
    /// Interface value. Only meaningful behind a pointer.
    Interface { name: String, dispatch: bool },
    /// Named alias kept visible because its target is not native.
    Alias { name: String, target: Box<VarType> },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Primitive {
    I8,
    U8,
    I16,
    U16,
    I32,
    U32,
    I64,
    U64,
    F32,
    F64,
    Bool,
    Currency,
    Date,
    Bstr,
    LpStr,
    LpWStr,
    HResult,
    Scode,
    Variant,
    Decimal,
    SafeArray,
    IntPtr,
    UIntPtr,
    Guid,
}

impl Primitive {
    /// Native `(size, align)` for a target with `pointer_width`-byte pointers.
    pub fn layout(self, pointer_width: usize) -> (usize, usize) {
        match self {
            Primitive::I8 | Primitive::U8 => (1, 1),
            Primitive::I16 | Primitive::U16 | Primitive::Bool => (2, 2),
            Primitive::I32
            | Primitive::U32
            | Primitive::F32
            | Primitive::HResult
            | Primitive::Scode => (4, 4),
            Primitive::I64 | Primitive::U64 | Primitive::F64 | Primitive::Date | Primitive::Currency => {
                (8, 8)
            }
            Primitive::Decimal => (16, 8),
            Primitive::Variant => (if pointer_width == 8 { 24 } else { 16 }, 8),
            Primitive::Guid => (16, 4),
            Primitive::Bstr
            | Primitive::LpStr
            | Primitive::LpWStr
            | Primitive::SafeArray
            | Primitive::IntPtr
            | Primitive::UIntPtr => (pointer_width, pointer_width),
        }
    }

    /// Scalars a caller passes and receives as plain machine values.
    pub fn is_native(self) -> bool {
        matches!(
            self,
            Primitive::I8
                | Primitive::U8
                | Primitive::I16
                | Primitive::U16
                | Primitive::I32
                | Primitive::U32
                | Primitive::I64
                | Primitive::U64
                | Primitive::F32
                | Primitive::F64
                | Primitive::Bool
                | Primitive::Date
                | Primitive::HResult
                | Primitive::Scode
                | Primitive::IntPtr
                | Primitive::UIntPtr
        )
    }

    pub fn is_float(self) -> bool {
        matches!(self, Primitive::F32 | Primitive::F64)
    }
}

impl VarType {
    pub fn void() -> Self {
        Self {
            kind: VarKind::Void,
            size: 0,
            align: 1,
        }
    }

    pub fn primitive(primitive: Primitive, pointer_width: usize) -> Self {
        let (size, align) = primitive.layout(pointer_width);
        Self {
            kind: VarKind::Primitive(primitive),
            size,
            align,
        }
    }

    pub fn pointer(pointee: VarType, pointer_width: usize) -> Self {
        Self {
            kind: VarKind::Pointer(Box::new(pointee)),
            size: pointer_width,
            align: pointer_width,
        }
    }

    pub fn array(elem: VarType, dims: Vec<u32>) -> Self {
        let count: usize = dims.iter().map(|&d| d as usize).product();
        Self {
            size: elem.size * count,
            align: elem.align,
            kind: VarKind::Array {
                elem: Box::new(elem),
                dims,
            },
        }
    }

    pub fn structure(name: impl Into<String>, union: bool, size: usize, align: usize) -> Self {
        Self {
            kind: VarKind::Struct {
                name: name.into(),
                union,
            },
            size,
            align: normalize_align(size, align),
        }
    }

    pub fn interface(name: impl Into<String>, dispatch: bool) -> Self {
        Self {
            kind: VarKind::Interface {
                name: name.into(),
                dispatch,
            },
            size: 0,
            align: 1,
        }
    }

    pub fn alias(name: impl Into<String>, target: VarType) -> Self {
        Self {
            size: target.size,
            align: target.align,
            kind: VarKind::Alias {
                name: name.into(),
                target: Box::new(target),
            },
        }
    }

    /// The type behind any visible aliases.
    pub fn resolved(&self) -> &VarType {
        match &self.kind {
            VarKind::Alias { target, .. } => target.resolved(),
            _ => self,
        }
    }

    pub fn is_void(&self) -> bool {
        matches!(self.resolved().kind, VarKind::Void)
    }

    /// Native scalars and void; aliases of these are never kept by name.
    pub fn is_native(&self) -> bool {
        match &self.resolved().kind {
            VarKind::Void => true,
            VarKind::Primitive(p) => p.is_native(),
            _ => false,
        }
    }

    pub fn as_primitive(&self) -> Option<Primitive> {
        match self.resolved().kind {
            VarKind::Primitive(p) => Some(p),
            _ => None,
        }
    }

    /// Interface pointed to by this type, if it is an interface pointer.
    pub fn as_interface_pointer(&self) -> Option<(&str, bool)> {
        match &self.resolved().kind {
            VarKind::Pointer(inner) => match &inner.resolved().kind {
                VarKind::Interface { name, dispatch } => Some((name.as_str(), *dispatch)),
                _ => None,
            },
            _ => None,
        }
    }

    /// Records, unions and fixed arrays.
    pub fn is_aggregate(&self) -> bool {
        matches!(
            self.resolved().kind,
            VarKind::Struct { .. } | VarKind::Array { .. }
        )
    }
}

/// Byte offsets of a record's fields plus the record's own size and alignment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Layout {
    pub size: usize,
    pub align: usize,
    pub offsets: Vec<usize>,
}

fn normalize_align(size: usize, align: usize) -> usize {
    match (align, size) {
        (0, 0) => 1,
        (0, size) => size,
        (align, _) => align,
    }
}

fn round_up(value: usize, align: usize) -> usize {
    value.div_ceil(align) * align
}

/// Sequential C layout: every field starts at its own alignment and the total
/// is rounded up to the largest one.
pub fn record_layout<'a>(fields: impl IntoIterator<Item = &'a VarType>) -> Layout {
    let mut offset = 0;
    let mut align = 1;
    let mut offsets = Vec::new();
    for field in fields {
        let field_align = normalize_align(field.size, field.align);
        offset = round_up(offset, field_align);
        offsets.push(offset);
        offset += field.size;
        align = align.max(field_align);
    }
    Layout {
        size: round_up(offset, align),
        align,
        offsets,
    }
}

/// Overlapping layout: the largest member rounded up to the largest alignment.
pub fn union_layout<'a>(fields: impl IntoIterator<Item = &'a VarType>) -> Layout {
    let mut size = 0;
    let mut align = 1;
    let mut offsets = Vec::new();
    for field in fields {
        offsets.push(0);
        size = size.max(field.size);
        align = align.max(normalize_align(field.size, field.align));
    }
    Layout {
        size: round_up(size, align),
        align,
        offsets,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn prim(p: Primitive) -> VarType {
        VarType::primitive(p, 8)
    }

    #[test]
    fn test_primitive_layouts() {
        assert_eq!(Primitive::Bool.layout(8), (2, 2));
        assert_eq!(Primitive::Variant.layout(8), (24, 8));
        assert_eq!(Primitive::Variant.layout(4), (16, 8));
        assert_eq!(Primitive::Bstr.layout(4), (4, 4));
        assert_eq!(Primitive::Guid.layout(8), (16, 4));
        assert_eq!(Primitive::Decimal.layout(4), (16, 8));
    }

    #[test]
    fn test_record_layout_pads_fields() {
        let fields = [prim(Primitive::U8), prim(Primitive::I32), prim(Primitive::I16)];
        let layout = record_layout(&fields);
        assert_eq!(layout.offsets, vec![0, 4, 8]);
        assert_eq!(layout.size, 12);
        assert_eq!(layout.align, 4);
    }

    #[test]
    fn test_point_layout() {
        let fields = [prim(Primitive::I32), prim(Primitive::I32)];
        let layout = record_layout(&fields);
        assert_eq!(layout.offsets, vec![0, 4]);
        assert_eq!((layout.size, layout.align), (8, 4));
    }

    #[test]
    fn test_empty_record() {
        let layout = record_layout(std::iter::empty());
        assert_eq!((layout.size, layout.align), (0, 1));
    }

    #[test]
    fn test_union_layout_rounds_to_alignment() {
        let fields = [
            VarType::array(prim(Primitive::U8), vec![5]),
            prim(Primitive::I32),
        ];
        let layout = union_layout(&fields);
        assert_eq!(layout.size, 8);
        assert_eq!(layout.align, 4);
        assert_eq!(layout.offsets, vec![0, 0]);
    }

    #[test]
    fn test_array_layout() {
        let arr = VarType::array(prim(Primitive::I16), vec![2, 3]);
        assert_eq!((arr.size, arr.align), (12, 2));
    }

    #[test]
    fn test_alias_resolution_and_nativeness() {
        let long = VarType::alias("LONG", prim(Primitive::I32));
        assert!(long.is_native());
        assert_eq!(long.as_primitive(), Some(Primitive::I32));

        let point = VarType::structure("Point", false, 8, 4);
        let alias = VarType::alias("POINTALIAS", VarType::alias("PT", point.clone()));
        assert_eq!(alias.resolved(), &point);
        assert_eq!((alias.size, alias.align), (8, 4));
        assert!(alias.is_aggregate());
        assert!(!alias.is_native());
    }

    #[test]
    fn test_interface_pointer() {
        let ptr = VarType::pointer(VarType::interface("IShape", false), 8);
        assert_eq!(ptr.as_interface_pointer(), Some(("IShape", false)));
        assert_eq!(ptr.size, 8);
        assert!(prim(Primitive::I32).as_interface_pointer().is_none());
    }

    #[test]
    fn test_zero_alignment_normalizes_to_size() {
        let s = VarType::structure("Odd", false, 2, 0);
        assert_eq!(s.align, 2);
    }
}
