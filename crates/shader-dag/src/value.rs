//! Host-side values of fixed parameters and fixed operands.

use glam::{IVec2, IVec3, IVec4, Mat2, Mat3, Mat4, UVec2, UVec3, UVec4, Vec2, Vec3, Vec4};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::hash::{Hash, Hasher};

use crate::error::{Result, ShaderError};
use crate::format::{PinFormat, ScalarKind};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Bool(bool),
    Bool2([bool; 2]),
    Bool3([bool; 3]),
    Bool4([bool; 4]),
    Integer(i32),
    Integer2(IVec2),
    Integer3(IVec3),
    Integer4(IVec4),
    UInteger(u32),
    UInteger2(UVec2),
    UInteger3(UVec3),
    UInteger4(UVec4),
    Float(f32),
    Float2(Vec2),
    Float3(Vec3),
    Float4(Vec4),
    /// Matrices are stored column-major, as `glam` does.
    Float2x2(Mat2),
    Float3x3(Mat3),
    Float4x4(Mat4),
    /// Homogeneous array; every element has the same format.
    Array(Vec<Value>),
}

/// Flattened components of a non-array value.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Lanes {
    Integer(Vec<i32>),
    UInteger(Vec<u32>),
    Bool(Vec<bool>),
    Float(Vec<f32>),
}

impl Lanes {
    /// Picks components by index; indices must be in range.
    pub(crate) fn select(&self, indices: &[usize]) -> Lanes {
        fn pick<T: Copy>(v: &[T], indices: &[usize]) -> Vec<T> {
            indices.iter().map(|&i| v[i]).collect()
        }
        match self {
            Lanes::Integer(v) => Lanes::Integer(pick(v, indices)),
            Lanes::UInteger(v) => Lanes::UInteger(pick(v, indices)),
            Lanes::Bool(v) => Lanes::Bool(pick(v, indices)),
            Lanes::Float(v) => Lanes::Float(pick(v, indices)),
        }
    }

    /// Appends `count` copies of zero (`one == false`) or one.
    pub(crate) fn pad(&mut self, count: usize, one: bool) {
        match self {
            Lanes::Integer(v) => v.extend(std::iter::repeat(one as i32).take(count)),
            Lanes::UInteger(v) => v.extend(std::iter::repeat(one as u32).take(count)),
            Lanes::Bool(v) => v.extend(std::iter::repeat(one).take(count)),
            Lanes::Float(v) => v.extend(std::iter::repeat(if one { 1.0 } else { 0.0 }).take(count)),
        }
    }

    /// Reinterprets every component as `kind`, the way a shader `convert` would.
    pub(crate) fn convert(&self, kind: ScalarKind) -> Option<Lanes> {
        let floats: Vec<f32> = match self {
            Lanes::Integer(v) => v.iter().map(|&x| x as f32).collect(),
            Lanes::UInteger(v) => v.iter().map(|&x| x as f32).collect(),
            Lanes::Bool(v) => v.iter().map(|&x| if x { 1.0 } else { 0.0 }).collect(),
            Lanes::Float(v) => v.clone(),
        };
        Some(match kind {
            ScalarKind::Float => Lanes::Float(floats),
            ScalarKind::Integer => match self {
                Lanes::UInteger(v) => Lanes::Integer(v.iter().map(|&x| x as i32).collect()),
                _ => Lanes::Integer(floats.iter().map(|&x| x as i32).collect()),
            },
            ScalarKind::UInteger => match self {
                Lanes::Integer(v) => Lanes::UInteger(v.iter().map(|&x| x as u32).collect()),
                _ => Lanes::UInteger(floats.iter().map(|&x| x as u32).collect()),
            },
            ScalarKind::Bool => Lanes::Bool(floats.iter().map(|&x| x != 0.0).collect()),
            ScalarKind::SNorm | ScalarKind::UNorm => return None,
        })
    }

    fn bits(&self) -> impl Iterator<Item = u32> + '_ {
        let it: Box<dyn Iterator<Item = u32> + '_> = match self {
            Lanes::Integer(v) => Box::new(v.iter().map(|&x| x as u32)),
            Lanes::UInteger(v) => Box::new(v.iter().copied()),
            Lanes::Bool(v) => Box::new(v.iter().map(|&x| x as u32)),
            Lanes::Float(v) => Box::new(v.iter().map(|x| x.to_bits())),
        };
        it
    }
}

/// Component-wise binary arithmetic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Min,
    Max,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CompareFunction {
    Never,
    Less,
    LessEqual,
    Equal,
    NotEqual,
    GreaterEqual,
    Greater,
    Always,
}

impl CompareFunction {
    fn test(self, ordering: Option<Ordering>) -> bool {
        use CompareFunction::*;
        match (self, ordering) {
            (Never, _) => false,
            (Always, _) => true,
            (_, None) => matches!(self, NotEqual),
            (Less, Some(o)) => o == Ordering::Less,
            (LessEqual, Some(o)) => o != Ordering::Greater,
            (Equal, Some(o)) => o == Ordering::Equal,
            (NotEqual, Some(o)) => o != Ordering::Equal,
            (GreaterEqual, Some(o)) => o != Ordering::Less,
            (Greater, Some(o)) => o == Ordering::Greater,
        }
    }
}

fn zip_with<T: Copy>(
    a: &[T],
    b: &[T],
    f: impl Fn(T, T) -> Option<T>,
) -> Option<Vec<T>> {
    a.iter().zip(b).map(|(&x, &y)| f(x, y)).collect()
}

impl Value {
    pub fn format(&self) -> PinFormat {
        use PinFormat as F;
        match self {
            Value::Bool(_) => F::Bool,
            Value::Bool2(_) => F::Boolx2,
            Value::Bool3(_) => F::Boolx3,
            Value::Bool4(_) => F::Boolx4,
            Value::Integer(_) => F::Integer,
            Value::Integer2(_) => F::Integerx2,
            Value::Integer3(_) => F::Integerx3,
            Value::Integer4(_) => F::Integerx4,
            Value::UInteger(_) => F::UInteger,
            Value::UInteger2(_) => F::UIntegerx2,
            Value::UInteger3(_) => F::UIntegerx3,
            Value::UInteger4(_) => F::UIntegerx4,
            Value::Float(_) => F::Float,
            Value::Float2(_) => F::Floatx2,
            Value::Float3(_) => F::Floatx3,
            Value::Float4(_) => F::Floatx4,
            Value::Float2x2(_) => F::Float2x2,
            Value::Float3x3(_) => F::Float3x3,
            Value::Float4x4(_) => F::Float4x4,
            Value::Array(items) => items.first().map_or(F::Undefined, Value::format),
        }
    }

    pub fn is_array(&self) -> bool {
        matches!(self, Value::Array(_))
    }

    /// Whether this non-array value can stand for a pin of `format`.
    ///
    /// Normalized formats accept float values of the same width.
    pub fn is_compatible(&self, format: PinFormat) -> bool {
        if self.is_array() {
            return false;
        }
        let own = self.format();
        if own == format {
            return true;
        }
        match (own.shape(), format.shape()) {
            (Some(v), Some(f)) => {
                v.kind == ScalarKind::Float
                    && matches!(f.kind, ScalarKind::SNorm | ScalarKind::UNorm)
                    && v.rows == f.rows
                    && v.columns == f.columns
            }
            _ => false,
        }
    }

    /// Element count when this is an array whose every element is compatible with `format`.
    pub fn array_len(&self, format: PinFormat) -> Option<u32> {
        match self {
            Value::Array(items) if items.iter().all(|v| v.is_compatible(format)) => {
                u32::try_from(items.len()).ok()
            }
            _ => None,
        }
    }

    /// Non-negative integer payload, used for texture and sampler registers.
    pub fn as_u32(&self) -> Option<u32> {
        match *self {
            Value::UInteger(v) => Some(v),
            Value::Integer(v) => u32::try_from(v).ok(),
            _ => None,
        }
    }

    /// Signed index payload.
    pub fn as_index(&self) -> Option<i64> {
        match *self {
            Value::UInteger(v) => Some(v as i64),
            Value::Integer(v) => Some(v as i64),
            _ => None,
        }
    }

    pub fn as_u32_array(&self) -> Option<Vec<u32>> {
        match self {
            Value::Array(items) => items.iter().map(Value::as_u32).collect(),
            _ => None,
        }
    }

    pub(crate) fn lanes(&self) -> Option<Lanes> {
        Some(match self {
            Value::Bool(v) => Lanes::Bool(vec![*v]),
            Value::Bool2(v) => Lanes::Bool(v.to_vec()),
            Value::Bool3(v) => Lanes::Bool(v.to_vec()),
            Value::Bool4(v) => Lanes::Bool(v.to_vec()),
            Value::Integer(v) => Lanes::Integer(vec![*v]),
            Value::Integer2(v) => Lanes::Integer(v.to_array().to_vec()),
            Value::Integer3(v) => Lanes::Integer(v.to_array().to_vec()),
            Value::Integer4(v) => Lanes::Integer(v.to_array().to_vec()),
            Value::UInteger(v) => Lanes::UInteger(vec![*v]),
            Value::UInteger2(v) => Lanes::UInteger(v.to_array().to_vec()),
            Value::UInteger3(v) => Lanes::UInteger(v.to_array().to_vec()),
            Value::UInteger4(v) => Lanes::UInteger(v.to_array().to_vec()),
            Value::Float(v) => Lanes::Float(vec![*v]),
            Value::Float2(v) => Lanes::Float(v.to_array().to_vec()),
            Value::Float3(v) => Lanes::Float(v.to_array().to_vec()),
            Value::Float4(v) => Lanes::Float(v.to_array().to_vec()),
            Value::Float2x2(m) => Lanes::Float(m.to_cols_array().to_vec()),
            Value::Float3x3(m) => Lanes::Float(m.to_cols_array().to_vec()),
            Value::Float4x4(m) => Lanes::Float(m.to_cols_array().to_vec()),
            Value::Array(_) => return None,
        })
    }

    /// Rebuilds a value of `format` from its components.
    pub(crate) fn from_lanes(format: PinFormat, lanes: Lanes) -> Option<Value> {
        use PinFormat as F;
        fn arr<T: Copy + Default, const N: usize>(v: &[T]) -> Option<[T; N]> {
            (v.len() == N).then(|| {
                let mut out = [T::default(); N];
                out.copy_from_slice(v);
                out
            })
        }
        Some(match (format, &lanes) {
            (F::Bool, Lanes::Bool(v)) => Value::Bool(arr::<bool, 1>(v)?[0]),
            (F::Boolx2, Lanes::Bool(v)) => Value::Bool2(arr(v)?),
            (F::Boolx3, Lanes::Bool(v)) => Value::Bool3(arr(v)?),
            (F::Boolx4, Lanes::Bool(v)) => Value::Bool4(arr(v)?),
            (F::Integer, Lanes::Integer(v)) => Value::Integer(arr::<i32, 1>(v)?[0]),
            (F::Integerx2, Lanes::Integer(v)) => Value::Integer2(IVec2::from_array(arr(v)?)),
            (F::Integerx3, Lanes::Integer(v)) => Value::Integer3(IVec3::from_array(arr(v)?)),
            (F::Integerx4, Lanes::Integer(v)) => Value::Integer4(IVec4::from_array(arr(v)?)),
            (F::UInteger, Lanes::UInteger(v)) => Value::UInteger(arr::<u32, 1>(v)?[0]),
            (F::UIntegerx2, Lanes::UInteger(v)) => Value::UInteger2(UVec2::from_array(arr(v)?)),
            (F::UIntegerx3, Lanes::UInteger(v)) => Value::UInteger3(UVec3::from_array(arr(v)?)),
            (F::UIntegerx4, Lanes::UInteger(v)) => Value::UInteger4(UVec4::from_array(arr(v)?)),
            (F::Float, Lanes::Float(v)) => Value::Float(arr::<f32, 1>(v)?[0]),
            (F::Floatx2, Lanes::Float(v)) => Value::Float2(Vec2::from_array(arr(v)?)),
            (F::Floatx3, Lanes::Float(v)) => Value::Float3(Vec3::from_array(arr(v)?)),
            (F::Floatx4, Lanes::Float(v)) => Value::Float4(Vec4::from_array(arr(v)?)),
            (F::Float2x2, Lanes::Float(v)) => Value::Float2x2(Mat2::from_cols_array(&arr(v)?)),
            (F::Float3x3, Lanes::Float(v)) => Value::Float3x3(Mat3::from_cols_array(&arr(v)?)),
            (F::Float4x4, Lanes::Float(v)) => Value::Float4x4(Mat4::from_cols_array(&arr(v)?)),
            _ => return None,
        })
    }

    fn lanes_of(&self, what: &str) -> Result<Lanes> {
        self.lanes().ok_or_else(|| {
            ShaderError::Unsupported(format!("cannot {what} an array value on the host"))
        })
    }

    fn rebuild(format: PinFormat, lanes: Lanes) -> Result<Value> {
        Value::from_lanes(format, lanes).ok_or_else(|| {
            ShaderError::Unsupported(format!("no host representation for {format} values"))
        })
    }

    /// Component-wise arithmetic between two values of the same format.
    pub fn binary(&self, op: BinaryOp, other: &Value) -> Result<Value> {
        let format = self.format();
        if format != other.format() {
            return Err(ShaderError::incompatible(format!(
                "{op:?} of {format} and {}",
                other.format()
            )));
        }
        let lanes = Self::zip_lanes(op, self.lanes_of("fold")?, other.lanes_of("fold")?)?;
        Self::rebuild(format, lanes)
    }

    fn zip_lanes(op: BinaryOp, a: Lanes, b: Lanes) -> Result<Lanes> {
        use BinaryOp::*;
        let overflow = || ShaderError::OutOfRange(format!("integer {op:?} overflows or divides by zero"));
        Ok(match (a, b) {
            (Lanes::Float(a), Lanes::Float(b)) => Lanes::Float(
                a.iter()
                    .zip(&b)
                    .map(|(&x, &y)| match op {
                        Add => x + y,
                        Sub => x - y,
                        Mul => x * y,
                        Div => x / y,
                        Min => x.min(y),
                        Max => x.max(y),
                    })
                    .collect(),
            ),
            (Lanes::Integer(a), Lanes::Integer(b)) => Lanes::Integer(
                zip_with(&a, &b, |x, y| match op {
                    Add => Some(x.wrapping_add(y)),
                    Sub => Some(x.wrapping_sub(y)),
                    Mul => Some(x.wrapping_mul(y)),
                    Div => x.checked_div(y),
                    Min => Some(x.min(y)),
                    Max => Some(x.max(y)),
                })
                .ok_or_else(overflow)?,
            ),
            (Lanes::UInteger(a), Lanes::UInteger(b)) => Lanes::UInteger(
                zip_with(&a, &b, |x, y| match op {
                    Add => Some(x.wrapping_add(y)),
                    Sub => Some(x.wrapping_sub(y)),
                    Mul => Some(x.wrapping_mul(y)),
                    Div => x.checked_div(y),
                    Min => Some(x.min(y)),
                    Max => Some(x.max(y)),
                })
                .ok_or_else(overflow)?,
            ),
            _ => {
                return Err(ShaderError::incompatible(format!(
                    "{op:?} is not defined for boolean values"
                )))
            }
        })
    }

    /// Shader `mul`: matrix products, matrix-vector products, scalar broadcast, or component-wise.
    pub fn mul(&self, other: &Value) -> Result<Value> {
        match (self, other) {
            (Value::Float2x2(a), Value::Float2x2(b)) => return Ok(Value::Float2x2(*a * *b)),
            (Value::Float3x3(a), Value::Float3x3(b)) => return Ok(Value::Float3x3(*a * *b)),
            (Value::Float4x4(a), Value::Float4x4(b)) => return Ok(Value::Float4x4(*a * *b)),
            (Value::Float2x2(m), Value::Float2(v)) => return Ok(Value::Float2(*m * *v)),
            (Value::Float3x3(m), Value::Float3(v)) => return Ok(Value::Float3(*m * *v)),
            (Value::Float4x4(m), Value::Float4(v)) => return Ok(Value::Float4(*m * *v)),
            _ => {}
        }
        let (a, b) = (self.format(), other.format());
        if a == b {
            return self.binary(BinaryOp::Mul, other);
        }
        let (vector, scalar) = if b.is_scalar() {
            (self, other)
        } else if a.is_scalar() {
            (other, self)
        } else {
            return Err(ShaderError::incompatible(format!("cannot multiply {a} by {b}")));
        };
        if !vector.format().is_vector() || vector.format().to_scalar() != Some(scalar.format()) {
            return Err(ShaderError::incompatible(format!("cannot multiply {a} by {b}")));
        }
        let n = vector.format().components() as usize;
        let splat = scalar.lanes_of("fold")?.select(&vec![0; n]);
        let lanes = Self::zip_lanes(BinaryOp::Mul, vector.lanes_of("fold")?, splat)?;
        Self::rebuild(vector.format(), lanes)
    }

    /// Dot product of two vectors of the same format.
    pub fn dot(&self, other: &Value) -> Result<Value> {
        let format = self.format();
        if format != other.format() || !format.is_vector() {
            return Err(ShaderError::incompatible(format!(
                "dot of {format} and {}",
                other.format()
            )));
        }
        let products = Self::zip_lanes(BinaryOp::Mul, self.lanes_of("fold")?, other.lanes_of("fold")?)?;
        Ok(match products {
            Lanes::Float(v) => Value::Float(v.iter().sum()),
            Lanes::Integer(v) => Value::Integer(v.iter().fold(0i32, |acc, x| acc.wrapping_add(*x))),
            Lanes::UInteger(v) => Value::UInteger(v.iter().fold(0u32, |acc, x| acc.wrapping_add(*x))),
            Lanes::Bool(_) => unreachable!("boolean lanes are rejected by zip_lanes"),
        })
    }

    /// Component-wise comparison producing a boolean vector of the same width.
    pub fn compare(&self, function: CompareFunction, other: &Value) -> Result<Value> {
        let format = self.format();
        if format != other.format() || !format.is_vector() {
            return Err(ShaderError::incompatible(format!(
                "compare of {format} and {}",
                other.format()
            )));
        }
        let results: Vec<bool> = match (self.lanes_of("compare")?, other.lanes_of("compare")?) {
            (Lanes::Float(a), Lanes::Float(b)) => {
                a.iter().zip(&b).map(|(x, y)| function.test(x.partial_cmp(y))).collect()
            }
            (Lanes::Integer(a), Lanes::Integer(b)) => {
                a.iter().zip(&b).map(|(x, y)| function.test(Some(x.cmp(y)))).collect()
            }
            (Lanes::UInteger(a), Lanes::UInteger(b)) => {
                a.iter().zip(&b).map(|(x, y)| function.test(Some(x.cmp(y)))).collect()
            }
            (Lanes::Bool(a), Lanes::Bool(b)) => {
                a.iter().zip(&b).map(|(x, y)| function.test(Some(x.cmp(y)))).collect()
            }
            _ => unreachable!("formats were checked to be equal"),
        };
        let out = PinFormat::vector(ScalarKind::Bool, results.len() as u32)
            .unwrap_or(PinFormat::Bool);
        Self::rebuild(out, Lanes::Bool(results))
    }

    fn discriminant_rank(&self) -> u8 {
        match self {
            Value::Bool(_) => 0,
            Value::Bool2(_) => 1,
            Value::Bool3(_) => 2,
            Value::Bool4(_) => 3,
            Value::Integer(_) => 4,
            Value::Integer2(_) => 5,
            Value::Integer3(_) => 6,
            Value::Integer4(_) => 7,
            Value::UInteger(_) => 8,
            Value::UInteger2(_) => 9,
            Value::UInteger3(_) => 10,
            Value::UInteger4(_) => 11,
            Value::Float(_) => 12,
            Value::Float2(_) => 13,
            Value::Float3(_) => 14,
            Value::Float4(_) => 15,
            Value::Float2x2(_) => 16,
            Value::Float3x3(_) => 17,
            Value::Float4x4(_) => 18,
            Value::Array(_) => 19,
        }
    }

    /// Total structural order: kind first, then components (floats by `total_cmp`).
    pub fn structural_cmp(&self, other: &Value) -> Ordering {
        let rank = self.discriminant_rank().cmp(&other.discriminant_rank());
        if rank != Ordering::Equal {
            return rank;
        }
        match (self, other) {
            (Value::Array(a), Value::Array(b)) => a.len().cmp(&b.len()).then_with(|| {
                a.iter()
                    .zip(b)
                    .map(|(x, y)| x.structural_cmp(y))
                    .find(|o| o.is_ne())
                    .unwrap_or(Ordering::Equal)
            }),
            _ => match (self.lanes(), other.lanes()) {
                (Some(Lanes::Float(a)), Some(Lanes::Float(b))) => a
                    .iter()
                    .zip(&b)
                    .map(|(x, y)| x.total_cmp(y))
                    .find(|o| o.is_ne())
                    .unwrap_or(Ordering::Equal),
                (Some(Lanes::Integer(a)), Some(Lanes::Integer(b))) => a.cmp(&b),
                (Some(Lanes::UInteger(a)), Some(Lanes::UInteger(b))) => a.cmp(&b),
                (Some(Lanes::Bool(a)), Some(Lanes::Bool(b))) => a.cmp(&b),
                _ => Ordering::Equal,
            },
        }
    }

    /// Hash consistent with [`Value::structural_cmp`].
    pub fn structural_hash<H: Hasher>(&self, state: &mut H) {
        self.discriminant_rank().hash(state);
        match self {
            Value::Array(items) => {
                items.len().hash(state);
                for item in items {
                    item.structural_hash(state);
                }
            }
            _ => {
                if let Some(lanes) = self.lanes() {
                    for bits in lanes.bits() {
                        bits.hash(state);
                    }
                }
            }
        }
    }
}

macro_rules! impl_from {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(impl From<$ty> for Value {
            fn from(v: $ty) -> Self {
                Value::$variant(v)
            }
        })*
    };
}

impl_from! {
    bool => Bool,
    i32 => Integer,
    IVec2 => Integer2,
    IVec3 => Integer3,
    IVec4 => Integer4,
    u32 => UInteger,
    UVec2 => UInteger2,
    UVec3 => UInteger3,
    UVec4 => UInteger4,
    f32 => Float,
    Vec2 => Float2,
    Vec3 => Float3,
    Vec4 => Float4,
    Mat2 => Float2x2,
    Mat3 => Float3x3,
    Mat4 => Float4x4,
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(items: Vec<T>) -> Self {
        Value::Array(items.into_iter().map(Into::into).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn folds_match_direct_arithmetic() {
        let a = Value::from(Vec4::new(1.0, 2.0, 3.0, 4.0));
        let b = Value::from(Vec4::new(0.5, -2.0, 6.0, 8.0));
        assert_eq!(
            a.binary(BinaryOp::Add, &b).unwrap(),
            Value::from(Vec4::new(1.0, 2.0, 3.0, 4.0) + Vec4::new(0.5, -2.0, 6.0, 8.0))
        );
        assert_eq!(
            a.binary(BinaryOp::Div, &b).unwrap(),
            Value::from(Vec4::new(1.0, 2.0, 3.0, 4.0) / Vec4::new(0.5, -2.0, 6.0, 8.0))
        );
        assert_eq!(a.dot(&b).unwrap(), Value::Float(0.5 - 4.0 + 18.0 + 32.0));
        assert_eq!(
            Value::Integer(7).binary(BinaryOp::Sub, &Value::Integer(9)).unwrap(),
            Value::Integer(-2)
        );
    }

    #[test]
    fn integer_division_by_zero_is_reported() {
        let err = Value::Integer(1)
            .binary(BinaryOp::Div, &Value::Integer(0))
            .unwrap_err();
        assert!(matches!(err, ShaderError::OutOfRange(_)));
    }

    #[test]
    fn mul_broadcasts_scalars_in_either_order() {
        let v = Value::from(Vec3::new(1.0, 2.0, 3.0));
        let s = Value::Float(2.0);
        let expected = Value::from(Vec3::new(2.0, 4.0, 6.0));
        assert_eq!(v.mul(&s).unwrap(), expected);
        assert_eq!(s.mul(&v).unwrap(), expected);
        assert!(v.mul(&Value::Integer(2)).is_err());
    }

    #[test]
    fn mul_matrix_by_vector() {
        let m = Mat4::from_scale(Vec3::new(2.0, 3.0, 4.0));
        let v = Vec4::new(1.0, 1.0, 1.0, 1.0);
        assert_eq!(
            Value::from(m).mul(&Value::from(v)).unwrap(),
            Value::from(Vec4::new(2.0, 3.0, 4.0, 1.0))
        );
    }

    #[test]
    fn compare_yields_bool_vector() {
        let a = Value::from(IVec2::new(1, 5));
        let b = Value::from(IVec2::new(3, 5));
        assert_eq!(
            a.compare(CompareFunction::LessEqual, &b).unwrap(),
            Value::Bool2([true, true])
        );
        assert_eq!(
            a.compare(CompareFunction::Less, &b).unwrap(),
            Value::Bool2([true, false])
        );
    }

    #[test]
    fn structural_order_is_total_for_floats() {
        let nan = Value::Float(f32::NAN);
        assert_eq!(nan.structural_cmp(&nan), Ordering::Equal);
        assert_eq!(
            Value::Float(-0.0).structural_cmp(&Value::Float(0.0)),
            Ordering::Less
        );
        assert_eq!(
            Value::from(vec![1u32, 2]).structural_cmp(&Value::from(vec![1u32, 2, 0])),
            Ordering::Less
        );
    }

    #[test]
    fn normalized_formats_accept_floats() {
        assert!(Value::from(Vec4::ONE).is_compatible(PinFormat::UNormx4));
        assert!(!Value::from(Vec4::ONE).is_compatible(PinFormat::UNormx3));
        assert_eq!(
            Value::from(vec![1.0f32, 2.0]).array_len(PinFormat::Float),
            Some(2)
        );
        assert_eq!(Value::from(vec![1.0f32]).array_len(PinFormat::Integer), None);
    }
}
