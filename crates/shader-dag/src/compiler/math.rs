use super::{foldable, ShaderCompiler};
use crate::driver::{ExpandType, ShaderFunction};
use crate::error::{Result, ShaderError};
use crate::format::{mul_result_format, ArraySize, PinFormat, ScalarKind};
use crate::limits::MAX_INTRINSIC_ARGUMENTS;
use crate::operand::Operand;
use crate::swizzle::SwizzleMask;
use crate::value::{BinaryOp, CompareFunction, Lanes, Value};

fn both_fixed<'a>(a: &'a Operand, b: &'a Operand) -> Option<(&'a Value, &'a Value)> {
    a.value().zip(b.value())
}

fn numeric_kind(operand: &Operand, what: &str) -> Result<ScalarKind> {
    match operand.format.scalar_kind() {
        Some(kind) if kind != ScalarKind::Bool => Ok(kind),
        _ => Err(ShaderError::incompatible(format!(
            "{what} is not defined for {operand}"
        ))),
    }
}

impl ShaderCompiler {
    fn binary(
        &mut self,
        op: BinaryOp,
        a: &Operand,
        b: &Operand,
        dst: Option<&Operand>,
    ) -> Result<Operand> {
        if !a.matches(b) {
            return Err(ShaderError::incompatible(format!("{op:?} of {a} and {b}")));
        }
        numeric_kind(a, &format!("{op:?}"))?;
        let folded = match both_fixed(a, b) {
            Some((x, y)) => foldable(x.binary(op, y))?,
            None => None,
        };
        let (ia, ib) = (a.id, b.id);
        self.finish(dst, a.format, a.size, folded, |driver, out| match op {
            BinaryOp::Add => driver.add(ia, ib, out),
            BinaryOp::Sub => driver.sub(ia, ib, out),
            BinaryOp::Mul => driver.mul(ia, ib, out),
            BinaryOp::Div => driver.div(ia, ib, out),
            BinaryOp::Min => driver.min(ia, ib, out),
            BinaryOp::Max => driver.max(ia, ib, out),
        })
    }

    pub fn add(&mut self, a: &Operand, b: &Operand) -> Result<Operand> {
        self.binary(BinaryOp::Add, a, b, None)
    }

    pub fn add_into(&mut self, a: &Operand, b: &Operand, dst: &Operand) -> Result<()> {
        self.binary(BinaryOp::Add, a, b, Some(dst)).map(drop)
    }

    pub fn sub(&mut self, a: &Operand, b: &Operand) -> Result<Operand> {
        self.binary(BinaryOp::Sub, a, b, None)
    }

    pub fn sub_into(&mut self, a: &Operand, b: &Operand, dst: &Operand) -> Result<()> {
        self.binary(BinaryOp::Sub, a, b, Some(dst)).map(drop)
    }

    pub fn div(&mut self, a: &Operand, b: &Operand) -> Result<Operand> {
        self.binary(BinaryOp::Div, a, b, None)
    }

    pub fn div_into(&mut self, a: &Operand, b: &Operand, dst: &Operand) -> Result<()> {
        self.binary(BinaryOp::Div, a, b, Some(dst)).map(drop)
    }

    pub fn min(&mut self, a: &Operand, b: &Operand) -> Result<Operand> {
        self.binary(BinaryOp::Min, a, b, None)
    }

    pub fn min_into(&mut self, a: &Operand, b: &Operand, dst: &Operand) -> Result<()> {
        self.binary(BinaryOp::Min, a, b, Some(dst)).map(drop)
    }

    pub fn max(&mut self, a: &Operand, b: &Operand) -> Result<Operand> {
        self.binary(BinaryOp::Max, a, b, None)
    }

    pub fn max_into(&mut self, a: &Operand, b: &Operand, dst: &Operand) -> Result<()> {
        self.binary(BinaryOp::Max, a, b, Some(dst)).map(drop)
    }

    fn multiply(&mut self, a: &Operand, b: &Operand, dst: Option<&Operand>) -> Result<Operand> {
        let format = mul_result_format(a.format, b.format)
            .ok_or_else(|| ShaderError::incompatible(format!("cannot multiply {a} by {b}")))?;
        if a.size != b.size {
            return Err(ShaderError::incompatible(format!(
                "array sizes of {a} and {b} differ"
            )));
        }
        let folded = match both_fixed(a, b) {
            Some((x, y)) => foldable(x.mul(y))?,
            None => None,
        };
        let extended = a.format.is_matrix() || b.format.is_matrix();
        let (ia, ib) = (a.id, b.id);
        self.finish(dst, format, a.size, folded, |driver, out| {
            if extended {
                driver.mul_ex(ia, ib, out)
            } else {
                driver.mul(ia, ib, out)
            }
        })
    }

    pub fn mul(&mut self, a: &Operand, b: &Operand) -> Result<Operand> {
        self.multiply(a, b, None)
    }

    pub fn mul_into(&mut self, a: &Operand, b: &Operand, dst: &Operand) -> Result<()> {
        self.multiply(a, b, Some(dst)).map(drop)
    }

    fn dot_product(&mut self, a: &Operand, b: &Operand, dst: Option<&Operand>) -> Result<Operand> {
        if !a.matches(b) || a.is_array() || !a.format.is_vector() {
            return Err(ShaderError::incompatible(format!("dot of {a} and {b}")));
        }
        let kind = numeric_kind(a, "dot")?;
        let format = PinFormat::vector(kind, 1).unwrap_or(PinFormat::Float);
        let folded = match both_fixed(a, b) {
            Some((x, y)) => foldable(x.dot(y))?,
            None => None,
        };
        let (ia, ib) = (a.id, b.id);
        self.finish(dst, format, ArraySize::NotArray, folded, |driver, out| {
            driver.dot(ia, ib, out)
        })
    }

    pub fn dot(&mut self, a: &Operand, b: &Operand) -> Result<Operand> {
        self.dot_product(a, b, None)
    }

    pub fn dot_into(&mut self, a: &Operand, b: &Operand, dst: &Operand) -> Result<()> {
        self.dot_product(a, b, Some(dst)).map(drop)
    }

    fn comparison(
        &mut self,
        function: CompareFunction,
        a: &Operand,
        b: &Operand,
        dst: Option<&Operand>,
    ) -> Result<Operand> {
        if !a.matches(b) || a.is_array() || !a.format.is_vector() {
            return Err(ShaderError::incompatible(format!("compare of {a} and {b}")));
        }
        let format = PinFormat::vector(ScalarKind::Bool, a.format.components())
            .unwrap_or(PinFormat::Bool);
        let folded = match both_fixed(a, b) {
            Some((x, y)) => foldable(x.compare(function, y))?,
            None => None,
        };
        let (ia, ib) = (a.id, b.id);
        self.finish(dst, format, ArraySize::NotArray, folded, |driver, out| {
            driver.compare(function, ia, ib, out)
        })
    }

    pub fn compare(
        &mut self,
        function: CompareFunction,
        a: &Operand,
        b: &Operand,
    ) -> Result<Operand> {
        self.comparison(function, a, b, None)
    }

    pub fn compare_into(
        &mut self,
        function: CompareFunction,
        a: &Operand,
        b: &Operand,
        dst: &Operand,
    ) -> Result<()> {
        self.comparison(function, a, b, Some(dst)).map(drop)
    }

    /// Calls an intrinsic. Unary intrinsics fold on a fixed argument.
    pub fn call(&mut self, function: ShaderFunction, args: &[Operand]) -> Result<Operand> {
        if args.len() > MAX_INTRINSIC_ARGUMENTS {
            return Err(ShaderError::Unsupported(format!(
                "{function:?} with {} arguments",
                args.len()
            )));
        }
        if args.len() != function.arity() {
            return Err(ShaderError::incompatible(format!(
                "{function:?} takes {} arguments, got {}",
                function.arity(),
                args.len()
            )));
        }
        let first = &args[0];
        if first.is_array() || args.iter().any(|a| !a.matches(first)) {
            return Err(ShaderError::incompatible(format!(
                "{function:?} arguments must share one non-array format"
            )));
        }
        let format = call_result_format(function, first.format).ok_or_else(|| {
            ShaderError::incompatible(format!("{function:?} is not defined for {first}"))
        })?;
        let folded = match first.value() {
            Some(value) if args.len() == 1 => fold_unary(function, format, value),
            _ => None,
        };
        let ids: Vec<_> = args.iter().map(Operand::id).collect();
        self.finish(None, format, ArraySize::NotArray, folded, |driver, out| {
            driver.call(function, &ids, out)
        })
    }

    fn swizzle_to(
        &mut self,
        src: &Operand,
        mask: &SwizzleMask,
        dst: Option<&Operand>,
    ) -> Result<Operand> {
        if src.is_array() {
            return Err(ShaderError::incompatible(format!("cannot swizzle array {src}")));
        }
        let format = mask.output_format(src.format)?;
        let indices = mask.lane_indices(src.format)?;
        let folded = src
            .value()
            .and_then(|v| v.lanes())
            .and_then(|lanes| Value::from_lanes(format, lanes.select(&indices)));
        let id = src.id;
        self.finish(dst, format, ArraySize::NotArray, folded, |driver, out| {
            driver.swizzle(id, mask, out)
        })
    }

    pub fn swizzle(&mut self, src: &Operand, mask: &SwizzleMask) -> Result<Operand> {
        self.swizzle_to(src, mask, None)
    }

    pub fn swizzle_into(&mut self, src: &Operand, mask: &SwizzleMask, dst: &Operand) -> Result<()> {
        self.swizzle_to(src, mask, Some(dst)).map(drop)
    }

    fn expand_to(
        &mut self,
        src: &Operand,
        format: PinFormat,
        policy: ExpandType,
        dst: Option<&Operand>,
    ) -> Result<Operand> {
        let (Some(from), Some(to)) = (src.format.shape(), format.shape()) else {
            return Err(ShaderError::incompatible(format!("cannot expand {src} to {format}")));
        };
        if src.is_array()
            || from.kind != to.kind
            || from.rows != 1
            || to.rows != 1
            || to.columns < from.columns
        {
            return Err(ShaderError::incompatible(format!("cannot expand {src} to {format}")));
        }
        let folded = src.value().and_then(|v| v.lanes()).and_then(|mut lanes| {
            let added = (to.columns - from.columns) as usize;
            match policy {
                ExpandType::AddZeros => lanes.pad(added, false),
                ExpandType::AddOnes => lanes.pad(added, true),
                ExpandType::AddOnesAtW => {
                    lanes.pad(added.saturating_sub(1), false);
                    if added > 0 {
                        lanes.pad(1, to.columns == 4);
                    }
                }
            }
            Value::from_lanes(format, lanes)
        });
        let id = src.id;
        self.finish(dst, format, ArraySize::NotArray, folded, |driver, out| {
            driver.expand(id, policy, out)
        })
    }

    pub fn expand(&mut self, src: &Operand, format: PinFormat, policy: ExpandType) -> Result<Operand> {
        self.expand_to(src, format, policy, None)
    }

    pub fn expand_into(&mut self, src: &Operand, policy: ExpandType, dst: &Operand) -> Result<()> {
        self.expand_to(src, dst.format, policy, Some(dst)).map(drop)
    }

    fn convert_to(
        &mut self,
        src: &Operand,
        format: PinFormat,
        dst: Option<&Operand>,
    ) -> Result<Operand> {
        let (Some(from), Some(to)) = (src.format.shape(), format.shape()) else {
            return Err(ShaderError::incompatible(format!("cannot convert {src} to {format}")));
        };
        if src.is_array() || from.rows != to.rows || from.columns != to.columns {
            return Err(ShaderError::incompatible(format!("cannot convert {src} to {format}")));
        }
        let folded = src
            .value()
            .and_then(|v| v.lanes())
            .and_then(|lanes| lanes.convert(to.kind))
            .and_then(|lanes| Value::from_lanes(format, lanes));
        let id = src.id;
        self.finish(dst, format, ArraySize::NotArray, folded, |driver, out| {
            driver.convert(id, out)
        })
    }

    pub fn convert(&mut self, src: &Operand, format: PinFormat) -> Result<Operand> {
        self.convert_to(src, format, None)
    }

    pub fn convert_into(&mut self, src: &Operand, dst: &Operand) -> Result<()> {
        self.convert_to(src, dst.format, Some(dst)).map(drop)
    }

    /// Reads `array[index]`, checking the bounds when both are known.
    pub fn index_in_array(&mut self, array: &Operand, index: &Operand) -> Result<Operand> {
        if !array.is_array() {
            return Err(ShaderError::incompatible(format!("{array} is not an array")));
        }
        if index.is_array()
            || !matches!(index.format, PinFormat::Integer | PinFormat::UInteger)
        {
            return Err(ShaderError::incompatible(format!(
                "{index} cannot index an array"
            )));
        }
        let mut folded = None;
        if let (Some(i), Some(len)) = (index.value().and_then(Value::as_index), array.size.len()) {
            if i < 0 || i >= len as i64 {
                return Err(ShaderError::OutOfRange(format!(
                    "index {i} is outside of {array}"
                )));
            }
            if let Some(Value::Array(items)) = array.value() {
                folded = items.get(i as usize).cloned();
            }
        }
        if let Some(value) = folded {
            return Ok(self.create_fixed(value));
        }
        let target = self.operand(
            array.format,
            array.texture_format,
            ArraySize::NotArray,
            true,
            None,
        );
        self.driver
            .register_temp(target.id, target.format, ArraySize::NotArray);
        self.driver.index_in_array(array.id, index.id, target.id);
        Ok(target)
    }
}

/// Result format of intrinsic `function` applied to arguments of `format`.
pub(crate) fn call_result_format(function: ShaderFunction, format: PinFormat) -> Option<PinFormat> {
    let kind = format.scalar_kind()?;
    match function {
        ShaderFunction::Length if kind == ScalarKind::Float && format.is_vector() => {
            Some(PinFormat::Float)
        }
        ShaderFunction::All | ShaderFunction::Any | ShaderFunction::None
            if kind == ScalarKind::Bool =>
        {
            Some(PinFormat::Bool)
        }
        ShaderFunction::Floor | ShaderFunction::Ceil | ShaderFunction::Lerp
            if kind == ScalarKind::Float =>
        {
            Some(format)
        }
        ShaderFunction::Abs | ShaderFunction::Clamp
            if matches!(kind, ScalarKind::Float | ScalarKind::Integer) =>
        {
            Some(format)
        }
        _ => None,
    }
}

fn fold_unary(function: ShaderFunction, format: PinFormat, value: &Value) -> Option<Value> {
    let lanes = value.lanes()?;
    let out = match (function, lanes) {
        (ShaderFunction::Abs, Lanes::Float(v)) => Lanes::Float(v.iter().map(|x| x.abs()).collect()),
        (ShaderFunction::Abs, Lanes::Integer(v)) => {
            Lanes::Integer(v.iter().map(|x| x.wrapping_abs()).collect())
        }
        (ShaderFunction::Floor, Lanes::Float(v)) => {
            Lanes::Float(v.iter().map(|x| x.floor()).collect())
        }
        (ShaderFunction::Ceil, Lanes::Float(v)) => Lanes::Float(v.iter().map(|x| x.ceil()).collect()),
        (ShaderFunction::Length, Lanes::Float(v)) => {
            Lanes::Float(vec![v.iter().map(|x| x * x).sum::<f32>().sqrt()])
        }
        (ShaderFunction::All, Lanes::Bool(v)) => Lanes::Bool(vec![v.iter().all(|&b| b)]),
        (ShaderFunction::Any, Lanes::Bool(v)) => Lanes::Bool(vec![v.iter().any(|&b| b)]),
        (ShaderFunction::None, Lanes::Bool(v)) => Lanes::Bool(vec![!v.iter().any(|&b| b)]),
        _ => return None,
    };
    Value::from_lanes(format, out)
}
