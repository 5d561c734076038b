//! Expression layer over [`ShaderCode`].
//!
//! [`Expr`] handles implement the arithmetic operators, so graphs read like the math they
//! describe:
//!
//! ```ignore
//! let builder = ShaderBuilder::new(BindingStage::Vertex);
//! let position = builder.input(PinComponent::POSITION, PinFormat::Floatx4);
//! let offset = builder.constant("offset", PinFormat::Floatx4);
//! builder.output(PinComponent::POSITION, position + offset);
//! let code = builder.finish()?;
//! ```
//!
//! The first failing operation is recorded and returned by [`ShaderBuilder::finish`]; every
//! expression derived after it is empty and adds nothing to the graph.

use std::cell::RefCell;
use std::fmt;
use std::ops::{Add, Div, Mul, Sub};

use crate::code::ShaderCode;
use crate::driver::{BindingStage, ShaderFunction};
use crate::error::{Result, ShaderError};
use crate::format::{PinComponent, PinFormat};
use crate::pin::Pin;
use crate::swizzle::SwizzleMask;
use crate::value::{CompareFunction, Value};

pub struct ShaderBuilder {
    code: RefCell<ShaderCode>,
    error: RefCell<Option<ShaderError>>,
}

impl fmt::Debug for ShaderBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ShaderBuilder")
            .field("error", &self.error.borrow())
            .finish_non_exhaustive()
    }
}

impl ShaderBuilder {
    pub fn new(stage: BindingStage) -> Self {
        Self::from_code(ShaderCode::new(stage))
    }

    /// Continues building `code`, which must not be frozen yet.
    pub fn from_code(code: ShaderCode) -> Self {
        Self {
            code: RefCell::new(code),
            error: RefCell::new(None),
        }
    }

    /// Runs `f` on the code unless an earlier step failed.
    fn apply<T>(&self, f: impl FnOnce(&mut ShaderCode) -> Result<T>) -> Option<T> {
        if self.error.borrow().is_some() {
            return None;
        }
        let result = f(&mut *self.code.borrow_mut());
        match result {
            Ok(value) => Some(value),
            Err(e) => {
                *self.error.borrow_mut() = Some(e);
                None
            }
        }
    }

    fn expr(&self, pin: Option<Pin>) -> Expr<'_> {
        Expr { builder: self, pin }
    }

    fn exprs(&self, pins: Option<Vec<Pin>>, len: usize) -> Vec<Expr<'_>> {
        match pins {
            Some(pins) => pins.into_iter().map(|pin| self.expr(Some(pin))).collect(),
            None => vec![self.expr(None); len],
        }
    }

    /// Wraps a pin created directly on the code.
    pub fn wrap(&self, pin: Pin) -> Expr<'_> {
        self.expr(Some(pin))
    }

    /// Error that stopped the build, if any.
    pub fn error(&self) -> Option<String> {
        self.error.borrow().as_ref().map(ToString::to_string)
    }

    pub fn input(&self, component: PinComponent, format: PinFormat) -> Expr<'_> {
        self.expr(self.apply(|code| code.add_input(component, format)))
    }

    pub fn constant(&self, name: &str, format: PinFormat) -> Expr<'_> {
        self.expr(self.apply(|code| code.create_constant(name, format)))
    }

    pub fn fixed(&self, value: impl Into<Value>) -> Expr<'_> {
        let value = value.into();
        self.expr(self.apply(|code| code.create_fixed(value)))
    }

    /// Declares output `component` with the format of `value` and links it.
    pub fn output(&self, component: PinComponent, value: Expr<'_>) {
        let Some(pin) = value.pin else {
            return;
        };
        self.apply(|code| {
            code.add_output(component, pin.format())?;
            code.link_output(component, pin)
        });
    }

    /// Counted loop: `body` receives the iteration index and the carried values and returns
    /// the values of the next iteration. Returns the values after `count` iterations.
    pub fn repeat<'a>(
        &'a self,
        count: Expr<'a>,
        initial: &[Expr<'a>],
        body: impl FnOnce(Expr<'a>, &[Expr<'a>]) -> Vec<Expr<'a>>,
    ) -> Vec<Expr<'a>> {
        let opened = match (count.pin, pins(initial)) {
            (Some(count), Some(initial)) => self.apply(|code| code.begin_repeat(count, &initial)),
            _ => None,
        };
        let Some((begin, index, carried)) = opened else {
            return self.exprs(None, initial.len());
        };
        let carried = self.exprs(Some(carried), initial.len());
        let next = body(self.wrap(index), &carried);
        let after = pins(&next).and_then(|next| self.apply(|code| code.end_repeat(begin, &next)));
        self.exprs(after, initial.len())
    }

    /// `body` receives the carried values and returns the exit condition with the values of
    /// the next iteration. The loop ends once the condition holds.
    pub fn while_loop<'a>(
        &'a self,
        initial: &[Expr<'a>],
        body: impl FnOnce(&[Expr<'a>]) -> (Expr<'a>, Vec<Expr<'a>>),
    ) -> Vec<Expr<'a>> {
        let opened = pins(initial).and_then(|initial| self.apply(|code| code.begin_while(&initial)));
        let Some((begin, carried)) = opened else {
            return self.exprs(None, initial.len());
        };
        let carried = self.exprs(Some(carried), initial.len());
        let (condition, next) = body(&carried);
        let after = match (condition.pin, pins(&next)) {
            (Some(condition), Some(next)) => {
                self.apply(|code| code.end_while(begin, condition, &next))
            }
            _ => None,
        };
        self.exprs(after, initial.len())
    }

    /// The built code, or the first error met while building it.
    pub fn finish(self) -> Result<ShaderCode> {
        match self.error.into_inner() {
            Some(e) => Err(e),
            None => Ok(self.code.into_inner()),
        }
    }
}

fn pins(exprs: &[Expr<'_>]) -> Option<Vec<Pin>> {
    exprs.iter().map(|e| e.pin).collect()
}

/// A value of a [`ShaderBuilder`] graph.
#[derive(Clone, Copy)]
pub struct Expr<'a> {
    builder: &'a ShaderBuilder,
    pin: Option<Pin>,
}

impl fmt::Debug for Expr<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.pin {
            Some(pin) => write!(f, "Expr({pin})"),
            None => f.write_str("Expr(<failed>)"),
        }
    }
}

impl<'a> Expr<'a> {
    /// `None` once building has failed.
    pub fn pin(&self) -> Option<Pin> {
        self.pin
    }

    pub fn format(&self) -> Option<PinFormat> {
        self.pin.map(|p| p.format())
    }

    fn unary(self, f: impl FnOnce(&mut ShaderCode, Pin) -> Result<Pin>) -> Self {
        let pin = self.pin.and_then(|a| self.builder.apply(|code| f(code, a)));
        self.builder.expr(pin)
    }

    fn binary(self, other: Self, f: impl FnOnce(&mut ShaderCode, Pin, Pin) -> Result<Pin>) -> Self {
        let pin = match (self.pin, other.pin) {
            (Some(a), Some(b)) => self.builder.apply(|code| f(code, a, b)),
            _ => None,
        };
        self.builder.expr(pin)
    }

    pub fn dot(self, other: Self) -> Self {
        self.binary(other, ShaderCode::dot)
    }

    pub fn min(self, other: Self) -> Self {
        self.binary(other, ShaderCode::min)
    }

    pub fn max(self, other: Self) -> Self {
        self.binary(other, ShaderCode::max)
    }

    pub fn compare(self, function: CompareFunction, other: Self) -> Self {
        self.binary(other, |code, a, b| code.compare(function, a, b))
    }

    pub fn swizzle(self, mask: SwizzleMask) -> Self {
        self.unary(|code, a| code.swizzle(a, mask))
    }

    pub fn convert(self, format: PinFormat) -> Self {
        self.unary(|code, a| code.convert(a, format))
    }

    pub fn index(self, index: Self) -> Self {
        self.binary(index, ShaderCode::index)
    }

    /// Calls `function` with `self` as the first argument.
    pub fn call(self, function: ShaderFunction, rest: &[Self]) -> Self {
        let args = std::iter::once(self).chain(rest.iter().copied()).collect::<Vec<_>>();
        let pin = pins(&args).and_then(|args| self.builder.apply(|code| code.call(function, &args)));
        self.builder.expr(pin)
    }
}

macro_rules! impl_operator {
    ($($trait:ident :: $method:ident),* $(,)?) => {
        $(impl<'a> $trait for Expr<'a> {
            type Output = Expr<'a>;

            fn $method(self, rhs: Self) -> Self::Output {
                self.binary(rhs, ShaderCode::$method)
            }
        })*
    };
}

impl_operator!(Add::add, Sub::sub, Mul::mul, Div::div);
