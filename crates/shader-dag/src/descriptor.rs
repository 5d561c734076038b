//! Static input contracts operations declare for their pins.

use std::fmt;
use std::sync::Arc;

use crate::error::{Result, ShaderError};
use crate::format::{mul_result_format, ArraySize, PinComponent, PinFormat, ScalarKind};
use crate::pin::Pin;

/// One named input slot of an operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PinDescriptor {
    formats: Vec<PinFormat>,
    name: String,
    optional: bool,
    array_size: Option<ArraySize>,
    component: PinComponent,
}

impl PinDescriptor {
    pub fn new(name: impl Into<String>, formats: impl IntoIterator<Item = PinFormat>) -> Self {
        Self {
            formats: formats.into_iter().collect(),
            name: name.into(),
            optional: false,
            array_size: Some(ArraySize::NotArray),
            component: PinComponent::empty(),
        }
    }

    /// Slot accepting any numeric scalar, vector or matrix format.
    pub fn numeric(name: impl Into<String>) -> Self {
        Self::new(name, numeric_formats())
    }

    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }

    /// Accept arrays of any size as well as non-arrays.
    pub fn any_size(mut self) -> Self {
        self.array_size = None;
        self
    }

    pub fn with_array_size(mut self, size: ArraySize) -> Self {
        self.array_size = Some(size);
        self
    }

    pub fn with_component(mut self, component: PinComponent) -> Self {
        self.component = component;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn formats(&self) -> &[PinFormat] {
        &self.formats
    }

    pub fn is_optional(&self) -> bool {
        self.optional
    }

    pub fn component(&self) -> PinComponent {
        self.component
    }

    pub fn array_size(&self) -> Option<ArraySize> {
        self.array_size
    }

    pub fn is_compatible(&self, pin: &Pin) -> bool {
        self.formats.contains(&pin.format())
    }

    fn check(&self, pin: &Pin) -> Result<()> {
        if !self.is_compatible(pin) {
            return Err(ShaderError::InvalidPin {
                slot: self.name.clone(),
                reason: format!("format {} is not accepted", pin.format()),
            });
        }
        if let Some(size) = self.array_size {
            if size != pin.size() {
                return Err(ShaderError::InvalidPin {
                    slot: self.name.clone(),
                    reason: format!("array size {:?} does not match {size:?}", pin.size()),
                });
            }
        }
        Ok(())
    }
}

pub fn numeric_formats() -> Vec<PinFormat> {
    use PinFormat::*;
    vec![
        Integer, Integerx2, Integerx3, Integerx4, UInteger, UIntegerx2, UIntegerx3, UIntegerx4,
        SNorm, SNormx2, SNormx3, SNormx4, UNorm, UNormx2, UNormx3, UNormx4, Float, Floatx2,
        Floatx3, Floatx4, Float2x2, Float3x3, Float4x4, Integer2x2, Integer3x3, Integer4x4,
        UInteger2x2, UInteger3x3, UInteger4x4,
    ]
}

pub fn vector_formats(kinds: &[ScalarKind]) -> Vec<PinFormat> {
    kinds
        .iter()
        .flat_map(|&k| (1..=4).filter_map(move |n| PinFormat::vector(k, n)))
        .collect()
}

pub fn texture_formats() -> Vec<PinFormat> {
    use PinFormat::*;
    vec![
        BufferTexture,
        Texture1D,
        Texture1DArray,
        Texture2D,
        Texture2DArray,
        TextureCube,
        Texture3D,
    ]
}

/// Cross-slot predicate over the pins bound to a descriptor set.
pub trait PinRelation: fmt::Debug + Send + Sync {
    /// Slot indices the relation reads.
    fn slots(&self) -> &[usize];

    /// `pins` are the bound pins for [`PinRelation::slots`], in that order.
    fn check(&self, pins: &[&Pin]) -> std::result::Result<(), String>;
}

/// Every related pin must be structurally equal.
#[derive(Debug, Clone)]
pub struct PinEqual {
    slots: Vec<usize>,
}

impl PinEqual {
    pub fn new(slots: impl Into<Vec<usize>>) -> Self {
        Self {
            slots: slots.into(),
        }
    }
}

impl PinRelation for PinEqual {
    fn slots(&self) -> &[usize] {
        &self.slots
    }

    fn check(&self, pins: &[&Pin]) -> std::result::Result<(), String> {
        match pins.split_first() {
            Some((first, rest)) => match rest.iter().find(|p| **p != *first) {
                Some(other) => Err(format!("pins {first} and {other} differ")),
                None => Ok(()),
            },
            None => Ok(()),
        }
    }
}

/// The two pins can be combined by `mul`.
#[derive(Debug, Clone)]
pub struct PinMultipliable {
    slots: [usize; 2],
}

impl PinMultipliable {
    pub fn new(lhs: usize, rhs: usize) -> Self {
        Self { slots: [lhs, rhs] }
    }
}

impl PinRelation for PinMultipliable {
    fn slots(&self) -> &[usize] {
        &self.slots
    }

    fn check(&self, pins: &[&Pin]) -> std::result::Result<(), String> {
        let [a, b] = pins else {
            return Err("expected two pins".into());
        };
        if a.size() != b.size() {
            return Err(format!("array sizes of {a} and {b} differ"));
        }
        match mul_result_format(a.format(), b.format()) {
            Some(_) => Ok(()),
            None => Err(format!("{a} cannot be multiplied by {b}")),
        }
    }
}

/// A texture and a float position that samples it.
#[derive(Debug, Clone)]
pub struct PinTextureAddressable {
    slots: [usize; 2],
}

impl PinTextureAddressable {
    pub fn new(texture: usize, position: usize) -> Self {
        Self {
            slots: [texture, position],
        }
    }
}

impl PinRelation for PinTextureAddressable {
    fn slots(&self) -> &[usize] {
        &self.slots
    }

    fn check(&self, pins: &[&Pin]) -> std::result::Result<(), String> {
        let [texture, position] = pins else {
            return Err("expected a texture and a position".into());
        };
        check_position(
            texture.format().sample_position_components(),
            ScalarKind::Float,
            texture,
            position,
        )
    }
}

/// A texture and an integer position (with mip level) that loads from it.
#[derive(Debug, Clone)]
pub struct PinTextureMipmappedAddressable {
    slots: [usize; 2],
}

impl PinTextureMipmappedAddressable {
    pub fn new(texture: usize, position: usize) -> Self {
        Self {
            slots: [texture, position],
        }
    }
}

impl PinRelation for PinTextureMipmappedAddressable {
    fn slots(&self) -> &[usize] {
        &self.slots
    }

    fn check(&self, pins: &[&Pin]) -> std::result::Result<(), String> {
        let [texture, position] = pins else {
            return Err("expected a texture and a position".into());
        };
        check_position(
            texture.format().load_position_components(),
            ScalarKind::Integer,
            texture,
            position,
        )
    }
}

fn check_position(
    components: Option<u32>,
    kind: ScalarKind,
    texture: &Pin,
    position: &Pin,
) -> std::result::Result<(), String> {
    let Some(components) = components else {
        return Err(format!("{texture} cannot be addressed this way"));
    };
    match PinFormat::vector(kind, components) {
        Some(expected) if expected == position.format() && !position.is_array() => Ok(()),
        Some(expected) => Err(format!(
            "{texture} is addressed with {expected}, found {position}"
        )),
        None => Err(format!("{texture} cannot be addressed this way")),
    }
}

/// Ordered input slots of an operation plus the relations between them.
#[derive(Debug, Clone, Default)]
pub struct PinsDescriptor {
    descriptors: Vec<PinDescriptor>,
    relations: Vec<Arc<dyn PinRelation>>,
}

impl PinsDescriptor {
    pub fn new(descriptors: impl IntoIterator<Item = PinDescriptor>) -> Self {
        Self {
            descriptors: descriptors.into_iter().collect(),
            relations: Vec::new(),
        }
    }

    pub fn with_relation(mut self, relation: impl PinRelation + 'static) -> Self {
        self.relations.push(Arc::new(relation));
        self
    }

    pub fn descriptors(&self) -> &[PinDescriptor] {
        &self.descriptors
    }

    pub fn relations(&self) -> &[Arc<dyn PinRelation>] {
        &self.relations
    }

    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }

    /// Checks `pins` against every slot and relation, failing on the first violation.
    ///
    /// Trailing optional slots may be left unbound. Relations touching an unbound slot are
    /// skipped.
    pub fn validate(&self, pins: &[Pin]) -> Result<()> {
        if pins.len() > self.descriptors.len() {
            return Err(ShaderError::InvalidPin {
                slot: format!("#{}", self.descriptors.len()),
                reason: format!(
                    "{} pins bound to {} slots",
                    pins.len(),
                    self.descriptors.len()
                ),
            });
        }
        for (i, descriptor) in self.descriptors.iter().enumerate() {
            match pins.get(i) {
                Some(pin) => descriptor.check(pin)?,
                None if descriptor.is_optional() => {}
                None => {
                    return Err(ShaderError::InvalidPin {
                        slot: descriptor.name.clone(),
                        reason: "required pin is not bound".into(),
                    })
                }
            }
        }
        for relation in &self.relations {
            let bound: Option<Vec<&Pin>> = relation.slots().iter().map(|&i| pins.get(i)).collect();
            let Some(bound) = bound else {
                continue;
            };
            if let Err(reason) = relation.check(&bound) {
                let slot = relation
                    .slots()
                    .iter()
                    .filter_map(|&i| self.descriptors.get(i).map(PinDescriptor::name))
                    .collect::<Vec<_>>()
                    .join(", ");
                return Err(ShaderError::InvalidPin { slot, reason });
            }
        }
        Ok(())
    }
}
