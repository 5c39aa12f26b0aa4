//! std140 packing for the user uniform block.
//!
//! The wrapped shader declares every value uniform inside one
//! `layout(std140)` block, in declaration order. `UniformLayout` reproduces
//! the offsets the shader compiler assigns so the host can write values by
//! name, and `UniformBlock` owns the staging bytes uploaded before each draw.
use std::collections::HashMap;

use crate::compile::{GlslType, UniformDecl};

const VEC4_ALIGN: usize = 16;
const SCALAR_SIZE: usize = 4;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum UniformError {
    #[error("uniform `{name}` expects {expected} components, got {got}")]
    ComponentMismatch {
        name: String,
        expected: usize,
        got: usize,
    },
    #[error("uniform `{0}` is not declared by the shader")]
    Unknown(String),
}

#[derive(Debug, Clone)]
pub(crate) struct UniformSlot {
    pub decl: UniformDecl,
    pub offset: usize,
    /// Distance between consecutive array elements.
    pub stride: usize,
}

#[derive(Debug, Clone)]
pub(crate) struct UniformLayout {
    slots: Vec<UniformSlot>,
    by_name: HashMap<String, usize>,
    size: usize,
}

/// (alignment, size) of a single non-array element.
fn element_layout(ty: GlslType) -> (usize, usize) {
    match ty {
        GlslType::Float | GlslType::Int => (4, 4),
        GlslType::Vec2 | GlslType::IVec2 => (8, 8),
        GlslType::Vec3 | GlslType::IVec3 => (16, 12),
        GlslType::Vec4 | GlslType::IVec4 => (16, 16),
        GlslType::Mat2 => (16, 32),
        GlslType::Mat3 => (16, 48),
        GlslType::Mat4 => (16, 64),
        GlslType::Sampler2D => (4, 0),
    }
}

/// Rows and columns, so matrices can be written column by column.
fn matrix_shape(ty: GlslType) -> Option<usize> {
    match ty {
        GlslType::Mat2 => Some(2),
        GlslType::Mat3 => Some(3),
        GlslType::Mat4 => Some(4),
        _ => None,
    }
}

fn align_to(value: usize, alignment: usize) -> usize {
    value.div_ceil(alignment) * alignment
}

impl UniformLayout {
    pub fn new(decls: &[UniformDecl]) -> Self {
        let mut slots = Vec::with_capacity(decls.len());
        let mut by_name = HashMap::with_capacity(decls.len());
        let mut cursor = 0usize;

        for decl in decls {
            let (align, size) = element_layout(decl.ty);
            let (align, stride, total) = match decl.array_len {
                Some(len) => {
                    let stride = align_to(size, VEC4_ALIGN);
                    (VEC4_ALIGN, stride, stride * len)
                }
                None => (align, size, size),
            };
            let offset = align_to(cursor, align);
            cursor = offset + total;
            by_name.insert(decl.name.clone(), slots.len());
            slots.push(UniformSlot {
                decl: decl.clone(),
                offset,
                stride,
            });
        }

        // The block is padded to a vec4 boundary; empty blocks carry the
        // placeholder vec4 emitted by the wrapper.
        let size = align_to(cursor, VEC4_ALIGN).max(VEC4_ALIGN);
        Self {
            slots,
            by_name,
            size,
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn slot(&self, name: &str) -> Option<&UniformSlot> {
        self.by_name.get(name).map(|index| &self.slots[*index])
    }

    #[cfg(test)]
    pub fn slots(&self) -> &[UniformSlot] {
        &self.slots
    }
}

/// Host copy of the uniform buffer contents.
#[derive(Debug, Clone)]
pub(crate) struct UniformBlock {
    layout: UniformLayout,
    bytes: Vec<u8>,
    dirty: bool,
}

impl UniformBlock {
    pub fn new(layout: UniformLayout) -> Self {
        let bytes = vec![0u8; layout.size()];
        Self {
            layout,
            bytes,
            dirty: true,
        }
    }

    pub fn layout(&self) -> &UniformLayout {
        &self.layout
    }

    /// Writes `values` (flattened, matrices column-major) into the slot for
    /// `name`. Integer uniforms receive the values rounded to `i32`.
    pub fn set(&mut self, name: &str, values: &[f32]) -> Result<(), UniformError> {
        let slot = self
            .layout
            .slot(name)
            .ok_or_else(|| UniformError::Unknown(name.to_string()))?;
        let expected = slot.decl.components();
        if values.len() != expected {
            return Err(UniformError::ComponentMismatch {
                name: name.to_string(),
                expected,
                got: values.len(),
            });
        }

        let ty = slot.decl.ty;
        let per_element = ty.components();
        let integer = ty.is_integer();
        let offsets: Vec<usize> = (0..values.len())
            .map(|index| {
                let element = index / per_element;
                let component = index % per_element;
                let within = match matrix_shape(ty) {
                    Some(rows) => (component / rows) * VEC4_ALIGN + (component % rows) * SCALAR_SIZE,
                    None => component * SCALAR_SIZE,
                };
                slot.offset + element * slot.stride + within
            })
            .collect();

        for (offset, value) in offsets.into_iter().zip(values) {
            let target = &mut self.bytes[offset..offset + SCALAR_SIZE];
            if integer {
                target.copy_from_slice(bytemuck::bytes_of(&(value.round() as i32)));
            } else {
                target.copy_from_slice(bytemuck::bytes_of(value));
            }
        }
        self.dirty = true;
        Ok(())
    }

    #[cfg(test)]
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Returns the bytes if they changed since the last call.
    pub fn take_dirty(&mut self) -> Option<&[u8]> {
        if std::mem::take(&mut self.dirty) {
            Some(&self.bytes)
        } else {
            None
        }
    }
}
