//! Attribute registry and brick storage (C2): named, typed columns over
//! fixed-size 512-voxel brick slots, with zero-copy brick views.

use hashbrown::HashMap;
use parking_lot::RwLock;
use voxelicous_core::morton;
use voxelicous_core::{Error, Result};

/// Voxels along one brick edge (8 => 512 voxels per brick).
pub const BRICK_EDGE: u32 = 8;
/// Total voxel slots reserved per brick in every attribute column.
pub const BRICK_VOXELS: usize = (BRICK_EDGE * BRICK_EDGE * BRICK_EDGE) as usize;

/// The scalar type backing an attribute's column.
///
/// `Vec3` is stored as three independent scalar streams rather than an
/// interleaved struct, so per-channel typed slices stay contiguous.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AttributeType {
    F32,
    U32,
    U16,
    U8,
    Vec3,
}

impl AttributeType {
    const fn name(self) -> &'static str {
        match self {
            Self::F32 => "f32",
            Self::U32 => "u32",
            Self::U16 => "u16",
            Self::U8 => "u8",
            Self::Vec3 => "vec3",
        }
    }
}

/// A single attribute value, tagged by type.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum AttributeValue {
    F32(f32),
    U32(u32),
    U16(u16),
    U8(u8),
    Vec3([f32; 3]),
}

impl AttributeValue {
    const fn ty(self) -> AttributeType {
        match self {
            Self::F32(_) => AttributeType::F32,
            Self::U32(_) => AttributeType::U32,
            Self::U16(_) => AttributeType::U16,
            Self::U8(_) => AttributeType::U8,
            Self::Vec3(_) => AttributeType::Vec3,
        }
    }
}

enum Column {
    F32(Vec<f32>),
    U32(Vec<u32>),
    U16(Vec<u16>),
    U8(Vec<u8>),
    Vec3(Vec<f32>, Vec<f32>, Vec<f32>),
}

impl Column {
    fn new(ty: AttributeType) -> Self {
        match ty {
            AttributeType::F32 => Self::F32(Vec::new()),
            AttributeType::U32 => Self::U32(Vec::new()),
            AttributeType::U16 => Self::U16(Vec::new()),
            AttributeType::U8 => Self::U8(Vec::new()),
            AttributeType::Vec3 => Self::Vec3(Vec::new(), Vec::new(), Vec::new()),
        }
    }

    fn ty(&self) -> AttributeType {
        match self {
            Self::F32(_) => AttributeType::F32,
            Self::U32(_) => AttributeType::U32,
            Self::U16(_) => AttributeType::U16,
            Self::U8(_) => AttributeType::U8,
            Self::Vec3(..) => AttributeType::Vec3,
        }
    }

    fn grow_by(&mut self, slots: usize, default: AttributeValue) {
        match (self, default) {
            (Self::F32(v), AttributeValue::F32(d)) => v.resize(v.len() + slots, d),
            (Self::U32(v), AttributeValue::U32(d)) => v.resize(v.len() + slots, d),
            (Self::U16(v), AttributeValue::U16(d)) => v.resize(v.len() + slots, d),
            (Self::U8(v), AttributeValue::U8(d)) => v.resize(v.len() + slots, d),
            (Self::Vec3(x, y, z), AttributeValue::Vec3(d)) => {
                x.resize(x.len() + slots, d[0]);
                y.resize(y.len() + slots, d[1]);
                z.resize(z.len() + slots, d[2]);
            }
            _ => unreachable!("default value type must match column type"),
        }
    }

    fn remove_range(&mut self, start: usize, len: usize) {
        match self {
            Self::F32(v) => {
                v.drain(start..start + len);
            }
            Self::U32(v) => {
                v.drain(start..start + len);
            }
            Self::U16(v) => {
                v.drain(start..start + len);
            }
            Self::U8(v) => {
                v.drain(start..start + len);
            }
            Self::Vec3(x, y, z) => {
                x.drain(start..start + len);
                y.drain(start..start + len);
                z.drain(start..start + len);
            }
        }
    }
}

struct AttributeSlot {
    /// `None` once the slot has been removed: its index is a tombstone so
    /// that every other attribute's index, handed out at registration,
    /// stays valid for the registry's lifetime (§3.2: "a stable integer
    /// index assigned at registration").
    name: Option<String>,
    default: AttributeValue,
    column: Column,
}

/// Observer callbacks invoked on structural registry events.
///
/// `on_key_changed` should be treated by subscribers as a rebuild command;
/// the other two are non-destructive and may be ignored by most listeners.
#[derive(Default)]
pub struct Observers {
    on_key_changed: Vec<Box<dyn Fn(&str) + Send + Sync>>,
    on_attribute_added: Vec<Box<dyn Fn(&str) + Send + Sync>>,
    on_attribute_removed: Vec<Box<dyn Fn(&str) + Send + Sync>>,
}

impl Observers {
    pub fn subscribe_key_changed(&mut self, f: impl Fn(&str) + Send + Sync + 'static) {
        self.on_key_changed.push(Box::new(f));
    }

    pub fn subscribe_attribute_added(&mut self, f: impl Fn(&str) + Send + Sync + 'static) {
        self.on_attribute_added.push(Box::new(f));
    }

    pub fn subscribe_attribute_removed(&mut self, f: impl Fn(&str) + Send + Sync + 'static) {
        self.on_attribute_removed.push(Box::new(f));
    }
}

struct Inner {
    slots: Vec<AttributeSlot>,
    name_to_index: HashMap<String, usize>,
    key_index: Option<usize>,
    num_brick_slots: u32,
    free_bricks: Vec<u32>,
    allocated: Vec<bool>,
    observers: Observers,
}

/// Owns per-attribute contiguous arrays and the brick allocator.
pub struct AttributeRegistry {
    inner: RwLock<Inner>,
}

impl Default for AttributeRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl AttributeRegistry {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Inner {
                slots: Vec::new(),
                name_to_index: HashMap::new(),
                key_index: None,
                num_brick_slots: 0,
                free_bricks: Vec::new(),
                allocated: Vec::new(),
                observers: Observers::default(),
            }),
        }
    }

    /// Register the key attribute. Fails if a key is already registered.
    pub fn register_key(&self, name: &str, ty: AttributeType, default: AttributeValue) -> Result<usize> {
        let index = self.add_attribute(name, ty, default)?;
        let mut inner = self.inner.write();
        inner.key_index = Some(index);
        Ok(index)
    }

    /// Append a new attribute column, growing every existing brick's slots.
    pub fn add_attribute(&self, name: &str, ty: AttributeType, default: AttributeValue) -> Result<usize> {
        debug_assert_eq!(ty, default.ty(), "default value must match declared type");
        let mut inner = self.inner.write();
        if inner.name_to_index.contains_key(name) {
            return Err(Error::type_mismatch(name, "unused name", "already registered"));
        }
        let mut column = Column::new(ty);
        let slots = inner.num_brick_slots as usize * BRICK_VOXELS;
        column.grow_by(slots, default);
        let index = inner.slots.len();
        inner.slots.push(AttributeSlot {
            name: Some(name.to_string()),
            default,
            column,
        });
        inner.name_to_index.insert(name.to_string(), index);
        for f in &inner.observers.on_attribute_added {
            f(name);
        }
        Ok(index)
    }

    /// Remove a non-key attribute, freeing its slots across every brick.
    ///
    /// The slot's index is tombstoned rather than reclaimed: every other
    /// attribute's index, handed out at registration, must stay valid for
    /// callers holding it across this call (§3.2).
    pub fn remove_attribute(&self, name: &str) -> Result<()> {
        let mut inner = self.inner.write();
        let index = *inner
            .name_to_index
            .get(name)
            .ok_or_else(|| Error::type_mismatch(name, "registered attribute", "unregistered"))?;
        if inner.key_index == Some(index) {
            return Err(Error::type_mismatch(name, "non-key attribute", "the key attribute"));
        }
        let slot = &mut inner.slots[index];
        slot.name = None;
        slot.column = Column::new(slot.column.ty());
        inner.name_to_index.remove(name);
        for f in &inner.observers.on_attribute_removed {
            f(name);
        }
        Ok(())
    }

    /// Designate a different already-registered attribute as the key.
    pub fn change_key(&self, name: &str) -> Result<()> {
        let mut inner = self.inner.write();
        let index = *inner
            .name_to_index
            .get(name)
            .ok_or_else(|| Error::type_mismatch(name, "registered attribute", "unregistered"))?;
        inner.key_index = Some(index);
        for f in &inner.observers.on_key_changed {
            f(name);
        }
        Ok(())
    }

    /// Subscribe to key-attribute changes (treat as a rebuild command).
    pub fn subscribe_key_changed(&self, f: impl Fn(&str) + Send + Sync + 'static) {
        self.inner.write().observers.subscribe_key_changed(f);
    }

    /// Subscribe to non-destructive attribute additions.
    pub fn subscribe_attribute_added(&self, f: impl Fn(&str) + Send + Sync + 'static) {
        self.inner.write().observers.subscribe_attribute_added(f);
    }

    /// Subscribe to non-destructive attribute removals.
    pub fn subscribe_attribute_removed(&self, f: impl Fn(&str) + Send + Sync + 'static) {
        self.inner.write().observers.subscribe_attribute_removed(f);
    }

    /// Allocate a fresh brick, reserving one slot per registered attribute.
    pub fn allocate_brick(&self) -> u32 {
        let mut inner = self.inner.write();
        if let Some(id) = inner.free_bricks.pop() {
            inner.allocated[id as usize] = true;
            return id;
        }
        let id = inner.num_brick_slots;
        inner.num_brick_slots += 1;
        inner.allocated.push(true);
        for slot in &mut inner.slots {
            if slot.name.is_none() {
                continue;
            }
            let default = slot.default;
            slot.column.grow_by(BRICK_VOXELS, default);
        }
        id
    }

    /// Free a brick's slots back to the allocator's free list.
    ///
    /// The underlying storage is not compacted: `brick_id` remains a valid,
    /// stable index that a future `allocate_brick` may reuse.
    pub fn free_brick(&self, brick_id: u32) -> Result<()> {
        let mut inner = self.inner.write();
        let allocated = inner
            .allocated
            .get_mut(brick_id as usize)
            .ok_or_else(|| Error::invalid_brick(brick_id))?;
        if !*allocated {
            return Err(Error::invalid_brick(brick_id));
        }
        *allocated = false;
        inner.free_bricks.push(brick_id);
        Ok(())
    }

    fn check_allocated(&self, brick_id: u32) -> Result<()> {
        let inner = self.inner.read();
        match inner.allocated.get(brick_id as usize) {
            Some(true) => Ok(()),
            _ => Err(Error::invalid_brick(brick_id)),
        }
    }

    /// A zero-copy view over one brick's slot range.
    pub fn brick(&self, brick_id: u32) -> Result<BrickView<'_>> {
        self.check_allocated(brick_id)?;
        Ok(BrickView {
            registry: self,
            brick_id,
        })
    }

    /// Number of attribute columns currently registered (excludes tombstoned
    /// slots left behind by [`remove_attribute`](Self::remove_attribute)).
    pub fn attribute_count(&self) -> usize {
        self.inner.read().slots.iter().filter(|s| s.name.is_some()).count()
    }

    /// Resolve an attribute name to its stable index.
    pub fn attribute_index(&self, name: &str) -> Option<usize> {
        self.inner.read().name_to_index.get(name).copied()
    }

    fn read_scalar_f32(&self, attr: usize, global_index: usize) -> Result<f32> {
        let inner = self.inner.read();
        let slot = inner.slots.get(attr).ok_or_else(|| Error::invalid_brick(attr as u32))?;
        let slot_name = slot.name.as_deref().unwrap_or("<removed>");
        match &slot.column {
            Column::F32(v) => Ok(v[global_index]),
            other => Err(Error::type_mismatch(slot_name, "f32", other.ty().name())),
        }
    }

    fn write_scalar_f32(&self, attr: usize, global_index: usize, value: f32) -> Result<()> {
        let mut inner = self.inner.write();
        let slot = inner.slots.get_mut(attr).ok_or_else(|| Error::invalid_brick(attr as u32))?;
        let slot_name = slot.name.clone().unwrap_or_else(|| "<removed>".to_string());
        match &mut slot.column {
            Column::F32(v) => {
                v[global_index] = value;
                Ok(())
            }
            other => Err(Error::type_mismatch(&slot_name, "f32", other.ty().name())),
        }
    }

    fn read_scalar_u32(&self, attr: usize, global_index: usize) -> Result<u32> {
        let inner = self.inner.read();
        let slot = inner.slots.get(attr).ok_or_else(|| Error::invalid_brick(attr as u32))?;
        let slot_name = slot.name.as_deref().unwrap_or("<removed>");
        match &slot.column {
            Column::U32(v) => Ok(v[global_index]),
            other => Err(Error::type_mismatch(slot_name, "u32", other.ty().name())),
        }
    }

    fn write_scalar_u32(&self, attr: usize, global_index: usize, value: u32) -> Result<()> {
        let mut inner = self.inner.write();
        let slot = inner.slots.get_mut(attr).ok_or_else(|| Error::invalid_brick(attr as u32))?;
        let slot_name = slot.name.clone().unwrap_or_else(|| "<removed>".to_string());
        match &mut slot.column {
            Column::U32(v) => {
                v[global_index] = value;
                Ok(())
            }
            other => Err(Error::type_mismatch(&slot_name, "u32", other.ty().name())),
        }
    }

    fn read_vec3(&self, attr: usize, global_index: usize) -> Result<[f32; 3]> {
        let inner = self.inner.read();
        let slot = inner.slots.get(attr).ok_or_else(|| Error::invalid_brick(attr as u32))?;
        let slot_name = slot.name.as_deref().unwrap_or("<removed>");
        match &slot.column {
            Column::Vec3(x, y, z) => Ok([x[global_index], y[global_index], z[global_index]]),
            other => Err(Error::type_mismatch(slot_name, "vec3", other.ty().name())),
        }
    }

    fn write_vec3(&self, attr: usize, global_index: usize, value: [f32; 3]) -> Result<()> {
        let mut inner = self.inner.write();
        let slot = inner.slots.get_mut(attr).ok_or_else(|| Error::invalid_brick(attr as u32))?;
        let slot_name = slot.name.clone().unwrap_or_else(|| "<removed>".to_string());
        match &mut slot.column {
            Column::Vec3(x, y, z) => {
                x[global_index] = value[0];
                y[global_index] = value[1];
                z[global_index] = value[2];
                Ok(())
            }
            other => Err(Error::type_mismatch(&slot_name, "vec3", other.ty().name())),
        }
    }
}

/// A non-owning, zero-copy reference to one brick's 512-voxel slot range
/// across every attribute column.
pub struct BrickView<'a> {
    registry: &'a AttributeRegistry,
    brick_id: u32,
}

impl BrickView<'_> {
    /// The brick id this view addresses.
    pub const fn brick_id(&self) -> u32 {
        self.brick_id
    }

    fn global_index(&self, local: usize) -> usize {
        self.brick_id as usize * BRICK_VOXELS + local
    }

    /// Map brick-local `(x, y, z) in [0, 8)^3` to its Morton-ordered linear slot.
    #[inline]
    pub fn local_index(x: u32, y: u32, z: u32) -> usize {
        morton::add_local_offset(0, x, y, z) as usize
    }

    /// Inverse of [`local_index`](Self::local_index).
    #[inline]
    pub fn local_coords(index: usize) -> (u32, u32, u32) {
        morton::local_coords_in_brick(index as u64, BRICK_EDGE)
    }

    pub fn get_f32(&self, attr: usize, local_index: usize) -> Result<f32> {
        self.registry.read_scalar_f32(attr, self.global_index(local_index))
    }

    pub fn set_f32(&self, attr: usize, local_index: usize, value: f32) -> Result<()> {
        self.registry.write_scalar_f32(attr, self.global_index(local_index), value)
    }

    pub fn get_u32(&self, attr: usize, local_index: usize) -> Result<u32> {
        self.registry.read_scalar_u32(attr, self.global_index(local_index))
    }

    pub fn set_u32(&self, attr: usize, local_index: usize, value: u32) -> Result<()> {
        self.registry.write_scalar_u32(attr, self.global_index(local_index), value)
    }

    pub fn get_vec3(&self, attr: usize, local_index: usize) -> Result<[f32; 3]> {
        self.registry.read_vec3(attr, self.global_index(local_index))
    }

    pub fn set_vec3(&self, attr: usize, local_index: usize, value: [f32; 3]) -> Result<()> {
        self.registry.write_vec3(attr, self.global_index(local_index), value)
    }
}
